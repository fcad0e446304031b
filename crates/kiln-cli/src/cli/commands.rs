use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::cli::enums::ModeArg;
use crate::cli::validation::{parse_entry, parse_inline_limit};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build every entry once and write the output directory
    ///
    /// Cleans the output directory, copies the vendor directory and writes
    /// bundles, stylesheets, emitted assets and source maps.
    Build(BuildArgs),

    /// Serve the build from memory and rebuild on change
    ///
    /// Bundles are referenced relative to the dev server origin. Pages
    /// loading them receive hot updates and a build error overlay.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    #[arg(short, long, value_enum, default_value = "production")]
    pub mode: ModeArg,

    /// Output directory, relative to the project root
    #[arg(short = 'd', long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Entry as NAME=PATH, added to the configured entries (same name wins)
    ///
    /// Examples:
    ///   kiln build --entry index=frontend/src/index.js
    ///   kiln build --entry index=src/index.js --entry style=src/index.scss
    #[arg(short, long = "entry", value_name = "NAME=PATH", value_parser = parse_entry)]
    pub entries: Vec<(String, PathBuf)>,

    /// Assets strictly smaller than this many bytes are inlined as data URIs
    #[arg(long, value_name = "BYTES", value_parser = parse_inline_limit)]
    pub inline_limit: Option<u64>,

    /// Do not emit source maps
    #[arg(long)]
    pub no_sourcemap: bool,

    #[command(flatten)]
    pub project: ProjectArgs,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(short, long, value_enum, default_value = "development")]
    pub mode: ModeArg,

    #[arg(short, long)]
    pub port: Option<u16>,

    #[arg(long)]
    pub host: Option<String>,

    /// Do not send `Access-Control-Allow-Origin: *`
    #[arg(long)]
    pub no_cors: bool,

    /// Reload the page instead of applying hot updates
    #[arg(long)]
    pub no_hot: bool,

    #[command(flatten)]
    pub project: ProjectArgs,
}

/// Where the project lives.
#[derive(Args, Debug, Clone, Default)]
pub struct ProjectArgs {
    /// Configuration file (default: kiln.toml or package.json#kiln in the project root)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Project root
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,
}
