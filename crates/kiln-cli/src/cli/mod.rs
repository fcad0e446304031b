//! Command-line interface definition for kiln.
//!
//! - `kiln build` writes one generation to the output directory and exits
//! - `kiln serve` keeps the output in memory, rebuilds on change and pushes
//!   updates to connected pages

mod commands;
pub mod enums;
mod validation;

use clap::Parser;

pub use commands::{BuildArgs, Command, ProjectArgs, ServeArgs};
pub use enums::*;
pub use validation::{parse_entry, parse_inline_limit};

/// kiln - static asset build pipeline
#[derive(Parser, Debug)]
#[command(
    name = "kiln",
    version,
    about = "Build and serve the static assets of a web application",
    long_about = "kiln routes scripts, stylesheets, images and fonts through per-type\n\
                  transform chains and links them into one bundle per entry. `build`\n\
                  writes the result to disk, `serve` keeps it in memory and pushes\n\
                  changes to the browser."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}
