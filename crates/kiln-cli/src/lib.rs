//! kiln CLI.
//!
//! Command-line front end for [`kiln_bundler`]: one-off builds written to
//! disk, and a development server that keeps the latest build in memory and
//! pushes updates to connected pages.
//!
//! - [`cli`] - clap definitions
//! - [`commands`] - `build` and `serve`
//! - [`config`] - turning configuration into a pipeline
//! - [`dev`] - the development server
//! - [`error`] - error types and miette rendering
//! - [`logger`] - tracing setup
//! - [`ui`] - terminal output
//!
//! ```rust
//! use kiln_cli::{error::Result, logger};
//!
//! fn main() -> Result<()> {
//!     logger::init_logger(false, false, true);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod dev;
pub mod error;
pub mod logger;
pub mod ui;

pub use error::{BuildError, CliError, Result, ResultExt};
