//! Configuration for the kiln asset pipeline.
//!
//! Loads `kiln.toml` (or the `kiln` field of `package.json`), layers
//! `KILN_`-prefixed environment variables and command-line overrides on top,
//! and validates the result.

pub mod config;
pub mod discovery;
pub mod error;
pub mod overrides;
pub mod validation;

pub use config::*;
pub use error::*;
pub use overrides::{BuildOverrides, ConfigOverrides, DevOverrides};

pub use discovery::{discover, ConfigDiscovery, ConfigSource, CONFIG_FILE_NAME, ENV_PREFIX};
