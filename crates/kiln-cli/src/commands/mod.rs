//! Command implementations.
//!
//! - [`build`]: one generation written to the output directory
//! - [`serve`]: in-memory builds behind the dev server

pub mod build;
pub mod serve;

pub use build::execute as build_execute;
pub use serve::execute as serve_execute;
