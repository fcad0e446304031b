//! Development server.
//!
//! - committed builds served from memory, vendor copy from disk
//! - updates pushed to pages over Server-Sent Events
//! - file watching with debouncing
//! - build error overlay in the browser

pub mod builder;
pub mod error_overlay;
pub mod server;
pub mod state;
pub mod watcher;

pub use builder::DevBuilder;
pub use server::{DevServer, DevServerConfig};
pub use state::{BuildStatus, DevServerState, SharedState};
pub use watcher::{FileChange, FileWatcher, WatchFilter};

use std::collections::BTreeMap;

use kiln_bundler::{Generation, HotModule};
use serde::Serialize;

/// Messages pushed to connected pages. The tag names are what the hot
/// client in every served bundle dispatches on.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DevEvent {
    /// First message on every connection.
    Connected { generation: Generation },

    /// A generation was committed. Only changed files and changed hot
    /// module factories are included.
    Update {
        generation: Generation,
        artifacts: Vec<String>,
        modules: BTreeMap<String, HotModule>,
    },

    /// The build failed; pages keep running the last committed generation.
    BuildFailed { error: String, html: String },
}
