//! Shared state for the development server.
//!
//! Committed builds live in a [`MemorySink`]; handlers take an `Arc`
//! snapshot, so a request that starts during a rebuild sees the previous
//! generation in full.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use kiln_bundler::{BuildOutput, Generation, MemorySink};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::dev::DevEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    NotStarted,
    InProgress { started_at: Instant },
    Success { duration_ms: u64 },
    Failed { error: String },
}

impl BuildStatus {
    pub fn is_in_progress(&self) -> bool {
        matches!(self, BuildStatus::InProgress { .. })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BuildStatus::Success { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            BuildStatus::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Body of `GET /__kiln__/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// `idle`, `building`, `ok` or `failed`.
    pub status: &'static str,
    /// Last committed generation, if any.
    pub generation: Option<Generation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub clients: usize,
}

pub type ClientRegistry = Arc<RwLock<HashMap<usize, mpsc::Sender<String>>>>;

pub struct DevServerState {
    pub status: RwLock<BuildStatus>,
    pub sink: MemorySink,
    pub clients: ClientRegistry,
    next_client_id: RwLock<usize>,
    /// Output root on disk; only the vendor copy is ever written there.
    out_dir: PathBuf,
}

impl DevServerState {
    pub fn new(out_dir: PathBuf) -> Self {
        Self {
            status: RwLock::new(BuildStatus::NotStarted),
            sink: MemorySink::new(),
            clients: Arc::new(RwLock::new(HashMap::new())),
            next_client_id: RwLock::new(0),
            out_dir,
        }
    }

    pub fn start_build(&self) {
        *self.status.write() = BuildStatus::InProgress {
            started_at: Instant::now(),
        };
    }

    pub fn complete_build(&self, duration_ms: u64) {
        *self.status.write() = BuildStatus::Success { duration_ms };
    }

    pub fn fail_build(&self, error: String) {
        *self.status.write() = BuildStatus::Failed { error };
    }

    pub fn get_status(&self) -> BuildStatus {
        self.status.read().clone()
    }

    /// Latest committed build.
    pub fn snapshot(&self) -> Option<Arc<BuildOutput>> {
        self.sink.snapshot()
    }

    pub fn generation(&self) -> Generation {
        self.snapshot()
            .map(|output| output.manifest.generation)
            .unwrap_or_default()
    }

    pub fn status_report(&self) -> StatusReport {
        let (status, duration_ms, error) = match self.get_status() {
            BuildStatus::NotStarted => ("idle", None, None),
            BuildStatus::InProgress { .. } => ("building", None, None),
            BuildStatus::Success { duration_ms } => ("ok", Some(duration_ms), None),
            BuildStatus::Failed { error } => ("failed", None, Some(error)),
        };
        StatusReport {
            status,
            generation: self.snapshot().map(|output| output.manifest.generation),
            duration_ms,
            error,
            clients: self.client_count(),
        }
    }

    /// Register an SSE client. Events for it arrive on the receiver.
    pub fn register_client(&self) -> (usize, mpsc::Receiver<String>) {
        let id = {
            let mut next_id = self.next_client_id.write();
            let id = *next_id;
            *next_id += 1;
            id
        };

        let (tx, rx) = mpsc::channel(100);
        self.clients.write().insert(id, tx);
        tracing::debug!(client = id, "client connected");

        (id, rx)
    }

    pub fn unregister_client(&self, id: usize) {
        if self.clients.write().remove(&id).is_some() {
            tracing::debug!(client = id, "client disconnected");
        }
    }

    /// Send `event` to every client without waiting. A client whose queue is
    /// full or closed is dropped; its page reconnects and gets a fresh greeting.
    pub fn broadcast(&self, event: &DevEvent) {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("failed to serialize dev event: {}", e);
                return;
            }
        };

        let mut failed_ids = Vec::new();
        for (id, tx) in self.clients.read().iter() {
            match tx.try_send(json.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(client = id, "client is not keeping up, disconnecting");
                    failed_ids.push(*id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => failed_ids.push(*id),
            }
        }

        for id in failed_ids {
            self.unregister_client(id);
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }
}

pub type SharedState = Arc<DevServerState>;

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_bundler::{BuildManifest, OutputSink};

    fn output(generation: u64) -> Arc<BuildOutput> {
        Arc::new(BuildOutput {
            manifest: BuildManifest {
                generation: Generation(generation),
                ..BuildManifest::default()
            },
            ..BuildOutput::default()
        })
    }

    #[test]
    fn test_build_status_lifecycle() {
        let state = DevServerState::new(PathBuf::from("dist"));
        assert_eq!(state.get_status(), BuildStatus::NotStarted);
        assert_eq!(state.status_report().status, "idle");

        state.start_build();
        assert!(state.get_status().is_in_progress());
        assert_eq!(state.status_report().status, "building");

        state.complete_build(150);
        assert!(state.get_status().is_success());
        assert_eq!(state.status_report().duration_ms, Some(150));

        state.fail_build("Test error".to_string());
        assert_eq!(state.get_status().error(), Some("Test error"));
        assert_eq!(state.status_report().error.as_deref(), Some("Test error"));
    }

    #[test]
    fn test_generation_follows_commits() {
        let state = DevServerState::new(PathBuf::from("dist"));
        assert_eq!(state.generation(), Generation(0));
        assert!(state.status_report().generation.is_none());

        state.sink.commit(output(2)).unwrap();
        assert_eq!(state.generation(), Generation(2));
    }

    #[test]
    fn test_client_registration() {
        let state = DevServerState::new(PathBuf::from("dist"));
        let (a, _rx_a) = state.register_client();
        let (b, _rx_b) = state.register_client();
        assert_ne!(a, b);
        assert_eq!(state.client_count(), 2);

        state.unregister_client(a);
        assert_eq!(state.client_count(), 1);
        state.unregister_client(a);
        assert_eq!(state.client_count(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_drops_disconnected_clients() {
        let state = DevServerState::new(PathBuf::from("dist"));
        let (_, mut rx) = state.register_client();
        let (_, dropped) = state.register_client();
        drop(dropped);

        state.broadcast(&DevEvent::Connected {
            generation: Generation(1),
        });

        assert_eq!(rx.recv().await.unwrap(), r#"{"type":"connected","generation":1}"#);
        assert_eq!(state.client_count(), 1);
    }

    #[tokio::test]
    async fn test_stalled_client_does_not_block_others() {
        let state = DevServerState::new(PathBuf::from("dist"));
        let (_stalled_id, _stalled) = state.register_client();
        let (_, mut live) = state.register_client();

        // Far more events than a client queue holds; the stalled receiver is never read.
        let sends = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            for generation in 1..=250u64 {
                state.broadcast(&DevEvent::Connected {
                    generation: Generation(generation),
                });
                live.recv().await.unwrap();
            }
        })
        .await;

        assert!(sends.is_ok(), "broadcast blocked on a stalled client");
        assert_eq!(state.client_count(), 1);
    }
}
