//! The serve-mode build loop.
//!
//! One task owns the pipeline and runs generations strictly one after
//! another on the blocking pool. A change that arrives while a generation
//! is running supersedes it: the result is dropped uncommitted and the next
//! generation starts once the changes settle.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kiln_bundler::{BuildOutput, OutputSink, Pipeline};
use miette::Diagnostic;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::dev::{DevEvent, FileChange, SharedState, error_overlay::error_overlay};
use crate::error::{BuildError, Result};
use crate::ui;

type BuildTask = JoinHandle<std::result::Result<(BuildOutput, Duration), kiln_bundler::Error>>;

pub struct DevBuilder {
    pipeline: Arc<Pipeline>,
    state: SharedState,
    debounce: Duration,
}

impl DevBuilder {
    pub fn new(pipeline: Pipeline, state: SharedState, debounce_ms: u64) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            state,
            debounce: Duration::from_millis(debounce_ms),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Run one generation and commit it, or record and broadcast the failure.
    pub async fn build_once(&self) -> Result<Option<Arc<BuildOutput>>> {
        let result = self.spawn_build().await;
        self.finish(result).await
    }

    /// Rebuild on every settled batch of changes until the channel closes.
    pub async fn run(self, mut changes: mpsc::Receiver<FileChange>) {
        while let Some(change) = changes.recv().await {
            ui::info(&format!("Changed: {}", self.display(&change)));
            self.settle(&mut changes).await;

            loop {
                let mut task = self.spawn_build();
                let mut superseded = false;
                let result = loop {
                    tokio::select! {
                        result = &mut task => break result,
                        Some(change) = changes.recv(), if !superseded => {
                            tracing::debug!(path = %change.path().display(), "change during build");
                            superseded = true;
                        }
                    }
                };

                if superseded {
                    tracing::info!(
                        generation = self.pipeline.generation().0,
                        "generation superseded by newer changes, abandoning"
                    );
                    self.settle(&mut changes).await;
                    continue;
                }

                if let Err(e) = self.finish(result).await {
                    ui::error(&format!("Build task failed: {}", e));
                }
                break;
            }
        }
        tracing::debug!("change channel closed, build loop stopping");
    }

    /// Wait out the debounce window and drop the changes it collected.
    async fn settle(&self, changes: &mut mpsc::Receiver<FileChange>) {
        loop {
            match tokio::time::timeout(self.debounce, changes.recv()).await {
                Ok(Some(change)) => {
                    tracing::debug!(path = %change.path().display(), "coalesced change");
                }
                Ok(None) | Err(_) => break,
            }
        }
    }

    fn spawn_build(&self) -> BuildTask {
        self.state.start_build();
        let pipeline = Arc::clone(&self.pipeline);
        tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            pipeline.build().map(|output| (output, started.elapsed()))
        })
    }

    async fn finish(
        &self,
        result: std::result::Result<
            std::result::Result<(BuildOutput, Duration), kiln_bundler::Error>,
            tokio::task::JoinError,
        >,
    ) -> Result<Option<Arc<BuildOutput>>> {
        let built = match result {
            Ok(built) => built,
            Err(e) => {
                let message = format!("build task failed: {}", e);
                self.fail(message.clone());
                return Err(BuildError::Task(message).into());
            }
        };

        let (output, elapsed) = match built {
            Ok(built) => built,
            Err(e) => {
                self.fail(describe(&e));
                return Ok(None);
            }
        };

        let output = Arc::new(output);
        let previous = self.state.snapshot();
        self.state.sink.commit(Arc::clone(&output))?;
        let duration_ms = elapsed.as_millis() as u64;
        self.state.complete_build(duration_ms);

        let event = update_event(&output, previous.as_deref());
        if let DevEvent::Update { artifacts, modules, .. } = &event {
            ui::success(&format!(
                "Built generation {} in {} ({} changed files, {} hot modules)",
                output.manifest.generation,
                ui::format_duration(elapsed),
                artifacts.len(),
                modules.len()
            ));
        }
        self.state.broadcast(&event);
        Ok(Some(output))
    }

    fn fail(&self, error: String) {
        ui::error(&format!("Build failed: {}", error));
        self.state.fail_build(error.clone());
        let html = error_overlay(&error);
        self.state.broadcast(&DevEvent::BuildFailed { error, html });
    }

    fn display(&self, change: &FileChange) -> String {
        change
            .path()
            .strip_prefix(&self.pipeline.config().root)
            .unwrap_or(change.path())
            .display()
            .to_string()
    }
}

/// Update pushed after `output` is committed over `previous`.
pub fn update_event(output: &BuildOutput, previous: Option<&BuildOutput>) -> DevEvent {
    let diff = output.diff(previous.unwrap_or(&BuildOutput::default()));
    let modules: BTreeMap<_, _> = diff
        .modules
        .iter()
        .filter_map(|id| {
            output
                .hot_modules
                .get(id)
                .map(|module| (id.clone(), module.clone()))
        })
        .collect();
    DevEvent::Update {
        generation: output.manifest.generation,
        artifacts: diff.artifacts,
        modules,
    }
}

/// Error text with the diagnostic's help line, without terminal styling.
fn describe(error: &kiln_bundler::Error) -> String {
    match error.help() {
        Some(help) => format!("{}\n\nhelp: {}", error, help),
        None => error.to_string(),
    }
}
