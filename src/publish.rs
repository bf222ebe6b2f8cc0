//! Publish job orchestration.
//!
//! One job compiles one project version: it clears what the previous publish
//! of the same publish id left behind, runs the dialog, metadata, actor and
//! trigger compilers concurrently against a shared sink, and records the
//! outcome in the project's status key.

use crate::compiler::{DialogOptions, compile_actors, compile_dialog, compile_metadata, compile_triggers};
use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::keys;
use crate::loader::ProjectSource;
use crate::model::{PublishStatus, VersionedProject};
use crate::sink::store::KeyValueStore;
use crate::sink::{self, KeyTracker, Sink, WriteReport};
use crate::training::Trainer;
use anyhow::{Context, Result};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Version number preview compiles are read from.
pub const DEMO_VERSION: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishRequest {
    pub project_id: Uuid,
    pub version: i64,
    pub is_demo: bool,
}

impl PublishRequest {
    pub fn new(project_id: Uuid, version: i64) -> Self {
        Self { project_id, version, is_demo: false }
    }

    pub fn demo(project_id: Uuid) -> Self {
        Self { project_id, version: DEMO_VERSION, is_demo: true }
    }

    pub fn publish_id(&self) -> String {
        keys::publish_id(self.project_id, self.is_demo)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub publish_id: String,
    pub status: PublishStatus,
    /// Dialog nodes compiled
    pub nodes: usize,
    pub report: WriteReport,
    /// Unix time in nanoseconds
    pub published_at: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subsystem {
    Dialog,
    Metadata,
    Actor,
    Trigger,
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Subsystem::Dialog => "dialog",
            Subsystem::Metadata => "metadata",
            Subsystem::Actor => "actor",
            Subsystem::Trigger => "trigger",
        };
        f.write_str(name)
    }
}

pub struct Publisher {
    store: Arc<dyn KeyValueStore>,
    source: Arc<dyn ProjectSource>,
    trainer: Option<Arc<dyn Trainer>>,
    config: CompilerConfig,
}

impl Publisher {
    pub fn new(store: Arc<dyn KeyValueStore>, source: Arc<dyn ProjectSource>, config: CompilerConfig) -> Self {
        Self { store, source, trainer: None, config }
    }

    pub fn with_trainer(mut self, trainer: Arc<dyn Trainer>) -> Self {
        self.trainer = Some(trainer);
        self
    }

    /// Runs one publish job to completion. The status key always ends in a
    /// terminal state: Published or UnderReview on success, Problem on error.
    pub async fn publish(&self, request: PublishRequest) -> Result<PublishOutcome> {
        let publish_id = request.publish_id();
        info!(publish_id = %publish_id, version = request.version, demo = request.is_demo, "Publish started");

        self.set_status(&publish_id, PublishStatus::Publishing).await?;

        match self.run(&publish_id, request).await {
            Ok(mut outcome) => {
                let status = if self.config.require_review && !request.is_demo {
                    PublishStatus::UnderReview
                } else {
                    PublishStatus::Published
                };
                self.store
                    .set(&keys::project_pubtime(&publish_id), outcome.published_at.to_string().as_bytes())
                    .await
                    .context("Failed to write publish time")?;
                self.set_status(&publish_id, status).await?;
                outcome.status = status;
                info!(publish_id = %publish_id, nodes = outcome.nodes, writes = outcome.report.commands, "Publish finished");
                Ok(outcome)
            }
            Err(e) => {
                error!(publish_id = %publish_id, error = ?e, "Publish failed");
                if let Err(status_err) = self.set_status(&publish_id, PublishStatus::Problem).await {
                    warn!(publish_id = %publish_id, error = ?status_err, "Failed to record problem status");
                }
                Err(e)
            }
        }
    }

    async fn set_status(&self, publish_id: &str, status: PublishStatus) -> Result<()> {
        self.store
            .set(&keys::project_status(publish_id), status.code().to_string().as_bytes())
            .await
            .with_context(|| format!("Failed to set status of {}", publish_id))
    }

    async fn run(&self, publish_id: &str, request: PublishRequest) -> Result<PublishOutcome> {
        let snapshot = self
            .source
            .load_versioned(request.project_id, request.version)
            .await
            .with_context(|| format!("Failed to load project {} version {}", request.project_id, request.version))?;

        self.clear_previous(publish_id).await?;

        let tracker = KeyTracker::new(
            keys::tracked_keys(publish_id),
            [keys::global_projects(), keys::project_metadata(publish_id)],
        );
        let (sink, writer) = sink::channel(self.store.clone(), Some(tracker), self.config.sink_buffer);

        let compiled = self.compile_all(Arc::new(snapshot), publish_id, request, sink).await;

        // the writer's error explains a subsystem's SinkClosed, so it wins
        let report = writer.finish().await.context("Sink writer failed")?;
        let nodes = compiled?;

        let published_at = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or_default();
        Ok(PublishOutcome {
            publish_id: publish_id.to_string(),
            status: PublishStatus::Publishing,
            nodes,
            report,
            published_at,
        })
    }

    /// Deletes every key the previous publish of `publish_id` recorded.
    async fn clear_previous(&self, publish_id: &str) -> Result<()> {
        let tracking_key = keys::tracked_keys(publish_id);
        let previous = self
            .store
            .smembers(&tracking_key)
            .await
            .with_context(|| format!("Failed to read {}", tracking_key))?;

        if !previous.is_empty() {
            info!(publish_id, keys = previous.len(), "Clearing previous publish output");
            self.store.del(&previous).await.context("Failed to clear previous publish output")?;
        }
        self.store.del(&[tracking_key]).await.context("Failed to clear tracking set")?;
        Ok(())
    }

    /// Runs the four compilers. Consumes `sink` so every producer handle is
    /// gone once this returns. Returns the dialog node count.
    async fn compile_all(
        &self,
        snapshot: Arc<VersionedProject>,
        publish_id: &str,
        request: PublishRequest,
        sink: Sink,
    ) -> Result<usize> {
        let publish_id: Arc<str> = Arc::from(publish_id);
        let mut tasks: JoinSet<(Subsystem, Result<usize>)> = JoinSet::new();

        {
            let (sink, snapshot, publish_id) = (sink.clone(), snapshot.clone(), publish_id.clone());
            let options = DialogOptions {
                max_concurrency: self.config.max_concurrency,
                trainer: self.trainer.clone(),
                training_policy: self.config.training.failure_policy,
            };
            tasks.spawn(async move {
                let result = compile_dialog(&snapshot.project_data, sink, &publish_id, options)
                    .await
                    .map(|graph| graph.len());
                (Subsystem::Dialog, result.map_err(anyhow::Error::from))
            });
        }
        {
            let (sink, snapshot, publish_id) = (sink.clone(), snapshot.clone(), publish_id.clone());
            let source = self.source.clone();
            tasks.spawn(async move {
                let result = async {
                    let project = source.load_project(request.project_id).await?;
                    let writes = compile_metadata(
                        &sink,
                        &project,
                        &snapshot.project_data,
                        request.version,
                        &publish_id,
                        request.is_demo,
                    )
                    .await?;
                    Ok::<_, anyhow::Error>(writes)
                }
                .await;
                (Subsystem::Metadata, result)
            });
        }
        {
            let (sink, snapshot, publish_id) = (sink.clone(), snapshot.clone(), publish_id.clone());
            tasks.spawn(async move {
                let result = compile_actors(&sink, &snapshot.project_data, &publish_id).await;
                (Subsystem::Actor, result.map_err(anyhow::Error::from))
            });
        }
        {
            tasks.spawn(async move {
                let result = compile_triggers(&sink, &snapshot.trigger_data, &publish_id).await;
                (Subsystem::Trigger, result.map_err(anyhow::Error::from))
            });
        }

        let mut nodes = 0;
        while let Some(joined) = tasks.join_next().await {
            let (subsystem, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    tasks.abort_all();
                    drain_aborted(&mut tasks).await;
                    return Err(CompileError::from(e).into());
                }
            };

            match result {
                Ok(count) => {
                    info!(subsystem = %subsystem, count, "Subsystem compiled");
                    if subsystem == Subsystem::Dialog {
                        nodes = count;
                    }
                }
                Err(e) => {
                    tasks.abort_all();
                    drain_aborted(&mut tasks).await;
                    return Err(e.context(format!("{} compiler failed", subsystem)));
                }
            }
        }
        Ok(nodes)
    }
}

async fn drain_aborted(tasks: &mut JoinSet<(Subsystem, Result<usize>)>) {
    while tasks.join_next().await.is_some() {}
}
