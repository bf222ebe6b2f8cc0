use crate::compiler::graph::{DialogGraph, DialogNode};
use crate::compiler::logic::compile_logic_block;
use crate::error::{CompileError, CompileResult};
use crate::keys::{self, UNKNOWN_INPUT_SENTINEL};
use crate::model::ProjectItem;
use crate::sink::{Sink, SinkCommand};
use crate::training::{Dataset, Trainer, TrainingPolicy};
use dashmap::DashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DialogOptions {
    /// Dialog nodes whose own work may run at the same time
    pub max_concurrency: usize,
    pub trainer: Option<Arc<dyn Trainer>>,
    pub training_policy: TrainingPolicy,
}

impl Default for DialogOptions {
    fn default() -> Self {
        Self { max_concurrency: 64, trainer: None, training_policy: TrainingPolicy::BestEffort }
    }
}

/// State shared by every node task of one compile job.
struct DialogJob {
    graph: Arc<DialogGraph>,
    sink: Sink,
    publish_id: String,
    processed: DashSet<Uuid>,
    limiter: Semaphore,
    trainer: Option<Arc<dyn Trainer>>,
    training_policy: TrainingPolicy,
}

type NodeFuture = Pin<Box<dyn Future<Output = CompileResult<()>> + Send>>;

/// Builds the dialog graph from `items` and compiles every node into `sink`.
///
/// Nodes are reached from the roots; nodes no root leads to are compiled
/// afterwards so every node still gets exactly one record.
pub async fn compile_dialog(
    items: &[ProjectItem],
    sink: Sink,
    publish_id: &str,
    options: DialogOptions,
) -> CompileResult<Arc<DialogGraph>> {
    let graph = Arc::new(DialogGraph::build(items)?);
    info!(publish_id, nodes = graph.len(), roots = graph.roots().len(), "Dialog graph built");
    if graph.is_empty() {
        debug!(publish_id, "Project has no dialog nodes");
        return Ok(graph);
    }

    let job = Arc::new(DialogJob {
        graph: graph.clone(),
        sink,
        publish_id: publish_id.to_string(),
        processed: DashSet::new(),
        limiter: Semaphore::new(options.max_concurrency.max(1)),
        trainer: options.trainer,
        training_policy: options.training_policy,
    });

    let mut tasks: JoinSet<CompileResult<()>> = JoinSet::new();
    for (actor_id, roots) in graph.roots_by_actor() {
        let job = job.clone();
        tasks.spawn(async move { job.train(actor_id, None, &roots).await });
    }
    for root in graph.roots() {
        tasks.spawn(compile_node(job.clone(), *root));
    }
    drain(&mut tasks).await?;

    let orphans: Vec<Uuid> = graph.ids().iter().copied().filter(|id| !job.processed.contains(id)).collect();
    if !orphans.is_empty() {
        warn!(publish_id, count = orphans.len(), "Dialog nodes unreachable from any root");
        for id in orphans {
            tasks.spawn(compile_node(job.clone(), id));
        }
        drain(&mut tasks).await?;
    }

    Ok(graph)
}

async fn drain(tasks: &mut JoinSet<CompileResult<()>>) -> CompileResult<()> {
    while let Some(joined) = tasks.join_next().await {
        joined??;
    }
    Ok(())
}

/// Compiles `node_id` and everything below it. Re-entry for a node that
/// another parent already scheduled returns immediately.
fn compile_node(job: Arc<DialogJob>, node_id: Uuid) -> NodeFuture {
    Box::pin(async move {
        if !job.processed.insert(node_id) {
            return Ok(());
        }
        let node = job.graph.node(&node_id)?;

        {
            let _permit = job
                .limiter
                .acquire()
                .await
                .map_err(|e| CompileError::Task(e.to_string()))?;
            job.compile_own(node).await?;
        }

        if !node.has_children() {
            return Ok(());
        }

        let mut tasks: JoinSet<CompileResult<()>> = JoinSet::new();
        {
            let job = job.clone();
            tasks.spawn(async move {
                let node = job.graph.node(&node_id)?;
                job.train(node.actor_id, Some(node_id), &node.child_nodes).await
            });
        }
        for child in &node.child_nodes {
            tasks.spawn(compile_node(job.clone(), *child));
        }
        drain(&mut tasks).await
    })
}

impl DialogJob {
    /// Bundles, record, then lookup entries, in that order.
    async fn compile_own(&self, node: &DialogNode) -> CompileResult<()> {
        let logic = compile_logic_block(&self.sink, &self.publish_id, &node.id.to_string(), &node.logic).await?;

        let mut record = Vec::with_capacity(1 + logic.len());
        // 0: the dialog ends here, 1: it continues
        record.push(u8::from(node.has_children()));
        record.extend(logic);

        let compiled_key = keys::compiled_dialog_node(&self.publish_id, node.id);
        self.sink.write(SinkCommand::set(compiled_key.clone(), record)).await?;

        let phrases: Vec<&str> = if node.unknown_handler {
            vec![UNKNOWN_INPUT_SENTINEL]
        } else {
            node.entry_input.iter().map(String::as_str).collect()
        };

        for phrase in phrases {
            if node.is_root {
                let table = keys::dialog_root_within_actor(&self.publish_id, node.actor_id);
                self.sink.write(SinkCommand::hash_set(table, phrase, compiled_key.clone())).await?;
            }
            for parent in &node.parent_nodes {
                let table = keys::dialog_node_children(&self.publish_id, parent);
                self.sink.write(SinkCommand::hash_set(table, phrase, compiled_key.clone())).await?;
            }
        }

        debug!(node_id = %node.id, "Dialog node compiled");
        Ok(())
    }

    /// Trains the sibling set `node_ids`: the roots of an actor when `parent`
    /// is `None`, otherwise the children of `parent`.
    async fn train(&self, actor_id: Uuid, parent: Option<Uuid>, node_ids: &[Uuid]) -> CompileResult<()> {
        let Some(trainer) = &self.trainer else {
            return Ok(());
        };

        let key = match parent {
            None => keys::trained_roots(&self.publish_id, actor_id),
            Some(parent) => keys::trained_children(&self.publish_id, actor_id, parent),
        };

        let nodes = node_ids.iter().map(|id| self.graph.node(id)).collect::<CompileResult<Vec<_>>>()?;
        let dataset = Dataset::for_nodes(&self.publish_id, nodes);

        match trainer.train(&dataset).await {
            Ok(trained) => self.sink.write(SinkCommand::set(key, trained)).await,
            Err(e) => match self.training_policy {
                TrainingPolicy::BestEffort => {
                    warn!(key = %key, error = ?e, "Training failed, continuing without it");
                    Ok(())
                }
                TrainingPolicy::FailJob => Err(CompileError::Training { key, message: format!("{:#}", e) }),
            },
        }
    }
}
