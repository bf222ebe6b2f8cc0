//! Write-only channel every compiler sends its output through.
//!
//! Compilers enqueue [`SinkCommand`]s on a [`Sink`]; a single [`SinkWriter`]
//! task drains them in arrival order, applies them to the store and records
//! each written key in the job's tracking set.

pub mod redis_store;
pub mod store;

use crate::error::{CompileError, CompileResult};
use crate::sink::store::KeyValueStore;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCommand {
    Set { key: String, value: Vec<u8> },
    HashSet { key: String, field: String, value: Vec<u8> },
    SetAdd { key: String, member: String },
}

impl SinkCommand {
    pub fn set(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        SinkCommand::Set { key: key.into(), value: value.into() }
    }

    pub fn hash_set(key: impl Into<String>, field: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        SinkCommand::HashSet { key: key.into(), field: field.into(), value: value.into() }
    }

    pub fn set_add(key: impl Into<String>, member: impl Into<String>) -> Self {
        SinkCommand::SetAdd { key: key.into(), member: member.into() }
    }

    pub fn key(&self) -> &str {
        match self {
            SinkCommand::Set { key, .. } | SinkCommand::HashSet { key, .. } | SinkCommand::SetAdd { key, .. } => key,
        }
    }

    pub async fn apply(&self, store: &dyn KeyValueStore) -> anyhow::Result<()> {
        match self {
            SinkCommand::Set { key, value } => store.set(key, value).await,
            SinkCommand::HashSet { key, field, value } => store.hset(key, field, value).await,
            SinkCommand::SetAdd { key, member } => store.sadd(key, member).await,
        }
    }
}

/// Producer handle. Cheap to clone; the writer stops once every clone is gone.
#[derive(Clone)]
pub struct Sink {
    tx: mpsc::Sender<SinkCommand>,
}

impl Sink {
    /// Enqueues one command, waiting if the writer is backed up.
    pub async fn write(&self, command: SinkCommand) -> CompileResult<()> {
        self.tx
            .send(command)
            .await
            .map_err(|e| CompileError::SinkClosed(e.0.key().to_string()))
    }
}

/// Where the writer records the keys it has written, and which keys it
/// leaves out so they survive the next republish.
#[derive(Debug, Clone)]
pub struct KeyTracker {
    pub tracking_key: String,
    pub ignore: HashSet<String>,
}

impl KeyTracker {
    pub fn new(tracking_key: impl Into<String>, ignore: impl IntoIterator<Item = String>) -> Self {
        Self { tracking_key: tracking_key.into(), ignore: ignore.into_iter().collect() }
    }

    fn should_track(&self, key: &str) -> bool {
        key != self.tracking_key && !self.ignore.contains(key)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub commands: usize,
    pub tracked_keys: usize,
}

pub struct SinkWriter {
    handle: JoinHandle<CompileResult<WriteReport>>,
}

impl SinkWriter {
    /// Waits for the writer to flush everything that was enqueued. Drop every
    /// [`Sink`] clone first, otherwise this never returns.
    pub async fn finish(self) -> CompileResult<WriteReport> {
        self.handle.await?
    }
}

/// Spawns the serialized writer and returns the producer handle for it.
pub fn channel(store: Arc<dyn KeyValueStore>, tracker: Option<KeyTracker>, buffer: usize) -> (Sink, SinkWriter) {
    let (tx, mut rx) = mpsc::channel::<SinkCommand>(buffer.max(1));

    let handle = tokio::spawn(async move {
        let mut report = WriteReport::default();
        let mut tracked: HashSet<String> = HashSet::new();

        while let Some(command) = rx.recv().await {
            let key = command.key().to_string();
            if let Err(e) = command.apply(store.as_ref()).await {
                error!(key = %key, error = ?e, "Sink write failed");
                return Err(CompileError::SinkWrite { key, message: format!("{:#}", e) });
            }
            report.commands += 1;

            if let Some(tracker) = &tracker {
                if tracker.should_track(&key) && !tracked.contains(&key) {
                    if let Err(e) = store.sadd(&tracker.tracking_key, &key).await {
                        error!(key = %tracker.tracking_key, error = ?e, "Failed to track written key");
                        return Err(CompileError::SinkWrite {
                            key: tracker.tracking_key.clone(),
                            message: format!("{:#}", e),
                        });
                    }
                    tracked.insert(key);
                    report.tracked_keys += 1;
                }
            }
        }

        debug!(commands = report.commands, tracked = report.tracked_keys, "Sink drained");
        Ok(report)
    });

    (Sink { tx }, SinkWriter { handle })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::store::MemoryStore;

    #[tokio::test]
    async fn test_writer_applies_in_order_and_tracks() {
        let store = Arc::new(MemoryStore::new());
        let tracker = KeyTracker::new("compiled:p:keys", vec!["compiled:p:metadata".to_string()]);
        let (sink, writer) = channel(store.clone(), Some(tracker), 4);

        sink.write(SinkCommand::set("a", b"1".to_vec())).await.unwrap();
        sink.write(SinkCommand::hash_set("compiled:p:metadata", "title", b"t".to_vec())).await.unwrap();
        sink.write(SinkCommand::hash_set("h", "x", b"2".to_vec())).await.unwrap();
        sink.write(SinkCommand::hash_set("h", "y", b"3".to_vec())).await.unwrap();
        sink.write(SinkCommand::set_add("s", "m")).await.unwrap();
        drop(sink);

        let report = writer.finish().await.unwrap();
        assert_eq!(report.commands, 5);
        assert_eq!(report.tracked_keys, 3);

        let mut tracked = store.smembers("compiled:p:keys").await.unwrap();
        tracked.sort();
        assert_eq!(tracked, vec!["a", "h", "s"]);

        let order: Vec<String> = store
            .write_log()
            .into_iter()
            .filter(|r| r.key != "compiled:p:keys")
            .map(|r| r.key)
            .collect();
        assert_eq!(order, vec!["a", "compiled:p:metadata", "h", "h", "s"]);
    }

    #[tokio::test]
    async fn test_write_after_writer_stopped_is_an_error() {
        let store = Arc::new(MemoryStore::new());
        store.set("taken", b"x").await.unwrap();
        let (sink, writer) = channel(store, None, 1);

        // hset on a string key fails and stops the writer
        sink.write(SinkCommand::hash_set("taken", "f", b"1".to_vec())).await.unwrap();
        let err = writer.finish().await.unwrap_err();
        assert!(matches!(err, CompileError::SinkWrite { ref key, .. } if key == "taken"));

        let err = sink.write(SinkCommand::set("late", b"1".to_vec())).await.unwrap_err();
        assert!(matches!(err, CompileError::SinkClosed(key) if key == "late"));
    }
}
