//! Intent-training side channel.
//!
//! For a set of sibling dialog nodes the compiler builds one training
//! dataset (one intent per node, one utterance per entry phrase), posts it to
//! the training service and stores the service's answer in the sink.

use crate::compiler::graph::DialogNode;
use crate::keys;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;

/// What a failed training request does to the publish job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingPolicy {
    /// Log the failure and keep compiling
    #[default]
    BestEffort,
    /// Fail the whole job
    FailJob,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtteranceChunk {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Utterance {
    pub data: Vec<UtteranceChunk>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Intent {
    pub utterances: Vec<Utterance>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub language: String,
    pub entities: BTreeMap<String, serde_json::Value>,
    /// Keyed by the compiled record key of the node the intent routes to
    pub intents: BTreeMap<String, Intent>,
}

impl Dataset {
    pub fn for_nodes<'a>(publish_id: &str, nodes: impl IntoIterator<Item = &'a DialogNode>) -> Self {
        let mut intents = BTreeMap::new();
        for node in nodes {
            // the catch-all node has no phrases to learn
            if node.unknown_handler {
                continue;
            }
            let utterances = node
                .entry_input
                .iter()
                .map(|phrase| Utterance { data: vec![UtteranceChunk { text: phrase.clone() }] })
                .collect();
            intents.insert(keys::compiled_dialog_node(publish_id, node.id), Intent { utterances });
        }

        Self { language: "en".to_string(), entities: BTreeMap::new(), intents }
    }
}

#[async_trait]
pub trait Trainer: Send + Sync + Debug {
    /// Submits a dataset and returns the trained artifact to store.
    async fn train(&self, dataset: &Dataset) -> Result<Vec<u8>>;
}

#[derive(Debug)]
pub struct HttpTrainer {
    client: Client,
    endpoint: String,
}

impl HttpTrainer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, endpoint: endpoint.into() })
    }
}

#[async_trait]
impl Trainer for HttpTrainer {
    async fn train(&self, dataset: &Dataset) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(dataset)
            .send()
            .await
            .with_context(|| format!("Training request to {} failed", self.endpoint))?
            .error_for_status()?;

        let body = response.bytes().await.context("Failed to read training response")?;
        Ok(body.to_vec())
    }
}
