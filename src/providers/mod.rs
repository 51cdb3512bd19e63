// src/providers/mod.rs

use crate::config::{AppConfig, BackendConfig};
use crate::errors::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub mod openai;
pub mod replicate;

pub use openai::OpenAIClient;
pub use replicate::ReplicateClient;

/// Backend-issued reference to a submitted grading job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle {
    pub id: String,
}

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// What a single poll observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Succeeded(String),
    Failed(String),
}

/// A backend that grades one document per job.
///
/// Implementations must not block the executor while a job is outstanding:
/// the coordinator polls many handles concurrently from one task.
#[async_trait]
pub trait GradingJobClient: Send + Sync {
    /// Submits `document_url` for grading against the rubric JSON.
    async fn submit(&self, document_url: &str, rubric_json: &str) -> Result<JobHandle>;

    /// Reports the current status of a previously submitted job.
    async fn poll(&self, handle: &JobHandle) -> Result<JobStatus>;

    /// Abandons a job the coordinator stopped waiting for.
    ///
    /// Backends that hold nothing per job can rely on the default.
    async fn cancel(&self, _handle: &JobHandle) -> Result<()> {
        Ok(())
    }
}

/// Builds the configured backend.
pub fn from_config(config: &AppConfig, client: reqwest::Client) -> Arc<dyn GradingJobClient> {
    match &config.backend {
        BackendConfig::Replicate(replicate) => {
            Arc::new(ReplicateClient::new(client, replicate.clone()))
        }
        BackendConfig::OpenAI(openai) => Arc::new(OpenAIClient::new(client, openai.clone())),
    }
}
