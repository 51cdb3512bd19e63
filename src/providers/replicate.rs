// src/providers/replicate.rs

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ReplicateConfig;
use crate::documents;
use crate::errors::{GradingError, Result};
use crate::prompt;
use crate::providers::{GradingJobClient, JobHandle, JobStatus};

/// Grades documents through Replicate's asynchronous predictions API.
pub struct ReplicateClient {
    client: Client,
    config: ReplicateConfig,
}

#[derive(Serialize)]
struct PredictionRequest<'a> {
    version: &'a str,
    input: PredictionInput<'a>,
}

#[derive(Serialize)]
struct PredictionInput<'a> {
    prompt: &'a str,
    system_prompt: &'a str,
    max_new_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl ReplicateClient {
    /// Creates a new `ReplicateClient`.
    pub fn new(client: Client, config: ReplicateConfig) -> Self {
        Self { client, config }
    }

    fn predictions_url(&self) -> String {
        format!("{}/v1/predictions", self.config.api_base.trim_end_matches('/'))
    }

    async fn read_prediction(resp: reqwest::Response) -> Result<Prediction> {
        let status = resp.status();
        if !status.is_success() {
            let error_body = resp
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error body".to_string());
            return Err(GradingError::ApiError {
                status: status.as_u16(),
                body: error_body,
            });
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl GradingJobClient for ReplicateClient {
    async fn submit(&self, document_url: &str, rubric_json: &str) -> Result<JobHandle> {
        let essay = documents::fetch_text(&self.client, document_url).await?;
        let user_prompt = prompt::grading_prompt(rubric_json, &essay);

        let url = self.predictions_url();
        log::info!("📡 Submitting {} to Replicate: {}", document_url, url);

        let body = PredictionRequest {
            version: &self.config.model_version,
            input: PredictionInput {
                prompt: &user_prompt,
                system_prompt: prompt::SYSTEM_INSTRUCTION,
                max_new_tokens: 2048,
                temperature: 0.2,
            },
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_token)
            .json(&body)
            .send()
            .await?;

        let prediction = Self::read_prediction(resp).await?;
        log::debug!("📥 Prediction {} created ({})", prediction.id, prediction.status);
        Ok(JobHandle::new(prediction.id))
    }

    async fn poll(&self, handle: &JobHandle) -> Result<JobStatus> {
        let url = format!("{}/{}", self.predictions_url(), handle.id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_token)
            .send()
            .await?;

        let prediction = Self::read_prediction(resp).await?;
        prediction_status(prediction)
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<()> {
        let url = format!("{}/{}/cancel", self.predictions_url(), handle.id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_token)
            .send()
            .await?;

        let prediction = Self::read_prediction(resp).await?;
        log::debug!("🛑 Prediction {} cancel requested ({})", prediction.id, prediction.status);
        Ok(())
    }
}

fn prediction_status(prediction: Prediction) -> Result<JobStatus> {
    match prediction.status.as_str() {
        "starting" | "processing" => Ok(JobStatus::Pending),
        "succeeded" => {
            let output = match prediction.output {
                Some(Value::Array(tokens)) => tokens
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<String>(),
                Some(Value::String(text)) => text,
                _ => String::new(),
            };
            if output.is_empty() {
                return Err(GradingError::EmptyResponse);
            }
            Ok(JobStatus::Succeeded(output))
        }
        "failed" | "canceled" => {
            let reason = match prediction.error {
                Some(Value::String(msg)) => msg,
                Some(other) => other.to_string(),
                None => format!("prediction {}", prediction.status),
            };
            Ok(JobStatus::Failed(reason))
        }
        other => Err(GradingError::UnexpectedResponse(format!(
            "unknown prediction status '{}'",
            other
        ))),
    }
}
