// src/providers/openai.rs

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinHandle;

use crate::config::OpenAIConfig;
use crate::documents;
use crate::errors::{GradingError, Result};
use crate::prompt;
use crate::providers::{GradingJobClient, JobHandle, JobStatus};

/// Grades documents through an OpenAI-compatible chat completions endpoint.
///
/// Chat completions are synchronous, so each submission runs as a background
/// task and `poll` reports on that task.
pub struct OpenAIClient {
    client: Client,
    config: OpenAIConfig,
    jobs: Arc<Mutex<HashMap<String, JoinHandle<Result<String>>>>>,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    content: Option<String>,
}

impl OpenAIClient {
    /// Creates a new `OpenAIClient`.
    pub fn new(client: Client, config: OpenAIConfig) -> Self {
        Self {
            client,
            config,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Runs one chat completion and returns the model's text.
async fn complete(client: Client, config: OpenAIConfig, user_prompt: String) -> Result<String> {
    let url = format!("{}/chat/completions", config.api_base.trim_end_matches('/'));

    log::info!("📡 Calling OpenAI: {} with model: {}", url, config.model);

    let body = OpenAIRequest {
        model: &config.model,
        messages: vec![
            Message {
                role: "system",
                content: prompt::SYSTEM_INSTRUCTION,
            },
            Message {
                role: "user",
                content: &user_prompt,
            },
        ],
        temperature: 0.2,
    };

    let start = Instant::now();

    let resp = client
        .post(&url)
        .bearer_auth(&config.api_key)
        .json(&body)
        .send()
        .await?;

    let status = resp.status();
    let latency_ms = start.elapsed().as_millis() as u64;

    log::info!("📥 OpenAI response status: {} ({}ms)", status, latency_ms);

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

    let openai_resp: OpenAIResponse = resp.json().await?;

    let output = openai_resp
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| GradingError::UnexpectedResponse("No choices in response".to_string()))?;

    if output.is_empty() {
        return Err(GradingError::EmptyResponse);
    }

    Ok(output)
}

#[async_trait]
impl GradingJobClient for OpenAIClient {
    async fn submit(&self, document_url: &str, rubric_json: &str) -> Result<JobHandle> {
        let essay = documents::fetch_text(&self.client, document_url).await?;
        let user_prompt = prompt::grading_prompt(rubric_json, &essay);

        let id = uuid::Uuid::new_v4().to_string();
        let task = tokio::spawn(complete(self.client.clone(), self.config.clone(), user_prompt));

        self.jobs
            .lock()
            .map_err(|_| GradingError::Submission("job table poisoned".to_string()))?
            .insert(id.clone(), task);

        Ok(JobHandle::new(id))
    }

    async fn poll(&self, handle: &JobHandle) -> Result<JobStatus> {
        let finished = {
            let mut jobs = self
                .jobs
                .lock()
                .map_err(|_| GradingError::JobFailed("job table poisoned".to_string()))?;
            let done = match jobs.get(&handle.id) {
                None => return Ok(JobStatus::Failed("unknown job".to_string())),
                Some(task) => task.is_finished(),
            };
            if !done {
                return Ok(JobStatus::Pending);
            }
            jobs.remove(&handle.id)
        };

        let Some(task) = finished else {
            return Ok(JobStatus::Failed("unknown job".to_string()));
        };

        match task.await {
            Ok(Ok(output)) => Ok(JobStatus::Succeeded(output)),
            Ok(Err(e)) => Ok(JobStatus::Failed(e.to_string())),
            Err(join_err) => Ok(JobStatus::Failed(format!("completion task aborted: {}", join_err))),
        }
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<()> {
        let task = self
            .jobs
            .lock()
            .map_err(|_| GradingError::JobFailed("job table poisoned".to_string()))?
            .remove(&handle.id);
        if let Some(task) = task {
            task.abort();
            log::debug!("aborted completion task {}", handle.id);
        }
        Ok(())
    }
}

impl Drop for OpenAIClient {
    fn drop(&mut self) {
        if let Ok(jobs) = self.jobs.lock() {
            for task in jobs.values() {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAIClient {
        OpenAIClient::new(
            Client::new(),
            OpenAIConfig {
                api_base: "http://127.0.0.1:9".to_string(),
                api_key: "test".to_string(),
                model: "gpt-test".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_unknown_handle_reports_failed() {
        let status = client().poll(&JobHandle::new("missing")).await.unwrap();
        assert_eq!(status, JobStatus::Failed("unknown job".to_string()));
    }

    #[tokio::test]
    async fn test_finished_task_is_collected_once() {
        let openai = client();
        let task = tokio::spawn(async { Ok::<_, GradingError>("<finalScore>1/1</finalScore>".to_string()) });
        while !task.is_finished() {
            tokio::task::yield_now().await;
        }
        openai.jobs.lock().unwrap().insert("j1".to_string(), task);

        let handle = JobHandle::new("j1");
        assert_eq!(
            openai.poll(&handle).await.unwrap(),
            JobStatus::Succeeded("<finalScore>1/1</finalScore>".to_string())
        );
        assert_eq!(
            openai.poll(&handle).await.unwrap(),
            JobStatus::Failed("unknown job".to_string())
        );
    }

    #[tokio::test]
    async fn test_cancel_drops_pending_task() {
        let openai = client();
        let task = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            Ok::<_, GradingError>(String::new())
        });
        openai.jobs.lock().unwrap().insert("slow".to_string(), task);

        let handle = JobHandle::new("slow");
        assert_eq!(openai.poll(&handle).await.unwrap(), JobStatus::Pending);

        openai.cancel(&handle).await.unwrap();
        assert!(openai.jobs.lock().unwrap().is_empty());
        assert_eq!(
            openai.poll(&handle).await.unwrap(),
            JobStatus::Failed("unknown job".to_string())
        );

        // Unknown handles are a no-op.
        openai.cancel(&JobHandle::new("missing")).await.unwrap();
    }
}
