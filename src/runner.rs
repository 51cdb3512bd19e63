// src/runner.rs
use crate::config::GradingSettings;
use crate::database::RecordStore;
use crate::errors::{FailureReason, GradingError, Result};
use crate::models::{
    BatchResult, BatchStatus, DocumentFailure, DocumentOutcome, DocumentSuccess, Grade, GradingJob,
    GradingRubric, NewGrade,
};
use crate::parser;
use crate::providers::{GradingJobClient, JobHandle, JobStatus};
use async_trait::async_trait;
use futures::future;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

/// Body of a start-batch call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBatchRequest {
    pub batch_name: String,
    pub rubric_id: String,
    pub selected_files: Vec<String>,
    pub user_id: String,
}

/// Receives each document's outcome the moment it is decided.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn document_finished(&self, batch_id: &str, outcome: &DocumentOutcome);
}

/// Discards progress.
pub struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn document_finished(&self, _batch_id: &str, _outcome: &DocumentOutcome) {}
}

/// A document that failed at a known pipeline stage.
struct StageFailure {
    reason: FailureReason,
    error: GradingError,
}

impl StageFailure {
    fn new(reason: FailureReason, error: GradingError) -> Self {
        Self { reason, error }
    }
}

/// Grades every document of a batch against one rubric.
///
/// Documents are graded concurrently and independently; one document failing
/// never cancels its siblings. The run returns once every document has reached
/// a terminal outcome or the batch deadline has passed.
#[derive(Clone)]
pub struct BatchGradingCoordinator {
    client: Arc<dyn GradingJobClient>,
    store: Arc<dyn RecordStore>,
    settings: GradingSettings,
}

impl BatchGradingCoordinator {
    pub fn new(
        client: Arc<dyn GradingJobClient>,
        store: Arc<dyn RecordStore>,
        settings: GradingSettings,
    ) -> Self {
        Self {
            client,
            store,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    async fn load_rubric(&self, rubric_id: &str) -> Result<GradingRubric> {
        self.store
            .get_rubric(rubric_id)
            .await?
            .ok_or_else(|| GradingError::RubricNotFound(rubric_id.to_string()))
    }

    /// Creates the batch record, grades it, and records the final status.
    ///
    /// Preconditions are checked before anything is written.
    pub async fn start_batch(&self, request: StartBatchRequest) -> Result<BatchResult> {
        self.start_batch_with_progress(request, &NoProgress).await
    }

    /// [`start_batch`](Self::start_batch) that reports each document to `progress` as it finishes.
    pub async fn start_batch_with_progress(
        &self,
        request: StartBatchRequest,
        progress: &dyn ProgressSink,
    ) -> Result<BatchResult> {
        if request.selected_files.is_empty() {
            return Err(GradingError::EmptyBatch);
        }
        self.load_rubric(&request.rubric_id).await?;

        let batch = self
            .store
            .create_batch(
                &request.user_id,
                &request.batch_name,
                &request.rubric_id,
                &request.selected_files,
            )
            .await?;
        self.store
            .update_batch(&batch.id, &batch.file_urls, BatchStatus::Processing)
            .await?;

        let run = self
            .run_batch_with_progress(
                &batch.id,
                &request.rubric_id,
                &request.selected_files,
                &request.user_id,
                progress,
            )
            .await;

        let status = match &run {
            Ok(result) => result.status(),
            Err(_) => BatchStatus::Failed,
        };
        if let Err(e) = self
            .store
            .update_batch(&batch.id, &batch.file_urls, status)
            .await
        {
            log::error!("Failed to record status {} for batch {}: {}", status.as_str(), batch.id, e);
        }

        run
    }

    /// Grades `document_urls` under `batch_id` and persists one grade per success.
    pub async fn run_batch(
        &self,
        batch_id: &str,
        rubric_id: &str,
        document_urls: &[String],
        user_id: &str,
    ) -> Result<BatchResult> {
        self.run_batch_with_progress(batch_id, rubric_id, document_urls, user_id, &NoProgress)
            .await
    }

    /// [`run_batch`](Self::run_batch) that reports each document to `progress` as it finishes.
    pub async fn run_batch_with_progress(
        &self,
        batch_id: &str,
        rubric_id: &str,
        document_urls: &[String],
        user_id: &str,
        progress: &dyn ProgressSink,
    ) -> Result<BatchResult> {
        if document_urls.is_empty() {
            return Err(GradingError::EmptyBatch);
        }
        let rubric = self.load_rubric(rubric_id).await?;
        let rubric_json = rubric.to_prompt_json()?;

        let batch_start = Instant::now();
        // A deadline too far out to represent is no deadline at all.
        let deadline = self
            .settings
            .batch_deadline()
            .and_then(|d| tokio::time::Instant::now().checked_add(d));

        log::info!(
            "📦 Batch {}: grading {} document(s) against rubric '{}'",
            batch_id,
            document_urls.len(),
            rubric.title
        );

        let futures: Vec<_> = document_urls
            .iter()
            .map(|url| {
                let rubric = &rubric;
                let rubric_json = &rubric_json;
                async move {
                    let submitted = OnceLock::new();
                    let pipeline = self.grade_document(
                        url,
                        rubric,
                        rubric_json,
                        user_id,
                        Some(batch_id),
                        &submitted,
                    );
                    let outcome = match deadline {
                        Some(at) => match tokio::time::timeout_at(at, pipeline).await {
                            Ok(outcome) => outcome,
                            Err(_) => {
                                if let Some(handle) = submitted.get() {
                                    self.cancel_job(handle).await;
                                }
                                Err(StageFailure::new(
                                    FailureReason::BatchTimeout,
                                    GradingError::BatchTimeout,
                                ))
                            }
                        },
                        None => pipeline.await,
                    };

                    let outcome = document_outcome(url, outcome);
                    progress.document_finished(batch_id, &outcome).await;
                    outcome
                }
            })
            .collect();

        let result = BatchResult::from_outcomes(batch_id, future::join_all(futures).await);

        log::info!(
            "📊 Batch {} finished in {}ms: {} succeeded, {} failed",
            batch_id,
            batch_start.elapsed().as_millis(),
            result.succeeded.len(),
            result.failed.len()
        );

        Ok(result)
    }

    /// Grades a single document outside of any batch.
    pub async fn grade_essay(&self, rubric_id: &str, document_url: &str, user_id: &str) -> Result<Grade> {
        let rubric = self.load_rubric(rubric_id).await?;
        let rubric_json = rubric.to_prompt_json()?;
        self.grade_document(document_url, &rubric, &rubric_json, user_id, None, &OnceLock::new())
            .await
            .map_err(|failure| failure.error)
    }

    /// submit -> poll -> parse -> persist for one document.
    ///
    /// The backend handle is stored in `submitted` so a caller that abandons
    /// this future can still cancel the job.
    async fn grade_document(
        &self,
        document_url: &str,
        rubric: &GradingRubric,
        rubric_json: &str,
        user_id: &str,
        batch_id: Option<&str>,
        submitted: &OnceLock<JobHandle>,
    ) -> std::result::Result<Grade, StageFailure> {
        let handle = self
            .client
            .submit(document_url, rubric_json)
            .await
            .map_err(|e| {
                let error = match e {
                    GradingError::Submission(_) => e,
                    other => GradingError::Submission(other.to_string()),
                };
                StageFailure::new(FailureReason::SubmissionError, error)
            })?;
        let _ = submitted.set(handle.clone());

        let mut job = GradingJob::submitted(
            handle.id.clone(),
            document_url,
            rubric.id.clone(),
            batch_id.map(str::to_string),
        );
        log::debug!("job {} submitted for {}", job.id, document_url);

        let raw_output = self.await_terminal(&mut job, &handle).await?;

        let parsed = parser::parse_grade_output(&raw_output)
            .map_err(|e| StageFailure::new(FailureReason::MalformedResultError, e))?;

        let new_grade = NewGrade::from_parsed(&parsed, user_id, &rubric.id, batch_id, document_url)
            .map_err(|e| {
                StageFailure::new(FailureReason::PersistenceError, GradingError::Persistence(e.to_string()))
            })?;

        self.store.create_grade(new_grade).await.map_err(|e| {
            StageFailure::new(FailureReason::PersistenceError, GradingError::Persistence(e.to_string()))
        })
    }

    /// Polls until the job reaches a terminal state or the per-job bound passes.
    async fn await_terminal(
        &self,
        job: &mut GradingJob,
        handle: &JobHandle,
    ) -> std::result::Result<String, StageFailure> {
        let job_timeout = self.settings.job_timeout();
        let started = Instant::now();

        job.begin_polling()
            .map_err(|e| StageFailure::new(FailureReason::JobFailed, e))?;

        let polled = tokio::time::timeout(job_timeout, self.poll_until_terminal(handle)).await;

        match polled {
            Ok(Ok(raw_output)) => {
                job.succeed(raw_output.clone())
                    .map_err(|e| StageFailure::new(FailureReason::JobFailed, e))?;
                Ok(raw_output)
            }
            Ok(Err(error)) => {
                let _ = job.fail(error.to_string());
                Err(StageFailure::new(FailureReason::JobFailed, error))
            }
            Err(_) => {
                let error = GradingError::JobTimeout {
                    job_id: job.id.clone(),
                    waited_ms: elapsed_ms(started.elapsed()),
                };
                let _ = job.fail(error.to_string());
                self.cancel_job(handle).await;
                Err(StageFailure::new(FailureReason::JobTimeout, error))
            }
        }
    }

    async fn cancel_job(&self, handle: &JobHandle) {
        if let Err(e) = self.client.cancel(handle).await {
            log::warn!("⚠️  Could not cancel job {}: {}", handle.id, e);
        }
    }

    async fn poll_until_terminal(&self, handle: &JobHandle) -> Result<String> {
        let mut ticker = tokio::time::interval(self.settings.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.client.poll(handle).await? {
                JobStatus::Pending => continue,
                JobStatus::Succeeded(raw_output) => return Ok(raw_output),
                JobStatus::Failed(reason) => return Err(GradingError::JobFailed(reason)),
            }
        }
    }
}

fn document_outcome(url: &str, outcome: std::result::Result<Grade, StageFailure>) -> DocumentOutcome {
    match outcome {
        Ok(grade) => {
            log::info!("✅ {} graded {} (grade {})", url, grade.score, grade.id);
            DocumentOutcome::Graded(DocumentSuccess {
                document_url: url.to_string(),
                grade_id: grade.id,
            })
        }
        Err(failure) => {
            log::warn!("❌ {} failed with {}: {}", url, failure.reason, failure.error);
            DocumentOutcome::Failed(DocumentFailure {
                document_url: url.to_string(),
                reason: failure.reason,
                message: failure.error.to_string(),
            })
        }
    }
}

fn elapsed_ms(elapsed: Duration) -> u64 {
    elapsed.as_millis().min(u64::MAX as u128) as u64
}
