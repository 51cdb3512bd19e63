// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use essay_grader::config::GradingSettings;
use essay_grader::database::{RecordStore, SqliteStore};
use essay_grader::errors::{GradingError, Result};
use essay_grader::models::{Criterion, GradingRubric, NewRubric};
use essay_grader::providers::{GradingJobClient, JobHandle, JobStatus};
use essay_grader::runner::BatchGradingCoordinator;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const VALID_OUTPUT: &str = r#"<finalScore>8/10</finalScore>
<overallFeedback>Clear thesis, evidence could go deeper.</overallFeedback>
<criteriaFeedback>{"Thesis": {"feedback": "Arguable and specific.", "score": "4/4"}, "Evidence": {"feedback": "Only one source.", "score": "4/6"}}</criteriaFeedback>"#;

pub const MISSING_SCORE_OUTPUT: &str =
    "<overallFeedback>Readable.</overallFeedback><criteriaFeedback>{}</criteriaFeedback>";

pub const BROKEN_CRITERIA_OUTPUT: &str = "<finalScore>5/10</finalScore><overallFeedback>Uneven.</overallFeedback><criteriaFeedback>Thesis - fine, Evidence - weak</criteriaFeedback>";

/// How the scripted backend treats one document.
#[derive(Clone)]
pub enum Script {
    /// Succeeds with `output` after `pending_polls` pending answers.
    Succeed { pending_polls: usize, output: String },
    /// Backend reports the job failed.
    Fail(String),
    /// Backend refuses the submission.
    Reject(String),
    /// Job stays pending forever.
    NeverFinish,
}

impl Script {
    pub fn ok(output: &str) -> Self {
        Script::Succeed {
            pending_polls: 2,
            output: output.to_string(),
        }
    }
}

/// In-process stand-in for the inference backend. The job handle is the document URL.
#[derive(Default)]
pub struct ScriptedClient {
    scripts: HashMap<String, Script>,
    polls: Mutex<HashMap<String, usize>>,
    pub submissions: AtomicUsize,
    cancelled: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new(scripts: Vec<(&str, Script)>) -> Self {
        Self {
            scripts: scripts
                .into_iter()
                .map(|(url, script)| (url.to_string(), script))
                .collect(),
            ..Default::default()
        }
    }

    pub fn submitted(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl GradingJobClient for ScriptedClient {
    async fn submit(&self, document_url: &str, rubric_json: &str) -> Result<JobHandle> {
        assert!(rubric_json.contains("criteria"));
        self.submissions.fetch_add(1, Ordering::SeqCst);
        match self.scripts.get(document_url) {
            Some(Script::Reject(reason)) => Err(GradingError::Submission(reason.clone())),
            Some(_) => Ok(JobHandle::new(document_url)),
            None => Err(GradingError::Submission(format!("no script for {}", document_url))),
        }
    }

    async fn poll(&self, handle: &JobHandle) -> Result<JobStatus> {
        let seen = {
            let mut polls = self.polls.lock().unwrap();
            let count = polls.entry(handle.id.clone()).or_insert(0);
            *count += 1;
            *count
        };
        match self.scripts.get(&handle.id) {
            Some(Script::Succeed { pending_polls, output }) if seen > *pending_polls => {
                Ok(JobStatus::Succeeded(output.clone()))
            }
            Some(Script::Succeed { .. }) | Some(Script::NeverFinish) => Ok(JobStatus::Pending),
            Some(Script::Fail(reason)) => Ok(JobStatus::Failed(reason.clone())),
            Some(Script::Reject(_)) | None => Ok(JobStatus::Failed("unknown job".to_string())),
        }
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<()> {
        self.cancelled.lock().unwrap().push(handle.id.clone());
        Ok(())
    }
}

pub fn fast_settings() -> GradingSettings {
    GradingSettings {
        poll_interval_ms: 5,
        job_timeout_secs: 1,
        batch_deadline_secs: 0,
    }
}

pub fn essay_rubric() -> NewRubric {
    NewRubric {
        user_id: "teacher-1".to_string(),
        title: "Persuasive essay".to_string(),
        criteria: vec![
            Criterion {
                name: "Thesis".to_string(),
                description: "Clear, arguable claim".to_string(),
                point_value: 4.0,
            },
            Criterion {
                name: "Evidence".to_string(),
                description: "Relevant, cited support".to_string(),
                point_value: 6.0,
            },
        ],
    }
}

pub struct Harness {
    pub client: Arc<ScriptedClient>,
    pub store: Arc<SqliteStore>,
    pub rubric: GradingRubric,
    pub coordinator: BatchGradingCoordinator,
}

pub async fn harness(scripts: Vec<(&str, Script)>, settings: GradingSettings) -> Harness {
    let client = Arc::new(ScriptedClient::new(scripts));
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let rubric = store.create_rubric(essay_rubric()).await.unwrap();
    let coordinator = BatchGradingCoordinator::new(client.clone(), store.clone(), settings);
    Harness {
        client,
        store,
        rubric,
        coordinator,
    }
}

pub async fn count_rows(store: &SqliteStore, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(store.pool())
        .await
        .unwrap()
}
