// src/models.rs
use crate::errors::{FailureReason, GradingError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// One scored line of a rubric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criterion {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub point_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingRubric {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub criteria: Vec<Criterion>,
    pub total_points: f64,
    pub created_at: String,
}

/// Rubric payload before it has an id.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRubric {
    pub user_id: String,
    pub title: String,
    pub criteria: Vec<Criterion>,
}

impl NewRubric {
    /// Checks the rubric is gradeable and returns its total point value.
    pub fn validate(&self) -> Result<f64> {
        if self.title.trim().is_empty() {
            return Err(GradingError::InvalidRubric("title is empty".to_string()));
        }
        if self.criteria.is_empty() {
            return Err(GradingError::InvalidRubric("no criteria".to_string()));
        }
        let mut seen = HashSet::new();
        for criterion in &self.criteria {
            if criterion.name.trim().is_empty() {
                return Err(GradingError::InvalidRubric("criterion without a name".to_string()));
            }
            if !seen.insert(criterion.name.as_str()) {
                return Err(GradingError::InvalidRubric(format!(
                    "duplicate criterion '{}'",
                    criterion.name
                )));
            }
            if !criterion.point_value.is_finite() || criterion.point_value < 0.0 {
                return Err(GradingError::InvalidRubric(format!(
                    "criterion '{}' has an invalid point value",
                    criterion.name
                )));
            }
        }
        Ok(self.criteria.iter().map(|c| c.point_value).sum())
    }
}

impl GradingRubric {
    /// The JSON handed to the inference backend: title, criteria and total only.
    pub fn to_prompt_json(&self) -> Result<String> {
        let view = serde_json::json!({
            "title": self.title,
            "criteria": self.criteria,
            "totalPoints": self.total_points,
        });
        Ok(serde_json::to_string(&view)?)
    }
}

/// Lifecycle of one inference job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Submitted,
    Polling,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Submitted => write!(f, "Submitted"),
            JobState::Polling => write!(f, "Polling"),
            JobState::Succeeded => write!(f, "Succeeded"),
            JobState::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingJob {
    pub id: String,
    pub document_url: String,
    pub rubric_id: String,
    pub batch_id: Option<String>,
    pub state: JobState,
    pub raw_output: Option<String>,
    pub failure: Option<String>,
    pub submitted_at: String,
}

impl GradingJob {
    /// A job the backend has accepted under `id`.
    pub fn submitted(
        id: impl Into<String>,
        document_url: impl Into<String>,
        rubric_id: impl Into<String>,
        batch_id: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            document_url: document_url.into(),
            rubric_id: rubric_id.into(),
            batch_id,
            state: JobState::Submitted,
            raw_output: None,
            failure: None,
            submitted_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn transition(&mut self, to: JobState) -> Result<()> {
        let allowed = matches!(
            (self.state, to),
            (JobState::Submitted, JobState::Polling)
                | (JobState::Submitted, JobState::Failed)
                | (JobState::Polling, JobState::Succeeded)
                | (JobState::Polling, JobState::Failed)
        );
        if !allowed {
            return Err(GradingError::InvalidTransition {
                job_id: self.id.clone(),
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        log::debug!("job {} {} -> {}", self.id, self.state, to);
        self.state = to;
        Ok(())
    }

    pub fn begin_polling(&mut self) -> Result<()> {
        self.transition(JobState::Polling)
    }

    pub fn succeed(&mut self, raw_output: String) -> Result<()> {
        self.transition(JobState::Succeeded)?;
        self.raw_output = Some(raw_output);
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(JobState::Failed)?;
        self.failure = Some(reason.into());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionFeedback {
    pub feedback: String,
    pub score: String,
}

/// Normalised grading output for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedGradeResult {
    pub final_score: String,
    pub overall_feedback: String,
    pub criteria_feedback: BTreeMap<String, CriterionFeedback>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub id: String,
    pub user_id: String,
    pub rubric_id: String,
    pub batch_id: Option<String>,
    pub file_name: String,
    pub file_url: String,
    pub score: String,
    pub feedback: String,
    pub rubric_data: String,
    pub created_at: String,
}

impl Grade {
    /// Decodes `rubric_data` back into the per-criterion mapping.
    pub fn criteria_feedback(&self) -> Result<BTreeMap<String, CriterionFeedback>> {
        Ok(serde_json::from_str(&self.rubric_data)?)
    }
}

#[derive(Debug, Clone)]
pub struct NewGrade {
    pub user_id: String,
    pub rubric_id: String,
    pub batch_id: Option<String>,
    pub file_name: String,
    pub file_url: String,
    pub score: String,
    pub feedback: String,
    pub rubric_data: String,
}

impl NewGrade {
    pub fn from_parsed(
        parsed: &ParsedGradeResult,
        user_id: &str,
        rubric_id: &str,
        batch_id: Option<&str>,
        file_url: &str,
    ) -> Result<Self> {
        Ok(Self {
            user_id: user_id.to_string(),
            rubric_id: rubric_id.to_string(),
            batch_id: batch_id.map(str::to_string),
            file_name: crate::documents::file_name_from_url(file_url),
            file_url: file_url.to_string(),
            score: parsed.final_score.clone(),
            feedback: parsed.overall_feedback.clone(),
            rubric_data: serde_json::to_string(&parsed.criteria_feedback)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    PartiallyCompleted,
    Failed,
}

impl BatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::Pending => "Pending",
            BatchStatus::Processing => "Processing",
            BatchStatus::Completed => "Completed",
            BatchStatus::PartiallyCompleted => "PartiallyCompleted",
            BatchStatus::Failed => "Failed",
        }
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = GradingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Pending" => Ok(BatchStatus::Pending),
            "Processing" => Ok(BatchStatus::Processing),
            "Completed" => Ok(BatchStatus::Completed),
            "PartiallyCompleted" => Ok(BatchStatus::PartiallyCompleted),
            "Failed" => Ok(BatchStatus::Failed),
            other => Err(GradingError::UnexpectedResponse(format!(
                "unknown batch status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub rubric_id: String,
    pub file_urls: Vec<String>,
    pub status: BatchStatus,
    pub overall_feedback: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSuccess {
    pub document_url: String,
    pub grade_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFailure {
    pub document_url: String,
    pub reason: FailureReason,
    pub message: String,
}

/// Terminal outcome of one document, reported as soon as it is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    Graded(DocumentSuccess),
    Failed(DocumentFailure),
}

impl DocumentOutcome {
    pub fn document_url(&self) -> &str {
        match self {
            DocumentOutcome::Graded(s) => &s.document_url,
            DocumentOutcome::Failed(f) => &f.document_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub batch_id: String,
    pub succeeded: Vec<DocumentSuccess>,
    pub failed: Vec<DocumentFailure>,
}

impl BatchResult {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Batch status implied by this run's outcomes.
    pub fn status(&self) -> BatchStatus {
        match (self.succeeded.is_empty(), self.failed.is_empty()) {
            (_, true) => BatchStatus::Completed,
            (true, false) => BatchStatus::Failed,
            (false, false) => BatchStatus::PartiallyCompleted,
        }
    }

    /// Collects per-document outcomes, keeping their order within each list.
    pub fn from_outcomes(batch_id: &str, outcomes: Vec<DocumentOutcome>) -> Self {
        let mut result = BatchResult {
            batch_id: batch_id.to_string(),
            succeeded: Vec::new(),
            failed: Vec::new(),
        };
        for outcome in outcomes {
            match outcome {
                DocumentOutcome::Graded(success) => result.succeeded.push(success),
                DocumentOutcome::Failed(failure) => result.failed.push(failure),
            }
        }
        result
    }

    pub fn failure_for(&self, document_url: &str) -> Option<&DocumentFailure> {
        self.failed.iter().find(|f| f.document_url == document_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criterion(name: &str, points: f64) -> Criterion {
        Criterion {
            name: name.to_string(),
            description: String::new(),
            point_value: points,
        }
    }

    #[test]
    fn test_rubric_total_is_sum_of_criteria() {
        let rubric = NewRubric {
            user_id: "u1".to_string(),
            title: "Essay".to_string(),
            criteria: vec![criterion("Thesis", 4.0), criterion("Evidence", 6.0)],
        };
        assert_eq!(rubric.validate().unwrap(), 10.0);
    }

    #[test]
    fn test_rubric_rejects_duplicate_criteria() {
        let rubric = NewRubric {
            user_id: "u1".to_string(),
            title: "Essay".to_string(),
            criteria: vec![criterion("Thesis", 4.0), criterion("Thesis", 6.0)],
        };
        assert!(matches!(rubric.validate(), Err(GradingError::InvalidRubric(_))));
    }

    #[test]
    fn test_terminal_job_cannot_transition() {
        let mut job = GradingJob::submitted("p1", "https://x/d1.pdf", "r1", None);
        job.begin_polling().unwrap();
        job.succeed("raw".to_string()).unwrap();
        assert!(job.state.is_terminal());
        assert!(matches!(job.fail("late"), Err(GradingError::InvalidTransition { .. })));
        assert_eq!(job.raw_output.as_deref(), Some("raw"));
        assert!(job.failure.is_none());
    }

    #[test]
    fn test_cannot_succeed_before_polling() {
        let mut job = GradingJob::submitted("p1", "https://x/d1.pdf", "r1", None);
        assert!(job.succeed("raw".to_string()).is_err());
        assert_eq!(job.state, JobState::Submitted);
    }

    #[test]
    fn test_batch_result_status() {
        let mut result = BatchResult {
            batch_id: "b1".to_string(),
            succeeded: vec![DocumentSuccess {
                document_url: "d1".to_string(),
                grade_id: "g1".to_string(),
            }],
            failed: vec![],
        };
        assert_eq!(result.status(), BatchStatus::Completed);

        result.failed.push(DocumentFailure {
            document_url: "d2".to_string(),
            reason: FailureReason::JobTimeout,
            message: "slow".to_string(),
        });
        assert_eq!(result.status(), BatchStatus::PartiallyCompleted);

        result.succeeded.clear();
        assert_eq!(result.status(), BatchStatus::Failed);
    }
}
