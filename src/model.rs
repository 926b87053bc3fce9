//! Core data model: jobs, statuses, executions, and the status-transition graph.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed)
    }
}

/// Whether moving from `from` to `to` is a valid edge in the job status
/// graph. Invalid transitions are logged, never hard-rejected — the
/// caller may legitimately be re-resolving a previously-timed-out job.
pub fn is_valid_transition(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::*;
    matches!(
        (from, to),
        (Queued, Processing)
            | (Queued, Cancelled)
            | (Processing, Completed)
            | (Processing, Failed)
            | (Processing, Queued)
            | (Failed, Queued)
            | (Cancelled, Queued)
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub session_id: String,
    pub mode: String,
    pub responses: Value,
    pub user_data: Option<Value>,
    pub status: JobStatus,
    pub worker_id: Option<String>,
    pub error: Option<String>,
    pub batch_id: Option<String>,
    pub file_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn is_batch(&self) -> bool {
        self.batch_id.is_some()
    }

    /// Variables injected into the pipeline invocation (§4.3). `user_data`
    /// fields are coerced to strings and added last so they override.
    pub fn global_variables(&self, raw_text: Option<&str>) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("job_id".to_string(), self.id.clone());
        vars.insert("job_session_id".to_string(), self.session_id.clone());
        vars.insert(
            "questionnaire_responses".to_string(),
            self.responses.to_string(),
        );

        if let Some(batch_id) = &self.batch_id {
            vars.insert("batch_id".to_string(), batch_id.clone());
            vars.insert(
                "output_dir".to_string(),
                format!("batch-output/{batch_id}"),
            );
            if let Some(file_name) = &self.file_name {
                vars.insert("file_name".to_string(), file_name.clone());
            }
            if let Some(text) = raw_text {
                vars.insert("raw_text".to_string(), text.to_string());
            }
        }

        if let Some(Value::Object(map)) = &self.user_data {
            for (k, v) in map {
                vars.insert(k.clone(), value_to_string(v));
            }
        }

        vars
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub job_id: String,
    pub status: String,
    pub executed_steps: i32,
    pub failed_steps: i32,
    pub skipped_steps: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_can_move_to_processing_or_cancelled() {
        assert!(is_valid_transition(JobStatus::Queued, JobStatus::Processing));
        assert!(is_valid_transition(JobStatus::Queued, JobStatus::Cancelled));
        assert!(!is_valid_transition(JobStatus::Queued, JobStatus::Completed));
    }

    #[test]
    fn completed_is_terminal_and_has_no_outgoing_edges() {
        for to in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Failed,
            JobStatus::Cancelled,
            JobStatus::Completed,
        ] {
            assert!(!is_valid_transition(JobStatus::Completed, to));
        }
        assert!(JobStatus::Completed.is_terminal());
    }

    #[test]
    fn failed_and_cancelled_can_requeue() {
        assert!(is_valid_transition(JobStatus::Failed, JobStatus::Queued));
        assert!(is_valid_transition(JobStatus::Cancelled, JobStatus::Queued));
    }

    #[test]
    fn global_variables_include_job_identity_and_batch_fields() {
        let job = Job {
            id: "j1".into(),
            session_id: "s1".into(),
            mode: "PSYCHODIAGNOSTICS".into(),
            responses: serde_json::json!({"q1": "a"}),
            user_data: Some(serde_json::json!({"batch_id": "override-me"})),
            status: JobStatus::Queued,
            worker_id: None,
            error: None,
            batch_id: Some("b1".into()),
            file_name: Some("input.txt".into()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        };
        let vars = job.global_variables(Some("raw content"));
        assert_eq!(vars.get("job_id").unwrap(), "j1");
        assert_eq!(vars.get("file_name").unwrap(), "input.txt");
        assert_eq!(vars.get("raw_text").unwrap(), "raw content");
        // user_data overrides batch-derived fields, added last.
        assert_eq!(vars.get("batch_id").unwrap(), "override-me");
    }
}
