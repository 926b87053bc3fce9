//! Transactional persistence for jobs, executions, and system flags (C1).
//!
//! `JobStore` is the abstract contract; `postgres` is the production
//! implementation, `memory` an in-memory double used by unit and
//! integration-style tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{Job, JobStatus};

/// Snapshot used to insert a job that the local store has never seen
/// before (the "claim races ahead of a local row" branch of `ClaimJob`).
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub id: String,
    pub session_id: String,
    pub mode: String,
    pub responses: serde_json::Value,
    pub user_data: Option<serde_json::Value>,
    pub batch_id: Option<String>,
    pub file_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn fetch_queued(&self, limit: i64, mode_filter: Option<&str>) -> Result<Vec<Job>>;

    async fn fetch_batch_queued(&self, limit: i64, mode_filter: Option<&str>) -> Result<Vec<Job>>;

    /// Atomic single-winner claim: at most one caller observes `true` for
    /// a given job id, even under concurrent callers.
    async fn claim_job(&self, job_id: &str, snapshot: &JobSnapshot, worker_id: &str) -> Result<bool>;

    /// Sets final state, retried internally on transient failure.
    async fn mark_terminal(
        &self,
        job_id: &str,
        status: JobStatus,
        error_message: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Best-effort `updated_at` refresh; failures are logged, not propagated.
    async fn touch(&self, job_id: &str) -> Result<()>;

    async fn find_stuck_processing(&self, older_than: DateTime<Utc>) -> Result<Vec<Job>>;

    async fn reset_to_queued(&self, job_id: &str) -> Result<()>;

    async fn has_completed_execution(&self, job_id: &str) -> Result<bool>;

    async fn get_flag(&self, key: &str) -> Result<Option<String>>;

    async fn delete_flag(&self, key: &str) -> Result<()>;

    async fn count_active(&self) -> Result<i64>;
}
