//! In-memory `JobStore` double for tests: an in-process map guarded by a
//! single lock, used to exercise the lifecycle without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{Job, JobStatus};

use super::{JobSnapshot, JobStore};

#[derive(Default)]
struct State {
    jobs: HashMap<String, Job>,
    completed_executions: std::collections::HashSet<String>,
    flags: HashMap<String, String>,
}

pub struct InMemoryJobStore {
    state: Mutex<State>,
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self { state: Mutex::new(State::default()) }
    }

    pub fn seed(&self, job: Job) {
        self.state.lock().unwrap().jobs.insert(job.id.clone(), job);
    }

    pub fn record_completed_execution(&self, job_id: &str) {
        self.state
            .lock()
            .unwrap()
            .completed_executions
            .insert(job_id.to_string());
    }

    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.state.lock().unwrap().jobs.get(job_id).cloned()
    }

    pub fn set_flag(&self, key: &str, value: &str) {
        self.state.lock().unwrap().flags.insert(key.to_string(), value.to_string());
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn fetch_queued(&self, limit: i64, mode_filter: Option<&str>) -> Result<Vec<Job>> {
        let state = self.state.lock().unwrap();
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued && j.batch_id.is_none())
            .filter(|j| mode_filter.map(|m| j.mode == m).unwrap_or(true))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs.truncate(limit as usize);
        Ok(jobs)
    }

    async fn fetch_batch_queued(&self, limit: i64, mode_filter: Option<&str>) -> Result<Vec<Job>> {
        let state = self.state.lock().unwrap();
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued && j.batch_id.is_some())
            .filter(|j| mode_filter.map(|m| j.mode == m).unwrap_or(true))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs.truncate(limit as usize);
        Ok(jobs)
    }

    async fn claim_job(&self, job_id: &str, snapshot: &JobSnapshot, worker_id: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        match state.jobs.get_mut(job_id) {
            Some(job) => {
                if job.status == JobStatus::Queued && job.worker_id.is_none() {
                    job.status = JobStatus::Processing;
                    job.worker_id = Some(worker_id.to_string());
                    job.updated_at = Utc::now();
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            None => {
                state.jobs.insert(
                    job_id.to_string(),
                    Job {
                        id: snapshot.id.clone(),
                        session_id: snapshot.session_id.clone(),
                        mode: snapshot.mode.clone(),
                        responses: snapshot.responses.clone(),
                        user_data: snapshot.user_data.clone(),
                        status: JobStatus::Processing,
                        worker_id: Some(worker_id.to_string()),
                        error: None,
                        batch_id: snapshot.batch_id.clone(),
                        file_name: snapshot.file_name.clone(),
                        created_at: snapshot.created_at,
                        updated_at: Utc::now(),
                        completed_at: None,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn mark_terminal(
        &self,
        job_id: &str,
        status: JobStatus,
        error_message: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.jobs.get_mut(job_id) {
            job.status = status;
            job.error = error_message.map(|s| s.to_string());
            job.completed_at = Some(completed_at);
            job.updated_at = completed_at;
        }
        Ok(())
    }

    async fn touch(&self, job_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.jobs.get_mut(job_id) {
            if job.status == JobStatus::Processing {
                job.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn find_stuck_processing(&self, older_than: DateTime<Utc>) -> Result<Vec<Job>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Processing && j.updated_at < older_than)
            .cloned()
            .collect())
    }

    async fn reset_to_queued(&self, job_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.jobs.get_mut(job_id) {
            job.status = JobStatus::Queued;
            job.worker_id = None;
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn has_completed_execution(&self, job_id: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().completed_executions.contains(job_id))
    }

    async fn get_flag(&self, key: &str) -> Result<Option<String>> {
        Ok(self.state.lock().unwrap().flags.get(key).cloned())
    }

    async fn delete_flag(&self, key: &str) -> Result<()> {
        self.state.lock().unwrap().flags.remove(key);
        Ok(())
    }

    async fn count_active(&self) -> Result<i64> {
        let state = self.state.lock().unwrap();
        Ok(state
            .jobs
            .values()
            .filter(|j| matches!(j.status, JobStatus::Queued | JobStatus::Processing))
            .count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn snapshot(id: &str) -> JobSnapshot {
        JobSnapshot {
            id: id.to_string(),
            session_id: "s1".to_string(),
            mode: "PSYCHODIAGNOSTICS".to_string(),
            responses: serde_json::json!({"q1": "a"}),
            user_data: None,
            batch_id: None,
            file_name: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn claim_inserts_unseen_job_and_claims_it() {
        let store = InMemoryJobStore::new();
        let claimed = store.claim_job("j1", &snapshot("j1"), "worker-a").await.unwrap();
        assert!(claimed);
        let job = store.get("j1").unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.worker_id.as_deref(), Some("worker-a"));
    }

    #[tokio::test]
    async fn only_one_concurrent_claim_wins() {
        let store = Arc::new(InMemoryJobStore::new());
        let snap = snapshot("j1");
        store.seed(Job {
            id: "j1".into(),
            session_id: "s1".into(),
            mode: "PSYCHODIAGNOSTICS".into(),
            responses: serde_json::json!({}),
            user_data: None,
            status: JobStatus::Queued,
            worker_id: None,
            error: None,
            batch_id: None,
            file_name: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        });

        let (a, b) = tokio::join!(
            store.claim_job("j1", &snap, "worker-a"),
            store.claim_job("j1", &snap, "worker-b"),
        );
        let wins = [a.unwrap(), b.unwrap()].into_iter().filter(|x| *x).count();
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn reset_to_queued_clears_worker_and_allows_reclaim() {
        let store = InMemoryJobStore::new();
        let snap = snapshot("j1");
        store.claim_job("j1", &snap, "worker-a").await.unwrap();
        store.reset_to_queued("j1").await.unwrap();
        let claimed = store.claim_job("j1", &snap, "worker-b").await.unwrap();
        assert!(claimed);
        assert_eq!(store.get("j1").unwrap().worker_id.as_deref(), Some("worker-b"));
    }
}
