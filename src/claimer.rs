//! Atomic job claiming (C4): thin wrapper over `JobStore::claim_job` that
//! mirrors a successful claim to the frontend best-effort.

use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::frontend::FrontendClient;
use crate::model::{Job, JobStatus};
use crate::store::{JobSnapshot, JobStore};

pub struct Claimer {
    store: Arc<dyn JobStore>,
    frontend: Arc<FrontendClient>,
}

impl Claimer {
    pub fn new(store: Arc<dyn JobStore>, frontend: Arc<FrontendClient>) -> Self {
        Self { store, frontend }
    }

    /// Attempt to claim `job` for `worker_id`. Returns `true` only if this
    /// call was the single winner; the frontend mirror never affects the
    /// return value.
    pub async fn claim(&self, job: &Job, worker_id: &str) -> Result<bool> {
        let snapshot = JobSnapshot {
            id: job.id.clone(),
            session_id: job.session_id.clone(),
            mode: job.mode.clone(),
            responses: job.responses.clone(),
            user_data: job.user_data.clone(),
            batch_id: job.batch_id.clone(),
            file_name: job.file_name.clone(),
            created_at: job.created_at,
        };

        let won = self.store.claim_job(&job.id, &snapshot, worker_id).await?;
        if won {
            info!(job_id = %job.id, worker_id, "claimed job");
            self.frontend.patch_status(&job.id, JobStatus::Processing, None, None).await;
        }
        Ok(won)
    }
}
