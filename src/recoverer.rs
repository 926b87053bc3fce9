//! Stuck-job recovery (C6): at startup and on a fixed interval, any job
//! stuck `processing` past the lease window is reset to `queued` so another
//! worker can pick it up.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::Result;
use crate::frontend::FrontendClient;
use crate::model::JobStatus;
use crate::store::JobStore;

pub struct Recoverer {
    store: Arc<dyn JobStore>,
    frontend: Arc<FrontendClient>,
    stuck_after: Duration,
}

impl Recoverer {
    pub fn new(store: Arc<dyn JobStore>, frontend: Arc<FrontendClient>, stuck_after: Duration) -> Self {
        Self { store, frontend, stuck_after }
    }

    /// Reset every job that has sat `processing` without a heartbeat touch
    /// for longer than `stuck_after`. Returns the number recovered.
    pub async fn recover_once(&self) -> Result<usize> {
        let threshold = Utc::now() - chrono::Duration::from_std(self.stuck_after).unwrap();
        let stuck = self.store.find_stuck_processing(threshold).await?;

        for job in &stuck {
            warn!(job_id = %job.id, worker_id = ?job.worker_id, "recovering stuck job");
            self.store.reset_to_queued(&job.id).await?;
            self.frontend.patch_status(&job.id, JobStatus::Queued, None, None).await;
        }

        Ok(stuck.len())
    }

    /// Run recovery immediately, then on every tick of `interval`, until
    /// cancelled.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        if let Err(e) = self.recover_once().await {
            warn!(error = %e, "startup stuck-job recovery failed");
        }

        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.recover_once().await {
                        Ok(n) if n > 0 => info!(recovered = n, "recovered stuck jobs"),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "stuck-job recovery sweep failed"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Job;
    use crate::store::memory::InMemoryJobStore;

    fn stale_job(id: &str) -> Job {
        Job {
            id: id.into(),
            session_id: "s1".into(),
            mode: "m".into(),
            responses: serde_json::json!({}),
            user_data: None,
            status: JobStatus::Processing,
            worker_id: Some("worker-dead".into()),
            error: None,
            batch_id: None,
            file_name: None,
            created_at: Utc::now() - chrono::Duration::hours(2),
            updated_at: Utc::now() - chrono::Duration::hours(2),
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn recovers_jobs_stuck_past_the_threshold() {
        let mem = Arc::new(InMemoryJobStore::new());
        mem.seed(stale_job("j1"));
        let store: Arc<dyn JobStore> = mem;
        let frontend = Arc::new(FrontendClient::new(String::new(), "secret".into(), Duration::from_secs(1)).unwrap());
        let recoverer = Recoverer::new(store, frontend, Duration::from_secs(60 * 60));

        let recovered = recoverer.recover_once().await.unwrap();
        assert_eq!(recovered, 1);
    }
}
