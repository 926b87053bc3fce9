//! Poll loop (C9): on a fixed interval, fetch ordinary queued jobs from the
//! frontend and batch-queued jobs from the local store, drop anything
//! already dispatched locally, and fan out dispatch up to the concurrency
//! limit without blocking the next tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::executor::JobExecutor;
use crate::frontend::FrontendClient;
use crate::metrics::Metrics;
use crate::store::JobStore;

pub struct Scheduler {
    frontend: Arc<FrontendClient>,
    store: Arc<dyn JobStore>,
    executor: Arc<JobExecutor>,
    active_jobs: Arc<RwLock<HashMap<String, CancellationToken>>>,
    metrics: Arc<Metrics>,
    mode_filter: Option<String>,
    poll_interval: Duration,
    max_concurrent_jobs: usize,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        frontend: Arc<FrontendClient>,
        store: Arc<dyn JobStore>,
        executor: Arc<JobExecutor>,
        active_jobs: Arc<RwLock<HashMap<String, CancellationToken>>>,
        metrics: Arc<Metrics>,
        mode_filter: Option<String>,
        poll_interval: Duration,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self { frontend, store, executor, active_jobs, metrics, mode_filter, poll_interval, max_concurrent_jobs }
    }

    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            max_concurrent_jobs = self.max_concurrent_jobs,
            "scheduler starting"
        );

        let permits = Arc::new(Semaphore::new(self.max_concurrent_jobs));
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let mode = self.mode_filter.as_deref();
            let mut candidates = self.frontend.fetch_queued(mode).await;
            match self.store.fetch_batch_queued(self.max_concurrent_jobs as i64, mode).await {
                Ok(batch) => candidates.extend(batch),
                Err(e) => warn!(error = %e, "failed to fetch batch-queued jobs from local store"),
            }

            self.metrics.record_poll(candidates.len());
            self.metrics.log_summary(self.active_jobs.read().await.len());

            if candidates.is_empty() {
                continue;
            }

            let active = self.active_jobs.read().await;
            candidates.retain(|j| !active.contains_key(&j.id));
            drop(active);

            debug!(found = candidates.len(), "dispatching candidate jobs");

            for job in candidates {
                let permit = match permits.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        debug!(job_id = %job.id, "at max concurrency, leaving job for next poll");
                        break;
                    }
                };
                let executor = self.executor.clone();
                let job_shutdown = shutdown.clone();
                tokio::spawn(async move {
                    executor.execute(job, job_shutdown).await;
                    drop(permit);
                });
            }
        }

        info!("scheduler stopped");
        let remaining = self.active_jobs.read().await.len();
        if remaining > 0 {
            warn!(remaining, "scheduler stopped with jobs still active");
        }
    }
}
