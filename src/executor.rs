//! Per-job execution (C8): the guard → claim → run → finalize → cleanup
//! state machine each dispatched job goes through.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::CompletionCache;
use crate::claimer::Claimer;
use crate::error::sanitize;
use crate::frontend::FrontendClient;
use crate::heartbeat::Heartbeater;
use crate::metrics::Metrics;
use crate::model::{is_valid_transition, Job, JobStatus};
use crate::pipeline::PipelineClient;
use crate::reload::ReloadGate;
use crate::store::JobStore;

pub struct ExecutorConfig {
    pub worker_id: String,
    pub heartbeat_interval: Duration,
    pub pipeline_timeout: Duration,
}

pub struct JobExecutor {
    store: Arc<dyn JobStore>,
    claimer: Arc<Claimer>,
    frontend: Arc<FrontendClient>,
    pipeline: Arc<PipelineClient>,
    cache: Arc<CompletionCache>,
    reload: Arc<ReloadGate>,
    active_jobs: Arc<RwLock<HashMap<String, CancellationToken>>>,
    metrics: Arc<Metrics>,
    config: ExecutorConfig,
}

impl JobExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn JobStore>,
        claimer: Arc<Claimer>,
        frontend: Arc<FrontendClient>,
        pipeline: Arc<PipelineClient>,
        cache: Arc<CompletionCache>,
        reload: Arc<ReloadGate>,
        active_jobs: Arc<RwLock<HashMap<String, CancellationToken>>>,
        metrics: Arc<Metrics>,
        config: ExecutorConfig,
    ) -> Self {
        Self { store, claimer, frontend, pipeline, cache, reload, active_jobs, metrics, config }
    }

    /// Run the full lifecycle for a single candidate job: guard checks,
    /// claim, pipeline execution, finalize, always-run cleanup.
    pub async fn execute(&self, job: Job, shutdown: CancellationToken) {
        let job_id = job.id.clone();

        if shutdown.is_cancelled() {
            return;
        }
        if self.cache.contains(&job_id) {
            info!(job_id = %job_id, "skipping job already in completion cache");
            return;
        }
        if self.active_jobs.read().await.contains_key(&job_id) {
            info!(job_id = %job_id, "skipping job already dispatched to this worker");
            return;
        }
        match self.store.has_completed_execution(&job_id).await {
            Ok(true) => {
                info!(job_id = %job_id, "skipping job with a prior completed execution record");
                self.cache.add(&job_id);
                return;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "failed to check prior execution, proceeding with claim");
            }
        }

        let claimed = match self.claimer.claim(&job, &self.config.worker_id).await {
            Ok(won) => won,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "claim attempt failed");
                return;
            }
        };
        if !claimed {
            return;
        }

        // Independent of `shutdown`, which only stops the scheduler from
        // dispatching new work: this job keeps running past a SIGTERM and is
        // only cancelled by the coordinator if it survives past the drain
        // deadline (§4.10).
        let job_cancel = CancellationToken::new();
        self.active_jobs.write().await.insert(job_id.clone(), job_cancel.clone());

        let heartbeat = Heartbeater::spawn(
            self.store.clone(),
            job_id.clone(),
            self.config.heartbeat_interval,
            job_cancel.clone(),
        );

        let variables = job.global_variables(None);
        let result = self
            .pipeline
            .execute_flow(&variables, self.config.pipeline_timeout, job_cancel.clone())
            .await;

        self.finalize(&job, result, &job_cancel).await;

        heartbeat.stop().await;
        self.active_jobs.write().await.remove(&job_id);

        self.reload.check_after_completion().await;
    }

    async fn finalize(
        &self,
        job: &Job,
        result: crate::error::Result<crate::pipeline::PipelineOutcome>,
        job_cancel: &CancellationToken,
    ) {
        if result.is_err() && job_cancel.is_cancelled() {
            info!(job_id = %job.id, "job aborted by shutdown drain deadline, resetting to queued");
            if let Err(e) = self.store.reset_to_queued(&job.id).await {
                warn!(job_id = %job.id, error = %e, "failed to reset job to queued after shutdown cancellation");
            }
            return;
        }

        let (status, error_message) = match result {
            Ok(outcome) if outcome.succeeded() => (JobStatus::Completed, None),
            Ok(outcome) => (
                JobStatus::Failed,
                Some(outcome.error.map(|e| sanitize(&e)).unwrap_or_else(|| "Pipeline execution failed".to_string())),
            ),
            Err(e) => (JobStatus::Failed, Some(sanitize(&e.to_string()))),
        };

        if !is_valid_transition(JobStatus::Processing, status) {
            warn!(job_id = %job.id, ?status, "ignoring invalid status transition from processing");
        }

        let completed_at = Utc::now();
        if let Err(e) = self
            .store
            .mark_terminal(&job.id, status, error_message.as_deref(), completed_at)
            .await
        {
            warn!(job_id = %job.id, error = %e, "failed to persist terminal status after retries");
        }

        self.frontend.patch_status(&job.id, status, error_message.as_deref(), Some(completed_at)).await;

        if status == JobStatus::Completed {
            self.cache.add(&job.id);
            self.metrics.record_completed();
        } else {
            self.metrics.record_failed();
        }

        info!(job_id = %job.id, ?status, "job finished");
    }
}
