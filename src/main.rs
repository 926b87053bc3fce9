use std::collections::HashMap;
use std::sync::Arc;

use analysis_worker_core::cache::CompletionCache;
use analysis_worker_core::claimer::Claimer;
use analysis_worker_core::config::Config;
use analysis_worker_core::executor::{ExecutorConfig, JobExecutor};
use analysis_worker_core::frontend::FrontendClient;
use analysis_worker_core::metrics::Metrics;
use analysis_worker_core::pipeline::PipelineClient;
use analysis_worker_core::recoverer::Recoverer;
use analysis_worker_core::reload::ReloadGate;
use analysis_worker_core::scheduler::Scheduler;
use analysis_worker_core::shutdown::ShutdownCoordinator;
use analysis_worker_core::store::postgres::PgJobStore;
use analysis_worker_core::store::JobStore;
use analysis_worker_core::telemetry;
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();

    let config = Config::from_env().context("failed to load configuration")?;
    let worker_id = config.worker_id(0);
    info!(worker_id, "analysis worker starting");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run database migrations")?;

    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool));

    let frontend = Arc::new(FrontendClient::new(
        config.external_api_base_url.clone(),
        config.external_secret.clone(),
        config.external_api_timeout,
    )?);
    let pipeline = Arc::new(PipelineClient::new(
        config.internal_api_base_url.clone(),
        config.internal_secret.clone(),
        config.project_id.clone(),
        std::time::Duration::from_secs(60),
    )?);

    let active_jobs = Arc::new(tokio::sync::RwLock::new(HashMap::new()));
    let cache = Arc::new(CompletionCache::default());
    let reload = Arc::new(ReloadGate::new(store.clone()));
    let metrics = Arc::new(Metrics::default());
    let claimer = Arc::new(Claimer::new(store.clone(), frontend.clone()));

    let executor = Arc::new(JobExecutor::new(
        store.clone(),
        claimer,
        frontend.clone(),
        pipeline,
        cache,
        reload,
        active_jobs.clone(),
        metrics.clone(),
        ExecutorConfig {
            worker_id: worker_id.clone(),
            heartbeat_interval: config.heartbeat_interval,
            pipeline_timeout: config.pipeline_timeout,
        },
    ));

    let shutdown = Arc::new(ShutdownCoordinator::new(
        active_jobs.clone(),
        store.clone(),
        config.max_job_runtime,
    ));

    let scheduler = Arc::new(Scheduler::new(
        frontend.clone(),
        store.clone(),
        executor,
        active_jobs,
        metrics,
        config.mode_filter.clone(),
        config.poll_interval,
        config.max_concurrent_jobs,
    ));
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown.token()));

    let recoverer = Arc::new(Recoverer::new(store, frontend, config.recovery_interval));
    let recoverer_handle = tokio::spawn(recoverer.run(config.recovery_interval, shutdown.token()));

    let exit_code = shutdown.wait_for_signal_and_drain().await;

    let _ = scheduler_handle.await;
    let _ = recoverer_handle.await;

    info!(exit_code, "analysis worker stopped");
    std::process::exit(exit_code);
}
