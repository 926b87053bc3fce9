//! Graceful shutdown coordination (C10): on SIGTERM/SIGINT, stop accepting
//! new work and race draining in-flight jobs against a deadline, resetting
//! anything still running at the deadline back to `queued` instead of
//! leaving it to time out on lease expiry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::store::JobStore;

pub struct ShutdownCoordinator {
    cancel: CancellationToken,
    shutting_down: AtomicBool,
    active_jobs: Arc<RwLock<HashMap<String, CancellationToken>>>,
    store: Arc<dyn JobStore>,
    drain_deadline: Duration,
}

impl ShutdownCoordinator {
    pub fn new(
        active_jobs: Arc<RwLock<HashMap<String, CancellationToken>>>,
        store: Arc<dyn JobStore>,
        max_job_runtime: Duration,
    ) -> Self {
        Self {
            cancel: CancellationToken::new(),
            shutting_down: AtomicBool::new(false),
            active_jobs,
            store,
            drain_deadline: max_job_runtime + Duration::from_secs(5 * 60),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Block until a termination signal arrives, then begin the drain.
    /// Returns the process exit code: 0 if every active job finished
    /// within the deadline, 1 if any had to be force-reset.
    pub async fn wait_for_signal_and_drain(self: Arc<Self>) -> i32 {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received SIGINT, starting graceful shutdown"),
            _ = sigterm.recv() => info!("received SIGTERM, starting graceful shutdown"),
        }
        self.drain().await
    }

    async fn drain(self: Arc<Self>) -> i32 {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return 0;
        }
        self.cancel.cancel();

        let deadline = tokio::time::sleep(self.drain_deadline);
        tokio::pin!(deadline);

        loop {
            if self.active_jobs.read().await.is_empty() {
                info!("all in-flight jobs drained cleanly");
                return 0;
            }
            tokio::select! {
                _ = &mut deadline => break,
                _ = tokio::time::sleep(Duration::from_millis(200)) => continue,
            }
        }

        let stuck: Vec<(String, CancellationToken)> =
            self.active_jobs.read().await.iter().map(|(id, token)| (id.clone(), token.clone())).collect();
        warn!(count = stuck.len(), "drain deadline exceeded, cancelling and resetting remaining jobs to queued");
        for (job_id, token) in stuck {
            token.cancel();
            if let Err(e) = self.store.reset_to_queued(&job_id).await {
                warn!(job_id = %job_id, error = %e, "failed to reset job to queued during forced shutdown");
            }
        }
        1
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}
