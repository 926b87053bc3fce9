//! Lease renewal (C5): periodic `touch` while a job is executing, run as a
//! task alongside the job itself and stopped via cooperative cancellation.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::store::JobStore;

pub struct Heartbeater {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl Heartbeater {
    /// Spawn a task that calls `JobStore::touch` for `job_id` every
    /// `interval` until `stop` is called or `parent_cancel` fires.
    pub fn spawn(
        store: Arc<dyn JobStore>,
        job_id: String,
        interval: Duration,
        parent_cancel: CancellationToken,
    ) -> Self {
        let cancel = parent_cancel.child_token();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = store.touch(&job_id).await {
                            warn!(job_id = %job_id, error = %e, "heartbeat touch failed");
                        }
                    }
                }
            }
        });
        Self { handle, cancel }
    }

    /// Stop the heartbeat and wait for the task to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryJobStore;
    use chrono::Utc;

    #[tokio::test]
    async fn heartbeat_touches_store_while_running() {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let mem = store.clone();
        let snapshot = crate::store::JobSnapshot {
            id: "j1".into(),
            session_id: "s1".into(),
            mode: "m".into(),
            responses: serde_json::json!({}),
            user_data: None,
            batch_id: None,
            file_name: None,
            created_at: Utc::now(),
        };
        mem.claim_job("j1", &snapshot, "worker-a").await.unwrap();
        let claimed_at = Utc::now();

        let cancel = CancellationToken::new();
        let hb = Heartbeater::spawn(store.clone(), "j1".to_string(), Duration::from_millis(20), cancel);
        tokio::time::sleep(Duration::from_millis(60)).await;
        hb.stop().await;

        // The heartbeat kept refreshing updated_at, so the job no longer
        // looks stuck relative to the moment it was claimed.
        let stuck = store.find_stuck_processing(claimed_at).await.unwrap();
        assert!(stuck.is_empty());
    }
}
