//! Deferred config reload gate (C11): a restart is requested out-of-band by
//! setting a system flag, but the worker only acts on it once it is fully
//! quiescent, so no in-flight job is disrupted.

use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::store::JobStore;

const RESTART_FLAG: &str = "workers:restart_pending";

pub struct ReloadGate {
    store: Arc<dyn JobStore>,
}

impl ReloadGate {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Called after every job finishes. If a restart was requested and the
    /// worker has no other active jobs, clear the flag and exit cleanly so
    /// the orchestrator can replace this process with reloaded config.
    pub async fn check_after_completion(&self) {
        match self.should_restart_now().await {
            Ok(true) => {
                info!("restart flag set and worker quiescent, exiting for reload");
                if let Err(e) = self.store.delete_flag(RESTART_FLAG).await {
                    tracing::warn!(error = %e, "failed to clear restart flag before exit");
                }
                std::process::exit(0);
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "reload gate check failed"),
        }
    }

    async fn should_restart_now(&self) -> Result<bool> {
        if self.store.get_flag(RESTART_FLAG).await?.as_deref() != Some("true") {
            return Ok(false);
        }
        let active = self.store.count_active().await?;
        Ok(active == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryJobStore;

    #[tokio::test]
    async fn no_restart_when_flag_unset() {
        let store = Arc::new(InMemoryJobStore::new());
        let gate = ReloadGate::new(store);
        assert!(!gate.should_restart_now().await.unwrap());
    }

    #[tokio::test]
    async fn restart_only_when_flag_set_and_quiescent() {
        let mem = Arc::new(InMemoryJobStore::new());
        mem.set_flag("workers:restart_pending", "true");
        let store: Arc<dyn JobStore> = mem;
        let gate = ReloadGate::new(store);
        assert!(gate.should_restart_now().await.unwrap());
    }

    #[tokio::test]
    async fn flag_present_with_wrong_value_does_not_restart() {
        let mem = Arc::new(InMemoryJobStore::new());
        mem.set_flag("workers:restart_pending", "false");
        let store: Arc<dyn JobStore> = mem;
        let gate = ReloadGate::new(store);
        assert!(!gate.should_restart_now().await.unwrap());
    }
}
