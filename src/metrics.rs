//! In-process observability counters (§4.9): no external metrics sink is
//! wired up, but the scheduler logs a periodic summary line so operators
//! can watch throughput from `journalctl`/log aggregation alone.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

#[derive(Default)]
pub struct Metrics {
    pub polls: AtomicU64,
    pub jobs_found: AtomicU64,
    pub jobs_completed: AtomicU64,
    pub jobs_failed: AtomicU64,
}

impl Metrics {
    pub fn record_poll(&self, found: usize) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        self.jobs_found.fetch_add(found as u64, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn log_summary(&self, active: usize) {
        info!(
            polls = self.polls.load(Ordering::Relaxed),
            jobs_found = self.jobs_found.load(Ordering::Relaxed),
            jobs_completed = self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed = self.jobs_failed.load(Ordering::Relaxed),
            active,
            "worker status"
        );
    }
}
