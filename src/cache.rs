//! Completion cache (C7): a bounded set of recently-completed job ids used
//! to short-circuit re-dispatch of a job the frontend re-offers after the
//! worker already finished it but before the status mirror lands.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

const DEFAULT_CAPACITY: usize = 1000;

pub struct CompletionCache {
    capacity: usize,
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Default for CompletionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl CompletionCache {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: Mutex::new(HashMap::new()) }
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.entries.lock().unwrap().contains_key(job_id)
    }

    /// Record `job_id` as completed, evicting the oldest entry first if the
    /// cache is already at capacity.
    pub fn add(&self, job_id: &str) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.capacity && !entries.contains_key(job_id) {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, ts)| **ts)
                .map(|(id, _)| id.clone())
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(job_id.to_string(), Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_membership_after_add() {
        let cache = CompletionCache::new(10);
        assert!(!cache.contains("j1"));
        cache.add("j1");
        assert!(cache.contains("j1"));
    }

    #[test]
    fn evicts_oldest_entry_when_full() {
        let cache = CompletionCache::new(2);
        cache.add("j1");
        std::thread::sleep(std::time::Duration::from_millis(5));
        cache.add("j2");
        std::thread::sleep(std::time::Duration::from_millis(5));
        cache.add("j3");

        assert!(!cache.contains("j1"));
        assert!(cache.contains("j2"));
        assert!(cache.contains("j3"));
    }
}
