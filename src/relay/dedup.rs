//! Bounded in-memory set of message ids that have already been forwarded.
//!
//! When the set grows past its capacity it is cleared in one step rather than
//! evicted piecemeal. A cleared id may be forwarded again if it shows up later.

use std::collections::HashSet;

use tokio::sync::Mutex;
use tracing::info;

/// Default dedup ceiling.
pub const DEFAULT_DEDUP_CAPACITY: usize = 10_000;

/// Tracks forwarded message ids behind a single lock.
pub struct DedupTracker {
    ids: Mutex<HashSet<String>>,
    capacity: usize,
}

impl DedupTracker {
    /// Create a tracker that clears itself once it holds more than `capacity` ids.
    pub fn new(capacity: usize) -> Self {
        Self {
            ids: Mutex::new(HashSet::new()),
            capacity,
        }
    }

    /// Whether `id` has been marked since the last reset.
    pub async fn seen(&self, id: &str) -> bool {
        self.ids.lock().await.contains(id)
    }

    /// Mark `id` as forwarded. Returns `false` if it was already marked.
    pub async fn mark(&self, id: &str) -> bool {
        self.ids.lock().await.insert(id.to_string())
    }

    /// Clear the whole set if it holds more than `capacity` ids.
    pub async fn reset_if_over_capacity(&self) {
        let mut ids = self.ids.lock().await;
        Self::clear_if_over(&mut ids, self.capacity);
    }

    /// Mark `id` and apply the capacity check under one lock acquisition.
    ///
    /// Returns `false` if another event already marked `id`, in which case the
    /// caller must not forward.
    pub async fn mark_and_trim(&self, id: &str) -> bool {
        let mut ids = self.ids.lock().await;
        if !ids.insert(id.to_string()) {
            return false;
        }
        Self::clear_if_over(&mut ids, self.capacity);
        true
    }

    /// Number of ids currently tracked.
    pub async fn len(&self) -> usize {
        self.ids.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.ids.lock().await.is_empty()
    }

    fn clear_if_over(ids: &mut HashSet<String>, capacity: usize) {
        if ids.len() > capacity {
            info!(size = ids.len(), capacity, "Dedup set over capacity, clearing");
            ids.clear();
        }
    }
}

impl Default for DedupTracker {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mark_then_seen() {
        let dedup = DedupTracker::default();
        assert!(!dedup.seen("1").await);
        assert!(dedup.mark("1").await);
        assert!(dedup.seen("1").await);
        assert!(!dedup.seen("2").await);
    }

    #[tokio::test]
    async fn mark_is_idempotent() {
        let dedup = DedupTracker::default();
        assert!(dedup.mark("1").await);
        assert!(!dedup.mark("1").await);
        assert_eq!(dedup.len().await, 1);
    }

    #[tokio::test]
    async fn stays_populated_at_capacity() {
        let dedup = DedupTracker::new(3);
        for id in ["a", "b", "c"] {
            dedup.mark(id).await;
            dedup.reset_if_over_capacity().await;
        }
        assert_eq!(dedup.len().await, 3);
        assert!(dedup.seen("a").await);
    }

    #[tokio::test]
    async fn clears_entirely_when_capacity_exceeded() {
        let dedup = DedupTracker::new(DEFAULT_DEDUP_CAPACITY);
        for i in 0..DEFAULT_DEDUP_CAPACITY {
            dedup.mark(&i.to_string()).await;
            dedup.reset_if_over_capacity().await;
        }
        assert_eq!(dedup.len().await, DEFAULT_DEDUP_CAPACITY);
        assert!(dedup.seen("0").await);

        dedup.mark("overflow").await;
        dedup.reset_if_over_capacity().await;

        assert!(dedup.is_empty().await);
        assert!(!dedup.seen("0").await);
        assert!(!dedup.seen("overflow").await);
    }

    #[tokio::test]
    async fn mark_and_trim_rejects_duplicates() {
        let dedup = DedupTracker::new(2);
        assert!(dedup.mark_and_trim("a").await);
        assert!(!dedup.mark_and_trim("a").await);
        assert!(dedup.mark_and_trim("b").await);
        assert!(dedup.mark_and_trim("c").await);
        assert_eq!(dedup.len().await, 0);
    }
}
