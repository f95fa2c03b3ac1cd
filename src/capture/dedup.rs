use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::ids::NodeId;

/// Remembers recently accepted captures so an unchanged page reported twice
/// in quick succession is stored once.
pub struct SessionDedup {
    window: Duration,
    seen: Mutex<HashMap<NodeId, (u64, Instant)>>,
}

impl SessionDedup {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    fn seen(&self) -> MutexGuard<'_, HashMap<NodeId, (u64, Instant)>> {
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True when `id` was accepted with the same content hash inside the
    /// window. Otherwise records this capture and returns false.
    pub fn check(&self, id: &NodeId, content_hash: u64) -> bool {
        self.check_at(id, content_hash, Instant::now())
    }

    fn check_at(&self, id: &NodeId, content_hash: u64, now: Instant) -> bool {
        let mut seen = self.seen();

        if let Some((hash, at)) = seen.get(id) {
            if *hash == content_hash && now.saturating_duration_since(*at) < self.window {
                return true;
            }
        }

        seen.insert(id.clone(), (content_hash, now));
        false
    }

    /// Release `id` after a capture that was recorded but never stored.
    pub fn forget(&self, id: &NodeId) {
        self.seen().remove(id);
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let mut seen = self.seen();
        let before = seen.len();
        seen.retain(|_, (_, at)| now.saturating_duration_since(*at) < self.window);
        before - seen.len()
    }

    pub fn len(&self) -> usize {
        self.seen().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
