//! Recently-ended tombstone map (spec §4.6, §3 invariant v).
//!
//! Kept in memory rather than the sqlite-backed store an earlier daemon
//! used for this: the registry itself is in-memory and restart-volatile
//! here, so persisting only the tombstone half across a restart would
//! buy nothing. TTL is 30 s, not the 60 s some other in-house services use
//! elsewhere — the spec fixes it explicitly.

use std::collections::HashMap;

const TOMBSTONE_TTL_MS: i64 = 30_000;

#[derive(Debug, Default)]
pub struct CleanupService {
    recently_ended: HashMap<String, i64>,
}

impl CleanupService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_ended(&mut self, session_id: &str, ended_at_ms: i64) {
        self.recently_ended
            .insert(session_id.to_string(), ended_at_ms + TOMBSTONE_TTL_MS);
    }

    /// Sole consult point for registration rejection (spec §4.6).
    pub fn was_recently_ended(&self, session_id: &str, now_ms: i64) -> bool {
        self.recently_ended
            .get(session_id)
            .map(|expires_at| now_ms < *expires_at)
            .unwrap_or(false)
    }

    /// Evicts tombstones whose TTL has lapsed. Run on `CLEANUP_INTERVAL_MS`.
    pub fn evict_expired(&mut self, now_ms: i64) {
        self.recently_ended.retain(|_, expires_at| now_ms < *expires_at);
    }

    pub fn len(&self) -> usize {
        self.recently_ended.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recently_ended.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_reregistration_within_ttl() {
        let mut cleanup = CleanupService::new();
        cleanup.mark_ended("s1", 1_000);
        assert!(cleanup.was_recently_ended("s1", 1_000 + 29_999));
        assert!(!cleanup.was_recently_ended("s1", 1_000 + 30_000));
    }

    #[test]
    fn evict_expired_drops_lapsed_tombstones_only() {
        let mut cleanup = CleanupService::new();
        cleanup.mark_ended("old", 0);
        cleanup.mark_ended("fresh", 100_000);

        cleanup.evict_expired(31_000);
        assert!(!cleanup.was_recently_ended("old", 31_000));
        assert_eq!(cleanup.len(), 1);
    }

    #[test]
    fn re_mark_resets_timer() {
        let mut cleanup = CleanupService::new();
        cleanup.mark_ended("s1", 0);
        cleanup.mark_ended("s1", 20_000);
        assert!(cleanup.was_recently_ended("s1", 49_000));
        assert!(!cleanup.was_recently_ended("s1", 50_000));
    }
}
