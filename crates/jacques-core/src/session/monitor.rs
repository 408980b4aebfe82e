//! Process Monitor (spec §4.5): periodic liveness and enrichment pass over
//! every registered session. Each step is a pure function over the
//! registry plus whatever process-table snapshot the caller supplies, so
//! the polling cadence and the process-table access both live in the
//! daemon's monitor task, not here.

use std::collections::{HashMap, HashSet};

use crate::process::ClaudeProcess;

use super::registry::SessionRegistry;

pub const PROCESS_VERIFY_INTERVAL_MS: u64 = 30_000;
pub const IDLE_TIMEOUT_MS: i64 = 6 * 60 * 60 * 1000;
pub const PID_LESS_GRACE_MS: i64 = 60_000;
const PENDING_BYPASS_TTL_MS: i64 = 60_000;

/// Step 1: drop sessions whose resolvable pid is no longer running.
pub fn retire_dead_processes(
    registry: &mut SessionRegistry,
    is_running: impl Fn(u32) -> bool,
) -> Vec<String> {
    let mut removed = Vec::new();
    for (id, pid) in registry.ids_with_resolvable_pid() {
        if !is_running(pid) {
            if registry.end(&id).is_ok() {
                removed.push(id);
            }
        }
    }
    removed
}

/// Step 2: drop sessions whose cwd has been moved to the trash.
pub fn retire_trashed(registry: &mut SessionRegistry) -> Vec<String> {
    let candidates: Vec<String> = registry
        .list()
        .into_iter()
        .filter(|s| is_trash_path(&s.cwd))
        .map(|s| s.session_id)
        .collect();

    let mut removed = Vec::new();
    for id in candidates {
        if registry.end(&id).is_ok() {
            removed.push(id);
        }
    }
    removed
}

fn is_trash_path(cwd: &str) -> bool {
    cwd.contains("/.Trash/") || cwd.contains("/.local/share/Trash/") || cwd.contains("\\$Recycle.Bin\\")
}

/// Step 3: drop sessions silent past the idle timeout.
pub fn retire_long_idle(registry: &mut SessionRegistry, now_ms: i64, idle_timeout_ms: i64) -> Vec<String> {
    let candidates: Vec<String> = registry
        .list()
        .into_iter()
        .filter(|s| now_ms - s.last_activity > idle_timeout_ms)
        .map(|s| s.session_id)
        .collect();

    let mut removed = Vec::new();
    for id in candidates {
        if registry.end(&id).is_ok() {
            removed.push(id);
        }
    }
    removed
}

/// Step 4: for every pid-less session past the grace window, claim one
/// unclaimed process sharing its cwd. Sessions whose cwd has no unclaimed
/// candidate are removed; others are enriched (terminal-key upgraded).
pub fn enrich_pid_less_sessions(
    registry: &mut SessionRegistry,
    now_ms: i64,
    running: &[ClaudeProcess],
) -> (Vec<(String, u32)>, Vec<String>) {
    let claimed: HashSet<u32> = registry
        .ids_with_resolvable_pid()
        .into_iter()
        .map(|(_, pid)| pid)
        .collect();

    let mut buckets: HashMap<String, Vec<u32>> = HashMap::new();
    for process in running {
        if claimed.contains(&process.pid) {
            continue;
        }
        if let Some(cwd) = &process.cwd {
            buckets.entry(normalize_cwd(cwd)).or_default().push(process.pid);
        }
    }

    let mut enriched = Vec::new();
    let mut removed = Vec::new();

    for (id, cwd, registered_at) in registry.pid_less_sessions() {
        if now_ms - registered_at < PID_LESS_GRACE_MS {
            continue;
        }

        let bucket = buckets.get_mut(&normalize_cwd(&cwd));
        let candidate = bucket.and_then(|pids| pids.pop());

        match candidate {
            Some(pid) => {
                if registry.upgrade_pid(&id, pid).is_ok() {
                    enriched.push((id, pid));
                }
            }
            None => {
                if registry.end(&id).is_ok() {
                    removed.push(id);
                }
            }
        }
    }

    (enriched, removed)
}

fn normalize_cwd(cwd: &str) -> String {
    cwd.trim_end_matches('/').to_string()
}

/// Bypass detection pass: promotes any non-bypass session whose pid is
/// confirmed running with `--dangerously-skip-permissions`.
pub fn promote_bypass(registry: &mut SessionRegistry, is_bypass: impl Fn(u32) -> bool) -> Vec<String> {
    let mut promoted = Vec::new();
    for (id, pid) in registry.non_bypass_pids() {
        if is_bypass(pid) && registry.promote_bypass(&id).is_ok() {
            promoted.push(id);
        }
    }
    promoted
}

/// First-subsequent-session-is-bypass map, keyed by normalised cwd, with a
/// 60 s TTL that a re-mark resets (spec §4.5).
#[derive(Debug, Default)]
pub struct PendingBypassMap {
    entries: HashMap<String, i64>,
}

impl PendingBypassMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, cwd: &str, now_ms: i64) {
        self.entries
            .insert(normalize_cwd(cwd), now_ms + PENDING_BYPASS_TTL_MS);
    }

    /// Consumes the pending mark for `cwd` if still valid, returning
    /// whether the session being registered there should start as bypass.
    pub fn take(&mut self, cwd: &str, now_ms: i64) -> bool {
        let key = normalize_cwd(cwd);
        match self.entries.remove(&key) {
            Some(expires_at) if now_ms < expires_at => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::factory::from_hook_start;

    #[test]
    fn retire_dead_processes_removes_only_dead_pids() {
        let mut registry = SessionRegistry::new();
        registry
            .upsert(from_hook_start("alive", "/repo", 0, Some(1)), false)
            .unwrap();
        registry
            .upsert(from_hook_start("dead", "/repo", 0, Some(2)), false)
            .unwrap();

        let removed = retire_dead_processes(&mut registry, |pid| pid == 1);
        assert_eq!(removed, vec!["dead".to_string()]);
        assert!(registry.get("alive").is_some());
    }

    #[test]
    fn enrichment_claims_one_unclaimed_process_per_cwd_bucket() {
        let mut registry = SessionRegistry::new();
        registry
            .upsert(from_hook_start("u1", "/p", 0, None), false)
            .unwrap();
        registry
            .upsert(from_hook_start("u2", "/p", 0, None), false)
            .unwrap();

        let running = vec![
            ClaudeProcess {
                pid: 111,
                cwd: Some("/p".to_string()),
                is_bypass: false,
            },
            ClaudeProcess {
                pid: 222,
                cwd: Some("/p".to_string()),
                is_bypass: false,
            },
        ];

        let (enriched, removed) = enrich_pid_less_sessions(&mut registry, 61_000, &running);
        assert_eq!(enriched.len(), 2);
        assert!(removed.is_empty());
        let pids: HashSet<u32> = enriched.iter().map(|(_, pid)| *pid).collect();
        assert_eq!(pids, HashSet::from([111, 222]));
    }

    #[test]
    fn enrichment_removes_sessions_with_no_unclaimed_candidate() {
        let mut registry = SessionRegistry::new();
        registry
            .upsert(from_hook_start("u1", "/empty", 0, None), false)
            .unwrap();

        let (enriched, removed) = enrich_pid_less_sessions(&mut registry, 61_000, &[]);
        assert!(enriched.is_empty());
        assert_eq!(removed, vec!["u1".to_string()]);
    }

    #[test]
    fn enrichment_skips_sessions_still_inside_grace_window() {
        let mut registry = SessionRegistry::new();
        registry
            .upsert(from_hook_start("u1", "/p", 0, None), false)
            .unwrap();

        let (enriched, removed) = enrich_pid_less_sessions(&mut registry, 30_000, &[]);
        assert!(enriched.is_empty());
        assert!(removed.is_empty());
    }

    #[test]
    fn pending_bypass_expires_after_ttl() {
        let mut pending = PendingBypassMap::new();
        pending.mark("/repo", 0);
        assert!(pending.take("/repo", 59_999));
    }

    #[test]
    fn pending_bypass_remark_resets_timer() {
        let mut pending = PendingBypassMap::new();
        pending.mark("/repo", 0);
        pending.mark("/repo", 50_000);
        assert!(pending.take("/repo", 109_000));
    }
}
