//! Three pure constructors for a live [`Session`] (spec §4.3). None of them
//! touch the registry or the clock beyond `now()` for scanner-sourced
//! sessions — hook-sourced sessions preserve the event's own timestamp as
//! `registered_at`, so replaying a hook event twice never shifts a
//! session's recorded start time.

use chrono::Utc;

use jacques_protocol::{
    ContextMetrics, ModelDescriptor, Session, SessionState, SourceTag, TerminalDescriptor,
};

use crate::boundaries::derive_project_label;
use crate::terminal::TerminalKey;

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Builds a session from a `session_start` hook event. `registered_at` is
/// the event's own timestamp, not wall-clock now, so a retried delivery of
/// the same event reconstructs an identical session.
pub fn from_hook_start(
    session_id: &str,
    cwd: &str,
    recorded_at_ms: i64,
    terminal_pid: Option<u32>,
) -> Session {
    let terminal_key = terminal_pid
        .map(TerminalKey::discovered)
        .unwrap_or_else(TerminalKey::new_auto);

    Session {
        session_id: session_id.to_string(),
        source: SourceTag::ClaudeCode,
        title: None,
        transcript_path: None,
        cwd: cwd.to_string(),
        project_label: derive_project_label(cwd),
        model: ModelDescriptor::default(),
        terminal: TerminalDescriptor {
            terminal_pid,
            ..TerminalDescriptor::default()
        },
        terminal_key,
        status: SessionState::Active,
        last_activity: recorded_at_ms,
        registered_at: recorded_at_ms,
        context: ContextMetrics::default(),
        auto_compact: Default::default(),
        mode: Default::default(),
        is_bypass: false,
        last_tool_name: None,
        git_branch: None,
        git_worktree: None,
        git_repo_root: None,
    }
}

/// Builds a session from a process-table scan: `registered_at` is set to
/// `now()` since no hook event timestamp exists for it.
pub fn from_scanner(session_id: &str, cwd: &str, pid: u32) -> Session {
    let now = now_ms();
    Session {
        session_id: session_id.to_string(),
        source: SourceTag::ClaudeCode,
        title: None,
        transcript_path: None,
        cwd: cwd.to_string(),
        project_label: derive_project_label(cwd),
        model: ModelDescriptor::default(),
        terminal: TerminalDescriptor {
            terminal_pid: Some(pid),
            ..TerminalDescriptor::default()
        },
        terminal_key: TerminalKey::discovered(pid),
        status: SessionState::Active,
        last_activity: now,
        registered_at: now,
        context: ContextMetrics::default(),
        auto_compact: Default::default(),
        mode: Default::default(),
        is_bypass: false,
        last_tool_name: None,
        git_branch: None,
        git_worktree: None,
        git_repo_root: None,
    }
}

/// Builds a session from a `context_update` event arriving before any
/// `session_start` was observed (e.g. the daemon restarted mid-session).
pub fn from_context_update(
    session_id: &str,
    cwd: &str,
    context: ContextMetrics,
    recorded_at_ms: i64,
) -> Session {
    let mut session = from_hook_start(session_id, cwd, recorded_at_ms, None);
    session.context = context;
    session
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_source_preserves_event_timestamp() {
        let session = from_hook_start("s1", "/repo", 12345, Some(42));
        assert_eq!(session.registered_at, 12345);
        assert_eq!(session.last_activity, 12345);
        assert_eq!(session.terminal_key, "DISCOVERED:PID:42");
    }

    #[test]
    fn scanner_source_mints_auto_key_without_pid() {
        let session = from_scanner("s2", "/repo", 7);
        assert_eq!(session.terminal_key, "DISCOVERED:PID:7");
        assert!(session.registered_at > 0);
    }

    #[test]
    fn hook_source_without_pid_mints_auto_key() {
        let session = from_hook_start("s3", "/repo", 1, None);
        assert!(session.terminal_key.starts_with("AUTO:"));
    }
}
