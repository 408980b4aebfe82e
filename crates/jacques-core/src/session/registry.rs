//! Central session map and status state machine (spec §4.4).
//!
//! The registry itself holds no locks and spawns nothing — it is a plain
//! struct whose methods are synchronous and side-effect-free beyond the
//! map. The daemon serialises every call onto one task (spec §5) so that
//! registry mutation is linearisable; this type doesn't need to know that.

use std::collections::HashMap;

use jacques_protocol::hook_event::ToolPhase;
use jacques_protocol::{AutoCompactDescriptor, ContextMetrics, Session, SessionState, TerminalDescriptor};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Merged,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
    focused: Option<String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Funnel point for `registerFromHook`/`registerFromScanner`/
    /// `registerFromContextUpdate`. Callers consult the recently-ended map
    /// themselves and pass the result in, since that map is owned by the
    /// Cleanup Service, not the registry.
    pub fn upsert(&mut self, incoming: Session, already_ended: bool) -> Result<UpsertOutcome> {
        if already_ended {
            return Err(Error::AlreadyEnded {
                session_id: incoming.session_id.clone(),
            });
        }

        match self.sessions.remove(&incoming.session_id) {
            Some(existing) => {
                let merged = merge_session(existing, incoming);
                self.sessions.insert(merged.session_id.clone(), merged);
                Ok(UpsertOutcome::Merged)
            }
            None => {
                self.sessions.insert(incoming.session_id.clone(), incoming);
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    pub fn apply_context_update(
        &mut self,
        session_id: &str,
        context: ContextMetrics,
        auto_compact: Option<AutoCompactDescriptor>,
        now_ms: i64,
    ) -> Result<()> {
        let session = self.get_mut(session_id)?;
        session.context = context;
        if let Some(auto_compact) = auto_compact {
            session.auto_compact = auto_compact;
        }
        session.last_activity = now_ms;
        Ok(())
    }

    pub fn apply_tool_event(
        &mut self,
        session_id: &str,
        phase: ToolPhase,
        tool_name: Option<String>,
        now_ms: i64,
    ) -> Result<SessionState> {
        let session = self.get_mut(session_id)?;
        session.status = next_status(session.status, phase);
        if tool_name.is_some() {
            session.last_tool_name = tool_name;
        }
        session.last_activity = now_ms;
        Ok(session.status)
    }

    /// Marks idle sessions that have been silent past `idle_threshold_ms`.
    /// Called by the Process Monitor, not by a hook (spec §4.4).
    pub fn apply_idle_sweep(&mut self, now_ms: i64, idle_threshold_ms: i64) -> Vec<String> {
        let mut went_idle = Vec::new();
        for (id, session) in self.sessions.iter_mut() {
            if session.status != SessionState::Idle
                && now_ms - session.last_activity > idle_threshold_ms
            {
                session.status = SessionState::Idle;
                went_idle.push(id.clone());
            }
        }
        went_idle
    }

    pub fn end(&mut self, session_id: &str) -> Result<Session> {
        self.sessions
            .remove(session_id)
            .ok_or_else(|| Error::not_found(session_id))
    }

    pub fn remove_silently(&mut self, session_id: &str) -> Option<Session> {
        self.sessions.remove(session_id)
    }

    pub fn list(&self) -> Vec<Session> {
        self.sessions.values().cloned().collect()
    }

    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    /// Every (session_id, pid) pair whose pid is known, resolved either
    /// from `terminal.terminal_pid` or from a `DISCOVERED:PID:` terminal
    /// key (spec §4.5 step 1).
    pub fn ids_with_resolvable_pid(&self) -> Vec<(String, u32)> {
        self.sessions
            .iter()
            .filter_map(|(id, session)| {
                resolve_pid(session).map(|pid| (id.clone(), pid))
            })
            .collect()
    }

    /// Sessions with no resolvable pid, for the enrichment pass (spec §4.5
    /// step 4). Returns `(session_id, cwd, registered_at)`.
    pub fn pid_less_sessions(&self) -> Vec<(String, String, i64)> {
        self.sessions
            .iter()
            .filter(|(_, session)| resolve_pid(session).is_none())
            .map(|(id, session)| (id.clone(), session.cwd.clone(), session.registered_at))
            .collect()
    }

    pub fn upgrade_pid(&mut self, session_id: &str, pid: u32) -> Result<()> {
        let session = self.get_mut(session_id)?;
        session.terminal.terminal_pid = Some(pid);
        session.terminal_key = crate::terminal::TerminalKey::upgrade(pid);
        Ok(())
    }

    pub fn promote_bypass(&mut self, session_id: &str) -> Result<()> {
        let session = self.get_mut(session_id)?;
        session.is_bypass = true;
        Ok(())
    }

    pub fn cwd_of(&self, session_id: &str) -> Option<&str> {
        self.sessions.get(session_id).map(|s| s.cwd.as_str())
    }

    pub fn non_bypass_pids(&self) -> Vec<(String, u32)> {
        self.sessions
            .iter()
            .filter(|(_, session)| !session.is_bypass)
            .filter_map(|(id, session)| resolve_pid(session).map(|pid| (id.clone(), pid)))
            .collect()
    }

    fn get_mut(&mut self, session_id: &str) -> Result<&mut Session> {
        self.sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::not_found(session_id))
    }

    pub fn get_focused(&self) -> Option<&Session> {
        self.focused.as_deref().and_then(|id| self.sessions.get(id))
    }

    pub fn set_focused(&mut self, session_id: Option<String>) {
        if let Some(id) = &session_id {
            if !self.sessions.contains_key(id) {
                return;
            }
        }
        self.focused = session_id;
    }

    pub fn focused_id(&self) -> Option<&str> {
        self.focused.as_deref()
    }
}

fn resolve_pid(session: &Session) -> Option<u32> {
    session
        .terminal
        .terminal_pid
        .or_else(|| crate::terminal::TerminalKey::pid_from(&session.terminal_key))
}

fn next_status(current: SessionState, phase: ToolPhase) -> SessionState {
    match phase {
        ToolPhase::Start => SessionState::Working,
        ToolPhase::End => {
            if current == SessionState::Working {
                SessionState::Active
            } else {
                current
            }
        }
        ToolPhase::PermissionRequest => SessionState::Awaiting,
    }
}

/// Non-nullable-wins field merge: an incoming `Some`/non-default value
/// overwrites; an incoming `None` keeps what's already on record. Status,
/// context and registration time are intentionally excluded — those are
/// owned by `apply_context_update`/`apply_tool_event`/the factory.
fn merge_session(existing: Session, incoming: Session) -> Session {
    Session {
        session_id: incoming.session_id,
        source: incoming.source,
        title: incoming.title.or(existing.title),
        transcript_path: incoming.transcript_path.or(existing.transcript_path),
        cwd: incoming.cwd,
        project_label: incoming.project_label,
        model: if incoming.model.id.is_empty() {
            existing.model
        } else {
            incoming.model
        },
        terminal: merge_terminal(existing.terminal, incoming.terminal),
        terminal_key: richer_terminal_key(&existing.terminal_key, incoming.terminal_key),
        status: existing.status,
        last_activity: incoming.last_activity.max(existing.last_activity),
        registered_at: existing.registered_at,
        context: existing.context,
        auto_compact: existing.auto_compact,
        mode: incoming.mode,
        is_bypass: existing.is_bypass || incoming.is_bypass,
        last_tool_name: existing.last_tool_name,
        git_branch: incoming.git_branch.or(existing.git_branch),
        git_worktree: incoming.git_worktree.or(existing.git_worktree),
        git_repo_root: incoming.git_repo_root.or(existing.git_repo_root),
    }
}

/// Picks the richer of two terminal keys (spec §3 invariant ii: never
/// downgraded). `AUTO:` is the only form below `DISCOVERED:PID:`, so an
/// incoming `AUTO:` key never displaces an existing `DISCOVERED:PID:` one;
/// any other pairing takes the incoming key as the more current value.
fn richer_terminal_key(existing: &str, incoming: String) -> String {
    if !crate::terminal::TerminalKey::is_auto(existing) && crate::terminal::TerminalKey::is_auto(&incoming) {
        existing.to_string()
    } else {
        incoming
    }
}

fn merge_terminal(existing: TerminalDescriptor, incoming: TerminalDescriptor) -> TerminalDescriptor {
    TerminalDescriptor {
        tty: incoming.tty.or(existing.tty),
        terminal_pid: incoming.terminal_pid.or(existing.terminal_pid),
        terminal_program: incoming.terminal_program.or(existing.terminal_program),
        tmux_session: incoming.tmux_session.or(existing.tmux_session),
        tmux_pane: incoming.tmux_pane.or(existing.tmux_pane),
        tmux_window: incoming.tmux_window.or(existing.tmux_window),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::factory::from_hook_start;

    #[test]
    fn register_rejects_already_ended() {
        let mut registry = SessionRegistry::new();
        let session = from_hook_start("s1", "/repo", 1, Some(1));
        let err = registry.upsert(session, true).unwrap_err();
        assert!(matches!(err, Error::AlreadyEnded { .. }));
    }

    #[test]
    fn re_registration_merges_non_null_fields() {
        let mut registry = SessionRegistry::new();
        let first = from_hook_start("s1", "/repo", 1, Some(1));
        registry.upsert(first, false).unwrap();

        let mut second = from_hook_start("s1", "/repo", 2, None);
        second.title = Some("resumed".to_string());
        registry.upsert(second, false).unwrap();

        let merged = registry.get("s1").unwrap();
        assert_eq!(merged.title.as_deref(), Some("resumed"));
        assert_eq!(merged.terminal.terminal_pid, Some(1));
    }

    #[test]
    fn re_registration_never_downgrades_terminal_key() {
        let mut registry = SessionRegistry::new();
        let mut first = from_hook_start("s1", "/repo", 1, None);
        first.terminal_key = crate::terminal::TerminalKey::discovered(42);
        registry.upsert(first, false).unwrap();

        let mut second = from_hook_start("s1", "/repo", 2, None);
        second.terminal_key = crate::terminal::TerminalKey::new_auto();
        registry.upsert(second, false).unwrap();

        let merged = registry.get("s1").unwrap();
        assert_eq!(merged.terminal_key, "DISCOVERED:PID:42");
    }

    #[test]
    fn tool_start_then_end_returns_to_active() {
        let mut registry = SessionRegistry::new();
        registry
            .upsert(from_hook_start("s1", "/repo", 1, Some(1)), false)
            .unwrap();

        let working = registry
            .apply_tool_event("s1", ToolPhase::Start, Some("Read".to_string()), 2)
            .unwrap();
        assert_eq!(working, SessionState::Working);

        let active = registry.apply_tool_event("s1", ToolPhase::End, None, 3).unwrap();
        assert_eq!(active, SessionState::Active);
    }

    #[test]
    fn permission_request_sets_awaiting() {
        let mut registry = SessionRegistry::new();
        registry
            .upsert(from_hook_start("s1", "/repo", 1, Some(1)), false)
            .unwrap();

        let status = registry
            .apply_tool_event("s1", ToolPhase::PermissionRequest, None, 2)
            .unwrap();
        assert_eq!(status, SessionState::Awaiting);
    }

    #[test]
    fn idle_sweep_only_touches_stale_sessions() {
        let mut registry = SessionRegistry::new();
        registry
            .upsert(from_hook_start("s1", "/repo", 0, Some(1)), false)
            .unwrap();

        let went_idle = registry.apply_idle_sweep(10_000, 5_000);
        assert_eq!(went_idle, vec!["s1".to_string()]);
        assert_eq!(registry.get("s1").unwrap().status, SessionState::Idle);
    }

    #[test]
    fn set_focused_ignores_unknown_session() {
        let mut registry = SessionRegistry::new();
        registry.set_focused(Some("ghost".to_string()));
        assert!(registry.get_focused().is_none());
    }
}
