//! Producer-role events: what an assistant lifecycle hook sends to the WS Hub.
//!
//! Discriminated by the `type` field (serde's internal tag), matching the
//! event names named in spec §4.8 exactly, for wire compatibility.

use serde::{Deserialize, Serialize};

use crate::model::{AutoCompactDescriptor, ContextMetrics, Mode, SourceTag};

/// Fields common to every hook event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMeta {
    pub session_id: String,
    /// RFC3339 timestamp assigned by the hook process.
    pub recorded_at: String,
    pub pid: Option<u32>,
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPhase {
    Start,
    End,
    /// The session is requesting explicit user permission; drives the
    /// `awaiting` status transition (spec §4.4).
    PermissionRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStartEvent {
    #[serde(flatten)]
    pub meta: EventMeta,
    #[serde(default)]
    pub source: SourceTag,
    pub title: Option<String>,
    pub transcript_path: Option<String>,
    pub tty: Option<String>,
    pub terminal_pid: Option<u32>,
    pub terminal_program: Option<String>,
    pub tmux_session: Option<String>,
    pub tmux_pane: Option<String>,
    pub tmux_window: Option<String>,
    pub model_id: Option<String>,
    pub model_display_name: Option<String>,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub is_bypass: bool,
    pub git_branch: Option<String>,
    pub git_worktree: Option<String>,
    pub git_repo_root: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEndEvent {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextUpdateEvent {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub context: ContextMetrics,
    #[serde(default)]
    pub auto_compact: AutoCompactDescriptor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEventEvent {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub phase: ToolPhase,
    pub tool_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSubmitEvent {
    #[serde(flatten)]
    pub meta: EventMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffReadyEvent {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub handoff_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HookEvent {
    SessionStart(SessionStartEvent),
    SessionEnd(SessionEndEvent),
    ContextUpdate(ContextUpdateEvent),
    ToolEvent(ToolEventEvent),
    PromptSubmit(PromptSubmitEvent),
    HandoffReady(HandoffReadyEvent),
}

impl HookEvent {
    pub fn meta(&self) -> &EventMeta {
        match self {
            HookEvent::SessionStart(e) => &e.meta,
            HookEvent::SessionEnd(e) => &e.meta,
            HookEvent::ContextUpdate(e) => &e.meta,
            HookEvent::ToolEvent(e) => &e.meta,
            HookEvent::PromptSubmit(e) => &e.meta,
            HookEvent::HandoffReady(e) => &e.meta,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.meta().session_id
    }

    /// Validates the event well enough for the registry to trust it
    /// without re-checking field presence at every call site.
    pub fn validate(&self) -> Result<(), String> {
        let meta = self.meta();
        if meta.session_id.trim().is_empty() {
            return Err("session_id is required".to_string());
        }
        if chrono::DateTime::parse_from_rfc3339(&meta.recorded_at).is_err() {
            return Err("recorded_at must be RFC3339".to_string());
        }
        if let HookEvent::ToolEvent(event) = self {
            if event.phase != ToolPhase::PermissionRequest && event.tool_name.is_none() {
                return Err("tool_name is required for start/end tool events".to_string());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> EventMeta {
        EventMeta {
            session_id: "session-1".to_string(),
            recorded_at: "2026-01-30T12:00:00Z".to_string(),
            pid: Some(1234),
            cwd: Some("/repo".to_string()),
        }
    }

    #[test]
    fn rejects_missing_session_id() {
        let mut m = meta();
        m.session_id = String::new();
        let event = HookEvent::PromptSubmit(PromptSubmitEvent { meta: m });
        assert!(event.validate().is_err());
    }

    #[test]
    fn rejects_bad_timestamp() {
        let mut m = meta();
        m.recorded_at = "not-a-time".to_string();
        let event = HookEvent::SessionEnd(SessionEndEvent { meta: m, reason: None });
        assert!(event.validate().is_err());
    }

    #[test]
    fn tool_event_requires_name_unless_permission_request() {
        let event = HookEvent::ToolEvent(ToolEventEvent {
            meta: meta(),
            phase: ToolPhase::Start,
            tool_name: None,
        });
        assert!(event.validate().is_err());

        let event = HookEvent::ToolEvent(ToolEventEvent {
            meta: meta(),
            phase: ToolPhase::PermissionRequest,
            tool_name: None,
        });
        assert!(event.validate().is_ok());
    }

    #[test]
    fn round_trips_through_json_with_type_tag() {
        let event = HookEvent::SessionStart(SessionStartEvent {
            meta: meta(),
            source: SourceTag::ClaudeCode,
            title: None,
            transcript_path: None,
            tty: None,
            terminal_pid: None,
            terminal_program: None,
            tmux_session: None,
            tmux_pane: None,
            tmux_window: None,
            model_id: None,
            model_display_name: None,
            mode: Mode::Default,
            is_bypass: false,
            git_branch: None,
            git_worktree: None,
            git_repo_root: None,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "session_start");
        let parsed: HookEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.session_id(), "session-1");
    }
}
