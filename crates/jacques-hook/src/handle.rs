//! Translates one assistant lifecycle hook invocation (JSON on stdin, the
//! shape Claude Code's own hook runner produces) into a jacques
//! [`HookEvent`] and forwards it to the WS Hub.

use std::io::Read;

use chrono::Utc;
use jacques_protocol::hook_event::{
    ContextUpdateEvent, EventMeta, HookEvent, PromptSubmitEvent, SessionEndEvent, SessionStartEvent,
    ToolEventEvent, ToolPhase,
};
use jacques_protocol::{ContextMetrics, Mode, SourceTag};
use serde::Deserialize;

use crate::daemon_client;

/// Raw hook payload. Every field besides `hook_event_name` is optional:
/// different event kinds populate different subsets, and an unrecognised
/// future field is simply ignored by serde's default struct behaviour.
#[derive(Debug, Deserialize)]
struct ClaudeHookInput {
    hook_event_name: String,
    session_id: Option<String>,
    cwd: Option<String>,
    transcript_path: Option<String>,
    tool_name: Option<String>,
    #[serde(default)]
    notification_type: Option<String>,
    #[serde(default)]
    stop_hook_active: bool,
    model_id: Option<String>,
    model_display_name: Option<String>,
    #[serde(default)]
    permission_mode: Option<String>,
}

pub async fn run() -> Result<(), String> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .map_err(|e| format!("failed to read stdin: {e}"))?;

    if input.trim().is_empty() {
        return Ok(());
    }

    let hook_input: ClaudeHookInput =
        serde_json::from_str(&input).map_err(|e| format!("failed to parse hook input: {e}"))?;

    let Some(session_id) = hook_input.session_id.clone() else {
        tracing::debug!(event = %hook_input.hook_event_name, "skipping hook event without session_id");
        return Ok(());
    };

    let meta = EventMeta {
        session_id: session_id.clone(),
        recorded_at: Utc::now().to_rfc3339(),
        pid: Some(parent_pid()),
        cwd: hook_input.cwd.clone(),
    };

    let Some(event) = to_hook_event(&hook_input, meta) else {
        tracing::debug!(event = %hook_input.hook_event_name, "no jacques event mapping, skipping");
        return Ok(());
    };

    daemon_client::send_event(&event).await?;

    if matches!(hook_input.hook_event_name.as_str(), "PreToolUse" | "PostToolUse" | "Stop") {
        if let Some(context_event) = context_update_event(&hook_input, &session_id) {
            let _ = daemon_client::send_event(&context_event).await;
        }
    }

    Ok(())
}

fn to_hook_event(input: &ClaudeHookInput, meta: EventMeta) -> Option<HookEvent> {
    match input.hook_event_name.as_str() {
        "SessionStart" => Some(HookEvent::SessionStart(SessionStartEvent {
            meta,
            source: SourceTag::ClaudeCode,
            title: None,
            transcript_path: input.transcript_path.clone(),
            tty: resolve_tty(),
            terminal_pid: Some(parent_pid()),
            terminal_program: std::env::var("TERM_PROGRAM").ok(),
            tmux_session: std::env::var("TMUX").ok().and(tmux_session_name()),
            tmux_pane: std::env::var("TMUX_PANE").ok(),
            tmux_window: None,
            model_id: input.model_id.clone(),
            model_display_name: input.model_display_name.clone(),
            mode: mode_from_permission(input.permission_mode.as_deref()),
            is_bypass: input.permission_mode.as_deref() == Some("bypassPermissions"),
            git_branch: input.cwd.as_deref().and_then(resolve_git_branch),
            git_worktree: None,
            git_repo_root: input
                .cwd
                .as_deref()
                .and_then(jacques_core::project_identity::resolve_project_identity)
                .map(|identity| identity.project_path),
        })),
        "SessionEnd" => Some(HookEvent::SessionEnd(SessionEndEvent { meta, reason: None })),
        "UserPromptSubmit" => Some(HookEvent::PromptSubmit(PromptSubmitEvent { meta })),
        "PreToolUse" => Some(HookEvent::ToolEvent(ToolEventEvent {
            meta,
            phase: ToolPhase::Start,
            tool_name: input.tool_name.clone(),
        })),
        "PostToolUse" => Some(HookEvent::ToolEvent(ToolEventEvent {
            meta,
            phase: ToolPhase::End,
            tool_name: input.tool_name.clone(),
        })),
        "Notification" if is_permission_notification(input.notification_type.as_deref()) => {
            Some(HookEvent::ToolEvent(ToolEventEvent {
                meta,
                phase: ToolPhase::PermissionRequest,
                tool_name: None,
            }))
        }
        // Stop (turn end), PreCompact, subagent lifecycle, and other
        // notification subtypes have no direct jacques event; the registry
        // instead relies on the process monitor's idle timeout for these.
        _ => None,
    }
}

fn is_permission_notification(notification_type: Option<&str>) -> bool {
    matches!(notification_type, Some("permission_request") | Some("permission_needed"))
}

fn mode_from_permission(permission_mode: Option<&str>) -> Mode {
    match permission_mode {
        Some("plan") => Mode::Plan,
        Some("acceptEdits") => Mode::AcceptEdits,
        _ => Mode::Default,
    }
}

/// Best-effort context metrics by parsing the session's own transcript file
/// locally (fast: one file, already on disk). Failure yields no event
/// rather than an error — the daemon already falls back to its own
/// catalog-driven parse for anything this misses.
fn context_update_event(input: &ClaudeHookInput, session_id: &str) -> Option<HookEvent> {
    let transcript_path = input.transcript_path.as_ref()?;
    let (entries, _skipped) = jacques_core::transcript::parse_transcript(std::path::Path::new(transcript_path)).ok()?;
    let stats = jacques_core::transcript::get_entry_statistics(&entries);

    let context = ContextMetrics {
        window_size: 200_000,
        used_tokens: stats.last_turn_input_tokens,
        used_percentage: (stats.last_turn_input_tokens as f64 / 200_000.0 * 100.0).min(100.0),
        is_estimate: false,
        total_input_tokens: stats.total_input_tokens,
    };

    Some(HookEvent::ContextUpdate(ContextUpdateEvent {
        meta: EventMeta {
            session_id: session_id.to_string(),
            recorded_at: Utc::now().to_rfc3339(),
            pid: Some(parent_pid()),
            cwd: input.cwd.clone(),
        },
        context,
        auto_compact: Default::default(),
    }))
}

fn resolve_git_branch(cwd: &str) -> Option<String> {
    jacques_core::project_identity::resolve_project_identity(cwd)
        .and_then(|identity| jacques_core::project_identity::current_branch(&identity.project_path))
}

fn resolve_tty() -> Option<String> {
    std::env::var("TTY").ok().filter(|v| !v.is_empty())
}

fn tmux_session_name() -> Option<String> {
    std::process::Command::new("tmux")
        .args(["display-message", "-p", "#S"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parent_pid() -> u32 {
    #[cfg(unix)]
    {
        // SAFETY: getppid() takes no arguments and cannot fail.
        unsafe { libc::getppid() as u32 }
    }
    #[cfg(not(unix))]
    {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> EventMeta {
        EventMeta {
            session_id: "sess-1".to_string(),
            recorded_at: "2026-01-01T00:00:00Z".to_string(),
            pid: Some(1234),
            cwd: Some("/tmp/project".to_string()),
        }
    }

    fn input(hook_event_name: &str) -> ClaudeHookInput {
        ClaudeHookInput {
            hook_event_name: hook_event_name.to_string(),
            session_id: Some("sess-1".to_string()),
            cwd: Some("/tmp/project".to_string()),
            transcript_path: None,
            tool_name: None,
            notification_type: None,
            stop_hook_active: false,
            model_id: None,
            model_display_name: None,
            permission_mode: None,
        }
    }

    #[test]
    fn maps_session_start_and_end() {
        assert!(matches!(to_hook_event(&input("SessionStart"), meta()), Some(HookEvent::SessionStart(_))));
        assert!(matches!(to_hook_event(&input("SessionEnd"), meta()), Some(HookEvent::SessionEnd(_))));
    }

    #[test]
    fn maps_tool_use_phases() {
        let mut pre = input("PreToolUse");
        pre.tool_name = Some("Bash".to_string());
        match to_hook_event(&pre, meta()) {
            Some(HookEvent::ToolEvent(event)) => {
                assert_eq!(event.phase, ToolPhase::Start);
                assert_eq!(event.tool_name.as_deref(), Some("Bash"));
            }
            other => panic!("expected ToolEvent, got {other:?}"),
        }

        let post = input("PostToolUse");
        assert!(matches!(
            to_hook_event(&post, meta()),
            Some(HookEvent::ToolEvent(event)) if event.phase == ToolPhase::End
        ));
    }

    #[test]
    fn maps_permission_notification_but_skips_other_notifications() {
        let mut permission = input("Notification");
        permission.notification_type = Some("permission_request".to_string());
        assert!(matches!(
            to_hook_event(&permission, meta()),
            Some(HookEvent::ToolEvent(event)) if event.phase == ToolPhase::PermissionRequest
        ));

        let mut idle = input("Notification");
        idle.notification_type = Some("idle_reminder".to_string());
        assert!(to_hook_event(&idle, meta()).is_none());
    }

    #[test]
    fn skips_hook_kinds_without_a_mapping() {
        assert!(to_hook_event(&input("PreCompact"), meta()).is_none());
        assert!(to_hook_event(&input("SubagentStop"), meta()).is_none());
    }

    #[test]
    fn mode_from_permission_maps_known_modes() {
        assert_eq!(mode_from_permission(Some("plan")), Mode::Plan);
        assert_eq!(mode_from_permission(Some("acceptEdits")), Mode::AcceptEdits);
        assert_eq!(mode_from_permission(Some("bypassPermissions")), Mode::Default);
        assert_eq!(mode_from_permission(None), Mode::Default);
    }
}
