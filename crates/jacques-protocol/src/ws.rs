//! Consumer-role WS messages: server-to-client deltas and the control plane.

use serde::{Deserialize, Serialize};

use crate::model::{NotificationItem, Session};

/// Deltas pushed by the daemon to a connected TUI/GUI consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsServerMessage {
    InitialState {
        sessions: Vec<Session>,
        focused_id: Option<String>,
    },
    SessionUpdate {
        session: Session,
    },
    SessionEnded {
        session_id: String,
    },
    FocusChanged {
        session_id: Option<String>,
    },
    NotificationFired {
        notification: NotificationItem,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileLayout {
    Grid,
    Rows,
    Columns,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorktreeInfo {
    pub path: String,
    pub branch: Option<String>,
    pub is_main: bool,
}

/// Control messages a consumer may send after connecting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    FocusTerminal {
        session_id: String,
    },
    TileWindows {
        session_ids: Vec<String>,
        #[serde(default)]
        layout: Option<TileLayout>,
    },
    MaximizeWindow {
        session_id: String,
    },
    LaunchSession {
        cwd: String,
        #[serde(default)]
        dangerously_skip_permissions: bool,
    },
    ListWorktrees {
        project_path: String,
    },
    CreateWorktree {
        project_path: String,
        branch: String,
    },
    RemoveWorktree {
        project_path: String,
        worktree_path: String,
    },
}

/// The paired response for every `ControlMessage` variant (spec §4.8);
/// never closes the connection, even on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlResult {
    FocusTerminalResult {
        success: bool,
        method: String,
        error: Option<String>,
    },
    TileWindowsResult {
        success: bool,
        method: String,
        error: Option<String>,
    },
    MaximizeWindowResult {
        success: bool,
        method: String,
        error: Option<String>,
    },
    LaunchSessionResult {
        success: bool,
        method: String,
        error: Option<String>,
        pid: Option<u32>,
    },
    ListWorktreesResult {
        success: bool,
        error: Option<String>,
        worktrees: Vec<WorktreeInfo>,
    },
    CreateWorktreeResult {
        success: bool,
        error: Option<String>,
        worktree: Option<WorktreeInfo>,
    },
    RemoveWorktreeResult {
        success: bool,
        error: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_message_round_trips_with_type_tag() {
        let msg = ControlMessage::FocusTerminal {
            session_id: "s1".to_string(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "focus_terminal");
        let parsed: ControlMessage = serde_json::from_value(json).unwrap();
        match parsed {
            ControlMessage::FocusTerminal { session_id } => assert_eq!(session_id, "s1"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn control_result_timeout_shape() {
        let result = ControlResult::FocusTerminalResult {
            success: false,
            method: "timeout".to_string(),
            error: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["type"], "focus_terminal_result");
        assert_eq!(json["success"], false);
        assert_eq!(json["method"], "timeout");
    }
}
