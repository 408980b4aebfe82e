//! The daemon's data model, as it crosses the wire (WS deltas, HTTP DTOs).
//!
//! `jacques-core` owns the behavior over these types; this module only
//! fixes their shape so the daemon and every client agree on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────

/// Where a session's events originate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    ClaudeCode,
    Dispatch,
    Other,
}

impl Default for SourceTag {
    fn default() -> Self {
        SourceTag::Other
    }
}

/// A session's place in the status state machine (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Working,
    Awaiting,
    Idle,
}

/// Assistant operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Mode {
    Plan,
    AcceptEdits,
    Default,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Default
    }
}

/// Model identity, carried verbatim from the assistant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub display_name: String,
}

/// Live context-window usage, as last reported by the assistant.
///
/// `used_tokens`/`used_percentage` are last-turn values, not a running sum:
/// each assistant turn reports the full context, so summing would overcount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextMetrics {
    pub window_size: u64,
    pub used_tokens: u64,
    pub used_percentage: f64,
    pub is_estimate: bool,
    pub total_input_tokens: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoCompactDescriptor {
    pub enabled: bool,
    pub threshold_percent: f64,
    pub bug_threshold_percent: f64,
}

/// Terminal window the session is running in. Every field is best-effort
/// and may be unknown, e.g. for a session discovered by process scan before
/// any terminal integration reported in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalDescriptor {
    pub tty: Option<String>,
    pub terminal_pid: Option<u32>,
    pub terminal_program: Option<String>,
    pub tmux_session: Option<String>,
    pub tmux_pane: Option<String>,
    pub tmux_window: Option<String>,
}

/// The live record for one assistant process (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub source: SourceTag,
    pub title: Option<String>,
    pub transcript_path: Option<String>,
    pub cwd: String,
    pub project_label: String,
    pub model: ModelDescriptor,
    pub terminal: TerminalDescriptor,
    /// Discriminated string encoding how the session was observed. Used
    /// only for dedup tie-breaks and PID extraction; never an identity.
    pub terminal_key: String,
    pub status: SessionState,
    pub last_activity: i64,
    pub registered_at: i64,
    pub context: ContextMetrics,
    pub auto_compact: AutoCompactDescriptor,
    pub mode: Mode,
    pub is_bypass: bool,
    pub last_tool_name: Option<String>,
    pub git_branch: Option<String>,
    pub git_worktree: Option<String>,
    pub git_repo_root: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────
// Catalog / session history
// ─────────────────────────────────────────────────────────────────────────

/// Source of a `PlanRef`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    Embedded,
    Write,
    Agent,
}

/// A plan reference extracted from a transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRef {
    pub title: String,
    pub source: PlanSource,
    pub message_index: usize,
    pub file_path: Option<String>,
    pub catalog_id: Option<String>,
}

/// Catalog view of a past session (transcript on disk, not necessarily live).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEntry {
    pub session_id: String,
    pub source: SourceTag,
    pub title: Option<String>,
    pub transcript_path: String,
    pub project_label: String,
    pub size_bytes: u64,
    pub plans: Vec<PlanRef>,
    pub explore_agent_refs: Vec<String>,
    pub web_search_count: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub started_at: Option<i64>,
    pub updated_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextNoteRef {
    pub id: String,
    pub name: String,
    pub relative_path: String,
    pub size_bytes: u64,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogPlan {
    pub id: String,
    pub title: String,
    pub filename: String,
    pub content_hash: String,
    pub session_ids: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubAgentType {
    Exploration,
    Search,
    General,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentRef {
    pub id: String,
    pub session_id: String,
    pub agent_type: SubAgentType,
    pub title: String,
    pub token_cost: u64,
    pub result_count: Option<usize>,
    pub timestamp: i64,
}

/// One `WebSearch` transcript entry, surfaced as-is for the session detail
/// view (`GET /api/sessions/:id/web-searches`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchRecord {
    pub query: Option<String>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionManifestSummary {
    pub id: String,
    pub title: Option<String>,
    pub started_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub tool_call_count: usize,
    pub message_count: usize,
    pub mode: Mode,
    pub plan_ids: Vec<String>,
    pub saved_at: i64,
}

/// Per-project catalog persisted at `<project>/.jacques/index.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectIndex {
    pub context: Vec<ContextNoteRef>,
    pub plans: Vec<CatalogPlan>,
    pub sub_agents: Vec<SubAgentRef>,
    pub sessions: Vec<SessionManifestSummary>,
    pub updated_at: i64,
    pub active_plan_ids: Vec<String>,
}

/// Global index at `~/.jacques/session-index.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalSessionIndex {
    pub sessions: Vec<SessionEntry>,
    pub last_scanned: i64,
}

// ─────────────────────────────────────────────────────────────────────────
// Notifications
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationCategory {
    Context,
    Operation,
    Plan,
    AutoCompact,
    Handoff,
    BugAlert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationItem {
    pub id: String,
    pub category: NotificationCategory,
    pub title: String,
    pub body: String,
    pub priority: NotificationPriority,
    pub timestamp: i64,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub categories: std::collections::HashMap<NotificationCategory, bool>,
    pub large_operation_threshold: u64,
    pub context_thresholds: Vec<u8>,
    pub bug_alert_threshold: u32,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        use NotificationCategory::*;
        let mut categories = std::collections::HashMap::new();
        categories.insert(Context, true);
        categories.insert(Plan, true);
        categories.insert(AutoCompact, true);
        categories.insert(Handoff, true);
        // Disabled by default: retained in the wire format, no-op per spec §9.
        categories.insert(Operation, false);
        categories.insert(BugAlert, false);

        Self {
            enabled: true,
            categories,
            large_operation_threshold: 10_000,
            context_thresholds: vec![70, 85],
            bug_alert_threshold: 3,
        }
    }
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn from_timestamp_ms(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}
