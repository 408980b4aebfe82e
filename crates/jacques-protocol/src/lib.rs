//! Wire types shared by the jacques daemon and its clients.
//!
//! This crate is shared by the daemon, the hook CLI, and any GUI/TUI client
//! to prevent schema drift. The daemon remains the authority on validation;
//! clients reuse the same types to construct valid requests.

pub mod hook_event;
pub mod model;
pub mod ws;

pub use hook_event::{EventMeta, HookEvent, ToolPhase};
pub use model::{
    AutoCompactDescriptor, CatalogPlan, ContextMetrics, ContextNoteRef, GlobalSessionIndex, Mode,
    ModelDescriptor, NotificationCategory, NotificationItem, NotificationPriority,
    NotificationSettings, PlanRef, PlanSource, ProjectIndex, Session, SessionEntry,
    SessionManifestSummary, SessionState, SourceTag, SubAgentRef, SubAgentType,
    TerminalDescriptor, WebSearchRecord,
};
pub use ws::{ControlMessage, ControlResult, TileLayout, WorktreeInfo, WsServerMessage};

/// Fixed TCP port the WS Hub listens on.
pub const WS_HUB_PORT: u16 = 4242;
/// Fixed TCP port the HTTP/SSE Gateway listens on.
pub const HTTP_GATEWAY_PORT: u16 = 4243;
