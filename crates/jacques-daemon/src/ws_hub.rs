//! WS Hub (spec §4.8): one TCP listener on `localhost:4242` serving two
//! connection roles over the same upgrade, distinguished per-message
//! rather than per-connection — a hook producer streams `HookEvent`
//! frames and may disconnect at any time; a TUI/GUI consumer receives an
//! `initial_state` push immediately on connect and may subsequently send
//! `ControlMessage` frames, each answered by a paired `ControlResult`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::DateTime;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use jacques_core::terminal::{self, LaunchOptions, TileLayout as CoreTileLayout, WindowOpResult};
use jacques_protocol::hook_event::{HookEvent, ToolPhase};
use jacques_protocol::{ControlMessage, ControlResult, TileLayout, WorktreeInfo, WsServerMessage};

use crate::registry_task::RegistryHandle;

/// Back-pressure ceiling per spec §4.8: a consumer whose outbound buffer
/// exceeds this is disconnected rather than left to buffer unboundedly.
const MAX_SEND_BUFFER_BYTES: usize = 1024 * 1024;
/// Cooperative budget for `focus_terminal` (spec §5): past this, the
/// control response reports a timeout and any later success is dropped.
const FOCUS_TIMEOUT: Duration = Duration::from_secs(3);

pub fn router(registry: RegistryHandle) -> Router {
    Router::new().route("/", get(upgrade)).with_state(registry)
}

async fn upgrade(ws: WebSocketUpgrade, State(registry): State<RegistryHandle>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, registry))
}

/// Per-connection outbound queue. The writer task is the sole owner of the
/// WS sink; `backlog` tracks bytes handed to the channel but not yet
/// flushed by that task, which is what spec §4.8's 1 MB ceiling is actually
/// measuring — not cumulative bytes ever sent.
#[derive(Clone)]
struct OutboundTx {
    tx: mpsc::UnboundedSender<String>,
    backlog: Arc<AtomicUsize>,
}

impl OutboundTx {
    /// Enqueues `payload`, unless doing so would push the backlog over the
    /// limit, in which case it reports the overflow without sending.
    fn send(&self, payload: String) -> bool {
        if self.backlog.load(Ordering::Acquire) > MAX_SEND_BUFFER_BYTES {
            return false;
        }
        self.backlog.fetch_add(payload.len(), Ordering::AcqRel);
        self.tx.send(payload).is_ok()
    }
}

/// Drains `rx` into the real WS sink, decrementing `backlog` once a frame
/// is actually flushed rather than merely queued.
async fn run_writer(mut sender: futures_util::stream::SplitSink<WebSocket, Message>, mut rx: mpsc::UnboundedReceiver<String>, backlog: Arc<AtomicUsize>) {
    while let Some(payload) = rx.recv().await {
        let len = payload.len();
        let ok = sender.send(Message::Text(payload)).await.is_ok();
        backlog.fetch_sub(len, Ordering::AcqRel);
        if !ok {
            break;
        }
    }
}

async fn handle_socket(socket: WebSocket, registry: RegistryHandle) {
    let (sink, mut receiver) = socket.split();
    let mut events = registry.subscribe();

    let (tx, rx) = mpsc::unbounded_channel();
    let backlog = Arc::new(AtomicUsize::new(0));
    let outbound = OutboundTx { tx, backlog: backlog.clone() };
    let writer = tokio::spawn(run_writer(sink, rx, backlog));

    let sessions = registry.list().await;
    let focused_id = registry.get_focused().await;
    if !send_json(&outbound, &WsServerMessage::InitialState { sessions, focused_id }) {
        drop(outbound);
        let _ = writer.await;
        return;
    }

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                let Some(Ok(message)) = incoming else { break };
                match message {
                    Message::Text(text) => {
                        if !handle_frame(&text, &registry, &outbound).await {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            delta = events.recv() => {
                match delta {
                    Ok(message) => {
                        let payload = match serde_json::to_string(&message) {
                            Ok(p) => p,
                            Err(_) => continue,
                        };
                        if !outbound.send(payload) {
                            warn!("consumer send buffer exceeded 1MB, disconnecting");
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "consumer lagged, some deltas were dropped (refetch via HTTP)");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    drop(outbound);
    let _ = writer.await;
    info!("WS connection closed");
}

/// Returns `false` when the connection should close.
async fn handle_frame(text: &str, registry: &RegistryHandle, outbound: &OutboundTx) -> bool {
    if let Ok(event) = serde_json::from_str::<HookEvent>(text) {
        apply_hook_event(registry, event).await;
        return true;
    }

    match serde_json::from_str::<ControlMessage>(text) {
        Ok(control) => {
            let result = handle_control_message(registry, control).await;
            send_json(outbound, &result)
        }
        Err(err) => {
            debug!(error = %err, "dropped malformed WS frame");
            true
        }
    }
}

fn send_json(outbound: &OutboundTx, message: &impl serde::Serialize) -> bool {
    let payload = serde_json::to_string(message).unwrap_or_default();
    outbound.send(payload)
}

fn parse_recorded_at(recorded_at: &str) -> i64 {
    DateTime::parse_from_rfc3339(recorded_at)
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|_| chrono::Utc::now().timestamp_millis())
}

async fn apply_hook_event(registry: &RegistryHandle, event: HookEvent) {
    if let Err(err) = event.validate() {
        debug!(error = %err, "rejected malformed hook event");
        return;
    }

    let now_ms = parse_recorded_at(&event.meta().recorded_at);
    let session_id = event.session_id().to_string();

    match event {
        HookEvent::SessionStart(start) => {
            let cwd = start.meta.cwd.clone().unwrap_or_default();
            let mut session = jacques_core::session::from_hook_start(&session_id, &cwd, now_ms, start.terminal_pid);
            session.source = start.source;
            session.title = start.title;
            session.transcript_path = start.transcript_path;
            session.terminal.tty = start.tty;
            session.terminal.terminal_program = start.terminal_program;
            session.terminal.tmux_session = start.tmux_session;
            session.terminal.tmux_pane = start.tmux_pane;
            session.terminal.tmux_window = start.tmux_window;
            session.model.id = start.model_id.unwrap_or_default();
            session.model.display_name = start.model_display_name.unwrap_or_default();
            session.mode = start.mode;
            session.git_branch = start.git_branch;
            session.git_worktree = start.git_worktree;
            session.git_repo_root = start.git_repo_root;
            session.is_bypass = start.is_bypass || registry.take_pending_bypass(&cwd, now_ms).await;

            if let Err(err) = registry.upsert(session, now_ms).await {
                debug!(error = %err, session_id, "session_start rejected");
            }
        }
        HookEvent::SessionEnd(_) => {
            if let Err(err) = registry.end(&session_id, now_ms).await {
                debug!(error = %err, session_id, "session_end on unknown session");
            }
        }
        HookEvent::ContextUpdate(update) => {
            let cwd = update.meta.cwd.clone().unwrap_or_default();
            let result = registry
                .apply_context_update(&session_id, update.context, Some(update.auto_compact), now_ms)
                .await;
            if result.is_err() {
                debug!(session_id, "context_update for unknown session; registering from scratch");
                let session = jacques_core::session::from_context_update(&session_id, &cwd, update.context, now_ms);
                let _ = registry.upsert(session, now_ms).await;
            }
        }
        HookEvent::ToolEvent(tool) => {
            let _ = registry.apply_tool_event(&session_id, tool.phase, tool.tool_name, now_ms).await;
            if tool.phase == ToolPhase::Start {
                registry.on_operation_complete(&session_id, 0, now_ms).await;
            }
        }
        HookEvent::PromptSubmit(_) => {
            debug!(session_id, "prompt_submit received");
        }
        HookEvent::HandoffReady(_) => {
            registry.on_handoff_ready(&session_id, now_ms).await;
        }
    }
}

async fn handle_control_message(registry: &RegistryHandle, message: ControlMessage) -> ControlResult {
    match message {
        ControlMessage::FocusTerminal { session_id } => focus_terminal(registry, session_id).await,
        ControlMessage::TileWindows { session_ids, layout } => tile_windows(registry, session_ids, layout).await,
        ControlMessage::MaximizeWindow { session_id } => maximize_window(registry, session_id).await,
        ControlMessage::LaunchSession { cwd, dangerously_skip_permissions } => {
            launch_session(registry, cwd, dangerously_skip_permissions).await
        }
        ControlMessage::ListWorktrees { project_path } => list_worktrees(project_path).await,
        ControlMessage::CreateWorktree { project_path, branch } => create_worktree(project_path, branch).await,
        ControlMessage::RemoveWorktree { project_path, worktree_path } => {
            remove_worktree(project_path, worktree_path).await
        }
    }
}

async fn focus_terminal(registry: &RegistryHandle, session_id: String) -> ControlResult {
    let Some(session) = registry.get(&session_id).await else {
        return ControlResult::FocusTerminalResult {
            success: false,
            method: "not_found".to_string(),
            error: Some(format!("unknown session: {session_id}")),
        };
    };
    let pid = session.terminal.terminal_pid;

    let work = tokio::task::spawn_blocking(move || terminal::focus_terminal(pid));
    let outcome = match timeout(FOCUS_TIMEOUT, work).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => WindowOpResult {
            success: false,
            method: "internal_error".to_string(),
            error: Some("focus task panicked".to_string()),
        },
        Err(_) => WindowOpResult {
            success: false,
            method: "timeout".to_string(),
            error: None,
        },
    };

    if outcome.success {
        registry.set_focused(Some(session_id)).await;
    }

    ControlResult::FocusTerminalResult {
        success: outcome.success,
        method: outcome.method,
        error: outcome.error,
    }
}

fn to_core_layout(layout: Option<TileLayout>) -> CoreTileLayout {
    match layout {
        Some(TileLayout::Rows) => CoreTileLayout::Rows,
        Some(TileLayout::Columns) => CoreTileLayout::Columns,
        _ => CoreTileLayout::Grid,
    }
}

async fn tile_windows(registry: &RegistryHandle, session_ids: Vec<String>, layout: Option<TileLayout>) -> ControlResult {
    let mut pids = Vec::with_capacity(session_ids.len());
    for id in &session_ids {
        if let Some(session) = registry.get(id).await {
            if let Some(pid) = session.terminal.terminal_pid {
                pids.push(pid);
            }
        }
    }
    let core_layout = to_core_layout(layout);

    let outcome = tokio::task::spawn_blocking(move || terminal::tile_windows(&pids, core_layout))
        .await
        .unwrap_or_else(|_| WindowOpResult {
            success: false,
            method: "internal_error".to_string(),
            error: Some("tile task panicked".to_string()),
        });

    ControlResult::TileWindowsResult {
        success: outcome.success,
        method: outcome.method,
        error: outcome.error,
    }
}

async fn maximize_window(registry: &RegistryHandle, session_id: String) -> ControlResult {
    let Some(session) = registry.get(&session_id).await else {
        return ControlResult::MaximizeWindowResult {
            success: false,
            method: "not_found".to_string(),
            error: Some(format!("unknown session: {session_id}")),
        };
    };
    let pid = session.terminal.terminal_pid;

    let outcome = tokio::task::spawn_blocking(move || terminal::maximize_window(pid))
        .await
        .unwrap_or_else(|_| WindowOpResult {
            success: false,
            method: "internal_error".to_string(),
            error: Some("maximize task panicked".to_string()),
        });

    ControlResult::MaximizeWindowResult {
        success: outcome.success,
        method: outcome.method,
        error: outcome.error,
    }
}

async fn launch_session(registry: &RegistryHandle, cwd: String, dangerously_skip_permissions: bool) -> ControlResult {
    if dangerously_skip_permissions {
        registry.mark_pending_bypass(&cwd, chrono::Utc::now().timestamp_millis()).await;
    }

    let options = LaunchOptions {
        cwd,
        preferred_terminal: None,
        dangerously_skip_permissions,
    };

    let result = tokio::task::spawn_blocking(move || terminal::launch_terminal_session(&options))
        .await
        .unwrap_or_else(|_| terminal::LaunchResult {
            success: false,
            method: "internal_error".to_string(),
            error: Some("launch task panicked".to_string()),
            pid: None,
        });

    ControlResult::LaunchSessionResult {
        success: result.success,
        method: result.method,
        error: result.error,
        pid: result.pid,
    }
}

fn to_wire_worktree(worktree: jacques_core::project_identity::Worktree) -> WorktreeInfo {
    WorktreeInfo {
        path: worktree.path,
        branch: worktree.branch,
        is_main: worktree.is_main,
    }
}

async fn list_worktrees(project_path: String) -> ControlResult {
    let result = tokio::task::spawn_blocking(move || jacques_core::project_identity::list_worktrees(&project_path)).await;
    match result {
        Ok(Ok(worktrees)) => ControlResult::ListWorktreesResult {
            success: true,
            error: None,
            worktrees: worktrees.into_iter().map(to_wire_worktree).collect(),
        },
        Ok(Err(err)) => ControlResult::ListWorktreesResult {
            success: false,
            error: Some(err),
            worktrees: Vec::new(),
        },
        Err(_) => ControlResult::ListWorktreesResult {
            success: false,
            error: Some("list_worktrees task panicked".to_string()),
            worktrees: Vec::new(),
        },
    }
}

async fn create_worktree(project_path: String, branch: String) -> ControlResult {
    let result =
        tokio::task::spawn_blocking(move || jacques_core::project_identity::create_worktree(&project_path, &branch)).await;
    match result {
        Ok(Ok(worktree)) => ControlResult::CreateWorktreeResult {
            success: true,
            error: None,
            worktree: Some(to_wire_worktree(worktree)),
        },
        Ok(Err(err)) => ControlResult::CreateWorktreeResult {
            success: false,
            error: Some(err),
            worktree: None,
        },
        Err(_) => ControlResult::CreateWorktreeResult {
            success: false,
            error: Some("create_worktree task panicked".to_string()),
            worktree: None,
        },
    }
}

async fn remove_worktree(project_path: String, worktree_path: String) -> ControlResult {
    let result = tokio::task::spawn_blocking(move || {
        jacques_core::project_identity::remove_worktree(&project_path, &worktree_path)
    })
    .await;
    match result {
        Ok(Ok(())) => ControlResult::RemoveWorktreeResult { success: true, error: None },
        Ok(Err(err)) => ControlResult::RemoveWorktreeResult {
            success: false,
            error: Some(err),
        },
        Err(_) => ControlResult::RemoveWorktreeResult {
            success: false,
            error: Some("remove_worktree task panicked".to_string()),
        },
    }
}

pub async fn serve(registry: RegistryHandle, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(registry);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "WS Hub listening");
    axum::serve(listener, app).await
}
