//! The single-writer registry task (spec §5): every mutation of the
//! Session Registry, Cleanup Service, pending-bypass map, and Notification
//! Engine is serialised onto this task via an `mpsc` channel, so registry
//! state transitions stay linearisable no matter how many workers (WS
//! producers, the process monitor, the cleanup sweep, HTTP handlers) feed
//! it concurrently. Broadcasts to consumers are issued from here, after
//! the mutation that produced them has committed.
//!
//! Liveness/bypass checks (`libc::kill(pid, 0)`, a `/proc` cmdline read)
//! are plain syscalls, not the suspension points spec §5 calls out —
//! process *enumeration* (the `sysinfo` refresh) is the expensive part,
//! so that alone is done by the monitor task before it sends
//! [`Command::RunMonitorPass`] in here.

use tokio::sync::{broadcast, mpsc, oneshot};

use jacques_core::error::Result;
use jacques_core::notify::NotificationEngine;
use jacques_core::process::ClaudeProcess;
use jacques_core::session::{self, CleanupService, PendingBypassMap, SessionRegistry, UpsertOutcome};
use jacques_protocol::hook_event::ToolPhase;
use jacques_protocol::{
    AutoCompactDescriptor, ContextMetrics, NotificationItem, NotificationSettings, Session,
    SessionState, WsServerMessage,
};

const BROADCAST_CAPACITY: usize = 256;
const COMMAND_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Default)]
pub struct MonitorOutcome {
    pub retired_dead: Vec<String>,
    pub retired_trashed: Vec<String>,
    pub retired_idle: Vec<String>,
    pub enriched: Vec<(String, u32)>,
    pub enrichment_retired: Vec<String>,
    pub promoted_bypass: Vec<String>,
}

pub enum Command {
    Upsert {
        session: Session,
        now_ms: i64,
        reply: oneshot::Sender<Result<UpsertOutcome>>,
    },
    ApplyContextUpdate {
        session_id: String,
        context: ContextMetrics,
        auto_compact: Option<AutoCompactDescriptor>,
        now_ms: i64,
        reply: oneshot::Sender<Result<Vec<NotificationItem>>>,
    },
    ApplyToolEvent {
        session_id: String,
        phase: ToolPhase,
        tool_name: Option<String>,
        now_ms: i64,
        reply: oneshot::Sender<Result<SessionState>>,
    },
    End {
        session_id: String,
        now_ms: i64,
        reply: oneshot::Sender<Result<Session>>,
    },
    IdleSweep {
        now_ms: i64,
        idle_threshold_ms: i64,
        reply: oneshot::Sender<Vec<String>>,
    },
    List {
        reply: oneshot::Sender<Vec<Session>>,
    },
    Get {
        session_id: String,
        reply: oneshot::Sender<Option<Session>>,
    },
    SetFocused {
        session_id: Option<String>,
        reply: oneshot::Sender<()>,
    },
    GetFocused {
        reply: oneshot::Sender<Option<String>>,
    },
    RunMonitorPass {
        running: Vec<ClaudeProcess>,
        now_ms: i64,
        idle_timeout_ms: i64,
        reply: oneshot::Sender<MonitorOutcome>,
    },
    EvictExpiredTombstones {
        now_ms: i64,
    },
    MarkPendingBypass {
        cwd: String,
        now_ms: i64,
    },
    TakePendingBypass {
        cwd: String,
        now_ms: i64,
        reply: oneshot::Sender<bool>,
    },
    GetNotificationSettings {
        reply: oneshot::Sender<NotificationSettings>,
    },
    UpdateNotificationSettings {
        settings: NotificationSettings,
    },
    NotificationHistory {
        reply: oneshot::Sender<Vec<NotificationItem>>,
    },
    OnOperationComplete {
        session_id: String,
        token_count: u64,
        now_ms: i64,
    },
    OnHandoffReady {
        session_id: String,
        now_ms: i64,
    },
    OnPlanDetected {
        session_id: String,
        title: String,
        now_ms: i64,
    },
    OnAutoCompact {
        session_id: String,
        now_ms: i64,
    },
    RecordToolError {
        session_id: String,
        now_ms: i64,
    },
}

/// A cheap, cloneable front door onto the registry task. Every method
/// sends a command and awaits the paired reply; none of them touch the
/// registry directly.
#[derive(Clone)]
pub struct RegistryHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<WsServerMessage>,
}

impl RegistryHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<WsServerMessage> {
        self.events.subscribe()
    }

    async fn send<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> T {
        let (tx, rx) = oneshot::channel();
        let _ = self.commands.send(build(tx)).await;
        rx.await.unwrap_or_else(|_| panic!("registry task dropped a reply"))
    }

    pub async fn upsert(&self, session: Session, now_ms: i64) -> Result<UpsertOutcome> {
        self.send(|reply| Command::Upsert { session, now_ms, reply }).await
    }

    pub async fn apply_context_update(
        &self,
        session_id: &str,
        context: ContextMetrics,
        auto_compact: Option<AutoCompactDescriptor>,
        now_ms: i64,
    ) -> Result<Vec<NotificationItem>> {
        self.send(|reply| Command::ApplyContextUpdate {
            session_id: session_id.to_string(),
            context,
            auto_compact,
            now_ms,
            reply,
        })
        .await
    }

    pub async fn apply_tool_event(
        &self,
        session_id: &str,
        phase: ToolPhase,
        tool_name: Option<String>,
        now_ms: i64,
    ) -> Result<SessionState> {
        self.send(|reply| Command::ApplyToolEvent {
            session_id: session_id.to_string(),
            phase,
            tool_name,
            now_ms,
            reply,
        })
        .await
    }

    pub async fn end(&self, session_id: &str, now_ms: i64) -> Result<Session> {
        self.send(|reply| Command::End {
            session_id: session_id.to_string(),
            now_ms,
            reply,
        })
        .await
    }

    pub async fn idle_sweep(&self, now_ms: i64, idle_threshold_ms: i64) -> Vec<String> {
        self.send(|reply| Command::IdleSweep {
            now_ms,
            idle_threshold_ms,
            reply,
        })
        .await
    }

    pub async fn list(&self) -> Vec<Session> {
        self.send(|reply| Command::List { reply }).await
    }

    pub async fn get(&self, session_id: &str) -> Option<Session> {
        self.send(|reply| Command::Get {
            session_id: session_id.to_string(),
            reply,
        })
        .await
    }

    pub async fn set_focused(&self, session_id: Option<String>) {
        self.send(|reply| Command::SetFocused { session_id, reply }).await
    }

    pub async fn get_focused(&self) -> Option<String> {
        self.send(|reply| Command::GetFocused { reply }).await
    }

    /// Runs one full monitor pass (spec §4.5 steps 1-5) atomically on the
    /// registry task. `running` is a process-table snapshot the caller
    /// already captured outside this task.
    pub async fn run_monitor_pass(
        &self,
        running: Vec<ClaudeProcess>,
        now_ms: i64,
        idle_timeout_ms: i64,
    ) -> MonitorOutcome {
        self.send(|reply| Command::RunMonitorPass {
            running,
            now_ms,
            idle_timeout_ms,
            reply,
        })
        .await
    }

    pub async fn evict_expired_tombstones(&self, now_ms: i64) {
        let _ = self.commands.send(Command::EvictExpiredTombstones { now_ms }).await;
    }

    pub async fn mark_pending_bypass(&self, cwd: &str, now_ms: i64) {
        let _ = self
            .commands
            .send(Command::MarkPendingBypass {
                cwd: cwd.to_string(),
                now_ms,
            })
            .await;
    }

    pub async fn take_pending_bypass(&self, cwd: &str, now_ms: i64) -> bool {
        self.send(|reply| Command::TakePendingBypass {
            cwd: cwd.to_string(),
            now_ms,
            reply,
        })
        .await
    }

    pub async fn notification_settings(&self) -> NotificationSettings {
        self.send(|reply| Command::GetNotificationSettings { reply }).await
    }

    pub async fn update_notification_settings(&self, settings: NotificationSettings) {
        let _ = self.commands.send(Command::UpdateNotificationSettings { settings }).await;
    }

    pub async fn notification_history(&self) -> Vec<NotificationItem> {
        self.send(|reply| Command::NotificationHistory { reply }).await
    }

    pub async fn on_operation_complete(&self, session_id: &str, token_count: u64, now_ms: i64) {
        let _ = self
            .commands
            .send(Command::OnOperationComplete {
                session_id: session_id.to_string(),
                token_count,
                now_ms,
            })
            .await;
    }

    pub async fn on_handoff_ready(&self, session_id: &str, now_ms: i64) {
        let _ = self
            .commands
            .send(Command::OnHandoffReady {
                session_id: session_id.to_string(),
                now_ms,
            })
            .await;
    }

    pub async fn on_plan_detected(&self, session_id: &str, title: &str, now_ms: i64) {
        let _ = self
            .commands
            .send(Command::OnPlanDetected {
                session_id: session_id.to_string(),
                title: title.to_string(),
                now_ms,
            })
            .await;
    }

    pub async fn on_auto_compact(&self, session_id: &str, now_ms: i64) {
        let _ = self
            .commands
            .send(Command::OnAutoCompact {
                session_id: session_id.to_string(),
                now_ms,
            })
            .await;
    }

    pub async fn record_tool_error(&self, session_id: &str, now_ms: i64) {
        let _ = self
            .commands
            .send(Command::RecordToolError {
                session_id: session_id.to_string(),
                now_ms,
            })
            .await;
    }
}

struct RegistryState {
    registry: SessionRegistry,
    cleanup: CleanupService,
    pending_bypass: PendingBypassMap,
    notifications: NotificationEngine,
}

/// Spawns the registry task and returns a handle to it. The task runs
/// until every `RegistryHandle` clone (and its `commands` sender) is
/// dropped.
pub fn spawn(initial_settings: NotificationSettings) -> RegistryHandle {
    let (commands_tx, mut commands_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (events_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

    let handle = RegistryHandle {
        commands: commands_tx,
        events: events_tx.clone(),
    };

    tokio::spawn(async move {
        let mut state = RegistryState {
            registry: SessionRegistry::new(),
            cleanup: CleanupService::new(),
            pending_bypass: PendingBypassMap::new(),
            notifications: NotificationEngine::new(initial_settings),
        };

        while let Some(command) = commands_rx.recv().await {
            handle_command(&mut state, &events_tx, command);
        }
    });

    handle
}

fn broadcast(events_tx: &broadcast::Sender<WsServerMessage>, message: WsServerMessage) {
    // A consumer-less hub (no one connected yet) is not an error.
    let _ = events_tx.send(message);
}

fn broadcast_session(events_tx: &broadcast::Sender<WsServerMessage>, registry: &SessionRegistry, session_id: &str) {
    if let Some(session) = registry.get(session_id).cloned() {
        broadcast(events_tx, WsServerMessage::SessionUpdate { session });
    }
}

fn broadcast_ended(events_tx: &broadcast::Sender<WsServerMessage>, session_id: String) {
    broadcast(events_tx, WsServerMessage::SessionEnded { session_id });
}

fn handle_command(state: &mut RegistryState, events_tx: &broadcast::Sender<WsServerMessage>, command: Command) {
    match command {
        Command::Upsert { session, now_ms, reply } => {
            let session_id = session.session_id.clone();
            let already_ended = state.cleanup.was_recently_ended(&session_id, now_ms);
            let result = state.registry.upsert(session, already_ended);
            if result.is_ok() {
                broadcast_session(events_tx, &state.registry, &session_id);
            }
            let _ = reply.send(result);
        }
        Command::ApplyContextUpdate {
            session_id,
            context,
            auto_compact,
            now_ms,
            reply,
        } => {
            let result = state
                .registry
                .apply_context_update(&session_id, context, auto_compact, now_ms)
                .map(|()| {
                    let fired = state
                        .notifications
                        .apply_context_update(&session_id, context.used_percentage, now_ms);
                    for item in &fired {
                        broadcast(
                            events_tx,
                            WsServerMessage::NotificationFired {
                                notification: item.clone(),
                            },
                        );
                    }
                    broadcast_session(events_tx, &state.registry, &session_id);
                    fired
                });
            let _ = reply.send(result);
        }
        Command::ApplyToolEvent {
            session_id,
            phase,
            tool_name,
            now_ms,
            reply,
        } => {
            let result = state.registry.apply_tool_event(&session_id, phase, tool_name, now_ms);
            if result.is_ok() {
                broadcast_session(events_tx, &state.registry, &session_id);
            }
            let _ = reply.send(result);
        }
        Command::End {
            session_id,
            now_ms,
            reply,
        } => {
            let result = state.registry.end(&session_id);
            if result.is_ok() {
                state.cleanup.mark_ended(&session_id, now_ms);
                broadcast_ended(events_tx, session_id.clone());
            }
            let _ = reply.send(result);
        }
        Command::IdleSweep {
            now_ms,
            idle_threshold_ms,
            reply,
        } => {
            let went_idle = state.registry.apply_idle_sweep(now_ms, idle_threshold_ms);
            for id in &went_idle {
                broadcast_session(events_tx, &state.registry, id);
            }
            let _ = reply.send(went_idle);
        }
        Command::List { reply } => {
            let _ = reply.send(state.registry.list());
        }
        Command::Get { session_id, reply } => {
            let _ = reply.send(state.registry.get(&session_id).cloned());
        }
        Command::SetFocused { session_id, reply } => {
            state.registry.set_focused(session_id);
            broadcast(
                events_tx,
                WsServerMessage::FocusChanged {
                    session_id: state.registry.focused_id().map(str::to_string),
                },
            );
            let _ = reply.send(());
        }
        Command::GetFocused { reply } => {
            let _ = reply.send(state.registry.focused_id().map(str::to_string));
        }
        Command::RunMonitorPass {
            running,
            now_ms,
            idle_timeout_ms,
            reply,
        } => {
            let retired_dead = session::retire_dead_processes(&mut state.registry, jacques_core::process::is_process_running);
            let retired_trashed = session::retire_trashed(&mut state.registry);
            let retired_idle = session::retire_long_idle(&mut state.registry, now_ms, idle_timeout_ms);
            let (enriched, enrichment_retired) = session::enrich_pid_less_sessions(&mut state.registry, now_ms, &running);
            let promoted_bypass = session::promote_bypass(&mut state.registry, jacques_core::process::is_process_bypass);

            for id in retired_dead
                .iter()
                .chain(retired_trashed.iter())
                .chain(retired_idle.iter())
                .chain(enrichment_retired.iter())
            {
                state.cleanup.mark_ended(id, now_ms);
                broadcast_ended(events_tx, id.clone());
            }
            for (id, _) in &enriched {
                broadcast_session(events_tx, &state.registry, id);
            }
            for id in &promoted_bypass {
                broadcast_session(events_tx, &state.registry, id);
            }

            let _ = reply.send(MonitorOutcome {
                retired_dead,
                retired_trashed,
                retired_idle,
                enriched,
                enrichment_retired,
                promoted_bypass,
            });
        }
        Command::EvictExpiredTombstones { now_ms } => {
            state.cleanup.evict_expired(now_ms);
        }
        Command::MarkPendingBypass { cwd, now_ms } => {
            state.pending_bypass.mark(&cwd, now_ms);
        }
        Command::TakePendingBypass { cwd, now_ms, reply } => {
            let _ = reply.send(state.pending_bypass.take(&cwd, now_ms));
        }
        Command::GetNotificationSettings { reply } => {
            let _ = reply.send(state.notifications.settings().clone());
        }
        Command::UpdateNotificationSettings { settings } => {
            state.notifications.update_settings(settings);
        }
        Command::NotificationHistory { reply } => {
            let _ = reply.send(state.notifications.history().cloned().collect());
        }
        Command::OnOperationComplete {
            session_id,
            token_count,
            now_ms,
        } => {
            if let Some(item) = state.notifications.on_operation_complete(&session_id, token_count, now_ms) {
                broadcast(events_tx, WsServerMessage::NotificationFired { notification: item });
            }
        }
        Command::OnHandoffReady { session_id, now_ms } => {
            if let Some(item) = state.notifications.on_handoff_ready(&session_id, now_ms) {
                broadcast(events_tx, WsServerMessage::NotificationFired { notification: item });
            }
        }
        Command::OnPlanDetected {
            session_id,
            title,
            now_ms,
        } => {
            if let Some(item) = state.notifications.on_plan_detected(&session_id, &title, now_ms) {
                broadcast(events_tx, WsServerMessage::NotificationFired { notification: item });
            }
        }
        Command::OnAutoCompact { session_id, now_ms } => {
            if let Some(item) = state.notifications.on_auto_compact(&session_id, now_ms) {
                broadcast(events_tx, WsServerMessage::NotificationFired { notification: item });
            }
        }
        Command::RecordToolError { session_id, now_ms } => {
            if let Some(item) = state.notifications.record_tool_error(&session_id, now_ms) {
                broadcast(events_tx, WsServerMessage::NotificationFired { notification: item });
            }
        }
    }
}
