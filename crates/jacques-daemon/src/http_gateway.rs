//! HTTP/SSE Gateway (spec §6): the REST surface for the TUI/GUI and for
//! one-shot tooling that doesn't want a WS connection. Long-running
//! operations (`/api/sync`, `/api/catalog/extract`) stream progress over
//! Server-Sent Events; everything else is a plain JSON request/response.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use fs_err as fs;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use jacques_core::archive;
use jacques_core::catalog::{self, ExtractProgress, IndexProgress, TranscriptFile};
use jacques_core::config::{self, JacquesConfig};
use jacques_core::transcript::{self, TaskSignal, TranscriptEntry};
use jacques_core::usage::UsageClient;
use jacques_core::Error;
use jacques_protocol::{
    CatalogPlan, ContextNoteRef, GlobalSessionIndex, NotificationSettings, ProjectIndex, Session,
    SessionEntry, SessionState, SubAgentRef, WebSearchRecord,
};

use crate::registry_task::RegistryHandle;

/// How long a catalog-extract request waits for another writer to finish
/// with the same project before reporting a conflict (spec §5).
const PROJECT_LOCK_WAIT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    registry: RegistryHandle,
    usage: Arc<AsyncMutex<UsageClient>>,
    project_locks: Arc<std::sync::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl AppState {
    pub fn new(registry: RegistryHandle) -> Self {
        Self {
            registry,
            usage: Arc::new(AsyncMutex::new(UsageClient::new())),
            project_locks: Arc::new(std::sync::Mutex::new(HashMap::new())),
        }
    }

    fn project_lock(&self, project_path: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.project_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(project_path.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }
}

struct AppError(Error);

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(serde_json::json!({
            "error": self.0.category(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

type HandlerResult<T> = std::result::Result<T, AppError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/by-project", get(sessions_by_project))
        .route("/api/sessions/stats", get(sessions_stats))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/badges", get(get_session_badges))
        .route("/api/sessions/:id/subagents/:agent_id", get(get_session_subagent))
        .route("/api/sessions/:id/web-searches", get(get_session_web_searches))
        .route("/api/sessions/:id/tasks", get(get_session_tasks))
        .route("/api/sessions/:id/plans/:message_index", get(get_session_plan_content))
        .route("/api/sessions/launch", post(launch_session))
        .route("/api/sessions/rebuild", post(rebuild_sessions))
        .route("/api/sync", post(sync_sessions))
        .route("/api/catalog/extract", post(extract_catalog))
        .route("/api/projects", get(list_projects))
        .route("/api/projects/:encoded_path/catalog", get(get_project_catalog))
        .route("/api/projects/:encoded_path", delete(delete_project))
        .route("/api/projects/:encoded_path/plans", get(get_project_plans))
        .route("/api/projects/:encoded_path/plans/:plan_id/content", get(get_project_plan_content))
        .route("/api/projects/:encoded_path/handoffs", get(get_project_handoffs))
        .route("/api/projects/:encoded_path/handoffs/:filename/content", get(get_project_handoff_content))
        .route("/api/projects/:encoded_path/active-plans", get(get_active_plans).post(post_active_plans))
        .route("/api/projects/:encoded_path/context", get(get_project_context).post(post_project_context))
        .route(
            "/api/projects/:encoded_path/context/:note_id",
            get(get_project_context_note).put(put_project_context_note).delete(delete_project_context_note),
        )
        .route("/api/archive/initialize", post(initialize_archive))
        .route("/api/archive/stats", get(get_archive_stats))
        .route("/api/archive/conversations", get(list_archive_conversations))
        .route("/api/archive/conversations/by-project", get(archive_conversations_by_project))
        .route("/api/archive/conversations/:id", get(get_archive_conversation))
        .route("/api/archive/search", post(search_archive))
        .route("/api/archive/subagents/:agent_id", get(get_archive_subagent))
        .route("/api/archive/sessions/:session_id/subagents", get(get_archive_session_subagents))
        .route("/api/usage", get(get_usage))
        .route("/api/notifications/settings", get(get_notification_settings).put(put_notification_settings))
        .route("/api/notifications/history", get(get_notification_history))
        .route("/api/config/root-path", get(get_root_path).put(put_root_path))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn list_sessions(State(state): State<AppState>) -> Json<Vec<jacques_protocol::Session>> {
    Json(state.registry.list().await)
}

async fn get_session(State(state): State<AppState>, AxumPath(id): AxumPath<String>) -> HandlerResult<Json<jacques_protocol::Session>> {
    state.registry.get(&id).await.map(Json).ok_or_else(|| AppError(Error::not_found(id)))
}

fn read_global_session_index() -> Option<GlobalSessionIndex> {
    let index_path = config::session_index_path()?;
    let bytes = fs::read(&index_path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// A live session's transcript path wins when the session is still
/// registered; otherwise fall back to the catalog view of a past session
/// with the same id (spec §6's session-detail subresources apply to both).
async fn resolve_transcript_path(state: &AppState, session_id: &str) -> Option<PathBuf> {
    if let Some(session) = state.registry.get(session_id).await {
        if let Some(path) = session.transcript_path {
            return Some(PathBuf::from(path));
        }
    }

    let index = read_global_session_index()?;
    index
        .sessions
        .into_iter()
        .find(|entry| entry.session_id == session_id)
        .map(|entry| PathBuf::from(entry.transcript_path))
}

fn parse_session_entries(path: &Path) -> Vec<TranscriptEntry> {
    transcript::parse_transcript(path).map(|(entries, _skipped)| entries).unwrap_or_default()
}

#[derive(Debug, Serialize)]
struct SessionBadges {
    plan_count: usize,
    task_pending_count: usize,
    task_in_progress_count: usize,
    sub_agent_count: usize,
    web_search_count: usize,
    is_bypass: bool,
}

/// `GET /api/sessions/:id/badges`: small counters a session list row shows
/// without loading the full transcript-derived detail views.
async fn get_session_badges(State(state): State<AppState>, AxumPath(id): AxumPath<String>) -> HandlerResult<Json<SessionBadges>> {
    let is_bypass = state.registry.get(&id).await.map(|s| s.is_bypass).unwrap_or(false);
    let path = resolve_transcript_path(&state, &id).await.ok_or_else(|| AppError(Error::not_found(id.clone())))?;
    let entries = parse_session_entries(&path);

    let plans = transcript::detect_mode_and_plans(&entries);
    let tasks = transcript::extract_task_signals(&entries);
    let sub_agents = catalog::extract_sub_agents(&entries, &id);
    let web_searches = transcript::extract_web_searches(&entries);

    Ok(Json(SessionBadges {
        plan_count: plans.len(),
        task_pending_count: tasks.iter().filter(|t| t.status == transcript::TaskStatus::Pending).count(),
        task_in_progress_count: tasks.iter().filter(|t| t.status == transcript::TaskStatus::InProgress).count(),
        sub_agent_count: sub_agents.len(),
        web_search_count: web_searches.len(),
        is_bypass,
    }))
}

/// `GET /api/sessions/:id/subagents/:agentId`.
async fn get_session_subagent(
    State(state): State<AppState>,
    AxumPath((id, agent_id)): AxumPath<(String, String)>,
) -> HandlerResult<Json<SubAgentRef>> {
    let path = resolve_transcript_path(&state, &id).await.ok_or_else(|| AppError(Error::not_found(id.clone())))?;
    let entries = parse_session_entries(&path);
    catalog::extract_sub_agents(&entries, &id)
        .into_iter()
        .find(|agent| agent.id == agent_id)
        .map(Json)
        .ok_or_else(|| AppError(Error::not_found(agent_id)))
}

/// `GET /api/sessions/:id/web-searches`.
async fn get_session_web_searches(State(state): State<AppState>, AxumPath(id): AxumPath<String>) -> HandlerResult<Json<Vec<WebSearchRecord>>> {
    let path = resolve_transcript_path(&state, &id).await.ok_or_else(|| AppError(Error::not_found(id)))?;
    let entries = parse_session_entries(&path);
    Ok(Json(transcript::extract_web_searches(&entries)))
}

/// `GET /api/sessions/:id/tasks`.
async fn get_session_tasks(State(state): State<AppState>, AxumPath(id): AxumPath<String>) -> HandlerResult<Json<Vec<TaskSignal>>> {
    let path = resolve_transcript_path(&state, &id).await.ok_or_else(|| AppError(Error::not_found(id)))?;
    let entries = parse_session_entries(&path);
    Ok(Json(transcript::extract_task_signals(&entries)))
}

#[derive(Debug, Serialize)]
struct PlanContentResponse {
    content: String,
}

/// `GET /api/sessions/:id/plans/:messageIndex`: the transcript text at the
/// entry a detected plan (embedded, write, or agent-sourced) points at.
async fn get_session_plan_content(
    State(state): State<AppState>,
    AxumPath((id, message_index)): AxumPath<(String, usize)>,
) -> HandlerResult<Json<PlanContentResponse>> {
    let path = resolve_transcript_path(&state, &id).await.ok_or_else(|| AppError(Error::not_found(id.clone())))?;
    let entries = parse_session_entries(&path);
    transcript::plan_text_at(&entries, message_index)
        .map(|content| Json(PlanContentResponse { content }))
        .ok_or_else(|| AppError(Error::not_found(format!("plan at message index {message_index}"))))
}

/// `POST /api/sessions/rebuild` (SSE): same rebuild `/api/sync` performs,
/// exposed under the name the session-detail views trigger it by.
async fn rebuild_sessions() -> Sse<impl Stream<Item = std::result::Result<Event, std::convert::Infallible>>> {
    sync_sessions().await
}

#[derive(Debug, Serialize)]
struct ProjectSessions {
    project_label: String,
    cwd: String,
    sessions: Vec<Session>,
}

/// `GET /api/sessions/by-project`: the live Session Registry grouped by
/// `cwd`, the same grouping the TUI uses to render per-project columns.
async fn sessions_by_project(State(state): State<AppState>) -> Json<Vec<ProjectSessions>> {
    let sessions = state.registry.list().await;
    let mut grouped: Vec<ProjectSessions> = Vec::new();

    for session in sessions {
        match grouped.iter_mut().find(|group| group.cwd == session.cwd) {
            Some(group) => group.sessions.push(session),
            None => grouped.push(ProjectSessions {
                project_label: session.project_label.clone(),
                cwd: session.cwd.clone(),
                sessions: vec![session],
            }),
        }
    }

    Json(grouped)
}

#[derive(Debug, Default, Serialize)]
struct SessionStats {
    total: usize,
    active: usize,
    working: usize,
    awaiting: usize,
    idle: usize,
    bypass: usize,
}

/// `GET /api/sessions/stats`: counts over the live registry, broken down by
/// [`SessionState`] — a cheap summary for a status-bar widget.
async fn sessions_stats(State(state): State<AppState>) -> Json<SessionStats> {
    let sessions = state.registry.list().await;
    let mut stats = SessionStats { total: sessions.len(), ..Default::default() };

    for session in &sessions {
        match session.status {
            SessionState::Active => stats.active += 1,
            SessionState::Working => stats.working += 1,
            SessionState::Awaiting => stats.awaiting += 1,
            SessionState::Idle => stats.idle += 1,
        }
        if session.is_bypass {
            stats.bypass += 1;
        }
    }

    Json(stats)
}

#[derive(Debug, Serialize)]
struct ProjectSummary {
    project_path: String,
    encoded_path: String,
    session_count: usize,
}

/// `GET /api/projects`: every project with a catalog entry in the global
/// session index, decoded back to its filesystem path.
async fn list_projects() -> Json<Vec<ProjectSummary>> {
    let Some(index_path) = config::session_index_path() else {
        return Json(Vec::new());
    };

    let Ok(bytes) = fs_err::read(&index_path) else {
        return Json(Vec::new());
    };
    let Ok(index): Result<jacques_protocol::GlobalSessionIndex, _> = serde_json::from_slice(&bytes) else {
        return Json(Vec::new());
    };

    let mut summaries: HashMap<String, ProjectSummary> = HashMap::new();
    for entry in &index.sessions {
        let Some(project_dir) = Path::new(&entry.transcript_path)
            .parent()
            .and_then(|dir| dir.file_name())
            .map(|name| name.to_string_lossy().to_string())
        else {
            continue;
        };
        let project_path = catalog::decode_project_path(&project_dir);
        summaries
            .entry(project_dir.clone())
            .or_insert_with(|| ProjectSummary { project_path, encoded_path: project_dir, session_count: 0 })
            .session_count += 1;
    }

    let mut summaries: Vec<ProjectSummary> = summaries.into_values().collect();
    summaries.sort_by(|a, b| a.project_path.cmp(&b.project_path));
    Json(summaries)
}

/// `DELETE /api/projects/:encoded_path`: drops the project's local catalog
/// index (`<project>/.jacques/index.json`). Does not touch transcripts or
/// the global session index, which is rebuilt wholesale by `/api/sync`.
async fn delete_project(AxumPath(encoded_path): AxumPath<String>) -> HandlerResult<StatusCode> {
    let project_path = catalog::decode_project_path(&encoded_path);
    let index_path = catalog::index_path(Path::new(&project_path));
    match fs_err::remove_file(&index_path) {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(StatusCode::NO_CONTENT),
        Err(err) => Err(AppError(Error::Internal(err.to_string()))),
    }
}

#[derive(Debug, Deserialize)]
struct LaunchSessionRequest {
    cwd: String,
    #[serde(default)]
    dangerously_skip_permissions: bool,
}

#[derive(Debug, Serialize)]
struct LaunchSessionResponse {
    success: bool,
    method: String,
    error: Option<String>,
    pid: Option<u32>,
}

async fn launch_session(State(state): State<AppState>, Json(request): Json<LaunchSessionRequest>) -> Json<LaunchSessionResponse> {
    if request.dangerously_skip_permissions {
        state
            .registry
            .mark_pending_bypass(&request.cwd, chrono::Utc::now().timestamp_millis())
            .await;
    }

    let options = jacques_core::terminal::LaunchOptions {
        cwd: request.cwd,
        preferred_terminal: None,
        dangerously_skip_permissions: request.dangerously_skip_permissions,
    };

    let result = tokio::task::spawn_blocking(move || jacques_core::terminal::launch_terminal_session(&options))
        .await
        .unwrap_or_else(|_| jacques_core::terminal::LaunchResult {
            success: false,
            method: "internal_error".to_string(),
            error: Some("launch task panicked".to_string()),
            pid: None,
        });

    Json(LaunchSessionResponse {
        success: result.success,
        method: result.method,
        error: result.error,
        pid: result.pid,
    })
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum SseFrame {
    Progress { completed: usize, total: usize, current: Option<String> },
    Complete { summary: serde_json::Value },
    Error { message: String },
}

fn to_sse_event(frame: SseFrame) -> Event {
    let name = match &frame {
        SseFrame::Progress { .. } => "progress",
        SseFrame::Complete { .. } => "complete",
        SseFrame::Error { .. } => "error",
    };
    Event::default().event(name).json_data(&frame).unwrap_or_else(|_| Event::default().event("error"))
}

fn frame_stream(rx: tokio::sync::mpsc::Receiver<SseFrame>) -> impl Stream<Item = std::result::Result<Event, std::convert::Infallible>> {
    futures_util::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|frame| (Ok(to_sse_event(frame)), rx)) })
}

/// `POST /api/sync`: rebuilds `~/.jacques/session-index.json` across every
/// project under the assistant's transcripts root.
async fn sync_sessions() -> Sse<impl Stream<Item = std::result::Result<Event, std::convert::Infallible>>> {
    let (tx, rx) = tokio::sync::mpsc::channel(64);

    tokio::task::spawn_blocking(move || {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let progress_tx = tx.clone();
        let result = catalog::build_session_index(now_ms, move |progress: &IndexProgress| {
            let _ = progress_tx.blocking_send(SseFrame::Progress {
                completed: progress.completed,
                total: progress.total,
                current: progress.current.clone(),
            });
        });

        match result {
            Ok(index) => {
                let _ = tx.blocking_send(SseFrame::Complete {
                    summary: serde_json::json!({ "session_count": index.sessions.len() }),
                });
            }
            Err(err) => {
                let _ = tx.blocking_send(SseFrame::Error { message: err.to_string() });
            }
        }
    });

    Sse::new(frame_stream(rx)).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
struct ExtractCatalogRequest {
    project_path: String,
    #[serde(default)]
    force: bool,
}

/// `POST /api/catalog/extract`: re-extracts one project's catalog.
/// Concurrent extracts for the same project are serialised; a caller that
/// waits past [`PROJECT_LOCK_WAIT`] gets a conflict instead of blocking
/// indefinitely (spec §5).
async fn extract_catalog(
    State(state): State<AppState>,
    Json(request): Json<ExtractCatalogRequest>,
) -> HandlerResult<Sse<impl Stream<Item = std::result::Result<Event, std::convert::Infallible>>>> {
    let lock = state.project_lock(&request.project_path);
    let guard = tokio::time::timeout(PROJECT_LOCK_WAIT, lock.lock_owned())
        .await
        .map_err(|_| AppError(Error::Conflict(format!("{} is already being extracted", request.project_path))))?;

    let project_path = request.project_path.clone();
    let force = request.force;
    let (tx, rx) = tokio::sync::mpsc::channel(64);

    tokio::task::spawn_blocking(move || {
        let _guard = guard;
        let now_ms = chrono::Utc::now().timestamp_millis();
        let encoded = catalog::encode_project_path(&project_path);
        let Some(root) = catalog::assistant_projects_root() else {
            let _ = tx.blocking_send(SseFrame::Error {
                message: "no home directory".to_string(),
            });
            return;
        };
        let transcripts: Vec<TranscriptFile> = catalog::discover_transcripts(&root.join(encoded));

        let progress_tx = tx.clone();
        let result = catalog::extract_project_catalog(
            Path::new(&project_path),
            &transcripts,
            force,
            now_ms,
            move |progress: &ExtractProgress| {
                let _ = progress_tx.blocking_send(SseFrame::Progress {
                    completed: progress.completed,
                    total: progress.total,
                    current: progress.current.clone(),
                });
            },
        );

        match result {
            Ok(index) => {
                let _ = tx.blocking_send(SseFrame::Complete {
                    summary: serde_json::json!({ "plan_count": index.plans.len(), "session_count": index.sessions.len() }),
                });
            }
            Err(err) => {
                let _ = tx.blocking_send(SseFrame::Error { message: err.to_string() });
            }
        }
    });

    Ok(Sse::new(frame_stream(rx)).keep_alive(KeepAlive::default()))
}

async fn get_project_catalog(AxumPath(encoded_path): AxumPath<String>) -> Json<ProjectIndex> {
    let project_path = jacques_core::catalog::decode_project_path(&encoded_path);
    Json(jacques_core::catalog::load_project_index(Path::new(&project_path)))
}

async fn get_project_plans(AxumPath(encoded_path): AxumPath<String>) -> Json<Vec<CatalogPlan>> {
    let project_path = catalog::decode_project_path(&encoded_path);
    Json(catalog::load_project_index(Path::new(&project_path)).plans)
}

#[derive(Debug, Serialize)]
struct FileContentResponse {
    content: String,
}

/// `GET /api/projects/:encodedPath/plans/:id/content`: reads the
/// materialised plan file at `<project>/.jacques/plans/<filename>` (spec
/// §6's filesystem layout). Plans detected only inline in a transcript
/// (never written to disk) have no content here.
async fn get_project_plan_content(
    AxumPath((encoded_path, plan_id)): AxumPath<(String, String)>,
) -> HandlerResult<Json<FileContentResponse>> {
    let project_path = catalog::decode_project_path(&encoded_path);
    let index = catalog::load_project_index(Path::new(&project_path));
    let plan = index.plans.iter().find(|p| p.id == plan_id).ok_or_else(|| AppError(Error::not_found(plan_id.clone())))?;
    let path = catalog::jacques_dir(Path::new(&project_path)).join("plans").join(&plan.filename);
    let content = fs::read_to_string(&path).map_err(|_| AppError(Error::not_found(format!("plan file {}", plan.filename))))?;
    Ok(Json(FileContentResponse { content }))
}

#[derive(Debug, Serialize)]
struct HandoffSummary {
    filename: String,
    modified_at_ms: i64,
}

/// `GET /api/projects/:encodedPath/handoffs`: handoff documents an external
/// tool drops at `<project>/.jacques/handoffs/<ts>.md`; the daemon only
/// lists/reads them, it never writes one.
async fn get_project_handoffs(AxumPath(encoded_path): AxumPath<String>) -> Json<Vec<HandoffSummary>> {
    let project_path = catalog::decode_project_path(&encoded_path);
    let dir = catalog::jacques_dir(Path::new(&project_path)).join("handoffs");
    let Ok(read_dir) = fs::read_dir(&dir) else {
        return Json(Vec::new());
    };

    let mut handoffs: Vec<HandoffSummary> = read_dir
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|e| e.to_str()) == Some("md"))
        .filter_map(|entry| {
            let filename = entry.file_name().to_string_lossy().to_string();
            let modified_at_ms = entry
                .metadata()
                .ok()
                .and_then(|meta| meta.modified().ok())
                .and_then(|time| time.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|dur| dur.as_millis() as i64)
                .unwrap_or(0);
            Some(HandoffSummary { filename, modified_at_ms })
        })
        .collect();
    handoffs.sort_by(|a, b| b.modified_at_ms.cmp(&a.modified_at_ms));
    Json(handoffs)
}

async fn get_project_handoff_content(
    AxumPath((encoded_path, filename)): AxumPath<(String, String)>,
) -> HandlerResult<Json<FileContentResponse>> {
    if filename.contains('/') || filename.contains("..") {
        return Err(AppError(Error::Malformed("invalid handoff filename".to_string())));
    }
    let project_path = catalog::decode_project_path(&encoded_path);
    let path = catalog::jacques_dir(Path::new(&project_path)).join("handoffs").join(&filename);
    let content = fs::read_to_string(&path).map_err(|_| AppError(Error::not_found(filename.clone())))?;
    Ok(Json(FileContentResponse { content }))
}

async fn get_active_plans(AxumPath(encoded_path): AxumPath<String>) -> Json<Vec<String>> {
    let project_path = catalog::decode_project_path(&encoded_path);
    Json(catalog::load_project_index(Path::new(&project_path)).active_plan_ids)
}

#[derive(Debug, Deserialize)]
struct ActivePlanRequest {
    plan_id: String,
    #[serde(default = "default_true")]
    active: bool,
}

fn default_true() -> bool {
    true
}

async fn post_active_plans(
    AxumPath(encoded_path): AxumPath<String>,
    Json(request): Json<ActivePlanRequest>,
) -> HandlerResult<StatusCode> {
    let project_path = catalog::decode_project_path(&encoded_path);
    let mut index = catalog::load_project_index(Path::new(&project_path));
    index.active_plan_ids.retain(|id| id != &request.plan_id);
    if request.active {
        index.active_plan_ids.push(request.plan_id);
    }
    catalog::save_project_index(Path::new(&project_path), &index)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_project_context(AxumPath(encoded_path): AxumPath<String>) -> Json<Vec<ContextNoteRef>> {
    let project_path = catalog::decode_project_path(&encoded_path);
    Json(catalog::load_project_index(Path::new(&project_path)).context)
}

#[derive(Debug, Deserialize)]
struct CreateContextNoteRequest {
    name: String,
    relative_path: String,
    #[serde(default = "default_source")]
    source: String,
}

fn default_source() -> String {
    "manual".to_string()
}

async fn post_project_context(
    AxumPath(encoded_path): AxumPath<String>,
    Json(request): Json<CreateContextNoteRequest>,
) -> HandlerResult<Json<ContextNoteRef>> {
    if request.relative_path.contains("..") {
        return Err(AppError(Error::Malformed("relative_path must not escape the project".to_string())));
    }
    let project_path = catalog::decode_project_path(&encoded_path);
    let absolute_path = Path::new(&project_path).join(&request.relative_path);
    let size_bytes = fs::metadata(&absolute_path).map(|m| m.len()).unwrap_or(0);
    let hash = catalog::content_hash(&request.relative_path);

    let note = ContextNoteRef {
        id: format!("ctx-{}", &hash[..12.min(hash.len())]),
        name: request.name,
        relative_path: request.relative_path,
        size_bytes,
        source: request.source,
    };

    let mut index = catalog::load_project_index(Path::new(&project_path));
    index.context.retain(|c| c.id != note.id);
    index.context.push(note.clone());
    catalog::save_project_index(Path::new(&project_path), &index)?;
    Ok(Json(note))
}

async fn get_project_context_note(AxumPath((encoded_path, note_id)): AxumPath<(String, String)>) -> HandlerResult<Json<ContextNoteRef>> {
    let project_path = catalog::decode_project_path(&encoded_path);
    catalog::load_project_index(Path::new(&project_path))
        .context
        .into_iter()
        .find(|c| c.id == note_id)
        .map(Json)
        .ok_or_else(|| AppError(Error::not_found(note_id)))
}

#[derive(Debug, Deserialize)]
struct UpdateContextNoteRequest {
    name: Option<String>,
    source: Option<String>,
}

async fn put_project_context_note(
    AxumPath((encoded_path, note_id)): AxumPath<(String, String)>,
    Json(request): Json<UpdateContextNoteRequest>,
) -> HandlerResult<Json<ContextNoteRef>> {
    let project_path = catalog::decode_project_path(&encoded_path);
    let mut index = catalog::load_project_index(Path::new(&project_path));
    let updated = {
        let note = index.context.iter_mut().find(|c| c.id == note_id).ok_or_else(|| AppError(Error::not_found(note_id.clone())))?;
        if let Some(name) = request.name {
            note.name = name;
        }
        if let Some(source) = request.source {
            note.source = source;
        }
        note.clone()
    };
    catalog::save_project_index(Path::new(&project_path), &index)?;
    Ok(Json(updated))
}

async fn delete_project_context_note(AxumPath((encoded_path, note_id)): AxumPath<(String, String)>) -> HandlerResult<StatusCode> {
    let project_path = catalog::decode_project_path(&encoded_path);
    let mut index = catalog::load_project_index(Path::new(&project_path));
    let before = index.context.len();
    index.context.retain(|c| c.id != note_id);
    if index.context.len() == before {
        return Err(AppError(Error::not_found(note_id)));
    }
    catalog::save_project_index(Path::new(&project_path), &index)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct ArchiveConversationsByProject {
    project_label: String,
    conversations: Vec<SessionEntry>,
}

async fn get_archive_stats() -> Json<archive::ArchiveStats> {
    Json(archive::stats())
}

async fn list_archive_conversations() -> Json<Vec<SessionEntry>> {
    Json(archive::load_all())
}

async fn archive_conversations_by_project() -> Json<Vec<ArchiveConversationsByProject>> {
    let mut grouped: Vec<ArchiveConversationsByProject> = Vec::new();

    for entry in archive::load_all() {
        match grouped.iter_mut().find(|group| group.project_label == entry.project_label) {
            Some(group) => group.conversations.push(entry),
            None => grouped.push(ArchiveConversationsByProject {
                project_label: entry.project_label.clone(),
                conversations: vec![entry],
            }),
        }
    }

    Json(grouped)
}

async fn get_archive_conversation(AxumPath(id): AxumPath<String>) -> HandlerResult<Json<SessionEntry>> {
    archive::load_one(&id).map(Json).ok_or_else(|| AppError(Error::not_found(id)))
}

#[derive(Debug, Deserialize)]
struct ArchiveSearchRequest {
    query: String,
}

async fn search_archive(Json(request): Json<ArchiveSearchRequest>) -> Json<Vec<SessionEntry>> {
    Json(archive::search(&request.query))
}

async fn get_archive_subagent(AxumPath(agent_id): AxumPath<String>) -> HandlerResult<Json<SubAgentRef>> {
    catalog::find_sub_agent(&agent_id).map(Json).ok_or_else(|| AppError(Error::not_found(agent_id)))
}

async fn get_archive_session_subagents(AxumPath(session_id): AxumPath<String>) -> Json<Vec<SubAgentRef>> {
    Json(catalog::sub_agents_for_session(&session_id))
}

/// `POST /api/archive/initialize` (SSE): snapshots every session currently
/// in `~/.jacques/session-index.json` into the archive.
async fn initialize_archive() -> Sse<impl Stream<Item = std::result::Result<Event, std::convert::Infallible>>> {
    let (tx, rx) = tokio::sync::mpsc::channel(64);

    tokio::task::spawn_blocking(move || {
        let Some(index) = read_global_session_index() else {
            let _ = tx.blocking_send(SseFrame::Error {
                message: "no session index; run /api/sync first".to_string(),
            });
            return;
        };

        let progress_tx = tx.clone();
        let result = archive::initialize(&index, move |completed, total| {
            let _ = progress_tx.blocking_send(SseFrame::Progress { completed, total, current: None });
        });

        match result {
            Ok(count) => {
                let _ = tx.blocking_send(SseFrame::Complete {
                    summary: serde_json::json!({ "archived_count": count }),
                });
            }
            Err(err) => {
                let _ = tx.blocking_send(SseFrame::Error { message: err.to_string() });
            }
        }
    });

    Sse::new(frame_stream(rx)).keep_alive(KeepAlive::default())
}

async fn get_usage(State(state): State<AppState>) -> Json<Option<jacques_core::usage::UsageSnapshot>> {
    let now_ms = chrono::Utc::now().timestamp_millis();
    let mut usage = state.usage.lock().await;
    Json(usage.get_usage(now_ms).await)
}

async fn get_notification_settings(State(state): State<AppState>) -> Json<NotificationSettings> {
    Json(state.registry.notification_settings().await)
}

async fn put_notification_settings(State(state): State<AppState>, Json(settings): Json<NotificationSettings>) -> StatusCode {
    state.registry.update_notification_settings(settings).await;
    StatusCode::NO_CONTENT
}

async fn get_notification_history(State(state): State<AppState>) -> Json<Vec<jacques_protocol::NotificationItem>> {
    Json(state.registry.notification_history().await)
}

#[derive(Debug, Serialize)]
struct RootPathResponse {
    root_path: Option<String>,
}

async fn get_root_path() -> Json<RootPathResponse> {
    let config = config::load_config();
    Json(RootPathResponse { root_path: config.ui.root_path })
}

#[derive(Debug, Deserialize)]
struct PutRootPathRequest {
    root_path: String,
}

async fn put_root_path(Json(request): Json<PutRootPathRequest>) -> HandlerResult<StatusCode> {
    if let Some(reason) = jacques_core::boundaries::is_dangerous_path(&request.root_path) {
        return Err(AppError(Error::Malformed(reason)));
    }

    let mut config: JacquesConfig = config::load_config();
    config.ui.root_path = Some(request.root_path);
    config::save_config(&config)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn serve(state: AppState, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP Gateway listening");
    axum::serve(listener, app).await
}
