//! Operator API: signing helper, log browsing and container passthrough.
//!
//! Everything here sits behind [`require_login`](super::session::require_login)
//! except `/health`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    middleware,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use super::session::{SessionStore, require_login};
use crate::config::Config;
use crate::deploy::{Deployer, signer, validator::Code};
use crate::docker::{ContainerRuntime, DockerCli, LOG_TAIL_LINES};
use crate::errors::{ContainerError, LogsError};
use crate::logs::{DEFAULT_VIEW_LINES, LogDir, tail::LogTail};

// ── Shared state ──────────────────────────────────────────────────────

pub struct AppState {
    pub config: Arc<Config>,
    pub deployer: Deployer,
    pub logs: LogDir,
    pub containers: Arc<dyn ContainerRuntime>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let containers = Arc::new(DockerCli::new(config.server.docker_cmd.clone()));
        Self {
            deployer: Deployer::from_config(&config),
            logs: LogDir::new(config.server.logs_dir.clone()),
            containers,
            sessions: SessionStore::default(),
            config: Arc::new(config),
        }
    }

    /// Swap the container runtime (tests use an in-memory fake).
    pub fn with_containers(mut self, containers: Arc<dyn ContainerRuntime>) -> Self {
        self.containers = containers;
        self
    }
}

pub type SharedState = Arc<AppState>;

// ── Error type ────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Internal(String),
    /// A container CLI call failed; its combined output is returned as text.
    Command(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::Command(output) => {
                return (StatusCode::INTERNAL_SERVER_ERROR, plain_text(output)).into_response();
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<LogsError> for ApiError {
    fn from(err: LogsError) -> Self {
        match err {
            LogsError::EmptyName => ApiError::BadRequest("missing file".into()),
            LogsError::IllegalName(_) => ApiError::BadRequest("illegal file name".into()),
            LogsError::NotFound(_) => ApiError::NotFound("file not found".into()),
            LogsError::Io(e) => {
                tracing::error!(error = %e, "log read failed");
                ApiError::Internal("failed to read logs".into())
            }
        }
    }
}

impl From<ContainerError> for ApiError {
    fn from(err: ContainerError) -> Self {
        match err {
            ContainerError::InvalidId => ApiError::BadRequest(err.to_string()),
            ContainerError::Failed { command, output } => {
                tracing::warn!(%command, "container command failed");
                ApiError::Command(output)
            }
            other => {
                tracing::error!(error = %other, "container runtime unavailable");
                ApiError::Command(other.to_string())
            }
        }
    }
}

fn plain_text(body: String) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body)
}

// ── Query and response types ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SignQuery {
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignResponse {
    pub timestamp: String,
    pub sign: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogList {
    pub files: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    #[serde(default)]
    pub file: String,
}

/// Numbers are taken leniently: anything unparsable falls back to the default.
#[derive(Debug, Deserialize)]
pub struct ViewQuery {
    #[serde(default)]
    pub file: String,
    pub start: Option<String>,
    pub n: Option<String>,
}

impl ViewQuery {
    fn start(&self) -> u64 {
        self.start
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .map(|s| s.max(0) as u64)
            .unwrap_or(0)
    }

    fn lines(&self) -> u64 {
        self.n
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|n| *n > 0)
            .map(|n| n as u64)
            .unwrap_or(DEFAULT_VIEW_LINES)
    }
}

#[derive(Debug, Deserialize)]
pub struct ContainerQuery {
    #[serde(default)]
    pub id: String,
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health() -> &'static str {
    "ok"
}

/// Sign `code` at the current server time, for building deploy requests by hand.
async fn sign(
    State(state): State<SharedState>,
    Query(q): Query<SignQuery>,
) -> Result<Json<SignResponse>, ApiError> {
    let code = Code::parse(&q.code).map_err(|_| ApiError::BadRequest("invalid code".into()))?;
    let timestamp = chrono::Utc::now().timestamp_millis().to_string();
    let sign = signer::sign(state.deployer.secret(), code.as_str(), &timestamp);
    Ok(Json(SignResponse { timestamp, sign }))
}

async fn list_logs(State(state): State<SharedState>) -> Result<Json<LogList>, ApiError> {
    let files = state.logs.list().await?;
    Ok(Json(LogList { files }))
}

async fn view_log(
    State(state): State<SharedState>,
    Query(q): Query<ViewQuery>,
) -> Result<Response, ApiError> {
    let text = state.logs.view(&q.file, q.start(), q.lines()).await?;
    Ok(plain_text(text).into_response())
}

async fn tail_log(
    State(state): State<SharedState>,
    Query(q): Query<FileQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let path = state.logs.resolve(&q.file)?;
    let tail = LogTail::open(&path).await?;
    tracing::debug!(path = %path.display(), "log tail opened");

    let events = tail
        .into_stream()
        .map(|line| Ok::<_, Infallible>(Event::default().data(line)));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn docker_ps(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let output = state.containers.ps().await?;
    Ok(plain_text(output).into_response())
}

async fn docker_logs(
    State(state): State<SharedState>,
    Query(q): Query<ContainerQuery>,
) -> Result<Response, ApiError> {
    if q.id.trim().is_empty() {
        return Err(ApiError::BadRequest("missing id".into()));
    }
    let output = state.containers.logs(&q.id, LOG_TAIL_LINES).await?;
    Ok(plain_text(output).into_response())
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router(state: SharedState) -> Router<SharedState> {
    let protected = Router::new()
        .route("/api/sign", get(sign))
        .route("/api/logs", get(list_logs))
        .route("/api/logs/view", get(view_log))
        .route("/api/logs/tail", get(tail_log))
        .route("/api/docker/ps", get(docker_ps))
        .route("/api/docker/logs", get(docker_logs))
        .route_layer(middleware::from_fn_with_state(state, require_login));

    Router::new().route("/health", get(health)).merge(protected)
}
