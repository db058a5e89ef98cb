//! Cookie sessions for the operator UI.
//!
//! Sessions are random UUIDs held in memory; restarting the server logs
//! everyone out. A session lives for [`SESSION_MAX_AGE`] after login.
//! `/deploy` never looks at sessions.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::{Request, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use uuid::Uuid;

use super::api::{ApiError, SharedState};

pub const SESSION_COOKIE: &str = "session";

pub const SESSION_MAX_AGE: Duration = Duration::from_secs(12 * 60 * 60);

/// Live sessions keyed by id, with their issue time.
#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, Instant>>,
    max_age: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_max_age(SESSION_MAX_AGE)
    }
}

impl SessionStore {
    pub fn with_max_age(max_age: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_age,
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Issue a new session, dropping every expired one first.
    pub fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        let now = Instant::now();
        let mut sessions = self.lock();
        sessions.retain(|_, issued| now.duration_since(*issued) < self.max_age);
        sessions.insert(id, now);
        id
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.lock()
            .get(id)
            .is_some_and(|issued| issued.elapsed() < self.max_age)
    }

    pub fn remove(&self, id: &Uuid) -> bool {
        self.lock().remove(id).is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Instant>> {
        // The set stays consistent even if a holder panicked.
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Session id from the request's `Cookie` headers, if well-formed.
pub fn session_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}

fn session_cookie(value: &str, max_age: Option<u32>) -> HeaderValue {
    let mut cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, value);
    if let Some(max_age) = max_age {
        cookie.push_str(&format!("; Max-Age={}", max_age));
    }
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static("session=; Path=/"))
}

/// Reject requests without a live session.
pub async fn require_login(State(state): State<SharedState>, req: Request, next: Next) -> Response {
    match session_from_headers(req.headers()) {
        Some(id) if state.sessions.contains(&id) => next.run(req).await,
        _ => ApiError::Unauthorized("login required".into()).into_response(),
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

async fn login(
    State(state): State<SharedState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    if !state.config.check_credentials(&req.username, &req.password) {
        tracing::warn!(username = %req.username, "rejected login");
        return Err(ApiError::Unauthorized("invalid username or password".into()));
    }

    let id = state.sessions.create();
    let max_age = u32::try_from(state.sessions.max_age().as_secs()).unwrap_or(u32::MAX);
    tracing::info!(username = %req.username, "operator logged in");
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie(&id.to_string(), Some(max_age)))],
    )
        .into_response())
}

async fn logout(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    if let Some(id) = session_from_headers(&headers) {
        state.sessions.remove(&id);
    }
    (
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie("", Some(0)))],
    )
        .into_response()
}

pub fn session_router() -> Router<SharedState> {
    Router::new()
        .route("/api/login", post(login))
        .route("/api/logout", get(logout).post(logout))
}
