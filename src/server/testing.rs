//! Fixtures shared by the server tests.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, header},
    response::Response,
};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use super::api::AppState;
use super::router::build_router;
use crate::config::{Config, User};
use crate::docker::ContainerRuntime;
use crate::errors::ContainerError;

pub const TEST_SECRET: &str = "test-secret";

/// A config rooted in a fresh temp directory.
pub struct TestEnv {
    pub dir: TempDir,
    pub config: Config,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.server.secret = TEST_SECRET.to_string();
        config.server.upload_dir = dir.path().join("uploads");
        config.server.script_dir = dir.path().join("scripts");
        config.server.logs_dir = dir.path().join("logs");
        config.server.web_dir = dir.path().join("web");
        config.server.deploy_timeout_secs = 30;
        config.auth.users.push(User {
            username: "admin".into(),
            password: "hunter2".into(),
        });
        config.ensure_directories().unwrap();
        std::fs::create_dir_all(&config.server.web_dir).unwrap();
        Self { dir, config }
    }

    pub fn with_upload_limit(bytes: u64) -> Self {
        let mut env = Self::new();
        env.config.server.max_upload_bytes = bytes;
        env
    }

    pub fn router(&self) -> Router {
        build_router(Arc::new(AppState::new(self.config.clone())))
    }

    pub fn router_with(&self, runtime: FakeRuntime) -> Router {
        let state = AppState::new(self.config.clone()).with_containers(Arc::new(runtime));
        build_router(Arc::new(state))
    }

    pub fn write_script(&self, code: &str, body: &str) {
        let path = self.config.server.script_dir.join(format!("{}.sh", code));
        std::fs::write(path, body).unwrap();
    }

    pub fn write_log(&self, name: &str, body: &str) {
        std::fs::write(self.config.server.logs_dir.join(name), body).unwrap();
    }
}

/// Canned container runtime output.
pub struct FakeRuntime {
    ps: Result<String, String>,
}

impl FakeRuntime {
    pub fn ok(ps: &str) -> Self {
        Self { ps: Ok(ps.into()) }
    }

    pub fn failing(output: &str) -> Self {
        Self {
            ps: Err(output.into()),
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ps(&self) -> Result<String, ContainerError> {
        self.ps.clone().map_err(|output| ContainerError::Failed {
            command: "docker ps -a".into(),
            output,
        })
    }

    async fn logs(&self, id: &str, tail: u32) -> Result<String, ContainerError> {
        Ok(format!("logs {} {}\n", id, tail))
    }
}

pub async fn body_string(resp: Response) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Log in as the fixture user and return the `Cookie` header value.
pub async fn login_cookie(app: &Router) -> String {
    let req = Request::builder()
        .method("POST")
        .uri("/api/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"username":"admin","password":"hunter2"}"#))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let set_cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

/// Encode text fields and an optional file part as `multipart/form-data`.
/// Returns the content type and the body.
pub fn multipart_body(
    fields: &[(&str, String)],
    file: Option<(&str, &[u8])>,
) -> (String, Vec<u8>) {
    const BOUNDARY: &str = "deployhook-test-boundary";
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, data)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}
