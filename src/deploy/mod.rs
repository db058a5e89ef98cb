//! Signed deploys, from request validation to live script output.
//!
//! ## Module Map
//!
//! ```text
//!  POST /deploy
//!      │
//!      v
//!  upload.rs     read_form()            multipart → DeployForm (in memory, size-capped)
//!      │
//!      v
//!  validator.rs  RequestValidator       code syntax → signature → timestamp window
//!      │           └─ signer.rs         md5(secret ∥ code ∥ timestamp)
//!      v
//!  upload.rs     ArtifactStore::store   {upload_dir}/{nanos}_{basename}
//!      │
//!      v
//!  script.rs     ScriptResolver         {script_dir}/{code}.sh + bash/sh lookup
//!      │
//!      v
//!  runner.rs     ScriptJob::spawn       piped stdout/stderr, UPLOAD_FILE + CODE env
//!      │
//!      v
//!  stream.rs     spawn_stream           two readers → body chunks, [ERR]/[EXIT] tags
//! ```
//!
//! Everything before `spawn_stream` can still fail with a [`DeployError`]
//! and a regular HTTP status. Once output streaming starts the status is 200
//! and the outcome is only visible in the `[EXIT]` trailer.

pub mod runner;
pub mod script;
pub mod signer;
pub mod stream;
pub mod upload;
pub mod validator;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::errors::DeployError;
use runner::{RunningScript, ScriptJob};
use script::ScriptResolver;
use stream::StreamOutcome;
use upload::{ArtifactStore, DeployForm};
use validator::RequestValidator;

/// A deploy whose script is running and whose output has not been read yet.
#[derive(Debug)]
pub struct StartedDeploy {
    pub job: ScriptJob,
    pub running: RunningScript,
}

/// Deploy pipeline bound to one immutable configuration.
#[derive(Debug, Clone)]
pub struct Deployer {
    secret: String,
    store: ArtifactStore,
    scripts: ScriptResolver,
    timeout: Option<Duration>,
}

impl Deployer {
    pub fn new(
        secret: impl Into<String>,
        upload_dir: impl Into<PathBuf>,
        script_dir: impl Into<PathBuf>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            secret: secret.into(),
            store: ArtifactStore::new(upload_dir),
            scripts: ScriptResolver::new(script_dir),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.server.secret.clone(),
            config.server.upload_dir.clone(),
            config.server.script_dir.clone(),
            config.deploy_timeout(),
        )
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Validate, store the artifact, resolve and start the script.
    pub async fn start(&self, form: DeployForm, now_ms: i64) -> Result<StartedDeploy, DeployError> {
        let code = RequestValidator::new(&self.secret).validate(&form.request, now_ms)?;

        let artifact = match &form.file {
            Some(file) => Some(self.store.store(file).await?),
            None => None,
        };

        let script = self.scripts.resolve(&code)?;
        let interpreter = script::find_interpreter()?;

        let job = ScriptJob {
            interpreter,
            script,
            artifact,
            code,
        };
        let running = job.spawn()?;
        Ok(StartedDeploy { job, running })
    }

    /// Stream a started deploy. The returned receiver is the response body;
    /// the outcome is logged when the script is done.
    pub fn stream(&self, started: StartedDeploy) -> mpsc::Receiver<Bytes> {
        let StartedDeploy { job, running } = started;
        let (rx, handle) = stream::spawn_stream(running, self.timeout);
        let started_at = Instant::now();

        tokio::spawn(async move {
            let elapsed_ms = || started_at.elapsed().as_millis() as u64;
            match handle.await {
                Ok(StreamOutcome::Exited(code)) => tracing::info!(
                    code = %job.code,
                    exit_code = code.unwrap_or(-1),
                    elapsed_ms = elapsed_ms(),
                    "deploy finished"
                ),
                Ok(StreamOutcome::TimedOut) => tracing::warn!(
                    code = %job.code,
                    elapsed_ms = elapsed_ms(),
                    "deploy timed out, script killed"
                ),
                Ok(StreamOutcome::Disconnected) => tracing::warn!(
                    code = %job.code,
                    elapsed_ms = elapsed_ms(),
                    "client disconnected, script killed"
                ),
                Err(e) => tracing::error!(code = %job.code, error = %e, "deploy stream task failed"),
            }
        });

        rx
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::deploy::upload::UploadedFile;
    use crate::deploy::validator::DeployRequest;
    use tempfile::TempDir;

    const SECRET: &str = "s3cr3t";

    struct Fixture {
        _dir: TempDir,
        uploads: PathBuf,
        deployer: Deployer,
    }

    fn fixture(script_body: &str) -> Fixture {
        let dir = TempDir::new().unwrap();
        let uploads = dir.path().join("uploads");
        let scripts = dir.path().join("scripts");
        std::fs::create_dir_all(&uploads).unwrap();
        std::fs::create_dir_all(&scripts).unwrap();
        std::fs::write(scripts.join("deploy1.sh"), script_body).unwrap();
        let deployer = Deployer::new(SECRET, &uploads, &scripts, Some(Duration::from_secs(30)));
        Fixture {
            _dir: dir,
            uploads,
            deployer,
        }
    }

    fn form(code: &str, ts: i64, file: Option<UploadedFile>) -> DeployForm {
        let timestamp = ts.to_string();
        DeployForm {
            request: DeployRequest {
                code: code.to_string(),
                signature: signer::sign(SECRET, code, &timestamp),
                timestamp,
            },
            file,
        }
    }

    async fn body(mut rx: mpsc::Receiver<Bytes>) -> String {
        let mut out = String::new();
        while let Some(chunk) = rx.recv().await {
            out.push_str(&String::from_utf8_lossy(&chunk));
        }
        out
    }

    #[tokio::test]
    async fn test_start_runs_script_with_stored_artifact() {
        let fx = fixture("cat \"$1\"\necho\necho \"code=$CODE\"\n");
        let now = chrono::Utc::now().timestamp_millis();
        let file = UploadedFile {
            file_name: "payload.txt".into(),
            data: Bytes::from_static(b"artifact-bytes"),
        };

        let started = fx.deployer.start(form("deploy1", now, Some(file)), now).await.unwrap();
        let artifact = started.job.artifact.clone().unwrap();
        assert_eq!(artifact.parent().unwrap(), fx.uploads.as_path());
        assert_eq!(std::fs::read(&artifact).unwrap(), b"artifact-bytes");

        let out = body(fx.deployer.stream(started)).await;
        assert_eq!(out, "artifact-bytes\ncode=deploy1\n[EXIT] 0\n");
    }

    #[tokio::test]
    async fn test_expired_request_spawns_nothing_and_stores_nothing() {
        let fx = fixture("touch should-not-exist\n");
        let now = chrono::Utc::now().timestamp_millis();
        let file = UploadedFile {
            file_name: "payload.txt".into(),
            data: Bytes::from_static(b"x"),
        };
        let err = fx
            .deployer
            .start(form("deploy1", now - 10 * 60 * 1000, Some(file)), now)
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::ExpiredTimestamp { .. }));
        assert_eq!(std::fs::read_dir(&fx.uploads).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_script() {
        let fx = fixture("true\n");
        let now = chrono::Utc::now().timestamp_millis();
        let err = fx.deployer.start(form("other", now, None), now).await.unwrap_err();
        assert!(matches!(err, DeployError::ScriptNotFound { .. }));
    }

    #[tokio::test]
    async fn test_traversal_code_rejected_before_any_fs_access() {
        let fx = fixture("true\n");
        let now = chrono::Utc::now().timestamp_millis();
        let file = UploadedFile {
            file_name: "payload.txt".into(),
            data: Bytes::from_static(b"x"),
        };
        let err = fx
            .deployer
            .start(form("../etc", now, Some(file)), now)
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::InvalidCode));
        assert_eq!(std::fs::read_dir(&fx.uploads).unwrap().count(), 0);
    }
}
