//! Server configuration.
//!
//! Read once from a YAML file before the listener binds, then shared
//! read-only as `Arc<Config>`.
//!
//! # Configuration File Format
//!
//! ```yaml
//! server:
//!   addr: "0.0.0.0:8080"
//!   secret: "change-me"
//!   upload_dir: uploads
//!   script_dir: scripts
//!   logs_dir: logs
//!   web_dir: web
//!   max_upload_bytes: 104857600
//!   deploy_timeout_secs: 1800
//!   docker_cmd: docker
//! auth:
//!   users:
//!     - username: admin
//!       password: admin
//! ```
//!
//! `DEPLOYHOOK_ADDR`, `DEPLOYHOOK_SECRET` and `DOCKER_CMD` override the
//! corresponding file values.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub auth: AuthSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Listen address, `host:port`.
    pub addr: String,
    /// Shared signing secret for `/deploy`.
    pub secret: String,
    pub upload_dir: PathBuf,
    pub script_dir: PathBuf,
    pub logs_dir: PathBuf,
    /// Static UI assets served under `/web/`.
    pub web_dir: PathBuf,
    /// Upper bound for a whole multipart deploy body.
    pub max_upload_bytes: u64,
    /// Wall-clock limit for one deploy script. 0 disables the limit.
    pub deploy_timeout_secs: u64,
    pub docker_cmd: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            secret: String::new(),
            upload_dir: PathBuf::from("uploads"),
            script_dir: PathBuf::from("scripts"),
            logs_dir: PathBuf::from("logs"),
            web_dir: PathBuf::from("web"),
            max_upload_bytes: 100 * 1024 * 1024,
            deploy_timeout_secs: 1800,
            docker_cmd: "docker".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSection {
    #[serde(default)]
    pub users: Vec<User>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password: String,
}

impl Config {
    /// Load, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string without validating it.
    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Invalid YAML configuration")
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("DEPLOYHOOK_ADDR") {
            self.server.addr = addr;
        }
        if let Ok(secret) = std::env::var("DEPLOYHOOK_SECRET") {
            self.server.secret = secret;
        }
        if let Ok(docker_cmd) = std::env::var("DOCKER_CMD") {
            self.server.docker_cmd = docker_cmd;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.secret.is_empty() {
            bail!("server.secret must not be empty");
        }
        if self.server.max_upload_bytes == 0 {
            bail!("server.max_upload_bytes must be greater than zero");
        }
        if self.server.addr.trim().is_empty() {
            bail!("server.addr must not be empty");
        }
        Ok(())
    }

    /// Create the upload, script and log directories if they are missing.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.server.upload_dir,
            &self.server.script_dir,
            &self.server.logs_dir,
        ] {
            if dir.as_os_str().is_empty() {
                continue;
            }
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn deploy_timeout(&self) -> Option<Duration> {
        match self.server.deploy_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Check a username/password pair against `auth.users`.
    pub fn check_credentials(&self, username: &str, password: &str) -> bool {
        self.auth
            .users
            .iter()
            .any(|u| u.username == username && u.password == password)
    }
}
