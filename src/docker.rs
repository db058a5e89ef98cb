//! Container runtime passthrough for the operator UI.

use async_trait::async_trait;
use tokio::process::Command;

use crate::errors::ContainerError;

/// Lines of container log returned by `logs`.
pub const LOG_TAIL_LINES: u32 = 200;

/// Abstraction over the container CLI for testability.
/// Real implementation: `DockerCli`.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Status of all containers, running or not.
    async fn ps(&self) -> Result<String, ContainerError>;

    /// The last `tail` log lines of container `id`.
    async fn logs(&self, id: &str, tail: u32) -> Result<String, ContainerError>;
}

/// Shells out to a docker-compatible CLI (`docker`, `podman`, ...).
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
}

impl DockerCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run with fixed arguments and return stdout followed by stderr.
    async fn run(&self, args: &[&str]) -> Result<String, ContainerError> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ContainerError::NotFound(self.program.clone())
                } else {
                    ContainerError::Io(e)
                }
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(combined)
        } else {
            Err(ContainerError::Failed {
                command: format!("{} {}", self.program, args.join(" ")),
                output: combined,
            })
        }
    }
}

/// Container ids and names are passed as a single argument; one that looks
/// like an option is refused.
pub fn validate_container_id(id: &str) -> Result<&str, ContainerError> {
    let id = id.trim();
    if id.is_empty() || id.starts_with('-') {
        return Err(ContainerError::InvalidId);
    }
    Ok(id)
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn ps(&self) -> Result<String, ContainerError> {
        self.run(&["ps", "-a"]).await
    }

    async fn logs(&self, id: &str, tail: u32) -> Result<String, ContainerError> {
        let id = validate_container_id(id)?;
        let tail = tail.to_string();
        self.run(&["logs", "--tail", &tail, id]).await
    }
}
