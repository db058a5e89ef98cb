//! Process runner: starts a deploy script with piped output.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use super::validator::Code;
use crate::errors::DeployError;

/// One script invocation.
#[derive(Debug, Clone)]
pub struct ScriptJob {
    pub interpreter: PathBuf,
    pub script: PathBuf,
    /// Stored upload, if the request carried one.
    pub artifact: Option<PathBuf>,
    pub code: Code,
}

/// A started script with both output pipes detached from the child handle.
#[derive(Debug)]
pub struct RunningScript {
    pub child: Child,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

impl ScriptJob {
    /// Artifact path as passed to the script; empty when there is none.
    pub fn artifact_arg(&self) -> OsString {
        self.artifact
            .as_ref()
            .map(|p| p.as_os_str().to_owned())
            .unwrap_or_default()
    }

    /// `interpreter script artifact` with `UPLOAD_FILE` and `CODE` added to
    /// the inherited environment.
    pub fn command(&self) -> Command {
        let artifact = self.artifact_arg();
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(&self.script)
            .arg(&artifact)
            .env("UPLOAD_FILE", &artifact)
            .env("CODE", self.code.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so terminate() reaches everything the script forks.
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        cmd
    }

    pub fn spawn(&self) -> Result<RunningScript, DeployError> {
        let mut child = self
            .command()
            .spawn()
            .map_err(|source| DeployError::SpawnError {
                script: self.script.clone(),
                source,
            })?;

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            (stdout, _) => {
                let missing = if stdout.is_none() { "stdout" } else { "stderr" };
                if let Err(e) = child.start_kill() {
                    tracing::warn!(error = %e, "failed to kill script with missing pipe");
                }
                return Err(DeployError::PipeError(missing));
            }
        };

        tracing::debug!(
            code = %self.code,
            pid = child.id(),
            script = %self.script.display(),
            "spawned deploy script"
        );
        Ok(RunningScript {
            child,
            stdout,
            stderr,
        })
    }
}

/// Kill the child's whole process group, then the child itself, and reap it.
pub async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) {
            match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
                Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
                Err(e) => tracing::warn!(pid, error = %e, "failed to signal process group"),
            }
        }
    }

    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "child already gone");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::deploy::script::find_interpreter;
    use std::path::Path;
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;

    fn job(dir: &Path, body: &str, artifact: Option<PathBuf>) -> ScriptJob {
        let script = dir.join("job.sh");
        std::fs::write(&script, body).unwrap();
        ScriptJob {
            interpreter: find_interpreter().unwrap(),
            script,
            artifact,
            code: Code::parse("job").unwrap(),
        }
    }

    async fn read_all<R: tokio::io::AsyncRead + Unpin>(mut r: R) -> String {
        let mut out = String::new();
        r.read_to_string(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_spawn_passes_args_and_env() {
        let dir = tempdir().unwrap();
        let artifact = dir.path().join("1_app.tgz");
        let job = job(
            dir.path(),
            "echo \"arg=$1\"\necho \"upload=$UPLOAD_FILE\"\necho \"code=$CODE\"\necho oops >&2\n",
            Some(artifact.clone()),
        );

        let mut running = job.spawn().unwrap();
        let (out, err) = tokio::join!(read_all(running.stdout), read_all(running.stderr));
        let status = running.child.wait().await.unwrap();

        assert!(status.success());
        let expected = format!(
            "arg={0}\nupload={0}\ncode=job\n",
            artifact.display()
        );
        assert_eq!(out, expected);
        assert_eq!(err, "oops\n");
    }

    #[tokio::test]
    async fn test_spawn_without_artifact_passes_empty_arg() {
        let dir = tempdir().unwrap();
        let job = job(dir.path(), "echo \"[$#][$1][$UPLOAD_FILE]\"\n", None);
        let mut running = job.spawn().unwrap();
        let out = read_all(running.stdout).await;
        running.child.wait().await.unwrap();
        assert_eq!(out, "[1][][]\n");
    }

    #[tokio::test]
    async fn test_spawn_inherits_parent_environment() {
        let dir = tempdir().unwrap();
        let job = job(dir.path(), "echo \"$PATH\"\n", None);
        let mut running = job.spawn().unwrap();
        let out = read_all(running.stdout).await;
        running.child.wait().await.unwrap();
        assert_eq!(out.trim_end(), std::env::var("PATH").unwrap());
    }

    #[tokio::test]
    async fn test_spawn_missing_interpreter_is_spawn_error() {
        let dir = tempdir().unwrap();
        let mut job = job(dir.path(), "true\n", None);
        job.interpreter = dir.path().join("no-such-shell");
        assert!(matches!(job.spawn(), Err(DeployError::SpawnError { .. })));
    }

    #[tokio::test]
    async fn test_terminate_kills_background_children() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("survived");
        let job = job(
            dir.path(),
            &format!(
                "(sleep 2; touch {}) &\nsleep 30\n",
                marker.display()
            ),
            None,
        );
        let mut running = job.spawn().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        terminate(&mut running.child).await;
        assert!(running.child.try_wait().unwrap().is_some());

        tokio::time::sleep(std::time::Duration::from_millis(2500)).await;
        assert!(!marker.exists(), "background child outlived terminate()");
    }
}
