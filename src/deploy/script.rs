//! Script and interpreter resolution.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use super::validator::Code;
use crate::errors::DeployError;

/// Interpreters tried in order.
pub const INTERPRETERS: [&str; 2] = ["bash", "sh"];

#[derive(Debug, Clone)]
pub struct ScriptResolver {
    script_dir: PathBuf,
}

impl ScriptResolver {
    pub fn new(script_dir: impl Into<PathBuf>) -> Self {
        Self {
            script_dir: script_dir.into(),
        }
    }

    /// `{script_dir}/{code}.sh`, which must exist as a file.
    ///
    /// The script may still disappear before it is executed; a spawn
    /// failure covers that case.
    pub fn resolve(&self, code: &Code) -> Result<PathBuf, DeployError> {
        let script = self.script_dir.join(format!("{}.sh", code));
        if script.is_file() {
            Ok(script)
        } else {
            Err(DeployError::ScriptNotFound {
                code: code.to_string(),
            })
        }
    }
}

/// Locate `bash`, falling back to `sh`, on the process `PATH`.
pub fn find_interpreter() -> Result<PathBuf, DeployError> {
    find_interpreter_in(std::env::var_os("PATH").as_deref())
}

/// Locate an interpreter on an explicit search path.
pub fn find_interpreter_in(search_path: Option<&OsStr>) -> Result<PathBuf, DeployError> {
    let search_path = search_path.ok_or(DeployError::NoInterpreter)?;
    INTERPRETERS
        .iter()
        .find_map(|name| {
            std::env::split_paths(search_path)
                .map(|dir| dir.join(name))
                .find(|candidate| is_executable(candidate))
        })
        .ok_or(DeployError::NoInterpreter)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
