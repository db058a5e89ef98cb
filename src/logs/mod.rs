//! Log browser over the configured logs directory.
//!
//! Only plain file names are accepted: anything containing `..` is
//! refused and every name is reduced to its final path element before it
//! is joined onto the logs directory.

pub mod tail;

use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::errors::LogsError;

/// Lines returned by [`LogDir::view`] when the caller gives no usable count.
pub const DEFAULT_VIEW_LINES: u64 = 100;

#[derive(Debug, Clone)]
pub struct LogDir {
    dir: PathBuf,
}

impl LogDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Regular files in the logs directory, dot-files excluded, sorted.
    pub async fn list(&self) -> Result<Vec<String>, LogsError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            files.push(name);
        }
        files.sort();
        Ok(files)
    }

    /// Map a caller-supplied name to a path inside the logs directory.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, LogsError> {
        if name.is_empty() {
            return Err(LogsError::EmptyName);
        }
        if name.contains("..") {
            return Err(LogsError::IllegalName(name.to_string()));
        }
        let base = Path::new(name)
            .file_name()
            .ok_or_else(|| LogsError::IllegalName(name.to_string()))?;
        Ok(self.dir.join(base))
    }

    /// Lines `[start, start + n)` of `name`, each newline-terminated.
    pub async fn view(&self, name: &str, start: u64, n: u64) -> Result<String, LogsError> {
        let path = self.resolve(name)?;
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LogsError::NotFound(path));
            }
            Err(e) => return Err(e.into()),
        };

        let end = start.saturating_add(n);
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        let mut out = String::new();
        let mut idx: u64 = 0;

        while idx < end {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            if idx >= start {
                let line = buf.strip_suffix(b"\n").unwrap_or(&buf);
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                out.push_str(&String::from_utf8_lossy(line));
                out.push('\n');
            }
            idx += 1;
        }

        Ok(out)
    }
}
