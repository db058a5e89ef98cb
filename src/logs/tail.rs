//! Follow a log file from its end, like `tail -f`.
//!
//! Polls at a fixed interval at end-of-file instead of watching for file
//! events. A trailing line without its newline is held back until the
//! newline arrives. If the file shrinks, following restarts at offset 0.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::Stream;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

use crate::errors::LogsError;

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct LogTail {
    path: PathBuf,
    reader: BufReader<File>,
    /// Bytes consumed from the file so far.
    pos: u64,
    partial: Vec<u8>,
    poll: Duration,
}

impl LogTail {
    /// Open `path` positioned at its current end.
    pub async fn open(path: &Path) -> Result<Self, LogsError> {
        Self::open_with_interval(path, POLL_INTERVAL).await
    }

    pub async fn open_with_interval(path: &Path, poll: Duration) -> Result<Self, LogsError> {
        let mut file = match File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LogsError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        let pos = file.seek(SeekFrom::End(0)).await?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            pos,
            partial: Vec::new(),
            poll,
        })
    }

    /// Wait for the next complete line appended to the file.
    ///
    /// The returned line has no line ending and no carriage returns.
    pub async fn next_line(&mut self) -> Result<String, LogsError> {
        loop {
            let n = self.reader.read_until(b'\n', &mut self.partial).await?;
            self.pos += n as u64;

            if self.partial.ends_with(b"\n") {
                let line: String = String::from_utf8_lossy(&self.partial)
                    .chars()
                    .filter(|c| *c != '\n' && *c != '\r')
                    .collect();
                self.partial.clear();
                return Ok(line);
            }

            self.restart_if_truncated().await?;
            tokio::time::sleep(self.poll).await;
        }
    }

    async fn restart_if_truncated(&mut self) -> Result<(), LogsError> {
        let len = tokio::fs::metadata(&self.path).await?.len();
        if len < self.pos {
            tracing::debug!(path = %self.path.display(), "log truncated, following from start");
            self.reader.seek(SeekFrom::Start(0)).await?;
            self.pos = 0;
            self.partial.clear();
        }
        Ok(())
    }

    /// Endless stream of appended lines; ends on the first I/O error.
    pub fn into_stream(mut self) -> impl Stream<Item = String> {
        async_stream::stream! {
            loop {
                match self.next_line().await {
                    Ok(line) => yield line,
                    Err(e) => {
                        tracing::warn!(path = %self.path.display(), error = %e, "log tail stopped");
                        break;
                    }
                }
            }
        }
    }
}
