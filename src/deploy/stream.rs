//! Stream multiplexer: live script output to the HTTP response.
//!
//! stdout and stderr are drained by two concurrent readers. Every complete
//! line becomes one body chunk, so it reaches the client as soon as the
//! script prints it. Ordering holds within a stream, not across the two.
//!
//! The run ends in one of three ways:
//! - the script exits: the pipes get a short grace period to drain, then a
//!   final `[EXIT] <code>` line is sent. Background processes the script
//!   started are left running even if they still hold the pipes open.
//! - the deadline passes: the process group is killed, then `[ERR] ...` and `[EXIT] -1`
//! - the client goes away: the process group is killed, nothing more is sent

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::runner::{RunningScript, terminate};

pub const STDERR_PREFIX: &str = "[ERR] ";
pub const EXIT_PREFIX: &str = "[EXIT] ";

/// Lines buffered between the readers and the response body.
const CHANNEL_CAPACITY: usize = 64;

/// How long output may keep draining after the script itself has exited.
pub const DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Exit code, `None` when the script was ended by a signal.
    Exited(Option<i32>),
    TimedOut,
    Disconnected,
}

impl StreamOutcome {
    /// Code reported in the `[EXIT]` trailer.
    pub fn exit_code(&self) -> i32 {
        match self {
            StreamOutcome::Exited(Some(code)) => *code,
            _ => -1,
        }
    }
}

/// The receiving side of the response body went away.
struct ClientGone;

/// Start streaming `running` on a background task.
///
/// The receiver yields response body chunks; the handle resolves once the
/// script is finished and reaped.
pub fn spawn_stream(
    running: RunningScript,
    timeout: Option<Duration>,
) -> (mpsc::Receiver<Bytes>, JoinHandle<StreamOutcome>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let handle = tokio::spawn(drive(running, tx, timeout));
    (rx, handle)
}

/// Drain both pipes into `tx` until the script exits, the deadline passes
/// or the receiver is dropped.
pub async fn drive(
    running: RunningScript,
    tx: mpsc::Sender<Bytes>,
    timeout: Option<Duration>,
) -> StreamOutcome {
    let RunningScript {
        mut child,
        stdout,
        stderr,
    } = running;
    let deadline = timeout.map(|t| Instant::now() + t);

    let mut drained = Box::pin(async {
        let (out, err) = tokio::join!(pump(stdout, "", &tx), pump(stderr, STDERR_PREFIX, &tx));
        out.and(err)
    });

    let outcome = tokio::select! {
        result = &mut drained => match result {
            Err(ClientGone) => StreamOutcome::Disconnected,
            // Pipes closed; the script may still be running (e.g. it closed
            // its own stdout), so keep honouring the deadline.
            Ok(()) => tokio::select! {
                status = child.wait() => StreamOutcome::Exited(status.ok().and_then(|s| s.code())),
                () = sleep_until_deadline(deadline) => StreamOutcome::TimedOut,
                () = tx.closed() => StreamOutcome::Disconnected,
            },
        },
        status = child.wait() => {
            let code = status.ok().and_then(|s| s.code());
            // Children the script left in the background may inherit the
            // pipes, so EOF is not waited for beyond the grace period.
            // The script is already gone; nothing here kills what it left behind.
            match tokio::time::timeout(DRAIN_GRACE, &mut drained).await {
                Ok(Ok(())) => {}
                Ok(Err(ClientGone)) => tracing::debug!("client left while output drained"),
                Err(_) => tracing::debug!("script exited with its output pipes still open"),
            }
            StreamOutcome::Exited(code)
        },
        () = sleep_until_deadline(deadline) => StreamOutcome::TimedOut,
        () = tx.closed() => StreamOutcome::Disconnected,
    };
    drop(drained);

    if !matches!(outcome, StreamOutcome::Exited(_)) {
        terminate(&mut child).await;
    }

    if outcome == StreamOutcome::TimedOut {
        let elapsed = timeout.unwrap_or_default();
        let line = format!("{}deploy timed out after {:?}\n", STDERR_PREFIX, elapsed);
        let _ = tx.send(Bytes::from(line)).await;
    }
    if outcome != StreamOutcome::Disconnected {
        let line = format!("{}{}\n", EXIT_PREFIX, outcome.exit_code());
        let _ = tx.send(Bytes::from(line)).await;
    }

    outcome
}

/// Forward `reader` line by line, each line prefixed and newline-terminated.
async fn pump<R: AsyncRead + Unpin>(
    reader: R,
    prefix: &'static str,
    tx: &mpsc::Sender<Bytes>,
) -> Result<(), ClientGone> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => return Ok(()),
            Ok(_) => {
                let line = strip_line_ending(&buf);
                let chunk = format!("{}{}\n", prefix, String::from_utf8_lossy(line));
                tx.send(Bytes::from(chunk)).await.map_err(|_| ClientGone)?;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed reading script output");
                return Ok(());
            }
        }
    }
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
