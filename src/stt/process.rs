//! Child-process plumbing for the STT engine.
//!
//! [`run`] spawns a prepared command with stdin closed, drains stdout and
//! stderr line by line on their own tasks, and races the exit against a
//! deadline and a [`CancellationToken`]:
//!
//! ```text
//! spawn ─┬─ stdout reader ─┐
//!        ├─ stderr reader ─┤
//!        └─ select! { wait() | sleep_until(deadline) | cancelled() }
//!                    │              │                     │
//!               kill group    kill tree + group    kill tree + group
//! ```
//!
//! On unix the engine leads its own process group. Whichever way the run
//! ends, the group is killed, so helpers the engine forked do not outlive
//! it even after they were re-parented. The stop path additionally walks
//! the descendant tree ([`kill_process_tree`]), which also covers platforms
//! without process groups. Draining the output pipes after exit is bounded
//! by what is left of the deadline.

use std::collections::VecDeque;
use std::io;
use std::process::Stdio;
use std::time::Duration;

use sysinfo::{Pid, System};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::stt::error::StopReason;

/// Per-stream capture limit; anything beyond is read and discarded.
pub const MAX_CAPTURE_BYTES: usize = 256 * 1024;

/// How long to wait for a killed child to be reaped and its pipes to drain.
const REAP_GRACE: Duration = Duration::from_secs(2);

/// Drain budget when the engine exits right at its deadline.
const MIN_DRAIN: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum RunError {
    #[error("{0}")]
    Spawn(#[source] io::Error),

    #[error("waiting for child failed: {0}")]
    Wait(#[source] io::Error),
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The process exited on its own.  `code` is `None` after a signal.
    Exited {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    /// The process tree was killed before it finished.
    Stopped {
        reason: StopReason,
        stdout: String,
        stderr: String,
    },
}

enum Waited {
    Exited(io::Result<std::process::ExitStatus>),
    Stopped(StopReason),
}

/// Run `cmd` to completion, or kill it when `timeout` elapses or `cancel`
/// fires.
pub async fn run(
    mut cmd: Command,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<RunOutcome, RunError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let deadline = Instant::now() + timeout;
    let mut child = cmd.spawn().map_err(RunError::Spawn)?;
    let pid = child.id();
    log::debug!("stt: spawned engine pid {pid:?}");

    let stdout = child.stdout.take().map(|s| tokio::spawn(collect(s, "stdout")));
    let stderr = child.stderr.take().map(|s| tokio::spawn(collect(s, "stderr")));

    let waited = tokio::select! {
        status = child.wait() => Waited::Exited(status),
        _ = tokio::time::sleep_until(deadline) => Waited::Stopped(StopReason::Deadline),
        _ = cancel.cancelled() => Waited::Stopped(StopReason::Cancelled),
    };

    match waited {
        Waited::Exited(status) => {
            // Leftover helpers keep the pipes open; take them down first.
            if let Some(pid) = pid {
                if kill_process_group(pid) {
                    log::debug!("stt: killed leftover processes in group {pid}");
                }
            }
            let status = status.map_err(RunError::Wait)?;
            let drain = deadline
                .saturating_duration_since(Instant::now())
                .clamp(MIN_DRAIN, REAP_GRACE);
            Ok(RunOutcome::Exited {
                code: status.code(),
                stdout: finish_within(stdout, drain).await,
                stderr: finish_within(stderr, drain).await,
            })
        }
        Waited::Stopped(reason) => {
            log::warn!("stt: stopping engine pid {pid:?} ({reason})");
            if let Some(pid) = pid {
                let killed = kill_process_tree(pid);
                log::debug!("stt: killed {killed} process(es) in tree of {pid}");
                kill_process_group(pid);
            }
            // The root may already be gone from the table; make sure.
            let _ = child.start_kill();
            if tokio::time::timeout(REAP_GRACE, child.wait()).await.is_err() {
                log::warn!("stt: engine pid {pid:?} not reaped within {REAP_GRACE:?}");
            }

            Ok(RunOutcome::Stopped {
                reason,
                stdout: finish_within(stdout, REAP_GRACE).await,
                stderr: finish_within(stderr, REAP_GRACE).await,
            })
        }
    }
}

async fn collect<R: AsyncRead + Unpin>(stream: R, label: &'static str) -> String {
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    let mut out = String::new();
    let mut truncated = false;

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                log::trace!("stt {label}: {}", text.trim_end());
                if out.len() + text.len() <= MAX_CAPTURE_BYTES {
                    out.push_str(&text);
                } else if !truncated {
                    truncated = true;
                    out.push_str("[output truncated]\n");
                }
            }
            Err(e) => {
                log::warn!("stt: reading engine {label} failed: {e}");
                break;
            }
        }
    }
    out
}

async fn finish_within(handle: Option<JoinHandle<String>>, grace: Duration) -> String {
    let Some(mut h) = handle else {
        return String::new();
    };
    match tokio::time::timeout(grace, &mut h).await {
        Ok(joined) => joined.unwrap_or_default(),
        Err(_) => {
            log::warn!("stt: engine output still open after {grace:?}, dropping it");
            h.abort();
            String::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Process tree termination
// ---------------------------------------------------------------------------

/// Kill `root` and every descendant, leaves first.  Returns how many kill
/// signals were delivered.
pub fn kill_process_tree(root: u32) -> usize {
    let mut sys = System::new();
    sys.refresh_processes();

    let root = Pid::from_u32(root);
    let mut tree = vec![root];
    let mut queue = VecDeque::from([root]);

    while let Some(parent) = queue.pop_front() {
        for (pid, process) in sys.processes() {
            if process.parent() == Some(parent) && !tree.contains(pid) {
                tree.push(*pid);
                queue.push_back(*pid);
            }
        }
    }

    tree.iter()
        .rev()
        .filter(|pid| sys.process(**pid).map(|p| p.kill()).unwrap_or(false))
        .count()
}

/// SIGKILL every process in the group led by `pgid`.  Returns `false` when
/// the group is already empty.
#[cfg(unix)]
fn kill_process_group(pgid: u32) -> bool {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return false;
    };
    // SAFETY: killpg only delivers a signal; no memory is handed over.
    unsafe { libc::killpg(pgid, libc::SIGKILL) == 0 }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) -> bool {
    false
}
