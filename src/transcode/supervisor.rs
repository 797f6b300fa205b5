//! Transcoder process supervision
//!
//! Each launched ffmpeg is owned by a reaper task. The reaper is the only
//! place that touches the `Child`: it delivers stop and kill requests, waits
//! for the exit and publishes the outcome on a watch channel. Nothing signals
//! a pid after it has been reaped.

use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::sync::{watch, Notify};

use super::command::TranscodeJob;
use crate::config::TranscoderConfig;
use crate::error::{Result, StreamError};

/// How long the reaper waits for the stderr reader after the process exits
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// How a transcoder run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitOutcome {
    /// `None` if waiting on the process failed
    pub status: Option<ExitStatus>,
    /// The exit followed a stop or kill request
    pub requested: bool,
    /// The process had to be killed after ignoring the stop request
    pub forced: bool,
    /// Last line the process wrote to stderr
    pub last_stderr: Option<String>,
}

impl ExitOutcome {
    fn lost() -> Self {
        Self {
            status: None,
            requested: false,
            forced: false,
            last_stderr: None,
        }
    }

    pub fn success(&self) -> bool {
        self.status.map(|s| s.success()).unwrap_or(false)
    }

    /// The process failed without anyone asking it to stop.
    pub fn is_failure(&self) -> bool {
        !self.success() && !self.requested
    }

    /// Human readable reason for an unsuccessful exit.
    pub fn describe(&self) -> String {
        let status = match self.status {
            Some(s) => s.to_string(),
            None => "unknown exit status".to_string(),
        };
        match &self.last_stderr {
            Some(line) => format!("transcoder {}: {}", status, line),
            None => format!("transcoder {}", status),
        }
    }
}

#[derive(Debug, Default)]
struct ProcessControl {
    stop: Notify,
    kill: Notify,
}

/// Waits for a transcoder's exit outcome
#[derive(Debug, Clone)]
pub struct ExitSignal {
    rx: watch::Receiver<Option<ExitOutcome>>,
}

impl ExitSignal {
    pub async fn wait(&mut self) -> ExitOutcome {
        match self.rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone().unwrap_or_else(ExitOutcome::lost),
            Err(_) => ExitOutcome::lost(),
        }
    }

    pub fn has_exited(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

/// Handle to one running (or recently exited) transcoder
#[derive(Debug, Clone)]
pub struct TranscoderHandle {
    epoch: u64,
    pid: Option<u32>,
    control: Arc<ProcessControl>,
    exit: ExitSignal,
}

impl TranscoderHandle {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn exit_signal(&self) -> ExitSignal {
        self.exit.clone()
    }

    pub fn has_exited(&self) -> bool {
        self.exit.has_exited()
    }

    /// Ask the process to exit (SIGTERM on unix).
    pub fn request_stop(&self) {
        self.control.stop.notify_one();
    }

    /// Kill the process outright.
    pub fn request_kill(&self) {
        self.control.kill.notify_one();
    }
}

/// Launches and terminates transcoder processes
#[derive(Debug, Clone)]
pub struct Supervisor {
    config: TranscoderConfig,
}

impl Supervisor {
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }

    /// Spawn ffmpeg for `job`. Returns once the process exists; it runs on
    /// in the background until it exits or is terminated.
    pub fn launch(&self, job: &TranscodeJob, epoch: u64) -> Result<TranscoderHandle> {
        let mut cmd = job.command(&self.config);
        let mut child = cmd.spawn().map_err(|e| {
            StreamError::ProcessSpawnFailed(format!(
                "{}: {}",
                self.config.ffmpeg_path.display(),
                e
            ))
        })?;

        let pid = child.id();
        let stderr = child.stderr.take();
        let control = Arc::new(ProcessControl::default());
        let (tx, rx) = watch::channel(None);

        tracing::info!(
            epoch,
            pid = pid.unwrap_or_default(),
            source = %job.source.display_name,
            offset = job.offset,
            audio_tracks = job.audio_tracks.len(),
            "Transcoder started"
        );

        tokio::spawn(reap(child, stderr, epoch, control.clone(), tx));

        Ok(TranscoderHandle {
            epoch,
            pid,
            control,
            exit: ExitSignal { rx },
        })
    }

    /// Stop the process behind `handle` and wait until it is gone.
    ///
    /// The process is asked to stop, given the grace period, then killed.
    /// After the exit is confirmed the settle delay elapses before this
    /// returns. Calling this on an already exited process only waits out the
    /// settle delay.
    pub async fn terminate(&self, handle: &TranscoderHandle) -> ExitOutcome {
        let mut exit = handle.exit_signal();

        if !exit.has_exited() {
            handle.request_stop();
        }

        let graceful = tokio::time::timeout(self.config.grace_period(), exit.wait()).await;
        let outcome = match graceful {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    epoch = handle.epoch(),
                    pid = handle.pid().unwrap_or_default(),
                    "Transcoder ignored stop request for {:?}, killing",
                    self.config.grace_period()
                );
                handle.request_kill();
                exit.wait().await
            }
        };

        tokio::time::sleep(self.config.settle_delay()).await;
        outcome
    }
}

async fn reap(
    mut child: Child,
    stderr: Option<ChildStderr>,
    epoch: u64,
    control: Arc<ProcessControl>,
    tx: watch::Sender<Option<ExitOutcome>>,
) {
    let stderr_task = stderr.map(|s| tokio::spawn(forward_stderr(s, epoch)));
    let mut requested = false;
    let mut forced = false;

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            _ = control.stop.notified() => {
                requested = true;
                send_stop(&mut child, epoch);
            }
            _ = control.kill.notified() => {
                requested = true;
                forced = true;
                if let Err(e) = child.start_kill() {
                    tracing::warn!(epoch, "Failed to kill transcoder: {}", e);
                }
                break child.wait().await;
            }
        }
    };

    let last_stderr = match stderr_task {
        Some(task) => match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, task).await {
            Ok(Ok(line)) => line,
            _ => None,
        },
        None => None,
    };

    let status = match status {
        Ok(status) => Some(status),
        Err(e) => {
            tracing::error!(epoch, "Failed to wait on transcoder: {}", e);
            None
        }
    };

    let outcome = ExitOutcome {
        status,
        requested,
        forced,
        last_stderr,
    };

    if outcome.success() {
        tracing::info!(epoch, "Transcoder finished");
    } else if outcome.forced {
        tracing::warn!(epoch, "Transcoder killed");
    } else if outcome.requested {
        tracing::info!(epoch, "Transcoder stopped");
    } else {
        tracing::info!(epoch, "Transcoder exited: {}", outcome.describe());
    }

    // Receivers may all be gone already
    let _ = tx.send(Some(outcome));
}

#[cfg(unix)]
fn send_stop(child: &mut Child, epoch: u64) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // id() is None once the child has been reaped
    if let Some(pid) = child.id() {
        tracing::debug!(epoch, pid, "Sending SIGTERM to transcoder");
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            tracing::warn!(epoch, pid, "Failed to signal transcoder: {}", e);
        }
    }
}

#[cfg(not(unix))]
fn send_stop(child: &mut Child, epoch: u64) {
    if let Err(e) = child.start_kill() {
        tracing::warn!(epoch, "Failed to stop transcoder: {}", e);
    }
}

async fn forward_stderr(stderr: ChildStderr, epoch: u64) -> Option<String> {
    let mut lines = BufReader::new(stderr).lines();
    let mut last = None;
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        tracing::warn!(epoch, "ffmpeg: {}", line);
        last = Some(line);
    }
    last
}
