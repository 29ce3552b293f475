use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{ExtractorCommand, ProcessOutcome, ProcessRunner};
use crate::error::truncate_chars;

/// How long to keep draining pipes once the process itself has exited.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Runs extractor commands with `tokio::process`, one process group per call.
pub struct TokioProcessRunner {
    max_capture_bytes: usize,
}

impl TokioProcessRunner {
    pub fn new(max_capture_bytes: usize) -> Self {
        Self { max_capture_bytes }
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: &ExtractorCommand, deadline: Duration) -> ProcessOutcome {
        info!(
            "Executing command: {}",
            truncate_chars(&command.display_line(), 150)
        );

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so a deadline kill reaches helpers such as ffmpeg.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to start {}: {}", command.program, e);
                return ProcessOutcome::Failed {
                    message: format!("Failed to start {}: {}", command.program, e),
                };
            }
        };

        // Dropping this future before the match below completes must still
        // take the whole group down; kill_on_drop only reaches the direct child.
        let mut group = GroupKillGuard::new(child.id());

        let limit = self.max_capture_bytes;
        let stdout_task = child
            .stdout
            .take()
            .map(|pipe| tokio::spawn(capture_tail(pipe, limit)));
        let stderr_task = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(capture_tail(pipe, limit)));

        let waited = tokio::select! {
            status = child.wait() => Some(status),
            _ = tokio::time::sleep(deadline) => None,
        };

        match waited {
            Some(Ok(status)) => {
                group.disarm();
                let stdout = collect(stdout_task).await;
                let stderr = collect(stderr_task).await;
                classify_exit(command, status, stdout, stderr)
            }
            Some(Err(e)) => {
                group.disarm();
                terminate(&mut child).await;
                abort(stdout_task);
                abort(stderr_task);
                error!("Failed to wait for {}: {}", command.program, e);
                ProcessOutcome::Failed {
                    message: format!("Failed to wait for {}: {}", command.program, e),
                }
            }
            None => {
                warn!(
                    "{} exceeded deadline of {:?}, terminating",
                    command.description, deadline
                );
                group.disarm();
                terminate(&mut child).await;
                abort(stdout_task);
                abort(stderr_task);
                ProcessOutcome::TimedOut
            }
        }
    }
}

/// Kills the extractor's process group on drop unless disarmed first.
struct GroupKillGuard {
    pgid: Option<u32>,
}

impl GroupKillGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupKillGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            warn!("Extraction abandoned before completion, killing process group {}", pgid);
            kill_group(pgid);
        }
    }
}

/// SIGKILL every process in group `pgid`.
#[cfg(unix)]
fn kill_group(pgid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
        debug!("Process group {} kill failed: {}", pgid, e);
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

fn classify_exit(
    command: &ExtractorCommand,
    status: ExitStatus,
    stdout: String,
    stderr: String,
) -> ProcessOutcome {
    if status.success() {
        debug!("Command output: {}", truncate_chars(stdout.trim(), 100));
        return ProcessOutcome::Success { stdout };
    }

    let stderr = stderr.trim();
    let message = if !stderr.is_empty() {
        stderr.to_string()
    } else if !stdout.trim().is_empty() {
        format!("{} exited with {}: {}", command.description, status, stdout.trim())
    } else {
        format!("{} exited with {}", command.description, status)
    };

    error!("Command error: {}", truncate_chars(&message, 200));
    ProcessOutcome::Failed { message }
}

/// Kill the child's whole process group, then reap the child itself.
async fn terminate(child: &mut Child) {
    // The child is not reaped yet, so its pid still names our group.
    if let Some(pid) = child.id() {
        kill_group(pid);
    }

    if let Err(e) = child.start_kill() {
        debug!("Direct kill after group kill: {}", e);
    }

    match child.wait().await {
        Ok(status) => debug!("Terminated extractor reaped with {}", status),
        Err(e) => warn!("Failed to reap terminated extractor: {}", e),
    }
}

/// Read a pipe to EOF, retaining only the last `limit` bytes.
async fn capture_tail<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.len() > limit {
                    let excess = buf.len() - limit;
                    buf.drain(..excess);
                }
            }
            Err(e) => {
                warn!("Failed to read process output: {}", e);
                break;
            }
        }
    }

    buf
}

async fn collect(task: Option<JoinHandle<Vec<u8>>>) -> String {
    let Some(mut task) = task else {
        return String::new();
    };

    match tokio::time::timeout(PIPE_DRAIN_GRACE, &mut task).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(e)) => {
            warn!("Output capture task failed: {}", e);
            String::new()
        }
        Err(_) => {
            // A detached descendant still holds the pipe open.
            task.abort();
            String::new()
        }
    }
}

fn abort(task: Option<JoinHandle<Vec<u8>>>) {
    if let Some(task) = task {
        task.abort();
    }
}
