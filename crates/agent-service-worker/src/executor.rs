//! Shell command execution with streamed output capture.

use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Time between SIGTERM and SIGKILL when a command overruns its timeout.
pub const KILL_GRACE: Duration = Duration::from_secs(2);

/// Default cap on captured output per command.
pub const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Lines buffered between the pipe readers and the collector.
const LINE_BUFFER: usize = 256;

/// Outcome of one command run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// True only for a normal exit with code 0.
    pub success: bool,
    /// Stream-tagged output lines in arrival order, then one `[system]` line.
    pub logs: Vec<String>,
    pub exit_code: Option<i32>,
    /// Name of the terminating signal, e.g. `SIGTERM`.
    pub signal: Option<String>,
}

impl ExecutionResult {
    fn execution_error(mut logs: Vec<String>, message: impl std::fmt::Display) -> Self {
        logs.push(format!("[system] Execution error: {}", message));
        Self {
            success: false,
            logs,
            exit_code: None,
            signal: None,
        }
    }

    fn exited(mut logs: Vec<String>, code: i32) -> Self {
        logs.push(format!("[system] Process exited with code: {}", code));
        Self {
            success: code == 0,
            logs,
            exit_code: Some(code),
            signal: None,
        }
    }

    fn signalled(mut logs: Vec<String>, signal: String) -> Self {
        logs.push(format!("[system] Process terminated by signal: {}", signal));
        Self {
            success: false,
            logs,
            exit_code: None,
            signal: Some(signal),
        }
    }
}

/// Why collection stopped before the process and its pipes finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cutoff {
    Timeout,
    OutputLimit,
}

#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    fn tag(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "[stdout]",
            OutputStream::Stderr => "[stderr]",
        }
    }
}

/// Runs shell commands through `sh -c` under a wall-clock timeout.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    timeout: Duration,
    kill_grace: Duration,
    max_output: usize,
}

impl CommandExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            kill_grace: KILL_GRACE,
            max_output: MAX_OUTPUT_BYTES,
        }
    }

    /// Override the SIGTERM to SIGKILL grace period.
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Override the captured output cap. A command whose tagged lines
    /// exceed `bytes` in total is terminated like a timed-out one.
    pub fn with_output_limit(mut self, bytes: usize) -> Self {
        self.max_output = bytes;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `command` to completion. Never fails; spawn and wait errors are
    /// reported through the returned logs.
    pub async fn execute(&self, command: &str) -> ExecutionResult {
        info!("Executing command: {}", command);

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn command: {}", e);
                return ExecutionResult::execution_error(Vec::new(), e);
            }
        };

        let group = child
            .id()
            .and_then(|pid| i32::try_from(pid).ok())
            .map(Pid::from_raw);

        let (tx, mut rx) = mpsc::channel(LINE_BUFFER);
        let chunk = self.max_output.saturating_add(1);
        let mut readers: Vec<JoinHandle<()>> = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(
                stdout,
                OutputStream::Stdout,
                chunk,
                tx.clone(),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(
                stderr,
                OutputStream::Stderr,
                chunk,
                tx.clone(),
            )));
        }
        drop(tx);

        let mut logs = Vec::new();
        let mut captured = 0usize;
        let mut exit: Option<std::io::Result<ExitStatus>> = None;
        let mut streams_open = true;
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        let cutoff = loop {
            if exit.is_some() && !streams_open {
                break None;
            }
            tokio::select! {
                line = rx.recv(), if streams_open => match line {
                    Some(line) => {
                        captured = captured.saturating_add(line.len());
                        if captured > self.max_output {
                            break Some(Cutoff::OutputLimit);
                        }
                        logs.push(line);
                    }
                    None => streams_open = false,
                },
                status = child.wait(), if exit.is_none() => exit = Some(status),
                _ = &mut deadline => break Some(Cutoff::Timeout),
            }
        };

        let Some(cutoff) = cutoff else {
            return match exit {
                Some(Ok(status)) => Self::classify(logs, status),
                Some(Err(e)) => ExecutionResult::execution_error(logs, e),
                None => ExecutionResult::execution_error(logs, "process state lost"),
            };
        };

        match cutoff {
            Cutoff::Timeout => {
                warn!(
                    "Command exceeded {}ms timeout, terminating",
                    self.timeout.as_millis()
                );
                // Keep whatever the readers forwarded before the deadline.
                while let Ok(line) = rx.try_recv() {
                    captured = captured.saturating_add(line.len());
                    if captured > self.max_output {
                        break;
                    }
                    logs.push(line);
                }
            }
            Cutoff::OutputLimit => warn!(
                "Command output exceeded {} bytes, terminating",
                self.max_output
            ),
        }
        for reader in &readers {
            reader.abort();
        }
        drop(rx);

        match exit {
            // The shell is gone but the rest of its group still holds the pipes.
            Some(Ok(_)) => {
                signal_group(group, Signal::SIGKILL);
                ExecutionResult::signalled(logs, Signal::SIGKILL.as_str().to_string())
            }
            Some(Err(e)) => ExecutionResult::execution_error(logs, e),
            None => match self.terminate(&mut child, group).await {
                Ok(status) => {
                    let signal = status
                        .signal()
                        .map(signal_name)
                        .unwrap_or_else(|| Signal::SIGTERM.as_str().to_string());
                    ExecutionResult::signalled(logs, signal)
                }
                Err(e) => ExecutionResult::execution_error(logs, e),
            },
        }
    }

    /// SIGTERM the process group, then SIGKILL it once the grace period
    /// runs out.
    async fn terminate(
        &self,
        child: &mut Child,
        group: Option<Pid>,
    ) -> std::io::Result<ExitStatus> {
        signal_group(group, Signal::SIGTERM);

        match tokio::time::timeout(self.kill_grace, child.wait()).await {
            Ok(status) => {
                // Stragglers that outlived the shell.
                signal_group(group, Signal::SIGKILL);
                status
            }
            Err(_) => {
                warn!(
                    "Process ignored SIGTERM for {}ms, sending SIGKILL",
                    self.kill_grace.as_millis()
                );
                signal_group(group, Signal::SIGKILL);
                child.wait().await
            }
        }
    }

    fn classify(logs: Vec<String>, status: ExitStatus) -> ExecutionResult {
        match (status.code(), status.signal()) {
            (Some(code), _) => {
                debug!("Process exited with code {}", code);
                ExecutionResult::exited(logs, code)
            }
            (None, Some(raw)) => ExecutionResult::signalled(logs, signal_name(raw)),
            (None, None) => ExecutionResult::execution_error(logs, "unknown exit status"),
        }
    }
}

/// The child leads its own group, so the group id is the child's pid.
fn signal_group(group: Option<Pid>, signal: Signal) {
    let Some(group) = group else {
        return;
    };
    if let Err(e) = killpg(group, signal) {
        debug!("Failed to send {} to process group {}: {}", signal, group, e);
    }
}

fn signal_name(raw: i32) -> String {
    Signal::try_from(raw)
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|_| format!("SIG{}", raw))
}

/// Forward tagged lines until EOF. A line longer than `chunk` bytes is
/// split so one unterminated line cannot grow without bound.
async fn forward_lines<R>(
    reader: R,
    stream: OutputStream,
    chunk: usize,
    tx: mpsc::Sender<String>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let limit = u64::try_from(chunk).unwrap_or(u64::MAX);

    loop {
        buf.clear();
        match (&mut reader).take(limit).read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim_end();
                if line.is_empty() {
                    continue;
                }
                if tx.send(format!("{} {}", stream.tag(), line)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("Stopped reading {}: {}", stream.tag(), e);
                break;
            }
        }
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
