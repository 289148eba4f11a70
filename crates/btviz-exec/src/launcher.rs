//! Running a compiled snippet in its own process.
//!
//! The child is the run's loading context: spawned fresh, never reused, and
//! killed and reaped by [`ChildGuard`] on every exit path. Its stdout and
//! stderr go to files inside the workspace so a chatty snippet cannot block
//! on a full pipe.

use std::fs::{self, File};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{ExecutionFailure, FailureKind};
use crate::workspace::Workspace;

/// Environment variable naming the event file.
pub const TRACE_FILE_ENV: &str = "BTVIZ_TRACE_FILE";
/// Set to `0` to stop the child from capturing backtraces per step.
pub const CAPTURE_BACKTRACE_ENV: &str = "BTVIZ_CAPTURE_BACKTRACE";
/// Exit status the support crate uses when it cannot write the event file.
pub const SINK_FAILURE_EXIT: i32 = 97;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Launch parameters for one run.
#[derive(Debug, Clone)]
pub struct Launch<'a> {
    pub binary: &'a Path,
    pub events: &'a Path,
    pub timeout: Option<Duration>,
    pub capture_backtraces: bool,
}

/// Kills and reaps the child when dropped.
#[derive(Debug)]
pub struct ChildGuard {
    child: Option<Child>,
}

impl ChildGuard {
    pub fn new(child: Child) -> Self {
        ChildGuard { child: Some(child) }
    }

    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Waits for exit, killing the child once `timeout` elapses.
    /// Returns `Ok(None)` on timeout.
    pub fn wait(&mut self, timeout: Option<Duration>) -> std::io::Result<Option<ExitStatus>> {
        let Some(child) = self.child.as_mut() else {
            return Ok(None);
        };
        let status = match timeout {
            None => Some(child.wait()?),
            Some(limit) => {
                let deadline = Instant::now() + limit;
                loop {
                    if let Some(status) = child.try_wait()? {
                        break Some(status);
                    }
                    if Instant::now() >= deadline {
                        break None;
                    }
                    thread::sleep(POLL_INTERVAL);
                }
            }
        };
        if status.is_some() {
            // Already reaped.
            self.child = None;
        }
        Ok(status)
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(err) = child.kill() {
                tracing::warn!(pid = child.id(), error = %err, "failed to kill snippet process");
            }
            if let Err(err) = child.wait() {
                tracing::warn!(pid = child.id(), error = %err, "failed to reap snippet process");
            }
        }
    }
}

/// Runs the binary to completion inside `workspace`.
///
/// Returns `Ok(())` only for a zero exit status; every other outcome is an
/// [`ExecutionFailure`] whose stack is the child's stderr.
pub fn run(workspace: &mut Workspace, launch: &Launch<'_>) -> Result<(), ExecutionFailure> {
    let stdout_path = workspace.join("stdout.log");
    let stderr_path = workspace.join("stderr.log");
    workspace.track(stdout_path.clone());
    workspace.track(stderr_path.clone());

    let stdout = File::create(&stdout_path).map_err(|e| ExecutionFailure::io("creating stdout log", e))?;
    let stderr = File::create(&stderr_path).map_err(|e| ExecutionFailure::io("creating stderr log", e))?;

    let child = Command::new(launch.binary)
        .current_dir(workspace.path())
        .env(TRACE_FILE_ENV, launch.events)
        .env(CAPTURE_BACKTRACE_ENV, if launch.capture_backtraces { "1" } else { "0" })
        .env("RUST_BACKTRACE", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .spawn()
        .map_err(|e| ExecutionFailure::io("spawning snippet", e))?;

    let mut guard = ChildGuard::new(child);
    tracing::debug!(pid = ?guard.id(), "snippet started");
    let status = guard
        .wait(launch.timeout)
        .map_err(|e| ExecutionFailure::io("waiting for snippet", e))?;
    drop(guard);

    let stack = fs::read_to_string(&stderr_path).unwrap_or_default();
    match status {
        Some(status) if status.success() => Ok(()),
        Some(status) => Err(classify(status, stack)),
        None => {
            let limit = launch.timeout.unwrap_or_default();
            Err(ExecutionFailure::new(
                FailureKind::Timeout,
                format!("run exceeded {} ms and was killed", limit.as_millis()),
            )
            .with_stack(stack))
        }
    }
}

/// Turns a non-zero exit into a failure description.
pub fn classify(status: ExitStatus, stderr: String) -> ExecutionFailure {
    if let Some(message) = panic_message(&stderr) {
        return ExecutionFailure::new(FailureKind::Panic, message).with_stack(stderr);
    }
    let failure = match status.code() {
        Some(SINK_FAILURE_EXIT) => {
            let reason = stderr
                .lines()
                .rev()
                .find_map(|l| l.strip_prefix("btviz_trace: "))
                .unwrap_or("event file could not be written");
            ExecutionFailure::new(FailureKind::Protocol, format!("trace lost: {reason}"))
        }
        Some(code) => ExecutionFailure::new(FailureKind::Exit, format!("process exited with status {code}")),
        None => ExecutionFailure::new(FailureKind::Signal, signal_message(status)),
    };
    failure.with_stack(stderr)
}

#[cfg(unix)]
fn signal_message(status: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => format!("process terminated by signal {signal}"),
        None => format!("process terminated: {status}"),
    }
}

#[cfg(not(unix))]
fn signal_message(status: ExitStatus) -> String {
    format!("process terminated: {status}")
}

/// Extracts the payload of the first panic report in `stderr`.
///
/// Handles both `panicked at src/x.rs:1:2:\nmsg` and the older
/// `panicked at 'msg', src/x.rs:1:2` layouts.
pub fn panic_message(stderr: &str) -> Option<String> {
    let mut lines = stderr.lines();
    while let Some(line) = lines.next() {
        let Some((_, rest)) = line.split_once(" panicked at ") else {
            continue;
        };
        if let Some(quoted) = rest.strip_prefix('\'') {
            let message = quoted.rsplit_once("', ").map_or(quoted, |(msg, _)| msg);
            return Some(message.to_string());
        }
        let message: Vec<&str> = lines
            .by_ref()
            .take_while(|l| !l.starts_with("note:") && !l.starts_with("stack backtrace:"))
            .collect();
        let message = message.join("\n").trim().to_string();
        return Some(if message.is_empty() {
            format!("panicked at {}", rest.trim_end_matches(':'))
        } else {
            message
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_current_panic_layout() {
        let stderr = "thread 'main' panicked at Demo.rs:4:5:\nindex out of bounds: the len is 2 but the index is 5\nstack backtrace:\n   0: rust_begin_unwind\n";
        assert_eq!(
            panic_message(stderr).as_deref(),
            Some("index out of bounds: the len is 2 but the index is 5")
        );
    }

    #[test]
    fn parses_legacy_panic_layout() {
        let stderr = "thread 'main' panicked at 'boom', Demo.rs:4:5\nnote: run with `RUST_BACKTRACE=1`";
        assert_eq!(panic_message(stderr).as_deref(), Some("boom"));
    }

    #[test]
    fn multi_line_panic_payload() {
        let stderr = "thread 'main' panicked at Demo.rs:9:9:\nassertion `left == right` failed\n  left: 1\n right: 2\nnote: run with `RUST_BACKTRACE=1`\n";
        assert_eq!(
            panic_message(stderr).as_deref(),
            Some("assertion `left == right` failed\n  left: 1\n right: 2")
        );
    }

    #[cfg(unix)]
    fn exit_status(code: i32) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(code << 8)
    }

    #[cfg(unix)]
    #[test]
    fn lost_event_file_is_a_protocol_failure() {
        let stderr = "btviz_trace: cannot open /gone/events.jsonl: No such file or directory (os error 2)\n";
        let failure = classify(exit_status(SINK_FAILURE_EXIT), stderr.to_string());
        assert_eq!(failure.kind, FailureKind::Protocol);
        assert!(failure.message.contains("cannot open /gone/events.jsonl"));

        let failure = classify(exit_status(3), String::new());
        assert_eq!(failure.kind, FailureKind::Exit);
        assert!(failure.message.contains('3'));
    }

    #[test]
    fn no_panic_in_plain_stderr() {
        assert_eq!(panic_message("error: something else\n"), None);
        assert_eq!(panic_message(""), None);
    }
}
