//! Subprocess execution with full stream capture.
//!
//! Runs a command string through the host shell, captures its entire
//! stdout and stderr into memory, and resolves with the final exit code
//! once the process has terminated and both streams are drained. Output is
//! never truncated: capture buffers grow with the output.
//!
//! Failure to execute the shell itself is an infrastructure error
//! ([`HarnessError::Spawn`]), never a test outcome. A missing subject
//! command, by contrast, surfaces as the shell's own exit code (127 on
//! POSIX) and participates in exit-code assertions like any other observed
//! behavior.

use std::borrow::Cow;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::error::HarnessError;

// ============================================================================
// Process Result
// ============================================================================

/// Observed behavior of one subprocess execution.
///
/// Immutable once returned; owned by the calling assertion.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    /// Final exit code, or `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Complete captured stdout.
    pub stdout: Vec<u8>,
    /// Complete captured stderr.
    pub stderr: Vec<u8>,
    /// Wall-clock time from spawn to full drain.
    pub duration: Duration,
}

impl ProcessResult {
    /// Whether the process exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Captured stdout as text, with invalid UTF-8 replaced.
    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    /// Captured stderr as text, with invalid UTF-8 replaced.
    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

// ============================================================================
// Shell Configuration
// ============================================================================

/// Configuration for executing command strings through the host shell.
///
/// Defaults to `sh -c` on Unix and `cmd /C` on Windows, inheriting the
/// test process's environment and working directory. Both can be
/// overridden builder-style.
#[derive(Debug, Clone)]
pub struct Shell {
    /// Shell binary used to interpret command strings.
    program: PathBuf,
    /// Flag that introduces the command string.
    command_flag: String,
    /// Working directory override.
    cwd: Option<PathBuf>,
    /// Additional environment variables.
    extra_env: Vec<(String, String)>,
}

impl Default for Shell {
    fn default() -> Self {
        #[cfg(windows)]
        let (program, flag) = ("cmd", "/C");
        #[cfg(not(windows))]
        let (program, flag) = ("sh", "-c");

        Shell {
            program: PathBuf::from(program),
            command_flag: flag.to_string(),
            cwd: None,
            extra_env: Vec::new(),
        }
    }
}

impl Shell {
    /// Host default shell.
    pub fn new() -> Self {
        Shell::default()
    }

    /// Use a different shell binary (same `-c`-style flag).
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Shell {
            program: program.into(),
            ..Shell::default()
        }
    }

    /// Run commands from `dir` instead of the inherited working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Add an environment variable on top of the inherited environment.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.push((key.into(), value.into()));
        self
    }

    /// Execute `command` and capture its streams completely.
    ///
    /// Suspends until the process terminates and both pipes are drained;
    /// there is no partial exit-code observation.
    pub fn run(&self, command: &str) -> Result<ProcessResult, HarnessError> {
        debug!("running test subject: {}", command);
        let start = Instant::now();

        let output = self
            .command(command)
            .output()
            .map_err(|source| HarnessError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let result = ProcessResult {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
            duration: start.elapsed(),
        };
        debug!(
            "test subject exited with {:?} after {:?}",
            result.exit_code, result.duration
        );
        Ok(result)
    }

    /// Execute `command` with a hard wall-clock limit.
    ///
    /// The wait is OS-level (no polling). On expiry the child is killed
    /// and reaped and [`HarnessError::Timeout`] is returned. Both pipes
    /// are drained on dedicated threads so a child that fills the pipe
    /// buffer cannot deadlock the wait.
    pub fn run_with_timeout(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<ProcessResult, HarnessError> {
        debug!(
            "running test subject with {:?} limit: {}",
            timeout, command
        );
        let start = Instant::now();

        let mut child = self
            .command(command)
            .spawn()
            .map_err(|source| HarnessError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let stdout_drain = drain_thread(child.stdout.take());
        let stderr_drain = drain_thread(child.stderr.take());

        match child.wait_timeout(timeout)? {
            Some(status) => Ok(ProcessResult {
                exit_code: status.code(),
                stdout: join_drain(stdout_drain),
                stderr: join_drain(stderr_drain),
                duration: start.elapsed(),
            }),
            None => {
                warn!(
                    "command timed out after {:?}, killing: {}",
                    timeout, command
                );
                let _ = child.kill();
                let _ = child.wait(); // Reap the zombie
                let _ = join_drain(stdout_drain);
                let _ = join_drain(stderr_drain);
                Err(HarnessError::Timeout {
                    command: command.to_string(),
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }

    /// Build the `Command` for one execution.
    fn command(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(&self.command_flag)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.extra_env {
            cmd.env(key, value);
        }
        cmd
    }
}

/// Run `command` through the default host shell.
pub fn run_shell(command: &str) -> Result<ProcessResult, HarnessError> {
    Shell::default().run(command)
}

// ============================================================================
// Pipe Draining
// ============================================================================

/// Read a pipe to EOF on its own thread.
fn drain_thread<R: Read + Send + 'static>(stream: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    stream.map(|mut stream| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stream.read_to_end(&mut buf);
            buf
        })
    })
}

/// Collect a drain thread's buffer.
fn join_drain(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod run {
        use super::*;

        #[test]
        fn captures_stdout() {
            let result = run_shell("echo hello").unwrap();
            assert_eq!(result.exit_code, Some(0));
            assert!(result.success());
            assert_eq!(result.stdout_lossy().trim(), "hello");
            assert!(result.stderr.is_empty());
        }

        #[test]
        fn captures_stderr() {
            let result = run_shell("echo oops >&2").unwrap();
            assert!(result.stdout.is_empty());
            assert_eq!(result.stderr_lossy().trim(), "oops");
        }

        #[test]
        fn reports_nonzero_exit_code() {
            let result = run_shell("exit 2").unwrap();
            assert_eq!(result.exit_code, Some(2));
            assert!(!result.success());
        }

        #[test]
        fn missing_subject_command_is_an_observed_exit_code() {
            // The shell spawns fine; the missing command is the subject's
            // observable behavior, not an infrastructure failure.
            let result = run_shell("definitely-not-a-command-xyz").unwrap();
            assert_ne!(result.exit_code, Some(0));
        }

        #[test]
        fn missing_shell_is_a_spawn_error() {
            let shell = Shell::with_program("/nonexistent/shell-binary");
            let err = shell.run("echo hello").unwrap_err();
            assert!(matches!(err, HarnessError::Spawn { .. }));
        }

        #[test]
        fn large_output_is_not_truncated() {
            let result = run_shell("seq 1 20000").unwrap();
            assert!(result.success());
            let text = result.stdout_lossy();
            let lines: Vec<&str> = text.lines().collect();
            assert_eq!(lines.len(), 20000);
            assert_eq!(lines[0], "1");
            assert_eq!(lines[19999], "20000");
        }

        #[test]
        fn measures_duration() {
            let result = run_shell("true").unwrap();
            assert!(result.duration > Duration::ZERO);
        }

        #[test]
        fn env_override_reaches_the_subject() {
            let shell = Shell::new().env("CMDCHECK_PROBE", "probe-value");
            let result = shell.run("echo $CMDCHECK_PROBE").unwrap();
            assert_eq!(result.stdout_lossy().trim(), "probe-value");
        }

        #[test]
        fn cwd_override_reaches_the_subject() {
            let dir = tempfile::TempDir::new().unwrap();
            let canonical = dir.path().canonicalize().unwrap();
            let shell = Shell::new().current_dir(&canonical);
            let result = shell.run("pwd").unwrap();
            assert_eq!(
                PathBuf::from(result.stdout_lossy().trim()),
                canonical
            );
        }
    }

    mod run_with_timeout {
        use super::*;

        #[test]
        fn fast_command_completes_normally() {
            let result = Shell::new()
                .run_with_timeout("echo quick", Duration::from_secs(10))
                .unwrap();
            assert!(result.success());
            assert_eq!(result.stdout_lossy().trim(), "quick");
        }

        #[test]
        fn slow_command_is_killed() {
            let err = Shell::new()
                .run_with_timeout("sleep 30", Duration::from_millis(200))
                .unwrap_err();
            assert!(matches!(err, HarnessError::Timeout { .. }));
        }

        #[test]
        fn pipe_filling_child_does_not_deadlock_the_wait() {
            // Well past the OS pipe buffer; the drain threads must keep
            // reading while the bounded wait is in progress.
            let result = Shell::new()
                .run_with_timeout("seq 1 100000", Duration::from_secs(30))
                .unwrap();
            assert!(result.success());
            assert_eq!(result.stdout_lossy().lines().count(), 100000);
        }
    }
}
