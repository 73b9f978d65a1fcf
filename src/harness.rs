//! Assertion layer and test lifecycle.
//!
//! A [`Harness`] runs command-line subjects and turns observed behavior
//! into either silent success or the typed failure signal
//! ([`TestError::Failure`]). A [`TestCase`] supplies the test body; its
//! provided `test()` method is the single place the failure signal is
//! consumed and reduced to a boolean outcome.
//!
//! Every containment assertion records the captured streams to the
//! per-run log destinations before comparing, so failure context is on
//! disk even though the failure signal itself carries no payload. The
//! diagnostic for each failed assertion is emitted through `tracing`
//! before the signal is raised.

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{HarnessError, TestError, TestResult};
use crate::process::{ProcessResult, Shell};
use crate::writer::{spawn_relay, RelayHandle};

// ============================================================================
// Log Layout
// ============================================================================

/// Captured stdout file name.
const STDOUT_LOG: &str = "stdout.txt";

/// Captured stderr file name.
const STDERR_LOG: &str = "stderr.txt";

/// Per-run report file name.
const RUN_REPORT: &str = "run.json";

/// Where one assertion run's captures land.
///
/// File names are fixed and overwritten on every assertion call; callers
/// that need per-call history must rename or copy before the next call.
/// The directory defaults to the current working directory.
#[derive(Debug, Clone)]
pub struct LogLayout {
    dir: PathBuf,
}

impl Default for LogLayout {
    fn default() -> Self {
        LogLayout {
            dir: PathBuf::from("."),
        }
    }
}

impl LogLayout {
    /// Place the log files in `dir` instead of the current working
    /// directory.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        LogLayout { dir: dir.into() }
    }

    /// Path of the captured-stdout file.
    pub fn stdout_path(&self) -> PathBuf {
        self.dir.join(STDOUT_LOG)
    }

    /// Path of the captured-stderr file.
    pub fn stderr_path(&self) -> PathBuf {
        self.dir.join(STDERR_LOG)
    }

    /// Path of the per-run report.
    pub fn report_path(&self) -> PathBuf {
        self.dir.join(RUN_REPORT)
    }

    /// Overwrite the capture files and the run report for one run.
    fn record(&self, command: &str, result: &ProcessResult) -> io::Result<()> {
        fs::write(self.stdout_path(), &result.stdout)?;
        fs::write(self.stderr_path(), &result.stderr)?;

        let report = RunReport {
            command: command.to_string(),
            exit_code: result.exit_code,
            duration_ms: result.duration.as_millis() as u64,
            finished_at: format_timestamp(),
        };
        let json = serde_json::to_string_pretty(&report).unwrap_or_default();
        fs::write(self.report_path(), json)?;
        Ok(())
    }
}

/// Metadata for one assertion run, written beside the raw captures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// The command string handed to the shell.
    pub command: String,
    /// Final exit code, `null` on signal termination.
    pub exit_code: Option<i32>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// ISO 8601 finish timestamp (UTC).
    pub finished_at: String,
}

/// Current time as ISO 8601 (UTC).
fn format_timestamp() -> String {
    use chrono::{DateTime, Utc};
    use std::time::SystemTime;

    let datetime: DateTime<Utc> = SystemTime::now().into();
    datetime.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

// ============================================================================
// Harness
// ============================================================================

/// Which captured stream a containment check inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    fn name(self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

/// Assertion surface handed to every test body.
#[derive(Debug, Clone, Default)]
pub struct Harness {
    shell: Shell,
    logs: LogLayout,
}

impl Harness {
    /// Harness with the host default shell, logging into the current
    /// working directory.
    pub fn new() -> Self {
        Harness::default()
    }

    /// Replace the shell configuration.
    pub fn with_shell(mut self, shell: Shell) -> Self {
        self.shell = shell;
        self
    }

    /// Replace the log layout.
    pub fn with_logs(mut self, logs: LogLayout) -> Self {
        self.logs = logs;
        self
    }

    /// The configured log layout.
    pub fn logs(&self) -> &LogLayout {
        &self.logs
    }

    /// Assert that `command` exits 0 and prints `expected` somewhere on
    /// stdout.
    pub fn assert_stdout_contains(&self, command: &str, expected: &str) -> TestResult<()> {
        self.assert_stdout_contains_with_code(command, expected, 0)
    }

    /// Assert on stdout content together with a specific exit code.
    pub fn assert_stdout_contains_with_code(
        &self,
        command: &str,
        expected: &str,
        exit_code: i32,
    ) -> TestResult<()> {
        self.assert_stream_contains(StreamKind::Stdout, command, expected, exit_code)
    }

    /// Assert that `command` exits 0 and prints `expected` somewhere on
    /// stderr.
    pub fn assert_stderr_contains(&self, command: &str, expected: &str) -> TestResult<()> {
        self.assert_stderr_contains_with_code(command, expected, 0)
    }

    /// Assert on stderr content together with a specific exit code.
    pub fn assert_stderr_contains_with_code(
        &self,
        command: &str,
        expected: &str,
        exit_code: i32,
    ) -> TestResult<()> {
        self.assert_stream_contains(StreamKind::Stderr, command, expected, exit_code)
    }

    /// Fail the test with `message` unless `condition` holds.
    ///
    /// No process is run.
    pub fn assert(&self, condition: bool, message: &str) -> TestResult<()> {
        if !condition {
            error!("{}", message);
            return Err(TestError::Failure);
        }
        Ok(())
    }

    /// Measure `body` and fail if it took longer than `threshold_secs`.
    ///
    /// The wall-clock duration is rounded to the nearest whole second and
    /// returned on success. The closure is a fresh, explicitly re-runnable
    /// copy of the test logic: callers re-running a side-effecting body
    /// accept the double execution. Nothing is preempted; a long-running
    /// subject is measured only after the fact.
    pub fn assert_time_under<F>(&mut self, threshold_secs: u64, body: F) -> TestResult<u64>
    where
        F: FnOnce(&mut Harness) -> TestResult<()>,
    {
        let before = Instant::now();
        body(self)?;
        let taken_secs = before.elapsed().as_secs_f64().round() as u64;

        if taken_secs > threshold_secs {
            error!(
                "measured time ({}s) was above {} seconds",
                taken_secs, threshold_secs
            );
            return Err(TestError::Failure);
        }
        Ok(taken_secs)
    }

    /// Relay a live stream to a prefixed console view and a raw capture
    /// sink, in parallel.
    ///
    /// Join the returned handle to wait for the source to end.
    pub fn setup_io_relay<R, P, O>(
        &self,
        source: R,
        prefixed_destination: P,
        other_destination: O,
    ) -> RelayHandle
    where
        R: Read + Send + 'static,
        P: Write + Send + 'static,
        O: Write + Send + 'static,
    {
        spawn_relay(source, prefixed_destination, other_destination)
    }

    /// Run, record, and compare one stream-containment check.
    fn assert_stream_contains(
        &self,
        kind: StreamKind,
        command: &str,
        expected: &str,
        expected_exit: i32,
    ) -> TestResult<()> {
        let result = self.shell.run(command)?;
        self.logs.record(command, &result)?;

        if result.exit_code != Some(expected_exit) {
            error!(
                "process exited with code {:?} (expected: {})",
                result.exit_code, expected_exit
            );
            return Err(TestError::Failure);
        }

        let haystack = match kind {
            StreamKind::Stdout => &result.stdout,
            StreamKind::Stderr => &result.stderr,
        };
        if !contains_subslice(haystack, expected.as_bytes()) {
            error!(
                "expected '{}' to be present on {}",
                expected,
                kind.name()
            );
            return Err(TestError::Failure);
        }
        Ok(())
    }
}

/// Whole-buffer byte containment, not line-by-line.
fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}

// ============================================================================
// Test Lifecycle
// ============================================================================

/// A single test over an external command-line subject.
///
/// Implementors supply the body in [`TestCase::run`]; drivers call
/// [`TestCase::test`] and get exactly one boolean outcome per invocation.
pub trait TestCase {
    /// The test body. Harness assertions raise [`TestError::Failure`]
    /// when they do not hold; any other error means the harness itself
    /// broke.
    fn run(&mut self, harness: &mut Harness) -> TestResult<()>;

    /// Execute the body once and reduce its outcome to pass/fail.
    ///
    /// The failure signal is consumed here and only here. Infrastructure
    /// errors abort the run instead of registering as a failed test.
    fn test(&mut self, harness: &mut Harness) -> Result<bool, HarnessError> {
        match self.run(harness) {
            Ok(()) => Ok(true),
            Err(TestError::Failure) => Ok(false),
            Err(TestError::Harness(err)) => Err(err),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
