//! Error types for the harness.
//!
//! Two error classes exist and must never be conflated:
//!
//! - [`TestError::Failure`] is the expected-domain signal meaning "an
//!   assertion did not hold". It carries no payload (the diagnostic is
//!   logged before it is raised) and is consumed exactly once, at the
//!   lifecycle boundary, where it becomes a `false` outcome.
//! - [`HarnessError`] covers everything else: spawn failures, IO errors,
//!   timeouts. These propagate unmodified past the lifecycle boundary so
//!   infrastructure defects are never masked as failed tests.

use std::io;

use thiserror::Error;

// ============================================================================
// Infrastructure Errors
// ============================================================================

/// Infrastructure error: the harness itself could not do its job.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The shell process could not be spawned at all.
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The command exceeded its wall-clock limit and was killed.
    #[error("command '{command}' timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },

    /// IO error while waiting on a child or writing captured output.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ============================================================================
// Test Errors
// ============================================================================

/// Error raised inside a test body.
#[derive(Debug, Error)]
pub enum TestError {
    /// An assertion did not hold.
    #[error("test failed")]
    Failure,

    /// Infrastructure error. Propagates past `test()` uncaught.
    #[error(transparent)]
    Harness(#[from] HarnessError),
}

/// Result type for test bodies and assertions.
pub type TestResult<T> = Result<T, TestError>;

impl TestError {
    /// Whether this is the assertion-failure signal rather than an
    /// infrastructure error.
    pub fn is_failure(&self) -> bool {
        matches!(self, TestError::Failure)
    }
}

// ============================================================================
// Bridge: io::Error -> TestError
// ============================================================================

// Routed through the infrastructure class so a bare `?` on an IO operation
// inside a test body never reads as an assertion failure.
impl From<io::Error> for TestError {
    fn from(err: io::Error) -> Self {
        TestError::Harness(HarnessError::Io(err))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod classification {
        use super::*;

        #[test]
        fn failure_is_failure() {
            assert!(TestError::Failure.is_failure());
        }

        #[test]
        fn harness_error_is_not_failure() {
            let err = TestError::Harness(HarnessError::Timeout {
                command: "sleep 60".to_string(),
                timeout_secs: 1,
            });
            assert!(!err.is_failure());
        }

        #[test]
        fn io_error_bridges_to_infrastructure_class() {
            let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
            let err = TestError::from(io_err);
            assert!(!err.is_failure());
            assert!(matches!(err, TestError::Harness(HarnessError::Io(_))));
        }
    }

    mod display {
        use super::*;

        #[test]
        fn failure_display() {
            assert_eq!(TestError::Failure.to_string(), "test failed");
        }

        #[test]
        fn spawn_display_includes_command() {
            let err = HarnessError::Spawn {
                command: "echo hello".to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
            };
            let msg = err.to_string();
            assert!(msg.contains("echo hello"));
            assert!(msg.contains("no such file"));
        }

        #[test]
        fn timeout_display() {
            let err = HarnessError::Timeout {
                command: "sleep 60".to_string(),
                timeout_secs: 5,
            };
            assert_eq!(err.to_string(), "command 'sleep 60' timed out after 5s");
        }

        #[test]
        fn harness_variant_is_transparent() {
            let err = TestError::Harness(HarnessError::Timeout {
                command: "x".to_string(),
                timeout_secs: 3,
            });
            assert_eq!(err.to_string(), "command 'x' timed out after 3s");
        }
    }
}
