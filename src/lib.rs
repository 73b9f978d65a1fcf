//! cmdcheck: test harness base for command-line subjects.
//!
//! Drives an external command as a test subject and asserts on its
//! observable behavior: exit code, stdout, stderr, elapsed time. One test
//! body produces exactly one boolean outcome; assertion failures are a
//! typed signal consumed at the lifecycle boundary, while infrastructure
//! errors (spawn failures, IO errors) propagate uncaught.

// Error classes: the assertion-failure signal vs. infrastructure errors
pub mod error;

// Assertion layer and test lifecycle
pub mod harness;

// Subprocess execution with full stream capture
pub mod process;

// Line-prefixing and fan-out stream decorators, live relay
pub mod writer;
