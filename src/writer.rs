//! Stream decorators for test output relaying.
//!
//! Two small composable writers and the relay that ties them together:
//!
//! - [`LinePrefixWriter`] marks every line of a stream with a fixed prefix,
//!   tracking line starts across write calls.
//! - [`MultiWriter`] fans a single stream out to several sinks in
//!   registration order.
//! - [`spawn_relay`] pipes a live source through both at once, so a
//!   long-running subprocess's output appears prefixed on a console while
//!   being captured verbatim elsewhere.

use std::io::{self, Read, Write};
use std::thread::{self, JoinHandle};

use tracing::debug;

/// Marker prepended to every relayed console line.
pub const RELAY_PREFIX: &str = "     ";

// ============================================================================
// Line-Prefixing Writer
// ============================================================================

/// Writer decorator that emits a fixed prefix at the start of every line.
///
/// Input is scanned byte-by-byte so line boundaries inside a single write
/// call are prefixed too, not just boundaries between calls: splitting one
/// write into many produces byte-identical target content. The reported
/// byte count excludes prefix bytes, matching the underlying write
/// semantics. The writer does not manage the target's lifecycle; dropping
/// it drops the target like any owned field.
#[derive(Debug)]
pub struct LinePrefixWriter<W> {
    prefix: String,
    target: W,
    at_line_start: bool,
}

impl<W: Write> LinePrefixWriter<W> {
    /// Wrap `target`, prefixing every line with `prefix`.
    pub fn new(prefix: impl Into<String>, target: W) -> Self {
        LinePrefixWriter {
            prefix: prefix.into(),
            target,
            at_line_start: true,
        }
    }

    /// Consume the decorator, returning the underlying target.
    pub fn into_inner(self) -> W {
        self.target
    }
}

impl<W: Write> Write for LinePrefixWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &byte in buf {
            if self.at_line_start {
                self.target.write_all(self.prefix.as_bytes())?;
            }
            self.target.write_all(&[byte])?;
            self.at_line_start = byte == b'\n';
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.target.flush()
    }
}

// ============================================================================
// Fan-out Writer
// ============================================================================

/// Fan-out writer duplicating every write to each target.
///
/// Targets receive the full buffer in registration order on every write
/// call; return values are not aggregated beyond forwarding. Dropping the
/// fan-out drops (closes) every target together.
#[derive(Default)]
pub struct MultiWriter {
    targets: Vec<Box<dyn Write + Send>>,
}

impl MultiWriter {
    /// Create an empty fan-out.
    pub fn new() -> Self {
        MultiWriter {
            targets: Vec::new(),
        }
    }

    /// Append a target; targets receive writes in registration order.
    pub fn with_target(mut self, target: impl Write + Send + 'static) -> Self {
        self.targets.push(Box::new(target));
        self
    }

    /// Number of registered targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether no targets are registered.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl std::fmt::Debug for MultiWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiWriter")
            .field("targets", &self.targets.len())
            .finish()
    }
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for target in &mut self.targets {
            target.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        for target in &mut self.targets {
            target.flush()?;
        }
        Ok(())
    }
}

// ============================================================================
// Live Relay
// ============================================================================

/// Handle to a running relay thread.
#[derive(Debug)]
pub struct RelayHandle {
    thread: JoinHandle<io::Result<u64>>,
}

impl RelayHandle {
    /// Wait for the source to reach EOF, returning the bytes relayed.
    pub fn join(self) -> io::Result<u64> {
        self.thread
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("relay thread panicked")))
    }
}

/// Connect a live source to a prefixed console view and a raw capture sink.
///
/// Every byte read from `source` is written to a [`LinePrefixWriter`]
/// around `prefixed_destination` (with [`RELAY_PREFIX`] as the marker) and
/// verbatim to `other_destination`, in that order. The composed chain owns
/// both destinations until the source ends.
pub fn spawn_relay<R, P, O>(source: R, prefixed_destination: P, other_destination: O) -> RelayHandle
where
    R: Read + Send + 'static,
    P: Write + Send + 'static,
    O: Write + Send + 'static,
{
    spawn_relay_with_prefix(RELAY_PREFIX, source, prefixed_destination, other_destination)
}

/// [`spawn_relay`] with a caller-chosen line marker.
pub fn spawn_relay_with_prefix<R, P, O>(
    prefix: &str,
    mut source: R,
    prefixed_destination: P,
    other_destination: O,
) -> RelayHandle
where
    R: Read + Send + 'static,
    P: Write + Send + 'static,
    O: Write + Send + 'static,
{
    let prefix = prefix.to_string();
    let thread = thread::spawn(move || {
        let mut chain = MultiWriter::new()
            .with_target(LinePrefixWriter::new(prefix, prefixed_destination))
            .with_target(other_destination);
        let bytes = io::copy(&mut source, &mut chain)?;
        chain.flush()?;
        debug!("relay drained after {} bytes", bytes);
        Ok(bytes)
    });
    RelayHandle { thread }
}

// ============================================================================
// Tests
// ============================================================================
