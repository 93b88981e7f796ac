//! Backend collaborator subsystem.
//!
//! # Data Flow
//! ```text
//! Query keys
//!     → bridge.rs (write keys under backpressure, accumulate output)
//!     → BackendStream (input channel ⇄ backend task ⇄ output channel)
//!     → Ok(payload) | Err(BridgeError)
//!     → classifier.rs (transient or fatal)
//! ```
//!
//! # Design Decisions
//! - A backend stream is a pair of bounded channels; a full input channel
//!   is the "needs drain" signal, a closed output channel is end-of-stream
//! - Streams are owned by exactly one request and never reused
//! - Errors carry a structured kind plus the free-text message the
//!   classifier matches against

pub mod bridge;
pub mod classifier;
pub mod memory;
pub mod podcast;

use std::fmt;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

pub use bridge::{BridgeError, SessionState, StreamBridge};
pub use classifier::{ErrorClassifier, ErrorPolicy, FatalHook, Verdict};
pub use memory::MemoryBackend;

/// Which backend stream a request needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Lookup,
    Search,
    Suggest,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Lookup => "lookup",
            StreamKind::Search => "search",
            StreamKind::Suggest => "suggest",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured category of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// The requested item does not exist.
    NotFound,
    /// An upstream provider misbehaved.
    Upstream,
    /// Local storage failed.
    Storage,
    Other,
}

/// Error event emitted by a backend stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::NotFound, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Other, message)
    }
}

/// One item read from a backend stream.
pub type Chunk = Result<Bytes, BackendError>;

/// Request-side handle of a duplex backend stream.
#[derive(Debug)]
pub struct BackendStream {
    input: Option<mpsc::Sender<String>>,
    output: mpsc::Receiver<Chunk>,
}

/// Backend-side handle of a duplex backend stream.
#[derive(Debug)]
pub struct BackendEnd {
    /// Keys written by the request; `None` once the write side ended.
    pub input: mpsc::Receiver<String>,
    /// Result chunks; dropping it signals end-of-stream.
    pub output: mpsc::Sender<Chunk>,
}

impl BackendStream {
    /// Create a connected pair. `capacity` is the number of buffered keys
    /// (and chunks) before the writer has to wait for a drain.
    pub fn pair(capacity: usize) -> (BackendStream, BackendEnd) {
        let (input_tx, input_rx) = mpsc::channel(capacity.max(1));
        let (output_tx, output_rx) = mpsc::channel(capacity.max(1));
        (
            BackendStream {
                input: Some(input_tx),
                output: output_rx,
            },
            BackendEnd {
                input: input_rx,
                output: output_tx,
            },
        )
    }

    pub(crate) fn input(&self) -> Option<&mpsc::Sender<String>> {
        self.input.as_ref()
    }

    pub(crate) fn output(&mut self) -> &mut mpsc::Receiver<Chunk> {
        &mut self.output
    }

    /// End the write side; the backend sees its input close.
    pub fn end_input(&mut self) {
        self.input = None;
    }

    pub fn is_input_ended(&self) -> bool {
        self.input.is_none()
    }

    /// Force-end both directions. Pending output is discarded and the
    /// backend's next send fails.
    pub fn abort(&mut self) {
        self.input = None;
        self.output.close();
        while self.output.try_recv().is_ok() {}
    }
}

/// The external cache/search engine.
pub trait Backend: Send + Sync + 'static {
    /// Open a fresh duplex stream for one request.
    fn open(&self, kind: StreamKind) -> BackendStream;
}
