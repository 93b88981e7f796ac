//! Backend error classification.
//!
//! # Responsibilities
//! - Decide whether a backend error is transient or fatal
//! - Apply the side-effect policy for each verdict
//!
//! # Design Decisions
//! - `NotFound` errors are always transient
//! - Everything else is transient only if its message matches one of the
//!   configured patterns; unknown failures are fatal
//! - Fatal errors end the process: a corrupted cache is worse than a restart
//! - No retries here; retrying is the backend's business

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use regex::RegexSet;

use crate::backend::{BackendError, BackendErrorKind};
use crate::observability::metrics;

/// Outcome of classifying one backend error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Transient,
    Fatal,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Transient => "transient",
            Verdict::Fatal => "fatal",
        }
    }
}

/// Matches backend errors against the known-recoverable signatures.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    patterns: RegexSet,
}

impl ErrorClassifier {
    /// Compile the transient signatures. Patterns are matched in order.
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            patterns: RegexSet::new(patterns)?,
        })
    }

    pub fn classify(&self, error: &BackendError) -> Verdict {
        if error.kind == BackendErrorKind::NotFound || self.patterns.is_match(&error.message) {
            Verdict::Transient
        } else {
            Verdict::Fatal
        }
    }
}

/// Invoked after a fatal error has been logged.
pub type FatalHook = Arc<dyn Fn(&BackendError) + Send + Sync>;

/// Flush standard streams and exit. Never returns.
pub fn exit_process(_error: &BackendError) {
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
    std::process::exit(70);
}

/// Classifier plus what to do with each verdict.
#[derive(Clone)]
pub struct ErrorPolicy {
    classifier: ErrorClassifier,
    on_fatal: FatalHook,
}

impl fmt::Debug for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorPolicy")
            .field("classifier", &self.classifier)
            .finish_non_exhaustive()
    }
}

impl ErrorPolicy {
    /// Policy that terminates the process on fatal errors.
    pub fn new(classifier: ErrorClassifier) -> Self {
        Self::with_fatal_hook(classifier, Arc::new(exit_process))
    }

    pub fn with_fatal_hook(classifier: ErrorClassifier, on_fatal: FatalHook) -> Self {
        Self { classifier, on_fatal }
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Classify, log and count. Runs the fatal hook for fatal errors; the
    /// default hook does not return.
    pub fn handle(&self, error: &BackendError, request_id: &str) -> Verdict {
        let verdict = self.classifier.classify(error);
        metrics::record_backend_error(verdict.as_str());
        match verdict {
            Verdict::Transient => {
                tracing::warn!(request_id = %request_id, error = %error, "Transient backend error");
            }
            Verdict::Fatal => {
                tracing::error!(
                    request_id = %request_id,
                    error = %error,
                    kind = ?error.kind,
                    "Fatal backend error, terminating"
                );
                (self.on_fatal)(error);
            }
        }
        verdict
    }
}
