//! Per-request cancellation.
//!
//! # Responsibilities
//! - Carry the request ID through the pipeline
//! - Flip to cancelled the first time either side of the exchange closes
//! - Let long-running work poll or await the cancellation
//!
//! # Design Decisions
//! - Close events are modelled as guards: the request-side guard lives in
//!   the handler future (dropped by hyper when the client goes away), the
//!   response-side guard lives in the unsent `ResponseWriter`
//! - First close wins; later ones are no-ops

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug)]
struct Inner {
    closed: watch::Sender<bool>,
    request_id: String,
}

/// Cancellation token bound to one request's connection.
#[derive(Debug, Clone)]
pub struct RequestContext {
    inner: Arc<Inner>,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                closed,
                request_id: request_id.into(),
            }),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.inner.request_id
    }

    /// Mark the request cancelled. Returns `true` only for the call that
    /// performed the transition.
    pub fn cancel(&self) -> bool {
        self.inner.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Resolves once the request is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.closed.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Guard that cancels this context if dropped while still armed.
    pub fn close_guard(&self, side: CloseSide) -> CloseGuard {
        CloseGuard {
            ctx: self.clone(),
            side,
            armed: true,
        }
    }
}

/// Which end of the exchange a guard watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseSide {
    Request,
    Response,
}

/// Cancels its context on drop unless disarmed first.
#[derive(Debug)]
pub struct CloseGuard {
    ctx: RequestContext,
    side: CloseSide,
    armed: bool,
}

impl CloseGuard {
    /// The exchange finished normally; dropping no longer cancels.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        if self.armed && self.ctx.cancel() {
            tracing::warn!(
                request_id = %self.ctx.request_id(),
                side = ?self.side,
                "connection terminated"
            );
        }
    }
}
