//! Query/result bridging over a backend stream.
//!
//! # Responsibilities
//! - Write query keys into a backend stream, one at a time, in order
//! - Accumulate everything the backend emits into one buffer
//! - Stop and force-end the stream when the request is cancelled
//!
//! # States
//! ```text
//! Writing ──(input full)──▶ Draining ──(room again)──▶ Writing
//! Writing ──(last key sent)──▶ Reading
//! any ──(end of output)──▶ Done
//! any ──(error / cancel / deadline)──▶ Errored
//! ```
//!
//! # Design Decisions
//! - One select loop drives both halves, so waiting for a drain never
//!   stops output from being read (the backend may block on its output)
//! - At most one pending `reserve()` exists at any time
//! - After a chunk arrives, every chunk already queued is taken before
//!   the loop yields again
//! - The session returns exactly once; the stream is owned and dropped with it

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::sync::mpsc::{
    self,
    error::{TryRecvError, TrySendError},
};
use tokio::time::Instant;

use crate::backend::{BackendError, BackendStream, Chunk};
use crate::http::context::RequestContext;
use crate::query::Query;

/// Lifecycle of one bridge session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Writing,
    Draining,
    Reading,
    Done,
    Errored,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Writing => "writing",
            SessionState::Draining => "draining",
            SessionState::Reading => "reading",
            SessionState::Done => "done",
            SessionState::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Why a session ended without a complete payload.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The backend emitted an error event.
    #[error("backend error: {error}")]
    Backend { error: BackendError, partial: Bytes },

    /// The connection closed before the backend finished.
    #[error("request cancelled")]
    Cancelled,

    /// Neither end nor error arrived before the deadline.
    #[error("backend stream timed out after {after:?}")]
    TimedOut { after: Duration, partial: Bytes },
}

impl BridgeError {
    /// Output accumulated before the failure.
    pub fn partial(&self) -> Option<&Bytes> {
        match self {
            BridgeError::Backend { partial, .. } | BridgeError::TimedOut { partial, .. } => {
                Some(partial)
            }
            BridgeError::Cancelled => None,
        }
    }
}

/// Runs bridge sessions with a shared deadline policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamBridge {
    timeout: Option<Duration>,
}

impl StreamBridge {
    /// `timeout` of `None` waits for end, error or cancellation forever.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Feed `query` into `stream` and collect its output.
    pub async fn run(
        &self,
        stream: BackendStream,
        query: Query,
        ctx: &RequestContext,
    ) -> Result<Bytes, BridgeError> {
        Session::new(stream, query, ctx.request_id())
            .drive(ctx, self.timeout)
            .await
    }
}

struct Session<'a> {
    stream: BackendStream,
    pending: VecDeque<String>,
    buffer: BytesMut,
    state: SessionState,
    request_id: &'a str,
}

enum Step {
    Continue,
    Finished,
}

impl<'a> Session<'a> {
    fn new(stream: BackendStream, query: Query, request_id: &'a str) -> Self {
        Self {
            stream,
            pending: query.into_keys().into(),
            buffer: BytesMut::new(),
            state: SessionState::Writing,
            request_id,
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            tracing::trace!(
                request_id = %self.request_id,
                from = %self.state,
                to = %next,
                "Bridge state"
            );
            self.state = next;
        }
    }

    /// Push keys while the backend has room. Ends the write side once the
    /// last key is accepted.
    fn write_ready(&mut self, ctx: &RequestContext) {
        while !ctx.is_cancelled() {
            let Some(input) = self.stream.input() else { return };
            let Some(key) = self.pending.pop_front() else {
                self.stream.end_input();
                self.transition(SessionState::Reading);
                return;
            };
            match input.try_send(key) {
                Ok(()) => self.transition(SessionState::Writing),
                Err(TrySendError::Full(key)) => {
                    self.pending.push_front(key);
                    self.transition(SessionState::Draining);
                    return;
                }
                Err(TrySendError::Closed(_)) => {
                    self.backend_stopped_reading();
                    return;
                }
            }
        }
    }

    fn backend_stopped_reading(&mut self) {
        tracing::debug!(
            request_id = %self.request_id,
            unsent = self.pending.len(),
            "Backend closed its input"
        );
        self.pending.clear();
        self.stream.end_input();
        self.transition(SessionState::Reading);
    }

    /// Take one chunk plus everything already queued behind it.
    fn absorb(&mut self, first: Option<Chunk>) -> Result<Step, BackendError> {
        let mut next = first;
        loop {
            match next {
                Some(Ok(bytes)) => self.buffer.extend_from_slice(&bytes),
                Some(Err(error)) => return Err(error),
                None => return Ok(Step::Finished),
            }
            next = match self.stream.output().try_recv() {
                Ok(chunk) => Some(chunk),
                Err(TryRecvError::Empty) => return Ok(Step::Continue),
                Err(TryRecvError::Disconnected) => None,
            };
        }
    }

    fn fail(&mut self) -> Bytes {
        self.stream.abort();
        self.transition(SessionState::Errored);
        std::mem::take(&mut self.buffer).freeze()
    }

    async fn drive(
        mut self,
        ctx: &RequestContext,
        timeout: Option<Duration>,
    ) -> Result<Bytes, BridgeError> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            self.write_ready(ctx);
            let draining = self.state == SessionState::Draining && !ctx.is_cancelled();

            let event = {
                let input = self.stream.input().cloned();
                let output = self.stream.output();
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => Event::Cancelled,
                    _ = sleep_until(deadline), if deadline.is_some() => Event::TimedOut,
                    chunk = output.recv() => Event::Chunk(chunk),
                    permit = reserve(input), if draining => Event::Drained(permit),
                }
            };

            match event {
                Event::Cancelled => {
                    self.fail();
                    tracing::warn!(
                        request_id = %self.request_id,
                        unsent = self.pending.len(),
                        "Request cancelled, backend stream force-ended"
                    );
                    return Err(BridgeError::Cancelled);
                }
                Event::TimedOut => {
                    let partial = self.fail();
                    let after = timeout.unwrap_or_default();
                    return Err(BridgeError::TimedOut { after, partial });
                }
                Event::Chunk(chunk) => match self.absorb(chunk) {
                    Ok(Step::Continue) => {}
                    Ok(Step::Finished) => {
                        self.stream.end_input();
                        self.transition(SessionState::Done);
                        return Ok(self.buffer.freeze());
                    }
                    Err(error) => {
                        let partial = self.fail();
                        return Err(BridgeError::Backend { error, partial });
                    }
                },
                Event::Drained(Some(permit)) => {
                    if let Some(key) = self.pending.pop_front() {
                        permit.send(key);
                    }
                    self.transition(SessionState::Writing);
                }
                Event::Drained(None) => self.backend_stopped_reading(),
            }
        }
    }
}

enum Event {
    Cancelled,
    TimedOut,
    Chunk(Option<Chunk>),
    Drained(Option<mpsc::OwnedPermit<String>>),
}

/// Wait for room in the backend's input. `None` if it stopped reading.
async fn reserve(input: Option<mpsc::Sender<String>>) -> Option<mpsc::OwnedPermit<String>> {
    match input {
        Some(input) => input.reserve_owned().await.ok(),
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
