//! Response encoding.
//!
//! # Responsibilities
//! - Negotiate gzip or identity from `Accept-Encoding`
//! - Compute caching, type, length and latency headers
//! - Send exactly one response per request
//!
//! # Design Decisions
//! - Payloads are fully buffered so `Content-Length` is always exact
//! - `ResponseWriter::send` consumes the writer: a second send does not compile
//! - HEAD gets the GET headers, including its `Content-Length`, and no body
//! - A writer dropped unsent, or a body dropped before its last frame,
//!   means the connection went away

use std::io::Write;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Instant;

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, Method, Response, StatusCode},
};
use bytes::Bytes;
use flate2::{write::GzEncoder, Compression};
use hyper::body::{Body as HttpBody, Frame, SizeHint};
use serde::Serialize;

use crate::config::ResponseConfig;
use crate::http::context::{CloseGuard, CloseSide, RequestContext};

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
pub const X_RESPONSE_TIME: &str = "x-response-time";

/// Content coding chosen for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Gzip,
    Identity,
}

/// Pick gzip if the client accepts it with a non-zero quality, either by
/// name or through `*`; identity otherwise.
pub fn negotiate(headers: &HeaderMap) -> Encoding {
    let mut gzip: Option<f32> = None;
    let mut wildcard: Option<f32> = None;

    for value in headers.get_all(header::ACCEPT_ENCODING) {
        let Ok(value) = value.to_str() else { continue };
        for item in value.split(',') {
            let mut parts = item.split(';');
            let coding = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
            let quality = parts
                .filter_map(|p| p.trim().strip_prefix("q="))
                .find_map(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            match coding.as_str() {
                "gzip" | "x-gzip" => gzip = Some(quality),
                "*" => wildcard = Some(quality),
                _ => {}
            }
        }
    }

    match gzip.or(wildcard) {
        Some(q) if q > 0.0 => Encoding::Gzip,
        _ => Encoding::Identity,
    }
}

/// Compress a payload with gzip.
pub fn gzip(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2 + 32), Compression::default());
    encoder.write_all(body)?;
    encoder.finish()
}

/// The one response a request may send.
///
/// Sending consumes the writer, so a response cannot be sent twice:
///
/// ```compile_fail
/// # use fanboy_http::http::ResponseWriter;
/// # async fn twice(writer: ResponseWriter) {
/// let _ = writer.send(axum::http::StatusCode::OK, bytes::Bytes::from_static(b"[]")).await;
/// let _ = writer.send(axum::http::StatusCode::OK, bytes::Bytes::from_static(b"[]")).await;
/// # }
/// ```
#[derive(Debug)]
pub struct ResponseWriter {
    head: bool,
    encoding: Encoding,
    started: Instant,
    ttl_secs: u64,
    latency_header: bool,
    close_guard: CloseGuard,
}

impl ResponseWriter {
    pub fn new(
        method: &Method,
        headers: &HeaderMap,
        ctx: &RequestContext,
        config: &ResponseConfig,
        started: Instant,
    ) -> Self {
        Self {
            head: *method == Method::HEAD,
            encoding: negotiate(headers),
            started,
            ttl_secs: config.ttl_secs,
            latency_header: config.latency_header,
            close_guard: ctx.close_guard(CloseSide::Response),
        }
    }

    /// Serialize `value` and send it.
    pub async fn send_json<T: Serialize>(self, status: StatusCode, value: &T) -> Response<Body> {
        match serde_json::to_vec(value) {
            Ok(body) => self.send(status, Bytes::from(body)).await,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize response");
                self.send(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Bytes::from_static(br#"{"error":"internal error","reason":"serialization failed"}"#),
                )
                .await
            }
        }
    }

    /// Encode and send `body`. Compression runs off the async workers.
    pub async fn send(self, status: StatusCode, body: Bytes) -> Response<Body> {
        let (body, encoding) = match self.encoding {
            Encoding::Identity => (body, Encoding::Identity),
            Encoding::Gzip => {
                let input = body.clone();
                match tokio::task::spawn_blocking(move || gzip(&input)).await {
                    Ok(Ok(compressed)) => (Bytes::from(compressed), Encoding::Gzip),
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "gzip failed, sending identity");
                        (body, Encoding::Identity)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "gzip task failed, sending identity");
                        (body, Encoding::Identity)
                    }
                }
            }
        };

        let mut response = Response::new(if self.head {
            self.close_guard.disarm();
            Body::empty()
        } else {
            Body::new(GuardedBody::new(Body::from(body.clone()), self.close_guard))
        });
        *response.status_mut() = status;

        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&format!("max-age={}", self.ttl_secs)) {
            headers.insert(header::CACHE_CONTROL, value);
        }
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        headers.insert(header::VARY, HeaderValue::from_static("accept-encoding"));
        if encoding == Encoding::Gzip {
            headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        }
        if self.latency_header {
            let millis = self.started.elapsed().as_secs_f64() * 1000.0;
            if let Ok(value) = HeaderValue::from_str(&format!("{:.3}ms", millis)) {
                headers.insert(X_RESPONSE_TIME, value);
            }
        }

        response
    }
}

/// Holds the response-side close guard until the last frame is taken.
struct GuardedBody {
    inner: Body,
    guard: Option<CloseGuard>,
}

impl GuardedBody {
    fn new(inner: Body, guard: CloseGuard) -> Self {
        let mut body = Self {
            inner,
            guard: Some(guard),
        };
        body.disarm_if_done();
        body
    }

    fn disarm_if_done(&mut self) {
        if self.inner.is_end_stream() {
            if let Some(guard) = self.guard.take() {
                guard.disarm();
            }
        }
    }
}

impl HttpBody for GuardedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, axum::Error>>> {
        let this = &mut *self;
        let frame = ready!(Pin::new(&mut this.inner).poll_frame(cx));
        match frame {
            None => {
                if let Some(guard) = this.guard.take() {
                    guard.disarm();
                }
            }
            Some(Ok(_)) => this.disarm_if_done(),
            Some(Err(_)) => {}
        }
        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
