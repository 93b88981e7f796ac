//! Request handlers.
//!
//! Every request enters through [`dispatch`], which resolves the route,
//! runs the matching handler and records the outcome.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{header, request::Parts, HeaderValue, Request, Response, StatusCode},
};
use bytes::Bytes;
use serde::Serialize;

use crate::backend::{Backend, BridgeError, ErrorPolicy, StreamBridge, StreamKind, Verdict};
use crate::config::ServiceConfig;
use crate::http::context::{CloseSide, RequestContext};
use crate::http::request::request_id;
use crate::http::response::ResponseWriter;
use crate::observability::metrics;
use crate::query::{Query, QueryParser};
use crate::routing::{Params, Resolution, RouteKind, Router};

const EMPTY_ARRAY: &[u8] = b"[]";

/// What `GET /` reports.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    reason: String,
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub info: Arc<ServiceInfo>,
    pub router: Arc<Router>,
    pub backend: Arc<dyn Backend>,
    pub parser: QueryParser,
    pub bridge: StreamBridge,
    pub policy: Arc<ErrorPolicy>,
}

/// Entry point for every request.
pub async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    let started = Instant::now();
    let (parts, _body) = request.into_parts();
    let ctx = RequestContext::new(request_id(&parts.headers));
    let close_guard = ctx.close_guard(CloseSide::Request);
    let path = parts.uri.path().to_string();

    tracing::debug!(
        request_id = %ctx.request_id(),
        method = %parts.method,
        path = %path,
        "Handling request"
    );

    let writer = ResponseWriter::new(
        &parts.method,
        &parts.headers,
        &ctx,
        &state.config.response,
        started,
    );

    let (route, response) = match state.router.resolve(&parts.method, &path) {
        Resolution::NotFound => {
            tracing::warn!(request_id = %ctx.request_id(), path = %path, "fishy request");
            let body = ErrorBody {
                error: "not found",
                reason: format!("no route for {}", path),
            };
            ("none", writer.send_json(StatusCode::NOT_FOUND, &body).await)
        }
        Resolution::MethodNotAllowed { allowed } => {
            tracing::warn!(
                request_id = %ctx.request_id(),
                method = %parts.method,
                path = %path,
                "Method not allowed"
            );
            let body = ErrorBody {
                error: "method not allowed",
                reason: format!("{} is not supported on {}", parts.method, path),
            };
            let mut response = writer.send_json(StatusCode::METHOD_NOT_ALLOWED, &body).await;
            let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                response.headers_mut().insert(header::ALLOW, value);
            }
            ("none", response)
        }
        Resolution::Matched(matched) => {
            let name = matched.route.name();
            let response = handle(&state, matched.route, &parts, &matched.params, &ctx, writer).await;
            (name, response)
        }
    };

    close_guard.disarm();
    metrics::record_request(route, response.status().as_u16(), started);
    response
}

async fn handle(
    state: &AppState,
    route: RouteKind,
    parts: &Parts,
    params: &Params,
    ctx: &RequestContext,
    writer: ResponseWriter,
) -> Response<Body> {
    match route {
        RouteKind::Root => writer.send_json(StatusCode::OK, state.info.as_ref()).await,
        RouteKind::Ping => {
            tracing::info!(request_id = %ctx.request_id(), "ping");
            writer.send(StatusCode::OK, Bytes::from_static(b"pong\n")).await
        }
        RouteKind::Search | RouteKind::Suggest => {
            let query = state.parser.parse_term(parts.uri.query());
            let kind = if route == RouteKind::Search {
                StreamKind::Search
            } else {
                StreamKind::Suggest
            };
            stream_results(state, kind, query, ctx, writer).await
        }
        RouteKind::Lookup => {
            let query = params
                .get("query")
                .and_then(|raw| state.parser.parse_guids(raw));
            stream_results(state, StreamKind::Lookup, query, ctx, writer).await
        }
    }
}

/// Run a query through the backend and answer with its JSON array.
async fn stream_results(
    state: &AppState,
    kind: StreamKind,
    query: Option<Query>,
    ctx: &RequestContext,
    writer: ResponseWriter,
) -> Response<Body> {
    let Some(query) = query else {
        tracing::debug!(request_id = %ctx.request_id(), kind = %kind, "Empty query");
        return writer.send(StatusCode::OK, Bytes::from_static(EMPTY_ARRAY)).await;
    };

    tracing::info!(
        request_id = %ctx.request_id(),
        kind = %kind,
        keys = ?query.keys(),
        "{}",
        kind
    );

    // Detached: if this handler is dropped, the session only sees `ctx`.
    let stream = state.backend.open(kind);
    let bridge = state.bridge;
    let session_ctx = ctx.clone();
    let session = tokio::spawn(async move {
        let outcome = bridge.run(stream, query, &session_ctx).await;
        if let Err(BridgeError::Cancelled) = outcome {
            metrics::record_cancelled(kind.as_str());
        }
        outcome
    });

    let outcome = match session.await {
        Ok(outcome) => outcome,
        Err(e) => Err(BridgeError::Backend {
            error: crate::backend::BackendError::other(format!("bridge task failed: {}", e)),
            partial: Bytes::new(),
        }),
    };

    match outcome {
        Ok(body) if body.is_empty() => writer.send(StatusCode::OK, Bytes::from_static(EMPTY_ARRAY)).await,
        Ok(body) => writer.send(StatusCode::OK, body).await,
        Err(BridgeError::Backend { error, partial }) => {
            match state.policy.handle(&error, ctx.request_id()) {
                Verdict::Transient => writer.send(StatusCode::OK, degraded(partial)).await,
                Verdict::Fatal => {
                    let body = ErrorBody {
                        error: "internal error",
                        reason: error.message,
                    };
                    writer.send_json(StatusCode::INTERNAL_SERVER_ERROR, &body).await
                }
            }
        }
        Err(BridgeError::TimedOut { after, partial }) => {
            tracing::warn!(
                request_id = %ctx.request_id(),
                kind = %kind,
                after = ?after,
                "Backend stream timed out"
            );
            metrics::record_backend_error(Verdict::Transient.as_str());
            writer.send(StatusCode::OK, degraded(partial)).await
        }
        // Only reachable once the request side has closed.
        Err(BridgeError::Cancelled) => Response::new(Body::empty()),
    }
}

/// Keep partial output only if it is complete JSON on its own.
fn degraded(partial: Bytes) -> Bytes {
    let complete = !partial.is_empty()
        && serde_json::from_slice::<serde::de::IgnoredAny>(&partial).is_ok();
    if complete {
        partial
    } else {
        Bytes::from_static(EMPTY_ARRAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_keeps_only_complete_json() {
        assert_eq!(degraded(Bytes::new()), Bytes::from_static(b"[]"));
        assert_eq!(degraded(Bytes::from_static(b"[{\"guid\":1}")), Bytes::from_static(b"[]"));
        assert_eq!(
            degraded(Bytes::from_static(b"[{\"guid\":1}]")),
            Bytes::from_static(b"[{\"guid\":1}]")
        );
    }

    #[test]
    fn service_info_comes_from_package() {
        let info = ServiceInfo::default();
        assert_eq!(info.name, "fanboy-http");
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
    }
}
