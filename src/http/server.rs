//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the shared application state
//! - Create the Axum router and wire middleware (tracing, request ID)
//! - Accept connections and serve HTTP/1.1 on each
//! - Drain open connections on shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::Request,
    routing::any,
    Router,
};
use hyper::server::conn::http1;
use hyper_util::{
    rt::{TokioIo, TokioTimer},
    service::TowerToHyperService,
};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::backend::{Backend, ErrorClassifier, ErrorPolicy, FatalHook, StreamBridge};
use crate::config::ServiceConfig;
use crate::http::handlers::{dispatch, AppState, ServiceInfo};
use crate::http::request::{MakeRequestUuid, X_REQUEST_ID};
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::query::QueryParser;
use crate::routing::Router as RouteTable;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid transient error pattern: {0}")]
    Classifier(#[from] regex::Error),
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP server for the query front end.
pub struct HttpServer {
    router: Router,
    config: Arc<ServiceConfig>,
    tracker: ConnectionTracker,
}

impl HttpServer {
    /// Create a server whose fatal backend errors end the process.
    pub fn new(config: ServiceConfig, backend: Arc<dyn Backend>) -> Result<Self, ServerError> {
        let classifier = ErrorClassifier::new(&config.classifier.transient_patterns)?;
        Ok(Self::with_policy(config, backend, ErrorPolicy::new(classifier)))
    }

    /// Create a server that runs `on_fatal` instead of exiting.
    pub fn with_fatal_hook(
        config: ServiceConfig,
        backend: Arc<dyn Backend>,
        on_fatal: FatalHook,
    ) -> Result<Self, ServerError> {
        let classifier = ErrorClassifier::new(&config.classifier.transient_patterns)?;
        Ok(Self::with_policy(
            config,
            backend,
            ErrorPolicy::with_fatal_hook(classifier, on_fatal),
        ))
    }

    fn with_policy(config: ServiceConfig, backend: Arc<dyn Backend>, policy: ErrorPolicy) -> Self {
        let config = Arc::new(config);
        let timeout = config.backend.timeout_secs.map(Duration::from_secs);

        let state = AppState {
            config: Arc::clone(&config),
            info: Arc::new(ServiceInfo::default()),
            router: Arc::new(RouteTable::new()),
            backend,
            parser: QueryParser::new(config.query.dedupe_tokens),
            bridge: StreamBridge::new(timeout),
            policy: Arc::new(policy),
        };

        Self {
            router: Self::build_router(state),
            config,
            tracker: ConnectionTracker::new(),
        }
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(dispatch))
            .route("/", any(dispatch))
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Serve connections until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let service = TowerToHyperService::new(self.router);
        let (drain_tx, drain_rx) = watch::channel(false);

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = listener.accept() => {
                    let (stream, peer, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(ListenerError::Closed) => break,
                        Err(e) => {
                            tracing::warn!(error = %e, "Accept failed");
                            continue;
                        }
                    };

                    let guard = self.tracker.track();
                    let service = service.clone();
                    let mut drain = drain_rx.clone();

                    tokio::spawn(async move {
                        let _permit = permit;
                        let connection_id = guard.id();
                        let conn = http1::Builder::new()
                            .timer(TokioTimer::new())
                            .serve_connection(TokioIo::new(stream), service);
                        tokio::pin!(conn);

                        let result = tokio::select! {
                            result = conn.as_mut() => result,
                            _ = drain.changed() => {
                                conn.as_mut().graceful_shutdown();
                                conn.as_mut().await
                            }
                        };

                        match result {
                            Ok(()) => {}
                            Err(e) if e.is_parse() => tracing::warn!(
                                peer_addr = %peer,
                                connection_id = %connection_id,
                                error = %e,
                                "Client error"
                            ),
                            Err(e) => tracing::debug!(
                                peer_addr = %peer,
                                connection_id = %connection_id,
                                error = %e,
                                "Connection ended with error"
                            ),
                        }
                        drop(guard);
                    });
                }
            }
        }

        tracing::info!(
            active_connections = self.tracker.active_count(),
            "HTTP server draining"
        );
        drop(listener);
        let _ = drain_tx.send(true);

        let limit = Duration::from_secs(self.config.listener.drain_timeout_secs);
        if !self.tracker.wait_for_drain(limit).await {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Connections still open after drain timeout"
            );
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}
