//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use fanboy_http::backend::{BackendEnd, BackendError, StreamKind};
use fanboy_http::config::ServiceConfig;
use fanboy_http::http::HttpServer;
use fanboy_http::lifecycle::Shutdown;
use fanboy_http::net::Listener;
use fanboy_http::{Backend, BackendStream};
use tokio::net::TcpListener;

type ScriptFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type ScriptFn = dyn Fn(StreamKind, BackendEnd) -> ScriptFuture + Send + Sync;

/// A backend whose every stream is driven by a test script.
#[derive(Clone)]
pub struct ScriptedBackend {
    capacity: usize,
    script: Arc<ScriptFn>,
    pub opened: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn new<F, Fut>(script: F) -> Self
    where
        F: Fn(StreamKind, BackendEnd) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            capacity: 4,
            script: Arc::new(move |kind, end| Box::pin(script(kind, end)) as ScriptFuture),
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl Backend for ScriptedBackend {
    fn open(&self, kind: StreamKind) -> BackendStream {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let (stream, end) = BackendStream::pair(self.capacity);
        tokio::spawn((self.script)(kind, end));
        stream
    }
}

/// A backend that collects every key, then emits what `respond` returns.
pub fn responder<F>(respond: F) -> ScriptedBackend
where
    F: Fn(StreamKind, Vec<String>) -> Vec<Result<Bytes, BackendError>> + Send + Sync + 'static,
{
    let respond = Arc::new(respond);
    ScriptedBackend::new(move |kind, mut end| {
        let respond = Arc::clone(&respond);
        async move {
            let mut keys = Vec::new();
            while let Some(key) = end.input.recv().await {
                keys.push(key);
            }
            for chunk in respond(kind, keys) {
                if end.output.send(chunk).await.is_err() {
                    return;
                }
            }
        }
    })
}

/// A running server on an ephemeral port. Shuts down on drop.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub fatal: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn fatal_errors(&self) -> Vec<String> {
        self.fatal.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a server whose fatal hook records errors instead of exiting.
pub async fn start_server(mut config: ServiceConfig, backend: impl Backend) -> TestServer {
    config.listener.drain_timeout_secs = 1;
    let socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listener = Listener::from_tcp(socket, config.listener.max_connections).unwrap();
    let addr = listener.local_addr().unwrap();

    let fatal = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&fatal);
    let server = HttpServer::with_fatal_hook(
        config,
        Arc::new(backend),
        Arc::new(move |error: &BackendError| {
            recorded.lock().unwrap().push(error.message.clone());
        }),
    )
    .unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestServer { addr, shutdown, fatal }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
