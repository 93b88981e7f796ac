//! Failure injection: backend errors, timeouts and dropped clients.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use fanboy_http::backend::BackendError;
use fanboy_http::config::ServiceConfig;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Notify;

mod common;

fn failing(chunks: Vec<Result<Bytes, BackendError>>) -> common::ScriptedBackend {
    common::responder(move |_, _| chunks.clone())
}

#[tokio::test]
async fn transient_error_degrades_to_empty_array() {
    let backend = failing(vec![Err(BackendError::other("no results"))]);
    let server = common::start_server(ServiceConfig::default(), backend).await;

    let res = common::client()
        .get(server.url("/search?q=nothing"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "[]");
    assert!(server.fatal_errors().is_empty());
}

#[tokio::test]
async fn not_found_errors_are_transient() {
    let backend = failing(vec![Err(BackendError::not_found("key 1 missing"))]);
    let server = common::start_server(ServiceConfig::default(), backend).await;

    let res = common::client().get(server.url("/lookup/1")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "[]");
    assert!(server.fatal_errors().is_empty());
}

#[tokio::test]
async fn complete_partial_output_survives_transient_error() {
    let backend = failing(vec![
        Ok(Bytes::from_static(br#"[{"guid":7}]"#)),
        Err(BackendError::other("Fallback to cache")),
    ]);
    let server = common::start_server(ServiceConfig::default(), backend).await;

    let body: Value = common::client()
        .get(server.url("/search?q=seven"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, serde_json::json!([{"guid": 7}]));
}

#[tokio::test]
async fn truncated_partial_output_is_discarded() {
    let backend = failing(vec![
        Ok(Bytes::from_static(br#"[{"guid":7}"#)),
        Err(BackendError::other("ENOTFOUND itunes.apple.com")),
    ]);
    let server = common::start_server(ServiceConfig::default(), backend).await;

    let res = common::client()
        .get(server.url("/search?q=seven"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.text().await.unwrap(), "[]");
}

#[tokio::test]
async fn fatal_error_runs_the_hook() {
    let backend = failing(vec![Err(BackendError::other("disk on fire"))]);
    let server = common::start_server(ServiceConfig::default(), backend).await;

    let res = common::client()
        .get(server.url("/search?q=anything"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 500);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["reason"], "disk on fire");
    assert_eq!(server.fatal_errors(), ["disk on fire"]);
}

#[tokio::test]
async fn configured_patterns_replace_defaults() {
    let mut config = ServiceConfig::default();
    config.classifier.transient_patterns = vec!["^disk on fire$".to_string()];
    let backend = failing(vec![Err(BackendError::other("disk on fire"))]);
    let server = common::start_server(config, backend).await;

    let res = common::client()
        .get(server.url("/search?q=anything"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert!(server.fatal_errors().is_empty());
}

#[tokio::test]
async fn silent_backend_times_out() {
    let mut config = ServiceConfig::default();
    config.backend.timeout_secs = Some(1);
    let backend = common::ScriptedBackend::new(|_, mut end| async move {
        while end.input.recv().await.is_some() {}
        end.output.closed().await;
    });
    let server = common::start_server(config, backend).await;

    let res = tokio::time::timeout(
        Duration::from_secs(5),
        common::client().get(server.url("/search?q=slow")).send(),
    )
    .await
    .expect("request should finish after the backend timeout")
    .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "[]");
}

#[tokio::test]
async fn destroyed_socket_aborts_backend_stream() {
    let received = Arc::new(Notify::new());
    let aborted = Arc::new(Notify::new());
    let aborted_flag = Arc::new(AtomicBool::new(false));

    let backend = {
        let received = Arc::clone(&received);
        let aborted = Arc::clone(&aborted);
        let aborted_flag = Arc::clone(&aborted_flag);
        common::ScriptedBackend::new(move |_, mut end| {
            let received = Arc::clone(&received);
            let aborted = Arc::clone(&aborted);
            let aborted_flag = Arc::clone(&aborted_flag);
            async move {
                if end.input.recv().await.is_some() {
                    received.notify_one();
                }
                let _ = end.output.send(Ok(Bytes::from_static(b"["))).await;
                end.output.closed().await;
                aborted_flag.store(true, Ordering::SeqCst);
                aborted.notify_one();
            }
        })
    };
    let server = common::start_server(ServiceConfig::default(), backend).await;

    let mut socket = TcpStream::connect(server.addr).await.unwrap();
    socket
        .write_all(b"GET /search?q=hang HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), received.notified())
        .await
        .expect("backend should receive the key");
    drop(socket);

    tokio::time::timeout(Duration::from_secs(5), aborted.notified())
        .await
        .expect("backend stream should be force-ended");
    assert!(aborted_flag.load(Ordering::SeqCst));

    let res = common::client().get(server.url("/ping")).send().await.unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn malformed_request_gets_400() {
    let server = common::start_server(ServiceConfig::default(), failing(Vec::new())).await;

    let mut socket = TcpStream::connect(server.addr).await.unwrap();
    socket.write_all(b"NOT HTTP AT ALL\r\n\r\n").await.unwrap();

    let mut response = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), socket.read_to_end(&mut response)).await;
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 400"), "{}", text);

    let res = common::client().get(server.url("/ping")).send().await.unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn shutdown_stops_accepting() {
    let server = common::start_server(ServiceConfig::default(), failing(Vec::new())).await;
    let addr = server.addr;
    let res = common::client().get(server.url("/ping")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    drop(server);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(TcpStream::connect(addr).await.is_err());
}
