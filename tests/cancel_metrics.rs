//! Cancellation metrics. Runs in its own binary so the global recorder is
//! installed once and sees only this test's traffic.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use fanboy_http::config::ServiceConfig;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Notify;

mod common;

fn install_recorder() -> PrometheusHandle {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    assert!(metrics::set_global_recorder(recorder).is_ok());
    handle
}

fn cancelled_count(handle: &PrometheusHandle, route: &str) -> f64 {
    let label = format!("route=\"{}\"", route);
    handle
        .render()
        .lines()
        .filter(|line| line.starts_with("fanboy_cancelled_requests_total") && line.contains(&label))
        .filter_map(|line| line.rsplit(' ').next()?.parse::<f64>().ok())
        .sum()
}

#[tokio::test]
async fn dropped_client_counts_as_cancelled() {
    let handle = install_recorder();

    let received = Arc::new(Notify::new());
    let backend = {
        let received = Arc::clone(&received);
        common::ScriptedBackend::new(move |_, mut end| {
            let received = Arc::clone(&received);
            async move {
                if end.input.recv().await.is_some() {
                    received.notify_one();
                }
                let _ = end.output.send(Ok(Bytes::from_static(b"["))).await;
                end.output.closed().await;
            }
        })
    };
    let server = common::start_server(ServiceConfig::default(), backend).await;

    assert_eq!(cancelled_count(&handle, "search"), 0.0);

    let mut socket = TcpStream::connect(server.addr).await.unwrap();
    socket
        .write_all(b"GET /search?q=hang HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), received.notified())
        .await
        .expect("backend should receive the key");
    drop(socket);

    let counted = tokio::time::timeout(Duration::from_secs(5), async {
        while cancelled_count(&handle, "search") < 1.0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(counted.is_ok(), "{}", handle.render());
    assert_eq!(cancelled_count(&handle, "search"), 1.0);
    assert_eq!(cancelled_count(&handle, "lookup"), 0.0);
}
