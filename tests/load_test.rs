//! Concurrency test: many interleaved sessions stay independent.

use std::time::{Duration, Instant};

use bytes::Bytes;
use fanboy_http::config::ServiceConfig;
use serde_json::Value;

mod common;

/// Echoes every key back, one chunk per key, yielding between chunks so
/// sessions interleave.
fn echo_backend() -> common::ScriptedBackend {
    common::ScriptedBackend::new(|_, mut end| async move {
        let mut first = true;
        while let Some(key) = end.input.recv().await {
            let prefix = if first { "[" } else { "," };
            first = false;
            let chunk = format!("{}\"{}\"", prefix, key);
            if end.output.send(Ok(Bytes::from(chunk))).await.is_err() {
                return;
            }
            tokio::task::yield_now().await;
        }
        let tail = if first { "[]" } else { "]" };
        let _ = end.output.send(Ok(Bytes::from_static(tail.as_bytes()))).await;
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sessions_are_isolated() {
    let config = ServiceConfig::default();
    let backend = echo_backend();
    let server = common::start_server(config, backend.clone()).await;
    let client = common::client();

    let concurrency = 20;
    let requests_per_task = 25;
    let start = Instant::now();

    let mut handles = Vec::new();
    for task in 0..concurrency {
        let client = client.clone();
        let base = server.url("/lookup/");
        handles.push(tokio::spawn(async move {
            for i in 0..requests_per_task {
                let keys: Vec<String> = (0..5).map(|k| (task * 1000 + i * 10 + k).to_string()).collect();
                let url = format!("{}{}", base, keys.join(","));
                let body: Value = client.get(&url).send().await.unwrap().json().await.unwrap();
                let expected: Vec<Value> = keys.iter().map(|k| Value::String(k.clone())).collect();
                assert_eq!(body, Value::Array(expected), "{}", url);
            }
        }));
    }

    for handle in handles {
        tokio::time::timeout(Duration::from_secs(30), handle)
            .await
            .expect("load test timed out")
            .unwrap();
    }

    let total = concurrency * requests_per_task;
    let elapsed = start.elapsed();
    println!(
        "{} requests in {:?} ({:.0} req/s)",
        total,
        elapsed,
        total as f64 / elapsed.as_secs_f64()
    );
    assert_eq!(backend.opened(), total);
}
