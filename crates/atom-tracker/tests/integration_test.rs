// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use atom_tracker::auth;
use atom_tracker::transport::TransportRequest;
use atom_tracker::{
    HttpTransport, Tracker, TrackerConfig, TrackerError, Transport, TransportError,
};
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tokio::time::{sleep, timeout, Duration};

fn config(endpoint: String) -> TrackerConfig {
    TrackerConfig {
        endpoint,
        auth_key: "default-key".to_string(),
        retry_backoff_base: Duration::from_millis(1),
        retry_max_time: Duration::from_millis(5),
        retry_max_count: 2,
        flush_interval: Duration::from_secs(3_600),
        request_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

fn start(config: TrackerConfig, errors: Arc<AtomicUsize>) -> Tracker {
    let transport = Arc::new(HttpTransport::new(&config));
    let callback = move |_: SystemTime, _: Option<u16>, _: &str, _: &[String]| {
        errors.fetch_add(1, Ordering::SeqCst);
    };
    Tracker::start(config, transport, Arc::new(callback)).expect("valid config")
}

async fn wait_for(condition: impl Fn() -> bool) {
    let wait = async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    };
    if timeout(Duration::from_secs(5), wait).await.is_err() {
        panic!("timed out waiting for condition");
    }
}

#[tokio::test]
async fn tracker_ships_signed_bulk_request() {
    let mut server = Server::new_async().await;
    let data = "[\"{\\\"id\\\":1}\",\"{\\\"id\\\":2}\"]";
    let mock = server
        .mock("POST", "/bulk")
        .match_header("x-ironsource-atom-sdk-type", "rust")
        .match_header("x-ironsource-atom-sdk-version", Matcher::Any)
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(json!({
            "table": "clicks",
            "data": data,
            "bulk": true,
            "auth": auth::sign("stream-key", data),
        })))
        .with_status(200)
        .with_body("ok")
        .expect(1)
        .create_async()
        .await;

    let errors = Arc::new(AtomicUsize::new(0));
    let tracker = start(config(format!("{}/", server.url())), Arc::clone(&errors));

    tracker
        .track_value("clicks", &json!({"id": 1}), Some("stream-key"))
        .expect("tracked");
    tracker
        .track_value("clicks", &json!({"id": 2}), None)
        .expect("tracked");
    tracker.stop().await;

    mock.assert_async().await;
    assert_eq!(errors.load(Ordering::SeqCst), 0);
    assert!(matches!(
        tracker.track("clicks", "late", None),
        Err(TrackerError::TrackerStopped)
    ));
}

#[tokio::test]
async fn tracker_drops_batch_on_client_error() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/bulk")
        .with_status(401)
        .with_body("bad auth")
        .expect(1)
        .create_async()
        .await;

    let errors = Arc::new(AtomicUsize::new(0));
    let tracker = start(config(format!("{}/", server.url())), Arc::clone(&errors));

    tracker.track("clicks", "a", None).expect("tracked");
    tracker.flush();
    wait_for(|| errors.load(Ordering::SeqCst) == 1).await;
    sleep(Duration::from_millis(100)).await;

    mock.assert_async().await;
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn tracker_requeues_after_server_errors() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/bulk")
        .with_status(503)
        .expect_at_least(3)
        .create_async()
        .await;

    let errors = Arc::new(AtomicUsize::new(0));
    let tracker = start(config(server.url()), Arc::clone(&errors));

    tracker.track("clicks", "a", None).expect("tracked");
    tracker.flush();
    // Two attempts per pass, so a third call means the batch was requeued
    wait_for(|| errors.load(Ordering::SeqCst) >= 3).await;
    tracker.cancellation_token().cancel();

    mock.assert_async().await;
}

#[tokio::test]
async fn http_transport_splits_body_and_error() {
    let mut server = Server::new_async().await;
    let _ok = server
        .mock("POST", "/ok/bulk")
        .with_status(200)
        .with_body("accepted")
        .create_async()
        .await;
    let _failed = server
        .mock("POST", "/failed/bulk")
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;

    let config = config(server.url());
    let transport = HttpTransport::new(&config);
    let request = |path: &str| TransportRequest {
        endpoint: format!("{}/{}/", server.url(), path),
        credential: "key".to_string(),
        stream: "clicks".to_string(),
        batch: Arc::from(vec!["a".to_string()]),
    };

    let response = transport
        .deliver(&request("ok"), Duration::from_secs(5))
        .await
        .expect("response");
    assert_eq!(response.status, 200);
    assert_eq!(response.body.as_deref(), Some("accepted"));
    assert!(response.error.is_none());

    let response = transport
        .deliver(&request("failed"), Duration::from_secs(5))
        .await
        .expect("response");
    assert_eq!(response.status, 500);
    assert_eq!(response.error.as_deref(), Some("boom"));
}

#[tokio::test]
async fn http_transport_reports_connection_failure() {
    let config = config("http://127.0.0.1:1/".to_string());
    let transport = HttpTransport::new(&config);
    let request = TransportRequest {
        endpoint: config.endpoint.clone(),
        credential: String::new(),
        stream: "clicks".to_string(),
        batch: Arc::from(vec!["a".to_string()]),
    };

    let result = transport.deliver(&request, Duration::from_secs(5)).await;
    assert!(matches!(result, Err(TransportError::Connection(_))));
}

#[tokio::test]
async fn tracker_reports_connection_failure_once() {
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&statuses);
    let callback = move |_: SystemTime, status: Option<u16>, _: &str, batch: &[String]| {
        seen.lock().unwrap().push((status, batch.to_vec()));
    };

    let config = config("http://127.0.0.1:1/".to_string());
    let transport = Arc::new(HttpTransport::new(&config));
    let tracker = Tracker::start(config, transport, Arc::new(callback)).expect("valid config");

    tracker.track("clicks", "a", None).expect("tracked");
    tracker.flush();
    wait_for(|| !statuses.lock().unwrap().is_empty()).await;
    sleep(Duration::from_millis(100)).await;

    let statuses = statuses.lock().unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0], (None, vec!["a".to_string()]));
}
