// tests/metrics_http.rs
//
// Installs the global recorder, so it lives in its own test binary.

use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use finpocket_pipeline::api::{self, ApiState};
use finpocket_pipeline::metrics::Metrics;
use finpocket_pipeline::sink::{MemoryBus, MemoryNewsRepository};

async fn fetch(app: Router, uri: &str) -> (StatusCode, String) {
    let resp = app
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn health_and_metrics_requests_are_counted() {
    let metrics = Metrics::init().expect("install recorder");
    let state = ApiState {
        repo: Arc::new(MemoryNewsRepository::new()),
        bus: Arc::new(MemoryBus::default()),
        channel: "news".into(),
        api_key: None,
    };
    let app = api::router(state, Some(&metrics));

    let (status, _) = fetch(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);

    let (status, text) = fetch(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        text.contains(r#"api_requests_total{route="/health"} 1"#),
        "health request not counted:\n{text}"
    );
    assert!(
        text.contains(r#"route="/metrics""#),
        "metrics request not counted:\n{text}"
    );
}
