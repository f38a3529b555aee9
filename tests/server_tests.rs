use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use portprobe::config::ScannerConfig;
use portprobe::{server, Scanner};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceExt;

fn app() -> Router {
    let config = ScannerConfig {
        connect_timeout_ms: 1_000,
        banner_timeout_ms: 100,
        ..ScannerConfig::default()
    };
    server::router(Arc::new(Scanner::new(config).unwrap()))
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_scan(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/port-scan")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_raw(body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/port-scan")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn rejects_bad_requests() {
    let app = app();

    let (status, body) = send(&app, post_scan(json!({"targetHost": "h", "endPort": 10}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("startPort"));

    for (start, end) in [(0, 10), (1, 65_536), (100, 50), (1, 10_001), (-5, 10)] {
        let req = post_scan(json!({"targetHost": "h", "startPort": start, "endPort": end}));
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{start}-{end}");
        assert!(body["error"].is_string());
    }

    let bad_ports = [json!("abc"), json!(1.5), json!("0"), json!("")];
    for start in bad_ports {
        let req = post_scan(json!({"targetHost": "h", "startPort": start, "endPort": 10}));
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{start}");
        assert!(body["error"].is_string(), "{start}");
    }

    let (status, body) = send(&app, post_raw("not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = send(&app, post_raw(r#"{"targetHost": 7}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = send(&app, get("/api/port-scan/stats")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn scan_then_query_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((sock, _)) = listener.accept().await {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                drop(sock);
            });
        }
    });

    let app = app();
    // Ports as decimal strings are accepted alongside integers.
    let req = post_scan(json!({
        "targetHost": "127.0.0.1",
        "startPort": port.to_string(),
        "endPort": port,
    }));
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["totalPorts"], 1);
    assert_eq!(body["results"][0]["port"], port);
    assert_eq!(body["results"][0]["status"], "open");
    assert!(body["results"][0]["banner"].is_null());
    assert!(body["scanTime"].is_string());

    let id = body["sessionId"].as_str().unwrap().to_string();
    let uri = format!("/api/port-scan/status?sessionId={id}");
    let (status, session) = send(&app, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["status"], "completed");
    assert_eq!(session["scannedPorts"], 1);
    assert_eq!(session["progress"], 100.0);

    let (status, stats) = send(&app, get("/api/port-scan/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["openPorts"], 1);
    assert_eq!(stats["totalScans"], 1);
}

#[tokio::test]
async fn status_lookup_errors() {
    let app = app();

    let (status, _) = send(&app, get("/api/port-scan/status")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, get("/api/port-scan/status?sessionId=not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown = uuid::Uuid::new_v4();
    let uri = format!("/api/port-scan/status?sessionId={unknown}");
    let (status, body) = send(&app, get(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));
}
