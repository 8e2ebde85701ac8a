//! End-to-end runs against an in-process backend serving the real
//! HTTP and WebSocket surface.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use shorts_client::api::{ApiError, GenerateRequest, ShortsApi};
use shorts_client::channel::ChannelState;
use shorts_client::config::{ChannelTiming, MonitorConfig};
use shorts_client::monitor::ProgressMonitor;
use shorts_core::status::Lifecycle;

const EXECUTION_ID: i64 = 42;

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

struct Backend {
    /// Flipped by the progress socket just before its final event.
    finished: AtomicBool,
}

async fn spawn_backend(finished: bool) -> SocketAddr {
    let backend = Arc::new(Backend {
        finished: AtomicBool::new(finished),
    });

    let app = Router::new()
        .route("/api/generate", post(generate))
        .route("/api/status/{id}", get(status))
        .route("/api/health", get(health))
        .route("/ws/progress/{id}", get(progress))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn generate(Json(body): Json<Value>) -> Json<Value> {
    assert_eq!(body["topic"], "tidal power");
    Json(json!({ "execution_id": EXECUTION_ID }))
}

async fn status(
    State(backend): State<Arc<Backend>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, StatusCode> {
    if id != EXECUTION_ID {
        return Err(StatusCode::NOT_FOUND);
    }
    let body = if backend.finished.load(Ordering::SeqCst) {
        json!({
            "execution_id": id,
            "topic": "tidal power",
            "status": "completed",
            "current_stage": "publishing",
            "cost": 0.42,
            "error_message": null,
            "output_path": "/output/42.mp4",
        })
    } else {
        json!({
            "execution_id": id,
            "topic": "tidal power",
            "status": "in_progress",
            "current_stage": "video",
            "cost": null,
        })
    };
    Ok(Json(body))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn progress(
    ws: WebSocketUpgrade,
    State(backend): State<Arc<Backend>>,
    Path(_id): Path<i64>,
) -> Response {
    ws.on_upgrade(move |socket| stream_progress(socket, backend))
}

async fn stream_progress(mut socket: WebSocket, backend: Arc<Backend>) {
    let frames = [
        json!({"agent": "ScriptAgent", "step": "script", "percent": 20, "log": "Writing script"}),
        json!({"agent": "VideoAgent", "step": "video", "percent": 60, "log": "Rendering clips"}),
    ];
    for frame in frames {
        if socket.send(Message::Text(frame.to_string().into())).await.is_err() {
            return;
        }
    }
    let _ = socket.send(Message::Text("garbage".into())).await;

    backend.finished.store(true, Ordering::SeqCst);
    let done = json!({"agent": "PublishingAgent", "step": "publish", "percent": 100, "log": "Done"});
    let _ = socket.send(Message::Text(done.to_string().into())).await;
    let _ = socket.send(Message::Close(None)).await;
}

fn fast_timing() -> ChannelTiming {
    ChannelTiming {
        poll_interval: Duration::from_millis(50),
        reconnect_after: Some(Duration::from_millis(200)),
        stream_idle_check: Some(Duration::from_secs(1)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_then_watch_to_completion() {
    let addr = spawn_backend(false).await;
    let config = MonitorConfig {
        timing: fast_timing(),
        ..MonitorConfig::default().with_api_url(format!("http://{addr}"))
    };

    let api = ShortsApi::with_timeout(config.api_url.clone(), config.request_timeout).unwrap();
    let request = GenerateRequest {
        topic: Some("tidal power".into()),
        ..GenerateRequest::default()
    };
    let execution_id = api.submit(&request).await.unwrap();
    assert_eq!(execution_id, EXECUTION_ID);

    let mut monitor = ProgressMonitor::connect(&config).unwrap();
    monitor.observe(Some(execution_id), true);

    let view = tokio::time::timeout(Duration::from_secs(10), monitor.wait_until_settled())
        .await
        .expect("run did not settle");

    assert_eq!(view.status, Lifecycle::Completed);
    assert_eq!(view.percent, 100.0);
    assert_eq!(view.events.len(), 3);
    assert_eq!(view.output_path.as_deref(), Some("/output/42.mp4"));
    assert_eq!(view.cost, 0.42);
    assert!(!view.connected);
    assert_eq!(monitor.state(), ChannelState::Idle);
    assert_eq!(
        api.video_url_for(&view),
        Some(format!("http://{addr}/api/video/42"))
    );
}

#[tokio::test]
async fn unknown_execution_is_not_found() {
    let addr = spawn_backend(false).await;
    let api = ShortsApi::new(format!("http://{addr}"));

    assert_matches!(api.status(99).await, Err(ApiError::NotFound(99)));
    assert_eq!(api.health().await.unwrap()["status"], "ok");
}

#[tokio::test]
async fn unreachable_push_endpoint_settles_by_polling() {
    let addr = spawn_backend(true).await;

    let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let config = MonitorConfig {
        ws_url: format!("ws://{dead_addr}"),
        timing: fast_timing(),
        ..MonitorConfig::default().with_api_url(format!("http://{addr}"))
    };

    let mut monitor = ProgressMonitor::connect(&config).unwrap();
    monitor.observe(Some(EXECUTION_ID), true);

    let view = tokio::time::timeout(Duration::from_secs(10), monitor.wait_until_settled())
        .await
        .expect("run did not settle");

    assert_eq!(view.status, Lifecycle::Completed);
    assert_eq!(view.percent, 100.0);
    assert!(view.events.is_empty());
    assert_eq!(view.stage.as_deref(), Some("publishing"));
}
