use std::{sync::Arc, sync::Mutex, time::Duration};

use aw_telemetry::{
    BackendStatus, HealthReport, ObservabilitySink, Telemetry, TelemetryOptions, TraceContext,
};
use aw_worker::{build_router, AppState, ServiceInfo};
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl ObservabilitySink for RecordingSink {
    fn task_started(&self, task_id: &str, task_type: &str, _payload: &Value) {
        self.events
            .lock()
            .unwrap()
            .push(format!("started:{task_id}:{task_type}"));
    }

    fn task_completed(
        &self,
        task_id: &str,
        _task_type: &str,
        _result: &Value,
        _duration: Duration,
        success: bool,
    ) {
        self.events
            .lock()
            .unwrap()
            .push(format!("completed:{task_id}:{success}"));
    }

    fn error(&self, message: &str, context: &[(&str, &str)]) {
        let endpoint = context
            .iter()
            .find(|(key, _)| *key == "endpoint")
            .map(|(_, value)| *value)
            .unwrap_or("");
        self.events
            .lock()
            .unwrap()
            .push(format!("error:{endpoint}:{message}"));
    }

    fn trace_context(&self) -> TraceContext {
        TraceContext {
            trace_id: Some("trace-abc".into()),
            span_id: None,
        }
    }

    fn health(&self) -> HealthReport {
        HealthReport {
            status: "healthy".into(),
            timestamp: 1.0,
            service: "androidworld-worker".into(),
            project_id: "test-project".into(),
            observability: BackendStatus {
                logging_available: true,
                export_available: false,
                crash_reports_available: false,
            },
        }
    }
}

/// Blows up when a task starts; records what the router reports afterwards.
#[derive(Default)]
struct ExplodingSink {
    inner: RecordingSink,
}

impl ObservabilitySink for ExplodingSink {
    fn task_started(&self, _task_id: &str, _task_type: &str, _payload: &Value) {
        panic!("collector exploded");
    }

    fn task_completed(
        &self,
        task_id: &str,
        task_type: &str,
        result: &Value,
        duration: Duration,
        success: bool,
    ) {
        self.inner
            .task_completed(task_id, task_type, result, duration, success);
    }

    fn error(&self, message: &str, context: &[(&str, &str)]) {
        self.inner.error(message, context);
    }

    fn trace_context(&self) -> TraceContext {
        self.inner.trace_context()
    }

    fn health(&self) -> HealthReport {
        self.inner.health()
    }
}

fn info() -> ServiceInfo {
    ServiceInfo {
        service: "androidworld-worker".into(),
        version: "1.0.0".into(),
        environment: "test".into(),
        project_id: "test-project".into(),
    }
}

fn setup() -> (axum::Router, AppState, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let state = AppState::new(sink.clone(), info());
    (build_router(state.clone()), state, sink)
}

async fn send(
    app: &axum::Router,
    method: Method,
    path: &str,
    body: Body,
) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(path)
                .body(body)
                .expect("request"),
        )
        .await
        .expect("response")
}

async fn request_json(
    app: &axum::Router,
    method: Method,
    path: &str,
    body: Body,
) -> (StatusCode, Value) {
    let response = send(app, method, path, body).await;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    (status, serde_json::from_slice(&bytes).expect("json"))
}

#[tokio::test]
async fn submitted_task_completes_with_duration() {
    let (app, _state, sink) = setup();

    let (status, body) = request_json(
        &app,
        Method::POST,
        "/task",
        Body::from(json!({"task_id": "t1", "task_type": "x"}).to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["task_id"], "t1");
    assert_eq!(body["task_type"], "x");
    assert_eq!(body["success"], true);
    assert_eq!(body["result"], "Task completed successfully");
    assert!(body["duration"].as_f64().unwrap() >= 0.1);
    assert!(body["timestamp"].is_number());
    assert_eq!(sink.events(), vec!["started:t1:x", "completed:t1:true"]);
}

#[tokio::test]
async fn task_without_ids_is_logged_as_unknown() {
    let (app, _state, sink) = setup();

    let (status, body) = request_json(&app, Method::POST, "/task", Body::from("{}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["task_id"], Value::Null);
    assert_eq!(sink.events()[0], "started:unknown:unknown");
}

#[tokio::test]
async fn invalid_json_is_a_bad_request() {
    let (app, _state, sink) = setup();

    let (status, body) = request_json(&app, Method::POST, "/task", Body::from("{broken")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Invalid JSON"}));
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn non_object_task_is_an_internal_error() {
    let (app, _state, sink) = setup();

    let (status, body) = request_json(&app, Method::POST, "/task", Body::from("[1, 2]")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("JSON object"));
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert!(events[0].starts_with("error:/task:"));
}

#[tokio::test]
async fn handler_panic_becomes_internal_error() {
    let sink = Arc::new(ExplodingSink::default());
    let app = build_router(AppState::new(sink.clone(), info()));

    let response = send(&app, Method::POST, "/task", Body::from("{}")).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({"error": "collector exploded"}));
    assert_eq!(sink.inner.events(), vec!["error::collector exploded"]);
}

#[tokio::test]
async fn unknown_paths_and_methods_are_not_found() {
    let (app, _state, _sink) = setup();

    let (status, body) = request_json(&app, Method::GET, "/unknown", Body::empty()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "Not found"}));

    let (status, _) = request_json(&app, Method::GET, "/task", Body::empty()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = request_json(&app, Method::POST, "/health", Body::empty()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_sink_status() {
    let (app, _state, _sink) = setup();

    let (status, body) = request_json(&app, Method::GET, "/health", Body::empty()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "androidworld-worker");
    assert_eq!(body["observability"]["logging_available"], true);
}

#[tokio::test]
async fn readiness_follows_state() {
    let (app, state, _sink) = setup();

    let (status, body) = request_json(&app, Method::GET, "/ready", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");

    state.set_ready(false);
    let (status, body) = request_json(&app, Method::GET, "/ready", Body::empty()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "not_ready");
}

#[tokio::test]
async fn metrics_are_plain_text() {
    let (app, _state, _sink) = setup();

    let response = send(&app, Method::GET, "/metrics", Body::empty()).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("# TYPE androidworld_tasks_total counter"));
    assert!(text.contains(r#"androidworld_tasks_total{service="androidworld-worker"} 0"#));
}

#[tokio::test]
async fn status_and_trace_describe_the_service() {
    let (app, _state, _sink) = setup();

    let (_, status) = request_json(&app, Method::GET, "/status", Body::empty()).await;
    assert_eq!(status["service"], "androidworld-worker");
    assert_eq!(status["version"], "1.0.0");
    assert_eq!(status["environment"], "test");
    assert_eq!(status["project_id"], "test-project");
    assert!(status["uptime"].as_f64().unwrap() >= 0.0);

    let (_, trace) = request_json(&app, Method::GET, "/trace", Body::empty()).await;
    assert_eq!(trace["trace_id"], "trace-abc");
    assert_eq!(trace["span_id"], Value::Null);
    assert_eq!(trace["service"], "androidworld-worker");
}

#[tokio::test]
async fn every_response_allows_any_origin() {
    let (app, _state, _sink) = setup();

    for (method, path) in [
        (Method::GET, "/health"),
        (Method::GET, "/metrics"),
        (Method::GET, "/missing"),
        (Method::POST, "/task"),
    ] {
        let response = send(&app, method, path, Body::from("not json")).await;
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*", "{path}");
    }
}

#[tokio::test]
async fn works_with_the_telemetry_sink() {
    let dir = tempfile::tempdir().unwrap();
    let options = TelemetryOptions {
        service_name: "androidworld-worker".into(),
        service_version: "1.0.0".into(),
        project_id: "unknown".into(),
        environment: "test".into(),
        export_enabled: false,
        crash_enabled: false,
        data_dir: dir.path().to_path_buf(),
    };
    let info = ServiceInfo::from_options(&options);
    let telemetry = Telemetry::start(options);
    let trace_id = telemetry.trace_id().to_string();
    let app = build_router(AppState::new(telemetry, info));

    let (_, body) = request_json(&app, Method::GET, "/trace", Body::empty()).await;
    assert_eq!(body["trace_id"], trace_id);

    let (status, _) = request_json(
        &app,
        Method::POST,
        "/task",
        Body::from(r#"{"task_id": "t2", "task_type": "capture"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}
