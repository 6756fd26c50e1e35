use std::{
    any::Any,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use aw_telemetry::{ObservabilitySink, TelemetryOptions};
use aw_util::now_secs_f64;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::{
    catch_panic::CatchPanicLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info};

const SIMULATED_WORK: Duration = Duration::from_millis(100);

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub environment: String,
    pub project_id: String,
}

impl ServiceInfo {
    pub fn from_options(options: &TelemetryOptions) -> Self {
        Self {
            service: options.service_name.clone(),
            version: options.service_version.clone(),
            environment: options.environment.clone(),
            project_id: options.project_id.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    sink: Arc<dyn ObservabilitySink>,
    info: Arc<ServiceInfo>,
    started: Instant,
    ready: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(sink: Arc<dyn ObservabilitySink>, info: ServiceInfo) -> Self {
        Self {
            sink,
            info: Arc::new(info),
            started: Instant::now(),
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

pub fn build_router(state: AppState) -> Router {
    let sink = Arc::clone(&state.sink);
    Router::new()
        .route("/health", get(health).fallback(not_found))
        .route("/ready", get(ready).fallback(not_found))
        .route("/metrics", get(metrics).fallback(not_found))
        .route("/status", get(status).fallback(not_found))
        .route("/trace", get(trace).fallback(not_found))
        .route("/task", post(submit_task).fallback(not_found))
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(move |payload: Box<dyn Any + Send + 'static>| {
            handler_panicked(sink.as_ref(), payload)
        }))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Response {
    Json(state.sink.health()).into_response()
}

async fn ready(State(state): State<AppState>) -> Response {
    if state.ready.load(Ordering::SeqCst) {
        (StatusCode::OK, Json(json!({ "status": "ready" }))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready" })),
        )
            .into_response()
    }
}

async fn metrics(State(state): State<AppState>) -> Response {
    let service = &state.info.service;
    let body = [
        "# HELP androidworld_tasks_total Total number of tasks processed".to_string(),
        "# TYPE androidworld_tasks_total counter".to_string(),
        format!("androidworld_tasks_total{{service=\"{service}\"}} 0"),
        "# HELP androidworld_task_duration_seconds Task execution duration".to_string(),
        "# TYPE androidworld_task_duration_seconds histogram".to_string(),
        format!("androidworld_task_duration_seconds{{service=\"{service}\"}} 0"),
    ]
    .join("\n");
    ([(header::CONTENT_TYPE, "text/plain")], body).into_response()
}

async fn status(State(state): State<AppState>) -> Response {
    Json(json!({
        "service": state.info.service,
        "version": state.info.version,
        "uptime": state.started.elapsed().as_secs_f64(),
        "environment": state.info.environment,
        "project_id": state.info.project_id,
        "timestamp": now_secs_f64(),
    }))
    .into_response()
}

async fn trace(State(state): State<AppState>) -> Response {
    let context = state.sink.trace_context();
    Json(json!({
        "trace_id": context.trace_id,
        "span_id": context.span_id,
        "service": state.info.service,
    }))
    .into_response()
}

async fn submit_task(State(state): State<AppState>, body: Bytes) -> Response {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid JSON" })),
            )
                .into_response()
        }
    };
    let Some(task) = payload.as_object() else {
        return internal_error(&state, "/task", "task payload must be a JSON object");
    };

    let task_id = task.get("task_id").cloned().unwrap_or(Value::Null);
    let task_type = task.get("task_type").cloned().unwrap_or(Value::Null);
    let id_label = label(&task_id);
    let type_label = label(&task_type);

    state.sink.task_started(&id_label, &type_label, &payload);
    let clock = Instant::now();
    tokio::time::sleep(SIMULATED_WORK).await;
    let duration = clock.elapsed();

    let result = json!({
        "task_id": task_id,
        "task_type": task_type,
        "success": true,
        "duration": duration.as_secs_f64(),
        "result": "Task completed successfully",
        "timestamp": now_secs_f64(),
    });
    state
        .sink
        .task_completed(&id_label, &type_label, &result, duration, true);
    info!("task {id_label} ({type_label}) completed in {duration:?}");

    (StatusCode::OK, Json(result)).into_response()
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
}

fn internal_error(state: &AppState, endpoint: &str, message: &str) -> Response {
    state.sink.error(message, &[("endpoint", endpoint)]);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
        .into_response()
}

fn handler_panicked(sink: &dyn ObservabilitySink, payload: Box<dyn Any + Send>) -> Response {
    let message = if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "request handler panicked".to_string()
    };
    error!("request handler panicked: {message}");
    sink.error(&message, &[("source", "panic")]);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
        .into_response()
}

fn label(value: &Value) -> String {
    match value {
        Value::Null => "unknown".to_string(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_fall_back_to_unknown() {
        assert_eq!(label(&Value::Null), "unknown");
        assert_eq!(label(&json!("t1")), "t1");
        assert_eq!(label(&json!(42)), "42");
    }
}
