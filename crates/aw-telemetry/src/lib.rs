use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use aw_util::{data_dir, env_flag, now_millis, now_secs_f64};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

const EVENT_QUEUE_CAPACITY: usize = 256;
const MAX_EVENT_BYTES: u64 = 2 * 1024 * 1024;

/// Receiver of task lifecycle events.
///
/// Implementations must never panic or block the caller on a failing
/// backend; problems degrade to local logging.
pub trait ObservabilitySink: Send + Sync {
    fn task_started(&self, task_id: &str, task_type: &str, payload: &Value);

    fn task_completed(
        &self,
        task_id: &str,
        task_type: &str,
        result: &Value,
        duration: Duration,
        success: bool,
    );

    fn error(&self, message: &str, context: &[(&str, &str)]);

    fn trace_context(&self) -> TraceContext;

    fn health(&self) -> HealthReport;
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct TraceContext {
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    pub status: String,
    pub timestamp: f64,
    pub service: String,
    pub project_id: String,
    pub observability: BackendStatus,
}

#[derive(Clone, Debug, Serialize)]
pub struct BackendStatus {
    pub logging_available: bool,
    pub export_available: bool,
    pub crash_reports_available: bool,
}

#[derive(Clone, Debug)]
pub struct TelemetryOptions {
    pub service_name: String,
    pub service_version: String,
    pub project_id: String,
    pub environment: String,
    pub export_enabled: bool,
    pub crash_enabled: bool,
    pub data_dir: PathBuf,
}

impl TelemetryOptions {
    pub fn from_env(service_name: &str, service_version: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            service_version: service_version.to_string(),
            project_id: std::env::var("GOOGLE_CLOUD_PROJECT").unwrap_or_else(|_| "unknown".into()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "production".into()),
            export_enabled: env_flag("AW_TELEMETRY_EXPORT"),
            crash_enabled: env_flag("AW_TELEMETRY_CRASH"),
            data_dir: data_dir(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
enum Severity {
    Info,
    Error,
}

#[derive(Serialize)]
struct LogEntry {
    severity: Severity,
    message: String,
    at_unix_millis: i64,
    trace_id: String,
    span_id: Option<String>,
    labels: BTreeMap<String, String>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

#[derive(Serialize)]
struct CrashReport {
    at_unix_millis: i64,
    service: String,
    version: String,
    trace_id: String,
    message: String,
    location: Option<String>,
    backtrace: Option<String>,
}

pub struct Telemetry {
    options: TelemetryOptions,
    trace_id: String,
    span_id: Mutex<Option<String>>,
    sender: Option<SyncSender<LogEntry>>,
}

static TELEMETRY: OnceLock<Arc<Telemetry>> = OnceLock::new();

/// Installs the process-wide instance and its panic hook. Later calls return
/// the instance created first.
pub fn init(options: TelemetryOptions) -> Arc<Telemetry> {
    if let Some(existing) = TELEMETRY.get() {
        return Arc::clone(existing);
    }
    let telemetry = Telemetry::start(options);
    install_panic_hook(Arc::clone(&telemetry));
    let _ = TELEMETRY.set(Arc::clone(&telemetry));
    telemetry
}

pub fn init_with_env(service_name: &str, service_version: &str) -> Arc<Telemetry> {
    init(TelemetryOptions::from_env(service_name, service_version))
}

impl Telemetry {
    /// Builds a standalone instance; the export writer thread only runs when
    /// `export_enabled` is set.
    pub fn start(options: TelemetryOptions) -> Arc<Self> {
        let sender = if options.export_enabled {
            let (sender, receiver) = sync_channel(EVENT_QUEUE_CAPACITY);
            start_writer_thread(events_dir(&options), receiver);
            Some(sender)
        } else {
            None
        };
        Arc::new(Self {
            options,
            trace_id: Uuid::new_v4().simple().to_string(),
            span_id: Mutex::new(None),
            sender,
        })
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn events_path(&self) -> PathBuf {
        events_dir(&self.options).join("events.jsonl")
    }

    /// Opens a span; its id becomes the current span id until the guard drops.
    pub fn span(&self, name: &str) -> SpanGuard<'_> {
        let span_id = new_span_id();
        let previous = self.replace_span_id(Some(span_id.clone()));
        SpanGuard {
            telemetry: self,
            name: name.to_string(),
            span_id,
            previous,
            started: Instant::now(),
        }
    }

    fn current_span_id(&self) -> Option<String> {
        match self.span_id.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn replace_span_id(&self, value: Option<String>) -> Option<String> {
        let mut guard = match self.span_id.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, value)
    }

    fn labels(&self, extra: &[(&str, &str)]) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert("service".to_string(), self.options.service_name.clone());
        labels.insert("environment".to_string(), self.options.environment.clone());
        for (key, value) in extra {
            if !key.trim().is_empty() {
                labels.insert((*key).to_string(), (*value).to_string());
            }
        }
        labels
    }

    fn emit(
        &self,
        severity: Severity,
        message: String,
        labels: BTreeMap<String, String>,
        fields: Map<String, Value>,
    ) {
        let entry = LogEntry {
            severity,
            message,
            at_unix_millis: now_millis(),
            trace_id: self.trace_id.clone(),
            span_id: self.current_span_id(),
            labels,
            fields,
        };

        let line = serde_json::to_string(&entry).unwrap_or_else(|_| entry.message.clone());
        match severity {
            Severity::Info => info!(target: "aw_telemetry", "{line}"),
            Severity::Error => error!(target: "aw_telemetry", "{line}"),
        }

        let Some(sender) = self.sender.as_ref() else {
            return;
        };
        match sender.try_send(entry) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("telemetry queue full; dropping event"),
            Err(TrySendError::Disconnected(_)) => warn!("telemetry writer stopped; dropping event"),
        }
    }

    fn crash_report(&self, message: String, location: Option<String>, backtrace: Option<String>) {
        if !self.options.crash_enabled {
            return;
        }
        let report = CrashReport {
            at_unix_millis: now_millis(),
            service: self.options.service_name.clone(),
            version: self.options.service_version.clone(),
            trace_id: self.trace_id.clone(),
            message,
            location,
            backtrace,
        };
        write_crash_report(&events_dir(&self.options).join("crashes"), &report);
    }
}

impl ObservabilitySink for Telemetry {
    fn task_started(&self, task_id: &str, task_type: &str, payload: &Value) {
        let mut fields = Map::new();
        fields.insert("task_id".into(), Value::from(task_id));
        fields.insert("task_type".into(), Value::from(task_type));
        fields.insert("task_data".into(), payload.clone());
        self.emit(
            Severity::Info,
            format!("Task started: {task_type}"),
            self.labels(&[("task_type", task_type)]),
            fields,
        );
    }

    fn task_completed(
        &self,
        task_id: &str,
        task_type: &str,
        result: &Value,
        duration: Duration,
        success: bool,
    ) {
        let mut fields = Map::new();
        fields.insert("task_id".into(), Value::from(task_id));
        fields.insert("task_type".into(), Value::from(task_type));
        fields.insert("result".into(), result.clone());
        fields.insert("duration".into(), Value::from(duration.as_secs_f64()));
        fields.insert("success".into(), Value::from(success));
        let severity = if success { Severity::Info } else { Severity::Error };
        self.emit(
            severity,
            format!("Task completed: {task_type}"),
            self.labels(&[("task_type", task_type)]),
            fields,
        );
    }

    fn error(&self, message: &str, context: &[(&str, &str)]) {
        let mut ctx = Map::new();
        for (key, value) in context {
            ctx.insert((*key).to_string(), Value::from(*value));
        }
        let mut fields = Map::new();
        fields.insert("context".into(), Value::Object(ctx));
        self.emit(
            Severity::Error,
            message.to_string(),
            self.labels(&[]),
            fields,
        );
    }

    fn trace_context(&self) -> TraceContext {
        TraceContext {
            trace_id: Some(self.trace_id.clone()),
            span_id: self.current_span_id(),
        }
    }

    fn health(&self) -> HealthReport {
        HealthReport {
            status: "healthy".into(),
            timestamp: now_secs_f64(),
            service: self.options.service_name.clone(),
            project_id: self.options.project_id.clone(),
            observability: BackendStatus {
                logging_available: true,
                export_available: self.sender.is_some(),
                crash_reports_available: self.options.crash_enabled,
            },
        }
    }
}

pub struct SpanGuard<'a> {
    telemetry: &'a Telemetry,
    name: String,
    span_id: String,
    previous: Option<String>,
    started: Instant,
}

impl SpanGuard<'_> {
    pub fn span_id(&self) -> &str {
        &self.span_id
    }
}

impl Drop for SpanGuard<'_> {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        info!(
            target: "aw_telemetry",
            span = %self.name,
            span_id = %self.span_id,
            "Span '{}' completed in {:.3}s",
            self.name,
            elapsed.as_secs_f64()
        );
        self.telemetry.replace_span_id(self.previous.take());
    }
}

fn start_writer_thread(dir: PathBuf, receiver: Receiver<LogEntry>) {
    std::thread::spawn(move || {
        while let Ok(entry) = receiver.recv() {
            write_event(&dir, &entry);
        }
    });
}

fn install_panic_hook(telemetry: Arc<Telemetry>) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let message = if let Some(msg) = info.payload().downcast_ref::<&str>() {
            (*msg).to_string()
        } else if let Some(msg) = info.payload().downcast_ref::<String>() {
            msg.clone()
        } else {
            "panic".to_string()
        };
        let location = info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()));
        let backtrace = Some(format!("{:?}", std::backtrace::Backtrace::capture()));
        telemetry.crash_report(message, location, backtrace);
        default_hook(info);
    }));
}

fn write_event(dir: &Path, entry: &LogEntry) {
    if let Err(err) = fs::create_dir_all(dir) {
        warn!("telemetry: failed to create {}: {err}", dir.display());
        return;
    }

    let path = dir.join("events.jsonl");
    if let Err(err) = rotate_if_needed(&path) {
        warn!("telemetry: failed to rotate {}: {err}", path.display());
        return;
    }

    let mut file = match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => file,
        Err(err) => {
            warn!("telemetry: failed to open {}: {err}", path.display());
            return;
        }
    };
    match serde_json::to_string(entry) {
        Ok(line) => {
            if let Err(err) = writeln!(file, "{line}") {
                warn!("telemetry: failed to write {}: {err}", path.display());
            }
        }
        Err(err) => warn!("telemetry: failed to encode event: {err}"),
    }
}

fn rotate_if_needed(path: &Path) -> std::io::Result<()> {
    if let Ok(meta) = fs::metadata(path) {
        if meta.len() >= MAX_EVENT_BYTES {
            let rotated = path.with_extension("jsonl.1");
            let _ = fs::remove_file(&rotated);
            fs::rename(path, rotated)?;
        }
    }
    Ok(())
}

fn write_crash_report(dir: &Path, report: &CrashReport) {
    if let Err(err) = fs::create_dir_all(dir) {
        eprintln!("telemetry: failed to create {}: {err}", dir.display());
        return;
    }
    let filename = format!(
        "crash-{}-{}.json",
        report.at_unix_millis,
        std::process::id()
    );
    let path = dir.join(filename);
    if let Ok(file) = OpenOptions::new().create(true).write(true).open(&path) {
        let _ = serde_json::to_writer_pretty(file, report);
    }
}

fn events_dir(options: &TelemetryOptions) -> PathBuf {
    options
        .data_dir
        .join("telemetry")
        .join(&options.service_name)
}

fn new_span_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}
