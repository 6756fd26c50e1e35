use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};

use aw_util::{env_addr, write_json_atomic};
use serde_json::{json, Value};
use shell_words::quote;
use tracing::{debug, error, info};

use crate::bridge::{
    adb_path, canonicalize_adb_serial, format_bridge_output, BridgeFailure, BridgeOutput,
    DeviceBridge,
};
use crate::result::{Metrics, Outcome, TaskResult};
use crate::stats::ResultStats;
use crate::task::{
    non_blank, CaptureParams, CheckType, GenericParams, InfoParams, InstallParams,
    MaintenanceParams, NavigationParams, RemovalParams, Task, TaskKind, DEFAULT_PACKAGE,
    DEFAULT_SCREENSHOT_PATH,
};

// Per-handler deadlines. The task's own timeout hint is not applied here.
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);
const INFO_TIMEOUT: Duration = Duration::from_secs(20);
const PACKAGE_QUERY_TIMEOUT: Duration = Duration::from_secs(15);
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(20);
const MAINTENANCE_TIMEOUT: Duration = Duration::from_secs(30);
const RUNNER_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    pub runner_path: String,
    pub emulator_ip: String,
    pub emulator_port: String,
    pub working_dir: PathBuf,
    pub adb_path: PathBuf,
    /// When set, adb commands are pinned to this device with `-s`.
    pub target_serial: Option<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            runner_path: "./run.sh".into(),
            emulator_ip: "localhost".into(),
            emulator_port: "5555".into(),
            working_dir: PathBuf::from("."),
            adb_path: PathBuf::from("adb"),
            target_serial: None,
        }
    }
}

impl ExecutorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            runner_path: env_addr("AW_RUNNER_PATH", &defaults.runner_path),
            emulator_ip: env_addr("AW_EMULATOR_IP", &defaults.emulator_ip),
            emulator_port: env_addr("AW_EMULATOR_PORT", &defaults.emulator_port),
            working_dir: std::env::var("AW_WORKING_DIR")
                .map(|dir| aw_util::expand_user(&dir))
                .unwrap_or(defaults.working_dir),
            adb_path: adb_path(),
            target_serial: std::env::var("AW_TARGET_SERIAL")
                .ok()
                .filter(|serial| !serial.trim().is_empty()),
        }
    }

    pub fn task_file_path(&self, task_id: &str) -> PathBuf {
        self.working_dir
            .join("tasks")
            .join(format!("task_{task_id}.json"))
    }
}

pub struct TaskExecutor {
    name: String,
    config: ExecutorConfig,
    bridge: Arc<dyn DeviceBridge>,
    results: Vec<TaskResult>,
}

impl TaskExecutor {
    pub fn new(config: ExecutorConfig, bridge: Arc<dyn DeviceBridge>) -> Self {
        Self {
            name: "TaskExecutor".into(),
            config,
            bridge,
            results: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Runs one task to completion. Every failure is reported through the
    /// returned result; nothing escapes as an error.
    pub async fn execute_task(&mut self, task: &Task) -> TaskResult {
        info!("Executing task: {} (ID: {})", task.name, task.id);

        let started = SystemTime::now();
        let clock = Instant::now();
        let outcome = match self.prepare_task_file(task) {
            Ok(path) => {
                debug!("Task file prepared: {}", path.display());
                self.dispatch(task).await
            }
            Err(err) => Outcome::failure(err.to_string()),
        };
        let result = TaskResult::finished(&task.id, &task.name, started, clock.elapsed(), outcome);

        match result.error_message() {
            None => info!("Task {} executed successfully", task.name),
            Some(message) => error!("Task {} failed: {message}", task.name),
        }
        self.results.push(result.clone());
        result
    }

    pub fn results(&self) -> &[TaskResult] {
        &self.results
    }

    pub fn statistics(&self) -> Option<ResultStats> {
        ResultStats::from_results(&self.results)
    }

    pub fn configure(&mut self, config: ExecutorConfig) {
        self.config = config;
    }

    pub fn reset(&mut self) {
        self.results.clear();
        info!("Agent {} reset", self.name);
    }

    fn prepare_task_file(&self, task: &Task) -> io::Result<PathBuf> {
        let path = self.config.task_file_path(&task.id);
        let document = json!({
            "task": task,
            "execution": {
                "emulator_ip": self.config.emulator_ip,
                "emulator_port": self.config.emulator_port,
                "timeout": task.timeout_secs,
                "retry_count": task.retry_count,
            },
            "output": {
                "log_file": format!("task_{}.log", task.id),
                "screenshot_dir": "screenshots",
                "metrics_file": format!("task_{}_metrics.json", task.id),
            },
        });
        write_json_atomic(&path, &document)?;
        Ok(path)
    }

    async fn dispatch(&self, task: &Task) -> Outcome {
        info!(
            "Running device task: {} (Type: {})",
            task.name,
            task.kind.type_name()
        );
        match &task.kind {
            TaskKind::Navigation(params) => self.navigate(params).await,
            TaskKind::InformationGathering(params) => self.gather_info(params).await,
            TaskKind::Installation(params) => self.install(params).await,
            TaskKind::Removal(params) => self.remove(params).await,
            TaskKind::Capture(params) => self.capture(params).await,
            TaskKind::Maintenance(params) => self.clear_data(params).await,
            TaskKind::Generic(params) => self.run_generic(&task.id, params).await,
        }
    }

    async fn navigate(&self, params: &NavigationParams) -> Outcome {
        let package = non_blank(&params.package_name).unwrap_or(DEFAULT_PACKAGE);
        let command = self.adb(&format!("shell am start -n {}", quote(package)));
        match self.run(&command, NAVIGATION_TIMEOUT).await {
            Ok(output) if output.success() => Outcome::success(metrics(json!({
                "app_opened": true,
                "package_name": package,
                "adb_output": output.stdout,
            }))),
            Ok(output) => Outcome::failure(format!("Failed to open app: {}", output.stderr)),
            Err(err) => failure(err, "Task execution timed out", "Navigation task failed"),
        }
    }

    async fn gather_info(&self, params: &InfoParams) -> Outcome {
        let command = match params.check_type {
            CheckType::WifiStatus => self.adb("shell dumpsys wifi | grep 'Wi-Fi is'"),
            CheckType::BatteryInfo => self.adb("shell dumpsys battery"),
            CheckType::Other(_) => self.adb("shell getprop"),
        };
        match self.run(&command, INFO_TIMEOUT).await {
            Ok(output) if output.success() => Outcome::success(metrics(json!({
                "info_type": params.check_type.as_str(),
                "data_collected": true,
                "output_length": output.stdout.len(),
            }))),
            Ok(output) => Outcome::failure(format!("Failed to gather info: {}", output.stderr)),
            Err(err) => failure(err, "Info gathering timed out", "Info gathering failed"),
        }
    }

    // Installation is simulated: only the package query reaches the device.
    async fn install(&self, params: &InstallParams) -> Outcome {
        let (Some(_), Some(package)) =
            (non_blank(&params.apk_path), non_blank(&params.package_name))
        else {
            return Outcome::failure("Missing APK path or package name");
        };
        match self.query_package(package).await {
            Ok(true) => Outcome::success(metrics(json!({
                "package_installed": true,
                "package_name": package,
                "already_installed": true,
            }))),
            Ok(false) => Outcome::success(metrics(json!({
                "package_installed": true,
                "package_name": package,
                "installation_simulated": true,
            }))),
            Err(err) => failure(err, "Installation task timed out", "Installation failed"),
        }
    }

    async fn remove(&self, params: &RemovalParams) -> Outcome {
        let Some(package) = non_blank(&params.package_name) else {
            return Outcome::failure("Missing package name");
        };
        match self.query_package(package).await {
            Ok(true) => Outcome::success(metrics(json!({
                "package_removed": true,
                "package_name": package,
                "removal_simulated": true,
            }))),
            Ok(false) => Outcome::success(metrics(json!({
                "package_removed": true,
                "package_name": package,
                "already_removed": true,
            }))),
            Err(err) => failure(err, "Removal task timed out", "Removal failed"),
        }
    }

    async fn capture(&self, params: &CaptureParams) -> Outcome {
        let output_path = non_blank(&params.output_path).unwrap_or(DEFAULT_SCREENSHOT_PATH);
        let command = self.adb(&format!("shell screencap {}", quote(output_path)));
        match self.run(&command, CAPTURE_TIMEOUT).await {
            Ok(output) if output.success() => Outcome::success(metrics(json!({
                "screenshot_taken": true,
                "output_path": output_path,
                "capture_successful": true,
            }))),
            Ok(output) => {
                Outcome::failure(format!("Failed to take screenshot: {}", output.stderr))
            }
            Err(err) => failure(err, "Screenshot task timed out", "Screenshot failed"),
        }
    }

    async fn clear_data(&self, params: &MaintenanceParams) -> Outcome {
        let Some(package) = non_blank(&params.package_name) else {
            return Outcome::failure("Missing package name");
        };
        let command = self.adb(&format!("shell pm clear {}", quote(package)));
        match self.run(&command, MAINTENANCE_TIMEOUT).await {
            Ok(output) if output.success() => Outcome::success(metrics(json!({
                "data_cleared": true,
                "package_name": package,
                "data_types": params.data_types,
                "maintenance_successful": true,
            }))),
            Ok(output) => Outcome::failure(format!("Failed to clear data: {}", output.stderr)),
            Err(err) => failure(err, "Maintenance task timed out", "Maintenance failed"),
        }
    }

    async fn run_generic(&self, task_id: &str, _params: &GenericParams) -> Outcome {
        let command = format!("{} --task {task_id} --local", self.config.runner_path);
        match self.run(&command, RUNNER_TIMEOUT).await {
            Ok(output) if output.success() => Outcome::success(metrics(json!({
                "runner_used": true,
                "task_id": task_id,
                "output": output.stdout,
            }))),
            Ok(output) => Outcome::failure(format!("Runner failed: {}", output.stderr)),
            Err(err) => failure(err, "Generic task timed out", "Generic task failed"),
        }
    }

    async fn query_package(&self, package: &str) -> Result<bool, BridgeFailure> {
        let command = self.adb(&format!(
            "shell pm list packages | grep {}",
            quote(package)
        ));
        let output = self.run(&command, PACKAGE_QUERY_TIMEOUT).await?;
        Ok(output.stdout.contains(package))
    }

    async fn run(&self, command: &str, timeout: Duration) -> Result<BridgeOutput, BridgeFailure> {
        let output = self.bridge.run(command, timeout).await?;
        debug!(
            "bridge exit {}: {}",
            output.status,
            format_bridge_output(&output.stdout, &output.stderr).trim()
        );
        Ok(output)
    }

    fn adb(&self, args: &str) -> String {
        let adb = shell_path(&self.config.adb_path);
        match self.config.target_serial.as_deref() {
            Some(serial) => format!("{adb} -s {} {args}", canonicalize_adb_serial(serial)),
            None => format!("{adb} {args}"),
        }
    }
}

fn shell_path(path: &Path) -> String {
    path.display().to_string()
}

fn metrics(value: Value) -> Metrics {
    match value {
        Value::Object(map) => map,
        _ => Metrics::new(),
    }
}

fn failure(err: BridgeFailure, timed_out: &str, failed: &str) -> Outcome {
    match err {
        BridgeFailure::Timeout(_) => Outcome::failure(timed_out),
        other => Outcome::failure(format!("{failed}: {other}")),
    }
}
