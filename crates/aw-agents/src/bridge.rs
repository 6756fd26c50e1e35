use std::{io, path::PathBuf, process::Stdio, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BridgeOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl BridgeOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeFailure {
    #[error("command not found")]
    NotFound,
    #[error("{0}")]
    Io(String),
    #[error("command exceeded {0:?}")]
    Timeout(Duration),
}

/// Device command channel: one shell command in, its exit status and streams out.
#[async_trait]
pub trait DeviceBridge: Send + Sync {
    async fn run(&self, command: &str, timeout: Duration) -> Result<BridgeOutput, BridgeFailure>;
}

/// Runs commands through `sh -c` so pipelines like `pm list packages | grep` work.
#[derive(Clone, Debug)]
pub struct ShellBridge {
    shell: PathBuf,
}

impl Default for ShellBridge {
    fn default() -> Self {
        Self {
            shell: PathBuf::from("sh"),
        }
    }
}

#[async_trait]
impl DeviceBridge for ShellBridge {
    async fn run(&self, command: &str, timeout: Duration) -> Result<BridgeOutput, BridgeFailure> {
        debug!("bridge: {command}");
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let child = cmd.spawn().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                BridgeFailure::NotFound
            } else {
                BridgeFailure::Io(e.to_string())
            }
        })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| BridgeFailure::Io(e.to_string()))?,
            Err(_) => return Err(BridgeFailure::Timeout(timeout)),
        };

        Ok(BridgeOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

pub fn adb_path() -> PathBuf {
    if let Ok(path) = std::env::var("AW_ADB_PATH") {
        return PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("ADB_PATH") {
        return PathBuf::from(path);
    }
    if let Ok(sdk_root) =
        std::env::var("ANDROID_SDK_ROOT").or_else(|_| std::env::var("ANDROID_HOME"))
    {
        let candidate = PathBuf::from(&sdk_root).join("platform-tools").join("adb");
        if candidate.exists() {
            return candidate;
        }
    }
    PathBuf::from("adb")
}

pub fn canonicalize_adb_serial(addr: &str) -> String {
    let addr = addr.trim();
    for prefix in ["localhost:", "0.0.0.0:", "[::1]:", "[::]:"] {
        if let Some(rest) = addr.strip_prefix(prefix) {
            return format!("127.0.0.1:{rest}");
        }
    }
    addr.to_string()
}

pub(crate) fn format_bridge_output(stdout: &str, stderr: &str) -> String {
    let stdout = stdout.trim();
    let stderr = stderr.trim();
    let mut out = String::new();

    if !stdout.is_empty() {
        out.push_str("stdout:\n");
        out.push_str(stdout);
        out.push('\n');
    }
    if !stderr.is_empty() {
        out.push_str("stderr:\n");
        out.push_str(stderr);
        out.push('\n');
    }

    out
}
