use std::time::{Duration, SystemTime};

use aw_util::unix_millis;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

pub type Metrics = Map<String, Value>;

/// Outcome of one task attempt. A success never carries an error message.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success { metrics: Metrics },
    Failure { error_message: String },
}

impl Outcome {
    pub fn success(metrics: Metrics) -> Self {
        Self::Success { metrics }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            error_message: message.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct TaskResult {
    pub task_id: String,
    pub task_name: String,
    pub start_unix_millis: i64,
    pub end_unix_millis: i64,
    #[serde(serialize_with = "serialize_secs")]
    pub execution_time: Duration,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl TaskResult {
    pub fn finished(
        task_id: impl Into<String>,
        task_name: impl Into<String>,
        started: SystemTime,
        elapsed: Duration,
        outcome: Outcome,
    ) -> Self {
        let start_unix_millis = unix_millis(started);
        Self {
            task_id: task_id.into(),
            task_name: task_name.into(),
            start_unix_millis,
            end_unix_millis: unix_millis(started + elapsed),
            execution_time: elapsed,
            outcome,
        }
    }

    /// Stand-in for an episode that died before producing its own result.
    pub fn episode_failure(episode: usize, message: impl Into<String>) -> Self {
        Self::finished(
            format!("episode_{episode}_failed"),
            format!("Episode {episode}"),
            SystemTime::now(),
            Duration::ZERO,
            Outcome::failure(message),
        )
    }

    /// Replaces the timing window with one measured by the caller.
    pub fn retime(&mut self, started: SystemTime, elapsed: Duration) {
        self.start_unix_millis = unix_millis(started);
        self.end_unix_millis = unix_millis(started + elapsed);
        self.execution_time = elapsed;
    }

    pub fn success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Failure { error_message } => Some(error_message),
            Outcome::Success { .. } => None,
        }
    }

    pub fn metrics(&self) -> Option<&Metrics> {
        match &self.outcome {
            Outcome::Success { metrics } => Some(metrics),
            Outcome::Failure { .. } => None,
        }
    }
}

fn serialize_secs<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}
