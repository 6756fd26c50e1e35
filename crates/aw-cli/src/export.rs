use std::path::Path;

use aw_agents::{ComprehensiveStats, Metrics, TaskResult};
use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct EvaluationReport<'a> {
    pub evaluation: EvaluationHeader<'a>,
    pub results: Vec<ResultRow<'a>>,
    pub statistics: &'a ComprehensiveStats,
}

#[derive(Debug, Serialize)]
pub struct EvaluationHeader<'a> {
    pub timestamp: String,
    pub total_episodes: usize,
    pub agent_name: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ResultRow<'a> {
    pub task_id: &'a str,
    pub task_name: &'a str,
    pub success: bool,
    pub execution_time: f64,
    pub error_message: Option<&'a str>,
    pub metrics: Option<&'a Metrics>,
}

impl<'a> EvaluationReport<'a> {
    pub fn new(
        agent_name: &'a str,
        results: &'a [TaskResult],
        statistics: &'a ComprehensiveStats,
    ) -> Self {
        Self {
            evaluation: EvaluationHeader {
                timestamp: Utc::now().to_rfc3339(),
                total_episodes: results.len(),
                agent_name,
            },
            results: results
                .iter()
                .map(|result| ResultRow {
                    task_id: &result.task_id,
                    task_name: &result.task_name,
                    success: result.success(),
                    execution_time: result.execution_time.as_secs_f64(),
                    error_message: result.error_message(),
                    metrics: result.metrics(),
                })
                .collect(),
            statistics,
        }
    }
}

pub fn write_json(path: &Path, report: &EvaluationReport<'_>) -> std::io::Result<()> {
    aw_util::write_json_atomic(path, report)
}

/// One row per episode, numbered from 1.
pub fn write_csv(path: &Path, results: &[TaskResult]) -> csv::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["episode", "task_name", "success", "execution_time", "error"])?;
    for (index, result) in results.iter().enumerate() {
        writer.write_record([
            (index + 1).to_string(),
            result.task_name.clone(),
            result.success().to_string(),
            format!("{:.2}", result.execution_time.as_secs_f64()),
            result.error_message().unwrap_or_default().to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
