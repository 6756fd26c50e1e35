use std::collections::BTreeMap;

use serde::Serialize;

use crate::result::TaskResult;

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ResultStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub avg_time_secs: f64,
    pub flaky_tasks: usize,
    pub flakiness_rate: f64,
}

impl ResultStats {
    /// Aggregates a result history; `None` when there is nothing to report.
    ///
    /// Results are grouped by task name. A group is flaky when it holds at
    /// least one success and at least one failure.
    pub fn from_results(results: &[TaskResult]) -> Option<Self> {
        if results.is_empty() {
            return None;
        }

        let total = results.len();
        let successful = results.iter().filter(|r| r.success()).count();
        let total_secs: f64 = results.iter().map(|r| r.execution_time.as_secs_f64()).sum();

        // name -> (successes, failures)
        let mut by_name: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for result in results {
            let entry = by_name.entry(result.task_name.as_str()).or_default();
            if result.success() {
                entry.0 += 1;
            } else {
                entry.1 += 1;
            }
        }
        let flaky_tasks = by_name.values().filter(|(ok, failed)| *ok > 0 && *failed > 0).count();

        Some(Self {
            total,
            successful,
            failed: total - successful,
            success_rate: successful as f64 / total as f64,
            avg_time_secs: total_secs / total as f64,
            flaky_tasks,
            flakiness_rate: flaky_tasks as f64 / by_name.len() as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::result::{Metrics, Outcome};

    fn result(name: &str, ok: bool, millis: u64) -> TaskResult {
        let outcome = if ok {
            Outcome::success(Metrics::new())
        } else {
            Outcome::failure("boom")
        };
        TaskResult::finished(
            format!("{name}-{millis}"),
            name,
            SystemTime::now(),
            Duration::from_millis(millis),
            outcome,
        )
    }

    #[test]
    fn empty_history_has_no_stats() {
        assert_eq!(ResultStats::from_results(&[]), None);
    }

    #[test]
    fn mixed_outcomes_under_one_name_are_flaky() {
        let results = vec![
            result("X", true, 1000),
            result("X", false, 2000),
            result("X", true, 3000),
            result("Y", true, 1000),
            result("Y", true, 3000),
        ];

        let stats = ResultStats::from_results(&results).unwrap();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.successful, 4);
        assert_eq!(stats.failed, 1);
        assert!((stats.success_rate - 0.8).abs() < 1e-9);
        assert!((stats.avg_time_secs - 2.0).abs() < 1e-9);
        assert_eq!(stats.flaky_tasks, 1);
        assert!((stats.flakiness_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn all_successes_are_never_flaky() {
        let results = vec![result("A", true, 10), result("B", true, 10), result("A", true, 10)];

        let stats = ResultStats::from_results(&results).unwrap();
        assert_eq!(stats.success_rate, 1.0);
        assert_eq!(stats.flaky_tasks, 0);
        assert_eq!(stats.flakiness_rate, 0.0);
    }
}
