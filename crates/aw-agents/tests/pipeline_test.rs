use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use aw_agents::{
    default_catalog, BridgeFailure, BridgeOutput, DeviceBridge, ExecutorConfig, Orchestrator,
    OrchestratorConfig,
};

struct EchoBridge;

#[async_trait]
impl DeviceBridge for EchoBridge {
    async fn run(&self, command: &str, _timeout: Duration) -> Result<BridgeOutput, BridgeFailure> {
        Ok(BridgeOutput {
            status: 0,
            stdout: command.to_string(),
            stderr: String::new(),
        })
    }
}

/// Panics on the second command it sees.
#[derive(Default)]
struct PanicOnSecondCall {
    calls: AtomicUsize,
}

#[async_trait]
impl DeviceBridge for PanicOnSecondCall {
    async fn run(&self, command: &str, _timeout: Duration) -> Result<BridgeOutput, BridgeFailure> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 1 {
            panic!("device link dropped");
        }
        Ok(BridgeOutput {
            status: 0,
            stdout: command.to_string(),
            stderr: String::new(),
        })
    }
}

fn config(dir: &Path, delay: Duration) -> OrchestratorConfig {
    OrchestratorConfig {
        episode_delay: delay,
        executor: ExecutorConfig {
            working_dir: dir.to_path_buf(),
            ..ExecutorConfig::default()
        },
        ..OrchestratorConfig::default()
    }
}

#[tokio::test]
async fn returns_one_result_per_episode() {
    for count in [0, 1, 3] {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = Orchestrator::with_seed(
            config(dir.path(), Duration::ZERO),
            default_catalog(),
            Arc::new(EchoBridge),
            count as u64,
        )
        .unwrap();

        let results = orchestrator.run_multiple_episodes(count).await;
        assert_eq!(results.len(), count);
        assert_eq!(orchestrator.results().len(), count);
        for result in &results {
            assert!(result.end_unix_millis >= result.start_unix_millis);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn waits_between_episodes_but_not_after_the_last() {
    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = Orchestrator::with_seed(
        config(dir.path(), Duration::from_secs(2)),
        default_catalog(),
        Arc::new(EchoBridge),
        21,
    )
    .unwrap();

    let started = tokio::time::Instant::now();
    orchestrator.run_multiple_episodes(3).await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(4), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(6), "{elapsed:?}");
}

#[tokio::test]
async fn panicking_episode_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = Orchestrator::with_seed(
        config(dir.path(), Duration::ZERO),
        default_catalog(),
        Arc::new(PanicOnSecondCall::default()),
        5,
    )
    .unwrap();

    let results = orchestrator.run_multiple_episodes(3).await;

    assert_eq!(results.len(), 3);
    let failed: Vec<_> = results
        .iter()
        .filter(|r| r.task_id.starts_with("episode_"))
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].task_id, "episode_2_failed");
    assert_eq!(failed[0].task_name, "Episode 2");
    assert_eq!(failed[0].error_message(), Some("device link dropped"));
    assert!(results[0].task_id != "episode_1_failed");
    assert!(results[2].task_id != "episode_3_failed");
}
