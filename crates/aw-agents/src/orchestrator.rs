use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};

use aw_util::env_millis;
use futures_util::FutureExt;
use serde::Serialize;
use tracing::{error, info};

use crate::bridge::DeviceBridge;
use crate::catalog::Catalog;
use crate::error::AgentError;
use crate::executor::{ExecutorConfig, TaskExecutor};
use crate::generator::{GeneratorConfig, GeneratorStats, TaskGenerator};
use crate::result::TaskResult;
use crate::stats::ResultStats;

pub const DEFAULT_EPISODE_DELAY: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub name: String,
    /// Pause between consecutive episodes of a batch.
    pub episode_delay: Duration,
    pub generator: GeneratorConfig,
    pub executor: ExecutorConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            name: "Orchestrator".into(),
            episode_delay: DEFAULT_EPISODE_DELAY,
            generator: GeneratorConfig::default(),
            executor: ExecutorConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        Self {
            episode_delay: env_millis("AW_EPISODE_DELAY_MS", DEFAULT_EPISODE_DELAY),
            executor: ExecutorConfig::from_env(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct EpisodeSummary {
    pub total_episodes: usize,
    pub overall_success_rate: f64,
    pub average_execution_time: f64,
    pub flakiness_rate: f64,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ComprehensiveStats {
    pub orchestrator: Option<ResultStats>,
    pub task_generator: Option<GeneratorStats>,
    pub task_executor: Option<ResultStats>,
    pub summary: EpisodeSummary,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct AgentState {
    pub name: String,
    pub status: &'static str,
    pub processed: usize,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct AgentStatus {
    pub orchestrator: AgentState,
    pub task_generator: AgentState,
    pub task_executor: AgentState,
}

pub struct Orchestrator {
    name: String,
    episode_delay: Duration,
    generator: TaskGenerator,
    executor: TaskExecutor,
    results: Vec<TaskResult>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        catalog: Catalog,
        bridge: Arc<dyn DeviceBridge>,
    ) -> Result<Self, AgentError> {
        let generator = TaskGenerator::new(catalog, config.generator.clone())?;
        Ok(Self::assemble(config, generator, bridge))
    }

    pub fn with_seed(
        config: OrchestratorConfig,
        catalog: Catalog,
        bridge: Arc<dyn DeviceBridge>,
        seed: u64,
    ) -> Result<Self, AgentError> {
        let generator = TaskGenerator::with_seed(catalog, config.generator.clone(), seed)?;
        Ok(Self::assemble(config, generator, bridge))
    }

    fn assemble(
        config: OrchestratorConfig,
        generator: TaskGenerator,
        bridge: Arc<dyn DeviceBridge>,
    ) -> Self {
        info!("Orchestrator initialized with {}", config.name);
        Self {
            name: config.name,
            episode_delay: config.episode_delay,
            generator,
            executor: TaskExecutor::new(config.executor, bridge),
            results: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn generator(&self) -> &TaskGenerator {
        &self.generator
    }

    pub fn executor(&self) -> &TaskExecutor {
        &self.executor
    }

    pub fn results(&self) -> &[TaskResult] {
        &self.results
    }

    /// Generates one task and executes it. The result's timing covers the
    /// whole episode as seen from here, not just the executor's dispatch.
    pub async fn run_episode(&mut self) -> TaskResult {
        info!("Starting episode for orchestrator {}", self.name);
        let started = SystemTime::now();
        let clock = Instant::now();

        let task = self.generator.generate_task();
        let mut result = self.executor.execute_task(&task).await;
        result.retime(started, clock.elapsed());
        self.results.push(result.clone());

        info!(
            "Episode completed: {}, Time: {:.2}s",
            result.success(),
            result.execution_time.as_secs_f64()
        );
        result
    }

    /// Runs `count` episodes back to back and always returns `count` results.
    /// An episode that panics is replaced by a failure result.
    pub async fn run_multiple_episodes(&mut self, count: usize) -> Vec<TaskResult> {
        info!("Running {count} episodes...");
        let mut results = Vec::with_capacity(count);

        for episode in 1..=count {
            info!("Episode {episode}/{count}");
            match AssertUnwindSafe(self.run_episode()).catch_unwind().await {
                Ok(result) => results.push(result),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!("Episode {episode} failed: {message}");
                    results.push(TaskResult::episode_failure(episode, message));
                }
            }

            if episode < count && !self.episode_delay.is_zero() {
                tokio::time::sleep(self.episode_delay).await;
            }
        }

        info!("Completed {count} episodes");
        results
    }

    pub fn statistics(&self) -> Option<ResultStats> {
        ResultStats::from_results(&self.results)
    }

    pub fn comprehensive_statistics(&self) -> ComprehensiveStats {
        let orchestrator = self.statistics();
        let summary = match &orchestrator {
            Some(stats) => EpisodeSummary {
                total_episodes: stats.total,
                overall_success_rate: stats.success_rate,
                average_execution_time: stats.avg_time_secs,
                flakiness_rate: stats.flakiness_rate,
            },
            None => EpisodeSummary {
                total_episodes: 0,
                overall_success_rate: 0.0,
                average_execution_time: 0.0,
                flakiness_rate: 0.0,
            },
        };
        ComprehensiveStats {
            orchestrator,
            task_generator: self.generator.task_statistics(),
            task_executor: self.executor.statistics(),
            summary,
        }
    }

    pub fn reset_all_agents(&mut self) {
        self.results.clear();
        self.generator.reset();
        self.executor.reset();
        info!("All agents reset");
    }

    /// Applies both configs, or neither when the generator config is invalid.
    pub fn configure_agents(
        &mut self,
        generator: GeneratorConfig,
        executor: ExecutorConfig,
    ) -> Result<(), AgentError> {
        self.generator.configure(generator)?;
        self.executor.configure(executor);
        info!("Agent configurations updated");
        Ok(())
    }

    pub fn agent_status(&self) -> AgentStatus {
        AgentStatus {
            orchestrator: AgentState {
                name: self.name.clone(),
                status: "active",
                processed: self.results.len(),
            },
            task_generator: AgentState {
                name: self.generator.name().to_string(),
                status: "active",
                processed: self.generator.history().len(),
            },
            task_executor: AgentState {
                name: self.executor.name().to_string(),
                status: "active",
                processed: self.executor.results().len(),
            },
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "episode panicked".to_string()
    }
}
