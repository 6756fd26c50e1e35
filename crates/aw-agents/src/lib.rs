//! Task generation and execution agents for Android device episodes.

pub mod bridge;
pub mod catalog;
pub mod error;
pub mod executor;
pub mod generator;
pub mod orchestrator;
pub mod result;
pub mod stats;
pub mod task;

pub use bridge::{BridgeFailure, BridgeOutput, DeviceBridge, ShellBridge};
pub use catalog::{default_catalog, load_catalog, Catalog, TaskTemplate};
pub use error::AgentError;
pub use executor::{ExecutorConfig, TaskExecutor};
pub use generator::{GeneratorConfig, GeneratorStats, TaskGenerator};
pub use orchestrator::{
    AgentState, AgentStatus, ComprehensiveStats, EpisodeSummary, Orchestrator, OrchestratorConfig,
};
pub use result::{Metrics, Outcome, TaskResult};
pub use stats::ResultStats;
pub use task::{CheckType, Task, TaskKind};
