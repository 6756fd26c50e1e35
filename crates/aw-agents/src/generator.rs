use std::{
    collections::{BTreeMap, HashSet},
    ops::RangeInclusive,
};

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde::Serialize;
use tracing::info;
use uuid::{Builder, Uuid};

use crate::catalog::{Catalog, TaskTemplate};
use crate::error::AgentError;
use crate::task::{Task, TaskKind};

#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    /// Candidates substituted into navigation templates that name a package.
    pub navigation_packages: Vec<String>,
    pub priority_range: RangeInclusive<u8>,
    pub timeout_range_secs: RangeInclusive<u32>,
    pub retry_range: RangeInclusive<u32>,
}

impl GeneratorConfig {
    /// Every hint range must be able to yield a value.
    pub fn validate(&self) -> Result<(), AgentError> {
        let empty = if self.priority_range.is_empty() {
            Some("priority_range")
        } else if self.timeout_range_secs.is_empty() {
            Some("timeout_range_secs")
        } else if self.retry_range.is_empty() {
            Some("retry_range")
        } else {
            None
        };
        match empty {
            Some(field) => Err(AgentError::InvalidConfig(format!("{field} is empty"))),
            None => Ok(()),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            navigation_packages: [
                "com.android.settings",
                "com.android.vending",
                "com.google.android.apps.maps",
                "com.whatsapp",
                "com.instagram.android",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            priority_range: 1..=5,
            timeout_range_secs: 30..=120,
            retry_range: 0..=2,
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct GeneratorStats {
    pub total_generated: usize,
    pub task_types: BTreeMap<String, usize>,
    pub unique_tasks: usize,
}

pub struct TaskGenerator {
    name: String,
    catalog: Catalog,
    config: GeneratorConfig,
    rng: StdRng,
    history: Vec<Task>,
}

impl TaskGenerator {
    pub fn new(catalog: Catalog, config: GeneratorConfig) -> Result<Self, AgentError> {
        Self::with_rng(catalog, config, StdRng::from_entropy())
    }

    /// Reproducible generator: the same seed and catalog yield the same tasks.
    pub fn with_seed(
        catalog: Catalog,
        config: GeneratorConfig,
        seed: u64,
    ) -> Result<Self, AgentError> {
        Self::with_rng(catalog, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        catalog: Catalog,
        config: GeneratorConfig,
        rng: StdRng,
    ) -> Result<Self, AgentError> {
        if catalog.is_empty() {
            return Err(AgentError::EmptyCatalog);
        }
        config.validate()?;
        Ok(Self {
            name: "TaskGenerator".into(),
            catalog,
            config,
            rng,
            history: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn catalog(&self) -> &[TaskTemplate] {
        &self.catalog
    }

    pub fn generate_task(&mut self) -> Task {
        let index = self.rng.gen_range(0..self.catalog.len());
        let template = self.catalog[index].clone();
        let id = self.next_id();

        let mut kind = template.kind;
        if let TaskKind::Navigation(params) = &mut kind {
            if params.package_name.is_some() {
                if let Some(package) = self.config.navigation_packages.choose(&mut self.rng) {
                    params.package_name = Some(package.clone());
                }
            }
        }

        let task = Task {
            id,
            name: template.name,
            description: template.description,
            expected_outcome: template.expected_outcome,
            kind,
            priority: self.rng.gen_range(self.config.priority_range.clone()),
            timeout_secs: self.rng.gen_range(self.config.timeout_range_secs.clone()),
            retry_count: self.rng.gen_range(self.config.retry_range.clone()),
        };

        info!("Generated task: {} (ID: {})", task.name, task.id);
        self.history.push(task.clone());
        task
    }

    pub fn generate_custom_task(&mut self, kind: TaskKind) -> Task {
        let type_name = kind.type_name();
        let task = Task {
            id: self.next_id(),
            name: format!("Custom_{type_name}"),
            description: format!("Custom {type_name} task"),
            expected_outcome: "Task should complete successfully".into(),
            kind,
            priority: 3,
            timeout_secs: 60,
            retry_count: 1,
        };

        info!("Generated custom task: {} (ID: {})", task.name, task.id);
        self.history.push(task.clone());
        task
    }

    pub fn task_statistics(&self) -> Option<GeneratorStats> {
        if self.history.is_empty() {
            return None;
        }

        let mut task_types = BTreeMap::new();
        for task in &self.history {
            *task_types
                .entry(task.kind.type_name().to_string())
                .or_insert(0) += 1;
        }
        let unique_tasks = self
            .history
            .iter()
            .map(|task| task.name.as_str())
            .collect::<HashSet<_>>()
            .len();

        Some(GeneratorStats {
            total_generated: self.history.len(),
            task_types,
            unique_tasks,
        })
    }

    pub fn history(&self) -> &[Task] {
        &self.history
    }

    pub fn configure(&mut self, config: GeneratorConfig) -> Result<(), AgentError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.history.clear();
        info!("Agent {} reset", self.name);
    }

    fn next_id(&mut self) -> String {
        let uuid: Uuid = Builder::from_random_bytes(self.rng.gen()).into_uuid();
        uuid.to_string()
    }
}
