use std::{path::PathBuf, sync::Arc, time::Duration};

use aw_agents::{
    default_catalog, load_catalog, Catalog, GeneratorConfig, Orchestrator, OrchestratorConfig,
    ShellBridge, TaskExecutor, TaskGenerator, TaskKind, TaskResult,
};
use aw_telemetry::ObservabilitySink;
use aw_util::init_tracing;
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};

mod export;

use export::EvaluationReport;

#[derive(Parser)]
#[command(name = "aw-cli", version, about = "AndroidWorld agent CLI")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run generate-and-execute episodes against the device
    Episodes {
        #[arg(long, default_value_t = 3)]
        count: usize,
        /// Pause between episodes; defaults to AW_EPISODE_DELAY_MS or 2000
        #[arg(long)]
        delay_ms: Option<u64>,
        #[arg(long)]
        seed: Option<u64>,
        /// JSON template catalog; the built-in catalog when omitted
        #[arg(long)]
        catalog: Option<PathBuf>,
        #[arg(long)]
        working_dir: Option<PathBuf>,
        /// Write the evaluation report as JSON
        #[arg(long)]
        export_json: Option<PathBuf>,
        /// Write one CSV row per episode
        #[arg(long)]
        export_csv: Option<PathBuf>,
    },
    /// Generate tasks without executing them
    Generate {
        #[arg(long, default_value_t = 5)]
        count: usize,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Execute a single custom task
    Exec {
        /// Task type, e.g. navigation, capture, maintenance
        #[arg(long)]
        kind: String,
        /// Task parameter as key=value; repeatable
        #[arg(long = "param")]
        params: Vec<String>,
        #[arg(long)]
        working_dir: Option<PathBuf>,
    },
    /// List the task templates
    Catalog {
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Talk to a running worker front door
    Worker {
        #[command(subcommand)]
        cmd: WorkerCmd,
    },
}

#[derive(Subcommand)]
enum WorkerCmd {
    /// GET /health
    Health {
        #[arg(long, default_value_t = default_worker_addr())]
        addr: String,
    },
    /// GET /status
    Status {
        #[arg(long, default_value_t = default_worker_addr())]
        addr: String,
    },
    /// POST /task
    Submit {
        #[arg(long, default_value_t = default_worker_addr())]
        addr: String,
        #[arg(long)]
        task_id: String,
        #[arg(long)]
        task_type: String,
    },
}

fn default_worker_addr() -> String {
    aw_util::env_addr("AW_WORKER_ADDR", "127.0.0.1:8080")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing()?;
    let cli = Cli::parse();

    match cli.cmd {
        Cmd::Episodes {
            count,
            delay_ms,
            seed,
            catalog,
            working_dir,
            export_json,
            export_csv,
        } => {
            let mut config = OrchestratorConfig::from_env();
            if let Some(delay_ms) = delay_ms {
                config.episode_delay = Duration::from_millis(delay_ms);
            }
            if let Some(dir) = working_dir {
                config.executor.working_dir = dir;
            }
            let catalog = read_catalog(catalog)?;
            let bridge = Arc::new(ShellBridge::default());
            let mut orchestrator = match seed {
                Some(seed) => Orchestrator::with_seed(config, catalog, bridge, seed)?,
                None => Orchestrator::new(config, catalog, bridge)?,
            };

            let telemetry =
                aw_telemetry::init_with_env("androidworld-cli", env!("CARGO_PKG_VERSION"));
            let results = {
                let _span = telemetry.span("episodes");
                orchestrator.run_multiple_episodes(count).await
            };
            for result in &results {
                let task_type = orchestrator
                    .generator()
                    .history()
                    .iter()
                    .find(|task| task.id == result.task_id)
                    .map(|task| task.kind.type_name())
                    .unwrap_or("episode");
                report(telemetry.as_ref(), task_type, result)?;
                print_result(result);
            }
            let statistics = orchestrator.comprehensive_statistics();
            println!("{}", serde_json::to_string_pretty(&statistics)?);
            if let Some(path) = export_json {
                let report = EvaluationReport::new(orchestrator.name(), &results, &statistics);
                export::write_json(&path, &report)?;
                println!("exported {}", path.display());
            }
            if let Some(path) = export_csv {
                export::write_csv(&path, &results)?;
                println!("exported {}", path.display());
            }
        }

        Cmd::Generate {
            count,
            seed,
            catalog,
        } => {
            let catalog = read_catalog(catalog)?;
            let config = GeneratorConfig::default();
            let mut generator = match seed {
                Some(seed) => TaskGenerator::with_seed(catalog, config, seed)?,
                None => TaskGenerator::new(catalog, config)?,
            };
            for _ in 0..count {
                println!("{}", serde_json::to_string(&generator.generate_task())?);
            }
            if let Some(stats) = generator.task_statistics() {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            }
        }

        Cmd::Exec {
            kind,
            params,
            working_dir,
        } => {
            let kind = TaskKind::from_parts(&kind, Value::Object(parse_params(&params)?))?;
            let mut generator = TaskGenerator::new(default_catalog(), GeneratorConfig::default())?;
            let task = generator.generate_custom_task(kind);

            let mut config = OrchestratorConfig::from_env().executor;
            if let Some(dir) = working_dir {
                config.working_dir = dir;
            }
            let mut executor = TaskExecutor::new(config, Arc::new(ShellBridge::default()));
            let result = executor.execute_task(&task).await;
            print_result(&result);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Cmd::Catalog { catalog } => {
            for template in read_catalog(catalog)?.iter() {
                println!(
                    "{}\t{}\t{}",
                    template.kind.type_name(),
                    template.name,
                    template.description
                );
            }
        }

        Cmd::Worker { cmd } => {
            let client = reqwest::Client::new();
            let response = match cmd {
                WorkerCmd::Health { addr } => {
                    client.get(format!("http://{addr}/health")).send().await?
                }
                WorkerCmd::Status { addr } => {
                    client.get(format!("http://{addr}/status")).send().await?
                }
                WorkerCmd::Submit {
                    addr,
                    task_id,
                    task_type,
                } => {
                    client
                        .post(format!("http://{addr}/task"))
                        .json(&json!({ "task_id": task_id, "task_type": task_type }))
                        .send()
                        .await?
                }
            };
            let status = response.status();
            let body: Value = response.json().await?;
            println!("status={}", status.as_u16());
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}

fn read_catalog(path: Option<PathBuf>) -> Result<Catalog, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => load_catalog(&path)?,
        None => default_catalog(),
    })
}

/// `key=value` pairs; values that parse as JSON keep their type.
fn parse_params(params: &[String]) -> Result<Map<String, Value>, Box<dyn std::error::Error>> {
    let mut map = Map::new();
    for param in params {
        let (key, raw) = param
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got {param:?}"))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        map.insert(key.trim().to_string(), value);
    }
    Ok(map)
}

fn report(
    sink: &dyn ObservabilitySink,
    task_type: &str,
    result: &TaskResult,
) -> Result<(), serde_json::Error> {
    sink.task_completed(
        &result.task_id,
        task_type,
        &serde_json::to_value(result)?,
        result.execution_time,
        result.success(),
    );
    Ok(())
}

fn print_result(result: &TaskResult) {
    match result.error_message() {
        None => println!(
            "ok\t{}\t{}\t{:.2}s",
            result.task_id,
            result.task_name,
            result.execution_time.as_secs_f64()
        ),
        Some(message) => println!(
            "failed\t{}\t{}\t{:.2}s\t{message}",
            result.task_id,
            result.task_name,
            result.execution_time.as_secs_f64()
        ),
    }
}
