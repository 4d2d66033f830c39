//! cascade - run a task through the worker/synthesis/executive tiers.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use cascade::observer::{FanoutObserver, ReportObserver, TracingObserver};
use cascade::{build_provider, render, Orchestrator};
use cascade_core::{OrchestratorConfig, Task, Topology};
use clap::{Parser, Subcommand};
use eyre::{bail, WrapErr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Project-local config file, relative to the working directory.
const PROJECT_CONFIG: &str = ".cascade/config";

#[derive(Parser)]
#[command(name = "cascade")]
#[command(about = "Hierarchical fan-out/fan-in orchestrator for LLM workers")]
#[command(version)]
struct Cli {
    /// Config file path (overrides .cascade/config)
    #[arg(long, global = true, env = "CASCADE_CONFIG")]
    config: Option<PathBuf>,

    /// Override a config key (repeatable), e.g. --set retries=3
    #[arg(long = "set", global = true, value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a task through every tier
    Run {
        /// Root task description
        task: String,

        /// Number of workers (subtasks)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Maximum concurrent provider calls per tier
        #[arg(long)]
        concurrency: Option<usize>,

        /// Synthesis tier: true, false, or auto
        #[arg(long)]
        drummer: Option<String>,

        /// Executive tier: true, false, or auto
        #[arg(long)]
        camina: Option<String>,

        /// Provider: echo, openai, or anthropic
        #[arg(long, env = "CASCADE_PROVIDER")]
        provider: Option<String>,

        /// Model name passed to the provider
        #[arg(long, env = "CASCADE_MODEL")]
        model: Option<String>,

        /// Print the full run outcome as JSON instead of text
        #[arg(long)]
        json: bool,

        /// Append a progress timeline to this TSV file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Show the tier layout for one or more worker counts
    Topology {
        /// Worker counts (default: 1..=25)
        counts: Vec<usize>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = load_config(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli.overrides)?;

    match cli.command {
        Command::Run {
            task,
            workers,
            concurrency,
            drummer,
            camina,
            provider,
            model,
            json,
            report,
        } => {
            let flags = [
                ("worker_count", workers.map(|n| n.to_string())),
                ("concurrency_cap", concurrency.map(|n| n.to_string())),
                ("enable_drummer", drummer),
                ("enable_camina", camina),
                ("provider", provider),
                ("model", model),
            ];
            for (key, value) in flags {
                if let Some(value) = value {
                    config
                        .apply_value(key, &value)
                        .wrap_err_with(|| format!("invalid --{key}"))?;
                }
            }
            run_task(config, task, json, report.as_deref()).await
        }
        Command::Topology { counts } => {
            let counts = if counts.is_empty() {
                (1..=25).collect()
            } else {
                counts
            };
            let rows: Vec<Topology> = counts.into_iter().map(|n| config.topology_for(n)).collect();
            render::print_topology_table(&rows);
            Ok(())
        }
        Command::Config => {
            print!("{}", config.to_config_string());
            Ok(())
        }
    }
}

/// Defaults, then the user config, then `.cascade/config`, then `--config`.
fn load_config(explicit: Option<&Path>) -> eyre::Result<OrchestratorConfig> {
    let mut config = OrchestratorConfig::default();

    let user_config = dirs::config_dir().map(|dir| dir.join("cascade").join("config"));
    for path in user_config.iter().map(PathBuf::as_path).chain([Path::new(PROJECT_CONFIG)]) {
        if path.exists() {
            config
                .load_file(path)
                .wrap_err_with(|| format!("failed to load {}", path.display()))?;
        }
    }

    if let Some(path) = explicit {
        if !path.exists() {
            bail!("config file not found: {}", path.display());
        }
        config
            .load_file(path)
            .wrap_err_with(|| format!("failed to load {}", path.display()))?;
    }

    Ok(config)
}

fn apply_overrides(config: &mut OrchestratorConfig, overrides: &[String]) -> eyre::Result<()> {
    for entry in overrides {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("invalid --set value '{entry}', expected KEY=VALUE");
        };
        config
            .apply_value(key.trim(), value.trim())
            .wrap_err_with(|| format!("invalid --set {entry}"))?;
    }
    Ok(())
}

async fn run_task(
    config: OrchestratorConfig,
    task: String,
    json: bool,
    report: Option<&Path>,
) -> eyre::Result<()> {
    config.validate()?;
    let provider = build_provider(&config)?;

    let mut observer = FanoutObserver::new().with(Arc::new(TracingObserver));
    if let Some(path) = report {
        let report_observer = ReportObserver::create(path)
            .wrap_err_with(|| format!("failed to open report {}", path.display()))?;
        observer = observer.with(Arc::new(report_observer));
    }

    let orchestrator = Orchestrator::new(config, provider).with_observer(Arc::new(observer));

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("received SIGINT, cancelling run");
                cancel.cancel();
            }
        })
    };

    let result = orchestrator.run_with_cancel(Task::new(task), cancel).await;
    ctrl_c.abort();
    let outcome = result?;

    info!(
        run_id = %outcome.run_id,
        final_tier = outcome.final_tier.as_str(),
        "run finished"
    );

    if json {
        println!("{}", outcome.to_json()?);
    } else {
        render::print_outcome(&outcome);
    }
    Ok(())
}
