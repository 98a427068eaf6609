use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand};
use pixelbeam::cache::ExtractionCache;
use pixelbeam::config::{Config, ExecutionMode};
use pixelbeam::context::RunContext;
use pixelbeam::runner::Runner;
use pixelbeam::source::SourceClient;
use pixelbeam::{logging, pipelines};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

/// Exit status for configuration and startup errors.
const EXIT_STARTUP: u8 = 2;

#[derive(Parser)]
#[command(name = "pixelbeam", version, about = "Batch ETL for game event logs")]
struct Cli {
    /// Path to a TOML config file. Built-in defaults when absent.
    #[arg(short, long, global = true, env = "PIXELBEAM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the configured pipelines and write the report
    Run {
        /// Only these event types, comma separated
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,

        /// Delete cached raw data for the selected event types first
        #[arg(long)]
        refresh: bool,

        /// Run event types concurrently
        #[arg(long)]
        parallel: bool,

        /// Worker threads in parallel mode
        #[arg(long)]
        threads: Option<usize>,
    },
    /// Delete cached raw data so the next run fetches again
    Invalidate {
        /// Event type names
        #[arg(required = true)]
        events: Vec<String>,
    },
    /// List the configured pipelines
    List,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("pixelbeam: {e:#}");
            return ExitCode::from(EXIT_STARTUP);
        }
    };
    if let Err(e) = logging::init(&config.log) {
        eprintln!("pixelbeam: {e:#}");
        return ExitCode::from(EXIT_STARTUP);
    }

    match dispatch(cli.command, config) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = format!("{e:#}"), "startup failed");
            ExitCode::from(EXIT_STARTUP)
        }
    }
}

fn dispatch(command: Command, mut config: Config) -> Result<u8> {
    match command {
        Command::Run {
            only,
            refresh,
            parallel,
            threads,
        } => {
            if !only.is_empty() {
                config.pipelines = Some(only);
            }
            if parallel {
                config.execution.mode = ExecutionMode::Parallel;
            }
            if threads.is_some() {
                config.execution.threads = threads;
            }
            config.validate()?;
            run(&config, refresh)
        }
        Command::Invalidate { events } => {
            let cache = ExtractionCache::new(&config.paths.raw_dir);
            for name in &events {
                let Some(p) = pipelines::find(name) else {
                    bail!("unknown event type '{name}'");
                };
                let removed = cache.invalidate(&p.event_type)?;
                println!("{name}: {}", if removed { "invalidated" } else { "not cached" });
            }
            Ok(0)
        }
        Command::List => {
            for p in pipelines::from_config(&config)? {
                let cached = ExtractionCache::new(&config.paths.raw_dir).is_cached(&p.event_type);
                println!(
                    "{:<10} {:<18} charts={} cached={cached}",
                    p.name(),
                    p.event_type.action,
                    p.charts.len()
                );
            }
            Ok(0)
        }
    }
}

fn run(config: &Config, refresh: bool) -> Result<u8> {
    let selected = pipelines::from_config(config)?;
    config.ensure_dirs()?;
    let ctx = RunContext::new(config, source(config)?);
    if refresh {
        for p in &selected {
            ctx.cache.invalidate(&p.event_type)?;
        }
    }
    info!(pipelines = selected.len(), "starting run");
    let summary = Runner::from_config(&config.execution)
        .execute(config, &ctx, &selected)
        .context("run")?;
    if let Some(path) = &summary.report_path {
        println!("report: {}", path.display());
    }
    for o in summary.failed() {
        println!("{}: {}", o.event_type.name, o.state);
    }
    Ok(if summary.all_reported() { 0 } else { 1 })
}

#[cfg(feature = "http-source")]
fn source(config: &Config) -> Result<Arc<dyn SourceClient>> {
    Ok(Arc::new(pixelbeam::source::HttpSourceClient::new(&config.api)))
}

#[cfg(not(feature = "http-source"))]
fn source(_config: &Config) -> Result<Arc<dyn SourceClient>> {
    bail!("built without the `http-source` feature; no source client available")
}
