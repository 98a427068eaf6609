//! Orchestrator: one [`engine::run`] per event type, then the consolidated report.

use crate::config::{Config, ExecutionConfig, ExecutionMode};
use crate::context::RunContext;
use crate::engine::{self, PipelineOutcome};
use crate::policy::EventPipeline;
use crate::report::Report;
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::path::PathBuf;
use tracing::{info, warn};

/// Title of the consolidated report.
pub const REPORT_TITLE: &str = "Pixelmon AI Training Report";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecMode {
    Sequential,
    /// One task per event type on a dedicated pool; logical CPUs when `threads` is `None`.
    Parallel { threads: Option<usize> },
}

#[derive(Clone, Copy, Debug)]
pub struct Runner {
    pub mode: ExecMode,
}

impl Default for Runner {
    fn default() -> Self {
        Self {
            mode: ExecMode::Sequential,
        }
    }
}

impl Runner {
    #[must_use]
    pub const fn new(mode: ExecMode) -> Self {
        Self { mode }
    }

    #[must_use]
    pub const fn from_config(execution: &ExecutionConfig) -> Self {
        let mode = match execution.mode {
            ExecutionMode::Sequential => ExecMode::Sequential,
            ExecutionMode::Parallel => ExecMode::Parallel {
                threads: execution.threads,
            },
        };
        Self { mode }
    }

    /// Run every pipeline to a terminal state. Outcomes come back in `pipelines` order
    /// whatever the execution mode.
    ///
    /// # Errors
    /// Only if the worker pool cannot be built; pipeline failures are recorded on the
    /// outcomes.
    pub fn run_all(&self, ctx: &RunContext, pipelines: &[EventPipeline]) -> Result<Vec<PipelineOutcome>> {
        ctx.metrics.record_start();
        let outcomes: Vec<PipelineOutcome> = match self.mode {
            ExecMode::Sequential => pipelines.iter().map(|p| engine::run(ctx, p)).collect(),
            ExecMode::Parallel { threads } => {
                let threads = threads.unwrap_or_else(num_cpus::get).max(1);
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("pixelbeam-worker-{i}"))
                    .build()
                    .context("build worker pool")?;
                info!(threads, pipelines = pipelines.len(), "running in parallel");
                pool.install(|| pipelines.par_iter().map(|p| engine::run(ctx, p)).collect())
            }
        };
        ctx.metrics.record_end();
        Ok(outcomes)
    }

    /// Run `pipelines`, write the report and the metrics file.
    ///
    /// The report is written even when some event types failed; they show up in its
    /// status table.
    ///
    /// # Errors
    /// Worker pool, report or metrics I/O failures.
    pub fn execute(&self, config: &Config, ctx: &RunContext, pipelines: &[EventPipeline]) -> Result<RunSummary> {
        let outcomes = self.run_all(ctx, pipelines)?;
        let report = Report::new(REPORT_TITLE, outcomes.iter().map(PipelineOutcome::to_section).collect());
        let report_path = config.paths.report_path.clone();
        report.write_html(&report_path)?;

        let metrics_path = config.metrics_path();
        ctx.metrics.save_to_file(&metrics_path)?;
        ctx.metrics.log_summary();

        let summary = RunSummary {
            outcomes,
            report_path: Some(report_path),
            metrics_path: Some(metrics_path),
        };
        summary.log();
        Ok(summary)
    }
}

/// Per-event-type statuses of one run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<PipelineOutcome>,
    pub report_path: Option<PathBuf>,
    pub metrics_path: Option<PathBuf>,
}

impl RunSummary {
    #[must_use]
    pub fn failed(&self) -> Vec<&PipelineOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed()).collect()
    }

    #[must_use]
    pub fn all_reported(&self) -> bool {
        self.outcomes.iter().all(|o| !o.is_failed())
    }

    /// Process exit status: 0 when every event type reported, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.all_reported())
    }

    #[must_use]
    pub fn outcome(&self, name: &str) -> Option<&PipelineOutcome> {
        self.outcomes.iter().find(|o| o.event_type.name == name)
    }

    pub fn log(&self) {
        for o in &self.outcomes {
            match &o.error {
                None => info!(event_type = %o.event_type.name, state = %o.state, rows = o.rows().unwrap_or(0), "status"),
                Some(e) => warn!(event_type = %o.event_type.name, state = %o.state, error = format!("{e:#}"), "status"),
            }
        }
        let failed = self.failed().len();
        info!(total = self.outcomes.len(), failed, "run complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_follows_config() {
        let seq = Runner::from_config(&ExecutionConfig::default());
        assert_eq!(seq.mode, ExecMode::Sequential);
        let par = Runner::from_config(&ExecutionConfig {
            mode: ExecutionMode::Parallel,
            threads: Some(3),
        });
        assert_eq!(par.mode, ExecMode::Parallel { threads: Some(3) });
    }

    #[test]
    fn empty_summary_exits_zero() {
        let s = RunSummary::default();
        assert!(s.all_reported());
        assert_eq!(s.exit_code(), 0);
    }
}
