//! # Pixelbeam
//!
//! A **batch ETL framework** for game event logs. Each run pulls one or more event
//! types from a remote event-log API, cleans them into flat training datasets and
//! writes a single self-contained HTML summary.
//!
//! ## Key Features
//!
//! - **Fixed lifecycle** - every event type goes extract → normalize → feature
//!   engineering → encode → persist → report, with per-stage error containment
//! - **Tolerant nested parsing** - JSON first, then a quote-inconsistent literal
//!   dialect, then an explicit unparseable marker; rows are never dropped
//! - **Idempotent caching** - at most one fetch per event type per process, raw
//!   artifacts reused across runs until explicitly invalidated
//! - **Deterministic encoding** - one-hot layout is a pure function of the column name
//!   and its sorted categories
//! - **Sequential and parallel execution** - one task per event type on a worker pool
//! - **Pluggable policies** - event types are values, not subclasses
//!
//! ## Quick Start
//!
//! ```no_run
//! use pixelbeam::config::Config;
//! use pixelbeam::context::RunContext;
//! use pixelbeam::pipelines;
//! use pixelbeam::runner::Runner;
//! use pixelbeam::source::HttpSourceClient;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::load(None)?;
//! config.ensure_dirs()?;
//! let source = Arc::new(HttpSourceClient::new(&config.api));
//! let ctx = RunContext::new(&config, source);
//! let summary = Runner::from_config(&config.execution)
//!     .execute(&config, &ctx, &pipelines::from_config(&config)?)?;
//! std::process::exit(summary.exit_code());
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Event pipelines
//!
//! An [`EventPipeline`] bundles what differs between event types: the upstream
//! action, the nested payload columns, a [`FeaturePolicy`](policy::FeaturePolicy), extra
//! categorical columns and chart specs. The ten built-ins live in [`pipelines`].
//!
//! ### Staged datasets
//!
//! [`Dataset<S>`](dataset::Dataset) tags a [`Table`] with the stage that produced it
//! (`Raw`, `Normalized`, `Featured`, `Encoded`). Only the [`engine`] advances a
//! dataset, so the stage order cannot be skipped.
//!
//! ### Run context
//!
//! A [`RunContext`] carries the cache, sink, source client, encoder, metrics and the
//! cancellation token. It is built once per run and passed explicitly; there is no
//! global state.
//!
//! ## Error handling
//!
//! Stage failures are typed ([`error`]) and contained: a failed event type ends in
//! `FAILED(stage)` while the others still reach `REPORTED`. Parse failures are
//! warnings, chart failures only drop that chart. The process exit status is 1 when
//! any event type failed.

pub mod cache;
pub mod config;
pub mod context;
pub mod dataset;
pub mod encode;
pub mod engine;
pub mod error;
pub mod io;
pub mod literal;
pub mod logging;
pub mod metrics;
pub mod normalize;
pub mod pipelines;
pub mod policy;
pub mod report;
pub mod runner;
pub mod sink;
pub mod source;
pub mod table;
pub mod testing;
pub mod value;

// General re-exports
pub use config::Config;
pub use context::{CancelToken, RunContext};
pub use dataset::{EventType, PersistedDataset};
pub use engine::{PipelineOutcome, RunState, Stage};
pub use policy::{EventPipeline, FeaturePolicy, FnPolicy};
pub use runner::{ExecMode, RunSummary, Runner};
pub use table::{EventRecord, Table};
pub use value::Value;

// Gated re-exports
#[cfg(feature = "http-source")]
pub use source::HttpSourceClient;
