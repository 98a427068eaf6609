//! Testing utilities for pixelbeam pipelines.
//!
//! - **Mock source**: [`MockSource`] serves canned records and counts fetches
//! - **Workspace**: [`TestWorkspace`] roots every output directory in a temp dir
//! - **Fixtures**: [`record!`](crate::record) plus canned event records per event type
//! - **Assertions**: table-level checks with readable failure messages
//!
//! # Quick Start
//!
//! ```no_run
//! use pixelbeam::pipelines;
//! use pixelbeam::runner::Runner;
//! use pixelbeam::testing::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let ws = TestWorkspace::new()?;
//! let source = MockSource::new().with_records("BATTLE_END", battle_records(10));
//! let ctx = ws.context(source);
//! let summary = Runner::default().execute(ws.config(), &ctx, &[pipelines::battles::pipeline()])?;
//! assert_eq!(summary.exit_code(), 0);
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod fixtures;
pub mod mock_source;

pub use assertions::*;
pub use fixtures::*;
pub use mock_source::*;
