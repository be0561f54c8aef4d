//! Task contract -- one stage of work inside a job.
//!
//! A task walks its own unit of work and classifies every item into exactly
//! one counter of its [`StatsCollector`]. Item failures are recorded and the
//! walk continues; `execute` only returns `Err` when going on is meaningless
//! (e.g. the remote source cannot be reached at all).

pub mod pacing;
pub mod stats;

pub use self::pacing::Pacer;
pub use self::stats::{StatCounter, StatEntry, StatsCollector, StatsReport};

use anyhow::Result;

/// A single stage of a job.
#[async_trait::async_trait]
pub trait Task: Send + Sync {
    /// Stable task name, used in logs and error reports.
    fn name(&self) -> &str;

    /// Run the stage to completion and hand back its counters.
    async fn execute(&self) -> Result<StatsCollector>;
}
