//! Run report -- the immutable record of one job execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::StatsReport;

/// Outcome of one successful [`Job::run`](super::Job::run).
///
/// `task_run_stat_reports` holds one entry per task, in invocation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub job_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub task_run_stat_reports: Vec<StatsReport>,
}

impl RunReport {
    pub fn new(
        job_name: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        task_run_stat_reports: Vec<StatsReport>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            job_name: job_name.into(),
            start_time,
            end_time,
            task_run_stat_reports,
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }
}
