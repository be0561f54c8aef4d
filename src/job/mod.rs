//! Jobs -- named, cron-scheduled sequences of tasks.

pub mod report;

pub use self::report::RunReport;

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info};

use crate::task::Task;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("job {job}: task {task} failed: {source:#}")]
    TaskFailed {
        job: String,
        task: String,
        #[source]
        source: anyhow::Error,
    },
}

/// A named unit of scheduled work.
#[async_trait::async_trait]
pub trait Job: Send + Sync {
    /// Stable job name; the key used by the scheduler and history.
    fn name(&self) -> &str;

    /// Cron expression the job advertises at registration time.
    fn cron_schedule(&self) -> &str;

    /// Run the job to completion. A fatal task error aborts the run and
    /// no report is produced.
    async fn run(&self) -> Result<RunReport, JobError>;
}

/// Runs its tasks strictly in order; later tasks may consume what earlier
/// ones produced.
pub struct SequentialJob {
    name: String,
    cron_schedule: String,
    tasks: Vec<Arc<dyn Task>>,
}

impl SequentialJob {
    pub fn new(name: impl Into<String>, cron_schedule: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cron_schedule: cron_schedule.into(),
            tasks: Vec::new(),
        }
    }

    /// Append a task to the end of the sequence.
    pub fn with_task(mut self, task: Arc<dyn Task>) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.name())
    }
}

#[async_trait::async_trait]
impl Job for SequentialJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn cron_schedule(&self) -> &str {
        &self.cron_schedule
    }

    async fn run(&self) -> Result<RunReport, JobError> {
        let start_time = Utc::now();
        info!(job = %self.name, start = %start_time.to_rfc3339(), "job starting");

        let mut reports = Vec::with_capacity(self.tasks.len());
        for task in &self.tasks {
            info!(job = %self.name, task = %task.name(), "task starting");
            let stats = task.execute().await.map_err(|source| {
                error!(job = %self.name, task = %task.name(), "task failed: {:#}", source);
                JobError::TaskFailed {
                    job: self.name.clone(),
                    task: task.name().to_string(),
                    source,
                }
            })?;
            reports.push(stats.summarize());
        }

        let end_time = Utc::now();
        let report = RunReport::new(self.name.clone(), start_time, end_time, reports);
        info!(
            job = %self.name,
            run_id = %report.run_id,
            end = %end_time.to_rfc3339(),
            tasks = report.task_run_stat_reports.len(),
            "job finished"
        );
        Ok(report)
    }
}
