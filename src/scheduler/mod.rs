//! Job scheduler -- cron triggers, on-demand runs, introspection.
//!
//! The job set is fixed when the [`Scheduler`] is built. Each job gets one
//! timer task once [`Scheduler::schedule_jobs`] is called; a job can also be
//! run on demand. Overlapping runs of the same job are rejected: an on-demand
//! call fails with [`SchedulerError::AlreadyRunning`] and a timer fire is
//! skipped.

pub mod cron;
mod engine;
pub mod history;

pub use self::cron::{CronError, CronExpr, Countdown};
pub use self::history::{RunHistoryStore, DEFAULT_RETENTION};

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::job::{Job, JobError, RunReport};

/// Longest dry-run window, one leap year.
pub const MAX_PREVIEW_HOURS: u64 = 366 * 24;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job '{0}' not found")]
    JobNotFound(String),

    #[error("job '{0}' is already running")]
    AlreadyRunning(String),

    #[error("job name '{0}' registered twice")]
    DuplicateJob(String),

    #[error(transparent)]
    Cron(#[from] CronError),

    #[error(transparent)]
    Job(#[from] JobError),
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Scheduled,
    OnDemand,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Scheduled => write!(f, "scheduled"),
            Trigger::OnDemand => write!(f, "on-demand"),
        }
    }
}

/// Schedule state of one job, as reported to callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJobInfo {
    pub job_name: String,
    pub cron_schedule: String,
    pub next_run: DateTime<Utc>,
    pub message: String,
    pub countdown: Countdown,
    pub running: bool,
}

/// One upcoming fire in a dry-run preview.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingRun {
    pub at: DateTime<Utc>,
    pub job_name: String,
    pub cron_schedule: String,
}

/// A live cron registration.
pub struct ScheduledJobHandle {
    pub job_name: String,
    pub cron_schedule: String,
    timer: JoinHandle<()>,
}

impl ScheduledJobHandle {
    fn cancel(&self) {
        self.timer.abort();
    }
}

struct RegisteredJob {
    job: Arc<dyn Job>,
    cron: CronExpr,
    running: Arc<AtomicBool>,
}

/// Clears the job's running flag when dropped.
struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl RunGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub(crate) struct SchedulerInner {
    jobs: HashMap<String, RegisteredJob>,
    handles: Mutex<HashMap<String, ScheduledJobHandle>>,
    history: RunHistoryStore,
}

/// Owns the job set, its timers and its run history. Cheap to clone.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Build a scheduler over a fixed job set. Every cron expression is
    /// parsed up front.
    pub fn new(jobs: Vec<Arc<dyn Job>>, retention: usize) -> Result<Self, SchedulerError> {
        let mut registered = HashMap::with_capacity(jobs.len());
        for job in jobs {
            let name = job.name().to_string();
            let cron = CronExpr::parse(job.cron_schedule())?;
            if registered.contains_key(&name) {
                return Err(SchedulerError::DuplicateJob(name));
            }
            registered.insert(
                name,
                RegisteredJob {
                    job,
                    cron,
                    running: Arc::new(AtomicBool::new(false)),
                },
            );
        }

        Ok(Self {
            inner: Arc::new(SchedulerInner {
                jobs: registered,
                handles: Mutex::new(HashMap::new()),
                history: RunHistoryStore::new(retention),
            }),
        })
    }

    /// Names of every known job, sorted.
    pub fn job_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.jobs.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_running(&self, job_name: &str) -> bool {
        self.inner
            .jobs
            .get(job_name)
            .is_some_and(|j| j.running.load(Ordering::Acquire))
    }

    /// Start one timer per job. Re-scheduling a job replaces its previous
    /// timer. Returns the number of jobs scheduled.
    pub async fn schedule_jobs(&self) -> usize {
        let mut handles = self.inner.handles.lock().await;
        for name in self.job_names() {
            let entry = &self.inner.jobs[&name];
            info!(job = %name, cron = %entry.cron, "scheduling job");

            let timer = engine::spawn_timer(Arc::downgrade(&self.inner), name.clone(), entry.cron.clone());
            let handle = ScheduledJobHandle {
                job_name: name.clone(),
                cron_schedule: entry.cron.to_string(),
                timer,
            };
            if let Some(previous) = handles.insert(name.clone(), handle) {
                previous.cancel();
                info!(job = %name, "replaced previous schedule");
            }
        }
        handles.len()
    }

    /// Stop every timer. In-flight runs are not interrupted.
    pub async fn shutdown(&self) {
        let mut handles = self.inner.handles.lock().await;
        for (name, handle) in handles.drain() {
            handle.cancel();
            info!(job = %name, "unscheduled job");
        }
    }

    /// Run a job now, independent of its timer, and record its report.
    pub async fn execute_job_now(&self, job_name: &str) -> Result<RunReport, SchedulerError> {
        let guard = self.inner.claim(job_name)?;
        self.inner.run_claimed(job_name, guard, Trigger::OnDemand).await
    }

    /// Start a job in the background and return as soon as it is claimed.
    /// The report only shows up later in the run history.
    pub fn trigger_job(&self, job_name: &str) -> Result<(), SchedulerError> {
        let guard = self.inner.claim(job_name)?;
        let inner = self.inner.clone();
        let name = job_name.to_string();
        tokio::spawn(async move {
            // Failures are logged inside run_claimed.
            let _ = inner.run_claimed(&name, guard, Trigger::OnDemand).await;
        });
        Ok(())
    }

    pub async fn scheduled_job_info(&self, job_name: &str) -> Result<ScheduledJobInfo, SchedulerError> {
        self.scheduled_job_info_at(job_name, Utc::now()).await
    }

    /// Next fire time and countdown relative to `now`. Only jobs with a
    /// live timer are known here.
    pub async fn scheduled_job_info_at(
        &self,
        job_name: &str,
        now: DateTime<Utc>,
    ) -> Result<ScheduledJobInfo, SchedulerError> {
        let cron_schedule = {
            let handles = self.inner.handles.lock().await;
            match handles.get(job_name) {
                Some(handle) => handle.cron_schedule.clone(),
                None => return Err(SchedulerError::JobNotFound(job_name.to_string())),
            }
        };
        let entry = self
            .inner
            .jobs
            .get(job_name)
            .ok_or_else(|| SchedulerError::JobNotFound(job_name.to_string()))?;

        let next_run = entry.cron.next_after(&now)?;
        let countdown = Countdown::between(&now, &next_run);
        Ok(ScheduledJobInfo {
            job_name: job_name.to_string(),
            cron_schedule,
            next_run,
            message: countdown.to_string(),
            countdown,
            running: entry.running.load(Ordering::Acquire),
        })
    }

    /// Every fire of every job within the next `hours`, in time order.
    /// The window is capped at [`MAX_PREVIEW_HOURS`].
    pub fn preview_next_runs(&self, hours: u64) -> Vec<UpcomingRun> {
        let now = Utc::now();
        let hours = hours.min(MAX_PREVIEW_HOURS);
        self.preview_next_runs_at(now, now + chrono::Duration::hours(hours as i64))
    }

    pub fn preview_next_runs_at(&self, now: DateTime<Utc>, end: DateTime<Utc>) -> Vec<UpcomingRun> {
        let mut preview: Vec<UpcomingRun> = self
            .inner
            .jobs
            .iter()
            .flat_map(|(name, entry)| {
                entry
                    .cron
                    .fires_between(&now, &end)
                    .into_iter()
                    .map(move |at| UpcomingRun {
                        at,
                        job_name: name.clone(),
                        cron_schedule: entry.cron.to_string(),
                    })
            })
            .collect();
        preview.sort_by(|a, b| a.at.cmp(&b.at).then_with(|| a.job_name.cmp(&b.job_name)));
        preview
    }

    /// Retained runs for one job, newest first. Unknown names yield an
    /// empty list.
    pub async fn job_run_history(&self, job_name: &str) -> Vec<RunReport> {
        self.inner.history.history(job_name).await
    }

    pub async fn all_job_run_history(&self) -> HashMap<String, Vec<RunReport>> {
        self.inner.history.all_histories().await
    }
}

impl SchedulerInner {
    fn claim(&self, job_name: &str) -> Result<RunGuard, SchedulerError> {
        let entry = self
            .jobs
            .get(job_name)
            .ok_or_else(|| SchedulerError::JobNotFound(job_name.to_string()))?;
        RunGuard::acquire(&entry.running)
            .ok_or_else(|| SchedulerError::AlreadyRunning(job_name.to_string()))
    }

    /// Timer entry point: a fire that lands while the job is still running
    /// is skipped.
    pub(crate) async fn fire(&self, job_name: &str) {
        match self.claim(job_name) {
            Ok(guard) => {
                let _ = self.run_claimed(job_name, guard, Trigger::Scheduled).await;
            }
            Err(e) => warn!(job = %job_name, "skipping scheduled run: {}", e),
        }
    }

    async fn run_claimed(
        &self,
        job_name: &str,
        _guard: RunGuard,
        trigger: Trigger,
    ) -> Result<RunReport, SchedulerError> {
        let entry = self
            .jobs
            .get(job_name)
            .ok_or_else(|| SchedulerError::JobNotFound(job_name.to_string()))?;

        info!(job = %job_name, %trigger, "executing job");
        match entry.job.run().await {
            Ok(report) => {
                self.history.add(job_name, report.clone()).await;
                Ok(report)
            }
            Err(e) => {
                error!(job = %job_name, %trigger, "job run aborted, no report recorded: {}", e);
                Err(e.into())
            }
        }
    }
}
