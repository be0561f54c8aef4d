use std::sync::Weak;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{CronExpr, SchedulerInner};

/// Spawn the timer task for one job.
///
/// The timer sleeps until the next cron fire, then hands the run to its
/// own task so that a slow run never delays the following fire. It holds
/// only a weak reference to the scheduler and exits once the scheduler is
/// gone.
pub(super) fn spawn_timer(scheduler: Weak<SchedulerInner>, job_name: String, cron: CronExpr) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(job = %job_name, cron = %cron, "timer started");
        let mut last_fire: Option<chrono::DateTime<Utc>> = None;
        loop {
            let now = Utc::now();
            // Never re-arm for a fire that already happened, even if the
            // sleep woke up a little early.
            let from = last_fire.map_or(now, |last| now.max(last));
            let next = match cron.next_after(&from) {
                Ok(next) => next,
                Err(e) => {
                    warn!(job = %job_name, "timer stopped: {}", e);
                    return;
                }
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            debug!(job = %job_name, next = %next.to_rfc3339(), wait_secs = wait.as_secs(), "timer armed");
            tokio::time::sleep(wait).await;
            last_fire = Some(next);

            let Some(inner) = scheduler.upgrade() else {
                debug!(job = %job_name, "scheduler dropped, timer exiting");
                return;
            };
            let name = job_name.clone();
            tokio::spawn(async move {
                inner.fire(&name).await;
            });
        }
    })
}
