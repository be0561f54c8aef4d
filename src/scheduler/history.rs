//! Bounded, time-ordered run history per job.
//!
//! Runs can finish out of submission order (an on-demand run may overlap a
//! scheduled one), so every insertion re-sorts before truncating.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::info;

use crate::job::RunReport;

/// Default number of reports kept per job.
pub const DEFAULT_RETENTION: usize = 30;

/// In-memory run history, newest first, capped per job name.
///
/// Lives for the lifetime of the process.
pub struct RunHistoryStore {
    retention: usize,
    runs: RwLock<HashMap<String, Vec<RunReport>>>,
}

impl RunHistoryStore {
    pub fn new(retention: usize) -> Self {
        Self {
            retention,
            runs: RwLock::new(HashMap::new()),
        }
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Insert a report, re-sort descending by start time, then evict the
    /// oldest entries beyond the retention cap.
    pub async fn add(&self, job_name: &str, report: RunReport) {
        let mut runs = self.runs.write().await;
        let history = runs.entry(job_name.to_string()).or_default();
        history.push(report);
        history.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        history.truncate(self.retention);
        info!(job = %job_name, retained = history.len(), "recorded run report");
    }

    /// Retained runs for `job_name`, newest first. Unknown jobs yield an
    /// empty list.
    pub async fn history(&self, job_name: &str) -> Vec<RunReport> {
        self.runs
            .read()
            .await
            .get(job_name)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn all_histories(&self) -> HashMap<String, Vec<RunReport>> {
        self.runs.read().await.clone()
    }
}

impl Default for RunHistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(n)
    }

    fn report(start: DateTime<Utc>) -> RunReport {
        RunReport::new("job", start, start + Duration::minutes(5), Vec::new())
    }

    fn starts(runs: &[RunReport]) -> Vec<DateTime<Utc>> {
        runs.iter().map(|r| r.start_time).collect()
    }

    #[tokio::test]
    async fn test_resort_then_truncate() {
        let store = RunHistoryStore::new(3);
        for n in [2, 1, 4, 3] {
            store.add("job", report(t(n))).await;
        }
        assert_eq!(starts(&store.history("job").await), vec![t(4), t(3), t(2)]);
    }

    #[tokio::test]
    async fn test_length_is_min_of_inserts_and_cap() {
        for inserts in [0usize, 1, 5, 30, 31, 45] {
            let store = RunHistoryStore::default();
            // Interleave old and new start times.
            for i in 0..inserts {
                let n = if i % 2 == 0 { i as i64 } else { -(i as i64) };
                store.add("job", report(t(n))).await;
            }
            let history = store.history("job").await;
            assert_eq!(history.len(), inserts.min(DEFAULT_RETENTION));
            assert!(history.windows(2).all(|w| w[0].start_time > w[1].start_time));
        }
    }

    #[tokio::test]
    async fn test_older_insert_does_not_evict_newer() {
        let store = RunHistoryStore::new(2);
        store.add("job", report(t(10))).await;
        store.add("job", report(t(20))).await;
        store.add("job", report(t(1))).await;
        assert_eq!(starts(&store.history("job").await), vec![t(20), t(10)]);
    }

    #[tokio::test]
    async fn test_unknown_job_is_empty() {
        let store = RunHistoryStore::default();
        assert!(store.history("unknown-job").await.is_empty());
        assert!(store.all_histories().await.is_empty());
    }

    #[tokio::test]
    async fn test_histories_are_per_job() {
        let store = RunHistoryStore::new(1);
        store.add("a", report(t(1))).await;
        store.add("b", report(t(2))).await;
        store.add("b", report(t(3))).await;

        let all = store.all_histories().await;
        assert_eq!(all.len(), 2);
        assert_eq!(starts(&all["a"]), vec![t(1)]);
        assert_eq!(starts(&all["b"]), vec![t(3)]);
    }
}
