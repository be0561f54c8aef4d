//! Per-task run statistics: named counters and their immutable summary.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// A single named tally within a task run. The value may go negative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatCounter {
    key: String,
    value: i64,
}

impl StatCounter {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            value: 0,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn increment(&mut self) -> &mut Self {
        self.increment_by(1)
    }

    pub fn increment_by(&mut self, n: i64) -> &mut Self {
        self.value += n;
        self
    }

    pub fn decrement(&mut self) -> &mut Self {
        self.decrement_by(1)
    }

    pub fn decrement_by(&mut self, n: i64) -> &mut Self {
        self.value -= n;
        self
    }

    pub fn set(&mut self, n: i64) -> &mut Self {
        self.value = n;
        self
    }

    pub fn snapshot(&self) -> StatEntry {
        StatEntry {
            key: self.key.clone(),
            value: self.value,
        }
    }
}

/// One `(key, value)` pair of a [`StatsReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatEntry {
    pub key: String,
    pub value: i64,
}

/// Frozen snapshot of a [`StatsCollector`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    pub stat_collector_name: String,
    pub stats: Vec<StatEntry>,
}

impl StatsReport {
    /// Look up a stat value by key.
    pub fn get(&self, key: &str) -> Option<i64> {
        self.stats.iter().find(|s| s.key == key).map(|s| s.value)
    }
}

/// Keyed registry of counters scoped to one task execution.
///
/// Counters are created lazily on first reference and kept in insertion
/// order so that summaries read the way the task produced them.
#[derive(Debug, Clone)]
pub struct StatsCollector {
    name: String,
    counters: Vec<StatCounter>,
    index: HashMap<String, usize>,
}

impl StatsCollector {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            counters: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Return the counter for `key`, creating it at zero if absent.
    pub fn counter(&mut self, key: &str) -> &mut StatCounter {
        let idx = match self.index.get(key) {
            Some(&idx) => idx,
            None => {
                self.counters.push(StatCounter::new(key));
                let idx = self.counters.len() - 1;
                self.index.insert(key.to_string(), idx);
                idx
            }
        };
        &mut self.counters[idx]
    }

    /// Current value of `key` without creating it.
    pub fn value(&self, key: &str) -> Option<i64> {
        self.index.get(key).map(|&idx| self.counters[idx].value())
    }

    /// Delete a counter. Unknown keys are logged and ignored.
    pub fn remove(&mut self, key: &str) {
        let Some(idx) = self.index.remove(key) else {
            warn!(collector = %self.name, key, "stat key does not exist, cannot remove");
            return;
        };
        self.counters.remove(idx);
        for slot in self.index.values_mut() {
            if *slot > idx {
                *slot -= 1;
            }
        }
    }

    pub fn summarize(&self) -> StatsReport {
        StatsReport {
            stat_collector_name: self.name.clone(),
            stats: self.counters.iter().map(StatCounter::snapshot).collect(),
        }
    }
}
