//! Stage 2: interpret each extracted filing and store its transactions.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::{Disclosure, DisclosureDeps};
use crate::task::{StatsCollector, Task};

const ATTEMPTS: &str = "/interpret_report/attempts";
const SKIPPED: &str = "/interpret_report/skipped";
const SUCCESS: &str = "/interpret_report/success";
const FAILED_NO_TEXT: &str = "/interpret_report/failed/no-text-file-for-report";
const FAILED_LLM: &str = "/interpret_report/failed/llm-response-error";
const FAILED_SAVE: &str = "/interpret_report/failed/transaction-save-error";
const FAILED_LOOKUP: &str = "/interpret_report/failed/repository-error";

/// Reads the text files written by [`DownloadTask`](super::DownloadTask),
/// runs them through the interpreter and persists the result.
pub struct InterpretTask {
    deps: DisclosureDeps,
    year: Option<String>,
}

impl InterpretTask {
    pub fn new(deps: DisclosureDeps) -> Self {
        Self { deps, year: None }
    }

    pub fn with_year(mut self, year: impl Into<String>) -> Self {
        self.year = Some(year.into());
        self
    }

    /// Prefer the copy left by the download stage; fetch only without one.
    async fn load_index(&self, year: &str) -> Result<Vec<Disclosure>> {
        if let Some(index) = self.deps.layout.read_index(year).await? {
            debug!(%year, count = index.len(), "using local index copy");
            return Ok(index);
        }
        self.deps
            .source
            .fetch_index(year)
            .await
            .with_context(|| format!("fetching disclosure index for {}", year))
    }
}

#[async_trait::async_trait]
impl Task for InterpretTask {
    fn name(&self) -> &str {
        "InterpretTask"
    }

    async fn execute(&self) -> Result<StatsCollector> {
        let deps = &self.deps;
        let year = self.year.clone().unwrap_or_else(|| deps.run_year.current());
        let mut stats = StatsCollector::new("InterpretTaskStats");

        let disclosures = self.load_index(&year).await?;

        for disclosure in &disclosures {
            let doc_id = disclosure.doc_id.as_str();
            info!(doc_id, "processing report");
            stats.counter(ATTEMPTS).increment();

            let text_path = deps.layout.text_path(&year, doc_id);
            let text = match tokio::fs::read_to_string(&text_path).await {
                Ok(text) => text,
                Err(_) => {
                    warn!(doc_id, path = %text_path.display(), "text file not found for report");
                    stats.counter(FAILED_NO_TEXT).increment();
                    continue;
                }
            };

            // A stored report already had its transactions processed.
            match deps.repository.report_exists(doc_id) {
                Ok(true) => {
                    info!(doc_id, "report already exists");
                    stats.counter(SKIPPED).increment();
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(doc_id, "repository lookup failed: {:#}", e);
                    stats.counter(FAILED_LOOKUP).increment();
                    continue;
                }
            }

            let transactions = deps.interpreter.interpret(&text).await;
            deps.pacer.pause().await;
            let transactions = match transactions {
                Ok(txs) => txs,
                Err(e) => {
                    warn!(doc_id, "could not interpret report: {:#}", e);
                    stats.counter(FAILED_LLM).increment();
                    continue;
                }
            };

            let report_id = match deps.repository.save_report(disclosure, &transactions) {
                Ok(id) => id,
                Err(e) => {
                    warn!(doc_id, "saving transactions failed: {:#}", e);
                    stats.counter(FAILED_SAVE).increment();
                    continue;
                }
            };

            info!(doc_id, %report_id, transactions = transactions.len(), "report stored");
            stats.counter(SUCCESS).increment();
        }

        Ok(stats)
    }
}
