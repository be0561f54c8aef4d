//! Stage 1: download each filing and save its text next to it.

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::{DisclosureDeps, ExtractError};
use crate::task::{StatsCollector, Task};

const ATTEMPT: &str = "/convert_report_to_text/attempt";
const SKIPPED: &str = "/convert_report_to_text/skipped";
const SUCCESS: &str = "/convert_report_to_text/success";
const FAILURE: &str = "/convert_report_to_text/failure";
const FAILED_DOWNLOAD: &str = "/convert_report_to_text/failed/download-error";
const FAILED_EXTRACT: &str = "/convert_report_to_text/failed/extract-error";
const FAILED_WRITE: &str = "/convert_report_to_text/failed/text-write-error";
const FAILED_LOOKUP: &str = "/convert_report_to_text/failed/repository-error";

/// Downloads every filing of the year that is not stored yet and converts
/// it to a text file for [`InterpretTask`](super::InterpretTask).
pub struct DownloadTask {
    deps: DisclosureDeps,
    year: Option<String>,
}

impl DownloadTask {
    pub fn new(deps: DisclosureDeps) -> Self {
        Self { deps, year: None }
    }

    /// Pin the filing year instead of using the current one.
    pub fn with_year(mut self, year: impl Into<String>) -> Self {
        self.year = Some(year.into());
        self
    }
}

#[async_trait::async_trait]
impl Task for DownloadTask {
    fn name(&self) -> &str {
        "DownloadTask"
    }

    async fn execute(&self) -> Result<StatsCollector> {
        let deps = &self.deps;
        let year = match &self.year {
            Some(year) => {
                deps.run_year.set(year.clone());
                year.clone()
            }
            None => deps.run_year.start(),
        };
        let mut stats = StatsCollector::new("DownloadTaskStats");

        let disclosures = deps
            .source
            .fetch_index(&year)
            .await
            .with_context(|| format!("fetching disclosure index for {}", year))?;
        info!(%year, count = disclosures.len(), "found disclosures in index");
        deps.layout
            .write_index(&year, &disclosures)
            .await
            .context("saving local copy of the index")?;

        let doc_dir = deps.layout.document_dir(&year);
        let text_dir = deps.layout.text_dir(&year);
        tokio::fs::create_dir_all(&text_dir)
            .await
            .with_context(|| format!("creating {}", text_dir.display()))?;

        for disclosure in &disclosures {
            let doc_id = disclosure.doc_id.as_str();
            stats.counter(ATTEMPT).increment();

            match deps.repository.report_exists(doc_id) {
                Ok(true) => {
                    info!(doc_id, "disclosure already stored, skipping");
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

            let text_path = deps.layout.text_path(&year, doc_id);
            if text_path.exists() {
                info!(doc_id, "text already extracted, skipping");
                stats.counter(SKIPPED).increment();
                continue;
            }

            let document = deps.source.download_document(disclosure, &doc_dir).await;
            deps.pacer.pause().await;
            let document = match document {
                Ok(path) => path,
                Err(e) => {
                    warn!(doc_id, "download failed: {:#}", e);
                    stats.counter(FAILED_DOWNLOAD).increment();
                    continue;
                }
            };

            info!(doc_id, path = %document.display(), "extracting text");
            let text = match deps.extractor.extract(&document).await {
                Ok(text) => text,
                Err(ExtractError::InvalidDocument(reason)) => {
                    warn!(doc_id, %reason, "document could not be read");
                    stats.counter(FAILURE).increment();
                    continue;
                }
                Err(ExtractError::Io(e)) => {
                    warn!(doc_id, "extraction failed: {}", e);
                    stats.counter(FAILED_EXTRACT).increment();
                    continue;
                }
                Err(e @ ExtractError::Unavailable(_)) => {
                    return Err(e).context("text extraction cannot run");
                }
            };

            match tokio::fs::write(&text_path, text).await {
                Ok(()) => {
                    stats.counter(SUCCESS).increment();
                }
                Err(e) => {
                    warn!(doc_id, path = %text_path.display(), "writing text failed: {}", e);
                    stats.counter(FAILED_WRITE).increment();
                }
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disclosure::fakes::*;
    use crate::disclosure::{DownloadLayout, RunYear, TextExtractor};
    use crate::task::Pacer;
    use std::path::Path;
    use std::sync::Arc;

    fn deps(source: FakeSource, repo: FakeRepository, root: &Path) -> DisclosureDeps {
        DisclosureDeps {
            source: Arc::new(source),
            extractor: Arc::new(FakeExtractor),
            interpreter: Arc::new(FakeInterpreter),
            repository: Arc::new(repo),
            layout: DownloadLayout::new(root),
            pacer: Pacer::none(),
            run_year: RunYear::default(),
        }
    }

    #[tokio::test]
    async fn test_classifies_every_item_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = FakeSource::with(vec![
            disclosure("1"),
            disclosure("2"),
            disclosure("3"),
            disclosure("4"),
        ]);
        source.fail_download.insert("3".into());
        source.contents.insert("4".into(), "CORRUPT pdf".into());
        let repo = FakeRepository::with_existing(&["2"]);

        let task = DownloadTask::new(deps(source, repo, dir.path())).with_year("2024");
        let stats = task.execute().await.unwrap().summarize();

        assert_eq!(stats.stat_collector_name, "DownloadTaskStats");
        assert_eq!(stats.get(ATTEMPT), Some(4));
        assert_eq!(stats.get(SUCCESS), Some(1));
        assert_eq!(stats.get(SKIPPED), Some(1));
        assert_eq!(stats.get(FAILED_DOWNLOAD), Some(1));
        assert_eq!(stats.get(FAILURE), Some(1));

        let text = std::fs::read_to_string(dir.path().join("2024/text/1.txt")).unwrap();
        assert_eq!(text, "text of 1");
        assert!(!dir.path().join("2024/text/4.txt").exists());
    }

    #[tokio::test]
    async fn test_pins_year_and_keeps_index_copy() {
        let dir = tempfile::tempdir().unwrap();
        let d = deps(
            FakeSource::with(vec![disclosure("1"), disclosure("2")]),
            FakeRepository::default(),
            dir.path(),
        );
        let run_year = d.run_year.clone();
        DownloadTask::new(d).with_year("2022").execute().await.unwrap();

        assert_eq!(run_year.current(), "2022");
        let layout = DownloadLayout::new(dir.path());
        let index = layout.read_index("2022").await.unwrap().unwrap();
        assert_eq!(index, vec![disclosure("1"), disclosure("2")]);
    }

    #[tokio::test]
    async fn test_repository_lookup_failure_is_counted() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FakeRepository {
            fail_lookups: true,
            ..Default::default()
        };
        let task = DownloadTask::new(deps(FakeSource::with(vec![disclosure("1")]), repo, dir.path()))
            .with_year("2024");
        let stats = task.execute().await.unwrap();
        assert_eq!(stats.value(FAILED_LOOKUP), Some(1));
        assert_eq!(stats.value(SUCCESS), None);
        assert!(!dir.path().join("2024/text/1.txt").exists());
    }

    #[tokio::test]
    async fn test_existing_text_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("2024/text")).unwrap();
        std::fs::write(dir.path().join("2024/text/7.txt"), "old").unwrap();

        let task = DownloadTask::new(deps(
            FakeSource::with(vec![disclosure("7")]),
            FakeRepository::default(),
            dir.path(),
        ))
        .with_year("2024");
        let stats = task.execute().await.unwrap();
        assert_eq!(stats.value(SKIPPED), Some(1));
        assert_eq!(stats.value(SUCCESS), None);
    }

    #[tokio::test]
    async fn test_unreachable_source_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let task = DownloadTask::new(deps(FakeSource::unreachable(), FakeRepository::default(), dir.path()))
            .with_year("2024");
        let err = task.execute().await.unwrap_err();
        assert!(format!("{:#}", err).contains("unreachable"));
    }

    struct MissingTool;

    #[async_trait::async_trait]
    impl TextExtractor for MissingTool {
        async fn extract(&self, _document: &Path) -> std::result::Result<String, ExtractError> {
            Err(ExtractError::Unavailable("pdftotext not found".into()))
        }
    }

    #[tokio::test]
    async fn test_unavailable_extractor_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = deps(
            FakeSource::with(vec![disclosure("1")]),
            FakeRepository::default(),
            dir.path(),
        );
        d.extractor = Arc::new(MissingTool);
        let err = DownloadTask::new(d).with_year("2024").execute().await.unwrap_err();
        assert!(format!("{:#}", err).contains("pdftotext not found"));
    }
}
