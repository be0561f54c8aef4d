//! Financial-disclosure pipeline: download filings, extract their text,
//! interpret the transactions and store them.
//!
//! The job is two tasks run in order. [`DownloadTask`] writes one text file
//! per filing; [`InterpretTask`] reads those files back. Every outside
//! dependency sits behind one of the traits below.

pub mod download_task;
pub mod extract;
pub mod interpret;
pub mod interpret_task;
pub mod source;

pub use self::download_task::DownloadTask;
pub use self::extract::PdfToTextExtractor;
pub use self::interpret::OpenAiInterpreter;
pub use self::interpret_task::InterpretTask;
pub use self::source::HttpDisclosureSource;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::SequentialJob;
use crate::task::Pacer;

/// Name the disclosure job is registered under.
pub const JOB_NAME: &str = "financial-disclosure-webscrape";

/// One row of the yearly filing index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disclosure {
    pub prefix: Option<String>,
    pub last: String,
    pub first: String,
    pub suffix: Option<String>,
    pub filing_type: String,
    pub state_district: String,
    pub year: String,
    pub filing_date: String,
    pub doc_id: String,
}

impl Disclosure {
    pub fn full_title(&self) -> String {
        [
            self.prefix.as_deref(),
            Some(self.first.as_str()),
            Some(self.last.as_str()),
            self.suffix.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// A single trade extracted from a filing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub asset: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub date: String,
    pub notification_date: String,
    pub amount: String,
    #[serde(default)]
    pub capital_gains: bool,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    /// The index could not be fetched at all. Fatal for the task.
    #[error("disclosure source unreachable: {0}")]
    Unreachable(String),

    #[error("malformed disclosure index: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum ExtractError {
    /// The document is not a readable PDF. Counted as an item failure.
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),

    /// The extractor itself cannot run. Fatal for the task.
    #[error("text extractor unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Where filings come from.
#[async_trait::async_trait]
pub trait DisclosureSource: Send + Sync {
    async fn fetch_index(&self, year: &str) -> Result<Vec<Disclosure>, SourceError>;

    /// Download the filing's document into `dest_dir`, returning its path.
    async fn download_document(&self, disclosure: &Disclosure, dest_dir: &Path) -> Result<PathBuf>;
}

/// Turns a downloaded document into plain text.
#[async_trait::async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, document: &Path) -> Result<String, ExtractError>;
}

/// Structured extraction of transactions from filing text.
#[async_trait::async_trait]
pub trait TransactionInterpreter: Send + Sync {
    async fn interpret(&self, text: &str) -> Result<Vec<Transaction>>;
}

/// Persistence for parsed filings.
pub trait DisclosureRepository: Send + Sync {
    fn report_exists(&self, doc_id: &str) -> Result<bool>;

    /// Store the filing, its filer and its transactions in one go;
    /// returns the report id. Nothing is stored on error.
    fn save_report(&self, disclosure: &Disclosure, transactions: &[Transaction]) -> Result<String>;
}

/// Directory layout shared by both tasks.
#[derive(Debug, Clone)]
pub struct DownloadLayout {
    root: PathBuf,
}

impl DownloadLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn document_dir(&self, year: &str) -> PathBuf {
        self.root.join(year).join("pdf")
    }

    pub fn text_dir(&self, year: &str) -> PathBuf {
        self.root.join(year).join("text")
    }

    pub fn text_path(&self, year: &str, doc_id: &str) -> PathBuf {
        self.text_dir(year).join(format!("{}.txt", doc_id))
    }

    /// Local copy of the year's index, written by the download stage.
    pub fn index_path(&self, year: &str) -> PathBuf {
        self.root.join(year).join("index.json")
    }

    pub async fn write_index(&self, year: &str, disclosures: &[Disclosure]) -> Result<()> {
        let path = self.index_path(year);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let json = serde_json::to_vec_pretty(disclosures)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("writing {}", path.display()))
    }

    /// `None` when no local copy exists yet.
    pub async fn read_index(&self, year: &str) -> Result<Option<Vec<Disclosure>>> {
        let path = self.index_path(year);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        let disclosures = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(disclosures))
    }
}

/// Filing year shared by the stages of one job run, so a run that crosses
/// New Year stays on one year. The first stage picks it, later stages
/// reuse it.
#[derive(Debug, Clone, Default)]
pub struct RunYear(Arc<Mutex<Option<String>>>);

impl RunYear {
    /// Pin the current calendar year for a new run and return it.
    pub fn start(&self) -> String {
        let year = current_year();
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = Some(year.clone());
        year
    }

    /// Year picked by the running job, or the calendar year if no run
    /// started one.
    pub fn current(&self) -> String {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .unwrap_or_else(current_year)
    }

    pub fn set(&self, year: impl Into<String>) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = Some(year.into());
    }
}

/// Collaborators shared by the two disclosure tasks.
#[derive(Clone)]
pub struct DisclosureDeps {
    pub source: Arc<dyn DisclosureSource>,
    pub extractor: Arc<dyn TextExtractor>,
    pub interpreter: Arc<dyn TransactionInterpreter>,
    pub repository: Arc<dyn DisclosureRepository>,
    pub layout: DownloadLayout,
    pub pacer: Pacer,
    pub run_year: RunYear,
}

/// Compose the download and interpret tasks into the disclosure job.
pub fn build_job(cron_schedule: &str, deps: DisclosureDeps) -> SequentialJob {
    SequentialJob::new(JOB_NAME, cron_schedule)
        .with_task(Arc::new(DownloadTask::new(deps.clone())))
        .with_task(Arc::new(InterpretTask::new(deps)))
}

/// Current calendar year, as the index expects it.
pub(crate) fn current_year() -> String {
    use chrono::Datelike;
    chrono::Utc::now().year().to_string()
}
