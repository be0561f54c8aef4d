//! HTTP disclosure source: yearly tab-separated index plus one document
//! per filing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use super::{Disclosure, DisclosureSource, SourceError};

/// Fetches the clerk's yearly index and filing documents over HTTP.
pub struct HttpDisclosureSource {
    client: reqwest::Client,
    index_url: String,
    document_url: String,
}

impl HttpDisclosureSource {
    /// `index_url` may contain `{year}`; `document_url` may contain
    /// `{year}` and `{doc_id}`.
    pub fn new(index_url: &str, document_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("jobwarden/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            index_url: index_url.to_string(),
            document_url: document_url.to_string(),
        })
    }

    fn index_url(&self, year: &str) -> String {
        self.index_url.replace("{year}", year)
    }

    fn document_url(&self, d: &Disclosure) -> String {
        self.document_url
            .replace("{year}", &d.year)
            .replace("{doc_id}", &d.doc_id)
    }
}

#[async_trait::async_trait]
impl DisclosureSource for HttpDisclosureSource {
    async fn fetch_index(&self, year: &str) -> Result<Vec<Disclosure>, SourceError> {
        let url = self.index_url(year);
        info!(%url, "downloading disclosure index");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SourceError::Unreachable(format!("{}: {}", url, e)))?;
        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Unreachable(format!("{}: {}", url, e)))?;
        parse_index(&body)
    }

    async fn download_document(&self, d: &Disclosure, dest_dir: &Path) -> Result<PathBuf> {
        let url = self.document_url(d);
        info!(doc_id = %d.doc_id, filer = %d.full_title(), %url, "downloading filing");
        let bytes = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("GET {}", url))?
            .bytes()
            .await
            .with_context(|| format!("reading body of {}", url))?;

        tokio::fs::create_dir_all(dest_dir)
            .await
            .with_context(|| format!("creating {}", dest_dir.display()))?;
        let path = dest_dir.join(format!("{}.pdf", d.doc_id));
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }
}

/// Parse the tab-separated index. The header row names the columns;
/// rows with too few cells or no document id are dropped.
pub fn parse_index(body: &str) -> Result<Vec<Disclosure>, SourceError> {
    let mut lines = body.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<&str> = lines
        .next()
        .ok_or_else(|| SourceError::Malformed("empty index".to_string()))?
        .split('\t')
        .map(str::trim)
        .collect();

    let column = |name: &str| {
        header
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| SourceError::Malformed(format!("missing column {}", name)))
    };
    let prefix = column("Prefix").ok();
    let suffix = column("Suffix").ok();
    let last = column("Last")?;
    let first = column("First")?;
    let filing_type = column("FilingType")?;
    let state = column("StateDst")?;
    let year = column("Year")?;
    let filing_date = column("FilingDate")?;
    let doc_id = column("DocID")?;

    let mut out = Vec::new();
    for line in lines {
        let cells: Vec<&str> = line.split('\t').map(str::trim).collect();
        let cell = |idx: usize| cells.get(idx).copied().unwrap_or_default().to_string();
        let optional = |idx: Option<usize>| idx.map(cell).filter(|s| !s.is_empty());

        let id = cell(doc_id);
        if id.is_empty() {
            continue;
        }
        out.push(Disclosure {
            prefix: optional(prefix),
            last: cell(last),
            first: cell(first),
            suffix: optional(suffix),
            filing_type: cell(filing_type),
            state_district: cell(state),
            year: cell(year),
            filing_date: cell(filing_date),
            doc_id: id,
        });
    }
    Ok(out)
}
