//! PDF text extraction through the poppler `pdftotext` binary.

use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use super::{ExtractError, TextExtractor};

/// Runs `pdftotext -layout <file> -` and returns its stdout.
pub struct PdfToTextExtractor {
    program: String,
}

impl PdfToTextExtractor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Quick PATH check, used for the startup warning.
    pub fn is_available(&self) -> bool {
        std::process::Command::new(&self.program).arg("-v").output().is_ok()
    }
}

impl Default for PdfToTextExtractor {
    fn default() -> Self {
        Self::new("pdftotext")
    }
}

#[async_trait::async_trait]
impl TextExtractor for PdfToTextExtractor {
    async fn extract(&self, document: &Path) -> Result<String, ExtractError> {
        debug!(program = %self.program, document = %document.display(), "running text extractor");

        let output = tokio::process::Command::new(&self.program)
            .arg("-layout")
            .arg(document)
            .arg("-")
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                    ExtractError::Unavailable(format!("{}: {}", self.program, e))
                }
                _ => ExtractError::Io(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(classify_failure(&stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// pdftotext reports broken files on stderr and exits with 1; anything
/// else is treated as an I/O problem with the file.
fn classify_failure(stderr: &str) -> ExtractError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("syntax error")
        || lower.contains("couldn't read xref")
        || lower.contains("may not be a pdf")
        || lower.contains("damaged")
    {
        ExtractError::InvalidDocument(stderr.to_string())
    } else {
        ExtractError::Io(std::io::Error::other(format!("pdftotext failed: {}", stderr)))
    }
}
