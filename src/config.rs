//! TOML configuration for jobwarden.
//!
//! Layered model: the path in `JOBWARDEN_CONFIG`, then
//! `/etc/jobwarden/jobwarden.toml`, then compiled-in defaults. Every section
//! and field is optional.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::scheduler::{CronExpr, DEFAULT_RETENTION};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "JOBWARDEN_CONFIG";

const SYSTEM_CONFIG_PATH: &str = "/etc/jobwarden/jobwarden.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the jobwarden process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub disclosure: DisclosureConfig,
}

impl Config {
    /// Load and validate configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try, in order: `JOBWARDEN_CONFIG`, the system path, defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %format!("{:#}", e),
                        "{} set but file could not be loaded, trying fallback",
                        CONFIG_ENV
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %format!("{:#}", e),
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    /// Reject values that would only fail later at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.retention == 0 {
            anyhow::bail!("scheduler.retention must be at least 1");
        }
        self.server
            .bind
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("server.bind is not a socket address: {}", self.server.bind))?;
        CronExpr::parse(&self.disclosure.cron_schedule).context("disclosure.cron_schedule")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address and port for the HTTP API.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Run reports kept per job.
    pub retention: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            retention: DEFAULT_RETENTION,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level, used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Disclosure pipeline
// ---------------------------------------------------------------------------

/// Settings for the financial-disclosure job and its collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisclosureConfig {
    /// Register the job at all.
    pub enabled: bool,
    pub cron_schedule: String,
    /// Root for downloaded documents and extracted text.
    pub download_dir: PathBuf,
    /// SQLite file for parsed reports and transactions.
    pub database_path: PathBuf,
    /// Tab-separated yearly index. `{year}` is substituted.
    pub index_url: String,
    /// Per-document URL. `{year}` and `{doc_id}` are substituted.
    pub document_url: String,
    /// Delay between outbound calls, in milliseconds.
    pub request_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub pdftotext_path: String,
    /// Base URL of an OpenAI-compatible chat-completions API.
    pub llm_base_url: String,
    pub llm_model: String,
    /// Environment variable holding the LLM API key.
    pub llm_api_key_env: String,
}

impl Default for DisclosureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron_schedule: "0 4 * * *".to_string(),
            download_dir: PathBuf::from("downloads"),
            database_path: PathBuf::from("data/jobwarden.db"),
            index_url: "https://disclosures-clerk.house.gov/public_disc/financial-pdfs/{year}FD.txt"
                .to_string(),
            document_url: "https://disclosures-clerk.house.gov/public_disc/ptr-pdfs/{year}/{doc_id}.pdf"
                .to_string(),
            request_delay_ms: 2_500,
            request_timeout_secs: 60,
            pdftotext_path: "pdftotext".to_string(),
            llm_base_url: "https://api.openai.com/v1".to_string(),
            llm_model: "gpt-4o-mini".to_string(),
            llm_api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
