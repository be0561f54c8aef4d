//! jobwarden -- cron-driven job scheduler with run history and an HTTP
//! control surface.
//!
//! Jobs are ordered lists of tasks. Each task returns a named set of
//! counters; a job run folds them into a [`job::RunReport`] that the
//! [`scheduler::Scheduler`] keeps in a bounded per-job history. The bundled
//! job scrapes, extracts and stores financial-disclosure filings.

pub mod api;
pub mod config;
pub mod disclosure;
pub mod job;
pub mod scheduler;
pub mod storage;
pub mod task;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::disclosure::{
    DisclosureDeps, DownloadLayout, HttpDisclosureSource, OpenAiInterpreter, PdfToTextExtractor,
    RunYear,
};
use crate::job::Job;
use crate::scheduler::Scheduler;
use crate::storage::SqliteDisclosureRepository;
use crate::task::Pacer;

/// Wire every configured job with its concrete collaborators.
pub fn build_jobs(config: &Config) -> Result<Vec<Arc<dyn Job>>> {
    let mut jobs: Vec<Arc<dyn Job>> = Vec::new();

    let dc = &config.disclosure;
    if dc.enabled {
        let timeout = Duration::from_secs(dc.request_timeout_secs);
        let extractor = PdfToTextExtractor::new(dc.pdftotext_path.clone());
        if !extractor.is_available() {
            tracing::warn!(program = %dc.pdftotext_path, "text extractor not found, disclosure runs will fail");
        }

        let deps = DisclosureDeps {
            source: Arc::new(HttpDisclosureSource::new(&dc.index_url, &dc.document_url, timeout)?),
            extractor: Arc::new(extractor),
            interpreter: Arc::new(OpenAiInterpreter::from_env(
                &dc.llm_base_url,
                &dc.llm_model,
                &dc.llm_api_key_env,
                timeout,
            )?),
            repository: Arc::new(
                SqliteDisclosureRepository::open(&dc.database_path)
                    .with_context(|| format!("opening {}", dc.database_path.display()))?,
            ),
            layout: DownloadLayout::new(&dc.download_dir),
            pacer: Pacer::from_millis(dc.request_delay_ms),
            run_year: RunYear::default(),
        };
        jobs.push(Arc::new(disclosure::build_job(&dc.cron_schedule, deps)));
    }

    Ok(jobs)
}

/// Build the scheduler over the configured jobs.
pub fn build_scheduler(config: &Config) -> Result<Scheduler> {
    let jobs = build_jobs(config)?;
    Ok(Scheduler::new(jobs, config.scheduler.retention)?)
}

/// Start the jobwarden daemon: scheduler timers and the API server.
pub async fn serve(config: Config) -> Result<()> {
    let scheduler = build_scheduler(&config)?;
    let scheduled = scheduler.schedule_jobs().await;
    tracing::info!(jobs = scheduled, "scheduler started");

    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind))?;
    let app = api::router(api::state::AppState::new(scheduler.clone()));

    tracing::info!(%addr, "jobwarden listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await;
    tracing::info!("jobwarden stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
