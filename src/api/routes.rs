//! API route definitions.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::ApiError;
use super::state::AppState;
use crate::job::RunReport;
use crate::scheduler::ScheduledJobInfo;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/cron-job-scheduler", scheduler_routes())
}

fn scheduler_routes() -> Router<AppState> {
    Router::new()
        .route("/scheduled-job-info", get(scheduled_job_info))
        .route("/job-run-history", get(job_run_history))
        .route("/all-job-run-history", get(all_job_run_history))
        .route("/execute-job-now", post(execute_job_now))
}

#[derive(Debug, Deserialize)]
struct JobNameQuery {
    #[serde(rename = "jobName")]
    job_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExecuteJobRequest {
    #[serde(rename = "jobName")]
    job_name: Option<String>,
}

fn require_job_name(name: Option<String>) -> Result<String, ApiError> {
    name.filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing job name in request".to_string()))
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn scheduled_job_info(
    State(state): State<AppState>,
    Query(query): Query<JobNameQuery>,
) -> Result<Json<ScheduledJobInfo>, ApiError> {
    let job_name = require_job_name(query.job_name)?;
    let info = state.scheduler.scheduled_job_info(&job_name).await?;
    Ok(Json(info))
}

async fn job_run_history(
    State(state): State<AppState>,
    Query(query): Query<JobNameQuery>,
) -> Result<Json<Vec<RunReport>>, ApiError> {
    let job_name = require_job_name(query.job_name)?;
    Ok(Json(state.scheduler.job_run_history(&job_name).await))
}

/// One sequence per job (ordered by job name), oldest run first.
async fn all_job_run_history(State(state): State<AppState>) -> Json<Vec<Vec<RunReport>>> {
    tracing::info!("getting all job run history");
    let mut by_job: Vec<(String, Vec<RunReport>)> =
        state.scheduler.all_job_run_history().await.into_iter().collect();
    by_job.sort_by(|a, b| a.0.cmp(&b.0));

    Json(
        by_job
            .into_iter()
            .map(|(_, mut runs)| {
                runs.sort_by_key(|r| r.start_time);
                runs
            })
            .collect(),
    )
}

async fn execute_job_now(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteJobRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let job_name = require_job_name(request.job_name)?;

    state.scheduler.trigger_job(&job_name)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": format!("Executing job: {}", job_name) })),
    ))
}
