//! Async job status endpoints

use crate::server::middleware::AuthedTenant;
use crate::server::routes::ApiResult;
use crate::server::AppState;
use crate::storage::models::{Job, JobStatus, JobType};
use crate::utils::error::{ApiError, GatewayError};
use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/jobs")
            .route("", web::get().to(list_jobs))
            .route("/{job_id}", web::get().to(get_job)),
    );
}

#[derive(Debug, Deserialize)]
struct ListJobsQuery {
    status: Option<JobStatus>,
}

#[derive(Debug, Serialize)]
struct JobResponse {
    id: String,
    #[serde(rename = "type")]
    job_type: JobType,
    status: JobStatus,
    progress: i64,
    output: Option<serde_json::Value>,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
    #[serde(rename = "callbackUrl")]
    callback_url: Option<String>,
    #[serde(rename = "callbackSent")]
    callback_sent: bool,
    attempts: i64,
    #[serde(rename = "maxAttempts")]
    max_attempts: i64,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
    #[serde(rename = "startedAt")]
    started_at: Option<DateTime<Utc>>,
    #[serde(rename = "completedAt")]
    completed_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        let output = job
            .output
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());
        Self {
            id: job.id,
            job_type: job.job_type,
            status: job.status,
            progress: job.progress,
            output,
            error_message: job.error_message,
            callback_url: job.callback_url,
            callback_sent: job.callback_sent,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

async fn list_jobs(
    state: web::Data<AppState>,
    auth: AuthedTenant,
    query: web::Query<ListJobsQuery>,
) -> Result<HttpResponse, ApiError> {
    let jobs = state
        .db
        .list_jobs(auth.tenant_id(), query.status)
        .await
        .for_request(&auth.ctx)?;
    let jobs: Vec<JobResponse> = jobs.into_iter().map(JobResponse::from).collect();
    Ok(HttpResponse::Ok().json(jobs))
}

async fn get_job(
    state: web::Data<AppState>,
    auth: AuthedTenant,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let job = state
        .db
        .job_by_id(auth.tenant_id(), &path.into_inner())
        .await
        .for_request(&auth.ctx)?
        .ok_or_else(|| GatewayError::not_found("job not found"))
        .for_request(&auth.ctx)?;
    Ok(HttpResponse::Ok().json(JobResponse::from(job)))
}
