//! Durable job queue persistence
//!
//! The jobs table is the queue. Claiming is a single conditional UPDATE
//! over a subselect, so two workers can never hold the same lease; the
//! attempt counter advances inside the claim so a job that keeps killing
//! its worker still converges to FAILED.

use super::models::{Job, JobStatus, JobType};
use super::{is_unique_violation, Database};
use crate::utils::error::{GatewayError, Result};
use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;
use uuid::Uuid;

/// Fields for a new job submission
#[derive(Debug, Clone)]
pub struct NewJob {
    pub tenant_id: String,
    pub job_type: JobType,
    pub idempotency_key: Option<String>,
    pub input: serde_json::Value,
    pub callback_url: Option<String>,
    pub max_attempts: i64,
}

impl Database {
    /// Submit a job; a duplicate (tenant, idempotency_key) returns the
    /// existing row. The bool reports whether a row was created.
    pub async fn submit_job(&self, new: NewJob) -> Result<(Job, bool)> {
        let job = Job {
            id: Uuid::new_v4().to_string(),
            tenant_id: new.tenant_id.clone(),
            job_type: new.job_type,
            idempotency_key: new.idempotency_key.clone(),
            input: new.input.to_string(),
            output: None,
            status: JobStatus::Pending,
            progress: 0,
            error_message: None,
            last_error: None,
            callback_url: new.callback_url,
            callback_sent: false,
            locked_at: None,
            locked_by: None,
            lock_expires_at: None,
            attempts: 0,
            max_attempts: new.max_attempts,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };

        let inserted = sqlx::query(
            "INSERT INTO jobs (id, tenant_id, job_type, idempotency_key, input, status,
                 progress, callback_url, callback_sent, attempts, max_attempts, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?, 0, 0, ?, ?)",
        )
        .bind(&job.id)
        .bind(&job.tenant_id)
        .bind(job.job_type)
        .bind(&job.idempotency_key)
        .bind(&job.input)
        .bind(job.status)
        .bind(&job.callback_url)
        .bind(job.max_attempts)
        .bind(job.created_at)
        .execute(self.pool())
        .await;

        match inserted {
            Ok(_) => Ok((job, true)),
            Err(e) if is_unique_violation(&e) => {
                let key = new.idempotency_key.as_deref().unwrap_or_default();
                let existing = sqlx::query_as::<_, Job>(
                    "SELECT * FROM jobs WHERE tenant_id = ? AND idempotency_key = ?",
                )
                .bind(&new.tenant_id)
                .bind(key)
                .fetch_optional(self.pool())
                .await?
                .ok_or_else(|| {
                    GatewayError::internal("duplicate job submission vanished after conflict")
                })?;
                Ok((existing, false))
            }
            Err(e) => Err(GatewayError::Database(e)),
        }
    }

    pub async fn job_by_id(&self, tenant_id: &str, job_id: &str) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ? AND tenant_id = ?")
            .bind(job_id)
            .bind(tenant_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(job)
    }

    pub async fn list_jobs(
        &self,
        tenant_id: &str,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs WHERE tenant_id = ? AND (? IS NULL OR status = ?)
             ORDER BY created_at DESC",
        )
        .bind(tenant_id)
        .bind(status)
        .bind(status)
        .fetch_all(self.pool())
        .await?;
        Ok(jobs)
    }

    /// Atomically claim the oldest eligible job for this worker.
    ///
    /// Eligible: PENDING, or PROCESSING with an expired lease, with attempt
    /// budget remaining. The claim sets the lease and pre-increments
    /// attempts in the same statement.
    pub async fn claim_next_job(&self, worker_id: &str, lease: Duration) -> Result<Option<Job>> {
        let now = Utc::now();
        let expires = now + ChronoDuration::from_std(lease).unwrap_or(ChronoDuration::minutes(5));

        let job = sqlx::query_as::<_, Job>(
            "UPDATE jobs SET
                 status = 'PROCESSING',
                 locked_at = ?,
                 locked_by = ?,
                 lock_expires_at = ?,
                 attempts = attempts + 1,
                 started_at = COALESCE(started_at, ?)
             WHERE id = (
                 SELECT id FROM jobs
                 WHERE status IN ('PENDING', 'PROCESSING')
                   AND (locked_at IS NULL OR lock_expires_at < ?)
                   AND attempts < max_attempts
                 ORDER BY created_at ASC
                 LIMIT 1
             )
             RETURNING *",
        )
        .bind(now)
        .bind(worker_id)
        .bind(expires)
        .bind(now)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        Ok(job)
    }

    /// Successful completion: store the output, clear the lease
    pub async fn complete_job(&self, job_id: &str, output: &serde_json::Value) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'COMPLETED', progress = 100, output = ?,
                 completed_at = ?, locked_at = NULL, locked_by = NULL, lock_expires_at = NULL
             WHERE id = ?",
        )
        .bind(output.to_string())
        .bind(Utc::now())
        .bind(job_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Transient failure with budget left: back to PENDING for any worker
    pub async fn release_job_for_retry(&self, job_id: &str, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'PENDING', last_error = ?,
                 locked_at = NULL, locked_by = NULL, lock_expires_at = NULL
             WHERE id = ?",
        )
        .bind(error)
        .bind(job_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Terminal failure: attempts exhausted
    pub async fn fail_job(&self, job_id: &str, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'FAILED', error_message = ?, last_error = ?,
                 completed_at = ?, locked_at = NULL, locked_by = NULL, lock_expires_at = NULL
             WHERE id = ?",
        )
        .bind(error)
        .bind(error)
        .bind(Utc::now())
        .bind(job_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn set_job_progress(&self, job_id: &str, progress: i64) -> Result<()> {
        sqlx::query("UPDATE jobs SET progress = ? WHERE id = ?")
            .bind(progress.clamp(0, 100))
            .bind(job_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn mark_callback_sent(&self, job_id: &str) -> Result<()> {
        sqlx::query("UPDATE jobs SET callback_sent = 1 WHERE id = ?")
            .bind(job_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Rescue jobs abandoned by crashed workers; run at worker startup.
    ///
    /// Expired holders with attempt budget left go back to PENDING; holders
    /// that died on their final attempt are finalized as FAILED.
    pub async fn recover_stale_jobs(&self) -> Result<u64> {
        let now = Utc::now();
        let failed = sqlx::query(
            "UPDATE jobs SET status = 'FAILED',
                 error_message = COALESCE(last_error, 'worker lease expired'),
                 completed_at = ?,
                 locked_at = NULL, locked_by = NULL, lock_expires_at = NULL
             WHERE status = 'PROCESSING' AND lock_expires_at < ? AND attempts >= max_attempts",
        )
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        let reset = sqlx::query(
            "UPDATE jobs SET status = 'PENDING',
                 locked_at = NULL, locked_by = NULL, lock_expires_at = NULL
             WHERE status = 'PROCESSING' AND lock_expires_at < ?",
        )
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(failed.rows_affected() + reset.rows_affected())
    }
}
