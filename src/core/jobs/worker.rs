//! Job worker
//!
//! Polls the durable queue, leases one job per tick, executes it through
//! the message pipeline, and delivers the callback. Several workers may run
//! in one process and across processes; they coordinate only through the
//! claim statement's row lock.

use super::{CallbackEnvelope, SendMessageJobInput, VoiceProcessJobInput};
use crate::config::JobConfig;
use crate::core::pipeline::{MessagePipeline, SendMessageInput};
use crate::core::types::RequestContext;
use crate::storage::audio::NewAudioArtifact;
use crate::storage::models::{AudioType, Job, JobStatus, JobType};
use crate::storage::Database;
use crate::utils::error::{GatewayError, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// One polling worker over the jobs table
pub struct JobWorker {
    db: Database,
    pipeline: Arc<MessagePipeline>,
    http: reqwest::Client,
    worker_id: String,
    poll_interval: Duration,
    lease: Duration,
}

impl JobWorker {
    /// `instance` distinguishes workers sharing a process
    pub fn new(
        db: Database,
        pipeline: Arc<MessagePipeline>,
        config: &JobConfig,
        instance: usize,
    ) -> Self {
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let worker_id = format!("{}:{}:{}", host, std::process::id(), instance);
        Self {
            db,
            pipeline,
            http: reqwest::Client::new(),
            worker_id,
            poll_interval: config.poll_interval,
            lease: config.lease,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Rescue jobs stranded by crashed workers; run once at startup
    pub async fn startup_recovery(&self) -> Result<u64> {
        let recovered = self.db.recover_stale_jobs().await?;
        if recovered > 0 {
            info!(worker_id = %self.worker_id, recovered, "recovered stale jobs");
        }
        Ok(recovered)
    }

    /// The polling loop; runs until the task is aborted
    pub async fn run(self: Arc<Self>) {
        if let Err(e) = self.startup_recovery().await {
            warn!(worker_id = %self.worker_id, error = %e, "startup recovery failed");
        }
        info!(worker_id = %self.worker_id, "job worker started");

        loop {
            match self.tick().await {
                // Something was processed; poll again immediately to drain
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(self.poll_interval).await,
                Err(e) => {
                    error!(worker_id = %self.worker_id, error = %e, "worker tick failed");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Claim and execute at most one job; returns whether one was processed
    pub async fn tick(&self) -> Result<bool> {
        let Some(job) = self.db.claim_next_job(&self.worker_id, self.lease).await? else {
            return Ok(false);
        };

        info!(
            worker_id = %self.worker_id,
            job_id = %job.id,
            job_type = ?job.job_type,
            attempt = job.attempts,
            "claimed job"
        );
        if let Err(e) = self.db.set_job_progress(&job.id, 10).await {
            warn!(job_id = %job.id, error = %e, "failed to update job progress");
        }

        match self.execute(&job).await {
            Ok(output) => {
                self.db.complete_job(&job.id, &output).await?;
                info!(job_id = %job.id, "job completed");
                if job.callback_url.is_some() {
                    self.deliver_callback(&job, JobStatus::Completed, Some(output), None)
                        .await;
                }
            }
            Err(e) => {
                let message = e.to_string();
                if job.attempts < job.max_attempts {
                    warn!(
                        job_id = %job.id,
                        attempt = job.attempts,
                        error = %message,
                        "job failed; releasing for retry"
                    );
                    self.db.release_job_for_retry(&job.id, &message).await?;
                } else {
                    error!(job_id = %job.id, error = %message, "job failed terminally");
                    self.db.fail_job(&job.id, &message).await?;
                    if job.callback_url.is_some() {
                        self.deliver_callback(&job, JobStatus::Failed, None, Some(message))
                            .await;
                    }
                }
            }
        }

        Ok(true)
    }

    /// Dispatch one claimed job by type
    async fn execute(&self, job: &Job) -> Result<serde_json::Value> {
        // Repeated attempts collapse at the pipeline layer through this key
        let message_key = job
            .idempotency_key
            .clone()
            .unwrap_or_else(|| format!("job-{}", job.id));
        let ctx = RequestContext::new();

        match job.job_type {
            JobType::SendMessage => {
                let input: SendMessageJobInput = serde_json::from_str(&job.input)
                    .map_err(|e| GatewayError::validation(format!("invalid job input: {}", e)))?;

                let reply = self
                    .pipeline
                    .process(
                        &job.tenant_id,
                        &input.session_id,
                        SendMessageInput {
                            content: input.content,
                            idempotency_key: Some(message_key),
                            audio_artifact_id: None,
                        },
                        &ctx,
                    )
                    .await?;
                Ok(serde_json::to_value(&reply)?)
            }
            JobType::VoiceProcess => {
                let input: VoiceProcessJobInput = serde_json::from_str(&job.input)
                    .map_err(|e| GatewayError::validation(format!("invalid job input: {}", e)))?;

                let artifact = self
                    .db
                    .insert_audio_artifact(NewAudioArtifact {
                        session_id: input.session_id.clone(),
                        artifact_type: Some(AudioType::UserInput),
                        duration_ms: input.duration_ms,
                        format: input.format.clone(),
                        transcript: Some(input.transcript.clone()),
                        ..NewAudioArtifact::default()
                    })
                    .await?;

                let reply = self
                    .pipeline
                    .process(
                        &job.tenant_id,
                        &input.session_id,
                        SendMessageInput {
                            content: input.transcript,
                            idempotency_key: Some(message_key),
                            audio_artifact_id: Some(artifact.id.clone()),
                        },
                        &ctx,
                    )
                    .await?;

                let mut output = serde_json::to_value(&reply)?;
                if let Some(object) = output.as_object_mut() {
                    object.insert(
                        "audioArtifactId".to_string(),
                        serde_json::Value::String(artifact.id),
                    );
                }
                Ok(output)
            }
        }
    }

    /// POST the callback envelope; any 2xx counts as delivered, anything
    /// else is logged and never reopens the job
    async fn deliver_callback(
        &self,
        job: &Job,
        status: JobStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) {
        let Some(url) = &job.callback_url else {
            return;
        };

        let envelope = CallbackEnvelope {
            job_id: job.id.clone(),
            job_type: job.job_type,
            status,
            result,
            error,
            completed_at: Utc::now(),
        };

        match self
            .http
            .post(url)
            .header("X-Job-ID", job.id.clone())
            .json(&envelope)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                if let Err(e) = self.db.mark_callback_sent(&job.id).await {
                    warn!(job_id = %job.id, error = %e, "failed to record callback delivery");
                }
            }
            Ok(response) => {
                warn!(
                    job_id = %job.id,
                    status = %response.status(),
                    "callback endpoint rejected delivery"
                );
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "callback delivery failed");
            }
        }
    }
}
