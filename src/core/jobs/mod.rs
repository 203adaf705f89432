//! Durable async jobs
//!
//! Payload shapes for the job types the worker dispatches on. Inputs are
//! stored as JSON on the job row and validated once, when the worker picks
//! the job up.

mod worker;

pub use worker::JobWorker;

use serde::{Deserialize, Serialize};

/// Input for a SEND_MESSAGE job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageJobInput {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub content: String,
}

/// Input for a VOICE_PROCESS job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceProcessJobInput {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub transcript: String,
    #[serde(rename = "durationMs", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// The JSON envelope POSTed to a job's callback URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(rename = "jobId")]
    pub job_id: String,
    #[serde(rename = "type")]
    pub job_type: crate::storage::models::JobType,
    pub status: crate::storage::models::JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "completedAt")]
    pub completed_at: chrono::DateTime<chrono::Utc>,
}
