//! Persistent domain model
//!
//! Row structs mirror the relational schema one-to-one. Dynamic JSON columns
//! are stored as TEXT and exposed through typed accessors so validation
//! happens once, at the edge.

use crate::core::types::{ProviderId, ToolCallData};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashSet;

/// Role attached to an API key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum ApiRole {
    #[serde(rename = "ADMIN")]
    #[sqlx(rename = "ADMIN")]
    Admin,
    #[serde(rename = "ANALYST")]
    #[sqlx(rename = "ANALYST")]
    Analyst,
}

/// Conversation channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum SessionChannel {
    #[serde(rename = "CHAT")]
    #[sqlx(rename = "CHAT")]
    Chat,
    #[serde(rename = "VOICE")]
    #[sqlx(rename = "VOICE")]
    Voice,
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum SessionStatus {
    #[serde(rename = "ACTIVE")]
    #[sqlx(rename = "ACTIVE")]
    Active,
    #[serde(rename = "ENDED")]
    #[sqlx(rename = "ENDED")]
    Ended,
    #[serde(rename = "ERROR")]
    #[sqlx(rename = "ERROR")]
    Error,
}

/// Transcript entry role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum MessageRole {
    #[serde(rename = "USER")]
    #[sqlx(rename = "USER")]
    User,
    #[serde(rename = "ASSISTANT")]
    #[sqlx(rename = "ASSISTANT")]
    Assistant,
    #[serde(rename = "SYSTEM")]
    #[sqlx(rename = "SYSTEM")]
    System,
    #[serde(rename = "TOOL")]
    #[sqlx(rename = "TOOL")]
    Tool,
}

/// Outcome of one outbound vendor attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum CallStatus {
    #[serde(rename = "SUCCESS")]
    #[sqlx(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    #[sqlx(rename = "FAILED")]
    Failed,
    #[serde(rename = "TIMEOUT")]
    #[sqlx(rename = "TIMEOUT")]
    Timeout,
    #[serde(rename = "RATE_LIMITED")]
    #[sqlx(rename = "RATE_LIMITED")]
    RateLimited,
}

/// Kind of durable async work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum JobType {
    #[serde(rename = "SEND_MESSAGE")]
    #[sqlx(rename = "SEND_MESSAGE")]
    SendMessage,
    #[serde(rename = "VOICE_PROCESS")]
    #[sqlx(rename = "VOICE_PROCESS")]
    VoiceProcess,
}

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum JobStatus {
    #[serde(rename = "PENDING")]
    #[sqlx(rename = "PENDING")]
    Pending,
    #[serde(rename = "PROCESSING")]
    #[sqlx(rename = "PROCESSING")]
    Processing,
    #[serde(rename = "COMPLETED")]
    #[sqlx(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    #[sqlx(rename = "FAILED")]
    Failed,
}

/// Outcome of one tool invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum ToolExecStatus {
    #[serde(rename = "SUCCESS")]
    #[sqlx(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    #[sqlx(rename = "FAILED")]
    Failed,
    #[serde(rename = "TIMEOUT")]
    #[sqlx(rename = "TIMEOUT")]
    Timeout,
}

/// Direction of a stored audio artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum AudioType {
    #[serde(rename = "USER_INPUT")]
    #[sqlx(rename = "USER_INPUT")]
    UserInput,
    #[serde(rename = "ASSISTANT_OUTPUT")]
    #[sqlx(rename = "ASSISTANT_OUTPUT")]
    AssistantOutput,
}

/// Top-level owner boundary
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Authentication principal; only the hash of the plaintext is stored
#[derive(Debug, Clone, FromRow)]
pub struct ApiKey {
    pub id: String,
    pub tenant_id: String,
    pub prefix: String,
    pub hash: String,
    pub role: ApiRole,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// A key is valid iff not revoked and not past its expiry
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at.map_or(true, |exp| exp > now)
    }
}

/// Per-tenant reusable agent configuration
#[derive(Debug, Clone, FromRow)]
pub struct Agent {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub description: Option<String>,
    pub primary_provider: ProviderId,
    pub fallback_provider: Option<ProviderId>,
    pub system_prompt: String,
    pub temperature: f64,
    pub max_tokens: i64,
    /// JSON array of tool names
    pub enabled_tools: String,
    pub voice_enabled: bool,
    /// Opaque JSON blob, validated only at the boundary
    pub voice_config: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn enabled_tool_set(&self) -> HashSet<String> {
        serde_json::from_str(&self.enabled_tools).unwrap_or_default()
    }
}

/// A conversation between an agent and one customer
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: String,
    pub tenant_id: String,
    pub agent_id: String,
    pub customer_id: String,
    pub channel: SessionChannel,
    pub status: SessionStatus,
    pub demo_mode: bool,
    pub metadata: Option<String>,
    /// Monotonic counter backing message sequence allocation
    pub last_sequence: i64,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// One transcript entry
#[derive(Debug, Clone, FromRow)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub sequence_number: i64,
    pub idempotency_key: Option<String>,
    pub role: MessageRole,
    pub content: String,
    /// JSON array of tool calls emitted by this turn
    pub tool_calls: Option<String>,
    pub provider_call_id: Option<String>,
    pub audio_artifact_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn tool_call_list(&self) -> Vec<ToolCallData> {
        self.tool_calls
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }
}

/// Record of one outbound vendor attempt, successful or not
#[derive(Debug, Clone, FromRow)]
pub struct ProviderCall {
    pub id: String,
    pub session_id: String,
    pub correlation_id: String,
    pub provider: ProviderId,
    pub is_fallback: bool,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub latency_ms: i64,
    pub status: CallStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub attempt_number: i64,
    pub billed: bool,
    pub created_at: DateTime<Utc>,
}

/// The unit of cost accounting; exactly one per billed provider call
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UsageEvent {
    pub id: String,
    pub tenant_id: String,
    pub agent_id: String,
    pub session_id: String,
    pub provider_call_id: String,
    pub provider: ProviderId,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub total_tokens: i64,
    pub cost_cents: i64,
    /// JSON copy of the pricing tuple used, so price changes never rewrite history
    pub pricing_snapshot: String,
    pub created_at: DateTime<Utc>,
}

/// Durable async work item
#[derive(Debug, Clone, FromRow)]
pub struct Job {
    pub id: String,
    pub tenant_id: String,
    pub job_type: JobType,
    pub idempotency_key: Option<String>,
    /// JSON payload the executor dispatches on
    pub input: String,
    pub output: Option<String>,
    pub status: JobStatus,
    pub progress: i64,
    pub error_message: Option<String>,
    pub last_error: Option<String>,
    pub callback_url: Option<String>,
    pub callback_sent: bool,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub attempts: i64,
    pub max_attempts: i64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Audit record for one tool invocation
#[derive(Debug, Clone, FromRow)]
pub struct ToolExecution {
    pub id: String,
    pub session_id: String,
    pub message_id: Option<String>,
    pub correlation_id: String,
    pub tool_name: String,
    pub tool_input: String,
    pub tool_output: Option<String>,
    pub status: ToolExecStatus,
    pub error_message: Option<String>,
    pub latency_ms: i64,
    pub cost_cents: i64,
    pub created_at: DateTime<Utc>,
}

/// Opaque stored audio plus its transcript
#[derive(Debug, Clone, FromRow)]
pub struct AudioArtifact {
    pub id: String,
    pub session_id: String,
    pub artifact_type: AudioType,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub duration_ms: Option<i64>,
    pub format: Option<String>,
    pub sample_rate: Option<i64>,
    pub provider: Option<String>,
    pub transcript: Option<String>,
    pub latency_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key(expires: Option<DateTime<Utc>>, revoked: Option<DateTime<Utc>>) -> ApiKey {
        ApiKey {
            id: "k1".into(),
            tenant_id: "t1".into(),
            prefix: "vb_live_abcd".into(),
            hash: "h".into(),
            role: ApiRole::Admin,
            created_at: Utc::now(),
            expires_at: expires,
            revoked_at: revoked,
            last_used_at: None,
        }
    }

    #[test]
    fn key_validity_rules() {
        let now = Utc::now();
        assert!(key(None, None).is_valid(now));
        assert!(key(Some(now + Duration::hours(1)), None).is_valid(now));
        assert!(!key(Some(now - Duration::hours(1)), None).is_valid(now));
        assert!(!key(None, Some(now)).is_valid(now));
    }

    #[test]
    fn agent_tool_set_parses_json_array() {
        let agent = Agent {
            id: "a1".into(),
            tenant_id: "t1".into(),
            name: "support".into(),
            description: None,
            primary_provider: ProviderId::VendorA,
            fallback_provider: None,
            system_prompt: "be nice".into(),
            temperature: 0.7,
            max_tokens: 512,
            enabled_tools: r#"["InvoiceLookup"]"#.into(),
            voice_enabled: false,
            voice_config: None,
            is_active: true,
            created_at: Utc::now(),
        };
        assert!(agent.enabled_tool_set().contains("InvoiceLookup"));

        let broken = Agent {
            enabled_tools: "not json".into(),
            ..agent
        };
        assert!(broken.enabled_tool_set().is_empty());
    }
}
