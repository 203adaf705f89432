//! Neutral request/response shapes shared by all provider adapters
//!
//! Adapters translate between these types and each vendor's wire format;
//! everything above the adapter layer only ever sees the neutral shape.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Configured upstream vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
pub enum ProviderId {
    #[serde(rename = "VENDOR_A")]
    #[sqlx(rename = "VENDOR_A")]
    VendorA,
    #[serde(rename = "VENDOR_B")]
    #[sqlx(rename = "VENDOR_B")]
    VendorB,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VendorA => "VENDOR_A",
            Self::VendorB => "VENDOR_B",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VENDOR_A" => Ok(Self::VendorA),
            "VENDOR_B" => Ok(Self::VendorB),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

/// Conversation role in the neutral shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
    Tool,
}

/// A structured request emitted by the assistant to invoke a named function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallData {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

/// The answer to a single tool call, carried by a TOOL turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultData {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One entry of the neutral conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeutralMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResultData>,
}

impl NeutralMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }
}

/// Tool made available to the model for one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Provider-neutral completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeutralRequest {
    pub system_prompt: String,
    pub messages: Vec<NeutralMessage>,
    pub temperature: f64,
    pub max_tokens: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDescriptor>,
}

/// Provider-neutral completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeutralResponse {
    pub content: String,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub latency_ms: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallData>,
}

/// Per-request tracing context, threaded through logs and persisted records
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: String,
}

impl RequestContext {
    /// Fresh context with a generated correlation id
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
        }
    }

    /// Respect a caller-supplied correlation id, generate otherwise
    pub fn with_correlation(correlation_id: Option<String>) -> Self {
        match correlation_id {
            Some(id) if !id.is_empty() => Self { correlation_id: id },
            _ => Self::new(),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
