//! Vendor A adapter
//!
//! Completion-style wire format: choices with a message object, function
//! tool calls with string-encoded arguments. The mock personality is slow
//! and flaky: 50-200 ms base latency, occasional 1-3 s spikes, and 10% of
//! calls failing with a retryable 500.

use super::shared::{self, PlannedReply};
use super::{FaultProfile, FaultRoll, ProviderAdapter, ProviderError};
use crate::core::types::{NeutralRequest, NeutralResponse, ProviderId, ToolCallData};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const PROVIDER: &str = "VENDOR_A";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Mocked Vendor A client
pub struct VendorA {
    profile: FaultProfile,
}

impl VendorA {
    pub fn new() -> Self {
        Self {
            profile: FaultProfile::vendor_a(),
        }
    }

    pub fn with_profile(profile: FaultProfile) -> Self {
        Self { profile }
    }

    /// Synthesize the raw vendor payload for this request
    fn fabricate_wire(
        &self,
        request: &NeutralRequest,
        planned: &PlannedReply,
        roll: FaultRoll,
    ) -> serde_json::Value {
        let tool_calls: Vec<serde_json::Value> = planned
            .tool_calls
            .iter()
            .map(|call| {
                serde_json::json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": call.args.to_string(),
                    }
                })
            })
            .collect();

        let usage = if roll.malformed {
            // Drops the token counts the schema requires
            serde_json::json!("unavailable")
        } else {
            serde_json::json!({
                "prompt_tokens": shared::request_tokens(request),
                "completion_tokens": shared::reply_tokens(planned),
            })
        };

        serde_json::json!({
            "id": format!("cmpl-{}", uuid::Uuid::new_v4().simple()),
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": planned.content,
                    "tool_calls": if tool_calls.is_empty() {
                        serde_json::Value::Null
                    } else {
                        serde_json::Value::Array(tool_calls)
                    },
                },
                "finish_reason": if planned.tool_calls.is_empty() { "stop" } else { "tool_calls" },
            }],
            "usage": usage,
        })
    }
}

impl Default for VendorA {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for VendorA {
    fn provider(&self) -> ProviderId {
        ProviderId::VendorA
    }

    async fn send(&self, request: &NeutralRequest) -> Result<NeutralResponse, ProviderError> {
        let roll = self.profile.sample();

        if self.profile.simulate_latency {
            let wait = Duration::from_millis(roll.latency_ms);
            if wait > REQUEST_TIMEOUT {
                return Err(ProviderError::timeout(PROVIDER, "request deadline exceeded"));
            }
            tokio::time::sleep(wait).await;
        }

        if roll.fail_upstream {
            return Err(ProviderError::upstream(
                PROVIDER,
                500,
                "upstream internal error",
                true,
            ));
        }

        let planned = shared::plan_reply(request);
        let raw = self.fabricate_wire(request, &planned, roll);
        let wire: WireResponse = serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::schema(PROVIDER, e.to_string(), raw.clone()))?;

        translate(wire, raw, roll.latency_ms as i64)
    }
}

/// Raw wire shapes; deserialization against these is the schema validation
#[derive(Debug, Serialize, Deserialize)]
struct WireResponse {
    id: String,
    object: String,
    choices: Vec<WireChoice>,
    usage: WireUsage,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireChoice {
    index: u32,
    message: WireMessage,
    finish_reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireUsage {
    prompt_tokens: i64,
    completion_tokens: i64,
}

fn translate(
    wire: WireResponse,
    raw: serde_json::Value,
    latency_ms: i64,
) -> Result<NeutralResponse, ProviderError> {
    let choice = wire
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::schema(PROVIDER, "response carried no choices", raw))?;

    let mut tool_calls = Vec::new();
    for call in choice.message.tool_calls.unwrap_or_default() {
        let args: serde_json::Value = serde_json::from_str(&call.function.arguments).map_err(
            |e| {
                ProviderError::schema(
                    PROVIDER,
                    format!("tool call arguments are not valid JSON: {}", e),
                    serde_json::Value::String(call.function.arguments.clone()),
                )
            },
        )?;
        tool_calls.push(ToolCallData {
            id: call.id,
            name: call.function.name,
            args,
        });
    }

    Ok(NeutralResponse {
        content: choice.message.content.unwrap_or_default(),
        tokens_in: wire.usage.prompt_tokens,
        tokens_out: wire.usage.completion_tokens,
        latency_ms,
        tool_calls,
    })
}
