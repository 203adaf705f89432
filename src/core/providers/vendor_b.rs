//! Vendor B adapter
//!
//! Content-block wire format: a list of typed blocks (text or tool_use)
//! plus input/output token usage. The mock personality is fast but
//! rate-limits 5% of calls with a suggested backoff of 1-3 s.

use super::shared::{self, PlannedReply};
use super::{FaultProfile, FaultRoll, ProviderAdapter, ProviderError};
use crate::core::types::{NeutralRequest, NeutralResponse, ProviderId, ToolCallData};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const PROVIDER: &str = "VENDOR_B";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Mocked Vendor B client
pub struct VendorB {
    profile: FaultProfile,
}

impl VendorB {
    pub fn new() -> Self {
        Self {
            profile: FaultProfile::vendor_b(),
        }
    }

    pub fn with_profile(profile: FaultProfile) -> Self {
        Self { profile }
    }

    fn fabricate_wire(
        &self,
        request: &NeutralRequest,
        planned: &PlannedReply,
        roll: FaultRoll,
    ) -> serde_json::Value {
        let mut blocks = Vec::new();
        if !planned.content.is_empty() || planned.tool_calls.is_empty() {
            blocks.push(serde_json::json!({
                "type": "text",
                "text": planned.content,
            }));
        }
        for call in &planned.tool_calls {
            blocks.push(serde_json::json!({
                "type": "tool_use",
                "id": call.id,
                "name": call.name,
                "input": call.args,
            }));
        }

        let usage = if roll.malformed {
            serde_json::json!({ "input_tokens": "corrupted" })
        } else {
            serde_json::json!({
                "input_tokens": shared::request_tokens(request),
                "output_tokens": shared::reply_tokens(planned),
            })
        };

        serde_json::json!({
            "id": format!("msg_{}", uuid::Uuid::new_v4().simple()),
            "type": "message",
            "role": "assistant",
            "content": blocks,
            "usage": usage,
        })
    }
}

impl Default for VendorB {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for VendorB {
    fn provider(&self) -> ProviderId {
        ProviderId::VendorB
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

        if roll.rate_limited {
            return Err(ProviderError::rate_limited(
                PROVIDER,
                Some(roll.retry_after_ms),
            ));
        }

        let planned = shared::plan_reply(request);
        let raw = self.fabricate_wire(request, &planned, roll);
        let wire: WireResponse = serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::schema(PROVIDER, e.to_string(), raw))?;

        Ok(translate(wire, roll.latency_ms as i64))
    }
}

/// Raw wire shapes; deserialization against these is the schema validation
#[derive(Debug, Serialize, Deserialize)]
struct WireResponse {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    role: String,
    content: Vec<WireBlock>,
    usage: WireUsage,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum WireBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct WireUsage {
    input_tokens: i64,
    output_tokens: i64,
}

fn translate(wire: WireResponse, latency_ms: i64) -> NeutralResponse {
    let mut content = String::new();
    let mut tool_calls = Vec::new();
    for block in wire.content {
        match block {
            WireBlock::Text { text } => content.push_str(&text),
            WireBlock::ToolUse { id, name, input } => tool_calls.push(ToolCallData {
                id,
                name,
                args: input,
            }),
        }
    }

    NeutralResponse {
        content,
        tokens_in: wire.usage.input_tokens,
        tokens_out: wire.usage.output_tokens,
        latency_ms,
        tool_calls,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::NeutralMessage;

    fn simple_request(content: &str) -> NeutralRequest {
        NeutralRequest {
            system_prompt: "You are a support agent.".into(),
            messages: vec![NeutralMessage::user(content)],
            temperature: 0.7,
            max_tokens: 256,
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn healthy_call_translates_cleanly() {
        let adapter = VendorB::with_profile(FaultProfile::deterministic());
        let response = adapter.send(&simple_request("hello")).await.unwrap();
        assert!(!response.content.is_empty());
        assert!(response.tokens_in > 0);
        assert!(response.tokens_out > 0);
    }

    #[tokio::test]
    async fn forced_rate_limit_carries_retry_after() {
        let adapter =
            VendorB::with_profile(FaultProfile::deterministic().with_rate_limit_rate(1.0));
        let err = adapter.send(&simple_request("hello")).await.unwrap_err();
        match &err {
            ProviderError::RateLimited { retry_after_ms, .. } => {
                assert_eq!(*retry_after_ms, Some(1000));
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn malformed_payload_is_a_schema_error() {
        let adapter =
            VendorB::with_profile(FaultProfile::deterministic().with_malformed_rate(1.0));
        let err = adapter.send(&simple_request("hello")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Schema { .. }));
    }
}
