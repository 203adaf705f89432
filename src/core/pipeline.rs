//! Message pipeline
//!
//! End-to-end orchestration of a single user message: idempotency replay,
//! session lock, history assembly, the provider call, the tool loop,
//! persistence, and billing. Terminal failure at any step retains the
//! state persisted before it; a consumed idempotency key stays consumed.

use crate::core::billing::BillingRecorder;
use crate::core::orchestrator::{AttemptRecord, Orchestrator};
use crate::core::providers::ProviderError;
use crate::core::session_lock::SessionLockMap;
use crate::core::tools::{ToolContext, ToolRegistry};
use crate::core::types::{
    ChatRole, NeutralMessage, NeutralRequest, ProviderId, RequestContext, ToolCallData,
    ToolResultData,
};
use crate::storage::calls::NewProviderCall;
use crate::storage::messages::NewMessage;
use crate::storage::models::{
    Agent, CallStatus, Message, MessageRole, ProviderCall, SessionStatus,
};
use crate::storage::Database;
use crate::utils::error::{GatewayError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How much history is replayed to the provider
pub const MAX_HISTORY_MESSAGES: i64 = 50;

/// Hard cap on tool rounds per user turn
pub const MAX_TOOL_ROUNDS: usize = 4;

/// One inbound user message
#[derive(Debug, Clone)]
pub struct SendMessageInput {
    pub content: String,
    pub idempotency_key: Option<String>,
    pub audio_artifact_id: Option<String>,
}

impl SendMessageInput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            idempotency_key: None,
            audio_artifact_id: None,
        }
    }
}

/// Metadata bundle derived from the final provider call
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReplyMetadata {
    pub provider: ProviderId,
    #[serde(rename = "tokensIn")]
    pub tokens_in: i64,
    #[serde(rename = "tokensOut")]
    pub tokens_out: i64,
    #[serde(rename = "latencyMs")]
    pub latency_ms: i64,
    #[serde(rename = "correlationId")]
    pub correlation_id: String,
    #[serde(rename = "usedFallback")]
    pub used_fallback: bool,
}

/// The assistant's final turn plus its metadata
#[derive(Debug, Clone, Serialize)]
pub struct AssistantReply {
    pub id: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(rename = "toolCalls")]
    pub tool_calls: Vec<ToolCallData>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    pub metadata: ReplyMetadata,
}

/// The conversation processing engine
pub struct MessagePipeline {
    db: Database,
    locks: Arc<SessionLockMap>,
    tools: Arc<ToolRegistry>,
    orchestrator: Arc<Orchestrator>,
    billing: BillingRecorder,
    max_history: i64,
}

impl MessagePipeline {
    pub fn new(
        db: Database,
        locks: Arc<SessionLockMap>,
        tools: Arc<ToolRegistry>,
        orchestrator: Arc<Orchestrator>,
    ) -> Self {
        let billing = BillingRecorder::new(db.clone());
        Self {
            db,
            locks,
            tools,
            orchestrator,
            billing,
            max_history: MAX_HISTORY_MESSAGES,
        }
    }

    /// Process one user message end to end
    pub async fn process(
        &self,
        tenant_id: &str,
        session_id: &str,
        input: SendMessageInput,
        ctx: &RequestContext,
    ) -> Result<AssistantReply> {
        // Tenant scope check before anything else
        if self.db.session_by_id(tenant_id, session_id).await?.is_none() {
            return Err(GatewayError::not_found("session not found"));
        }

        // Idempotency pre-check: no lock, no provider call, no billing
        if let Some(key) = &input.idempotency_key {
            if let Some(reply) = self.replay(session_id, key).await? {
                info!(
                    correlation_id = %ctx.correlation_id,
                    session_id,
                    "idempotency replay served a stored response"
                );
                return Ok(reply);
            }
        }

        // Serialize per session; losers fail fast with CONFLICT
        let _guard = self.locks.acquire(session_id)?;

        // Re-fetch under the lock
        let Some((session, agent)) = self.db.session_with_agent(tenant_id, session_id).await?
        else {
            return Err(GatewayError::not_found("session not found"));
        };
        if session.status != SessionStatus::Active {
            return Err(GatewayError::validation("session is not active"));
        }
        if !agent.is_active {
            return Err(GatewayError::validation("agent is not active"));
        }

        let enabled = agent.enabled_tool_set();
        let tool_ctx = ToolContext {
            tenant_id: session.tenant_id.clone(),
            session_id: session.id.clone(),
            correlation_id: ctx.correlation_id.clone(),
        };

        // Compose the request from history plus the new user turn
        let request = self.build_request(&agent, &session.id, &input.content).await?;

        // Persist the user message; a key collision here means a concurrent
        // caller raced us, so re-drive the replay path
        let user_message = NewMessage {
            session_id: session.id.clone(),
            role: MessageRole::User,
            content: input.content.clone(),
            idempotency_key: input.idempotency_key.clone(),
            tool_calls: Vec::new(),
            provider_call_id: None,
            audio_artifact_id: input.audio_artifact_id.clone(),
        };
        if let Err(e) = self.db.append_message(user_message).await {
            return match (&e, &input.idempotency_key) {
                (GatewayError::Conflict(_), Some(key)) => match self.replay(session_id, key).await? {
                    Some(reply) => Ok(reply),
                    None => Err(e),
                },
                _ => Err(e),
            };
        }

        // First provider round
        let outcome = self
            .orchestrator
            .complete(&request, agent.primary_provider, agent.fallback_provider, ctx)
            .await;
        let rows = self.persist_attempts(&session.id, ctx, &outcome.attempts).await?;

        let success = match outcome.result {
            Ok(success) => success,
            Err(e) => {
                // The user message stays; the idempotency key is consumed
                warn!(
                    correlation_id = %ctx.correlation_id,
                    session_id,
                    error = %e,
                    "provider call failed after retries"
                );
                return Err(e.into());
            }
        };

        let mut final_call = find_success_row(&rows, success.attempt_number)?;
        let mut successful_calls = vec![final_call.clone()];
        let mut response = success.response;
        let mut rounds = 0usize;
        let mut cap_hit = false;

        // Tool loop: interim assistant turn, one TOOL turn per call, then a
        // follow-up round whose answer becomes the final response
        while !response.tool_calls.is_empty() {
            if rounds >= MAX_TOOL_ROUNDS {
                cap_hit = true;
                break;
            }
            rounds += 1;

            let interim = self
                .db
                .append_message(NewMessage {
                    session_id: session.id.clone(),
                    role: MessageRole::Assistant,
                    content: response.content.clone(),
                    idempotency_key: None,
                    tool_calls: response.tool_calls.clone(),
                    provider_call_id: Some(final_call.id.clone()),
                    audio_artifact_id: None,
                })
                .await?;

            for call in &response.tool_calls {
                let invocation = self
                    .tools
                    .invoke(&self.db, call, &enabled, Some(&interim.id), &tool_ctx)
                    .await;
                let payload = ToolResultData {
                    id: call.id.clone(),
                    result: invocation.result,
                    error: invocation.error,
                };
                self.db
                    .append_message(NewMessage::new(
                        &session.id,
                        MessageRole::Tool,
                        serde_json::to_string(&payload)?,
                    ))
                    .await?;
            }

            // Rebuild history from the database so the TOOL turns are
            // included, then ask again with an empty final user turn
            let follow_request = self.build_request(&agent, &session.id, "").await?;
            let follow_outcome = self
                .orchestrator
                .complete(
                    &follow_request,
                    agent.primary_provider,
                    agent.fallback_provider,
                    ctx,
                )
                .await;
            let follow_rows = self
                .persist_attempts(&session.id, ctx, &follow_outcome.attempts)
                .await?;

            match follow_outcome.result {
                Ok(follow_success) => {
                    final_call = find_success_row(&follow_rows, follow_success.attempt_number)?;
                    successful_calls.push(final_call.clone());
                    response = follow_success.response;
                }
                Err(e) => {
                    // The interim assistant and TOOL turns stay as a record
                    // of partial work
                    warn!(
                        correlation_id = %ctx.correlation_id,
                        session_id,
                        error = %e,
                        "follow-up provider call failed"
                    );
                    return Err(e.into());
                }
            }
        }

        let (final_content, final_tool_calls) = if cap_hit {
            warn!(
                correlation_id = %ctx.correlation_id,
                session_id,
                rounds,
                "tool round cap reached"
            );
            (
                "I reached the tool-use limit for this message before finishing; here is what I have so far.".to_string(),
                Vec::new(),
            )
        } else {
            (response.content, response.tool_calls)
        };

        // Final assistant turn
        let assistant = self
            .db
            .append_message(NewMessage {
                session_id: session.id.clone(),
                role: MessageRole::Assistant,
                content: final_content,
                idempotency_key: None,
                tool_calls: final_tool_calls,
                provider_call_id: Some(final_call.id.clone()),
                audio_artifact_id: None,
            })
            .await?;

        // Exactly-once billing for every successful call this run produced
        for call in &successful_calls {
            self.billing.record(call, &session).await?;
        }

        debug!(
            correlation_id = %ctx.correlation_id,
            session_id,
            provider = %final_call.provider,
            used_fallback = final_call.is_fallback,
            "message processed"
        );

        self.build_reply(&assistant, &final_call)
    }

    /// Serve a stored response for a previously consumed idempotency key
    async fn replay(&self, session_id: &str, key: &str) -> Result<Option<AssistantReply>> {
        let Some(user_message) = self.db.message_by_idempotency_key(session_id, key).await? else {
            return Ok(None);
        };

        let assistant = self
            .db
            .message_at_sequence(session_id, user_message.sequence_number + 1)
            .await?;

        match assistant {
            Some(message) if message.role == MessageRole::Assistant => {
                let call = match &message.provider_call_id {
                    Some(call_id) => self.db.provider_call_by_id(call_id).await?,
                    None => None,
                };
                let call = call.ok_or_else(|| {
                    GatewayError::internal("assistant message has no provider call record")
                })?;
                self.build_reply(&message, &call).map(Some)
            }
            // The key was consumed but the original run died before an
            // assistant turn existed; the client sees the provider failure
            _ => Err(GatewayError::Provider(ProviderError::upstream(
                "GATEWAY",
                502,
                "a previous request with this idempotency key failed before completing",
                false,
            ))),
        }
    }

    /// History plus a new user turn, shaped for the provider
    async fn build_request(
        &self,
        agent: &Agent,
        session_id: &str,
        new_user_content: &str,
    ) -> Result<NeutralRequest> {
        let history = self.db.recent_messages(session_id, self.max_history).await?;
        let mut messages = translate_history(&history);
        messages.push(NeutralMessage::user(new_user_content));

        let enabled = agent.enabled_tool_set();
        let tools = if enabled.is_empty() {
            Vec::new()
        } else {
            self.tools.descriptors_for(&enabled)
        };

        Ok(NeutralRequest {
            system_prompt: agent.system_prompt.clone(),
            messages,
            temperature: agent.temperature,
            max_tokens: agent.max_tokens,
            tools,
        })
    }

    /// One ProviderCall row per attempt, success or failure
    async fn persist_attempts(
        &self,
        session_id: &str,
        ctx: &RequestContext,
        attempts: &[AttemptRecord],
    ) -> Result<Vec<ProviderCall>> {
        let mut rows = Vec::with_capacity(attempts.len());
        for attempt in attempts {
            let row = self
                .db
                .insert_provider_call(NewProviderCall {
                    session_id: session_id.to_string(),
                    correlation_id: ctx.correlation_id.clone(),
                    provider: attempt.provider,
                    is_fallback: attempt.is_fallback,
                    tokens_in: attempt.tokens_in,
                    tokens_out: attempt.tokens_out,
                    latency_ms: attempt.latency_ms,
                    status: attempt.status,
                    error_code: attempt.error_code.clone(),
                    error_message: attempt.error_message.clone(),
                    attempt_number: attempt.attempt_number as i64,
                })
                .await?;
            rows.push(row);
        }
        Ok(rows)
    }

    fn build_reply(&self, message: &Message, call: &ProviderCall) -> Result<AssistantReply> {
        Ok(AssistantReply {
            id: message.id.clone(),
            session_id: message.session_id.clone(),
            role: MessageRole::Assistant,
            content: message.content.clone(),
            tool_calls: message.tool_call_list(),
            created_at: message.created_at,
            metadata: ReplyMetadata {
                provider: call.provider,
                tokens_in: call.tokens_in,
                tokens_out: call.tokens_out,
                latency_ms: call.latency_ms,
                // The stored correlation id, so replays return identical bodies
                correlation_id: call.correlation_id.clone(),
                used_fallback: call.is_fallback,
            },
        })
    }
}

fn find_success_row(rows: &[ProviderCall], attempt_number: u32) -> Result<ProviderCall> {
    rows.iter()
        .find(|row| row.status == CallStatus::Success && row.attempt_number == attempt_number as i64)
        .cloned()
        .ok_or_else(|| GatewayError::internal("successful attempt has no persisted call row"))
}

/// Translate stored transcript rows into the neutral conversation shape
fn translate_history(history: &[Message]) -> Vec<NeutralMessage> {
    history
        .iter()
        .map(|message| match message.role {
            MessageRole::User => NeutralMessage {
                role: ChatRole::User,
                content: message.content.clone(),
                tool_calls: Vec::new(),
                tool_results: Vec::new(),
            },
            MessageRole::Assistant => NeutralMessage {
                role: ChatRole::Assistant,
                content: message.content.clone(),
                tool_calls: message.tool_call_list(),
                tool_results: Vec::new(),
            },
            MessageRole::System => NeutralMessage {
                role: ChatRole::System,
                content: message.content.clone(),
                tool_calls: Vec::new(),
                tool_results: Vec::new(),
            },
            MessageRole::Tool => {
                let tool_results = serde_json::from_str::<ToolResultData>(&message.content)
                    .map(|result| vec![result])
                    .unwrap_or_default();
                NeutralMessage {
                    role: ChatRole::Tool,
                    content: message.content.clone(),
                    tool_calls: Vec::new(),
                    tool_results,
                }
            }
        })
        .collect()
}
