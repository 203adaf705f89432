//! Provider call and tool execution records
//!
//! A row is written for every outbound attempt, successful or not, so
//! analytics and billing keep full visibility even when the client saw
//! a 502.

use super::models::{CallStatus, ProviderCall, ToolExecStatus, ToolExecution};
use super::Database;
use crate::core::types::ProviderId;
use crate::utils::error::Result;
use chrono::Utc;
use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

/// Fields for a new provider call record
#[derive(Debug, Clone)]
pub struct NewProviderCall {
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
}

/// Fields for a new tool execution audit record
#[derive(Debug, Clone)]
pub struct NewToolExecution {
    pub session_id: String,
    pub message_id: Option<String>,
    pub correlation_id: String,
    pub tool_name: String,
    pub tool_input: serde_json::Value,
    pub tool_output: Option<serde_json::Value>,
    pub status: ToolExecStatus,
    pub error_message: Option<String>,
    pub latency_ms: i64,
    pub cost_cents: i64,
}

impl Database {
    pub async fn insert_provider_call(&self, new: NewProviderCall) -> Result<ProviderCall> {
        let call = ProviderCall {
            id: Uuid::new_v4().to_string(),
            session_id: new.session_id,
            correlation_id: new.correlation_id,
            provider: new.provider,
            is_fallback: new.is_fallback,
            tokens_in: new.tokens_in,
            tokens_out: new.tokens_out,
            latency_ms: new.latency_ms,
            status: new.status,
            error_code: new.error_code,
            error_message: new.error_message,
            attempt_number: new.attempt_number,
            billed: false,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO provider_calls (id, session_id, correlation_id, provider, is_fallback,
                 tokens_in, tokens_out, latency_ms, status, error_code, error_message,
                 attempt_number, billed, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&call.id)
        .bind(&call.session_id)
        .bind(&call.correlation_id)
        .bind(call.provider)
        .bind(call.is_fallback)
        .bind(call.tokens_in)
        .bind(call.tokens_out)
        .bind(call.latency_ms)
        .bind(call.status)
        .bind(&call.error_code)
        .bind(&call.error_message)
        .bind(call.attempt_number)
        .bind(call.created_at)
        .execute(self.pool())
        .await?;

        Ok(call)
    }

    pub async fn provider_call_by_id(&self, call_id: &str) -> Result<Option<ProviderCall>> {
        let call =
            sqlx::query_as::<_, ProviderCall>("SELECT * FROM provider_calls WHERE id = ?")
                .bind(call_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(call)
    }

    /// All calls for a session ordered by creation time
    pub async fn session_provider_calls(&self, session_id: &str) -> Result<Vec<ProviderCall>> {
        let calls = sqlx::query_as::<_, ProviderCall>(
            "SELECT * FROM provider_calls WHERE session_id = ? ORDER BY created_at ASC, attempt_number ASC",
        )
        .bind(session_id)
        .fetch_all(self.pool())
        .await?;
        Ok(calls)
    }

    /// The conditional flip at the heart of exactly-once billing.
    ///
    /// Returns true iff this caller transitioned billed from false to true;
    /// only SUCCESS rows are eligible.
    pub async fn mark_billed_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        call_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE provider_calls SET billed = 1
             WHERE id = ? AND billed = 0 AND status = 'SUCCESS'",
        )
        .bind(call_id)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn insert_tool_execution(&self, new: NewToolExecution) -> Result<ToolExecution> {
        let execution = ToolExecution {
            id: Uuid::new_v4().to_string(),
            session_id: new.session_id,
            message_id: new.message_id,
            correlation_id: new.correlation_id,
            tool_name: new.tool_name,
            tool_input: new.tool_input.to_string(),
            tool_output: new.tool_output.map(|v| v.to_string()),
            status: new.status,
            error_message: new.error_message,
            latency_ms: new.latency_ms,
            cost_cents: new.cost_cents,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO tool_executions (id, session_id, message_id, correlation_id, tool_name,
                 tool_input, tool_output, status, error_message, latency_ms, cost_cents, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&execution.id)
        .bind(&execution.session_id)
        .bind(&execution.message_id)
        .bind(&execution.correlation_id)
        .bind(&execution.tool_name)
        .bind(&execution.tool_input)
        .bind(&execution.tool_output)
        .bind(execution.status)
        .bind(&execution.error_message)
        .bind(execution.latency_ms)
        .bind(execution.cost_cents)
        .bind(execution.created_at)
        .execute(self.pool())
        .await?;

        Ok(execution)
    }

    pub async fn session_tool_executions(&self, session_id: &str) -> Result<Vec<ToolExecution>> {
        let executions = sqlx::query_as::<_, ToolExecution>(
            "SELECT * FROM tool_executions WHERE session_id = ? ORDER BY created_at ASC",
        )
        .bind(session_id)
        .fetch_all(self.pool())
        .await?;
        Ok(executions)
    }
}
