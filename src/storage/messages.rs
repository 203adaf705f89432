//! Message persistence
//!
//! Every insert allocates its sequence number inside the same transaction,
//! so (session, sequence) stays contiguous even when an insert is rolled
//! back or a concurrent writer races us.

use super::models::{Message, MessageRole};
use super::{is_unique_violation, sequence, Database};
use crate::core::types::ToolCallData;
use crate::utils::error::{GatewayError, Result};
use chrono::Utc;
use uuid::Uuid;

/// Fields for a new transcript entry
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub idempotency_key: Option<String>,
    pub tool_calls: Vec<ToolCallData>,
    pub provider_call_id: Option<String>,
    pub audio_artifact_id: Option<String>,
}

impl NewMessage {
    pub fn new(session_id: &str, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            session_id: session_id.to_string(),
            role,
            content: content.into(),
            idempotency_key: None,
            tool_calls: Vec::new(),
            provider_call_id: None,
            audio_artifact_id: None,
        }
    }
}

impl Database {
    /// Append a message at the next sequence slot.
    ///
    /// A unique violation on (session, idempotency_key) surfaces as
    /// CONFLICT so the pipeline can re-drive its idempotency short-circuit.
    pub async fn append_message(&self, new: NewMessage) -> Result<Message> {
        let tool_calls_json = if new.tool_calls.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&new.tool_calls)?)
        };

        let mut tx = self.pool().begin().await?;
        let sequence_number = sequence::next_sequence(&mut tx, &new.session_id).await?;

        let message = Message {
            id: Uuid::new_v4().to_string(),
            session_id: new.session_id,
            sequence_number,
            idempotency_key: new.idempotency_key,
            role: new.role,
            content: new.content,
            tool_calls: tool_calls_json,
            provider_call_id: new.provider_call_id,
            audio_artifact_id: new.audio_artifact_id,
            created_at: Utc::now(),
        };

        let inserted = sqlx::query(
            "INSERT INTO messages (id, session_id, sequence_number, idempotency_key, role,
                 content, tool_calls, provider_call_id, audio_artifact_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.session_id)
        .bind(message.sequence_number)
        .bind(&message.idempotency_key)
        .bind(message.role)
        .bind(&message.content)
        .bind(&message.tool_calls)
        .bind(&message.provider_call_id)
        .bind(&message.audio_artifact_id)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {
                tx.commit().await?;
                Ok(message)
            }
            Err(e) if is_unique_violation(&e) => {
                // The transaction rolls back on drop, reclaiming the sequence slot
                Err(GatewayError::conflict("idempotency key already used"))
            }
            Err(e) => Err(GatewayError::Database(e)),
        }
    }

    pub async fn message_by_idempotency_key(
        &self,
        session_id: &str,
        key: &str,
    ) -> Result<Option<Message>> {
        let message = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE session_id = ? AND idempotency_key = ?",
        )
        .bind(session_id)
        .bind(key)
        .fetch_optional(self.pool())
        .await?;
        Ok(message)
    }

    pub async fn message_at_sequence(
        &self,
        session_id: &str,
        sequence_number: i64,
    ) -> Result<Option<Message>> {
        let message = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE session_id = ? AND sequence_number = ?",
        )
        .bind(session_id)
        .bind(sequence_number)
        .fetch_optional(self.pool())
        .await?;
        Ok(message)
    }

    /// The most recent `limit` messages in ascending sequence order
    pub async fn recent_messages(&self, session_id: &str, limit: i64) -> Result<Vec<Message>> {
        let mut messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE session_id = ?
             ORDER BY sequence_number DESC LIMIT ?",
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        messages.reverse();
        Ok(messages)
    }

    /// The full transcript in ascending sequence order
    pub async fn session_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE session_id = ? ORDER BY sequence_number ASC",
        )
        .bind(session_id)
        .fetch_all(self.pool())
        .await?;
        Ok(messages)
    }
}
