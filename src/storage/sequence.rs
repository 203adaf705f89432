//! Per-session message sequence allocation
//!
//! The counter lives on the session row; the UPDATE takes the row lock, so
//! concurrent allocators for one session serialize at the database even when
//! the caller bypassed the session lock. Allocation happens inside the
//! caller's transaction: a rollback reclaims the number, which keeps
//! sequences contiguous.

use crate::utils::error::{GatewayError, Result};
use sqlx::{Sqlite, Transaction};

/// Allocate the next sequence number for a session
pub async fn next_sequence(
    tx: &mut Transaction<'_, Sqlite>,
    session_id: &str,
) -> Result<i64> {
    let allocated: Option<i64> = sqlx::query_scalar(
        "UPDATE sessions SET last_sequence = last_sequence + 1
         WHERE id = ?
         RETURNING last_sequence",
    )
    .bind(session_id)
    .fetch_optional(&mut **tx)
    .await?;

    allocated.ok_or_else(|| GatewayError::not_found(format!("session {} not found", session_id)))
}
