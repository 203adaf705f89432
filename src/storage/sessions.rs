//! Session persistence
//!
//! At most one ACTIVE session exists per (tenant, agent, customer, demo);
//! the partial unique indexes enforce it, and creation falls back to the
//! surviving row when a concurrent insert wins the race.

use super::models::{Agent, Session, SessionChannel, SessionStatus};
use super::{is_unique_violation, Database};
use crate::utils::error::{GatewayError, Result};
use chrono::Utc;
use uuid::Uuid;

/// Fields for a new session
#[derive(Debug, Clone)]
pub struct NewSession {
    pub tenant_id: String,
    pub agent_id: String,
    pub customer_id: String,
    pub channel: SessionChannel,
    pub demo_mode: bool,
    pub metadata: Option<serde_json::Value>,
}

impl Database {
    pub async fn find_active_session(
        &self,
        tenant_id: &str,
        agent_id: &str,
        customer_id: &str,
        demo_mode: bool,
    ) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions
             WHERE tenant_id = ? AND agent_id = ? AND customer_id = ?
               AND demo_mode = ? AND status = 'ACTIVE'",
        )
        .bind(tenant_id)
        .bind(agent_id)
        .bind(customer_id)
        .bind(demo_mode)
        .fetch_optional(self.pool())
        .await?;
        Ok(session)
    }

    /// Create a session, or return the matching ACTIVE one unchanged.
    /// The bool reports whether a row was created.
    pub async fn create_session(&self, new: NewSession) -> Result<(Session, bool)> {
        if let Some(existing) = self
            .find_active_session(&new.tenant_id, &new.agent_id, &new.customer_id, new.demo_mode)
            .await?
        {
            return Ok((existing, false));
        }

        let session = Session {
            id: Uuid::new_v4().to_string(),
            tenant_id: new.tenant_id.clone(),
            agent_id: new.agent_id.clone(),
            customer_id: new.customer_id.clone(),
            channel: new.channel,
            status: SessionStatus::Active,
            demo_mode: new.demo_mode,
            metadata: new
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            last_sequence: 0,
            created_at: Utc::now(),
            ended_at: None,
        };

        let inserted = sqlx::query(
            "INSERT INTO sessions (id, tenant_id, agent_id, customer_id, channel, status,
                 demo_mode, metadata, last_sequence, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&session.id)
        .bind(&session.tenant_id)
        .bind(&session.agent_id)
        .bind(&session.customer_id)
        .bind(session.channel)
        .bind(session.status)
        .bind(session.demo_mode)
        .bind(&session.metadata)
        .bind(session.created_at)
        .execute(self.pool())
        .await;

        match inserted {
            Ok(_) => Ok((session, true)),
            // A concurrent caller created the ACTIVE session first; return theirs
            Err(e) if is_unique_violation(&e) => {
                let existing = self
                    .find_active_session(
                        &new.tenant_id,
                        &new.agent_id,
                        &new.customer_id,
                        new.demo_mode,
                    )
                    .await?
                    .ok_or_else(|| {
                        GatewayError::internal("active session vanished after insert conflict")
                    })?;
                Ok((existing, false))
            }
            Err(e) => Err(GatewayError::Database(e)),
        }
    }

    pub async fn session_by_id(&self, tenant_id: &str, session_id: &str) -> Result<Option<Session>> {
        let session =
            sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = ? AND tenant_id = ?")
                .bind(session_id)
                .bind(tenant_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(session)
    }

    /// Session plus its agent configuration, both tenant-scoped
    pub async fn session_with_agent(
        &self,
        tenant_id: &str,
        session_id: &str,
    ) -> Result<Option<(Session, Agent)>> {
        let Some(session) = self.session_by_id(tenant_id, session_id).await? else {
            return Ok(None);
        };
        let agent = self
            .agent_by_id(tenant_id, &session.agent_id)
            .await?
            .ok_or_else(|| {
                GatewayError::internal(format!(
                    "session {} references missing agent {}",
                    session.id, session.agent_id
                ))
            })?;
        Ok(Some((session, agent)))
    }

    /// Transition a session to ENDED; returns the fresh row if it existed
    pub async fn end_session(&self, tenant_id: &str, session_id: &str) -> Result<Option<Session>> {
        let result = sqlx::query(
            "UPDATE sessions SET status = 'ENDED', ended_at = ?
             WHERE id = ? AND tenant_id = ? AND status = 'ACTIVE'",
        )
        .bind(Utc::now())
        .bind(session_id)
        .bind(tenant_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            // Either missing or already terminal; hand back whatever exists
            return self.session_by_id(tenant_id, session_id).await;
        }
        self.session_by_id(tenant_id, session_id).await
    }
}
