//! Billing recorder
//!
//! Exactly-once usage accounting. The conditional flip of `billed` inside a
//! transaction is the source of truth; the unique constraint on
//! `usage_events.provider_call_id` is the second line of defense. Repeated
//! invocations for the same call are safe under concurrent pipelines,
//! job-worker retries, and at-least-once job claims.

use crate::core::pricing;
use crate::storage::models::{CallStatus, ProviderCall, Session, UsageEvent};
use crate::storage::{is_unique_violation, Database};
use crate::utils::error::{GatewayError, Result};
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Creates usage events keyed on provider call records
#[derive(Clone)]
pub struct BillingRecorder {
    db: Database,
}

impl BillingRecorder {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Bill one provider call.
    ///
    /// Returns the created event, or None when nothing was billed: demo
    /// session, non-success call, or another worker already billed it.
    pub async fn record(
        &self,
        call: &ProviderCall,
        session: &Session,
    ) -> Result<Option<UsageEvent>> {
        if session.demo_mode {
            debug!(call_id = %call.id, "skipping billing for demo session");
            return Ok(None);
        }
        if call.status != CallStatus::Success {
            return Ok(None);
        }

        let mut tx = self.db.pool().begin().await?;

        if !Database::mark_billed_in_tx(&mut tx, &call.id).await? {
            // Someone else flipped the flag first; their transaction owns the event
            debug!(call_id = %call.id, "provider call already billed");
            return Ok(None);
        }

        let snapshot = pricing::snapshot_for(call.provider);
        let cost_cents = pricing::cost_cents_with(&snapshot, call.tokens_in, call.tokens_out);

        let event = UsageEvent {
            id: Uuid::new_v4().to_string(),
            tenant_id: session.tenant_id.clone(),
            agent_id: session.agent_id.clone(),
            session_id: call.session_id.clone(),
            provider_call_id: call.id.clone(),
            provider: call.provider,
            tokens_in: call.tokens_in,
            tokens_out: call.tokens_out,
            total_tokens: call.tokens_in + call.tokens_out,
            cost_cents,
            pricing_snapshot: serde_json::to_string(&snapshot)?,
            created_at: Utc::now(),
        };

        match Database::insert_usage_event_in_tx(&mut tx, &event).await {
            Ok(()) => {
                tx.commit().await?;
                debug!(
                    call_id = %call.id,
                    cost_cents,
                    "recorded usage event"
                );
                Ok(Some(event))
            }
            Err(e) if is_unique_violation(&e) => {
                // The dropped transaction rolls back our billed flip; the
                // event that beat us stands
                warn!(call_id = %call.id, "usage event already exists for provider call");
                Ok(None)
            }
            Err(e) => Err(GatewayError::Database(e)),
        }
    }
}
