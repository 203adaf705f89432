//! Usage event persistence and billing analytics queries

use super::models::UsageEvent;
use super::Database;
use crate::utils::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, Sqlite, Transaction};

/// Aggregate totals for a tenant
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UsageTotals {
    #[serde(rename = "totalTokens")]
    pub total_tokens: i64,
    #[serde(rename = "totalCostCents")]
    pub total_cost_cents: i64,
    #[serde(rename = "eventCount")]
    pub event_count: i64,
}

/// One bucket of a grouped usage breakdown
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UsageBucket {
    pub key: String,
    #[serde(rename = "totalTokens")]
    pub total_tokens: i64,
    #[serde(rename = "totalCostCents")]
    pub total_cost_cents: i64,
    #[serde(rename = "eventCount")]
    pub event_count: i64,
}

/// Per-agent spend row for the top-agents report
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AgentUsage {
    #[serde(rename = "agentId")]
    pub agent_id: String,
    #[serde(rename = "agentName")]
    pub agent_name: String,
    #[serde(rename = "totalTokens")]
    pub total_tokens: i64,
    #[serde(rename = "totalCostCents")]
    pub total_cost_cents: i64,
    #[serde(rename = "eventCount")]
    pub event_count: i64,
}

/// Supported breakdown dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakdownKey {
    Provider,
    Agent,
    Day,
}

impl BreakdownKey {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "provider" => Some(Self::Provider),
            "agent" => Some(Self::Agent),
            "day" => Some(Self::Day),
            _ => None,
        }
    }

    fn group_expr(&self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::Agent => "agent_id",
            Self::Day => "strftime('%Y-%m-%d', created_at)",
        }
    }
}

impl Database {
    /// Insert a usage event inside the billing transaction
    pub async fn insert_usage_event_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        event: &UsageEvent,
    ) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO usage_events (id, tenant_id, agent_id, session_id, provider_call_id,
                 provider, tokens_in, tokens_out, total_tokens, cost_cents, pricing_snapshot,
                 created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.id)
        .bind(&event.tenant_id)
        .bind(&event.agent_id)
        .bind(&event.session_id)
        .bind(&event.provider_call_id)
        .bind(event.provider)
        .bind(event.tokens_in)
        .bind(event.tokens_out)
        .bind(event.total_tokens)
        .bind(event.cost_cents)
        .bind(&event.pricing_snapshot)
        .bind(event.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn usage_event_for_call(&self, call_id: &str) -> Result<Option<UsageEvent>> {
        let event = sqlx::query_as::<_, UsageEvent>(
            "SELECT * FROM usage_events WHERE provider_call_id = ?",
        )
        .bind(call_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(event)
    }

    pub async fn usage_totals(
        &self,
        tenant_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<UsageTotals> {
        let totals = sqlx::query_as::<_, UsageTotals>(
            "SELECT COALESCE(SUM(total_tokens), 0) AS total_tokens,
                    COALESCE(SUM(cost_cents), 0) AS total_cost_cents,
                    COUNT(*) AS event_count
             FROM usage_events
             WHERE tenant_id = ?
               AND (? IS NULL OR created_at >= ?)
               AND (? IS NULL OR created_at <= ?)",
        )
        .bind(tenant_id)
        .bind(from)
        .bind(from)
        .bind(to)
        .bind(to)
        .fetch_one(self.pool())
        .await?;
        Ok(totals)
    }

    pub async fn usage_breakdown(
        &self,
        tenant_id: &str,
        key: BreakdownKey,
    ) -> Result<Vec<UsageBucket>> {
        let sql = format!(
            "SELECT {group} AS key,
                    COALESCE(SUM(total_tokens), 0) AS total_tokens,
                    COALESCE(SUM(cost_cents), 0) AS total_cost_cents,
                    COUNT(*) AS event_count
             FROM usage_events
             WHERE tenant_id = ?
             GROUP BY {group}
             ORDER BY total_cost_cents DESC",
            group = key.group_expr()
        );

        let buckets = sqlx::query_as::<_, UsageBucket>(&sql)
            .bind(tenant_id)
            .fetch_all(self.pool())
            .await?;
        Ok(buckets)
    }

    pub async fn top_agents_by_cost(
        &self,
        tenant_id: &str,
        limit: i64,
    ) -> Result<Vec<AgentUsage>> {
        let rows = sqlx::query_as::<_, AgentUsage>(
            "SELECT u.agent_id AS agent_id,
                    a.name AS agent_name,
                    COALESCE(SUM(u.total_tokens), 0) AS total_tokens,
                    COALESCE(SUM(u.cost_cents), 0) AS total_cost_cents,
                    COUNT(*) AS event_count
             FROM usage_events u
             JOIN agents a ON a.id = u.agent_id
             WHERE u.tenant_id = ?
             GROUP BY u.agent_id, a.name
             ORDER BY total_cost_cents DESC
             LIMIT ?",
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}
