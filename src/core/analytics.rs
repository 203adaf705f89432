//! Usage analytics
//!
//! Read-side aggregation over usage events: tenant totals, grouped
//! breakdowns, and the top-agents report. Input validation happens here so
//! the storage queries only ever see well-formed parameters.

use crate::storage::usage::{AgentUsage, BreakdownKey, UsageBucket, UsageTotals};
use crate::storage::Database;
use crate::utils::error::{GatewayError, Result};
use chrono::{DateTime, Utc};

/// Upper bound on the top-agents report size
const MAX_TOP_AGENTS: i64 = 100;

/// Read-side analytics over accumulated usage
#[derive(Clone)]
pub struct AnalyticsService {
    db: Database,
}

impl AnalyticsService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Tenant-wide totals over an optional time window
    pub async fn summary(
        &self,
        tenant_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<UsageTotals> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(GatewayError::validation("'from' must not be after 'to'"));
            }
        }
        self.db.usage_totals(tenant_id, from, to).await
    }

    /// Usage grouped by provider, agent, or day
    pub async fn breakdown(&self, tenant_id: &str, group_by: &str) -> Result<Vec<UsageBucket>> {
        let key = BreakdownKey::parse(group_by).ok_or_else(|| {
            GatewayError::validation("groupBy must be one of: provider, agent, day")
        })?;
        self.db.usage_breakdown(tenant_id, key).await
    }

    /// Highest-spending agents, most expensive first
    pub async fn top_agents(&self, tenant_id: &str, limit: Option<i64>) -> Result<Vec<AgentUsage>> {
        let limit = limit.unwrap_or(10);
        if limit < 1 {
            return Err(GatewayError::validation("limit must be at least 1"));
        }
        self.db
            .top_agents_by_cost(tenant_id, limit.min(MAX_TOP_AGENTS))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakdown_keys_parse() {
        assert_eq!(BreakdownKey::parse("provider"), Some(BreakdownKey::Provider));
        assert_eq!(BreakdownKey::parse("agent"), Some(BreakdownKey::Agent));
        assert_eq!(BreakdownKey::parse("day"), Some(BreakdownKey::Day));
        assert_eq!(BreakdownKey::parse("week"), None);
    }
}
