//! Agent persistence

use super::models::Agent;
use super::Database;
use crate::core::types::ProviderId;
use crate::utils::error::Result;
use chrono::Utc;
use uuid::Uuid;

/// Fields for a new agent
#[derive(Debug, Clone)]
pub struct NewAgent {
    pub tenant_id: String,
    pub name: String,
    pub description: Option<String>,
    pub primary_provider: ProviderId,
    pub fallback_provider: Option<ProviderId>,
    pub system_prompt: String,
    pub temperature: f64,
    pub max_tokens: i64,
    pub enabled_tools: Vec<String>,
    pub voice_enabled: bool,
    pub voice_config: Option<serde_json::Value>,
}

/// Partial update; unset fields keep their current value
#[derive(Debug, Clone, Default)]
pub struct AgentUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub primary_provider: Option<ProviderId>,
    pub fallback_provider: Option<Option<ProviderId>>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i64>,
    pub enabled_tools: Option<Vec<String>>,
    pub voice_enabled: Option<bool>,
    pub voice_config: Option<Option<serde_json::Value>>,
    pub is_active: Option<bool>,
}

impl Database {
    pub async fn create_agent(&self, new: NewAgent) -> Result<Agent> {
        let agent = Agent {
            id: Uuid::new_v4().to_string(),
            tenant_id: new.tenant_id,
            name: new.name,
            description: new.description,
            primary_provider: new.primary_provider,
            fallback_provider: new.fallback_provider,
            system_prompt: new.system_prompt,
            temperature: new.temperature,
            max_tokens: new.max_tokens,
            enabled_tools: serde_json::to_string(&new.enabled_tools)?,
            voice_enabled: new.voice_enabled,
            voice_config: new
                .voice_config
                .map(|v| serde_json::to_string(&v))
                .transpose()?,
            is_active: true,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO agents (id, tenant_id, name, description, primary_provider,
                 fallback_provider, system_prompt, temperature, max_tokens, enabled_tools,
                 voice_enabled, voice_config, is_active, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&agent.id)
        .bind(&agent.tenant_id)
        .bind(&agent.name)
        .bind(&agent.description)
        .bind(agent.primary_provider)
        .bind(agent.fallback_provider)
        .bind(&agent.system_prompt)
        .bind(agent.temperature)
        .bind(agent.max_tokens)
        .bind(&agent.enabled_tools)
        .bind(agent.voice_enabled)
        .bind(&agent.voice_config)
        .bind(agent.is_active)
        .bind(agent.created_at)
        .execute(self.pool())
        .await?;

        Ok(agent)
    }

    pub async fn agent_by_id(&self, tenant_id: &str, agent_id: &str) -> Result<Option<Agent>> {
        let agent =
            sqlx::query_as::<_, Agent>("SELECT * FROM agents WHERE id = ? AND tenant_id = ?")
                .bind(agent_id)
                .bind(tenant_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(agent)
    }

    pub async fn list_agents(&self, tenant_id: &str) -> Result<Vec<Agent>> {
        let agents = sqlx::query_as::<_, Agent>(
            "SELECT * FROM agents WHERE tenant_id = ? ORDER BY created_at ASC",
        )
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await?;
        Ok(agents)
    }

    /// Apply a partial update and return the fresh row
    pub async fn update_agent(
        &self,
        tenant_id: &str,
        agent_id: &str,
        update: AgentUpdate,
    ) -> Result<Option<Agent>> {
        let Some(current) = self.agent_by_id(tenant_id, agent_id).await? else {
            return Ok(None);
        };

        let merged = Agent {
            id: current.id,
            tenant_id: current.tenant_id,
            name: update.name.unwrap_or(current.name),
            description: update.description.unwrap_or(current.description),
            primary_provider: update.primary_provider.unwrap_or(current.primary_provider),
            fallback_provider: update.fallback_provider.unwrap_or(current.fallback_provider),
            system_prompt: update.system_prompt.unwrap_or(current.system_prompt),
            temperature: update.temperature.unwrap_or(current.temperature),
            max_tokens: update.max_tokens.unwrap_or(current.max_tokens),
            enabled_tools: match update.enabled_tools {
                Some(tools) => serde_json::to_string(&tools)?,
                None => current.enabled_tools,
            },
            voice_enabled: update.voice_enabled.unwrap_or(current.voice_enabled),
            voice_config: match update.voice_config {
                Some(config) => config.map(|v| serde_json::to_string(&v)).transpose()?,
                None => current.voice_config,
            },
            is_active: update.is_active.unwrap_or(current.is_active),
            created_at: current.created_at,
        };

        sqlx::query(
            "UPDATE agents SET name = ?, description = ?, primary_provider = ?,
                 fallback_provider = ?, system_prompt = ?, temperature = ?, max_tokens = ?,
                 enabled_tools = ?, voice_enabled = ?, voice_config = ?, is_active = ?
             WHERE id = ? AND tenant_id = ?",
        )
        .bind(&merged.name)
        .bind(&merged.description)
        .bind(merged.primary_provider)
        .bind(merged.fallback_provider)
        .bind(&merged.system_prompt)
        .bind(merged.temperature)
        .bind(merged.max_tokens)
        .bind(&merged.enabled_tools)
        .bind(merged.voice_enabled)
        .bind(&merged.voice_config)
        .bind(merged.is_active)
        .bind(agent_id)
        .bind(tenant_id)
        .execute(self.pool())
        .await?;

        Ok(Some(merged))
    }

    /// Soft-delete: the agent stops accepting sessions but history stays intact
    pub async fn deactivate_agent(&self, tenant_id: &str, agent_id: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE agents SET is_active = 0 WHERE id = ? AND tenant_id = ?")
                .bind(agent_id)
                .bind(tenant_id)
                .execute(self.pool())
                .await?;
        Ok(result.rows_affected() > 0)
    }
}
