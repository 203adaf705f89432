//! Agent endpoints
//!
//! CRUD is ADMIN-gated; reads and the demo-session endpoint are open to
//! both roles.

use crate::core::types::ProviderId;
use crate::server::middleware::AuthedTenant;
use crate::server::routes::{sessions::SessionResponse, ApiResult};
use crate::server::AppState;
use crate::storage::agents::{AgentUpdate, NewAgent};
use crate::storage::models::{Agent, SessionChannel};
use crate::storage::sessions::NewSession;
use crate::utils::error::{ApiError, GatewayError};
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::info;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/agents")
            .route("", web::post().to(create_agent))
            .route("", web::get().to(list_agents))
            .route("/{agent_id}", web::get().to(get_agent))
            .route("/{agent_id}", web::put().to(update_agent))
            .route("/{agent_id}", web::delete().to(delete_agent))
            .route("/{agent_id}/demo", web::post().to(demo_session)),
    );
}

#[derive(Debug, Deserialize)]
struct CreateAgentRequest {
    name: String,
    description: Option<String>,
    #[serde(rename = "primaryProvider")]
    primary_provider: String,
    #[serde(rename = "fallbackProvider")]
    fallback_provider: Option<String>,
    #[serde(rename = "systemPrompt")]
    system_prompt: String,
    temperature: Option<f64>,
    #[serde(rename = "maxTokens")]
    max_tokens: Option<i64>,
    #[serde(rename = "enabledTools", default)]
    enabled_tools: Vec<String>,
    #[serde(rename = "voiceEnabled", default)]
    voice_enabled: bool,
    #[serde(rename = "voiceConfig")]
    voice_config: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct UpdateAgentRequest {
    name: Option<String>,
    description: Option<Option<String>>,
    #[serde(rename = "primaryProvider")]
    primary_provider: Option<String>,
    #[serde(rename = "fallbackProvider")]
    fallback_provider: Option<Option<String>>,
    #[serde(rename = "systemPrompt")]
    system_prompt: Option<String>,
    temperature: Option<f64>,
    #[serde(rename = "maxTokens")]
    max_tokens: Option<i64>,
    #[serde(rename = "enabledTools")]
    enabled_tools: Option<Vec<String>>,
    #[serde(rename = "voiceEnabled")]
    voice_enabled: Option<bool>,
    #[serde(rename = "voiceConfig")]
    voice_config: Option<Option<serde_json::Value>>,
    #[serde(rename = "isActive")]
    is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
struct AgentResponse {
    id: String,
    name: String,
    description: Option<String>,
    #[serde(rename = "primaryProvider")]
    primary_provider: ProviderId,
    #[serde(rename = "fallbackProvider")]
    fallback_provider: Option<ProviderId>,
    #[serde(rename = "systemPrompt")]
    system_prompt: String,
    temperature: f64,
    #[serde(rename = "maxTokens")]
    max_tokens: i64,
    #[serde(rename = "enabledTools")]
    enabled_tools: Vec<String>,
    #[serde(rename = "voiceEnabled")]
    voice_enabled: bool,
    #[serde(rename = "isActive")]
    is_active: bool,
    #[serde(rename = "createdAt")]
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Agent> for AgentResponse {
    fn from(agent: Agent) -> Self {
        let mut enabled_tools: Vec<String> =
            agent.enabled_tool_set().into_iter().collect();
        enabled_tools.sort();
        Self {
            id: agent.id,
            name: agent.name,
            description: agent.description,
            primary_provider: agent.primary_provider,
            fallback_provider: agent.fallback_provider,
            system_prompt: agent.system_prompt,
            temperature: agent.temperature,
            max_tokens: agent.max_tokens,
            enabled_tools,
            voice_enabled: agent.voice_enabled,
            is_active: agent.is_active,
            created_at: agent.created_at,
        }
    }
}

fn parse_provider(raw: &str) -> Result<ProviderId, GatewayError> {
    raw.parse()
        .map_err(|_| GatewayError::validation(format!("unknown provider: {}", raw)))
}

fn validate_temperature(temperature: f64) -> Result<(), GatewayError> {
    if !(0.0..=2.0).contains(&temperature) {
        return Err(GatewayError::validation("temperature must be within [0, 2]"));
    }
    Ok(())
}

fn validate_max_tokens(max_tokens: i64) -> Result<(), GatewayError> {
    if !(1..=4096).contains(&max_tokens) {
        return Err(GatewayError::validation("maxTokens must be within [1, 4096]"));
    }
    Ok(())
}

async fn create_agent(
    state: web::Data<AppState>,
    auth: AuthedTenant,
    request: web::Json<CreateAgentRequest>,
) -> Result<HttpResponse, ApiError> {
    auth.require_admin()?;
    let request = request.into_inner();

    if request.name.trim().is_empty() {
        return Err(GatewayError::validation("name is required")).for_request(&auth.ctx);
    }
    let primary = parse_provider(&request.primary_provider).for_request(&auth.ctx)?;
    let fallback = request
        .fallback_provider
        .as_deref()
        .map(parse_provider)
        .transpose()
        .for_request(&auth.ctx)?;
    let temperature = request.temperature.unwrap_or(0.7);
    validate_temperature(temperature).for_request(&auth.ctx)?;
    let max_tokens = request.max_tokens.unwrap_or(1024);
    validate_max_tokens(max_tokens).for_request(&auth.ctx)?;

    let agent = state
        .db
        .create_agent(NewAgent {
            tenant_id: auth.tenant_id().to_string(),
            name: request.name.trim().to_string(),
            description: request.description,
            primary_provider: primary,
            fallback_provider: fallback,
            system_prompt: request.system_prompt,
            temperature,
            max_tokens,
            enabled_tools: request.enabled_tools,
            voice_enabled: request.voice_enabled,
            voice_config: request.voice_config,
        })
        .await
        .for_request(&auth.ctx)?;

    info!(tenant_id = %auth.tenant_id(), agent_id = %agent.id, "agent created");
    Ok(HttpResponse::Created().json(AgentResponse::from(agent)))
}

async fn list_agents(
    state: web::Data<AppState>,
    auth: AuthedTenant,
) -> Result<HttpResponse, ApiError> {
    let agents = state
        .db
        .list_agents(auth.tenant_id())
        .await
        .for_request(&auth.ctx)?;
    let agents: Vec<AgentResponse> = agents.into_iter().map(AgentResponse::from).collect();
    Ok(HttpResponse::Ok().json(agents))
}

async fn get_agent(
    state: web::Data<AppState>,
    auth: AuthedTenant,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let agent = state
        .db
        .agent_by_id(auth.tenant_id(), &path.into_inner())
        .await
        .for_request(&auth.ctx)?
        .ok_or_else(|| GatewayError::not_found("agent not found"))
        .for_request(&auth.ctx)?;
    Ok(HttpResponse::Ok().json(AgentResponse::from(agent)))
}

async fn update_agent(
    state: web::Data<AppState>,
    auth: AuthedTenant,
    path: web::Path<String>,
    request: web::Json<UpdateAgentRequest>,
) -> Result<HttpResponse, ApiError> {
    auth.require_admin()?;
    let request = request.into_inner();

    if let Some(temperature) = request.temperature {
        validate_temperature(temperature).for_request(&auth.ctx)?;
    }
    if let Some(max_tokens) = request.max_tokens {
        validate_max_tokens(max_tokens).for_request(&auth.ctx)?;
    }
    let primary = request
        .primary_provider
        .as_deref()
        .map(parse_provider)
        .transpose()
        .for_request(&auth.ctx)?;
    let fallback = match request.fallback_provider {
        Some(Some(raw)) => Some(Some(parse_provider(&raw).for_request(&auth.ctx)?)),
        Some(None) => Some(None),
        None => None,
    };

    let updated = state
        .db
        .update_agent(
            auth.tenant_id(),
            &path.into_inner(),
            AgentUpdate {
                name: request.name,
                description: request.description,
                primary_provider: primary,
                fallback_provider: fallback,
                system_prompt: request.system_prompt,
                temperature: request.temperature,
                max_tokens: request.max_tokens,
                enabled_tools: request.enabled_tools,
                voice_enabled: request.voice_enabled,
                voice_config: request.voice_config,
                is_active: request.is_active,
            },
        )
        .await
        .for_request(&auth.ctx)?
        .ok_or_else(|| GatewayError::not_found("agent not found"))
        .for_request(&auth.ctx)?;

    Ok(HttpResponse::Ok().json(AgentResponse::from(updated)))
}

async fn delete_agent(
    state: web::Data<AppState>,
    auth: AuthedTenant,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    auth.require_admin()?;
    let agent_id = path.into_inner();
    let deactivated = state
        .db
        .deactivate_agent(auth.tenant_id(), &agent_id)
        .await
        .for_request(&auth.ctx)?;
    if !deactivated {
        return Err(GatewayError::not_found("agent not found")).for_request(&auth.ctx);
    }
    info!(tenant_id = %auth.tenant_id(), agent_id = %agent_id, "agent deactivated");
    Ok(HttpResponse::NoContent().finish())
}

/// Create or reuse the tenant's demo session for this agent; demo sessions
/// never bill
async fn demo_session(
    state: web::Data<AppState>,
    auth: AuthedTenant,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let agent_id = path.into_inner();
    let agent = state
        .db
        .agent_by_id(auth.tenant_id(), &agent_id)
        .await
        .for_request(&auth.ctx)?
        .ok_or_else(|| GatewayError::not_found("agent not found"))
        .for_request(&auth.ctx)?;
    if !agent.is_active {
        return Err(GatewayError::validation("agent is not active")).for_request(&auth.ctx);
    }

    let (session, created) = state
        .db
        .create_session(NewSession {
            tenant_id: auth.tenant_id().to_string(),
            agent_id,
            customer_id: format!("demo-{}", auth.tenant_id()),
            channel: SessionChannel::Chat,
            demo_mode: true,
            metadata: None,
        })
        .await
        .for_request(&auth.ctx)?;

    let response = SessionResponse::from(session);
    if created {
        Ok(HttpResponse::Created().json(response))
    } else {
        Ok(HttpResponse::Ok().json(response))
    }
}
