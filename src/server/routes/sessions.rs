//! Session and message endpoints

use crate::core::pipeline::SendMessageInput;
use crate::core::types::ToolCallData;
use crate::server::middleware::AuthedTenant;
use crate::server::routes::ApiResult;
use crate::server::AppState;
use crate::storage::jobs::NewJob;
use crate::storage::models::{
    JobType, Message, MessageRole, Session, SessionChannel, SessionStatus,
};
use crate::storage::sessions::NewSession;
use crate::utils::error::{ApiError, GatewayError};
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";
const DEFAULT_JOB_MAX_ATTEMPTS: i64 = 3;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/sessions")
            .route("", web::post().to(create_session))
            .route("/{session_id}", web::get().to(get_session))
            .route("/{session_id}/end", web::post().to(end_session))
            .route("/{session_id}/messages", web::get().to(list_messages))
            .route("/{session_id}/messages", web::post().to(post_message))
            .route(
                "/{session_id}/messages/async",
                web::post().to(post_message_async),
            )
            // Voice endpoints share the session scope so path matching
            // stays in one place
            .configure(super::voice::scoped_routes),
    );
}

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    #[serde(rename = "agentId")]
    agent_id: String,
    #[serde(rename = "customerId")]
    customer_id: String,
    channel: Option<SessionChannel>,
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: String,
    #[serde(rename = "agentId")]
    pub agent_id: String,
    #[serde(rename = "customerId")]
    pub customer_id: String,
    pub channel: SessionChannel,
    pub status: SessionStatus,
    #[serde(rename = "demoMode")]
    pub demo_mode: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "endedAt")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            agent_id: session.agent_id,
            customer_id: session.customer_id,
            channel: session.channel,
            status: session.status,
            demo_mode: session.demo_mode,
            created_at: session.created_at,
            ended_at: session.ended_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    id: String,
    #[serde(rename = "sequenceNumber")]
    sequence_number: i64,
    role: MessageRole,
    content: String,
    #[serde(rename = "toolCalls")]
    tool_calls: Vec<ToolCallData>,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        let tool_calls = message.tool_call_list();
        Self {
            id: message.id,
            sequence_number: message.sequence_number,
            role: message.role,
            content: message.content,
            tool_calls,
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PostMessageRequest {
    content: String,
}

#[derive(Debug, Deserialize)]
struct PostMessageAsyncRequest {
    content: String,
    #[serde(rename = "callbackUrl")]
    callback_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct JobAcceptedResponse {
    #[serde(rename = "jobId")]
    job_id: String,
    status: crate::storage::models::JobStatus,
}

fn idempotency_key(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(IDEMPOTENCY_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}

async fn create_session(
    state: web::Data<AppState>,
    auth: AuthedTenant,
    request: web::Json<CreateSessionRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = request.into_inner();

    if request.customer_id.trim().is_empty() {
        return Err(GatewayError::validation("customerId is required")).for_request(&auth.ctx);
    }
    // The demo- namespace is reserved for the dashboard's demo sessions
    if request.customer_id.starts_with("demo-") {
        return Err(GatewayError::validation(
            "customerId prefix 'demo-' is reserved",
        ))
        .for_request(&auth.ctx);
    }

    let agent = state
        .db
        .agent_by_id(auth.tenant_id(), &request.agent_id)
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
            agent_id: request.agent_id,
            customer_id: request.customer_id.trim().to_string(),
            channel: request.channel.unwrap_or(SessionChannel::Chat),
            demo_mode: false,
            metadata: request.metadata,
        })
        .await
        .for_request(&auth.ctx)?;

    if created {
        info!(tenant_id = %auth.tenant_id(), session_id = %session.id, "session created");
        Ok(HttpResponse::Created().json(SessionResponse::from(session)))
    } else {
        Ok(HttpResponse::Ok().json(SessionResponse::from(session)))
    }
}

async fn get_session(
    state: web::Data<AppState>,
    auth: AuthedTenant,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let session = state
        .db
        .session_by_id(auth.tenant_id(), &path.into_inner())
        .await
        .for_request(&auth.ctx)?
        .ok_or_else(|| GatewayError::not_found("session not found"))
        .for_request(&auth.ctx)?;
    Ok(HttpResponse::Ok().json(SessionResponse::from(session)))
}

async fn end_session(
    state: web::Data<AppState>,
    auth: AuthedTenant,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let session = state
        .db
        .end_session(auth.tenant_id(), &path.into_inner())
        .await
        .for_request(&auth.ctx)?
        .ok_or_else(|| GatewayError::not_found("session not found"))
        .for_request(&auth.ctx)?;
    Ok(HttpResponse::Ok().json(SessionResponse::from(session)))
}

async fn list_messages(
    state: web::Data<AppState>,
    auth: AuthedTenant,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let session_id = path.into_inner();
    // Scope check before reading the transcript
    state
        .db
        .session_by_id(auth.tenant_id(), &session_id)
        .await
        .for_request(&auth.ctx)?
        .ok_or_else(|| GatewayError::not_found("session not found"))
        .for_request(&auth.ctx)?;

    let messages = state
        .db
        .session_messages(&session_id)
        .await
        .for_request(&auth.ctx)?;
    let messages: Vec<MessageResponse> = messages.into_iter().map(MessageResponse::from).collect();
    Ok(HttpResponse::Ok().json(messages))
}

/// Synchronous message processing through the pipeline
async fn post_message(
    state: web::Data<AppState>,
    auth: AuthedTenant,
    path: web::Path<String>,
    request: web::Json<PostMessageRequest>,
    http_request: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let session_id = path.into_inner();
    let request = request.into_inner();
    if request.content.trim().is_empty() {
        return Err(GatewayError::validation("content is required")).for_request(&auth.ctx);
    }

    let reply = state
        .pipeline
        .process(
            auth.tenant_id(),
            &session_id,
            SendMessageInput {
                content: request.content,
                idempotency_key: idempotency_key(&http_request),
                audio_artifact_id: None,
            },
            &auth.ctx,
        )
        .await
        .for_request(&auth.ctx)?;

    Ok(HttpResponse::Ok().json(reply))
}

/// Fire-and-forget submission through the durable job queue
async fn post_message_async(
    state: web::Data<AppState>,
    auth: AuthedTenant,
    path: web::Path<String>,
    request: web::Json<PostMessageAsyncRequest>,
    http_request: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let session_id = path.into_inner();
    let request = request.into_inner();
    if request.content.trim().is_empty() {
        return Err(GatewayError::validation("content is required")).for_request(&auth.ctx);
    }

    // The session must exist in this tenant before we enqueue work for it
    state
        .db
        .session_by_id(auth.tenant_id(), &session_id)
        .await
        .for_request(&auth.ctx)?
        .ok_or_else(|| GatewayError::not_found("session not found"))
        .for_request(&auth.ctx)?;

    let input = serde_json::json!({
        "sessionId": session_id,
        "content": request.content,
    });

    let (job, created) = state
        .db
        .submit_job(NewJob {
            tenant_id: auth.tenant_id().to_string(),
            job_type: JobType::SendMessage,
            idempotency_key: idempotency_key(&http_request),
            input,
            callback_url: request.callback_url,
            max_attempts: DEFAULT_JOB_MAX_ATTEMPTS,
        })
        .await
        .for_request(&auth.ctx)?;

    if created {
        info!(tenant_id = %auth.tenant_id(), job_id = %job.id, "async message job submitted");
    }
    Ok(HttpResponse::Accepted().json(JobAcceptedResponse {
        job_id: job.id,
        status: job.status,
    }))
}
