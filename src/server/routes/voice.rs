//! Voice endpoints
//!
//! Transcription happens client-side. The transcript endpoint drives the
//! same message pipeline as chat; audio upload/download is opaque storage.

use crate::core::pipeline::SendMessageInput;
use crate::core::voice::{content_type_for, AudioUpload};
use crate::server::middleware::AuthedTenant;
use crate::server::routes::ApiResult;
use crate::server::AppState;
use crate::storage::models::{AudioArtifact, AudioType};
use crate::utils::error::{ApiError, GatewayError};
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registered inside the `/sessions` scope
pub fn scoped_routes(cfg: &mut web::ServiceConfig) {
    cfg.route(
        "/{session_id}/voice/transcript",
        web::post().to(post_transcript),
    );
    cfg.route(
        "/{session_id}/voice/store-audio",
        web::post().to(store_audio),
    );
    cfg.route(
        "/{session_id}/voice/{artifact_id}/metadata",
        web::get().to(artifact_metadata),
    );
    cfg.route(
        "/{session_id}/voice/{artifact_id}",
        web::get().to(download_audio),
    );
}

#[derive(Debug, Deserialize)]
struct TranscriptRequest {
    transcript: String,
    #[serde(rename = "durationMs")]
    duration_ms: Option<i64>,
    format: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StoreAudioQuery {
    #[serde(rename = "type")]
    artifact_type: Option<AudioType>,
    format: Option<String>,
    #[serde(rename = "sampleRate")]
    sample_rate: Option<i64>,
    #[serde(rename = "durationMs")]
    duration_ms: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ArtifactResponse {
    id: String,
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(rename = "type")]
    artifact_type: AudioType,
    #[serde(rename = "fileSize")]
    file_size: Option<i64>,
    #[serde(rename = "durationMs")]
    duration_ms: Option<i64>,
    format: Option<String>,
    #[serde(rename = "sampleRate")]
    sample_rate: Option<i64>,
    transcript: Option<String>,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
}

impl From<AudioArtifact> for ArtifactResponse {
    fn from(artifact: AudioArtifact) -> Self {
        Self {
            id: artifact.id,
            session_id: artifact.session_id,
            artifact_type: artifact.artifact_type,
            file_size: artifact.file_size,
            duration_ms: artifact.duration_ms,
            format: artifact.format,
            sample_rate: artifact.sample_rate,
            transcript: artifact.transcript,
            created_at: artifact.created_at,
        }
    }
}

fn idempotency_key(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("X-Idempotency-Key")
        .and_then(|h| h.to_str().ok())
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}

async fn require_session(
    state: &AppState,
    auth: &AuthedTenant,
    session_id: &str,
) -> Result<(), ApiError> {
    state
        .db
        .session_by_id(auth.tenant_id(), session_id)
        .await
        .for_request(&auth.ctx)?
        .ok_or_else(|| GatewayError::not_found("session not found"))
        .for_request(&auth.ctx)?;
    Ok(())
}

/// A client-side transcript becomes a plain user turn plus a stored artifact
async fn post_transcript(
    state: web::Data<AppState>,
    auth: AuthedTenant,
    path: web::Path<String>,
    request: web::Json<TranscriptRequest>,
    http_request: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let session_id = path.into_inner();
    let request = request.into_inner();
    if request.transcript.trim().is_empty() {
        return Err(GatewayError::validation("transcript is required")).for_request(&auth.ctx);
    }
    require_session(&state, &auth, &session_id).await?;

    let artifact = state
        .voice
        .record_transcript(
            &session_id,
            &request.transcript,
            request.duration_ms,
            request.format,
        )
        .await
        .for_request(&auth.ctx)?;

    let reply = state
        .pipeline
        .process(
            auth.tenant_id(),
            &session_id,
            SendMessageInput {
                content: request.transcript,
                idempotency_key: idempotency_key(&http_request),
                audio_artifact_id: Some(artifact.id.clone()),
            },
            &auth.ctx,
        )
        .await
        .for_request(&auth.ctx)?;

    let mut body = serde_json::to_value(&reply)
        .map_err(GatewayError::from)
        .for_request(&auth.ctx)?;
    if let Some(object) = body.as_object_mut() {
        object.insert(
            "audioArtifactId".to_string(),
            serde_json::Value::String(artifact.id),
        );
    }
    Ok(HttpResponse::Ok().json(body))
}

async fn store_audio(
    state: web::Data<AppState>,
    auth: AuthedTenant,
    path: web::Path<String>,
    query: web::Query<StoreAudioQuery>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let session_id = path.into_inner();
    require_session(&state, &auth, &session_id).await?;

    let query = query.into_inner();
    let artifact = state
        .voice
        .store_audio(
            &session_id,
            &body,
            AudioUpload {
                artifact_type: query.artifact_type,
                format: query.format,
                sample_rate: query.sample_rate,
                duration_ms: query.duration_ms,
            },
        )
        .await
        .for_request(&auth.ctx)?;

    Ok(HttpResponse::Created().json(ArtifactResponse::from(artifact)))
}

async fn download_audio(
    state: web::Data<AppState>,
    auth: AuthedTenant,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (session_id, artifact_id) = path.into_inner();
    require_session(&state, &auth, &session_id).await?;

    let (artifact, bytes) = state
        .voice
        .load_audio(&session_id, &artifact_id)
        .await
        .for_request(&auth.ctx)?;

    Ok(HttpResponse::Ok()
        .content_type(content_type_for(artifact.format.as_deref()))
        .body(bytes))
}

async fn artifact_metadata(
    state: web::Data<AppState>,
    auth: AuthedTenant,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (session_id, artifact_id) = path.into_inner();
    require_session(&state, &auth, &session_id).await?;

    let artifact = state
        .voice
        .artifact(&session_id, &artifact_id)
        .await
        .for_request(&auth.ctx)?;
    Ok(HttpResponse::Ok().json(ArtifactResponse::from(artifact)))
}
