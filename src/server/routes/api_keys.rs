//! API key management endpoints (ADMIN only)

use crate::server::middleware::AuthedTenant;
use crate::server::routes::ApiResult;
use crate::server::AppState;
use crate::storage::models::{ApiKey, ApiRole};
use crate::utils::error::{ApiError, GatewayError};
use crate::utils::keys::{display_prefix, generate_api_key, hash_api_key};
use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api-keys")
            .route("", web::get().to(list_keys))
            .route("", web::post().to(create_key))
            .route("/{key_id}", web::delete().to(revoke_key))
            .route("/{key_id}/rotate", web::post().to(rotate_key)),
    );
}

#[derive(Debug, Deserialize)]
struct CreateKeyRequest {
    role: ApiRole,
    #[serde(rename = "expiresAt")]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct KeyResponse {
    id: String,
    prefix: String,
    role: ApiRole,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
    #[serde(rename = "expiresAt")]
    expires_at: Option<DateTime<Utc>>,
    #[serde(rename = "revokedAt")]
    revoked_at: Option<DateTime<Utc>>,
    #[serde(rename = "lastUsedAt")]
    last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct CreatedKeyResponse {
    id: String,
    /// Plaintext, returned once and never stored
    key: String,
    prefix: String,
    role: ApiRole,
    #[serde(rename = "expiresAt")]
    expires_at: Option<DateTime<Utc>>,
}

impl From<ApiKey> for KeyResponse {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            prefix: key.prefix,
            role: key.role,
            created_at: key.created_at,
            expires_at: key.expires_at,
            revoked_at: key.revoked_at,
            last_used_at: key.last_used_at,
        }
    }
}

async fn list_keys(
    state: web::Data<AppState>,
    auth: AuthedTenant,
) -> Result<HttpResponse, ApiError> {
    auth.require_admin()?;
    let keys = state
        .db
        .list_api_keys(auth.tenant_id())
        .await
        .for_request(&auth.ctx)?;
    let keys: Vec<KeyResponse> = keys.into_iter().map(KeyResponse::from).collect();
    Ok(HttpResponse::Ok().json(keys))
}

async fn create_key(
    state: web::Data<AppState>,
    auth: AuthedTenant,
    request: web::Json<CreateKeyRequest>,
) -> Result<HttpResponse, ApiError> {
    auth.require_admin()?;
    let request = request.into_inner();

    if let Some(expires_at) = request.expires_at {
        if expires_at <= Utc::now() {
            return Err(GatewayError::validation("expiresAt must be in the future"))
                .for_request(&auth.ctx);
        }
    }

    let plaintext = generate_api_key(&state.config.auth.key_prefix);
    let key = state
        .db
        .create_api_key(
            auth.tenant_id(),
            &display_prefix(&plaintext),
            &hash_api_key(&plaintext),
            request.role,
            request.expires_at,
        )
        .await
        .for_request(&auth.ctx)?;

    info!(tenant_id = %auth.tenant_id(), key_id = %key.id, "API key created");
    Ok(HttpResponse::Created().json(CreatedKeyResponse {
        id: key.id,
        key: plaintext,
        prefix: key.prefix,
        role: key.role,
        expires_at: key.expires_at,
    }))
}

async fn revoke_key(
    state: web::Data<AppState>,
    auth: AuthedTenant,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    auth.require_admin()?;
    let key_id = path.into_inner();

    let revoked = state
        .db
        .revoke_api_key(auth.tenant_id(), &key_id)
        .await
        .for_request(&auth.ctx)?;
    if !revoked {
        return Err(GatewayError::not_found("API key not found")).for_request(&auth.ctx);
    }

    info!(tenant_id = %auth.tenant_id(), key_id = %key_id, "API key revoked");
    Ok(HttpResponse::NoContent().finish())
}

/// Revoke the old key and mint a replacement with the same role
async fn rotate_key(
    state: web::Data<AppState>,
    auth: AuthedTenant,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    auth.require_admin()?;
    let key_id = path.into_inner();

    let keys = state
        .db
        .list_api_keys(auth.tenant_id())
        .await
        .for_request(&auth.ctx)?;
    let Some(old) = keys.into_iter().find(|k| k.id == key_id) else {
        return Err(GatewayError::not_found("API key not found")).for_request(&auth.ctx);
    };

    state
        .db
        .revoke_api_key(auth.tenant_id(), &key_id)
        .await
        .for_request(&auth.ctx)?;

    let plaintext = generate_api_key(&state.config.auth.key_prefix);
    let replacement = state
        .db
        .create_api_key(
            auth.tenant_id(),
            &display_prefix(&plaintext),
            &hash_api_key(&plaintext),
            old.role,
            old.expires_at,
        )
        .await
        .for_request(&auth.ctx)?;

    info!(
        tenant_id = %auth.tenant_id(),
        old_key_id = %key_id,
        new_key_id = %replacement.id,
        "API key rotated"
    );
    Ok(HttpResponse::Ok().json(CreatedKeyResponse {
        id: replacement.id,
        key: plaintext,
        prefix: replacement.prefix,
        role: replacement.role,
        expires_at: replacement.expires_at,
    }))
}
