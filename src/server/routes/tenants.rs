//! Tenant endpoints
//!
//! Tenant creation is the only unauthenticated endpoint; it returns the
//! initial ADMIN key's plaintext exactly once.

use crate::server::middleware::AuthedTenant;
use crate::server::routes::ApiResult;
use crate::server::AppState;
use crate::storage::models::{ApiRole, Tenant};
use crate::utils::error::{ApiError, GatewayError};
use crate::utils::keys::{display_prefix, generate_api_key, hash_api_key};
use crate::core::types::RequestContext;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::info;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/tenants")
            .route("", web::post().to(create_tenant))
            .route("/me", web::get().to(current_tenant)),
    );
}

#[derive(Debug, Deserialize)]
struct CreateTenantRequest {
    name: String,
    email: String,
}

#[derive(Debug, Serialize)]
struct TenantResponse {
    id: String,
    name: String,
    email: String,
    #[serde(rename = "createdAt")]
    created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
struct CreatedKeyResponse {
    id: String,
    /// Plaintext, returned once and never stored
    key: String,
    prefix: String,
    role: ApiRole,
}

#[derive(Debug, Serialize)]
struct CreateTenantResponse {
    tenant: TenantResponse,
    #[serde(rename = "apiKey")]
    api_key: CreatedKeyResponse,
}

impl From<Tenant> for TenantResponse {
    fn from(tenant: Tenant) -> Self {
        Self {
            id: tenant.id,
            name: tenant.name,
            email: tenant.email,
            created_at: tenant.created_at,
        }
    }
}

async fn create_tenant(
    state: web::Data<AppState>,
    ctx: RequestContext,
    request: web::Json<CreateTenantRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = request.into_inner();
    if request.name.trim().is_empty() {
        return Err(GatewayError::validation("name is required")).for_request(&ctx);
    }
    if !request.email.contains('@') {
        return Err(GatewayError::validation("a valid email is required")).for_request(&ctx);
    }

    let tenant = state
        .db
        .create_tenant(request.name.trim(), request.email.trim())
        .await
        .for_request(&ctx)?;

    // Initial ADMIN key, plaintext handed back exactly once
    let plaintext = generate_api_key(&state.config.auth.key_prefix);
    let key = state
        .db
        .create_api_key(
            &tenant.id,
            &display_prefix(&plaintext),
            &hash_api_key(&plaintext),
            ApiRole::Admin,
            None,
        )
        .await
        .for_request(&ctx)?;

    info!(tenant_id = %tenant.id, "tenant created");
    Ok(HttpResponse::Created().json(CreateTenantResponse {
        tenant: tenant.into(),
        api_key: CreatedKeyResponse {
            id: key.id,
            key: plaintext,
            prefix: key.prefix,
            role: key.role,
        },
    }))
}

async fn current_tenant(auth: AuthedTenant) -> HttpResponse {
    HttpResponse::Ok().json(TenantResponse::from(auth.tenant))
}
