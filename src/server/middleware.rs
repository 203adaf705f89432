//! HTTP middleware and extractors
//!
//! Correlation ids are assigned before any handler runs and echoed on every
//! response. Authentication is an extractor: handlers that take an
//! [`AuthedTenant`] are authenticated, everything else is public.

use crate::core::types::RequestContext;
use crate::server::AppState;
use crate::storage::models::{ApiRole, Tenant};
use crate::utils::error::{ApiError, GatewayError};
use crate::utils::keys::hash_api_key;
use actix_web::dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::{web, FromRequest, HttpMessage, HttpRequest};
use chrono::Utc;
use futures::future::{ready, LocalBoxFuture, Ready};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

const CORRELATION_HEADER: &str = "x-correlation-id";
const API_KEY_HEADER: &str = "x-api-key";

/// Correlation id middleware
///
/// Respects an incoming `X-Correlation-Id`, generates one otherwise, and
/// echoes it on the response.
pub struct CorrelationId;

impl<S, B> Transform<S, ServiceRequest> for CorrelationId
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = CorrelationIdService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(CorrelationIdService { service }))
    }
}

/// Service implementation for the correlation id middleware
pub struct CorrelationIdService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for CorrelationIdService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let supplied = req
            .headers()
            .get(CORRELATION_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);
        let ctx = RequestContext::with_correlation(supplied);
        let correlation_id = ctx.correlation_id.clone();

        debug!(correlation_id = %correlation_id, path = %req.path(), "request received");
        req.extensions_mut().insert(ctx);

        let fut = self.service.call(req);
        Box::pin(async move {
            let mut res = fut.await?;
            let header_value = HeaderValue::from_str(&correlation_id)
                .unwrap_or_else(|_| HeaderValue::from_static("invalid"));
            res.headers_mut()
                .insert(HeaderName::from_static(CORRELATION_HEADER), header_value);
            Ok(res)
        })
    }
}

impl FromRequest for RequestContext {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let ctx = req
            .extensions()
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default();
        ready(Ok(ctx))
    }
}

/// The authenticated principal: a tenant plus the key it presented
#[derive(Debug, Clone)]
pub struct AuthedTenant {
    pub tenant: Tenant,
    pub key_id: String,
    pub role: ApiRole,
    pub ctx: RequestContext,
}

impl AuthedTenant {
    pub fn tenant_id(&self) -> &str {
        &self.tenant.id
    }

    /// Writes require ADMIN
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.role != ApiRole::Admin {
            return Err(ApiError::new(
                GatewayError::forbidden("this operation requires an ADMIN key"),
                self.ctx.correlation_id.clone(),
            ));
        }
        Ok(())
    }

    fn unauthorized(message: &str, correlation_id: String) -> ApiError {
        ApiError::new(GatewayError::unauthorized(message), correlation_id)
    }
}

impl FromRequest for AuthedTenant {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let ctx = req
                .extensions()
                .get::<RequestContext>()
                .cloned()
                .unwrap_or_default();
            let correlation_id = ctx.correlation_id.clone();

            let Some(state) = req.app_data::<web::Data<AppState>>() else {
                return Err(ApiError::new(
                    GatewayError::internal("application state is not configured"),
                    correlation_id,
                ));
            };

            let Some(raw_key) = req
                .headers()
                .get(API_KEY_HEADER)
                .and_then(|h| h.to_str().ok())
                .filter(|k| !k.is_empty())
            else {
                return Err(Self::unauthorized("missing X-API-Key header", correlation_id));
            };

            // Lookup by hash; the plaintext is never stored or logged
            let hash = hash_api_key(raw_key);
            let key = state
                .db
                .api_key_by_hash(&hash)
                .await
                .map_err(|e| ApiError::new(e, correlation_id.clone()))?;

            let Some(key) = key else {
                return Err(Self::unauthorized("invalid API key", correlation_id));
            };
            if !key.is_valid(Utc::now()) {
                return Err(Self::unauthorized("API key is revoked or expired", correlation_id));
            }

            let tenant = state
                .db
                .tenant_by_id(&key.tenant_id)
                .await
                .map_err(|e| ApiError::new(e, correlation_id.clone()))?
                .ok_or_else(|| {
                    Self::unauthorized("API key has no tenant", correlation_id.clone())
                })?;

            // Out-of-band so the request never waits on this write
            let db = state.db.clone();
            let key_id = key.id.clone();
            tokio::spawn(async move {
                if let Err(e) = db.touch_api_key(&key_id).await {
                    warn!("failed to update API key last_used_at: {}", e);
                }
            });

            Ok(AuthedTenant {
                tenant,
                key_id: key.id,
                role: key.role,
                ctx,
            })
        })
    }
}
