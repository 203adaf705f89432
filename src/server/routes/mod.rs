//! API route modules

pub mod agents;
pub mod api_keys;
pub mod health;
pub mod jobs;
pub mod sessions;
pub mod tenants;
pub mod usage;
pub mod voice;

use crate::core::types::RequestContext;
use crate::utils::error::{ApiError, GatewayError};
use actix_web::web;

/// Mount the health probe and the versioned API
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.configure(health::configure_routes);
    cfg.service(
        web::scope("/api/v1")
            .configure(tenants::configure_routes)
            .configure(api_keys::configure_routes)
            .configure(agents::configure_routes)
            .configure(sessions::configure_routes)
            .configure(jobs::configure_routes)
            .configure(usage::configure_routes),
    );
}

/// Bind a fallible result to the request's correlation id
pub trait ApiResult<T> {
    fn for_request(self, ctx: &RequestContext) -> Result<T, ApiError>;
}

impl<T> ApiResult<T> for Result<T, GatewayError> {
    fn for_request(self, ctx: &RequestContext) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::new(e, ctx.correlation_id.clone()))
    }
}
