//! Usage analytics endpoints
//!
//! Readable with either role; ANALYST keys exist for exactly this surface.

use crate::server::middleware::AuthedTenant;
use crate::server::routes::ApiResult;
use crate::server::AppState;
use crate::utils::error::ApiError;
use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/usage")
            .route("", web::get().to(summary))
            .route("/breakdown", web::get().to(breakdown))
            .route("/top-agents", web::get().to(top_agents)),
    );
}

#[derive(Debug, Deserialize)]
struct SummaryQuery {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct BreakdownQuery {
    #[serde(rename = "groupBy")]
    group_by: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TopAgentsQuery {
    limit: Option<i64>,
}

async fn summary(
    state: web::Data<AppState>,
    auth: AuthedTenant,
    query: web::Query<SummaryQuery>,
) -> Result<HttpResponse, ApiError> {
    let totals = state
        .analytics
        .summary(auth.tenant_id(), query.from, query.to)
        .await
        .for_request(&auth.ctx)?;
    Ok(HttpResponse::Ok().json(totals))
}

async fn breakdown(
    state: web::Data<AppState>,
    auth: AuthedTenant,
    query: web::Query<BreakdownQuery>,
) -> Result<HttpResponse, ApiError> {
    let group_by = query.group_by.as_deref().unwrap_or("provider");
    let buckets = state
        .analytics
        .breakdown(auth.tenant_id(), group_by)
        .await
        .for_request(&auth.ctx)?;
    Ok(HttpResponse::Ok().json(buckets))
}

async fn top_agents(
    state: web::Data<AppState>,
    auth: AuthedTenant,
    query: web::Query<TopAgentsQuery>,
) -> Result<HttpResponse, ApiError> {
    let agents = state
        .analytics
        .top_agents(auth.tenant_id(), query.limit)
        .await
        .for_request(&auth.ctx)?;
    Ok(HttpResponse::Ok().json(agents))
}
