//! Error handling for the gateway
//!
//! A single typed error covers every boundary. Internal failures are
//! sanitized before they reach a client; the correlation id is attached at
//! the HTTP layer so the envelope always carries one.

use crate::core::providers::ProviderError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

/// Result type alias for the gateway
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Main error type for the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Outbound HTTP errors (webhook callbacks)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// IO errors (audio artifact storage)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request validation failures
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing or invalid API key
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (RBAC)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Lookup failed within the caller's tenant scope
    #[error("Not found: {0}")]
    NotFound(String),

    /// Session lock loser or duplicate resource
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limited, surfaced once retries and fallback are exhausted
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Billing gate tripped
    #[error("Payment required: {0}")]
    PaymentRequired(String),

    /// Upstream provider failure after the orchestrator gave up
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Catch-all; the response body never carries the inner detail
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden<S: Into<String>>(message: S) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict(message.into())
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Stable machine-readable code for the error envelope
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::PaymentRequired(_) => "PAYMENT_REQUIRED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::RateLimited(_) => "RATE_LIMITED",
            Self::Provider(e) => e.error_code(),
            Self::Config(_)
            | Self::Database(_)
            | Self::Serialization(_)
            | Self::HttpClient(_)
            | Self::Io(_)
            | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for the error envelope
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Provider(e) => match e {
                ProviderError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                ProviderError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::Config(_)
            | Self::Database(_)
            | Self::Serialization(_)
            | Self::HttpClient(_)
            | Self::Io(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message; internal variants are sanitized
    pub fn public_message(&self) -> String {
        match self {
            Self::Config(_)
            | Self::Database(_)
            | Self::Serialization(_)
            | Self::HttpClient(_)
            | Self::Io(_)
            | Self::Internal(_) => "An internal error occurred".to_string(),
            Self::Provider(e) => e.public_message(),
            other => other.to_string(),
        }
    }

    /// Optional structured hints for the client
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Conflict(_) => Some(serde_json::json!({ "retryable": true })),
            Self::Provider(ProviderError::RateLimited {
                retry_after_ms: Some(ms),
                ..
            }) => Some(serde_json::json!({ "retryAfterMs": ms })),
            _ => None,
        }
    }
}

/// Uniform error response format
#[derive(Debug, serde::Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorDetail,
}

/// Error detail structure
#[derive(Debug, serde::Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(rename = "correlationId", skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl GatewayError {
    /// Build the envelope body, attaching the request's correlation id
    pub fn to_envelope(&self, correlation_id: Option<&str>) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.public_message(),
                details: self.details(),
                correlation_id: correlation_id.map(str::to_string),
            },
        }
    }
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        self.http_status()
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.http_status()).json(self.to_envelope(None))
    }
}

/// A [`GatewayError`] bound to the request that produced it, so the envelope
/// and the `X-Correlation-Id` response header agree. Handlers return this.
#[derive(Debug, Error)]
#[error("{inner}")]
pub struct ApiError {
    inner: GatewayError,
    correlation_id: String,
}

impl ApiError {
    pub fn new(inner: GatewayError, correlation_id: impl Into<String>) -> Self {
        Self {
            inner,
            correlation_id: correlation_id.into(),
        }
    }

    pub fn inner(&self) -> &GatewayError {
        &self.inner
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.inner.http_status()
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.inner.http_status())
            .insert_header(("X-Correlation-Id", self.correlation_id.clone()))
            .json(self.inner.to_envelope(Some(&self.correlation_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_statuses() {
        let cases = [
            (GatewayError::validation("bad"), "VALIDATION_ERROR", 400),
            (GatewayError::unauthorized("no key"), "UNAUTHORIZED", 401),
            (GatewayError::forbidden("nope"), "FORBIDDEN", 403),
            (GatewayError::not_found("gone"), "NOT_FOUND", 404),
            (GatewayError::conflict("busy"), "CONFLICT", 409),
            (GatewayError::internal("boom"), "INTERNAL_ERROR", 500),
        ];
        for (err, code, status) in cases {
            assert_eq!(err.error_code(), code);
            assert_eq!(err.http_status().as_u16(), status);
        }
    }

    #[test]
    fn internal_detail_is_sanitized() {
        let err = GatewayError::internal("connection string leaked");
        assert_eq!(err.public_message(), "An internal error occurred");
        let envelope = err.to_envelope(Some("corr-1"));
        assert_eq!(envelope.error.correlation_id.as_deref(), Some("corr-1"));
        assert!(!envelope.error.message.contains("connection string"));
    }

    #[test]
    fn conflict_hints_retry() {
        let err = GatewayError::conflict("session busy");
        let details = err.details().unwrap();
        assert_eq!(details["retryable"], true);
    }

    #[test]
    fn provider_errors_map_to_gateway_statuses() {
        let timeout = GatewayError::from(ProviderError::timeout("VENDOR_A", "deadline exceeded"));
        assert_eq!(timeout.error_code(), "TIMEOUT_ERROR");
        assert_eq!(timeout.http_status().as_u16(), 504);

        let limited = GatewayError::from(ProviderError::rate_limited("VENDOR_B", Some(1500)));
        assert_eq!(limited.error_code(), "RATE_LIMITED");
        assert_eq!(limited.http_status().as_u16(), 429);
    }
}
