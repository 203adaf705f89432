//! Provider adapters
//!
//! Each adapter translates between the neutral request/response shape and
//! one vendor's wire format, validating the raw payload before translation.
//! Adapters never retry; retry policy lives entirely in the orchestrator.

mod shared;
mod vendor_a;
mod vendor_b;

pub use vendor_a::VendorA;
pub use vendor_b::VendorB;

use crate::core::types::{NeutralRequest, NeutralResponse, ProviderId};
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Failure modes of a single adapter call
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The vendor did not answer within the request timeout
    #[error("Timeout from {provider}: {message}")]
    Timeout { provider: &'static str, message: String },

    /// The vendor asked us to back off
    #[error("Rate limited by {provider}")]
    RateLimited {
        provider: &'static str,
        retry_after_ms: Option<u64>,
    },

    /// The raw payload did not match the declared vendor schema
    #[error("Schema mismatch from {provider}: {message}")]
    Schema {
        provider: &'static str,
        message: String,
        /// Raw payload kept for diagnosis; never serialized into responses
        raw: serde_json::Value,
    },

    /// Any other vendor-reported failure
    #[error("Provider error from {provider} (status {status}): {message}")]
    Upstream {
        provider: &'static str,
        status: u16,
        message: String,
        retryable: bool,
    },
}

impl ProviderError {
    pub fn timeout(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Timeout {
            provider,
            message: message.into(),
        }
    }

    pub fn rate_limited(provider: &'static str, retry_after_ms: Option<u64>) -> Self {
        Self::RateLimited {
            provider,
            retry_after_ms,
        }
    }

    pub fn schema(
        provider: &'static str,
        message: impl Into<String>,
        raw: serde_json::Value,
    ) -> Self {
        Self::Schema {
            provider,
            message: message.into(),
            raw,
        }
    }

    pub fn upstream(
        provider: &'static str,
        status: u16,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self::Upstream {
            provider,
            status,
            message: message.into(),
            retryable,
        }
    }

    /// Whether the orchestrator may try again
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::RateLimited { .. } => true,
            Self::Schema { .. } => false,
            Self::Upstream {
                status, retryable, ..
            } => *retryable || *status >= 500,
        }
    }

    /// Stable error code for envelopes and persisted call records
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "TIMEOUT_ERROR",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Schema { .. } => "PROVIDER_SCHEMA_ERROR",
            Self::Upstream { .. } => "PROVIDER_ERROR",
        }
    }

    /// Client-facing message; the raw payload stays out of it
    pub fn public_message(&self) -> String {
        match self {
            Self::Schema { provider, .. } => {
                format!("Provider {} returned an unexpected response", provider)
            }
            other => other.to_string(),
        }
    }

    /// Vendor-suggested backoff, when one was given
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }
}

/// Contract every vendor adapter implements
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Which vendor this adapter fronts
    fn provider(&self) -> ProviderId;

    /// One attempt against the vendor; no internal retries
    async fn send(&self, request: &NeutralRequest) -> Result<NeutralResponse, ProviderError>;
}

/// Fault-injection knobs for the mocked vendors
///
/// Production defaults reproduce each vendor's personality; tests build
/// deterministic profiles with the rates they need.
#[derive(Debug, Clone)]
pub struct FaultProfile {
    pub base_latency_ms: (u64, u64),
    pub spike_rate: f64,
    pub spike_latency_ms: (u64, u64),
    pub error_rate: f64,
    pub rate_limit_rate: f64,
    pub retry_after_ms: (u64, u64),
    pub malformed_rate: f64,
    /// When set, the adapter actually sleeps for the rolled latency
    pub simulate_latency: bool,
}

impl FaultProfile {
    /// Vendor A: slower, occasionally spiky, 10% hard failures
    pub fn vendor_a() -> Self {
        Self {
            base_latency_ms: (50, 200),
            spike_rate: 0.05,
            spike_latency_ms: (1000, 3000),
            error_rate: 0.10,
            rate_limit_rate: 0.0,
            retry_after_ms: (0, 0),
            malformed_rate: 0.0,
            simulate_latency: true,
        }
    }

    /// Vendor B: fast, 5% rate-limited with a suggested backoff
    pub fn vendor_b() -> Self {
        Self {
            base_latency_ms: (30, 100),
            spike_rate: 0.0,
            spike_latency_ms: (0, 0),
            error_rate: 0.0,
            rate_limit_rate: 0.05,
            retry_after_ms: (1000, 3000),
            malformed_rate: 0.0,
            simulate_latency: true,
        }
    }

    /// No faults, no sleeping; the profile tests start from
    pub fn deterministic() -> Self {
        Self {
            base_latency_ms: (5, 5),
            spike_rate: 0.0,
            spike_latency_ms: (0, 0),
            error_rate: 0.0,
            rate_limit_rate: 0.0,
            retry_after_ms: (1000, 1000),
            malformed_rate: 0.0,
            simulate_latency: false,
        }
    }

    pub fn with_error_rate(mut self, rate: f64) -> Self {
        self.error_rate = rate;
        self
    }

    pub fn with_rate_limit_rate(mut self, rate: f64) -> Self {
        self.rate_limit_rate = rate;
        self
    }

    pub fn with_malformed_rate(mut self, rate: f64) -> Self {
        self.malformed_rate = rate;
        self
    }

    /// Roll every random outcome up front so adapters hold no RNG across awaits
    pub(crate) fn sample(&self) -> FaultRoll {
        let mut rng = rand::thread_rng();
        let spiked = self.spike_rate > 0.0 && rng.gen_bool(self.spike_rate);
        let base = rng.gen_range(self.base_latency_ms.0..=self.base_latency_ms.1);
        let latency_ms = if spiked {
            base + rng.gen_range(self.spike_latency_ms.0..=self.spike_latency_ms.1)
        } else {
            base
        };
        FaultRoll {
            latency_ms,
            fail_upstream: self.error_rate > 0.0 && rng.gen_bool(self.error_rate),
            rate_limited: self.rate_limit_rate > 0.0 && rng.gen_bool(self.rate_limit_rate),
            retry_after_ms: rng.gen_range(self.retry_after_ms.0..=self.retry_after_ms.1),
            malformed: self.malformed_rate > 0.0 && rng.gen_bool(self.malformed_rate),
        }
    }
}

/// One pre-rolled set of fault outcomes
#[derive(Debug, Clone, Copy)]
pub(crate) struct FaultRoll {
    pub latency_ms: u64,
    pub fail_upstream: bool,
    pub rate_limited: bool,
    pub retry_after_ms: u64,
    pub malformed: bool,
}

/// The set of adapters the orchestrator can dispatch to
pub struct AdapterCatalog {
    adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
}

impl AdapterCatalog {
    /// Empty catalog; tests register stubs into it
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Both mocked vendors with their production fault profiles
    pub fn production() -> Self {
        let mut catalog = Self::new();
        catalog.register(Arc::new(VendorA::new()));
        catalog.register(Arc::new(VendorB::new()));
        catalog
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn adapter(&self, provider: ProviderId) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }
}

impl Default for AdapterCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_classification() {
        assert!(ProviderError::timeout("VENDOR_A", "deadline").is_retryable());
        assert!(ProviderError::rate_limited("VENDOR_B", Some(1000)).is_retryable());
        assert!(ProviderError::upstream("VENDOR_A", 500, "ise", false).is_retryable());
        assert!(ProviderError::upstream("VENDOR_A", 503, "down", false).is_retryable());
        assert!(!ProviderError::upstream("VENDOR_A", 400, "bad request", false).is_retryable());
        assert!(ProviderError::upstream("VENDOR_A", 400, "flagged retryable", true).is_retryable());
        assert!(
            !ProviderError::schema("VENDOR_A", "missing usage", serde_json::json!({}))
                .is_retryable()
        );
    }

    #[test]
    fn schema_errors_never_leak_the_payload() {
        let raw = serde_json::json!({"secret": "internal-body"});
        let err = ProviderError::schema("VENDOR_A", "bad shape", raw);
        assert!(!err.public_message().contains("internal-body"));
        assert_eq!(err.error_code(), "PROVIDER_SCHEMA_ERROR");
    }

    #[test]
    fn deterministic_profile_never_faults() {
        let profile = FaultProfile::deterministic();
        for _ in 0..100 {
            let roll = profile.sample();
            assert!(!roll.fail_upstream);
            assert!(!roll.rate_limited);
            assert!(!roll.malformed);
            assert_eq!(roll.latency_ms, 5);
        }
    }

    #[test]
    fn catalog_resolves_registered_vendors() {
        let catalog = AdapterCatalog::production();
        assert!(catalog.adapter(crate::core::types::ProviderId::VendorA).is_some());
        assert!(catalog.adapter(crate::core::types::ProviderId::VendorB).is_some());
    }
}
