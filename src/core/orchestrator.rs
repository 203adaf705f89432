//! Provider orchestrator
//!
//! Wraps a single adapter call with bounded retries, jittered exponential
//! backoff, and fallback-provider selection. State is purely local to each
//! call; attempt numbers are cumulative across the primary and fallback
//! paths so persisted call records retain global ordering.

use crate::core::providers::{AdapterCatalog, ProviderError};
use crate::core::types::{NeutralRequest, NeutralResponse, ProviderId, RequestContext};
use crate::storage::models::CallStatus;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Retry/backoff knobs
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter_frac: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter_frac: 0.3,
        }
    }
}

impl RetryPolicy {
    /// Base delay before the k-th retry (1-based), before jitter
    pub fn backoff_delay(&self, retry_index: u32) -> Duration {
        let exp = self.multiplier.powi(retry_index.saturating_sub(1) as i32);
        let base_ms = self.initial_delay.as_millis() as f64 * exp;
        let capped_ms = base_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// Base delay plus uniform jitter in [0, jitter_frac * base]
    pub fn jittered(&self, base: Duration) -> Duration {
        let jitter_max = base.as_millis() as f64 * self.jitter_frac;
        let jitter_ms = rand::thread_rng().gen_range(0.0..=jitter_max.max(0.0));
        base + Duration::from_millis(jitter_ms as u64)
    }
}

/// One attempt's observable outcome, persisted as a ProviderCall row
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub provider: ProviderId,
    pub is_fallback: bool,
    pub attempt_number: u32,
    pub status: CallStatus,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub latency_ms: i64,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// The successful end of an orchestrated call
#[derive(Debug, Clone)]
pub struct ProviderSuccess {
    pub response: NeutralResponse,
    pub provider: ProviderId,
    pub used_fallback: bool,
    pub attempt_number: u32,
}

/// Everything the pipeline needs to persist and respond
#[derive(Debug)]
pub struct CompletionOutcome {
    pub attempts: Vec<AttemptRecord>,
    pub result: Result<ProviderSuccess, ProviderError>,
}

/// The retry/timeout/fallback wrapper around provider adapters
pub struct Orchestrator {
    catalog: Arc<AdapterCatalog>,
    policy: RetryPolicy,
}

impl Orchestrator {
    pub fn new(catalog: Arc<AdapterCatalog>) -> Self {
        Self {
            catalog,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(catalog: Arc<AdapterCatalog>, policy: RetryPolicy) -> Self {
        Self { catalog, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run the primary path, then the fallback path if configured and
    /// distinct from primary. A fallback equal to primary means "the
    /// primary path's retries already covered this vendor".
    pub async fn complete(
        &self,
        request: &NeutralRequest,
        primary: ProviderId,
        fallback: Option<ProviderId>,
        ctx: &RequestContext,
    ) -> CompletionOutcome {
        let mut attempts = Vec::new();
        let mut attempt_number = 0u32;

        let primary_result = self
            .run_path(request, primary, false, &mut attempts, &mut attempt_number, ctx)
            .await;

        let result = match primary_result {
            Ok(success) => Ok(success),
            Err(primary_err) => match fallback.filter(|f| *f != primary) {
                Some(fallback_provider) => {
                    debug!(
                        correlation_id = %ctx.correlation_id,
                        primary = %primary,
                        fallback = %fallback_provider,
                        "primary path exhausted, switching to fallback"
                    );
                    self.run_path(
                        request,
                        fallback_provider,
                        true,
                        &mut attempts,
                        &mut attempt_number,
                        ctx,
                    )
                    .await
                }
                None => Err(primary_err),
            },
        };

        CompletionOutcome { attempts, result }
    }

    async fn run_path(
        &self,
        request: &NeutralRequest,
        provider: ProviderId,
        is_fallback: bool,
        attempts: &mut Vec<AttemptRecord>,
        attempt_number: &mut u32,
        ctx: &RequestContext,
    ) -> Result<ProviderSuccess, ProviderError> {
        let adapter = self.catalog.adapter(provider).ok_or_else(|| {
            ProviderError::upstream(provider.as_str(), 503, "no adapter configured", false)
        })?;

        let mut last_err: Option<ProviderError> = None;
        for attempt_in_path in 1..=self.policy.max_attempts {
            *attempt_number += 1;
            let started = Instant::now();

            match adapter.send(request).await {
                Ok(response) => {
                    attempts.push(AttemptRecord {
                        provider,
                        is_fallback,
                        attempt_number: *attempt_number,
                        status: CallStatus::Success,
                        tokens_in: response.tokens_in,
                        tokens_out: response.tokens_out,
                        latency_ms: response.latency_ms,
                        error_code: None,
                        error_message: None,
                    });
                    return Ok(ProviderSuccess {
                        response,
                        provider,
                        used_fallback: is_fallback,
                        attempt_number: *attempt_number,
                    });
                }
                Err(err) => {
                    warn!(
                        correlation_id = %ctx.correlation_id,
                        provider = %provider,
                        attempt = *attempt_number,
                        error = %err,
                        "provider attempt failed"
                    );
                    attempts.push(AttemptRecord {
                        provider,
                        is_fallback,
                        attempt_number: *attempt_number,
                        status: status_for(&err),
                        tokens_in: 0,
                        tokens_out: 0,
                        latency_ms: started.elapsed().as_millis() as i64,
                        error_code: Some(err.error_code().to_string()),
                        error_message: Some(err.to_string()),
                    });

                    let retryable = err.is_retryable();
                    last_err = Some(err);
                    if !retryable {
                        break;
                    }
                    if attempt_in_path < self.policy.max_attempts {
                        let delay = self.policy.jittered(self.policy.backoff_delay(attempt_in_path));
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            ProviderError::upstream(provider.as_str(), 503, "path ran no attempts", false)
        }))
    }
}

fn status_for(err: &ProviderError) -> CallStatus {
    match err {
        ProviderError::Timeout { .. } => CallStatus::Timeout,
        ProviderError::RateLimited { .. } => CallStatus::RateLimited,
        _ => CallStatus::Failed,
    }
}
