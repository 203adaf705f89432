//! Provider pricing table and cost calculation
//!
//! The table is process-wide and immutable. Every usage event persists the
//! snapshot it was priced with, so later price changes never rewrite
//! historical bills.

use crate::core::types::ProviderId;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Dollars per 1000 tokens, input and output sides
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProviderPricing {
    pub input_per_ktok: f64,
    pub output_per_ktok: f64,
}

/// The pricing tuple persisted alongside each usage event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingSnapshot {
    pub provider: ProviderId,
    pub input_per_ktok: f64,
    pub output_per_ktok: f64,
}

static PRICING_TABLE: Lazy<HashMap<ProviderId, ProviderPricing>> = Lazy::new(|| {
    HashMap::from([
        (
            ProviderId::VendorA,
            ProviderPricing {
                input_per_ktok: 0.0025,
                output_per_ktok: 0.0100,
            },
        ),
        (
            ProviderId::VendorB,
            ProviderPricing {
                input_per_ktok: 0.0008,
                output_per_ktok: 0.0024,
            },
        ),
    ])
});

/// Look up the current pricing for a provider
pub fn pricing_for(provider: ProviderId) -> ProviderPricing {
    PRICING_TABLE[&provider]
}

/// Snapshot the pricing tuple in effect right now
pub fn snapshot_for(provider: ProviderId) -> PricingSnapshot {
    let pricing = pricing_for(provider);
    PricingSnapshot {
        provider,
        input_per_ktok: pricing.input_per_ktok,
        output_per_ktok: pricing.output_per_ktok,
    }
}

/// Cost in integer cents, rounded up
pub fn cost_cents(provider: ProviderId, tokens_in: i64, tokens_out: i64) -> i64 {
    cost_cents_with(&snapshot_for(provider), tokens_in, tokens_out)
}

/// Cost in integer cents against a specific snapshot
pub fn cost_cents_with(snapshot: &PricingSnapshot, tokens_in: i64, tokens_out: i64) -> i64 {
    let dollars = (tokens_in as f64 / 1000.0) * snapshot.input_per_ktok
        + (tokens_out as f64 / 1000.0) * snapshot.output_per_ktok;
    (dollars * 100.0).ceil() as i64
}
