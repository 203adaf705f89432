//! # VoiceBridge Gateway
//!
//! Multi-tenant AI agent gateway. Accepts conversational messages from
//! client applications, routes them through configurable upstream providers
//! with retry and fallback, persists the conversation and its cost, and
//! exposes accumulated usage for billing analytics.
//!
//! ## Architecture
//!
//! - `core::pipeline`: per-session serialized message processing
//! - `core::orchestrator`: timeout/retry/fallback around provider adapters
//! - `core::billing`: exactly-once usage accounting
//! - `core::jobs`: database-backed async job queue with lease expiry
//! - `storage`: SQLite persistence with the invariants enforced as indexes
//! - `server`: actix-web boundary: auth, correlation, routes

#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod server;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use utils::error::{GatewayError, Result};

pub use self::core::orchestrator::{Orchestrator, RetryPolicy};
pub use self::core::pipeline::{AssistantReply, MessagePipeline, SendMessageInput};
pub use self::core::providers::{AdapterCatalog, FaultProfile, ProviderAdapter, ProviderError};
pub use self::core::types::{NeutralRequest, NeutralResponse, ProviderId, RequestContext};
pub use storage::Database;

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
