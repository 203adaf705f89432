//! Storage layer
//!
//! A SQLite pool behind a thin wrapper; raw SQL per entity, one impl block
//! per file. The schema is created idempotently at startup, and the
//! invariants the core depends on (sequence uniqueness, idempotency keys,
//! the exactly-once billing guard, active-session uniqueness) are enforced
//! by the indexes declared here rather than by application checks.

pub mod agents;
pub mod api_keys;
pub mod audio;
pub mod calls;
pub mod jobs;
pub mod messages;
pub mod models;
pub mod sequence;
pub mod sessions;
pub mod tenants;
pub mod usage;

use crate::config::DatabaseConfig;
use crate::utils::error::{GatewayError, Result};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::time::Duration;
use tracing::{info, warn};

/// Shared database handle; cheap to clone
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new connection pool
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!("Creating database connection pool");

        // Ensure the data directory exists for file-backed databases
        if let Some(path) = config.url.strip_prefix("sqlite:") {
            if !path.starts_with(':') && !path.starts_with("file:") {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).map_err(|e| {
                            GatewayError::Config(format!("failed to create data directory: {}", e))
                        })?;
                    }
                }
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.connection_limit)
            .acquire_timeout(Duration::from_secs(config.pool_timeout))
            .connect(&config.url)
            .await
            .map_err(|e| {
                warn!("Failed to connect to database: {}", e);
                GatewayError::Database(e)
            })?;

        info!("Database connection pool created");
        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests build their own in-memory pools)
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn execute_ddl(&self, ddl: &str) -> Result<()> {
        sqlx::query(ddl).execute(&self.pool).await?;
        Ok(())
    }

    /// Create tables and indexes idempotently
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations");

        self.execute_ddl(
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .await?;

        self.execute_ddl(
            r#"
            CREATE TABLE IF NOT EXISTS api_keys (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                prefix TEXT NOT NULL,
                hash TEXT UNIQUE NOT NULL,
                role TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT,
                revoked_at TEXT,
                last_used_at TEXT
            )
            "#,
        )
        .await?;

        self.execute_ddl(
            r#"
            CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                name TEXT NOT NULL,
                description TEXT,
                primary_provider TEXT NOT NULL,
                fallback_provider TEXT,
                system_prompt TEXT NOT NULL,
                temperature REAL NOT NULL,
                max_tokens INTEGER NOT NULL,
                enabled_tools TEXT NOT NULL DEFAULT '[]',
                voice_enabled INTEGER NOT NULL DEFAULT 0,
                voice_config TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .await?;

        self.execute_ddl(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                agent_id TEXT NOT NULL REFERENCES agents(id),
                customer_id TEXT NOT NULL,
                channel TEXT NOT NULL,
                status TEXT NOT NULL,
                demo_mode INTEGER NOT NULL DEFAULT 0,
                metadata TEXT,
                last_sequence INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                ended_at TEXT
            )
            "#,
        )
        .await?;
        self.execute_ddl(
            "CREATE INDEX IF NOT EXISTS idx_sessions_tenant_created
             ON sessions(tenant_id, created_at)",
        )
        .await?;
        self.execute_ddl(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_one_active
             ON sessions(tenant_id, agent_id, customer_id)
             WHERE status = 'ACTIVE' AND demo_mode = 0",
        )
        .await?;
        self.execute_ddl(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_one_active_demo
             ON sessions(tenant_id, agent_id, customer_id)
             WHERE status = 'ACTIVE' AND demo_mode = 1",
        )
        .await?;

        self.execute_ddl(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id),
                sequence_number INTEGER NOT NULL,
                idempotency_key TEXT,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                tool_calls TEXT,
                provider_call_id TEXT,
                audio_artifact_id TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .await?;
        self.execute_ddl(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_session_seq
             ON messages(session_id, sequence_number)",
        )
        .await?;
        self.execute_ddl(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_session_idem
             ON messages(session_id, idempotency_key)
             WHERE idempotency_key IS NOT NULL",
        )
        .await?;

        self.execute_ddl(
            r#"
            CREATE TABLE IF NOT EXISTS provider_calls (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id),
                correlation_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                is_fallback INTEGER NOT NULL DEFAULT 0,
                tokens_in INTEGER NOT NULL DEFAULT 0,
                tokens_out INTEGER NOT NULL DEFAULT 0,
                latency_ms INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                error_code TEXT,
                error_message TEXT,
                attempt_number INTEGER NOT NULL,
                billed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .await?;
        self.execute_ddl(
            "CREATE INDEX IF NOT EXISTS idx_provider_calls_billed
             ON provider_calls(billed, created_at)",
        )
        .await?;
        self.execute_ddl(
            "CREATE INDEX IF NOT EXISTS idx_provider_calls_provider_status
             ON provider_calls(provider, status, created_at)",
        )
        .await?;

        self.execute_ddl(
            r#"
            CREATE TABLE IF NOT EXISTS usage_events (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                agent_id TEXT NOT NULL REFERENCES agents(id),
                session_id TEXT NOT NULL REFERENCES sessions(id),
                provider_call_id TEXT NOT NULL UNIQUE REFERENCES provider_calls(id),
                provider TEXT NOT NULL,
                tokens_in INTEGER NOT NULL,
                tokens_out INTEGER NOT NULL,
                total_tokens INTEGER NOT NULL,
                cost_cents INTEGER NOT NULL,
                pricing_snapshot TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .await?;
        self.execute_ddl(
            "CREATE INDEX IF NOT EXISTS idx_usage_events_tenant_provider
             ON usage_events(tenant_id, provider, created_at)",
        )
        .await?;

        self.execute_ddl(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                job_type TEXT NOT NULL,
                idempotency_key TEXT,
                input TEXT NOT NULL,
                output TEXT,
                status TEXT NOT NULL,
                progress INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                last_error TEXT,
                callback_url TEXT,
                callback_sent INTEGER NOT NULL DEFAULT 0,
                locked_at TEXT,
                locked_by TEXT,
                lock_expires_at TEXT,
                attempts INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL DEFAULT 3,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT
            )
            "#,
        )
        .await?;
        self.execute_ddl(
            "CREATE INDEX IF NOT EXISTS idx_jobs_status_lock
             ON jobs(status, lock_expires_at)",
        )
        .await?;
        self.execute_ddl(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_tenant_idem
             ON jobs(tenant_id, idempotency_key)
             WHERE idempotency_key IS NOT NULL",
        )
        .await?;

        self.execute_ddl(
            r#"
            CREATE TABLE IF NOT EXISTS tool_executions (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id),
                message_id TEXT,
                correlation_id TEXT NOT NULL,
                tool_name TEXT NOT NULL,
                tool_input TEXT NOT NULL,
                tool_output TEXT,
                status TEXT NOT NULL,
                error_message TEXT,
                latency_ms INTEGER NOT NULL DEFAULT 0,
                cost_cents INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .await?;

        self.execute_ddl(
            r#"
            CREATE TABLE IF NOT EXISTS audio_artifacts (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id),
                artifact_type TEXT NOT NULL,
                file_path TEXT,
                file_size INTEGER,
                duration_ms INTEGER,
                format TEXT,
                sample_rate INTEGER,
                provider TEXT,
                transcript TEXT,
                latency_ms INTEGER,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .await?;

        info!("Database migrations completed");
        Ok(())
    }
}

/// Whether a sqlx error is a unique-constraint violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.is_unique_violation()
    )
}
