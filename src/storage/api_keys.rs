//! API key persistence
//!
//! Only hashes are stored; the plaintext exists in memory just long enough
//! to hand back to the caller once.

use super::models::{ApiKey, ApiRole};
use super::Database;
use crate::utils::error::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

impl Database {
    pub async fn create_api_key(
        &self,
        tenant_id: &str,
        prefix: &str,
        hash: &str,
        role: ApiRole,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<ApiKey> {
        let key = ApiKey {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            prefix: prefix.to_string(),
            hash: hash.to_string(),
            role,
            created_at: Utc::now(),
            expires_at,
            revoked_at: None,
            last_used_at: None,
        };

        sqlx::query(
            "INSERT INTO api_keys (id, tenant_id, prefix, hash, role, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&key.id)
        .bind(&key.tenant_id)
        .bind(&key.prefix)
        .bind(&key.hash)
        .bind(key.role)
        .bind(key.created_at)
        .bind(key.expires_at)
        .execute(self.pool())
        .await?;

        Ok(key)
    }

    pub async fn api_key_by_hash(&self, hash: &str) -> Result<Option<ApiKey>> {
        let key = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE hash = ?")
            .bind(hash)
            .fetch_optional(self.pool())
            .await?;
        Ok(key)
    }

    pub async fn list_api_keys(&self, tenant_id: &str) -> Result<Vec<ApiKey>> {
        let keys = sqlx::query_as::<_, ApiKey>(
            "SELECT * FROM api_keys WHERE tenant_id = ? ORDER BY created_at ASC",
        )
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await?;
        Ok(keys)
    }

    /// Revoke a key within the tenant's scope; returns whether a live key was hit
    pub async fn revoke_api_key(&self, tenant_id: &str, key_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE api_keys SET revoked_at = ?
             WHERE id = ? AND tenant_id = ? AND revoked_at IS NULL",
        )
        .bind(Utc::now())
        .bind(key_id)
        .bind(tenant_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Stamp last_used_at; callers fire-and-forget this
    pub async fn touch_api_key(&self, key_id: &str) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(key_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
