//! Tenant persistence

use super::models::Tenant;
use super::{is_unique_violation, Database};
use crate::utils::error::{GatewayError, Result};
use chrono::Utc;
use uuid::Uuid;

impl Database {
    /// Create a tenant; the email is the natural key
    pub async fn create_tenant(&self, name: &str, email: &str) -> Result<Tenant> {
        let tenant = Tenant {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO tenants (id, name, email, created_at) VALUES (?, ?, ?, ?)")
            .bind(&tenant.id)
            .bind(&tenant.name)
            .bind(&tenant.email)
            .bind(tenant.created_at)
            .execute(self.pool())
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    GatewayError::conflict("a tenant with this email already exists")
                } else {
                    GatewayError::Database(e)
                }
            })?;

        Ok(tenant)
    }

    pub async fn tenant_by_id(&self, id: &str) -> Result<Option<Tenant>> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(tenant)
    }
}
