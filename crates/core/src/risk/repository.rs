use super::types::{RiskEvent, RiskEventStatus, RiskProfile};
use crate::database::TenantPool;
use crate::error::{Error, Result};
use crate::types::{RiskEventId, TenantId, UserId};
use async_trait::async_trait;
use sqlx::Row;

/// Persistence boundary for the per-(tenant, user) risk profile.
/// Optimistic concurrency via `version`: `upsert` fails with `Conflict` if
/// the stored version has moved since the caller last read it.
#[async_trait]
pub trait RiskProfileRepository: Send + Sync {
    async fn get(&self, tenant: &TenantPool, tenant_id: TenantId, user_id: UserId) -> Result<Option<RiskProfile>>;
    async fn upsert(&self, tenant: &TenantPool, profile: &RiskProfile) -> Result<()>;
}

/// Persistence boundary for append-only risk events.
#[async_trait]
pub trait RiskEventRepository: Send + Sync {
    async fn create(&self, tenant: &TenantPool, event: &RiskEvent) -> Result<()>;
    async fn get(&self, tenant: &TenantPool, tenant_id: TenantId, id: RiskEventId) -> Result<Option<RiskEvent>>;
    async fn update_status(
        &self,
        tenant: &TenantPool,
        tenant_id: TenantId,
        id: RiskEventId,
        status: RiskEventStatus,
        resolved_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<()>;
    async fn list_recent_by_user(
        &self,
        tenant: &TenantPool,
        tenant_id: TenantId,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<RiskEvent>>;
}

pub struct DatabaseRiskRepository;

impl DatabaseRiskRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn initialize(&self, tenant: &TenantPool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS risk_profiles (
                tenant_id UUID NOT NULL,
                user_id UUID NOT NULL,
                current_score DOUBLE PRECISION NOT NULL,
                level TEXT NOT NULL,
                version BIGINT NOT NULL,
                data JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (tenant_id, user_id)
            )
            "#,
        )
        .execute(tenant.get())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS risk_events (
                id UUID PRIMARY KEY,
                tenant_id UUID NOT NULL,
                user_id UUID NOT NULL,
                status TEXT NOT NULL,
                score DOUBLE PRECISION NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL
            )
            "#,
        )
        .execute(tenant.get())
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS risk_events_user_idx ON risk_events (tenant_id, user_id, created_at DESC)")
            .execute(tenant.get())
            .await?;

        Ok(())
    }
}

#[async_trait]
impl RiskProfileRepository for DatabaseRiskRepository {
    async fn get(&self, tenant: &TenantPool, tenant_id: TenantId, user_id: UserId) -> Result<Option<RiskProfile>> {
        let row = sqlx::query("SELECT data FROM risk_profiles WHERE tenant_id = $1 AND user_id = $2")
            .bind(tenant_id.0)
            .bind(user_id.0)
            .fetch_optional(tenant.get())
            .await?;

        match row {
            Some(row) => {
                let data: serde_json::Value = row.try_get("data")?;
                let profile: RiskProfile = serde_json::from_value(data)?;
                Ok(Some(profile))
            }
            None => Ok(None),
        }
    }

    async fn upsert(&self, tenant: &TenantPool, profile: &RiskProfile) -> Result<()> {
        let data = serde_json::to_value(profile)?;

        let result = sqlx::query(
            r#"
            INSERT INTO risk_profiles (tenant_id, user_id, current_score, level, version, data, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tenant_id, user_id) DO UPDATE
            SET current_score = EXCLUDED.current_score,
                level = EXCLUDED.level,
                version = EXCLUDED.version,
                data = EXCLUDED.data,
                updated_at = EXCLUDED.updated_at
            WHERE risk_profiles.version = $8
            "#,
        )
        .bind(profile.tenant_id.0)
        .bind(profile.user_id.0)
        .bind(profile.current_score)
        .bind(format!("{:?}", profile.level))
        .bind(profile.version)
        .bind(data)
        .bind(profile.updated_at)
        .bind(profile.version - 1)
        .execute(tenant.get())
        .await?;

        if result.rows_affected() == 0 && profile.version > 0 {
            return Err(Error::conflict("risk profile was concurrently modified"));
        }

        Ok(())
    }
}

#[async_trait]
impl RiskEventRepository for DatabaseRiskRepository {
    async fn create(&self, tenant: &TenantPool, event: &RiskEvent) -> Result<()> {
        let data = serde_json::to_value(event)?;
        sqlx::query(
            r#"
            INSERT INTO risk_events (id, tenant_id, user_id, status, score, created_at, data)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.id.0)
        .bind(event.tenant_id.0)
        .bind(event.user_id.0)
        .bind(format!("{:?}", event.status))
        .bind(event.score)
        .bind(event.created_at)
        .bind(data)
        .execute(tenant.get())
        .await?;
        Ok(())
    }

    async fn get(&self, tenant: &TenantPool, tenant_id: TenantId, id: RiskEventId) -> Result<Option<RiskEvent>> {
        let row = sqlx::query("SELECT data FROM risk_events WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.0)
            .bind(id.0)
            .fetch_optional(tenant.get())
            .await?;

        match row {
            Some(row) => {
                let data: serde_json::Value = row.try_get("data")?;
                Ok(Some(serde_json::from_value(data)?))
            }
            None => Ok(None),
        }
    }

    async fn update_status(
        &self,
        tenant: &TenantPool,
        tenant_id: TenantId,
        id: RiskEventId,
        status: RiskEventStatus,
        resolved_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<()> {
        let mut event = self
            .get(tenant, tenant_id, id)
            .await?
            .ok_or_else(|| Error::not_found("risk event not found"))?;

        if !event.status.can_transition_to(status) {
            return Err(Error::precondition_failed(format!(
                "cannot transition risk event from {:?} to {:?}",
                event.status, status
            )));
        }

        event.status = status;
        event.resolved_at = resolved_at;
        let data = serde_json::to_value(&event)?;

        sqlx::query("UPDATE risk_events SET status = $1, data = $2 WHERE tenant_id = $3 AND id = $4")
            .bind(format!("{:?}", status))
            .bind(data)
            .bind(tenant_id.0)
            .bind(id.0)
            .execute(tenant.get())
            .await?;

        Ok(())
    }

    async fn list_recent_by_user(
        &self,
        tenant: &TenantPool,
        tenant_id: TenantId,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<RiskEvent>> {
        let rows = sqlx::query(
            "SELECT data FROM risk_events WHERE tenant_id = $1 AND user_id = $2 ORDER BY created_at DESC LIMIT $3",
        )
        .bind(tenant_id.0)
        .bind(user_id.0)
        .bind(limit)
        .fetch_all(tenant.get())
        .await?;

        rows.into_iter()
            .map(|row| {
                let data: serde_json::Value = row.try_get("data")?;
                Ok(serde_json::from_value(data)?)
            })
            .collect()
    }
}
