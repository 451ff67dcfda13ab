//! Persistence for the tenant/user aggregate (spec §4.7).
//!
//! Mirrors `iam-core`'s repository shape: a trait per aggregate plus a
//! `Database*Repository` that speaks raw `sqlx` against the schema in
//! `crates/core/sql/tenant_schema.sql`. `TenantRepository` touches the main
//! pool (tenants live in `public`); `UserRepository` is always handed a
//! tenant-scoped [`TenantPool`] and never queries across tenants.

use crate::models::{Tenant, User};
use async_trait::async_trait;
use iam_core::database::{DatabasePool, TenantPool};
use iam_core::error::Result;
use iam_core::{Error, TenantId, UserId};
use uuid::Uuid;

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn create(&self, name: &str, schema_name: &str) -> Result<Tenant>;
    async fn get_by_id(&self, id: TenantId) -> Result<Option<Tenant>>;
    async fn get_by_schema(&self, schema_name: &str) -> Result<Option<Tenant>>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, tenant: &TenantPool, tenant_id: TenantId, user: &User) -> Result<()>;
    async fn get_by_id(&self, tenant: &TenantPool, id: UserId) -> Result<Option<User>>;
    async fn get_by_email(&self, tenant: &TenantPool, normalized_email: &str) -> Result<Option<User>>;
    async fn get_by_username(&self, tenant: &TenantPool, normalized_username: &str) -> Result<Option<User>>;
    async fn list(&self, tenant: &TenantPool, include_deleted: bool, limit: i64, offset: i64) -> Result<Vec<User>>;
    /// Optimistic-concurrency update: `user.version` must match the stored
    /// row or the update is refused as a conflict (spec §6 "idempotent
    /// write semantics; optimistic concurrency via a version field").
    async fn update(&self, tenant: &TenantPool, user: &User) -> Result<User>;
    async fn count(&self, tenant: &TenantPool) -> Result<i64>;

    /// No-op identity hook; kept so callers can thread a `TenantId` through
    /// for logging without every repository impl having to accept it on
    /// every method (the `TenantPool` already pins the schema).
    fn tenant_marker(&self, tenant_id: TenantId) -> TenantId {
        tenant_id
    }
}

pub struct DatabaseTenantRepository {
    db: DatabasePool,
}

impl DatabaseTenantRepository {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TenantRepository for DatabaseTenantRepository {
    async fn create(&self, name: &str, schema_name: &str) -> Result<Tenant> {
        let tenant = sqlx::query_as::<_, Tenant>(
            "INSERT INTO public.tenants (id, name, schema_name, status, created_at, updated_at) \
             VALUES ($1, $2, $3, 'active', NOW(), NOW()) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(schema_name)
        .fetch_one(&self.db.main_pool)
        .await?;

        self.db.create_tenant_schema(schema_name).await?;
        Ok(tenant)
    }

    async fn get_by_id(&self, id: TenantId) -> Result<Option<Tenant>> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM public.tenants WHERE id = $1 AND status != 'deleted'")
            .bind(id.0)
            .fetch_optional(&self.db.main_pool)
            .await?;
        Ok(tenant)
    }

    async fn get_by_schema(&self, schema_name: &str) -> Result<Option<Tenant>> {
        let tenant = sqlx::query_as::<_, Tenant>(
            "SELECT * FROM public.tenants WHERE schema_name = $1 AND status != 'deleted'",
        )
        .bind(schema_name)
        .fetch_optional(&self.db.main_pool)
        .await?;
        Ok(tenant)
    }
}

pub struct DatabaseUserRepository;

impl DatabaseUserRepository {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DatabaseUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserRepository for DatabaseUserRepository {
    async fn create(&self, tenant: &TenantPool, _tenant_id: TenantId, user: &User) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, email, username, display_name, is_active, is_verified, is_locked, \
             locked_until, failed_login_attempts, locale, timezone, preferences, metadata, deleted_at, \
             version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(user.is_active)
        .bind(user.is_verified)
        .bind(user.is_locked)
        .bind(user.locked_until)
        .bind(user.failed_login_attempts)
        .bind(&user.locale)
        .bind(&user.timezone)
        .bind(&user.preferences)
        .bind(&user.metadata)
        .bind(user.deleted_at)
        .bind(user.version)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(tenant.get())
        .await
        .map_err(|e| map_unique_violation(e, "email or username already in use within this tenant"))?;

        Ok(())
    }

    async fn get_by_id(&self, tenant: &TenantPool, id: UserId) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id.0)
            .fetch_optional(tenant.get())
            .await?;
        Ok(user)
    }

    async fn get_by_email(&self, tenant: &TenantPool, normalized_email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1 AND deleted_at IS NULL")
            .bind(normalized_email)
            .fetch_optional(tenant.get())
            .await?;
        Ok(user)
    }

    async fn get_by_username(&self, tenant: &TenantPool, normalized_username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1 AND deleted_at IS NULL")
            .bind(normalized_username)
            .fetch_optional(tenant.get())
            .await?;
        Ok(user)
    }

    async fn list(&self, tenant: &TenantPool, include_deleted: bool, limit: i64, offset: i64) -> Result<Vec<User>> {
        let users = if include_deleted {
            sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2")
                .bind(limit)
                .bind(offset)
                .fetch_all(tenant.get())
                .await?
        } else {
            sqlx::query_as::<_, User>(
                "SELECT * FROM users WHERE deleted_at IS NULL ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(tenant.get())
            .await?
        };
        Ok(users)
    }

    async fn update(&self, tenant: &TenantPool, user: &User) -> Result<User> {
        let updated = sqlx::query_as::<_, User>(
            "UPDATE users SET email = $1, username = $2, display_name = $3, is_active = $4, \
             is_verified = $5, is_locked = $6, locked_until = $7, failed_login_attempts = $8, \
             locale = $9, timezone = $10, preferences = $11, metadata = $12, deleted_at = $13, \
             version = version + 1, updated_at = NOW() \
             WHERE id = $14 AND version = $15 \
             RETURNING *",
        )
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(user.is_active)
        .bind(user.is_verified)
        .bind(user.is_locked)
        .bind(user.locked_until)
        .bind(user.failed_login_attempts)
        .bind(&user.locale)
        .bind(&user.timezone)
        .bind(&user.preferences)
        .bind(&user.metadata)
        .bind(user.deleted_at)
        .bind(user.id)
        .bind(user.version)
        .fetch_optional(tenant.get())
        .await
        .map_err(|e| map_unique_violation(e, "email or username already in use within this tenant"))?;

        updated.ok_or_else(|| {
            Error::conflict("user was concurrently modified; reload and retry").with_details(format!(
                "user {} expected version {}",
                user.id, user.version
            ))
        })
    }

    async fn count(&self, tenant: &TenantPool) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE deleted_at IS NULL")
            .fetch_one(tenant.get())
            .await?;
        Ok(count)
    }
}

fn map_unique_violation(err: sqlx::Error, message: &str) -> Error {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some("23505") {
            return Error::conflict(message.to_string());
        }
    }
    Error::from(err)
}
