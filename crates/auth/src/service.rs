//! Tenant/user aggregate service (spec §4.7).
//!
//! Owns the parts of the user lifecycle that the WebAuthn engine, session
//! manager, and risk engine don't: account creation, failed-login lockout,
//! and soft-delete. Every authentication failure path in the platform
//! (credential lookup miss, assertion rejected, risk engine refusal) is
//! expected to call [`UserService::record_login_outcome`] so the lockout
//! counter stays accurate even though the credential check itself lives in
//! `iam-core`.

use crate::models::{LoginOutcome, NewUser, Tenant, User};
use crate::repository::{TenantRepository, UserRepository};
use crate::validation::{normalize_email, normalize_username};
use chrono::Utc;
use iam_core::audit::{AuditEvent, AuditLogger, EventSeverity, EventType};
use iam_core::config::UserPolicyConfig;
use iam_core::database::{DatabasePool, TenantPool};
use iam_core::error::{Error, Result};
use iam_core::{TenantId, UserId};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Orchestrates the tenant/user aggregate: lockout policy, soft-delete, and
/// the audit trail for both.
pub struct UserService {
    db: DatabasePool,
    tenants: Arc<dyn TenantRepository>,
    users: Arc<dyn UserRepository>,
    audit: Arc<AuditLogger>,
    policy: UserPolicyConfig,
}

impl UserService {
    pub fn new(
        db: DatabasePool,
        tenants: Arc<dyn TenantRepository>,
        users: Arc<dyn UserRepository>,
        audit: Arc<AuditLogger>,
        policy: UserPolicyConfig,
    ) -> Self {
        Self {
            db,
            tenants,
            users,
            audit,
            policy,
        }
    }

    async fn tenant_pool(&self, tenant_id: TenantId, schema_name: &str) -> Result<TenantPool> {
        let ctx = iam_core::TenantContext::new(tenant_id, schema_name.to_string());
        self.db.get_tenant_pool(&ctx).await
    }

    pub async fn create_tenant(&self, name: &str) -> Result<Tenant> {
        let schema_name = iam_core::utils::generate_schema_name();
        self.tenants.create(name, &schema_name).await
    }

    pub async fn get_tenant(&self, id: TenantId) -> Result<Tenant> {
        self.tenants
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found("tenant not found"))
    }

    /// Creates a user with tenant-scoped (email, username) uniqueness
    /// (spec §3 User). Both are stored lowercase.
    pub async fn create_user(&self, tenant: &Tenant, input: NewUser) -> Result<User> {
        let email = normalize_email(&input.email)?;
        let username = normalize_username(&input.username)?;
        let pool = self.tenant_pool(tenant.tenant_id(), &tenant.schema_name).await?;

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email,
            username,
            display_name: input.display_name,
            is_active: true,
            is_verified: false,
            is_locked: false,
            locked_until: None,
            failed_login_attempts: 0,
            locale: input.locale.unwrap_or_else(|| "en-US".to_string()),
            timezone: input.timezone.unwrap_or_else(|| "UTC".to_string()),
            preferences: input.preferences.unwrap_or_else(|| json!({})),
            metadata: input.metadata.unwrap_or_else(|| json!({})),
            deleted_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        self.users.create(&pool, tenant.tenant_id(), &user).await?;

        self.audit
            .log_event(
                AuditEvent::builder(EventType::UserCreated, format!("user {} created", user.id))
                    .tenant_id(tenant.id.to_string())
                    .resource("user", user.id.to_string())
                    .severity(EventSeverity::Info)
                    .build(),
            )
            .await?;

        Ok(user)
    }

    /// Fetches a user by id, applying the lockout-expiry invariant: a
    /// locked user whose `locked_until` has passed is unlocked in the same
    /// read (spec §3 User). Soft-deleted users are still returned here —
    /// callers that must exclude them use [`UserRepository::get_by_email`]
    /// / [`UserRepository::get_by_username`], which already filter
    /// `deleted_at IS NULL`.
    pub async fn get_user(&self, tenant: &Tenant, id: UserId) -> Result<User> {
        let pool = self.tenant_pool(tenant.tenant_id(), &tenant.schema_name).await?;
        let user = self
            .users
            .get_by_id(&pool, id)
            .await?
            .ok_or_else(|| Error::not_found("user not found"))?;
        self.settle_expired_lock(&pool, user).await
    }

    pub async fn get_user_by_email(&self, tenant: &Tenant, email: &str) -> Result<Option<User>> {
        let normalized = normalize_email(email)?;
        let pool = self.tenant_pool(tenant.tenant_id(), &tenant.schema_name).await?;
        match self.users.get_by_email(&pool, &normalized).await? {
            Some(user) => Ok(Some(self.settle_expired_lock(&pool, user).await?)),
            None => Ok(None),
        }
    }

    pub async fn get_user_by_username(&self, tenant: &Tenant, username: &str) -> Result<Option<User>> {
        let normalized = normalize_username(username)?;
        let pool = self.tenant_pool(tenant.tenant_id(), &tenant.schema_name).await?;
        match self.users.get_by_username(&pool, &normalized).await? {
            Some(user) => Ok(Some(self.settle_expired_lock(&pool, user).await?)),
            None => Ok(None),
        }
    }

    async fn settle_expired_lock(&self, pool: &TenantPool, mut user: User) -> Result<User> {
        let now = Utc::now();
        if user.is_locked && !user.is_currently_locked(now) {
            user.is_locked = false;
            user.locked_until = None;
            user = self.users.update(pool, &user).await?;
        }
        Ok(user)
    }

    /// Refuses the caller before the WebAuthn engine is even invoked if the
    /// account is currently locked (spec end-to-end scenario 4: "a sixth
    /// attempt returns `permission_denied(account_locked)` without invoking
    /// the WebAuthn engine").
    pub fn check_not_locked(&self, user: &User) -> Result<()> {
        if user.is_currently_locked(Utc::now()) {
            return Err(Error::permission_denied("account is locked").with_details("account_locked"));
        }
        Ok(())
    }

    /// Applies the lockout state machine (spec §4.7): a successful login
    /// resets the failed-attempt counter; a failed login increments it and,
    /// on reaching `user.maxFailedAttempts` (default 5), locks the account
    /// for `user.lockoutMinutes` (default 30) and appends an `AccountLocked`
    /// audit event of severity high.
    pub async fn record_login_outcome(&self, tenant: &Tenant, user: &User, outcome: LoginOutcome) -> Result<User> {
        let pool = self.tenant_pool(tenant.tenant_id(), &tenant.schema_name).await?;
        let mut updated = user.clone();

        match outcome {
            LoginOutcome::Success => {
                updated.failed_login_attempts = 0;
                updated.is_locked = false;
                updated.locked_until = None;
                let saved = self.users.update(&pool, &updated).await?;
                return Ok(saved);
            }
            LoginOutcome::Failure => {
                updated.failed_login_attempts += 1;
            }
        }

        let just_locked = updated.failed_login_attempts >= self.policy.max_failed_attempts as i32 && !updated.is_locked;
        if just_locked {
            updated.is_locked = true;
            updated.locked_until = Some(Utc::now() + self.policy.lockout_duration());
        }

        let saved = self.users.update(&pool, &updated).await?;

        if just_locked {
            self.audit
                .log_event(
                    AuditEvent::builder(
                        EventType::AccountLocked,
                        format!(
                            "account_lockout: user {} locked after {} consecutive failed logins",
                            saved.id, saved.failed_login_attempts
                        ),
                    )
                    .tenant_id(tenant.id.to_string())
                    .resource("user", saved.id.to_string())
                    .severity(EventSeverity::High)
                    .metadata("failed_attempts", json!(saved.failed_login_attempts))
                    .metadata("locked_until", json!(saved.locked_until))
                    .build(),
                )
                .await?;
        }

        Ok(saved)
    }

    /// Soft-delete: rewrites email/username to the tombstone form and
    /// clears `is_active` (spec §4.7), freeing the uniqueness slot for
    /// reuse without a physical delete.
    pub async fn soft_delete(&self, tenant: &Tenant, user: &User) -> Result<User> {
        let pool = self.tenant_pool(tenant.tenant_id(), &tenant.schema_name).await?;
        let mut updated = user.clone();
        updated.email = User::tombstone_email(updated.id);
        updated.username = User::tombstone_username(updated.id);
        updated.is_active = false;
        updated.deleted_at = Some(Utc::now());

        let saved = self.users.update(&pool, &updated).await?;

        self.audit
            .log_event(
                AuditEvent::builder(EventType::UserDeactivated, format!("user {} soft-deleted", saved.id))
                    .tenant_id(tenant.id.to_string())
                    .resource("user", saved.id.to_string())
                    .severity(EventSeverity::Medium)
                    .build(),
            )
            .await?;

        Ok(saved)
    }

    pub async fn list_users(&self, tenant: &Tenant, include_deleted: bool, limit: i64, offset: i64) -> Result<Vec<User>> {
        let pool = self.tenant_pool(tenant.tenant_id(), &tenant.schema_name).await?;
        self.users.list(&pool, include_deleted, limit, offset).await
    }

    pub async fn count_users(&self, tenant: &Tenant) -> Result<i64> {
        let pool = self.tenant_pool(tenant.tenant_id(), &tenant.schema_name).await?;
        self.users.count(&pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use chrono::Duration;

    fn sample_user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            username: "user".to_string(),
            display_name: "User".to_string(),
            is_active: true,
            is_verified: false,
            is_locked: false,
            locked_until: None,
            failed_login_attempts: 0,
            locale: "en-US".to_string(),
            timezone: "UTC".to_string(),
            preferences: json!({}),
            metadata: json!({}),
            deleted_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn lock_expiry_is_effective_on_read() {
        let mut user = sample_user();
        user.is_locked = true;
        user.locked_until = Some(Utc::now() - Duration::minutes(1));
        assert!(!user.is_currently_locked(Utc::now()));
    }

    #[test]
    fn lock_still_active_before_expiry() {
        let mut user = sample_user();
        user.is_locked = true;
        user.locked_until = Some(Utc::now() + Duration::minutes(10));
        assert!(user.is_currently_locked(Utc::now()));
    }

    #[test]
    fn tombstone_form_matches_spec() {
        let id = Uuid::new_v4();
        assert_eq!(User::tombstone_email(id), format!("deleted_{id}@deleted.local"));
        assert_eq!(User::tombstone_username(id), format!("deleted_{id}"));
    }
}
