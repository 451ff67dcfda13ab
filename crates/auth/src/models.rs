//! User and tenant aggregate types (spec §3 User, §4.7).
//!
//! A `User` is the account-level aggregate behind every WebAuthn credential,
//! session, and risk profile: it owns lockout state and the tenant-scoped
//! uniqueness slot for email/username. It does not carry a password hash or
//! any MFA secret of its own — this platform is WebAuthn-first, and
//! `iam-core`'s session manager and risk engine already own step-up policy.

use chrono::{DateTime, Utc};
use iam_core::{TenantId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use sqlx::FromRow;
use uuid::Uuid;

/// A tenant, the isolation boundary every other aggregate partitions on.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub schema_name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn tenant_id(&self) -> TenantId {
        TenantId(self.id)
    }
}

/// One account within a tenant (spec §3 User).
///
/// `email`/`username` are stored already-lowercased; the repository never
/// normalizes on the caller's behalf; [`crate::service::UserService`] is the
/// only place normalization happens.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub display_name: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_locked: bool,
    pub locked_until: Option<DateTime<Utc>>,
    pub failed_login_attempts: i32,
    pub locale: String,
    pub timezone: String,
    pub preferences: Json,
    pub metadata: Json,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn user_id(&self) -> UserId {
        UserId(self.id)
    }

    /// A locked user whose `locked_until` has already passed is effectively
    /// unlocked; the repository doesn't race to clear the flag proactively,
    /// every read recomputes it (spec §3 User invariant).
    pub fn is_currently_locked(&self, now: DateTime<Utc>) -> bool {
        self.is_locked && self.locked_until.map(|until| until > now).unwrap_or(false)
    }

    pub fn is_soft_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Tombstone form used to free the uniqueness slot on soft-delete
    /// (spec §4.7): `deleted_<id>@deleted.local` / `deleted_<id>`.
    pub fn tombstone_email(id: Uuid) -> String {
        format!("deleted_{id}@deleted.local")
    }

    pub fn tombstone_username(id: Uuid) -> String {
        format!("deleted_{id}")
    }
}

/// Input to [`crate::service::UserService::create_user`]; normalization and
/// defaulting happen in the service, not here.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub display_name: String,
    pub locale: Option<String>,
    pub timezone: Option<String>,
    pub preferences: Option<Json>,
    pub metadata: Option<Json>,
}

/// Outcome of a login attempt as reported to
/// [`crate::service::UserService::record_login_outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Success,
    Failure,
}
