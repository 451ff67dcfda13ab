use crate::types::{AttributeId, ContextId, IdentityId, PersonId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of value identifies an `Identity` within a tenant: e-mail,
/// national id, mobile number, or a tenant-defined extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryKeyType {
    Email,
    NationalId,
    Mobile,
    Custom(String),
}

/// Soft-delete-capable lifecycle status shared by identity graph entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Active,
    Inactive,
    Deleted,
}

/// Role-specific verification depth for a `Context`. Monotonically
/// non-decreasing: a context can never report a lower level than it has
/// already reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationLevel {
    None,
    Basic,
    Standard,
    Enhanced,
    Complete,
}

/// Verification status of a single `Attribute` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeVerificationStatus {
    Pending,
    Verified,
    Rejected,
}

/// Data sensitivity tier. `High` and above trigger automatic
/// re-verification scheduling whenever the attribute's value changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    Low,
    Medium,
    High,
    Critical,
}

impl Sensitivity {
    pub fn requires_auto_reverification(&self) -> bool {
        *self >= Sensitivity::High
    }
}

/// A master human record. Holds no identifying data itself; every
/// identifying attribute lives on one of its `Identity` children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub tenant_id: TenantId,
    pub status: EntityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One (type, value) identifying key for a `Person`, unique per tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub tenant_id: TenantId,
    pub person_id: PersonId,
    pub primary_key_type: PrimaryKeyType,
    pub primary_key_value: String,
    pub status: EntityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One entry of a context's bounded trust-score history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrustScoreEntry {
    pub score: f64,
    pub recorded_at: DateTime<Utc>,
}

/// A role-specific view of an `Identity` (e.g. "citizen", "patient",
/// "customer"), carrying its own verification level and trust score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub id: ContextId,
    pub tenant_id: TenantId,
    pub identity_id: IdentityId,
    pub context_type: String,
    pub verification_level: VerificationLevel,
    pub trust_score: f64,
    pub trust_score_history: Vec<TrustScoreEntry>,
    pub significant_trust_degradation: bool,
    pub status: EntityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Bound on `trust_score_history` length.
pub const TRUST_SCORE_HISTORY_LIMIT: usize = 30;

/// A single key/value fact attached to a `Context`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute {
    pub id: AttributeId,
    pub tenant_id: TenantId,
    pub context_id: ContextId,
    pub key: String,
    pub value: String,
    pub sensitivity: Sensitivity,
    pub verification_status: AttributeVerificationStatus,
    pub verification_source: Option<String>,
    pub verification_notes: Option<String>,
    pub evidence_metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
