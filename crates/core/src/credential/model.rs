use crate::types::{CredentialId, TenantId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Broad credential family. WebAuthn is the only kind this platform accepts
/// registrations for today; the field exists so a future credential type
/// doesn't require a schema migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    Webauthn,
}

/// Authenticator attachment as reported by the client during registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceType {
    Platform,
    CrossPlatform,
    Unknown,
}

/// Security flags derived from a credential's posture, re-evaluated on
/// every authentication and by the periodic integrity sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CredentialSecurityFlags {
    /// Set once a counter anomaly has been observed, even if the
    /// credential was later cleared back to `Active` by an operator.
    pub has_counter_anomaly_history: bool,
    /// Set when the authenticator's attestation could not be validated
    /// against a trusted root, independent of whether attestation was
    /// required for acceptance.
    pub attestation_untrusted: bool,
}

/// Attestation statement format an authenticator used at registration.
/// `AndroidSafetynet` is the legacy name retained for authenticators that
/// predate the Play Integrity migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttestationFormat {
    None,
    Packed,
    FidoU2f,
    AndroidKey,
    Tpm,
    Apple,
    AndroidSafetynet,
}

impl std::fmt::Display for AttestationFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Lifecycle state of a registered credential. Transitions only move
/// forward: `Active -> Suspicious -> Compromised|Revoked`, or `Active ->
/// Expired`. Nothing ever moves back to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialState {
    Active,
    /// A single counter anomaly was observed; the credential still
    /// authenticates but is flagged for review.
    Suspicious,
    /// Integrity violation confirmed (counter rollback, or two assertions
    /// with the same counter value): the credential is quarantined and can
    /// no longer authenticate.
    Compromised,
    Revoked,
    Expired,
}

impl CredentialState {
    /// Whether a credential in this state may still complete an
    /// authentication ceremony.
    pub fn can_authenticate(&self) -> bool {
        matches!(self, CredentialState::Active | CredentialState::Suspicious)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub credential_type: CredentialType,
    pub device_type: DeviceType,
    /// Raw credential ID bytes as supplied by the authenticator, base64url
    /// encoded for storage and transport.
    pub credential_id_b64: String,
    /// SHA-256 of the raw credential ID bytes, hex-encoded. This, not
    /// `credential_id_b64`, is the indexed lookup key: it lets the store
    /// find a credential by a value an attacker who dumps the table still
    /// cannot use to forge an assertion.
    pub credential_id_hash: String,
    /// COSE_Key CBOR bytes of the public key, as returned by the
    /// authenticator at registration.
    pub public_key_cose: Vec<u8>,
    /// Opaque, encrypted attestation statement blob, kept for forensic
    /// replay but never read on the authentication hot path.
    pub attestation_blob: Option<Vec<u8>>,
    pub sign_count: u32,
    pub usage_count: u64,
    pub aaguid: Uuid,
    pub attestation_format: AttestationFormat,
    /// Attestation conveyance preference the registration ceremony was run
    /// with (none/indirect/direct/enterprise), distinct from
    /// `attestation_format` above.
    pub attestation_type: crate::webauthn::AttestationConveyance,
    pub transports: Vec<String>,
    pub state: CredentialState,
    pub backup_eligible: bool,
    pub backup_state: bool,
    /// Composite risk score in `[0, 100]` carried over from the most recent
    /// assessment that touched this credential.
    pub risk_score: f64,
    pub security_flags: CredentialSecurityFlags,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    /// Human-readable label the user assigned at registration (e.g. "work laptop").
    pub label: Option<String>,
}

impl Credential {
    /// Decide the next state after observing `new_sign_count` against the
    /// credential's stored count.
    ///
    /// A zero counter on both sides is the one case WebAuthn permits
    /// without ordering (authenticators that never implement a counter
    /// report zero forever); anything else must strictly increase.
    pub fn counter_check(&self, new_sign_count: u32) -> CounterCheckOutcome {
        if self.sign_count == 0 && new_sign_count == 0 {
            return CounterCheckOutcome::Accept;
        }
        if new_sign_count > self.sign_count {
            CounterCheckOutcome::Accept
        } else {
            CounterCheckOutcome::Reject
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterCheckOutcome {
    Accept,
    /// Counter did not strictly increase: possible cloned authenticator.
    Reject,
}
