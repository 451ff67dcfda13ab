use crate::types::{ChallengeId, CredentialId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a registration or authentication ceremony was refused. Every variant
/// here corresponds 1:1 to a failure kind named in the component design and
/// produces an audit event of severity >= medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CeremonyFailure {
    ChallengeMismatch,
    OriginMismatch,
    RpIdMismatch,
    SignatureInvalid,
    CounterRollback,
    UvRequired,
    CredentialRevoked,
    CredentialUnknown,
    AttestationUntrusted,
    ExpiredChallenge,
    /// Caller requested `enterprise` attestation conveyance on a tenant
    /// whose policy does not permit it (spec §4.1 step 2).
    EnterpriseAttestationNotPermitted,
}

impl std::fmt::Display for CeremonyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// What a challenge was minted for. Registration and authentication
/// challenges live in separate keyspaces so a challenge issued for one
/// ceremony can never be replayed against the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengePurpose {
    Registration,
    Authentication,
}

/// Server-held challenge record. Single-use: `consume` in the challenge
/// store atomically deletes it, so a concurrent replay of the same
/// challenge value can win at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChallenge {
    pub id: ChallengeId,
    pub purpose: ChallengePurpose,
    pub user_id: Option<UserId>,
    pub challenge_b64: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl StoredChallenge {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Authenticator attachment / user-verification constraints the relying
/// party asks the client to enforce during registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatorSelection {
    pub authenticator_attachment: Option<String>,
    pub resident_key: String,
    pub user_verification: String,
}

/// Attestation conveyance preference a registration ceremony was run
/// with — spec §3 Credential's `attestation-type`, distinct from
/// `attestation_format` (the CBOR statement format, e.g. `packed`). This
/// is the value sent in the creation options' `attestation` field and
/// echoed back onto the persisted `Credential`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyance {
    None,
    Indirect,
    Direct,
    Enterprise,
}

impl AttestationConveyance {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttestationConveyance::None => "none",
            AttestationConveyance::Indirect => "indirect",
            AttestationConveyance::Direct => "direct",
            AttestationConveyance::Enterprise => "enterprise",
        }
    }
}

/// One entry of `pubKeyCredParams`: a COSE algorithm this relying party is
/// willing to accept, in preference order (ES256 before RS256).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PubKeyCredParam {
    pub alg: i64,
    #[serde(rename = "type")]
    pub cred_type: &'static str,
}

/// Options returned from `beginRegistration`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationOptions {
    pub challenge_b64: String,
    pub rp_id: String,
    pub rp_name: String,
    pub user_id_b64: String,
    pub user_name: String,
    pub user_display_name: String,
    pub pub_key_cred_params: Vec<PubKeyCredParam>,
    pub exclude_credential_ids_b64: Vec<String>,
    pub authenticator_selection: AuthenticatorSelection,
    pub attestation: AttestationConveyance,
    pub timeout_ms: u64,
}

/// Options returned from `beginAuthentication`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationOptions {
    pub challenge_b64: String,
    pub rp_id: String,
    pub allow_credential_ids_b64: Vec<String>,
    pub user_verification: String,
    pub timeout_ms: u64,
}

/// The `clientDataJSON` payload, decoded. Only the fields the ceremony
/// cares about are modeled; everything else is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientData {
    #[serde(rename = "type")]
    pub client_type: String,
    pub challenge: String,
    pub origin: String,
    #[serde(rename = "crossOrigin", default)]
    pub cross_origin: bool,
}

/// Flags byte of authenticator data, unpacked.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthenticatorDataFlags {
    pub user_present: bool,
    pub user_verified: bool,
    pub backup_eligible: bool,
    pub backup_state: bool,
    pub attested_credential_data_included: bool,
    pub extension_data_included: bool,
}

impl AuthenticatorDataFlags {
    pub fn from_byte(byte: u8) -> Self {
        Self {
            user_present: byte & 0x01 != 0,
            user_verified: byte & 0x04 != 0,
            backup_eligible: byte & 0x08 != 0,
            backup_state: byte & 0x10 != 0,
            attested_credential_data_included: byte & 0x40 != 0,
            extension_data_included: byte & 0x80 != 0,
        }
    }
}

/// Parsed `authenticatorData`, as produced by both registration and
/// authentication ceremonies.
#[derive(Debug, Clone)]
pub struct ParsedAuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: AuthenticatorDataFlags,
    pub sign_count: u32,
    pub aaguid: Option<Uuid>,
    pub credential_id: Option<Vec<u8>>,
    pub credential_public_key_cbor: Option<Vec<u8>>,
    pub raw: Vec<u8>,
}

/// Outcome of a completed, trusted registration ceremony: everything the
/// credential store needs to persist a new `Credential`.
#[derive(Debug, Clone)]
pub struct RegistrationResult {
    pub credential_id: Vec<u8>,
    pub public_key_cose: Vec<u8>,
    pub aaguid: Uuid,
    pub sign_count: u32,
    pub backup_eligible: bool,
    pub backup_state: bool,
    pub attestation_format: crate::credential::AttestationFormat,
    pub attestation_trusted: bool,
}

/// The verified principal returned from a completed authentication
/// ceremony, handed to the session manager to mint a session.
#[derive(Debug, Clone, Copy)]
pub struct VerifiedPrincipal {
    pub user_id: UserId,
    pub credential_id: CredentialId,
}
