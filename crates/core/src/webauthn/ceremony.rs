use super::attestation::{parse_attestation_object, verify_attestation_statement, AttestationMetadataService};
use super::types::{CeremonyFailure, ClientData, ParsedAuthenticatorData, RegistrationResult};
use crate::security::crypto_provider::CryptoProvider;
use std::sync::Arc;

/// Decode and sanity-check `clientDataJSON`, confirming its `type`, the
/// challenge it carries, and the origin, against what the ceremony expects.
pub fn verify_client_data(
    client_data_json: &[u8],
    expected_type: &str,
    expected_challenge_b64: &str,
    allowed_origins: &[String],
) -> Result<ClientData, CeremonyFailure> {
    let client_data: ClientData =
        serde_json::from_slice(client_data_json).map_err(|_| CeremonyFailure::ChallengeMismatch)?;

    if client_data.client_type != expected_type {
        return Err(CeremonyFailure::ChallengeMismatch);
    }
    if client_data.challenge != expected_challenge_b64 {
        return Err(CeremonyFailure::ChallengeMismatch);
    }
    if !allowed_origins.iter().any(|o| o == &client_data.origin) {
        return Err(CeremonyFailure::OriginMismatch);
    }

    Ok(client_data)
}

fn verify_rp_id_hash(auth_data: &ParsedAuthenticatorData, rp_id: &str, crypto: &Arc<dyn CryptoProvider>) -> Result<(), CeremonyFailure> {
    let expected = crypto.sha256(rp_id.as_bytes());
    if auth_data.rp_id_hash != expected {
        return Err(CeremonyFailure::RpIdMismatch);
    }
    Ok(())
}

/// Run the full 4-step registration verification: client data, rp id hash,
/// user presence/verification flags, and (when attestation other than
/// `none` was presented) the attestation statement signature.
pub async fn verify_registration(
    crypto: &Arc<dyn CryptoProvider>,
    client_data_json: &[u8],
    attestation_object_cbor: &[u8],
    expected_challenge_b64: &str,
    rp_id: &str,
    allowed_origins: &[String],
    require_user_verification: bool,
    accepted_formats: &[crate::credential::AttestationFormat],
    metadata: Option<&Arc<dyn AttestationMetadataService>>,
) -> Result<RegistrationResult, CeremonyFailure> {
    verify_client_data(client_data_json, "webauthn.create", expected_challenge_b64, allowed_origins)?;

    let parsed = parse_attestation_object(attestation_object_cbor).map_err(|_| CeremonyFailure::SignatureInvalid)?;
    verify_rp_id_hash(&parsed.auth_data, rp_id, crypto)?;

    if !parsed.auth_data.flags.user_present {
        return Err(CeremonyFailure::UvRequired);
    }
    if require_user_verification && !parsed.auth_data.flags.user_verified {
        return Err(CeremonyFailure::UvRequired);
    }
    if !accepted_formats.contains(&parsed.format) {
        return Err(CeremonyFailure::AttestationUntrusted);
    }

    let credential_id = parsed
        .auth_data
        .credential_id
        .clone()
        .ok_or(CeremonyFailure::SignatureInvalid)?;
    let public_key_cose = parsed
        .auth_data
        .credential_public_key_cbor
        .clone()
        .ok_or(CeremonyFailure::SignatureInvalid)?;
    let aaguid = parsed.auth_data.aaguid.ok_or(CeremonyFailure::SignatureInvalid)?;

    let client_data_hash = crypto.sha256(client_data_json);
    let attestation_trusted =
        verify_attestation_statement(crypto, &parsed, &client_data_hash, metadata)
            .await
            .map_err(|_| CeremonyFailure::SignatureInvalid)?;

    Ok(RegistrationResult {
        credential_id,
        public_key_cose,
        aaguid,
        sign_count: parsed.auth_data.sign_count,
        backup_eligible: parsed.auth_data.flags.backup_eligible,
        backup_state: parsed.auth_data.flags.backup_state,
        attestation_format: parsed.format,
        attestation_trusted,
    })
}

/// Outcome of a verified authentication assertion, before the counter has
/// been checked against the stored credential (that check belongs to
/// `CredentialService::record_assertion`, which also owns the resulting
/// state transition).
pub struct VerifiedAssertion {
    pub new_sign_count: u32,
    pub user_verified: bool,
}

/// Run the 3-step authentication verification: client data, rp id hash +
/// user presence/verification flags, and the assertion signature over
/// `authenticatorData || sha256(clientDataJSON)` using the credential's
/// stored public key.
pub fn verify_authentication(
    crypto: &Arc<dyn CryptoProvider>,
    client_data_json: &[u8],
    authenticator_data_raw: &[u8],
    signature: &[u8],
    public_key_cose: &[u8],
    expected_challenge_b64: &str,
    rp_id: &str,
    allowed_origins: &[String],
    require_user_verification: bool,
) -> Result<VerifiedAssertion, CeremonyFailure> {
    verify_client_data(client_data_json, "webauthn.get", expected_challenge_b64, allowed_origins)?;

    let auth_data = super::attestation::parse_authenticator_data(authenticator_data_raw)
        .map_err(|_| CeremonyFailure::SignatureInvalid)?;
    verify_rp_id_hash(&auth_data, rp_id, crypto)?;

    if !auth_data.flags.user_present {
        return Err(CeremonyFailure::UvRequired);
    }
    if require_user_verification && !auth_data.flags.user_verified {
        return Err(CeremonyFailure::UvRequired);
    }

    let key = crypto.parse_cose_key(public_key_cose).map_err(|_| CeremonyFailure::SignatureInvalid)?;

    let client_data_hash = crypto.sha256(client_data_json);
    let mut signed_data = authenticator_data_raw.to_vec();
    signed_data.extend_from_slice(&client_data_hash);

    crypto
        .verify_signature(&key, &signed_data, signature)
        .map_err(|_| CeremonyFailure::SignatureInvalid)?;

    Ok(VerifiedAssertion {
        new_sign_count: auth_data.sign_count,
        user_verified: auth_data.flags.user_verified,
    })
}
