use super::attestation::AttestationMetadataService;
use super::ceremony::{verify_authentication, verify_registration};
use super::challenge::ChallengeStore;
use super::types::{
    AttestationConveyance, AuthenticationOptions, AuthenticatorSelection, CeremonyFailure, ChallengePurpose,
    PubKeyCredParam, RegistrationOptions, VerifiedPrincipal,
};
use crate::audit::{AuditLogger, EventSeverity, EventType};
use crate::credential::{AttestationFormat, Credential, CredentialService, DeviceType};
use crate::database::TenantPool;
use crate::error::{Error, Result};
use crate::security::crypto_provider::CryptoProvider;
use crate::types::{TenantContext, UserId};
use chrono::Duration;
use std::sync::Arc;

/// Relying-party policy the engine enforces on every ceremony. Constructed
/// from configuration at startup; immutable for the engine's lifetime.
#[derive(Debug, Clone)]
pub struct RelyingPartyPolicy {
    pub rp_id: String,
    pub rp_name: String,
    pub allowed_origins: Vec<String>,
    pub challenge_ttl: Duration,
    pub require_user_verification: bool,
    pub accepted_attestation_formats: Vec<AttestationFormat>,
    /// spec §4.1 step 2 / §6 `policy.enterpriseAttestationAllowed`: whether
    /// this tenant may request `enterprise` attestation conveyance.
    pub enterprise_attestation_allowed: bool,
}

impl Default for RelyingPartyPolicy {
    fn default() -> Self {
        Self {
            rp_id: "localhost".to_string(),
            rp_name: "Relying Party".to_string(),
            allowed_origins: vec!["https://localhost".to_string()],
            challenge_ttl: Duration::minutes(5),
            require_user_verification: true,
            accepted_attestation_formats: vec![
                AttestationFormat::None,
                AttestationFormat::Packed,
                AttestationFormat::FidoU2f,
                AttestationFormat::AndroidKey,
                AttestationFormat::Tpm,
                AttestationFormat::Apple,
                AttestationFormat::AndroidSafetynet,
            ],
            enterprise_attestation_allowed: false,
        }
    }
}

/// Orchestrates registration and authentication ceremonies, wiring together
/// the challenge store, credential service, crypto provider, and audit
/// logger. This is the only entry point other crates should use for
/// WebAuthn ceremonies; nothing outside this module talks to the challenge
/// store or the low-level ceremony verification functions directly.
pub struct WebAuthnEngine {
    policy: RelyingPartyPolicy,
    challenges: Arc<dyn ChallengeStore>,
    credentials: Arc<CredentialService>,
    crypto: Arc<dyn CryptoProvider>,
    audit: AuditLogger,
    attestation_metadata: Option<Arc<dyn AttestationMetadataService>>,
}

impl WebAuthnEngine {
    pub fn new(
        policy: RelyingPartyPolicy,
        challenges: Arc<dyn ChallengeStore>,
        credentials: Arc<CredentialService>,
        crypto: Arc<dyn CryptoProvider>,
        audit: AuditLogger,
        attestation_metadata: Option<Arc<dyn AttestationMetadataService>>,
    ) -> Self {
        Self {
            policy,
            challenges,
            credentials,
            crypto,
            audit,
            attestation_metadata,
        }
    }

    /// Step 1 of registration: mint a challenge and return creation options.
    /// `requested_attestation` is refused up front with
    /// `EnterpriseAttestationNotPermitted` when it is `Enterprise` and the
    /// tenant's policy does not allow it, so a disallowed ceremony never
    /// gets as far as generating a challenge.
    pub async fn begin_registration(
        &self,
        tenant: &TenantContext,
        user_id: UserId,
        user_name: &str,
        user_display_name: &str,
        exclude_credential_ids_b64: Vec<String>,
        requested_attestation: AttestationConveyance,
    ) -> Result<RegistrationOptions> {
        if requested_attestation == AttestationConveyance::Enterprise && !self.policy.enterprise_attestation_allowed {
            return Err(self
                .fail_registration(user_id, CeremonyFailure::EnterpriseAttestationNotPermitted)
                .await);
        }

        let challenge = self
            .challenges
            .issue(tenant, Some(user_id), ChallengePurpose::Registration, self.policy.challenge_ttl)
            .await?;

        Ok(RegistrationOptions {
            challenge_b64: challenge.challenge_b64,
            rp_id: self.policy.rp_id.clone(),
            rp_name: self.policy.rp_name.clone(),
            user_id_b64: base64_url_encode(user_id.0.as_bytes()),
            user_name: user_name.to_string(),
            user_display_name: user_display_name.to_string(),
            pub_key_cred_params: vec![
                PubKeyCredParam { alg: -7, cred_type: "public-key" },
                PubKeyCredParam { alg: -257, cred_type: "public-key" },
            ],
            exclude_credential_ids_b64,
            authenticator_selection: AuthenticatorSelection {
                authenticator_attachment: None,
                resident_key: "preferred".to_string(),
                user_verification: if self.policy.require_user_verification { "required" } else { "preferred" }.to_string(),
            },
            attestation: requested_attestation,
            timeout_ms: self.policy.challenge_ttl.num_milliseconds().max(0) as u64,
        })
    }

    /// Steps 2-4 of registration: verify the attestation, persist the
    /// credential, and emit the audit event. Consumes the challenge, so a
    /// retried call with the same client response fails with
    /// `CeremonyFailure::ExpiredChallenge`.
    #[allow(clippy::too_many_arguments)]
    pub async fn finish_registration(
        &self,
        tenant_pool: &TenantPool,
        tenant: &TenantContext,
        user_id: UserId,
        client_data_json: &[u8],
        attestation_object_cbor: &[u8],
        device_type: DeviceType,
        transports: Vec<String>,
        label: Option<String>,
        requested_attestation: AttestationConveyance,
    ) -> Result<Credential> {
        let client_data: super::types::ClientData = match serde_json::from_slice(client_data_json) {
            Ok(cd) => cd,
            Err(_) => return Err(self.fail_registration(user_id, CeremonyFailure::ChallengeMismatch).await),
        };

        let challenge = match self
            .challenges
            .consume(tenant, ChallengePurpose::Registration, &client_data.challenge)
            .await?
        {
            Some(c) => c,
            None => return Err(self.fail_registration(user_id, CeremonyFailure::ExpiredChallenge).await),
        };

        if challenge.user_id != Some(user_id) {
            return Err(self.fail_registration(user_id, CeremonyFailure::ChallengeMismatch).await);
        }

        let result = match verify_registration(
            &self.crypto,
            client_data_json,
            attestation_object_cbor,
            &challenge.challenge_b64,
            &self.policy.rp_id,
            &self.policy.allowed_origins,
            self.policy.require_user_verification,
            &self.policy.accepted_attestation_formats,
            self.attestation_metadata.as_ref(),
        )
        .await
        {
            Ok(r) => r,
            Err(failure) => return Err(self.fail_registration(user_id, failure).await),
        };

        let credential = self
            .credentials
            .create(
                tenant_pool,
                tenant,
                user_id,
                &result.credential_id,
                result.public_key_cose,
                Some(attestation_object_cbor.to_vec()),
                result.aaguid,
                result.attestation_format,
                requested_attestation,
                transports,
                device_type,
                result.backup_eligible,
                result.backup_state,
                label,
            )
            .await?;

        if !result.attestation_trusted && result.attestation_format != AttestationFormat::None {
            self.audit
                .log_credential_event(
                    EventType::CredentialRegistered,
                    &credential.id.to_string(),
                    format!(
                        "credential {} registered with unverifiable {} attestation",
                        credential.id, result.attestation_format
                    ),
                    EventSeverity::Medium,
                )
                .await?;
        }

        Ok(credential)
    }

    /// Step 1 of authentication: mint a challenge and return request options.
    pub async fn begin_authentication(
        &self,
        tenant: &TenantContext,
        user_id: Option<UserId>,
        allow_credential_ids_b64: Vec<String>,
    ) -> Result<AuthenticationOptions> {
        let challenge = self
            .challenges
            .issue(tenant, user_id, ChallengePurpose::Authentication, self.policy.challenge_ttl)
            .await?;

        Ok(AuthenticationOptions {
            challenge_b64: challenge.challenge_b64,
            rp_id: self.policy.rp_id.clone(),
            allow_credential_ids_b64,
            user_verification: if self.policy.require_user_verification { "required" } else { "preferred" }.to_string(),
            timeout_ms: self.policy.challenge_ttl.num_milliseconds().max(0) as u64,
        })
    }

    /// Steps 2-3 of authentication: verify the assertion signature, apply
    /// the counter-rollback protocol via `CredentialService`, and return the
    /// verified principal on success.
    pub async fn finish_authentication(
        &self,
        tenant_pool: &TenantPool,
        tenant: &TenantContext,
        client_data_json: &[u8],
        authenticator_data_raw: &[u8],
        signature: &[u8],
        credential: Credential,
    ) -> Result<VerifiedPrincipal> {
        let client_data: super::types::ClientData = match serde_json::from_slice(client_data_json) {
            Ok(cd) => cd,
            Err(_) => {
                return Err(self
                    .fail_authentication(Some(credential.user_id), CeremonyFailure::ChallengeMismatch)
                    .await)
            }
        };

        let challenge = match self
            .challenges
            .consume(tenant, ChallengePurpose::Authentication, &client_data.challenge)
            .await?
        {
            Some(c) => c,
            None => {
                return Err(self
                    .fail_authentication(Some(credential.user_id), CeremonyFailure::ExpiredChallenge)
                    .await)
            }
        };

        if let Some(expected_user) = challenge.user_id {
            if expected_user != credential.user_id {
                return Err(self
                    .fail_authentication(Some(credential.user_id), CeremonyFailure::ChallengeMismatch)
                    .await);
            }
        }

        if !credential.state.can_authenticate() {
            return Err(self
                .fail_authentication(Some(credential.user_id), CeremonyFailure::CredentialRevoked)
                .await);
        }

        let assertion = match verify_authentication(
            &self.crypto,
            client_data_json,
            authenticator_data_raw,
            signature,
            &credential.public_key_cose,
            &challenge.challenge_b64,
            &self.policy.rp_id,
            &self.policy.allowed_origins,
            self.policy.require_user_verification,
        ) {
            Ok(a) => a,
            Err(failure) => return Err(self.fail_authentication(Some(credential.user_id), failure).await),
        };

        let user_id = credential.user_id;
        let credential_id = credential.id;

        self.credentials
            .record_assertion(tenant_pool, tenant, credential, assertion.new_sign_count)
            .await?;

        Ok(VerifiedPrincipal { user_id, credential_id })
    }

    /// Emit a `webauthn_registration_failed` audit event for `failure`
    /// (spec §4.1 step 4) and return the corresponding `Error`. Every
    /// ceremony failure maps to `unauthenticated`, `integrity_violation`,
    /// or `precondition_failed` via `ceremony_error`, all security-relevant
    /// per spec §7, so this always logs at `High` severity with the raw
    /// failure kind attached as metadata. If the audit write itself fails,
    /// that error is returned instead so a silently-dropped audit record
    /// never masquerades as a successful ceremony failure.
    async fn fail_registration(&self, user_id: UserId, failure: CeremonyFailure) -> Error {
        let err = ceremony_error(failure);
        if let Err(log_err) = self
            .audit
            .log_ceremony_failure(
                EventType::WebAuthnRegistrationFailed,
                Some(&user_id.to_string()),
                format!("webauthn registration failed: {}", failure),
                failure,
                EventSeverity::High,
            )
            .await
        {
            return log_err;
        }
        err
    }

    /// Authentication counterpart of `fail_registration`.
    async fn fail_authentication(&self, user_id: Option<UserId>, failure: CeremonyFailure) -> Error {
        let err = ceremony_error(failure);
        if let Err(log_err) = self
            .audit
            .log_ceremony_failure(
                EventType::WebAuthnAuthenticationFailed,
                user_id.map(|u| u.to_string()).as_deref(),
                format!("webauthn authentication failed: {}", failure),
                failure,
                EventSeverity::High,
            )
            .await
        {
            return log_err;
        }
        err
    }
}

fn ceremony_error(failure: CeremonyFailure) -> Error {
    match failure {
        CeremonyFailure::CredentialRevoked | CeremonyFailure::CredentialUnknown => {
            Error::unauthenticated(failure.to_string())
        }
        CeremonyFailure::CounterRollback => Error::integrity_violation(failure.to_string()),
        _ => Error::precondition_failed(failure.to_string()),
    }
}

fn base64_url_encode(bytes: &[u8]) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    URL_SAFE_NO_PAD.encode(bytes)
}
