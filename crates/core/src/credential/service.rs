use super::model::{Credential, CredentialState, CredentialType, CounterCheckOutcome, DeviceType};
use super::repository::CredentialRepository;
use crate::audit::{AuditEvent, AuditLogger, EventSeverity, EventType};
use crate::database::TenantPool;
use crate::error::{Error, Result};
use crate::security::crypto_provider::CryptoProvider;
use crate::session::SessionManager;
use crate::types::{CredentialId, TenantContext, UserId};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Orchestrates the lifecycle of a WebAuthn credential: registration,
/// per-assertion counter bookkeeping, and the irreversible state
/// transitions (`Suspicious -> Compromised|Revoked|Expired`).
///
/// Registration/assertion parsing lives in the webauthn module; this
/// service owns what happens to a credential's row once a ceremony has
/// produced one.
pub struct CredentialService {
    repository: Arc<dyn CredentialRepository>,
    crypto: Arc<dyn CryptoProvider>,
    audit: AuditLogger,
    sessions: Arc<SessionManager>,
}

impl CredentialService {
    pub fn new(
        repository: Arc<dyn CredentialRepository>,
        crypto: Arc<dyn CryptoProvider>,
        audit: AuditLogger,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self {
            repository,
            crypto,
            audit,
            sessions,
        }
    }

    /// Register a newly-attested credential.
    pub async fn create(
        &self,
        tenant: &TenantPool,
        ctx: &TenantContext,
        user_id: UserId,
        credential_id_bytes: &[u8],
        public_key_cose: Vec<u8>,
        attestation_blob: Option<Vec<u8>>,
        aaguid: Uuid,
        attestation_format: super::model::AttestationFormat,
        attestation_type: crate::webauthn::AttestationConveyance,
        transports: Vec<String>,
        device_type: DeviceType,
        backup_eligible: bool,
        backup_state: bool,
        label: Option<String>,
    ) -> Result<Credential> {
        let credential_id_hash = self.hash_credential_id(credential_id_bytes).await?;

        if self
            .repository
            .get_by_hash(tenant, ctx.tenant_id, &credential_id_hash)
            .await?
            .is_some()
        {
            return Err(Error::conflict("credential already registered"));
        }

        let now = Utc::now();
        let credential = Credential {
            id: CredentialId(Uuid::new_v4()),
            user_id,
            tenant_id: ctx.tenant_id,
            credential_type: CredentialType::Webauthn,
            device_type,
            credential_id_b64: base64_url_encode(credential_id_bytes),
            credential_id_hash,
            public_key_cose,
            attestation_blob,
            sign_count: 0,
            usage_count: 0,
            aaguid,
            attestation_format,
            attestation_type,
            transports,
            state: CredentialState::Active,
            backup_eligible,
            backup_state,
            risk_score: 0.0,
            security_flags: Default::default(),
            created_at: now,
            updated_at: now,
            last_used_at: None,
            expires_at: None,
            revoked_at: None,
            label,
        };

        self.repository.create(tenant, ctx.tenant_id, &credential).await?;

        self.audit
            .log_credential_event(
                EventType::CredentialRegistered,
                &credential.id.to_string(),
                format!("credential registered for user {}", user_id),
                EventSeverity::Info,
            )
            .await?;

        Ok(credential)
    }

    pub async fn get_by_id(&self, tenant: &TenantPool, ctx: &TenantContext, id: CredentialId) -> Result<Credential> {
        self.repository
            .get_by_id(tenant, ctx.tenant_id, id)
            .await?
            .ok_or_else(|| Error::not_found("credential not found"))
    }

    pub async fn get_by_hash(&self, tenant: &TenantPool, ctx: &TenantContext, hash: &str) -> Result<Option<Credential>> {
        self.repository.get_by_hash(tenant, ctx.tenant_id, hash).await
    }

    pub async fn list_by_user(&self, tenant: &TenantPool, ctx: &TenantContext, user_id: UserId) -> Result<Vec<Credential>> {
        self.repository.list_by_user(tenant, ctx.tenant_id, user_id).await
    }

    /// Apply the counter-checking protocol after a successful assertion
    /// signature verification. On rejection the credential is flagged
    /// `Suspicious` (first anomaly) or `Compromised` (an anomaly on a
    /// credential already flagged) and a critical audit event is raised.
    pub async fn record_assertion(
        &self,
        tenant: &TenantPool,
        ctx: &TenantContext,
        mut credential: Credential,
        new_sign_count: u32,
    ) -> Result<Credential> {
        match credential.counter_check(new_sign_count) {
            CounterCheckOutcome::Accept => {
                credential.sign_count = new_sign_count;
                credential.usage_count += 1;
                credential.last_used_at = Some(Utc::now());
                credential.updated_at = Utc::now();
                self.repository.update(tenant, &credential).await?;

                self.audit
                    .log_credential_event(
                        EventType::CredentialAuthenticated,
                        &credential.id.to_string(),
                        format!("credential {} authenticated", credential.id),
                        EventSeverity::Info,
                    )
                    .await?;

                Ok(credential)
            }
            CounterCheckOutcome::Reject => {
                credential.security_flags.has_counter_anomaly_history = true;
                credential.updated_at = Utc::now();

                if credential.state == CredentialState::Suspicious {
                    credential.state = CredentialState::Compromised;
                    credential.revoked_at = Some(Utc::now());
                    self.repository.update(tenant, &credential).await?;

                    self.audit
                        .log_credential_event(
                            EventType::CredentialQuarantined,
                            &credential.id.to_string(),
                            format!(
                                "credential {} compromised: repeated signature counter anomaly (stored={}, observed={})",
                                credential.id, credential.sign_count, new_sign_count
                            ),
                            EventSeverity::Critical,
                        )
                        .await?;

                    self.sessions
                        .invalidate_user_sessions(ctx, credential.user_id.0)
                        .await?;
                } else {
                    credential.state = CredentialState::Suspicious;
                    self.repository.update(tenant, &credential).await?;

                    self.audit
                        .log_credential_event(
                            EventType::CredentialCounterAnomaly,
                            &credential.id.to_string(),
                            format!(
                                "signature counter anomaly on credential {} (stored={}, observed={})",
                                credential.id, credential.sign_count, new_sign_count
                            ),
                            EventSeverity::High,
                        )
                        .await?;
                }

                Err(Error::integrity_violation(
                    "credential signature counter did not strictly increase",
                ))
            }
        }
    }

    /// Operator-initiated confirmation that a credential is compromised.
    /// Irreversible: terminates every active session for the owner.
    pub async fn mark_compromised(&self, tenant: &TenantPool, ctx: &TenantContext, id: CredentialId) -> Result<()> {
        let mut credential = self.get_by_id(tenant, ctx, id).await?;
        credential.state = CredentialState::Compromised;
        credential.revoked_at = Some(Utc::now());
        credential.updated_at = Utc::now();
        self.repository.update(tenant, &credential).await?;

        self.audit
            .log_credential_event(
                EventType::CredentialQuarantined,
                &id.to_string(),
                format!("credential {} marked compromised by operator", id),
                EventSeverity::Critical,
            )
            .await?;

        self.sessions.invalidate_user_sessions(ctx, credential.user_id.0).await?;
        Ok(())
    }

    pub async fn revoke(&self, tenant: &TenantPool, ctx: &TenantContext, id: CredentialId) -> Result<()> {
        let mut credential = self.get_by_id(tenant, ctx, id).await?;
        credential.state = CredentialState::Revoked;
        credential.revoked_at = Some(Utc::now());
        credential.updated_at = Utc::now();
        self.repository.update(tenant, &credential).await?;

        self.audit
            .log_credential_event(
                EventType::CredentialRevoked,
                &id.to_string(),
                format!("credential {} revoked", id),
                EventSeverity::Info,
            )
            .await
    }

    pub async fn expire(&self, tenant: &TenantPool, ctx: &TenantContext, id: CredentialId) -> Result<()> {
        let mut credential = self.get_by_id(tenant, ctx, id).await?;
        credential.state = CredentialState::Expired;
        credential.updated_at = Utc::now();
        self.repository.update(tenant, &credential).await?;

        self.audit
            .log_event(
                AuditEvent::builder(EventType::CredentialRevoked, format!("credential {} expired", id))
                    .resource("credential", &id.to_string())
                    .build(),
            )
            .await
    }

    /// Periodic integrity self-check: a credential whose public key no
    /// longer parses as a valid COSE key (corruption, or a row tampered
    /// with out of band) is quarantined rather than left to fail silently
    /// on the next authentication attempt.
    pub async fn integrity_self_check(&self, tenant: &TenantPool, ctx: &TenantContext, credential: &Credential) -> Result<bool> {
        if self.crypto.parse_cose_key(&credential.public_key_cose).is_err() {
            let mut tampered = credential.clone();
            tampered.state = CredentialState::Compromised;
            tampered.revoked_at = Some(Utc::now());
            tampered.updated_at = Utc::now();
            self.repository.update(tenant, &tampered).await?;

            self.audit
                .log_credential_event(
                    EventType::CredentialQuarantined,
                    &credential.id.to_string(),
                    format!("credential {} quarantined: public key failed integrity self-check", credential.id),
                    EventSeverity::Critical,
                )
                .await?;

            self.sessions.invalidate_user_sessions(ctx, credential.user_id.0).await?;
            return Ok(false);
        }
        Ok(true)
    }

    async fn hash_credential_id(&self, raw: &[u8]) -> Result<String> {
        let digest = self.crypto.sha256(raw);
        Ok(hex_encode(&digest))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

fn base64_url_encode(bytes: &[u8]) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    URL_SAFE_NO_PAD.encode(bytes)
}
