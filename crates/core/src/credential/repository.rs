use super::model::{
    AttestationFormat, Credential, CredentialSecurityFlags, CredentialState, CredentialType, DeviceType,
};
use crate::webauthn::AttestationConveyance;
use crate::database::TenantPool;
use crate::error::Result;
use crate::types::{CredentialId, TenantId, UserId};
use async_trait::async_trait;
use sqlx::Row;

/// Persistence boundary for WebAuthn credentials. Every method is scoped to
/// a single tenant's pool; nothing here accepts a bare `PgPool`.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn create(&self, tenant: &TenantPool, tenant_id: TenantId, credential: &Credential) -> Result<()>;
    async fn get_by_id(&self, tenant: &TenantPool, tenant_id: TenantId, id: CredentialId) -> Result<Option<Credential>>;
    async fn get_by_hash(&self, tenant: &TenantPool, tenant_id: TenantId, credential_id_hash: &str) -> Result<Option<Credential>>;
    async fn list_by_user(&self, tenant: &TenantPool, tenant_id: TenantId, user_id: UserId) -> Result<Vec<Credential>>;
    async fn update(&self, tenant: &TenantPool, credential: &Credential) -> Result<()>;
}

pub struct DatabaseCredentialRepository;

impl DatabaseCredentialRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn initialize(&self, tenant: &TenantPool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL,
                credential_type TEXT NOT NULL,
                device_type TEXT NOT NULL,
                credential_id_b64 TEXT NOT NULL,
                credential_id_hash TEXT NOT NULL UNIQUE,
                public_key_cose BYTEA NOT NULL,
                attestation_blob BYTEA,
                sign_count BIGINT NOT NULL,
                usage_count BIGINT NOT NULL,
                aaguid UUID NOT NULL,
                attestation_format TEXT NOT NULL,
                attestation_type TEXT NOT NULL DEFAULT 'direct',
                transports JSONB NOT NULL,
                state TEXT NOT NULL,
                backup_eligible BOOLEAN NOT NULL,
                backup_state BOOLEAN NOT NULL,
                risk_score DOUBLE PRECISION NOT NULL,
                security_flags JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                last_used_at TIMESTAMPTZ,
                expires_at TIMESTAMPTZ,
                revoked_at TIMESTAMPTZ,
                label TEXT
            )
            "#,
        )
        .execute(tenant.get())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_credentials_user_id ON credentials (user_id)")
            .execute(tenant.get())
            .await?;
        sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_credentials_hash ON credentials (credential_id_hash)")
            .execute(tenant.get())
            .await?;

        Ok(())
    }

    fn row_to_credential(row: &sqlx::postgres::PgRow, tenant_id: TenantId) -> Result<Credential> {
        let attestation_format_str: String = row.try_get("attestation_format")?;
        let attestation_type_str: String = row.try_get("attestation_type")?;
        let state_str: String = row.try_get("state")?;
        let credential_type_str: String = row.try_get("credential_type")?;
        let device_type_str: String = row.try_get("device_type")?;
        let transports_json: serde_json::Value = row.try_get("transports")?;
        let security_flags_json: serde_json::Value = row.try_get("security_flags")?;

        Ok(Credential {
            id: CredentialId(row.try_get("id")?),
            user_id: UserId(row.try_get("user_id")?),
            tenant_id,
            credential_type: parse_credential_type(&credential_type_str),
            device_type: parse_device_type(&device_type_str),
            credential_id_b64: row.try_get("credential_id_b64")?,
            credential_id_hash: row.try_get("credential_id_hash")?,
            public_key_cose: row.try_get("public_key_cose")?,
            attestation_blob: row.try_get("attestation_blob")?,
            sign_count: row.try_get::<i64, _>("sign_count")? as u32,
            usage_count: row.try_get::<i64, _>("usage_count")? as u64,
            aaguid: row.try_get("aaguid")?,
            attestation_format: parse_attestation_format(&attestation_format_str),
            attestation_type: parse_attestation_conveyance(&attestation_type_str),
            transports: serde_json::from_value(transports_json).unwrap_or_default(),
            state: parse_credential_state(&state_str),
            backup_eligible: row.try_get("backup_eligible")?,
            backup_state: row.try_get("backup_state")?,
            risk_score: row.try_get("risk_score")?,
            security_flags: serde_json::from_value(security_flags_json).unwrap_or_default(),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            last_used_at: row.try_get("last_used_at")?,
            expires_at: row.try_get("expires_at")?,
            revoked_at: row.try_get("revoked_at")?,
            label: row.try_get("label")?,
        })
    }
}

impl Default for DatabaseCredentialRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialRepository for DatabaseCredentialRepository {
    async fn create(&self, tenant: &TenantPool, _tenant_id: TenantId, credential: &Credential) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO credentials (
                id, user_id, credential_type, device_type, credential_id_b64, credential_id_hash,
                public_key_cose, attestation_blob, sign_count, usage_count, aaguid,
                attestation_format, attestation_type, transports, state, backup_eligible, backup_state,
                risk_score, security_flags, created_at, updated_at, last_used_at,
                expires_at, revoked_at, label
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)
            "#,
        )
        .bind(credential.id.0)
        .bind(credential.user_id.0)
        .bind(credential_type_str(credential.credential_type))
        .bind(device_type_str(credential.device_type))
        .bind(&credential.credential_id_b64)
        .bind(&credential.credential_id_hash)
        .bind(&credential.public_key_cose)
        .bind(&credential.attestation_blob)
        .bind(credential.sign_count as i64)
        .bind(credential.usage_count as i64)
        .bind(credential.aaguid)
        .bind(credential.attestation_format.to_string())
        .bind(credential.attestation_type.as_str())
        .bind(serde_json::to_value(&credential.transports).unwrap_or(serde_json::Value::Null))
        .bind(credential_state_str(credential.state))
        .bind(credential.backup_eligible)
        .bind(credential.backup_state)
        .bind(credential.risk_score)
        .bind(serde_json::to_value(&credential.security_flags).unwrap_or(serde_json::Value::Null))
        .bind(credential.created_at)
        .bind(credential.updated_at)
        .bind(credential.last_used_at)
        .bind(credential.expires_at)
        .bind(credential.revoked_at)
        .bind(&credential.label)
        .execute(tenant.get())
        .await?;

        Ok(())
    }

    async fn get_by_id(&self, tenant: &TenantPool, tenant_id: TenantId, id: CredentialId) -> Result<Option<Credential>> {
        let row = sqlx::query("SELECT * FROM credentials WHERE id = $1")
            .bind(id.0)
            .fetch_optional(tenant.get())
            .await?;

        row.as_ref().map(|r| Self::row_to_credential(r, tenant_id)).transpose()
    }

    async fn get_by_hash(&self, tenant: &TenantPool, tenant_id: TenantId, credential_id_hash: &str) -> Result<Option<Credential>> {
        let row = sqlx::query("SELECT * FROM credentials WHERE credential_id_hash = $1")
            .bind(credential_id_hash)
            .fetch_optional(tenant.get())
            .await?;

        row.as_ref().map(|r| Self::row_to_credential(r, tenant_id)).transpose()
    }

    async fn list_by_user(&self, tenant: &TenantPool, tenant_id: TenantId, user_id: UserId) -> Result<Vec<Credential>> {
        let rows = sqlx::query("SELECT * FROM credentials WHERE user_id = $1 ORDER BY created_at ASC")
            .bind(user_id.0)
            .fetch_all(tenant.get())
            .await?;

        rows.iter().map(|r| Self::row_to_credential(r, tenant_id)).collect()
    }

    async fn update(&self, tenant: &TenantPool, credential: &Credential) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE credentials SET
                sign_count = $2, usage_count = $3, state = $4, risk_score = $5,
                security_flags = $6, updated_at = $7, last_used_at = $8,
                expires_at = $9, revoked_at = $10, label = $11, backup_state = $12
            WHERE id = $1
            "#,
        )
        .bind(credential.id.0)
        .bind(credential.sign_count as i64)
        .bind(credential.usage_count as i64)
        .bind(credential_state_str(credential.state))
        .bind(credential.risk_score)
        .bind(serde_json::to_value(&credential.security_flags).unwrap_or(serde_json::Value::Null))
        .bind(credential.updated_at)
        .bind(credential.last_used_at)
        .bind(credential.expires_at)
        .bind(credential.revoked_at)
        .bind(&credential.label)
        .bind(credential.backup_state)
        .execute(tenant.get())
        .await?;

        Ok(())
    }
}

fn credential_type_str(t: CredentialType) -> &'static str {
    match t {
        CredentialType::Webauthn => "webauthn",
    }
}

fn parse_credential_type(s: &str) -> CredentialType {
    match s {
        "webauthn" => CredentialType::Webauthn,
        _ => CredentialType::Webauthn,
    }
}

fn device_type_str(t: DeviceType) -> &'static str {
    match t {
        DeviceType::Platform => "platform",
        DeviceType::CrossPlatform => "cross-platform",
        DeviceType::Unknown => "unknown",
    }
}

fn parse_device_type(s: &str) -> DeviceType {
    match s {
        "platform" => DeviceType::Platform,
        "cross-platform" => DeviceType::CrossPlatform,
        _ => DeviceType::Unknown,
    }
}

fn credential_state_str(s: CredentialState) -> &'static str {
    match s {
        CredentialState::Active => "active",
        CredentialState::Suspicious => "suspicious",
        CredentialState::Compromised => "compromised",
        CredentialState::Revoked => "revoked",
        CredentialState::Expired => "expired",
    }
}

fn parse_credential_state(s: &str) -> CredentialState {
    match s {
        "active" => CredentialState::Active,
        "suspicious" => CredentialState::Suspicious,
        "compromised" => CredentialState::Compromised,
        "revoked" => CredentialState::Revoked,
        "expired" => CredentialState::Expired,
        _ => CredentialState::Active,
    }
}

fn parse_attestation_conveyance(s: &str) -> AttestationConveyance {
    match s {
        "none" => AttestationConveyance::None,
        "indirect" => AttestationConveyance::Indirect,
        "enterprise" => AttestationConveyance::Enterprise,
        _ => AttestationConveyance::Direct,
    }
}

fn parse_attestation_format(s: &str) -> AttestationFormat {
    match s {
        "None" | "none" => AttestationFormat::None,
        "Packed" | "packed" => AttestationFormat::Packed,
        "FidoU2f" | "fido-u2f" => AttestationFormat::FidoU2f,
        "AndroidKey" | "android-key" => AttestationFormat::AndroidKey,
        "Tpm" | "tpm" => AttestationFormat::Tpm,
        "Apple" | "apple" => AttestationFormat::Apple,
        "AndroidSafetynet" | "android-safetynet" => AttestationFormat::AndroidSafetynet,
        _ => AttestationFormat::None,
    }
}
