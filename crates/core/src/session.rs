pub mod cleanup;

pub use cleanup::{AggregatedSessionStats, CleanupServiceHealth, SessionCleanupService, SessionStatsSnapshot};

use crate::audit::{AuditLogger, EventSeverity, EventType};
use crate::error::{Error, ErrorKind, Result};
use crate::security::crypto_provider::CryptoProvider;
use crate::TenantContext;
use chrono::{DateTime, Duration, Utc};
use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A session's position in its lifecycle. The sole source of truth for
/// whether a session is usable: there is no parallel `is_active` boolean
/// stored alongside it, so `state == Active` is the one place that
/// question gets answered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Expired,
    Revoked,
    Terminated,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active)
    }

    /// Whether this is one of the three terminal states a session may only
    /// enter once.
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

/// The client surface a session was established from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Web,
    Mobile,
    Api,
    Desktop,
}

/// Coarse-grained location derived from the creating/last-seen IP. All
/// three fields are independently optional since geolocation providers
/// rarely resolve the full triple.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

/// Derived security posture, recomputed every time the risk engine scores
/// this session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionSecurityFlags {
    pub is_high_risk: bool,
    pub requires_mfa: bool,
}

/// Session record as persisted in Redis. Raw session/refresh tokens are
/// never stored: only their SHA-256 hashes, which double as the lookup
/// index, are kept here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub session_id: String,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    /// SHA-256 hex of the current session token. Indexed.
    pub session_token_hash: String,
    /// SHA-256 hex of the current refresh token. Indexed.
    pub refresh_token_hash: String,
    /// SHA-256 hex of the refresh token this one superseded, retained for
    /// one generation purely to detect reuse of a rotated-away token.
    pub previous_refresh_token_hash: Option<String>,
    pub session_type: SessionType,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub terminated_at: Option<DateTime<Utc>>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub device_fingerprint: Option<String>,
    pub geo: GeoLocation,
    pub risk_score: f64,
    pub security_flags: SessionSecurityFlags,
    pub activity_count: u64,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl SessionData {
    /// Wall-clock lifetime of the session so far: from creation to
    /// termination, or to `now` while still active.
    pub fn duration_seconds(&self, now: DateTime<Utc>) -> i64 {
        let end = self.terminated_at.unwrap_or(now);
        (end - self.created_at).num_seconds().max(0)
    }

    /// True once `expires_at` falls within `threshold` of `now`, i.e. the
    /// caller should refresh before the session lapses.
    pub fn needs_renewal(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.state.is_active() && self.expires_at - now <= threshold
    }
}

/// A freshly minted or rotated pair of opaque bearer tokens. The raw
/// values are handed back to the caller exactly once and never again —
/// only their hashes live server-side.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub session_token: String,
    pub refresh_token: String,
}

/// Session manager configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Absolute session lifetime from creation (`session.ttlMinutes`).
    pub ttl: Duration,
    /// Sliding inactivity timeout.
    pub inactivity_timeout: Duration,
    /// Window before expiry in which a session both needs renewal and the
    /// amount a refresh extends expiration by (`session.refreshWindowMinutes`).
    pub refresh_window: Duration,
    /// Background sweep cadence for expired-session cleanup.
    pub cleanup_interval: Duration,
    /// Maximum concurrent active sessions per user (`session.maxConcurrentPerUser`).
    pub max_concurrent_per_user: u32,
    pub enable_sliding_window: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::hours(12),
            inactivity_timeout: Duration::minutes(30),
            refresh_window: Duration::minutes(15),
            cleanup_interval: Duration::minutes(5),
            max_concurrent_per_user: 10,
            enable_sliding_window: true,
        }
    }
}

/// Session statistics for a single tenant.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SessionStats {
    pub total_sessions: u32,
    pub active_sessions: u32,
    pub expired_sessions: u32,
    pub revoked_sessions: u32,
    pub terminated_sessions: u32,
}

/// Mints, validates, rotates and terminates sessions, backed by Redis.
pub struct SessionManager {
    redis: ConnectionManager,
    crypto: Arc<dyn CryptoProvider>,
    audit: AuditLogger,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(
        redis: ConnectionManager,
        crypto: Arc<dyn CryptoProvider>,
        audit: AuditLogger,
        config: SessionConfig,
    ) -> Self {
        Self {
            redis,
            crypto,
            audit,
            config,
        }
    }

    /// Mint a new session. Evicts the least-recently-active session first
    /// if the user is already at the concurrency limit.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_session(
        &self,
        tenant: &TenantContext,
        user_id: Uuid,
        session_type: SessionType,
        client_ip: Option<String>,
        user_agent: Option<String>,
        device_fingerprint: Option<String>,
        geo: GeoLocation,
    ) -> Result<(SessionData, SessionTokens)> {
        self.enforce_session_limit(tenant, user_id).await?;

        let now = Utc::now();
        let session_id = Uuid::new_v4().to_string();
        let session_token = self.generate_token()?;
        let refresh_token = self.generate_token()?;
        let session_token_hash = self.hash_token(&session_token);
        let refresh_token_hash = self.hash_token(&refresh_token);

        let session = SessionData {
            session_id: session_id.clone(),
            user_id,
            tenant_id: tenant.tenant_id.0,
            session_token_hash: session_token_hash.clone(),
            refresh_token_hash: refresh_token_hash.clone(),
            previous_refresh_token_hash: None,
            session_type,
            state: SessionState::Active,
            created_at: now,
            last_activity_at: now,
            expires_at: now + self.config.ttl,
            terminated_at: None,
            client_ip: client_ip.clone(),
            user_agent,
            device_fingerprint,
            geo,
            risk_score: 0.0,
            security_flags: SessionSecurityFlags::default(),
            activity_count: 0,
            metadata: HashMap::new(),
        };

        self.store_session(&session).await?;
        self.index_token_hash("session_idx", tenant, &session_token_hash, &session_id)
            .await?;
        self.index_token_hash("refresh_idx", tenant, &refresh_token_hash, &session_id)
            .await?;
        self.add_to_user_sessions(tenant, user_id, &session_id).await?;

        self.audit
            .log_session_event(
                EventType::SessionCreated,
                &session_id,
                format!("session created for user {}", user_id),
                EventSeverity::Info,
            )
            .await?;

        info!(
            tenant_id = %tenant.tenant_id.0,
            user_id = %user_id,
            session_id = %session_id,
            client_ip = ?client_ip,
            "session created"
        );

        Ok((
            session,
            SessionTokens {
                session_token,
                refresh_token,
            },
        ))
    }

    /// Look a session up by its presented session token. Transitions it to
    /// `Expired` and returns `None` if it has lapsed; otherwise touches
    /// activity and returns the current record.
    pub async fn validate_session(
        &self,
        tenant: &TenantContext,
        presented_token: &str,
    ) -> Result<Option<SessionData>> {
        let hash = self.hash_token(presented_token);
        let session_id: Option<String> = self.get_token_index("session_idx", tenant, &hash).await?;

        let session_id = match session_id {
            Some(id) => id,
            None => return Ok(None),
        };

        let mut session = match self.load_session(tenant, &session_id).await? {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.session_token_hash != hash {
            return Ok(None);
        }

        if !session.state.is_active() {
            return Ok(None);
        }

        if Utc::now() > session.expires_at {
            self.terminate_session(tenant, &session_id, SessionState::Expired)
                .await?;
            return Ok(None);
        }

        session.last_activity_at = Utc::now();
        session.activity_count += 1;
        self.store_session(&session).await?;

        Ok(Some(session))
    }

    /// Rotate both tokens for a still-active session. Presenting a refresh
    /// token that was already rotated away revokes the session outright
    /// and raises a critical audit event — the prior token's continued use
    /// is evidence of token theft, not a benign race.
    pub async fn refresh_session(
        &self,
        tenant: &TenantContext,
        presented_refresh_token: &str,
    ) -> Result<(SessionData, SessionTokens)> {
        let hash = self.hash_token(presented_refresh_token);

        if let Some(session_id) = self.get_token_index("refresh_used_idx", tenant, &hash).await? {
            self.terminate_session(tenant, &session_id, SessionState::Revoked)
                .await?;
            self.audit
                .log_session_event(
                    EventType::RefreshTokenReuseDetected,
                    &session_id,
                    "refresh token reuse detected: session revoked",
                    EventSeverity::Critical,
                )
                .await?;
            return Err(Error::new(
                ErrorKind::IntegrityViolation,
                "refresh token reuse detected",
            ));
        }

        let session_id = self
            .get_token_index("refresh_idx", tenant, &hash)
            .await?
            .ok_or_else(|| Error::unauthenticated("refresh token not recognized"))?;

        let mut session = self
            .load_session(tenant, &session_id)
            .await?
            .ok_or_else(|| Error::unauthenticated("session not found"))?;

        if !session.state.is_active() {
            return Err(Error::unauthenticated("session is not active"));
        }
        if session.refresh_token_hash != hash {
            return Err(Error::unauthenticated("refresh token not recognized"));
        }

        let new_session_token = self.generate_token()?;
        let new_refresh_token = self.generate_token()?;
        let new_session_token_hash = self.hash_token(&new_session_token);
        let new_refresh_token_hash = self.hash_token(&new_refresh_token);

        self.remove_token_index("session_idx", tenant, &session.session_token_hash)
            .await?;
        self.remove_token_index("refresh_idx", tenant, &hash).await?;
        self.index_token_hash("refresh_used_idx", tenant, &hash, &session_id)
            .await?;

        session.previous_refresh_token_hash = Some(hash);
        session.session_token_hash = new_session_token_hash.clone();
        session.refresh_token_hash = new_refresh_token_hash.clone();
        session.expires_at = Utc::now() + self.config.refresh_window;
        session.last_activity_at = Utc::now();

        self.store_session(&session).await?;
        self.index_token_hash("session_idx", tenant, &new_session_token_hash, &session_id)
            .await?;
        self.index_token_hash("refresh_idx", tenant, &new_refresh_token_hash, &session_id)
            .await?;

        self.audit
            .log_session_event(
                EventType::SessionRefreshed,
                &session_id,
                "session tokens rotated",
                EventSeverity::Info,
            )
            .await?;

        Ok((
            session,
            SessionTokens {
                session_token: new_session_token,
                refresh_token: new_refresh_token,
            },
        ))
    }

    /// Push expiration out by `delta`, bounded so the session can never be
    /// extended past one more full TTL window measured from now. Only
    /// valid while the session is active.
    pub async fn extend_session(
        &self,
        tenant: &TenantContext,
        session_id: &str,
        delta: Duration,
    ) -> Result<SessionData> {
        let mut session = self
            .load_session(tenant, session_id)
            .await?
            .ok_or_else(|| Error::not_found("session not found"))?;

        if !session.state.is_active() {
            return Err(Error::precondition_failed("session is not active"));
        }

        let ceiling = Utc::now() + self.config.ttl;
        session.expires_at = (session.expires_at + delta).min(ceiling);
        self.store_session(&session).await?;

        Ok(session)
    }

    /// Recompute the derived security flags from a risk score produced by
    /// the risk engine: `isHighRisk` at 70+, `requiresMfa` at 50+.
    pub async fn update_risk_score(
        &self,
        tenant: &TenantContext,
        session_id: &str,
        score: f64,
    ) -> Result<SessionData> {
        let mut session = self
            .load_session(tenant, session_id)
            .await?
            .ok_or_else(|| Error::not_found("session not found"))?;

        session.risk_score = score;
        session.security_flags = SessionSecurityFlags {
            is_high_risk: score >= 70.0,
            requires_mfa: score >= 50.0,
        };
        self.store_session(&session).await?;

        Ok(session)
    }

    /// Revoke a single session (administrator or security-policy action).
    pub async fn revoke_session(&self, tenant: &TenantContext, session_id: &str) -> Result<()> {
        self.terminate_session(tenant, session_id, SessionState::Revoked).await
    }

    /// End a session at the owner's request.
    pub async fn end_session(&self, tenant: &TenantContext, session_id: &str) -> Result<()> {
        self.terminate_session(tenant, session_id, SessionState::Terminated)
            .await
    }

    /// Revoke every active session belonging to a user. Used by the
    /// credential store when a credential is quarantined or compromised.
    pub async fn invalidate_user_sessions(&self, tenant: &TenantContext, user_id: Uuid) -> Result<u32> {
        let user_sessions_key = self.user_sessions_key(tenant, user_id);
        let mut conn = self.redis.clone();

        let session_ids: Vec<String> = conn.smembers(&user_sessions_key).await?;
        let mut invalidated = 0;

        for session_id in session_ids {
            if self
                .terminate_session(tenant, &session_id, SessionState::Revoked)
                .await
                .is_ok()
            {
                invalidated += 1;
            }
        }

        let _: u32 = conn.del(&user_sessions_key).await?;

        info!(
            tenant_id = %tenant.tenant_id.0,
            user_id = %user_id,
            invalidated_count = invalidated,
            "all user sessions invalidated"
        );

        Ok(invalidated)
    }

    pub async fn get_user_sessions(&self, tenant: &TenantContext, user_id: Uuid) -> Result<Vec<SessionData>> {
        let user_sessions_key = self.user_sessions_key(tenant, user_id);
        let mut conn = self.redis.clone();

        let session_ids: Vec<String> = conn.smembers(&user_sessions_key).await?;
        let mut sessions = Vec::new();

        for session_id in session_ids {
            if let Some(session) = self.load_session(tenant, &session_id).await? {
                if session.state.is_active() {
                    sessions.push(session);
                }
            }
        }

        Ok(sessions)
    }

    /// Periodic sweep: scan (never `KEYS`) every session key for a tenant
    /// and transition anything past its deadline to `Expired`.
    pub async fn cleanup_expired_sessions(&self, tenant: &TenantContext) -> Result<u32> {
        let pattern = format!("session:{}:*", tenant.tenant_id.0);
        let mut conn = self.redis.clone();
        let session_keys = self.scan_keys(&mut conn, &pattern).await?;

        let mut cleaned_up = 0;
        for session_key in session_keys {
            if let Ok(Some(data)) = conn.get::<&str, Option<String>>(&session_key).await {
                if let Ok(session) = serde_json::from_str::<SessionData>(&data) {
                    if session.state.is_active() && Utc::now() > session.expires_at {
                        self.terminate_session(tenant, &session.session_id, SessionState::Expired)
                            .await?;
                        cleaned_up += 1;
                    }
                }
            }
        }

        if cleaned_up > 0 {
            info!(tenant_id = %tenant.tenant_id.0, cleaned_up_count = cleaned_up, "swept expired sessions");
        }

        Ok(cleaned_up)
    }

    pub async fn get_session_stats(&self, tenant: &TenantContext) -> Result<SessionStats> {
        let pattern = format!("session:{}:*", tenant.tenant_id.0);
        let mut conn = self.redis.clone();
        let session_keys = self.scan_keys(&mut conn, &pattern).await?;
        let mut stats = SessionStats::default();

        for session_key in session_keys {
            if let Ok(Some(data)) = conn.get::<&str, Option<String>>(&session_key).await {
                if let Ok(session) = serde_json::from_str::<SessionData>(&data) {
                    stats.total_sessions += 1;
                    match session.state {
                        SessionState::Active => stats.active_sessions += 1,
                        SessionState::Expired => stats.expired_sessions += 1,
                        SessionState::Revoked => stats.revoked_sessions += 1,
                        SessionState::Terminated => stats.terminated_sessions += 1,
                    }
                }
            }
        }

        Ok(stats)
    }

    // --- internals ---

    async fn terminate_session(&self, tenant: &TenantContext, session_id: &str, state: SessionState) -> Result<()> {
        let mut session = match self.load_session(tenant, session_id).await? {
            Some(s) => s,
            None => return Ok(()),
        };

        if session.state.is_terminal() {
            return Ok(());
        }

        session.state = state;
        session.terminated_at = Some(Utc::now());
        self.store_session(&session).await?;

        self.remove_token_index("session_idx", tenant, &session.session_token_hash)
            .await?;
        self.remove_token_index("refresh_idx", tenant, &session.refresh_token_hash)
            .await?;
        self.remove_from_user_sessions(tenant, session.user_id, session_id)
            .await?;

        let event_type = match state {
            SessionState::Revoked => EventType::SessionRevoked,
            SessionState::Terminated => EventType::SessionTerminated,
            _ => EventType::SessionTerminated,
        };
        self.audit
            .log_session_event(
                event_type,
                session_id,
                format!("session transitioned to {:?}", state),
                EventSeverity::Info,
            )
            .await?;

        debug!(session_id = %session_id, state = ?state, "session terminated");
        Ok(())
    }

    async fn load_session(&self, tenant: &TenantContext, session_id: &str) -> Result<Option<SessionData>> {
        let session_key = self.session_key(tenant, session_id);
        let mut conn = self.redis.clone();
        let data: Option<String> = conn.get(&session_key).await?;

        match data {
            Some(raw) => {
                let session: SessionData =
                    serde_json::from_str(&raw).map_err(|e| Error::new(ErrorKind::Internal, e.to_string()))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    async fn store_session(&self, session: &SessionData) -> Result<()> {
        let tenant_context = TenantContext {
            tenant_id: crate::TenantId(session.tenant_id),
            schema_name: format!("tenant_{}", session.tenant_id),
        };
        let session_key = self.session_key(&tenant_context, &session.session_id);
        let mut conn = self.redis.clone();

        let serialized =
            serde_json::to_string(session).map_err(|e| Error::new(ErrorKind::Internal, e.to_string()))?;

        let ttl = session
            .expires_at
            .signed_duration_since(Utc::now())
            .num_seconds()
            .max(1) as u64;

        conn.set_ex::<_, _, ()>(&session_key, serialized, ttl).await?;
        debug!("stored session {} with ttl {}s", session.session_id, ttl);
        Ok(())
    }

    async fn index_token_hash(&self, namespace: &str, tenant: &TenantContext, hash: &str, session_id: &str) -> Result<()> {
        let key = format!("{}:{}:{}", namespace, tenant.tenant_id.0, hash);
        let mut conn = self.redis.clone();
        let ttl = self.config.ttl.num_seconds().max(1) as u64;
        conn.set_ex::<_, _, ()>(&key, session_id, ttl).await?;
        Ok(())
    }

    async fn get_token_index(&self, namespace: &str, tenant: &TenantContext, hash: &str) -> Result<Option<String>> {
        let key = format!("{}:{}:{}", namespace, tenant.tenant_id.0, hash);
        let mut conn = self.redis.clone();
        let value: Option<String> = conn.get(&key).await?;
        Ok(value)
    }

    async fn remove_token_index(&self, namespace: &str, tenant: &TenantContext, hash: &str) -> Result<()> {
        let key = format!("{}:{}:{}", namespace, tenant.tenant_id.0, hash);
        let mut conn = self.redis.clone();
        let _: u32 = conn.del(&key).await?;
        Ok(())
    }

    async fn scan_keys(&self, conn: &mut ConnectionManager, pattern: &str) -> Result<Vec<String>> {
        use redis::Cmd;

        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let mut cmd = Cmd::new();
            cmd.arg("SCAN").arg(cursor).arg("MATCH").arg(pattern).arg("COUNT").arg(100);

            let result: Vec<redis::Value> = cmd
                .query_async(conn)
                .await
                .map_err(|e| Error::internal(format!("redis SCAN failed: {}", e)))?;

            if let [redis::Value::BulkString(cursor_bytes), redis::Value::Array(key_values)] = &result[..] {
                cursor = String::from_utf8_lossy(cursor_bytes).parse().unwrap_or(0);
                for key_value in key_values {
                    if let redis::Value::BulkString(key_bytes) = key_value {
                        keys.push(String::from_utf8_lossy(key_bytes).to_string());
                    }
                }
            }

            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }

    fn session_key(&self, tenant: &TenantContext, session_id: &str) -> String {
        format!("session:{}:{}", tenant.tenant_id.0, session_id)
    }

    fn user_sessions_key(&self, tenant: &TenantContext, user_id: Uuid) -> String {
        format!("user_sessions:{}:{}", tenant.tenant_id.0, user_id)
    }

    async fn add_to_user_sessions(&self, tenant: &TenantContext, user_id: Uuid, session_id: &str) -> Result<()> {
        let key = self.user_sessions_key(tenant, user_id);
        let mut conn = self.redis.clone();
        let _: u32 = conn.sadd(&key, session_id).await?;
        let ttl = self.config.ttl.num_seconds().max(1);
        let _: u32 = conn.expire(&key, ttl).await?;
        Ok(())
    }

    async fn remove_from_user_sessions(&self, tenant: &TenantContext, user_id: Uuid, session_id: &str) -> Result<()> {
        let key = self.user_sessions_key(tenant, user_id);
        let mut conn = self.redis.clone();
        let _: u32 = conn.srem(&key, session_id).await?;
        Ok(())
    }

    /// Evict the least-recently-active session when the user is already at
    /// the concurrency limit, making room for the one about to be created.
    async fn enforce_session_limit(&self, tenant: &TenantContext, user_id: Uuid) -> Result<()> {
        let mut sessions = self.get_user_sessions(tenant, user_id).await?;
        if sessions.len() < self.config.max_concurrent_per_user as usize {
            return Ok(());
        }

        sessions.sort_by(|a, b| a.last_activity_at.cmp(&b.last_activity_at));
        let excess = sessions.len() - self.config.max_concurrent_per_user as usize + 1;

        for session in sessions.iter().take(excess) {
            warn!(
                tenant_id = %tenant.tenant_id.0,
                user_id = %user_id,
                session_id = %session.session_id,
                "evicting least-recently-active session: concurrency limit reached"
            );
            self.terminate_session(tenant, &session.session_id, SessionState::Revoked)
                .await?;
        }

        Ok(())
    }

    fn generate_token(&self) -> Result<String> {
        let raw = self.crypto.random_bytes(64)?;
        Ok(base64_url_encode(&raw))
    }

    fn hash_token(&self, token: &str) -> String {
        hex_encode(&self.crypto.sha256(token.as_bytes()))
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
