use super::types::{ChallengePurpose, StoredChallenge};
use crate::error::{Error, ErrorKind, Result};
use crate::security::crypto_provider::CryptoProvider;
use crate::types::{ChallengeId, TenantContext, UserId};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use redis::{aio::ConnectionManager, AsyncCommands};
use std::sync::Arc;
use uuid::Uuid;

/// Server-side challenge store: issues fresh challenges with a hard TTL and
/// consumes them exactly once. Registration and authentication challenges
/// are namespaced separately so a challenge minted for one ceremony can
/// never be replayed against the other.
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn issue(
        &self,
        tenant: &TenantContext,
        user_id: Option<UserId>,
        purpose: ChallengePurpose,
        ttl: Duration,
    ) -> Result<StoredChallenge>;

    /// Atomically look up and delete the challenge matching `challenge_b64`
    /// for this tenant/purpose. Returns `None` if it was never issued,
    /// already consumed, or has expired (the TTL boundary is honored at
    /// the millisecond: expired-at-TTL+1ms is treated as never issued).
    async fn consume(
        &self,
        tenant: &TenantContext,
        purpose: ChallengePurpose,
        challenge_b64: &str,
    ) -> Result<Option<StoredChallenge>>;
}

/// Redis-backed implementation, following the same key-per-tenant,
/// `SET EX` + atomic delete-on-read pattern the session manager uses.
pub struct RedisChallengeStore {
    redis: ConnectionManager,
    crypto: Arc<dyn CryptoProvider>,
}

impl RedisChallengeStore {
    pub fn new(redis: ConnectionManager, crypto: Arc<dyn CryptoProvider>) -> Self {
        Self { redis, crypto }
    }

    fn key(tenant: &TenantContext, purpose: ChallengePurpose, challenge_b64: &str) -> String {
        format!(
            "webauthn_challenge:{}:{:?}:{}",
            tenant.tenant_id.0, purpose, challenge_b64
        )
    }
}

#[async_trait]
impl ChallengeStore for RedisChallengeStore {
    async fn issue(
        &self,
        tenant: &TenantContext,
        user_id: Option<UserId>,
        purpose: ChallengePurpose,
        ttl: Duration,
    ) -> Result<StoredChallenge> {
        let raw = self.crypto.random_bytes(32)?;
        let challenge_b64 = base64_url_encode(&raw);
        let now = Utc::now();

        let challenge = StoredChallenge {
            id: ChallengeId(Uuid::new_v4()),
            purpose,
            user_id,
            challenge_b64: challenge_b64.clone(),
            created_at: now,
            expires_at: now + ttl,
        };

        let key = Self::key(tenant, purpose, &challenge_b64);
        let serialized = serde_json::to_string(&challenge).map_err(|e| Error::internal(e.to_string()))?;
        let mut conn = self.redis.clone();
        let ttl_secs = ttl.num_seconds().max(1) as u64;
        conn.set_ex::<_, _, ()>(&key, serialized, ttl_secs)
            .await
            .map_err(|e| Error::internal(format!("redis SETEX failed: {}", e)))?;

        Ok(challenge)
    }

    async fn consume(
        &self,
        tenant: &TenantContext,
        purpose: ChallengePurpose,
        challenge_b64: &str,
    ) -> Result<Option<StoredChallenge>> {
        let key = Self::key(tenant, purpose, challenge_b64);
        let mut conn = self.redis.clone();

        // GETDEL is atomic: two concurrent assertions presenting the same
        // challenge value can never both observe a hit.
        let raw: Option<String> = redis::cmd("GETDEL")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::internal(format!("redis GETDEL failed: {}", e)))?;

        let raw = match raw {
            Some(r) => r,
            None => return Ok(None),
        };

        let challenge: StoredChallenge =
            serde_json::from_str(&raw).map_err(|e| Error::new(ErrorKind::Internal, e.to_string()))?;

        if challenge.is_expired(Utc::now()) {
            return Ok(None);
        }

        Ok(Some(challenge))
    }
}

fn base64_url_encode(bytes: &[u8]) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    URL_SAFE_NO_PAD.encode(bytes)
}
