use super::{
    traits::{genesis_chain_hash, AuditBackend, AuditFilter, BackendHealth, ChainVerificationResult, SortOrder},
    AuditEvent,
};
use crate::error::{Error, ErrorKind, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Database-backed audit repository
pub struct DatabaseAuditRepository {
    pool: Arc<PgPool>,
    table_name: String,
}

impl DatabaseAuditRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self {
            pool,
            table_name: "audit_events".to_string(),
        }
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    /// Initialize the audit table if it doesn't exist
    pub async fn initialize(&self) -> Result<()> {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id VARCHAR(255) PRIMARY KEY,
                event_type VARCHAR(100) NOT NULL,
                severity VARCHAR(20) NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL,
                actor_id VARCHAR(255),
                impersonator_id VARCHAR(255),
                tenant_id VARCHAR(255),
                request_id VARCHAR(255),
                resource_type VARCHAR(100),
                resource_id VARCHAR(255),
                source_ip INET,
                user_agent TEXT,
                description TEXT NOT NULL,
                metadata JSONB,
                previous_values JSONB,
                new_values JSONB,
                outcome VARCHAR(20) NOT NULL,
                tags TEXT[],
                compliance_frameworks TEXT[] NOT NULL DEFAULT '{{}}',
                sequence_number BIGINT NOT NULL,
                event_hash VARCHAR(64) NOT NULL,
                chain_hash VARCHAR(64) NOT NULL,
                sensitive BOOLEAN NOT NULL DEFAULT FALSE,
                retention_until TIMESTAMPTZ NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );

            CREATE INDEX IF NOT EXISTS idx_{}_timestamp ON {} (timestamp);
            CREATE INDEX IF NOT EXISTS idx_{}_actor_id ON {} (actor_id);
            CREATE INDEX IF NOT EXISTS idx_{}_tenant_id ON {} (tenant_id);
            CREATE INDEX IF NOT EXISTS idx_{}_event_type ON {} (event_type);
            CREATE INDEX IF NOT EXISTS idx_{}_resource ON {} (resource_type, resource_id);
            CREATE INDEX IF NOT EXISTS idx_{}_severity ON {} (severity);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_{}_tenant_sequence ON {} (tenant_id, sequence_number);
            "#,
            self.table_name,
            self.table_name, self.table_name,
            self.table_name, self.table_name,
            self.table_name, self.table_name,
            self.table_name, self.table_name,
            self.table_name, self.table_name,
            self.table_name, self.table_name,
            self.table_name, self.table_name,
        );

        sqlx::query(&sql).execute(self.pool.as_ref()).await?;
        info!("Audit table '{}' initialized", self.table_name);
        Ok(())
    }
}

#[async_trait]
impl AuditBackend for DatabaseAuditRepository {
    async fn store_event(&self, event: &AuditEvent) -> Result<()> {
        let sql = format!(
            r#"
            INSERT INTO {} (
                id, event_type, severity, timestamp, actor_id, impersonator_id,
                tenant_id, request_id, resource_type, resource_id, source_ip,
                user_agent, description, metadata, previous_values, new_values,
                outcome, tags, compliance_frameworks, sequence_number, event_hash, chain_hash,
                sensitive, retention_until
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24
            )
            "#,
            self.table_name
        );

        let source_ip: Option<String> = event.source_ip.clone();

        let result = sqlx::query(&sql)
            .bind(&event.id)
            .bind(&event.event_type.to_string())
            .bind(&event.severity.to_string())
            .bind(&event.timestamp)
            .bind(&event.actor_id)
            .bind(&event.impersonator_id)
            .bind(&event.tenant_id)
            .bind(&event.request_id)
            .bind(&event.resource_type)
            .bind(&event.resource_id)
            .bind(source_ip)
            .bind(&event.user_agent)
            .bind(&event.description)
            .bind(serde_json::to_value(&event.metadata).unwrap_or(serde_json::Value::Null))
            .bind(&event.previous_values)
            .bind(&event.new_values)
            .bind(&event.outcome.to_string())
            .bind(&event.tags)
            .bind(&event.compliance_frameworks)
            .bind(event.sequence_number)
            .bind(&event.event_hash)
            .bind(&event.chain_hash)
            .bind(event.sensitive)
            .bind(&event.retention_until)
            .execute(self.pool.as_ref())
            .await;

        match result {
            Ok(_) => {
                debug!("Stored audit event: {}", event.id);
                Ok(())
            }
            Err(e) => {
                error!("Failed to store audit event {}: {}", event.id, e);
                Err(Error::from(e))
            }
        }
    }

    async fn retrieve_events(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>> {
        // Conditions and their bind calls are appended in lockstep below so
        // the `$N` placeholders line up with the values bound onto `query`
        // further down, regardless of which filters are actually set.
        let mut conditions = Vec::new();
        let mut param_count = 0;

        if filter.start_time.is_some() {
            param_count += 1;
            conditions.push(format!("timestamp >= ${}", param_count));
        }
        if filter.end_time.is_some() {
            param_count += 1;
            conditions.push(format!("timestamp <= ${}", param_count));
        }
        if filter.actor_id.is_some() {
            param_count += 1;
            conditions.push(format!("actor_id = ${}", param_count));
        }
        if filter.tenant_id.is_some() {
            param_count += 1;
            conditions.push(format!("tenant_id = ${}", param_count));
        }
        if filter.resource_type.is_some() {
            param_count += 1;
            conditions.push(format!("resource_type = ${}", param_count));
        }
        if filter.tags.is_some() {
            param_count += 1;
            conditions.push(format!("tags && ${}", param_count));
        }
        if filter.compliance_framework.is_some() {
            param_count += 1;
            conditions.push(format!("${} = ANY(compliance_frameworks)", param_count));
        }
        if filter.description_contains.is_some() {
            param_count += 1;
            conditions.push(format!("description ILIKE ${}", param_count));
        }

        // Build ORDER BY
        let order_by = match filter.sort_order {
            SortOrder::TimestampAsc => "timestamp ASC",
            SortOrder::TimestampDesc => "timestamp DESC",
            SortOrder::SeverityDesc => "CASE severity WHEN 'Critical' THEN 1 WHEN 'High' THEN 2 WHEN 'Medium' THEN 3 WHEN 'Low' THEN 4 ELSE 5 END, timestamp DESC",
        };

        // Build LIMIT and OFFSET
        let limit_clause = if filter.limit.is_some() {
            param_count += 1;
            format!(" LIMIT ${}", param_count)
        } else {
            String::new()
        };

        let offset_clause = if filter.offset.is_some() {
            param_count += 1;
            format!(" OFFSET ${}", param_count)
        } else {
            String::new()
        };

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            r#"
            SELECT id, event_type, severity, timestamp, actor_id, impersonator_id,
                   tenant_id, request_id, resource_type, resource_id, source_ip,
                   user_agent, description, metadata, previous_values, new_values,
                   outcome, tags, compliance_frameworks, sequence_number, event_hash, chain_hash,
                   sensitive, retention_until
            FROM {}{}
            ORDER BY {}{}{}
            "#,
            self.table_name, where_clause, order_by, limit_clause, offset_clause
        );

        let mut query = sqlx::query(&sql);
        if let Some(start_time) = &filter.start_time {
            query = query.bind(*start_time);
        }
        if let Some(end_time) = &filter.end_time {
            query = query.bind(*end_time);
        }
        if let Some(actor_id) = &filter.actor_id {
            query = query.bind(actor_id.clone());
        }
        if let Some(tenant_id) = &filter.tenant_id {
            query = query.bind(tenant_id.clone());
        }
        if let Some(resource_type) = &filter.resource_type {
            query = query.bind(resource_type.clone());
        }
        if let Some(tags) = &filter.tags {
            query = query.bind(tags.clone());
        }
        if let Some(framework) = &filter.compliance_framework {
            query = query.bind(framework.clone());
        }
        if let Some(description_contains) = &filter.description_contains {
            query = query.bind(format!("%{}%", description_contains));
        }
        if let Some(limit) = filter.limit {
            query = query.bind(limit as i64);
        }
        if let Some(offset) = filter.offset {
            query = query.bind(offset as i64);
        }

        let rows = query.fetch_all(self.pool.as_ref()).await?;

        let mut events = Vec::new();
        for row in rows {
            let event = AuditEvent {
                id: row.get("id"),
                event_type: parse_event_type(&row.get::<String, _>("event_type")),
                severity: parse_severity(&row.get::<String, _>("severity")),
                timestamp: row.get("timestamp"),
                actor_id: row.get("actor_id"),
                impersonator_id: row.get("impersonator_id"),
                tenant_id: row.get("tenant_id"),
                request_id: row.get("request_id"),
                resource_type: row.get("resource_type"),
                resource_id: row.get("resource_id"),
                source_ip: row.get::<Option<String>, _>("source_ip"),
                user_agent: row.get("user_agent"),
                description: row.get("description"),
                metadata: serde_json::from_value(
                    row.get::<serde_json::Value, _>("metadata")
                ).unwrap_or_default(),
                previous_values: row.get("previous_values"),
                new_values: row.get("new_values"),
                outcome: parse_outcome(&row.get::<String, _>("outcome")),
                tags: row.get::<Vec<String>, _>("tags"),
                compliance_frameworks: row.get::<Vec<String>, _>("compliance_frameworks"),
                sequence_number: row.get("sequence_number"),
                event_hash: row.get("event_hash"),
                chain_hash: row.get("chain_hash"),
                sensitive: row.get("sensitive"),
                retention_until: row.get("retention_until"),
            };
            events.push(event);
        }

        Ok(events)
    }

    async fn count_events(&self, _filter: &AuditFilter) -> Result<u64> {
        // Similar to retrieve_events but with COUNT query
        let sql = format!("SELECT COUNT(*) FROM {}", self.table_name);
        
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(count as u64)
    }

    async fn health_check(&self) -> Result<BackendHealth> {
        match sqlx::query("SELECT 1").fetch_one(self.pool.as_ref()).await {
            Ok(_) => Ok(BackendHealth {
                is_healthy: true,
                message: None,
                last_write: None, // Would need to track this
                events_stored_today: None, // Would need to query for today's count
            }),
            Err(e) => Ok(BackendHealth {
                is_healthy: false,
                message: Some(e.to_string()),
                last_write: None,
                events_stored_today: None,
            }),
        }
    }

    async fn cleanup_old_events(&self, older_than: DateTime<Utc>) -> Result<u64> {
        // Physical delete only past each event's own `retention_until`
        // (spec §3 AuditLog lifecycle), even if a caller asks for an
        // earlier cutoff.
        let sql = format!(
            "DELETE FROM {} WHERE timestamp < $1 AND retention_until < NOW()",
            self.table_name
        );

        let result = sqlx::query(&sql)
            .bind(older_than)
            .execute(self.pool.as_ref())
            .await?;

        info!("Cleaned up {} old audit events", result.rows_affected());
        Ok(result.rows_affected())
    }

    async fn chain_head(&self, tenant_id: &str) -> Result<(i64, String)> {
        let sql = format!(
            "SELECT sequence_number, chain_hash FROM {} WHERE tenant_id = $1 ORDER BY sequence_number DESC LIMIT 1",
            self.table_name
        );

        let row = sqlx::query(&sql)
            .bind(tenant_id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        match row {
            Some(row) => Ok((row.get("sequence_number"), row.get("chain_hash"))),
            None => Ok((0, genesis_chain_hash())),
        }
    }

    async fn verify_chain(&self, tenant_id: &str) -> Result<ChainVerificationResult> {
        let sql = format!(
            "SELECT sequence_number, event_hash, chain_hash FROM {} WHERE tenant_id = $1 ORDER BY sequence_number ASC",
            self.table_name
        );

        let rows = sqlx::query(&sql)
            .bind(tenant_id)
            .fetch_all(self.pool.as_ref())
            .await?;

        let mut prev_sequence = 0i64;
        let mut prev_chain_hash = genesis_chain_hash();
        let mut events_checked = 0u64;

        for row in rows {
            let sequence_number: i64 = row.get("sequence_number");
            let event_hash: String = row.get("event_hash");
            let chain_hash: String = row.get("chain_hash");

            if sequence_number != prev_sequence + 1 {
                return Ok(ChainVerificationResult {
                    intact: false,
                    events_checked,
                    first_violation_sequence: Some(sequence_number),
                });
            }

            let expected = {
                use ring::digest;
                let mut input = Vec::with_capacity(prev_chain_hash.len() + event_hash.len());
                input.extend_from_slice(prev_chain_hash.as_bytes());
                input.extend_from_slice(event_hash.as_bytes());
                let digest = digest::digest(&digest::SHA256, &input);
                let mut out = String::with_capacity(64);
                for b in digest.as_ref() {
                    use std::fmt::Write;
                    write!(out, "{:02x}", b).expect("writing to a String never fails");
                }
                out
            };

            if expected != chain_hash {
                return Ok(ChainVerificationResult {
                    intact: false,
                    events_checked,
                    first_violation_sequence: Some(sequence_number),
                });
            }

            prev_sequence = sequence_number;
            prev_chain_hash = chain_hash;
            events_checked += 1;
        }

        Ok(ChainVerificationResult {
            intact: true,
            events_checked,
            first_violation_sequence: None,
        })
    }
}

/// Generic audit repository that can use multiple backends
pub struct AuditRepository {
    backends: Vec<Box<dyn AuditBackend>>,
    primary_backend: usize,
}

impl AuditRepository {
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
            primary_backend: 0,
        }
    }

    pub fn add_backend(mut self, backend: Box<dyn AuditBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn with_primary_backend(mut self, index: usize) -> Self {
        if index < self.backends.len() {
            self.primary_backend = index;
        }
        self
    }
}

#[async_trait]
impl AuditBackend for AuditRepository {
    async fn store_event(&self, event: &AuditEvent) -> Result<()> {
        if self.backends.is_empty() {
            return Err(Error::new(ErrorKind::Internal, "No audit backends configured"));
        }

        // Store to all backends, but only fail if primary backend fails
        let mut primary_result = Ok(());
        for (i, backend) in self.backends.iter().enumerate() {
            match backend.store_event(event).await {
                Ok(_) => {
                    if i == self.primary_backend {
                        primary_result = Ok(());
                    }
                }
                Err(e) => {
                    if i == self.primary_backend {
                        primary_result = Err(e);
                    } else {
                        error!("Secondary audit backend {} failed: {}", i, e);
                    }
                }
            }
        }

        primary_result
    }

    async fn retrieve_events(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>> {
        if self.primary_backend >= self.backends.len() {
            return Err(Error::new(ErrorKind::Internal, "Invalid primary backend index"));
        }

        self.backends[self.primary_backend]
            .retrieve_events(filter)
            .await
    }

    async fn count_events(&self, filter: &AuditFilter) -> Result<u64> {
        if self.primary_backend >= self.backends.len() {
            return Err(Error::new(ErrorKind::Internal, "Invalid primary backend index"));
        }

        self.backends[self.primary_backend]
            .count_events(filter)
            .await
    }

    async fn health_check(&self) -> Result<BackendHealth> {
        if self.primary_backend >= self.backends.len() {
            return Err(Error::new(ErrorKind::Internal, "Invalid primary backend index"));
        }

        self.backends[self.primary_backend]
            .health_check()
            .await
    }

    async fn cleanup_old_events(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut total_cleaned = 0u64;
        
        for backend in &self.backends {
            match backend.cleanup_old_events(older_than).await {
                Ok(cleaned) => total_cleaned += cleaned,
                Err(e) => error!("Failed to cleanup events in backend: {}", e),
            }
        }

        Ok(total_cleaned)
    }

    async fn chain_head(&self, tenant_id: &str) -> Result<(i64, String)> {
        if self.primary_backend >= self.backends.len() {
            return Err(Error::new(ErrorKind::Internal, "Invalid primary backend index"));
        }

        self.backends[self.primary_backend].chain_head(tenant_id).await
    }

    async fn verify_chain(&self, tenant_id: &str) -> Result<ChainVerificationResult> {
        if self.primary_backend >= self.backends.len() {
            return Err(Error::new(ErrorKind::Internal, "Invalid primary backend index"));
        }

        self.backends[self.primary_backend].verify_chain(tenant_id).await
    }
}

impl Default for AuditRepository {
    fn default() -> Self {
        Self::new()
    }
}

// Helper functions for parsing database values
fn parse_event_type(s: &str) -> crate::audit::event::EventType {
    use crate::audit::event::EventType;
    
    match s {
        "AUTHENTICATION_ATTEMPT" => EventType::AuthenticationAttempt,
        "AUTHENTICATION_SUCCESS" => EventType::AuthenticationSuccess,
        "AUTHENTICATION_FAILURE" => EventType::AuthenticationFailure,
        // Add more cases as needed
        _ => EventType::Custom(s.to_string()),
    }
}

fn parse_severity(s: &str) -> crate::audit::event::EventSeverity {
    use crate::audit::event::EventSeverity;
    
    match s.to_lowercase().as_str() {
        "info" => EventSeverity::Info,
        "low" => EventSeverity::Low,
        "medium" | "warning" => EventSeverity::Medium,
        "high" => EventSeverity::High,
        "critical" => EventSeverity::Critical,
        _ => EventSeverity::Info,
    }
}

fn parse_outcome(s: &str) -> crate::audit::event::EventOutcome {
    use crate::audit::event::EventOutcome;
    
    match s.to_lowercase().as_str() {
        "success" => EventOutcome::Success,
        "failure" => EventOutcome::Failure,
        "partial" => EventOutcome::Partial,
        _ => EventOutcome::Unknown,
    }
}