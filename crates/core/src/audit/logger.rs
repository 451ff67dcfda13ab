use super::{
    event::{AuditEvent, EventType},
    traits::AuditBackend,
};
use crate::error::{Error, ErrorKind, ErrorMetrics, Result};
use chrono::Utc;
use dashmap::DashMap;
use ring::digest;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

/// High-level audit logger that provides convenient methods for logging
/// business events and maintains the tamper-evident hash chain.
///
/// Appends are serialized per tenant through `chain_locks`: computing the
/// next `chain_hash` requires reading the current head and writing the new
/// one atomically with respect to other appends for the same tenant, and a
/// plain `Mutex` keyed by tenant id (rather than a single global lock) keeps
/// unrelated tenants from blocking each other.
#[derive(Clone)]
pub struct AuditLogger {
    backend: Arc<dyn AuditBackend>,
    error_metrics: Arc<ErrorMetrics>,
    context: Arc<RwLock<AuditContext>>,
    chain_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Context that persists across audit operations in a session/request
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    pub actor_id: Option<String>,
    pub tenant_id: Option<String>,
    pub request_id: Option<String>,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub impersonator_id: Option<String>,
}

impl AuditLogger {
    pub fn new(backend: Arc<dyn AuditBackend>, error_metrics: Arc<ErrorMetrics>) -> Self {
        Self {
            backend,
            error_metrics,
            context: Arc::new(RwLock::new(AuditContext::default())),
            chain_locks: Arc::new(DashMap::new()),
        }
    }

    fn lock_for_tenant(&self, tenant_id: &str) -> Arc<Mutex<()>> {
        self.chain_locks
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Canonical bytes an event's hash is computed over. Deliberately
    /// excludes `sequence_number`/`event_hash`/`chain_hash` themselves.
    fn canonical_bytes(event: &AuditEvent) -> Vec<u8> {
        serde_json::json!({
            "id": event.id,
            "event_type": event.event_type,
            "severity": event.severity,
            "timestamp": event.timestamp,
            "actor_id": event.actor_id,
            "tenant_id": event.tenant_id,
            "resource_type": event.resource_type,
            "resource_id": event.resource_id,
            "description": event.description,
            "metadata": event.metadata,
            "outcome": event.outcome,
        })
        .to_string()
        .into_bytes()
    }

    fn hex_encode(bytes: &[u8]) -> String {
        use std::fmt::Write;
        let mut out = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            write!(out, "{:02x}", b).expect("writing to a String never fails");
        }
        out
    }

    /// Set the audit context for subsequent operations
    pub async fn set_context(&self, context: AuditContext) {
        let mut ctx = self.context.write().await;
        *ctx = context;
    }

    /// Update specific context fields
    pub async fn update_context<F>(&self, updater: F)
    where
        F: FnOnce(&mut AuditContext),
    {
        let mut ctx = self.context.write().await;
        updater(&mut *ctx);
    }

    /// Log a generic audit event
    pub async fn log_event(&self, mut event: AuditEvent) -> Result<()> {
        // Apply context if fields are not already set
        {
            let ctx = self.context.read().await;
            
            if event.actor_id.is_none() {
                event.actor_id = ctx.actor_id.clone();
            }
            if event.tenant_id.is_none() {
                event.tenant_id = ctx.tenant_id.clone();
            }
            if event.request_id.is_none() {
                event.request_id = ctx.request_id.clone();
            }
            if event.source_ip.is_none() {
                event.source_ip = ctx.source_ip.clone();
            }
            if event.user_agent.is_none() {
                event.user_agent = ctx.user_agent.clone();
            }
            if event.impersonator_id.is_none() {
                event.impersonator_id = ctx.impersonator_id.clone();
            }
        }

        // Assign this event's position in its tenant's hash chain. The
        // tenant-scoped lock is held across the read-modify-write of the
        // chain head so concurrent appends for the same tenant serialize
        // instead of racing on sequence_number.
        let chain_tenant_key = event.tenant_id.clone().unwrap_or_else(|| "__global__".to_string());
        {
            let lock = self.lock_for_tenant(&chain_tenant_key);
            let _guard = lock.lock().await;

            let (prev_sequence, prev_chain_hash) = self.backend.chain_head(&chain_tenant_key).await?;

            let event_hash_bytes = digest::digest(&digest::SHA256, &Self::canonical_bytes(&event));
            let event_hash = Self::hex_encode(event_hash_bytes.as_ref());

            let mut chain_input = Vec::with_capacity(prev_chain_hash.len() + event_hash.len());
            chain_input.extend_from_slice(prev_chain_hash.as_bytes());
            chain_input.extend_from_slice(event_hash.as_bytes());
            let chain_hash_bytes = digest::digest(&digest::SHA256, &chain_input);

            event.sequence_number = prev_sequence + 1;
            event.event_hash = event_hash;
            event.chain_hash = Self::hex_encode(chain_hash_bytes.as_ref());
            event.retention_until = super::retention::retention_until_for(&event.event_type, Utc::now());
        }

        // Log to structured logging as well
        match event.severity {
            crate::audit::event::EventSeverity::Info => {
                info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    actor_id = ?event.actor_id,
                    resource = ?event.resource_type,
                    description = %event.description,
                    "Audit event"
                );
            }
            crate::audit::event::EventSeverity::Low => {
                info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    actor_id = ?event.actor_id,
                    resource = ?event.resource_type,
                    description = %event.description,
                    "Audit event (low)"
                );
            }
            crate::audit::event::EventSeverity::Medium => {
                warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    actor_id = ?event.actor_id,
                    resource = ?event.resource_type,
                    description = %event.description,
                    "Audit event (medium)"
                );
            }
            crate::audit::event::EventSeverity::High => {
                error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    actor_id = ?event.actor_id,
                    resource = ?event.resource_type,
                    description = %event.description,
                    metadata = ?event.metadata,
                    "Audit event (high)"
                );
            }
            crate::audit::event::EventSeverity::Critical => {
                error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    actor_id = ?event.actor_id,
                    resource = ?event.resource_type,
                    description = %event.description,
                    metadata = ?event.metadata,
                    "Critical audit event"
                );
            }
        }

        // Store to backend
        match self.backend.store_event(&event).await {
            Ok(_) => Ok(()),
            Err(e) => {
                // Record the audit failure as an error metric
                let audit_error = Error::new(
                    ErrorKind::Internal,
                    format!("Failed to store audit event: {}", e)
                );
                self.error_metrics.record_error(&audit_error).await;
                
                // Critical: if we can't audit, this is a serious security concern
                error!(
                    event_id = %event.id,
                    error = %e,
                    "Failed to store audit event - this is a critical security issue"
                );
                
                Err(e)
            }
        }
    }

    // Convenience methods for common audit events

    /// Log authentication attempt
    pub async fn log_authentication_attempt(
        &self,
        email: &str,
        success: bool,
        failure_reason: Option<&str>,
    ) -> Result<()> {
        let (event_type, description) = if success {
            (EventType::AuthenticationSuccess, format!("User {} authenticated successfully", email))
        } else {
            (
                EventType::AuthenticationFailure,
                format!(
                    "Authentication failed for user {}: {}",
                    email,
                    failure_reason.unwrap_or("Unknown reason")
                ),
            )
        };

        let mut event = AuditEvent::builder(event_type, description)
            .metadata("email".to_string(), serde_json::Value::String(email.to_string()));

        if let Some(reason) = failure_reason {
            event = event.metadata("failure_reason".to_string(), serde_json::Value::String(reason.to_string()));
        }

        self.log_event(event.build()).await
    }

    /// Log resource access
    pub async fn log_resource_access(
        &self,
        action: &str, // "create", "read", "update", "delete"
        resource_type: &str,
        resource_id: &str,
        previous_values: Option<serde_json::Value>,
        new_values: Option<serde_json::Value>,
    ) -> Result<()> {
        let event_type = match action {
            "create" => EventType::ResourceCreated,
            "read" => EventType::ResourceRead,
            "update" => EventType::ResourceUpdated,
            "delete" => EventType::ResourceDeleted,
            _ => EventType::Custom(format!("RESOURCE_{}", action.to_uppercase())),
        };

        let description = format!("{} {} {}", action, resource_type, resource_id);

        let mut event = AuditEvent::builder(event_type, description)
            .resource(resource_type, resource_id)
            .metadata("action".to_string(), serde_json::Value::String(action.to_string()));

        if let Some(prev) = previous_values {
            event = event.previous_values(prev);
        }

        if let Some(new) = new_values {
            event = event.new_values(new);
        }

        self.log_event(event.build()).await
    }

    /// Log security policy violation
    pub async fn log_security_violation(
        &self,
        violation_type: &str,
        description: &str,
        additional_context: Option<serde_json::Value>,
    ) -> Result<()> {
        let mut event = AuditEvent::builder(EventType::SecurityPolicyViolation, description)
            .severity(crate::audit::event::EventSeverity::High)
            .metadata("violation_type".to_string(), serde_json::Value::String(violation_type.to_string()));

        if let Some(context) = additional_context {
            event = event.metadata("additional_context".to_string(), context);
        }

        self.log_event(event.build()).await
    }

    /// Log a credential lifecycle event (registration, assertion, counter
    /// anomaly, quarantine, revocation).
    pub async fn log_credential_event(
        &self,
        event_type: EventType,
        credential_id: &str,
        description: impl Into<String>,
        severity: crate::audit::event::EventSeverity,
    ) -> Result<()> {
        let event = AuditEvent::builder(event_type, description)
            .resource("credential", credential_id)
            .severity(severity)
            .build();
        self.log_event(event).await
    }

    /// Log a WebAuthn ceremony failure (registration or authentication).
    /// Always carries at least `Medium` severity per the ceremony contract;
    /// `full_detail` is attached as metadata rather than folded into the
    /// description so the unredacted backend row keeps it even though the
    /// public projection of a `sensitive` event would strip it.
    pub async fn log_ceremony_failure(
        &self,
        event_type: EventType,
        actor_id: Option<&str>,
        description: impl Into<String>,
        failure: impl std::fmt::Display,
        severity: crate::audit::event::EventSeverity,
    ) -> Result<()> {
        let mut event = AuditEvent::builder(event_type, description)
            .severity(severity)
            .outcome(crate::audit::event::EventOutcome::Failure)
            .metadata("failure".to_string(), serde_json::Value::String(failure.to_string()));

        if let Some(actor) = actor_id {
            event = event.actor_id(actor);
        }

        self.log_event(event.build()).await
    }

    /// Log a session lifecycle event (creation, refresh, revocation, reuse detection).
    pub async fn log_session_event(
        &self,
        event_type: EventType,
        session_id: &str,
        description: impl Into<String>,
        severity: crate::audit::event::EventSeverity,
    ) -> Result<()> {
        let event = AuditEvent::builder(event_type, description)
            .resource("session", session_id)
            .severity(severity)
            .build();
        self.log_event(event).await
    }

    /// Log a risk engine assessment or risk-event transition.
    pub async fn log_risk_event(
        &self,
        event_type: EventType,
        user_id: &str,
        score: f64,
        description: impl Into<String>,
    ) -> Result<()> {
        let event = AuditEvent::builder(event_type, description)
            .resource("user", user_id)
            .metadata("risk_score".to_string(), serde_json::json!(score))
            .build();
        self.log_event(event).await
    }

    /// Log an identity graph mutation (link, context creation, attribute
    /// verification/demotion).
    pub async fn log_identity_event(
        &self,
        event_type: EventType,
        resource_id: &str,
        description: impl Into<String>,
    ) -> Result<()> {
        let event = AuditEvent::builder(event_type, description)
            .resource("identity", resource_id)
            .build();
        self.log_event(event).await
    }

    /// Log the outcome of a chain integrity verification pass.
    pub async fn log_chain_verification(
        &self,
        tenant_id: &str,
        result: &super::traits::ChainVerificationResult,
    ) -> Result<()> {
        let (event_type, severity, description) = if result.intact {
            (
                EventType::ChainIntegrityVerified,
                crate::audit::event::EventSeverity::Info,
                format!("chain verified intact over {} events", result.events_checked),
            )
        } else {
            (
                EventType::ChainIntegrityViolation,
                crate::audit::event::EventSeverity::Critical,
                format!(
                    "chain integrity violation at sequence {:?}",
                    result.first_violation_sequence
                ),
            )
        };

        let event = AuditEvent::builder(event_type, description)
            .tenant_id(tenant_id)
            .severity(severity)
            .build();

        self.log_event(event).await
    }

    /// Log data export/import
    pub async fn log_data_operation(
        &self,
        operation: &str, // "export" or "import"
        data_type: &str,
        record_count: Option<u64>,
        file_path: Option<&str>,
    ) -> Result<()> {
        let event_type = match operation {
            "export" => EventType::DataExport,
            "import" => EventType::DataImport,
            _ => EventType::Custom(format!("DATA_{}", operation.to_uppercase())),
        };

        let description = format!("{} operation for {}", operation, data_type);

        let mut event = AuditEvent::builder(event_type, description)
            .severity(crate::audit::event::EventSeverity::Medium) // Data operations are sensitive
            .metadata("operation".to_string(), serde_json::Value::String(operation.to_string()))
            .metadata("data_type".to_string(), serde_json::Value::String(data_type.to_string()));

        if let Some(count) = record_count {
            event = event.metadata("record_count".to_string(), serde_json::Value::Number(serde_json::Number::from(count)));
        }

        if let Some(path) = file_path {
            event = event.metadata("file_path".to_string(), serde_json::Value::String(path.to_string()));
        }

        self.log_event(event.build()).await
    }

    /// Log system events
    pub async fn log_system_event(
        &self,
        event_type: EventType,
        description: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        let mut event = AuditEvent::builder(event_type, description);

        if let Some(meta) = metadata {
            event = event.metadata("system_metadata".to_string(), meta);
        }

        self.log_event(event.build()).await
    }
}

impl AuditContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actor_id(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_source_ip(mut self, source_ip: impl Into<String>) -> Self {
        self.source_ip = Some(source_ip.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_impersonator_id(mut self, impersonator_id: impl Into<String>) -> Self {
        self.impersonator_id = Some(impersonator_id.into());
        self
    }
}