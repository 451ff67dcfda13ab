use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Severity levels for audit events, ascending so that comparisons like
/// `severity >= EventSeverity::Medium` read naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

/// The single, business-agnostic audit event taxonomy. Every subsystem
/// (WebAuthn engine, session manager, credential store, risk engine,
/// identity graph) appends through this one enum rather than maintaining a
/// parallel event-type list of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    // Authentication & session lifecycle
    AuthenticationAttempt,
    AuthenticationSuccess,
    AuthenticationFailure,
    AuthorizationGranted,
    AuthorizationDenied,
    SessionCreated,
    SessionRefreshed,
    SessionRevoked,
    SessionTerminated,
    RefreshTokenReuseDetected,

    // Credential lifecycle (WebAuthn)
    CredentialRegistered,
    CredentialAuthenticated,
    CredentialCounterAnomaly,
    CredentialQuarantined,
    CredentialRevoked,
    WebAuthnRegistrationFailed,
    WebAuthnAuthenticationFailed,

    // Risk engine
    RiskAssessed,
    RiskEventOpened,
    RiskEventResolved,

    // Identity graph
    IdentityLinked,
    ContextCreated,
    ContextVerificationLevelChanged,
    AttributeAdded,
    AttributeVerified,
    AttributeDemoted,

    // Resource Management Events
    ResourceCreated,
    ResourceRead,
    ResourceUpdated,
    ResourceDeleted,
    ResourcePermissionChanged,

    // System Events
    SystemStartup,
    SystemShutdown,
    ConfigurationChanged,
    MaintenanceModeEnabled,
    MaintenanceModeDisabled,

    // Security Events
    SecurityPolicyViolation,
    SuspiciousActivity,
    DataExport,
    DataImport,
    AccountLocked,
    AccountUnlocked,

    // Administrative Events
    UserCreated,
    UserModified,
    UserDeactivated,

    // Integrity
    ChainIntegrityVerified,
    ChainIntegrityViolation,

    // Custom Events (for business-specific extensions)
    Custom(String),
}

/// Core audit event structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique identifier for this event
    pub id: String,
    /// Event type
    pub event_type: EventType,
    /// Event severity
    pub severity: EventSeverity,
    /// Timestamp when event occurred
    pub timestamp: DateTime<Utc>,
    /// User ID who performed the action (if applicable)
    pub actor_id: Option<String>,
    /// User ID being impersonated (if applicable)
    pub impersonator_id: Option<String>,
    /// Tenant/Organization context
    pub tenant_id: Option<String>,
    /// Request ID for correlation
    pub request_id: Option<String>,
    /// Resource being acted upon
    pub resource_type: Option<String>,
    /// ID of the resource
    pub resource_id: Option<String>,
    /// Source IP address
    pub source_ip: Option<String>,
    /// User agent
    pub user_agent: Option<String>,
    /// Human-readable description
    pub description: String,
    /// Structured metadata
    pub metadata: HashMap<String, serde_json::Value>,
    /// Previous values (for update operations)
    pub previous_values: Option<serde_json::Value>,
    /// New values (for create/update operations)
    pub new_values: Option<serde_json::Value>,
    /// Operation outcome
    pub outcome: EventOutcome,
    /// Additional tags for filtering
    pub tags: Vec<String>,
    /// Compliance-framework tags this event is relevant to (e.g. `"SOC2"`,
    /// `"GDPR"`), queryable via `AuditFilter::compliance_framework`.
    pub compliance_frameworks: Vec<String>,
    /// Strictly sequential position of this event within its tenant's
    /// hash chain. Assigned from the chain head at append time, never from
    /// the wall clock.
    pub sequence_number: i64,
    /// SHA-256 of this event's canonical content, hex-encoded.
    pub event_hash: String,
    /// SHA-256(prev_chain_hash || event_hash), hex-encoded. The genesis
    /// event chains from a fixed all-zero prior hash.
    pub chain_hash: String,
    /// Whether `metadata`/`previous_values`/`new_values` carry data that
    /// must be redacted from public projections (spec §3 AuditLog:
    /// "sensitive events redact payload in public projections").
    pub sensitive: bool,
    /// Derived from `event_type` at append time per the retention table in
    /// spec §4.5; never set by the caller.
    pub retention_until: DateTime<Utc>,
}

/// Event outcome enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOutcome {
    Success,
    Failure,
    Partial,
    Unknown,
}

impl std::fmt::Display for EventOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventOutcome::Success => write!(f, "success"),
            EventOutcome::Failure => write!(f, "failure"),
            EventOutcome::Partial => write!(f, "partial"),
            EventOutcome::Unknown => write!(f, "unknown"),
        }
    }
}

/// Builder for creating audit events
pub struct AuditEventBuilder {
    event: AuditEvent,
}

impl AuditEventBuilder {
    pub fn new(event_type: EventType, description: impl Into<String>) -> Self {
        Self {
            event: AuditEvent {
                id: Uuid::new_v4().to_string(),
                event_type,
                severity: EventSeverity::Info,
                timestamp: Utc::now(),
                actor_id: None,
                impersonator_id: None,
                tenant_id: None,
                request_id: None,
                resource_type: None,
                resource_id: None,
                source_ip: None,
                user_agent: None,
                description: description.into(),
                metadata: HashMap::new(),
                previous_values: None,
                new_values: None,
                outcome: EventOutcome::Success,
                tags: Vec::new(),
                compliance_frameworks: Vec::new(),
                sequence_number: 0,
                event_hash: String::new(),
                chain_hash: String::new(),
                sensitive: false,
                // Overwritten by `AuditLogger::log_event`, which derives the
                // real value from `event_type` right before the chain append.
                retention_until: Utc::now(),
            }
        }
    }

    pub fn severity(mut self, severity: EventSeverity) -> Self {
        self.event.severity = severity;
        self
    }

    pub fn actor_id(mut self, actor_id: impl Into<String>) -> Self {
        self.event.actor_id = Some(actor_id.into());
        self
    }

    pub fn impersonator_id(mut self, impersonator_id: impl Into<String>) -> Self {
        self.event.impersonator_id = Some(impersonator_id.into());
        self
    }

    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.event.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.event.request_id = Some(request_id.into());
        self
    }

    pub fn resource(mut self, resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        self.event.resource_type = Some(resource_type.into());
        self.event.resource_id = Some(resource_id.into());
        self
    }

    pub fn source_ip(mut self, source_ip: impl Into<String>) -> Self {
        self.event.source_ip = Some(source_ip.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.event.user_agent = Some(user_agent.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.event.metadata.insert(key.into(), value);
        self
    }

    pub fn previous_values(mut self, values: serde_json::Value) -> Self {
        self.event.previous_values = Some(values);
        self
    }

    pub fn new_values(mut self, values: serde_json::Value) -> Self {
        self.event.new_values = Some(values);
        self
    }

    pub fn outcome(mut self, outcome: EventOutcome) -> Self {
        self.event.outcome = outcome;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.event.tags.push(tag.into());
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.event.tags.extend(tags);
        self
    }

    pub fn compliance_framework(mut self, framework: impl Into<String>) -> Self {
        self.event.compliance_frameworks.push(framework.into());
        self
    }

    pub fn compliance_frameworks(mut self, frameworks: Vec<String>) -> Self {
        self.event.compliance_frameworks.extend(frameworks);
        self
    }

    /// Mark this event's payload as requiring redaction in public
    /// projections. Most event types default to `false`; callers handling
    /// PII-bearing metadata (e.g. attribute values, attestation blobs)
    /// should opt in explicitly.
    pub fn sensitive(mut self, sensitive: bool) -> Self {
        self.event.sensitive = sensitive;
        self
    }

    pub fn build(self) -> AuditEvent {
        self.event
    }
}

impl AuditEvent {
    /// Create a new builder
    pub fn builder(event_type: EventType, description: impl Into<String>) -> AuditEventBuilder {
        AuditEventBuilder::new(event_type, description)
    }

    /// Check if event should be alerted
    pub fn should_alert(&self) -> bool {
        matches!(self.severity, EventSeverity::Critical | EventSeverity::High)
            || matches!(self.outcome, EventOutcome::Failure)
            || matches!(
                self.event_type,
                EventType::SecurityPolicyViolation
                    | EventType::SuspiciousActivity
                    | EventType::AuthenticationFailure
                    | EventType::AuthorizationDenied
                    | EventType::RefreshTokenReuseDetected
                    | EventType::CredentialCounterAnomaly
                    | EventType::CredentialQuarantined
                    | EventType::ChainIntegrityViolation
                    | EventType::WebAuthnRegistrationFailed
                    | EventType::WebAuthnAuthenticationFailed
            )
    }

    /// Get event category for grouping
    pub fn category(&self) -> &'static str {
        match &self.event_type {
            EventType::AuthenticationAttempt
            | EventType::AuthenticationSuccess
            | EventType::AuthenticationFailure
            | EventType::AuthorizationGranted
            | EventType::AuthorizationDenied
            | EventType::SessionCreated
            | EventType::SessionRefreshed
            | EventType::SessionRevoked
            | EventType::SessionTerminated
            | EventType::RefreshTokenReuseDetected => "authentication",

            EventType::CredentialRegistered
            | EventType::CredentialAuthenticated
            | EventType::CredentialCounterAnomaly
            | EventType::CredentialQuarantined
            | EventType::CredentialRevoked
            | EventType::WebAuthnRegistrationFailed
            | EventType::WebAuthnAuthenticationFailed => "credential",

            EventType::RiskAssessed | EventType::RiskEventOpened | EventType::RiskEventResolved => "risk",

            EventType::IdentityLinked
            | EventType::ContextCreated
            | EventType::ContextVerificationLevelChanged
            | EventType::AttributeAdded
            | EventType::AttributeVerified
            | EventType::AttributeDemoted => "identity",

            EventType::ResourceCreated
            | EventType::ResourceRead
            | EventType::ResourceUpdated
            | EventType::ResourceDeleted
            | EventType::ResourcePermissionChanged => "resource",

            EventType::SystemStartup
            | EventType::SystemShutdown
            | EventType::ConfigurationChanged
            | EventType::MaintenanceModeEnabled
            | EventType::MaintenanceModeDisabled => "system",

            EventType::SecurityPolicyViolation
            | EventType::SuspiciousActivity
            | EventType::DataExport
            | EventType::DataImport
            | EventType::AccountLocked
            | EventType::AccountUnlocked => "security",

            EventType::UserCreated | EventType::UserModified | EventType::UserDeactivated => "administration",

            EventType::ChainIntegrityVerified | EventType::ChainIntegrityViolation => "integrity",

            EventType::Custom(_) => "custom",
        }
    }

    /// Redact `metadata`/`previous_values`/`new_values` when `sensitive` is
    /// set. This is the only form of an event that should ever cross a
    /// public read API; internal callers (the tamper-verification walk,
    /// the compliance export) use the unredacted record directly.
    pub fn public_projection(&self) -> AuditEvent {
        let mut projected = self.clone();
        if projected.sensitive {
            projected.metadata = HashMap::new();
            projected.previous_values = None;
            projected.new_values = None;
        }
        projected
    }

    /// Convert to a loggable format
    pub fn to_log_format(&self) -> String {
        format!(
            "[{}] {} by {} on {}: {}",
            self.severity,
            self.event_type,
            self.actor_id.as_deref().unwrap_or("system"),
            self.resource_type.as_deref().unwrap_or("unknown"),
            self.description
        )
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Custom(name) => write!(f, "CUSTOM_{}", name.to_uppercase()),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl std::fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}