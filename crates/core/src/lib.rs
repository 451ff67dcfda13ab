pub mod audit;
pub mod config;
pub mod credential;
pub mod database;
pub mod error;
pub mod identity;
pub mod jobs;
pub mod metrics;
pub mod risk;
pub mod security;
pub mod session;
pub mod types;
pub mod utils;
pub mod webauthn;

pub use audit::{AuditEvent, AuditLogger, AuditRepository};
pub use config::{Config, NotificationConfig, PolicyConfig, RiskConfig, WebAuthnConfig};
pub use credential::{Credential, CredentialService, CredentialState};
pub use database::{DatabasePool, TenantPool};
pub use error::{Error, ErrorContext, ErrorKind, ErrorMetrics, Result};
pub use identity::{IdentityGraphService, IdentityRepository};
pub use jobs::{JobExecutor, JobQueue, RedisJobQueue, SerializableJob};
pub use metrics::{AuthMetrics, MetricsRegistry, MetricsService};
pub use risk::{RiskEngine, RiskProfileRepository};
pub use session::{
    GeoLocation, SessionConfig, SessionData, SessionManager, SessionSecurityFlags, SessionState, SessionStats,
    SessionTokens, SessionType,
};
pub use types::*;
pub use webauthn::{WebAuthnEngine, RelyingPartyPolicy};

#[cfg(test)]
mod tests;

// Re-export commonly used types from dependencies
pub use uuid::Uuid;
pub use chrono::{DateTime, Utc};