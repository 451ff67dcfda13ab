pub mod event;
pub mod logger;
pub mod repository;
pub mod retention;
pub mod traits;

pub use event::{AuditEvent, AuditEventBuilder, EventSeverity, EventType, EventOutcome};
pub use logger::AuditLogger;
pub use repository::{AuditRepository, DatabaseAuditRepository};
pub use retention::{retention_days_for_event, retention_until_for, RetentionPolicy};
pub use traits::{AuditBackend, Auditable, ChainVerificationResult};