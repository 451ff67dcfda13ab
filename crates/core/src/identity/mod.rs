//! Identity graph: Person -> Identity -> Context -> Attribute, with
//! monotone context verification levels, bounded trust-score history, and
//! mutation-triggered attribute re-verification.

pub mod repository;
pub mod service;
pub mod trust;
pub mod types;

pub use repository::{DatabaseIdentityRepository, IdentityRepository};
pub use service::{AttributeReverificationJob, IdentityGraphService};
pub use trust::{DefaultTrustScoreEvaluator, TrustScoreEvaluator};
pub use types::{
    Attribute, AttributeVerificationStatus, Context, EntityStatus, Identity, Person, PrimaryKeyType, Sensitivity,
    TrustScoreEntry, VerificationLevel,
};
