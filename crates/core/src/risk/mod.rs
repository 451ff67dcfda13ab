//! Adaptive risk scoring: per-request factor computation, a durable
//! per-(tenant, user) profile, and append-only risk events with a bounded
//! lifecycle.

pub mod anomaly;
pub mod engine;
pub mod factors;
pub mod repository;
pub mod scoring;
pub mod types;

pub use anomaly::{AnomalyScore, AnomalyScorer};
pub use engine::RiskEngine;
pub use repository::{DatabaseRiskRepository, RiskEventRepository, RiskProfileRepository};
pub use types::{
    RiskAssessment, RiskContext, RiskEvent, RiskEventStatus, RiskFactors, RiskLevel, RiskProfile, RiskTrend,
    Recommendation,
};
