use crate::types::{CredentialId, RiskEventId, SessionId, TenantId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// The six scoring factors, fixed by name and default weight. `anomaly` is
/// the only optional one: absence (timeout, no scorer configured, scorer
/// error) drops it from the composite rather than zeroing it out.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RiskFactors {
    pub device: f64,
    pub location: f64,
    pub behavioral: f64,
    pub temporal: f64,
    pub velocity: f64,
    pub anomaly: Option<f64>,
}

/// Default weights from the component design. Fixed, not configurable per
/// tenant: changing the schema's shape would be a breaking change to every
/// stored `RiskEvent`.
pub struct RiskWeights;

impl RiskWeights {
    pub const DEVICE: f64 = 0.25;
    pub const LOCATION: f64 = 0.20;
    pub const BEHAVIORAL: f64 = 0.25;
    pub const TEMPORAL: f64 = 0.15;
    pub const VELOCITY: f64 = 0.10;
    pub const ANOMALY: f64 = 0.05;
}

impl RiskFactors {
    /// Weighted composite over whichever factors are present. `anomaly`
    /// contributes only when `Some`; the divisor is the sum of weights of
    /// present factors, not a fixed 1.0, so a missing anomaly score doesn't
    /// silently drag the composite down.
    pub fn composite(&self) -> f64 {
        let mut weighted_sum = RiskWeights::DEVICE * self.device
            + RiskWeights::LOCATION * self.location
            + RiskWeights::BEHAVIORAL * self.behavioral
            + RiskWeights::TEMPORAL * self.temporal
            + RiskWeights::VELOCITY * self.velocity;
        let mut weight_total =
            RiskWeights::DEVICE + RiskWeights::LOCATION + RiskWeights::BEHAVIORAL + RiskWeights::TEMPORAL + RiskWeights::VELOCITY;

        if let Some(anomaly) = self.anomaly {
            weighted_sum += RiskWeights::ANOMALY * anomaly;
            weight_total += RiskWeights::ANOMALY;
        }

        (weighted_sum / weight_total).clamp(0.0, 100.0)
    }
}

/// Categorical risk level. A pure function of the composite score, shared
/// between `RiskProfile.level` and `RiskEvent.severity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s < 20.0 => RiskLevel::VeryLow,
            s if s < 40.0 => RiskLevel::Low,
            s if s < 60.0 => RiskLevel::Medium,
            s if s < 75.0 => RiskLevel::High,
            s if s < 90.0 => RiskLevel::VeryHigh,
            _ => RiskLevel::Critical,
        }
    }

    pub fn is_high_risk(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::VeryHigh | RiskLevel::Critical)
    }
}

/// Movement of current score relative to baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTrend {
    Decreasing,
    Stable,
    Increasing,
    /// At least 3 crossings of the baseline band over the last K assessments.
    Volatile,
}

/// Closed recommendation enum, always produced and consumed in this
/// priority order (index 0 is highest priority).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    RequireImmediateVerification,
    BlockSuspiciousActivities,
    EscalateToSecurityTeam,
    RequireStepUpAuthentication,
    IncreaseMonitoring,
    LimitSensitiveOperations,
    MonitorBehaviorChanges,
    InvestigateAnomalousPatterns,
    ReviewRecentActivities,
    EstablishDeviceTrust,
}

impl Recommendation {
    /// Fixed priority order; lower is higher priority. Used to sort a set of
    /// triggered recommendations before returning them to the caller.
    pub fn priority(&self) -> u8 {
        match self {
            Recommendation::RequireImmediateVerification => 0,
            Recommendation::BlockSuspiciousActivities => 1,
            Recommendation::EscalateToSecurityTeam => 2,
            Recommendation::RequireStepUpAuthentication => 3,
            Recommendation::IncreaseMonitoring => 4,
            Recommendation::LimitSensitiveOperations => 5,
            Recommendation::MonitorBehaviorChanges => 6,
            Recommendation::InvestigateAnomalousPatterns => 7,
            Recommendation::ReviewRecentActivities => 8,
            Recommendation::EstablishDeviceTrust => 9,
        }
    }
}

/// Context a risk assessment is computed over: everything the factor
/// functions need to look at for a single request.
#[derive(Debug, Clone)]
pub struct RiskContext {
    pub device_fingerprint: Option<String>,
    pub credential_aaguid: Option<uuid::Uuid>,
    pub jailbroken: bool,
    pub country: Option<String>,
    pub region: Option<String>,
    pub ip: Option<std::net::IpAddr>,
    pub user_agent: Option<String>,
    pub hour_of_day: u8,
    pub session_id: Option<SessionId>,
    pub credential_id: Option<CredentialId>,
    pub feature_vector: Vec<f64>,
}

/// Output of `assess`: the composite score, level, confidence, and an
/// ordered list of recommendations, plus the per-factor breakdown that was
/// used to compute it (persisted onto the `RiskEvent`).
#[derive(Debug, Clone)]
pub struct RiskAssessment {
    pub score: f64,
    pub level: RiskLevel,
    pub confidence: f64,
    pub trend: RiskTrend,
    pub factors: RiskFactors,
    pub recommendations: Vec<Recommendation>,
}

/// Durable per-(tenant, user) risk posture, updated on every assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskProfile {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub baseline_score: f64,
    pub current_score: f64,
    pub peak_score: f64,
    pub level: RiskLevel,
    pub trend: RiskTrend,
    pub confidence: f64,
    pub trusted_devices: HashSet<String>,
    pub trusted_locations: HashSet<String>,
    pub suspicious_ips: HashSet<String>,
    pub last_factors: RiskFactors,
    /// Country/region key of the most recent assessment, used by
    /// `location_risk` to flag travel between two locations faster than is
    /// physically plausible.
    pub last_location: Option<String>,
    pub last_assessed_at: Option<DateTime<Utc>>,
    /// Counters keyed by detection rule / indicator name, incremented each
    /// time a risk event tagged with that rule is confirmed.
    pub threat_indicators: HashMap<String, u64>,
    pub score_history: Vec<f64>,
    pub assessment_count: u64,
    pub high_risk_event_count: u64,
    pub security_violation_count: u64,
    pub last_high_risk_at: Option<DateTime<Utc>>,
    pub requires_monitoring: bool,
    pub flagged: bool,
    pub flagged_reason: Option<String>,
    pub flagged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency version, incremented on every write.
    pub version: i64,
}

impl RiskProfile {
    pub fn new(tenant_id: TenantId, user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            tenant_id,
            user_id,
            baseline_score: 0.0,
            current_score: 0.0,
            peak_score: 0.0,
            level: RiskLevel::VeryLow,
            trend: RiskTrend::Stable,
            confidence: 1.0,
            trusted_devices: HashSet::new(),
            trusted_locations: HashSet::new(),
            suspicious_ips: HashSet::new(),
            last_factors: RiskFactors::default(),
            last_location: None,
            last_assessed_at: None,
            threat_indicators: HashMap::new(),
            score_history: Vec::new(),
            assessment_count: 0,
            high_risk_event_count: 0,
            security_violation_count: 0,
            last_high_risk_at: None,
            requires_monitoring: false,
            flagged: false,
            flagged_reason: None,
            flagged_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }
}

/// Lifecycle status of a `RiskEvent`. Transitions form a DAG rooted at
/// `Detected`; `Resolved` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskEventStatus {
    Detected,
    Analyzing,
    Confirmed,
    FalsePositive,
    Mitigated,
    Resolved,
}

impl RiskEventStatus {
    /// Whether `next` is a legal transition from `self`.
    pub fn can_transition_to(&self, next: RiskEventStatus) -> bool {
        use RiskEventStatus::*;
        matches!(
            (self, next),
            (Detected, Analyzing)
                | (Detected, Confirmed)
                | (Detected, FalsePositive)
                | (Analyzing, Confirmed)
                | (Analyzing, FalsePositive)
                | (Analyzing, Mitigated)
                | (Confirmed, Mitigated)
                | (Confirmed, Resolved)
                | (Mitigated, Resolved)
                | (FalsePositive, Resolved)
        )
    }
}

/// One append-only record per assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskEvent {
    pub id: RiskEventId,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub status: RiskEventStatus,
    pub score: f64,
    pub level: RiskLevel,
    pub confidence: f64,
    pub factors: RiskFactors,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub device_fingerprint: Option<String>,
    pub session_id: Option<SessionId>,
    pub credential_id: Option<CredentialId>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub detection_rules: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
