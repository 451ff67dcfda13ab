use super::anomaly::{score_with_timeout, AnomalyScorer};
use super::factors::compute_base_factors;
use super::repository::{RiskEventRepository, RiskProfileRepository};
use super::scoring::{compute_trend, recommendations_for};
use super::types::{RiskAssessment, RiskContext, RiskEvent, RiskEventStatus, RiskProfile};
use crate::audit::{AuditLogger, EventSeverity, EventType};
use crate::database::TenantPool;
use crate::error::{Error, Result};
use crate::types::{RiskEventId, TenantContext, UserId};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Bound on `RiskProfile.score_history` length; older entries are dropped
/// as newer assessments arrive.
const SCORE_HISTORY_LIMIT: usize = 50;

/// Security violations observed within the retention window before a
/// profile is auto-flagged.
const AUTO_FLAG_VIOLATION_THRESHOLD: u64 = 3;

/// Derives a `RiskEventOpened` audit event's severity from the same
/// thresholds that classify `RiskProfile.level`.
fn severity_for_risk_level(level: super::types::RiskLevel) -> EventSeverity {
    use super::types::RiskLevel;
    match level {
        RiskLevel::VeryLow => EventSeverity::Info,
        RiskLevel::Low => EventSeverity::Low,
        RiskLevel::Medium => EventSeverity::Medium,
        RiskLevel::High | RiskLevel::VeryHigh => EventSeverity::High,
        RiskLevel::Critical => EventSeverity::Critical,
    }
}

/// Produces risk assessments and maintains the durable per-user profile.
/// Profile read-modify-write is serialized per user via a sharded
/// `tokio::sync::Mutex` keyed by user id, the same pattern the audit
/// logger uses for its per-tenant chain lock.
pub struct RiskEngine {
    profiles: Arc<dyn RiskProfileRepository>,
    events: Arc<dyn RiskEventRepository>,
    audit: AuditLogger,
    anomaly_scorer: Option<Arc<dyn AnomalyScorer>>,
    user_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl RiskEngine {
    pub fn new(
        profiles: Arc<dyn RiskProfileRepository>,
        events: Arc<dyn RiskEventRepository>,
        audit: AuditLogger,
        anomaly_scorer: Option<Arc<dyn AnomalyScorer>>,
    ) -> Self {
        Self {
            profiles,
            events,
            audit,
            anomaly_scorer,
            user_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, user_id: UserId) -> Arc<Mutex<()>> {
        self.user_locks.entry(user_id.0).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Produce a fresh assessment for `user` under `ctx`, updating the
    /// durable profile and materializing a `RiskEvent`.
    pub async fn assess(
        &self,
        tenant_pool: &TenantPool,
        tenant: &TenantContext,
        user_id: UserId,
        context: RiskContext,
    ) -> Result<RiskAssessment> {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;

        let now = Utc::now();
        let mut profile = self
            .profiles
            .get(tenant_pool, tenant.tenant_id, user_id)
            .await?
            .unwrap_or_else(|| RiskProfile::new(tenant.tenant_id, user_id, now));

        let is_new_device = context
            .device_fingerprint
            .as_ref()
            .map(|fp| !profile.trusted_devices.contains(fp))
            .unwrap_or(true);

        let mut factors = compute_base_factors(&context, &profile);

        let mut anomaly_unavailable = false;
        if let Some(scorer) = &self.anomaly_scorer {
            match score_with_timeout(scorer.as_ref(), &context.feature_vector).await {
                Some(anomaly) => factors.anomaly = Some(anomaly.value * 100.0),
                None => anomaly_unavailable = true,
            }
        }

        let score = factors.composite();
        let level = super::types::RiskLevel::from_score(score);

        if profile.assessment_count == 0 {
            profile.baseline_score = score;
        }

        let trend = compute_trend(&profile.score_history, profile.baseline_score, score);

        profile.current_score = score;
        profile.peak_score = profile.peak_score.max(score);
        profile.level = level;
        profile.trend = trend;
        profile.last_factors = factors;
        if let Some(country) = &context.country {
            let key = match &context.region {
                Some(region) => format!("{}/{}", country, region),
                None => country.clone(),
            };
            profile.last_location = Some(key);
        }
        profile.last_assessed_at = Some(now);
        profile.score_history.push(score);
        if profile.score_history.len() > SCORE_HISTORY_LIMIT {
            let excess = profile.score_history.len() - SCORE_HISTORY_LIMIT;
            profile.score_history.drain(0..excess);
        }
        profile.assessment_count += 1;

        if level.is_high_risk() {
            profile.high_risk_event_count += 1;
            profile.last_high_risk_at = Some(now);
        }

        profile.requires_monitoring = level.is_high_risk()
            || trend == super::types::RiskTrend::Increasing
            || trend == super::types::RiskTrend::Volatile
            || profile.security_violation_count > 0;

        if profile.security_violation_count >= AUTO_FLAG_VIOLATION_THRESHOLD && !profile.flagged {
            profile.flagged = true;
            profile.flagged_reason = Some(format!(
                "{} security violations observed",
                profile.security_violation_count
            ));
            profile.flagged_at = Some(now);
        }

        profile.updated_at = now;
        profile.version += 1;

        let recommendations = recommendations_for(
            level,
            trend,
            &factors,
            profile.security_violation_count,
            is_new_device,
        );

        let confidence = if factors.anomaly.is_some() { 0.9 } else { 0.75 };
        profile.confidence = confidence;

        self.profiles.upsert(tenant_pool, &profile).await?;

        let event = RiskEvent {
            id: RiskEventId(Uuid::new_v4()),
            tenant_id: tenant.tenant_id,
            user_id,
            status: RiskEventStatus::Detected,
            score,
            level,
            confidence,
            factors,
            ip: context.ip.map(|ip| ip.to_string()),
            user_agent: context.user_agent.clone(),
            device_fingerprint: context.device_fingerprint.clone(),
            session_id: context.session_id,
            credential_id: context.credential_id,
            country: context.country.clone(),
            region: context.region.clone(),
            detection_rules: Vec::new(),
            created_at: now,
            resolved_at: None,
        };
        self.events.create(tenant_pool, &event).await?;

        self.audit
            .log_risk_event(
                EventType::RiskAssessed,
                &user_id.to_string(),
                score,
                format!("risk assessment scored {:.1} ({:?})", score, level),
            )
            .await?;

        if anomaly_unavailable {
            self.audit
                .log_system_event(
                    EventType::Custom("ANOMALY_SCORER_UNAVAILABLE".to_string()),
                    "anomaly scorer timed out or errored; anomalyRisk dropped from composite",
                    None,
                )
                .await?;
        }

        if level.is_high_risk() {
            self.audit
                .log_event(
                    crate::audit::AuditEvent::builder(
                        EventType::RiskEventOpened,
                        format!("risk event opened at level {:?} for user {}", level, user_id),
                    )
                    .resource("user", &user_id.to_string())
                    .severity(severity_for_risk_level(level))
                    .build(),
                )
                .await?;
        }

        Ok(RiskAssessment {
            score,
            level,
            confidence,
            trend,
            factors,
            recommendations,
        })
    }

    /// Record a downstream outcome for a previously materialized risk
    /// event: `confirmed` increments threat-indicator counters, while
    /// `false_positive` is fed back to reduce confidence in that factor
    /// combination for future assessments.
    pub async fn report_outcome(
        &self,
        tenant_pool: &TenantPool,
        tenant: &TenantContext,
        user_id: UserId,
        event_id: RiskEventId,
        status: RiskEventStatus,
    ) -> Result<()> {
        let resolved_at = matches!(status, RiskEventStatus::Resolved).then(Utc::now);
        self.events
            .update_status(tenant_pool, tenant.tenant_id, event_id, status, resolved_at)
            .await?;

        if matches!(status, RiskEventStatus::Confirmed | RiskEventStatus::FalsePositive) {
            let lock = self.lock_for(user_id);
            let _guard = lock.lock().await;

            if let Some(mut profile) = self.profiles.get(tenant_pool, tenant.tenant_id, user_id).await? {
                if status == RiskEventStatus::Confirmed {
                    profile.security_violation_count += 1;
                    let event = self.events.get(tenant_pool, tenant.tenant_id, event_id).await?;
                    let rules = event.map(|e| e.detection_rules).filter(|r| !r.is_empty());
                    match rules {
                        Some(rules) => {
                            for rule in rules {
                                *profile.threat_indicators.entry(rule).or_insert(0) += 1;
                            }
                        }
                        None => {
                            *profile.threat_indicators.entry("unclassified".to_string()).or_insert(0) += 1;
                        }
                    }
                } else {
                    profile.confidence = (profile.confidence * 0.95).max(0.1);
                }
                profile.updated_at = Utc::now();
                profile.version += 1;
                self.profiles.upsert(tenant_pool, &profile).await?;
            }
        }

        self.audit
            .log_risk_event(
                EventType::RiskEventResolved,
                &user_id.to_string(),
                0.0,
                format!("risk event {} transitioned to {:?}", event_id, status),
            )
            .await
            .map_err(|e| Error::internal(format!("failed to log risk event resolution: {}", e)))
    }
}
