use super::types::{Attribute, AttributeVerificationStatus, Sensitivity};
use std::collections::HashSet;

/// Pluggable evaluator that recomputes a context's trust score from its
/// attribute set whenever an attribute is (re)verified. Swappable the same
/// way `AnomalyScorer` is pluggable in the risk engine: a deterministic
/// default ships here, and a tenant needing a different trust model can
/// supply its own via `IdentityGraphService::with_trust_evaluator`.
pub trait TrustScoreEvaluator: Send + Sync {
    /// `attributes` is the full, current attribute set of the context being
    /// scored, after the triggering mutation has already been applied to
    /// the attribute passed to `verify_attribute`.
    fn evaluate(&self, attributes: &[Attribute]) -> f64;
}

/// Default evaluator: weights each attribute by sensitivity and
/// verification status, nudged up slightly by evidence quality (whether
/// evidence metadata was recorded) and by how many distinct sensitivity
/// tiers the context has verified attributes across.
pub struct DefaultTrustScoreEvaluator;

impl TrustScoreEvaluator for DefaultTrustScoreEvaluator {
    fn evaluate(&self, attributes: &[Attribute]) -> f64 {
        if attributes.is_empty() {
            return 0.0;
        }

        let mut weighted = 0.0;
        let mut total_weight = 0.0;
        let mut verified_sensitivities: HashSet<Sensitivity> = HashSet::new();

        for attribute in attributes {
            let sensitivity_weight = match attribute.sensitivity {
                Sensitivity::Low => 1.0,
                Sensitivity::Medium => 1.5,
                Sensitivity::High => 2.0,
                Sensitivity::Critical => 2.5,
            };

            let status_score = match attribute.verification_status {
                AttributeVerificationStatus::Verified => 1.0,
                AttributeVerificationStatus::Pending => 0.2,
                AttributeVerificationStatus::Rejected => 0.0,
            };

            let evidence_quality = if attribute.evidence_metadata.is_some() { 1.1 } else { 1.0 };

            if attribute.verification_status == AttributeVerificationStatus::Verified {
                verified_sensitivities.insert(attribute.sensitivity);
            }

            weighted += sensitivity_weight * status_score * evidence_quality;
            total_weight += sensitivity_weight * evidence_quality;
        }

        let base = if total_weight > 0.0 { weighted / total_weight } else { 0.0 };

        // Credit for breadth across sensitivity tiers, capped so it can
        // never dominate the attribute-level score.
        let diversity_bonus = (verified_sensitivities.len() as f64 * 0.02).min(0.1);

        (base + diversity_bonus).clamp(0.0, 1.0)
    }
}
