use async_trait::async_trait;
use tokio::time::Duration;

/// Output of a pluggable anomaly scorer: a risk contribution in `[0,1]` and
/// the scorer's own confidence in that value.
#[derive(Debug, Clone, Copy)]
pub struct AnomalyScore {
    pub value: f64,
    pub confidence: f64,
}

/// Optional external collaborator that scores a feature vector for
/// anomalousness. Treated the same way as the attestation metadata
/// service: a timeout or error degrades gracefully rather than failing the
/// assessment.
#[async_trait]
pub trait AnomalyScorer: Send + Sync {
    async fn score(&self, feature_vector: &[f64]) -> crate::error::Result<AnomalyScore>;
}

/// Default timeout budget for a single scorer call.
pub const ANOMALY_SCORER_TIMEOUT: Duration = Duration::from_secs(2);

/// Invoke `scorer` with the standard timeout budget. Returns `None` on
/// timeout or error so the caller can drop `anomalyRisk` from the
/// composite rather than failing the request; the caller is responsible
/// for emitting the `dependency_unavailable` warning audit event.
pub async fn score_with_timeout(
    scorer: &dyn AnomalyScorer,
    feature_vector: &[f64],
) -> Option<AnomalyScore> {
    match tokio::time::timeout(ANOMALY_SCORER_TIMEOUT, scorer.score(feature_vector)).await {
        Ok(Ok(score)) => Some(score),
        Ok(Err(_)) | Err(_) => None,
    }
}
