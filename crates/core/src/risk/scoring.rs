use super::types::{RiskFactors, RiskLevel, RiskTrend, Recommendation};

/// Bandwidth around baseline a score must leave to count as a trend
/// movement or a volatility crossing.
const TREND_THRESHOLD: f64 = 5.0;

/// How many recent assessments (including the current one) the volatility
/// check looks at.
const VOLATILITY_WINDOW: usize = 10;

/// How many baseline-band crossings over the window count as volatile.
const VOLATILITY_CROSSINGS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Band {
    Above,
    Within,
    Below,
}

fn classify(score: f64, baseline: f64) -> Band {
    if score > baseline + TREND_THRESHOLD {
        Band::Above
    } else if score < baseline - TREND_THRESHOLD {
        Band::Below
    } else {
        Band::Within
    }
}

/// Determine trend by comparing `current` to `baseline`, falling back to
/// `Volatile` when the recent history shows repeated band crossings.
pub fn compute_trend(history: &[f64], baseline: f64, current: f64) -> RiskTrend {
    let window_start = history.len().saturating_sub(VOLATILITY_WINDOW.saturating_sub(1));
    let mut window: Vec<f64> = history[window_start..].to_vec();
    window.push(current);

    let mut crossings = 0usize;
    let mut prev = classify(window[0], baseline);
    for &score in &window[1..] {
        let band = classify(score, baseline);
        if band != prev && band != Band::Within && prev != Band::Within {
            crossings += 1;
        }
        if band != prev {
            prev = band;
        }
    }

    if crossings >= VOLATILITY_CROSSINGS {
        return RiskTrend::Volatile;
    }

    let delta = current - baseline;
    if delta > TREND_THRESHOLD {
        RiskTrend::Increasing
    } else if delta < -TREND_THRESHOLD {
        RiskTrend::Decreasing
    } else {
        RiskTrend::Stable
    }
}

/// Build the ordered recommendation list for an assessment. Every
/// triggered recommendation is included once, sorted by fixed priority.
pub fn recommendations_for(
    level: RiskLevel,
    trend: RiskTrend,
    factors: &RiskFactors,
    security_violation_count: u64,
    is_new_device: bool,
) -> Vec<Recommendation> {
    let mut out = Vec::new();

    match level {
        RiskLevel::Critical => {
            out.push(Recommendation::RequireImmediateVerification);
            out.push(Recommendation::BlockSuspiciousActivities);
            out.push(Recommendation::EscalateToSecurityTeam);
        }
        RiskLevel::VeryHigh => {
            out.push(Recommendation::RequireStepUpAuthentication);
            out.push(Recommendation::IncreaseMonitoring);
            out.push(Recommendation::LimitSensitiveOperations);
        }
        RiskLevel::High => {
            out.push(Recommendation::RequireStepUpAuthentication);
            out.push(Recommendation::IncreaseMonitoring);
        }
        RiskLevel::Medium => {
            out.push(Recommendation::IncreaseMonitoring);
        }
        RiskLevel::Low | RiskLevel::VeryLow => {}
    }

    if trend == RiskTrend::Volatile {
        out.push(Recommendation::MonitorBehaviorChanges);
        out.push(Recommendation::InvestigateAnomalousPatterns);
    }

    if security_violation_count > 0 {
        out.push(Recommendation::ReviewRecentActivities);
    }

    if is_new_device && factors.device >= 40.0 {
        out.push(Recommendation::EstablishDeviceTrust);
    }

    out.sort_by_key(|r| r.priority());
    out.dedup();
    out
}
