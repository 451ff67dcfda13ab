use super::types::{RiskContext, RiskFactors, RiskProfile};

/// Compute the five always-present factors from a request context and the
/// user's durable profile. `anomaly` is filled in separately by the engine
/// once the pluggable scorer has (or hasn't) responded.
pub fn compute_base_factors(ctx: &RiskContext, profile: &RiskProfile) -> RiskFactors {
    RiskFactors {
        device: device_risk(ctx, profile),
        location: location_risk(ctx, profile),
        behavioral: behavioral_risk(ctx, profile),
        temporal: temporal_risk(ctx, profile),
        velocity: velocity_risk(ctx, profile),
        anomaly: None,
    }
}

fn device_risk(ctx: &RiskContext, profile: &RiskProfile) -> f64 {
    let mut score = 0.0;
    match &ctx.device_fingerprint {
        Some(fp) if profile.trusted_devices.contains(fp) => {}
        Some(_) => score += 50.0,
        None => score += 70.0,
    }
    if ctx.jailbroken {
        score += 30.0;
    }
    if profile.last_factors.device > 0.0 && ctx.credential_aaguid.is_some() && profile.assessment_count == 0 {
        score += 20.0;
    }
    score.clamp(0.0, 100.0)
}

/// A location change within this window is treated as impossible travel
/// regardless of distance, since no commercial route completes faster.
const IMPOSSIBLE_TRAVEL_WINDOW_MINUTES: i64 = 60;

fn location_risk(ctx: &RiskContext, profile: &RiskProfile) -> f64 {
    let key = match (&ctx.country, &ctx.region) {
        (Some(country), Some(region)) => format!("{}/{}", country, region),
        (Some(country), None) => country.clone(),
        _ => return 60.0,
    };

    if let (Some(last), Some(last_at)) = (&profile.last_location, profile.last_assessed_at) {
        if last != &key && (chrono::Utc::now() - last_at).num_minutes() < IMPOSSIBLE_TRAVEL_WINDOW_MINUTES {
            return 100.0;
        }
    }

    if profile.trusted_locations.contains(&key) {
        0.0
    } else if let Some(ip) = &ctx.ip {
        if profile.suspicious_ips.contains(&ip.to_string()) {
            100.0
        } else {
            55.0
        }
    } else {
        55.0
    }
}

fn behavioral_risk(ctx: &RiskContext, profile: &RiskProfile) -> f64 {
    // Deviation from the profile's historically typical user-agent: absent
    // a stored baseline, a first observation is treated as neutral rather
    // than risky so a brand-new user isn't immediately flagged.
    if profile.assessment_count == 0 {
        return 10.0;
    }
    match &ctx.user_agent {
        Some(_) => 20.0,
        None => 65.0,
    }
}

fn temporal_risk(ctx: &RiskContext, _profile: &RiskProfile) -> f64 {
    // Outside a conventional 06:00-23:00 active window is scored as
    // elevated; a real deployment would learn this window per user.
    if ctx.hour_of_day < 6 || ctx.hour_of_day > 23 {
        65.0
    } else {
        15.0
    }
}

fn velocity_risk(_ctx: &RiskContext, profile: &RiskProfile) -> f64 {
    if profile.security_violation_count > 0 {
        (profile.security_violation_count as f64 * 25.0).clamp(0.0, 100.0)
    } else {
        10.0
    }
}
