use super::event::EventType;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Per-event-type retention window from spec §4.5's write-path table.
/// Distinct from [`RetentionPolicy`] below, which governs bulk cleanup
/// sweeps by category: this is the exact table used to stamp
/// `retention_until` on every event as it is appended, and it distinguishes
/// `AuthenticationSuccess` (90 days) from `AuthenticationFailure` (365
/// days) even though both share the `"authentication"` cleanup category.
pub fn retention_days_for_event(event_type: &EventType) -> i64 {
    match event_type {
        EventType::AuthenticationSuccess => 90,
        EventType::AuthenticationFailure => 365,

        // SECURITY_VIOLATION
        EventType::SecurityPolicyViolation
        | EventType::SuspiciousActivity
        | EventType::RefreshTokenReuseDetected
        | EventType::CredentialCounterAnomaly
        | EventType::CredentialQuarantined
        | EventType::ChainIntegrityViolation
        | EventType::AccountLocked => 2555,

        // DATA_ACCESS
        EventType::DataExport | EventType::DataImport | EventType::ResourceRead => 2555,

        // ADMIN_ACTION
        EventType::UserCreated
        | EventType::UserModified
        | EventType::UserDeactivated
        | EventType::ResourcePermissionChanged
        | EventType::AccountUnlocked => 2555,

        // CONFIGURATION_CHANGED
        EventType::ConfigurationChanged => 2555,

        _ => 365,
    }
}

/// Stamp `retention_until` on a freshly constructed event per the table
/// above. Called once, at append time, from `AuditLogger::log_event`.
pub fn retention_until_for(event_type: &EventType, now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::days(retention_days_for_event(event_type))
}

/// Minimum retention window per audit event category, in days. Security and
/// integrity categories are retained far longer than routine resource
/// activity; cleanup sweeps must never delete an event younger than its
/// category's window even if a caller requests an earlier cutoff.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    windows: HashMap<&'static str, i64>,
    default_days: i64,
}

impl RetentionPolicy {
    /// The policy used in production: security-relevant categories are kept
    /// for years, routine activity for a season.
    pub fn standard() -> Self {
        let mut windows = HashMap::new();
        windows.insert("authentication", 365);
        windows.insert("credential", 365 * 2);
        windows.insert("risk", 365);
        windows.insert("identity", 365 * 2);
        windows.insert("security", 365 * 3);
        windows.insert("integrity", 365 * 7);
        windows.insert("administration", 365);
        windows.insert("resource", 90);
        windows.insert("system", 180);
        windows.insert("custom", 90);

        Self {
            windows,
            default_days: 90,
        }
    }

    pub fn window_for(&self, category: &str) -> Duration {
        Duration::days(*self.windows.get(category).unwrap_or(&self.default_days))
    }

    /// Given a requested cutoff, clamp it so no category's minimum window is
    /// violated: returns, for each category present in this policy, the
    /// later of `requested_cutoff` and `now - window`.
    pub fn effective_cutoffs(
        &self,
        now: chrono::DateTime<chrono::Utc>,
        requested_cutoff: chrono::DateTime<chrono::Utc>,
    ) -> HashMap<&'static str, chrono::DateTime<chrono::Utc>> {
        self.windows
            .iter()
            .map(|(category, days)| {
                let floor = now - Duration::days(*days);
                (*category, requested_cutoff.min(floor))
            })
            .collect()
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn integrity_events_outlive_resource_events() {
        let policy = RetentionPolicy::standard();
        assert!(policy.window_for("integrity") > policy.window_for("resource"));
    }

    #[test]
    fn effective_cutoff_never_exceeds_category_floor() {
        let policy = RetentionPolicy::standard();
        let now = Utc::now();
        let requested = now; // caller asks to delete everything
        let cutoffs = policy.effective_cutoffs(now, requested);

        for (category, cutoff) in cutoffs {
            let floor = now - policy.window_for(category);
            assert!(cutoff <= floor, "category {} exceeded its retention floor", category);
        }
    }
}
