#[cfg(test)]
mod tests {
    use crate::credential::{CounterCheckOutcome, Credential};
    use crate::credential::model::{AttestationFormat, CredentialSecurityFlags, CredentialState, CredentialType, DeviceType};
    use crate::identity::types::VerificationLevel;
    use crate::risk::RiskLevel;
    use crate::types::{CredentialId, TenantId, UserId};
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_email_validation() {
        use crate::utils::validate_email;

        assert!(validate_email("user@example.com"));
        assert!(validate_email("test.email+tag@domain.co.uk"));

        assert!(!validate_email("invalid-email"));
        assert!(!validate_email("@domain.com"));
        assert!(!validate_email("user@"));
    }

    #[test]
    fn test_schema_name_generation() {
        use crate::utils::generate_schema_name;

        let schema1 = generate_schema_name();
        let schema2 = generate_schema_name();

        assert!(schema1.starts_with("tenant_"));
        assert!(schema2.starts_with("tenant_"));
        assert_ne!(schema1, schema2);
        assert_eq!(schema1.len(), 15);
    }

    /// Boundary behaviour from the spec's testable-properties section:
    /// exactly 90 is `critical`, 89.999 is `very_high`.
    #[test]
    fn risk_level_boundary_at_ninety() {
        assert_eq!(RiskLevel::from_score(90.0), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(89.999), RiskLevel::VeryHigh);
    }

    #[test]
    fn risk_level_thresholds_match_spec_table() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::VeryLow);
        assert_eq!(RiskLevel::from_score(19.999), RiskLevel::VeryLow);
        assert_eq!(RiskLevel::from_score(20.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(39.999), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(40.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(59.999), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(60.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(74.999), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(75.0), RiskLevel::VeryHigh);
        assert_eq!(RiskLevel::from_score(100.0), RiskLevel::Critical);
    }

    fn sample_credential(sign_count: u32) -> Credential {
        let now = Utc::now();
        Credential {
            id: CredentialId(Uuid::new_v4()),
            user_id: UserId(Uuid::new_v4()),
            tenant_id: TenantId(Uuid::new_v4()),
            credential_type: CredentialType::Webauthn,
            device_type: DeviceType::Platform,
            credential_id_b64: "AAAA".to_string(),
            credential_id_hash: "deadbeef".to_string(),
            public_key_cose: vec![0xA1],
            attestation_blob: None,
            sign_count,
            usage_count: 0,
            aaguid: Uuid::nil(),
            attestation_format: AttestationFormat::None,
            attestation_type: crate::webauthn::AttestationConveyance::Direct,
            transports: vec!["internal".to_string()],
            state: CredentialState::Active,
            backup_eligible: false,
            backup_state: false,
            risk_score: 0.0,
            security_flags: CredentialSecurityFlags::default(),
            created_at: now,
            updated_at: now,
            last_used_at: None,
            expires_at: None,
            revoked_at: None,
            label: None,
        }
    }

    /// For every credential and every accepted assertion, the new counter
    /// must be strictly greater than the previous, or the previous was zero.
    #[test]
    fn counter_check_accepts_strict_increase() {
        let credential = sample_credential(42);
        assert_eq!(credential.counter_check(43), CounterCheckOutcome::Accept);
    }

    #[test]
    fn counter_check_rejects_equal_or_lower() {
        let credential = sample_credential(42);
        assert_eq!(credential.counter_check(42), CounterCheckOutcome::Reject);
        assert_eq!(credential.counter_check(41), CounterCheckOutcome::Reject);
    }

    #[test]
    fn counter_check_allows_authenticators_stuck_at_zero() {
        let credential = sample_credential(0);
        assert_eq!(credential.counter_check(0), CounterCheckOutcome::Accept);
    }

    #[test]
    fn verification_level_is_monotonically_ordered() {
        assert!(VerificationLevel::None < VerificationLevel::Basic);
        assert!(VerificationLevel::Basic < VerificationLevel::Standard);
        assert!(VerificationLevel::Standard < VerificationLevel::Enhanced);
        assert!(VerificationLevel::Enhanced < VerificationLevel::Complete);
    }
}
