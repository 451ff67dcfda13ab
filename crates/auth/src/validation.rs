//! Input normalization for the tenant/user aggregate (spec §3 User: "email/username
//! stored lowercase").

use iam_core::error::{Error, Result};
use iam_core::utils::validate_email;

/// Lowercases and trims an email, then validates its shape. Storage always
/// sees the normalized form so `(tenant, normalized-email)` uniqueness holds
/// regardless of how the caller cased it.
pub fn normalize_email(raw: &str) -> Result<String> {
    let normalized = raw.trim().to_lowercase();
    if normalized.is_empty() || !validate_email(&normalized) {
        return Err(Error::invalid_input("invalid email address"));
    }
    Ok(normalized)
}

/// Usernames are ASCII alphanumeric plus `.`, `_`, `-`, 3–64 chars, stored
/// lowercase for the same reason as email.
pub fn normalize_username(raw: &str) -> Result<String> {
    let normalized = raw.trim().to_lowercase();
    let len = normalized.chars().count();
    if !(3..=64).contains(&len) {
        return Err(Error::invalid_input("username must be between 3 and 64 characters"));
    }
    if !normalized
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(Error::invalid_input(
            "username may only contain letters, digits, '.', '_', and '-'",
        ));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_email(" User@Example.COM ").unwrap(), "user@example.com");
        assert_eq!(normalize_username(" Alice.Smith ").unwrap(), "alice.smith");
    }

    #[test]
    fn rejects_malformed_email() {
        assert!(normalize_email("not-an-email").is_err());
    }

    #[test]
    fn rejects_short_username() {
        assert!(normalize_username("ab").is_err());
    }

    #[test]
    fn rejects_username_with_illegal_characters() {
        assert!(normalize_username("has space").is_err());
    }
}
