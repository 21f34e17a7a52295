//! Input validation shared across handlers.

use crate::errors::ApiError;

const MIN_PROBLEM_CHARS: usize = 20;
const MAX_PROBLEM_CHARS: usize = 8_000;

/// Validates `problem_description` length: 20-8,000 chars inclusive.
///
/// # Errors
///
/// Returns [`ApiError::InvalidInput`] outside that range.
pub fn validate_problem_description(text: &str) -> Result<(), ApiError> {
    let len = text.chars().count();
    if len < MIN_PROBLEM_CHARS || len > MAX_PROBLEM_CHARS {
        return Err(ApiError::InvalidInput(format!(
            "problem_description must be between {MIN_PROBLEM_CHARS} and {MAX_PROBLEM_CHARS} characters, got {len}"
        )));
    }
    Ok(())
}

/// Normalizes an email to lowercase for storage and lookup.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_exactly_twenty_chars() {
        assert!(validate_problem_description(&"a".repeat(20)).is_ok());
    }

    #[test]
    fn rejects_nineteen_chars() {
        assert!(validate_problem_description(&"a".repeat(19)).is_err());
    }

    #[test]
    fn accepts_exactly_eight_thousand_chars() {
        assert!(validate_problem_description(&"a".repeat(8_000)).is_ok());
    }

    #[test]
    fn rejects_eight_thousand_one_chars() {
        assert!(validate_problem_description(&"a".repeat(8_001)).is_err());
    }

    #[test]
    fn normalizes_email_case_and_whitespace() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }
}
