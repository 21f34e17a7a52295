//! Password rule validation and bcrypt hashing.

use crate::AuthError;

const BCRYPT_COST: u32 = 10;

fn validate_rules(password: &str) -> Result<(), AuthError> {
    if password.len() < 8 {
        return Err(AuthError::WeakPassword("must be at least 8 characters"));
    }
    if !password.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(AuthError::WeakPassword("must contain at least one letter"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthError::WeakPassword("must contain at least one digit"));
    }
    Ok(())
}

pub(crate) fn hash(password: &str) -> Result<String, AuthError> {
    validate_rules(password)?;
    Ok(bcrypt::hash(password, BCRYPT_COST)?)
}

pub(crate) fn verify(password: &str, hash: &str) -> Result<bool, AuthError> {
    Ok(bcrypt::verify(password, hash)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_password() {
        assert!(matches!(validate_rules("a1"), Err(AuthError::WeakPassword(_))));
    }

    #[test]
    fn rejects_letters_only() {
        assert!(matches!(validate_rules("onlyletters"), Err(AuthError::WeakPassword(_))));
    }

    #[test]
    fn rejects_digits_only() {
        assert!(matches!(validate_rules("12345678"), Err(AuthError::WeakPassword(_))));
    }

    #[test]
    fn accepts_letter_and_digit_mix() {
        assert!(validate_rules("abcd1234").is_ok());
    }

    #[test]
    fn hash_then_verify_round_trips() {
        let hashed = hash("abcd1234").unwrap();
        assert!(verify("abcd1234", &hashed).unwrap());
        assert!(!verify("wrongpass1", &hashed).unwrap());
    }
}
