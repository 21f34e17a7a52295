#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Token issuance/verification, password hashing, and the tenant-context
//! request extractor.

mod extractor;
mod jwt;
mod password;

pub use extractor::TenantContext;
pub use jwt::{Claims, TokenKind};

use thiserror::Error;
use uuid::Uuid;

/// Errors from any auth operation.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Token signature invalid, expired, or malformed.
    #[error("invalid or expired token")]
    InvalidToken,
    /// A refresh token was presented where an access token was required, or
    /// vice versa.
    #[error("wrong token type")]
    WrongTokenType,
    /// No `Authorization: Bearer` header, or it was empty.
    #[error("missing credentials")]
    Unauthenticated,
    /// Authenticated, but for a different tenant than the resource belongs to.
    #[error("tenant mismatch")]
    TenantMismatch,
    /// Password failed the §6 registration rules.
    #[error("password does not meet requirements: {0}")]
    WeakPassword(&'static str),
    /// bcrypt hashing or comparison failed.
    #[error("password hashing error: {0}")]
    Hashing(#[from] bcrypt::BcryptError),
}

/// Issues a signed access token with a 15 minute lifetime.
///
/// # Errors
///
/// Returns [`AuthError::InvalidToken`] if signing fails (malformed secret).
pub fn issue_access_token(
    user_id: Uuid,
    org_id: Uuid,
    plan: caseforge_domain::Plan,
    signing_secret: &str,
    ttl: std::time::Duration,
) -> Result<String, AuthError> {
    jwt::issue(user_id, org_id, plan, TokenKind::Access, signing_secret, ttl)
}

/// Issues a signed refresh token with a 30 day lifetime. A refresh exchange
/// reuses this token rather than rotating it.
///
/// # Errors
///
/// Returns [`AuthError::InvalidToken`] if signing fails (malformed secret).
pub fn issue_refresh_token(
    user_id: Uuid,
    org_id: Uuid,
    plan: caseforge_domain::Plan,
    signing_secret: &str,
    ttl: std::time::Duration,
) -> Result<String, AuthError> {
    jwt::issue(user_id, org_id, plan, TokenKind::Refresh, signing_secret, ttl)
}

/// Verifies a token's signature and expiry, and returns its claims.
///
/// # Errors
///
/// Returns [`AuthError::InvalidToken`] if the signature or expiry check
/// fails, or [`AuthError::WrongTokenType`] if `expected` doesn't match the
/// token's `typ` claim.
pub fn verify_token(token: &str, signing_secret: &str, expected: TokenKind) -> Result<Claims, AuthError> {
    jwt::verify(token, signing_secret, expected)
}

/// Hashes a password at bcrypt cost 10.
///
/// # Errors
///
/// Returns [`AuthError::WeakPassword`] if it fails the §6 rules (≥8 chars,
/// at least one letter and one digit), or [`AuthError::Hashing`] if bcrypt
/// itself fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    password::hash(password)
}

/// Verifies a password against a stored hash using bcrypt's constant-time
/// comparison.
///
/// # Errors
///
/// Returns [`AuthError::Hashing`] if the stored hash is malformed.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    password::verify(password, hash)
}

/// Rejects cross-tenant access: `ctx`'s org must match the resource's org.
///
/// # Errors
///
/// Returns [`AuthError::TenantMismatch`] otherwise.
pub fn ensure_same_org(ctx: &TenantContext, resource_org_id: Uuid) -> Result<(), AuthError> {
    if ctx.org_id == resource_org_id {
        Ok(())
    } else {
        Err(AuthError::TenantMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn issue_and_verify_round_trip() {
        let secret = "x".repeat(32);
        let user_id = Uuid::new_v4();
        let org_id = Uuid::new_v4();
        let token =
            issue_access_token(user_id, org_id, caseforge_domain::Plan::Pro, &secret, Duration::from_secs(900))
                .unwrap();
        let claims = verify_token(&token, &secret, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.org_id, org_id);
    }

    #[test]
    fn wrong_token_kind_is_rejected() {
        let secret = "y".repeat(32);
        let token = issue_refresh_token(
            Uuid::new_v4(),
            Uuid::new_v4(),
            caseforge_domain::Plan::Free,
            &secret,
            Duration::from_secs(60),
        )
        .unwrap();
        let err = verify_token(&token, &secret, TokenKind::Access).unwrap_err();
        assert!(matches!(err, AuthError::WrongTokenType));
    }

    #[test]
    fn same_org_passes_tenant_check() {
        let org_id = Uuid::new_v4();
        let ctx = TenantContext {
            user_id: Uuid::new_v4(),
            org_id,
            plan: caseforge_domain::Plan::Free,
        };
        assert!(ensure_same_org(&ctx, org_id).is_ok());
    }

    #[test]
    fn different_org_is_tenant_mismatch() {
        let ctx = TenantContext {
            user_id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            plan: caseforge_domain::Plan::Free,
        };
        let err = ensure_same_org(&ctx, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AuthError::TenantMismatch));
    }
}
