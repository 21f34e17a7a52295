//! Token claims, issuance, and verification.

use std::time::Duration;

use caseforge_domain::Plan;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AuthError;

/// Whether a token is a short-lived access token or a long-lived refresh
/// token. Carried as the `typ` claim so a refresh token can't be replayed
/// as an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Short-lived, presented on every authenticated request.
    Access,
    /// Long-lived, exchanged for a new access token via `/auth/refresh`.
    Refresh,
}

/// Claims carried by every issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: Uuid,
    /// The user's organization.
    pub org_id: Uuid,
    /// The org's plan at issuance time (may be stale by expiry; callers
    /// needing the live plan should re-resolve it rather than trust this).
    pub plan: Plan,
    /// Expiry, as a Unix timestamp.
    pub exp: i64,
    /// Issued-at, as a Unix timestamp.
    pub iat: i64,
    /// Which kind of token this is.
    pub typ: TokenKind,
}

pub(crate) fn issue(
    user_id: Uuid,
    org_id: Uuid,
    plan: Plan,
    kind: TokenKind,
    signing_secret: &str,
    ttl: Duration,
) -> Result<String, AuthError> {
    let now = chrono::Utc::now();
    let claims = Claims {
        sub: user_id,
        org_id,
        plan,
        iat: now.timestamp(),
        exp: (now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero())).timestamp(),
        typ: kind,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(signing_secret.as_bytes()))
        .map_err(|_| AuthError::InvalidToken)
}

pub(crate) fn verify(token: &str, signing_secret: &str, expected: TokenKind) -> Result<Claims, AuthError> {
    let mut validation = Validation::default();
    validation.leeway = 0;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(signing_secret.as_bytes()), &validation)
        .map_err(|_| AuthError::InvalidToken)?;

    if data.claims.typ != expected {
        return Err(AuthError::WrongTokenType);
    }

    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_token_is_rejected() {
        let secret = "z".repeat(32);
        let token = issue(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Plan::Free,
            TokenKind::Access,
            &secret,
            Duration::from_secs(0),
        )
        .unwrap();
        std::thread::sleep(Duration::from_secs(2));
        let err = verify(&token, &secret, TokenKind::Access).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Plan::Pro,
            TokenKind::Access,
            &"a".repeat(32),
            Duration::from_secs(900),
        )
        .unwrap();
        let err = verify(&token, &"b".repeat(32), TokenKind::Access).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }
}
