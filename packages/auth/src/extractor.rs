//! Request-scoped tenant context, loaded from the bearer access token.

use std::future::{ready, Ready};

use actix_web::{web, FromRequest, HttpRequest};
use caseforge_config::AppConfig;
use caseforge_domain::Plan;
use uuid::Uuid;

use crate::jwt::TokenKind;
use crate::AuthError;

/// `(user_id, org_id, plan)` resolved from a verified access token.
///
/// Persistence calls read `org_id` from here rather than from a client-
/// supplied request field — the only way to change tenant scope is to log
/// in as a different user.
#[derive(Debug, Clone, Copy)]
pub struct TenantContext {
    /// The authenticated user.
    pub user_id: Uuid,
    /// The user's organization; the tenant scope for this request.
    pub org_id: Uuid,
    /// The org's plan, as of token issuance.
    pub plan: Plan,
}

impl actix_web::ResponseError for AuthError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        match self {
            Self::Unauthenticated | Self::InvalidToken | Self::WrongTokenType => {
                actix_web::http::StatusCode::UNAUTHORIZED
            }
            Self::TenantMismatch => actix_web::http::StatusCode::FORBIDDEN,
            Self::WeakPassword(_) => actix_web::http::StatusCode::BAD_REQUEST,
            Self::Hashing(_) => actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl FromRequest for TenantContext {
    type Error = AuthError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        ready(extract(req))
    }
}

fn extract(req: &HttpRequest) -> Result<TenantContext, AuthError> {
    let config = req
        .app_data::<web::Data<AppConfig>>()
        .expect("AppConfig must be registered as app_data");

    let header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::Unauthenticated)?;

    let token = header.strip_prefix("Bearer ").ok_or(AuthError::Unauthenticated)?;
    let claims = crate::jwt::verify(token, &config.jwt_signing_secret, TokenKind::Access)?;

    Ok(TenantContext {
        user_id: claims.sub,
        org_id: claims.org_id,
        plan: claims.plan,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn config() -> AppConfig {
        unsafe {
            std::env::set_var("JWT_SIGNING_SECRET", "x".repeat(32));
            std::env::set_var("DATABASE_URL", "sqlite://test.db");
            std::env::set_var("LLM_API_KEY", "key");
            std::env::set_var("BILLING_WEBHOOK_SECRET", "y".repeat(32));
        }
        AppConfig::from_env().unwrap()
    }

    #[test]
    fn missing_header_is_unauthenticated() {
        let config = config();
        let req = TestRequest::default().app_data(web::Data::new(config)).to_http_request();
        let err = extract(&req).unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));
    }

    #[test]
    fn valid_bearer_token_resolves_tenant_context() {
        let config = config();
        let user_id = Uuid::new_v4();
        let org_id = Uuid::new_v4();
        let token = crate::jwt::issue(
            user_id,
            org_id,
            Plan::Pro,
            TokenKind::Access,
            &config.jwt_signing_secret,
            std::time::Duration::from_secs(900),
        )
        .unwrap();

        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {token}")))
            .app_data(web::Data::new(config))
            .to_http_request();

        let ctx = extract(&req).unwrap();
        assert_eq!(ctx.user_id, user_id);
        assert_eq!(ctx.org_id, org_id);
    }
}
