//! Maps every failure mode reachable from a handler to a stable error
//! kind and its HTTP status code.

use actix_web::{HttpResponse, ResponseError};
use caseforge_database::DbError;
use caseforge_domain::{ErrorKind, Plan};
use caseforge_server_models::ErrorResponse;

/// A handler-level error, carrying enough detail to build the response body
/// without leaking internals: no stack traces, no raw provider errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request failed schema/range validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Missing or invalid bearer token.
    #[error("unauthenticated")]
    Unauthenticated,
    /// Authenticated, but for a different tenant than the resource belongs to.
    #[error("tenant mismatch")]
    TenantMismatch,
    /// Resource does not exist, or is invisible to this tenant.
    #[error("not found")]
    NotFound,
    /// Plan quota exhausted.
    #[error("quota exceeded")]
    QuotaExceeded { used: i64, limit: i64, upgrade_to: Option<Plan> },
    /// Too many requests from this caller.
    #[error("rate limited")]
    RateLimited { retry_after: u64 },
    /// HMAC signature on an inbound webhook was missing or invalid.
    #[error("bad signature")]
    BadSignature,
    /// Persistence temporarily unavailable.
    #[error("store busy")]
    StoreBusy,
    /// Anything else: logged in full, shown to the caller only as generic.
    #[error("internal error: {0}")]
    Internal(String),
    /// A feature-gated capability that is out of scope for this build.
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        log::error!("database error: {e}");
        Self::Internal("a persistence error occurred".to_string())
    }
}

impl From<caseforge_quota::QuotaError> for ApiError {
    fn from(e: caseforge_quota::QuotaError) -> Self {
        match e {
            caseforge_quota::QuotaError::OrgNotFound(_) => Self::NotFound,
            caseforge_quota::QuotaError::Database(db) => db.into(),
        }
    }
}

impl From<caseforge_refine::RefineError> for ApiError {
    fn from(e: caseforge_refine::RefineError) -> Self {
        match e {
            caseforge_refine::RefineError::AnalysisNotFound | caseforge_refine::RefineError::OrgNotFound => {
                Self::NotFound
            }
            caseforge_refine::RefineError::AnalysisNotCompleted => {
                Self::InvalidInput("analysis is not completed yet".to_string())
            }
            caseforge_refine::RefineError::QuotaExceeded { used, limit, upgrade_target, .. } => {
                Self::QuotaExceeded { used, limit: limit.as_i64(), upgrade_to: upgrade_target }
            }
            caseforge_refine::RefineError::Provider(e) => {
                log::error!("refine provider error: {e}");
                Self::Internal("the assistant failed to respond".to_string())
            }
            caseforge_refine::RefineError::Database(db) => db.into(),
        }
    }
}

impl From<caseforge_auth::AuthError> for ApiError {
    fn from(e: caseforge_auth::AuthError) -> Self {
        match e {
            caseforge_auth::AuthError::Unauthenticated
            | caseforge_auth::AuthError::InvalidToken
            | caseforge_auth::AuthError::WrongTokenType => Self::Unauthenticated,
            caseforge_auth::AuthError::TenantMismatch => Self::TenantMismatch,
            caseforge_auth::AuthError::WeakPassword(reason) => Self::InvalidInput(reason.to_string()),
            caseforge_auth::AuthError::Hashing(e) => Self::Internal(e.to_string()),
        }
    }
}

impl ApiError {
    const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::TenantMismatch => ErrorKind::TenantMismatch,
            Self::NotFound => ErrorKind::NotFound,
            Self::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::BadSignature => ErrorKind::InvalidInput,
            Self::StoreBusy => ErrorKind::StoreBusy,
            Self::Internal(_) | Self::NotImplemented(_) => ErrorKind::Infrastructure,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self.kind() {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::TenantMismatch => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::QuotaExceeded => StatusCode::PAYMENT_REQUIRED,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::StoreBusy => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Infrastructure if matches!(self, Self::NotImplemented(_)) => StatusCode::NOT_IMPLEMENTED,
            ErrorKind::ProviderRetryable | ErrorKind::ProviderFatal | ErrorKind::AgentTimeout | ErrorKind::Infrastructure => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if matches!(self.kind(), ErrorKind::TenantMismatch) {
            log::warn!("tenant_mismatch: {self}");
        }

        let body = match self {
            Self::QuotaExceeded { used, limit, upgrade_to } => ErrorResponse {
                error: "quota_exceeded".to_string(),
                message: "plan quota exceeded".to_string(),
                used: Some(*used),
                limit: Some(*limit),
                upgrade_to: *upgrade_to,
                retry_after: None,
            },
            Self::RateLimited { retry_after } => ErrorResponse {
                retry_after: Some(*retry_after),
                ..ErrorResponse::simple("rate_limited", "too many requests")
            },
            Self::Internal(_) | Self::StoreBusy => {
                ErrorResponse::simple(&self.kind().to_string(), "an internal error occurred")
            }
            other => ErrorResponse::simple(&other.kind().to_string(), other.to_string()),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}
