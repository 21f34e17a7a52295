//! Route handlers.
//!
//! Every handler follows the same shape: rate limit, validate, authenticate
//! (via the [`caseforge_auth::TenantContext`] extractor where the route
//! requires it), quota-check where one applies, then enqueue or read, then
//! shape the response. The actual orchestration and refinement logic lives
//! in `caseforge_ai`/`caseforge_refine`; nothing here touches a provider
//! directly except the refine path, which delegates to `caseforge_refine::refine`.

use std::str::FromStr as _;

use actix_web::{web, HttpRequest, HttpResponse};
use caseforge_auth::TenantContext;
use caseforge_database_models::NewAnalysis;
use caseforge_domain::{AnalysisStatus, QuotaFeature, Role};
use caseforge_queue::RunAnalysisPayload;
use caseforge_server_models::{
    AccessTokenResponse, AnalysesListResponse, AnalysisResponse, AnalysisSummaryResponse,
    BillingWebhookRequest, CreateAnalysisRequest, CreateAnalysisResponse, HealthReadyResponse,
    LoginRequest, RefineRequest, RefineResponse, RefreshRequest, RegisterRequest, TokenPairResponse,
    UsageResponse,
};
use chrono::Utc;
use hmac::Mac as _;
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::ApiError;
use crate::{client_ip, validation, AppState};

type HmacSha256 = hmac::Hmac<sha2::Sha256>;

fn rate_limit_ip(state: &AppState, req: &HttpRequest, auth: bool) -> Result<(), ApiError> {
    let key = client_ip(req);
    let limiter = if auth { &state.rate_limiters.per_ip_auth } else { &state.rate_limiters.per_ip_general };
    limiter.check(&key).map_err(|retry_after| ApiError::RateLimited { retry_after })
}

fn rate_limit_user(state: &AppState, ctx: &TenantContext) -> Result<(), ApiError> {
    state
        .rate_limiters
        .per_user
        .check(&ctx.user_id.to_string())
        .map_err(|retry_after| ApiError::RateLimited { retry_after })
}

/// `POST /auth/register`
pub async fn register(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    rate_limit_ip(&state, &req, true)?;

    let email = validation::normalize_email(&body.email);
    if state.repos.users.find_by_email(&email).await?.is_some() {
        return Err(ApiError::InvalidInput("an account with that email already exists".to_string()));
    }

    let password_hash = caseforge_auth::hash_password(&body.password)?;
    let org = state.repos.orgs.create(&body.org_name, caseforge_domain::Plan::Free, Utc::now()).await?;
    let user = state.repos.users.create(org.id, &email, &password_hash, Role::Owner).await?;

    let access = caseforge_auth::issue_access_token(
        user.id,
        org.id,
        org.plan,
        &state.config.jwt_signing_secret,
        state.config.access_token_ttl,
    )?;
    let refresh = caseforge_auth::issue_refresh_token(
        user.id,
        org.id,
        org.plan,
        &state.config.jwt_signing_secret,
        state.config.refresh_token_ttl,
    )?;

    Ok(HttpResponse::Created().json(TokenPairResponse { access_token: access, refresh_token: refresh }))
}

/// `POST /auth/login`
pub async fn login(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    rate_limit_ip(&state, &req, true)?;

    let email = validation::normalize_email(&body.email);
    let user = state.repos.users.find_by_email(&email).await?.ok_or(ApiError::Unauthenticated)?;
    if !caseforge_auth::verify_password(&body.password, &user.password_hash)? {
        return Err(ApiError::Unauthenticated);
    }
    let org = state.repos.orgs.get(user.org_id).await?.ok_or(ApiError::NotFound)?;

    let access = caseforge_auth::issue_access_token(
        user.id,
        org.id,
        org.plan,
        &state.config.jwt_signing_secret,
        state.config.access_token_ttl,
    )?;
    let refresh = caseforge_auth::issue_refresh_token(
        user.id,
        org.id,
        org.plan,
        &state.config.jwt_signing_secret,
        state.config.refresh_token_ttl,
    )?;

    Ok(HttpResponse::Ok().json(TokenPairResponse { access_token: access, refresh_token: refresh }))
}

/// `POST /auth/refresh`
pub async fn refresh(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<RefreshRequest>,
) -> Result<HttpResponse, ApiError> {
    rate_limit_ip(&state, &req, true)?;

    let claims = caseforge_auth::verify_token(
        &body.refresh_token,
        &state.config.jwt_signing_secret,
        caseforge_auth::TokenKind::Refresh,
    )?;
    // Re-resolve the org's live plan rather than trusting the refresh
    // token's stale claim (it may have changed since issuance).
    let org = state.repos.orgs.get(claims.org_id).await?.ok_or(ApiError::NotFound)?;

    let access = caseforge_auth::issue_access_token(
        claims.sub,
        org.id,
        org.plan,
        &state.config.jwt_signing_secret,
        state.config.access_token_ttl,
    )?;
    Ok(HttpResponse::Ok().json(AccessTokenResponse { access_token: access }))
}

/// `POST /analyses`
pub async fn create_analysis(
    ctx: TenantContext,
    state: web::Data<AppState>,
    body: web::Json<CreateAnalysisRequest>,
) -> Result<HttpResponse, ApiError> {
    rate_limit_user(&state, &ctx)?;
    validation::validate_problem_description(&body.problem_description)?;

    let now = Utc::now();
    let decision = caseforge_quota::check_and_consume(
        state.repos.orgs.as_ref(),
        state.repos.usage.as_ref(),
        ctx.org_id,
        QuotaFeature::AnalysesCreated,
        None,
        now,
    )
    .await?;
    if let caseforge_quota::QuotaDecision::Denied { used, limit, upgrade_target } = decision {
        return Err(ApiError::QuotaExceeded { used, limit: limit.as_i64(), upgrade_to: upgrade_target });
    }

    let new_analysis = NewAnalysis {
        id: Uuid::new_v4(),
        org_id: ctx.org_id,
        creator_user_id: ctx.user_id,
        problem_description: body.problem_description.clone(),
        business_type: body.business_type,
        depth: body.depth,
    };
    let (analysis, job) = state.repos.analyses.create_with_job(new_analysis).await?;

    state
        .queue
        .enqueue(RunAnalysisPayload { analysis_id: analysis.id, org_id: ctx.org_id })
        .await
        .map_err(|e| {
            log::warn!("enqueue failed, leaving job {} for the outbox pump: {e}", job.id);
        })
        .ok();

    Ok(HttpResponse::Accepted()
        .json(CreateAnalysisResponse { analysis_id: analysis.id, status: AnalysisStatus::Pending }))
}

/// `GET /analyses/{id}`
pub async fn get_analysis(
    ctx: TenantContext,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    rate_limit_user(&state, &ctx)?;
    let id = path.into_inner();

    let analysis = state.repos.analyses.get(ctx.org_id, id).await?.ok_or(ApiError::NotFound)?;
    let agent_outputs = state.repos.agent_outputs.list(id).await?;
    Ok(HttpResponse::Ok().json(AnalysisResponse::new(analysis, agent_outputs)))
}

#[derive(Debug, Deserialize)]
pub struct ListAnalysesQuery {
    cursor: Option<chrono::DateTime<Utc>>,
    limit: Option<u32>,
}

const DEFAULT_LIST_LIMIT: u32 = 20;
const MAX_LIST_LIMIT: u32 = 100;

/// `GET /analyses`
pub async fn list_analyses(
    ctx: TenantContext,
    state: web::Data<AppState>,
    query: web::Query<ListAnalysesQuery>,
) -> Result<HttpResponse, ApiError> {
    rate_limit_user(&state, &ctx)?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);

    let rows = state.repos.analyses.list(ctx.org_id, limit, query.cursor).await?;
    let next_cursor = if rows.len() as u32 == limit { rows.last().map(|r| r.created_at) } else { None };
    let items = rows.iter().map(AnalysisSummaryResponse::from).collect();

    Ok(HttpResponse::Ok().json(AnalysesListResponse { items, next_cursor }))
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    format: String,
}

/// `GET /analyses/{id}/export`
///
/// Export rendering itself is out of scope; this still enforces the plan
/// feature gate and resource visibility so the endpoint's authorization
/// behavior matches the rest of the surface.
pub async fn export_analysis(
    ctx: TenantContext,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    query: web::Query<ExportQuery>,
) -> Result<HttpResponse, ApiError> {
    rate_limit_user(&state, &ctx)?;
    let id = path.into_inner();

    state.repos.analyses.get(ctx.org_id, id).await?.ok_or(ApiError::NotFound)?;

    let format = caseforge_domain::ExportFormat::from_str(&query.format)
        .map_err(|_| ApiError::InvalidInput(format!("unknown export format: {}", query.format)))?;
    if !caseforge_quota::may_export(ctx.plan, format) {
        return Err(ApiError::QuotaExceeded { used: 0, limit: 0, upgrade_to: ctx.plan.upgrade_target() });
    }

    Err(ApiError::NotImplemented("document export rendering".to_string()))
}

/// `POST /analyses/{id}/refine`
pub async fn refine_analysis(
    ctx: TenantContext,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<RefineRequest>,
) -> Result<HttpResponse, ApiError> {
    rate_limit_user(&state, &ctx)?;
    let analysis_id = path.into_inner();

    let outcome = caseforge_refine::refine(
        &state.refine_locks,
        state.repos.orgs.as_ref(),
        state.repos.analyses.as_ref(),
        state.repos.agent_outputs.as_ref(),
        state.repos.refine.as_ref(),
        state.repos.usage.as_ref(),
        state.provider.as_ref(),
        ctx.org_id,
        analysis_id,
        &body.message,
        Utc::now(),
    )
    .await?;

    Ok(HttpResponse::Ok().json(RefineResponse {
        reply: outcome.message,
        usage: UsageResponse::new(outcome.used, outcome.limit, outcome.remaining),
    }))
}

/// `POST /webhooks/billing`
///
/// Verifies the `X-Signature` header as an HMAC-SHA256 over the raw request
/// body, hex-encoded, before trusting any of its contents.
pub async fn billing_webhook(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let signature = req
        .headers()
        .get("X-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::BadSignature)?;

    let expected = hex::decode(signature).map_err(|_| ApiError::BadSignature)?;
    let mut mac = HmacSha256::new_from_slice(state.config.billing_webhook_secret.as_bytes())
        .map_err(|_| ApiError::Internal("invalid webhook secret".to_string()))?;
    mac.update(&body);
    mac.verify_slice(&expected).map_err(|_| ApiError::BadSignature)?;

    let payload: BillingWebhookRequest =
        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidInput(e.to_string()))?;

    state.repos.orgs.get(payload.org_id).await?.ok_or(ApiError::NotFound)?;
    state.repos.orgs.set_plan(payload.org_id, payload.new_plan, payload.cycle_start).await?;
    state.repos.usage.reset_cycle(payload.org_id, payload.cycle_start).await?;

    Ok(HttpResponse::Ok().finish())
}

/// `GET /health/live`
pub async fn health_live() -> HttpResponse {
    HttpResponse::Ok().finish()
}

/// `GET /health/ready`
pub async fn health_ready(state: web::Data<AppState>) -> HttpResponse {
    let store_reachable = state.repos.jobs.list_undispatched(1).await.is_ok();
    let queue_reachable = match state.queue.status(Uuid::new_v4()).await {
        Ok(_) | Err(caseforge_queue::QueueError::NotFound(_)) => true,
        Err(_) => false,
    };

    let body = HealthReadyResponse { store_reachable, queue_reachable };
    if store_reachable && queue_reachable {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use caseforge_ai::providers::{Completion, CompletionProvider, ProviderError};
    use caseforge_config::AppConfig;
    use caseforge_refine::RefineLocks;
    use std::sync::Arc;
    use std::time::Instant;

    struct StubProvider;

    #[async_trait::async_trait]
    impl CompletionProvider for StubProvider {
        async fn complete(
            &self,
            _system_prompt: &str,
            _user_message: &str,
            _model: &str,
            _max_tokens: u32,
            _deadline: Instant,
        ) -> Result<Completion, ProviderError> {
            Ok(Completion { text: "stub reply".to_string(), input_tokens: 10, output_tokens: 5 })
        }
    }

    fn test_config() -> AppConfig {
        unsafe {
            std::env::set_var("JWT_SIGNING_SECRET", "x".repeat(32));
            std::env::set_var("DATABASE_URL", "sqlite://test.db");
            std::env::set_var("LLM_API_KEY", "key");
            std::env::set_var("BILLING_WEBHOOK_SECRET", "test-webhook-secret-32-bytes-ok");
        }
        AppConfig::from_env().unwrap()
    }

    fn test_state() -> web::Data<AppState> {
        web::Data::new(AppState {
            config: test_config(),
            repos: caseforge_database::mem::repositories(),
            queue: Arc::from(caseforge_queue::InProcessQueue::new()),
            provider: Arc::new(StubProvider),
            refine_locks: RefineLocks::new(),
            rate_limiters: crate::rate_limit::RateLimiters::default(),
        })
    }

    #[actix_web::test]
    async fn register_then_login_round_trips() {
        let state = test_state();
        let config_data = web::Data::new(state.config.clone());
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .app_data(config_data.clone())
                .route("/auth/register", web::post().to(register))
                .route("/auth/login", web::post().to(login)),
        )
        .await;

        let register_req = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(RegisterRequest {
                email: "Owner@Example.com".to_string(),
                password: "abcd1234".to_string(),
                org_name: "Acme".to_string(),
            })
            .to_request();
        let register_resp = test::call_service(&app, register_req).await;
        assert_eq!(register_resp.status(), 201);

        let login_req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(LoginRequest { email: "owner@example.com".to_string(), password: "abcd1234".to_string() })
            .to_request();
        let login_resp = test::call_service(&app, login_req).await;
        assert_eq!(login_resp.status(), 200);
    }

    #[actix_web::test]
    async fn login_with_wrong_password_is_unauthenticated() {
        let state = test_state();
        let config_data = web::Data::new(state.config.clone());
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .app_data(config_data.clone())
                .route("/auth/register", web::post().to(register))
                .route("/auth/login", web::post().to(login)),
        )
        .await;

        let register_req = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(RegisterRequest {
                email: "a@example.com".to_string(),
                password: "abcd1234".to_string(),
                org_name: "Acme".to_string(),
            })
            .to_request();
        test::call_service(&app, register_req).await;

        let login_req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(LoginRequest { email: "a@example.com".to_string(), password: "wrongpass1".to_string() })
            .to_request();
        let login_resp = test::call_service(&app, login_req).await;
        assert_eq!(login_resp.status(), 401);
    }

    #[actix_web::test]
    async fn health_live_always_ok() {
        let resp = health_live().await;
        assert_eq!(resp.status(), 200);
    }

    #[actix_web::test]
    async fn billing_webhook_rejects_bad_signature() {
        let state = test_state();
        let app = test::init_service(
            App::new().app_data(state.clone()).route("/webhooks/billing", web::post().to(billing_webhook)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/webhooks/billing")
            .insert_header(("X-Signature", "00"))
            .set_payload("{}")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }
}
