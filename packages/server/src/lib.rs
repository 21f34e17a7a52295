#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the business analysis backend.
//!
//! The surface is thin by design: every handler does input
//! validation, a quota check where one applies, then an enqueue or a read,
//! and shapes the response. Orchestration, quota arithmetic, and refinement
//! logic live in `caseforge_ai`, `caseforge_quota`, and `caseforge_refine`
//! respectively.

mod errors;
pub mod handlers;
pub mod rate_limit;
mod validation;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use caseforge_ai::providers::CompletionProvider;
use caseforge_config::AppConfig;
use caseforge_database::Repositories;
use caseforge_queue::JobQueue;
use caseforge_refine::RefineLocks;
use rate_limit::RateLimiters;

/// Shared application state handed to every handler.
pub struct AppState {
    /// Resolved process configuration.
    pub config: AppConfig,
    /// Every repository, bundled.
    pub repos: Repositories,
    /// The selected job queue backend.
    pub queue: Arc<dyn JobQueue>,
    /// The selected completion provider.
    pub provider: Arc<dyn CompletionProvider>,
    /// Per-analysis refine locks.
    pub refine_locks: RefineLocks,
    /// In-memory fixed-window rate limit counters.
    pub rate_limiters: RateLimiters,
}

/// Extracts the caller's IP for rate-limit keying, falling back to a fixed
/// key if the connection info yields none (e.g. in tests).
pub(crate) fn client_ip(req: &actix_web::HttpRequest) -> String {
    req.connection_info().realip_remote_addr().unwrap_or("unknown").to_string()
}

/// Builds and runs the HTTP server until shutdown.
///
/// # Errors
///
/// Returns an `std::io::Result` error if the server fails to bind or
/// encounters a runtime error.
///
/// # Panics
///
/// Panics if the database connection or migrations fail at startup — both
/// are fatal: startup is the one place a hard failure is appropriate.
pub async fn run_server(state: AppState) -> std::io::Result<()> {
    let bind_addr = state.config.bind_addr.clone();
    let port = state.config.port;
    let allowed_origins = state.config.cors_allow_origins.clone();

    let state = web::Data::new(state);
    let config_data = web::Data::new(state.config.clone());

    log::info!("starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let mut cors = Cors::default().allowed_methods(["GET", "POST"]).allow_any_header();
        for origin in &allowed_origins {
            cors = cors.allowed_origin(origin);
        }

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(
                middleware::DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("Referrer-Policy", "no-referrer")),
            )
            .app_data(state.clone())
            .app_data(config_data.clone())
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(handlers::register))
                    .route("/login", web::post().to(handlers::login))
                    .route("/refresh", web::post().to(handlers::refresh)),
            )
            .service(
                web::scope("/analyses")
                    .route("", web::post().to(handlers::create_analysis))
                    .route("", web::get().to(handlers::list_analyses))
                    .route("/{id}", web::get().to(handlers::get_analysis))
                    .route("/{id}/export", web::get().to(handlers::export_analysis))
                    .route("/{id}/refine", web::post().to(handlers::refine_analysis)),
            )
            .service(web::scope("/webhooks").route("/billing", web::post().to(handlers::billing_webhook)))
            .service(
                web::scope("/health")
                    .route("/live", web::get().to(handlers::health_live))
                    .route("/ready", web::get().to(handlers::health_ready)),
            )
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
