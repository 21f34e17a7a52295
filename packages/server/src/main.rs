//! API server binary: wires configuration, persistence, queue, and
//! completion provider into an `AppState`, then serves the HTTP surface.

use std::sync::Arc;

use caseforge_config::AppConfig;
use caseforge_database::{db, postgres, run_migrations};
use caseforge_refine::RefineLocks;
use caseforge_server::{run_server, rate_limit::RateLimiters, AppState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    caseforge_observability::init();
    let config = AppConfig::from_env_or_exit();

    log::info!("connecting to database");
    let db_conn = db::connect(&config.database_url).await.unwrap_or_else(|e| {
        log::error!("failed to connect to the database: {e}");
        std::process::exit(1);
    });

    log::info!("running migrations");
    if let Err(e) = run_migrations(db_conn.as_ref()).await {
        log::error!("failed to run migrations: {e}");
        std::process::exit(1);
    }

    let repos = postgres::repositories(Arc::from(db_conn));
    let queue = Arc::from(caseforge_queue::build(&config));
    let provider = caseforge_ai::providers::create_provider_from_env().unwrap_or_else(|e| {
        log::error!("failed to configure completion provider: {e}");
        std::process::exit(1);
    });

    let state = AppState {
        config,
        repos,
        queue,
        provider: Arc::from(provider),
        refine_locks: RefineLocks::new(),
        rate_limiters: RateLimiters::default(),
    };

    run_server(state).await
}
