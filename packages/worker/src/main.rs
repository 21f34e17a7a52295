//! Worker binary: wires configuration, persistence, queue, and completion
//! provider together, then runs the dequeue pool, the outbox pump, and the
//! orphan sweep concurrently until the process is killed.

use std::sync::Arc;

use caseforge_ai::templates::TemplateStore;
use caseforge_config::AppConfig;
use caseforge_database::{db, postgres, run_migrations};
use caseforge_worker::{run_outbox_pump, run_pool, run_sweep};

#[tokio::main]
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
    let provider: Arc<dyn caseforge_ai::providers::CompletionProvider> = Arc::from(provider);
    let templates = Arc::new(TemplateStore::validate().unwrap_or_else(|e| {
        log::error!("failed to validate agent templates: {e}");
        std::process::exit(1);
    }));

    log::info!("starting {} workers", config.worker_pool_count);

    tokio::join!(
        run_pool(config.worker_pool_count, repos.clone(), Arc::clone(&queue), provider, templates),
        run_outbox_pump(repos.clone(), queue),
        run_sweep(repos),
    );

    Ok(())
}
