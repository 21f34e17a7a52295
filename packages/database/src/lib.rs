#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Tenant-scoped persistence.
//!
//! Every entity family (`org`, `user`, `analysis`, `agent_output`,
//! `refine`, `usage`, `job`) is accessed through a narrow repository trait
//! with `org_id` threaded through every call. [`postgres`] implements these
//! traits against `switchy_database`; [`mem`] provides a second,
//! process-local implementation used only by tests.

pub mod db;
pub mod mem;
pub mod postgres;
mod traits;

use include_dir::{Dir, include_dir};
use switchy_database::Database;
use switchy_schema::discovery::embedded::EmbeddedMigrationSource;
use switchy_schema::runner::MigrationRunner;

pub use traits::{
    AgentOutputRepository, AnalysisRepository, JobRepository, OrgRepository, RefineRepository,
    Repositories, UsageRepository, UserRepository,
};

/// Embedded SQL migrations from the `migrations/` directory at the
/// workspace root.
static MIGRATIONS_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/../../migrations");

/// Errors from any repository operation.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Underlying database driver error.
    #[error("database error: {0}")]
    Database(#[from] switchy_database::DatabaseError),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(#[from] switchy_schema::MigrationError),

    /// A row existed but could not be converted to its model type.
    #[error("data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },

    /// A query was attempted without the mandatory tenant scope.
    ///
    /// Every tenant-data query must carry `org_id`; this is a programmatic
    /// guard, not merely a filter.
    #[error("query missing mandatory org_id scope")]
    MissingTenantScope,

    /// The requested row exists but belongs to a different organization.
    #[error("tenant_mismatch")]
    TenantMismatch,

    /// The requested row does not exist (or is invisible to this tenant).
    #[error("not_found")]
    NotFound,
}

/// Runs all pending database migrations.
///
/// # Errors
///
/// Returns [`DbError`] if any migration fails to apply.
pub async fn run_migrations(db: &dyn Database) -> Result<(), DbError> {
    let source = EmbeddedMigrationSource::new(&MIGRATIONS_DIR);
    let runner = MigrationRunner::new(Box::new(source));
    runner.run(db).await?;
    log::info!("database migrations completed successfully");
    Ok(())
}
