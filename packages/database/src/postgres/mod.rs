//! `switchy_database`-backed repository implementations.

mod agent_output;
mod analysis;
mod job;
mod org;
mod refine;
mod usage;
mod user;

pub use agent_output::PgAgentOutputRepository;
pub use analysis::PgAnalysisRepository;
pub use job::PgJobRepository;
pub use org::PgOrgRepository;
pub use refine::PgRefineRepository;
pub use usage::PgUsageRepository;
pub use user::PgUserRepository;

use std::sync::Arc;

use switchy_database::Database;

use crate::traits::Repositories;

/// Builds a [`Repositories`] bundle backed by the given database connection.
#[must_use]
pub fn repositories(db: Arc<dyn Database>) -> Repositories {
    Repositories {
        orgs: Arc::new(PgOrgRepository::new(Arc::clone(&db))),
        users: Arc::new(PgUserRepository::new(Arc::clone(&db))),
        analyses: Arc::new(PgAnalysisRepository::new(Arc::clone(&db))),
        agent_outputs: Arc::new(PgAgentOutputRepository::new(Arc::clone(&db))),
        refine: Arc::new(PgRefineRepository::new(Arc::clone(&db))),
        usage: Arc::new(PgUsageRepository::new(Arc::clone(&db))),
        jobs: Arc::new(PgJobRepository::new(db)),
    }
}

/// Sentinel used in place of a real key in `usage_counters.key` for counters
/// that don't have a secondary key (e.g. `analyses_created`), since
/// Postgres's `NULL <> NULL` would break the composite primary key's
/// conflict target.
pub(crate) const NO_KEY: uuid::Uuid = uuid::Uuid::nil();
