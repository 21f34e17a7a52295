use std::str::FromStr as _;
use std::sync::Arc;

use caseforge_database_models::OrganizationRow;
use caseforge_domain::Plan;
use chrono::{DateTime, Utc};
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue};
use uuid::Uuid;

use crate::DbError;
use crate::traits::OrgRepository;

/// Postgres-backed [`OrgRepository`].
pub struct PgOrgRepository {
    db: Arc<dyn Database>,
}

impl PgOrgRepository {
    /// Wraps a database connection.
    #[must_use]
    pub const fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl OrgRepository for PgOrgRepository {
    async fn create(&self, name: &str, plan: Plan, cycle_start: DateTime<Utc>) -> Result<OrganizationRow, DbError> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        self.db
            .exec_raw_params(
                "INSERT INTO organizations (id, name, plan, cycle_start, subscription_active, created_at)
                 VALUES ($1, $2, $3, $4, TRUE, $5)",
                &[
                    DatabaseValue::String(id.to_string()),
                    DatabaseValue::String(name.to_string()),
                    DatabaseValue::String(plan.to_string()),
                    DatabaseValue::DateTime(cycle_start.naive_utc()),
                    DatabaseValue::DateTime(now.naive_utc()),
                ],
            )
            .await?;

        Ok(OrganizationRow {
            id,
            name: name.to_string(),
            plan,
            cycle_start,
            subscription_active: true,
            created_at: now,
        })
    }

    async fn get(&self, org_id: Uuid) -> Result<Option<OrganizationRow>, DbError> {
        let rows = self
            .db
            .query_raw_params(
                "SELECT id, name, plan, cycle_start, subscription_active, created_at
                 FROM organizations WHERE id = $1",
                &[DatabaseValue::String(org_id.to_string())],
            )
            .await?;

        rows.first().map(row_to_org).transpose()
    }

    async fn set_plan(&self, org_id: Uuid, plan: Plan, cycle_start: DateTime<Utc>) -> Result<(), DbError> {
        let updated = self
            .db
            .exec_raw_params(
                "UPDATE organizations SET plan = $2, cycle_start = $3 WHERE id = $1",
                &[
                    DatabaseValue::String(org_id.to_string()),
                    DatabaseValue::String(plan.to_string()),
                    DatabaseValue::DateTime(cycle_start.naive_utc()),
                ],
            )
            .await?;

        if updated == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}

fn row_to_org(row: &switchy_database::Row) -> Result<OrganizationRow, DbError> {
    let id: String = row.to_value("id").map_err(conv)?;
    let plan: String = row.to_value("plan").map_err(conv)?;
    let cycle_start: chrono::NaiveDateTime = row.to_value("cycle_start").map_err(conv)?;
    let created_at: chrono::NaiveDateTime = row.to_value("created_at").map_err(conv)?;

    Ok(OrganizationRow {
        id: Uuid::from_str(&id).map_err(|e| DbError::Conversion { message: e.to_string() })?,
        name: row.to_value("name").map_err(conv)?,
        plan: Plan::from_str(&plan).map_err(|e| DbError::Conversion { message: e.to_string() })?,
        cycle_start: DateTime::from_naive_utc_and_offset(cycle_start, Utc),
        subscription_active: row.to_value("subscription_active").map_err(conv)?,
        created_at: DateTime::from_naive_utc_and_offset(created_at, Utc),
    })
}

fn conv(e: impl std::fmt::Display) -> DbError {
    DbError::Conversion { message: e.to_string() }
}
