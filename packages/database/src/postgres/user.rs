use std::str::FromStr as _;
use std::sync::Arc;

use caseforge_database_models::UserRow;
use caseforge_domain::Role;
use chrono::{DateTime, Utc};
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue, Row};
use uuid::Uuid;

use crate::DbError;
use crate::traits::UserRepository;

/// Postgres-backed [`UserRepository`].
pub struct PgUserRepository {
    db: Arc<dyn Database>,
}

impl PgUserRepository {
    /// Wraps a database connection.
    #[must_use]
    pub const fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRow>, DbError> {
        let rows = self
            .db
            .query_raw_params(
                "SELECT id, org_id, email, password_hash, role, created_at
                 FROM users WHERE email = $1",
                &[DatabaseValue::String(email.to_lowercase())],
            )
            .await?;

        rows.first().map(row_to_user).transpose()
    }

    async fn get(&self, org_id: Uuid, user_id: Uuid) -> Result<Option<UserRow>, DbError> {
        let rows = self
            .db
            .query_raw_params(
                "SELECT id, org_id, email, password_hash, role, created_at
                 FROM users WHERE org_id = $1 AND id = $2",
                &[
                    DatabaseValue::String(org_id.to_string()),
                    DatabaseValue::String(user_id.to_string()),
                ],
            )
            .await?;

        rows.first().map(row_to_user).transpose()
    }

    async fn create(
        &self,
        org_id: Uuid,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<UserRow, DbError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let email = email.to_lowercase();

        self.db
            .exec_raw_params(
                "INSERT INTO users (id, org_id, email, password_hash, role, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    DatabaseValue::String(id.to_string()),
                    DatabaseValue::String(org_id.to_string()),
                    DatabaseValue::String(email.clone()),
                    DatabaseValue::String(password_hash.to_string()),
                    DatabaseValue::String(role.to_string()),
                    DatabaseValue::DateTime(now.naive_utc()),
                ],
            )
            .await?;

        Ok(UserRow {
            id,
            org_id,
            email,
            password_hash: password_hash.to_string(),
            role,
            created_at: now,
        })
    }

    async fn update_password(&self, org_id: Uuid, user_id: Uuid, password_hash: &str) -> Result<(), DbError> {
        let updated = self
            .db
            .exec_raw_params(
                "UPDATE users SET password_hash = $3 WHERE org_id = $1 AND id = $2",
                &[
                    DatabaseValue::String(org_id.to_string()),
                    DatabaseValue::String(user_id.to_string()),
                    DatabaseValue::String(password_hash.to_string()),
                ],
            )
            .await?;

        if updated == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}

fn row_to_user(row: &Row) -> Result<UserRow, DbError> {
    let id: String = row.to_value("id").map_err(conv)?;
    let org_id: String = row.to_value("org_id").map_err(conv)?;
    let role: String = row.to_value("role").map_err(conv)?;
    let created_at: chrono::NaiveDateTime = row.to_value("created_at").map_err(conv)?;

    Ok(UserRow {
        id: Uuid::from_str(&id).map_err(conv)?,
        org_id: Uuid::from_str(&org_id).map_err(conv)?,
        email: row.to_value("email").map_err(conv)?,
        password_hash: row.to_value("password_hash").map_err(conv)?,
        role: Role::from_str(&role).map_err(conv)?,
        created_at: DateTime::from_naive_utc_and_offset(created_at, Utc),
    })
}

fn conv(e: impl std::fmt::Display) -> DbError {
    DbError::Conversion { message: e.to_string() }
}
