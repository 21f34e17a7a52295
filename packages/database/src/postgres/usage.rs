use std::sync::Arc;

use caseforge_database_models::QuotaOutcome;
use caseforge_domain::{Limit, QuotaFeature};
use chrono::{DateTime, Utc};
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue};
use uuid::Uuid;

use crate::DbError;
use crate::postgres::NO_KEY;
use crate::traits::UsageRepository;

/// Postgres-backed [`UsageRepository`].
pub struct PgUsageRepository {
    db: Arc<dyn Database>,
}

impl PgUsageRepository {
    /// Wraps a database connection.
    #[must_use]
    pub const fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl UsageRepository for PgUsageRepository {
    async fn check_and_consume(
        &self,
        org_id: Uuid,
        feature: QuotaFeature,
        key: Option<Uuid>,
        limit: Limit,
        period_start: DateTime<Utc>,
    ) -> Result<QuotaOutcome, DbError> {
        let Limit::Bounded(max) = limit else {
            return Ok(QuotaOutcome::Allowed { used: 0 });
        };
        let key = key.unwrap_or(NO_KEY);

        self.db
            .exec_raw_params(
                "INSERT INTO usage_counters (org_id, feature, key, period_start, count)
                 VALUES ($1, $2, $3, $4, 0)
                 ON CONFLICT (org_id, feature, key, period_start) DO NOTHING",
                &[
                    DatabaseValue::String(org_id.to_string()),
                    DatabaseValue::String(feature.to_string()),
                    DatabaseValue::String(key.to_string()),
                    DatabaseValue::DateTime(period_start.naive_utc()),
                ],
            )
            .await?;

        let rows = self
            .db
            .query_raw_params(
                "UPDATE usage_counters SET count = count + 1
                 WHERE org_id = $1 AND feature = $2 AND key = $3 AND period_start = $4
                   AND count < $5
                 RETURNING count",
                &[
                    DatabaseValue::String(org_id.to_string()),
                    DatabaseValue::String(feature.to_string()),
                    DatabaseValue::String(key.to_string()),
                    DatabaseValue::DateTime(period_start.naive_utc()),
                    DatabaseValue::Int64(max),
                ],
            )
            .await?;

        if let Some(row) = rows.first() {
            let used: i64 = row.to_value("count").map_err(conv)?;
            return Ok(QuotaOutcome::Allowed { used });
        }

        let used = self.get(org_id, feature, Some(key), period_start).await?;
        Ok(QuotaOutcome::Denied { used })
    }

    async fn get(
        &self,
        org_id: Uuid,
        feature: QuotaFeature,
        key: Option<Uuid>,
        period_start: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        let key = key.unwrap_or(NO_KEY);

        let rows = self
            .db
            .query_raw_params(
                "SELECT count FROM usage_counters
                 WHERE org_id = $1 AND feature = $2 AND key = $3 AND period_start = $4",
                &[
                    DatabaseValue::String(org_id.to_string()),
                    DatabaseValue::String(feature.to_string()),
                    DatabaseValue::String(key.to_string()),
                    DatabaseValue::DateTime(period_start.naive_utc()),
                ],
            )
            .await?;

        let Some(row) = rows.first() else {
            return Ok(0);
        };
        row.to_value("count").map_err(conv)
    }

    async fn reset_cycle(&self, org_id: Uuid, new_period_start: DateTime<Utc>) -> Result<(), DbError> {
        self.db
            .exec_raw_params(
                "DELETE FROM usage_counters WHERE org_id = $1 AND period_start < $2",
                &[
                    DatabaseValue::String(org_id.to_string()),
                    DatabaseValue::DateTime(new_period_start.naive_utc()),
                ],
            )
            .await?;
        Ok(())
    }
}

fn conv(e: impl std::fmt::Display) -> DbError {
    DbError::Conversion { message: e.to_string() }
}
