//! `sync_runs` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::models::{CapabilityGap, RunStatistics, RunStatus, SyncRun};
use crate::store::RunStore;

const SELECT_RUN: &str = r#"
    SELECT id, zone, mode, status, triggered_by, started_at, completed_at,
           statistics, capability_gaps, error_message
    FROM sync_runs
"#;

/// A `sync_runs` row as stored.
#[derive(Debug, sqlx::FromRow)]
struct SyncRunRow {
    id: Uuid,
    zone: String,
    mode: String,
    status: String,
    triggered_by: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    statistics: JsonValue,
    capability_gaps: JsonValue,
    error_message: Option<String>,
}

impl SyncRunRow {
    fn into_run(self) -> SyncRun {
        SyncRun {
            id: self.id,
            zone: self.zone,
            mode: self.mode.parse().unwrap_or_default(),
            status: self.status.parse().unwrap_or(RunStatus::Pending),
            trigger: self.triggered_by.parse().unwrap_or_default(),
            started_at: self.started_at,
            completed_at: self.completed_at,
            statistics: serde_json::from_value::<RunStatistics>(self.statistics)
                .unwrap_or_default(),
            capability_gaps: serde_json::from_value::<BTreeSet<CapabilityGap>>(
                self.capability_gaps,
            )
            .unwrap_or_default(),
            error_message: self.error_message,
        }
    }
}

/// Run records in PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn create(&self, run: &SyncRun) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_runs (
                id, zone, mode, status, triggered_by, started_at, completed_at,
                statistics, capability_gaps, error_message
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(run.id)
        .bind(&run.zone)
        .bind(run.mode.as_str())
        .bind(run.status.as_str())
        .bind(run.trigger.as_str())
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(serde_json::to_value(&run.statistics)?)
        .bind(serde_json::to_value(&run.capability_gaps)?)
        .bind(&run.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, run: &SyncRun) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_runs
            SET status = $2, completed_at = $3, statistics = $4,
                capability_gaps = $5, error_message = $6
            WHERE id = $1
            "#,
        )
        .bind(run.id)
        .bind(run.status.as_str())
        .bind(run.completed_at)
        .bind(serde_json::to_value(&run.statistics)?)
        .bind(serde_json::to_value(&run.capability_gaps)?)
        .bind(&run.error_message)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("sync run {}", run.id)));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DbResult<Option<SyncRun>> {
        let row: Option<SyncRunRow> = sqlx::query_as(&format!("{SELECT_RUN} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(SyncRunRow::into_run))
    }

    async fn list_recent(&self, limit: i64) -> DbResult<Vec<SyncRun>> {
        let rows: Vec<SyncRunRow> =
            sqlx::query_as(&format!("{SELECT_RUN} ORDER BY started_at DESC LIMIT $1"))
                .bind(limit.max(0))
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(SyncRunRow::into_run).collect())
    }

    async fn list_running(&self, zone: &str) -> DbResult<Vec<SyncRun>> {
        let rows: Vec<SyncRunRow> = sqlx::query_as(&format!(
            "{SELECT_RUN} WHERE zone = $1 AND status = 'running' ORDER BY started_at"
        ))
        .bind(zone)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SyncRunRow::into_run).collect())
    }
}
