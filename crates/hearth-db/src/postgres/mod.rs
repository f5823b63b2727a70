//! PostgreSQL store.
//!
//! Every reconciled kind lives in its own table with a unique `external_id`
//! column. Batch inserts are a single multi-row `INSERT`, batch updates run
//! in one transaction, and deletions are a single `DELETE .. = ANY($1)`.

mod records;
mod runs;

pub use records::PgRecord;
pub use runs::PgRunStore;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::migrations::run_migrations;
use crate::models::{Automation, Device, Entity, Location, Scene, Script};
use crate::store::{validate_external_id, PageRequest, RecordStore, SyncStores};

/// PostgreSQL caps bind parameters per statement at 65535.
const MAX_BIND_PARAMS: usize = 65_535;

/// Table-backed store for one kind.
#[derive(Debug)]
pub struct PgTable<T: PgRecord> {
    pool: PgPool,
    _kind: PhantomData<fn() -> T>,
}

impl<T: PgRecord> PgTable<T> {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _kind: PhantomData,
        }
    }

    fn select_sql(filter: &str) -> String {
        format!(
            "SELECT {} FROM {} {}",
            T::column_list(),
            T::TABLE,
            filter
        )
    }

    fn decode_all(rows: &[PgRow]) -> DbResult<Vec<T>> {
        rows.iter()
            .map(|row| T::from_pg_row(row).map_err(DbError::from))
            .collect()
    }
}

#[async_trait]
impl<T: PgRecord> RecordStore<T> for PgTable<T> {
    async fn get(&self, id: Uuid) -> DbResult<Option<T>> {
        let row = sqlx::query(&Self::select_sql("WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref()
            .map(T::from_pg_row)
            .transpose()
            .map_err(DbError::from)
    }

    async fn find_by_external_id(&self, external_id: &str) -> DbResult<Option<T>> {
        let row = sqlx::query(&Self::select_sql("WHERE external_id = $1"))
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref()
            .map(T::from_pg_row)
            .transpose()
            .map_err(DbError::from)
    }

    async fn find_by_external_ids(&self, external_ids: &[String]) -> DbResult<Vec<T>> {
        if external_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&Self::select_sql("WHERE external_id = ANY($1)"))
            .bind(external_ids)
            .fetch_all(&self.pool)
            .await?;
        Self::decode_all(&rows)
    }

    async fn list(&self, page: PageRequest) -> DbResult<Vec<T>> {
        let rows = sqlx::query(&Self::select_sql(
            "ORDER BY external_id LIMIT $1 OFFSET $2",
        ))
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;
        Self::decode_all(&rows)
    }

    async fn count(&self) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", T::TABLE))
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn insert(&self, record: &T) -> DbResult<()> {
        self.insert_batch(std::slice::from_ref(record)).await
    }

    #[instrument(skip(self, records), fields(table = T::TABLE, count = records.len()))]
    async fn insert_batch(&self, records: &[T]) -> DbResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        for record in records {
            validate_external_id(T::KIND, record.external_id())?;
        }

        let rows_per_statement = (MAX_BIND_PARAMS / T::COLUMNS.len()).max(1);
        let mut tx = self.pool.begin().await?;
        for chunk in records.chunks(rows_per_statement) {
            let mut qb = QueryBuilder::<Postgres>::new(format!(
                "INSERT INTO {} ({}) ",
                T::TABLE,
                T::column_list()
            ));
            qb.push_values(chunk, |mut b, record| record.bind_columns(&mut b));
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, records), fields(table = T::TABLE, count = records.len()))]
    async fn update_batch(&self, records: &[T]) -> DbResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            let mut qb = QueryBuilder::<Postgres>::new(format!(
                "UPDATE {} SET ({}) = (",
                T::TABLE,
                T::column_list()
            ));
            {
                let mut values = qb.separated(", ");
                record.bind_columns(&mut values);
            }
            qb.push(") WHERE external_id = ");
            qb.push_bind(record.external_id().to_string());

            let result = qb.build().execute(&mut *tx).await?;
            if result.rows_affected() == 0 {
                return Err(DbError::NotFound(format!(
                    "{} {}",
                    T::KIND,
                    record.external_id()
                )));
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn external_ids(&self) -> DbResult<HashSet<String>> {
        let rows = sqlx::query(&format!("SELECT external_id FROM {}", T::TABLE))
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("external_id").map_err(DbError::from))
            .collect()
    }

    #[instrument(skip(self, external_ids), fields(table = T::TABLE, count = external_ids.len()))]
    async fn delete_by_external_ids(&self, external_ids: &[String]) -> DbResult<u64> {
        if external_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE external_id = ANY($1)",
            T::TABLE
        ))
        .bind(external_ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// PostgreSQL-backed store for one zone.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> DbResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(DbError::ConnectionFailed)?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> DbResult<()> {
        run_migrations(&self.pool).await
    }

    /// Store handles for the engine.
    #[must_use]
    pub fn stores(&self) -> SyncStores {
        SyncStores {
            locations: Arc::new(PgTable::<Location>::new(self.pool.clone())),
            devices: Arc::new(PgTable::<Device>::new(self.pool.clone())),
            entities: Arc::new(PgTable::<Entity>::new(self.pool.clone())),
            automations: Arc::new(PgTable::<Automation>::new(self.pool.clone())),
            scripts: Arc::new(PgTable::<Script>::new(self.pool.clone())),
            scenes: Arc::new(PgTable::<Scene>::new(self.pool.clone())),
            runs: Arc::new(PgRunStore::new(self.pool.clone())),
        }
    }
}
