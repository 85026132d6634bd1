use std::collections::HashMap;
use std::str::FromStr;

use chrono::Utc;
use snapshot::Snapshot;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::{
    decode_snapshot, encode_snapshot, RunRecord, SnapshotStore, StoreError, BRANCHES_RECORD,
    PRICE_RECORD,
};

pub const INIT_SQL: &str = include_str!("../../../scripts/init_db.sql");

const MEMORY_PREFIX: &str = "sqlite::memory:";

/// Snapshot records plus a run history in one SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)?.create_if_missing(true);
        // Every connection to `sqlite::memory:` opens its own database.
        let pool = if path.starts_with(MEMORY_PREFIX) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };
        run_init_sql(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn recent_runs(&self, limit: i64) -> Result<Vec<RunRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT run_id, app_id, new_branches, updated_branches, deleted_branches, price_event, \
             messages_sent, delivery_failures, error \
             FROM runs ORDER BY recorded_at_ms DESC, rowid DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<RunRecord, StoreError> {
                Ok(RunRecord {
                    run_id: row.try_get("run_id")?,
                    app_id: row.try_get::<i64, _>("app_id")? as u32,
                    new_branches: row.try_get::<i64, _>("new_branches")? as usize,
                    updated_branches: row.try_get::<i64, _>("updated_branches")? as usize,
                    deleted_branches: row.try_get::<i64, _>("deleted_branches")? as usize,
                    price_event: row.try_get("price_event")?,
                    messages_sent: row.try_get::<i64, _>("messages_sent")? as usize,
                    delivery_failures: row.try_get::<i64, _>("delivery_failures")? as usize,
                    error: row.try_get("error")?,
                })
            })
            .collect()
    }
}

impl SnapshotStore for SqliteStore {
    async fn load(&self) -> Result<Snapshot, StoreError> {
        let rows = sqlx::query("SELECT record, payload_json FROM snapshot_records")
            .fetch_all(&self.pool)
            .await?;

        let mut records = HashMap::with_capacity(rows.len());
        for row in rows {
            let record: String = row.try_get("record")?;
            let payload: String = row.try_get("payload_json")?;
            records.insert(record, payload);
        }

        decode_snapshot(
            records.get(BRANCHES_RECORD).map(String::as_str),
            records.get(PRICE_RECORD).map(String::as_str),
        )
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let (branches, price) = encode_snapshot(snapshot)?;
        let ts_ms = Utc::now().timestamp_millis();

        let mut tx = self.pool.begin().await?;
        for (record, payload) in [(BRANCHES_RECORD, branches), (PRICE_RECORD, price)] {
            sqlx::query(
                "INSERT INTO snapshot_records (record, payload_json, updated_at_ms) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(record) DO UPDATE SET payload_json = excluded.payload_json, \
                 updated_at_ms = excluded.updated_at_ms",
            )
            .bind(record)
            .bind(payload)
            .bind(ts_ms)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn record_run(&self, record: &RunRecord) -> Result<(), StoreError> {
        let host = hostname::get()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let ts_ms = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT OR REPLACE INTO runs (run_id, app_id, recorded_at_ms, host, new_branches, \
             updated_branches, deleted_branches, price_event, messages_sent, delivery_failures, error) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(&record.run_id)
        .bind(i64::from(record.app_id))
        .bind(ts_ms)
        .bind(host)
        .bind(record.new_branches as i64)
        .bind(record.updated_branches as i64)
        .bind(record.deleted_branches as i64)
        .bind(record.price_event.as_deref())
        .bind(record.messages_sent as i64)
        .bind(record.delivery_failures as i64)
        .bind(record.error.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub async fn init_sqlite(path: &str) -> Result<SqliteStore, StoreError> {
    let store = SqliteStore::connect(path).await?;
    info!(path = path, "sqlite initialized");
    Ok(store)
}

async fn run_init_sql(pool: &SqlitePool) -> Result<(), StoreError> {
    for statement in INIT_SQL.split(';') {
        let trimmed = statement.trim();
        if trimmed.is_empty() {
            continue;
        }
        sqlx::query(trimmed).execute(pool).await?;
    }
    Ok(())
}
