//! Persistence of the last-known snapshot.
//!
//! Two records are kept: the branch list and the price record. Either one
//! falls back to its empty default when it has never been written. A record that exists but cannot be decoded is an
//! error, never silently replaced by the default.

use std::future::Future;

use snapshot::{Branch, PriceRecord, Snapshot};
use thiserror::Error;

mod json;
mod memory;
mod sqlite;

pub use json::JsonFileStore;
pub use memory::MemoryStore;
pub use sqlite::{init_sqlite, SqliteStore, INIT_SQL};

pub const BRANCHES_RECORD: &str = "branches";
pub const PRICE_RECORD: &str = "price";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("stored {record} record is malformed: {source}")]
    MalformedSnapshot {
        record: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("snapshot store i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("background write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Outcome of one watcher run, kept by stores that track history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub run_id: String,
    pub app_id: u32,
    pub new_branches: usize,
    pub updated_branches: usize,
    pub deleted_branches: usize,
    pub price_event: Option<String>,
    pub messages_sent: usize,
    pub delivery_failures: usize,
    pub error: Option<String>,
}

impl RunRecord {
    pub fn failed(run_id: impl Into<String>, app_id: u32, error: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            app_id,
            new_branches: 0,
            updated_branches: 0,
            deleted_branches: 0,
            price_event: None,
            messages_sent: 0,
            delivery_failures: 0,
            error: Some(error.into()),
        }
    }
}

pub trait SnapshotStore {
    /// Last saved snapshot, or the empty default on the first run.
    fn load(&self) -> impl Future<Output = Result<Snapshot, StoreError>> + Send;

    /// Replaces the stored snapshot. A following `load` sees either the
    /// old or the new snapshot as a whole, never a mix of the two.
    fn save(&self, snapshot: &Snapshot) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn record_run(&self, _record: &RunRecord) -> impl Future<Output = Result<(), StoreError>> + Send {
        async { Ok(()) }
    }
}

pub(crate) fn decode_snapshot(
    branches_json: Option<&str>,
    price_json: Option<&str>,
) -> Result<Snapshot, StoreError> {
    let branches: Vec<Branch> = match branches_json {
        Some(raw) => serde_json::from_str(raw).map_err(|e| malformed(BRANCHES_RECORD, e))?,
        None => Vec::new(),
    };
    let price: PriceRecord = match price_json {
        Some(raw) => serde_json::from_str(raw).map_err(|e| malformed(PRICE_RECORD, e))?,
        None => PriceRecord::default(),
    };
    Snapshot::new(branches, price).map_err(|e| malformed(BRANCHES_RECORD, e))
}

pub(crate) fn encode_snapshot(snapshot: &Snapshot) -> Result<(String, String), StoreError> {
    Ok((
        serde_json::to_string(snapshot.branches())?,
        serde_json::to_string(snapshot.price())?,
    ))
}

pub(crate) fn malformed(
    record: &'static str,
    source: impl std::error::Error + Send + Sync + 'static,
) -> StoreError {
    StoreError::MalformedSnapshot {
        record,
        source: Box::new(source),
    }
}
