//! One watcher run: fetch, load, diff, save, compose, deliver.

use anyhow::{Context, Result};
use diff::{diff, ChangeSet};
use notify::{Composer, Delivery, Message};
use snapshot::Snapshot;
use storage::{RunRecord, SnapshotStore};
use tracing::{info, warn};
use uuid::Uuid;
use venue_steam::MetadataSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: String,
    pub app_id: u32,
    pub changes: ChangeSet,
    pub branch_messages: usize,
    pub price_messages: usize,
    pub messages_sent: usize,
    pub delivery_failures: usize,
}

impl RunReport {
    pub fn record(&self) -> RunRecord {
        RunRecord {
            run_id: self.run_id.clone(),
            app_id: self.app_id,
            new_branches: self.changes.new_branches.len(),
            updated_branches: self.changes.updated_branches.len(),
            deleted_branches: self.changes.deleted_branches.len(),
            price_event: self.changes.price_change.map(|e| e.kind().to_string()),
            messages_sent: self.messages_sent,
            delivery_failures: self.delivery_failures,
            error: None,
        }
    }
}

pub struct Watcher<F, S, D> {
    app_id: u32,
    source: F,
    store: S,
    delivery: D,
}

impl<F, S, D> Watcher<F, S, D>
where
    F: MetadataSource,
    S: SnapshotStore,
    D: Delivery,
{
    pub fn new(app_id: u32, source: F, store: S, delivery: D) -> Self {
        Self {
            app_id,
            source,
            store,
            delivery,
        }
    }

    /// Runs the pipeline once and records the outcome in the store. The
    /// snapshot is saved before any message goes out, so a failed delivery
    /// is not retried by the next run.
    pub async fn run_once(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4().to_string();
        let outcome = self.execute(&run_id).await;

        let record = match &outcome {
            Ok(report) => report.record(),
            Err(err) => RunRecord::failed(&run_id, self.app_id, format!("{err:#}")),
        };
        if let Err(err) = self.store.record_run(&record).await {
            warn!(%run_id, error = ?err, "failed to record run");
        }

        outcome
    }

    async fn execute(&self, run_id: &str) -> Result<RunReport> {
        let metadata = self
            .source
            .fetch(self.app_id)
            .await
            .with_context(|| format!("fetching metadata for app {}", self.app_id))?;
        info!(
            %run_id,
            app_id = self.app_id,
            branches = metadata.branches.len(),
            has_price = metadata.price.is_some(),
            "metadata received"
        );

        let previous = self
            .store
            .load()
            .await
            .context("loading previous snapshot")?;

        // Without a listed price the previous record is carried over whole.
        let price = metadata.price.unwrap_or(*previous.price());
        let current =
            Snapshot::new(metadata.branches, price).context("building current snapshot")?;

        let changes = diff(&previous, &current);
        self.store
            .save(&current)
            .await
            .context("saving current snapshot")?;

        if changes.has_branch_changes() {
            info!(
                %run_id,
                new = changes.new_branches.len(),
                deleted = changes.deleted_branches.len(),
                updated = changes.updated_branches.len(),
                "found branch changes"
            );
        }
        if let Some(event) = &changes.price_change {
            info!(%run_id, kind = event.kind(), "found price change");
        }

        let composer = Composer::new(metadata.name);
        let branch_messages = composer.branch_messages(&changes);
        let price_messages = composer.price_messages(&changes);

        let (mut sent, mut failed) = self.deliver_all(run_id, &branch_messages).await;
        let (price_sent, price_failed) = self.deliver_all(run_id, &price_messages).await;
        sent += price_sent;
        failed += price_failed;

        info!(%run_id, sent, failed, "run complete");
        Ok(RunReport {
            run_id: run_id.to_string(),
            app_id: self.app_id,
            branch_messages: branch_messages.len(),
            price_messages: price_messages.len(),
            changes,
            messages_sent: sent,
            delivery_failures: failed,
        })
    }

    async fn deliver_all(&self, run_id: &str, messages: &[Message]) -> (usize, usize) {
        let mut sent = 0;
        let mut failed = 0;
        for (idx, message) in messages.iter().enumerate() {
            match self.delivery.deliver(message).await {
                Ok(()) => sent += 1,
                Err(err) => {
                    failed += 1;
                    warn!(%run_id, message = idx, error = %err, "message delivery failed");
                }
            }
        }
        (sent, failed)
    }
}
