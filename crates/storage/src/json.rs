use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snapshot::{Branch, PriceRecord, Snapshot};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::{decode_snapshot, malformed, SnapshotStore, StoreError};

pub const STATE_FILE: &str = "state.json";
pub const BRANCHES_FILE: &str = "branches.json";
pub const PRICE_FILE: &str = "price.json";

const STATE_RECORD: &str = "state";
const STAGING_DIR: &str = ".staging";

#[derive(Debug, Serialize, Deserialize)]
struct StoredState {
    #[serde(default)]
    branches: Vec<Branch>,
    #[serde(default)]
    price: PriceRecord,
}

/// Keeps the snapshot in `state.json` inside a state directory.
///
/// Branches and price share one file, so a save replaces both or neither.
/// Directories written by older releases hold `branches.json` and
/// `price.json` instead; those are read until the first save replaces them.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    pub fn branches_path(&self) -> PathBuf {
        self.dir.join(BRANCHES_FILE)
    }

    pub fn price_path(&self) -> PathBuf {
        self.dir.join(PRICE_FILE)
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => Ok(Some(raw)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn decode_state(raw: &str) -> Result<Snapshot, StoreError> {
    let state: StoredState = serde_json::from_str(raw).map_err(|e| malformed(STATE_RECORD, e))?;
    Snapshot::new(state.branches, state.price).map_err(|e| malformed(STATE_RECORD, e))
}

// The temp file lives in a staging dir next to the target so the rename
// never crosses filesystems.
fn write_atomic(dir: &Path, target: &Path, contents: &str) -> io::Result<()> {
    let staging = dir.join(STAGING_DIR);
    std::fs::create_dir_all(&staging)?;
    let mut tmp = NamedTempFile::new_in(&staging)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

fn remove_legacy(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed legacy state file"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "could not remove legacy state file"),
    }
}

impl SnapshotStore for JsonFileStore {
    async fn load(&self) -> Result<Snapshot, StoreError> {
        if let Some(raw) = read_optional(&self.state_path()).await? {
            return decode_state(&raw);
        }
        let branches = read_optional(&self.branches_path()).await?;
        let price = read_optional(&self.price_path()).await?;
        decode_snapshot(branches.as_deref(), price.as_deref())
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let contents = serde_json::to_string(&StoredState {
            branches: snapshot.branches().to_vec(),
            price: *snapshot.price(),
        })?;
        let dir = self.dir.clone();
        let target = self.state_path();
        let legacy = [self.branches_path(), self.price_path()];

        tokio::task::spawn_blocking(move || -> io::Result<()> {
            std::fs::create_dir_all(&dir)?;
            write_atomic(&dir, &target, &contents)?;
            // state.json wins on load, so stale legacy files are only clutter.
            legacy.iter().for_each(|path| remove_legacy(path));
            Ok(())
        })
        .await??;

        debug!(dir = %self.dir.display(), branches = snapshot.branches().len(), "snapshot saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapshot::BuildId;

    fn snapshot_a() -> Snapshot {
        Snapshot::new(
            vec![
                Branch::new("public", 100, BuildId::new(1)),
                Branch::new("beta", 90, BuildId::new(2)),
            ],
            PriceRecord::new(1000, 1000, 0),
        )
        .expect("unique")
    }

    fn snapshot_b() -> Snapshot {
        Snapshot::new(
            vec![Branch::new("public", 200, BuildId::new(3))],
            PriceRecord::new(1000, 800, 20),
        )
        .expect("unique")
    }

    #[tokio::test]
    async fn first_load_is_empty_and_creates_nothing() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = JsonFileStore::new(dir.path());

        let snapshot = store.load().await.expect("empty state loads");
        assert!(snapshot.is_empty());
        assert!(!store.state_path().exists());
        assert!(!store.branches_path().exists());
        assert!(!store.price_path().exists());
    }

    #[tokio::test]
    async fn save_replaces_previous_content() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = JsonFileStore::new(dir.path().join("state"));

        store.save(&snapshot_a()).await.expect("first save");
        store.save(&snapshot_b()).await.expect("second save");

        assert_eq!(store.load().await.expect("reload"), snapshot_b());

        let leftovers: Vec<_> = std::fs::read_dir(store.dir())
            .expect("state dir exists")
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name != STATE_FILE && name != STAGING_DIR)
            .collect();
        assert!(leftovers.is_empty(), "unexpected files left behind: {leftovers:?}");
        let staged = std::fs::read_dir(store.dir().join(STAGING_DIR))
            .expect("staging dir exists")
            .count();
        assert_eq!(staged, 0, "temp files left in staging");
    }

    #[tokio::test]
    async fn failed_save_keeps_previous_snapshot_whole() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = JsonFileStore::new(dir.path());
        store.save(&snapshot_a()).await.expect("first save");

        // A plain file where the staging dir belongs makes the write fail.
        std::fs::remove_dir_all(dir.path().join(STAGING_DIR)).expect("clear staging");
        std::fs::write(dir.path().join(STAGING_DIR), "blocker").expect("write blocker");

        store
            .save(&snapshot_b())
            .await
            .expect_err("save must fail without a staging dir");
        assert_eq!(store.load().await.expect("reload"), snapshot_a());
    }

    #[tokio::test]
    async fn unwritable_legacy_price_path_does_not_split_the_snapshot() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = JsonFileStore::new(dir.path());
        store.save(&snapshot_a()).await.expect("first save");

        let blocked = store.price_path();
        std::fs::create_dir(&blocked).expect("dir in place of price.json");
        std::fs::write(blocked.join("keep"), "x").expect("make it non-empty");

        store.save(&snapshot_b()).await.expect("second save");
        let loaded = store.load().await.expect("reload");
        assert_eq!(loaded, snapshot_b());
        assert_eq!(loaded.price(), snapshot_b().price());
    }

    #[tokio::test]
    async fn reads_legacy_state_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(
            dir.path().join(BRANCHES_FILE),
            r#"[{"branchName":"public","timeUpdated":1700000000,"description":"","buildId":123,"pwdRequired":0}]"#,
        )
        .expect("write branches");
        std::fs::write(
            dir.path().join(PRICE_FILE),
            r#"{"initialPrice":2499,"currentPrice":2499,"discountPercent":0}"#,
        )
        .expect("write price");

        let snapshot = JsonFileStore::new(dir.path()).load().await.expect("legacy loads");
        assert_eq!(
            snapshot.branches(),
            &[Branch::new("public", 1_700_000_000, BuildId::new(123))]
        );
        assert_eq!(snapshot.price(), &PriceRecord::new(2499, 2499, 0));
    }

    #[tokio::test]
    async fn save_migrates_legacy_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(dir.path().join(BRANCHES_FILE), "[]").expect("write branches");
        std::fs::write(
            dir.path().join(PRICE_FILE),
            r#"{"initialPrice":2499,"currentPrice":2499,"discountPercent":0}"#,
        )
        .expect("write price");

        let store = JsonFileStore::new(dir.path());
        store.save(&snapshot_b()).await.expect("save");

        assert!(store.state_path().exists());
        assert!(!store.branches_path().exists());
        assert!(!store.price_path().exists());
        assert_eq!(store.load().await.expect("reload"), snapshot_b());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(dir.path().join(BRANCHES_FILE), "{ truncated").expect("write");

        let err = JsonFileStore::new(dir.path())
            .load()
            .await
            .expect_err("corrupt state must not load");
        assert!(matches!(err, StoreError::MalformedSnapshot { .. }));
    }

    #[tokio::test]
    async fn duplicate_branches_in_state_file_are_malformed() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(
            dir.path().join(STATE_FILE),
            r#"{"branches":[{"branchName":"beta","timeUpdated":1},{"branchName":"beta","timeUpdated":2}]}"#,
        )
        .expect("write");

        let err = JsonFileStore::new(dir.path())
            .load()
            .await
            .expect_err("duplicates must not load");
        assert!(matches!(
            err,
            StoreError::MalformedSnapshot {
                record: STATE_RECORD,
                ..
            }
        ));
    }
}
