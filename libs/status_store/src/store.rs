//! Durable persistence for [`SyncStatus`] and [`MigrationStatus`] documents
//! (§6 "Persisted state layout"): `<status_dir>/<account>/<container>` for
//! sync progress, `<status_dir>/<account>/<container>.migrator` for
//! migration cursors. Every write goes to a sibling temp file and is renamed
//! into place, so a concurrent reader always observes either the old or the
//! new document, never a partial one (§5 "Shared resources").

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::record::{MigrationStatus, SyncStatus};

#[derive(Debug, Error)]
pub enum StatusStoreError {
    #[error("failed to read status document at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write status document at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("status document at {path} is not valid JSON: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub struct StatusStore {
    root: PathBuf,
}

impl StatusStore {
    pub fn new(status_dir: impl Into<PathBuf>) -> Self {
        Self { root: status_dir.into() }
    }

    fn sync_path(&self, account: &str, container: &str) -> PathBuf {
        self.root.join(account).join(container)
    }

    fn migrator_path(&self, account: &str, container: &str) -> PathBuf {
        self.root.join(account).join(format!("{container}.migrator"))
    }

    /// Reads the sync status document, returning the legacy `{last_row: N}`
    /// value separately when the document predates per-db-id tracking (the
    /// caller decides how to fold it into its own lookup for this db-id).
    pub async fn load_sync_status(&self, account: &str, container: &str) -> Result<(SyncStatus, Option<u64>), StatusStoreError> {
        let path = self.sync_path(account, container);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let value: serde_json::Value =
                    serde_json::from_slice(&bytes).map_err(|source| StatusStoreError::Malformed { path: path.clone(), source })?;
                Ok(SyncStatus::from_json(&value))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok((SyncStatus::default(), None)),
            Err(source) => Err(StatusStoreError::Read { path, source }),
        }
    }

    pub async fn save_sync_status(&self, account: &str, container: &str, status: &SyncStatus) -> Result<(), StatusStoreError> {
        let path = self.sync_path(account, container);
        write_json_atomic(&path, &status.to_json()).await
    }

    pub async fn load_migration_status(&self, account: &str, container: &str) -> Result<MigrationStatus, StatusStoreError> {
        let path = self.migrator_path(account, container);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| StatusStoreError::Malformed { path, source })
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(MigrationStatus::default()),
            Err(source) => Err(StatusStoreError::Read { path, source }),
        }
    }

    pub async fn save_migration_status(&self, account: &str, container: &str, status: &MigrationStatus) -> Result<(), StatusStoreError> {
        let path = self.migrator_path(account, container);
        let value = serde_json::to_value(status).expect("MigrationStatus always serializes");
        write_json_atomic(&path, &value).await
    }
}

async fn write_json_atomic(path: &Path, value: &serde_json::Value) -> Result<(), StatusStoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| StatusStoreError::Write { path: path.to_path_buf(), source })?;
    }
    let bytes = serde_json::to_vec_pretty(value).expect("serde_json::Value always serializes");
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, &bytes)
        .await
        .map_err(|source| StatusStoreError::Write { path: tmp_path.clone(), source })?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|source| StatusStoreError::Write { path: path.to_path_buf(), source })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_sync_status() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatusStore::new(dir.path());
        let mut status = SyncStatus::default();
        status.record("db-1", 7, "bucket-a");
        store.save_sync_status("acct", "cont", &status).await.unwrap();

        let (loaded, legacy) = store.load_sync_status("acct", "cont").await.unwrap();
        assert_eq!(legacy, None);
        assert_eq!(loaded.last_row("db-1", "bucket-a"), 7);
    }

    #[tokio::test]
    async fn missing_sync_status_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatusStore::new(dir.path());
        let (loaded, legacy) = store.load_sync_status("acct", "cont").await.unwrap();
        assert!(loaded.entries.is_empty());
        assert_eq!(legacy, None);
    }

    #[tokio::test]
    async fn reads_legacy_document_written_by_hand() {
        let dir = tempfile::tempdir().unwrap();
        let account_dir = dir.path().join("acct");
        tokio::fs::create_dir_all(&account_dir).await.unwrap();
        tokio::fs::write(account_dir.join("cont"), br#"{"last_row": 99}"#).await.unwrap();

        let store = StatusStore::new(dir.path());
        let (loaded, legacy) = store.load_sync_status("acct", "cont").await.unwrap();
        assert!(loaded.entries.is_empty());
        assert_eq!(legacy, Some(99));
    }

    #[tokio::test]
    async fn migrator_cursor_persists_separately_from_sync_status() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatusStore::new(dir.path());
        let mut migration = MigrationStatus::default();
        migration.advance(Some("marker-1".to_string()), 2, 4, false, 123);
        store.save_migration_status("acct", "cont", &migration).await.unwrap();

        let loaded = store.load_migration_status("acct", "cont").await.unwrap();
        assert_eq!(loaded.marker.as_deref(), Some("marker-1"));

        let (sync_status, _) = store.load_sync_status("acct", "cont").await.unwrap();
        assert!(sync_status.entries.is_empty());
    }
}
