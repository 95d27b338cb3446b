//! Drives sync workers and migrators to completion, either once or forever
//! with a bounded sleep between passes (§4.4 "Scheduler").

use std::sync::Arc;
use std::time::Duration;

use change_stream::ChangeStreamReader;
use status_store::StatusStore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::errors::CoreError;
use crate::migrator::Migrator;
use crate::sync_worker::SyncWorker;

#[derive(Debug, Clone, Copy)]
pub enum RunMode {
    /// Drain every sync task's backlog and run one migration pass each, then stop.
    Once,
    /// Keep running, sleeping `poll_interval` between passes that found no work.
    Forever { poll_interval: Duration },
}

/// One (source-database-id, local container) -> remote bucket sync assignment,
/// plus everything needed to checkpoint its progress.
pub struct SyncTask {
    pub worker: SyncWorker,
    pub reader: Arc<dyn ChangeStreamReader>,
    pub db_id: String,
    pub aws_bucket: String,
    pub status: Arc<StatusStore>,
    pub local_account: String,
    pub local_container: String,
    pub max_rows_per_batch: usize,
}

impl SyncTask {
    /// Applies every row currently available past the persisted checkpoint,
    /// in order, saving the checkpoint after each successfully applied row.
    /// Returns the number of rows applied.
    async fn drain_once(&self) -> Result<u64, CoreError> {
        let (mut status, legacy_last_row) = self.status.load_sync_status(&self.local_account, &self.local_container).await?;
        let mut since_row = status.last_row(&self.db_id, &self.aws_bucket);
        if since_row == 0 {
            if let Some(legacy) = legacy_last_row {
                since_row = legacy;
            }
        }

        let mut applied = 0u64;
        loop {
            let batch = self.reader.next_batch(&self.db_id, since_row, self.max_rows_per_batch).await?;
            if batch.is_empty() {
                break;
            }
            for row in &batch {
                self.worker.apply_row(row).await?;
                since_row = row.row_id;
                status.record(&self.db_id, since_row, &self.aws_bucket);
                self.status.save_sync_status(&self.local_account, &self.local_container, &status).await?;
                applied += 1;
            }
            if batch.len() < self.max_rows_per_batch {
                break;
            }
        }
        Ok(applied)
    }
}

/// One migration entry's pass loop state.
pub struct MigrationTask {
    pub migrator: Migrator,
    pub account: String,
    pub container: String,
}

pub struct Scheduler {
    pub sync_tasks: Vec<SyncTask>,
    pub migration_tasks: Vec<MigrationTask>,
    pub run_mode: RunMode,
    pub shutdown: CancellationToken,
}

impl Scheduler {
    pub async fn run(&self, now_unix_secs: impl Fn() -> i64 + Send + Sync) -> Result<(), CoreError> {
        match self.run_mode {
            RunMode::Once => self.run_once(&now_unix_secs).await,
            RunMode::Forever { poll_interval } => self.run_forever(poll_interval, &now_unix_secs).await,
        }
    }

    async fn run_once(&self, now_unix_secs: &(impl Fn() -> i64 + Send + Sync)) -> Result<(), CoreError> {
        for task in &self.sync_tasks {
            self.run_sync_task_once(task).await?;
        }
        for task in &self.migration_tasks {
            self.run_migration_task_once(task, now_unix_secs()).await?;
        }
        Ok(())
    }

    async fn run_forever(&self, poll_interval: Duration, now_unix_secs: &(impl Fn() -> i64 + Send + Sync)) -> Result<(), CoreError> {
        loop {
            if self.shutdown.is_cancelled() {
                info!("shutdown requested, stopping between passes");
                return Ok(());
            }

            let mut did_work = false;
            for task in &self.sync_tasks {
                match self.run_sync_task_once(task).await {
                    Ok(applied) => did_work |= applied > 0,
                    Err(err) if err.is_consistency() => return Err(err),
                    Err(err) => warn!(db_id = %task.db_id, error = %err, "sync pass failed, will retry next cycle"),
                }
            }
            for task in &self.migration_tasks {
                match self.run_migration_task_once(task, now_unix_secs()).await {
                    Ok(moved) => did_work |= moved > 0,
                    Err(err) if err.is_consistency() => return Err(err),
                    Err(err) => warn!(account = %task.account, container = %task.container, error = %err, "migration pass failed, will retry next cycle"),
                }
            }

            if !did_work {
                tokio::select! {
                    _ = sleep(poll_interval) => {}
                    _ = self.shutdown.cancelled() => {
                        info!("shutdown requested during idle sleep");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn run_sync_task_once(&self, task: &SyncTask) -> Result<u64, CoreError> {
        let span = info_span!("sync_task", db_id = %task.db_id, account = %task.local_account, container = %task.local_container);
        task.drain_once().instrument(span).await
    }

    async fn run_migration_task_once(&self, task: &MigrationTask, now_unix_secs: i64) -> Result<u64, CoreError> {
        let span = info_span!("migration_task", account = %task.account, container = %task.container);
        let summary = task.migrator.run_pass(now_unix_secs).instrument(span).await?;
        Ok(summary.moved_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use change_stream::{ChangeRow, ChangeStreamError};
    use local_store::{LocalStoreClient, LocalStoreConfig};
    use remote_storage::{NativeProvider, RemoteProvider};
    use remote_storage::native_provider::NativeProviderConfig;

    struct EmptyReader;

    #[async_trait::async_trait]
    impl ChangeStreamReader for EmptyReader {
        async fn next_batch(&self, _db_id: &str, _since_row: u64, _max_rows: usize) -> Result<Vec<ChangeRow>, ChangeStreamError> {
            Ok(Vec::new())
        }
    }

    fn task(status: Arc<StatusStore>) -> SyncTask {
        let local = Arc::new(LocalStoreClient::new(LocalStoreConfig {
            endpoint: "http://local.example".into(),
            auth_token: "tok".into(),
        }));
        let remote = Arc::new(RemoteProvider::Native(NativeProvider::new(NativeProviderConfig {
            endpoint: "http://peer.example".into(),
            account: "acct".into(),
            container: "cont".into(),
            auth_token: "tok".into(),
        })));
        SyncTask {
            worker: SyncWorker {
                local,
                remote,
                local_account: "acct".into(),
                local_container: "cont".into(),
                custom_prefix: None,
            },
            reader: Arc::new(EmptyReader),
            db_id: "db-1".into(),
            aws_bucket: "bucket".into(),
            status,
            local_account: "acct".into(),
            local_container: "cont".into(),
            max_rows_per_batch: 100,
        }
    }

    #[tokio::test]
    async fn drain_once_is_a_noop_with_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        let status = Arc::new(StatusStore::new(dir.path()));
        let task = task(status);
        let applied = task.drain_once().await.unwrap();
        assert_eq!(applied, 0);
    }
}
