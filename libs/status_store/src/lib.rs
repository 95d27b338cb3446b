//! Durable per-container status persistence for sync progress and migration
//! cursors (§3 `StatusRecord`, §6 "Persisted state layout").

pub mod record;
pub mod store;

pub use record::{MigrationStatus, SyncStatus, SyncStatusEntry};
pub use store::{StatusStore, StatusStoreError};
