//! Core mirroring logic: sync-worker and migrator algorithms, the scheduler
//! that drives them, and the shared error/config types.

pub mod config;
pub mod errors;
pub mod large_object;
pub mod migrator;
pub mod scheduler;
pub mod sync_worker;

pub use config::{MigrationConfig, MirrorConfig, RemoteProtocol, SyncConfig};
pub use errors::CoreError;
pub use migrator::Migrator;
pub use scheduler::Scheduler;
pub use sync_worker::SyncWorker;
