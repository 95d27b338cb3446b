//! Entry point (§6 "Invocation"): parses CLI flags, loads the mirror config,
//! wires up sync workers and migrators, and runs the scheduler to completion
//! or forever.

mod change_stream_stub;
mod config_loader;
mod logging;
mod provider_factory;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use local_store::{LocalStoreClient, LocalStoreConfig};
use status_store::StatusStore;
use sync_core::config::MirrorConfig;
use sync_core::migrator::Migrator;
use sync_core::scheduler::{MigrationTask, RunMode, Scheduler, SyncTask};
use sync_core::sync_worker::SyncWorker;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Mirrors objects between the native store and a remote bucket, in sync
/// (outbound) and migration (inbound) modes, driven by a config file.
#[derive(Parser, Debug)]
#[command(name = "mirror-daemon", version)]
struct Args {
    /// Path to the mirror config file (JSON or TOML, selected by extension).
    #[arg(long)]
    config: PathBuf,

    /// Run exactly one pass over every container/migration, then exit.
    #[arg(long)]
    once: bool,

    /// Log level: one of debug, info, warning, error.
    #[arg(long)]
    log_level: Option<String>,

    /// Log to stdout instead of the configured log file.
    #[arg(long)]
    console: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = config_loader::load(&args.config).with_context(|| format!("loading config from {}", args.config.display()))?;

    let log_level = args.log_level.as_deref().unwrap_or(&config.log_level);
    logging::init(args.console, config.log_file.as_deref(), log_level).context("initializing logging")?;

    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    runtime.block_on(run(config, args.once))
}

async fn run(config: MirrorConfig, once: bool) -> anyhow::Result<()> {
    let status = Arc::new(StatusStore::new(config.status_dir.clone()));
    let local = Arc::new(LocalStoreClient::new(LocalStoreConfig {
        endpoint: config.local_store_endpoint.clone(),
        auth_token: config.local_store_auth_token.clone(),
    }));

    let mut sync_tasks = Vec::new();
    for sync_config in &config.containers {
        if sync_config.is_wildcard_container() {
            warn!(account = %sync_config.account, "wildcard container (/*) entries are not expanded in this build, skipping");
            continue;
        }
        let remote = Arc::new(provider_factory::build(sync_config).await);
        let worker = SyncWorker {
            local: local.clone(),
            remote,
            local_account: sync_config.account.clone(),
            local_container: sync_config.container.clone(),
            custom_prefix: sync_config.custom_prefix.clone(),
        };
        sync_tasks.push(SyncTask {
            worker,
            reader: Arc::new(change_stream_stub::NoChangeStream),
            db_id: sync_config.account.clone(),
            aws_bucket: sync_config.aws_bucket.clone(),
            status: status.clone(),
            local_account: sync_config.account.clone(),
            local_container: sync_config.container.clone(),
            max_rows_per_batch: config.items_chunk,
        });
    }

    let mut migration_tasks = Vec::new();
    for migration_config in &config.migrations {
        let remote = Arc::new(provider_factory::build(&migration_config.sync).await);
        let migrator = Migrator {
            local: local.clone(),
            remote,
            status: status.clone(),
            local_account: migration_config.sync.account.clone(),
            local_container: migration_config.sync.container.clone(),
            items_chunk: migration_config.items_chunk,
        };
        migration_tasks.push(MigrationTask {
            migrator,
            account: migration_config.sync.account.clone(),
            container: migration_config.sync.container.clone(),
        });
    }

    info!(sync_tasks = sync_tasks.len(), migration_tasks = migration_tasks.len(), once, "starting scheduler");

    let shutdown = CancellationToken::new();
    let shutdown_for_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt, requesting graceful shutdown");
            shutdown_for_signal.cancel();
        }
    });

    let run_mode = if once {
        RunMode::Once
    } else {
        RunMode::Forever { poll_interval: Duration::from_secs(30) }
    };

    let scheduler = Scheduler { sync_tasks, migration_tasks, run_mode, shutdown };
    scheduler.run(now_unix_secs).await.context("scheduler run failed")?;
    Ok(())
}

fn now_unix_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
