//! docsnap - snapshot a hierarchical document store as JSON
//!
//! # Usage
//!
//! ```bash
//! # Export a MongoDB database whose collection names encode the tree
//! docsnap mongodb://localhost:27017/shop -j 64 -o snapshot.json
//!
//! # Dry run against a JSON description of a store
//! docsnap --from-json store.json --compact
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use docsnap::cli::CliInterface;
use docsnap::connection::ConnectionManager;
use docsnap::error::{DocsnapError, ExportError, Result};
use docsnap::export::{Exporter, ProgressTracker, write_record};
use docsnap::store::{DocumentStore, MemoryStore, MongoStore};

/// Application entry point
#[tokio::main]
async fn main() {
    match run().await {
        Ok(()) => {}
        // interrupted by the user: no output, clean exit
        Err(e) if e.is_cancelled() => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Handle subcommands or run the export
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli);

    if cli.handle_subcommand().await? {
        return Ok(());
    }

    cli.config().validate()?;

    let cancel = CancellationToken::new();
    let signals = spawn_signal_listener(cancel.clone());
    let result = run_export(&cli, &cancel).await;
    signals.abort();
    result
}

/// Open the store, export it, and write the snapshot
async fn run_export(cli: &CliInterface, cancel: &CancellationToken) -> Result<()> {
    let config = cli.config();

    let mut manager = None;
    let store: Arc<dyn DocumentStore> = match &cli.args().from_json {
        Some(path) => Arc::new(load_json_store(path).await?),
        None => {
            info!(uri = %cli.sanitized_uri(), database = %config.store.database, "connecting");
            let mut connection = ConnectionManager::new(config.store.clone());
            until_cancelled(cancel, connection.connect()).await??;
            let store = MongoStore::new(connection.database()?);
            manager = Some(connection);
            Arc::new(store)
        }
    };

    let progress = Arc::new(ProgressTracker::new(config.export.progress));
    let exporter = Exporter::new(store, config.export.max_concurrency).with_progress(progress);
    let result = exporter.export_all(cancel).await;

    if let Some(mut connection) = manager {
        connection.disconnect().await?;
    }

    let snapshot = result?;
    write_record(&snapshot, &cli.output_options(), cli.args().output.as_deref()).await
}

/// Build an in-memory store from a JSON description file
async fn load_json_store(path: &Path) -> Result<MemoryStore> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        DocsnapError::Generic(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let description: serde_json::Value = serde_json::from_str(&content)?;
    Ok(MemoryStore::from_json(&description)?)
}

/// Run `work` unless `cancel` fires first
async fn until_cancelled<T>(cancel: &CancellationToken, work: impl Future<Output = T>) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ExportError::Cancelled.into()),
        out = work => Ok(out),
    }
}

/// Cancel `cancel` on SIGINT (Ctrl+C) or SIGTERM
fn spawn_signal_listener(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl+c");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "failed to register SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("sigint (ctrl+c) received, cancelling export"),
            _ = terminate => info!("sigterm received, cancelling export"),
        }

        cancel.cancel();
    })
}

/// Initialize logging system based on verbosity level
///
/// Logs go to stderr; stdout carries the snapshot.
fn initialize_logging(cli: &CliInterface) {
    let level = cli.config().logging.level.to_tracing_level();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
