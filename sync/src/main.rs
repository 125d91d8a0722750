//! Tasklane sync client.
//!
//! `tasklane-sync sync` runs one full sync and exits. `tasklane-sync watch`
//! (the default) runs one full sync, then keeps pulling remote changes in
//! the background until Ctrl-C.

use std::sync::Arc;
use tasklane_engine::SystemClock;
use tasklane_sync::{
    spawn_poller, Config, DropboxStore, FileStore, SyncController, SyncEvent, SyncResult,
};
use tokio::sync::{watch, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Sync,
    Watch,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tasklane_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mode = match std::env::args().nth(1).as_deref() {
        None | Some("watch") => Mode::Watch,
        Some("sync") => Mode::Sync,
        Some(other) => {
            eprintln!("usage: tasklane-sync [sync|watch] (got '{other}')");
            std::process::exit(2);
        }
    };

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(data_dir = %config.data_dir.display(), remote = %config.remote_path, "Starting Tasklane sync");

    let local = FileStore::open(&config.data_dir)?;
    let remote = DropboxStore::from_config(&config)?;
    let (mut controller, _) =
        SyncController::open(local, remote, &config.remote_path, Box::new(SystemClock))?;

    if let Some(token) = &config.access_token {
        controller.authenticate(token.clone())?;
    }
    if !controller.is_authenticated() {
        tracing::warn!("No access token; set TASKLANE_ACCESS_TOKEN to connect");
        return Ok(());
    }

    let mut events = controller.events();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SyncEvent::Merged(report) => tracing::info!(
                    from_remote = report.from_remote,
                    suppressed = report.suppressed.len(),
                    "Remote changes applied"
                ),
                SyncEvent::Uploaded { modified_at } => {
                    tracing::info!(%modified_at, "Remote updated")
                }
                SyncEvent::ReconnectRequired => {
                    tracing::warn!("Access token expired; reconnect to keep syncing")
                }
                SyncEvent::Failed(msg) => tracing::warn!(error = %msg, "Sync failed"),
            }
        }
    });

    match controller.full_sync().await {
        SyncResult::Synced(report) => tracing::info!(
            tasks = controller.repository().snapshot().task_count(),
            from_remote = report.from_remote,
            "Sync complete"
        ),
        SyncResult::Initialized => tracing::info!("Remote snapshot created"),
        SyncResult::Failed(e) => tracing::error!(error = %e, "Initial sync failed"),
    }

    if mode == Mode::Sync || !controller.is_authenticated() {
        return Ok(());
    }

    let interval = config.poll_interval;
    let shared = Arc::new(Mutex::new(controller));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut poller = spawn_poller(shared, interval, shutdown_rx);

    let exit = tokio::select! {
        exit = &mut poller => exit?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
            shutdown_tx.send(true).ok();
            poller.await?
        }
    };
    tracing::info!(?exit, "Poller stopped");

    Ok(())
}
