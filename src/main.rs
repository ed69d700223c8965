//! Shelfkeeper host
//!
//! Opens (and if needed migrates) a library directory, reports what it holds,
//! and keeps the store service and highlight autosaver running until
//! interrupted.

use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shelfkeeper::features::HighlightAutosaver;
use shelfkeeper::{Config, DocumentManager, ListFilter, StoreService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shelfkeeper=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting Shelfkeeper v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Data directory: {}", config.storage.data_dir.display());

    let (store, migration) = StoreService::start(&config.storage).await;
    tracing::info!("Migration: {}", migration);

    let manager = DocumentManager::open(store.clone()).await;
    tracing::info!(
        documents = manager.count(ListFilter::All),
        favorites = manager.count(ListFilter::Favorite),
        "Library ready"
    );
    for record in manager.list(ListFilter::All) {
        tracing::debug!(
            path = %record.path,
            name = %record.name,
            favorite = record.is_favorite,
            "Document"
        );
    }

    let autosaver = HighlightAutosaver::spawn(manager.clone(), config.autosave.window());

    shutdown_signal().await;

    autosaver.close().await;
    store.shutdown().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
