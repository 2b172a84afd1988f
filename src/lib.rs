pub mod core;

use std::time::Duration;

use tokio::time::MissedTickBehavior;

pub use crate::core::api::{create_router, AppState};
pub use crate::core::config::{FeedConfig, ServerConfig};
pub use crate::core::ingest::{IngestError, IngestReport, Ingestor};
pub use crate::core::storage::{PostRepository, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("server io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Performs a single ingestion run against the database at `database_url`.
pub async fn run_ingest(database_url: &str, feed: FeedConfig) -> Result<IngestReport, IngestError> {
    let repository = PostRepository::connect(database_url).await?;
    let ingestor = Ingestor::new(feed, repository)?;
    ingestor.run().await
}

/// Serves the posts API until Ctrl-C, optionally ingesting in the background.
pub async fn run_server(
    database_url: &str,
    feed: FeedConfig,
    server: ServerConfig,
) -> Result<(), ServeError> {
    let repository = PostRepository::connect(database_url).await?;

    if let Some(interval) = server.ingest_interval {
        let ingestor = Ingestor::new(feed, repository.clone())?;
        tokio::spawn(ingest_periodically(ingestor, interval));
    }

    let app = create_router(AppState::new(repository, &server.api_token));
    let listener = tokio::net::TcpListener::bind(server.bind).await?;
    tracing::info!(address = %listener.local_addr()?, "posts api listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Runs never overlap: the next tick waits for the current run to finish.
async fn ingest_periodically(ingestor: Ingestor, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(error) = ingestor.run().await {
            tracing::error!(%error, "background ingestion failed");
        }
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
