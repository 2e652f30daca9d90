use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rendezvous::dispatch::{Dispatcher, LoggingChatProvisioner, LoggingNotifier};
use rendezvous::persistence::{self, PersistedEngagements};
use rendezvous::server::{AppState, build_router};
use rendezvous::store::EngagementStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rendezvous=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let snapshot_path = PathBuf::from(
        std::env::var("RENDEZVOUS_SNAPSHOT")
            .unwrap_or_else(|_| "data/engagements.json".to_string()),
    );

    let store = EngagementStore::with_defaults();
    match persistence::try_load_snapshot(&snapshot_path) {
        Ok(Some(snapshot)) => {
            tracing::info!(count = snapshot.engagements.len(), "loaded snapshot");
            store.hydrate(snapshot.engagements).await;
        }
        Ok(None) => tracing::info!("no snapshot found, starting empty"),
        Err(e) => {
            tracing::error!(error = %e, "failed to load snapshot");
            std::process::exit(1);
        }
    }

    let shutdown = CancellationToken::new();
    let dispatcher = Arc::new(Dispatcher::new(Box::new(LoggingNotifier), shutdown.clone()));
    let app_state = AppState::new(store, dispatcher, Box::new(LoggingChatProvisioner));
    let app = build_router(app_state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let on_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            on_shutdown.cancel();
        })
        .await
        .unwrap();

    // Persist the table on the way out so a restart resumes where we left off.
    let snapshot =
        PersistedEngagements::new(app_state.store().export().await, chrono::Utc::now());
    match persistence::save_snapshot_atomic(&snapshot_path, &snapshot) {
        Ok(()) => tracing::info!(count = snapshot.engagements.len(), "snapshot saved"),
        Err(e) => tracing::error!(error = %e, "failed to save snapshot"),
    }
}
