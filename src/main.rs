use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use statement_rounds::{
    api::{self, AppState},
    auth::AuthConfig,
    config::{GameConfig, ServerConfig},
    notify::{BroadcastNotifier, Dispatcher, LogNotifier, Notifier, WebhookNotifier},
    scheduler,
    state::GameService,
    store::{MemoryStore, Store},
};

/// Buffered events per SSE subscriber before it starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 100;

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "statement_rounds=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting statement-rounds...");

    let server_config = ServerConfig::from_env();
    let game_config = GameConfig::from_env();
    let auth_config = Arc::new(AuthConfig::from_env());

    // Notification sinks
    let events = BroadcastNotifier::new(EVENT_CHANNEL_CAPACITY);
    let mut notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier), Arc::new(events.clone())];
    if let Some(url) = &server_config.notify_webhook_url {
        match WebhookNotifier::new(url.clone(), server_config.notify_timeout) {
            Ok(webhook) => {
                tracing::info!("Webhook notifications enabled");
                notifiers.push(Arc::new(webhook));
            }
            Err(e) => tracing::warn!("Webhook notifications disabled: {}", e),
        }
    }
    let dispatcher = Dispatcher::new(notifiers);

    let (store, snapshots) = open_store(&server_config).await;
    let service = GameService::new(store, dispatcher, game_config);

    // Periodic close/open pass
    let scheduler_handle =
        scheduler::spawn_scheduler(service.clone(), server_config.scheduler_interval);

    let state = AppState {
        service,
        events,
        snapshots: snapshots.clone(),
        user_header: server_config.auth_user_header.clone(),
    };

    let app = api::router(state, auth_config)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], server_config.port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    scheduler_handle.abort();

    if let (Some(store), Some(path)) = (&snapshots, &server_config.snapshot_path) {
        match store.save_to_file(Path::new(path)).await {
            Ok(()) => tracing::info!("Saved snapshot to {}", path),
            Err(e) => tracing::error!("Failed to save snapshot to {}: {}", path, e),
        }
    }
}

/// Pick the store backend; the memory store is also returned for snapshots
async fn open_store(config: &ServerConfig) -> (Arc<dyn Store>, Option<MemoryStore>) {
    if let Some(store) = open_database(config).await {
        return (store, None);
    }

    let store = MemoryStore::new();
    if let Some(path) = &config.snapshot_path {
        match store.load_from_file(Path::new(path)).await {
            Ok(true) => tracing::info!("Loaded snapshot from {}", path),
            Ok(false) => tracing::info!("No snapshot at {}, starting empty", path),
            Err(e) => tracing::error!("Failed to load snapshot from {}: {}", path, e),
        }
    }
    tracing::info!("Using in-memory store");
    (Arc::new(store.clone()), Some(store))
}

#[cfg(feature = "sqlite")]
async fn open_database(config: &ServerConfig) -> Option<Arc<dyn Store>> {
    let url = config.database_url.as_ref()?;
    let store = statement_rounds::store::SqliteStore::connect(url)
        .await
        .unwrap_or_else(|e| panic!("Failed to open database {}: {}", url, e));
    tracing::info!("Using SQLite store at {}", url);
    Some(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_database(config: &ServerConfig) -> Option<Arc<dyn Store>> {
    if config.database_url.is_some() {
        tracing::warn!("DATABASE_URL is set but the sqlite feature is disabled; using memory store");
    }
    None
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
