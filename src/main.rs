use asset_watch::engine::Engine;
use asset_watch::notify::NotificationDispatcher;
use asset_watch::notify::log::LogChannel;
use asset_watch::state::{AppState, SharedChannel};
use asset_watch::store::memory::MemoryStore;
use asset_watch::{api, config};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_default()?;
    init_tracing(&config.logging.level);
    tracing::info!(
        config_path = config::DEFAULT_CONFIG_PATH,
        app = %config.app.name,
        "asset-watch starting"
    );

    let store = match config.seed_path() {
        Some(path) => {
            let store = MemoryStore::from_seed_path(path)?;
            tracing::info!(
                path = %path.display(),
                assets = store.asset_ids()?.len(),
                "Asset seed loaded"
            );
            store
        }
        None => {
            tracing::warn!("No seed path configured, starting with no assets");
            MemoryStore::new()
        }
    };
    let store = Arc::new(store);

    let channel: SharedChannel = Arc::new(LogChannel);
    let dispatcher = match config.push_target() {
        Some(target) => {
            tracing::info!(push_target = target, "Push delivery enabled");
            NotificationDispatcher::new(channel).with_push(target)
        }
        None => NotificationDispatcher::new(channel),
    };
    let engine = Engine::new(Arc::clone(&store), dispatcher, config.default_limits());
    let state = Arc::new(AppState::new(store, engine));

    let app = api::router(state);
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
