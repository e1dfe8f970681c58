//! Sanity Board Back binary entrypoint wiring the WebSocket game transport, REST and room storage.

use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, bail};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sanity_board_back::{
    config::AppConfig,
    dao::{
        room_store::{RoomStore, file::FileRoomStore},
        storage::StorageError,
    },
    routes,
    services::{cleanup, persistence, storage_supervisor},
    state::AppState,
};

/// Storage backend selected through `ROOM_STORE`.
#[derive(Debug, Clone, Copy)]
enum StoreKind {
    File,
    #[cfg(feature = "mongo-store")]
    Mongo,
    #[cfg(feature = "couch-store")]
    Couch,
}

impl StoreKind {
    fn from_env() -> anyhow::Result<Self> {
        let value = env::var("ROOM_STORE").unwrap_or_else(|_| "file".into());
        match value.to_ascii_lowercase().as_str() {
            "file" => Ok(StoreKind::File),
            #[cfg(feature = "mongo-store")]
            "mongo" | "mongodb" => Ok(StoreKind::Mongo),
            #[cfg(feature = "couch-store")]
            "couch" | "couchdb" => Ok(StoreKind::Couch),
            other => bail!("unsupported ROOM_STORE `{other}`"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let store_kind = StoreKind::from_env()?;
    let data_dir = config.data_dir().to_path_buf();
    let app_state = AppState::new(config);

    info!(?store_kind, "connecting room store");
    match connect_store(store_kind, data_dir.clone()).await {
        Ok(store) => storage_supervisor::install(&app_state, store).await,
        Err(err) => warn!(error = %err, "room store unavailable at startup; running degraded"),
    }

    tokio::spawn(storage_supervisor::run(app_state.clone(), move || {
        connect_store(store_kind, data_dir.clone())
    }));
    tokio::spawn(persistence::run_flusher(app_state.clone()));
    tokio::spawn(cleanup::run_sweeper(app_state.clone()));

    let app = routes::router(app_state.clone());

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    let saved = persistence::flush_all(&app_state).await;
    info!(saved, "final flush complete; bye");
    Ok(())
}

async fn connect_store(
    kind: StoreKind,
    data_dir: PathBuf,
) -> Result<Arc<dyn RoomStore>, StorageError> {
    match kind {
        StoreKind::File => {
            let store = FileRoomStore::open(data_dir).await?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "mongo-store")]
        StoreKind::Mongo => {
            use sanity_board_back::dao::room_store::mongodb::{MongoConfig, MongoRoomStore};

            let config = MongoConfig::from_env().await?;
            Ok(Arc::new(MongoRoomStore::connect(config).await?))
        }
        #[cfg(feature = "couch-store")]
        StoreKind::Couch => {
            use sanity_board_back::dao::room_store::couchdb::{CouchConfig, CouchRoomStore};

            let config = CouchConfig::from_env()?;
            Ok(Arc::new(CouchRoomStore::connect(config).await?))
        }
    }
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown requested");
}
