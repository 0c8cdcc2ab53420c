//! Site Sync server binary.
//!
//! Opens the local sled database, mounts the config synchronizer against
//! either a remote document store (`REMOTE_STORE_URL`) or the local store,
//! and serves the admin API.

use anyhow::Context;
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, warn};

use site_sync::{
    api::{self, AppState},
    blob::{BlobUploader, HttpBlobUploader, MemoryBlobStore},
    config::AppConfig,
    notify::ChannelNotifier,
    remote::{DocumentStore, HttpDocumentStore},
    storage::{self, SledCache, SledDocumentStore},
    sync::ConfigSync,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "site_sync=info,tower_http=info".into()),
        )
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    info!("Initializing storage at: {}", config.storage.path);
    let db = storage::open(&config.storage).context("failed to open storage")?;
    let local_store = SledDocumentStore::new(&db).context("failed to open document tree")?;
    let cache = SledCache::new(&db, config.document.to_string()).context("failed to open cache tree")?;

    let remote: Arc<dyn DocumentStore> = match &config.remote_store_url {
        Some(url) => {
            info!("Remote document store: {}", url);
            let mut store = HttpDocumentStore::new(url, config.request_timeout)
                .context("failed to build remote store client")?;
            if let Some(token) = &config.remote_store_token {
                store = store.with_token(token);
            }
            Arc::new(store)
        }
        None => {
            warn!("REMOTE_STORE_URL not set - local store is authoritative");
            Arc::new(local_store.clone())
        }
    };

    // In-memory uploads are served back by the API under /media
    let (blobs, media): (Arc<dyn BlobUploader>, Option<Arc<MemoryBlobStore>>) =
        match (&config.blob_base_url, &config.blob_public_url) {
            (Some(base), Some(public)) => {
                let mut uploader = HttpBlobUploader::new(base, public, config.request_timeout)
                    .context("failed to build blob uploader")?;
                if let Some(token) = &config.blob_token {
                    uploader = uploader.with_token(token);
                }
                (Arc::new(uploader) as Arc<dyn BlobUploader>, None)
            }
            _ => {
                warn!("BLOB_BASE_URL not set - uploads are kept in memory");
                let store = Arc::new(MemoryBlobStore::new("/media"));
                let uploader: Arc<dyn BlobUploader> = store.clone();
                (uploader, Some(store))
            }
        };

    // Cache-first: the config is usable before the remote read returns
    let sync = ConfigSync::mount(config.sync_options(), Arc::new(cache), remote);
    info!(
        "Config synchronizer mounted for {} (site: {})",
        config.document,
        sync.get().site_name()
    );

    let mut state = AppState::new(
        sync,
        Arc::new(ChannelNotifier::default()),
        blobs,
        Arc::new(local_store),
    );
    if let Some(store) = media {
        state = state.with_media(store);
    }
    let app = api::router(Arc::new(state));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    info!("Site Sync v{} starting", env!("CARGO_PKG_VERSION"));
    info!("   Listening on: http://{}", addr);
    info!("   Events (SSE): http://{}/api/events", addr);
    info!("   Health check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
