use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use common::reference::ReferenceExtractor;
use common::storage::ObjectStore;
use common::storage::filesystem::FilesystemObjectStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

use server::build_router;
use server::config::{AppConfig, StorageBackend, StorageConfig};
use server::database::init_db;
use server::lifecycle::{AssetLifecycle, SeaOrmAssetRegistry, UploadPolicy, run_asset_sweeper};
use server::state::AppState;

async fn build_store(
    config: &StorageConfig,
    public_base_url: &str,
) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match config.backend {
        StorageBackend::Filesystem => {
            let store = FilesystemObjectStore::new(config.root.clone(), public_base_url)
                .await
                .with_context(|| format!("opening object store at {}", config.root.display()))?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "object-storage")]
        StorageBackend::S3 => {
            let s3 = config
                .s3
                .as_ref()
                .context("storage.backend is s3 but [storage.s3] is missing")?;
            let store = common::storage::s3::S3ObjectStore::new(s3, public_base_url)?;
            Ok(Arc::new(store))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("loading configuration")?;

    let db = init_db(&config.database.url)
        .await
        .context("connecting to database")?;
    let store = build_store(&config.storage, &config.server.public_base_url).await?;
    let registry = Arc::new(SeaOrmAssetRegistry::new(db));

    let lifecycle = Arc::new(AssetLifecycle::new(
        store,
        registry,
        ReferenceExtractor::new(&config.server.public_base_url),
        UploadPolicy::new(&config.upload),
        &config.lifecycle,
    ));

    if config.sweeper.enabled {
        tokio::spawn(run_asset_sweeper(
            lifecycle.clone(),
            config.sweeper.clone(),
        ));
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server.host/server.port")?;

    let state = AppState {
        config: Arc::new(config),
        lifecycle,
    };
    let app = build_router(state);

    info!("Server running at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
