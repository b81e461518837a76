//! Storefront Client - local gateway for the storefront presentation layer

use anyhow::Result;
use std::sync::Arc;
use storefront_client::{
    api::{self, AppState},
    catalog::CatalogClient,
    local::FileStorage,
    location::LocationClient,
    store::{DocumentStore, MemoryStore, PgDocumentStore},
    Config, Storefront,
};
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;

    let store: Arc<dyn DocumentStore> = match config.database_url.as_deref() {
        Some(url) => {
            let pg = PgDocumentStore::connect(url, 10).await?;
            pg.migrate().await?;
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, account documents are kept in memory");
            Arc::new(MemoryStore::new())
        }
    };
    let local_storage = Arc::new(FileStorage::open(&config.local_storage_path)?);

    let mut storefront = Storefront::new(store.clone(), local_storage, &config);
    if let Err(e) = storefront.restore().await {
        tracing::warn!(error = %e, "could not restore account state, continuing with local state");
    }

    let state = AppState {
        storefront: Arc::new(Mutex::new(storefront)),
        catalog: CatalogClient::new(config.catalog_api_url.as_str(), config.http_timeout, config.retry.clone())?,
        locations: LocationClient::new(&config.pincode_api_url, &config.geonames_api_url, config.geonames_username.clone(), config.http_timeout)?,
    };
    let app = api::router(state).layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive());

    let addr = config.socket_addr();
    tracing::info!(backend = store.backend_tag(), "🚀 Storefront client listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
