//! Simone storefront - multi-vendor marketplace service

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use simone_storefront::domain::ports::EventPublisher;
use simone_storefront::infrastructure::{InMemoryStore, LocalProofStorage, LogPublisher, NatsPublisher, PgStore};
use simone_storefront::{router, AppConfig, AppState, Context, Services, Stores};

const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let stores = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            Stores::from_store(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, data lives in memory and is lost on restart");
            Stores::from_store(InMemoryStore::new())
        }
    };

    let events: Arc<dyn EventPublisher> = match &config.nats_url {
        Some(url) => match NatsPublisher::connect(url, &config.event_prefix).await {
            Ok(publisher) => Arc::new(publisher),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, events are only logged");
                Arc::new(LogPublisher)
            }
        },
        None => Arc::new(LogPublisher),
    };
    let proofs = Arc::new(LocalProofStorage::new(config.upload_dir.clone()));

    let port = config.port;
    let ctx = Context::new(stores, proofs, events, config);
    ctx.caches.clone().spawn_sweeper(CACHE_SWEEP_INTERVAL);
    let shared_config = ctx.config.clone();
    let services = Services::new(ctx);
    if let Some(admin) = services.auth.bootstrap_admin().await? {
        tracing::info!(email = %admin.email, "administrator account ready");
    }

    let app = router(AppState::new(services, shared_config));
    tracing::info!("Simone storefront listening on 0.0.0.0:{}", port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?, app).await?;
    Ok(())
}
