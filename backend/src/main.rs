use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;

use backend::config::{Config, StorageKind};
use backend::service::{Service, Settings};
use backend::storage::MatchStorage;

const DEFAULT_FILTER: &str = "backend=info,analysis=info,tower_http=debug";

async fn storage(config: &Config) -> Result<Arc<dyn MatchStorage>, String> {
    match config.storage {
        StorageKind::Memory => Ok(Arc::new(backend::storage::MemoryStorage::new())),
        StorageKind::File => Ok(Arc::new(backend::storage::FileStorage::new(
            config.data_dir.clone(),
        ))),
        StorageKind::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or("'DATABASE_URL' must be set for the postgres storage")?;
            let storage = backend::storage::postgres::PostgresStorage::new(url);

            tracing::info!("Applying Migrations");
            storage
                .run_migrations()
                .await
                .map_err(|e| format!("Applying migrations: {}", e))?;
            tracing::info!("Completed Migrations");

            Ok(Arc::new(storage))
        }
    }
}

async fn cache(config: &Config) -> Option<backend::cache::ResultCache> {
    let url = config.redis_url.as_deref()?;

    match backend::cache::ResultCache::connect(url, config.retention()).await {
        Ok(c) => Some(c),
        Err(e) => {
            tracing::warn!("Connecting to redis, running without cache: {:?}", e);
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let registry = tracing_subscriber::Registry::default()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER)),
        );
    tracing::subscriber::set_global_default(registry).map_err(|e| e.to_string())?;

    let config = Config::parse();

    tracing::info!("Starting...");
    tracing::debug!(?config, "Configuration");

    let storage = storage(&config).await?;

    let ranks: Arc<dyn backend::rank::RankLookup> = match config.rank_service_url.as_deref() {
        Some(url) => Arc::new(backend::rank::HttpRankLookup::new(url, config.rank_timeout())),
        None => Arc::new(backend::rank::Disabled),
    };

    let service = Arc::new(Service {
        storage: storage.clone(),
        cache: cache(&config).await,
        ranks,
        registry: backend::jobs::Registry::new(),
        workers: backend::jobs::Workers::new(config.workers(), config.job_timeout()),
        settings: Settings {
            max_upload_bytes: config.max_upload_bytes(),
            spool_dir: config.spool_dir.clone(),
            retention: config.retention(),
            heatmap: Some(analysis::heatmap::Config {
                cell_size: config.heatmap_cell_size,
            }),
        },
    });

    backend::gc::spawn(
        storage,
        service.registry.clone(),
        config.retention(),
        config.gc_interval(),
    );

    tracing::info!(workers = config.workers(), "Listening on {}", config.listen);

    let router = backend::api::router(service);

    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .map_err(|e| format!("Binding {}: {}", config.listen, e))?;
    axum::serve(listener, router)
        .await
        .map_err(|e| e.to_string())
}
