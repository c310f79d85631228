//! Warden API Server

use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use warden_api::{
    create_router,
    state::{AppState, Stores},
};
use warden_core::{AppConfig, MemoryStore, PgStore, StorageBackend};

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warden_api={level},warden_core={level},tower_http=info",
            level = config.logging.level
        ))
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config);

    let stores = match config.database.backend {
        StorageBackend::Postgres => {
            let store =
                PgStore::connect(&config.database.postgres_url, config.database.pool_size).await?;
            store.migrate().await?;
            tracing::info!("Connected to PostgreSQL");
            Stores::from_backend(Arc::new(store))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; all data is lost on shutdown");
            Stores::from_backend(Arc::new(MemoryStore::new()))
        }
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, stores)?);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Warden API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
