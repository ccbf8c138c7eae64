// ./api/src/main.rs
use api::config::{AppConfig, FromEnv, LogFormat, StoreBackend};
use api::{AppState, router};
use application::{ProductService, ProductStore};
use domain::Product;
use infrastructure::{ElasticsearchStore, InMemoryProductStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging(format: LogFormat) {
    let filter: EnvFilter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

// Application entry point
#[tokio::main]
async fn main() {
    // --- Logger Initialization ---
    init_logging(LogFormat::from_env());
    info!("Logger initialized successfully.");

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    // --- Dependency Injection ---
    // 1. Create the document store client
    let schema = match Product::index_schema(&config.store.index_name) {
        Ok(schema) => schema,
        Err(e) => {
            error!("Invalid index schema: {}", e);
            std::process::exit(1);
        }
    };
    let store: Arc<dyn ProductStore> = match config.store.backend {
        StoreBackend::Elasticsearch => {
            match ElasticsearchStore::new(config.store.to_elasticsearch_config(), schema) {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    error!("Failed to create Elasticsearch store: {}", e);
                    std::process::exit(1);
                }
            }
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory store, data is lost on restart.");
            Arc::new(InMemoryProductStore::new(schema))
        }
    };

    if config.store.ensure_index {
        if let Err(e) = store.ensure_index().await {
            error!("Failed to ensure index '{}': {}", config.store.index_name, e);
            std::process::exit(1);
        }
        info!(index = %config.store.index_name, "Index ready.");
    }

    // 2. Create the application service, injecting the store
    let product_service = Arc::new(ProductService::new(store));
    info!("Application services initialized.");

    // --- API Router Definition ---
    let app = router(AppState::new(product_service));
    info!("API routes configured.");

    // --- Server Startup ---
    let addr = config.server.address();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => {
            info!("Server listening on {}", addr);
            listener
        }
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
