//! Chirp application entry point.
//!
//! Bootstraps the server:
//! 1. Load configuration from environment
//! 2. Open the metadata stores (Redis or in-memory)
//! 3. Open the file storage backend (local directory or remote bucket)
//! 4. Start the code rate limiter and its background sweep
//! 5. Ensure the bootstrap admin, if configured
//! 6. Build router and serve until Ctrl-C

use chirp::{
    auth::{AppState, AuthService, ConsoleSender, TokenSigner},
    catalog::ResourceService,
    config::{Config, StorageBackend, StoreBackend},
    files::{FileStorage, LocalStorage, RemoteStorage},
    limiter::RateLimiter,
    routes,
    storage::{
        CodeStore, IdentityStore, MemoryCodeStore, MemoryIdentityStore, MemoryResourceStore,
        RedisCodeStore, RedisIdentityStore, RedisResourceStore, ResourceStore,
    },
};
use std::sync::Arc;
use std::time::Duration;

type Stores = (
    Arc<dyn IdentityStore>,
    Arc<dyn ResourceStore>,
    Arc<dyn CodeStore>,
);

async fn open_stores(backend: &StoreBackend) -> Stores {
    match backend {
        StoreBackend::Redis { url } => {
            let client = redis::Client::open(url.as_str()).expect("Invalid Redis URL");
            let con = client
                .get_multiplexed_async_connection()
                .await
                .expect("Failed to connect to Redis");
            tracing::info!("Using Redis metadata store");
            let identities: Arc<dyn IdentityStore> = Arc::new(RedisIdentityStore::new(con.clone()));
            let resources: Arc<dyn ResourceStore> = Arc::new(RedisResourceStore::new(con.clone()));
            let codes: Arc<dyn CodeStore> = Arc::new(RedisCodeStore::new(con));
            (identities, resources, codes)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory metadata store; data is lost on restart");
            let identities: Arc<dyn IdentityStore> = Arc::new(MemoryIdentityStore::new());
            let resources: Arc<dyn ResourceStore> = Arc::new(MemoryResourceStore::new());
            let codes: Arc<dyn CodeStore> = Arc::new(MemoryCodeStore::new());
            (identities, resources, codes)
        }
    }
}

async fn open_storage(backend: &StorageBackend) -> Arc<dyn FileStorage> {
    match backend {
        StorageBackend::Local { upload_dir } => {
            let storage = LocalStorage::new(upload_dir)
                .await
                .expect("Failed to create upload directory");
            tracing::info!(dir = %upload_dir.display(), "Using local file storage");
            Arc::new(storage)
        }
        StorageBackend::Remote(options) => {
            let storage =
                RemoteStorage::new(options.clone()).expect("Invalid remote storage settings");
            tracing::info!(bucket = %options.bucket, "Using remote file storage");
            Arc::new(storage)
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() {
    // Initialize tracing with env filter support (RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config from environment
    let config = Config::from_env().expect("Failed to load config");
    tracing::info!("Starting chirp on {}", config.bind_addr);

    let (identities, resources, codes) = open_stores(&config.store).await;
    let storage = open_storage(&config.storage).await;

    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit_codes_per_window,
        Duration::from_secs(config.rate_limit_window_secs),
    ));
    let sweeper = limiter.spawn_sweeper();

    let auth = AuthService::new(
        identities,
        codes,
        Arc::new(ConsoleSender),
        limiter,
        TokenSigner::new(
            config.jwt_secret.as_bytes(),
            Duration::from_secs(config.session_ttl_secs),
        ),
        Duration::from_secs(config.code_ttl_secs),
    );

    // Bootstrap admin (created or promoted)
    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        let admin = auth
            .ensure_admin(email, password)
            .await
            .expect("Failed to ensure admin identity");
        tracing::info!(user_id = admin.id, "Admin identity '{}' configured", email);
    }

    // Build shared state
    let state = AppState {
        auth: Arc::new(auth),
        catalog: Arc::new(ResourceService::new(resources, storage)),
        config: Arc::new(config.clone()),
    };

    let app = routes::app(state);

    // Bind to configured address
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind");
    tracing::info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    sweeper.stop().await;
    tracing::info!("Server stopped");
}
