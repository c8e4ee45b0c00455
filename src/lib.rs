pub mod api;
pub mod backup;
pub mod catalog;
pub mod cli;
pub mod executor;
pub mod filter;
pub mod jobs;
pub mod limit;
pub mod ops;
pub mod preview;
pub mod services;
pub mod store;
pub mod tags;

use catalog::CatalogStore;
use jobs::JobStore;
use services::BatchService;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;

async fn health_check() -> &'static str {
    "OK"
}

/// Configuration for creating a router.
pub struct RouterConfig {
    /// Catalog store holding the cocktail and ingredient collections
    pub catalog: Arc<dyn CatalogStore>,
    /// Persistent job store
    pub jobs: Arc<JobStore>,
    /// Directory batch backup snapshots are written to
    pub backup_dir: PathBuf,
    /// Shared secret the admin routes require; admin routes refuse service
    /// when unset
    pub admin_key: Option<String>,
}

/// Create a router with the given configuration.
pub fn create_router_with_config(config: RouterConfig) -> Router {
    let service = Arc::new(BatchService::new(
        config.catalog,
        config.jobs,
        config.backup_dir,
    ));

    Router::new()
        .route("/health", get(health_check))
        .merge(api::router(service, config.admin_key))
        .layer(CorsLayer::permissive())
}
