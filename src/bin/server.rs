use barback::{
    cli::Args, create_router_with_config, jobs::JobStore, store::RedbCatalog, RouterConfig,
};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "barback=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    std::fs::create_dir_all(&args.data_dir).expect("Failed to create data directory");

    let catalog =
        RedbCatalog::new(args.data_dir.join("catalog.redb")).expect("Failed to open catalog store");
    let jobs = JobStore::new(args.data_dir.join("jobs.redb")).expect("Failed to open job store");

    let backup_dir = args
        .backup_dir
        .unwrap_or_else(|| args.data_dir.join("backups"));
    tracing::info!("Backups will be written to {}", backup_dir.display());

    if args.admin_key.is_none() {
        tracing::warn!("No admin key configured - admin routes will refuse service");
        tracing::warn!("Use --admin-key <key> to enable the batch pipeline");
    }

    // Build our application with routes
    let app = create_router_with_config(RouterConfig {
        catalog: Arc::new(catalog),
        jobs: Arc::new(jobs),
        backup_dir,
        admin_key: args.admin_key,
    });

    // Run the server
    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .expect("Invalid address");

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
