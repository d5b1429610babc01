use anyhow::Result;
use booking_service::api::{self, AppState};
use booking_service::config::{Args, StorageKind};
use booking_service::store::run_migrations;
use booking_service::{BookingCoordinator, BookingStore, MemoryStore, PgStore};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let settings = args.settings();
    info!(?settings, storage = ?args.storage, "Starting booking service");

    match args.storage {
        StorageKind::Postgres => {
            info!("Running database migrations...");
            run_migrations(&args.database_url)?;
            info!("Migrations completed successfully");

            let store =
                PgStore::connect(&args.database_url, args.pool_size, args.tx_timeout()).await?;
            serve(BookingCoordinator::new(store, settings), args.port).await
        }
        StorageKind::Memory => {
            warn!("Using in-memory storage; bookings are lost on exit");
            let store = MemoryStore::new(args.tx_timeout());
            serve(BookingCoordinator::new(store, settings), args.port).await
        }
    }
}

async fn serve<S: BookingStore>(coordinator: BookingCoordinator<S>, port: u16) -> Result<()> {
    let app = api::create_router(AppState::new(coordinator));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("Booking service ready to accept HTTP requests at http://0.0.0.0:{}/v1", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Booking service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
