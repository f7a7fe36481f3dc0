#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use fyllo::Registry;
use server::config::{CliArgs, ServerConfig};
use server::service::{handler::AppState, router};
use server::telemetry::init_telemetry;
use tokio::net::TcpListener;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let telemetry = init_telemetry()?;
    log_startup_info(&config);

    let providers = Registry::default()
        .build(&config.snowflake, &config.segment, &config.random)
        .await?;
    tracing::info!(machine = providers.snowflake.machine_id(), "providers ready");

    let listener = TcpListener::bind(config.server_addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(AppState::new(providers)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Service shut down successfully");
    telemetry.shutdown();
    Ok(())
}

// Provider arguments may carry credentials, so only names are logged.
fn log_startup_info(config: &ServerConfig) {
    tracing::info!(
        addr = %config.server_addr,
        snowflake = %config.snowflake.name,
        segment = %config.segment.name,
        random = %config.random.name,
        "Starting ID service"
    );
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
}
