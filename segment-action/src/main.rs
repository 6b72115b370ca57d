//! Serve the segment identify and track actions over HTTP.
use envconfig::Envconfig;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use segment_action::config::Config;
use segment_action::server::serve;

async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    tracing::info!("Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::init_from_env().expect("Invalid configuration:");

    let listener = tokio::net::TcpListener::bind(config.bind()).await?;

    serve(config, listener, shutdown()).await
}
