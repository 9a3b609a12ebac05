mod archive;
mod error;
mod files;
mod http_cache;
mod range;
mod routes;
mod state;
mod subtitles;
mod thumbnails;
mod transcoder;

use clap::Parser;
use lamery_core::Config;
use state::{AppState, SharedState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lamery-service", version, about = "Browse, stream and archive a storage tree over HTTP")]
struct Args {
    /// Storage root to serve
    #[arg(long, env = "LISTING_PATH")]
    root: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    #[arg(long, default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("lamery=info,tower_http=info")),
        )
        .init();

    if let Err(err) = run(Args::parse()).await {
        tracing::error!(error = %err, "lamery-service failed");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(root) = args.root {
        config.storage.root = root;
    }

    let state: SharedState = Arc::new(AppState::new(config));

    // Start walking the tree before the first request arrives
    let bootstrap = Arc::clone(&state);
    tokio::spawn(async move {
        if let Err(err) = bootstrap.index.ready().await {
            tracing::warn!(error = ?err, "initial index bootstrap failed; retrying on demand");
        }
    });

    let app = routes::router(Arc::clone(&state));

    let addr = format!("{}:{}", args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "lamery-service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.index.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
