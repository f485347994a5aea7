//! Logbook Server Binary
//!
//! Records pushed signal deltas and serves their history over HTTP.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use clap::Parser;
use logbook_server::{create_router, AppState, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;

#[derive(Parser)]
#[command(name = "logbook-server")]
#[command(about = "Logbook signal history recorder and query server")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Data directory for the track database (in-memory when omitted)
    #[arg(short, long)]
    data_dir: Option<String>,

    /// Context identifying the own vessel
    #[arg(long)]
    self_context: Option<String>,

    /// Record the own position track
    #[arg(long)]
    record_track: bool,

    /// Newline-delimited delta log to load before serving
    #[arg(long)]
    import: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> logbook_common::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            ServerConfig::from_file(path)?
        }
        None => ServerConfig::default(),
    };
    if let Some(host) = &args.host {
        config = config.with_host(host);
    }
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    config = config
        .with_data_dir(args.data_dir.clone())
        .with_self_context(args.self_context.clone());
    if args.record_track {
        config = config.with_record_track(true);
    }
    let addr: SocketAddr = config.socket_addr();

    tracing::info!("Starting Logbook Server on {}", addr);
    tracing::info!("Self context: {}", config.logbook.recorder.self_context);

    let state = AppState::new(config)?;

    if let Some(path) = &args.import {
        let stats = state.import(path).await?;
        tracing::info!(
            "Imported {} points from {} deltas ({} lines skipped)",
            stats.points,
            stats.deltas,
            stats.skipped
        );
    }

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Logbook Server listening on http://{}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
