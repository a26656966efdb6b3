use dotenvy::dotenv;
use owndl_worker::config::WorkerSettings;
use owndl_worker::connection::WorkerConnection;
use owndl_worker::queue::RequestQueue;
use owndl_worker::resolver::HttpResolver;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    // Load .env file
    dotenv().ok();

    init_logging();

    let settings = init_settings();
    let platform = settings.platform_tag();
    info!(platform = %platform, "Starting OwnDownloader worker...");

    let resolver = match HttpResolver::new(&settings.resolver_url) {
        Ok(resolver) => Arc::new(resolver),
        Err(e) => {
            error!("Failed to build resolver client: {}", e);
            std::process::exit(1);
        }
    };
    let queue = RequestQueue::spawn(resolver, settings.queue_settings());
    let connection = WorkerConnection::new(
        settings.websocket_url(),
        platform,
        queue,
        settings.reconnect_delay(),
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Disconnecting from relay");
            signal.cancel();
        }
    });

    connection.run(shutdown).await;
}

fn init_logging() {
    let debug_mode = std::env::var("DEBUG_MODE")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    let filter = if debug_mode {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "owndl_worker=info,owndl_core=info,hyper=warn,reqwest=warn,tungstenite=warn,tokio_tungstenite=warn",
            )
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn init_settings() -> WorkerSettings {
    match WorkerSettings::new() {
        Ok(settings) => {
            info!("Configuration loaded successfully.");
            settings
        }
        Err(e) => {
            error!("Failed to load worker configuration: {}", e);
            std::process::exit(1);
        }
    }
}
