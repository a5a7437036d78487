//! presign-relay - HTTP relay that forwards uploads to presigned URLs

use anyhow::Result;
use clap::Parser;
use presign_relay::config::{
    Config, ConfigOptions, DEFAULT_BASE_TIMEOUT_SECS, DEFAULT_HOST, DEFAULT_MAX_BODY_BYTES,
    DEFAULT_MAX_RETRIES_LIMIT, DEFAULT_PORT, DEFAULT_TIMEOUT_STEP_SECS,
};
use presign_relay::RelayServer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "presign-relay")]
#[command(about = "Relay uploaded files to presigned URLs with retry and backoff")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Timeout of the first upload attempt, in seconds
    #[arg(long, default_value_t = DEFAULT_BASE_TIMEOUT_SECS)]
    base_timeout_secs: u64,

    /// Extra timeout added for each retry, in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_STEP_SECS)]
    timeout_step_secs: u64,

    /// Largest max_retries a client may request
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES_LIMIT)]
    max_retries_limit: u32,

    /// Maximum accepted request body size, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = Config::new(ConfigOptions {
        host: Some(args.host),
        port: Some(args.port),
        base_timeout_secs: Some(args.base_timeout_secs),
        timeout_step_secs: Some(args.timeout_step_secs),
        max_retries_limit: Some(args.max_retries_limit),
        max_body_bytes: Some(args.max_body_bytes),
    })?;

    info!("Starting presign-relay");

    let server = RelayServer::new(config)?;
    let listener = server.bind().await?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    if let Err(e) = server.run(listener, shutdown).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
