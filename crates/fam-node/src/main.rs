//! # FAM Node
//!
//! Entry point for the FAM lookup gateway.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging (`RUST_LOG`, default `info`)
//! 2. Load configuration (`FAM_CONFIG` file, then environment overrides)
//! 3. Build the messaging channel and start the loopback responder
//! 4. Serve the HTTP and admin APIs until Ctrl+C

use anyhow::{Context, Result};
use fam_gateway::ApiGatewayService;
use fam_node::{load_config, loopback_channel, LoopbackResponder};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Set to `file` to have the loopback bot answer with documents.
const LOOPBACK_REPLY_FORMAT_ENV: &str = "LOOPBACK_REPLY_FORMAT";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load configuration
    let config = load_config()?;
    info!(
        http = %config.http_addr(),
        admin = %config.admin_addr(),
        session = %config.channel.session_name,
        "Configuration loaded"
    );

    // Loopback channel with a scripted bot
    let channel = loopback_channel();
    let as_file = std::env::var(LOOPBACK_REPLY_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("file"))
        .unwrap_or(false);
    warn!("No network transport linked in, running in loopback mode");
    let responder = LoopbackResponder::new(channel.clone(), config.channel.command_keyword.clone())
        .with_file_replies(as_file)
        .spawn()
        .await
        .context("starting loopback responder")?;

    let service = ApiGatewayService::new(config, channel)?;

    info!("Node is running. Press Ctrl+C to stop.");
    service
        .start(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl+C");
            }
        })
        .await?;

    responder.abort();
    info!("Node stopped");
    Ok(())
}
