// Entry point of the SwitchBoard HTTP gateway.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use switchboard::server::{GatewayConfig, GatewayState, router};

#[derive(Parser, Debug)]
#[command(name = "switchboard-server", about = "HTTP gateway for the SwitchBoard panel")]
struct Args {
    /// Path to the gateway configuration file.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    #[arg(long, default_value = "0.0.0.0")]
    bind: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let args = Args::parse();
    let config = GatewayConfig::load(&args.config)?;
    info!(
        services = config.services.len(),
        config = %args.config.display(),
        "loaded gateway config"
    );

    let state = Arc::new(GatewayState::new(config)?);
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", args.bind, args.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {}", addr))?;
    info!(addr = %listener.local_addr()?, "starting SwitchBoard gateway");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("gateway server failed")?;
    Ok(())
}
