//! Direct-access forward proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request (absolute-form)
//!     ───────────────▶ http server ──▶ pipeline
//!                                        │
//!                         direct_access.on_request
//!                          │                    │
//!                    DirectAccess            Continue
//!                          │                    │
//!                          │        forwarded.on_request (Via, X-Forwarded-For)
//!                          │                    │
//!                          │        push headers → executor → pull headers
//!                          │                    │
//!                          │        forwarded.on_response
//!                          │                    │
//!                direct_access.on_response ◀────┘
//!                (push → executor → pull)
//!                          │
//!     Client Response ◀────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use direct_access_proxy::config::loader::load_config;
use direct_access_proxy::config::validation::validate_config;
use direct_access_proxy::config::ProxyConfig;
use direct_access_proxy::lifecycle::startup;
use direct_access_proxy::observability::logging;

#[derive(Parser)]
#[command(name = "direct-access-proxy")]
#[command(about = "Forward proxy that sends matching requests straight to the origin", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Do not reload the configuration file when it changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind.to_string();
    }
    validate_config(&config).map_err(|errors| {
        errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    })?;

    logging::init_logging(&config.observability)?;

    tracing::info!("direct-access-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        include_rules = config.direct_access.regexps.len(),
        exclude_rules = config.direct_access.notregexps.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let watch = if cli.no_watch { None } else { cli.config.clone() };
    startup::run(config, watch).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
