//! Sockpress demo server
//!
//! Serves the demo application in one of its variants and prints `READY` on stdout
//! once the listener is bound.

use anyhow::Context;
use clap::Parser;
use sockpress_core::{init_logging, SockpressConfig};
use sockpress_web::demo::{self, Variant};
use sockpress_web::SockpressServerBuilder;

/// Sockpress demo server - HTTP routes and real-time events sharing one session
#[derive(Parser, Debug)]
#[command(name = "sockpress-demo")]
#[command(about = "Demo server for the sockpress framework")]
#[command(version)]
struct Args {
    /// Server variant
    #[arg(value_enum, default_value = "http")]
    variant: Variant,

    /// Server host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Server port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// PEM certificate for the https variant
    #[arg(long, requires = "key")]
    cert: Option<String>,

    /// PEM private key for the https variant
    #[arg(long, requires = "cert")]
    key: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,
}

fn load_config(args: &Args) -> anyhow::Result<SockpressConfig> {
    let config = match &args.config {
        Some(path) => SockpressConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path))?,
        None => SockpressConfig::default(),
    };
    let mut config = config.apply_env()?;

    args.variant.apply(&mut config);
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(level) = &args.log_level {
        config.logging = config.logging.with_level(level);
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = load_config(&args)?;
    init_logging(&config.logging).map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!(variant = ?args.variant, address = %config.server.address(), "Starting sockpress demo");

    let mut builder = SockpressServerBuilder::new(config);
    if let (Some(cert), Some(key)) = (args.cert, args.key) {
        builder = builder.tls_files(cert, key);
    }
    let server = builder
        .build_with(demo::build)
        .context("failed to build server")?;

    server.start().await.context("server failed")?;
    Ok(())
}
