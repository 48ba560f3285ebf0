use anyhow::Result;
use clap::Parser;
use smartctl_exporter::{config::Config, server};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/Default.toml")]
    config: String,

    /// DogStatsD address (overrides config)
    #[arg(long, env = "STATSD_URL")]
    statsd_url: Option<String>,

    /// Port to listen on for exporter metrics (overrides config)
    #[arg(short, long, env = "EXPORTER_PORT")]
    port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long, env = "EXPORTER_ADDR")]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting smartctl DogStatsD exporter v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(&args.config)?;

    // Override with CLI arguments if provided
    if let Some(url) = args.statsd_url {
        config.statsd.url = url;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }

    let problems = config.errors();
    if !problems.is_empty() {
        for problem in &problems {
            error!(config = %args.config, "Configuration is invalid: {}", problem);
        }
        anyhow::bail!("Configuration is invalid, aborting application");
    }

    info!("Configuration loaded successfully");
    info!(
        devices = config.devices.len(),
        polling_interval = ?config.smartctl.polling_interval(),
        report_interval = ?config.statsd.report_interval(),
        "Polling {} device(s)",
        config.devices.len()
    );

    if let Err(e) = server::start(config).await {
        error!("Exporter error: {:#}", e);
        std::process::exit(1);
    }

    info!("Shutdown complete");
    Ok(())
}
