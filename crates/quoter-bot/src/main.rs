//! Quoting bot entry point.

use anyhow::Result;
use clap::Parser;
use rust_decimal::Decimal;
use tracing::info;

/// Single-instrument quoting bot
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via QUOTER_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Trade against the in-process paper venue
    #[arg(long)]
    paper: bool,

    /// Fixed volatility, overriding the configured source
    #[arg(long)]
    volatility: Option<Decimal>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // TLS crypto provider must be installed before any connection
    quoter_ws::init_crypto();

    let args = Args::parse();

    quoter_telemetry::init_logging()?;

    info!("Starting quoter v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > QUOTER_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("QUOTER_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");

    let config = quoter_bot::AppConfig::from_file(&config_path)?;
    info!(
        network = ?config.network,
        instrument = %config.instrument.name,
        "Configuration loaded"
    );

    let mut app = quoter_bot::Application::new(config)?.with_paper(args.paper);
    if let Some(volatility) = args.volatility {
        app = app.with_volatility(volatility);
    }

    app.run().await?;

    Ok(())
}
