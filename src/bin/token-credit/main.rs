//! token-credit CLI entry point.

mod cli;

use clap::Parser;
use cli::Cli;
use token_credit::{LogFormat, ServiceBuilder};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse CLI arguments and build configuration
    let cli = Cli::parse();
    let config = cli.into_config()?;

    init_tracing(&config.log_level, config.log_format);

    info!("token-credit v{}", env!("CARGO_PKG_VERSION"));

    // Build and run the service
    let mut service = ServiceBuilder::new(config).build().await?;
    info!("Listening on http://{}", service.local_addr());

    // Run until shutdown
    service.run().await?;

    info!("Goodbye!");
    Ok(())
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
    }
}
