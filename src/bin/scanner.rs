use anyhow::Result;
use chain_recon::config::Config;
use chain_recon::error::as_chain;
use chain_recon::metrics::{MetricsGauge, init_metrics};
use chain_recon::parser::TransactionParser;
use chain_recon::provider::BlockbookClient;
use chain_recon::repository::{CacheRepository, Database, DeltaRepository};
use chain_recon::scanner::{BlockScanner, ScannerState};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting block scanner");

    let config = Config::from_env()?;
    init_metrics(&config.metrics)?;
    let spec = config.network_spec()?;
    info!("Configuration loaded");
    info!(
        "Network {}: {} provider(s), up to {} blocks per window",
        spec.network,
        config.provider_urls.len(),
        spec.max_blocks
    );

    let db = Database::new(&config.database_url)?;
    info!("Database initialized");

    let client = BlockbookClient::new(&config.provider_urls)?;
    let parser = TransactionParser::new(spec, config.precision.clone());
    let mut scanner = BlockScanner::new(
        parser,
        ScannerState::new(client),
        CacheRepository::new(&db.conn),
        MetricsGauge,
    )
    .with_poll_interval(config.scan_interval);
    let sink = DeltaRepository::new(&db.conn);

    if let Err(e) = scanner.run(&sink).await {
        error!("Scanner error: {}", as_chain(e.as_ref()));
        return Err(e);
    }

    Ok(())
}
