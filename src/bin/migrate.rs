use anyhow::Result;
use chain_recon::config::Config;
use chain_recon::repository::Database;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!("Running migrations on database: {}", config.database_url);

    let _db = Database::new(&config.database_url)?;

    info!("Migrations completed successfully!");

    Ok(())
}
