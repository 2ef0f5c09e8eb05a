use anyhow::Result;
use chain_recon::checker::{DiffChecker, DiffOptions, Reporter};
use chain_recon::config::Config;
use chain_recon::metrics::MetricsGauge;
use chain_recon::notify::LogNotifier;
use chain_recon::parser::TransactionParser;
use chain_recon::provider::BlockbookClient;
use chain_recon::query::commands::{
    DeltaQuery, cmd_balance, cmd_deltas, cmd_diff, cmd_tx, cmd_watermark,
};
use chain_recon::query::formatters::OutputFormat;
use chain_recon::repository::{CacheRepository, Database, DeltaRepository, LedgerRepository};
use chain_recon::scanner::{BlockScanner, ScannerState};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "query")]
#[command(about = "Inspect scanner and checker state", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Last fully processed block of NETWORK
    Watermark,
    /// Address deltas recorded by the scanner
    Deltas {
        #[arg(long)]
        address: Option<String>,

        #[arg(long)]
        block: Option<u64>,

        #[arg(long, num_args = 2, value_names = ["START", "END"])]
        block_range: Option<Vec<u64>>,

        /// Do not restrict results to NETWORK
        #[arg(long, default_value = "false")]
        all_networks: bool,

        #[arg(long, default_value = "100")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Balance diff of one wallet up to its latest transaction
    Diff { wallet_id: i64 },
    /// Parsed provider transaction
    Tx {
        hash: String,

        /// Only show the transaction from this address' point of view
        #[arg(long)]
        address: Option<String>,
    },
    /// Native and token balances of an address
    Balance { address: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let config = Config::from_env()?;
    let db = Database::new(&config.database_url)?;
    let cache = CacheRepository::new(&db.conn);

    match cli.command {
        Commands::Watermark => {
            cmd_watermark(&cache, &config.network_spec()?, &format)?;
        }
        Commands::Deltas {
            address,
            block,
            block_range,
            all_networks,
            limit,
            offset,
        } => {
            let network = if all_networks {
                None
            } else {
                Some(config.network_spec()?.cache_key.to_string())
            };
            let range = block_range.and_then(|v| match v.as_slice() {
                [start, end] => Some((*start, *end)),
                _ => None,
            });
            let query = DeltaQuery {
                network,
                address,
                block,
                block_range: range,
                limit,
                offset,
            };
            cmd_deltas(&DeltaRepository::new(&db.conn), query, &format)?;
        }
        Commands::Diff { wallet_id } => {
            let repo = LedgerRepository::new(&db.conn);
            let checker = DiffChecker::new(
                LedgerRepository::new(&db.conn),
                CacheRepository::new(&db.conn),
                Reporter::new("diff", "Diff Checker", LogNotifier, MetricsGauge, false),
                DiffOptions {
                    ledger_epoch: config.ledger_epoch,
                    ..Default::default()
                },
            );
            cmd_diff(&repo, &cache, &checker, wallet_id, &format)?;
        }
        Commands::Tx { hash, address } => {
            let scanner = provider_scanner(&config, cache)?;
            cmd_tx(&scanner, &hash, address.as_deref(), &format).await?;
        }
        Commands::Balance { address } => {
            let mut scanner = provider_scanner(&config, cache)?;
            cmd_balance(&mut scanner, &address, &format).await?;
        }
    }

    Ok(())
}

fn provider_scanner<'a>(
    config: &Config,
    cache: CacheRepository<'a>,
) -> Result<BlockScanner<BlockbookClient, CacheRepository<'a>, MetricsGauge>> {
    let parser = TransactionParser::new(config.network_spec()?, config.precision.clone());
    Ok(BlockScanner::new(
        parser,
        ScannerState::new(BlockbookClient::new(&config.provider_urls)?),
        cache,
        MetricsGauge,
    ))
}
