use anyhow::Result;
use chain_recon::checker::{
    DiffChecker, DiffOptions, OnlineChecker, OnlineOptions, Reporter, run_checker,
};
use chain_recon::config::Config;
use chain_recon::error::as_chain;
use chain_recon::metrics::{MetricsGauge, init_metrics};
use chain_recon::notify::LogNotifier;
use chain_recon::repository::{CacheRepository, Database, LedgerRepository};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "checker")]
#[command(about = "Audit trades, ledger transactions and wallet balances", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trades, transactions and the wallets they touch
    Online {
        /// Compare balances with the sum of all wallet transactions
        #[arg(long)]
        recheck_balances: bool,

        /// Skip the latest-transaction balance comparison
        #[arg(long)]
        no_fast: bool,

        #[arg(long)]
        no_wallets: bool,
    },
    /// Recent withdraws and per-wallet balance diffs
    Diff {
        #[arg(long)]
        no_recheck_diff: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_metrics(&config.metrics)?;
    let db = Database::new(&config.database_url)?;
    info!("Database initialized");

    let result = match cli.command {
        Commands::Online {
            recheck_balances,
            no_fast,
            no_wallets,
        } => {
            info!("Starting online checker");
            let mut checker = OnlineChecker::new(
                LedgerRepository::new(&db.conn),
                CacheRepository::new(&db.conn),
                Reporter::new("online", "Checker", LogNotifier, MetricsGauge, config.send_notifications),
                OnlineOptions {
                    recheck_balances,
                    recheck_balances_fast: !no_fast,
                    do_check_wallets: !no_wallets,
                    ledger_epoch: config.ledger_epoch,
                },
            );
            run_checker(&mut checker, config.check_interval, config.is_prod).await
        }
        Commands::Diff { no_recheck_diff } => {
            info!("Starting diff checker");
            let mut checker = DiffChecker::new(
                LedgerRepository::new(&db.conn),
                CacheRepository::new(&db.conn),
                Reporter::new("diff", "Diff Checker", LogNotifier, MetricsGauge, config.send_notifications),
                DiffOptions {
                    recheck_diff: !no_recheck_diff,
                    withdraw_create_tx_verify: config.withdraw_create_tx_verify,
                    ledger_epoch: config.ledger_epoch,
                },
            );
            run_checker(&mut checker, config.check_interval, config.is_prod).await
        }
    };

    if let Err(e) = result {
        error!("Checker error: {}", as_chain(e.as_ref()));
        return Err(e);
    }

    info!("Done.");
    Ok(())
}
