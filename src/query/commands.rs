use crate::cache::Cache;
use crate::checker::diff::checkpoint_key;
use crate::checker::{DiffCheckpoint, DiffChecker};
use crate::metrics::GaugeSink;
use crate::network::NetworkSpec;
use crate::notify::Notifier;
use crate::provider::BlockProvider;
use crate::query::formatters::{
    DiffView, OutputFormat, WatermarkView, format_address_tx, format_balances, format_deltas,
    format_diff, format_transaction, format_watermark,
};
use crate::repository::{DeltaRepository, LedgerStore};
use crate::scanner::BlockScanner;
use anyhow::{Result, anyhow};

pub fn cmd_watermark<C: Cache>(cache: &C, spec: &NetworkSpec, format: &OutputFormat) -> Result<()> {
    let view = WatermarkView {
        network: spec.network.to_string(),
        watermark: cache.get_as(&spec.watermark_key())?,
        consecutive_failures: cache.get_as(&spec.failure_count_key())?,
    };
    println!("{}", format_watermark(&view, format));
    Ok(())
}

#[derive(Default)]
pub struct DeltaQuery {
    pub network: Option<String>,
    pub address: Option<String>,
    pub block: Option<u64>,
    pub block_range: Option<(u64, u64)>,
    pub limit: usize,
    pub offset: usize,
}

pub fn cmd_deltas(repo: &DeltaRepository, query: DeltaQuery, format: &OutputFormat) -> Result<()> {
    let block_range = match query.block {
        Some(block) => Some((block, block)),
        None => query.block_range,
    };
    if query.address.is_none() && block_range.is_none() {
        return Err(anyhow!(
            "Please specify at least one filter: --address, --block, or --block-range"
        ));
    }

    let deltas = repo.query_deltas(
        query.network.as_deref(),
        query.address.as_deref(),
        block_range,
        query.limit,
        query.offset,
    )?;
    println!("{}", format_deltas(&deltas, format));
    Ok(())
}

/// Evaluates (and checkpoints) the diff of one wallet up to its latest
/// transaction.
pub fn cmd_diff<S, C, N, G>(
    store: &impl LedgerStore,
    cache: &impl Cache,
    checker: &DiffChecker<S, C, N, G>,
    wallet_id: i64,
    format: &OutputFormat,
) -> Result<()>
where
    S: LedgerStore,
    C: Cache,
    N: Notifier,
    G: GaugeSink,
{
    let wallet = store
        .wallet(wallet_id)?
        .ok_or_else(|| anyhow!("Wallet {} not found", wallet_id))?;
    let diff = checker.check_wallet_diff(&wallet, None)?;
    let checkpoint: Option<DiffCheckpoint> = cache.get_as(&checkpoint_key(wallet_id))?;

    let view = DiffView {
        wallet_id,
        currency: wallet.currency.to_string(),
        username: wallet.username,
        diff,
        checkpoint,
    };
    println!("{}", format_diff(&view, format));
    Ok(())
}

/// Prints a provider transaction, or only what it means for `address` when
/// one is given.
pub async fn cmd_tx<P, C, G>(
    scanner: &BlockScanner<P, C, G>,
    hash: &str,
    address: Option<&str>,
    format: &OutputFormat,
) -> Result<()>
where
    P: BlockProvider,
    C: Cache,
    G: GaugeSink,
{
    match address {
        Some(address) => {
            let raw = scanner.get_raw_tx(hash).await?;
            let view = scanner
                .parser()
                .parse_address_tx(&raw, address)
                .ok_or_else(|| anyhow!("Transaction {} failed validation", hash))?;
            println!("{}", format_address_tx(&view, format));
        }
        None => {
            let tx = scanner.get_tx_details(hash).await?;
            println!("{}", format_transaction(&tx, format));
        }
    }
    Ok(())
}

pub async fn cmd_balance<P, C, G>(
    scanner: &mut BlockScanner<P, C, G>,
    address: &str,
    format: &OutputFormat,
) -> Result<()>
where
    P: BlockProvider,
    C: Cache,
    G: GaugeSink,
{
    let balances = scanner
        .get_balance(address)
        .await?
        .ok_or_else(|| anyhow!("No balance returned for {}", address))?;
    println!("{}", format_balances(&balances, format));
    Ok(())
}
