use crate::cache::{Cache, DAY};
use crate::currency::Currency;
use crate::error::ApiError;
use crate::network::NetworkSpec;
use crate::parser::{BalanceEntry, TransactionParser, Transaction};
use crate::metrics::GaugeSink;
use crate::provider::{BlockProvider, ProviderStatus, RawTransaction};
use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Blocks behind the chain head the first scan of a network starts from.
const INITIAL_LAG_BLOCKS: u64 = 5;
const MIN_LOOP_DURATION_MS: u64 = 200;
const BALANCE_STATUS_CHECK_INTERVAL: TimeDelta = TimeDelta::hours(1);
const BALANCE_DETAILS: &str = "txslight";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanAddresses {
    pub input_addresses: BTreeSet<String>,
    pub output_addresses: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub tx_hash: String,
    pub value: Decimal,
    pub contract_address: Option<String>,
    pub block_height: u64,
    pub symbol: String,
}

pub type AddressLedger = BTreeMap<String, BTreeMap<Currency, Vec<LedgerEntry>>>;

/// Per-address deltas of one scan window. `incoming_txs` mirrors
/// `output_addresses`, `outgoing_txs` mirrors `input_addresses`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddressLedgers {
    pub incoming_txs: AddressLedger,
    pub outgoing_txs: AddressLedger,
}

impl AddressLedgers {
    fn push(ledger: &mut AddressLedger, address: &str, currency: Currency, entry: LedgerEntry) {
        ledger
            .entry(address.to_string())
            .or_default()
            .entry(currency)
            .or_default()
            .push(entry);
    }

    pub fn entry_count(&self) -> usize {
        let count = |ledger: &AddressLedger| -> usize {
            ledger
                .values()
                .flat_map(|by_currency| by_currency.values())
                .map(Vec::len)
                .sum()
        };
        count(&self.incoming_txs) + count(&self.outgoing_txs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanOutput {
    pub addresses: ScanAddresses,
    pub ledgers: AddressLedgers,
    pub watermark: u64,
    /// Number of blocks in the scanned window; zero when caught up.
    pub scanned_blocks: u64,
}

/// Consumer of scan results, e.g. the `address_deltas` table.
pub trait DeltaSink {
    /// Returns how many new deltas were stored.
    fn record_deltas(&self, network: &str, ledgers: &AddressLedgers) -> Result<usize>;
}

/// Mutable per-scanner state: provider handle and counters.
pub struct ScannerState<P> {
    pub provider: P,
    pub fail_count: u64,
    pub last_status_check: Option<DateTime<Utc>>,
}

impl<P: BlockProvider> ScannerState<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            fail_count: 0,
            last_status_check: None,
        }
    }
}

#[derive(Debug)]
pub enum ScanStep {
    Scanned { watermark: u64, blocks: u64, stored: usize },
    CaughtUp { watermark: u64 },
    Failed(ApiError),
}

pub struct BlockScanner<P, C, G> {
    parser: TransactionParser,
    state: ScannerState<P>,
    cache: C,
    gauge: G,
    poll_interval: Duration,
}

impl<P, C, G> BlockScanner<P, C, G>
where
    P: BlockProvider,
    C: Cache,
    G: GaugeSink,
{
    pub fn new(parser: TransactionParser, state: ScannerState<P>, cache: C, gauge: G) -> Self {
        Self {
            parser,
            state,
            cache,
            gauge,
            poll_interval: Duration::from_secs(12),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn spec(&self) -> &NetworkSpec {
        self.parser.spec()
    }

    pub fn state(&self) -> &ScannerState<P> {
        &self.state
    }

    pub fn parser(&self) -> &TransactionParser {
        &self.parser
    }

    async fn check_status(&self) -> Result<ProviderStatus, ApiError> {
        let started = Instant::now();
        let status = self.state.provider.get_status().await?;
        debug!("Status check took {:?}", started.elapsed());

        let spec = self.spec();
        if !spec.ignore_not_sync && !status.synced {
            return Err(ApiError::Status("Not sync API".into()));
        }
        if !status.warnings.is_empty() && !spec.ignore_warning {
            return Err(ApiError::Status(format!(
                "Warnings: {}",
                status.warnings.join("; ")
            )));
        }
        Ok(status)
    }

    fn cached_watermark(&self) -> Option<u64> {
        let key = self.spec().watermark_key();
        match self.cache.get_as::<u64>(&key) {
            Ok(value) => value,
            Err(e) => {
                warn!("Cannot read watermark {}: {}", key, e);
                None
            }
        }
    }

    /// Scans the next window of blocks and returns the per-address deltas
    /// found in it. Any provider failure aborts the whole window without
    /// touching the watermark.
    pub async fn get_latest_block(
        &mut self,
        after_block_number: Option<u64>,
        to_block_number: Option<u64>,
        include_inputs: bool,
        include_info: bool,
    ) -> Result<ScanOutput, ApiError> {
        let output = self
            .scan_window(after_block_number, to_block_number, include_inputs, include_info)
            .await?;
        self.advance_watermark(output.watermark);
        Ok(output)
    }

    /// Computes the next window without writing anything to the cache.
    async fn scan_window(
        &self,
        after_block_number: Option<u64>,
        to_block_number: Option<u64>,
        include_inputs: bool,
        include_info: bool,
    ) -> Result<ScanOutput, ApiError> {
        let status = self.check_status().await?;
        let mined = match to_block_number {
            Some(height) if height > 0 => height,
            _ => status
                .best_height
                .filter(|h| *h > 0)
                .ok_or_else(|| ApiError::Status("API Not Return block height".into()))?,
        };

        let processed = match after_block_number {
            Some(height) if height > 0 => height,
            _ => self
                .cached_watermark()
                .unwrap_or_else(|| mined.saturating_sub(INITIAL_LAG_BLOCKS)),
        };

        let min_height = if mined > processed {
            processed + 1
        } else {
            mined + 1
        };
        let max_height = (mined + 1).min(min_height + self.spec().max_blocks);

        debug!("Cache latest block height: {}", processed);
        info!(
            "Scanning {} blocks [{}, {})",
            self.spec().network,
            min_height,
            max_height
        );

        let mut addresses = ScanAddresses::default();
        let mut ledgers = AddressLedgers::default();
        for block_height in min_height..max_height {
            let mut page = 1;
            let mut total_pages = 1;
            while page <= total_pages {
                debug!("Getting block: {}, page: {}", block_height, page);
                let response = self
                    .state
                    .provider
                    .get_block(block_height, page)
                    .await?
                    .ok_or_else(|| ApiError::BlockPage {
                        height: block_height,
                        page,
                        reason: "empty response".into(),
                    })?;
                if let Some(err) = response.error.as_ref().filter(|e| is_error_marker(e)) {
                    return Err(ApiError::BlockPage {
                        height: block_height,
                        page,
                        reason: err.to_string(),
                    });
                }
                total_pages = response.total_pages.filter(|p| *p > 0).unwrap_or(1);

                for raw in response.txs.iter().flatten() {
                    self.aggregate(
                        raw,
                        block_height,
                        include_inputs,
                        include_info,
                        &mut addresses,
                        &mut ledgers,
                    );
                }
                page += 1;
            }
        }

        Ok(ScanOutput {
            addresses,
            ledgers,
            watermark: max_height - 1,
            scanned_blocks: max_height - min_height,
        })
    }

    fn aggregate(
        &self,
        raw: &RawTransaction,
        block_height: u64,
        include_inputs: bool,
        include_info: bool,
        addresses: &mut ScanAddresses,
        ledgers: &mut AddressLedgers,
    ) {
        let Some(legs) = self.parser.get_input_output_tx(raw, include_info) else {
            return;
        };
        let Some(tx_hash) = raw.txid.as_deref().filter(|h| !h.is_empty()) else {
            return;
        };

        let receivers = legs.receiving_addresses();
        addresses.output_addresses.extend(receivers.iter().cloned());
        if include_inputs {
            addresses
                .input_addresses
                .extend(legs.input_addresses.iter().cloned());
        }
        if !include_info {
            return;
        }

        for address in &receivers {
            for (currency, leg) in legs.outputs.get(address).into_iter().flatten() {
                AddressLedgers::push(&mut ledgers.incoming_txs, address, *currency, LedgerEntry {
                    tx_hash: tx_hash.to_string(),
                    value: leg.value,
                    contract_address: leg.contract_address.clone(),
                    block_height,
                    symbol: currency.symbol(),
                });
            }
        }

        if !include_inputs {
            return;
        }
        let native = self.spec().native_currency;
        let deduct_fee = !self.parser.is_account_format(raw);
        let fee = if deduct_fee { self.fee_of(raw) } else { Decimal::ZERO };
        for address in &legs.input_addresses {
            for (currency, leg) in legs.inputs.get(address).into_iter().flatten() {
                // Change returned to the sender is not an outgoing amount.
                let mut value = leg.value - legs.output_value(address, *currency);
                // The whole fee is charged to every distinct sender, matching
                // the deltas already stored by earlier scanners.
                if *currency == native {
                    value -= fee;
                }
                AddressLedgers::push(&mut ledgers.outgoing_txs, address, *currency, LedgerEntry {
                    tx_hash: tx_hash.to_string(),
                    value,
                    contract_address: leg.contract_address.clone(),
                    block_height,
                    symbol: currency.symbol(),
                });
            }
        }
    }

    fn fee_of(&self, raw: &RawTransaction) -> Decimal {
        raw.fees
            .as_ref()
            .and_then(|f| f.to_display(self.spec().precision).ok())
            .unwrap_or(Decimal::ZERO)
    }

    fn advance_watermark(&self, watermark: u64) {
        let key = self.spec().watermark_key();
        let Ok(height) = i64::try_from(watermark) else {
            warn!("Watermark {} does not fit the cache", watermark);
            return;
        };
        match self.cache.set_max(&key, height, DAY) {
            Ok(true) => {
                self.gauge.record_gauge(
                    "latest_block_processed",
                    &[("network", self.spec().cache_key)],
                    watermark as f64,
                );
            }
            Ok(false) => debug!("Watermark {} already at or beyond {}", key, watermark),
            Err(e) => error!("Failed to store watermark {}: {}", key, e),
        }
    }

    pub async fn get_tx_details(&self, tx_hash: &str) -> Result<Transaction, ApiError> {
        let raw = self
            .state
            .provider
            .get_tx(tx_hash)
            .await?
            .ok_or(ApiError::EmptyResponse("get_tx"))?;
        Ok(self.parser.parse_tx_details(&raw))
    }

    pub async fn get_raw_tx(&self, tx_hash: &str) -> Result<RawTransaction, ApiError> {
        self.state
            .provider
            .get_tx(tx_hash)
            .await?
            .ok_or(ApiError::EmptyResponse("get_tx"))
    }

    /// Balances of an address. The provider status is re-checked at most
    /// once an hour.
    pub async fn get_balance(
        &mut self,
        address: &str,
    ) -> Result<Option<BTreeMap<Currency, BalanceEntry>>, ApiError> {
        let now = Utc::now();
        let recently_checked = self
            .state
            .last_status_check
            .is_some_and(|t| t >= now - BALANCE_STATUS_CHECK_INTERVAL);
        if !recently_checked {
            self.state.last_status_check = Some(now);
            self.check_status().await?;
        }
        let response = self
            .state
            .provider
            .get_balance(address, BALANCE_DETAILS)
            .await?;
        Ok(response.map(|raw| self.parser.parse_balance(address, &raw)))
    }

    fn record_failure(&mut self, error: &ApiError) {
        self.state.fail_count += 1;
        let key = self.spec().failure_count_key();
        let count = match self.cache.incr(&key) {
            Ok(count) => count,
            Err(_) => {
                if let Err(e) = self.cache.set(&key, Value::from(1), DAY) {
                    warn!("Cannot store failure count {}: {}", key, e);
                }
                1
            }
        };
        self.gauge.record_gauge(
            "scanner_failures",
            &[("network", self.spec().cache_key)],
            count as f64,
        );
        warn!(
            "Scan of {} failed ({} in a row): {}",
            self.spec().network,
            self.state.fail_count,
            error
        );
    }

    fn reset_failures(&mut self) {
        if self.state.fail_count == 0 {
            return;
        }
        self.state.fail_count = 0;
        if let Err(e) = self.cache.delete(&self.spec().failure_count_key()) {
            warn!("Cannot reset failure count: {}", e);
        }
    }

    /// One scan window plus persistence of its deltas. Provider failures are
    /// counted and reported, not returned. The watermark only moves once the
    /// sink has accepted the window.
    pub async fn scan_once<D: DeltaSink>(&mut self, sink: &D) -> Result<ScanStep> {
        let output = match self.scan_window(None, None, true, true).await {
            Ok(output) => output,
            Err(e) => {
                self.record_failure(&e);
                return Ok(ScanStep::Failed(e));
            }
        };
        self.reset_failures();

        if output.scanned_blocks == 0 {
            self.advance_watermark(output.watermark);
            return Ok(ScanStep::CaughtUp {
                watermark: output.watermark,
            });
        }
        let stored = sink.record_deltas(self.spec().cache_key, &output.ledgers)?;
        self.advance_watermark(output.watermark);
        info!(
            "Stored {} of {} deltas up to block {}",
            stored,
            output.ledgers.entry_count(),
            output.watermark
        );
        Ok(ScanStep::Scanned {
            watermark: output.watermark,
            blocks: output.scanned_blocks,
            stored,
        })
    }

    pub async fn run<D: DeltaSink>(&mut self, sink: &D) -> Result<()> {
        info!(
            "Starting {} scanner from block {:?}",
            self.spec().network,
            self.cached_watermark()
        );

        loop {
            let loop_start = Instant::now();
            let step = match self.scan_once(sink).await {
                Ok(step) => step,
                Err(e) => {
                    error!("Failed to store deltas, window kept for retry: {:#}", e);
                    sleep(self.poll_interval).await;
                    continue;
                }
            };
            match step {
                ScanStep::Scanned { .. } => {
                    let target = Duration::from_millis(MIN_LOOP_DURATION_MS);
                    let elapsed = loop_start.elapsed();
                    if elapsed < target {
                        sleep(target - elapsed).await;
                    }
                }
                ScanStep::CaughtUp { watermark } => {
                    info!(
                        "Caught up to latest block {}. Entering polling mode...",
                        watermark
                    );
                    sleep(self.poll_interval).await;
                }
                ScanStep::Failed(_) => sleep(self.poll_interval).await,
            }
        }
    }
}

/// Blockbook sometimes sends `"error": null`/`false`/`""` on healthy pages.
fn is_error_marker(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn falsy_error_fields_are_not_errors() {
        assert!(!is_error_marker(&json!(null)));
        assert!(!is_error_marker(&json!(false)));
        assert!(!is_error_marker(&json!("")));
        assert!(is_error_marker(&json!("block not found")));
        assert!(is_error_marker(&json!({"message": "x"})));
    }

    #[test]
    fn entry_count_spans_both_directions() {
        let mut ledgers = AddressLedgers::default();
        let entry = LedgerEntry {
            tx_hash: "h".into(),
            value: Decimal::ONE,
            contract_address: None,
            block_height: 1,
            symbol: "BTC".into(),
        };
        AddressLedgers::push(&mut ledgers.incoming_txs, "a", Currency::Btc, entry.clone());
        AddressLedgers::push(&mut ledgers.incoming_txs, "a", Currency::Btc, entry.clone());
        AddressLedgers::push(&mut ledgers.outgoing_txs, "b", Currency::Btc, entry);
        assert_eq!(ledgers.entry_count(), 3);
    }
}
