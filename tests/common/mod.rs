#![allow(dead_code)]

use chain_recon::cache::MemoryCache;
use chain_recon::error::ApiError;
use chain_recon::metrics::RecordingGauge;
use chain_recon::network::{Network, NetworkSpec};
use chain_recon::parser::TransactionParser;
use chain_recon::provider::{BlockPage, BlockProvider, ProviderStatus, RawBalance, RawTransaction};
use chain_recon::scanner::{BlockScanner, ScannerState};
use chain_recon::units::PrecisionTable;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub const SATOSHI: u64 = 100_000_000;

/// Scripted in-process provider. Blocks and transactions are served from
/// maps; individual pages can be made to fail.
#[derive(Default)]
pub struct FixtureProvider {
    status: Mutex<ProviderStatus>,
    blocks: Mutex<HashMap<(u64, u32), Value>>,
    failing: Mutex<HashSet<(u64, u32)>>,
    txs: Mutex<HashMap<String, Value>>,
    calls: Mutex<Vec<(u64, u32)>>,
}

impl FixtureProvider {
    pub fn new(best_height: u64) -> Self {
        let provider = Self::default();
        provider.set_best_height(best_height);
        provider
    }

    pub fn set_best_height(&self, height: u64) {
        let mut status = self.status.lock().unwrap();
        status.synced = true;
        status.best_height = Some(height);
    }

    pub fn set_status(&self, status: ProviderStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Serves `txs` as the only page of `height`.
    pub fn add_block(&self, height: u64, txs: Vec<Value>) {
        self.add_page(height, 1, 1, txs);
    }

    pub fn add_page(&self, height: u64, page: u32, total_pages: u32, txs: Vec<Value>) {
        for tx in &txs {
            if let Some(hash) = tx["txid"].as_str() {
                self.txs.lock().unwrap().insert(hash.to_string(), tx.clone());
            }
        }
        self.blocks.lock().unwrap().insert(
            (height, page),
            json!({"page": page, "totalPages": total_pages, "txs": txs}),
        );
    }

    /// Serves a page whose body carries an `error` field.
    pub fn add_error_page(&self, height: u64, message: &str) {
        self.blocks
            .lock()
            .unwrap()
            .insert((height, 1), json!({"error": message}));
    }

    pub fn fail_page(&self, height: u64, page: u32) {
        self.failing.lock().unwrap().insert((height, page));
    }

    pub fn heal_page(&self, height: u64, page: u32) {
        self.failing.lock().unwrap().remove(&(height, page));
    }

    pub fn requested_pages(&self) -> Vec<(u64, u32)> {
        self.calls.lock().unwrap().clone()
    }
}

impl BlockProvider for FixtureProvider {
    async fn get_status(&self) -> Result<ProviderStatus, ApiError> {
        Ok(self.status.lock().unwrap().clone())
    }

    async fn get_block(&self, height: u64, page: u32) -> Result<Option<BlockPage>, ApiError> {
        self.calls.lock().unwrap().push((height, page));
        if self.failing.lock().unwrap().contains(&(height, page)) {
            return Err(ApiError::Transport(format!("connection reset at block {height}")));
        }
        // Unknown blocks come back as an empty body.
        let Some(body) = self.blocks.lock().unwrap().get(&(height, page)).cloned() else {
            return Ok(None);
        };
        serde_json::from_value(body)
            .map(Some)
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn get_tx(&self, hash: &str) -> Result<Option<RawTransaction>, ApiError> {
        let Some(body) = self.txs.lock().unwrap().get(hash).cloned() else {
            return Ok(None);
        };
        serde_json::from_value(body)
            .map(Some)
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn get_balance(&self, address: &str, _details: &str) -> Result<Option<RawBalance>, ApiError> {
        Ok(Some(RawBalance {
            address: Some(address.to_string()),
            ..Default::default()
        }))
    }
}

pub fn spec(network: Network) -> NetworkSpec {
    network.spec().unwrap()
}

pub fn scanner<'a>(
    network: Network,
    provider: &'a FixtureProvider,
    cache: &'a MemoryCache,
    gauge: &'a RecordingGauge,
) -> BlockScanner<&'a FixtureProvider, &'a MemoryCache, &'a RecordingGauge> {
    let parser = TransactionParser::new(spec(network), PrecisionTable::default());
    BlockScanner::new(parser, ScannerState::new(provider), cache, gauge)
}

/// A UTXO transaction. Amounts are in minor units.
pub fn utxo_tx(txid: &str, block: u64, inputs: &[(&str, u64)], outputs: &[(&str, u64)], fee: u64) -> Value {
    let io = |legs: &[(&str, u64)]| -> Vec<Value> {
        legs.iter()
            .map(|(address, value)| {
                json!({"addresses": [address], "value": value.to_string(), "isAddress": true})
            })
            .collect()
    };
    json!({
        "txid": txid,
        "blockHeight": block,
        "blockTime": 1_700_000_000,
        "confirmations": 1,
        "fees": fee.to_string(),
        "vin": io(inputs),
        "vout": io(outputs),
    })
}

/// An account-style transaction: inputs carry no value, the transferred
/// amount sits on the transaction.
pub fn account_tx(txid: &str, block: u64, from: &str, to: &str, value: u64, fee: u64) -> Value {
    json!({
        "txid": txid,
        "blockHeight": block,
        "blockTime": 1_700_000_600,
        "confirmations": 1,
        "fees": fee.to_string(),
        "value": value.to_string(),
        "vin": [{"addresses": [from], "isAddress": true}],
        "vout": [{"addresses": [to], "value": value.to_string(), "isAddress": true}],
    })
}
