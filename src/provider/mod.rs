pub mod blockbook;

pub use blockbook::BlockbookClient;

use crate::error::ApiError;
use crate::units::RawAmount;
use serde::{Deserialize, Deserializer};

/// Health of a provider backend, normalised from its status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderStatus {
    pub synced: bool,
    pub warnings: Vec<String>,
    pub best_height: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPage {
    #[serde(default)]
    pub txs: Option<Vec<RawTransaction>>,
    #[serde(default)]
    pub total_pages: Option<u32>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawIo {
    #[serde(default)]
    pub addresses: Option<Vec<String>>,
    #[serde(default)]
    pub value: Option<RawAmount>,
    #[serde(default)]
    pub is_address: bool,
}

impl RawIo {
    /// The single address of this input/output, if it has exactly one.
    pub fn single_address(&self) -> Option<&str> {
        match self.addresses.as_deref() {
            Some([address]) => Some(address.as_str()),
            _ => None,
        }
    }

    pub fn first_address(&self) -> Option<&str> {
        self.addresses
            .as_deref()
            .and_then(|a| a.first())
            .map(String::as_str)
    }

    pub fn has_value(&self) -> bool {
        self.value.as_ref().is_some_and(|v| !v.is_blank())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTokenTransfer {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub contract: Option<String>,
    #[serde(default)]
    pub value: Option<RawAmount>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub decimals: Option<u32>,
}

impl RawTokenTransfer {
    /// Contract address, lowercased. Blockbook v2 reports it as `contract`,
    /// older backends as `token`.
    pub fn contract_address(&self) -> Option<String> {
        self.token
            .as_deref()
            .or(self.contract.as_deref())
            .filter(|a| !a.is_empty())
            .map(str::to_lowercase)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthereumSpecific {
    #[serde(default)]
    pub status: Option<i64>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    #[serde(default)]
    pub txid: Option<String>,
    /// `None` while the transaction sits in the mempool (reported as `-1`).
    #[serde(default, deserialize_with = "mined_height")]
    pub block_height: Option<u64>,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub confirmations: Option<u64>,
    #[serde(default)]
    pub fees: Option<RawAmount>,
    #[serde(default)]
    pub value: Option<RawAmount>,
    #[serde(default)]
    pub vin: Option<Vec<RawIo>>,
    #[serde(default)]
    pub vout: Option<Vec<RawIo>>,
    #[serde(default)]
    pub token_transfers: Option<Vec<RawTokenTransfer>>,
    #[serde(default)]
    pub ethereum_specific: Option<EthereumSpecific>,
}

fn mined_height<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let height = Option::<i64>::deserialize(deserializer)?;
    Ok(height.and_then(|h| u64::try_from(h).ok()))
}

impl RawTransaction {
    pub fn inputs(&self) -> &[RawIo] {
        self.vin.as_deref().unwrap_or_default()
    }

    pub fn outputs(&self) -> &[RawIo] {
        self.vout.as_deref().unwrap_or_default()
    }

    pub fn token_transfers(&self) -> &[RawTokenTransfer] {
        self.token_transfers.as_deref().unwrap_or_default()
    }

    /// Account-style transactions carry the transferred value on the
    /// transaction itself; UTXO inputs carry their own values.
    pub fn is_account_shaped(&self) -> bool {
        !self.inputs().first().is_some_and(RawIo::has_value)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTokenBalance {
    #[serde(default)]
    pub contract: Option<String>,
    #[serde(default)]
    pub balance: Option<RawAmount>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub decimals: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBalance {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub balance: Option<RawAmount>,
    #[serde(default)]
    pub unconfirmed_balance: Option<RawAmount>,
    #[serde(default)]
    pub tokens: Option<Vec<RawTokenBalance>>,
}

/// Blockchain data provider consumed by the scanner. Every failure is folded
/// into [`ApiError`] before the scanner reasons about it.
#[allow(async_fn_in_trait)]
pub trait BlockProvider {
    async fn get_status(&self) -> Result<ProviderStatus, ApiError>;

    /// `Ok(None)` means the provider answered with an empty body.
    async fn get_block(&self, height: u64, page: u32) -> Result<Option<BlockPage>, ApiError>;

    async fn get_tx(&self, hash: &str) -> Result<Option<RawTransaction>, ApiError>;

    async fn get_balance(&self, address: &str, details: &str)
    -> Result<Option<RawBalance>, ApiError>;
}

impl<P: BlockProvider> BlockProvider for &P {
    async fn get_status(&self) -> Result<ProviderStatus, ApiError> {
        (**self).get_status().await
    }

    async fn get_block(&self, height: u64, page: u32) -> Result<Option<BlockPage>, ApiError> {
        (**self).get_block(height, page).await
    }

    async fn get_tx(&self, hash: &str) -> Result<Option<RawTransaction>, ApiError> {
        (**self).get_tx(hash).await
    }

    async fn get_balance(&self, address: &str, details: &str)
    -> Result<Option<RawBalance>, ApiError> {
        (**self).get_balance(address, details).await
    }
}
