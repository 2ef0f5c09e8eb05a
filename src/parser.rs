use crate::calls;
use crate::currency::Currency;
use crate::network::{ContractInfo, NetworkSpec, pseudo_contract};
use crate::provider::{RawBalance, RawIo, RawTokenTransfer, RawTransaction};
use crate::units::{PrecisionTable, RawAmount};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// Upper bound on token balances read from one address response.
const MAX_TOKEN_BALANCES: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum TransferKind {
    MainCoin,
    /// Provider token standard, e.g. `ERC20`.
    Token(String),
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferKind::MainCoin => f.write_str("MainCoin"),
            TransferKind::Token(kind) => f.write_str(kind),
        }
    }
}

impl From<TransferKind> for String {
    fn from(kind: TransferKind) -> Self {
        kind.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxLeg {
    pub currency: Currency,
    pub address: String,
    pub value: Decimal,
    pub is_valid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transfer {
    #[serde(rename = "type")]
    pub kind: TransferKind,
    pub currency: Currency,
    pub symbol: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub value: Decimal,
    pub token: Option<String>,
    pub is_valid: bool,
}

/// A provider transaction normalised to internal currencies and display units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub hash: Option<String>,
    pub block: Option<u64>,
    pub date: Option<DateTime<Utc>>,
    pub confirmations: Option<u64>,
    pub fees: Option<Decimal>,
    pub success: bool,
    pub inputs: Vec<TxLeg>,
    pub outputs: Vec<TxLeg>,
    pub transfers: Vec<Transfer>,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegValue {
    pub value: Decimal,
    /// Set only for pseudo-network contracts.
    pub contract_address: Option<String>,
}

/// `address -> currency -> summed value` for one side of a transaction.
pub type LegDetails = BTreeMap<String, BTreeMap<Currency, LegValue>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputOutput {
    pub input_addresses: BTreeSet<String>,
    pub inputs: LegDetails,
    pub output_addresses: BTreeSet<String>,
    pub outputs: LegDetails,
}

impl InputOutput {
    /// Receiving addresses that did not also fund the transaction.
    pub fn receiving_addresses(&self) -> BTreeSet<String> {
        self.output_addresses
            .difference(&self.input_addresses)
            .cloned()
            .collect()
    }

    pub fn output_value(&self, address: &str, currency: Currency) -> Decimal {
        self.outputs
            .get(address)
            .and_then(|by_currency| by_currency.get(&currency))
            .map(|leg| leg.value)
            .unwrap_or(Decimal::ZERO)
    }
}

fn add_leg(details: &mut LegDetails, address: &str, currency: Currency, leg: LegValue) {
    details
        .entry(address.to_string())
        .or_default()
        .entry(currency)
        .and_modify(|existing| existing.value += leg.value)
        .or_insert(leg);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceEntry {
    pub symbol: String,
    pub amount: Decimal,
    pub unconfirmed_amount: Decimal,
    pub address: String,
}

/// Per-address view of one transaction for a single currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressTx {
    pub hash: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub from_addresses: Vec<String>,
    pub to_addresses: Vec<String>,
    pub amount: Decimal,
    pub block: Option<u64>,
    pub fee: Option<Decimal>,
    pub confirmations: Option<u64>,
    pub direction: Direction,
    pub confirmed: bool,
}

/// Turns raw Blockbook transactions into normalised records and
/// address/value contribution maps. Pure: no I/O.
#[derive(Debug, Clone)]
pub struct TransactionParser {
    spec: NetworkSpec,
    precision: PrecisionTable,
}

impl TransactionParser {
    pub fn new(spec: NetworkSpec, precision: PrecisionTable) -> Self {
        Self { spec, precision }
    }

    pub fn spec(&self) -> &NetworkSpec {
        &self.spec
    }

    /// Converts a raw amount, logging and returning `None` when it is absent
    /// or cannot be represented.
    fn amount(&self, raw: Option<&RawAmount>, decimals: u32, what: &str) -> Option<Decimal> {
        let Some(raw) = raw else {
            debug!("Skipping {}: no value", what);
            return None;
        };
        match raw.to_display(decimals) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("Skipping {}: {}", what, e);
                None
            }
        }
    }

    fn quantize(&self, value: Decimal, currency: Currency) -> Decimal {
        self.precision.quantize(value, currency, self.spec.network)
    }

    /// Direct contract table first, then the pseudo-network table. The second
    /// element is the contract address only for pseudo-network hits.
    pub fn contract_currency(&self, token_address: &str) -> Option<(Currency, Option<String>)> {
        if let Some(info) = self
            .spec
            .contracts
            .iter()
            .find(|c| c.address.eq_ignore_ascii_case(token_address))
        {
            return Some((info.currency, None));
        }
        pseudo_contract(token_address)
            .map(|p| (p.destination_currency, Some(p.info.address.to_string())))
    }

    pub fn contract_info(
        &self,
        currency: Currency,
        contract_address: Option<&str>,
    ) -> Option<ContractInfo> {
        if let Some(pseudo) = contract_address.and_then(pseudo_contract) {
            return Some(pseudo.info);
        }
        self.spec
            .contracts
            .iter()
            .find(|c| c.currency == currency)
            .copied()
    }

    fn resolve_token(&self, transfer: &RawTokenTransfer) -> Option<(Currency, Option<String>, ContractInfo)> {
        let token_address = transfer.contract_address()?;
        let (currency, contract) = self.contract_currency(&token_address)?;
        let info = self.contract_info(currency, Some(&token_address))?;
        Some((currency, contract, info))
    }

    /// Account-format transactions carry the native value on the transaction
    /// itself rather than on each input.
    pub fn is_account_format(&self, raw: &RawTransaction) -> bool {
        self.spec.token_network || raw.is_account_shaped()
    }

    pub fn parse_tx_details(&self, raw: &RawTransaction) -> Transaction {
        let native = self.spec.native_currency;
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        let mut transfers = Vec::new();

        if raw.is_account_shaped() {
            if let Some(transfer) = self.main_coin_transfer(raw) {
                transfers.push(transfer);
            }
        } else {
            let legs = |ios: &[RawIo], what: &str| -> Vec<TxLeg> {
                ios.iter()
                    .filter(|io| io.is_address)
                    .filter_map(|io| {
                        let address = io.single_address().and_then(|a| self.spec.convert_address(a))?;
                        let value = self.amount(io.value.as_ref(), self.spec.precision, what)?;
                        Some(TxLeg {
                            currency: native,
                            address,
                            value: self.quantize(value, native),
                            is_valid: true,
                        })
                    })
                    .collect()
            };
            inputs = legs(raw.inputs(), "input");
            outputs = legs(raw.outputs(), "output");
        }

        for transfer in raw.token_transfers() {
            let Some((currency, _, info)) = self.resolve_token(transfer) else {
                continue;
            };
            let Some(value) = self.amount(transfer.value.as_ref(), info.decimals, "token transfer")
            else {
                continue;
            };
            transfers.push(Transfer {
                kind: TransferKind::Token(transfer.kind.clone().unwrap_or_default()),
                currency,
                symbol: transfer.symbol.clone().or_else(|| Some(info.symbol.to_string())),
                from: transfer.from.clone(),
                to: transfer.to.clone(),
                value: self.quantize(value, currency),
                token: transfer.token.clone(),
                is_valid: true,
            });
        }

        let success = raw
            .ethereum_specific
            .as_ref()
            .is_none_or(|eth| eth.status.is_none_or(|s| s == 1));

        Transaction {
            hash: raw.txid.clone(),
            block: raw.block_height,
            date: raw
                .block_time
                .and_then(|t| DateTime::from_timestamp(t, 0)),
            confirmations: raw.confirmations,
            fees: raw
                .fees
                .as_ref()
                .and_then(|f| self.amount(Some(f), self.spec.precision, "fees")),
            success,
            inputs,
            outputs,
            transfers,
            memo: None,
        }
    }

    fn main_coin_transfer(&self, raw: &RawTransaction) -> Option<Transfer> {
        let input = raw.inputs().first().filter(|io| io.is_address)?;
        let output = raw.outputs().first().filter(|io| io.is_address)?;
        let from = input.first_address()?;
        let to = output.first_address()?;
        let value = self.amount(raw.value.as_ref(), self.spec.precision, "main coin transfer")?;
        let native = self.spec.native_currency;
        Some(Transfer {
            kind: TransferKind::MainCoin,
            currency: native,
            symbol: Some(native.symbol()),
            from: Some(from.to_string()),
            to: Some(to.to_string()),
            value: self.quantize(value, native),
            token: None,
            is_valid: true,
        })
    }

    /// Spam and forgery filter for account chains: the call must have
    /// succeeded and its call data must be a plain value transfer or a known
    /// token transfer.
    pub fn validate_transaction(&self, raw: &RawTransaction) -> bool {
        if !self.spec.token_network {
            return true;
        }
        let Some(eth) = raw.ethereum_specific.as_ref() else {
            return false;
        };
        if eth.status != Some(1) {
            return false;
        }
        let data = eth.data.as_deref().unwrap_or_default();
        if raw.token_transfers().is_empty() {
            calls::is_plain_value_transfer(data)
        } else {
            calls::is_token_transfer_call(data, self.spec.extra_transfer_selectors)
        }
    }

    /// Address sets and per-address values of both sides of `raw`. `None`
    /// when the transaction fails validation. Values are only collected with
    /// `include_info`.
    pub fn get_input_output_tx(&self, raw: &RawTransaction, include_info: bool) -> Option<InputOutput> {
        if self.spec.token_network {
            if !self.validate_transaction(raw) {
                return None;
            }
            if !raw.token_transfers().is_empty() {
                return Some(self.token_legs(raw.token_transfers(), include_info));
            }
        }
        Some(self.native_legs(raw, include_info))
    }

    fn native_legs(&self, raw: &RawTransaction, include_info: bool) -> InputOutput {
        let account_format = self.is_account_format(raw);
        let mut result = InputOutput::default();
        for io in raw.inputs() {
            let value = if account_format {
                raw.value.as_ref()
            } else {
                io.value.as_ref()
            };
            let leg = self.native_leg(io, value, include_info, "input");
            self.record(leg, &mut result.input_addresses, &mut result.inputs);
        }
        for io in raw.outputs() {
            let leg = self.native_leg(io, io.value.as_ref(), include_info, "output");
            self.record(leg, &mut result.output_addresses, &mut result.outputs);
        }
        result
    }

    /// Address of one input/output plus its native value when requested and
    /// representable.
    fn native_leg(
        &self,
        io: &RawIo,
        value: Option<&RawAmount>,
        include_info: bool,
        what: &str,
    ) -> Option<(String, Option<Decimal>)> {
        if !io.is_address {
            return None;
        }
        let address = io.single_address().and_then(|a| self.spec.convert_address(a))?;
        let value = if include_info {
            self.amount(value, self.spec.precision, what)
        } else {
            None
        };
        Some((address, value))
    }

    fn record(
        &self,
        leg: Option<(String, Option<Decimal>)>,
        addresses: &mut BTreeSet<String>,
        details: &mut LegDetails,
    ) {
        let Some((address, value)) = leg else {
            return;
        };
        if let Some(value) = value {
            add_leg(details, &address, self.spec.native_currency, LegValue {
                value,
                contract_address: None,
            });
        }
        addresses.insert(address);
    }

    fn token_legs(&self, transfers: &[RawTokenTransfer], include_info: bool) -> InputOutput {
        let mut result = InputOutput::default();
        for transfer in transfers {
            let Some((currency, contract_address, info)) = self.resolve_token(transfer) else {
                debug!(
                    "Skipping token transfer with unknown contract {:?}",
                    transfer.contract_address()
                );
                continue;
            };
            let value = if include_info {
                match self.amount(transfer.value.as_ref(), info.decimals, "token transfer") {
                    Some(value) => Some(value),
                    None => continue,
                }
            } else {
                None
            };

            let from = transfer.from.as_deref().and_then(|a| self.spec.convert_address(a));
            let to = transfer.to.as_deref().and_then(|a| self.spec.convert_address(a));
            if let Some(from) = from {
                result.input_addresses.insert(from.clone());
                if let Some(value) = value {
                    add_leg(&mut result.inputs, &from, currency, LegValue {
                        value,
                        contract_address: contract_address.clone(),
                    });
                }
            }
            if let Some(to) = to {
                result.output_addresses.insert(to.clone());
                if let Some(value) = value {
                    add_leg(&mut result.outputs, &to, currency, LegValue {
                        value,
                        contract_address: contract_address.clone(),
                    });
                }
            }
        }
        result
    }

    /// Normalises an address balance response: the native balance plus every
    /// resolvable token balance.
    pub fn parse_balance(&self, address: &str, raw: &RawBalance) -> BTreeMap<Currency, BalanceEntry> {
        let native = self.spec.native_currency;
        let mut balances = BTreeMap::new();

        let amount = self
            .amount(raw.balance.as_ref(), self.spec.precision, "balance")
            .unwrap_or(Decimal::ZERO);
        let unconfirmed_amount = raw
            .unconfirmed_balance
            .as_ref()
            .and_then(|b| match b.to_display_signed(self.spec.precision) {
                Ok(v) => Some(v),
                Err(e) => {
                    debug!("Ignoring unconfirmed balance of {}: {}", address, e);
                    None
                }
            })
            .unwrap_or(Decimal::ZERO);
        balances.insert(native, BalanceEntry {
            symbol: native.symbol(),
            amount,
            unconfirmed_amount,
            address: address.to_string(),
        });

        for token in raw.tokens.iter().flatten().take(MAX_TOKEN_BALANCES) {
            let Some(contract) = token.contract.as_deref().map(str::to_lowercase) else {
                continue;
            };
            let Some((currency, _)) = self.contract_currency(&contract) else {
                continue;
            };
            let Some(info) = self.contract_info(currency, Some(&contract)) else {
                continue;
            };
            let Some(amount) = self.amount(token.balance.as_ref(), info.decimals, "token balance")
            else {
                continue;
            };
            balances.insert(currency, BalanceEntry {
                symbol: info.symbol.to_string(),
                amount,
                unconfirmed_amount: Decimal::ZERO,
                address: address.to_string(),
            });
        }
        balances
    }

    /// What `raw` means for one address, per currency. `None` when the
    /// transaction fails validation.
    pub fn parse_address_tx(
        &self,
        raw: &RawTransaction,
        address: &str,
    ) -> Option<BTreeMap<Currency, AddressTx>> {
        let legs = self.get_input_output_tx(raw, true)?;
        let receivers = legs.receiving_addresses();
        let direction = if receivers.iter().any(|a| a.eq_ignore_ascii_case(address)) {
            Direction::Incoming
        } else {
            Direction::Outgoing
        };
        let address = self.spec.convert_address(address)?;

        let mut amounts: BTreeMap<Currency, Decimal> = BTreeMap::new();
        if let Some(inputs) = legs.inputs.get(&address) {
            for (currency, leg) in inputs {
                amounts.insert(*currency, leg.value);
            }
        }
        if let Some(outputs) = legs.outputs.get(&address) {
            for (currency, leg) in outputs {
                let entry = amounts.entry(*currency).or_default();
                match direction {
                    Direction::Outgoing => *entry -= leg.value,
                    Direction::Incoming => *entry = leg.value,
                }
            }
        }

        let fee = raw
            .fees
            .as_ref()
            .and_then(|f| self.amount(Some(f), self.spec.precision, "fees"));
        let confirmed = raw
            .confirmations
            .is_some_and(|c| c > self.spec.confirmed_num);
        let from_addresses: Vec<String> = legs.input_addresses.iter().cloned().collect();
        let to_addresses: Vec<String> = receivers.into_iter().collect();

        Some(
            amounts
                .into_iter()
                .map(|(currency, amount)| {
                    (currency, AddressTx {
                        hash: raw.txid.clone(),
                        date: raw.block_time.and_then(|t| DateTime::from_timestamp(t, 0)),
                        from_addresses: from_addresses.clone(),
                        to_addresses: to_addresses.clone(),
                        amount,
                        block: raw.block_height,
                        fee,
                        confirmations: raw.confirmations,
                        direction,
                        confirmed,
                    })
                })
                .collect(),
        )
    }
}
