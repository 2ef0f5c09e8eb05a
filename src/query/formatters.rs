use crate::checker::DiffCheckpoint;
use crate::currency::Currency;
use crate::parser::{AddressTx, BalanceEntry, Transaction};
use crate::repository::AddressDelta;
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WatermarkView {
    pub network: String,
    pub watermark: Option<u64>,
    pub consecutive_failures: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffView {
    pub wallet_id: i64,
    pub currency: String,
    pub username: String,
    pub diff: Decimal,
    pub checkpoint: Option<DiffCheckpoint>,
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header);
    table
}

fn csv_string(rows: Vec<Vec<String>>) -> String {
    let mut wtr = Writer::from_writer(vec![]);
    for row in rows {
        let _ = wtr.write_record(&row);
    }
    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

fn optional<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

pub fn format_watermark(view: &WatermarkView, format: &OutputFormat) -> String {
    let watermark = optional(&view.watermark);
    let failures = view.consecutive_failures.unwrap_or(0).to_string();
    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Network", "Watermark", "Consecutive Failures"]);
            table.add_row(vec![
                Cell::new(&view.network),
                Cell::new(if watermark.is_empty() { "-" } else { &watermark }),
                Cell::new(&failures),
            ]);
            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(view).unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => csv_string(vec![
            vec![
                "network".to_string(),
                "watermark".to_string(),
                "consecutive_failures".to_string(),
            ],
            vec![view.network.clone(), watermark, failures],
        ]),
    }
}

pub fn format_deltas(deltas: &[AddressDelta], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if deltas.is_empty() {
                return "No address deltas found.".to_string();
            }
            let mut table = new_table(vec![
                "Block", "Address", "Direction", "Currency", "Value", "Contract", "Tx Hash",
            ]);
            for delta in deltas {
                table.add_row(vec![
                    Cell::new(delta.block_height),
                    Cell::new(&delta.address),
                    Cell::new(&delta.direction),
                    Cell::new(&delta.symbol),
                    Cell::new(delta.value.normalize()),
                    Cell::new(delta.contract_address.as_deref().unwrap_or("-")),
                    Cell::new(format_tx_hash(&delta.tx_hash)),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            let rows: Vec<_> = deltas
                .iter()
                .map(|d| {
                    json!({
                        "network": d.network,
                        "block_height": d.block_height,
                        "tx_hash": d.tx_hash,
                        "address": d.address,
                        "direction": d.direction,
                        "currency": d.currency,
                        "symbol": d.symbol,
                        "value": d.value.normalize().to_string(),
                        "contract_address": d.contract_address,
                    })
                })
                .collect();
            serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => {
            let mut rows = vec![
                [
                    "network",
                    "block_height",
                    "tx_hash",
                    "address",
                    "direction",
                    "currency",
                    "value",
                    "contract_address",
                ]
                .map(String::from)
                .to_vec(),
            ];
            for d in deltas {
                rows.push(vec![
                    d.network.clone(),
                    d.block_height.to_string(),
                    d.tx_hash.clone(),
                    d.address.clone(),
                    d.direction.clone(),
                    d.currency.to_string(),
                    d.value.normalize().to_string(),
                    optional(&d.contract_address),
                ]);
            }
            csv_string(rows)
        }
    }
}

pub fn format_diff(view: &DiffView, format: &OutputFormat) -> String {
    let (checked_id, checked_at) = match &view.checkpoint {
        Some(c) => (c.id.to_string(), c.created_at.to_rfc3339()),
        None => (String::new(), String::new()),
    };
    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Wallet", "User", "Currency", "Diff", "Checked Tx", "Checked At"]);
            table.add_row(vec![
                Cell::new(view.wallet_id),
                Cell::new(&view.username),
                Cell::new(&view.currency),
                Cell::new(view.diff.normalize()),
                Cell::new(&checked_id),
                Cell::new(&checked_at),
            ]);
            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(view).unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => csv_string(vec![
            ["wallet_id", "username", "currency", "diff", "checked_tx", "checked_at"]
                .map(String::from)
                .to_vec(),
            vec![
                view.wallet_id.to_string(),
                view.username.clone(),
                view.currency.clone(),
                view.diff.normalize().to_string(),
                checked_id,
                checked_at,
            ],
        ]),
    }
}

pub fn format_transaction(tx: &Transaction, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            let mut summary = new_table(vec!["Hash", "Block", "Date", "Confirmations", "Fees", "Success"]);
            summary.add_row(vec![
                Cell::new(optional(&tx.hash)),
                Cell::new(optional(&tx.block)),
                Cell::new(tx.date.map(|d| d.to_rfc3339()).unwrap_or_default()),
                Cell::new(optional(&tx.confirmations)),
                Cell::new(tx.fees.map(|f| f.normalize().to_string()).unwrap_or_default()),
                Cell::new(tx.success),
            ]);
            if tx.transfers.is_empty() {
                return summary.to_string();
            }
            let mut transfers = new_table(vec!["Type", "Symbol", "From", "To", "Value", "Valid"]);
            for t in &tx.transfers {
                transfers.add_row(vec![
                    Cell::new(&t.kind),
                    Cell::new(t.symbol.as_deref().unwrap_or("-")),
                    Cell::new(t.from.as_deref().unwrap_or("-")),
                    Cell::new(t.to.as_deref().unwrap_or("-")),
                    Cell::new(t.value.normalize()),
                    Cell::new(t.is_valid),
                ]);
            }
            format!("{summary}\n{transfers}")
        }
        OutputFormat::Json => serde_json::to_string_pretty(tx).unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => {
            let mut rows = vec![
                ["hash", "block", "type", "symbol", "from", "to", "value", "is_valid"]
                    .map(String::from)
                    .to_vec(),
            ];
            for t in &tx.transfers {
                rows.push(vec![
                    optional(&tx.hash),
                    optional(&tx.block),
                    t.kind.to_string(),
                    optional(&t.symbol),
                    optional(&t.from),
                    optional(&t.to),
                    t.value.normalize().to_string(),
                    t.is_valid.to_string(),
                ]);
            }
            csv_string(rows)
        }
    }
}

pub fn format_address_tx(view: &BTreeMap<Currency, AddressTx>, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if view.is_empty() {
                return "Address not involved in transaction.".to_string();
            }
            let mut table = new_table(vec![
                "Currency", "Direction", "Amount", "Fee", "Block", "Confirmed", "From", "To",
            ]);
            for (currency, tx) in view {
                table.add_row(vec![
                    Cell::new(currency.symbol()),
                    Cell::new(tx.direction),
                    Cell::new(tx.amount.normalize()),
                    Cell::new(tx.fee.map(|f| f.normalize().to_string()).unwrap_or_default()),
                    Cell::new(optional(&tx.block)),
                    Cell::new(tx.confirmed),
                    Cell::new(tx.from_addresses.join(", ")),
                    Cell::new(tx.to_addresses.join(", ")),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(view).unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => {
            let mut rows = vec![
                ["currency", "direction", "amount", "fee", "block", "confirmed"]
                    .map(String::from)
                    .to_vec(),
            ];
            for (currency, tx) in view {
                rows.push(vec![
                    currency.to_string(),
                    tx.direction.to_string(),
                    tx.amount.normalize().to_string(),
                    tx.fee.map(|f| f.normalize().to_string()).unwrap_or_default(),
                    optional(&tx.block),
                    tx.confirmed.to_string(),
                ]);
            }
            csv_string(rows)
        }
    }
}

pub fn format_balances(balances: &BTreeMap<Currency, BalanceEntry>, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Symbol", "Balance", "Unconfirmed"]);
            for entry in balances.values() {
                table.add_row(vec![
                    Cell::new(&entry.symbol),
                    Cell::new(entry.amount.normalize()),
                    Cell::new(entry.unconfirmed_amount.normalize()),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(balances).unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => {
            let mut rows = vec![
                ["address", "symbol", "balance", "unconfirmed"]
                    .map(String::from)
                    .to_vec(),
            ];
            for entry in balances.values() {
                rows.push(vec![
                    entry.address.clone(),
                    entry.symbol.clone(),
                    entry.amount.normalize().to_string(),
                    entry.unconfirmed_amount.normalize().to_string(),
                ]);
            }
            csv_string(rows)
        }
    }
}

fn format_tx_hash(hash: &str) -> String {
    if hash.len() <= 12 {
        return hash.to_string();
    }
    format!("{}...{}", &hash[..6], &hash[hash.len() - 4..])
}
