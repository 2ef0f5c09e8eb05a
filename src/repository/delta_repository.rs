use super::models::{AddressDelta, parse_decimal};
use crate::parser::Direction;
use crate::scanner::{AddressLedger, AddressLedgers, DeltaSink};
use anyhow::Result;
use rusqlite::{Connection, Row, ToSql, params, params_from_iter};

/// Persists scanner output. Rows are unique per
/// `(network, tx_hash, address, currency, direction)`, so rescanning a window
/// never duplicates deltas.
pub struct DeltaRepository<'a> {
    conn: &'a Connection,
}

impl<'a> DeltaRepository<'a> {
    const INSERT_DELTA: &'static str = "INSERT OR IGNORE INTO address_deltas (
            network, tx_hash, address, currency, direction,
            value, contract_address, block_height, symbol
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

    const SELECT_DELTA: &'static str = "SELECT network, tx_hash, address, currency, direction, value, contract_address, block_height, symbol FROM address_deltas";

    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert_batch(&self, network: &str, ledgers: &AddressLedgers) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut count = 0;

        {
            let mut stmt = tx.prepare(Self::INSERT_DELTA)?;
            let sides: [(&AddressLedger, Direction); 2] = [
                (&ledgers.incoming_txs, Direction::Incoming),
                (&ledgers.outgoing_txs, Direction::Outgoing),
            ];
            for (ledger, direction) in sides {
                for (address, by_currency) in ledger {
                    for (currency, entries) in by_currency {
                        for entry in entries {
                            count += stmt.execute(params![
                                network,
                                entry.tx_hash,
                                address,
                                currency,
                                direction.as_str(),
                                entry.value.to_string(),
                                entry.contract_address,
                                entry.block_height,
                                entry.symbol,
                            ])?;
                        }
                    }
                }
            }
        }

        tx.commit()?;
        Ok(count)
    }

    pub fn query_deltas(
        &self,
        network: Option<&str>,
        address: Option<&str>,
        block_range: Option<(u64, u64)>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AddressDelta>> {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(network) = network {
            conditions.push("network = ?");
            params.push(Box::new(network.to_string()));
        }

        if let Some(address) = address {
            conditions.push("address = ?");
            params.push(Box::new(address.to_string()));
        }

        if let Some((start, end)) = block_range {
            conditions.push("block_height >= ?");
            params.push(Box::new(start));
            conditions.push("block_height <= ?");
            params.push(Box::new(end));
        }

        let mut query = Self::SELECT_DELTA.to_string();
        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }
        query.push_str(&format!(
            " ORDER BY block_height, tx_hash, direction LIMIT {limit} OFFSET {offset}"
        ));

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt
            .query_map(params_from_iter(params), |row| Ok(Self::row_to_delta(row)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().collect()
    }

    fn row_to_delta(row: &Row) -> Result<AddressDelta> {
        Ok(AddressDelta {
            network: row.get(0)?,
            tx_hash: row.get(1)?,
            address: row.get(2)?,
            currency: row.get(3)?,
            direction: row.get(4)?,
            value: parse_decimal(&row.get::<_, String>(5)?)?,
            contract_address: row.get(6)?,
            block_height: row.get(7)?,
            symbol: row.get(8)?,
        })
    }
}

impl DeltaSink for DeltaRepository<'_> {
    fn record_deltas(&self, network: &str, ledgers: &AddressLedgers) -> Result<usize> {
        self.insert_batch(network, ledgers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::Currency;
    use crate::repository::Database;
    use crate::scanner::LedgerEntry;
    use rust_decimal::Decimal;

    fn ledgers() -> AddressLedgers {
        let entry = LedgerEntry {
            tx_hash: "h1".into(),
            value: Decimal::new(9, 0),
            contract_address: None,
            block_height: 100,
            symbol: "BTC".into(),
        };
        let mut ledgers = AddressLedgers::default();
        ledgers
            .incoming_txs
            .entry("B".into())
            .or_default()
            .insert(Currency::Btc, vec![entry.clone()]);
        ledgers
            .outgoing_txs
            .entry("A".into())
            .or_default()
            .insert(Currency::Btc, vec![entry]);
        ledgers
    }

    #[test]
    fn rescans_do_not_duplicate_deltas() {
        let db = Database::new(":memory:").unwrap();
        let repo = DeltaRepository::new(&db.conn);
        assert_eq!(repo.record_deltas("btc", &ledgers()).unwrap(), 2);
        assert_eq!(repo.record_deltas("btc", &ledgers()).unwrap(), 0);
        assert_eq!(repo.record_deltas("ltc", &ledgers()).unwrap(), 2);

        let btc = repo.query_deltas(Some("btc"), None, None, 10, 0).unwrap();
        assert_eq!(btc.len(), 2);
        let b = repo.query_deltas(Some("btc"), Some("B"), Some((100, 100)), 10, 0).unwrap();
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].direction, "incoming");
        assert_eq!(b[0].value, Decimal::new(9, 0));
        assert_eq!(b[0].currency, Currency::Btc);
    }
}
