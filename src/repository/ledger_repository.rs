use super::models::{
    BankDeposit, CardDeposit, CardDepositStatus, ConfirmedDeposit, CryptoDepositSums,
    LedgerTransaction, Order, RecentWindow, RefModule, SettlementWindow, Trade,
    TransactionSums, TransactionType, Wallet, WithdrawRequest, ordering_key, parse_decimal,
    sum_decimals,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rust_decimal::Decimal;

/// Read side of the wallet ledger used by the checkers.
pub trait LedgerStore {
    fn wallet(&self, id: i64) -> Result<Option<Wallet>>;

    fn transaction(&self, id: i64) -> Result<Option<LedgerTransaction>>;

    fn order(&self, id: i64) -> Result<Option<Order>>;

    /// Trades with `id > after_id` created inside `window`, by id.
    fn recent_trades(&self, after_id: i64, window: RecentWindow, limit: usize) -> Result<Vec<Trade>>;

    /// Transactions past the `after_id` cursor created inside `window`, by
    /// creation time. Non-positive ids are always past a positive cursor.
    fn recent_transactions(
        &self,
        after_id: i64,
        window: RecentWindow,
        limit: usize,
    ) -> Result<Vec<LedgerTransaction>>;

    /// Transactions of a wallet whose ordering key lies in
    /// `[key(from_id), key(before_id))`, newest first.
    fn transactions_between(
        &self,
        wallet_id: i64,
        from_id: i64,
        before_id: i64,
        limit: usize,
    ) -> Result<Vec<LedgerTransaction>>;

    /// The wallet transaction right before `before_id` by ordering key.
    fn previous_transaction(&self, wallet_id: i64, before_id: i64) -> Result<Option<LedgerTransaction>>;

    /// Newest transactions of a wallet created at or after `since`.
    fn latest_transactions(
        &self,
        wallet_id: i64,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LedgerTransaction>>;

    fn wallet_transaction_sum(&self, wallet_id: i64) -> Result<Decimal>;

    fn recent_withdraws(
        &self,
        after_id: i64,
        window: RecentWindow,
        limit: usize,
    ) -> Result<Vec<WithdrawRequest>>;

    /// Valid card deposits (`amount - fee`) settled in `window`.
    fn card_deposit_sum(&self, user_id: i64, window: SettlementWindow) -> Result<Decimal>;

    /// Confirmed bank deposits (`amount - fee`) settled in `window`.
    fn bank_deposit_sum(&self, user_id: i64, window: SettlementWindow) -> Result<Decimal>;

    fn crypto_deposit_sums(&self, wallet_id: i64, window: SettlementWindow) -> Result<CryptoDepositSums>;

    fn withdraw_sum(&self, wallet_id: i64, window: SettlementWindow) -> Result<Decimal>;

    /// Withdraw requests referenced by internal-transfer deposits of the
    /// wallet created in `window`.
    fn internal_transfer_withdraw_sum(&self, wallet_id: i64, window: SettlementWindow) -> Result<Decimal>;

    fn transaction_sums(&self, wallet_id: i64, window: SettlementWindow) -> Result<TransactionSums>;
}

pub struct LedgerRepository<'a> {
    conn: &'a Connection,
}

/// SQL form of [`ordering_key`].
const ORDER_KEY: &str = "(CASE WHEN id > 0 THEN id ELSE id + 2147483647 END)";

impl<'a> LedgerRepository<'a> {
    const SELECT_WALLET: &'static str =
        "SELECT id, user_id, username, currency, balance FROM wallets WHERE id = ?1";
    const SELECT_TRANSACTION: &'static str = "SELECT id, wallet_id, tp, amount, balance, created_at, ref_module, ref_id, description FROM transactions";
    const SELECT_ORDER: &'static str = "SELECT id, user_id, amount, matched_amount, matched_total_price, fee, price, is_market, is_margin FROM orders WHERE id = ?1";
    const SELECT_TRADE: &'static str = "SELECT id, src_currency, dst_currency, seller_id, buyer_id, sell_order_id, buy_order_id, matched_amount, matched_price, sell_fee_amount, buy_fee_amount, sell_deposit_id, sell_withdraw_id, buy_deposit_id, buy_withdraw_id, created_at FROM trades";
    const SELECT_WITHDRAW: &'static str = "SELECT id, wallet_id, amount, status, transaction_id, auto_withdraw_committed, created_at FROM withdraw_requests";

    const INSERT_WALLET: &'static str = "INSERT INTO wallets (id, user_id, username, currency, balance) VALUES (?1, ?2, ?3, ?4, ?5)";
    const INSERT_TRANSACTION: &'static str = "INSERT INTO transactions (
            id, wallet_id, tp, amount, balance, created_at, ref_module, ref_id, description
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";
    const INSERT_ORDER: &'static str = "INSERT INTO orders (
            id, user_id, amount, matched_amount, matched_total_price, fee, price, is_market, is_margin
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";
    const INSERT_TRADE: &'static str = "INSERT INTO trades (
            id, src_currency, dst_currency, seller_id, buyer_id, sell_order_id, buy_order_id,
            matched_amount, matched_price, sell_fee_amount, buy_fee_amount,
            sell_deposit_id, sell_withdraw_id, buy_deposit_id, buy_withdraw_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)";
    const INSERT_WITHDRAW: &'static str = "INSERT INTO withdraw_requests (
            id, wallet_id, amount, status, transaction_id, auto_withdraw_committed, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";
    const INSERT_CONFIRMED_DEPOSIT: &'static str = "INSERT INTO confirmed_deposits (
            wallet_id, tx_hash, amount, validated, confirmed, transaction_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";
    const INSERT_CARD_DEPOSIT: &'static str = "INSERT INTO card_deposits (
            user_id, amount, fee, card_number, gateway_ref, status, transaction_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";
    const INSERT_BANK_DEPOSIT: &'static str = "INSERT INTO bank_deposits (
            user_id, amount, fee, confirmed, transaction_id
        ) VALUES (?1, ?2, ?3, ?4, ?5)";

    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert_wallet(&self, wallet: &Wallet) -> Result<()> {
        self.conn.execute(
            Self::INSERT_WALLET,
            params![
                wallet.id,
                wallet.user_id,
                wallet.username,
                wallet.currency,
                wallet.balance.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn update_wallet_balance(&self, wallet_id: i64, balance: Decimal) -> Result<()> {
        self.conn.execute(
            "UPDATE wallets SET balance = ?2 WHERE id = ?1",
            params![wallet_id, balance.to_string()],
        )?;
        Ok(())
    }

    pub fn insert_transaction(&self, tx: &LedgerTransaction) -> Result<()> {
        self.conn.execute(
            Self::INSERT_TRANSACTION,
            params![
                tx.id,
                tx.wallet_id,
                tx.tp,
                tx.amount.to_string(),
                tx.balance.map(|b| b.to_string()),
                tx.created_at,
                tx.ref_module,
                tx.ref_id,
                tx.description,
            ],
        )?;
        Ok(())
    }

    pub fn update_transaction_balance(&self, id: i64, balance: Option<Decimal>) -> Result<()> {
        self.conn.execute(
            "UPDATE transactions SET balance = ?2 WHERE id = ?1",
            params![id, balance.map(|b| b.to_string())],
        )?;
        Ok(())
    }

    pub fn delete_transaction(&self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM transactions WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn insert_order(&self, order: &Order) -> Result<()> {
        self.conn.execute(
            Self::INSERT_ORDER,
            params![
                order.id,
                order.user_id,
                order.amount.to_string(),
                order.matched_amount.to_string(),
                order.matched_total_price.to_string(),
                order.fee.to_string(),
                order.price.to_string(),
                order.is_market,
                order.is_margin,
            ],
        )?;
        Ok(())
    }

    pub fn insert_trade(&self, trade: &Trade) -> Result<()> {
        self.conn.execute(
            Self::INSERT_TRADE,
            params![
                trade.id,
                trade.src_currency,
                trade.dst_currency,
                trade.seller_id,
                trade.buyer_id,
                trade.sell_order_id,
                trade.buy_order_id,
                trade.matched_amount.to_string(),
                trade.matched_price.to_string(),
                trade.sell_fee_amount.to_string(),
                trade.buy_fee_amount.to_string(),
                trade.sell_deposit_id,
                trade.sell_withdraw_id,
                trade.buy_deposit_id,
                trade.buy_withdraw_id,
                trade.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn insert_withdraw(&self, withdraw: &WithdrawRequest) -> Result<()> {
        self.conn.execute(
            Self::INSERT_WITHDRAW,
            params![
                withdraw.id,
                withdraw.wallet_id,
                withdraw.amount.to_string(),
                withdraw.status,
                withdraw.transaction_id,
                withdraw.auto_withdraw_committed,
                withdraw.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn insert_confirmed_deposit(&self, deposit: &ConfirmedDeposit) -> Result<()> {
        self.conn.execute(
            Self::INSERT_CONFIRMED_DEPOSIT,
            params![
                deposit.wallet_id,
                deposit.tx_hash,
                deposit.amount.to_string(),
                deposit.validated,
                deposit.confirmed,
                deposit.transaction_id,
            ],
        )?;
        Ok(())
    }

    pub fn insert_card_deposit(&self, deposit: &CardDeposit) -> Result<()> {
        self.conn.execute(
            Self::INSERT_CARD_DEPOSIT,
            params![
                deposit.user_id,
                deposit.amount.to_string(),
                deposit.fee.to_string(),
                deposit.card_number,
                deposit.gateway_ref,
                deposit.status,
                deposit.transaction_id,
            ],
        )?;
        Ok(())
    }

    pub fn insert_bank_deposit(&self, deposit: &BankDeposit) -> Result<()> {
        self.conn.execute(
            Self::INSERT_BANK_DEPOSIT,
            params![
                deposit.user_id,
                deposit.amount.to_string(),
                deposit.fee.to_string(),
                deposit.confirmed,
                deposit.transaction_id,
            ],
        )?;
        Ok(())
    }

    fn query_transactions<P: rusqlite::Params>(
        &self,
        clause: &str,
        params: P,
    ) -> Result<Vec<LedgerTransaction>> {
        let query = format!("{} {}", Self::SELECT_TRANSACTION, clause);
        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt
            .query_map(params, |row| Ok(Self::row_to_transaction(row)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().collect()
    }

    fn query_decimals<P: rusqlite::Params>(&self, query: &str, params: P) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(query)?;
        let values = stmt
            .query_map(params, |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(values)
    }

    fn row_to_wallet(row: &Row) -> Result<Wallet> {
        Ok(Wallet {
            id: row.get(0)?,
            user_id: row.get(1)?,
            username: row.get(2)?,
            currency: row.get(3)?,
            balance: parse_decimal(&row.get::<_, String>(4)?)?,
        })
    }

    fn row_to_transaction(row: &Row) -> Result<LedgerTransaction> {
        let balance = row
            .get::<_, Option<String>>(4)?
            .map(|b| parse_decimal(&b))
            .transpose()?;
        Ok(LedgerTransaction {
            id: row.get(0)?,
            wallet_id: row.get(1)?,
            tp: row.get(2)?,
            amount: parse_decimal(&row.get::<_, String>(3)?)?,
            balance,
            created_at: row.get(5)?,
            ref_module: row.get(6)?,
            ref_id: row.get(7)?,
            description: row.get(8)?,
        })
    }

    fn row_to_order(row: &Row) -> Result<Order> {
        Ok(Order {
            id: row.get(0)?,
            user_id: row.get(1)?,
            amount: parse_decimal(&row.get::<_, String>(2)?)?,
            matched_amount: parse_decimal(&row.get::<_, String>(3)?)?,
            matched_total_price: parse_decimal(&row.get::<_, String>(4)?)?,
            fee: parse_decimal(&row.get::<_, String>(5)?)?,
            price: parse_decimal(&row.get::<_, String>(6)?)?,
            is_market: row.get(7)?,
            is_margin: row.get(8)?,
        })
    }

    fn row_to_trade(row: &Row) -> Result<Trade> {
        Ok(Trade {
            id: row.get(0)?,
            src_currency: row.get(1)?,
            dst_currency: row.get(2)?,
            seller_id: row.get(3)?,
            buyer_id: row.get(4)?,
            sell_order_id: row.get(5)?,
            buy_order_id: row.get(6)?,
            matched_amount: parse_decimal(&row.get::<_, String>(7)?)?,
            matched_price: parse_decimal(&row.get::<_, String>(8)?)?,
            sell_fee_amount: parse_decimal(&row.get::<_, String>(9)?)?,
            buy_fee_amount: parse_decimal(&row.get::<_, String>(10)?)?,
            sell_deposit_id: row.get(11)?,
            sell_withdraw_id: row.get(12)?,
            buy_deposit_id: row.get(13)?,
            buy_withdraw_id: row.get(14)?,
            created_at: row.get(15)?,
        })
    }

    fn row_to_withdraw(row: &Row) -> Result<WithdrawRequest> {
        Ok(WithdrawRequest {
            id: row.get(0)?,
            wallet_id: row.get(1)?,
            amount: parse_decimal(&row.get::<_, String>(2)?)?,
            status: row.get(3)?,
            transaction_id: row.get(4)?,
            auto_withdraw_committed: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

impl LedgerStore for LedgerRepository<'_> {
    fn wallet(&self, id: i64) -> Result<Option<Wallet>> {
        self.conn
            .query_row(Self::SELECT_WALLET, params![id], |row| {
                Ok(Self::row_to_wallet(row))
            })
            .optional()?
            .transpose()
    }

    fn transaction(&self, id: i64) -> Result<Option<LedgerTransaction>> {
        Ok(self
            .query_transactions("WHERE id = ?1", params![id])?
            .into_iter()
            .next())
    }

    fn order(&self, id: i64) -> Result<Option<Order>> {
        self.conn
            .query_row(Self::SELECT_ORDER, params![id], |row| {
                Ok(Self::row_to_order(row))
            })
            .optional()?
            .transpose()
    }

    fn recent_trades(&self, after_id: i64, window: RecentWindow, limit: usize) -> Result<Vec<Trade>> {
        let query = format!(
            "{} WHERE id > ?1 AND created_at >= ?2 AND created_at <= ?3 ORDER BY id LIMIT {limit}",
            Self::SELECT_TRADE
        );
        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt
            .query_map(params![after_id, window.from, window.to], |row| {
                Ok(Self::row_to_trade(row))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().collect()
    }

    fn recent_transactions(
        &self,
        after_id: i64,
        window: RecentWindow,
        limit: usize,
    ) -> Result<Vec<LedgerTransaction>> {
        let id_filter = if after_id >= 0 {
            "(id <= 0 OR id > ?1)"
        } else {
            "(id <= 0 AND id > ?1)"
        };
        self.query_transactions(
            &format!(
                "WHERE {id_filter} AND created_at >= ?2 AND created_at <= ?3
                 ORDER BY created_at, id LIMIT {limit}"
            ),
            params![after_id, window.from, window.to],
        )
    }

    fn transactions_between(
        &self,
        wallet_id: i64,
        from_id: i64,
        before_id: i64,
        limit: usize,
    ) -> Result<Vec<LedgerTransaction>> {
        self.query_transactions(
            &format!(
                "WHERE wallet_id = ?1 AND {ORDER_KEY} >= ?2 AND {ORDER_KEY} < ?3
                 ORDER BY created_at DESC, id DESC LIMIT {limit}"
            ),
            params![wallet_id, ordering_key(from_id), ordering_key(before_id)],
        )
    }

    fn previous_transaction(&self, wallet_id: i64, before_id: i64) -> Result<Option<LedgerTransaction>> {
        Ok(self
            .query_transactions(
                &format!("WHERE wallet_id = ?1 AND {ORDER_KEY} < ?2 ORDER BY {ORDER_KEY} DESC LIMIT 1"),
                params![wallet_id, ordering_key(before_id)],
            )?
            .into_iter()
            .next())
    }

    fn latest_transactions(
        &self,
        wallet_id: i64,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LedgerTransaction>> {
        self.query_transactions(
            &format!(
                "WHERE wallet_id = ?1 AND created_at >= ?2
                 ORDER BY created_at DESC, id DESC LIMIT {limit}"
            ),
            params![wallet_id, since],
        )
    }

    fn wallet_transaction_sum(&self, wallet_id: i64) -> Result<Decimal> {
        let amounts = self.query_decimals(
            "SELECT amount FROM transactions WHERE wallet_id = ?1",
            params![wallet_id],
        )?;
        sum_decimals(amounts)
    }

    fn recent_withdraws(
        &self,
        after_id: i64,
        window: RecentWindow,
        limit: usize,
    ) -> Result<Vec<WithdrawRequest>> {
        let query = format!(
            "{} WHERE id > ?1 AND created_at >= ?2 AND created_at <= ?3 ORDER BY id LIMIT {limit}",
            Self::SELECT_WITHDRAW
        );
        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt
            .query_map(params![after_id, window.from, window.to], |row| {
                Ok(Self::row_to_withdraw(row))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().collect()
    }

    fn card_deposit_sum(&self, user_id: i64, window: SettlementWindow) -> Result<Decimal> {
        let mut stmt = self.conn.prepare(
            "SELECT d.amount, d.fee, d.card_number, d.gateway_ref, d.status, d.transaction_id
             FROM card_deposits d JOIN transactions t ON t.id = d.transaction_id
             WHERE d.user_id = ?1 AND t.created_at > ?2 AND t.created_at <= ?3",
        )?;
        let rows = stmt
            .query_map(params![user_id, window.after, window.until], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, CardDepositStatus>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut total = Decimal::ZERO;
        for (amount, fee, card_number, gateway_ref, status, transaction_id) in rows {
            let deposit = CardDeposit {
                user_id,
                amount: parse_decimal(&amount)?,
                fee: parse_decimal(&fee)?,
                card_number,
                gateway_ref,
                status,
                transaction_id,
            };
            if deposit.is_valid() {
                total += deposit.amount - deposit.fee;
            }
        }
        Ok(total)
    }

    fn bank_deposit_sum(&self, user_id: i64, window: SettlementWindow) -> Result<Decimal> {
        let mut stmt = self.conn.prepare(
            "SELECT d.amount, d.fee FROM bank_deposits d
             JOIN transactions t ON t.id = d.transaction_id
             WHERE d.user_id = ?1 AND d.confirmed = 1
               AND t.created_at > ?2 AND t.created_at <= ?3",
        )?;
        let rows = stmt
            .query_map(params![user_id, window.after, window.until], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let mut total = Decimal::ZERO;
        for (amount, fee) in rows {
            total += parse_decimal(&amount)? - parse_decimal(&fee)?;
        }
        Ok(total)
    }

    fn crypto_deposit_sums(&self, wallet_id: i64, window: SettlementWindow) -> Result<CryptoDepositSums> {
        let mut stmt = self.conn.prepare(
            "SELECT d.tx_hash, d.amount, d.transaction_id FROM confirmed_deposits d
             JOIN transactions t ON t.id = d.transaction_id
             WHERE d.wallet_id = ?1 AND d.validated = 1 AND d.confirmed = 1
               AND t.created_at > ?2 AND t.created_at <= ?3",
        )?;
        let rows = stmt
            .query_map(params![wallet_id, window.after, window.until], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut sums = CryptoDepositSums::default();
        for (tx_hash, amount, transaction_id) in rows {
            let deposit = ConfirmedDeposit {
                wallet_id,
                tx_hash,
                amount: parse_decimal(&amount)?,
                validated: true,
                confirmed: true,
                transaction_id,
            };
            if deposit.is_internal() {
                sums.internal += deposit.amount;
            } else {
                sums.external += deposit.amount;
            }
        }
        Ok(sums)
    }

    fn withdraw_sum(&self, wallet_id: i64, window: SettlementWindow) -> Result<Decimal> {
        let amounts = self.query_decimals(
            "SELECT w.amount FROM withdraw_requests w
             JOIN transactions t ON t.id = w.transaction_id
             WHERE w.wallet_id = ?1 AND t.created_at > ?2 AND t.created_at <= ?3",
            params![wallet_id, window.after, window.until],
        )?;
        sum_decimals(amounts)
    }

    fn internal_transfer_withdraw_sum(&self, wallet_id: i64, window: SettlementWindow) -> Result<Decimal> {
        let amounts = self.query_decimals(
            "SELECT amount FROM withdraw_requests WHERE id IN (
                SELECT ref_id FROM transactions
                WHERE wallet_id = ?1 AND ref_module = ?2
                  AND created_at > ?3 AND created_at <= ?4 AND ref_id IS NOT NULL
             )",
            params![
                wallet_id,
                RefModule::InternalTransferDeposit,
                window.after,
                window.until
            ],
        )?;
        sum_decimals(amounts)
    }

    fn transaction_sums(&self, wallet_id: i64, window: SettlementWindow) -> Result<TransactionSums> {
        let transactions = self.query_transactions(
            "WHERE wallet_id = ?1 AND created_at > ?2 AND created_at <= ?3",
            params![wallet_id, window.after, window.until],
        )?;

        let mut sums = TransactionSums::default();
        for tx in &transactions {
            match tx.tp {
                TransactionType::Buy => sums.buys += tx.amount,
                TransactionType::Sell => sums.sells += tx.amount,
                TransactionType::Manual => sums.manual += tx.amount,
                TransactionType::Refund => sums.refund += tx.amount,
                TransactionType::Gateway => sums.gateway += tx.amount,
                _ => {}
            }
        }
        sums.buys = sums.buys.abs();
        sums.sells = sums.sells.abs();
        sums.earliest = transactions
            .into_iter()
            .min_by_key(|tx| ordering_key(tx.id));
        Ok(sums)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::Currency;
    use crate::repository::Database;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, minute, 0).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn tx(id: i64, tp: TransactionType, amount: &str, balance: &str, minute: u32) -> LedgerTransaction {
        LedgerTransaction {
            id,
            wallet_id: 1,
            tp,
            amount: dec(amount),
            balance: Some(dec(balance)),
            created_at: at(minute),
            ref_module: None,
            ref_id: None,
            description: String::new(),
        }
    }

    fn seeded(db: &Database) -> LedgerRepository<'_> {
        let repo = LedgerRepository::new(&db.conn);
        repo.insert_wallet(&Wallet {
            id: 1,
            user_id: 7,
            username: "alice".into(),
            currency: Currency::Btc,
            balance: dec("3"),
        })
        .unwrap();
        repo.insert_transaction(&tx(10, TransactionType::Deposit, "5", "5", 1)).unwrap();
        repo.insert_transaction(&tx(11, TransactionType::Sell, "-1", "4", 2)).unwrap();
        repo.insert_transaction(&tx(-3, TransactionType::Manual, "-1", "3", 3)).unwrap();
        repo
    }

    #[test]
    fn sql_order_key_agrees_with_ordering_key() {
        let db = Database::new(":memory:").unwrap();
        for id in [1, 42, 0, -3, i64::from(i32::MIN) + 1] {
            let key: i64 = db
                .conn
                .query_row(&format!("SELECT {ORDER_KEY} FROM (SELECT ?1 AS id)"), [id], |row| {
                    row.get(0)
                })
                .unwrap();
            assert_eq!(key, ordering_key(id), "id {id}");
        }
    }

    #[test]
    fn wallet_round_trip_and_sum() {
        let db = Database::new(":memory:").unwrap();
        let repo = seeded(&db);
        let wallet = repo.wallet(1).unwrap().unwrap();
        assert_eq!(wallet.currency, Currency::Btc);
        assert_eq!(wallet.balance, dec("3"));
        assert_eq!(repo.wallet_transaction_sum(1).unwrap(), dec("3"));
        assert!(repo.wallet(2).unwrap().is_none());
        assert_eq!(repo.transaction(-3).unwrap().unwrap().created_at, at(3));
    }

    #[test]
    fn negative_ids_follow_positive_ones() {
        let db = Database::new(":memory:").unwrap();
        let repo = seeded(&db);
        let before_negative = repo.transactions_between(1, 10, -3, 5).unwrap();
        let ids: Vec<i64> = before_negative.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![11, 10]);

        let before_eleven = repo.transactions_between(1, 11, 11, 5).unwrap();
        assert!(before_eleven.is_empty());

        assert_eq!(repo.previous_transaction(1, -3).unwrap().map(|t| t.id), Some(11));
        assert!(repo.previous_transaction(1, 10).unwrap().is_none());
    }

    #[test]
    fn transaction_cursor_keeps_non_positive_ids() {
        let db = Database::new(":memory:").unwrap();
        let repo = seeded(&db);
        let window = RecentWindow {
            from: at(0),
            to: at(59),
        };
        let ids: Vec<i64> = repo
            .recent_transactions(10, window, 200)
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![11, -3]);

        let ids: Vec<i64> = repo
            .recent_transactions(-4, window, 200)
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![-3]);
    }

    #[test]
    fn transaction_sums_by_type() {
        let db = Database::new(":memory:").unwrap();
        let repo = seeded(&db);
        let sums = repo
            .transaction_sums(1, SettlementWindow {
                after: at(1),
                until: at(3),
            })
            .unwrap();
        assert_eq!(sums.sells, dec("1"));
        assert_eq!(sums.manual, dec("-1"));
        assert_eq!(sums.earliest.map(|t| t.id), Some(11));
    }
}
