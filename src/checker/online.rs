use super::{
    Checker, Reporter, STATE_TTL, is_close, money_is_close, money_is_zero, ordering_key, recent_window,
};
use crate::cache::{Cache, DAY};
use crate::metrics::GaugeSink;
use crate::notify::Notifier;
use crate::repository::LedgerStore;
use crate::repository::models::{LedgerTransaction, Order, Trade, Wallet};
use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, info};

const TRADES_CURSOR_KEY: &str = "checker_trades_last_checked_id";
const TRANSACTIONS_CURSOR_KEY: &str = "checker_transactions_last_checked_id";
const WALLETS_PENDING_KEY: &str = "checker_wallets_to_check";

const TRADE_BATCH: usize = 100;
const TRANSACTION_BATCH: usize = 200;
const PREDECESSOR_CANDIDATES: usize = 5;
const LAST_TRANSACTIONS: usize = 5;

const WALLET_RECHECK_INTERVAL: TimeDelta = TimeDelta::minutes(5);
const LARGE_WALLET_THRESHOLD: Duration = Duration::from_secs(60);

/// Slippage a market order accepts around its reference price.
const MARKET_ORDER_MAX_PRICE_DIFF: Decimal = Decimal::from_parts(1, 0, 0, false, 2);
const MAX_FEE_RATE: Decimal = Decimal::from_parts(35, 0, 0, false, 4);

#[derive(Debug, Clone)]
pub struct OnlineOptions {
    /// Compare wallet balances against the sum of all their transactions.
    pub recheck_balances: bool,
    /// Compare wallet balances against their latest transaction. Ignored
    /// when `recheck_balances` is set.
    pub recheck_balances_fast: bool,
    pub do_check_wallets: bool,
    pub ledger_epoch: DateTime<Utc>,
}

impl Default for OnlineOptions {
    fn default() -> Self {
        Self {
            recheck_balances: false,
            recheck_balances_fast: true,
            do_check_wallets: true,
            ledger_epoch: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

/// Audits trades, ledger transactions and the wallets they touch.
pub struct OnlineChecker<S, C, N, G> {
    store: S,
    cache: C,
    reporter: Reporter<N, G>,
    options: OnlineOptions,
    last_checked_trade: i64,
    last_checked_transaction: i64,
    wallets_to_check: BTreeSet<i64>,
    wallets_last_check: HashMap<i64, DateTime<Utc>>,
    /// Post-balance and id of the last transaction seen per wallet.
    wallets_last_balance: HashMap<i64, (Decimal, i64)>,
}

/// The four ledger legs of a trade with their wallets.
struct TradeLegs {
    sell_withdraw: (LedgerTransaction, Wallet),
    sell_deposit: (LedgerTransaction, Wallet),
    buy_withdraw: (LedgerTransaction, Wallet),
    buy_deposit: (LedgerTransaction, Wallet),
}

impl<S, C, N, G> OnlineChecker<S, C, N, G>
where
    S: LedgerStore,
    C: Cache,
    N: Notifier,
    G: GaugeSink,
{
    pub fn new(store: S, cache: C, reporter: Reporter<N, G>, options: OnlineOptions) -> Self {
        Self {
            store,
            cache,
            reporter,
            options,
            last_checked_trade: 0,
            last_checked_transaction: 0,
            wallets_to_check: BTreeSet::new(),
            wallets_last_check: HashMap::new(),
            wallets_last_balance: HashMap::new(),
        }
    }

    pub fn last_checked_trade(&self) -> i64 {
        self.last_checked_trade
    }

    pub fn last_checked_transaction(&self) -> i64 {
        self.last_checked_transaction
    }

    pub fn wallets_to_check(&self) -> &BTreeSet<i64> {
        &self.wallets_to_check
    }

    pub fn enqueue_wallet(&mut self, wallet_id: i64) {
        if self.options.do_check_wallets {
            self.wallets_to_check.insert(wallet_id);
        }
    }

    /// One full pass as of `now`.
    pub fn check_at(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.check_recent_trades(now)?;
        self.check_recent_transactions(now)?;
        self.check_wallets(now)
    }

    pub fn check_recent_trades(&mut self, now: DateTime<Utc>) -> Result<()> {
        let trades = self
            .store
            .recent_trades(self.last_checked_trade, recent_window(now), TRADE_BATCH)?;
        for trade in &trades {
            self.last_checked_trade = trade.id;
            self.check_trade(trade)?;
        }
        info!("Checked {} trades.", trades.len());
        Ok(())
    }

    fn check_trade(&mut self, trade: &Trade) -> Result<()> {
        let total_price = (trade.matched_amount * trade.matched_price).round_dp(10);

        let Some(legs) = self.trade_legs(trade)? else {
            self.reporter
                .report("trade_transactions", trade.id, "Trade misses transactions", "");
            return Ok(());
        };
        if money_is_zero(trade.matched_amount) || money_is_zero(trade.matched_price) {
            self.reporter.report("trade_size", trade.id, "Very small trade", "");
            return Ok(());
        }

        let amount_diffs = [
            legs.sell_withdraw.0.amount + trade.matched_amount,
            legs.sell_deposit.0.amount - (total_price - trade.sell_fee_amount),
            legs.buy_withdraw.0.amount + total_price,
            legs.buy_deposit.0.amount - (trade.matched_amount - trade.buy_fee_amount),
        ];
        if amount_diffs.iter().any(|diff| !money_is_zero(*diff)) {
            self.reporter
                .report("trade_amounts", trade.id, "Transaction values diff", "");
        }

        let (Some(sell), Some(buy)) = (
            self.store.order(trade.sell_order_id)?,
            self.store.order(trade.buy_order_id)?,
        ) else {
            self.reporter.report("trade_orders", trade.id, "Trade misses orders", "");
            return Ok(());
        };

        let owned_by = |wallet: &Wallet, user_id: i64, order: &Order| (wallet.user_id == user_id) ^ order.is_margin;
        let wallets_valid = owned_by(&legs.sell_withdraw.1, trade.seller_id, &sell)
            && owned_by(&legs.sell_deposit.1, trade.seller_id, &sell)
            && owned_by(&legs.buy_withdraw.1, trade.buyer_id, &buy)
            && owned_by(&legs.buy_deposit.1, trade.buyer_id, &buy)
            && legs.sell_withdraw.1.currency == trade.src_currency
            && legs.sell_deposit.1.currency == trade.dst_currency
            && legs.buy_withdraw.1.currency == trade.dst_currency
            && legs.buy_deposit.1.currency == trade.src_currency;
        if !wallets_valid {
            self.reporter
                .report("trade_wallets", trade.id, "Transaction wallet invalid", "");
            return Ok(());
        }

        let order_within = |order: &Order, fee: Decimal| {
            order.amount >= order.matched_amount
                && order.matched_amount >= trade.matched_amount
                && order.matched_total_price >= total_price
                && order.fee >= fee
        };
        if !(order_within(&sell, trade.sell_fee_amount) && order_within(&buy, trade.buy_fee_amount)) {
            self.reporter
                .report("trade_orders", trade.id, "Order matched values diff", "");
            return Ok(());
        }

        let mut max_buy_price = buy.price;
        if buy.is_market {
            max_buy_price += max_buy_price * MARKET_ORDER_MAX_PRICE_DIFF;
        }
        if max_buy_price.is_zero() {
            max_buy_price = trade.matched_price;
        }
        let mut min_sell_price = sell.price;
        if sell.is_market {
            min_sell_price -= min_sell_price * MARKET_ORDER_MAX_PRICE_DIFF;
        }
        if !(min_sell_price <= trade.matched_price && trade.matched_price <= max_buy_price) {
            self.reporter.report("trade_price", trade.id, "Bad matched price", "");
            return Ok(());
        }

        let max_sell_fee = (total_price * MAX_FEE_RATE).round_dp(10);
        let max_buy_fee = (trade.matched_amount * MAX_FEE_RATE).round_dp(10);
        let fee_within = |fee: Decimal, max: Decimal| fee >= Decimal::ZERO && fee <= max;
        if !(fee_within(trade.sell_fee_amount, max_sell_fee) && fee_within(trade.buy_fee_amount, max_buy_fee)) {
            self.reporter.report("trade_fees", trade.id, "Bad match fee values", "");
            return Ok(());
        }

        for (tx, _) in [&legs.sell_deposit, &legs.sell_withdraw, &legs.buy_deposit, &legs.buy_withdraw] {
            self.enqueue_wallet(tx.wallet_id);
        }
        Ok(())
    }

    fn trade_legs(&self, trade: &Trade) -> Result<Option<TradeLegs>> {
        let (Some(sell_withdraw), Some(sell_deposit), Some(buy_withdraw), Some(buy_deposit)) = (
            self.trade_leg(trade.sell_withdraw_id)?,
            self.trade_leg(trade.sell_deposit_id)?,
            self.trade_leg(trade.buy_withdraw_id)?,
            self.trade_leg(trade.buy_deposit_id)?,
        ) else {
            return Ok(None);
        };
        Ok(Some(TradeLegs {
            sell_withdraw,
            sell_deposit,
            buy_withdraw,
            buy_deposit,
        }))
    }

    fn trade_leg(&self, tx_id: Option<i64>) -> Result<Option<(LedgerTransaction, Wallet)>> {
        let Some(tx) = tx_id.map(|id| self.store.transaction(id)).transpose()?.flatten() else {
            return Ok(None);
        };
        Ok(self.store.wallet(tx.wallet_id)?.map(|wallet| (tx, wallet)))
    }

    pub fn check_recent_transactions(&mut self, now: DateTime<Utc>) -> Result<()> {
        let mut transactions = self.store.recent_transactions(
            self.last_checked_transaction,
            recent_window(now),
            TRANSACTION_BATCH,
        )?;
        // Creation time and id disagree for some rows; id is the logical order.
        transactions.sort_by_key(|tx| ordering_key(tx.id));

        for tx in &transactions {
            self.last_checked_transaction = tx.id;
            self.check_transaction(tx)?;
        }
        info!("Checked {} transactions.", transactions.len());
        Ok(())
    }

    fn check_transaction(&mut self, tx: &LedgerTransaction) -> Result<()> {
        let Some(balance) = tx.balance else {
            self.reporter
                .report("tx_balance_missing", tx.id, "None transaction balance", "");
            self.wallets_last_balance.remove(&tx.wallet_id);
            return Ok(());
        };
        let last = self
            .wallets_last_balance
            .insert(tx.wallet_id, (balance, tx.id));

        if balance < Decimal::ZERO && is_negative_balance_forbidden(tx) {
            let message = format!("Negative transaction balance\ntp: {} {}", tx.tp, tx.description);
            self.reporter
                .report("tx_negative_balance", tx.id, message.trim_end(), "");
            return Ok(());
        }

        let previous_balance = match last {
            Some((last_balance, _)) if money_is_close(balance, last_balance + tx.amount) => {
                return Ok(());
            }
            Some((_, last_tx_id)) => {
                let candidates = self.store.transactions_between(
                    tx.wallet_id,
                    last_tx_id,
                    tx.id,
                    PREDECESSOR_CANDIDATES,
                )?;
                let Some(predecessor) = candidates.into_iter().max_by_key(|t| ordering_key(t.id)) else {
                    self.reporter.report(
                        "tx_predecessor",
                        tx.id,
                        "Deleted previous transaction",
                        &format!("W#{} TX#{}", tx.wallet_id, last_tx_id),
                    );
                    return Ok(());
                };
                predecessor.balance
            }
            // First sighting of this wallet: the stored predecessor, or an
            // empty wallet when there is none.
            None => match self.store.previous_transaction(tx.wallet_id, tx.id)? {
                Some(predecessor) => predecessor.balance,
                None => Some(Decimal::ZERO),
            },
        };

        let Some(previous_balance) = previous_balance else {
            debug!("Predecessor of transaction {} has no balance", tx.id);
            return Ok(());
        };
        let expected = previous_balance + tx.amount;
        if !money_is_close(balance, expected) {
            self.reporter.report(
                "tx_balance",
                tx.id,
                "Invalid transaction balance",
                &format!("W#{} TP{}", tx.wallet_id, tx.tp),
            );
            // Continue the chain from the consistent value so one bad
            // post-balance is reported once.
            self.wallets_last_balance
                .insert(tx.wallet_id, (expected, tx.id));
        }
        Ok(())
    }

    pub fn check_wallets(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !self.options.do_check_wallets {
            return Ok(());
        }
        let recently_checked = now - WALLET_RECHECK_INTERVAL;
        let pending: Vec<i64> = self.wallets_to_check.iter().copied().collect();
        let mut remaining = BTreeSet::new();
        let mut checks = 0;

        for wallet_id in pending {
            let last_check = self.wallets_last_check.get(&wallet_id).copied();
            if last_check.is_some_and(|t| t >= recently_checked) {
                remaining.insert(wallet_id);
                continue;
            }
            checks += 1;
            match self.store.wallet(wallet_id)? {
                Some(wallet) => self.check_wallet(&wallet, last_check)?,
                None => debug!("Wallet {} no longer exists", wallet_id),
            }
            self.wallets_last_check.insert(wallet_id, now);
        }

        self.wallets_to_check = remaining;
        info!("Checked {} wallets.", checks);
        Ok(())
    }

    fn check_wallet(&self, wallet: &Wallet, last_check: Option<DateTime<Utc>>) -> Result<()> {
        if wallet.balance < Decimal::ZERO {
            self.reporter.report(
                "wallet_negative",
                wallet.id,
                &format!("Negative balance in {} wallet", wallet.username),
                "",
            );
        }
        let details = format!("C{} {}", wallet.currency, wallet.username);

        if self.options.recheck_balances {
            let large_wallet_key = format!("checker_wallets_is_large_{}", wallet.id);
            if self.cache.get(&large_wallet_key)?.is_some() {
                return Ok(());
            }
            let started = Instant::now();
            let real_balance = self.store.wallet_transaction_sum(wallet.id)?;
            if started.elapsed() > LARGE_WALLET_THRESHOLD {
                info!("Many transactions for Wallet#{}", wallet.id);
                self.cache
                    .set(&large_wallet_key, serde_json::Value::Bool(true), DAY)?;
            }
            if !is_close(real_balance, wallet.balance) {
                self.reporter.report(
                    "wallet_sum",
                    wallet.id,
                    &format!("Balance mismatch: {} != {} in", wallet.balance, real_balance),
                    &details,
                );
            }
        } else if self.options.recheck_balances_fast {
            let since = last_check
                .map(|t| t - TimeDelta::minutes(1))
                .unwrap_or(self.options.ledger_epoch);
            let last_tx = self
                .store
                .latest_transactions(wallet.id, since, LAST_TRANSACTIONS)?
                .into_iter()
                .max_by_key(|t| ordering_key(t.id));
            if let Some(tx_balance) = last_tx.and_then(|t| t.balance) {
                if !is_close(tx_balance, wallet.balance) {
                    self.reporter.report(
                        "wallet_last_tx",
                        wallet.id,
                        &format!(
                            "Wallet balance mismatch last tx: {} != {} in",
                            wallet.balance.normalize(),
                            tx_balance.normalize()
                        ),
                        &details,
                    );
                }
            }
        }
        Ok(())
    }
}

/// Only exchange-system bookkeeping may drive a balance below zero.
fn is_negative_balance_forbidden(tx: &LedgerTransaction) -> bool {
    tx.amount <= Decimal::ZERO && !tx.ref_module.is_some_and(|m| m.is_exchange_system())
}

impl<S, C, N, G> Checker for OnlineChecker<S, C, N, G>
where
    S: LedgerStore,
    C: Cache,
    N: Notifier,
    G: GaugeSink,
{
    fn load_state(&mut self) -> Result<()> {
        self.last_checked_trade = self.cache.get_as(TRADES_CURSOR_KEY)?.unwrap_or(0);
        self.last_checked_transaction = self.cache.get_as(TRANSACTIONS_CURSOR_KEY)?.unwrap_or(0);
        self.wallets_to_check = self.cache.get_as(WALLETS_PENDING_KEY)?.unwrap_or_default();
        Ok(())
    }

    fn save_state(&self) -> Result<()> {
        self.cache
            .set_as(TRADES_CURSOR_KEY, &self.last_checked_trade, STATE_TTL)?;
        self.cache
            .set_as(TRANSACTIONS_CURSOR_KEY, &self.last_checked_transaction, STATE_TTL)?;
        self.cache
            .set_as(WALLETS_PENDING_KEY, &self.wallets_to_check, STATE_TTL)?;
        Ok(())
    }

    fn check_all(&mut self) -> Result<()> {
        self.check_at(Utc::now())
    }

    fn send_notice(&self, message: &str) {
        self.reporter.notice(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::currency::Currency;
    use crate::metrics::RecordingGauge;
    use crate::notify::RecordingNotifier;
    use crate::repository::models::{RefModule, TransactionType};
    use crate::repository::{Database, LedgerRepository};
    use chrono::TimeZone;
    use std::str::FromStr;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn wallet(id: i64, user_id: i64, currency: Currency, balance: &str) -> Wallet {
        Wallet {
            id,
            user_id,
            username: format!("user{user_id}"),
            currency,
            balance: dec(balance),
        }
    }

    fn ledger_tx(id: i64, wallet_id: i64, tp: TransactionType, amount: &str, balance: &str) -> LedgerTransaction {
        LedgerTransaction {
            id,
            wallet_id,
            tp,
            amount: dec(amount),
            balance: Some(dec(balance)),
            created_at: now() - TimeDelta::minutes(10),
            ref_module: None,
            ref_id: None,
            description: String::new(),
        }
    }

    fn order(id: i64, user_id: i64, price: &str) -> Order {
        Order {
            id,
            user_id,
            amount: dec("2"),
            matched_amount: dec("1"),
            matched_total_price: dec("100"),
            fee: dec("1"),
            price: dec(price),
            is_market: false,
            is_margin: false,
        }
    }

    /// Seller 1 sells 1 BTC to buyer 2 at 100 USDT.
    fn seed_trade(repo: &LedgerRepository, matched_price: &str) {
        repo.insert_wallet(&wallet(11, 1, Currency::Btc, "9")).unwrap();
        repo.insert_wallet(&wallet(12, 1, Currency::Usdt, "99.9")).unwrap();
        repo.insert_wallet(&wallet(21, 2, Currency::Usdt, "900")).unwrap();
        repo.insert_wallet(&wallet(22, 2, Currency::Btc, "0.999")).unwrap();
        repo.insert_transaction(&ledger_tx(1, 11, TransactionType::Sell, "-1", "9")).unwrap();
        repo.insert_transaction(&ledger_tx(2, 12, TransactionType::Buy, "99.9", "99.9")).unwrap();
        repo.insert_transaction(&ledger_tx(3, 21, TransactionType::Sell, "-100", "900")).unwrap();
        repo.insert_transaction(&ledger_tx(4, 22, TransactionType::Buy, "0.999", "0.999")).unwrap();
        repo.insert_order(&order(1, 1, "99")).unwrap();
        repo.insert_order(&order(2, 2, "101")).unwrap();
        repo.insert_trade(&Trade {
            id: 5,
            src_currency: Currency::Btc,
            dst_currency: Currency::Usdt,
            seller_id: 1,
            buyer_id: 2,
            sell_order_id: 1,
            buy_order_id: 2,
            matched_amount: dec("1"),
            matched_price: dec(matched_price),
            sell_fee_amount: dec("0.1"),
            buy_fee_amount: dec("0.001"),
            sell_deposit_id: Some(2),
            sell_withdraw_id: Some(1),
            buy_deposit_id: Some(4),
            buy_withdraw_id: Some(3),
            created_at: now() - TimeDelta::minutes(5),
        })
        .unwrap();
    }

    #[test]
    fn consistent_trade_enqueues_its_wallets() {
        let db = Database::new(":memory:").unwrap();
        let repo = LedgerRepository::new(&db.conn);
        seed_trade(&repo, "100");
        let notifier = RecordingNotifier::new();
        let gauge = RecordingGauge::new();
        let mut checker = OnlineChecker::new(
            LedgerRepository::new(&db.conn),
            MemoryCache::new(),
            Reporter::new("online", "Checker", &notifier, &gauge, true),
            OnlineOptions {
                do_check_wallets: true,
                ..Default::default()
            },
        );

        checker.check_recent_trades(now()).unwrap();
        assert!(notifier.messages().is_empty(), "{:?}", notifier.messages());
        assert_eq!(checker.last_checked_trade(), 5);
        assert_eq!(checker.wallets_to_check().len(), 4);

        checker.check_wallets(now()).unwrap();
        assert!(notifier.messages().is_empty(), "{:?}", notifier.messages());
        assert!(checker.wallets_to_check().is_empty());
    }

    #[test]
    fn trade_arithmetic_mismatch_is_reported() {
        let db = Database::new(":memory:").unwrap();
        let repo = LedgerRepository::new(&db.conn);
        // Matched at 102 while the ledger legs moved 100.
        seed_trade(&repo, "102");
        let notifier = RecordingNotifier::new();
        let mut checker = OnlineChecker::new(
            LedgerRepository::new(&db.conn),
            MemoryCache::new(),
            Reporter::new("online", "Checker", &notifier, crate::metrics::MetricsGauge, true),
            OnlineOptions::default(),
        );
        checker.check_recent_trades(now()).unwrap();
        let messages = notifier.messages();
        assert!(messages.contains(&"Transaction values diff: #5".to_string()));
        assert!(checker.wallets_to_check().is_empty());
    }

    #[test]
    fn exchange_system_may_go_negative() {
        let db = Database::new(":memory:").unwrap();
        let repo = LedgerRepository::new(&db.conn);
        repo.insert_wallet(&wallet(1, 1, Currency::Btc, "-1")).unwrap();
        let mut system = ledger_tx(1, 1, TransactionType::Sell, "-1", "-1");
        system.ref_module = Some(RefModule::ExchangeSystemSrc);
        repo.insert_transaction(&system).unwrap();
        let mut user = ledger_tx(2, 1, TransactionType::Withdraw, "-1", "-2");
        user.description = "payout ".into();
        repo.insert_transaction(&user).unwrap();

        let notifier = RecordingNotifier::new();
        let mut checker = OnlineChecker::new(
            LedgerRepository::new(&db.conn),
            MemoryCache::new(),
            Reporter::new("online", "Checker", &notifier, crate::metrics::MetricsGauge, true),
            OnlineOptions::default(),
        );
        checker.check_recent_transactions(now()).unwrap();
        assert_eq!(
            notifier.messages(),
            vec!["Negative transaction balance\ntp: withdraw payout: #2".to_string()]
        );
        assert_eq!(checker.last_checked_transaction(), 2);
    }

    #[test]
    fn fast_wallet_check_compares_latest_transaction() {
        let db = Database::new(":memory:").unwrap();
        let repo = LedgerRepository::new(&db.conn);
        repo.insert_wallet(&wallet(1, 1, Currency::Btc, "4")).unwrap();
        repo.insert_transaction(&ledger_tx(1, 1, TransactionType::Deposit, "5", "5")).unwrap();

        let notifier = RecordingNotifier::new();
        let mut checker = OnlineChecker::new(
            LedgerRepository::new(&db.conn),
            MemoryCache::new(),
            Reporter::new("online", "Checker", &notifier, crate::metrics::MetricsGauge, true),
            OnlineOptions::default(),
        );
        checker.enqueue_wallet(1);
        checker.check_wallets(now()).unwrap();
        assert_eq!(
            notifier.messages(),
            vec!["Wallet balance mismatch last tx: 4 != 5 in: #1 Cbtc user1".to_string()]
        );

        // Throttled for five minutes.
        checker.enqueue_wallet(1);
        checker.check_wallets(now() + TimeDelta::minutes(1)).unwrap();
        assert_eq!(notifier.messages().len(), 1);
        assert!(checker.wallets_to_check().contains(&1));
    }

    #[test]
    fn full_recheck_sums_transactions() {
        let db = Database::new(":memory:").unwrap();
        let repo = LedgerRepository::new(&db.conn);
        repo.insert_wallet(&wallet(1, 1, Currency::Btc, "6")).unwrap();
        repo.insert_transaction(&ledger_tx(1, 1, TransactionType::Deposit, "5", "5")).unwrap();

        let notifier = RecordingNotifier::new();
        let mut checker = OnlineChecker::new(
            LedgerRepository::new(&db.conn),
            MemoryCache::new(),
            Reporter::new("online", "Checker", &notifier, crate::metrics::MetricsGauge, true),
            OnlineOptions {
                recheck_balances: true,
                ..Default::default()
            },
        );
        checker.enqueue_wallet(1);
        checker.check_wallets(now()).unwrap();
        assert_eq!(
            notifier.messages(),
            vec!["Balance mismatch: 6 != 5 in: #1 Cbtc user1".to_string()]
        );
    }

    #[test]
    fn state_survives_restart() {
        let cache = MemoryCache::new();
        let db = Database::new(":memory:").unwrap();
        let notifier = RecordingNotifier::new();
        let mut first = OnlineChecker::new(
            LedgerRepository::new(&db.conn),
            &cache,
            Reporter::new("online", "Checker", &notifier, crate::metrics::MetricsGauge, false),
            OnlineOptions::default(),
        );
        first.last_checked_trade = 9;
        first.last_checked_transaction = -4;
        first.enqueue_wallet(3);
        first.save_state().unwrap();

        let mut second = OnlineChecker::new(
            LedgerRepository::new(&db.conn),
            &cache,
            Reporter::new("online", "Checker", &notifier, crate::metrics::MetricsGauge, false),
            OnlineOptions::default(),
        );
        second.load_state().unwrap();
        assert_eq!(second.last_checked_trade(), 9);
        assert_eq!(second.last_checked_transaction(), -4);
        assert!(second.wallets_to_check().contains(&3));
    }
}
