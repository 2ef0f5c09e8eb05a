use chain_recon::cache::{Cache, MemoryCache};
use chain_recon::checker::diff::checkpoint_key;
use chain_recon::checker::{
    DiffChecker, DiffCheckpoint, DiffOptions, OnlineChecker, OnlineOptions, Reporter,
};
use chain_recon::currency::Currency;
use chain_recon::metrics::RecordingGauge;
use chain_recon::notify::RecordingNotifier;
use chain_recon::repository::models::{
    ConfirmedDeposit, SettlementWindow, TransactionType, WithdrawRequest, WithdrawStatus,
};
use chain_recon::repository::{Database, LedgerRepository, LedgerStore, LedgerTransaction, Wallet};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
}

fn ago(minutes: i64) -> DateTime<Utc> {
    now() - TimeDelta::minutes(minutes)
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn wallet(id: i64, currency: Currency, balance: &str) -> Wallet {
    Wallet {
        id,
        user_id: 7,
        username: "alice".into(),
        currency,
        balance: dec(balance),
    }
}

fn ledger_tx(id: i64, wallet_id: i64, tp: TransactionType, amount: &str, balance: &str, minutes_ago: i64) -> LedgerTransaction {
    LedgerTransaction {
        id,
        wallet_id,
        tp,
        amount: dec(amount),
        balance: Some(dec(balance)),
        created_at: ago(minutes_ago),
        ref_module: None,
        ref_id: None,
        description: String::new(),
    }
}

/// Two interleaved wallets; the corrective transaction -3 is created last.
fn ledger_history() -> Vec<LedgerTransaction> {
    vec![
        ledger_tx(1, 1, TransactionType::Deposit, "10", "10", 14),
        ledger_tx(2, 2, TransactionType::Deposit, "3", "3", 13),
        ledger_tx(3, 1, TransactionType::Sell, "-4", "6", 12),
        ledger_tx(4, 2, TransactionType::Buy, "0.5", "3.5", 11),
        ledger_tx(5, 1, TransactionType::Buy, "1.25", "7.25", 10),
        ledger_tx(6, 1, TransactionType::Withdraw, "-2", "5.25", 8),
        ledger_tx(7, 2, TransactionType::Fee, "-0.1", "3.4", 6),
        ledger_tx(-3, 1, TransactionType::Manual, "0.75", "6", 2),
    ]
}

fn seed_ledger(repo: &LedgerRepository) {
    repo.insert_wallet(&wallet(1, Currency::Btc, "6")).unwrap();
    repo.insert_wallet(&wallet(2, Currency::Eth, "3.4")).unwrap();
    for tx in ledger_history() {
        repo.insert_transaction(&tx).unwrap();
    }
}

fn run_online_checker(db: &Database) -> Vec<String> {
    let cache = MemoryCache::new();
    let notifier = RecordingNotifier::new();
    let gauge = RecordingGauge::new();
    let mut checker = OnlineChecker::new(
        LedgerRepository::new(&db.conn),
        &cache,
        Reporter::new("online", "Online Checker", &notifier, &gauge, true),
        OnlineOptions::default(),
    );
    checker.check_recent_transactions(now()).unwrap();
    assert_eq!(checker.last_checked_transaction(), -3);
    notifier.messages()
}

#[test]
fn consistent_history_reports_nothing() {
    let db = Database::new(":memory:").unwrap();
    seed_ledger(&LedgerRepository::new(&db.conn));
    assert_eq!(run_online_checker(&db), Vec::<String>::new());
}

#[test]
fn one_corrupted_balance_is_reported_exactly_once() {
    for tx in ledger_history() {
        let db = Database::new(":memory:").unwrap();
        let repo = LedgerRepository::new(&db.conn);
        seed_ledger(&repo);
        let corrupted = tx.balance.unwrap() + Decimal::ONE;
        repo.update_transaction_balance(tx.id, Some(corrupted)).unwrap();

        let messages = run_online_checker(&db);
        assert_eq!(messages.len(), 1, "tx {}: {:?}", tx.id, messages);
        assert_eq!(
            messages[0],
            format!(
                "Invalid transaction balance: #{} W#{} TP{}",
                tx.id, tx.wallet_id, tx.tp
            )
        );
    }
}

/// Crypto wallet 1 over two consecutive windows split at transaction 3.
/// The fee in the first window and the transfer in the second are not
/// explained by any deposit, withdraw or trade.
fn seed_diff_history(repo: &LedgerRepository) {
    repo.insert_wallet(&wallet(1, Currency::Btc, "6.75")).unwrap();

    repo.insert_transaction(&ledger_tx(1, 1, TransactionType::Deposit, "5", "5", 25)).unwrap();
    repo.insert_confirmed_deposit(&ConfirmedDeposit {
        wallet_id: 1,
        tx_hash: "c0ffee".into(),
        amount: dec("5"),
        validated: true,
        confirmed: true,
        transaction_id: Some(1),
    })
    .unwrap();
    repo.insert_transaction(&ledger_tx(2, 1, TransactionType::Fee, "-0.5", "4.5", 20)).unwrap();
    repo.insert_transaction(&ledger_tx(3, 1, TransactionType::Buy, "2", "6.5", 15)).unwrap();

    repo.insert_transaction(&ledger_tx(4, 1, TransactionType::Withdraw, "-1", "5.5", 10)).unwrap();
    repo.insert_withdraw(&WithdrawRequest {
        id: 91,
        wallet_id: 1,
        amount: dec("1"),
        status: WithdrawStatus::Done,
        transaction_id: Some(4),
        auto_withdraw_committed: false,
        created_at: ago(10),
    })
    .unwrap();
    repo.insert_transaction(&ledger_tx(5, 1, TransactionType::Transfer, "1", "6.5", 8)).unwrap();
    repo.insert_transaction(&ledger_tx(-3, 1, TransactionType::Manual, "0.25", "6.75", 5)).unwrap();
}

#[test]
fn checkpointed_diff_matches_full_recomputation() {
    let db = Database::new(":memory:").unwrap();
    let repo = LedgerRepository::new(&db.conn);
    seed_diff_history(&repo);
    let cache = MemoryCache::new();
    let notifier = RecordingNotifier::new();
    let gauge = RecordingGauge::new();
    let checker = DiffChecker::new(
        LedgerRepository::new(&db.conn),
        &cache,
        Reporter::new("diff", "Diff Checker", &notifier, &gauge, true),
        DiffOptions::default(),
    );

    let wallet = repo.wallet(1).unwrap().unwrap();
    let tx_a = repo.transaction(3).unwrap().unwrap();
    let tx_b = repo.transaction(-3).unwrap().unwrap();

    let first = checker.check_wallet_diff(&wallet, Some(&tx_a)).unwrap();
    assert_eq!(first, dec("-0.5"));
    let checkpoint: DiffCheckpoint = cache.get_as(&checkpoint_key(1)).unwrap().unwrap();
    assert_eq!(checkpoint.id, 3);

    let incremental = checker.check_wallet_diff(&wallet, Some(&tx_b)).unwrap();
    let full = checker
        .compute_window_diff(
            &wallet,
            SettlementWindow {
                after: tx_a.created_at - TimeDelta::minutes(30),
                until: tx_b.created_at,
            },
            &tx_b,
        )
        .unwrap();
    assert_eq!(incremental, full);
    assert_eq!(full, dec("0.5"));

    // The second window alone carries the unexplained transfer.
    let second = checker
        .compute_window_diff(
            &wallet,
            SettlementWindow {
                after: tx_a.created_at,
                until: tx_b.created_at,
            },
            &tx_b,
        )
        .unwrap();
    assert_eq!(first + second, incremental);
    assert_eq!(second, Decimal::ONE);

    // Re-checking an already covered transaction returns the cached diff.
    assert_eq!(checker.check_wallet_diff(&wallet, Some(&tx_a)).unwrap(), incremental);
    assert!(notifier.messages().is_empty());
}
