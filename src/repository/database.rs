use anyhow::{Context, Result};
use rusqlite::Connection;

pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn new(db_path: &str) -> Result<Self> {
        let db_path = db_path.strip_prefix("sqlite:").unwrap_or(db_path);
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database {db_path}"))?;

        let db = Database { conn };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            -- Shared key-value cache (watermarks, checker cursors, checkpoints)
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );

            -- Scanner output
            CREATE TABLE IF NOT EXISTS address_deltas (
                network TEXT NOT NULL,
                tx_hash TEXT NOT NULL,
                address TEXT NOT NULL,
                currency TEXT NOT NULL,
                direction TEXT NOT NULL,
                value TEXT NOT NULL,
                contract_address TEXT,
                block_height INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                PRIMARY KEY (network, tx_hash, address, currency, direction)
            );
            CREATE INDEX IF NOT EXISTS idx_address_deltas_address
                ON address_deltas(address);
            CREATE INDEX IF NOT EXISTS idx_address_deltas_block
                ON address_deltas(network, block_height);

            -- Ledger
            CREATE TABLE IF NOT EXISTS wallets (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                username TEXT NOT NULL,
                currency TEXT NOT NULL,
                balance TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY,
                wallet_id INTEGER NOT NULL,
                tp TEXT NOT NULL,
                amount TEXT NOT NULL,
                balance TEXT,
                created_at TEXT NOT NULL,
                ref_module TEXT,
                ref_id INTEGER,
                description TEXT NOT NULL DEFAULT '',
                FOREIGN KEY (wallet_id) REFERENCES wallets(id)
            );
            CREATE INDEX IF NOT EXISTS idx_transactions_wallet_created
                ON transactions(wallet_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_transactions_created
                ON transactions(created_at);

            CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                amount TEXT NOT NULL,
                matched_amount TEXT NOT NULL,
                matched_total_price TEXT NOT NULL,
                fee TEXT NOT NULL,
                price TEXT NOT NULL,
                is_market INTEGER NOT NULL,
                is_margin INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY,
                src_currency TEXT NOT NULL,
                dst_currency TEXT NOT NULL,
                seller_id INTEGER NOT NULL,
                buyer_id INTEGER NOT NULL,
                sell_order_id INTEGER NOT NULL,
                buy_order_id INTEGER NOT NULL,
                matched_amount TEXT NOT NULL,
                matched_price TEXT NOT NULL,
                sell_fee_amount TEXT NOT NULL,
                buy_fee_amount TEXT NOT NULL,
                sell_deposit_id INTEGER,
                sell_withdraw_id INTEGER,
                buy_deposit_id INTEGER,
                buy_withdraw_id INTEGER,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_trades_created ON trades(created_at);

            CREATE TABLE IF NOT EXISTS withdraw_requests (
                id INTEGER PRIMARY KEY,
                wallet_id INTEGER NOT NULL,
                amount TEXT NOT NULL,
                status INTEGER NOT NULL,
                transaction_id INTEGER,
                auto_withdraw_committed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_withdraw_requests_created
                ON withdraw_requests(created_at);

            CREATE TABLE IF NOT EXISTS confirmed_deposits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                wallet_id INTEGER NOT NULL,
                tx_hash TEXT NOT NULL,
                amount TEXT NOT NULL,
                validated INTEGER NOT NULL,
                confirmed INTEGER NOT NULL,
                transaction_id INTEGER
            );

            CREATE TABLE IF NOT EXISTS card_deposits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                amount TEXT NOT NULL,
                fee TEXT NOT NULL,
                card_number TEXT,
                gateway_ref TEXT,
                status TEXT NOT NULL,
                transaction_id INTEGER
            );

            CREATE TABLE IF NOT EXISTS bank_deposits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                amount TEXT NOT NULL,
                fee TEXT NOT NULL,
                confirmed INTEGER NOT NULL,
                transaction_id INTEGER
            );
            ",
        )?;

        Ok(())
    }
}
