use super::{Checker, Reporter, STATE_TTL, money_is_zero, recent_window};
use crate::cache::Cache;
use crate::metrics::GaugeSink;
use crate::notify::Notifier;
use crate::repository::LedgerStore;
use crate::repository::models::{LedgerTransaction, SettlementWindow, Wallet, WithdrawRequest, WithdrawStatus};
use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const WITHDRAW_CURSOR_KEY: &str = "diff_checker_withdraw_last_checked_id";
const WITHDRAW_BATCH: usize = 100;
const CHECKPOINT_TTL: Duration = Duration::from_secs(10 * 24 * 60 * 60);
/// How far back the first evaluation of a wallet reaches.
const FIRST_WINDOW: TimeDelta = TimeDelta::minutes(30);

/// Cached result of the last evaluation of one wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffCheckpoint {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub diff: Decimal,
}

pub fn checkpoint_key(wallet_id: i64) -> String {
    format!("diff_checker_wallets_last_transaction_{wallet_id}")
}

#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Evaluate the wallet diff for every recent withdraw.
    pub recheck_diff: bool,
    /// Withdraws get their transaction on creation, so every active request
    /// must have one.
    pub withdraw_create_tx_verify: bool,
    pub ledger_epoch: DateTime<Utc>,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            recheck_diff: true,
            withdraw_create_tx_verify: true,
            ledger_epoch: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

/// Reconciles wallet balance changes against deposits, withdraws and trade
/// flows, incrementally per wallet.
pub struct DiffChecker<S, C, N, G> {
    store: S,
    cache: C,
    reporter: Reporter<N, G>,
    options: DiffOptions,
    last_checked_withdraw: i64,
}

impl<S, C, N, G> DiffChecker<S, C, N, G>
where
    S: LedgerStore,
    C: Cache,
    N: Notifier,
    G: GaugeSink,
{
    pub fn new(store: S, cache: C, reporter: Reporter<N, G>, options: DiffOptions) -> Self {
        Self {
            store,
            cache,
            reporter,
            options,
            last_checked_withdraw: 0,
        }
    }

    pub fn last_checked_withdraw(&self) -> i64 {
        self.last_checked_withdraw
    }

    /// Cumulative diff of `wallet` up to `check_until_tx` (its latest
    /// transaction when `None`). Only the part after the cached checkpoint is
    /// recomputed; an earlier or equal cutoff returns the cached value.
    pub fn check_wallet_diff(&self, wallet: &Wallet, check_until_tx: Option<&LedgerTransaction>) -> Result<Decimal> {
        let latest;
        let until = match check_until_tx {
            Some(tx) => tx,
            None => match self.latest_transaction(wallet.id)? {
                Some(tx) => {
                    latest = tx;
                    &latest
                }
                None => return Ok(Decimal::ZERO),
            },
        };

        let key = checkpoint_key(wallet.id);
        let (checked_until, previous_diff) = match self.cache.get_as::<DiffCheckpoint>(&key)? {
            Some(checkpoint) => (checkpoint.created_at, checkpoint.diff),
            None => (until.created_at - FIRST_WINDOW, Decimal::ZERO),
        };
        if until.created_at <= checked_until {
            return Ok(previous_diff);
        }

        let window = SettlementWindow {
            after: checked_until.max(self.options.ledger_epoch),
            until: until.created_at,
        };
        let diff = self.compute_window_diff(wallet, window, until)? + previous_diff;
        self.cache.set_as(
            &key,
            &DiffCheckpoint {
                id: until.id,
                created_at: until.created_at,
                diff,
            },
            CHECKPOINT_TTL,
        )?;
        Ok(diff)
    }

    /// Diff of a single window, ignoring and leaving untouched any cached
    /// checkpoint. `until` is the transaction closing the window.
    pub fn compute_window_diff(
        &self,
        wallet: &Wallet,
        window: SettlementWindow,
        until: &LedgerTransaction,
    ) -> Result<Decimal> {
        let mut internal_deposits = Decimal::ZERO;
        let deposits = if wallet.currency.is_rial() {
            self.store.card_deposit_sum(wallet.user_id, window)?
                + self.store.bank_deposit_sum(wallet.user_id, window)?
        } else {
            let crypto = self.store.crypto_deposit_sums(wallet.id, window)?;
            internal_deposits = crypto.internal;
            crypto.external + crypto.internal
        };
        let withdraws = self.store.withdraw_sum(wallet.id, window)?;
        let internal_withdraws = self
            .store
            .internal_transfer_withdraw_sum(wallet.id, window)?;
        let sums = self.store.transaction_sums(wallet.id, window)?;

        let trade_and_adjustments = sums.buys - sums.sells + sums.gateway + sums.manual + sums.refund;
        // Balances missing on legacy rows count as zero.
        let opening = sums
            .earliest
            .as_ref()
            .map(|tx| tx.balance.unwrap_or_default() - tx.amount)
            .unwrap_or_default();
        let balance_change = until.balance.unwrap_or_default() - opening;

        let net = deposits - withdraws + trade_and_adjustments;
        Ok(balance_change - net + (internal_deposits - internal_withdraws))
    }

    fn latest_transaction(&self, wallet_id: i64) -> Result<Option<LedgerTransaction>> {
        Ok(self
            .store
            .latest_transactions(wallet_id, self.options.ledger_epoch, 1)?
            .into_iter()
            .next())
    }

    pub fn check_recent_withdraws(&mut self, now: DateTime<Utc>) -> Result<()> {
        let withdraws = self.store.recent_withdraws(
            self.last_checked_withdraw,
            recent_window(now),
            WITHDRAW_BATCH,
        )?;
        for withdraw in &withdraws {
            self.last_checked_withdraw = withdraw.id;
            self.check_withdraw(withdraw)?;
        }
        info!("Checked {} withdraws.", withdraws.len());
        Ok(())
    }

    fn must_have_transaction(&self, withdraw: &WithdrawRequest) -> bool {
        if self.options.withdraw_create_tx_verify {
            withdraw.status.is_active()
        } else {
            withdraw.status.is_committed()
                || (withdraw.status == WithdrawStatus::Processing && withdraw.auto_withdraw_committed)
        }
    }

    fn check_withdraw(&self, withdraw: &WithdrawRequest) -> Result<()> {
        if self.must_have_transaction(withdraw) {
            let linked = match withdraw.transaction_id {
                Some(id) if id != 0 => self.store.transaction(id)?.is_some(),
                _ => false,
            };
            if !linked {
                self.reporter
                    .report("withdraw_transaction", withdraw.id, "Missing transaction", "");
                return Ok(());
            }
        }

        let Some(wallet) = self.store.wallet(withdraw.wallet_id)? else {
            debug!("Wallet {} of withdraw {} not found", withdraw.wallet_id, withdraw.id);
            return Ok(());
        };
        let Some(last_tx) = self.latest_transaction(wallet.id)? else {
            return Ok(());
        };
        let Some(balance) = last_tx.balance else {
            return Ok(());
        };

        if balance < Decimal::ZERO {
            self.reporter
                .report("withdraw_negative_balance", withdraw.id, "Negative withdraw balance", "");
            return Ok(());
        }
        if self.options.recheck_diff {
            let diff = self.check_wallet_diff(&wallet, Some(&last_tx))?;
            if !money_is_zero(diff) {
                self.reporter.report(
                    "wallet_diff",
                    withdraw.id,
                    &format!("Diff non-zero: {diff}"),
                    "",
                );
            }
        }
        Ok(())
    }
}

impl<S, C, N, G> Checker for DiffChecker<S, C, N, G>
where
    S: LedgerStore,
    C: Cache,
    N: Notifier,
    G: GaugeSink,
{
    fn load_state(&mut self) -> Result<()> {
        self.last_checked_withdraw = self.cache.get_as(WITHDRAW_CURSOR_KEY)?.unwrap_or(0);
        Ok(())
    }

    fn save_state(&self) -> Result<()> {
        self.cache
            .set_as(WITHDRAW_CURSOR_KEY, &self.last_checked_withdraw, STATE_TTL)
    }

    fn check_all(&mut self) -> Result<()> {
        self.check_recent_withdraws(Utc::now())
    }

    fn send_notice(&self, message: &str) {
        self.reporter.notice(message);
    }
}
