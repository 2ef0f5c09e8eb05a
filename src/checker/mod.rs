//! Continuous auditors of the wallet ledger.
//!
//! Both checkers are read-only: every detected anomaly is logged, sent to the
//! notification sink and counted in the `checker_violation` gauge, then the
//! pass moves on.

pub mod diff;
pub mod online;

pub use diff::{DiffChecker, DiffCheckpoint, DiffOptions};
pub use online::{OnlineChecker, OnlineOptions};

use crate::metrics::GaugeSink;
use crate::notify::Notifier;
use crate::repository::models::RecentWindow;
pub use crate::repository::models::ordering_key;
use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

pub const NOTIFICATION_CHANNEL: &str = "system_diff";

/// Cursors and pending sets survive restarts for this long.
pub const STATE_TTL: Duration = Duration::from_secs(60 * 60);

/// Rows younger than this are still being written and are left for the next
/// pass.
const RECENT_SETTLE_DELAY: TimeDelta = TimeDelta::minutes(1);
const RECENT_LOOKBACK: TimeDelta = TimeDelta::minutes(15);

/// One auditor driven by [`run_checker`].
pub trait Checker {
    fn load_state(&mut self) -> Result<()>;

    fn save_state(&self) -> Result<()>;

    fn check_all(&mut self) -> Result<()>;

    /// Startup/shutdown announcement, sent regardless of anomalies.
    fn send_notice(&self, message: &str);
}

/// Runs `checker` until Ctrl-C: one full pass per `interval`, state saved
/// after every pass and once more on the way out.
pub async fn run_checker<K: Checker>(checker: &mut K, interval: Duration, announce: bool) -> Result<()> {
    if announce {
        checker.send_notice(&format!(
            "Started {} {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ));
    }
    checker.load_state()?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        if let Err(e) = checker.check_all() {
            error!("Check pass failed: {:#}", e);
        }
        if let Err(e) = checker.save_state() {
            warn!("Cannot save checker state: {:#}", e);
        }

        tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupted, saving state");
                break;
            }
            _ = sleep(interval) => {}
        }
    }

    checker.save_state()?;
    if announce {
        checker.send_notice("Done");
    }
    Ok(())
}

/// Delivers anomaly reports of one checker.
pub struct Reporter<N, G> {
    notifier: N,
    gauge: G,
    checker: &'static str,
    title: &'static str,
    send: bool,
}

impl<N: Notifier, G: GaugeSink> Reporter<N, G> {
    pub fn new(checker: &'static str, title: &'static str, notifier: N, gauge: G, send: bool) -> Self {
        Self {
            notifier,
            gauge,
            checker,
            title,
            send,
        }
    }

    /// Reports `message` about the row `id`. `check` names the violated
    /// invariant in the gauge labels.
    pub fn report(&self, check: &str, id: i64, message: &str, details: &str) {
        let mut notification = format!("{message}: #{id}");
        if !details.is_empty() {
            notification.push(' ');
            notification.push_str(details);
        }
        warn!(checker = self.checker, check, "{}", notification);

        if self.send {
            self.notifier.notify(
                &notification,
                &format!("[{}] Check Failed", self.title),
                NOTIFICATION_CHANNEL,
            );
        }
        self.gauge.record_gauge(
            "checker_violation",
            &[("checker", self.checker), ("check", check)],
            id as f64,
        );
    }

    pub fn notice(&self, message: &str) {
        info!(checker = self.checker, "{}", message);
        if self.send {
            self.notifier
                .notify(message, self.title, NOTIFICATION_CHANNEL);
        }
    }
}

/// `|value| < 1e-10`
pub fn money_is_zero(value: Decimal) -> bool {
    value.abs() < Decimal::new(1, 10)
}

pub fn money_is_close(a: Decimal, b: Decimal) -> bool {
    money_is_zero(a - b)
}

/// Looser comparison used for wallet balances: `|a - b| < 1e-7`.
pub fn is_close(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() < Decimal::new(1, 7)
}

/// `[now - 15min, now - 1min]`
pub fn recent_window(now: DateTime<Utc>) -> RecentWindow {
    RecentWindow {
        from: now - RECENT_LOOKBACK,
        to: now - RECENT_SETTLE_DELAY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RecordingGauge;
    use crate::notify::RecordingNotifier;
    use std::str::FromStr;

    #[test]
    fn report_format_and_gauge() {
        let notifier = RecordingNotifier::new();
        let gauge = RecordingGauge::new();
        let reporter = Reporter::new("online", "Checker", &notifier, &gauge, true);

        reporter.report("trade_transactions", 42, "Trade misses transactions", "");
        reporter.report("tx_predecessor", 7, "Deleted previous transaction", "W#3 TX#6");

        let sent = notifier.sent();
        assert_eq!(sent[0].message, "Trade misses transactions: #42");
        assert_eq!(sent[0].title, "[Checker] Check Failed");
        assert_eq!(sent[0].channel, "system_diff");
        assert_eq!(sent[1].message, "Deleted previous transaction: #7 W#3 TX#6");
        assert_eq!(gauge.values_of("checker_violation"), vec![42.0, 7.0]);
    }

    #[test]
    fn disabled_reporter_only_logs() {
        let notifier = RecordingNotifier::new();
        let reporter = Reporter::new("diff", "Diff Checker", &notifier, crate::metrics::MetricsGauge, false);
        reporter.report("withdraw_tx", 1, "Missing transaction", "");
        reporter.notice("Done");
        assert!(notifier.sent().is_empty());
    }

    #[test]
    fn money_tolerances() {
        let d = |s: &str| Decimal::from_str(s).unwrap();
        assert!(money_is_zero(d("0.00000000009")));
        assert!(!money_is_zero(d("-0.0000000001")));
        assert!(money_is_close(d("1.00000000001"), d("1")));
        assert!(is_close(d("1.00000009"), d("1")));
        assert!(!is_close(d("1.0000001"), d("1")));
    }

    #[test]
    fn non_positive_ids_sort_last() {
        let mut ids = vec![-2, 5, 0, 1, -1];
        ids.sort_by_key(|id| ordering_key(*id));
        assert_eq!(ids, vec![1, 5, -2, -1, 0]);
    }
}
