use crate::currency::Currency;
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Offset added to non-positive ids so that corrective system transactions
/// sort after every regular one.
pub const NEGATIVE_ID_OFFSET: i64 = 2_147_483_647;

/// Logical order of ledger ids: positive ids in order, then non-positive ids
/// (corrective system transactions) after all of them.
// TODO: drop once no legacy path writes non-positive ids anymore.
pub fn ordering_key(id: i64) -> i64 {
    if id > 0 { id } else { id + NEGATIVE_ID_OFFSET }
}

/// Tx-hash marker of deposits produced by internal transfers between users.
pub const INTERNAL_DEPOSIT_MARKER: &str = "-internal-W";

pub const CARD_NUMBER_PLACEHOLDER: &str = "0000-0000-0000-0000";

/// Declares a text-backed enum stored in sqlite by its code.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $code:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn code(self) -> &'static str {
                match self {
                    $($name::$variant => $code),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.code())
            }
        }

        impl FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($code => Ok($name::$variant),)+
                    other => Err(anyhow!("Unknown {} code: {}", stringify!($name), other)),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.code()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: anyhow::Error| FromSqlError::Other(e.into()))
            }
        }
    };
}

text_enum!(TransactionType {
    Deposit => "deposit",
    Withdraw => "withdraw",
    Buy => "buy",
    Sell => "sell",
    Manual => "manual",
    Refund => "refund",
    Gateway => "gateway",
    Fee => "fee",
    Transfer => "transfer",
});

text_enum!(RefModule {
    ExchangeSystemSrc => "ExchangeSystemSrc",
    ExchangeSystemDst => "ExchangeSystemDst",
    InternalTransferDeposit => "InternalTransferDeposit",
    InternalTransferWithdraw => "InternalTransferWithdraw",
    TradeSrc => "TradeSrc",
    TradeDst => "TradeDst",
    WithdrawRequest => "WithdrawRequest",
    Deposit => "Deposit",
});

text_enum!(CardDepositStatus {
    Success => "success",
    InvalidCard => "invalid_card",
    Refunded => "refunded",
    Failed => "failed",
});

impl RefModule {
    pub fn is_exchange_system(self) -> bool {
        matches!(self, RefModule::ExchangeSystemSrc | RefModule::ExchangeSystemDst)
    }
}

impl CardDepositStatus {
    /// Statuses whose amounts were credited to the user's rial wallet.
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            CardDepositStatus::Success | CardDepositStatus::InvalidCard | CardDepositStatus::Refunded
        )
    }
}

impl ToSql for Currency {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for Currency {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: anyhow::Error| FromSqlError::Other(e.into()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(i64)]
pub enum WithdrawStatus {
    New = 1,
    Verified = 2,
    Accepted = 3,
    Sent = 4,
    Done = 5,
    Rejected = 6,
    Processing = 7,
    Canceled = 8,
    Waiting = 9,
    ManualAccepted = 10,
}

impl WithdrawStatus {
    pub const PENDING: [WithdrawStatus; 5] = [
        WithdrawStatus::Verified,
        WithdrawStatus::Accepted,
        WithdrawStatus::ManualAccepted,
        WithdrawStatus::Processing,
        WithdrawStatus::Waiting,
    ];
    pub const COMMITTED: [WithdrawStatus; 2] = [WithdrawStatus::Sent, WithdrawStatus::Done];

    pub fn is_pending(self) -> bool {
        Self::PENDING.contains(&self)
    }

    pub fn is_committed(self) -> bool {
        Self::COMMITTED.contains(&self)
    }

    pub fn is_active(self) -> bool {
        self.is_pending() || self.is_committed()
    }

    pub fn from_code(code: i64) -> Option<Self> {
        use WithdrawStatus::*;
        [
            New, Verified, Accepted, Sent, Done, Rejected, Processing, Canceled, Waiting,
            ManualAccepted,
        ]
        .into_iter()
        .find(|s| *s as i64 == code)
    }
}

impl ToSql for WithdrawStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(*self as i64))
    }
}

impl FromSql for WithdrawStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = value.as_i64()?;
        WithdrawStatus::from_code(code).ok_or(FromSqlError::OutOfRange(code))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Wallet {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub currency: Currency,
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerTransaction {
    pub id: i64,
    pub wallet_id: i64,
    pub tp: TransactionType,
    pub amount: Decimal,
    /// Wallet balance right after this transaction; `None` for legacy rows.
    pub balance: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub ref_module: Option<RefModule>,
    pub ref_id: Option<i64>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub amount: Decimal,
    pub matched_amount: Decimal,
    pub matched_total_price: Decimal,
    pub fee: Decimal,
    pub price: Decimal,
    pub is_market: bool,
    pub is_margin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trade {
    pub id: i64,
    pub src_currency: Currency,
    pub dst_currency: Currency,
    pub seller_id: i64,
    pub buyer_id: i64,
    pub sell_order_id: i64,
    pub buy_order_id: i64,
    pub matched_amount: Decimal,
    pub matched_price: Decimal,
    pub sell_fee_amount: Decimal,
    pub buy_fee_amount: Decimal,
    pub sell_deposit_id: Option<i64>,
    pub sell_withdraw_id: Option<i64>,
    pub buy_deposit_id: Option<i64>,
    pub buy_withdraw_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WithdrawRequest {
    pub id: i64,
    pub wallet_id: i64,
    pub amount: Decimal,
    pub status: WithdrawStatus,
    pub transaction_id: Option<i64>,
    /// The automatic withdraw attached to this request reached a committed state.
    pub auto_withdraw_committed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmedDeposit {
    pub wallet_id: i64,
    pub tx_hash: String,
    pub amount: Decimal,
    pub validated: bool,
    pub confirmed: bool,
    pub transaction_id: Option<i64>,
}

impl ConfirmedDeposit {
    pub fn is_internal(&self) -> bool {
        self.tx_hash
            .to_lowercase()
            .contains(&INTERNAL_DEPOSIT_MARKER.to_lowercase())
    }
}

/// Rial deposit through a card payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardDeposit {
    pub user_id: i64,
    pub amount: Decimal,
    pub fee: Decimal,
    pub card_number: Option<String>,
    pub gateway_ref: Option<String>,
    pub status: CardDepositStatus,
    pub transaction_id: Option<i64>,
}

impl CardDeposit {
    pub fn is_valid(&self) -> bool {
        let card_ok = self
            .card_number
            .as_deref()
            .is_some_and(|c| c != CARD_NUMBER_PLACEHOLDER);
        let requested = self.gateway_ref.as_deref().is_some_and(|r| r != "0");
        card_ok && requested && self.status.is_settled()
    }
}

/// Rial deposit through a bank transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BankDeposit {
    pub user_id: i64,
    pub amount: Decimal,
    pub fee: Decimal,
    pub confirmed: bool,
    pub transaction_id: Option<i64>,
}

/// Row of the scanner's `address_deltas` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressDelta {
    pub network: String,
    pub tx_hash: String,
    pub address: String,
    pub currency: Currency,
    pub direction: String,
    pub value: Decimal,
    pub contract_address: Option<String>,
    pub block_height: u64,
    pub symbol: String,
}

/// Inclusive `[from, to]` creation-time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Half-open `(after, until]` window over the creation time of the
/// transaction each row settled through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementWindow {
    pub after: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CryptoDepositSums {
    pub external: Decimal,
    pub internal: Decimal,
}

/// Per-type transaction sums of one wallet over a settlement window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionSums {
    pub buys: Decimal,
    pub sells: Decimal,
    pub manual: Decimal,
    pub refund: Decimal,
    pub gateway: Decimal,
    /// First transaction of the window by id order.
    pub earliest: Option<LedgerTransaction>,
}

pub fn parse_decimal(value: &str) -> anyhow::Result<Decimal> {
    Decimal::from_str(value)
        .map_err(|_| anyhow!("Invalid decimal format in database: {}", value))
}

/// Sums decimal TEXT columns.
pub fn sum_decimals<I: IntoIterator<Item = String>>(values: I) -> anyhow::Result<Decimal> {
    let mut total = Decimal::ZERO;
    for value in values {
        total = total
            .checked_add(parse_decimal(&value)?)
            .ok_or_else(|| anyhow!("Overflow in sum calculation"))?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn withdraw_status_sets() {
        assert!(WithdrawStatus::Processing.is_pending());
        assert!(WithdrawStatus::Done.is_committed());
        assert!(WithdrawStatus::Sent.is_active());
        assert!(!WithdrawStatus::New.is_active());
        assert!(!WithdrawStatus::Canceled.is_active());
        assert_eq!(WithdrawStatus::from_code(10), Some(WithdrawStatus::ManualAccepted));
        assert_eq!(WithdrawStatus::from_code(11), None);
    }

    #[test]
    fn internal_marker_is_case_insensitive() {
        let deposit = ConfirmedDeposit {
            wallet_id: 1,
            tx_hash: "exchange-INTERNAL-w42".into(),
            amount: Decimal::ONE,
            validated: true,
            confirmed: true,
            transaction_id: None,
        };
        assert!(deposit.is_internal());
    }

    #[test]
    fn card_deposit_validity() {
        let mut deposit = CardDeposit {
            user_id: 1,
            amount: Decimal::from(1000),
            fee: Decimal::from(10),
            card_number: Some("6037-9911-2233-4455".into()),
            gateway_ref: Some("abc".into()),
            status: CardDepositStatus::Success,
            transaction_id: Some(1),
        };
        assert!(deposit.is_valid());
        deposit.card_number = Some(CARD_NUMBER_PLACEHOLDER.into());
        assert!(!deposit.is_valid());
        deposit.card_number = Some("6037-9911-2233-4455".into());
        deposit.gateway_ref = Some("0".into());
        assert!(!deposit.is_valid());
        deposit.gateway_ref = Some("abc".into());
        deposit.status = CardDepositStatus::Failed;
        assert!(!deposit.is_valid());
    }

    #[test]
    fn sums_decimal_text() {
        let total = sum_decimals(["1.5".to_string(), "-0.25".to_string()]).unwrap();
        assert_eq!(total, Decimal::from_str("1.25").unwrap());
        assert!(sum_decimals(["x".to_string()]).is_err());
    }
}
