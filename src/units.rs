use crate::currency::Currency;
use crate::network::Network;
use alloy_primitives::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_DECIMAL_PLACES: u32 = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitError {
    #[error("invalid integer amount: {0}")]
    Invalid(String),
    #[error("negative amount not accepted: {0}")]
    Negative(String),
    #[error("amount {0} does not fit a decimal with {1} places")]
    Overflow(String, u32),
    #[error("amount {0} has more than {1} fractional digits")]
    ExcessPrecision(Decimal, u32),
}

/// Integer minor-unit amount as reported by a provider. Blockbook sends
/// decimal strings; some fixtures and providers send plain JSON numbers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawAmount {
    Text(String),
    Number(serde_json::Number),
}

impl RawAmount {
    fn as_text(&self) -> String {
        match self {
            RawAmount::Text(s) => s.trim().to_string(),
            RawAmount::Number(n) => n.to_string(),
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, RawAmount::Text(s) if s.trim().is_empty())
    }

    pub fn to_display(&self, decimals: u32) -> Result<Decimal, UnitError> {
        from_unit(&self.as_text(), decimals)
    }

    pub fn to_display_signed(&self, decimals: u32) -> Result<Decimal, UnitError> {
        from_unit_signed(&self.as_text(), decimals)
    }
}

impl From<u64> for RawAmount {
    fn from(value: u64) -> Self {
        RawAmount::Number(value.into())
    }
}

/// Converts a non-negative minor-unit integer to its display value.
pub fn from_unit(minor: &str, decimals: u32) -> Result<Decimal, UnitError> {
    if minor.starts_with('-') {
        return Err(UnitError::Negative(minor.to_string()));
    }
    let value = U256::from_str_radix(minor, 10)
        .map_err(|_| UnitError::Invalid(minor.to_string()))?;
    u256_to_decimal(value, decimals)
}

/// Like [`from_unit`] but accepts a leading minus sign (unconfirmed balances).
pub fn from_unit_signed(minor: &str, decimals: u32) -> Result<Decimal, UnitError> {
    match minor.strip_prefix('-') {
        Some(magnitude) => from_unit(magnitude, decimals).map(|d| -d),
        None => from_unit(minor, decimals),
    }
}

pub fn u256_to_decimal(value: U256, decimals: u32) -> Result<Decimal, UnitError> {
    if value.is_zero() {
        return Ok(Decimal::ZERO);
    }
    let overflow = || UnitError::Overflow(value.to_string(), decimals);
    let mantissa = u128::try_from(value)
        .ok()
        .and_then(|v| i128::try_from(v).ok())
        .ok_or_else(overflow)?;
    let decimal = Decimal::try_from_i128_with_scale(mantissa, decimals).map_err(|_| overflow())?;
    Ok(decimal.normalize())
}

/// Converts a display value back to integer minor units.
pub fn to_unit(value: Decimal, decimals: u32) -> Result<U256, UnitError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(UnitError::Negative(value.to_string()));
    }
    if value.normalize().scale() > decimals {
        return Err(UnitError::ExcessPrecision(value, decimals));
    }
    let overflow = || UnitError::Overflow(value.to_string(), decimals);
    let factor = 10i128
        .checked_pow(decimals)
        .and_then(|f| Decimal::try_from_i128_with_scale(f, 0).ok())
        .ok_or_else(overflow)?;
    let scaled = value.checked_mul(factor).ok_or_else(overflow)?;
    let minor = scaled.trunc().to_u128().ok_or_else(overflow)?;
    Ok(U256::from(minor))
}

/// One decimal-places rule. `currency: None` applies to every currency on the
/// network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecisionRule {
    pub currency: Option<Currency>,
    pub network: Network,
    pub places: u32,
}

/// Decimal places a currency is rounded to on a given network. Withdrawals are
/// rounded to these places before broadcast, so values found on chain can
/// differ from ledger values below this precision.
#[derive(Debug, Clone)]
pub struct PrecisionTable {
    exact: HashMap<(Currency, Network), u32>,
    network_wide: HashMap<Network, u32>,
    default_places: u32,
}

impl Default for PrecisionTable {
    fn default() -> Self {
        let rules = [
            (Some(Currency::Eos), Network::Eos, 4),
            (Some(Currency::Flow), Network::Flow, 5),
            (Some(Currency::Xrp), Network::Xrp, 6),
            (Some(Currency::Ada), Network::Ada, 6),
            (Some(Currency::Usdt), Network::Eth, 6),
            (None, Network::Trx, 6),
            (Some(Currency::Xlm), Network::Xlm, 7),
        ];
        let mut table = PrecisionTable {
            exact: HashMap::new(),
            network_wide: HashMap::new(),
            default_places: DEFAULT_DECIMAL_PLACES,
        };
        for (currency, network, places) in rules {
            table.insert(PrecisionRule {
                currency,
                network,
                places,
            });
        }
        table
    }
}

impl PrecisionTable {
    pub fn insert(&mut self, rule: PrecisionRule) {
        match rule.currency {
            Some(currency) => {
                self.exact.insert((currency, rule.network), rule.places);
            }
            None => {
                self.network_wide.insert(rule.network, rule.places);
            }
        }
    }

    /// Parses `currency:network:places` triples separated by commas. A `*`
    /// currency makes the rule network-wide.
    pub fn with_overrides(mut self, spec: &str) -> anyhow::Result<Self> {
        for item in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let parts: Vec<&str> = item.split(':').collect();
            let [currency, network, places] = parts.as_slice() else {
                anyhow::bail!("Invalid precision override: {}", item);
            };
            let currency = match *currency {
                "*" => None,
                code => Some(Currency::from_str(code)?),
            };
            let places: u32 = places
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid places in precision override: {}", item))?;
            self.insert(PrecisionRule {
                currency,
                network: Network::from_str(network)?,
                places,
            });
        }
        Ok(self)
    }

    pub fn decimal_places(&self, currency: Currency, network: Network) -> u32 {
        self.exact
            .get(&(currency, network))
            .or_else(|| self.network_wide.get(&network))
            .copied()
            .unwrap_or(self.default_places)
    }

    pub fn quantize(&self, value: Decimal, currency: Currency, network: Network) -> Decimal {
        let places = self.decimal_places(currency, network);
        value
            .round_dp_with_strategy(places, RoundingStrategy::ToZero)
            .normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn converts_minor_units() {
        assert_eq!(from_unit("150000000", 8).unwrap(), dec("1.5"));
        assert_eq!(from_unit("1", 18).unwrap(), dec("0.000000000000000001"));
        assert_eq!(from_unit("0", 18).unwrap(), Decimal::ZERO);
        assert_eq!(from_unit("2500", 6).unwrap(), dec("0.0025"));
    }

    #[test]
    fn rejects_negative_and_garbage() {
        assert_matches!(from_unit("-5", 8), Err(UnitError::Negative(_)));
        assert_matches!(from_unit("abc", 8), Err(UnitError::Invalid(_)));
        assert_eq!(from_unit_signed("-5", 1).unwrap(), dec("-0.5"));
    }

    #[test]
    fn overflow_is_an_error_not_a_panic() {
        let huge = U256::MAX.to_string();
        assert_matches!(from_unit(&huge, 18), Err(UnitError::Overflow(_, 18)));
    }

    #[test]
    fn round_trip_through_minor_units() {
        let cases = [
            ("1.5", 8),
            ("0.00000001", 8),
            ("123456.789", 18),
            ("42", 0),
            ("0.000001", 6),
            ("0", 6),
        ];
        for (display, decimals) in cases {
            let x = dec(display);
            let minor = to_unit(x, decimals).unwrap();
            let back = from_unit(&minor.to_string(), decimals).unwrap();
            assert_eq!(back, x, "{display} @ {decimals}");
            assert!(back.scale() <= decimals);
        }
    }

    #[test]
    fn to_unit_rejects_excess_precision() {
        assert_matches!(
            to_unit(dec("0.0000001"), 6),
            Err(UnitError::ExcessPrecision(_, 6))
        );
    }

    #[test]
    fn precision_table_defaults() {
        let table = PrecisionTable::default();
        assert_eq!(table.decimal_places(Currency::Usdt, Network::Eth), 6);
        assert_eq!(table.decimal_places(Currency::Usdt, Network::Trx), 6);
        assert_eq!(table.decimal_places(Currency::Eos, Network::Eos), 4);
        assert_eq!(table.decimal_places(Currency::Btc, Network::Btc), 8);
        assert_eq!(table.decimal_places(Currency::Usdt, Network::Bsc), 8);
    }

    #[test]
    fn precision_overrides_take_priority() {
        let table = PrecisionTable::default()
            .with_overrides("usdt:bsc:6, *:matic:5")
            .unwrap();
        assert_eq!(table.decimal_places(Currency::Usdt, Network::Bsc), 6);
        assert_eq!(table.decimal_places(Currency::Pol, Network::Matic), 5);
        assert!(PrecisionTable::default().with_overrides("usdt:bsc").is_err());
    }

    #[test]
    fn quantize_truncates_to_places() {
        let table = PrecisionTable::default();
        assert_eq!(
            table.quantize(dec("1.23456789"), Currency::Usdt, Network::Eth),
            dec("1.234567")
        );
        assert_eq!(
            table.quantize(dec("5"), Currency::Btc, Network::Btc),
            dec("5")
        );
    }
}
