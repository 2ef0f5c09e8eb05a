use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Internal currency identifiers. Codes are the lowercase names used in the
/// ledger tables and cache payloads.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Rls,
    Btc,
    Ltc,
    Doge,
    Bch,
    Dash,
    Eth,
    Etc,
    Bnb,
    Pol,
    Ftm,
    Trx,
    Usdt,
    Usdc,
    Xrp,
    Ada,
    Eos,
    Flow,
    Xlm,
}

impl Currency {
    pub const ALL: [Currency; 19] = [
        Currency::Rls,
        Currency::Btc,
        Currency::Ltc,
        Currency::Doge,
        Currency::Bch,
        Currency::Dash,
        Currency::Eth,
        Currency::Etc,
        Currency::Bnb,
        Currency::Pol,
        Currency::Ftm,
        Currency::Trx,
        Currency::Usdt,
        Currency::Usdc,
        Currency::Xrp,
        Currency::Ada,
        Currency::Eos,
        Currency::Flow,
        Currency::Xlm,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Currency::Rls => "rls",
            Currency::Btc => "btc",
            Currency::Ltc => "ltc",
            Currency::Doge => "doge",
            Currency::Bch => "bch",
            Currency::Dash => "dash",
            Currency::Eth => "eth",
            Currency::Etc => "etc",
            Currency::Bnb => "bnb",
            Currency::Pol => "pol",
            Currency::Ftm => "ftm",
            Currency::Trx => "trx",
            Currency::Usdt => "usdt",
            Currency::Usdc => "usdc",
            Currency::Xrp => "xrp",
            Currency::Ada => "ada",
            Currency::Eos => "eos",
            Currency::Flow => "flow",
            Currency::Xlm => "xlm",
        }
    }

    /// Display symbol, e.g. `BTC`.
    pub fn symbol(self) -> String {
        self.code().to_uppercase()
    }

    pub fn is_rial(self) -> bool {
        self == Currency::Rls
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Currency::ALL
            .iter()
            .copied()
            .find(|c| c.code() == wanted)
            .ok_or_else(|| anyhow::anyhow!("Unknown currency: {}", s))
    }
}
