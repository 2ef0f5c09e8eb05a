use crate::currency::Currency;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Network {
    Btc,
    Ltc,
    Doge,
    Bch,
    Dash,
    Eth,
    Etc,
    Bsc,
    Matic,
    Ftm,
    Arb,
    Trx,
    Xrp,
    Ada,
    Eos,
    Flow,
    Xlm,
}

impl Network {
    pub const ALL: [Network; 17] = [
        Network::Btc,
        Network::Ltc,
        Network::Doge,
        Network::Bch,
        Network::Dash,
        Network::Eth,
        Network::Etc,
        Network::Bsc,
        Network::Matic,
        Network::Ftm,
        Network::Arb,
        Network::Trx,
        Network::Xrp,
        Network::Ada,
        Network::Eos,
        Network::Flow,
        Network::Xlm,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Network::Btc => "BTC",
            Network::Ltc => "LTC",
            Network::Doge => "DOGE",
            Network::Bch => "BCH",
            Network::Dash => "DASH",
            Network::Eth => "ETH",
            Network::Etc => "ETC",
            Network::Bsc => "BSC",
            Network::Matic => "MATIC",
            Network::Ftm => "FTM",
            Network::Arb => "ARB",
            Network::Trx => "TRX",
            Network::Xrp => "XRP",
            Network::Ada => "ADA",
            Network::Eos => "EOS",
            Network::Flow => "FLOW",
            Network::Xlm => "XLM",
        }
    }

    /// Block-scanner parameters for networks served by a Blockbook backend.
    /// Networks without one return `None`.
    pub fn spec(self) -> Option<NetworkSpec> {
        let utxo = |native: Currency, cache_key: &'static str| NetworkSpec {
            network: self,
            native_currency: native,
            precision: 8,
            token_network: false,
            max_blocks: 300,
            confirmed_num: 1,
            ignore_warning: false,
            ignore_not_sync: true,
            cache_key,
            address_prefix: None,
            contracts: &[],
            extra_transfer_selectors: &[],
        };
        let evm = |native: Currency,
                   cache_key: &'static str,
                   contracts: &'static [ContractInfo]| NetworkSpec {
            precision: 18,
            token_network: true,
            contracts,
            ..utxo(native, cache_key)
        };

        let spec = match self {
            Network::Btc => utxo(Currency::Btc, "btc"),
            Network::Ltc => utxo(Currency::Ltc, "ltc"),
            Network::Doge => utxo(Currency::Doge, "doge"),
            Network::Bch => NetworkSpec {
                address_prefix: Some("bitcoincash:"),
                ..utxo(Currency::Bch, "bch")
            },
            Network::Dash => utxo(Currency::Dash, "dash"),
            Network::Eth => evm(Currency::Eth, "eth", ETH_CONTRACTS),
            Network::Etc => evm(Currency::Etc, "etc", &[]),
            Network::Bsc => evm(Currency::Bnb, "bsc", BSC_CONTRACTS),
            Network::Matic => evm(Currency::Pol, "matic", MATIC_CONTRACTS),
            Network::Ftm => evm(Currency::Ftm, "ftm", &[]),
            Network::Arb => evm(Currency::Eth, "arb", ARB_CONTRACTS),
            Network::Trx
            | Network::Xrp
            | Network::Ada
            | Network::Eos
            | Network::Flow
            | Network::Xlm => return None,
        };
        Some(spec)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Network {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase();
        Network::ALL
            .iter()
            .copied()
            .find(|n| n.name() == wanted)
            .ok_or_else(|| anyhow::anyhow!("Unknown network: {}", s))
    }
}

/// A token contract known on one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractInfo {
    pub currency: Currency,
    pub address: &'static str,
    pub decimals: u32,
    pub symbol: &'static str,
}

/// Wrapped-asset contract folded into a currency native to another context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PseudoContract {
    pub title: &'static str,
    pub real_network: Network,
    pub destination_currency: Currency,
    pub info: ContractInfo,
}

#[derive(Debug, Clone)]
pub struct NetworkSpec {
    pub network: Network,
    pub native_currency: Currency,
    /// Decimal places of the native coin's minor unit.
    pub precision: u32,
    /// Account-based chain with contract token transfers.
    pub token_network: bool,
    pub max_blocks: u64,
    pub confirmed_num: u64,
    pub ignore_warning: bool,
    pub ignore_not_sync: bool,
    pub cache_key: &'static str,
    /// Prefix stripped from provider addresses (e.g. cashaddr `bitcoincash:`).
    pub address_prefix: Option<&'static str>,
    pub contracts: &'static [ContractInfo],
    /// Accepted call-data selectors on top of ERC-20 `transfer`/`transferFrom`.
    pub extra_transfer_selectors: &'static [[u8; 4]],
}

impl NetworkSpec {
    pub fn watermark_key(&self) -> String {
        format!("latest_block_height_processed_{}", self.cache_key)
    }

    pub fn failure_count_key(&self) -> String {
        format!("scanner_fail_count_{}", self.cache_key)
    }

    pub fn convert_address(&self, address: &str) -> Option<String> {
        let address = match self.address_prefix {
            Some(prefix) => address.strip_prefix(prefix).unwrap_or(address),
            None => address,
        };
        if address.is_empty() {
            None
        } else {
            Some(address.to_string())
        }
    }
}

const ETH_CONTRACTS: &[ContractInfo] = &[
    ContractInfo {
        currency: Currency::Usdt,
        address: "0xdac17f958d2ee523a2206206994597c13d831ec7",
        decimals: 6,
        symbol: "USDT",
    },
    ContractInfo {
        currency: Currency::Usdc,
        address: "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
        decimals: 6,
        symbol: "USDC",
    },
];

const BSC_CONTRACTS: &[ContractInfo] = &[
    ContractInfo {
        currency: Currency::Usdt,
        address: "0x55d398326f99059ff775485246999027b3197955",
        decimals: 18,
        symbol: "USDT",
    },
    ContractInfo {
        currency: Currency::Usdc,
        address: "0x8ac76a51cc950d9822d68b83fe1ad97b32cd580d",
        decimals: 18,
        symbol: "USDC",
    },
    ContractInfo {
        currency: Currency::Eth,
        address: "0x2170ed0880ac9a755fd29b2688956bd959f933f8",
        decimals: 18,
        symbol: "ETH",
    },
];

const MATIC_CONTRACTS: &[ContractInfo] = &[ContractInfo {
    currency: Currency::Usdt,
    address: "0xc2132d05d31c914a87c6611c10748aeb04b58e8f",
    decimals: 6,
    symbol: "USDT",
}];

const ARB_CONTRACTS: &[ContractInfo] = &[ContractInfo {
    currency: Currency::Usdt,
    address: "0xfd086bc7cd5c481dcc9c85ebe478a1c0b69fcbb9",
    decimals: 6,
    symbol: "USDT",
}];

pub const PSEUDO_NETWORK_CONTRACTS: &[PseudoContract] = &[
    PseudoContract {
        title: "WETH-ETH",
        real_network: Network::Eth,
        destination_currency: Currency::Eth,
        info: ContractInfo {
            currency: Currency::Eth,
            address: "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2",
            decimals: 18,
            symbol: "ETH",
        },
    },
    PseudoContract {
        title: "WETH-ARB",
        real_network: Network::Arb,
        destination_currency: Currency::Eth,
        info: ContractInfo {
            currency: Currency::Eth,
            address: "0x82af49447d8a07e3bd95bd0d56f35241523fbab1",
            decimals: 18,
            symbol: "ETH",
        },
    },
    PseudoContract {
        title: "USDC-ARB",
        real_network: Network::Arb,
        destination_currency: Currency::Usdc,
        info: ContractInfo {
            currency: Currency::Usdc,
            address: "0xaf88d065e77c8cc2239327c5edb3a432268e5831",
            decimals: 6,
            symbol: "USDC",
        },
    },
    PseudoContract {
        title: "USDC-MATIC",
        real_network: Network::Matic,
        destination_currency: Currency::Usdc,
        info: ContractInfo {
            currency: Currency::Usdc,
            address: "0x3c499c542cef5e3811e1192ce70d8cc03d5c3359",
            decimals: 6,
            symbol: "USDC",
        },
    },
];

pub fn pseudo_contract(address: &str) -> Option<&'static PseudoContract> {
    PSEUDO_NETWORK_CONTRACTS
        .iter()
        .find(|c| c.info.address.eq_ignore_ascii_case(address))
}
