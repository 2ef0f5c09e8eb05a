use chain_recon::currency::Currency;
use chain_recon::network::{Network, PSEUDO_NETWORK_CONTRACTS};
use chain_recon::parser::TransactionParser;
use chain_recon::provider::RawTransaction;
use chain_recon::units::PrecisionTable;
use rust_decimal::Decimal;
use serde_json::json;

const TRANSFER_DATA: &str = "0xa9059cbb000000000000000000000000d8da6bf26964af9d7eed9e03e53415d37aa960450000000000000000000000000000000000000000000000000000000005f5e100";

fn parser(network: Network) -> TransactionParser {
    TransactionParser::new(network.spec().unwrap(), PrecisionTable::default())
}

fn case_variants(address: &str) -> Vec<String> {
    let hex = &address[2..];
    vec![
        address.to_lowercase(),
        format!("0x{}", hex.to_uppercase()),
        format!("0X{}", hex.to_uppercase()),
        address
            .chars()
            .enumerate()
            .map(|(i, c)| if i % 2 == 0 { c.to_ascii_uppercase() } else { c })
            .collect(),
    ]
}

#[test]
fn pseudo_contracts_resolve_the_same_regardless_of_case() {
    let parser = parser(Network::Eth);
    for pseudo in PSEUDO_NETWORK_CONTRACTS {
        for address in case_variants(pseudo.info.address) {
            let (currency, contract) = parser
                .contract_currency(&address)
                .unwrap_or_else(|| panic!("{} did not resolve", address));
            assert_eq!(currency, pseudo.destination_currency, "{}", pseudo.title);
            assert_eq!(contract.as_deref(), Some(pseudo.info.address));

            let info = parser.contract_info(currency, contract.as_deref()).unwrap();
            assert_eq!(info.decimals, pseudo.info.decimals, "{}", pseudo.title);
            assert_eq!(info.symbol, pseudo.info.symbol, "{}", pseudo.title);
        }
    }
}

#[test]
fn unknown_contracts_do_not_resolve() {
    let parser = parser(Network::Arb);
    assert!(parser.contract_currency("0x000000000000000000000000000000000000dead").is_none());
}

#[test]
fn pseudo_token_transfers_carry_their_contract() {
    let parser = parser(Network::Arb);
    let weth = "0x82af49447d8a07e3bd95bd0d56f35241523fbab1";
    let raw: RawTransaction = serde_json::from_value(json!({
        "txid": "0xfeed",
        "blockHeight": 42,
        "fees": "21000000000000",
        "value": "0",
        "vin": [{"addresses": ["0xsender"], "isAddress": true}],
        "vout": [{"addresses": [weth.to_uppercase()], "value": "0", "isAddress": true}],
        "tokenTransfers": [{
            "type": "ERC20",
            "from": "0xsender",
            "to": "0xreceiver",
            "contract": weth.to_uppercase(),
            "value": "1500000000000000000",
        }],
        "ethereumSpecific": {"status": 1, "data": TRANSFER_DATA},
    }))
    .unwrap();

    let legs = parser.get_input_output_tx(&raw, true).unwrap();
    let leg = &legs.outputs["0xreceiver"][&Currency::Eth];
    assert_eq!(leg.value, Decimal::new(15, 1));
    assert_eq!(leg.contract_address.as_deref(), Some(weth));
    assert!(legs.input_addresses.contains("0xsender"));

    let tx = parser.parse_tx_details(&raw);
    let token = tx
        .transfers
        .iter()
        .find(|t| t.currency == Currency::Eth && t.to.as_deref() == Some("0xreceiver"))
        .unwrap();
    assert_eq!(token.symbol.as_deref(), Some("ETH"));
    assert_eq!(token.value, Decimal::new(15, 1));
}

#[test]
fn failed_token_calls_are_rejected() {
    let parser = parser(Network::Arb);
    let raw: RawTransaction = serde_json::from_value(json!({
        "txid": "0xbad",
        "tokenTransfers": [{
            "from": "0xsender",
            "to": "0xreceiver",
            "contract": "0x82af49447d8a07e3bd95bd0d56f35241523fbab1",
            "value": "1",
        }],
        "ethereumSpecific": {"status": 0, "data": TRANSFER_DATA},
    }))
    .unwrap();
    assert!(parser.get_input_output_tx(&raw, true).is_none());
    assert!(!parser.parse_tx_details(&raw).success);
}
