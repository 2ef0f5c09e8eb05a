use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    function transfer(address to, uint256 value) returns (bool);
    function transferFrom(address from, address to, uint256 value) returns (bool);
}

/// Selectors of the ERC-20 calls accepted as genuine token transfers.
pub const TOKEN_TRANSFER_SELECTORS: [[u8; 4]; 2] = [transferCall::SELECTOR, transferFromCall::SELECTOR];

/// Returns the 4-byte method selector of hex call data (`0x`-prefixed).
pub fn selector(call_data: &str) -> Option<[u8; 4]> {
    let hex_part = call_data.strip_prefix("0x").unwrap_or(call_data);
    let head = hex_part.get(..8)?;
    let bytes = alloy_primitives::hex::decode(head).ok()?;
    bytes.try_into().ok()
}

/// Plain value transfers carry no call data at all.
pub fn is_plain_value_transfer(call_data: &str) -> bool {
    call_data == "0x"
}

pub fn is_token_transfer_call(call_data: &str, extra_selectors: &[[u8; 4]]) -> bool {
    selector(call_data).is_some_and(|s| {
        TOKEN_TRANSFER_SELECTORS.contains(&s) || extra_selectors.contains(&s)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSFER_DATA: &str = "0xa9059cbb000000000000000000000000d8da6bf26964af9d7eed9e03e53415d37aa960450000000000000000000000000000000000000000000000000000000005f5e100";

    #[test]
    fn erc20_selectors_match_well_known_values() {
        assert_eq!(TOKEN_TRANSFER_SELECTORS[0], [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(TOKEN_TRANSFER_SELECTORS[1], [0x23, 0xb8, 0x72, 0xdd]);
    }

    #[test]
    fn recognises_transfer_call_data() {
        assert!(is_token_transfer_call(TRANSFER_DATA, &[]));
        assert!(is_token_transfer_call("0x23b872dd", &[]));
        assert!(!is_token_transfer_call("0x095ea7b3aabb", &[]));
        assert!(is_token_transfer_call("0x095ea7b3aabb", &[[0x09, 0x5e, 0xa7, 0xb3]]));
    }

    #[test]
    fn short_or_malformed_data_has_no_selector() {
        assert_eq!(selector("0x"), None);
        assert_eq!(selector("0xa905"), None);
        assert_eq!(selector("0xzzzzzzzz"), None);
        assert!(is_plain_value_transfer("0x"));
        assert!(!is_plain_value_transfer(TRANSFER_DATA));
    }
}
