//! EIP-155 network identifiers.
//!
//! Requirements name their network either as a CAIP-2 id (`eip155:8453`) or
//! by a legacy name (`base-sepolia`). Both resolve to a numeric chain id.

use alloy_primitives::{Address, address};

/// An EIP-155 chain ID (e.g., 8453 for Base).
pub type ChainId = u64;

/// Base Mainnet chain ID.
pub const BASE_MAINNET: ChainId = 8453;

/// Base Sepolia (testnet) chain ID.
pub const BASE_SEPOLIA: ChainId = 84532;

/// Ethereum Mainnet chain ID.
pub const ETHEREUM_MAINNET: ChainId = 1;

/// Polygon Mainnet chain ID.
pub const POLYGON_MAINNET: ChainId = 137;

/// USDC contract address on Base Mainnet.
pub const USDC_BASE: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

/// USDC contract address on Base Sepolia.
pub const USDC_BASE_SEPOLIA: Address = address!("036CbD53842c5426634e7929541eC2318f3dCF7e");

/// EIP-712 domain name assumed when a requirement carries none.
pub const DEFAULT_USDC_NAME: &str = "USD Coin";

/// EIP-712 domain version assumed when a requirement carries none.
pub const DEFAULT_USDC_VERSION: &str = "2";

const LEGACY_NAMES: &[(&str, ChainId)] = &[
    ("base", BASE_MAINNET),
    ("base-sepolia", BASE_SEPOLIA),
    ("ethereum", ETHEREUM_MAINNET),
    ("polygon", POLYGON_MAINNET),
];

/// Formats a chain ID as a CAIP-2 identifier.
///
/// Example: `caip2(8453)` returns `"eip155:8453"`.
#[must_use]
pub fn caip2(chain_id: ChainId) -> String {
    format!("eip155:{chain_id}")
}

/// Resolves a network identifier to its chain id.
///
/// Returns `None` for non-EIP-155 namespaces and unknown names.
#[must_use]
pub fn chain_id_of(network: &str) -> Option<ChainId> {
    if let Some(reference) = network.strip_prefix("eip155:") {
        return reference.parse().ok();
    }
    LEGACY_NAMES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(network))
        .map(|(_, id)| *id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_caip2_and_legacy_names() {
        assert_eq!(chain_id_of("eip155:8453"), Some(BASE_MAINNET));
        assert_eq!(chain_id_of("base-sepolia"), Some(BASE_SEPOLIA));
        assert_eq!(chain_id_of(&caip2(137)), Some(POLYGON_MAINNET));
        assert_eq!(chain_id_of("solana:mainnet"), None);
        assert_eq!(chain_id_of("eip155:abc"), None);
    }
}
