//! Ticker-symbol aliases for the common assets users type by code.
//!
//! Applied only at the input boundary: the engine itself deals in provider
//! ids. Unknown inputs pass through unchanged — the provider decides
//! whether they exist.

use chd_schemas::{AssetId, InvalidAssetId};

/// symbol → provider id, for the assets the front-end promotes.
const ALIASES: &[(&str, &str)] = &[
    ("btc", "bitcoin"),
    ("eth", "ethereum"),
    ("bnb", "binancecoin"),
    ("sol", "solana"),
    ("ada", "cardano"),
    ("xrp", "ripple"),
    ("dot", "polkadot"),
    ("doge", "dogecoin"),
    ("usdt", "tether"),
    ("usdc", "usd-coin"),
];

/// Normalize user input to an [`AssetId`], mapping known ticker codes to
/// their provider id.
pub fn resolve_asset(input: &str) -> Result<AssetId, InvalidAssetId> {
    let id = AssetId::new(input)?;
    match ALIASES.iter().find(|(code, _)| *code == id.as_str()) {
        Some((_, full)) => AssetId::new(full),
        None => Ok(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_map_to_provider_ids() {
        assert_eq!(resolve_asset("BTC").unwrap().as_str(), "bitcoin");
        assert_eq!(resolve_asset("usdc").unwrap().as_str(), "usd-coin");
    }

    #[test]
    fn full_ids_pass_through() {
        assert_eq!(resolve_asset("bitcoin").unwrap().as_str(), "bitcoin");
    }

    #[test]
    fn unknown_ids_pass_through_normalized() {
        assert_eq!(resolve_asset(" SomeCoin ").unwrap().as_str(), "somecoin");
    }

    #[test]
    fn blank_input_is_rejected() {
        assert!(resolve_asset("  ").is_err());
    }
}
