//! Whitelisted EVM token contracts the external asset matcher resolves
//! abbreviated contract addresses against.

use {lazy_static::lazy_static, std::collections::HashMap, thornode_common::Chain};

lazy_static! {
    static ref EVM_TOKENS: HashMap<Chain, Vec<&'static str>> = HashMap::from([
        (
            Chain::ETH,
            vec![
                "0xdAC17F958D2ee523a2206206994597C13D831ec7",
                "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
                "0x2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599",
                "0x6B175474E89094C44Da98b954EedeAC495271d0F",
                "0x3155BA85D5F96b2d030a4966AF206230e46849cb",
            ],
        ),
        (
            Chain::AVAX,
            vec![
                "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E",
                "0x9702230A8Ea53601f5cD2dc00fDBc13d4dF4A8c7",
            ],
        ),
        (
            Chain::BSC,
            vec![
                "0x55d398326f99059fF775485246999027B3197955",
                "0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d",
            ],
        ),
    ]);
}

/// Token contract addresses listed for `chain`, empty for non EVM chains.
pub fn evm_token_addresses(chain: Chain) -> Vec<String> {
    EVM_TOKENS
        .get(&chain)
        .map(|tokens| tokens.iter().map(|t| t.to_string()).collect())
        .unwrap_or_default()
}
