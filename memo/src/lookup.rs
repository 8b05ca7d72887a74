//! State the parser consults while resolving memo fields.
//!
//! The parser never owns state. Address aliases, governance caps and pool
//! depths come from whatever implements [`MemoLookup`]; the runtime's keeper
//! does, and [`NoLookup`] stands in when a memo is parsed without state.

use {
    crate::{
        error::{MemoError, Result},
        tokenlist,
    },
    log::*,
    thornode_common::{Address, Asset, Chain, Uint, MAX_BASIS_POINTS},
    thornode_constants::ConstantName,
};

pub trait MemoLookup {
    /// Alias registered for THORName `name` on `chain`.
    fn thorname_alias(&self, _name: &str, _chain: Chain) -> Option<Address> {
        None
    }

    /// Governance override for `key`, `None` when unset.
    fn mimir(&self, _key: &str) -> Option<i64> {
        None
    }

    /// Every pool with its rune depth, in key order.
    fn pool_depths(&self) -> Vec<(Asset, Uint)> {
        Vec::new()
    }

    fn evm_token_addresses(&self, chain: Chain) -> Vec<String> {
        tokenlist::evm_token_addresses(chain)
    }
}

/// Lookup without any backing state.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoLookup;

impl MemoLookup for NoLookup {}

/// Resolve an address field: a literal address, or a THORName optionally
/// suffixed with `.CHAIN` to pick the alias chain.
pub fn fetch_address(lookup: &dyn MemoLookup, name: &str, chain: Chain) -> Result<Address> {
    if let Ok(addr) = Address::new(name) {
        return Ok(addr);
    }
    let (name, chain) = match name.split_once('.') {
        Some((name, chain)) => (name, Chain::parse(chain)?),
        None => (name, chain),
    };
    lookup
        .thorname_alias(name, chain)
        .ok_or_else(|| MemoError::UnknownAddress(name.to_string()))
}

/// Parse affiliate basis points, capped at `MaxAffiliateFeeBasisPoints`.
pub fn parse_affiliate_basis_points(lookup: &dyn MemoLookup, input: &str) -> Result<Uint> {
    let max = lookup
        .mimir(&ConstantName::MaxAffiliateFeeBasisPoints.to_string())
        .filter(|v| (0..=MAX_BASIS_POINTS as i64).contains(v))
        .map(|v| v as Uint)
        .unwrap_or(MAX_BASIS_POINTS);
    let pts: Uint = input.parse().map_err(|_| MemoError::InvalidField {
        field: "affiliate basis points",
        value: input.to_string(),
    })?;
    Ok(pts.min(max))
}

/// Resolve a partial asset such as `ETH.USDT` to the deepest pool whose
/// symbol ends with the given suffix. An asset whose pool already has rune
/// depth is returned unchanged, as is one with no candidate pools.
pub fn fuzzy_asset_match(lookup: &dyn MemoLookup, orig: &Asset) -> Asset {
    let asset = orig.layer1_asset();
    let pools = lookup.pool_depths();
    if pools.iter().any(|(a, rune)| *a == asset && *rune > 0) {
        return orig.clone();
    }

    let suffix = asset.symbol_suffix().filter(|s| !s.is_empty()).map(str::to_lowercase);
    let winner = pools
        .into_iter()
        .filter(|(a, _)| a.chain == asset.chain && a.ticker == asset.ticker)
        .filter(|(a, _)| match &suffix {
            None => true,
            Some(suffix) => a.symbol.to_lowercase().ends_with(suffix.as_str()),
        })
        .fold(None, |best: Option<(Asset, Uint)>, (a, rune)| match best {
            Some((_, best_rune)) if best_rune > rune => best,
            _ => Some((a, rune)),
        });

    match winner {
        Some((mut matched, _)) => {
            matched.synth = orig.synth;
            debug!("fuzzy matched {} to {}", orig, matched);
            matched
        }
        None => orig.clone(),
    }
}

/// Expand an abbreviated EVM contract address to the single listed token
/// that ends with it; anything ambiguous is returned as given.
pub fn external_asset_match(lookup: &dyn MemoLookup, chain: Chain, hint: &str) -> String {
    if hint.is_empty() || !chain.is_evm() {
        return hint.to_string();
    }
    let hint_lower = hint.to_lowercase();
    let matches: Vec<String> = lookup
        .evm_token_addresses(chain)
        .into_iter()
        .filter(|token| token.to_lowercase().ends_with(&hint_lower))
        .take(2)
        .collect();
    match matches.as_slice() {
        [only] => only.clone(),
        _ => hint.to_string(),
    }
}
