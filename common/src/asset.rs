use {
    crate::{
        chain::Chain,
        error::{CommonError, Result},
    },
    serde_derive::{Deserialize, Serialize},
    std::{fmt, str::FromStr},
};

/// A fungible asset on a chain.
///
/// Layer 1 assets render as `CHAIN.SYMBOL`, synthetic assets as
/// `CHAIN/SYMBOL`. Derived assets are plain `THOR.<SYMBOL>` assets whose
/// symbol names a layer 1 asset, e.g. `THOR.BTC`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Asset {
    pub chain: Chain,
    pub symbol: String,
    pub ticker: String,
    pub synth: bool,
}

impl Asset {
    pub fn layer1(chain: Chain, symbol: &str) -> Self {
        let symbol = symbol.to_uppercase();
        let ticker = symbol.split('-').next().unwrap_or_default().to_string();
        Self {
            chain,
            symbol,
            ticker,
            synth: false,
        }
    }

    pub fn rune() -> Self {
        Self::layer1(Chain::THOR, "RUNE")
    }

    pub fn tor() -> Self {
        Self::layer1(Chain::THOR, "TOR")
    }

    /// Parse an asset string. A string without a chain separator is taken to
    /// live on the native chain.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let invalid = || CommonError::InvalidAsset(input.to_string());
        let (chain, symbol, synth) = if let Some((chain, symbol)) = input.split_once('/') {
            (Chain::parse(chain).map_err(|_| invalid())?, symbol, true)
        } else if let Some((chain, symbol)) = input.split_once('.') {
            (Chain::parse(chain).map_err(|_| invalid())?, symbol, false)
        } else {
            (Chain::THOR, input, false)
        };
        if symbol.is_empty()
            || symbol.len() > 64
            || !symbol
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(invalid());
        }
        let ticker = symbol.split('-').next().unwrap_or_default();
        if ticker.is_empty() || ticker.len() > 13 {
            return Err(invalid());
        }
        Ok(Self {
            chain,
            symbol: symbol.to_uppercase(),
            ticker: ticker.to_uppercase(),
            synth,
        })
    }

    /// Parse an asset allowing single letter shorthands such as `b` for
    /// `BTC.BTC`.
    pub fn parse_with_short_codes(input: &str) -> Result<Self> {
        let short = match input.trim().to_lowercase().as_str() {
            "r" => Some(Asset::rune()),
            "a" => Some(Chain::AVAX.gas_asset()),
            "b" => Some(Chain::BTC.gas_asset()),
            "c" => Some(Chain::BCH.gas_asset()),
            "n" => Some(Chain::BNB.gas_asset()),
            "s" => Some(Chain::BSC.gas_asset()),
            "d" => Some(Chain::DOGE.gas_asset()),
            "e" => Some(Chain::ETH.gas_asset()),
            "g" => Some(Chain::GAIA.gas_asset()),
            "l" => Some(Chain::LTC.gas_asset()),
            _ => None,
        };
        match short {
            Some(asset) => Ok(asset),
            None => Self::parse(input),
        }
    }

    /// Chain the asset is held on. Synths always live on the native chain.
    pub fn get_chain(&self) -> Chain {
        if self.synth {
            Chain::THOR
        } else {
            self.chain
        }
    }

    pub fn layer1_asset(&self) -> Self {
        Self {
            synth: false,
            ..self.clone()
        }
    }

    pub fn synthetic_asset(&self) -> Self {
        Self {
            synth: true,
            ..self.clone()
        }
    }

    pub fn derived_asset(&self) -> Self {
        Self {
            chain: Chain::THOR,
            symbol: self.symbol.clone(),
            ticker: self.ticker.clone(),
            synth: false,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.synth
    }

    pub fn is_derived(&self) -> bool {
        !self.synth && self.chain.is_thor() && !self.is_rune()
    }

    pub fn is_rune(&self) -> bool {
        self.chain.is_thor() && !self.synth && self.symbol == "RUNE"
    }

    pub fn is_native_rune(&self) -> bool {
        self.is_rune()
    }

    /// Rune issued as a token on another chain, e.g. `BNB.RUNE-B1A`.
    pub fn is_non_native_rune(&self) -> bool {
        !self.chain.is_thor() && !self.synth && self.ticker == "RUNE"
    }

    pub fn is_native(&self) -> bool {
        self.get_chain().is_thor()
    }

    pub fn is_gas_asset(&self) -> bool {
        !self.synth && *self == self.chain.gas_asset()
    }

    pub fn is_bnb(&self) -> bool {
        *self == Chain::BNB.gas_asset()
    }

    /// Denomination used for native balances.
    pub fn native_denom(&self) -> String {
        if self.is_rune() {
            "rune".to_string()
        } else if *self == Asset::tor() {
            "tor".to_string()
        } else {
            self.to_string().to_lowercase()
        }
    }

    /// Key fragment used by per-asset mimir keys, e.g. `ETH-USDT-0X1234`.
    pub fn mimir_string(&self) -> String {
        format!("{}-{}", self.chain, self.symbol)
    }

    /// Suffix of the symbol after the ticker, e.g. the contract address of a
    /// token.
    pub fn symbol_suffix(&self) -> Option<&str> {
        self.symbol.split_once('-').map(|(_, suffix)| suffix)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let div = if self.synth { "/" } else { "." };
        write!(f, "{}{}{}", self.chain, div, self.symbol)
    }
}

impl FromStr for Asset {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Asset {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Asset> for String {
    fn from(asset: Asset) -> Self {
        asset.to_string()
    }
}

#[cfg(test)]
mod tests {
    use {super::*, assert_matches::assert_matches, test_case::test_case};

    #[test_case("BTC.BTC", Chain::BTC, "BTC", false; "layer1")]
    #[test_case("btc/btc", Chain::BTC, "BTC", true; "synth")]
    #[test_case("RUNE", Chain::THOR, "RUNE", false; "native shorthand")]
    #[test_case("ETH.USDT-0xdac17f958d2ee523a2206206994597c13d831ec7", Chain::ETH, "USDT-0XDAC17F958D2EE523A2206206994597C13D831EC7", false; "token")]
    fn test_parse_asset(input: &str, chain: Chain, symbol: &str, synth: bool) {
        let asset = Asset::parse(input).unwrap();
        assert_eq!(asset.chain, chain);
        assert_eq!(asset.symbol, symbol);
        assert_eq!(asset.synth, synth);
    }

    #[test]
    fn test_parse_invalid_asset() {
        assert_matches!(Asset::parse("FOO.BAR"), Err(CommonError::InvalidAsset(_)));
        assert_matches!(Asset::parse("BTC."), Err(CommonError::InvalidAsset(_)));
        assert_matches!(Asset::parse("BTC.B$C"), Err(CommonError::InvalidAsset(_)));
    }

    #[test]
    fn test_asset_classification() {
        let rune = Asset::rune();
        assert!(rune.is_rune());
        assert!(rune.is_native());
        assert!(rune.is_gas_asset());
        assert!(!rune.is_derived());
        assert!(!rune.is_non_native_rune());
        assert!(Asset::parse("BNB.RUNE-B1A").unwrap().is_non_native_rune());

        let btc = Asset::parse("BTC.BTC").unwrap();
        assert!(btc.is_gas_asset());
        assert_eq!(btc.derived_asset().to_string(), "THOR.BTC");
        assert!(btc.derived_asset().is_derived());
        assert_eq!(btc.synthetic_asset().to_string(), "BTC/BTC");
        assert_eq!(btc.synthetic_asset().get_chain(), Chain::THOR);

        let usdt = Asset::parse("ETH.USDT-0X1234").unwrap();
        assert_eq!(usdt.ticker, "USDT");
        assert_eq!(usdt.symbol_suffix(), Some("0X1234"));
        assert_eq!(usdt.mimir_string(), "ETH-USDT-0X1234");
    }

    #[test]
    fn test_short_codes() {
        assert_eq!(Asset::parse_with_short_codes("b").unwrap().to_string(), "BTC.BTC");
        assert_eq!(Asset::parse_with_short_codes("r").unwrap(), Asset::rune());
        assert_eq!(Asset::parse_with_short_codes("ETH.ETH").unwrap().to_string(), "ETH.ETH");
    }

    #[test]
    fn test_serde_as_string() {
        let asset = Asset::parse("BNB.BNB").unwrap();
        let json = serde_json::to_string(&asset).unwrap();
        assert_eq!(json, "\"BNB.BNB\"");
        let back: Asset = serde_json::from_str(&json).unwrap();
        assert_eq!(back, asset);
    }
}
