use {
    crate::{
        address::Address,
        asset::Asset,
        error::{CommonError, Result},
        DEFAULT_DECIMALS,
    },
    serde_derive::{Deserialize, Serialize},
    std::str::FromStr,
    strum_macros::{Display, EnumIter, EnumString, IntoStaticStr},
};

/// External chains the network settles on, plus the native chain itself.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum Chain {
    #[default]
    THOR,
    BTC,
    ETH,
    BNB,
    BSC,
    AVAX,
    GAIA,
    DOGE,
    LTC,
    BCH,
}

pub type Chains = Vec<Chain>;

impl Chain {
    pub fn parse(input: &str) -> Result<Self> {
        Chain::from_str(input.trim()).map_err(|_| CommonError::InvalidChain(input.to_string()))
    }

    pub fn is_thor(&self) -> bool {
        *self == Chain::THOR
    }

    pub fn is_evm(&self) -> bool {
        matches!(self, Chain::ETH | Chain::BSC | Chain::AVAX)
    }

    pub fn is_utxo(&self) -> bool {
        matches!(self, Chain::BTC | Chain::LTC | Chain::BCH | Chain::DOGE)
    }

    pub fn is_bnb(&self) -> bool {
        *self == Chain::BNB
    }

    /// Asset gas is paid in on this chain.
    pub fn gas_asset(&self) -> Asset {
        match self {
            Chain::THOR => Asset::rune(),
            Chain::BTC => Asset::layer1(Chain::BTC, "BTC"),
            Chain::ETH => Asset::layer1(Chain::ETH, "ETH"),
            Chain::BNB => Asset::layer1(Chain::BNB, "BNB"),
            Chain::BSC => Asset::layer1(Chain::BSC, "BNB"),
            Chain::AVAX => Asset::layer1(Chain::AVAX, "AVAX"),
            Chain::GAIA => Asset::layer1(Chain::GAIA, "ATOM"),
            Chain::DOGE => Asset::layer1(Chain::DOGE, "DOGE"),
            Chain::LTC => Asset::layer1(Chain::LTC, "LTC"),
            Chain::BCH => Asset::layer1(Chain::BCH, "BCH"),
        }
    }

    pub fn gas_asset_decimals(&self) -> i64 {
        match self {
            Chain::GAIA => 6,
            _ => DEFAULT_DECIMALS,
        }
    }

    /// Address prefix used on the mock network this engine runs against.
    pub fn address_prefix(&self) -> &'static str {
        match self {
            Chain::THOR => "thor",
            Chain::BTC => "bc1",
            Chain::ETH | Chain::BSC | Chain::AVAX => "0x",
            Chain::BNB => "bnb",
            Chain::GAIA => "cosmos",
            Chain::DOGE => "D",
            Chain::LTC => "ltc1",
            Chain::BCH => "qq",
        }
    }

    pub fn is_valid_address(&self, addr: &Address) -> bool {
        addr.is_chain(*self)
    }

    /// Mimir key fragment identifying this chain, e.g. `HaltETHChain`.
    pub fn halt_key(&self) -> String {
        format!("Halt{}Chain", self)
    }

    pub fn halt_trading_key(&self) -> String {
        format!("Halt{}Trading", self)
    }

    pub fn halt_signing_key(&self) -> String {
        format!("HaltSigning{}", self)
    }

    pub fn solvency_halt_key(&self) -> String {
        format!("SolvencyHalt{}Chain", self)
    }
}
