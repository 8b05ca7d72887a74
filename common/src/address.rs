use {
    crate::{
        chain::Chain,
        error::{CommonError, Result},
    },
    serde_derive::{Deserialize, Serialize},
    std::fmt,
    strum::IntoEnumIterator,
};

/// Address on any chain, kept as the literal string.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(String);

/// Placeholder destination used by no-op outbounds.
pub const NOOP_ADDRESS: &str = "noop";

impl Address {
    pub fn new(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.len() < 3
            || !input
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == ':')
        {
            return Err(CommonError::InvalidAddress(input.to_string()));
        }
        if input == NOOP_ADDRESS {
            return Ok(Self(input.to_string()));
        }
        let addr = Self(input.to_string());
        if addr.get_chain().is_none() {
            return Err(CommonError::InvalidAddress(input.to_string()));
        }
        Ok(addr)
    }

    /// Build an address without validation, for values derived internally.
    pub fn new_unchecked(input: impl Into<String>) -> Self {
        Self(input.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn is_noop(&self) -> bool {
        self.0 == NOOP_ADDRESS
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_chain(&self, chain: Chain) -> bool {
        if self.is_empty() {
            return false;
        }
        match chain {
            Chain::ETH | Chain::BSC | Chain::AVAX => self.0.starts_with("0x"),
            _ => self.get_chain() == Some(chain),
        }
    }

    /// Best guess of the chain an address belongs to. EVM addresses resolve
    /// to ETH.
    pub fn get_chain(&self) -> Option<Chain> {
        let lower = self.0.to_lowercase();
        if lower.starts_with("0x") {
            return Some(Chain::ETH);
        }
        Chain::iter()
            .filter(|c| !c.is_evm())
            .find(|c| self.0.starts_with(c.address_prefix()))
    }

    pub fn acc_address(&self) -> Result<AccAddress> {
        AccAddress::new(&self.0)
    }

    /// Case-insensitive comparison, used for EVM addresses.
    pub fn equals(&self, other: &Address) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<AccAddress> for Address {
    fn from(acc: AccAddress) -> Self {
        Self(acc.0)
    }
}

/// Account address on the native chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccAddress(String);

impl AccAddress {
    pub fn new(input: &str) -> Result<Self> {
        let input = input.trim();
        if !input.starts_with(Chain::THOR.address_prefix())
            || input.len() < 6
            || !input.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(CommonError::InvalidAddress(input.to_string()));
        }
        Ok(Self(input.to_string()))
    }

    pub fn new_unchecked(input: impl Into<String>) -> Self {
        Self(input.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
