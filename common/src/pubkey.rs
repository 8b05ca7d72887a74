use {
    crate::{
        address::{AccAddress, Address},
        chain::Chain,
        error::{CommonError, Result},
    },
    serde_derive::{Deserialize, Serialize},
    sha2::{Digest, Sha256},
    std::fmt,
};

/// Bech32 encoded public key. Addresses are derived from it deterministically
/// so every validator computes the same value.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PubKey(String);

pub type PubKeys = Vec<PubKey>;

impl PubKey {
    pub fn new(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() || !input.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CommonError::InvalidPubKey(input.to_string()));
        }
        Ok(Self(input.to_string()))
    }

    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn digest(&self, chain: Chain) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hasher.update(<&'static str>::from(chain).as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Address controlled by this key on `chain`.
    pub fn address(&self, chain: Chain) -> Address {
        if self.is_empty() {
            return Address::default();
        }
        let digest = self.digest(chain);
        if chain.is_evm() {
            return Address::new_unchecked(format!("0x{}", &digest[..40]));
        }
        let body = match chain {
            Chain::THOR | Chain::BNB | Chain::GAIA => format!("1{}", &digest[..38]),
            _ => digest[..38].to_string(),
        };
        Address::new_unchecked(format!("{}{}", chain.address_prefix(), body))
    }

    pub fn thor_address(&self) -> AccAddress {
        AccAddress::new_unchecked(self.address(Chain::THOR).to_string())
    }
}

impl fmt::Display for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key pair a node registers for TSS participation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PubKeySet {
    pub secp256k1: PubKey,
    pub ed25519: PubKey,
}

impl PubKeySet {
    pub fn new(secp256k1: PubKey, ed25519: PubKey) -> Self {
        Self { secp256k1, ed25519 }
    }

    pub fn is_empty(&self) -> bool {
        self.secp256k1.is_empty() || self.ed25519.is_empty()
    }

    pub fn contains(&self, pk: &PubKey) -> bool {
        &self.secp256k1 == pk || &self.ed25519 == pk
    }
}
