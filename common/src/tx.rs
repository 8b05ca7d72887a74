use {
    crate::{
        address::Address,
        chain::Chain,
        coin::{Coins, Gas},
        error::{CommonError, Result},
    },
    serde_derive::{Deserialize, Serialize},
    sha2::{Digest, Sha256},
    std::fmt,
};

/// Maximum memo length accepted on an observed transaction.
pub const MAX_MEMO_SIZE: usize = 250;

/// Hash of an external or native transaction, stored upper case.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId(String);

pub type TxIds = Vec<TxId>;

/// Id used by outbounds the network issues without an inbound, such as
/// migrations and ragnarok withdrawals.
pub const BLANK_TX_ID: &str = "0000000000000000000000000000000000000000000000000000000000000000";

impl TxId {
    pub fn new(hash: &str) -> Result<Self> {
        let hash = hash.trim();
        let body = match hash.len() {
            64 => hash,
            66 if hash.starts_with("0x") || hash.starts_with("0X") => &hash[2..],
            _ => return Err(CommonError::InvalidTxId(hash.to_string())),
        };
        if !body.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CommonError::InvalidTxId(hash.to_string()));
        }
        Ok(Self(hash.to_uppercase()))
    }

    pub fn blank() -> Self {
        Self(BLANK_TX_ID.to_string())
    }

    /// Id of a native transaction, the upper hex sha256 of its bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(hex::encode_upper(Sha256::digest(data)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn is_blank(&self) -> bool {
        self.0 == BLANK_TX_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn reverse(&self) -> Self {
        Self(self.0.chars().rev().collect())
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A transaction as seen on its chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tx {
    pub id: TxId,
    pub chain: Chain,
    pub from_address: Address,
    pub to_address: Address,
    pub coins: Coins,
    pub gas: Gas,
    pub memo: String,
}

impl Tx {
    pub fn new(
        id: TxId,
        from_address: Address,
        to_address: Address,
        coins: Coins,
        gas: Gas,
        memo: impl Into<String>,
    ) -> Self {
        let chain = coins
            .iter()
            .next()
            .map(|c| c.asset.get_chain())
            .unwrap_or_default();
        Self {
            id,
            chain,
            from_address,
            to_address,
            coins,
            gas,
            memo: memo.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }

    /// Equality that tolerates coin ordering and memo case.
    pub fn equals_ex(&self, other: &Tx) -> bool {
        self.id == other.id
            && self.chain == other.chain
            && self.from_address.equals(&other.from_address)
            && self.to_address.equals(&other.to_address)
            && self.coins.equals_ex(&other.coins)
            && self.gas.equals_ex(&other.gas)
            && self.memo.eq_ignore_ascii_case(&other.memo)
    }

    pub fn valid(&self) -> Result<()> {
        let invalid = |reason: &str| Err(CommonError::InvalidTx(reason.to_string()));
        if self.id.is_empty() {
            return invalid("tx id cannot be empty");
        }
        if self.from_address.is_empty() {
            return invalid("from address cannot be empty");
        }
        if self.to_address.is_empty() {
            return invalid("to address cannot be empty");
        }
        if self.coins.0.is_empty() {
            return invalid("must have at least 1 coin");
        }
        self.coins.valid()?;
        if !self.chain.is_thor() && self.gas.0.is_empty() {
            return invalid("must have at least 1 gas coin");
        }
        self.gas.valid()?;
        if self.memo.len() > MAX_MEMO_SIZE {
            return invalid("memo too long");
        }
        Ok(())
    }
}

impl fmt::Display for Tx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ==> {} (Memo: {}) {} (gas: {})",
            self.id, self.from_address, self.to_address, self.memo, self.coins, self.gas
        )
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{asset::Asset, coin::Coin},
        assert_matches::assert_matches,
    };

    #[test]
    fn test_tx_id() {
        let id = TxId::new(&"ab".repeat(32)).unwrap();
        assert_eq!(id.as_str(), "AB".repeat(32));
        assert!(TxId::new(&format!("0x{}", "cd".repeat(32))).is_ok());
        assert_matches!(TxId::new("abc"), Err(CommonError::InvalidTxId(_)));
        assert_matches!(TxId::new(&"zz".repeat(32)), Err(CommonError::InvalidTxId(_)));
        assert!(TxId::blank().is_blank());
        assert_eq!(TxId::from_bytes(b"x").as_str().len(), 64);
    }

    #[test]
    fn test_tx_valid() {
        let tx = Tx::new(
            TxId::new(&"01".repeat(32)).unwrap(),
            Address::new("bnb1from00").unwrap(),
            Address::new("bnb1to0000").unwrap(),
            Coins::new(vec![Coin::new(Chain::BNB.gas_asset(), 10)]),
            Coins::new(vec![Coin::new(Chain::BNB.gas_asset(), 1)]),
            "",
        );
        assert_eq!(tx.chain, Chain::BNB);
        assert!(tx.valid().is_ok());

        let mut no_gas = tx.clone();
        no_gas.gas = Coins::default();
        assert!(no_gas.valid().is_err());

        let mut native = no_gas;
        native.chain = Chain::THOR;
        native.coins = Coins::new(vec![Coin::new(Asset::rune(), 10)]);
        assert!(native.valid().is_ok());
    }
}
