use {
    serde_derive::{Deserialize, Serialize},
    std::fmt,
    thornode_common::{Address, Chain, Coin, Gas, PubKey, Tx, TxId, Uint},
};

/// One scheduled outbound.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutItem {
    pub chain: Chain,
    pub to_address: Address,
    pub vault_pub_key: PubKey,
    pub coin: Coin,
    pub memo: String,
    pub max_gas: Gas,
    pub gas_rate: i64,
    pub in_hash: TxId,
    /// Hash of the signed outbound once observed, empty until then.
    pub out_hash: TxId,
    /// Module that funds a native outbound, `asgard` when empty.
    pub module_name: String,
    pub aggregator: String,
    pub aggregator_target_asset: String,
    pub aggregator_target_limit: Option<Uint>,
}

impl TxOutItem {
    pub fn new(chain: Chain, to_address: Address, coin: Coin, in_hash: TxId) -> Self {
        Self {
            chain,
            to_address,
            vault_pub_key: PubKey::default(),
            coin,
            memo: String::new(),
            max_gas: Gas::default(),
            gas_rate: 0,
            in_hash,
            out_hash: TxId::default(),
            module_name: String::new(),
            aggregator: String::new(),
            aggregator_target_asset: String::new(),
            aggregator_target_limit: None,
        }
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self
    }

    pub fn with_vault(mut self, pk: PubKey) -> Self {
        self.vault_pub_key = pk;
        self
    }

    pub fn is_signed(&self) -> bool {
        !self.out_hash.is_empty()
    }

    /// Identity used when matching observed outbounds, ignoring gas and the
    /// signed hash.
    pub fn equals(&self, other: &TxOutItem) -> bool {
        self.chain == other.chain
            && self.to_address.equals(&other.to_address)
            && self.vault_pub_key == other.vault_pub_key
            && self.coin == other.coin
            && self.in_hash == other.in_hash
            && self.memo.eq_ignore_ascii_case(&other.memo)
    }

    /// Whether the observed transaction `tx` settles this item.
    pub fn matches_outbound(&self, tx: &Tx, from_vault: &PubKey) -> bool {
        !self.is_signed()
            && self.chain == tx.chain
            && self.to_address.equals(&tx.to_address)
            && self.vault_pub_key == *from_vault
            && self.memo.eq_ignore_ascii_case(&tx.memo)
            && self.paid_by(tx)
    }

    /// Whether `tx` pays exactly this item's coin. A gas asset outbound may
    /// instead move gas into the coin, as long as coin plus gas equals the
    /// intended coin plus the maximum gas and the gas stays within it.
    pub fn paid_by(&self, tx: &Tx) -> bool {
        if tx.coins.contains(&self.coin) {
            return true;
        }
        let gas_asset = self.chain.gas_asset();
        if self.coin.asset != gas_asset {
            return false;
        }
        let max_gas = self.max_gas.amount_of(&gas_asset);
        let real_gas = tx.gas.amount_of(&gas_asset);
        let spent = tx.coins.amount_of(&gas_asset).saturating_add(real_gas);
        spent == self.coin.amount.saturating_add(max_gas) && real_gas <= max_gas
    }
}

impl fmt::Display for TxOutItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} ({}) {}",
            self.chain, self.coin, self.to_address, self.vault_pub_key, self.memo
        )
    }
}

/// Outbounds scheduled for one block height.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub height: i64,
    pub tx_array: Vec<TxOutItem>,
}

impl TxOut {
    pub fn new(height: i64) -> Self {
        Self {
            height,
            tx_array: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tx_array.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        thornode_common::{Asset, Coins},
    };

    fn item() -> TxOutItem {
        let bnb = Chain::BNB.gas_asset();
        let mut item = TxOutItem::new(
            Chain::BNB,
            Address::new_unchecked("bnbdest"),
            Coin::new(bnb.clone(), 200),
            TxId::from_bytes(b"in"),
        )
        .with_memo("OUT:IN")
        .with_vault(PubKey::new("vault").unwrap());
        item.max_gas = Coins::new(vec![Coin::new(bnb, 10)]);
        item
    }

    fn observed(coin: Uint, gas: Uint) -> Tx {
        let bnb = Chain::BNB.gas_asset();
        Tx::new(
            TxId::from_bytes(b"out"),
            Address::new_unchecked("bnbvault"),
            Address::new_unchecked("bnbdest"),
            Coins::new(vec![Coin::new(bnb.clone(), coin)]),
            Coins::new(vec![Coin::new(bnb, gas)]),
            "out:in",
        )
    }

    #[test]
    fn test_gas_asset_outbound_matching() {
        let item = item();
        let vault = PubKey::new("vault").unwrap();
        assert!(item.matches_outbound(&observed(200, 37), &vault));
        // gas moved into the coin, total spend unchanged
        assert!(item.matches_outbound(&observed(204, 6), &vault));
        assert!(!item.matches_outbound(&observed(200, 5), &PubKey::new("other").unwrap()));
    }

    #[test]
    fn test_underpaid_gas_outbound_does_not_match() {
        let item = item();
        let vault = PubKey::new("vault").unwrap();
        assert!(!item.matches_outbound(&observed(1, 10), &vault));
        assert!(!item.matches_outbound(&observed(199, 5), &vault));
        assert!(!item.paid_by(&observed(1, 37_500)));
    }

    #[test]
    fn test_gas_beyond_max_gas_does_not_match() {
        let item = item();
        let vault = PubKey::new("vault").unwrap();
        // spend adds up but the signer burnt more gas than allowed
        assert!(!item.matches_outbound(&observed(195, 15), &vault));
        assert!(!item.matches_outbound(&observed(190, 20), &vault));
    }

    #[test]
    fn test_non_gas_outbound_needs_exact_coin() {
        let mut item = item();
        item.coin = Coin::new(Asset::layer1(Chain::BNB, "TWT-8C2"), 50);
        let mut tx = observed(0, 1);
        tx.coins = Coins::new(vec![item.coin.clone()]);
        assert!(item.matches_outbound(&tx, &item.vault_pub_key.clone()));
        tx.coins = Coins::new(vec![Coin::new(item.coin.asset.clone(), 49)]);
        assert!(!item.matches_outbound(&tx, &item.vault_pub_key.clone()));
    }
}
