use {
    crate::{
        asset::Asset,
        error::{CommonError, Result},
        Uint,
    },
    serde_derive::{Deserialize, Serialize},
    std::fmt,
};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coin {
    pub asset: Asset,
    pub amount: Uint,
    /// Decimals of the coin on its own chain, 0 when unknown.
    pub decimals: i64,
}

impl Coin {
    pub fn new(asset: Asset, amount: Uint) -> Self {
        Self {
            asset,
            amount,
            decimals: 0,
        }
    }

    pub fn with_decimals(mut self, decimals: i64) -> Self {
        self.decimals = decimals;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.amount == 0
    }

    pub fn valid(&self) -> Result<()> {
        if self.asset.symbol.is_empty() {
            return Err(CommonError::InvalidCoin("empty asset".to_string()));
        }
        Ok(())
    }

    pub fn is_native(&self) -> bool {
        self.asset.is_native()
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.asset)
    }
}

/// An ordered bag of coins, at most one entry per asset once normalised
/// through `add`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coins(pub Vec<Coin>);

/// Gas paid by an external transaction.
pub type Gas = Coins;

impl Coins {
    pub fn new(coins: Vec<Coin>) -> Self {
        Self(coins)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Coin> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Coin::is_empty)
    }

    pub fn valid(&self) -> Result<()> {
        self.0.iter().try_for_each(Coin::valid)
    }

    pub fn get_coin(&self, asset: &Asset) -> Option<&Coin> {
        self.0.iter().find(|c| &c.asset == asset)
    }

    /// Amount held of `asset`, zero when absent.
    pub fn amount_of(&self, asset: &Asset) -> Uint {
        self.get_coin(asset).map(|c| c.amount).unwrap_or_default()
    }

    pub fn contains(&self, coin: &Coin) -> bool {
        self.0.iter().any(|c| c.asset == coin.asset && c.amount == coin.amount)
    }

    pub fn has_asset(&self, asset: &Asset) -> bool {
        self.0.iter().any(|c| &c.asset == asset)
    }

    /// Add `coin`, merging it into an existing entry of the same asset.
    pub fn add(&mut self, coin: &Coin) {
        match self.0.iter_mut().find(|c| c.asset == coin.asset) {
            Some(existing) => {
                existing.amount = existing.amount.saturating_add(coin.amount);
                if existing.decimals == 0 {
                    existing.decimals = coin.decimals;
                }
            }
            None => self.0.push(coin.clone()),
        }
    }

    pub fn add_all(&mut self, coins: &Coins) {
        coins.iter().for_each(|c| self.add(c));
    }

    /// Subtract `coin`, flooring at zero.
    pub fn sub(&mut self, coin: &Coin) {
        if let Some(existing) = self.0.iter_mut().find(|c| c.asset == coin.asset) {
            existing.amount = existing.amount.saturating_sub(coin.amount);
        }
    }

    pub fn sub_all(&mut self, coins: &Coins) {
        coins.iter().for_each(|c| self.sub(c));
    }

    /// Drop zero entries.
    pub fn none_empty(&self) -> Coins {
        Coins(self.0.iter().filter(|c| !c.is_empty()).cloned().collect())
    }

    pub fn has_none_native_rune(&self) -> bool {
        self.0.iter().any(|c| !c.asset.is_native_rune())
    }

    pub fn has_synthetic(&self) -> bool {
        self.0.iter().any(|c| c.asset.is_synthetic())
    }

    /// Order-insensitive equality.
    pub fn equals_ex(&self, other: &Coins) -> bool {
        let a = self.none_empty();
        let b = other.none_empty();
        a.len() == b.len() && a.iter().all(|c| b.contains(c))
    }
}

impl From<Vec<Coin>> for Coins {
    fn from(coins: Vec<Coin>) -> Self {
        Self(coins)
    }
}

impl<'a> IntoIterator for &'a Coins {
    type Item = &'a Coin;
    type IntoIter = std::slice::Iter<'a, Coin>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join(", "))
    }
}

/// Fee charged on an outbound: the coins taken and the rune the pool gave up
/// for them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub coins: Coins,
    pub pool_deduct: Uint,
}

#[cfg(test)]
mod tests {
    use {super::*, crate::chain::Chain};

    fn btc(amount: Uint) -> Coin {
        Coin::new(Chain::BTC.gas_asset(), amount)
    }

    #[test]
    fn test_add_merges_assets() {
        let mut coins = Coins::default();
        coins.add(&btc(10));
        coins.add(&Coin::new(Asset::rune(), 5));
        coins.add(&btc(7));
        assert_eq!(coins.len(), 2);
        assert_eq!(coins.amount_of(&Chain::BTC.gas_asset()), 17);
    }

    #[test]
    fn test_sub_floors_at_zero() {
        let mut coins = Coins::new(vec![btc(10)]);
        coins.sub(&btc(25));
        assert_eq!(coins.amount_of(&Chain::BTC.gas_asset()), 0);
        assert!(coins.is_empty());
        assert!(coins.none_empty().0.is_empty());
    }

    #[test]
    fn test_equals_ex_ignores_order() {
        let a = Coins::new(vec![btc(1), Coin::new(Asset::rune(), 2)]);
        let b = Coins::new(vec![Coin::new(Asset::rune(), 2), btc(1)]);
        assert!(a.equals_ex(&b));
        assert!(!a.equals_ex(&Coins::new(vec![btc(1)])));
    }
}
