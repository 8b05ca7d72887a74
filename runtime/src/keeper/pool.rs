use {
    super::{key, prefix, Keeper},
    crate::{
        error::Result,
        types::{LiquidityProvider, Loan, Pool},
    },
    thornode_common::{Address, Asset, Uint},
};

impl Keeper {
    /// Pool of `asset`, a fresh staged pool when none is stored.
    pub fn get_pool(&self, asset: &Asset) -> Result<Pool> {
        Ok(self
            .get_record(&key(prefix::POOL, asset))?
            .unwrap_or_else(|| Pool::new(asset.clone())))
    }

    pub fn pool_exists(&self, asset: &Asset) -> bool {
        self.has_record(&key(prefix::POOL, asset))
    }

    pub fn set_pool(&mut self, pool: &Pool) -> Result<()> {
        self.set_record(&key(prefix::POOL, &pool.asset), pool)
    }

    pub fn get_pools(&self) -> Result<Vec<Pool>> {
        self.records(prefix::POOL)
    }

    fn lp_key(asset: &Asset, addr: &Address) -> String {
        key(prefix::LIQUIDITY_PROVIDER, format!("{asset}//{addr}"))
    }

    /// Position of `addr` in `asset`, empty when none is stored.
    pub fn get_liquidity_provider(&self, asset: &Asset, addr: &Address) -> Result<LiquidityProvider> {
        Ok(self
            .get_record(&Self::lp_key(asset, addr))?
            .unwrap_or_else(|| {
                LiquidityProvider::new(asset.clone(), Address::default(), Address::default())
            }))
    }

    pub fn liquidity_provider_exists(&self, asset: &Asset, addr: &Address) -> bool {
        self.has_record(&Self::lp_key(asset, addr))
    }

    pub fn set_liquidity_provider(&mut self, lp: &LiquidityProvider) -> Result<()> {
        self.set_record(&Self::lp_key(&lp.asset, lp.key_address()), lp)
    }

    /// Every position in `asset`, in address order.
    pub fn liquidity_providers(&self, asset: &Asset) -> Result<Vec<LiquidityProvider>> {
        self.records(&format!("{}//{}", prefix::LIQUIDITY_PROVIDER, asset))
    }

    fn loan_key(asset: &Asset, owner: &Address) -> String {
        key(prefix::LOAN, format!("{asset}//{owner}"))
    }

    pub fn get_loan(&self, asset: &Asset, owner: &Address) -> Result<Loan> {
        Ok(self
            .get_record(&Self::loan_key(asset, owner))?
            .unwrap_or_else(|| Loan::new(asset.clone(), owner.clone())))
    }

    pub fn set_loan(&mut self, loan: &Loan) -> Result<()> {
        self.set_record(&Self::loan_key(&loan.asset, &loan.owner), loan)
    }

    pub fn loans(&self, asset: &Asset) -> Result<Vec<Loan>> {
        self.records(&format!("{}//{}", prefix::LOAN, asset))
    }

    pub fn get_total_collateral(&self, asset: &Asset) -> Result<Uint> {
        Ok(self
            .get_record(&key(prefix::TOTAL_COLLATERAL, asset))?
            .unwrap_or_default())
    }

    pub fn set_total_collateral(&mut self, asset: &Asset, amount: Uint) -> Result<()> {
        self.set_record(&key(prefix::TOTAL_COLLATERAL, asset), &amount)
    }
}
