//! Native balances of user accounts and module accounts.

use {
    super::{key, prefix, Keeper},
    crate::{
        error::{Result, RuntimeError},
        events::{Event, MintBurnType},
    },
    log::*,
    thornode_common::{AccAddress, Asset, Coin, Coins, Uint},
};

/// Module holding every native asset the network custodies.
pub const ASGARD_NAME: &str = "asgard";
/// Module holding node bonds.
pub const BOND_NAME: &str = "bond";
/// Module funding outbound fees and rewards.
pub const RESERVE_NAME: &str = "reserve";
/// Module collecting native transaction fees before they reach the reserve.
pub const THORCHAIN_NAME: &str = "thorchain";

const MODULES: &[&str] = &[ASGARD_NAME, BOND_NAME, RESERVE_NAME, THORCHAIN_NAME];

pub fn is_module_account(addr: &AccAddress) -> bool {
    MODULES.contains(&addr.as_str())
}

impl Keeper {
    pub fn get_balance(&self, addr: &AccAddress) -> Result<Coins> {
        Ok(self
            .get_record(&key(prefix::BALANCE, addr))?
            .unwrap_or_default())
    }

    fn set_balance(&mut self, addr: &AccAddress, coins: &Coins) -> Result<()> {
        self.set_record(&key(prefix::BALANCE, addr), &coins.none_empty())
    }

    pub fn get_module_balance(&self, module: &str) -> Result<Coins> {
        Ok(self
            .get_record(&key(prefix::MODULE, module))?
            .unwrap_or_default())
    }

    fn set_module_balance(&mut self, module: &str, coins: &Coins) -> Result<()> {
        self.set_record(&key(prefix::MODULE, module), &coins.none_empty())
    }

    pub fn get_rune_balance_of_module(&self, module: &str) -> Result<Uint> {
        Ok(self.get_module_balance(module)?.amount_of(&Asset::rune()))
    }

    pub fn has_coins(&self, addr: &AccAddress, coins: &Coins) -> Result<bool> {
        let balance = self.get_balance(addr)?;
        Ok(coins
            .iter()
            .all(|c| balance.amount_of(&c.asset) >= c.amount))
    }

    fn debit(balance: &mut Coins, coins: &Coins, owner: &str) -> Result<()> {
        for coin in coins.iter() {
            if balance.amount_of(&coin.asset) < coin.amount {
                return Err(RuntimeError::UnknownRequest(format!(
                    "insufficient funds in {owner}: has {}, needs {coin}",
                    balance.amount_of(&coin.asset)
                )));
            }
        }
        balance.sub_all(coins);
        Ok(())
    }

    pub fn send_from_module_to_module(&mut self, from: &str, to: &str, coins: &Coins) -> Result<()> {
        let mut source = self.get_module_balance(from)?;
        Self::debit(&mut source, coins, from)?;
        self.set_module_balance(from, &source)?;
        let mut target = self.get_module_balance(to)?;
        target.add_all(coins);
        self.set_module_balance(to, &target)
    }

    pub fn send_from_account_to_module(
        &mut self,
        from: &AccAddress,
        to: &str,
        coins: &Coins,
    ) -> Result<()> {
        let mut source = self.get_balance(from)?;
        Self::debit(&mut source, coins, from.as_str())?;
        self.set_balance(from, &source)?;
        let mut target = self.get_module_balance(to)?;
        target.add_all(coins);
        self.set_module_balance(to, &target)
    }

    pub fn send_from_module_to_account(
        &mut self,
        from: &str,
        to: &AccAddress,
        coins: &Coins,
    ) -> Result<()> {
        let mut source = self.get_module_balance(from)?;
        Self::debit(&mut source, coins, from)?;
        self.set_module_balance(from, &source)?;
        let mut target = self.get_balance(to)?;
        target.add_all(coins);
        self.set_balance(to, &target)
    }

    pub fn send_coins(&mut self, from: &AccAddress, to: &AccAddress, coins: &Coins) -> Result<()> {
        let mut source = self.get_balance(from)?;
        Self::debit(&mut source, coins, from.as_str())?;
        self.set_balance(from, &source)?;
        let mut target = self.get_balance(to)?;
        target.add_all(coins);
        self.set_balance(to, &target)
    }

    pub fn mint_to_module(&mut self, module: &str, coin: &Coin, reason: &str) -> Result<()> {
        let mut balance = self.get_module_balance(module)?;
        balance.add(coin);
        self.set_module_balance(module, &balance)?;
        let supply_key = key(prefix::SUPPLY, coin.asset.native_denom());
        let supply: Uint = self.get_record(&supply_key)?.unwrap_or_default();
        self.set_record(&supply_key, &supply.saturating_add(coin.amount))?;
        debug!("minted {} to {}", coin, module);
        self.emit(Event::MintBurn {
            supply: MintBurnType::Mint,
            denom: coin.asset.native_denom(),
            amount: coin.amount,
            reason: reason.to_string(),
        });
        Ok(())
    }

    pub fn burn_from_module(&mut self, module: &str, coin: &Coin, reason: &str) -> Result<()> {
        let mut balance = self.get_module_balance(module)?;
        Self::debit(&mut balance, &Coins::new(vec![coin.clone()]), module)?;
        self.set_module_balance(module, &balance)?;
        let supply_key = key(prefix::SUPPLY, coin.asset.native_denom());
        let supply: Uint = self.get_record(&supply_key)?.unwrap_or_default();
        self.set_record(&supply_key, &supply.saturating_sub(coin.amount))?;
        debug!("burned {} from {}", coin, module);
        self.emit(Event::MintBurn {
            supply: MintBurnType::Burn,
            denom: coin.asset.native_denom(),
            amount: coin.amount,
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Tracked supply of a native asset.
    pub fn get_total_supply(&self, asset: &Asset) -> Result<Uint> {
        Ok(self
            .get_record(&key(prefix::SUPPLY, asset.native_denom()))?
            .unwrap_or_default())
    }
}
