use {
    serde_derive::{Deserialize, Serialize},
    strum_macros::{Display, EnumString},
    thornode_common::{math::mul_div, Asset, Uint, DEFAULT_DECIMALS},
};

#[derive(
    Clone, Copy, Debug, Default, Display, EnumString, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum PoolStatus {
    #[default]
    Staged,
    Available,
    Suspended,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub asset: Asset,
    pub balance_rune: Uint,
    pub balance_asset: Uint,
    /// Liquidity provider units.
    pub lp_units: Uint,
    pub synth_units: Uint,
    pub pending_inbound_rune: Uint,
    pub pending_inbound_asset: Uint,
    pub status: PoolStatus,
    pub status_since: i64,
    pub decimals: i64,
}

impl Pool {
    pub fn new(asset: Asset) -> Self {
        Self {
            asset,
            balance_rune: 0,
            balance_asset: 0,
            lp_units: 0,
            synth_units: 0,
            pending_inbound_rune: 0,
            pending_inbound_asset: 0,
            status: PoolStatus::Staged,
            status_since: 0,
            decimals: DEFAULT_DECIMALS,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.asset.symbol.is_empty() || (self.balance_rune == 0 && self.balance_asset == 0)
    }

    pub fn is_available(&self) -> bool {
        self.status == PoolStatus::Available
    }

    pub fn is_gas_pool(&self) -> bool {
        self.asset.is_gas_asset()
    }

    pub fn get_pool_units(&self) -> Uint {
        self.lp_units.saturating_add(self.synth_units)
    }

    /// Rune value of `amount` of the pool asset at the current depth.
    pub fn asset_value_in_rune(&self, amount: Uint) -> Uint {
        mul_div(amount, self.balance_rune, self.balance_asset)
    }

    /// Asset value of `amount` rune at the current depth.
    pub fn rune_value_in_asset(&self, amount: Uint) -> Uint {
        mul_div(amount, self.balance_asset, self.balance_rune)
    }
}
