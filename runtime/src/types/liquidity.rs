use {
    serde_derive::{Deserialize, Serialize},
    thornode_common::{Address, Asset, TxId, Uint},
};

/// Position of one provider in one pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityProvider {
    pub asset: Asset,
    pub rune_address: Address,
    pub asset_address: Address,
    pub units: Uint,
    pub last_add_height: i64,
    pub last_withdraw_height: i64,
    pub rune_deposit_value: Uint,
    pub asset_deposit_value: Uint,
    pub pending_rune: Uint,
    pub pending_asset: Uint,
    pub pending_tx_id: Option<TxId>,
}

impl LiquidityProvider {
    pub fn new(asset: Asset, rune_address: Address, asset_address: Address) -> Self {
        Self {
            asset,
            rune_address,
            asset_address,
            units: 0,
            last_add_height: 0,
            last_withdraw_height: 0,
            rune_deposit_value: 0,
            asset_deposit_value: 0,
            pending_rune: 0,
            pending_asset: 0,
            pending_tx_id: None,
        }
    }

    /// Address the record is keyed by: the rune side when known.
    pub fn key_address(&self) -> &Address {
        if self.rune_address.is_empty() {
            &self.asset_address
        } else {
            &self.rune_address
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending_rune > 0 || self.pending_asset > 0
    }
}

/// Loan of one owner against one collateral asset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub asset: Asset,
    pub owner: Address,
    pub debt_issued: Uint,
    pub debt_repaid: Uint,
    pub collateral_deposited: Uint,
    pub collateral_withdrawn: Uint,
    pub last_open_height: i64,
    pub last_repay_height: i64,
}

impl Loan {
    pub fn new(asset: Asset, owner: Address) -> Self {
        Self {
            asset,
            owner,
            debt_issued: 0,
            debt_repaid: 0,
            collateral_deposited: 0,
            collateral_withdrawn: 0,
            last_open_height: 0,
            last_repay_height: 0,
        }
    }

    pub fn debt(&self) -> Uint {
        self.debt_issued.saturating_sub(self.debt_repaid)
    }

    pub fn collateral(&self) -> Uint {
        self.collateral_deposited
            .saturating_sub(self.collateral_withdrawn)
    }

    pub fn is_closed(&self) -> bool {
        self.debt() == 0 && self.collateral() == 0
    }
}

#[cfg(test)]
mod tests {
    use {super::*, thornode_common::Chain};

    #[test]
    fn test_loan_balances() {
        let mut loan = Loan::new(Chain::BTC.gas_asset(), Address::new_unchecked("bc1qowner"));
        assert!(loan.is_closed());
        loan.debt_issued = 100;
        loan.collateral_deposited = 10;
        loan.debt_repaid = 150;
        assert_eq!(loan.debt(), 0);
        assert!(!loan.is_closed());
        loan.collateral_withdrawn = 10;
        assert!(loan.is_closed());
    }
}
