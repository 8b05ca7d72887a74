//! Events emitted by state transitions for downstream indexers.

use {
    crate::types::{PoolStatus, TxOutItem},
    serde_derive::{Deserialize, Serialize},
    strum_macros::{Display, IntoStaticStr},
    thornode_common::{AccAddress, Address, Asset, Chain, Coin, Coins, Fee, PubKey, Tx, TxId, Uint},
};

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum BondType {
    BondPaid,
    BondReturned,
    BondReward,
    BondCost,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum PendingLiquidityType {
    Add,
    Withdraw,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum MintBurnType {
    Mint,
    Burn,
}

/// Amount slashed from one pool, signed from the pool's view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolAmount {
    pub asset: Asset,
    pub amount: i128,
}

/// Pool balance rollback applied by an errata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMod {
    pub asset: Asset,
    pub rune_amount: Uint,
    pub rune_add: bool,
    pub asset_amount: Uint,
    pub asset_add: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPool {
    pub asset: Asset,
    pub rune_amount: Uint,
    pub asset_amount: Uint,
    pub count: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Event {
    Bond {
        amount: Uint,
        bond_type: BondType,
        tx_in: Tx,
    },
    Swap {
        pool: Asset,
        swap_target: Uint,
        swap_slip: Uint,
        liquidity_fee: Uint,
        liquidity_fee_in_rune: Uint,
        in_tx: Tx,
        emit_asset: Coin,
    },
    AddLiquidity {
        pool: Asset,
        provider_units: Uint,
        rune_address: Address,
        rune_amount: Uint,
        asset_amount: Uint,
        rune_tx_id: TxId,
        asset_tx_id: TxId,
        asset_address: Address,
    },
    Withdraw {
        pool: Asset,
        provider_units: Uint,
        basis_points: Uint,
        asymmetry: i64,
        in_tx: Tx,
        emit_asset: Uint,
        emit_rune: Uint,
    },
    Donate {
        pool: Asset,
        in_tx: Tx,
    },
    Pool {
        pool: Asset,
        status: PoolStatus,
    },
    Errata {
        tx_id: TxId,
        pools: Vec<PoolMod>,
    },
    ReserveContribution {
        contributor: Address,
        amount: Uint,
        in_tx: Tx,
    },
    Fee {
        tx_id: TxId,
        fee: Fee,
    },
    Slash {
        pool: Asset,
        slash_amount: Vec<PoolAmount>,
    },
    SlashPoint {
        node_address: AccAddress,
        slash_points: i64,
        reason: String,
    },
    Outbound {
        in_tx_id: TxId,
        tx: Tx,
    },
    SetMimir {
        key: String,
        value: i64,
    },
    SetNodeMimir {
        key: String,
        value: i64,
        node_address: AccAddress,
    },
    SetIpAddress {
        node_address: AccAddress,
        ip_address: String,
    },
    SetVersion {
        node_address: AccAddress,
        version: String,
    },
    SetNodeKeys {
        node_address: AccAddress,
    },
    ValidatorRequestLeave {
        tx: Tx,
        destination: Address,
    },
    TssKeygenMetric {
        pub_key: PubKey,
        median_duration_ms: i64,
    },
    TssKeysignMetric {
        tx_id: String,
        median_duration_ms: i64,
    },
    TssKeygenFailure {
        fail_reason: String,
        is_unicast: bool,
        blame_nodes: Vec<PubKey>,
        round: String,
        height: i64,
    },
    TssKeygenSuccess {
        pub_key: PubKey,
        members: Vec<PubKey>,
        height: i64,
    },
    Switch {
        to_address: AccAddress,
        from_address: Address,
        burn: Coin,
        tx_id: TxId,
        mint: Uint,
    },
    PendingLiquidity {
        pool: Asset,
        pending_type: PendingLiquidityType,
        rune_address: Address,
        rune_amount: Uint,
        asset_address: Address,
        asset_amount: Uint,
        rune_tx_id: TxId,
        asset_tx_id: TxId,
    },
    LoanOpen {
        collateral_deposited: Uint,
        collateral_asset: Asset,
        collateralization_ratio: Uint,
        debt_issued: Uint,
        owner: Address,
        target_asset: Asset,
        tx_id: TxId,
    },
    LoanRepayment {
        collateral_withdrawn: Uint,
        debt_repaid: Uint,
        collateral_asset: Asset,
        owner: Address,
    },
    MintBurn {
        supply: MintBurnType,
        denom: String,
        amount: Uint,
        reason: String,
    },
    ThorName {
        name: String,
        chain: Chain,
        address: Address,
        registration_fee: Uint,
        fund_amount: Uint,
        expire: i64,
        owner: AccAddress,
    },
    Refund {
        code: u32,
        reason: String,
        tx: Tx,
        fee: Fee,
    },
    Gas {
        pools: Vec<GasPool>,
    },
    ScheduledOutbound {
        item: TxOutItem,
    },
    Security {
        msg: String,
        tx: Tx,
    },
    ActiveVault {
        pub_key: PubKey,
    },
    InactiveVault {
        pub_key: PubKey,
    },
    Send {
        from_address: AccAddress,
        to_address: AccAddress,
        coins: Coins,
    },
}

impl Event {
    /// Kind name indexers key on, e.g. `add_liquidity`.
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_names() {
        let event = Event::SetMimir {
            key: "ChurnInterval".to_string(),
            value: 10,
        };
        assert_eq!(event.kind(), "set_mimir");
        let event = Event::Bond {
            amount: 1,
            bond_type: BondType::BondReturned,
            tx_in: Tx::default(),
        };
        assert_eq!(event.kind(), "bond");
        assert_eq!(BondType::BondReturned.to_string(), "bond_returned");
    }
}
