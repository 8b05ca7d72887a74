use {
    serde_derive::{Deserialize, Serialize},
    strum_macros::{Display, EnumString},
    thornode_common::{Address, Asset, Chain, Coin, Coins, PubKey, Uint},
};

#[derive(
    Clone, Copy, Debug, Default, Display, EnumString, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum VaultType {
    #[default]
    Asgard,
    Yggdrasil,
}

#[derive(
    Clone, Copy, Debug, Default, Display, EnumString, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum VaultStatus {
    #[default]
    Unknown,
    Init,
    Active,
    Retiring,
    Inactive,
}

/// Router contract of a chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainContract {
    pub chain: Chain,
    pub router: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub block_height: i64,
    pub pub_key: PubKey,
    pub coins: Coins,
    pub vault_type: VaultType,
    pub status: VaultStatus,
    pub status_since: i64,
    pub membership: Vec<PubKey>,
    pub chains: Vec<Chain>,
    pub inbound_tx_count: i64,
    pub outbound_tx_count: i64,
    pub pending_tx_block_heights: Vec<i64>,
    pub routers: Vec<ChainContract>,
    /// Chains whose signing failed in the final TSS round.
    pub frozen: Vec<Chain>,
}

pub type Vaults = Vec<Vault>;

impl Vault {
    pub fn new(
        block_height: i64,
        status: VaultStatus,
        vault_type: VaultType,
        pub_key: PubKey,
        chains: Vec<Chain>,
        routers: Vec<ChainContract>,
    ) -> Self {
        Self {
            block_height,
            pub_key,
            coins: Coins::default(),
            vault_type,
            status,
            status_since: block_height,
            membership: Vec::new(),
            chains,
            inbound_tx_count: 0,
            outbound_tx_count: 0,
            pending_tx_block_heights: Vec::new(),
            routers,
            frozen: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pub_key.is_empty()
    }

    pub fn is_asgard(&self) -> bool {
        self.vault_type == VaultType::Asgard
    }

    pub fn is_yggdrasil(&self) -> bool {
        self.vault_type == VaultType::Yggdrasil
    }

    pub fn is_active(&self) -> bool {
        self.status == VaultStatus::Active
    }

    pub fn is_retiring(&self) -> bool {
        self.status == VaultStatus::Retiring
    }

    pub fn is_inactive(&self) -> bool {
        self.status == VaultStatus::Inactive
    }

    pub fn update_status(&mut self, status: VaultStatus, height: i64) {
        self.status = status;
        self.status_since = height;
    }

    pub fn has_funds(&self) -> bool {
        !self.coins.is_empty()
    }

    pub fn has_funds_for_chain(&self, chain: Chain) -> bool {
        self.coins
            .iter()
            .any(|c| c.asset.get_chain() == chain && !c.is_empty())
    }

    pub fn get_coin(&self, asset: &Asset) -> Coin {
        self.coins
            .get_coin(asset)
            .cloned()
            .unwrap_or_else(|| Coin::new(asset.clone(), 0))
    }

    pub fn balance_of(&self, asset: &Asset) -> Uint {
        self.coins.amount_of(asset)
    }

    pub fn add_funds(&mut self, coins: &Coins) {
        self.coins.add_all(coins);
    }

    pub fn sub_funds(&mut self, coins: &Coins) {
        self.coins.sub_all(coins);
    }

    pub fn contains(&self, pk: &PubKey) -> bool {
        self.membership.contains(pk)
    }

    pub fn add_chain(&mut self, chain: Chain) {
        if !self.chains.contains(&chain) {
            self.chains.push(chain);
        }
    }

    pub fn append_pending_tx_block_height(&mut self, height: i64) {
        self.pending_tx_block_heights.push(height);
    }

    /// Remove the first pending migration recorded at `height`.
    pub fn remove_pending_tx_block_height(&mut self, height: i64) {
        if let Some(idx) = self
            .pending_tx_block_heights
            .iter()
            .position(|h| *h == height)
        {
            self.pending_tx_block_heights.remove(idx);
        }
    }

    pub fn has_pending_migrations(&self) -> bool {
        !self.pending_tx_block_heights.is_empty()
    }

    /// Migrations sent within the last `period` blocks.
    pub fn len_pending_tx_block_heights(&self, height: i64, period: i64) -> usize {
        self.pending_tx_block_heights
            .iter()
            .filter(|h| height - **h < period)
            .count()
    }

    pub fn has_asset(&self, asset: &Asset) -> bool {
        self.balance_of(asset) > 0
    }

    /// Number of non-empty coins held on `chain`.
    pub fn coin_length_by_chain(&self, chain: Chain) -> usize {
        self.coins
            .iter()
            .filter(|c| c.asset.get_chain() == chain && !c.is_empty())
            .count()
    }

    /// Whether the members are exactly `members`, in any order.
    pub fn membership_equals(&self, members: &[PubKey]) -> bool {
        self.membership.len() == members.len() && members.iter().all(|m| self.membership.contains(m))
    }

    pub fn is_frozen(&self, chain: Chain) -> bool {
        self.frozen.contains(&chain)
    }

    pub fn freeze(&mut self, chain: Chain) {
        if !self.is_frozen(chain) {
            self.frozen.push(chain);
        }
    }

    pub fn unfreeze(&mut self, chain: Chain) {
        self.frozen.retain(|c| *c != chain);
    }

    pub fn get_router(&self, chain: Chain) -> Option<&Address> {
        self.routers
            .iter()
            .find(|c| c.chain == chain)
            .map(|c| &c.router)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_funds_and_freeze() {
        let mut vault = Vault::new(
            1,
            VaultStatus::Active,
            VaultType::Asgard,
            PubKey::new("vaultpk").unwrap(),
            vec![Chain::BNB],
            vec![],
        );
        assert!(!vault.has_funds());
        let bnb = Chain::BNB.gas_asset();
        vault.add_funds(&Coins::new(vec![Coin::new(bnb.clone(), 100)]));
        assert!(vault.has_funds_for_chain(Chain::BNB));
        assert!(!vault.has_funds_for_chain(Chain::ETH));
        vault.sub_funds(&Coins::new(vec![Coin::new(bnb.clone(), 150)]));
        assert_eq!(vault.balance_of(&bnb), 0);
        assert!(!vault.has_funds());

        vault.freeze(Chain::ETH);
        vault.freeze(Chain::ETH);
        assert_eq!(vault.frozen, vec![Chain::ETH]);
        vault.unfreeze(Chain::ETH);
        assert!(!vault.is_frozen(Chain::ETH));

        vault.append_pending_tx_block_height(5);
        vault.append_pending_tx_block_height(5);
        vault.remove_pending_tx_block_height(5);
        assert_eq!(vault.pending_tx_block_heights, vec![5]);
        assert_eq!(vault.len_pending_tx_block_heights(10, 300), 1);
        assert_eq!(vault.len_pending_tx_block_heights(305, 300), 0);
    }
}
