use {
    super::{key, prefix, Keeper},
    crate::{
        error::Result,
        types::{BondProviders, Jail, NodeAccount, NodeStatus},
    },
    log::*,
    thornode_common::{AccAddress, Chain, PubKey},
};

impl Keeper {
    pub fn get_node_account(&self, addr: &AccAddress) -> Result<Option<NodeAccount>> {
        self.get_record(&key(prefix::NODE_ACCOUNT, addr))
    }

    pub fn set_node_account(&mut self, node: &NodeAccount) -> Result<()> {
        self.set_record(&key(prefix::NODE_ACCOUNT, &node.node_address), node)
    }

    pub fn list_node_accounts(&self) -> Result<Vec<NodeAccount>> {
        self.records(prefix::NODE_ACCOUNT)
    }

    pub fn list_node_accounts_by_status(&self, status: NodeStatus) -> Result<Vec<NodeAccount>> {
        Ok(self
            .list_node_accounts()?
            .into_iter()
            .filter(|n| n.status == status)
            .collect())
    }

    pub fn list_active_validators(&self) -> Result<Vec<NodeAccount>> {
        self.list_node_accounts_by_status(NodeStatus::Active)
    }

    /// Nodes of any status that still hold bond.
    pub fn list_validators_with_bond(&self) -> Result<Vec<NodeAccount>> {
        Ok(self
            .list_node_accounts()?
            .into_iter()
            .filter(|n| n.bond > 0)
            .collect())
    }

    pub fn get_node_account_by_pub_key(&self, pk: &PubKey) -> Result<Option<NodeAccount>> {
        Ok(self
            .list_node_accounts()?
            .into_iter()
            .find(|n| n.pub_key_set.secp256k1 == *pk))
    }

    pub fn get_node_account_jail(&self, addr: &AccAddress) -> Result<Jail> {
        Ok(self
            .get_record(&key(prefix::NODE_JAIL, addr))?
            .unwrap_or_else(|| Jail {
                node_address: addr.clone(),
                ..Jail::default()
            }))
    }

    /// Jail `addr` for `blocks` blocks past `height`. An existing longer
    /// sentence is kept.
    pub fn set_node_account_jail(
        &mut self,
        addr: &AccAddress,
        height: i64,
        blocks: i64,
        reason: &str,
    ) -> Result<()> {
        let mut jail = self.get_node_account_jail(addr)?;
        let release_height = height.saturating_add(blocks);
        if release_height > jail.release_height {
            jail.release_height = release_height;
            jail.reason = reason.to_string();
            info!("jailing {} until {}: {}", addr, release_height, reason);
        }
        self.set_record(&key(prefix::NODE_JAIL, addr), &jail)
    }

    pub fn release_node_account_from_jail(&mut self, addr: &AccAddress) -> Result<()> {
        let mut jail = self.get_node_account_jail(addr)?;
        jail.release_height = 0;
        jail.reason.clear();
        self.set_record(&key(prefix::NODE_JAIL, addr), &jail)
    }

    pub fn get_node_account_slash_points(&self, addr: &AccAddress) -> Result<i64> {
        self.get_i64(&key(prefix::SLASH_POINTS, addr))
    }

    pub fn inc_node_account_slash_points(&mut self, addr: &AccAddress, points: i64) -> Result<()> {
        let current = self.get_node_account_slash_points(addr)?;
        self.set_i64(&key(prefix::SLASH_POINTS, addr), current.saturating_add(points))
    }

    /// Slash points never drop below zero.
    pub fn dec_node_account_slash_points(&mut self, addr: &AccAddress, points: i64) -> Result<()> {
        let current = self.get_node_account_slash_points(addr)?;
        self.set_i64(&key(prefix::SLASH_POINTS, addr), current.saturating_sub(points).max(0))
    }

    pub fn reset_node_account_slash_points(&mut self, addr: &AccAddress) {
        self.delete_record(&key(prefix::SLASH_POINTS, addr));
    }

    pub fn get_bond_providers(&self, addr: &AccAddress) -> Result<BondProviders> {
        Ok(self
            .get_record(&key(prefix::BOND_PROVIDERS, addr))?
            .unwrap_or_else(|| BondProviders::new(addr.clone())))
    }

    pub fn set_bond_providers(&mut self, providers: &BondProviders) -> Result<()> {
        self.set_record(&key(prefix::BOND_PROVIDERS, &providers.node_address), providers)
    }

    /// External height `addr` last reported on `chain`.
    pub fn get_last_observe_height(&self, chain: Chain, addr: &AccAddress) -> Result<i64> {
        self.get_i64(&key(prefix::LAST_OBSERVE, format!("{chain}//{addr}")))
    }

    /// Heights only move forward.
    pub fn set_last_observe_height(&mut self, chain: Chain, addr: &AccAddress, height: i64) -> Result<()> {
        if height <= self.get_last_observe_height(chain, addr)? {
            return Ok(());
        }
        self.set_i64(&key(prefix::LAST_OBSERVE, format!("{chain}//{addr}")), height)
    }

    pub fn get_min_join_version(&self) -> Result<Option<semver::Version>> {
        self.get_record(prefix::MIN_JOIN_VERSION)
    }

    pub fn set_min_join_version(&mut self, version: &semver::Version) -> Result<()> {
        self.set_record(prefix::MIN_JOIN_VERSION, version)
    }

    /// Height `addr` last paused or resumed the chains, 0 when never.
    pub fn get_node_pause_chain(&self, addr: &AccAddress) -> Result<i64> {
        self.get_i64(&key(prefix::NODE_PAUSE_CHAIN, addr))
    }

    pub fn set_node_pause_chain(&mut self, addr: &AccAddress, height: i64) -> Result<()> {
        self.set_i64(&key(prefix::NODE_PAUSE_CHAIN, addr), height)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, thornode_common::PubKeySet};

    fn node(name: &str, status: NodeStatus) -> NodeAccount {
        NodeAccount::new(
            AccAddress::new(name).unwrap(),
            status,
            PubKeySet::new(PubKey::new(name).unwrap(), PubKey::default()),
            String::new(),
            100,
            Default::default(),
            1,
        )
    }

    #[test]
    fn test_slash_points_floor_at_zero() {
        let mut keeper = Keeper::default();
        let addr = AccAddress::new("thornode1").unwrap();
        keeper.inc_node_account_slash_points(&addr, 3).unwrap();
        keeper.dec_node_account_slash_points(&addr, 5).unwrap();
        assert_eq!(keeper.get_node_account_slash_points(&addr).unwrap(), 0);
    }

    #[test]
    fn test_jail_keeps_longest_sentence() {
        let mut keeper = Keeper::default();
        let addr = AccAddress::new("thornode1").unwrap();
        keeper.set_node_account_jail(&addr, 10, 100, "keygen").unwrap();
        keeper.set_node_account_jail(&addr, 20, 5, "keysign").unwrap();
        let jail = keeper.get_node_account_jail(&addr).unwrap();
        assert_eq!(jail.release_height, 110);
        assert_eq!(jail.reason, "keygen");
        assert!(jail.is_jailed(109));
        keeper.release_node_account_from_jail(&addr).unwrap();
        assert!(!keeper.get_node_account_jail(&addr).unwrap().is_jailed(20));
    }

    #[test]
    fn test_node_lookup_by_status_and_key() {
        let mut keeper = Keeper::default();
        keeper.set_node_account(&node("thornode1", NodeStatus::Active)).unwrap();
        keeper.set_node_account(&node("thornode2", NodeStatus::Standby)).unwrap();
        assert_eq!(keeper.list_active_validators().unwrap().len(), 1);
        let found = keeper
            .get_node_account_by_pub_key(&PubKey::new("thornode2").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(found.status, NodeStatus::Standby);
        let addr = AccAddress::new("thornode1").unwrap();
        keeper.set_last_observe_height(Chain::BTC, &addr, 50).unwrap();
        keeper.set_last_observe_height(Chain::BTC, &addr, 40).unwrap();
        assert_eq!(keeper.get_last_observe_height(Chain::BTC, &addr).unwrap(), 50);
    }
}
