use {
    super::{key, prefix, Keeper},
    crate::{
        error::{Result, RuntimeError},
        types::{ChainContract, Vault, VaultStatus, VaultType},
    },
    thornode_common::{Chain, PubKey},
};

impl Keeper {
    pub fn vault_exists(&self, pk: &PubKey) -> bool {
        self.has_record(&key(prefix::VAULT, pk))
    }

    pub fn get_vault(&self, pk: &PubKey) -> Result<Vault> {
        self.get_record(&key(prefix::VAULT, pk))?
            .ok_or_else(|| RuntimeError::internal("fail to get vault", format!("vault {pk} not found")))
    }

    pub fn set_vault(&mut self, vault: &Vault) -> Result<()> {
        if vault.pub_key.is_empty() {
            return Err(RuntimeError::internal("fail to save vault", "empty pub key"));
        }
        self.set_record(&key(prefix::VAULT, &vault.pub_key), vault)
    }

    pub fn delete_vault(&mut self, pk: &PubKey) {
        self.delete_record(&key(prefix::VAULT, pk));
    }

    pub fn get_vaults(&self) -> Result<Vec<Vault>> {
        self.records(prefix::VAULT)
    }

    pub fn get_asgard_vaults(&self) -> Result<Vec<Vault>> {
        Ok(self
            .get_vaults()?
            .into_iter()
            .filter(Vault::is_asgard)
            .collect())
    }

    pub fn get_asgard_vaults_by_status(&self, status: VaultStatus) -> Result<Vec<Vault>> {
        Ok(self
            .get_asgard_vaults()?
            .into_iter()
            .filter(|v| v.status == status)
            .collect())
    }

    pub fn yggdrasil_exists(&self, pk: &PubKey) -> Result<bool> {
        Ok(self
            .get_record::<Vault>(&key(prefix::VAULT, pk))?
            .map(|v| v.vault_type == VaultType::Yggdrasil)
            .unwrap_or_default())
    }

    pub fn get_yggdrasils(&self) -> Result<Vec<Vault>> {
        Ok(self
            .get_vaults()?
            .into_iter()
            .filter(Vault::is_yggdrasil)
            .collect())
    }

    /// Height of the fund request a yggdrasil vault is waiting on, 0 when none.
    pub fn get_pending_ygg_fund(&self, pk: &PubKey) -> Result<i64> {
        self.get_i64(&key(prefix::PENDING_YGG_FUND, pk))
    }

    pub fn set_pending_ygg_fund(&mut self, pk: &PubKey, height: i64) -> Result<()> {
        self.set_i64(&key(prefix::PENDING_YGG_FUND, pk), height)
    }

    pub fn clear_pending_ygg_fund(&mut self, pk: &PubKey) {
        self.delete_record(&key(prefix::PENDING_YGG_FUND, pk));
    }

    pub fn get_chain_contract(&self, chain: Chain) -> Result<Option<ChainContract>> {
        self.get_record(&key(prefix::CHAIN_CONTRACT, chain))
    }

    pub fn set_chain_contract(&mut self, contract: &ChainContract) -> Result<()> {
        self.set_record(&key(prefix::CHAIN_CONTRACT, contract.chain), contract)
    }

    pub fn get_chain_contracts(&self) -> Result<Vec<ChainContract>> {
        self.records(prefix::CHAIN_CONTRACT)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, assert_matches::assert_matches};

    #[test]
    fn test_vaults_filtered_by_type_and_status() {
        let mut keeper = Keeper::default();
        let active = Vault::new(
            1,
            VaultStatus::Active,
            VaultType::Asgard,
            PubKey::new("asgard1").unwrap(),
            vec![Chain::BNB],
            vec![],
        );
        let retiring = Vault::new(
            1,
            VaultStatus::Retiring,
            VaultType::Asgard,
            PubKey::new("asgard2").unwrap(),
            vec![Chain::BNB],
            vec![],
        );
        let ygg = Vault::new(
            1,
            VaultStatus::Active,
            VaultType::Yggdrasil,
            PubKey::new("ygg1").unwrap(),
            vec![Chain::BNB],
            vec![],
        );
        for vault in [&active, &retiring, &ygg] {
            keeper.set_vault(vault).unwrap();
        }
        assert_eq!(
            keeper.get_asgard_vaults_by_status(VaultStatus::Active).unwrap(),
            vec![active]
        );
        assert_eq!(keeper.get_asgard_vaults().unwrap().len(), 2);
        assert!(keeper.yggdrasil_exists(&ygg.pub_key).unwrap());
        assert!(!keeper.yggdrasil_exists(&retiring.pub_key).unwrap());
        keeper.delete_vault(&ygg.pub_key);
        assert_matches!(
            keeper.get_vault(&ygg.pub_key),
            Err(RuntimeError::Internal { .. })
        );
    }
}
