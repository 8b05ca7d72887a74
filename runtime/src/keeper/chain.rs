//! Network wide records: governance, versions, churn and ragnarok progress,
//! and the super majority voters that only validators feed.

use {
    super::{key, prefix, Keeper},
    crate::{
        error::Result,
        events::GasPool,
        types::{
            BanVoter, ErrataTxVoter, KeygenBlock, Network, NetworkFee, ObservedNetworkFeeVoter,
            RagnarokWithdrawPosition, ReserveContributor, SolvencyVoter, ThorName,
            TssKeysignFailVoter, TssVoter,
        },
    },
    semver::Version,
    std::collections::BTreeMap,
    thornode_common::{AccAddress, Asset, Chain, TxId, Uint},
};

impl Keeper {
    pub fn get_version(&self) -> Result<Option<Version>> {
        self.get_record(prefix::VERSION)
    }

    pub fn set_version(&mut self, version: &Version) -> Result<()> {
        self.set_record(prefix::VERSION, version)
    }

    /// Governance value of `key`, `None` when unset.
    pub fn get_mimir(&self, key_name: &str) -> Result<Option<i64>> {
        self.get_record(&key(prefix::MIMIR, key_name.to_uppercase()))
    }

    pub fn set_mimir(&mut self, key_name: &str, value: i64) -> Result<()> {
        self.set_record(&key(prefix::MIMIR, key_name.to_uppercase()), &value)
    }

    pub fn delete_mimir(&mut self, key_name: &str) {
        self.delete_record(&key(prefix::MIMIR, key_name.to_uppercase()));
    }

    /// Every governance override, keyed by upper-cased name.
    pub fn get_mimirs(&self) -> Result<BTreeMap<String, i64>> {
        let ids = self.record_ids(prefix::MIMIR);
        let values: Vec<i64> = self.records(prefix::MIMIR)?;
        Ok(ids.into_iter().zip(values).collect())
    }

    /// Votes of individual nodes on `key`.
    pub fn get_node_mimirs(&self, key_name: &str) -> Result<BTreeMap<AccAddress, i64>> {
        Ok(self
            .get_record(&key(prefix::NODE_MIMIR, key_name.to_uppercase()))?
            .unwrap_or_default())
    }

    pub fn set_node_mimir(&mut self, key_name: &str, value: i64, signer: &AccAddress) -> Result<()> {
        let mut votes = self.get_node_mimirs(key_name)?;
        votes.insert(signer.clone(), value);
        self.set_record(&key(prefix::NODE_MIMIR, key_name.to_uppercase()), &votes)
    }

    pub fn get_network(&self) -> Result<Network> {
        Ok(self.get_record(prefix::NETWORK)?.unwrap_or_default())
    }

    pub fn set_network(&mut self, network: &Network) -> Result<()> {
        self.set_record(prefix::NETWORK, network)
    }

    pub fn get_network_fee(&self, chain: Chain) -> Result<Option<NetworkFee>> {
        self.get_record(&key(prefix::NETWORK_FEE, chain))
    }

    pub fn save_network_fee(&mut self, fee: &NetworkFee) -> Result<()> {
        self.set_record(&key(prefix::NETWORK_FEE, fee.chain), fee)
    }

    fn network_fee_voter_key(chain: Chain, height: i64, size: u64, rate: u64) -> String {
        key(prefix::NETWORK_FEE_VOTER, format!("{chain}//{height}//{size}//{rate}"))
    }

    pub fn get_observed_network_fee_voter(
        &self,
        chain: Chain,
        height: i64,
        size: u64,
        rate: u64,
    ) -> Result<ObservedNetworkFeeVoter> {
        Ok(self
            .get_record(&Self::network_fee_voter_key(chain, height, size, rate))?
            .unwrap_or_else(|| ObservedNetworkFeeVoter::new(height, chain, size, rate)))
    }

    pub fn set_observed_network_fee_voter(&mut self, voter: &ObservedNetworkFeeVoter) -> Result<()> {
        self.set_record(
            &Self::network_fee_voter_key(
                voter.chain,
                voter.report_block_height,
                voter.transaction_size,
                voter.fee_rate,
            ),
            voter,
        )
    }

    /// Height ragnarok started at, 0 when it has not.
    pub fn ragnarok_block_height(&self) -> Result<i64> {
        self.get_i64(prefix::RAGNAROK_BLOCK)
    }

    pub fn ragnarok_in_progress(&self) -> Result<bool> {
        Ok(self.ragnarok_block_height()? > 0)
    }

    pub fn set_ragnarok_block_height(&mut self, height: i64) -> Result<()> {
        self.set_i64(prefix::RAGNAROK_BLOCK, height)
    }

    pub fn get_ragnarok_nth(&self) -> Result<i64> {
        self.get_i64(prefix::RAGNAROK_NTH)
    }

    pub fn set_ragnarok_nth(&mut self, nth: i64) -> Result<()> {
        self.set_i64(prefix::RAGNAROK_NTH, nth)
    }

    pub fn get_ragnarok_pending(&self) -> Result<i64> {
        self.get_i64(prefix::RAGNAROK_PENDING)
    }

    pub fn set_ragnarok_pending(&mut self, pending: i64) -> Result<()> {
        self.set_i64(prefix::RAGNAROK_PENDING, pending.max(0))
    }

    pub fn get_ragnarok_withdraw_position(&self) -> Result<RagnarokWithdrawPosition> {
        Ok(self
            .get_record(prefix::RAGNAROK_POSITION)?
            .unwrap_or_default())
    }

    pub fn set_ragnarok_withdraw_position(&mut self, position: &RagnarokWithdrawPosition) -> Result<()> {
        self.set_record(prefix::RAGNAROK_POSITION, position)
    }

    /// Contributions to the reserve, paid back last during ragnarok.
    pub fn get_reserve_contributors(&self) -> Result<Vec<ReserveContributor>> {
        Ok(self
            .get_record(prefix::RESERVE_CONTRIBUTORS)?
            .unwrap_or_default())
    }

    pub fn add_reserve_contributor(&mut self, contributor: &ReserveContributor) -> Result<()> {
        let mut contributors = self.get_reserve_contributors()?;
        match contributors
            .iter_mut()
            .find(|c| c.address.equals(&contributor.address))
        {
            Some(c) => c.amount = c.amount.saturating_add(contributor.amount),
            None => contributors.push(contributor.clone()),
        }
        self.set_record(prefix::RESERVE_CONTRIBUTORS, &contributors)
    }

    pub fn clear_reserve_contributors(&mut self) {
        self.delete_record(prefix::RESERVE_CONTRIBUTORS);
    }

    pub fn get_keygen_block(&self, height: i64) -> Result<KeygenBlock> {
        Ok(self
            .get_record(&key(prefix::KEYGEN_BLOCK, height))?
            .unwrap_or_else(|| KeygenBlock::new(height)))
    }

    pub fn set_keygen_block(&mut self, block: &KeygenBlock) -> Result<()> {
        self.set_record(&key(prefix::KEYGEN_BLOCK, block.height), block)
    }

    pub fn get_keygen_blocks(&self) -> Result<Vec<KeygenBlock>> {
        self.records(prefix::KEYGEN_BLOCK)
    }

    pub fn get_last_churn_height(&self) -> Result<i64> {
        self.get_i64(prefix::LAST_CHURN)
    }

    pub fn set_last_churn_height(&mut self, height: i64) -> Result<()> {
        self.set_i64(prefix::LAST_CHURN, height)
    }

    pub fn get_last_sign_height(&self) -> Result<i64> {
        self.get_i64(prefix::LAST_SIGN)
    }

    pub fn set_last_sign_height(&mut self, height: i64) -> Result<()> {
        if height <= self.get_last_sign_height()? {
            return Ok(());
        }
        self.set_i64(prefix::LAST_SIGN, height)
    }

    pub fn get_tss_voter(&self, id: &str) -> Result<Option<TssVoter>> {
        self.get_record(&key(prefix::TSS, id))
    }

    pub fn set_tss_voter(&mut self, voter: &TssVoter) -> Result<()> {
        self.set_record(&key(prefix::TSS, &voter.id), voter)
    }

    pub fn get_tss_keysign_fail_voter(&self, id: &str, height: i64) -> Result<TssKeysignFailVoter> {
        Ok(self
            .get_record(&key(prefix::TSS_KEYSIGN, id))?
            .unwrap_or_else(|| TssKeysignFailVoter::new(id.to_string(), height)))
    }

    pub fn set_tss_keysign_fail_voter(&mut self, voter: &TssKeysignFailVoter) -> Result<()> {
        self.set_record(&key(prefix::TSS_KEYSIGN, &voter.id), voter)
    }

    /// Ceremony durations reported per node for keygen or keysign `id`.
    pub fn get_tss_metric(&self, id: &str) -> Result<BTreeMap<AccAddress, i64>> {
        Ok(self
            .get_record(&key(prefix::TSS_METRIC, id))?
            .unwrap_or_default())
    }

    pub fn set_tss_metric(&mut self, id: &str, node: &AccAddress, duration_ms: i64) -> Result<()> {
        let mut metric = self.get_tss_metric(id)?;
        metric.insert(node.clone(), duration_ms);
        self.set_record(&key(prefix::TSS_METRIC, id), &metric)
    }

    pub fn get_errata_tx_voter(&self, tx_id: &TxId, chain: Chain) -> Result<ErrataTxVoter> {
        Ok(self
            .get_record(&key(prefix::ERRATA, format!("{tx_id}//{chain}")))?
            .unwrap_or_else(|| ErrataTxVoter::new(tx_id.clone(), chain)))
    }

    pub fn set_errata_tx_voter(&mut self, voter: &ErrataTxVoter) -> Result<()> {
        self.set_record(
            &key(prefix::ERRATA, format!("{}//{}", voter.tx_id, voter.chain)),
            voter,
        )
    }

    pub fn get_solvency_voter(&self, id: &TxId, chain: Chain) -> Result<Option<SolvencyVoter>> {
        self.get_record(&key(prefix::SOLVENCY, format!("{id}//{chain}")))
    }

    pub fn set_solvency_voter(&mut self, voter: &SolvencyVoter) -> Result<()> {
        self.set_record(
            &key(prefix::SOLVENCY, format!("{}//{}", voter.id, voter.chain)),
            voter,
        )
    }

    pub fn get_ban_voter(&self, addr: &AccAddress) -> Result<BanVoter> {
        Ok(self
            .get_record(&key(prefix::BAN, addr))?
            .unwrap_or_else(|| BanVoter::new(addr.clone())))
    }

    pub fn set_ban_voter(&mut self, voter: &BanVoter) -> Result<()> {
        self.set_record(&key(prefix::BAN, &voter.node_address), voter)
    }

    pub fn get_thorname(&self, name: &str) -> Result<Option<ThorName>> {
        self.get_record(&key(prefix::THORNAME, name.to_lowercase()))
    }

    pub fn set_thorname(&mut self, name: &ThorName) -> Result<()> {
        self.set_record(&key(prefix::THORNAME, name.name.to_lowercase()), name)
    }

    /// Rune value of outbound gas actually spent on `asset`'s chain.
    pub fn get_outbound_fee_spent_rune(&self, asset: &Asset) -> Result<Uint> {
        Ok(self
            .get_record(&key(prefix::OUTBOUND_FEE_SPENT, asset))?
            .unwrap_or_default())
    }

    pub fn add_outbound_fee_spent_rune(&mut self, asset: &Asset, amount: Uint) -> Result<()> {
        let total = self.get_outbound_fee_spent_rune(asset)?.saturating_add(amount);
        self.set_record(&key(prefix::OUTBOUND_FEE_SPENT, asset), &total)
    }

    /// Rune value of outbound fees withheld from users of `asset`.
    pub fn get_outbound_fee_withheld_rune(&self, asset: &Asset) -> Result<Uint> {
        Ok(self
            .get_record(&key(prefix::OUTBOUND_FEE_WITHHELD, asset))?
            .unwrap_or_default())
    }

    pub fn add_outbound_fee_withheld_rune(&mut self, asset: &Asset, amount: Uint) -> Result<()> {
        let total = self
            .get_outbound_fee_withheld_rune(asset)?
            .saturating_add(amount);
        self.set_record(&key(prefix::OUTBOUND_FEE_WITHHELD, asset), &total)
    }

    /// Gas paid by vaults during the current block, per gas asset.
    pub fn get_block_gas(&self) -> Result<Vec<GasPool>> {
        Ok(self
            .get_record(&key(prefix::GAS, "block"))?
            .unwrap_or_default())
    }

    pub fn set_block_gas(&mut self, gas: &[GasPool]) -> Result<()> {
        self.set_record(&key(prefix::GAS, "block"), &gas)
    }

    pub fn clear_block_gas(&mut self) {
        self.delete_record(&key(prefix::GAS, "block"));
    }
}
