//! Observations of external transactions and the voters that tally them.

use {
    super::{node_account::is_node_keys, tx_out::TxOutItem, NodeAccount},
    serde_derive::{Deserialize, Serialize},
    strum_macros::Display,
    thornode_common::{
        math::{has_simple_majority, has_super_majority},
        AccAddress, PubKey, Tx, TxId, Uint,
    },
};

#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservedTxStatus {
    #[default]
    Incomplete,
    Done,
    Reverted,
}

/// A transaction as reported by one or more validators.
#[derive(Clone, Debug, Default, Eq, Serialize, Deserialize)]
pub struct ObservedTx {
    pub tx: Tx,
    pub status: ObservedTxStatus,
    pub out_hashes: Vec<TxId>,
    /// External chain height the transaction was seen at.
    pub block_height: i64,
    pub signers: Vec<AccAddress>,
    pub observed_pub_key: PubKey,
    pub keysign_ms: i64,
    /// External height at which the transaction is final.
    pub finalise_height: i64,
    pub aggregator: String,
    pub aggregator_target: String,
    pub aggregator_target_limit: Option<Uint>,
}

/// Observations compare by content; who signed them does not matter.
impl PartialEq for ObservedTx {
    fn eq(&self, other: &Self) -> bool {
        self.tx.equals_ex(&other.tx)
            && self.observed_pub_key == other.observed_pub_key
            && self.block_height == other.block_height
            && self.finalise_height == other.finalise_height
            && self.aggregator.eq_ignore_ascii_case(&other.aggregator)
            && self
                .aggregator_target
                .eq_ignore_ascii_case(&other.aggregator_target)
            && self.aggregator_target_limit.unwrap_or_default()
                == other.aggregator_target_limit.unwrap_or_default()
    }
}

impl ObservedTx {
    pub fn new(tx: Tx, block_height: i64, pk: PubKey, finalise_height: i64) -> Self {
        Self {
            tx,
            block_height,
            observed_pub_key: pk,
            finalise_height,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn is_final(&self) -> bool {
        self.finalise_height == self.block_height
    }

    pub fn has_signed(&self, signer: &AccAddress) -> bool {
        self.signers.contains(signer)
    }

    /// Add `signer`, returning `false` if they already signed.
    pub fn sign(&mut self, signer: &AccAddress) -> bool {
        if self.has_signed(signer) {
            return false;
        }
        self.signers.push(signer.clone());
        true
    }

    /// Record an observed outbound. Blank hashes may repeat since several
    /// native outbounds carry no hash.
    pub fn set_done(&mut self, hash: &TxId, num_outs: usize) {
        if !hash.is_blank() && self.out_hashes.contains(hash) {
            return;
        }
        self.out_hashes.push(hash.clone());
        if self.is_done(num_outs) {
            self.status = ObservedTxStatus::Done;
        }
    }

    pub fn is_done(&self, num_outs: usize) -> bool {
        self.out_hashes.len() >= num_outs
    }
}

/// Lifecycle of a voter.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum VoterState {
    Empty,
    PartiallySigned,
    Consensus,
    Finalised,
    Done,
    Reverted,
}

/// Tally of observations of one external transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedTxVoter {
    pub tx_id: TxId,
    /// Canonical observation once consensus is reached.
    pub tx: ObservedTx,
    /// Block height consensus was first reached.
    pub height: i64,
    pub txs: Vec<ObservedTx>,
    pub actions: Vec<TxOutItem>,
    pub out_txs: Vec<Tx>,
    pub finalised_height: i64,
    pub updated_vault: bool,
    pub reverted: bool,
    pub outbound_height: i64,
}

impl ObservedTxVoter {
    pub fn new(tx_id: TxId, txs: Vec<ObservedTx>) -> Self {
        Self {
            tx_id,
            txs,
            ..Self::default()
        }
    }

    /// Add `observed` as signed by `signer`. Returns `false` when the signer
    /// already voted for the same contents.
    pub fn add(&mut self, mut observed: ObservedTx, signer: &AccAddress) -> bool {
        if let Some(existing) = self.txs.iter_mut().find(|t| **t == observed) {
            return existing.sign(signer);
        }
        observed.signers = vec![signer.clone()];
        self.txs.push(observed);
        true
    }

    /// Canonical observation given the active set. Final observations need
    /// a super majority, non final ones a simple majority. Once a final
    /// observation has been adopted it never changes.
    pub fn get_tx(&mut self, active: &[NodeAccount]) -> ObservedTx {
        if !self.tx.is_empty() && self.tx.is_final() {
            return self.tx.clone();
        }
        if let Some(final_tx) = self.consensus_tx(active, true) {
            self.tx = final_tx;
        } else if let Some(tx) = self.consensus_tx(active, false) {
            self.tx = tx;
        }
        self.tx.clone()
    }

    fn consensus_tx(&self, active: &[NodeAccount], final_: bool) -> Option<ObservedTx> {
        self.txs
            .iter()
            .filter(|t| t.is_final() == final_)
            .find(|candidate| {
                let mut voters: Vec<&AccAddress> = Vec::new();
                for t in self
                    .txs
                    .iter()
                    .filter(|t| t.is_final() == final_ && t.tx.equals_ex(&candidate.tx))
                {
                    for signer in &t.signers {
                        if !voters.contains(&signer) && is_node_keys(active, signer) {
                            voters.push(signer);
                        }
                    }
                }
                if final_ {
                    has_super_majority(voters.len(), active.len())
                } else {
                    has_simple_majority(voters.len(), active.len())
                }
            })
            .cloned()
    }

    pub fn has_consensus(&mut self, active: &[NodeAccount]) -> bool {
        !self.get_tx(active).is_empty()
    }

    pub fn has_finalised(&mut self, active: &[NodeAccount]) -> bool {
        let tx = self.get_tx(active);
        !tx.is_empty() && tx.is_final()
    }

    /// Record an observed outbound against the planned actions. Returns
    /// `false` when it matches no action.
    pub fn add_out_tx(&mut self, out: &Tx) -> bool {
        if !self.match_action_item(out) {
            return false;
        }
        if !out.id.is_blank() && self.out_txs.iter().any(|t| t.id == out.id) {
            return true;
        }
        self.out_txs.push(out.clone());
        let num_outs = self.actions.len();
        for t in self.txs.iter_mut() {
            t.set_done(&out.id, num_outs);
        }
        if !self.tx.is_empty() {
            self.tx.set_done(&out.id, num_outs);
        }
        true
    }

    fn match_action_item(&self, out: &Tx) -> bool {
        self.actions.iter().any(|action| {
            action.paid_by(out)
                && action.memo.eq_ignore_ascii_case(&out.memo)
                && action.to_address.equals(&out.to_address)
                && action.chain == out.chain
        })
    }

    pub fn is_done(&self) -> bool {
        self.actions.len() <= self.out_txs.len()
    }

    fn set_status(&mut self, status: ObservedTxStatus) {
        for t in self.txs.iter_mut() {
            t.status = status;
        }
        if !self.tx.is_empty() {
            self.tx.status = status;
        }
    }

    pub fn set_done(&mut self) {
        self.set_status(ObservedTxStatus::Done);
    }

    pub fn set_reverted(&mut self) {
        self.set_status(ObservedTxStatus::Reverted);
        self.reverted = true;
    }

    pub fn state(&self) -> VoterState {
        if self.reverted {
            VoterState::Reverted
        } else if self.tx.status == ObservedTxStatus::Done && !self.tx.is_empty() {
            VoterState::Done
        } else if self.finalised_height > 0 {
            VoterState::Finalised
        } else if self.height > 0 {
            VoterState::Consensus
        } else if self.txs.is_empty() {
            VoterState::Empty
        } else {
            VoterState::PartiallySigned
        }
    }
}
