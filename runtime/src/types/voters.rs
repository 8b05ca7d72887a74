//! Super majority voters for the messages that only validators send.

use {
    super::{network::Blame, node_account::is_node_keys, KeygenType, NodeAccount},
    serde_derive::{Deserialize, Serialize},
    thornode_common::{math::has_super_majority, AccAddress, Chain, Coins, PubKey, TxId},
};

fn sign(signers: &mut Vec<AccAddress>, signer: &AccAddress) -> bool {
    if signer.is_empty() || signers.contains(signer) {
        return false;
    }
    signers.push(signer.clone());
    true
}

fn super_majority(signers: &[AccAddress], active: &[NodeAccount]) -> bool {
    let count = signers.iter().filter(|s| is_node_keys(active, s)).count();
    has_super_majority(count, active.len())
}

/// Votes that an inbound was reorged out of its chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrataTxVoter {
    pub tx_id: TxId,
    pub chain: Chain,
    pub block_height: i64,
    pub signers: Vec<AccAddress>,
}

impl ErrataTxVoter {
    pub fn new(tx_id: TxId, chain: Chain) -> Self {
        Self {
            tx_id,
            chain,
            ..Self::default()
        }
    }

    pub fn sign(&mut self, signer: &AccAddress) -> bool {
        sign(&mut self.signers, signer)
    }

    pub fn has_consensus(&self, active: &[NodeAccount]) -> bool {
        super_majority(&self.signers, active)
    }
}

/// Votes on the balance a vault holds on an external chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolvencyVoter {
    pub id: TxId,
    pub chain: Chain,
    pub pub_key: PubKey,
    pub coins: Coins,
    pub height: i64,
    pub consensus_block_height: i64,
    pub signers: Vec<AccAddress>,
}

impl SolvencyVoter {
    pub fn new(id: TxId, chain: Chain, pub_key: PubKey, coins: Coins, height: i64) -> Self {
        Self {
            id,
            chain,
            pub_key,
            coins,
            height,
            ..Self::default()
        }
    }

    pub fn sign(&mut self, signer: &AccAddress) -> bool {
        sign(&mut self.signers, signer)
    }

    pub fn has_consensus(&self, active: &[NodeAccount]) -> bool {
        super_majority(&self.signers, active)
    }
}

/// Votes to force a node out of the active set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanVoter {
    pub node_address: AccAddress,
    pub block_height: i64,
    pub signers: Vec<AccAddress>,
}

impl BanVoter {
    pub fn new(node_address: AccAddress) -> Self {
        Self {
            node_address,
            ..Self::default()
        }
    }

    pub fn sign(&mut self, signer: &AccAddress) -> bool {
        sign(&mut self.signers, signer)
    }

    pub fn has_signed(&self, signer: &AccAddress) -> bool {
        self.signers.contains(signer)
    }

    pub fn has_consensus(&self, active: &[NodeAccount]) -> bool {
        super_majority(&self.signers, active)
    }
}

/// Votes on the outcome of a keygen ceremony.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TssVoter {
    pub id: String,
    pub pool_pub_key: PubKey,
    pub pub_keys: Vec<PubKey>,
    pub keygen_type: KeygenType,
    pub block_height: i64,
    /// Chain support advertised by each signer, in signer order.
    pub chains: Vec<Vec<Chain>>,
    pub signers: Vec<AccAddress>,
    pub majority_consensus_block_height: i64,
    pub blame: Blame,
}

impl TssVoter {
    pub fn new(id: String, pub_keys: Vec<PubKey>, pool_pub_key: PubKey) -> Self {
        Self {
            id,
            pub_keys,
            pool_pub_key,
            ..Self::default()
        }
    }

    pub fn sign(&mut self, signer: &AccAddress, chains: Vec<Chain>) -> bool {
        if !sign(&mut self.signers, signer) {
            return false;
        }
        self.chains.push(chains);
        true
    }

    pub fn has_signed(&self, signer: &AccAddress) -> bool {
        self.signers.contains(signer)
    }

    /// Super majority of the keygen members, not of the active set.
    pub fn has_consensus(&self) -> bool {
        has_super_majority(self.signers.len(), self.pub_keys.len())
    }

    pub fn has_complete_consensus(&self) -> bool {
        !self.pub_keys.is_empty() && self.signers.len() == self.pub_keys.len()
    }

    /// Chains advertised by a super majority of signers.
    pub fn consensus_chains(&self) -> Vec<Chain> {
        let mut chains: Vec<Chain> = self.chains.iter().flatten().copied().collect();
        chains.sort();
        chains.dedup();
        chains
            .into_iter()
            .filter(|chain| {
                let count = self.chains.iter().filter(|c| c.contains(chain)).count();
                has_super_majority(count, self.pub_keys.len())
            })
            .collect()
    }
}

/// Votes that a keysign failed and who is to blame.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TssKeysignFailVoter {
    pub id: String,
    pub height: i64,
    /// Signers that reported a failure in the final keysign round.
    pub round7_count: i64,
    pub signers: Vec<AccAddress>,
}

impl TssKeysignFailVoter {
    pub fn new(id: String, height: i64) -> Self {
        Self {
            id,
            height,
            ..Self::default()
        }
    }

    pub fn sign(&mut self, signer: &AccAddress) -> bool {
        sign(&mut self.signers, signer)
    }

    pub fn has_signed(&self, signer: &AccAddress) -> bool {
        self.signers.contains(signer)
    }

    pub fn has_consensus(&self, active: &[NodeAccount]) -> bool {
        super_majority(&self.signers, active)
    }
}

/// Votes on the network fee of a chain at an external height.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedNetworkFeeVoter {
    pub block_height: i64,
    pub report_block_height: i64,
    pub chain: Chain,
    pub transaction_size: u64,
    pub fee_rate: u64,
    pub signers: Vec<AccAddress>,
}

impl ObservedNetworkFeeVoter {
    pub fn new(report_block_height: i64, chain: Chain, transaction_size: u64, fee_rate: u64) -> Self {
        Self {
            report_block_height,
            chain,
            transaction_size,
            fee_rate,
            ..Self::default()
        }
    }

    pub fn sign(&mut self, signer: &AccAddress) -> bool {
        sign(&mut self.signers, signer)
    }

    pub fn has_consensus(&self, active: &[NodeAccount]) -> bool {
        super_majority(&self.signers, active)
    }
}
