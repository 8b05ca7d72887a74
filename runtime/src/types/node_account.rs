use {
    serde_derive::{Deserialize, Serialize},
    strum_macros::{Display, EnumString},
    thornode_common::{AccAddress, Address, PubKey, PubKeySet, Uint},
};

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Display,
    EnumString,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub enum NodeStatus {
    #[default]
    Unknown,
    Whitelisted,
    Standby,
    Ready,
    Active,
    Disabled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAccount {
    pub node_address: AccAddress,
    pub status: NodeStatus,
    pub status_since: i64,
    pub pub_key_set: PubKeySet,
    pub validator_cons_pub_key: String,
    pub bond: Uint,
    pub bond_address: Address,
    pub active_block_height: i64,
    pub signer_membership: Vec<PubKey>,
    pub requested_to_leave: bool,
    pub forced_to_leave: bool,
    pub leave_score: u64,
    pub ip_address: String,
    pub version: String,
}

pub type NodeAccounts = Vec<NodeAccount>;

impl NodeAccount {
    pub fn new(
        node_address: AccAddress,
        status: NodeStatus,
        pub_key_set: PubKeySet,
        validator_cons_pub_key: String,
        bond: Uint,
        bond_address: Address,
        height: i64,
    ) -> Self {
        Self {
            node_address,
            status,
            status_since: height,
            pub_key_set,
            validator_cons_pub_key,
            bond,
            bond_address,
            active_block_height: 0,
            signer_membership: Vec::new(),
            requested_to_leave: false,
            forced_to_leave: false,
            leave_score: 0,
            ip_address: String::new(),
            version: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.node_address.is_empty()
    }

    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }

    pub fn update_status(&mut self, status: NodeStatus, height: i64) {
        if status == NodeStatus::Active && self.status != NodeStatus::Active {
            self.active_block_height = height;
        }
        self.status = status;
        self.status_since = height;
    }

    /// Parsed advertised version, `0.0.0` when unset or malformed.
    pub fn get_version(&self) -> semver::Version {
        semver::Version::parse(&self.version).unwrap_or_else(|_| semver::Version::new(0, 0, 0))
    }

    pub fn try_add_signer_pub_key(&mut self, pk: PubKey) {
        if pk.is_empty() || self.signer_membership.contains(&pk) {
            return;
        }
        self.signer_membership.push(pk);
    }

    pub fn try_remove_signer_pub_key(&mut self, pk: &PubKey) {
        self.signer_membership.retain(|m| m != pk);
    }

    pub fn sub_bond(&mut self, amount: Uint) -> Uint {
        let taken = amount.min(self.bond);
        self.bond -= taken;
        taken
    }
}

/// Find the node that owns `pk` as its secp256k1 key.
pub fn node_by_pub_key<'a>(nodes: &'a [NodeAccount], pk: &PubKey) -> Option<&'a NodeAccount> {
    nodes.iter().find(|n| n.pub_key_set.secp256k1 == *pk)
}

pub fn is_node_keys(nodes: &[NodeAccount], addr: &AccAddress) -> bool {
    nodes.iter().any(|n| n.node_address == *addr)
}

/// Jail of a node, released at `release_height`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jail {
    pub node_address: AccAddress,
    pub release_height: i64,
    pub reason: String,
}

impl Jail {
    pub fn is_jailed(&self, height: i64) -> bool {
        self.release_height > height
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondProvider {
    pub bond_address: AccAddress,
    pub bond: Uint,
}

/// Bond providers of a node. The operator is always the first provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondProviders {
    pub node_address: AccAddress,
    /// Operator fee in basis points.
    pub node_operator_fee: Uint,
    pub providers: Vec<BondProvider>,
}

impl BondProviders {
    pub fn new(node_address: AccAddress) -> Self {
        Self {
            node_address,
            node_operator_fee: 0,
            providers: Vec::new(),
        }
    }

    pub fn has(&self, addr: &AccAddress) -> bool {
        self.providers.iter().any(|p| p.bond_address == *addr)
    }

    pub fn get(&self, addr: &AccAddress) -> Option<&BondProvider> {
        self.providers.iter().find(|p| p.bond_address == *addr)
    }

    pub fn has_provider_bonded(&self, addr: &AccAddress) -> bool {
        self.get(addr).map(|p| p.bond > 0).unwrap_or(false)
    }

    pub fn total_bond(&self) -> Uint {
        self.providers.iter().map(|p| p.bond).sum()
    }

    pub fn bond(&mut self, addr: &AccAddress, amount: Uint) {
        match self.providers.iter_mut().find(|p| p.bond_address == *addr) {
            Some(p) => p.bond = p.bond.saturating_add(amount),
            None => self.providers.push(BondProvider {
                bond_address: addr.clone(),
                bond: amount,
            }),
        }
    }

    pub fn unbond(&mut self, addr: &AccAddress, amount: Uint) -> Uint {
        match self.providers.iter_mut().find(|p| p.bond_address == *addr) {
            Some(p) => {
                let taken = amount.min(p.bond);
                p.bond -= taken;
                taken
            }
            None => 0,
        }
    }

    pub fn remove(&mut self, addr: &AccAddress) {
        self.providers.retain(|p| p.bond_address != *addr);
    }

    /// Bring the recorded provider bonds in line with the node bond, scaling
    /// each provider pro rata.
    pub fn adjust(&mut self, node_bond: Uint) {
        let total = self.total_bond();
        if total == 0 || total == node_bond {
            return;
        }
        for p in self.providers.iter_mut() {
            p.bond = thornode_common::math::mul_div(p.bond, node_bond, total);
        }
    }
}
