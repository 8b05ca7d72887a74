use {
    serde_derive::{Deserialize, Serialize},
    strum_macros::{Display, EnumString},
    thornode_common::{AccAddress, Address, Asset, Chain, PubKey, Uint},
};

/// Network wide accounting.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub bond_reward_rune: Uint,
    pub total_bond_units: Uint,
    /// Rune value of gas spent by observed outbounds.
    pub outbound_gas_spent_rune: Uint,
    /// Rune value of outbound fees withheld from users.
    pub outbound_gas_withheld_rune: Uint,
    /// Non-native rune switched in from BNB.
    pub burned_bep2_rune: Uint,
    /// Non-native rune switched in from ETH.
    pub burned_erc20_rune: Uint,
}

/// Fee reported for a chain by super majority.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkFee {
    pub chain: Chain,
    pub transaction_size: u64,
    pub transaction_fee_rate: u64,
}

impl NetworkFee {
    pub fn new(chain: Chain, transaction_size: u64, transaction_fee_rate: u64) -> Self {
        Self {
            chain,
            transaction_size,
            transaction_fee_rate,
        }
    }

    pub fn valid(&self) -> bool {
        self.transaction_size > 0 && self.transaction_fee_rate > 0
    }
}

#[derive(
    Clone, Copy, Debug, Default, Display, EnumString, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum KeygenType {
    #[default]
    Asgard,
    Yggdrasil,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keygen {
    pub id: String,
    pub keygen_type: KeygenType,
    pub members: Vec<PubKey>,
}

impl Keygen {
    /// Deterministic id of a keygen at `height` over `members`.
    pub fn new(height: i64, mut members: Vec<PubKey>, keygen_type: KeygenType) -> Self {
        members.sort();
        let joined = members
            .iter()
            .map(PubKey::as_str)
            .collect::<Vec<_>>()
            .join("");
        let id = thornode_common::TxId::from_bytes(format!("{height}{joined}").as_bytes());
        Self {
            id: id.to_string(),
            keygen_type,
            members,
        }
    }
}

/// Keygens requested at one block height.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeygenBlock {
    pub height: i64,
    pub keygens: Vec<Keygen>,
}

impl KeygenBlock {
    pub fn new(height: i64) -> Self {
        Self {
            height,
            keygens: Vec::new(),
        }
    }

    pub fn contains(&self, keygen: &Keygen) -> bool {
        self.keygens.iter().any(|k| k.id == keygen.id)
    }

    pub fn is_empty(&self) -> bool {
        self.keygens.is_empty()
    }
}

/// A node blamed by a failed TSS round.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlameNode {
    pub pubkey: PubKey,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blame {
    pub fail_reason: String,
    pub round: String,
    pub is_unicast: bool,
    pub blame_nodes: Vec<BlameNode>,
}

/// Final keysign round; a failure here may have leaked a partial signature.
pub const KEYSIGN_ROUND_7: &str = "SignRound7Message";

impl Blame {
    pub fn is_empty(&self) -> bool {
        self.fail_reason.is_empty()
    }

    pub fn is_round7(&self) -> bool {
        self.round == KEYSIGN_ROUND_7
    }

    pub fn pub_keys(&self) -> Vec<PubKey> {
        self.blame_nodes.iter().map(|n| n.pubkey.clone()).collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThorNameAlias {
    pub chain: Chain,
    pub address: Address,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThorName {
    pub name: String,
    pub expire_block_height: i64,
    pub owner: AccAddress,
    pub preferred_asset: Option<Asset>,
    pub aliases: Vec<ThorNameAlias>,
}

impl ThorName {
    pub fn new(name: String, expire_block_height: i64, aliases: Vec<ThorNameAlias>) -> Self {
        Self {
            name,
            expire_block_height,
            aliases,
            ..Self::default()
        }
    }

    pub fn is_expired(&self, height: i64) -> bool {
        self.expire_block_height < height
    }

    pub fn get_alias(&self, chain: Chain) -> Option<&Address> {
        self.aliases
            .iter()
            .find(|a| a.chain == chain)
            .map(|a| &a.address)
    }

    pub fn set_alias(&mut self, chain: Chain, address: Address) {
        match self.aliases.iter_mut().find(|a| a.chain == chain) {
            Some(alias) => alias.address = address,
            None => self.aliases.push(ThorNameAlias { chain, address }),
        }
    }
}

/// Valid names are 1 to 30 characters of alphanumerics, `-`, `_` or `+`.
pub fn is_valid_thorname(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 30
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+'))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveContributor {
    pub address: Address,
    pub amount: Uint,
}

/// Where the ragnarok liquidity withdrawal left off.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RagnarokWithdrawPosition {
    /// Providers already processed in `pool`.
    pub number: u64,
    pub pool: Option<Asset>,
}

impl RagnarokWithdrawPosition {
    pub fn is_empty(&self) -> bool {
        self.number == 0 && self.pool.is_none()
    }
}
