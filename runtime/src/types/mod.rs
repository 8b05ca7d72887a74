//! Records kept in the store.

mod liquidity;
mod network;
mod node_account;
mod observed_tx;
mod pool;
mod tx_out;
mod vault;
mod voters;

pub use {
    liquidity::{LiquidityProvider, Loan},
    network::{
        is_valid_thorname, Blame, BlameNode, Keygen, KeygenBlock, KeygenType, Network, NetworkFee,
        RagnarokWithdrawPosition, ReserveContributor, ThorName, ThorNameAlias, KEYSIGN_ROUND_7,
    },
    node_account::{
        is_node_keys, node_by_pub_key, BondProvider, BondProviders, Jail, NodeAccount,
        NodeAccounts, NodeStatus,
    },
    observed_tx::{ObservedTx, ObservedTxStatus, ObservedTxVoter, VoterState},
    pool::{Pool, PoolStatus},
    tx_out::{TxOut, TxOutItem},
    vault::{ChainContract, Vault, VaultStatus, VaultType, Vaults},
    voters::{
        BanVoter, ErrataTxVoter, ObservedNetworkFeeVoter, SolvencyVoter, TssKeysignFailVoter,
        TssVoter,
    },
};
