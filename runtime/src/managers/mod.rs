//! Services handlers call into. Each concern sits behind its own narrow
//! trait so a handler only touches the ones it needs, and tests can swap a
//! single service without rebuilding the rest.
//!
//! None of the default implementations keep state of their own; everything
//! they track lives in the store behind [`Context::keeper`].

mod events;
mod gas;
mod network;
mod slasher;
mod swap_queue;
mod tx_out_store;
mod validator;
mod yggdrasil;

pub use {
    events::DefaultEventManager,
    gas::{calc_outbound_fee_multiplier, DefaultGasManager},
    network::DefaultNetworkManager,
    slasher::DefaultSlasher,
    swap_queue::{swap_one, DefaultSwapQueue, SwapResult},
    tx_out_store::DefaultTxOutStore,
    validator::{next_vault_node_accounts, node_account_preflight_check, DefaultValidatorManager},
    yggdrasil::{calc_target_ygg_coins, DefaultYggManager},
};

pub(crate) use tx_out_store::sort_by_security;

use {
    crate::{
        context::Context,
        error::Result,
        events::Event,
        msgs::MsgSwap,
        types::{NodeAccount, TxOutItem, Vault},
    },
    thornode_common::{AccAddress, Asset, Chain, Coin, Coins, PubKey, Uint},
};

/// Queues outbounds and picks the vaults that sign them.
pub trait TxOutStore {
    /// Prepare `item` and queue it. Fails when the value left after fees
    /// is below `min_out`.
    fn try_add_tx_out_item(
        &self,
        ctx: &mut Context,
        mgr: &Managers,
        item: TxOutItem,
        min_out: Uint,
    ) -> Result<bool>;

    /// Queue `item` at `height` as is.
    fn unsafe_add_tx_out_item(&self, ctx: &mut Context, mgr: &Managers, item: TxOutItem, height: i64) -> Result<()>;

    /// Outbounds queued for the current block.
    fn get_outbound_items(&self, ctx: &Context) -> Result<Vec<TxOutItem>>;

    fn calc_tx_out_height(&self, ctx: &Context, item: &TxOutItem) -> Result<i64>;

    fn end_block(&self, ctx: &mut Context, mgr: &Managers) -> Result<()>;
}

/// Tracks gas spent by outbounds and prices outbound fees.
pub trait GasManager {
    fn begin_block(&self, ctx: &mut Context) -> Result<()>;

    /// Record gas paid by vaults in this block.
    fn add_gas_asset(&self, ctx: &mut Context, gas: &Coins, increase_count: bool) -> Result<()>;

    /// Outbound fee on `chain` expressed in `asset`.
    fn get_fee(&self, ctx: &Context, chain: Chain, asset: &Asset) -> Result<Uint>;

    fn get_max_gas(&self, ctx: &Context, chain: Chain) -> Result<Coin>;

    fn get_gas_rate(&self, ctx: &Context, chain: Chain) -> Result<i64>;

    /// Reimburse pools for the gas recorded this block.
    fn end_block(&self, ctx: &mut Context, mgr: &Managers) -> Result<()>;
}

/// Bond slashing and slash point bookkeeping.
pub trait Slasher {
    fn begin_block(&self, ctx: &mut Context, mgr: &Managers) -> Result<()>;

    /// Slash the owners of `vault_pk` for `coins` that left the vault
    /// without a matching outbound.
    fn slash_vault(&self, ctx: &mut Context, mgr: &Managers, vault_pk: &PubKey, coins: &Coins) -> Result<()>;

    fn inc_slash_points(&self, ctx: &mut Context, points: i64, addrs: &[AccAddress], reason: &str) -> Result<()>;

    fn dec_slash_points(&self, ctx: &mut Context, points: i64, addrs: &[AccAddress]) -> Result<()>;

    fn lack_observing(&self, ctx: &mut Context) -> Result<()>;

    fn lack_signing(&self, ctx: &mut Context, mgr: &Managers) -> Result<()>;

    fn handle_double_sign(&self, ctx: &mut Context, node: &AccAddress, infraction_height: i64) -> Result<()>;
}

/// Decides churns and moves nodes between statuses.
pub trait ValidatorManager {
    fn begin_block(&self, ctx: &mut Context, mgr: &Managers) -> Result<()>;

    fn end_block(&self, ctx: &mut Context, mgr: &Managers) -> Result<()>;

    /// Ask the yggdrasil vault of `node` to return its funds.
    fn request_ygg_return(&self, ctx: &mut Context, mgr: &Managers, node: &NodeAccount) -> Result<()>;
}

/// Vault rotation, fund migration and ragnarok.
pub trait NetworkManager {
    fn trigger_keygen(&self, ctx: &mut Context, nodes: &[NodeAccount]) -> Result<()>;

    fn rotate_vault(&self, ctx: &mut Context, vault: Vault) -> Result<()>;

    /// Withdraw liquidity providers for the current ragnarok iteration and,
    /// once the pools are drained, repay reserve contributors.
    fn ragnarok(&self, ctx: &mut Context, mgr: &Managers) -> Result<()>;

    fn end_block(&self, ctx: &mut Context, mgr: &Managers) -> Result<()>;
}

pub trait SwapQueue {
    fn add_swap(&self, ctx: &mut Context, msg: &MsgSwap) -> Result<()>;

    fn end_block(&self, ctx: &mut Context, mgr: &Managers) -> Result<()>;
}

/// Keeps yggdrasil vaults topped up from asgard.
pub trait YggManager {
    /// Fund the yggdrasil of one active node per block and slash nodes that
    /// left with funds still in theirs.
    fn fund(&self, ctx: &mut Context, mgr: &Managers) -> Result<()>;
}

pub trait EventManager {
    fn emit(&self, ctx: &mut Context, event: Event);
}

pub struct Managers {
    pub tx_out_store: Box<dyn TxOutStore>,
    pub gas: Box<dyn GasManager>,
    pub slasher: Box<dyn Slasher>,
    pub validators: Box<dyn ValidatorManager>,
    pub network: Box<dyn NetworkManager>,
    pub swap_queue: Box<dyn SwapQueue>,
    pub events: Box<dyn EventManager>,
    pub ygg: Box<dyn YggManager>,
}

impl Default for Managers {
    fn default() -> Self {
        Self {
            tx_out_store: Box::new(DefaultTxOutStore),
            gas: Box::new(DefaultGasManager),
            slasher: Box::new(DefaultSlasher),
            validators: Box::new(DefaultValidatorManager),
            network: Box::new(DefaultNetworkManager),
            swap_queue: Box::new(DefaultSwapQueue),
            events: Box::new(DefaultEventManager),
            ygg: Box::new(DefaultYggManager),
        }
    }
}

impl std::fmt::Debug for Managers {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Managers").finish_non_exhaustive()
    }
}
