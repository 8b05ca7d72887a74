//! The THORNode settlement engine.
//!
//! Validators observe transactions on external chains and submit them as
//! messages. Once enough of them agree, the engine acts on the memo of the
//! inbound: swaps, liquidity, bonds, loans and names. Every outbound it
//! owes is queued in the tx-out store for a vault to sign, and the
//! observation of that signed outbound closes the loop. Vaults rotate
//! through churns, and ragnarok returns all funds when the network winds
//! down.
//!
//! All state lives in a layered key-value store behind [`keeper::Keeper`].
//! Handlers are selected by message kind and by the active version, so a
//! past block replays exactly as it first ran.

pub mod ante;
pub mod block;
pub mod context;
pub mod error;
pub mod events;
pub mod handlers;
pub mod invariants;
pub mod keeper;
pub mod managers;
pub mod msgs;
pub mod querier;
pub mod store;
pub mod types;
pub mod versioned;

#[cfg(any(test, feature = "dev-context-only-utils"))]
pub mod test_utils;

pub use {
    block::Engine,
    context::{CallScope, Context},
    error::{Result, RuntimeError},
    events::Event,
    keeper::Keeper,
    managers::Managers,
    msgs::{Msg, MsgType, NativeTx},
};
