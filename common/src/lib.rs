//! Chain, asset and coin primitives shared by every THORNode crate.
//!
//! Amounts are plain `u128` values denominated in 1e8 units regardless of the
//! external chain's native precision; `Coin::decimals` only records the
//! precision outbound amounts must be rounded to before they are signed.

pub mod address;
pub mod asset;
pub mod chain;
pub mod coin;
pub mod error;
pub mod math;
pub mod pubkey;
pub mod tx;

pub use {
    address::{AccAddress, Address},
    asset::Asset,
    chain::{Chain, Chains},
    coin::{Coin, Coins, Fee, Gas},
    error::{CommonError, Result},
    pubkey::{PubKey, PubKeySet, PubKeys},
    tx::{Tx, TxId, TxIds, BLANK_TX_ID},
};

/// Amount type used for every balance, unit and share in the engine.
pub type Uint = u128;

/// Number of decimals every internal amount carries.
pub const DEFAULT_DECIMALS: i64 = 8;

/// One whole unit of an 8-decimal coin.
pub const ONE: Uint = 100_000_000;

/// Basis points in a whole.
pub const MAX_BASIS_POINTS: Uint = 10_000;
