//! Transaction memo grammar.
//!
//! Every inbound observation carries a memo whose first colon-separated
//! field selects the intent. [`parse_memo`] turns the raw string into a
//! [`Memo`] using the grammar active at a given version, and the
//! [`Display`](std::fmt::Display) impl renders the shortest memo that parses
//! back to the same value.

mod error;
mod lookup;
mod memo;
mod parser;
mod tokenlist;
mod tx_type;

pub use crate::{
    error::{MemoError, Result},
    lookup::{
        external_asset_match, fetch_address, fuzzy_asset_match, parse_affiliate_basis_points,
        MemoLookup, NoLookup,
    },
    memo::{
        AddLiquidityMemo, BondMemo, LoanOpenMemo, LoanRepaymentMemo, ManageThorNameMemo, Memo,
        OrderType, SwapMemo, UnbondMemo, WithdrawLiquidityMemo,
    },
    parser::{parse_memo, parse_trade_target},
    tokenlist::evm_token_addresses,
    tx_type::TxType,
};
