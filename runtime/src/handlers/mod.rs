//! Message dispatch.
//!
//! Every message kind is registered with a [`HandlerTable`]: a validate and
//! a handle table of [`VersionBranch`]es, newest first. Dispatch picks the
//! newest branch the active version meets, so replaying an old block runs
//! the code that was in force when it was produced.
//!
//! External messages come from signed transactions. Internal messages are
//! built by the engine itself, mostly from the memo of a finalised inbound.
//! Both run inside a cache layer: a failure leaves no writes and no events.

mod ban;
mod bond;
mod deposit;
mod errata;
mod liquidity;
mod loan;
mod mimir;
mod network_fee;
mod node;
mod noop;
mod observed_tx;
mod outbound;
mod reserve;
mod solvency;
mod swap;
mod switch;
mod thorname;
mod tss;

pub use {
    liquidity::{calc_liquidity_units, calc_withdraw},
    observed_tx::preflight,
    swap::swap,
};

use {
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        events::Event,
        keeper::{ASGARD_NAME, RESERVE_NAME, THORCHAIN_NAME},
        managers::Managers,
        msgs::*,
        types::{ObservedTx, ReserveContributor, TxOutItem},
        versioned::{select, VersionBranch},
    },
    log::*,
    std::panic::{self, AssertUnwindSafe},
    thornode_common::{AccAddress, Asset, Coin, Coins, Fee},
    thornode_memo::{parse_memo, Memo},
};

pub(crate) type HandlerFn = fn(&mut Context, &Managers, &Msg) -> Result<()>;

/// Versioned validate and handle branches of one message kind.
pub(crate) struct HandlerTable {
    pub validate: &'static [VersionBranch<HandlerFn>],
    pub handle: &'static [VersionBranch<HandlerFn>],
}

/// Message routed to a handler registered for another kind.
pub(crate) fn wrong_msg(msg: &Msg) -> RuntimeError {
    RuntimeError::InvalidMessage(format!("unexpected message {}", msg.msg_type()))
}

/// Table of a single branch that accepts anything, for kinds whose checks
/// all live in `validate_basic`.
pub(crate) fn no_validation(_ctx: &mut Context, _mgr: &Managers, _msg: &Msg) -> Result<()> {
    Ok(())
}

pub(crate) static NO_VALIDATION: &[VersionBranch<HandlerFn>] = &[VersionBranch {
    since: (0, 1, 0),
    name: "any",
    entrypoint: no_validation,
}];

fn external_table(msg_type: MsgType) -> Option<&'static HandlerTable> {
    let table = match msg_type {
        MsgType::ObservedTxIn => &observed_tx::TX_IN,
        MsgType::ObservedTxOut => &outbound::TX_OUT,
        MsgType::TssPool => &tss::TSS_POOL,
        MsgType::TssKeysignFail => &tss::KEYSIGN_FAIL,
        MsgType::ErrataTx => &errata::ERRATA,
        MsgType::Solvency => &solvency::SOLVENCY,
        MsgType::Ban => &ban::BAN,
        MsgType::NetworkFee => &network_fee::NETWORK_FEE,
        MsgType::Mimir => &mimir::MIMIR,
        MsgType::NodePauseChain => &node::PAUSE_CHAIN,
        MsgType::SetNodeKeys => &node::SET_NODE_KEYS,
        MsgType::SetVersion => &node::SET_VERSION,
        MsgType::SetIpAddress => &node::SET_IP_ADDRESS,
        MsgType::Deposit => &deposit::DEPOSIT,
        MsgType::Send => &deposit::SEND,
        _ => return None,
    };
    Some(table)
}

fn internal_table(msg_type: MsgType) -> Option<&'static HandlerTable> {
    let table = match msg_type {
        MsgType::OutboundTx => &outbound::OUTBOUND,
        MsgType::RefundTx => &outbound::REFUND,
        MsgType::Migrate => &outbound::MIGRATE,
        MsgType::Ragnarok => &outbound::RAGNAROK,
        MsgType::Yggdrasil => &outbound::YGGDRASIL,
        MsgType::Consolidate => &outbound::CONSOLIDATE,
        MsgType::Swap => &swap::SWAP,
        MsgType::AddLiquidity => &liquidity::ADD_LIQUIDITY,
        MsgType::WithdrawLiquidity => &liquidity::WITHDRAW_LIQUIDITY,
        MsgType::Donate => &liquidity::DONATE,
        MsgType::LoanOpen => &loan::LOAN_OPEN,
        MsgType::LoanRepayment => &loan::LOAN_REPAYMENT,
        MsgType::Bond => &bond::BOND,
        MsgType::Unbond => &bond::UNBOND,
        MsgType::Leave => &bond::LEAVE,
        MsgType::ReserveContributor => &reserve::RESERVE_CONTRIBUTOR,
        MsgType::Switch => &switch::SWITCH,
        MsgType::NoOp => &noop::NOOP,
        MsgType::ManageThorName => &thorname::MANAGE_THORNAME,
        _ => return None,
    };
    Some(table)
}

fn run(table: &HandlerTable, ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    msg.validate_basic()?;
    let validate = select(table.validate, ctx.version())?;
    (validate.entrypoint)(ctx, mgr, msg)?;
    let handle = select(table.handle, ctx.version())?;
    debug!("handling {} with branch {}", msg.msg_type(), handle.name);
    (handle.entrypoint)(ctx, mgr, msg)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Dispatch a message submitted in a transaction. A panicking handler is
/// recovered and its writes dropped.
pub fn external_handler(ctx: &mut Context, mgr: &Managers, msg: Msg) -> Result<()> {
    let Some(table) = external_table(msg.msg_type()) else {
        return Err(RuntimeError::UnknownRequest(format!(
            "unrecognized message type: {}",
            msg.msg_type()
        )));
    };
    let depth = ctx.keeper.store().depth();
    let scope = ctx.scope.clone();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        ctx.with_cache(|ctx| run(table, ctx, mgr, &msg))
    }));
    match result {
        Ok(result) => {
            if let Err(err) = &result {
                warn!("fail to process {}: {}", msg.msg_type(), err);
            }
            result
        }
        Err(payload) => {
            ctx.keeper.store_mut().rollback_to(depth);
            ctx.scope = scope;
            let reason = panic_message(payload.as_ref());
            error!("handler for {} panicked: {}", msg.msg_type(), reason);
            Err(RuntimeError::Panic(reason))
        }
    }
}

/// Dispatch a message built by the engine.
pub fn internal_handler(ctx: &mut Context, mgr: &Managers, msg: Msg) -> Result<()> {
    let Some(table) = internal_table(msg.msg_type()) else {
        return Err(RuntimeError::UnknownRequest(format!(
            "unrecognized internal message type: {}",
            msg.msg_type()
        )));
    };
    ctx.with_cache(|ctx| run(table, ctx, mgr, &msg))
}

/// Translate the memo of a finalised inbound into the internal message it
/// asks for.
pub fn process_one_tx_in(ctx: &Context, tx: &ObservedTx, signer: &AccAddress) -> Result<Msg> {
    let memo = parse_memo(ctx.version(), &ctx.keeper, &tx.tx.memo)?;
    msg_from_memo(memo, tx, signer)
}

pub(crate) fn msg_from_memo(memo: Memo, tx: &ObservedTx, signer: &AccAddress) -> Result<Msg> {
    let inbound = &tx.tx;
    let first_coin = || {
        inbound
            .coins
            .iter()
            .next()
            .cloned()
            .ok_or_else(|| RuntimeError::InvalidMemo("inbound carries no coin".to_string()))
    };
    let signer = signer.clone();
    let msg = match memo {
        Memo::AddLiquidity(m) => {
            let (rune_address, asset_address) = if inbound.from_address.is_chain(thornode_common::Chain::THOR) {
                (inbound.from_address.clone(), m.address)
            } else {
                (m.address, inbound.from_address.clone())
            };
            Msg::AddLiquidity(MsgAddLiquidity {
                tx: inbound.clone(),
                rune_amount: inbound.coins.amount_of(&Asset::rune()),
                asset_amount: inbound.coins.amount_of(&m.asset),
                asset: m.asset,
                rune_address,
                asset_address,
                affiliate_address: m.affiliate_address,
                affiliate_basis_points: m.affiliate_basis_points,
                signer,
            })
        }
        Memo::WithdrawLiquidity(m) => Msg::WithdrawLiquidity(MsgWithdrawLiquidity {
            tx: inbound.clone(),
            withdraw_address: inbound.from_address.clone(),
            basis_points: m.basis_points,
            asset: m.asset,
            withdrawal_asset: m.withdrawal_asset,
            signer,
        }),
        Memo::Swap(m) => {
            let destination = if m.destination.is_empty() {
                inbound.from_address.clone()
            } else {
                m.destination
            };
            Msg::Swap(MsgSwap {
                tx: inbound.clone(),
                target_asset: m.asset,
                destination,
                trade_target: m.slip_limit,
                affiliate_address: m.affiliate_address,
                affiliate_basis_points: m.affiliate_basis_points,
                aggregator: m.dex_aggregator,
                aggregator_target_address: m.dex_target_address,
                aggregator_target_limit: m.dex_target_limit,
                order_type: m.order_type,
                signer,
            })
        }
        Memo::Donate { asset } => Msg::Donate(MsgDonate {
            tx: inbound.clone(),
            asset_amount: inbound.coins.amount_of(&asset),
            rune_amount: inbound.coins.amount_of(&Asset::rune()),
            asset,
            signer,
        }),
        Memo::Bond(m) => Msg::Bond(MsgBond {
            tx_in: inbound.clone(),
            node_address: m.node_address,
            bond: inbound.coins.amount_of(&Asset::rune()),
            bond_address: inbound.from_address.clone(),
            bond_provider_address: m.bond_provider_address,
            operator_fee: m.node_operator_fee,
            signer,
        }),
        Memo::Unbond(m) => Msg::Unbond(MsgUnbond {
            tx_in: inbound.clone(),
            node_address: m.node_address,
            amount: m.amount,
            bond_address: inbound.from_address.clone(),
            bond_provider_address: m.bond_provider_address,
            signer,
        }),
        Memo::Leave { node_address } => Msg::Leave(MsgLeave {
            tx: inbound.clone(),
            node_address,
            signer,
        }),
        Memo::Outbound { tx_id } => Msg::OutboundTx(MsgOutboundTx {
            tx: tx.clone(),
            in_tx_id: tx_id,
            signer,
        }),
        Memo::Refund { tx_id } => Msg::RefundTx(MsgRefundTx {
            tx: tx.clone(),
            in_tx_id: tx_id,
            signer,
        }),
        Memo::Migrate { block_height } => Msg::Migrate(MsgMigrate {
            tx: tx.clone(),
            block_height,
            signer,
        }),
        Memo::Ragnarok { block_height } => Msg::Ragnarok(MsgRagnarok {
            tx: tx.clone(),
            block_height,
            signer,
        }),
        Memo::YggdrasilFund { block_height } => Msg::Yggdrasil(MsgYggdrasil {
            tx: inbound.clone(),
            pub_key: tx.observed_pub_key.clone(),
            add_funds: true,
            coins: inbound.coins.clone(),
            block_height,
            signer,
        }),
        Memo::YggdrasilReturn { block_height } => Msg::Yggdrasil(MsgYggdrasil {
            tx: inbound.clone(),
            pub_key: tx.observed_pub_key.clone(),
            add_funds: false,
            coins: inbound.coins.clone(),
            block_height,
            signer,
        }),
        Memo::Reserve => Msg::ReserveContributor(MsgReserveContributor {
            tx: inbound.clone(),
            contributor: ReserveContributor {
                address: inbound.from_address.clone(),
                amount: inbound.coins.amount_of(&Asset::rune()),
            },
            signer,
        }),
        Memo::Switch { destination } => Msg::Switch(MsgSwitch {
            tx: inbound.clone(),
            destination: destination.acc_address()?,
            signer,
        }),
        Memo::NoOp { action } => Msg::NoOp(MsgNoOp {
            observed_tx: tx.clone(),
            action,
            signer,
        }),
        Memo::Consolidate => Msg::Consolidate(MsgConsolidate {
            observed_tx: tx.clone(),
            signer,
        }),
        Memo::ManageThorName(m) => Msg::ManageThorName(MsgManageThorName {
            name: m.name,
            chain: m.chain,
            address: m.address,
            coin: first_coin()?,
            expire_block_height: m.expire,
            preferred_asset: m.preferred_asset,
            owner: m.owner,
            signer,
        }),
        Memo::LoanOpen(m) => {
            let coin = first_coin()?;
            Msg::LoanOpen(MsgLoanOpen {
                owner: inbound.from_address.clone(),
                collateral_asset: coin.asset,
                collateral_amount: coin.amount,
                target_address: m.target_address,
                target_asset: m.target_asset,
                min_out: m.min_out,
                affiliate_address: m.affiliate_address,
                affiliate_basis_points: m.affiliate_basis_points,
                aggregator: m.dex_aggregator,
                aggregator_target_address: m.dex_target_address,
                aggregator_target_limit: m.dex_target_limit,
                tx_id: inbound.id.clone(),
                signer,
            })
        }
        Memo::LoanRepayment(m) => Msg::LoanRepayment(MsgLoanRepayment {
            owner: m.owner,
            collateral_asset: m.asset,
            coin: first_coin()?,
            min_out: m.min_out,
            from: inbound.from_address.clone(),
            tx_id: inbound.id.clone(),
            signer,
        }),
    };
    Ok(msg)
}

/// Send the coins of `tx` back to where they came from. Coins that cannot
/// pay their own outbound fee are kept: external coins go to their pool,
/// native coins other than rune are burnt, rune goes to the reserve.
pub fn refund_tx(
    ctx: &mut Context,
    mgr: &Managers,
    tx: &ObservedTx,
    code: u32,
    reason: &str,
    source_module: &str,
) -> Result<()> {
    let mut reason = reason.to_string();
    let mut refunded = Coins::default();
    let source_module = if source_module.is_empty() {
        ASGARD_NAME
    } else {
        source_module
    };
    for coin in tx.tx.coins.iter() {
        let mut pool = ctx.keeper.get_pool(&coin.asset.layer1_asset())?;
        if !coin.asset.is_native_rune() && pool.balance_rune == 0 {
            // nothing to price a fee against
            continue;
        }
        let mut item = TxOutItem::new(
            coin.asset.get_chain(),
            tx.tx.from_address.clone(),
            coin.clone(),
            tx.tx.id.clone(),
        )
        .with_memo(Memo::Refund { tx_id: tx.tx.id.clone() }.to_string())
        .with_vault(tx.observed_pub_key.clone());
        item.module_name = source_module.to_string();

        match mgr.tx_out_store.try_add_tx_out_item(ctx, mgr, item, 0) {
            Ok(true) => refunded.add(coin),
            Ok(false) => {}
            Err(err) => {
                warn!("fail to refund {}: {}", coin, err);
                reason = format!("{reason}; fail to refund ({coin}): {err}");
                if !coin.asset.is_native() {
                    pool.balance_asset = pool.balance_asset.saturating_add(coin.amount);
                    ctx.keeper.set_pool(&pool)?;
                    mgr.events.emit(
                        ctx,
                        Event::Donate {
                            pool: pool.asset.clone(),
                            in_tx: tx.tx.clone(),
                        },
                    );
                } else if !coin.asset.is_native_rune() {
                    burn_failed_refund(ctx, source_module, coin)?;
                } else if source_module != RESERVE_NAME {
                    let coins = Coins::new(vec![coin.clone()]);
                    ctx.keeper
                        .send_from_module_to_module(source_module, RESERVE_NAME, &coins)?;
                    mgr.events.emit(
                        ctx,
                        Event::ReserveContribution {
                            contributor: tx.tx.from_address.clone(),
                            amount: coin.amount,
                            in_tx: tx.tx.clone(),
                        },
                    );
                }
            }
        }
    }
    mgr.events.emit(
        ctx,
        Event::Refund {
            code,
            reason,
            tx: tx.tx.clone(),
            fee: Fee::default(),
        },
    );
    debug!("refunded {} of {}", refunded, tx.tx.id);
    Ok(())
}

fn burn_failed_refund(ctx: &mut Context, source_module: &str, coin: &Coin) -> Result<()> {
    let coins = Coins::new(vec![coin.clone()]);
    if source_module != THORCHAIN_NAME {
        ctx.keeper
            .send_from_module_to_module(source_module, THORCHAIN_NAME, &coins)?;
    }
    ctx.keeper.burn_from_module(THORCHAIN_NAME, coin, "failed_refund")
}

/// Whether `signer` is an active validator.
pub(crate) fn is_active_signer(ctx: &Context, signer: &AccAddress) -> Result<bool> {
    Ok(ctx
        .keeper
        .get_node_account(signer)?
        .map(|n| n.is_active())
        .unwrap_or_default())
}

/// Reject `signer` unless it is an active validator.
pub(crate) fn require_active_signer(ctx: &Context, signer: &AccAddress) -> Result<()> {
    if !is_active_signer(ctx, signer)? {
        return Err(RuntimeError::Unauthorized(format!("{signer} is not an active validator")));
    }
    Ok(())
}
