//! Swaps dequeued by the swap queue.
//!
//! A swap between two external assets runs as two hops through rune. The
//! output is scheduled as an outbound to the destination, or minted in
//! place when the target is a native synth or derived asset.

use {
    super::{wrong_msg, HandlerFn, HandlerTable},
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        events::Event,
        keeper::{ASGARD_NAME, THORCHAIN_NAME},
        managers::{swap_one, Managers, SwapResult},
        msgs::{Msg, MsgSwap},
        types::TxOutItem,
        versioned::VersionBranch,
    },
    log::*,
    thornode_common::{math::get_safe_share, Address, Asset, Chain, Coin, Coins, Tx, TxId, Uint, MAX_BASIS_POINTS},
    thornode_constants::ConstantName,
    thornode_memo::OrderType,
};

pub(super) static SWAP: HandlerTable = HandlerTable {
    validate: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: validate_v1 as HandlerFn,
    }],
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_v1 as HandlerFn,
    }],
};

fn validate_v1(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::Swap(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    validate_swap(ctx, msg)
}

fn validate_swap(ctx: &Context, msg: &MsgSwap) -> Result<()> {
    let target = &msg.target_asset;
    let Some(source) = msg.tx.coins.iter().next().map(|c| c.asset.clone()) else {
        return Err(RuntimeError::UnknownRequest("swap carries no coin".to_string()));
    };
    if source == *target {
        return Err(RuntimeError::UnknownRequest(format!("swap from {source} to itself")));
    }
    for chain in [source.get_chain(), target.get_chain()] {
        if ctx.is_trading_halted(chain)? {
            return Err(RuntimeError::Unauthorized(format!("trading is halted on {chain}")));
        }
    }
    if target.is_derived() && ctx.config_i64(ConstantName::EnableDerivedAssets)? == 0 {
        return Err(RuntimeError::UnknownRequest(format!("derived asset {target} is not enabled")));
    }
    if target.is_rune() && !target.is_native_rune() {
        return Err(RuntimeError::UnknownRequest("swaps only pay out native rune".to_string()));
    }
    if !msg.destination.is_noop() && !msg.destination.is_chain(target.get_chain()) {
        return Err(RuntimeError::UnknownRequest(format!(
            "destination {} is not on {}",
            msg.destination,
            target.get_chain()
        )));
    }
    if msg.affiliate_basis_points > 0 && !msg.affiliate_address.is_chain(Chain::THOR) {
        return Err(RuntimeError::UnknownRequest(
            "affiliate address must be a native address".to_string(),
        ));
    }
    let max_affiliate = ctx.config_i64(ConstantName::MaxAffiliateFeeBasisPoints)?.max(0) as Uint;
    if msg.affiliate_basis_points > max_affiliate {
        return Err(RuntimeError::UnknownRequest(format!(
            "affiliate fee {} above maximum {}",
            msg.affiliate_basis_points, max_affiliate
        )));
    }
    if !msg.aggregator.is_empty() && !target.get_chain().is_evm() {
        return Err(RuntimeError::UnknownRequest(format!(
            "aggregator {} needs an evm target",
            msg.aggregator
        )));
    }
    Ok(())
}

fn handle_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::Swap(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    let mut msg = msg.clone();
    take_affiliate_fee(ctx, mgr, &mut msg)?;
    swap(ctx, mgr, &msg).map(|_| ())
}

/// Split the affiliate share off the input and swap it to rune for the
/// affiliate.
fn take_affiliate_fee(ctx: &mut Context, mgr: &Managers, msg: &mut MsgSwap) -> Result<()> {
    if msg.affiliate_basis_points == 0 || msg.affiliate_address.is_empty() {
        return Ok(());
    }
    let Some(coin) = msg.tx.coins.iter().next().cloned() else {
        return Ok(());
    };
    let fee = get_safe_share(msg.affiliate_basis_points, MAX_BASIS_POINTS, coin.amount);
    if fee == 0 {
        return Ok(());
    }
    msg.tx.coins = Coins::new(vec![Coin::new(coin.asset.clone(), coin.amount - fee)]);

    let fee_coin = Coin::new(coin.asset.clone(), fee);
    if coin.asset.is_native_rune() {
        let item = TxOutItem::new(Chain::THOR, msg.affiliate_address.clone(), fee_coin, msg.tx.id.clone());
        if let Err(err) = mgr.tx_out_store.try_add_tx_out_item(ctx, mgr, item, 0) {
            warn!("fail to pay affiliate fee of {}: {}", msg.tx.id, err);
        }
        return Ok(());
    }
    let mut tx = msg.tx.clone();
    tx.coins = Coins::new(vec![fee_coin]);
    let affiliate = MsgSwap {
        tx,
        target_asset: Asset::rune(),
        destination: msg.affiliate_address.clone(),
        trade_target: 0,
        affiliate_address: Address::default(),
        affiliate_basis_points: 0,
        aggregator: String::new(),
        aggregator_target_address: String::new(),
        aggregator_target_limit: None,
        order_type: OrderType::Market,
        signer: msg.signer.clone(),
    };
    // a fee too small to pay its own outbound stays in the pool
    if let Err(err) = ctx.with_cache(|ctx| swap(ctx, mgr, &affiliate)) {
        info!("affiliate fee of {} not paid: {}", msg.tx.id, err);
    }
    Ok(())
}

/// Run `msg` through the pools and pay out the result. Returns the amount
/// emitted to the destination before outbound fees.
pub fn swap(ctx: &mut Context, mgr: &Managers, msg: &MsgSwap) -> Result<Uint> {
    let target = &msg.target_asset;
    let coin = msg
        .tx
        .coins
        .iter()
        .next()
        .cloned()
        .ok_or_else(|| RuntimeError::InvalidMessage("swap carries no coin".to_string()))?;
    let fee = mgr.gas.get_fee(ctx, target.get_chain(), &Asset::rune())?;

    let mut hops: Vec<SwapResult> = Vec::with_capacity(2);
    let mut tx = msg.tx.clone();
    if !coin.asset.is_rune() && !target.is_rune() {
        let first = swap_one(ctx, &tx, &Asset::rune(), fee)?;
        // the rune leg never leaves the engine
        mgr.events.emit(
            ctx,
            Event::Outbound {
                in_tx_id: msg.tx.id.clone(),
                tx: Tx::new(
                    TxId::blank(),
                    msg.tx.from_address.clone(),
                    msg.tx.to_address.clone(),
                    Coins::new(vec![first.emit_asset.clone()]),
                    Coins::default(),
                    msg.tx.memo.clone(),
                ),
            },
        );
        tx.coins = Coins::new(vec![first.emit_asset.clone()]);
        hops.push(first);
    }
    hops.push(swap_one(ctx, &tx, target, fee)?);

    let Some(last) = hops.last() else {
        return Err(RuntimeError::internal("swap", "no swap was made"));
    };
    let emit = last.emit_asset.clone();
    if emit.amount < msg.trade_target {
        return Err(RuntimeError::UnknownRequest(format!(
            "emit asset {} less than price limit {}",
            emit.amount, msg.trade_target
        )));
    }
    if target.is_rune() && emit.amount <= fee {
        return Err(RuntimeError::NotEnoughToPayFee);
    }
    if emit.amount == 0 {
        return Err(RuntimeError::UnknownRequest("zero emit asset".to_string()));
    }

    let hop_count = hops.len();
    for (i, hop) in hops.iter().enumerate() {
        let swap_target = if i + 1 == hop_count { msg.trade_target } else { 0 };
        mgr.events.emit(
            ctx,
            Event::Swap {
                pool: hop.pool.clone(),
                swap_target,
                swap_slip: hop.swap_slip,
                liquidity_fee: hop.liquidity_fee,
                liquidity_fee_in_rune: hop.liquidity_fee_in_rune,
                in_tx: msg.tx.clone(),
                emit_asset: hop.emit_asset.clone(),
            },
        );
    }

    for burn in hops.iter().filter_map(|h| h.burn.as_ref()) {
        ctx.keeper
            .send_from_module_to_module(ASGARD_NAME, THORCHAIN_NAME, &Coins::new(vec![burn.clone()]))?;
        ctx.keeper.burn_from_module(THORCHAIN_NAME, burn, "swap")?;
    }

    if msg.destination.is_noop() {
        if target.is_synthetic() {
            ctx.keeper.mint_to_module(ASGARD_NAME, &emit, "swap")?;
        }
        debug!("swap {} paid {} to noop", msg.tx.id, emit);
        return Ok(emit.amount);
    }

    let mut item = TxOutItem::new(target.get_chain(), msg.destination.clone(), emit.clone(), msg.tx.id.clone());
    if target.get_chain().is_thor() && !target.is_rune() {
        item.module_name = THORCHAIN_NAME.to_string();
    }
    item.aggregator = msg.aggregator.clone();
    item.aggregator_target_asset = msg.aggregator_target_address.clone();
    item.aggregator_target_limit = msg.aggregator_target_limit;
    if !mgr
        .tx_out_store
        .try_add_tx_out_item(ctx, mgr, item, msg.trade_target)?
    {
        return Err(RuntimeError::FailAddOutboundTx(format!(
            "fail to schedule swap output of {}",
            msg.tx.id
        )));
    }
    info!("swapped {} into {} for {}", coin, emit, msg.destination);
    Ok(emit.amount)
}
