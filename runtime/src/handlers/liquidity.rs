//! Liquidity provision: add, withdraw and donate.
//!
//! A symmetric add across two chains arrives as two inbounds. Whichever
//! side lands first is parked on the provider as pending liquidity and the
//! pool's pending inbound counters, and units are issued once both sides
//! are in.

use {
    super::{wrong_msg, HandlerFn, HandlerTable},
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        events::{Event, PendingLiquidityType},
        keeper::{ASGARD_NAME, RESERVE_NAME},
        managers::Managers,
        msgs::{Msg, MsgDonate, MsgWithdrawLiquidity},
        types::{LiquidityProvider, NodeAccount, Pool, PoolStatus, TxOutItem},
        versioned::VersionBranch,
    },
    log::*,
    thornode_common::{
        math::{big, get_safe_share, narrow, round_to_decimal, safe_sub},
        Address, Asset, Chain, Coin, Coins, Gas, TxId, Uint, MAX_BASIS_POINTS,
    },
    thornode_constants::ConstantName,
    thornode_memo::Memo,
};

pub(super) static ADD_LIQUIDITY: HandlerTable = HandlerTable {
    validate: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: validate_add_v1 as HandlerFn,
    }],
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_add_v1 as HandlerFn,
    }],
};

pub(super) static WITHDRAW_LIQUIDITY: HandlerTable = HandlerTable {
    validate: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: validate_withdraw_v1 as HandlerFn,
    }],
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_withdraw_v1 as HandlerFn,
    }],
};

pub(super) static DONATE: HandlerTable = HandlerTable {
    validate: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: validate_donate_v1 as HandlerFn,
    }],
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_donate_v1 as HandlerFn,
    }],
};

/// Units issued for adding `add_rune` and `add_asset` to a pool, as
/// `(new pool units, provider units)`:
///
/// `P * (r*A + a*R + 2*r*a) / (r*A + a*R + 2*R*A)`
///
/// An empty side of the pool issues units equal to the rune added.
#[allow(non_snake_case)]
pub fn calc_liquidity_units(
    old_units: Uint,
    pool_rune: Uint,
    pool_asset: Uint,
    add_rune: Uint,
    add_asset: Uint,
) -> Result<(Uint, Uint)> {
    if add_rune.saturating_add(pool_rune) == 0 {
        return Err(RuntimeError::UnknownRequest("total rune in the pool is zero".to_string()));
    }
    if add_asset.saturating_add(pool_asset) == 0 {
        return Err(RuntimeError::UnknownRequest("total asset in the pool is zero".to_string()));
    }
    if pool_rune == 0 || pool_asset == 0 {
        return Ok((add_rune, add_rune));
    }
    let (P, R, A, r, a) = (big(old_units), big(pool_rune), big(pool_asset), big(add_rune), big(add_asset));
    let cross = &r * &A + &a * &R;
    let numerator = &P * (&cross + big(2) * &r * &a);
    let denominator = &cross + big(2) * &A * &R;
    let units = narrow(&(numerator / denominator));
    Ok((old_units.saturating_add(units), units))
}

/// Share of depth `a` paid for burning `s` of `t` units on one side only:
/// `s * a * (2t^2 - 2ts + s^2) / t^3`.
pub fn calc_asym_withdrawal(s: Uint, t: Uint, a: Uint) -> Uint {
    if t == 0 {
        return 0;
    }
    let (s, t, a) = (big(s), big(t), big(a));
    let two = big(2);
    let inner = &two * &t * &t + &s * &s - &two * &t * &s;
    narrow(&(&s * &a * inner / (&t * &t * &t)))
}

/// Rune and asset paid for withdrawing `basis_points` of `lp_units`, and
/// the units the provider keeps. `withdrawal_asset` picks a single side.
pub fn calc_withdraw(
    pool_units: Uint,
    pool_rune: Uint,
    pool_asset: Uint,
    lp_units: Uint,
    basis_points: Uint,
    withdrawal_asset: Option<&Asset>,
) -> Result<(Uint, Uint, Uint)> {
    let fail = |reason: &str| Err(RuntimeError::UnknownRequest(reason.to_string()));
    if pool_units == 0 {
        return fail("pool units can't be zero");
    }
    if pool_rune == 0 {
        return fail("pool rune balance can't be zero");
    }
    if pool_asset == 0 {
        return fail("pool asset balance can't be zero");
    }
    if lp_units == 0 {
        return fail("liquidity provider unit can't be zero");
    }
    if basis_points > MAX_BASIS_POINTS {
        return fail("withdraw basis points above 10000");
    }
    let claim = get_safe_share(basis_points, MAX_BASIS_POINTS, lp_units);
    let after = safe_sub(lp_units, claim);
    Ok(match withdrawal_asset {
        None => (
            get_safe_share(claim, pool_units, pool_rune),
            get_safe_share(claim, pool_units, pool_asset),
            after,
        ),
        Some(asset) if asset.is_rune() => (calc_asym_withdrawal(claim, pool_units, pool_rune), 0, after),
        Some(_) => (0, calc_asym_withdrawal(claim, pool_units, pool_asset), after),
    })
}

/// Bond of the weakest two thirds of `nodes`, the most the network can
/// secure.
fn effective_security_bond(mut nodes: Vec<NodeAccount>) -> Uint {
    nodes.sort_by(|a, b| a.bond.cmp(&b.bond));
    let mut t = nodes.len() * 2 / 3;
    if nodes.len() % 3 == 0 {
        t = t.saturating_sub(1);
    }
    nodes.iter().take(t + 1).map(|n| n.bond).sum()
}

fn validate_add_v1(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::AddLiquidity(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    let asset = &msg.asset;
    if asset.is_synthetic() || asset.is_derived() {
        return Err(RuntimeError::UnknownRequest(format!("cannot add liquidity to {asset}")));
    }
    if ctx.mimir(&format!("RAGNAROK-{}", asset.mimir_string()))?.unwrap_or_default() > 0 {
        return Err(RuntimeError::UnknownRequest(format!("pool {asset} is in ragnarok")));
    }
    let gas_asset = asset.get_chain().gas_asset();
    if *asset != gas_asset && !ctx.keeper.pool_exists(&gas_asset) {
        return Err(RuntimeError::UnknownRequest(format!("gas pool {gas_asset} must exist first")));
    }
    if !msg.rune_address.is_empty() && !msg.rune_address.is_chain(Chain::THOR) {
        return Err(RuntimeError::UnknownRequest(format!(
            "rune address {} is not a native address",
            msg.rune_address
        )));
    }
    if !msg.asset_address.is_empty() && !msg.asset_address.is_chain(asset.get_chain()) {
        return Err(RuntimeError::UnknownRequest(format!(
            "asset address {} is not on {}",
            msg.asset_address,
            asset.get_chain()
        )));
    }
    if msg.affiliate_basis_points > 0 && !msg.affiliate_address.is_chain(Chain::THOR) {
        return Err(RuntimeError::UnknownRequest(
            "affiliate address must be a native address".to_string(),
        ));
    }
    let pool = ctx.keeper.get_pool(asset)?;
    if pool.status == PoolStatus::Suspended {
        return Err(RuntimeError::InvalidPoolStatus(format!("pool {asset} is suspended")));
    }
    if ctx.is_chain_halted(asset.get_chain())? {
        return Err(RuntimeError::Unauthorized(format!("{} is halted", asset.get_chain())));
    }
    if !ctx.constants().get_bool_value(ConstantName::StrictBondLiquidityRatio) {
        return Ok(());
    }
    let total: Uint = ctx
        .keeper
        .get_pools()?
        .iter()
        .filter(|p| p.status != PoolStatus::Suspended && !p.asset.is_derived())
        .map(|p| p.balance_rune)
        .sum::<Uint>()
        .saturating_add(msg.rune_amount)
        .saturating_add(pool.asset_value_in_rune(msg.asset_amount));
    let secured = effective_security_bond(ctx.keeper.list_active_validators()?);
    if total > secured {
        return Err(RuntimeError::UnknownRequest(format!(
            "total liquidity {total} is more than effective security bond {secured}"
        )));
    }
    Ok(())
}

fn handle_add_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::AddLiquidity(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    let mut msg = msg.clone();
    let mut pool = ctx.keeper.get_pool(&msg.asset)?;
    if pool.is_empty() && !ctx.keeper.pool_exists(&msg.asset) {
        info!("pool {} doesn't exist, creating it", msg.asset);
        pool.status = if msg.asset.is_gas_asset() {
            PoolStatus::Available
        } else {
            ctx.constants()
                .get_string_value(ConstantName::DefaultPoolStatus)
                .parse()
                .unwrap_or_default()
        };
        pool.status_since = ctx.block_height();
        ctx.keeper.set_pool(&pool)?;
        mgr.events.emit(
            ctx,
            Event::Pool {
                pool: pool.asset.clone(),
                status: pool.status,
            },
        );
    }

    if msg.affiliate_basis_points > 0 && !msg.affiliate_address.is_empty() {
        let affiliate_rune = get_safe_share(msg.affiliate_basis_points, MAX_BASIS_POINTS, msg.rune_amount);
        let affiliate_asset = get_safe_share(msg.affiliate_basis_points, MAX_BASIS_POINTS, msg.asset_amount);
        msg.rune_amount -= affiliate_rune;
        msg.asset_amount -= affiliate_asset;
        if affiliate_rune > 0 || affiliate_asset > 0 {
            add_liquidity(
                ctx,
                mgr,
                &msg.asset,
                affiliate_rune,
                affiliate_asset,
                &msg.affiliate_address,
                &Address::default(),
                &msg.tx.id,
            )?;
        }
    }
    add_liquidity(
        ctx,
        mgr,
        &msg.asset,
        msg.rune_amount,
        msg.asset_amount,
        &msg.rune_address,
        &msg.asset_address,
        &msg.tx.id,
    )
}

#[allow(clippy::too_many_arguments)]
fn add_liquidity(
    ctx: &mut Context,
    mgr: &Managers,
    asset: &Asset,
    add_rune: Uint,
    add_asset: Uint,
    rune_address: &Address,
    asset_address: &Address,
    tx_id: &TxId,
) -> Result<()> {
    let height = ctx.block_height();
    let key = if rune_address.is_empty() {
        asset_address
    } else {
        rune_address
    };
    let mut pool = ctx.keeper.get_pool(asset)?;
    let mut lp = if ctx.keeper.liquidity_provider_exists(asset, key) {
        ctx.keeper.get_liquidity_provider(asset, key)?
    } else {
        let mut lp = LiquidityProvider::new(asset.clone(), rune_address.clone(), asset_address.clone());
        lp.last_add_height = height;
        lp
    };
    if !asset_address.is_empty() && !lp.asset_address.is_empty() && !lp.asset_address.equals(asset_address) {
        return Err(RuntimeError::UnknownRequest(format!(
            "asset address {} does not match {}",
            asset_address, lp.asset_address
        )));
    }

    let pending_rune = lp.pending_rune.saturating_add(add_rune);
    let pending_asset = lp.pending_asset.saturating_add(add_asset);
    if !rune_address.is_empty() && !asset_address.is_empty() && (pending_rune == 0 || pending_asset == 0) {
        lp.pending_rune = pending_rune;
        lp.pending_asset = pending_asset;
        lp.pending_tx_id = Some(tx_id.clone());
        if lp.asset_address.is_empty() {
            lp.asset_address = asset_address.clone();
        }
        ctx.keeper.set_liquidity_provider(&lp)?;
        pool.pending_inbound_rune = pool.pending_inbound_rune.saturating_add(add_rune);
        pool.pending_inbound_asset = pool.pending_inbound_asset.saturating_add(add_asset);
        ctx.keeper.set_pool(&pool)?;
        debug!("{} is pending on the other side of {}", tx_id, asset);
        mgr.events.emit(
            ctx,
            Event::PendingLiquidity {
                pool: asset.clone(),
                pending_type: PendingLiquidityType::Add,
                rune_address: rune_address.clone(),
                rune_amount: add_rune,
                asset_address: asset_address.clone(),
                asset_amount: add_asset,
                rune_tx_id: if add_rune > 0 { tx_id.clone() } else { TxId::default() },
                asset_tx_id: if add_asset > 0 { tx_id.clone() } else { TxId::default() },
            },
        );
        return Ok(());
    }

    let earlier_tx = lp.pending_tx_id.clone().unwrap_or_else(|| tx_id.clone());
    let rune_tx_id = if add_rune > 0 { tx_id.clone() } else { earlier_tx.clone() };
    let asset_tx_id = if add_asset > 0 { tx_id.clone() } else { earlier_tx };
    pool.pending_inbound_rune = safe_sub(pool.pending_inbound_rune, lp.pending_rune);
    pool.pending_inbound_asset = safe_sub(pool.pending_inbound_asset, lp.pending_asset);
    lp.pending_rune = 0;
    lp.pending_asset = 0;
    lp.pending_tx_id = None;

    let (pool_units, units) = calc_liquidity_units(
        pool.lp_units,
        pool.balance_rune,
        pool.balance_asset,
        pending_rune,
        pending_asset,
    )?;
    let first_units = pool.lp_units == 0;
    pool.balance_rune = pool.balance_rune.saturating_add(pending_rune);
    pool.balance_asset = pool.balance_asset.saturating_add(pending_asset);
    pool.lp_units = pool_units;
    if pool.balance_rune == 0 || pool.balance_asset == 0 {
        debug!("pool {} has a single sided balance", asset);
    }
    ctx.keeper.set_pool(&pool)?;
    if first_units && pool.lp_units > 0 {
        mgr.events.emit(
            ctx,
            Event::Pool {
                pool: asset.clone(),
                status: pool.status,
            },
        );
    }

    lp.units = lp.units.saturating_add(units);
    if pool.is_available() {
        let units_total = pool.get_pool_units();
        lp.rune_deposit_value = lp
            .rune_deposit_value
            .saturating_add(get_safe_share(units, units_total, pool.balance_rune));
        lp.asset_deposit_value = lp
            .asset_deposit_value
            .saturating_add(get_safe_share(units, units_total, pool.balance_asset));
    }
    lp.last_add_height = height;
    if lp.rune_address.is_empty() {
        lp.rune_address = rune_address.clone();
    }
    if lp.asset_address.is_empty() {
        lp.asset_address = asset_address.clone();
    }
    ctx.keeper.set_liquidity_provider(&lp)?;
    info!("{} added {} rune and {} of {} for {} units", key, pending_rune, pending_asset, asset, units);

    mgr.events.emit(
        ctx,
        Event::AddLiquidity {
            pool: asset.clone(),
            provider_units: units,
            rune_address: lp.rune_address.clone(),
            rune_amount: pending_rune,
            asset_amount: pending_asset,
            rune_tx_id,
            asset_tx_id,
            asset_address: lp.asset_address.clone(),
        },
    );
    Ok(())
}

fn validate_withdraw_v1(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::WithdrawLiquidity(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    if msg.tx.id.is_empty() {
        return Err(RuntimeError::UnknownRequest("request tx hash is empty".to_string()));
    }
    if !ctx.keeper.pool_exists(&msg.asset) {
        return Err(RuntimeError::UnknownRequest(format!("pool {} doesn't exist", msg.asset)));
    }
    if let Some(asset) = &msg.withdrawal_asset {
        if !asset.is_rune() && *asset != msg.asset {
            return Err(RuntimeError::UnknownRequest(format!(
                "cannot withdraw {} from pool {}",
                asset, msg.asset
            )));
        }
    }
    if !msg.tx.id.is_blank() && ctx.is_chain_halted(msg.asset.get_chain())? {
        return Err(RuntimeError::Unauthorized(format!("{} is halted", msg.asset.get_chain())));
    }
    Ok(())
}

/// Side a provider may take out: whatever their addresses allow, the
/// requested side otherwise.
fn asset_to_withdraw(msg: &MsgWithdrawLiquidity, lp: &LiquidityProvider) -> Option<Asset> {
    if lp.rune_address.is_empty() {
        return Some(msg.asset.clone());
    }
    if lp.asset_address.is_empty() {
        return Some(Asset::rune());
    }
    msg.withdrawal_asset.clone()
}

/// What a withdrawal pays out.
struct Withdrawal {
    rune: Uint,
    asset: Uint,
    units: Uint,
    /// Gas asset held back to pay for the last outbound of a gas pool.
    gas: Uint,
}

fn withdraw(ctx: &mut Context, mgr: &Managers, msg: &MsgWithdrawLiquidity) -> Result<Withdrawal> {
    let mut pool = ctx.keeper.get_pool(&msg.asset)?;
    let mut lp = ctx.keeper.get_liquidity_provider(&msg.asset, &msg.withdraw_address)?;
    if lp.units == 0 {
        if !lp.has_pending() {
            return Err(RuntimeError::UnknownRequest("nothing left to withdraw".to_string()));
        }
        pool.pending_inbound_rune = safe_sub(pool.pending_inbound_rune, lp.pending_rune);
        pool.pending_inbound_asset = safe_sub(pool.pending_inbound_asset, lp.pending_asset);
        ctx.keeper.set_pool(&pool)?;
        mgr.events.emit(
            ctx,
            Event::PendingLiquidity {
                pool: msg.asset.clone(),
                pending_type: PendingLiquidityType::Withdraw,
                rune_address: lp.rune_address.clone(),
                rune_amount: lp.pending_rune,
                asset_address: lp.asset_address.clone(),
                asset_amount: lp.pending_asset,
                rune_tx_id: msg.tx.id.clone(),
                asset_tx_id: msg.tx.id.clone(),
            },
        );
        let withdrawal = Withdrawal {
            rune: lp.pending_rune,
            asset: round_to_decimal(lp.pending_asset, pool.decimals),
            units: 0,
            gas: 0,
        };
        lp.pending_rune = 0;
        lp.pending_asset = 0;
        lp.pending_tx_id = None;
        ctx.keeper.set_liquidity_provider(&lp)?;
        return Ok(withdrawal);
    }

    let height = ctx.block_height();
    let lockup = ctx.config_i64(ConstantName::LiquidityLockUpBlocks)?;
    if height < lp.last_add_height + lockup {
        return Err(RuntimeError::UnknownRequest(format!(
            "liquidity is locked until {}",
            lp.last_add_height + lockup
        )));
    }

    if pool.is_available() && lp.rune_deposit_value == 0 && lp.asset_deposit_value == 0 {
        lp.rune_deposit_value = get_safe_share(lp.units, pool.get_pool_units(), pool.balance_rune);
        lp.asset_deposit_value = get_safe_share(lp.units, pool.get_pool_units(), pool.balance_asset);
    }

    let side = asset_to_withdraw(msg, &lp);
    let original_units = lp.units;
    let (rune, asset, units_after) = calc_withdraw(
        pool.get_pool_units(),
        pool.balance_rune,
        pool.balance_asset,
        original_units,
        msg.basis_points,
        side.as_ref(),
    )?;
    if (rune == pool.balance_rune) != (asset == pool.balance_asset) {
        return Err(RuntimeError::UnknownRequest(
            "cannot withdraw 100% of only one side of the pool".to_string(),
        ));
    }
    let mut asset = round_to_decimal(asset, pool.decimals);

    let mut gas = 0;
    if safe_sub(pool.get_pool_units(), original_units).saturating_add(units_after) == 0 && pool.is_gas_pool() {
        let max_gas = mgr.gas.get_max_gas(ctx, msg.asset.get_chain())?;
        gas = max_gas.amount.min(asset);
        asset -= gas;
    }

    debug!("withdraw from {}: rune {} asset {} units left {}", pool.asset, rune, asset, units_after);
    pool.lp_units = safe_sub(pool.lp_units, safe_sub(original_units, units_after));
    pool.balance_rune = safe_sub(pool.balance_rune, rune);
    pool.balance_asset = safe_sub(pool.balance_asset, asset);

    lp.last_withdraw_height = height;
    lp.rune_deposit_value = safe_sub(
        lp.rune_deposit_value,
        get_safe_share(msg.basis_points, MAX_BASIS_POINTS, lp.rune_deposit_value),
    );
    lp.asset_deposit_value = safe_sub(
        lp.asset_deposit_value,
        get_safe_share(msg.basis_points, MAX_BASIS_POINTS, lp.asset_deposit_value),
    );
    lp.units = units_after;
    if units_after >= original_units {
        return Err(RuntimeError::internal(
            "withdraw",
            format!("units cannot increase during a withdrawal: {original_units} -> {units_after}"),
        ));
    }

    if pool.balance_asset == 0 || pool.balance_rune == 0 {
        pool.status = PoolStatus::Staged;
        pool.status_since = height;
        mgr.events.emit(
            ctx,
            Event::Pool {
                pool: pool.asset.clone(),
                status: PoolStatus::Staged,
            },
        );
    }
    ctx.keeper.set_pool(&pool)?;
    // an emptied position keeps its record with zero units
    ctx.keeper.set_liquidity_provider(&lp)?;
    Ok(Withdrawal {
        rune,
        asset,
        units: original_units - units_after,
        gas,
    })
}

fn handle_withdraw_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::WithdrawLiquidity(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    let lp = ctx.keeper.get_liquidity_provider(&msg.asset, &msg.withdraw_address)?;
    let out = withdraw(ctx, mgr, msg)?;

    // only ragnarok withdraws without an inbound
    let memo = if msg.tx.id.is_blank() {
        Memo::Ragnarok {
            block_height: ctx.block_height(),
        }
        .to_string()
    } else {
        String::new()
    };

    if out.asset > 0 {
        let mut item = TxOutItem::new(
            msg.asset.get_chain(),
            lp.asset_address.clone(),
            Coin::new(msg.asset.clone(), out.asset),
            msg.tx.id.clone(),
        )
        .with_memo(memo.clone());
        if out.gas > 0 {
            item.max_gas = Gas::new(vec![Coin::new(msg.asset.get_chain().gas_asset(), out.gas)]);
        }
        if !mgr.tx_out_store.try_add_tx_out_item(ctx, mgr, item, 0)? {
            return Err(RuntimeError::FailAddOutboundTx("fail to schedule asset withdraw".to_string()));
        }
    }
    if out.rune > 0 {
        let item = TxOutItem::new(
            Chain::THOR,
            lp.rune_address.clone(),
            Coin::new(Asset::rune(), out.rune),
            msg.tx.id.clone(),
        )
        .with_memo(memo);
        if !mgr.tx_out_store.try_add_tx_out_item(ctx, mgr, item, 0)? {
            return Err(RuntimeError::FailAddOutboundTx("fail to schedule rune withdraw".to_string()));
        }
    }

    mgr.events.emit(
        ctx,
        Event::Withdraw {
            pool: msg.asset.clone(),
            provider_units: out.units,
            basis_points: msg.basis_points,
            asymmetry: 0,
            in_tx: msg.tx.clone(),
            emit_asset: out.asset,
            emit_rune: out.rune,
        },
    );

    // the rune that carried the request goes to the reserve
    let rune = msg.tx.coins.amount_of(&Asset::rune());
    if rune > 0 && !msg.tx.id.is_blank() {
        let coins = Coins::new(vec![Coin::new(Asset::rune(), rune)]);
        ctx.keeper
            .send_from_module_to_module(ASGARD_NAME, RESERVE_NAME, &coins)?;
    }
    Ok(())
}

fn validate_donate_v1(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::Donate(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    if msg.asset.is_synthetic() || msg.asset.is_rune() {
        return Err(RuntimeError::UnknownRequest(format!("cannot donate to {}", msg.asset)));
    }
    if !ctx.keeper.pool_exists(&msg.asset) {
        return Err(RuntimeError::UnknownRequest(format!("pool {} doesn't exist", msg.asset)));
    }
    Ok(())
}

fn handle_donate_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::Donate(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    donate(ctx, mgr, msg)
}

fn donate(ctx: &mut Context, mgr: &Managers, msg: &MsgDonate) -> Result<()> {
    let mut pool: Pool = ctx.keeper.get_pool(&msg.asset)?;
    pool.balance_asset = pool.balance_asset.saturating_add(msg.asset_amount);
    pool.balance_rune = pool.balance_rune.saturating_add(msg.rune_amount);
    ctx.keeper.set_pool(&pool)?;
    debug!("donated {} rune and {} {}", msg.rune_amount, msg.asset_amount, msg.asset);
    mgr.events.emit(
        ctx,
        Event::Donate {
            pool: msg.asset.clone(),
            in_tx: msg.tx.clone(),
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{handlers::internal_handler, msgs::MsgAddLiquidity, test_utils::*, types::NetworkFee},
        assert_matches::assert_matches,
        thornode_common::{AccAddress, Tx, ONE},
    };

    fn bnb() -> Asset {
        Chain::BNB.gas_asset()
    }

    fn setup() -> (Context, Managers) {
        let mut ctx = test_context(10);
        let nodes = add_active_nodes(&mut ctx, 4);
        add_asgard(&mut ctx, "asgardpk", &nodes, vec![Coin::new(bnb(), 200 * ONE)]);
        add_pool(&mut ctx, bnb(), 1_000 * ONE, 100 * ONE);
        ctx.keeper
            .save_network_fee(&NetworkFee::new(Chain::BNB, 1, 37_500))
            .unwrap();
        (ctx, Managers::default())
    }

    fn in_tx(id: &str, coins: Vec<Coin>) -> Tx {
        Tx::new(
            TxId::from_bytes(id.as_bytes()),
            Address::new_unchecked("bnb1lp"),
            Address::new_unchecked("bnb1asgard"),
            Coins::new(coins),
            Coins::new(vec![Coin::new(bnb(), 37_500)]),
            "add",
        )
    }

    fn add_msg(id: &str, rune: Uint, asset: Uint, rune_address: &str, asset_address: &str) -> Msg {
        Msg::AddLiquidity(MsgAddLiquidity {
            tx: in_tx(id, vec![Coin::new(bnb(), asset.max(1))]),
            asset: bnb(),
            rune_amount: rune,
            asset_amount: asset,
            rune_address: Address::new_unchecked(rune_address),
            asset_address: Address::new_unchecked(asset_address),
            affiliate_address: Address::default(),
            affiliate_basis_points: 0,
            signer: AccAddress::new_unchecked("thornode0"),
        })
    }

    fn withdraw_msg(tx: Tx, addr: &str, basis_points: Uint) -> Msg {
        Msg::WithdrawLiquidity(MsgWithdrawLiquidity {
            tx,
            withdraw_address: Address::new_unchecked(addr),
            basis_points,
            asset: bnb(),
            withdrawal_asset: None,
            signer: AccAddress::new_unchecked("thornode0"),
        })
    }

    fn count(ctx: &Context, kind: &str) -> usize {
        ctx.keeper
            .store()
            .events()
            .iter()
            .filter(|e| e.kind() == kind)
            .count()
    }

    #[test]
    fn test_calc_liquidity_units() {
        assert_eq!(calc_liquidity_units(0, 0, 0, 100, 10).unwrap(), (100, 100));
        assert_eq!(calc_liquidity_units(100, 100, 100, 10, 10).unwrap(), (110, 10));
        assert_eq!(
            calc_liquidity_units(1_000 * ONE, 1_000 * ONE, 100 * ONE, 100 * ONE, 10 * ONE).unwrap(),
            (1_100 * ONE, 100 * ONE)
        );
        assert_matches!(calc_liquidity_units(0, 0, 0, 0, 10), Err(RuntimeError::UnknownRequest(_)));
        assert_matches!(calc_liquidity_units(0, 0, 0, 10, 0), Err(RuntimeError::UnknownRequest(_)));
    }

    #[test]
    fn test_calc_withdraw() {
        assert_eq!(calc_withdraw(100, 1_000, 100, 50, 10_000, None).unwrap(), (500, 50, 0));
        assert_eq!(calc_withdraw(100, 1_000, 100, 50, 5_000, None).unwrap(), (250, 25, 25));
        // the only provider taking one side gets the whole side
        assert_eq!(
            calc_withdraw(100, 1_000, 100, 100, 10_000, Some(&Asset::rune())).unwrap(),
            (1_000, 0, 0)
        );
        assert_eq!(calc_withdraw(100, 1_000, 100, 100, 10_000, Some(&bnb())).unwrap(), (0, 100, 0));
        assert_matches!(calc_withdraw(0, 1_000, 100, 50, 10_000, None), Err(RuntimeError::UnknownRequest(_)));
        assert_matches!(calc_withdraw(100, 1_000, 100, 0, 10_000, None), Err(RuntimeError::UnknownRequest(_)));
        assert_eq!(calc_asym_withdrawal(0, 100, 1_000), 0);
        assert_eq!(calc_asym_withdrawal(10, 0, 1_000), 0);
    }

    #[test]
    fn test_effective_security_bond() {
        let nodes: Vec<NodeAccount> = [1u128, 2, 3, 4]
            .iter()
            .enumerate()
            .map(|(i, bond)| node_account(i, crate::types::NodeStatus::Active, *bond * ONE))
            .collect();
        // weakest three of four
        assert_eq!(effective_security_bond(nodes.clone()), 6 * ONE);
        // weakest two of three
        assert_eq!(effective_security_bond(nodes[..3].to_vec()), 3 * ONE);
        assert_eq!(effective_security_bond(vec![]), 0);
    }

    #[test]
    fn test_cross_chain_add_waits_for_both_sides() {
        let (mut ctx, mgr) = setup();
        internal_handler(&mut ctx, &mgr, add_msg("asset side", 0, 10 * ONE, "thorlp", "bnb1lp")).unwrap();
        let pool = ctx.keeper.get_pool(&bnb()).unwrap();
        assert_eq!(pool.pending_inbound_asset, 10 * ONE);
        assert_eq!(pool.balance_asset, 100 * ONE);
        let lp = ctx
            .keeper
            .get_liquidity_provider(&bnb(), &Address::new_unchecked("thorlp"))
            .unwrap();
        assert_eq!(lp.units, 0);
        assert_eq!(lp.pending_asset, 10 * ONE);
        assert_eq!(count(&ctx, "pending_liquidity"), 1);

        internal_handler(&mut ctx, &mgr, add_msg("rune side", 100 * ONE, 0, "thorlp", "bnb1lp")).unwrap();
        let pool = ctx.keeper.get_pool(&bnb()).unwrap();
        assert_eq!(pool.pending_inbound_asset, 0);
        assert_eq!(pool.balance_rune, 1_100 * ONE);
        assert_eq!(pool.balance_asset, 110 * ONE);
        assert_eq!(pool.lp_units, 1_100 * ONE);
        let lp = ctx
            .keeper
            .get_liquidity_provider(&bnb(), &Address::new_unchecked("thorlp"))
            .unwrap();
        assert_eq!(lp.units, 100 * ONE);
        assert!(!lp.has_pending());
        assert_eq!(lp.pending_tx_id, None);
        assert_eq!(count(&ctx, "add_liquidity"), 1);
    }

    #[test]
    fn test_affiliate_takes_a_share_of_the_add() {
        let (mut ctx, mgr) = setup();
        let Msg::AddLiquidity(mut msg) = add_msg("sym", 100 * ONE, 10 * ONE, "thorlp", "") else {
            unreachable!()
        };
        msg.affiliate_address = Address::new_unchecked("thoraffiliate");
        msg.affiliate_basis_points = 1_000;
        internal_handler(&mut ctx, &mgr, Msg::AddLiquidity(msg)).unwrap();
        let get = |addr: &str| {
            ctx.keeper
                .get_liquidity_provider(&bnb(), &Address::new_unchecked(addr))
                .unwrap()
                .units
        };
        assert_eq!(get("thoraffiliate"), 10 * ONE);
        assert_eq!(get("thorlp"), 90 * ONE);
        assert_eq!(count(&ctx, "add_liquidity"), 2);
    }

    #[test]
    fn test_add_validation() {
        let (mut ctx, mgr) = setup();
        assert_matches!(
            internal_handler(&mut ctx, &mgr, add_msg("a", ONE, ONE, "bnb1notthor", "bnb1lp")),
            Err(RuntimeError::UnknownRequest(_))
        );
        assert_matches!(
            internal_handler(&mut ctx, &mgr, add_msg("b", ONE, ONE, "thorlp", "bc1qwrongchain")),
            Err(RuntimeError::UnknownRequest(_))
        );
        // more liquidity than the bond can secure
        assert_matches!(
            internal_handler(&mut ctx, &mgr, add_msg("c", 5_000 * ONE, ONE, "thorlp", "")),
            Err(RuntimeError::UnknownRequest(_))
        );
        let mut pool = ctx.keeper.get_pool(&bnb()).unwrap();
        pool.status = PoolStatus::Suspended;
        ctx.keeper.set_pool(&pool).unwrap();
        assert_matches!(
            internal_handler(&mut ctx, &mgr, add_msg("d", ONE, ONE, "thorlp", "")),
            Err(RuntimeError::InvalidPoolStatus(_))
        );
        assert_eq!(count(&ctx, "add_liquidity"), 0);
    }

    #[test]
    fn test_first_add_creates_pool() {
        let (mut ctx, mgr) = setup();
        let token = Asset::layer1(Chain::BNB, "TOKEN-123");
        let Msg::AddLiquidity(mut msg) = add_msg("new pool", 10 * ONE, 10 * ONE, "thorlp", "") else {
            unreachable!()
        };
        msg.asset = token.clone();
        internal_handler(&mut ctx, &mgr, Msg::AddLiquidity(msg)).unwrap();
        let pool = ctx.keeper.get_pool(&token).unwrap();
        assert_eq!(pool.status, PoolStatus::Staged);
        assert_eq!(pool.lp_units, 10 * ONE);
        assert!(count(&ctx, "pool") >= 1);
    }

    #[test]
    fn test_withdraw_pays_both_sides() {
        let (mut ctx, mgr) = setup();
        internal_handler(&mut ctx, &mgr, add_msg("asset side", 0, 10 * ONE, "thorlp", "bnb1lp")).unwrap();
        internal_handler(&mut ctx, &mgr, add_msg("rune side", 100 * ONE, 0, "thorlp", "bnb1lp")).unwrap();

        let tx = in_tx("withdraw", vec![Coin::new(bnb(), 1)]);
        internal_handler(&mut ctx, &mgr, withdraw_msg(tx, "thorlp", 10_000)).unwrap();

        let pool = ctx.keeper.get_pool(&bnb()).unwrap();
        assert_eq!(pool.lp_units, 1_000 * ONE);
        let lp = ctx
            .keeper
            .get_liquidity_provider(&bnb(), &Address::new_unchecked("thorlp"))
            .unwrap();
        assert!(ctx
            .keeper
            .liquidity_provider_exists(&bnb(), &Address::new_unchecked("thorlp")));
        assert_eq!(lp.units, 0);
        assert!(!lp.has_pending());

        // a second full withdrawal finds nothing left
        let tx = in_tx("withdraw again", vec![Coin::new(bnb(), 1)]);
        assert_matches!(
            internal_handler(&mut ctx, &mgr, withdraw_msg(tx, "thorlp", 10_000)),
            Err(RuntimeError::UnknownRequest(_))
        );
        let items = scheduled_outbounds(&ctx, &TxId::from_bytes(b"withdraw"));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].1.to_address.as_str(), "bnb1lp");
        let paid = ctx
            .keeper
            .get_balance(&AccAddress::new_unchecked("thorlp"))
            .unwrap()
            .amount_of(&Asset::rune());
        assert!(paid > 0 && paid < 100 * ONE);
        assert_eq!(count(&ctx, "withdraw"), 1);
    }

    #[test]
    fn test_withdraw_returns_pending_liquidity() {
        let (mut ctx, mgr) = setup();
        internal_handler(&mut ctx, &mgr, add_msg("asset side", 0, 10 * ONE, "thorlp", "bnb1lp")).unwrap();
        let tx = in_tx("withdraw", vec![Coin::new(bnb(), 1)]);
        internal_handler(&mut ctx, &mgr, withdraw_msg(tx, "thorlp", 10_000)).unwrap();

        assert_eq!(ctx.keeper.get_pool(&bnb()).unwrap().pending_inbound_asset, 0);
        let items = scheduled_outbounds(&ctx, &TxId::from_bytes(b"withdraw"));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].1.coin.asset, bnb());
        assert_eq!(count(&ctx, "pending_liquidity"), 2);
        let lp = ctx
            .keeper
            .get_liquidity_provider(&bnb(), &Address::new_unchecked("thorlp"))
            .unwrap();
        assert_eq!(lp.pending_asset, 0);
        assert_eq!(lp.pending_tx_id, None);

        let tx = in_tx("again", vec![Coin::new(bnb(), 1)]);
        assert_matches!(
            internal_handler(&mut ctx, &mgr, withdraw_msg(tx, "thorlp", 10_000)),
            Err(RuntimeError::UnknownRequest(_))
        );
    }

    #[test]
    fn test_ragnarok_withdraw_is_memoed() {
        let (mut ctx, mgr) = setup();
        internal_handler(&mut ctx, &mgr, add_msg("sym", 100 * ONE, 10 * ONE, "thorlp", "bnb1lp")).unwrap();
        let mut tx = in_tx("unused", vec![Coin::new(bnb(), 1)]);
        tx.id = TxId::blank();
        internal_handler(&mut ctx, &mgr, withdraw_msg(tx, "thorlp", 10_000)).unwrap();
        let items = ctx.keeper.get_tx_out(10).unwrap().tx_array;
        assert_eq!(items.len(), 1);
        assert!(items[0].memo.starts_with("RAGNAROK"));
    }

    #[test]
    fn test_donate_deepens_pool() {
        let (mut ctx, mgr) = setup();
        let msg = Msg::Donate(MsgDonate {
            tx: in_tx("donate", vec![Coin::new(bnb(), ONE)]),
            asset: bnb(),
            asset_amount: ONE,
            rune_amount: 0,
            signer: AccAddress::new_unchecked("thornode0"),
        });
        internal_handler(&mut ctx, &mgr, msg).unwrap();
        let pool = ctx.keeper.get_pool(&bnb()).unwrap();
        assert_eq!(pool.balance_asset, 101 * ONE);
        assert_eq!(pool.lp_units, 1_000 * ONE);
        assert_eq!(count(&ctx, "donate"), 1);
    }
}
