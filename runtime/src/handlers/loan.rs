//! Lending against external collateral.
//!
//! Collateral stays in the vault that received it and is counted against
//! the pool through the total collateral record. Debt is issued in newly
//! minted rune and swapped to whatever the borrower asked for; repayments
//! are converted to rune and burnt.

use {
    super::{swap::swap, wrong_msg, HandlerFn, HandlerTable},
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        events::Event,
        keeper::{ASGARD_NAME, RESERVE_NAME},
        managers::{swap_one, Managers},
        msgs::{Msg, MsgLoanOpen, MsgLoanRepayment, MsgSwap},
        types::{Pool, TxOutItem},
        versioned::VersionBranch,
    },
    log::*,
    thornode_common::{
        math::{get_safe_share, get_uncapped_share, mul_div, safe_sub},
        Address, Asset, Chain, Coin, Coins, Tx, TxId, Uint, MAX_BASIS_POINTS,
    },
    thornode_constants::ConstantName,
    thornode_memo::OrderType,
};

pub(super) static LOAN_OPEN: HandlerTable = HandlerTable {
    validate: &[
        VersionBranch {
            since: (1, 111, 0),
            name: "v111",
            entrypoint: validate_open_v111 as HandlerFn,
        },
        VersionBranch {
            since: (1, 107, 0),
            name: "v107",
            entrypoint: validate_open_v107 as HandlerFn,
        },
    ],
    handle: &[
        VersionBranch {
            since: (1, 111, 0),
            name: "v111",
            entrypoint: handle_open_v111 as HandlerFn,
        },
        VersionBranch {
            since: (1, 107, 0),
            name: "v107",
            entrypoint: handle_open_v107 as HandlerFn,
        },
    ],
};

pub(super) static LOAN_REPAYMENT: HandlerTable = HandlerTable {
    validate: &[VersionBranch {
        since: (1, 107, 0),
        name: "v107",
        entrypoint: validate_repay_v107 as HandlerFn,
    }],
    handle: &[VersionBranch {
        since: (1, 107, 0),
        name: "v107",
        entrypoint: handle_repay_v107 as HandlerFn,
    }],
};

type ShareFn = fn(Uint, Uint, Uint) -> Uint;

fn lending_key(asset: &Asset) -> String {
    format!("LENDING-{}", asset.derived_asset().mimir_string())
}

fn lending_enabled(ctx: &Context, asset: &Asset) -> Result<bool> {
    Ok(ctx.mimir(&lending_key(asset))?.unwrap_or_default() > 0)
}

/// Rune depth of every pool lending is enabled for.
fn total_rune_of_lending_pools(ctx: &Context) -> Result<Uint> {
    let mut total: Uint = 0;
    for pool in ctx.keeper.get_pools()? {
        if pool.asset.is_derived() || pool.asset.is_synthetic() {
            continue;
        }
        if lending_enabled(ctx, &pool.asset)? {
            total = total.saturating_add(pool.balance_rune);
        }
    }
    Ok(total)
}

fn max_rune_supply(ctx: &Context) -> Result<Uint> {
    let max = ctx.config_i64(ConstantName::MaxRuneSupply)?;
    if max <= 0 {
        return Err(RuntimeError::UnknownRequest("no max supply set".to_string()));
    }
    Ok(max as Uint)
}

/// Collateral of `pool`'s asset the network can still take, given the rune
/// burnt below the supply cap and this pool's share of lending depth.
fn available_collateral(ctx: &Context, pool: &Pool, share: ShareFn) -> Result<Uint> {
    let total_rune = total_rune_of_lending_pools(ctx)?;
    if total_rune == 0 {
        return Err(RuntimeError::UnknownRequest("no liquidity, lending unavailable".to_string()));
    }
    let supply = ctx.keeper.get_total_supply(&Asset::rune())?;
    let burnt = safe_sub(max_rune_supply(ctx)?, supply);
    let lever = ctx.config_uint(ConstantName::LendingLever)?;
    let for_protocol = get_safe_share(lever, MAX_BASIS_POINTS, burnt);
    if for_protocol == 0 {
        return Err(RuntimeError::UnknownRequest("no availability (0), lending unavailable".to_string()));
    }
    let for_pool = share(pool.balance_rune, total_rune, for_protocol);
    Ok(pool.rune_value_in_asset(for_pool))
}

/// Collateralisation ratio in basis points, rising from `MinCR` to `MaxCR`
/// as the collateral in the pool approaches what is available.
fn collateralization_ratio(ctx: &Context, collateral: Uint, available: Uint) -> Result<Uint> {
    let min_cr = ctx.config_uint(ConstantName::MinCR)?;
    let max_cr = ctx.config_uint(ConstantName::MaxCR)?;
    Ok(get_uncapped_share(collateral, available, safe_sub(max_cr, min_cr)).saturating_add(min_cr))
}

fn validate_open(ctx: &Context, msg: &MsgLoanOpen, share: ShareFn) -> Result<()> {
    if ctx.config_i64(ConstantName::PauseLoans)? > 0 {
        return Err(RuntimeError::UnknownRequest("loans are currently paused".to_string()));
    }
    let max = max_rune_supply(ctx)?;
    let supply = ctx.keeper.get_total_supply(&Asset::rune())?;
    if supply >= max {
        return Err(RuntimeError::UnknownRequest(format!(
            "loans are currently paused, due to rune supply cap ({supply}/{max})"
        )));
    }
    let collateral = &msg.collateral_asset;
    if collateral.is_synthetic() || collateral.is_derived() || collateral.is_rune() {
        return Err(RuntimeError::UnknownRequest(format!("{collateral} cannot be collateral")));
    }
    if !ctx.keeper.pool_exists(collateral) {
        return Err(RuntimeError::UnknownRequest("collateral asset does not have a pool".to_string()));
    }
    if !lending_enabled(ctx, collateral)? {
        return Err(RuntimeError::UnknownRequest(format!(
            "lending is not available for {collateral}"
        )));
    }
    if !msg.target_address.is_chain(msg.target_asset.get_chain()) {
        return Err(RuntimeError::UnknownRequest(format!(
            "target address {} is not on {}",
            msg.target_address,
            msg.target_asset.get_chain()
        )));
    }
    if msg.affiliate_basis_points > 0 && !msg.affiliate_address.is_chain(Chain::THOR) {
        return Err(RuntimeError::UnknownRequest(
            "affiliate address must be a native address".to_string(),
        ));
    }

    let pool = ctx.keeper.get_pool(collateral)?;
    let total = ctx
        .keeper
        .get_total_collateral(collateral)?
        .saturating_add(msg.collateral_amount);
    let available = available_collateral(ctx, &pool, share)?;
    if total > available {
        return Err(RuntimeError::UnknownRequest(format!(
            "no availability ({total}/{available}), lending unavailable"
        )));
    }
    Ok(())
}

fn validate_open_v107(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::LoanOpen(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    validate_open(ctx, msg, get_uncapped_share)
}

fn validate_open_v111(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::LoanOpen(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    validate_open(ctx, msg, get_safe_share)
}

fn handle_open_v107(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::LoanOpen(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    open_loan(ctx, mgr, msg, get_uncapped_share)
}

fn handle_open_v111(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::LoanOpen(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    open_loan(ctx, mgr, msg, get_safe_share)
}

fn loan_tx_id(ctx: &Context, fallback: &TxId) -> TxId {
    ctx.scope.loan_tx_id.clone().unwrap_or_else(|| fallback.clone())
}

fn open_loan(ctx: &mut Context, mgr: &Managers, msg: &MsgLoanOpen, share: ShareFn) -> Result<()> {
    let collateral = &msg.collateral_asset;
    let pool = ctx.keeper.get_pool(collateral)?;
    let mut loan = ctx.keeper.get_loan(collateral, &msg.owner)?;
    let total_collateral = ctx.keeper.get_total_collateral(collateral)?;
    let after = total_collateral.saturating_add(msg.collateral_amount);

    let available = available_collateral(ctx, &pool, share)?;
    let cr = collateralization_ratio(ctx, after, available)?;
    let collateral_in_rune = pool.asset_value_in_rune(msg.collateral_amount);
    let debt = mul_div(collateral_in_rune, MAX_BASIS_POINTS, cr);
    info!(
        "loan of {} against {} {}: cr {} debt {}",
        msg.owner, msg.collateral_amount, collateral, cr, debt
    );
    if debt == 0 {
        return Err(RuntimeError::UnknownRequest("debt cannot be zero".to_string()));
    }

    // an earlier over repayment is credited to this loan
    let mut issued = debt;
    if loan.debt_repaid > loan.debt_issued {
        issued = issued.saturating_add(loan.debt_repaid - loan.debt_issued);
    }
    loan.debt_issued = loan.debt_issued.saturating_add(issued);
    loan.collateral_deposited = loan.collateral_deposited.saturating_add(msg.collateral_amount);
    loan.last_open_height = ctx.block_height();

    let tx_id = loan_tx_id(ctx, &msg.tx_id);
    ctx.keeper
        .mint_to_module(ASGARD_NAME, &Coin::new(Asset::rune(), issued), "loan")?;

    let affiliate = if msg.affiliate_basis_points > 0 && !msg.affiliate_address.is_empty() {
        get_safe_share(msg.affiliate_basis_points, MAX_BASIS_POINTS, issued)
    } else {
        0
    };
    if affiliate > 0 {
        let item = TxOutItem::new(
            Chain::THOR,
            msg.affiliate_address.clone(),
            Coin::new(Asset::rune(), affiliate),
            tx_id.clone(),
        );
        if !mgr.tx_out_store.try_add_tx_out_item(ctx, mgr, item, 0)? {
            return Err(RuntimeError::FailAddOutboundTx("fail to pay loan affiliate".to_string()));
        }
    }
    let proceeds = issued - affiliate;

    if msg.target_asset.is_rune() {
        let item = TxOutItem::new(
            Chain::THOR,
            msg.target_address.clone(),
            Coin::new(Asset::rune(), proceeds),
            tx_id.clone(),
        );
        if !mgr
            .tx_out_store
            .try_add_tx_out_item(ctx, mgr, item, msg.min_out)?
        {
            return Err(RuntimeError::FailAddOutboundTx("fail to pay out loan".to_string()));
        }
    } else {
        let to_address = ctx
            .scope
            .to_address
            .clone()
            .unwrap_or_else(|| msg.target_address.clone());
        let swap_msg = MsgSwap {
            tx: Tx::new(
                tx_id.clone(),
                msg.owner.clone(),
                to_address,
                Coins::new(vec![Coin::new(Asset::rune(), proceeds)]),
                Coins::default(),
                "noop",
            ),
            target_asset: msg.target_asset.clone(),
            destination: msg.target_address.clone(),
            trade_target: msg.min_out,
            affiliate_address: Address::default(),
            affiliate_basis_points: 0,
            aggregator: msg.aggregator.clone(),
            aggregator_target_address: msg.aggregator_target_address.clone(),
            aggregator_target_limit: Some(msg.aggregator_target_limit).filter(|l| *l > 0),
            order_type: OrderType::Market,
            signer: msg.signer.clone(),
        };
        swap(ctx, mgr, &swap_msg)?;
    }

    ctx.keeper.set_loan(&loan)?;
    ctx.keeper.set_total_collateral(collateral, after)?;
    mgr.events.emit(
        ctx,
        Event::LoanOpen {
            collateral_deposited: msg.collateral_amount,
            collateral_asset: collateral.clone(),
            collateralization_ratio: cr,
            debt_issued: debt,
            owner: msg.owner.clone(),
            target_asset: msg.target_asset.clone(),
            tx_id,
        },
    );
    Ok(())
}

fn validate_repay_v107(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::LoanRepayment(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    if !msg.coin.asset.is_rune() && !msg.from.is_chain(msg.coin.asset.get_chain()) {
        return Err(RuntimeError::UnknownRequest(format!(
            "address {} does not match input coin {}",
            msg.from, msg.coin
        )));
    }
    if ctx.config_i64(ConstantName::PauseLoans)? > 0 {
        return Err(RuntimeError::UnknownRequest("loans are currently paused".to_string()));
    }
    if !ctx.keeper.pool_exists(&msg.collateral_asset) {
        return Err(RuntimeError::UnknownRequest("pool does not exist".to_string()));
    }
    let loan = ctx.keeper.get_loan(&msg.collateral_asset, &msg.owner)?;
    if loan.collateral() == 0 {
        return Err(RuntimeError::UnknownRequest(
            "loan contains no collateral to redeem".to_string(),
        ));
    }
    let maturity = ctx.config_i64(ConstantName::LoanRepaymentMaturity)?;
    if loan.last_open_height + maturity > ctx.block_height() {
        return Err(RuntimeError::UnknownRequest(
            "loan repayment is unavailable: loan hasn't reached maturity".to_string(),
        ));
    }
    Ok(())
}

/// Convert the repayment coin to rune held by asgard.
fn repayment_in_rune(ctx: &mut Context, mgr: &Managers, msg: &MsgLoanRepayment, tx_id: &TxId) -> Result<Uint> {
    if msg.coin.asset.is_rune() {
        return Ok(msg.coin.amount);
    }
    let tx = Tx::new(
        tx_id.clone(),
        msg.from.clone(),
        Address::default(),
        Coins::new(vec![msg.coin.clone()]),
        Coins::default(),
        format!("loan-:{}:{}:{}", msg.collateral_asset, msg.owner, msg.min_out),
    );
    let result = swap_one(ctx, &tx, &Asset::rune(), 0)?;
    mgr.events.emit(
        ctx,
        Event::Swap {
            pool: result.pool.clone(),
            swap_target: 0,
            swap_slip: result.swap_slip,
            liquidity_fee: result.liquidity_fee,
            liquidity_fee_in_rune: result.liquidity_fee_in_rune,
            in_tx: tx,
            emit_asset: result.emit_asset.clone(),
        },
    );
    if let Some(burn) = result.burn {
        ctx.keeper.burn_from_module(ASGARD_NAME, &burn, "swap")?;
    }
    Ok(result.emit_asset.amount)
}

fn handle_repay_v107(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::LoanRepayment(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    let collateral = &msg.collateral_asset;
    let tx_id = loan_tx_id(ctx, &msg.tx_id);
    let mut loan = ctx.keeper.get_loan(collateral, &msg.owner)?;
    let total_collateral = ctx.keeper.get_total_collateral(collateral)?;

    let rune = repayment_in_rune(ctx, mgr, msg, &tx_id)?;
    let repaid = rune.min(loan.debt());
    if repaid > 0 {
        ctx.keeper
            .burn_from_module(ASGARD_NAME, &Coin::new(Asset::rune(), repaid), "loan_repayment")?;
    }
    let excess = rune - repaid;
    if excess > 0 {
        debug!("loan of {} over repaid by {}", msg.owner, excess);
        ctx.keeper.send_from_module_to_module(
            ASGARD_NAME,
            RESERVE_NAME,
            &Coins::new(vec![Coin::new(Asset::rune(), excess)]),
        )?;
    }
    loan.debt_repaid = loan.debt_repaid.saturating_add(repaid);
    loan.last_repay_height = ctx.block_height();

    let mut redeem = 0;
    if loan.debt() == 0 && loan.collateral() > 0 {
        redeem = loan.collateral();
        let item = TxOutItem::new(
            collateral.get_chain(),
            msg.owner.clone(),
            Coin::new(collateral.clone(), redeem),
            tx_id,
        );
        if !mgr
            .tx_out_store
            .try_add_tx_out_item(ctx, mgr, item, msg.min_out)?
        {
            return Err(RuntimeError::FailAddOutboundTx("fail to return loan collateral".to_string()));
        }
        loan.collateral_withdrawn = loan.collateral_withdrawn.saturating_add(redeem);
        ctx.keeper
            .set_total_collateral(collateral, safe_sub(total_collateral, redeem))?;
        info!("loan of {} closed, returning {} {}", msg.owner, redeem, collateral);
    }
    ctx.keeper.set_loan(&loan)?;
    mgr.events.emit(
        ctx,
        Event::LoanRepayment {
            collateral_withdrawn: redeem,
            debt_repaid: repaid,
            collateral_asset: collateral.clone(),
            owner: msg.owner.clone(),
        },
    );
    Ok(())
}
