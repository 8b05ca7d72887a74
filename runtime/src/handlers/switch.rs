//! Upgrade of rune tokens held on other chains to native rune.
//!
//! The tokens stay in the vault that received them. Native rune is minted
//! to the destination, shrinking linearly to nothing over the kill switch
//! window.

use {
    super::{require_active_signer, wrong_msg, HandlerFn, HandlerTable},
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        events::Event,
        keeper::THORCHAIN_NAME,
        managers::Managers,
        msgs::{Msg, MsgSwitch},
        versioned::VersionBranch,
    },
    log::*,
    thornode_common::{math::get_safe_share, Asset, Chain, Coin, Coins, Uint},
    thornode_constants::ConstantName,
};

pub(super) static SWITCH: HandlerTable = HandlerTable {
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

fn switch_msg(msg: &Msg) -> Result<&MsgSwitch> {
    match msg {
        Msg::Switch(m) => Ok(m),
        _ => Err(wrong_msg(msg)),
    }
}

fn switched_coin(msg: &MsgSwitch) -> Result<&Coin> {
    msg.tx
        .coins
        .iter()
        .next()
        .ok_or_else(|| RuntimeError::UnknownRequest("switch carries no coin".to_string()))
}

fn validate_v1(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = switch_msg(msg)?;
    let start = ctx.config_i64(ConstantName::KillSwitchStart)?;
    let duration = ctx.config_i64(ConstantName::KillSwitchDuration)?;
    if start > 0 && ctx.block_height() > start + duration {
        return Err(RuntimeError::UnknownRequest("switch is deprecated".to_string()));
    }
    // tokens from other chains are only believed when observed by a validator
    if !switched_coin(msg)?.is_native() {
        require_active_signer(ctx, &msg.signer)?;
    }
    Ok(())
}

/// Native amount paid for `amount` switched at the current height.
fn switch_amount(ctx: &Context, amount: Uint) -> Result<Uint> {
    let start = ctx.config_i64(ConstantName::KillSwitchStart)?;
    let height = ctx.block_height();
    if start <= 0 || height < start {
        return Ok(amount);
    }
    let duration = ctx.config_i64(ConstantName::KillSwitchDuration)?;
    let remaining = start + duration - height;
    if remaining <= 0 {
        return Ok(0);
    }
    Ok(get_safe_share(remaining as Uint, duration as Uint, amount))
}

fn handle_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = switch_msg(msg)?;
    if ctx.is_chain_halted(Chain::THOR)? {
        return Err(RuntimeError::UnknownRequest(
            "unable to switch while THORChain is halted".to_string(),
        ));
    }
    let burn = switched_coin(msg)?.clone();
    if burn.is_native() || !burn.asset.is_non_native_rune() {
        return Err(RuntimeError::UnknownRequest(
            "only non-native rune can be switched to native rune".to_string(),
        ));
    }
    let mint = Coin::new(Asset::rune(), switch_amount(ctx, burn.amount)?);
    if mint.amount > burn.amount {
        return Err(RuntimeError::internal(
            "switch",
            format!("improper switch calculation: {}/{}", mint.amount, burn.amount),
        ));
    }

    info!("switching {} to {} for {}", burn, mint.amount, msg.destination);
    if mint.amount > 0 {
        ctx.keeper.mint_to_module(THORCHAIN_NAME, &mint, "switch")?;
        ctx.keeper.send_from_module_to_account(
            THORCHAIN_NAME,
            &msg.destination,
            &Coins::new(vec![mint.clone()]),
        )?;
    }

    let mut network = ctx.keeper.get_network()?;
    match msg.tx.chain {
        Chain::BNB => network.burned_bep2_rune = network.burned_bep2_rune.saturating_add(burn.amount),
        Chain::ETH => network.burned_erc20_rune = network.burned_erc20_rune.saturating_add(burn.amount),
        _ => {}
    }
    ctx.keeper.set_network(&network)?;

    mgr.events.emit(
        ctx,
        Event::Switch {
            to_address: msg.destination.clone(),
            from_address: msg.tx.from_address.clone(),
            burn,
            tx_id: msg.tx.id.clone(),
            mint: mint.amount,
        },
    );
    Ok(())
}
