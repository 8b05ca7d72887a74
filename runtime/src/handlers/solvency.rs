//! Vault balance reports from the chain clients. A vault that claims more
//! than its wallet holds halts its chain until a later report shows it
//! solvent again.

use {
    super::{require_active_signer, wrong_msg, HandlerFn, HandlerTable},
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        events::Event,
        managers::Managers,
        msgs::{Msg, MsgSolvency},
        types::{SolvencyVoter, Vault},
        versioned::VersionBranch,
    },
    log::*,
    thornode_common::{math::safe_sub, Chain, Coins, MAX_BASIS_POINTS},
    thornode_constants::ConstantName,
};

pub(super) static SOLVENCY: HandlerTable = HandlerTable {
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

const STOP_SOLVENCY_CHECK: &str = "StopSolvencyCheck";

fn solvency_msg(msg: &Msg) -> Result<&MsgSolvency> {
    match msg {
        Msg::Solvency(m) => Ok(m),
        _ => Err(wrong_msg(msg)),
    }
}

fn validate_v1(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = solvency_msg(msg)?;
    let expected = MsgSolvency::new(
        msg.chain,
        msg.pub_key.clone(),
        msg.coins.clone(),
        msg.height,
        msg.signer.clone(),
    );
    if expected.id != msg.id {
        return Err(RuntimeError::UnknownRequest("invalid solvency message".to_string()));
    }
    require_active_signer(ctx, &msg.signer)
}

fn check_stopped(ctx: &Context, key: &str) -> Result<bool> {
    Ok(ctx
        .mimir(key)?
        .map(|v| v > 0 && v < ctx.block_height())
        .unwrap_or_default())
}

fn handle_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = solvency_msg(msg)?;
    let observe_points = ctx.config_i64(ConstantName::ObserveSlashPoints)?;
    let flexibility = ctx.config_i64(ConstantName::ObservationDelayFlexibility)?;
    mgr.slasher
        .inc_slash_points(ctx, observe_points, &[msg.signer.clone()], "observe solvency")?;

    let mut voter = ctx
        .keeper
        .get_solvency_voter(&msg.id, msg.chain)?
        .unwrap_or_else(|| {
            SolvencyVoter::new(
                msg.id.clone(),
                msg.chain,
                msg.pub_key.clone(),
                msg.coins.clone(),
                msg.height,
            )
        });
    if !voter.sign(&msg.signer) {
        info!("{} already signed solvency {}", msg.signer, msg.id);
        return Ok(());
    }
    ctx.keeper.set_solvency_voter(&voter)?;
    let active = ctx.keeper.list_active_validators()?;
    if !voter.has_consensus(&active) {
        return Ok(());
    }

    if voter.consensus_block_height > 0 {
        if voter.consensus_block_height + flexibility >= ctx.block_height() {
            mgr.slasher
                .dec_slash_points(ctx, observe_points, &[msg.signer.clone()])?;
        }
        return Ok(());
    }
    voter.consensus_block_height = ctx.block_height();
    ctx.keeper.set_solvency_voter(&voter)?;
    mgr.slasher
        .dec_slash_points(ctx, observe_points, &voter.signers)?;

    let vault = ctx.keeper.get_vault(&voter.pub_key)?;
    if check_stopped(ctx, STOP_SOLVENCY_CHECK)?
        || check_stopped(ctx, &format!("{STOP_SOLVENCY_CHECK}{}", voter.chain))?
    {
        return Ok(());
    }

    let halt_key = voter.chain.solvency_halt_key();
    let halt = ctx.keeper.get_mimir(&halt_key)?.unwrap_or_default();
    // Halted this block by another vault, or halted by hand.
    if halt >= ctx.block_height() || halt == 1 {
        return Ok(());
    }

    let insolvent = is_insolvent(ctx, mgr, vault, &voter.coins, voter.chain)?;
    if insolvent && halt <= 0 {
        warn!("{} is insolvent, halting until resolved", voter.chain);
        ctx.keeper.set_mimir(&halt_key, ctx.block_height())?;
        mgr.events.emit(
            ctx,
            Event::SetMimir {
                key: halt_key.to_uppercase(),
                value: ctx.block_height(),
            },
        );
    }
    if !insolvent && halt > 1 {
        info!("{} is solvent again, halted since {}", voter.chain, halt);
        ctx.keeper.set_mimir(&halt_key, 0)?;
        mgr.events.emit(
            ctx,
            Event::SetMimir {
                key: halt_key.to_uppercase(),
                value: 0,
            },
        );
    }
    Ok(())
}

/// Deduct outbounds still waiting to be signed from the vault, so coins in
/// flight do not count against it.
fn exclude_pending_outbounds(ctx: &Context, mut vault: Vault) -> Result<Vault> {
    let period = ctx.config_i64(ConstantName::SigningTransactionPeriod)?;
    let start = (ctx.block_height() - period).max(1);
    for height in start..ctx.block_height() {
        for item in ctx.keeper.get_tx_out(height)?.tx_array {
            if item.vault_pub_key != vault.pub_key || !item.out_hash.is_empty() {
                continue;
            }
            let gas = item.max_gas.amount_of(&item.chain.gas_asset());
            for coin in vault.coins.0.iter_mut() {
                if coin.asset == item.coin.asset {
                    coin.amount = safe_sub(coin.amount, item.coin.amount);
                }
                if coin.asset == item.chain.gas_asset() {
                    coin.amount = safe_sub(coin.amount, gas);
                }
            }
        }
    }
    Ok(vault)
}

/// Whether the vault holds more of a `chain` coin than the wallet reports,
/// beyond the permitted gap. Wallets may hold more than the vault.
fn is_insolvent(ctx: &mut Context, mgr: &Managers, vault: Vault, wallet: &Coins, chain: Chain) -> Result<bool> {
    let vault = exclude_pending_outbounds(ctx, vault)?;
    let permitted_gap = ctx.config_uint(ConstantName::PermittedSolvencyGap)?;
    for coin in vault.coins.iter() {
        if coin.asset.get_chain() != chain || coin.asset.is_rune() || coin.is_empty() {
            continue;
        }
        let Some(held) = wallet.get_coin(&coin.asset).filter(|c| !c.is_empty()) else {
            info!("{} is in the vault but not in the wallet", coin.asset);
            return Ok(true);
        };
        if coin.asset.is_gas_asset() {
            let max_gas = mgr.gas.get_max_gas(ctx, chain)?;
            if coin.amount <= max_gas.amount.saturating_mul(10) {
                continue;
            }
        }
        if coin.amount > held.amount {
            let gap = coin.amount - held.amount;
            let allowed = held.amount.saturating_mul(permitted_gap) / MAX_BASIS_POINTS;
            if gap > allowed {
                info!(
                    "vault holds {} {} but the wallet only {}",
                    coin.amount, coin.asset, held.amount
                );
                return Ok(true);
            }
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{handlers::external_handler, test_utils::*, types::NetworkFee},
        assert_matches::assert_matches,
        thornode_common::{Coin, PubKey, ONE},
    };

    fn setup() -> (Context, Managers, Vec<crate::types::NodeAccount>) {
        let mut ctx = test_context(10);
        let nodes = add_active_nodes(&mut ctx, 4);
        add_asgard(
            &mut ctx,
            "asgardpk",
            &nodes,
            vec![Coin::new(Chain::BTC.gas_asset(), 100 * ONE)],
        );
        ctx.keeper
            .save_network_fee(&NetworkFee::new(Chain::BTC, 250, 25))
            .unwrap();
        (ctx, Managers::default(), nodes)
    }

    fn report(ctx: &mut Context, mgr: &Managers, signer: usize, amount: u128, height: i64) -> Result<()> {
        let msg = MsgSolvency::new(
            Chain::BTC,
            PubKey::new("asgardpk").unwrap(),
            Coins::new(vec![Coin::new(Chain::BTC.gas_asset(), amount)]),
            height,
            node_address(signer),
        );
        external_handler(ctx, mgr, Msg::Solvency(msg))
    }

    fn halt(ctx: &Context) -> Option<i64> {
        ctx.keeper.get_mimir(&Chain::BTC.solvency_halt_key()).unwrap()
    }

    #[test]
    fn test_insolvent_vault_halts_and_recovers() {
        let (mut ctx, mgr, _) = setup();
        for i in 0..3 {
            report(&mut ctx, &mgr, i, 90 * ONE, 5).unwrap();
        }
        assert_eq!(halt(&ctx), Some(10));
        assert!(ctx.is_chain_halted(Chain::BTC).unwrap());

        ctx.set_block_height(20);
        for i in 0..3 {
            report(&mut ctx, &mgr, i, 100 * ONE, 15).unwrap();
        }
        assert_eq!(halt(&ctx), Some(0));
        assert!(!ctx.is_chain_halted(Chain::BTC).unwrap());
    }

    #[test]
    fn test_small_gap_is_tolerated() {
        let (mut ctx, mgr, _) = setup();
        for i in 0..3 {
            report(&mut ctx, &mgr, i, 995 * ONE / 10, 5).unwrap();
        }
        assert_eq!(halt(&ctx), None);
    }

    #[test]
    fn test_manual_halt_is_left_alone() {
        let (mut ctx, mgr, _) = setup();
        ctx.keeper.set_mimir(&Chain::BTC.solvency_halt_key(), 1).unwrap();
        for i in 0..3 {
            report(&mut ctx, &mgr, i, 100 * ONE, 5).unwrap();
        }
        assert_eq!(halt(&ctx), Some(1));
    }

    #[test]
    fn test_forged_report_is_rejected() {
        let (mut ctx, mgr, _) = setup();
        let mut msg = MsgSolvency::new(
            Chain::BTC,
            PubKey::new("asgardpk").unwrap(),
            Coins::default(),
            5,
            node_address(0),
        );
        msg.height = 6;
        assert_matches!(
            external_handler(&mut ctx, &mgr, Msg::Solvency(msg)),
            Err(RuntimeError::UnknownRequest(_))
        );
    }
}
