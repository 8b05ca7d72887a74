//! Outbound fee rates reported by the chain clients.

use {
    super::{require_active_signer, wrong_msg, HandlerFn, HandlerTable},
    crate::{
        context::Context,
        error::Result,
        managers::Managers,
        msgs::{Msg, MsgNetworkFee},
        types::NetworkFee,
        versioned::VersionBranch,
    },
    log::*,
    thornode_constants::ConstantName,
};

pub(super) static NETWORK_FEE: HandlerTable = HandlerTable {
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

fn network_fee_msg(msg: &Msg) -> Result<&MsgNetworkFee> {
    match msg {
        Msg::NetworkFee(m) => Ok(m),
        _ => Err(wrong_msg(msg)),
    }
}

fn validate_v1(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    require_active_signer(ctx, &network_fee_msg(msg)?.signer)
}

fn handle_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = network_fee_msg(msg)?;
    let active = ctx.keeper.list_active_validators()?;
    let mut voter = ctx.keeper.get_observed_network_fee_voter(
        msg.chain,
        msg.block_height,
        msg.transaction_size,
        msg.transaction_fee_rate,
    )?;
    let observe_points = ctx.config_i64(ConstantName::ObserveSlashPoints)?;
    let flexibility = ctx.config_i64(ConstantName::ObservationDelayFlexibility)?;
    mgr.slasher
        .inc_slash_points(ctx, observe_points, &[msg.signer.clone()], "observe network fee")?;

    if !voter.sign(&msg.signer) {
        info!("{} already reported the {} fee at {}", msg.signer, msg.chain, msg.block_height);
        return Ok(());
    }
    ctx.keeper.set_observed_network_fee_voter(&voter)?;
    if !voter.has_consensus(&active) {
        return Ok(());
    }

    if voter.block_height > 0 {
        if voter.block_height + flexibility >= ctx.block_height() {
            mgr.slasher
                .dec_slash_points(ctx, observe_points, &[msg.signer.clone()])?;
        }
        return Ok(());
    }
    voter.block_height = ctx.block_height();
    ctx.keeper.set_observed_network_fee_voter(&voter)?;
    mgr.slasher
        .dec_slash_points(ctx, observe_points, &voter.signers)?;

    info!(
        "network fee of {} is now size {} rate {}",
        msg.chain, msg.transaction_size, msg.transaction_fee_rate
    );
    ctx.keeper.save_network_fee(&NetworkFee::new(
        msg.chain,
        msg.transaction_size,
        msg.transaction_fee_rate,
    ))
}
