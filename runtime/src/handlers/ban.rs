use {
    super::{node::pay_from_bond, require_active_signer, wrong_msg, HandlerFn, HandlerTable},
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        managers::Managers,
        msgs::{Msg, MsgBan},
        types::NodeStatus,
        versioned::VersionBranch,
    },
    log::*,
    thornode_constants::ConstantName,
};

pub(super) static BAN: HandlerTable = HandlerTable {
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

fn ban_msg(msg: &Msg) -> Result<&MsgBan> {
    match msg {
        Msg::Ban(m) => Ok(m),
        _ => Err(wrong_msg(msg)),
    }
}

fn validate_v1(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    require_active_signer(ctx, &ban_msg(msg)?.signer)
}

/// Every vote cast before the ban lands costs the voter a thousandth of the
/// minimum bond, paid into the reserve.
fn handle_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = ban_msg(msg)?;
    let Some(mut to_ban) = ctx.keeper.get_node_account(&msg.node_address)? else {
        return Err(RuntimeError::UnknownRequest(format!(
            "{} is not a node",
            msg.node_address
        )));
    };
    if to_ban.forced_to_leave {
        return Ok(());
    }
    if !matches!(to_ban.status, NodeStatus::Active | NodeStatus::Standby) {
        return Err(RuntimeError::UnknownRequest(format!(
            "cannot ban {}, it is {}",
            msg.node_address, to_ban.status
        )));
    }
    let Some(mut banner) = ctx.keeper.get_node_account(&msg.signer)? else {
        return Err(RuntimeError::Unauthorized(format!("{} is not a node", msg.signer)));
    };

    let mut voter = ctx.keeper.get_ban_voter(&msg.node_address)?;
    if !voter.has_signed(&msg.signer) && voter.block_height == 0 {
        let min_bond = ctx.config_uint(ConstantName::MinimumBondInRune)?;
        pay_from_bond(ctx, mgr, &mut banner, min_bond / 1_000)?;
    }

    voter.sign(&msg.signer);
    ctx.keeper.set_ban_voter(&voter)?;
    let active = ctx.keeper.list_active_validators()?;
    if !voter.has_consensus(&active) || voter.block_height > 0 {
        return Ok(());
    }
    voter.block_height = ctx.block_height();
    ctx.keeper.set_ban_voter(&voter)?;

    info!("banning {}", to_ban.node_address);
    to_ban.forced_to_leave = true;
    to_ban.leave_score = 1;
    ctx.keeper.set_node_account(&to_ban)
}
