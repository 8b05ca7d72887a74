use {
    super::{wrong_msg, HandlerFn, HandlerTable},
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        events::Event,
        managers::Managers,
        msgs::{Msg, MsgReserveContributor},
        versioned::VersionBranch,
    },
    log::*,
    thornode_common::Chain,
};

pub(super) static RESERVE_CONTRIBUTOR: HandlerTable = HandlerTable {
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

fn reserve_msg(msg: &Msg) -> Result<&MsgReserveContributor> {
    match msg {
        Msg::ReserveContributor(m) => Ok(m),
        _ => Err(wrong_msg(msg)),
    }
}

/// Only native rune can be contributed; the deposit already moved it into
/// the reserve.
fn validate_v1(_ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = reserve_msg(msg)?;
    if msg.tx.chain != Chain::THOR {
        return Err(RuntimeError::UnknownRequest(format!(
            "reserve contributions are only accepted on THORChain, not {}",
            msg.tx.chain
        )));
    }
    Ok(())
}

fn handle_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = reserve_msg(msg)?;
    info!(
        "{} contributed {} to the reserve",
        msg.contributor.address, msg.contributor.amount
    );
    ctx.keeper.add_reserve_contributor(&msg.contributor)?;
    mgr.events.emit(
        ctx,
        Event::ReserveContribution {
            contributor: msg.contributor.address.clone(),
            amount: msg.contributor.amount,
            in_tx: msg.tx.clone(),
        },
    );
    Ok(())
}
