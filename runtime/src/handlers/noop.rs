use {
    super::{wrong_msg, HandlerFn, HandlerTable, NO_VALIDATION},
    crate::{
        context::Context,
        error::Result,
        managers::Managers,
        msgs::Msg,
        versioned::VersionBranch,
    },
    log::*,
};

/// Action asking for the coins to be left out of the vault balance.
const NO_VAULT: &str = "novault";

pub(super) static NOOP: HandlerTable = HandlerTable {
    validate: NO_VALIDATION,
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_v1 as HandlerFn,
    }],
};

/// The inbound was already credited to its vault when observed; `novault`
/// takes that credit back.
fn handle_v1(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::NoOp(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    if !msg.action.eq_ignore_ascii_case(NO_VAULT) {
        return Ok(());
    }
    let pk = &msg.observed_tx.observed_pub_key;
    if !ctx.keeper.vault_exists(pk) {
        error!("no vault {} to take {} back from", pk, msg.observed_tx.tx.coins);
        return Ok(());
    }
    let mut vault = ctx.keeper.get_vault(pk)?;
    vault.sub_funds(&msg.observed_tx.tx.coins);
    ctx.keeper.set_vault(&vault)
}
