//! Governance overrides. Admins set a key outright; nodes vote and the value
//! a super majority of active nodes agrees on is locked in.

use {
    super::{node::pay_native_fee, require_active_signer, wrong_msg, HandlerFn, HandlerTable},
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        events::Event,
        managers::Managers,
        msgs::{Msg, MsgMimir},
        types::NodeAccount,
        versioned::VersionBranch,
    },
    log::*,
    std::collections::BTreeMap,
    thornode_common::{math::has_super_majority, AccAddress},
    thornode_constants::is_admin,
};

const MAX_KEY_LENGTH: usize = 64;

pub(super) static MIMIR: HandlerTable = HandlerTable {
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

fn mimir_msg(msg: &Msg) -> Result<&MsgMimir> {
    match msg {
        Msg::Mimir(m) => Ok(m),
        _ => Err(wrong_msg(msg)),
    }
}

/// Value a super majority of `active` voted for, if any.
pub(crate) fn node_mimir_consensus(
    votes: &BTreeMap<AccAddress, i64>,
    active: &[NodeAccount],
) -> Option<i64> {
    let mut tally: BTreeMap<i64, usize> = BTreeMap::new();
    for node in active {
        if let Some(value) = votes.get(&node.node_address) {
            *tally.entry(*value).or_default() += 1;
        }
    }
    tally
        .into_iter()
        .find(|(_, count)| has_super_majority(*count, active.len()))
        .map(|(value, _)| value)
}

fn validate_v1(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = mimir_msg(msg)?;
    if msg.key.len() > MAX_KEY_LENGTH {
        return Err(RuntimeError::UnknownRequest("invalid mimir key".to_string()));
    }
    if is_admin(msg.signer.as_str()) {
        return Ok(());
    }
    require_active_signer(ctx, &msg.signer)
}

fn handle_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = mimir_msg(msg)?;
    info!("mimir {} = {} from {}", msg.key, msg.value, msg.signer);
    if is_admin(msg.signer.as_str()) {
        set_by_admin(ctx, mgr, msg)
    } else {
        vote_by_node(ctx, mgr, msg)
    }
}

fn emit_set_mimir(ctx: &mut Context, mgr: &Managers, key: &str, value: i64) {
    mgr.events.emit(
        ctx,
        Event::SetMimir {
            key: key.to_uppercase(),
            value,
        },
    );
}

fn set_by_admin(ctx: &mut Context, mgr: &Managers, msg: &MsgMimir) -> Result<()> {
    let current = ctx.keeper.get_mimir(&msg.key)?;
    if current == Some(msg.value) {
        return Ok(());
    }
    let votes = ctx.keeper.get_node_mimirs(&msg.key)?;
    let active = ctx.keeper.list_active_validators()?;
    if let Some(voted) = node_mimir_consensus(&votes, &active) {
        if voted != msg.value {
            info!("admin cannot override {} voted to {} by the nodes", msg.key, voted);
            return Ok(());
        }
    }

    if msg.value < 0 {
        ctx.keeper.delete_mimir(&msg.key);
    } else {
        ctx.keeper.set_mimir(&msg.key, msg.value)?;
    }
    emit_set_mimir(ctx, mgr, &msg.key, msg.value);
    Ok(())
}

/// Every vote is paid for, a repeated one too, since it may be needed to
/// confirm a super majority after the active set shrank.
fn vote_by_node(ctx: &mut Context, mgr: &Managers, msg: &MsgMimir) -> Result<()> {
    let Some(mut node) = ctx.keeper.get_node_account(&msg.signer)? else {
        return Err(RuntimeError::Unauthorized(format!("{} is not authorized", msg.signer)));
    };
    pay_native_fee(ctx, mgr, &mut node)?;
    ctx.keeper.set_node_mimir(&msg.key, msg.value, &msg.signer)?;
    mgr.events.emit(
        ctx,
        Event::SetNodeMimir {
            key: msg.key.to_uppercase(),
            value: msg.value,
            node_address: msg.signer.clone(),
        },
    );

    let current = ctx.keeper.get_mimir(&msg.key)?;
    if current == Some(msg.value) {
        return Ok(());
    }
    let votes = ctx.keeper.get_node_mimirs(&msg.key)?;
    let active = ctx.keeper.list_active_validators()?;
    let Some(voted) = node_mimir_consensus(&votes, &active) else {
        return Ok(());
    };
    if current == Some(voted) {
        return Ok(());
    }
    info!("nodes voted {} to {}", msg.key, voted);
    ctx.keeper.set_mimir(&msg.key, voted)?;
    emit_set_mimir(ctx, mgr, &msg.key, voted);
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{handlers::external_handler, keeper::RESERVE_NAME, test_utils::*},
        assert_matches::assert_matches,
        thornode_common::ONE,
        thornode_constants::ConstantName,
    };

    fn admin() -> AccAddress {
        AccAddress::new("thoradmin").unwrap()
    }

    fn mimir(ctx: &mut Context, mgr: &Managers, signer: AccAddress, key: &str, value: i64) -> Result<()> {
        let msg = Msg::Mimir(MsgMimir {
            key: key.to_string(),
            value,
            signer,
        });
        external_handler(ctx, mgr, msg)
    }

    #[test]
    fn test_admin_sets_and_deletes() {
        let mut ctx = test_context(10);
        let mgr = Managers::default();
        mimir(&mut ctx, &mgr, admin(), "ChurnInterval", 100).unwrap();
        assert_eq!(ctx.keeper.get_mimir("ChurnInterval").unwrap(), Some(100));
        assert_eq!(ctx.config_i64(ConstantName::ChurnInterval).unwrap(), 100);
        assert!(ctx
            .keeper
            .store()
            .events()
            .iter()
            .any(|e| matches!(e, Event::SetMimir { key, value: 100 } if key == "CHURNINTERVAL")));

        mimir(&mut ctx, &mgr, admin(), "ChurnInterval", -1).unwrap();
        assert_eq!(ctx.keeper.get_mimir("ChurnInterval").unwrap(), None);
        assert_eq!(ctx.config_i64(ConstantName::ChurnInterval).unwrap(), 43_200);
    }

    #[test]
    fn test_node_votes_apply_on_super_majority() {
        let mut ctx = test_context(10);
        let mgr = Managers::default();
        add_active_nodes(&mut ctx, 4);

        mimir(&mut ctx, &mgr, node_address(0), "HaltBTCChain", 5).unwrap();
        mimir(&mut ctx, &mgr, node_address(1), "HaltBTCChain", 5).unwrap();
        mimir(&mut ctx, &mgr, node_address(2), "HaltBTCChain", 6).unwrap();
        assert_eq!(ctx.keeper.get_mimir("HaltBTCChain").unwrap(), None);

        mimir(&mut ctx, &mgr, node_address(3), "HaltBTCChain", 5).unwrap();
        assert_eq!(ctx.keeper.get_mimir("HaltBTCChain").unwrap(), Some(5));

        // every vote cost the native fee
        assert_eq!(
            ctx.keeper.get_rune_balance_of_module(RESERVE_NAME).unwrap(),
            4 * 2_000_000
        );
        let node = ctx.keeper.get_node_account(&node_address(2)).unwrap().unwrap();
        assert_eq!(node.bond, 1_000 * ONE - 2_000_000);

        // the admin cannot undo what the nodes voted
        mimir(&mut ctx, &mgr, admin(), "HaltBTCChain", 0).unwrap();
        assert_eq!(ctx.keeper.get_mimir("HaltBTCChain").unwrap(), Some(5));
    }

    #[test]
    fn test_standby_node_cannot_vote() {
        let mut ctx = test_context(10);
        let mgr = Managers::default();
        add_active_nodes(&mut ctx, 4);
        let standby = node_account(9, crate::types::NodeStatus::Standby, 1_000 * ONE);
        ctx.keeper.set_node_account(&standby).unwrap();
        assert_matches!(
            mimir(&mut ctx, &mgr, node_address(9), "ChurnInterval", 5),
            Err(RuntimeError::Unauthorized(_))
        );
        assert!(ctx.keeper.get_node_mimirs("ChurnInterval").unwrap().is_empty());
    }
}
