//! Node operator housekeeping: keys, version, ip address and the global
//! chain pause. Every change except the pause is paid for from the bond.

use {
    super::{require_active_signer, wrong_msg, HandlerFn, HandlerTable},
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        events::{BondType, Event},
        keeper::{BOND_NAME, RESERVE_NAME},
        managers::Managers,
        msgs::{Msg, MsgNodePauseChain, MsgSetIpAddress, MsgSetNodeKeys, MsgSetVersion},
        types::{NodeAccount, NodeStatus, VaultStatus},
        versioned::VersionBranch,
    },
    log::*,
    semver::Version,
    thornode_common::{math::has_super_majority, AccAddress, Asset, Coin, Coins, Tx, TxId, Uint},
    thornode_constants::ConstantName,
};

/// Mimir holding the height the node-requested pause ends at.
pub(crate) const NODE_PAUSE_CHAIN_GLOBAL: &str = "NodePauseChainGlobal";

pub(super) static PAUSE_CHAIN: HandlerTable = HandlerTable {
    validate: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: validate_pause_chain_v1 as HandlerFn,
    }],
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_pause_chain_v1 as HandlerFn,
    }],
};

pub(super) static SET_NODE_KEYS: HandlerTable = HandlerTable {
    validate: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: validate_node_keys_v1 as HandlerFn,
    }],
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_node_keys_v1 as HandlerFn,
    }],
};

pub(super) static SET_VERSION: HandlerTable = HandlerTable {
    validate: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: validate_version_v1 as HandlerFn,
    }],
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_version_v1 as HandlerFn,
    }],
};

pub(super) static SET_IP_ADDRESS: HandlerTable = HandlerTable {
    validate: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: validate_ip_address_v1 as HandlerFn,
    }],
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_ip_address_v1 as HandlerFn,
    }],
};

/// The node behind `signer`, provided its bond covers the native fee.
fn fee_paying_node(ctx: &Context, signer: &AccAddress) -> Result<NodeAccount> {
    let node = ctx
        .keeper
        .get_node_account(signer)?
        .filter(|n| !n.is_empty())
        .ok_or_else(|| RuntimeError::Unauthorized(format!("{signer} is not a node")))?;
    let cost = ctx.config_uint(ConstantName::NativeTransactionFee)?;
    if node.bond < cost {
        return Err(RuntimeError::Unauthorized("not enough bond".to_string()));
    }
    Ok(node)
}

/// Take `cost` out of the bond of `node` into the reserve and save the node.
pub(super) fn pay_from_bond(ctx: &mut Context, mgr: &Managers, node: &mut NodeAccount, cost: Uint) -> Result<()> {
    let cost = node.sub_bond(cost);
    ctx.keeper.set_node_account(node)?;
    if cost > 0 {
        ctx.keeper.send_from_module_to_module(
            BOND_NAME,
            RESERVE_NAME,
            &Coins::new(vec![Coin::new(Asset::rune(), cost)]),
        )?;
    }
    let mut providers = ctx.keeper.get_bond_providers(&node.node_address)?;
    providers.adjust(node.bond);
    ctx.keeper.set_bond_providers(&providers)?;

    let mut tx = Tx::default();
    tx.id = TxId::blank();
    tx.from_address = node.bond_address.clone();
    mgr.events.emit(
        ctx,
        Event::Bond {
            amount: cost,
            bond_type: BondType::BondCost,
            tx_in: tx,
        },
    );
    Ok(())
}

/// Charge `node` the native transaction fee.
pub(super) fn pay_native_fee(ctx: &mut Context, mgr: &Managers, node: &mut NodeAccount) -> Result<()> {
    let cost = ctx.config_uint(ConstantName::NativeTransactionFee)?;
    pay_from_bond(ctx, mgr, node, cost)
}

fn validate_pause_chain_v1(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::NodePauseChain(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    require_active_signer(ctx, &msg.signer)
}

/// Each node may pause or resume once per churn. A pause extends the
/// current one by `NodePauseChainBlocks`, a resume shortens it by as much.
fn handle_pause_chain_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::NodePauseChain(MsgNodePauseChain { value, signer }) = msg else {
        return Err(wrong_msg(msg));
    };
    let last_churn = ctx
        .keeper
        .get_asgard_vaults_by_status(VaultStatus::Active)?
        .iter()
        .map(|v| v.status_since)
        .max()
        .unwrap_or(-1);
    let node_height = ctx.keeper.get_node_pause_chain(signer)?;
    if node_height > 0 && node_height > last_churn {
        return Err(RuntimeError::UnknownRequest(
            "node has already paused or resumed since the last churn".to_string(),
        ));
    }

    let height = ctx.block_height();
    let blocks = ctx.config_i64(ConstantName::NodePauseChainBlocks)?;
    let mut pause_height = ctx.keeper.get_mimir(NODE_PAUSE_CHAIN_GLOBAL)?.unwrap_or_default();
    if *value > 0 {
        pause_height = if pause_height > height {
            pause_height + blocks
        } else {
            height + blocks
        };
        ctx.keeper.set_node_pause_chain(signer, height)?;
        info!("{} paused the chains until {}", signer, pause_height);
    } else if *value < 0 && pause_height > height {
        pause_height -= blocks;
        ctx.keeper.set_node_pause_chain(signer, height)?;
        info!("{} resumed the chains, pause now ends at {}", signer, pause_height);
    }

    ctx.keeper.set_mimir(NODE_PAUSE_CHAIN_GLOBAL, pause_height)?;
    mgr.events.emit(
        ctx,
        Event::SetMimir {
            key: NODE_PAUSE_CHAIN_GLOBAL.to_uppercase(),
            value: pause_height,
        },
    );
    Ok(())
}

fn node_keys_msg(msg: &Msg) -> Result<&MsgSetNodeKeys> {
    match msg {
        Msg::SetNodeKeys(m) => Ok(m),
        _ => Err(wrong_msg(msg)),
    }
}

fn validate_node_keys_v1(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = node_keys_msg(msg)?;
    let node = fee_paying_node(ctx, &msg.signer)?;
    if matches!(node.status, NodeStatus::Active | NodeStatus::Disabled) {
        return Err(RuntimeError::UnknownRequest(format!(
            "node {} is {}, so it can't update itself",
            node.node_address, node.status
        )));
    }
    if !node.pub_key_set.is_empty() {
        return Err(RuntimeError::UnknownRequest(format!(
            "node {} already has pubkey set assigned",
            node.node_address
        )));
    }
    let keys = &msg.pub_key_set;
    for other in ctx.keeper.list_node_accounts()? {
        if other.validator_cons_pub_key == msg.validator_cons_pub_key
            || other.pub_key_set.contains(&keys.secp256k1)
            || other.pub_key_set.contains(&keys.ed25519)
        {
            return Err(RuntimeError::UnknownRequest(format!(
                "keys already in use by {}",
                other.node_address
            )));
        }
    }
    Ok(())
}

fn handle_node_keys_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = node_keys_msg(msg)?;
    let mut node = fee_paying_node(ctx, &msg.signer)?;
    node.update_status(NodeStatus::Standby, ctx.block_height());
    node.pub_key_set = msg.pub_key_set.clone();
    node.validator_cons_pub_key = msg.validator_cons_pub_key.clone();
    pay_native_fee(ctx, mgr, &mut node)?;
    mgr.events.emit(
        ctx,
        Event::SetNodeKeys {
            node_address: node.node_address.clone(),
        },
    );
    Ok(())
}

fn version_msg(msg: &Msg) -> Result<&MsgSetVersion> {
    match msg {
        Msg::SetVersion(m) => Ok(m),
        _ => Err(wrong_msg(msg)),
    }
}

fn parse_version(raw: &str) -> Result<Version> {
    let version = Version::parse(raw)
        .map_err(|_| RuntimeError::UnknownRequest(format!("{raw} is invalid")))?;
    if !version.pre.is_empty() || !version.build.is_empty() {
        return Err(RuntimeError::UnknownRequest(
            "pre-release and build versions are not used".to_string(),
        ));
    }
    Ok(version)
}

fn validate_version_v1(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = version_msg(msg)?;
    parse_version(&msg.version)?;
    fee_paying_node(ctx, &msg.signer).map(|_| ())
}

/// Highest version run by a super majority of `active`.
pub(crate) fn min_join_version(active: &[NodeAccount]) -> Option<Version> {
    let mut versions: Vec<Version> = active.iter().map(|n| n.get_version()).collect();
    versions.sort();
    versions.dedup();
    versions.into_iter().rev().find(|v| {
        let count = active.iter().filter(|n| n.get_version() >= *v).count();
        has_super_majority(count, active.len())
    })
}

fn handle_version_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = version_msg(msg)?;
    let version = parse_version(&msg.version)?;
    let mut node = fee_paying_node(ctx, &msg.signer)?;
    // versions never go backwards
    if node.get_version() < version {
        node.version = version.to_string();
    }
    pay_native_fee(ctx, mgr, &mut node)?;
    mgr.events.emit(
        ctx,
        Event::SetVersion {
            node_address: node.node_address.clone(),
            version: msg.version.clone(),
        },
    );

    if node.is_active() {
        let active = ctx.keeper.list_active_validators()?;
        if let Some(min_version) = min_join_version(&active) {
            if ctx.keeper.get_min_join_version()?.as_ref() != Some(&min_version) {
                info!("minimum join version is now {}", min_version);
                ctx.keeper.set_min_join_version(&min_version)?;
            }
        }
    }
    Ok(())
}

fn ip_address_msg(msg: &Msg) -> Result<&MsgSetIpAddress> {
    match msg {
        Msg::SetIpAddress(m) => Ok(m),
        _ => Err(wrong_msg(msg)),
    }
}

fn validate_ip_address_v1(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    fee_paying_node(ctx, &ip_address_msg(msg)?.signer).map(|_| ())
}

fn handle_ip_address_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = ip_address_msg(msg)?;
    let mut node = fee_paying_node(ctx, &msg.signer)?;
    node.ip_address = msg.ip_address.clone();
    pay_native_fee(ctx, mgr, &mut node)?;
    mgr.events.emit(
        ctx,
        Event::SetIpAddress {
            node_address: node.node_address.clone(),
            ip_address: msg.ip_address.clone(),
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{handlers::external_handler, test_utils::*},
        assert_matches::assert_matches,
        thornode_common::{Chain, PubKey, PubKeySet, ONE},
    };

    const FEE: Uint = 2_000_000;

    fn set_version(ctx: &mut Context, mgr: &Managers, signer: usize, version: &str) -> Result<()> {
        let msg = Msg::SetVersion(MsgSetVersion {
            version: version.to_string(),
            signer: node_address(signer),
        });
        external_handler(ctx, mgr, msg)
    }

    fn pause(ctx: &mut Context, mgr: &Managers, signer: usize, value: i64) -> Result<()> {
        let msg = Msg::NodePauseChain(MsgNodePauseChain {
            value,
            signer: node_address(signer),
        });
        external_handler(ctx, mgr, msg)
    }

    #[test]
    fn test_set_ip_address_charges_bond() {
        let mut ctx = test_context(10);
        let mgr = Managers::default();
        add_active_nodes(&mut ctx, 1);
        let msg = Msg::SetIpAddress(MsgSetIpAddress {
            ip_address: "192.168.0.7".to_string(),
            signer: node_address(0),
        });
        external_handler(&mut ctx, &mgr, msg).unwrap();

        let node = ctx.keeper.get_node_account(&node_address(0)).unwrap().unwrap();
        assert_eq!(node.ip_address, "192.168.0.7");
        assert_eq!(node.bond, 1_000 * ONE - FEE);
        assert_eq!(ctx.keeper.get_rune_balance_of_module(RESERVE_NAME).unwrap(), FEE);
        assert!(ctx
            .keeper
            .store()
            .events()
            .iter()
            .any(|e| matches!(e, Event::SetIpAddress { ip_address, .. } if ip_address == "192.168.0.7")));
    }

    #[test]
    fn test_node_without_bond_cannot_pay() {
        let mut ctx = test_context(10);
        let mgr = Managers::default();
        let node = node_account(0, NodeStatus::Standby, FEE - 1);
        ctx.keeper.set_node_account(&node).unwrap();
        assert_matches!(
            set_version(&mut ctx, &mgr, 0, "1.112.0"),
            Err(RuntimeError::Unauthorized(_))
        );
    }

    #[test]
    fn test_set_version_moves_min_join_version() {
        let mut ctx = test_context(10);
        let mgr = Managers::default();
        add_active_nodes(&mut ctx, 4);

        set_version(&mut ctx, &mgr, 0, "1.112.0").unwrap();
        set_version(&mut ctx, &mgr, 1, "1.112.0").unwrap();
        assert_eq!(
            ctx.keeper.get_min_join_version().unwrap(),
            Some(Version::new(1, 111, 0))
        );
        set_version(&mut ctx, &mgr, 2, "1.112.0").unwrap();
        assert_eq!(
            ctx.keeper.get_min_join_version().unwrap(),
            Some(Version::new(1, 112, 0))
        );

        // an older version is paid for but not applied
        set_version(&mut ctx, &mgr, 0, "1.110.0").unwrap();
        let node = ctx.keeper.get_node_account(&node_address(0)).unwrap().unwrap();
        assert_eq!(node.version, "1.112.0");
        assert_eq!(node.bond, 1_000 * ONE - 2 * FEE);

        assert_matches!(
            set_version(&mut ctx, &mgr, 0, "1.113.0-rc1"),
            Err(RuntimeError::UnknownRequest(_))
        );
    }

    #[test]
    fn test_set_node_keys() {
        let mut ctx = test_context(10);
        let mgr = Managers::default();
        add_active_nodes(&mut ctx, 1);
        let mut fresh = node_account(5, NodeStatus::Whitelisted, ONE);
        fresh.pub_key_set = PubKeySet::default();
        fresh.validator_cons_pub_key.clear();
        ctx.keeper.set_node_account(&fresh).unwrap();

        let keys = |signer: usize, pk: &str| {
            let pk = PubKey::new(pk).unwrap();
            Msg::SetNodeKeys(MsgSetNodeKeys {
                pub_key_set: PubKeySet::new(pk.clone(), pk),
                validator_cons_pub_key: format!("thorvalcons{signer}x"),
                signer: node_address(signer),
            })
        };
        // reusing the keys of node 0
        assert_matches!(
            external_handler(&mut ctx, &mgr, keys(5, "nodepk0")),
            Err(RuntimeError::UnknownRequest(_))
        );
        // active nodes cannot rotate keys
        assert_matches!(
            external_handler(&mut ctx, &mgr, keys(0, "otherpk")),
            Err(RuntimeError::UnknownRequest(_))
        );

        external_handler(&mut ctx, &mgr, keys(5, "freshpk")).unwrap();
        let node = ctx.keeper.get_node_account(&node_address(5)).unwrap().unwrap();
        assert_eq!(node.status, NodeStatus::Standby);
        assert_eq!(node.pub_key_set.secp256k1, PubKey::new("freshpk").unwrap());
        assert_eq!(node.bond, ONE - FEE);
    }

    #[test]
    fn test_pause_and_resume_chains() {
        let mut ctx = test_context(10);
        let mgr = Managers::default();
        add_active_nodes(&mut ctx, 4);

        pause(&mut ctx, &mgr, 0, 1).unwrap();
        assert_eq!(ctx.keeper.get_mimir(NODE_PAUSE_CHAIN_GLOBAL).unwrap(), Some(730));
        assert!(ctx.is_chain_halted(Chain::BTC).unwrap());

        // once per churn
        assert_matches!(pause(&mut ctx, &mgr, 0, 1), Err(RuntimeError::UnknownRequest(_)));

        pause(&mut ctx, &mgr, 1, 1).unwrap();
        assert_eq!(ctx.keeper.get_mimir(NODE_PAUSE_CHAIN_GLOBAL).unwrap(), Some(1_450));

        pause(&mut ctx, &mgr, 2, -1).unwrap();
        pause(&mut ctx, &mgr, 3, -1).unwrap();
        assert_eq!(ctx.keeper.get_mimir(NODE_PAUSE_CHAIN_GLOBAL).unwrap(), Some(10));
        assert!(!ctx.is_chain_halted(Chain::BTC).unwrap());

        // standby nodes have no say
        let standby = node_account(7, NodeStatus::Standby, ONE);
        ctx.keeper.set_node_account(&standby).unwrap();
        assert_matches!(pause(&mut ctx, &mgr, 7, 1), Err(RuntimeError::Unauthorized(_)));
    }
}
