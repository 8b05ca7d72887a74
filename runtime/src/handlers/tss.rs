//! TSS ceremony results reported by the vault members.
//!
//! A keygen result is voted on by the members of the keygen. A super
//! majority agreeing on a new pool key creates the vault; it is only
//! activated once every member has reported and every keygen requested in
//! the same block has produced its vault. A failed keygen or keysign
//! punishes the nodes the members blame.

use {
    super::{is_active_signer, wrong_msg, HandlerFn, HandlerTable},
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        events::{BondType, Event},
        keeper::{BOND_NAME, RESERVE_NAME},
        managers::Managers,
        msgs::{Msg, MsgTssKeysignFail, MsgTssPool},
        types::{
            Keygen, KeygenType, NodeAccount, NodeStatus, TssVoter, Vault, VaultStatus, VaultType,
        },
        versioned::VersionBranch,
    },
    log::*,
    thornode_common::{
        math::{get_median, get_uncapped_share, has_simple_majority},
        AccAddress, Asset, Coin, Coins, PubKey, Tx, TxId, Uint,
    },
    thornode_constants::ConstantName,
};

pub(super) static TSS_POOL: HandlerTable = HandlerTable {
    validate: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: validate_tss_pool_v1 as HandlerFn,
    }],
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_tss_pool_v1 as HandlerFn,
    }],
};

pub(super) static KEYSIGN_FAIL: HandlerTable = HandlerTable {
    validate: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: validate_keysign_fail_v1 as HandlerFn,
    }],
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_keysign_fail_v1 as HandlerFn,
    }],
};

fn tss_pool_msg(msg: &Msg) -> Result<&MsgTssPool> {
    match msg {
        Msg::TssPool(m) => Ok(m),
        _ => Err(wrong_msg(msg)),
    }
}

fn keysign_fail_msg(msg: &Msg) -> Result<&MsgTssKeysignFail> {
    match msg {
        Msg::TssKeysignFail(m) => Ok(m),
        _ => Err(wrong_msg(msg)),
    }
}

/// Node that owns `pk`, failing when no node does.
fn node_of(ctx: &Context, pk: &PubKey) -> Result<NodeAccount> {
    ctx.keeper
        .get_node_account_by_pub_key(pk)?
        .ok_or_else(|| RuntimeError::internal("fail to get node account", format!("no node with pub key {pk}")))
}

fn validate_tss_pool_v1(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = tss_pool_msg(msg)?;
    if MsgTssPool::tss_id(msg.height, &msg.pool_pub_key, &msg.pub_keys, &msg.blame) != msg.id {
        return Err(RuntimeError::UnknownRequest("invalid tss message".to_string()));
    }

    let retry = ctx.config_i64(ConstantName::ChurnRetryInterval)?;
    if msg.height <= ctx.block_height() - retry {
        return Err(RuntimeError::UnknownRequest(format!(
            "keygen at {} is too old",
            msg.height
        )));
    }

    let block = ctx.keeper.get_keygen_block(msg.height)?;
    let keygen = Keygen::new(msg.height, msg.pub_keys.clone(), msg.keygen_type);
    if !block.contains(&keygen) {
        return Err(RuntimeError::Unauthorized(format!(
            "no keygen at {} with these members",
            msg.height
        )));
    }

    let Some(node) = ctx.keeper.get_node_account(&msg.signer)? else {
        return Err(RuntimeError::Unauthorized(format!("{} is not a node", msg.signer)));
    };
    if !keygen.members.contains(&node.pub_key_set.secp256k1) {
        return Err(RuntimeError::Unauthorized(format!(
            "{} is not a member of the keygen",
            msg.signer
        )));
    }
    if !matches!(node.status, NodeStatus::Active | NodeStatus::Ready) {
        return Err(RuntimeError::Unauthorized(format!(
            "{} is {}, not active or ready",
            msg.signer, node.status
        )));
    }
    let min_bond = ctx.config_uint(ConstantName::MinimumBondInRune)?;
    if node.bond < min_bond {
        return Err(RuntimeError::Unauthorized(format!(
            "{} has not bonded the minimum",
            msg.signer
        )));
    }
    Ok(())
}

/// Punish members that had not reported when a super majority agreed, and
/// forgive them once their report arrives.
fn judge_late_signer(ctx: &mut Context, mgr: &Managers, msg: &MsgTssPool, voter: &mut TssVoter) -> Result<()> {
    let points = ctx.config_i64(ConstantName::FailKeygenSlashPoints)?;
    if voter.majority_consensus_block_height > 0 {
        mgr.slasher.dec_slash_points(ctx, points, &[msg.signer.clone()])?;
        return ctx.keeper.release_node_account_from_jail(&msg.signer);
    }

    voter.majority_consensus_block_height = ctx.block_height();
    ctx.keeper.set_tss_voter(voter)?;
    let jail_time = ctx.config_i64(ConstantName::JailTimeKeygen)?;
    for member in msg.pub_keys.iter() {
        let Some(node) = ctx.keeper.get_node_account_by_pub_key(member)? else {
            warn!("keygen member {} has no node account", member);
            continue;
        };
        if voter.has_signed(&node.node_address) {
            continue;
        }
        mgr.slasher
            .inc_slash_points(ctx, points, &[node.node_address.clone()], "late keygen")?;
        ctx.keeper.set_node_account_jail(
            &node.node_address,
            ctx.block_height(),
            jail_time,
            "failed to vote keygen in time",
        )?;
    }
    Ok(())
}

fn create_vault(ctx: &mut Context, mgr: &Managers, msg: &MsgTssPool, voter: &TssVoter) -> Result<()> {
    info!("tss keygen at {} produced {}", msg.height, msg.pool_pub_key);
    let vault_type = match msg.keygen_type {
        KeygenType::Asgard => VaultType::Asgard,
        KeygenType::Yggdrasil => VaultType::Yggdrasil,
    };
    let chains = voter.consensus_chains();
    let routers = ctx
        .keeper
        .get_chain_contracts()?
        .into_iter()
        .filter(|c| chains.contains(&c.chain))
        .collect();
    let mut vault = Vault::new(
        ctx.block_height(),
        VaultStatus::Init,
        vault_type,
        voter.pool_pub_key.clone(),
        chains,
        routers,
    );
    vault.membership = voter.pub_keys.clone();
    ctx.keeper.set_vault(&vault)?;
    mgr.events.emit(
        ctx,
        Event::TssKeygenSuccess {
            pub_key: vault.pub_key.clone(),
            members: vault.membership.clone(),
            height: msg.height,
        },
    );

    let durations: Vec<i64> = ctx
        .keeper
        .get_tss_metric(voter.pool_pub_key.as_str())?
        .into_values()
        .collect();
    mgr.events.emit(
        ctx,
        Event::TssKeygenMetric {
            pub_key: voter.pool_pub_key.clone(),
            median_duration_ms: get_median(&durations),
        },
    );

    let block = ctx.keeper.get_keygen_block(msg.height)?;
    let init = ctx.keeper.get_asgard_vaults_by_status(VaultStatus::Init)?;
    if init.len() != block.keygens.len() {
        info!(
            "waiting for keygens, expecting {} have {}",
            block.keygens.len(),
            init.len()
        );
        return Ok(());
    }
    info!("all keygens of block {} are in, churning {} asgards", msg.height, init.len());
    for vault in init {
        mgr.network.rotate_vault(ctx, vault)?;
    }
    Ok(())
}

fn punish_keygen_failure(ctx: &mut Context, mgr: &Managers, msg: &MsgTssPool) -> Result<()> {
    let points = ctx.config_i64(ConstantName::FailKeygenSlashPoints)?;
    let jail_time = ctx.config_i64(ConstantName::JailTimeKeygen)?;
    mgr.events.emit(
        ctx,
        Event::TssKeygenFailure {
            fail_reason: msg.blame.fail_reason.clone(),
            is_unicast: msg.blame.is_unicast,
            blame_nodes: msg.blame.pub_keys(),
            round: msg.blame.round.clone(),
            height: msg.height,
        },
    );

    for pk in msg.blame.pub_keys() {
        let mut node = node_of(ctx, &pk)?;
        if node.status == NodeStatus::Active {
            ctx.keeper
                .inc_node_account_slash_points(&node.node_address, points)?;
            mgr.events.emit(
                ctx,
                Event::SlashPoint {
                    node_address: node.node_address.clone(),
                    slash_points: points,
                    reason: "fail keygen".to_string(),
                },
            );
            continue;
        }

        ctx.keeper.set_node_account_jail(
            &node.node_address,
            ctx.block_height(),
            jail_time,
            "failed to perform keygen",
        )?;
        let network = ctx.keeper.get_network()?;
        let slash = get_uncapped_share(
            points.max(0) as Uint,
            network.total_bond_units,
            network.bond_reward_rune,
        );
        let slash = node.sub_bond(slash);
        info!("fail keygen, slash {} of {} bond", slash, node.node_address);
        if slash > 0 {
            ctx.keeper.send_from_module_to_module(
                BOND_NAME,
                RESERVE_NAME,
                &Coins::new(vec![Coin::new(Asset::rune(), slash)]),
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
                amount: slash,
                bond_type: BondType::BondCost,
                tx_in: tx,
            },
        );
        ctx.keeper.set_node_account(&node)?;
    }
    Ok(())
}

fn handle_tss_pool_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = tss_pool_msg(msg)?;
    if !msg.blame.is_empty() {
        warn!(
            "keygen {} blamed {:?}: {}",
            msg.id,
            msg.blame.pub_keys(),
            msg.blame.fail_reason
        );
    }
    if msg.is_success() && msg.keygen_time_ms > 0 {
        ctx.keeper
            .set_tss_metric(msg.pool_pub_key.as_str(), &msg.signer, msg.keygen_time_ms)?;
    }

    let mut voter = match ctx.keeper.get_tss_voter(&msg.id)? {
        Some(voter) => voter,
        None => TssVoter::new(msg.id.clone(), msg.pub_keys.clone(), msg.pool_pub_key.clone()),
    };
    if voter.pool_pub_key != msg.pool_pub_key {
        return Err(RuntimeError::UnknownRequest("invalid pool pubkey".to_string()));
    }
    voter.keygen_type = msg.keygen_type;
    voter.blame = msg.blame.clone();

    let observe_points = ctx.config_i64(ConstantName::ObserveSlashPoints)?;
    let flexibility = ctx.config_i64(ConstantName::ObservationDelayFlexibility)?;
    mgr.slasher
        .inc_slash_points(ctx, observe_points, &[msg.signer.clone()], "observe tss pool")?;

    if !voter.sign(&msg.signer, msg.chains.clone()) {
        info!("{} already signed tss pool {}", msg.signer, msg.id);
        return Ok(());
    }
    ctx.keeper.set_tss_voter(&voter)?;

    if !voter.has_consensus() {
        return Ok(());
    }

    if msg.is_success() {
        judge_late_signer(ctx, mgr, msg, &mut voter)?;
        if !voter.has_complete_consensus() {
            return Ok(());
        }
    }

    if voter.block_height == 0 {
        voter.block_height = ctx.block_height();
        ctx.keeper.set_tss_voter(&voter)?;
        mgr.slasher
            .dec_slash_points(ctx, observe_points, &voter.signers)?;
        if msg.is_success() {
            create_vault(ctx, mgr, msg, &voter)?;
        } else {
            punish_keygen_failure(ctx, mgr, msg)?;
        }
        return Ok(());
    }

    if voter.block_height + flexibility >= ctx.block_height() {
        mgr.slasher
            .dec_slash_points(ctx, observe_points, &[msg.signer.clone()])?;
    }
    Ok(())
}

/// Whether `signer` is a member of a retiring asgard; those may still be
/// asked to sign while they are no longer active.
fn is_retiring_member(ctx: &Context, signer: &AccAddress) -> Result<bool> {
    let Some(node) = ctx.keeper.get_node_account(signer)? else {
        return Ok(false);
    };
    Ok(ctx
        .keeper
        .get_asgard_vaults_by_status(VaultStatus::Retiring)?
        .iter()
        .any(|v| v.contains(&node.pub_key_set.secp256k1)))
}

fn validate_keysign_fail_v1(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = keysign_fail_msg(msg)?;
    let id = MsgTssKeysignFail::keysign_id(msg.height, &msg.blame, &msg.memo, &msg.coins, &msg.pub_key);
    if !id.eq_ignore_ascii_case(&msg.id) {
        return Err(RuntimeError::UnknownRequest("invalid keysign fail message".to_string()));
    }
    if !is_active_signer(ctx, &msg.signer)? {
        if !is_retiring_member(ctx, &msg.signer)? {
            return Err(RuntimeError::Unauthorized(format!(
                "{} is not an active validator",
                msg.signer
            )));
        }
        info!("keysign failure from retiring vault member {}", msg.signer);
    }

    let active = ctx.keeper.list_active_validators()?.len();
    let blamed = msg.blame.blame_nodes.len();
    if ctx.config_i64(ConstantName::AllowWideBlame)? == 0
        && !has_simple_majority(active.saturating_sub(blamed), active)
    {
        return Err(RuntimeError::UnknownRequest(format!(
            "blame cast too wide: {blamed}/{active}"
        )));
    }
    Ok(())
}

fn handle_keysign_fail_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = keysign_fail_msg(msg)?;
    let mut voter = ctx.keeper.get_tss_keysign_fail_voter(&msg.id, msg.height)?;
    let observe_points = ctx.config_i64(ConstantName::ObserveSlashPoints)?;
    mgr.slasher
        .inc_slash_points(ctx, observe_points, &[msg.signer.clone()], "observe keysign failure")?;

    if !voter.sign(&msg.signer) {
        info!("{} already signed keysign failure {}", msg.signer, msg.id);
        return Ok(());
    }
    if msg.blame.is_round7() {
        voter.round7_count += 1;
    }
    ctx.keeper.set_tss_keysign_fail_voter(&voter)?;

    if !ctx.keeper.vault_exists(&msg.pub_key) {
        return Ok(());
    }
    let mut vault = ctx.keeper.get_vault(&msg.pub_key)?;
    let members = vault
        .membership
        .iter()
        .map(|pk| node_of(ctx, pk))
        .collect::<Result<Vec<_>>>()?;
    if !voter.has_consensus(&members) {
        return Ok(());
    }
    info!(
        "keysign failure {} has consensus, round {} blamed {:?}: {}",
        msg.id,
        msg.blame.round,
        msg.blame.pub_keys(),
        msg.blame.fail_reason
    );

    // A final round failure may have leaked a signature share; stop using
    // the vault for the affected chains.
    if voter.round7_count > 1 || (voter.round7_count > 0 && voter.signers.len() <= 2) {
        for coin in msg.coins.iter() {
            let chain = coin.asset.get_chain();
            if !vault.frozen.contains(&chain) {
                warn!("freezing {} on vault {}", chain, vault.pub_key);
                vault.frozen.push(chain);
            }
        }
        ctx.keeper.set_vault(&vault)?;
    }

    mgr.slasher.dec_slash_points(ctx, observe_points, &voter.signers)?;
    voter.signers.clear();
    voter.round7_count = 0;
    ctx.keeper.set_tss_keysign_fail_voter(&voter)?;

    let points = ctx.config_i64(ConstantName::FailKeysignSlashPoints)?;
    let jail_time = ctx.config_i64(ConstantName::JailTimeKeysign)?;
    for pk in msg.blame.pub_keys() {
        let node = node_of(ctx, &pk)?;
        if let Err(err) = ctx.keeper.inc_node_account_slash_points(&node.node_address, points) {
            error!("fail to inc slash points of {}: {}", node.node_address, err);
        }
        mgr.events.emit(
            ctx,
            Event::SlashPoint {
                node_address: node.node_address.clone(),
                slash_points: points,
                reason: "fail keysign".to_string(),
            },
        );
        ctx.keeper.set_node_account_jail(
            &node.node_address,
            ctx.block_height(),
            jail_time,
            "failed to perform keysign",
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            handlers::external_handler,
            test_utils::*,
            types::{Blame, BlameNode, Network, KEYSIGN_ROUND_7},
        },
        assert_matches::assert_matches,
        thornode_common::{Chain, ONE},
    };

    fn setup(count: usize) -> (Context, Managers, Vec<NodeAccount>) {
        let mut ctx = test_context(10);
        ctx.keeper.set_mimir("MinimumBondInRune", ONE as i64).unwrap();
        let nodes = add_active_nodes(&mut ctx, count);
        (ctx, Managers::default(), nodes)
    }

    fn request_keygen(ctx: &mut Context, members: &[PubKey]) {
        let mut block = ctx.keeper.get_keygen_block(ctx.block_height()).unwrap();
        block
            .keygens
            .push(Keygen::new(ctx.block_height(), members.to_vec(), KeygenType::Asgard));
        ctx.keeper.set_keygen_block(&block).unwrap();
    }

    fn tss_pool(signer: usize, pool_pk: &str, members: &[PubKey], blame: Blame) -> Msg {
        let pool_pub_key = if pool_pk.is_empty() {
            PubKey::default()
        } else {
            PubKey::new(pool_pk).unwrap()
        };
        Msg::TssPool(MsgTssPool {
            id: MsgTssPool::tss_id(10, &pool_pub_key, members, &blame),
            pool_pub_key,
            keygen_type: KeygenType::Asgard,
            pub_keys: members.to_vec(),
            height: 10,
            blame,
            chains: vec![Chain::THOR, Chain::BTC],
            keygen_time_ms: 1_000 * (signer as i64 + 1),
            signer: node_address(signer),
        })
    }

    fn blame(pks: &[PubKey], round: &str) -> Blame {
        Blame {
            fail_reason: "timeout".to_string(),
            round: round.to_string(),
            is_unicast: false,
            blame_nodes: pks.iter().map(|pk| BlameNode { pubkey: pk.clone() }).collect(),
        }
    }

    #[test]
    fn test_keygen_success_rotates_vault() {
        let (mut ctx, mgr, nodes) = setup(4);
        let old = add_asgard(&mut ctx, "asgardpk", &nodes, vec![]);
        let members: Vec<PubKey> = (0..4).map(node_pub_key).collect();
        request_keygen(&mut ctx, &members);

        for i in 0..3 {
            external_handler(&mut ctx, &mgr, tss_pool(i, "newasgardpk", &members, Blame::default())).unwrap();
        }
        let new_pk = PubKey::new("newasgardpk").unwrap();
        assert!(!ctx.keeper.vault_exists(&new_pk));
        assert_eq!(ctx.keeper.get_node_account_slash_points(&node_address(3)).unwrap(), 720);
        assert!(ctx
            .keeper
            .get_node_account_jail(&node_address(3))
            .unwrap()
            .is_jailed(ctx.block_height()));

        // the last member arrives late and is forgiven
        external_handler(&mut ctx, &mgr, tss_pool(3, "newasgardpk", &members, Blame::default())).unwrap();
        let vault = ctx.keeper.get_vault(&new_pk).unwrap();
        assert_eq!(vault.status, VaultStatus::Active);
        assert_eq!(vault.membership.len(), 4);
        assert!(vault.chains.contains(&Chain::BTC));
        assert_eq!(ctx.keeper.get_vault(&old.pub_key).unwrap().status, VaultStatus::Retiring);
        for i in 0..4 {
            assert_eq!(ctx.keeper.get_node_account_slash_points(&node_address(i)).unwrap(), 0);
        }
        assert!(!ctx
            .keeper
            .get_node_account_jail(&node_address(3))
            .unwrap()
            .is_jailed(ctx.block_height()));
        let node = ctx.keeper.get_node_account(&node_address(0)).unwrap().unwrap();
        assert!(node.signer_membership.contains(&new_pk));

        let events = ctx.keeper.store().events();
        assert!(events.iter().any(|e| matches!(
            e,
            Event::TssKeygenMetric { median_duration_ms, .. } if *median_duration_ms == 2_000
        )));
        assert!(events.iter().any(|e| matches!(e, Event::ActiveVault { .. })));
    }

    #[test]
    fn test_keygen_waits_for_every_keygen_of_the_block() {
        let (mut ctx, mgr, _) = setup(6);
        let first: Vec<PubKey> = (0..3).map(node_pub_key).collect();
        let second: Vec<PubKey> = (3..6).map(node_pub_key).collect();
        request_keygen(&mut ctx, &first);
        request_keygen(&mut ctx, &second);

        for i in 0..3 {
            external_handler(&mut ctx, &mgr, tss_pool(i, "firstpk", &first, Blame::default())).unwrap();
        }
        let vault = ctx.keeper.get_vault(&PubKey::new("firstpk").unwrap()).unwrap();
        assert_eq!(vault.status, VaultStatus::Init);

        for i in 3..6 {
            external_handler(&mut ctx, &mgr, tss_pool(i, "secondpk", &second, Blame::default())).unwrap();
        }
        for pk in ["firstpk", "secondpk"] {
            let vault = ctx.keeper.get_vault(&PubKey::new(pk).unwrap()).unwrap();
            assert_eq!(vault.status, VaultStatus::Active);
        }
    }

    #[test]
    fn test_keygen_validation() {
        let (mut ctx, mgr, _) = setup(4);
        let standby = node_account(4, NodeStatus::Standby, 1_000 * ONE);
        ctx.keeper.set_node_account(&standby).unwrap();
        let members: Vec<PubKey> = (0..5).map(node_pub_key).collect();

        // no keygen was requested with these members
        assert_matches!(
            external_handler(&mut ctx, &mgr, tss_pool(0, "newpk", &members, Blame::default())),
            Err(RuntimeError::Unauthorized(_))
        );

        request_keygen(&mut ctx, &members);
        assert_matches!(
            external_handler(&mut ctx, &mgr, tss_pool(4, "newpk", &members, Blame::default())),
            Err(RuntimeError::Unauthorized(_))
        );

        let mut msg = tss_pool(0, "newpk", &members, Blame::default());
        if let Msg::TssPool(m) = &mut msg {
            m.id = "forged".to_string();
        }
        assert_matches!(
            external_handler(&mut ctx, &mgr, msg),
            Err(RuntimeError::UnknownRequest(_))
        );

        ctx.set_block_height(10 + 720);
        assert_matches!(
            external_handler(&mut ctx, &mgr, tss_pool(0, "newpk", &members, Blame::default())),
            Err(RuntimeError::UnknownRequest(_))
        );
        assert!(ctx.keeper.get_tss_voter(&MsgTssPool::tss_id(
            10,
            &PubKey::new("newpk").unwrap(),
            &members,
            &Blame::default()
        ))
        .unwrap()
        .is_none());
    }

    #[test]
    fn test_keygen_failure_punishes_blamed_nodes() {
        let (mut ctx, mgr, _) = setup(4);
        let ready = node_account(4, NodeStatus::Ready, 1_000 * ONE);
        ctx.keeper.set_node_account(&ready).unwrap();
        ctx.keeper
            .mint_to_module(BOND_NAME, &Coin::new(Asset::rune(), ready.bond), "bond")
            .unwrap();
        ctx.keeper
            .set_network(&Network {
                bond_reward_rune: 1_000 * ONE,
                total_bond_units: 7_200,
                ..Network::default()
            })
            .unwrap();
        let members: Vec<PubKey> = (0..5).map(node_pub_key).collect();
        request_keygen(&mut ctx, &members);

        let blame = blame(&[node_pub_key(3), node_pub_key(4)], "");
        for i in 0..4 {
            external_handler(&mut ctx, &mgr, tss_pool(i, "", &members, blame.clone())).unwrap();
        }

        assert_eq!(ctx.keeper.get_node_account_slash_points(&node_address(3)).unwrap(), 720);
        for i in 0..3 {
            assert_eq!(ctx.keeper.get_node_account_slash_points(&node_address(i)).unwrap(), 0);
        }
        let jail = ctx.keeper.get_node_account_jail(&node_address(4)).unwrap();
        assert_eq!(jail.release_height, 10 + 4_320);
        let node = ctx.keeper.get_node_account(&node_address(4)).unwrap().unwrap();
        assert_eq!(node.bond, 900 * ONE);
        assert_eq!(ctx.keeper.get_rune_balance_of_module(RESERVE_NAME).unwrap(), 100 * ONE);

        let events = ctx.keeper.store().events();
        assert!(events.iter().any(|e| matches!(
            e,
            Event::Bond { amount, bond_type: BondType::BondCost, .. } if *amount == 100 * ONE
        )));
        assert!(events.iter().any(|e| matches!(e, Event::TssKeygenFailure { .. })));
    }

    fn keysign_fail(signer: usize, pk: &str, blame: Blame) -> Msg {
        let coins = Coins::new(vec![Coin::new(Chain::BTC.gas_asset(), ONE)]);
        let pub_key = PubKey::new(pk).unwrap();
        Msg::TssKeysignFail(MsgTssKeysignFail {
            id: MsgTssKeysignFail::keysign_id(10, &blame, "OUT:abc", &coins, &pub_key),
            height: 10,
            blame,
            memo: "OUT:abc".to_string(),
            coins,
            pub_key,
            signer: node_address(signer),
        })
    }

    #[test]
    fn test_keysign_failure_jails_blamed_node() {
        let (mut ctx, mgr, nodes) = setup(4);
        add_asgard(&mut ctx, "asgardpk", &nodes, vec![Coin::new(Chain::BTC.gas_asset(), 10 * ONE)]);
        let blame = blame(&[node_pub_key(3)], "");

        for i in 0..3 {
            external_handler(&mut ctx, &mgr, keysign_fail(i, "asgardpk", blame.clone())).unwrap();
        }
        assert_eq!(ctx.keeper.get_node_account_slash_points(&node_address(3)).unwrap(), 2);
        for i in 0..3 {
            assert_eq!(ctx.keeper.get_node_account_slash_points(&node_address(i)).unwrap(), 0);
        }
        let jail = ctx.keeper.get_node_account_jail(&node_address(3)).unwrap();
        assert_eq!(jail.release_height, 10 + 60);
        let vault = ctx.keeper.get_vault(&PubKey::new("asgardpk").unwrap()).unwrap();
        assert!(vault.frozen.is_empty());
    }

    #[test]
    fn test_final_round_failure_freezes_vault() {
        let (mut ctx, mgr, nodes) = setup(4);
        add_asgard(&mut ctx, "asgardpk", &nodes, vec![Coin::new(Chain::BTC.gas_asset(), 10 * ONE)]);
        let blame = blame(&[node_pub_key(3)], KEYSIGN_ROUND_7);

        for i in 0..3 {
            external_handler(&mut ctx, &mgr, keysign_fail(i, "asgardpk", blame.clone())).unwrap();
        }
        let vault = ctx.keeper.get_vault(&PubKey::new("asgardpk").unwrap()).unwrap();
        assert_eq!(vault.frozen, vec![Chain::BTC]);
    }

    #[test]
    fn test_keysign_failure_validation() {
        let (mut ctx, mgr, nodes) = setup(4);
        add_asgard(&mut ctx, "asgardpk", &nodes, vec![]);

        assert_matches!(
            external_handler(
                &mut ctx,
                &mgr,
                keysign_fail(0, "asgardpk", blame(&[node_pub_key(2), node_pub_key(3)], ""))
            ),
            Err(RuntimeError::UnknownRequest(_))
        );

        let standby = node_account(4, NodeStatus::Standby, 1_000 * ONE);
        ctx.keeper.set_node_account(&standby).unwrap();
        assert_matches!(
            external_handler(&mut ctx, &mgr, keysign_fail(4, "asgardpk", blame(&[node_pub_key(3)], ""))),
            Err(RuntimeError::Unauthorized(_))
        );

        // members of a retiring vault are still heard
        let mut retiring = add_asgard(&mut ctx, "retiringpk", &[standby], vec![]);
        retiring.update_status(VaultStatus::Retiring, 10);
        ctx.keeper.set_vault(&retiring).unwrap();
        assert!(external_handler(&mut ctx, &mgr, keysign_fail(4, "asgardpk", blame(&[node_pub_key(3)], ""))).is_ok());
    }
}
