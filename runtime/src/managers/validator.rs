//! Validator set rotation: deciding when to churn, who leaves, who joins,
//! and applying the new set once its vaults are live. Also drives ragnarok
//! once the set can no longer stay byzantine fault tolerant.

use {
    super::{sort_by_security, Managers, ValidatorManager},
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        events::{BondType, Event},
        keeper::BOND_NAME,
        types::{NodeAccount, NodeStatus, TxOutItem, VaultStatus},
    },
    itertools::Itertools,
    log::*,
    thornode_common::{
        math::{get_safe_share, get_uncapped_share, safe_sub},
        Address, Asset, Chain, Coin, Coins, Tx, TxId, Uint, MAX_BASIS_POINTS, ONE,
    },
    thornode_constants::ConstantName,
    thornode_memo::Memo,
};

/// Ragnarok iterations spent on pools before bond starts to be returned.
const RAGNAROK_BOND_DELAY: i64 = 10;

/// Most nodes that may leave at once without losing a 2/3 majority, keeping
/// at least four signers.
fn find_max_able_to_leave(count: usize) -> usize {
    let max = count.saturating_sub(count * 2 / 3 + 1);
    if count - max < 4 {
        return count.saturating_sub(4);
    }
    max
}

/// How many of `active`, already ordered leavers first, leave this churn.
pub(crate) fn find_count_to_remove(active: &[NodeAccount]) -> usize {
    let candidates = active.iter().filter(|n| n.leave_score > 0).count();
    let max_remove = find_max_able_to_leave(active.len());
    match active.first() {
        None => 0,
        // room is always made for a node that asked to leave or was banned
        Some(first) if max_remove == 0 => {
            usize::from(first.forced_to_leave || first.requested_to_leave)
        }
        Some(_) => candidates.min(max_remove),
    }
}

/// Bond above which active nodes earn no extra reward: the bond at the two
/// thirds mark of the set.
fn hard_bond_cap(active: &[NodeAccount]) -> Uint {
    if active.is_empty() {
        return 0;
    }
    let bonds: Vec<Uint> = active.iter().map(|n| n.bond).sorted().collect();
    let mut idx = bonds.len() * 2 / 3;
    if bonds.len() % 3 == 0 {
        idx -= 1;
    }
    bonds[idx]
}

/// Height of the newest active asgard, which is when the last churn landed.
fn last_churn_height(ctx: &Context) -> Result<i64> {
    Ok(ctx
        .keeper
        .get_asgard_vaults_by_status(VaultStatus::Active)?
        .iter()
        .map(|v| v.block_height)
        .max()
        .unwrap_or_default())
}

/// Leave score: blocks served since the last churn per slash point. Lower
/// scores leave first.
fn leave_score(height: i64, slash_points: i64, last_churn: i64) -> Uint {
    let score = (height - last_churn).max(0) as Uint * ONE;
    if slash_points <= 0 {
        return score;
    }
    score / slash_points as Uint
}

/// Split the next committee into asgard groups of similar size, highest bond
/// spread first. Returns nothing when the groups would be unusable.
pub(crate) fn split_next(mut nodes: Vec<NodeAccount>, asgard_size: usize) -> Vec<Vec<NodeAccount>> {
    if nodes.is_empty() || asgard_size == 0 {
        return Vec::new();
    }
    let group_count = nodes.len().div_ceil(asgard_size);
    nodes.sort_by(|a, b| b.bond.cmp(&a.bond));
    let mut groups = vec![Vec::new(); group_count];
    for (i, node) in nodes.into_iter().enumerate() {
        groups[i % group_count].push(node);
    }
    for (i, group) in groups.iter().enumerate() {
        if group.len() > asgard_size {
            info!("skipping rotation, an asgard group is larger than {}", asgard_size);
            return Vec::new();
        }
        if group.len() < 2 {
            info!("skipping rotation, an asgard group has fewer than 2 members");
            return Vec::new();
        }
        if i > 0 && group.len().abs_diff(groups[i - 1].len()) > 1 {
            info!("skipping rotation, asgard groups differ in size");
            return Vec::new();
        }
    }
    groups
}

/// Whether `node` may join the next committee. Returns the status it should
/// hold and, when it is not ready, the reason.
pub fn node_account_preflight_check(ctx: &Context, node: &NodeAccount) -> Result<(NodeStatus, Option<String>)> {
    let standby = |reason: String| Ok((NodeStatus::Standby, Some(reason)));
    if node.forced_to_leave {
        return Ok((NodeStatus::Disabled, Some("node account has been banned".to_string())));
    }
    if node.requested_to_leave {
        return standby("node account has requested to leave".to_string());
    }
    if node.ip_address.parse::<std::net::IpAddr>().is_err() {
        return standby("node account has invalid registered IP address".to_string());
    }
    if node.pub_key_set.is_empty() {
        return Ok((
            NodeStatus::Whitelisted,
            Some("node account has not registered their pubkey set".to_string()),
        ));
    }
    let min_bond = ctx.config_uint(ConstantName::MinimumBondInRune)?;
    if node.bond < min_bond {
        return standby(format!(
            "node account does not have minimum bond requirement: {}/{}",
            node.bond, min_bond
        ));
    }
    if let Some(min_version) = ctx.keeper.get_min_join_version()? {
        if node.get_version() < min_version {
            return standby(format!(
                "node account does not meet min version requirement: {} vs {}",
                node.version, min_version
            ));
        }
    }
    let jail = ctx.keeper.get_node_account_jail(&node.node_address)?;
    if jail.is_jailed(ctx.block_height()) {
        return standby(format!(
            "node account is jailed until block {}: {}",
            jail.release_height, jail.reason
        ));
    }
    if ctx.keeper.ragnarok_in_progress()? {
        return standby("ragnarok is currently in progress: no churning".to_string());
    }
    Ok((NodeStatus::Ready, None))
}

/// Move every standby or ready node to the status its preflight check gives.
fn mark_ready_actors(ctx: &mut Context) -> Result<()> {
    let mut candidates = ctx.keeper.list_node_accounts_by_status(NodeStatus::Standby)?;
    candidates.extend(ctx.keeper.list_node_accounts_by_status(NodeStatus::Ready)?);
    for mut node in candidates {
        let (status, reason) = node_account_preflight_check(ctx, &node)?;
        if let Some(reason) = reason {
            debug!("node {} not ready: {}", node.node_address, reason);
        }
        node.update_status(status, ctx.block_height());
        ctx.keeper.set_node_account(&node)?;
    }
    Ok(())
}

/// Members of the next vaults: active nodes minus those chosen to leave,
/// topped up with ready nodes by bond. The flag reports whether the set
/// changes at all.
pub fn next_vault_node_accounts(ctx: &mut Context, target_count: usize) -> Result<(Vec<NodeAccount>, bool)> {
    let mut rotation = false;
    mark_ready_actors(ctx)?;

    let mut ready = ctx.keeper.list_node_accounts_by_status(NodeStatus::Ready)?;
    ready.sort_by(|a, b| b.bond.cmp(&a.bond));

    let mut active = ctx.keeper.list_active_validators()?;
    let last_churn = last_churn_height(ctx)?;
    for node in active.iter_mut().filter(|n| n.leave_score > 0) {
        let slash_points = ctx.keeper.get_node_account_slash_points(&node.node_address)?;
        let score = leave_score(ctx.block_height(), slash_points, last_churn);
        if score > 0 {
            node.leave_score = score.min(u64::MAX as Uint) as u64;
        }
    }
    active.sort_by(|a, b| {
        b.forced_to_leave
            .cmp(&a.forced_to_leave)
            .then(b.requested_to_leave.cmp(&a.requested_to_leave))
            .then_with(|| match (a.leave_score, b.leave_score) {
                (0, 0) => std::cmp::Ordering::Equal,
                (0, _) => std::cmp::Ordering::Greater,
                (_, 0) => std::cmp::Ordering::Less,
                (x, y) => x.cmp(&y),
            })
    });

    let to_remove = find_count_to_remove(&active);
    if to_remove > 0 {
        rotation = true;
        active.drain(..to_remove);
    }
    let new_nodes = match ctx.mimir(&ConstantName::NumberOfNewNodesPerChurn.to_string())? {
        Some(n) if n > 0 => n as usize,
        _ => 1,
    };
    let mut limit = to_remove + new_nodes;
    let min_bft = ctx.config_i64(ConstantName::MinimumNodesForBFT)?.max(0) as usize;
    if active.len() + limit < min_bft {
        limit = min_bft - active.len();
    }
    for candidate in ready.into_iter().take(limit) {
        if active.len() >= target_count {
            break;
        }
        rotation = true;
        active.push(candidate);
    }
    Ok((active, rotation))
}

#[derive(Debug, Default)]
pub struct DefaultValidatorManager;

impl DefaultValidatorManager {
    /// Set the leave score of `node` unless it already has one.
    fn mark_actor(ctx: &mut Context, node: Option<NodeAccount>, reason: &str) -> Result<()> {
        let Some(mut node) = node else {
            return Ok(());
        };
        if node.leave_score != 0 {
            return Ok(());
        }
        info!("marked validator {} to be churned out {}", node.node_address, reason);
        let slash_points = ctx.keeper.get_node_account_slash_points(&node.node_address)?;
        let score = leave_score(ctx.block_height(), slash_points, last_churn_height(ctx)?);
        node.leave_score = score.min(u64::MAX as Uint) as u64;
        ctx.keeper.set_node_account(&node)
    }

    /// Active nodes whose leave score falls under the redline share of the
    /// average score. Falls back to the single worst offender.
    pub(crate) fn find_bad_actors(ctx: &Context, min_slash_points: i64, redline: i64) -> Result<Vec<NodeAccount>> {
        let active = ctx.keeper.list_active_validators()?;
        if active.is_empty() {
            return Ok(Vec::new());
        }
        let last_churn = last_churn_height(ctx)?;
        let mut tracker = Vec::new();
        let mut total: Uint = 0;
        for node in active.iter() {
            let slash_points = ctx.keeper.get_node_account_slash_points(&node.node_address)?;
            if slash_points <= min_slash_points {
                continue;
            }
            let score = leave_score(ctx.block_height(), slash_points, last_churn);
            total = total.saturating_add(score);
            tracker.push((score, node.clone()));
        }
        if tracker.is_empty() {
            return Ok(Vec::new());
        }
        tracker.sort_by_key(|(score, _)| *score);
        let average = total / active.len() as Uint;
        let redline = average / redline.max(1) as Uint;
        let bad: Vec<NodeAccount> = tracker
            .iter()
            .filter(|(score, _)| *score <= redline)
            .map(|(_, node)| node.clone())
            .collect();
        if bad.is_empty() {
            return Ok(vec![tracker.swap_remove(0).1]);
        }
        Ok(bad)
    }

    fn mark_bad_actors(ctx: &mut Context) -> Result<()> {
        let min_slash_points = ctx.config_i64(ConstantName::MinSlashPointsForBadValidator)?;
        let redline = ctx.config_i64(ConstantName::BadValidatorRedline)?;
        for node in Self::find_bad_actors(ctx, min_slash_points, redline)? {
            Self::mark_actor(ctx, Some(node), "for bad behavior")?;
        }
        Ok(())
    }

    fn mark_old_actor(ctx: &mut Context) -> Result<()> {
        let oldest = ctx
            .keeper
            .list_active_validators()?
            .into_iter()
            .filter(|n| n.status_since < ctx.block_height())
            .min_by_key(|n| n.status_since);
        Self::mark_actor(ctx, oldest, "for age")
    }

    fn mark_low_bond_actor(ctx: &mut Context) -> Result<()> {
        let lowest = ctx
            .keeper
            .list_active_validators()?
            .into_iter()
            .min_by_key(|n| n.bond);
        Self::mark_actor(ctx, lowest, "for low bond")
    }

    fn mark_low_version_actors(ctx: &mut Context) -> Result<()> {
        let Some(min_version) = ctx.keeper.get_min_join_version()? else {
            return Ok(());
        };
        let max_nodes = ctx.config_i64(ConstantName::MaxNodeToChurnOutForLowVersion)?.max(0) as usize;
        let low: Vec<NodeAccount> = ctx
            .keeper
            .list_active_validators()?
            .into_iter()
            .filter(|n| n.get_version() < min_version)
            .take(max_nodes)
            .collect();
        for node in low {
            Self::mark_actor(ctx, Some(node), "for version lower than minimum join version")?;
        }
        Ok(())
    }

    /// Active nodes that gained a seat in an active vault, and active nodes
    /// that lost theirs or were banned.
    fn get_changed_nodes(ctx: &Context, active: &[NodeAccount]) -> Result<(Vec<NodeAccount>, Vec<NodeAccount>)> {
        let vaults = ctx.keeper.get_asgard_vaults_by_status(VaultStatus::Active)?;
        if vaults.is_empty() {
            return Err(RuntimeError::internal("get changed nodes", "no active vault"));
        }
        let membership: Vec<_> = vaults.iter().flat_map(|v| v.membership.iter().cloned()).collect();
        let removed = if membership.is_empty() {
            Vec::new()
        } else {
            active
                .iter()
                .filter(|n| n.forced_to_leave || !vaults.iter().any(|v| v.contains(&n.pub_key_set.secp256k1)))
                .cloned()
                .collect()
        };
        let mut added = Vec::new();
        for pk in membership.iter() {
            match ctx.keeper.get_node_account_by_pub_key(pk)? {
                Some(node) if !matches!(node.status, NodeStatus::Active | NodeStatus::Disabled) => {
                    added.push(node)
                }
                Some(_) => {}
                None => error!("no node account for vault member {}", pk),
            }
        }
        Ok((added, removed))
    }

    /// Pay the accrued bond reward to active nodes, pro rata by bond up to
    /// the hard cap and scaled down by slash points.
    fn distribute_bond_reward(ctx: &mut Context, mgr: &Managers) -> Result<()> {
        let active = ctx.keeper.list_active_validators()?;
        let last_churn = active.iter().map(|n| n.active_block_height).max().unwrap_or_default();
        let cap = hard_bond_cap(&active);
        let total_effective: Uint = active.iter().map(|n| n.bond.min(cap)).sum();
        let total_reward = ctx.keeper.get_network()?.bond_reward_rune;
        let mut result = Ok(());
        for node in active {
            if let Err(err) = Self::pay_bond_reward(ctx, mgr, last_churn, node, total_reward, total_effective, cap) {
                error!("fail to pay node account bond award: {}", err);
                result = Err(err);
            }
        }
        result
    }

    fn pay_bond_reward(
        ctx: &mut Context,
        mgr: &Managers,
        last_churn: i64,
        mut node: NodeAccount,
        total_reward: Uint,
        total_effective: Uint,
        cap: Uint,
    ) -> Result<()> {
        if node.active_block_height == 0 || node.bond == 0 {
            return Ok(());
        }
        let slash_points = ctx.keeper.get_node_account_slash_points(&node.node_address)?;
        let active_blocks = (ctx.block_height() - last_churn).max(0);
        let earned_blocks = (active_blocks - slash_points).max(0);
        let reward = get_uncapped_share(node.bond.min(cap), total_effective, total_reward);
        let reward = get_uncapped_share(earned_blocks as Uint, active_blocks as Uint, reward);

        let mut network = ctx.keeper.get_network()?;
        network.bond_reward_rune = safe_sub(network.bond_reward_rune, reward);
        network.total_bond_units = safe_sub(network.total_bond_units, active_blocks as Uint);
        ctx.keeper.set_network(&network)?;
        ctx.keeper
            .dec_node_account_slash_points(&node.node_address, active_blocks)?;

        let mut providers = ctx.keeper.get_bond_providers(&node.node_address)?;
        let operator = node.bond_address.acc_address().ok();
        providers.adjust(node.bond);
        let operator_before = operator
            .as_ref()
            .and_then(|op| providers.get(op))
            .map(|p| p.bond)
            .unwrap_or_default();
        node.bond = node.bond.saturating_add(reward);
        providers.adjust(node.bond);

        let mut operator_fee: Uint = 0;
        if let Some(op) = operator.as_ref().filter(|op| providers.has(op)) {
            let increase = providers
                .get(op)
                .map(|p| safe_sub(p.bond, operator_before))
                .unwrap_or_default();
            operator_fee = get_safe_share(providers.node_operator_fee, MAX_BASIS_POINTS, reward).min(increase);
            if operator_fee > 0 {
                node.bond = safe_sub(node.bond, operator_fee);
                providers.unbond(op, operator_fee);
            }
        }
        ctx.keeper.set_node_account(&node)?;
        ctx.keeper.set_bond_providers(&providers)?;
        mgr.events.emit(
            ctx,
            Event::Bond {
                amount: reward,
                bond_type: BondType::BondReward,
                tx_in: Tx {
                    id: TxId::blank(),
                    to_address: node.bond_address.clone(),
                    ..Tx::default()
                },
            },
        );
        if let Some(op) = operator.filter(|_| operator_fee > 0) {
            let coins = Coins::new(vec![Coin::new(Asset::rune(), operator_fee)]);
            ctx.keeper.send_from_module_to_account(BOND_NAME, &op, &coins)?;
            mgr.events.emit(
                ctx,
                Event::Bond {
                    amount: operator_fee,
                    bond_type: BondType::BondReturned,
                    tx_in: Tx {
                        id: TxId::blank(),
                        from_address: Address::from(node.node_address.clone()),
                        to_address: node.bond_address.clone(),
                        ..Tx::default()
                    },
                },
            );
        }
        Ok(())
    }

    /// Unsigned outbounds queued within the signing window.
    fn pending_tx_out(ctx: &Context) -> Result<usize> {
        let period = ctx.config_i64(ConstantName::SigningTransactionPeriod)?;
        let mut count = 0;
        for height in (ctx.block_height() - period).max(1)..=ctx.block_height() {
            count += ctx
                .keeper
                .get_tx_out(height)?
                .tx_array
                .iter()
                .filter(|item| !item.is_signed())
                .count();
        }
        Ok(count)
    }

    fn recall_ygg_funds(&self, ctx: &mut Context, mgr: &Managers) -> Result<()> {
        let yggs: Vec<_> = ctx
            .keeper
            .get_yggdrasils()?
            .into_iter()
            .filter(|v| v.has_funds())
            .collect();
        for ygg in yggs.iter() {
            match ctx.keeper.get_node_account_by_pub_key(&ygg.pub_key)? {
                Some(node) => self.request_ygg_return(ctx, mgr, &node)?,
                None => error!("no node account for yggdrasil {}", ygg.pub_key),
            }
        }
        if !yggs.is_empty() {
            info!("{} yggdrasil vaults still have funds", yggs.len());
        }
        Ok(())
    }

    /// Return a tenth of each bond per iteration once the pools had their
    /// head start, all of it from the tenth iteration on.
    fn ragnarok_bond(ctx: &mut Context, mgr: &Managers, nth: i64) -> Result<()> {
        let nth = nth - RAGNAROK_BOND_DELAY;
        if nth < 1 {
            return Ok(());
        }
        let tenths = if nth >= 9 { 10 } else { nth as Uint };
        for mut node in ctx.keeper.list_validators_with_bond()? {
            let pk = &node.pub_key_set.secp256k1;
            if ctx.keeper.vault_exists(pk) && ctx.keeper.get_vault(pk)?.has_funds() {
                info!("skip bond refund of {} due to remaining funds", node.node_address);
                continue;
            }
            let amount = node.bond * tenths / 10;
            let mut item = TxOutItem::new(
                Chain::THOR,
                node.bond_address.clone(),
                Coin::new(Asset::rune(), amount),
                TxId::blank(),
            )
            .with_memo(
                Memo::Ragnarok {
                    block_height: ctx.block_height(),
                }
                .to_string(),
            );
            item.module_name = BOND_NAME.to_string();
            match mgr.tx_out_store.try_add_tx_out_item(ctx, mgr, item, 0) {
                Ok(true) | Err(RuntimeError::NotEnoughToPayFee) => {}
                Ok(false) => continue,
                Err(err) => return Err(err),
            }
            ctx.keeper
                .set_ragnarok_pending(ctx.keeper.get_ragnarok_pending()? + 1)?;
            node.bond = safe_sub(node.bond, amount);
            ctx.keeper.set_node_account(&node)?;
            mgr.events.emit(
                ctx,
                Event::Bond {
                    amount,
                    bond_type: BondType::BondCost,
                    tx_in: Tx {
                        id: TxId::blank(),
                        from_address: node.bond_address.clone(),
                        ..Tx::default()
                    },
                },
            );
        }
        Ok(())
    }

    fn process_ragnarok(&self, ctx: &mut Context, mgr: &Managers) -> Result<()> {
        if ctx.keeper.ragnarok_block_height()? == 0 {
            warn!("ragnarok triggered at {}", ctx.block_height());
            ctx.keeper.set_ragnarok_block_height(ctx.block_height())?;
            self.recall_ygg_funds(ctx, mgr)?;
            return Self::distribute_bond_reward(ctx, mgr);
        }
        let nth = ctx.keeper.get_ragnarok_nth()?;
        if !ctx.keeper.get_ragnarok_withdraw_position()?.is_empty() {
            if let Err(err) = mgr.network.ragnarok(ctx, mgr) {
                error!("fail to ragnarok pools: {}", err);
            }
            return Ok(());
        }
        if ctx.keeper.get_ragnarok_pending()? > 0 && Self::pending_tx_out(ctx)? > 0 {
            info!("awaiting previous ragnarok transactions to clear before iteration {}", nth + 1);
            return Ok(());
        }
        let nth = nth + 1;
        info!("starting ragnarok iteration {}", nth);
        ctx.keeper.set_ragnarok_nth(nth)?;
        if let Err(err) = Self::ragnarok_bond(ctx, mgr, nth) {
            error!("fail to ragnarok bond: {}", err);
        }
        if let Err(err) = mgr.network.ragnarok(ctx, mgr) {
            error!("fail to ragnarok pools: {}", err);
        }
        Ok(())
    }
}

impl ValidatorManager for DefaultValidatorManager {
    fn begin_block(&self, ctx: &mut Context, mgr: &Managers) -> Result<()> {
        if ctx.keeper.ragnarok_in_progress()? {
            return Ok(());
        }
        let height = ctx.block_height();
        let churn_interval = ctx.config_i64(ConstantName::ChurnInterval)?;
        let retry_interval = ctx.config_i64(ConstantName::ChurnRetryInterval)?.max(1);
        let desired = ctx.config_i64(ConstantName::DesiredValidatorSet)?.max(0) as usize;
        let asgard_size = ctx.config_i64(ConstantName::AsgardSize)?.max(1) as usize;
        let min_bft = ctx.config_i64(ConstantName::MinimumNodesForBFT)?.max(0) as usize;

        let active_vaults = ctx.keeper.get_asgard_vaults_by_status(VaultStatus::Active)?;
        let active_nodes = ctx.keeper.list_active_validators()?;
        let last_churn = last_churn_height(ctx)?;

        let incomplete_churn = active_vaults.len() != active_nodes.len().div_ceil(asgard_size);
        let old_vault = height - last_churn > churn_interval;
        let on_churn_tick = (height - last_churn - churn_interval) % retry_interval == 0;
        let retry = (old_vault || incomplete_churn) && on_churn_tick;
        if last_churn + churn_interval != height && !retry {
            return Ok(());
        }
        info!("checking for node account rotation{}", if retry { " (retry)" } else { "" });

        if ctx
            .keeper
            .get_asgard_vaults_by_status(VaultStatus::Retiring)?
            .iter()
            .any(|v| v.has_funds())
        {
            info!("skipping rotation, retiring vaults still have funds");
            return Ok(());
        }

        if min_bft + 2 < active_nodes.len() {
            Self::mark_bad_actors(ctx)?;
            if !retry {
                Self::mark_old_actor(ctx)?;
                if active_nodes.len() >= desired {
                    Self::mark_low_bond_actor(ctx)?;
                }
            }
            Self::mark_low_version_actors(ctx)?;
        }

        let (next, rotate) = next_vault_node_accounts(ctx, desired)?;
        if rotate {
            for group in split_next(next, asgard_size) {
                mgr.network.trigger_keygen(ctx, &group)?;
            }
        }
        Ok(())
    }

    fn end_block(&self, ctx: &mut Context, mgr: &Managers) -> Result<()> {
        if ctx.keeper.ragnarok_in_progress()? {
            if let Err(err) = self.process_ragnarok(ctx, mgr) {
                error!("fail to process ragnarok protocol: {}", err);
            }
            return Ok(());
        }
        let height = ctx.block_height();
        let active = ctx.keeper.list_active_validators()?;
        let (added, removed) = match Self::get_changed_nodes(ctx, &active) {
            Ok(changes) => changes,
            Err(err) => {
                debug!("no node changes: {}", err);
                return Ok(());
            }
        };

        let artificial_ragnarok = ctx.config_i64(ConstantName::ArtificialRagnarokBlockHeight)?;
        let min_bft = ctx.config_i64(ConstantName::MinimumNodesForBFT)?.max(0) as usize;
        let after_change = (active.len() + added.len()).saturating_sub(removed.len());
        if (active.len() >= min_bft && after_change < min_bft)
            || (artificial_ragnarok > 0 && height >= artificial_ragnarok)
        {
            // funds must finish migrating first
            if ctx
                .keeper
                .get_asgard_vaults_by_status(VaultStatus::Retiring)?
                .is_empty()
            {
                if let Err(err) = self.process_ragnarok(ctx, mgr) {
                    error!("fail to process ragnarok protocol: {}", err);
                }
                return Ok(());
            }
        }

        if added.is_empty() && removed.is_empty() {
            return Ok(());
        }
        if let Err(err) = Self::distribute_bond_reward(ctx, mgr) {
            error!("fail to pay node bond rewards: {}", err);
        }

        for mut node in added {
            info!("node {} {} -> Active", node.node_address, node.status);
            node.update_status(NodeStatus::Active, height);
            node.leave_score = 0;
            node.requested_to_leave = false;
            ctx.keeper.reset_node_account_slash_points(&node.node_address);
            ctx.keeper.set_node_account(&node)?;
        }
        for node in removed {
            let Some(mut node) = ctx.keeper.get_node_account(&node.node_address)? else {
                error!("fail to get node account {}", node.node_address);
                continue;
            };
            let status = if node.forced_to_leave {
                NodeStatus::Disabled
            } else {
                NodeStatus::Standby
            };
            info!("node {} {} -> {}", node.node_address, node.status, status);
            node.requested_to_leave = false;
            node.update_status(status, height);
            ctx.keeper.set_node_account(&node)?;
            if let Err(err) = self.request_ygg_return(ctx, mgr, &node) {
                error!("fail to request yggdrasil funds return: {}", err);
            }
        }
        for mut node in ctx.keeper.list_node_accounts_by_status(NodeStatus::Ready)? {
            node.update_status(NodeStatus::Standby, height);
            ctx.keeper.set_node_account(&node)?;
        }
        Ok(())
    }

    fn request_ygg_return(&self, ctx: &mut Context, mgr: &Managers, node: &NodeAccount) -> Result<()> {
        let pk = &node.pub_key_set.secp256k1;
        if !ctx.keeper.vault_exists(pk) {
            return Ok(());
        }
        let ygg = ctx.keeper.get_vault(pk)?;
        if ygg.is_asgard() || !ygg.has_funds() {
            return Ok(());
        }
        let active = ctx.keeper.get_asgard_vaults_by_status(VaultStatus::Active)?;
        let retiring = ctx.keeper.get_asgard_vaults_by_status(VaultStatus::Retiring)?;
        let chains: Vec<Chain> = active
            .iter()
            .chain(retiring.iter())
            .flat_map(|v| v.chains.iter().copied())
            .unique()
            .collect();
        let Some(target) = sort_by_security(ctx, active)?.into_iter().next() else {
            return Err(RuntimeError::internal("request yggdrasil return", "unable to determine asgard vault"));
        };
        for chain in chains.into_iter().filter(|c| !c.is_thor()) {
            if !ygg.has_funds_for_chain(chain) {
                info!("yggdrasil {} holds nothing on {}", ygg.pub_key, chain);
                continue;
            }
            let mut item = TxOutItem::new(
                chain,
                target.pub_key.address(chain),
                Coin::new(Asset::rune(), 0),
                TxId::blank(),
            )
            .with_vault(ygg.pub_key.clone())
            .with_memo(
                Memo::YggdrasilReturn {
                    block_height: ctx.block_height(),
                }
                .to_string(),
            );
            item.gas_rate = mgr.gas.get_gas_rate(ctx, chain)?;
            mgr.tx_out_store
                .unsafe_add_tx_out_item(ctx, mgr, item, ctx.block_height())?;
        }
        Ok(())
    }
}
