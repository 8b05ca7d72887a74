//! Bonding, unbonding and leaving.
//!
//! Bond sits in the bond module. The operator's bond address is always the
//! first bond provider of its node and may whitelist up to
//! `MaxBondProviders` others. Bond is only paid back to nodes that are
//! neither active nor about to become so, and only once any yggdrasil
//! remains have been returned or slashed.

use {
    super::{wrong_msg, HandlerFn, HandlerTable},
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        events::{BondType, Event},
        keeper::{ASGARD_NAME, BOND_NAME, RESERVE_NAME},
        managers::Managers,
        msgs::{Msg, MsgBond, MsgLeave, MsgUnbond},
        types::{BondProviders, NodeAccount, NodeStatus, TxOutItem, Vault, VaultStatus},
        versioned::VersionBranch,
    },
    log::*,
    thornode_common::{
        math::{get_uncapped_share, mul_div, safe_sub},
        AccAddress, Address, Asset, Chain, Coin, Coins, PubKeySet, Tx, TxId, Uint, MAX_BASIS_POINTS, ONE,
    },
    thornode_constants::ConstantName,
};

/// Mimir capping the bond of a single node, off when not positive.
pub(crate) const MAXIMUM_BOND_IN_RUNE: &str = "MaximumBondInRune";

/// Rune value above which a leaving node may not walk away from its
/// yggdrasil remains.
const MAX_ABANDONED_RUNE: Uint = 100 * ONE;

pub(super) static BOND: HandlerTable = HandlerTable {
    validate: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: validate_bond_v1 as HandlerFn,
    }],
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_bond_v1 as HandlerFn,
    }],
};

pub(super) static UNBOND: HandlerTable = HandlerTable {
    validate: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: validate_unbond_v1 as HandlerFn,
    }],
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_unbond_v1 as HandlerFn,
    }],
};

pub(super) static LEAVE: HandlerTable = HandlerTable {
    validate: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: validate_leave_v1 as HandlerFn,
    }],
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_leave_v1 as HandlerFn,
    }],
};

fn bond_msg(msg: &Msg) -> Result<&MsgBond> {
    match msg {
        Msg::Bond(m) => Ok(m),
        _ => Err(wrong_msg(msg)),
    }
}

fn unbond_msg(msg: &Msg) -> Result<&MsgUnbond> {
    match msg {
        Msg::Unbond(m) => Ok(m),
        _ => Err(wrong_msg(msg)),
    }
}

fn leave_msg(msg: &Msg) -> Result<&MsgLeave> {
    match msg {
        Msg::Leave(m) => Ok(m),
        _ => Err(wrong_msg(msg)),
    }
}

fn rune(amount: Uint) -> Coins {
    Coins::new(vec![Coin::new(Asset::rune(), amount)])
}

/// Record the operator as sole provider of a node that predates providers.
fn backfill_providers(ctx: &Context, node: &NodeAccount, providers: &mut BondProviders) -> Result<()> {
    if !providers.providers.is_empty() {
        return Ok(());
    }
    let operator = node.bond_address.acc_address()?;
    providers.bond(&operator, node.bond);
    providers.node_operator_fee = ctx.config_uint(ConstantName::NodeOperatorFee)?;
    Ok(())
}

fn validate_bond_v1(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = bond_msg(msg)?;
    let node = ctx.keeper.get_node_account(&msg.node_address)?;
    if node.as_ref().map(|n| n.status) == Some(NodeStatus::Ready) {
        return Err(RuntimeError::UnknownRequest(
            "cannot add bond while node is ready status".to_string(),
        ));
    }
    if ctx.config_i64(ConstantName::PauseBond)? > 0 {
        return Err(RuntimeError::UnknownRequest("bonding has been paused".to_string()));
    }
    let max_bond = ctx.keeper.get_mimir(MAXIMUM_BOND_IN_RUNE)?.unwrap_or_default();
    if max_bond > 0 {
        let current = node.as_ref().map(|n| n.bond).unwrap_or_default();
        if current.saturating_add(msg.bond) > max_bond as Uint {
            return Err(RuntimeError::UnknownRequest(format!(
                "bond would exceed the maximum of {max_bond}"
            )));
        }
    }
    if !msg.bond_address.is_chain(Chain::THOR) {
        return Err(RuntimeError::UnknownRequest(format!(
            "bonding address is not a THORChain address: {}",
            msg.bond_address
        )));
    }

    let Some(node) = node.filter(|n| !n.bond_address.is_empty()) else {
        return Ok(());
    };
    if msg.bond_address == node.bond_address {
        return Ok(());
    }
    if msg.operator_fee > -1 {
        return Err(RuntimeError::Unauthorized(
            "only a node operator can set the node operator fee".to_string(),
        ));
    }
    let from = msg.bond_address.acc_address()?;
    if !ctx.keeper.get_bond_providers(&node.node_address)?.has(&from) {
        return Err(RuntimeError::UnknownRequest(format!(
            "{} is not a whitelisted bond provider of {}",
            msg.bond_address, node.node_address
        )));
    }
    Ok(())
}

fn handle_bond_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = bond_msg(msg)?;
    let height = ctx.block_height();
    let mut node = match ctx.keeper.get_node_account(&msg.node_address)? {
        Some(node) => node,
        None => {
            info!("whitelisting {}", msg.node_address);
            NodeAccount::new(
                msg.node_address.clone(),
                NodeStatus::Whitelisted,
                PubKeySet::default(),
                String::new(),
                0,
                msg.bond_address.clone(),
                height,
            )
        }
    };
    let mut providers = ctx.keeper.get_bond_providers(&node.node_address)?;
    backfill_providers(ctx, &node, &mut providers)?;
    providers.adjust(node.bond);

    let mut bond = msg.bond;
    node.bond = node.bond.saturating_add(bond);

    // a node account needs some rune to pay for its own transactions
    if bond >= ONE && ctx.keeper.get_balance(&node.node_address)?.is_empty() {
        ctx.keeper
            .send_from_module_to_account(BOND_NAME, &node.node_address, &rune(ONE))?;
        node.bond = safe_sub(node.bond, ONE);
        bond -= ONE;
        mgr.events.emit(
            ctx,
            Event::Bond {
                amount: ONE,
                bond_type: BondType::BondCost,
                tx_in: Tx {
                    id: TxId::blank(),
                    from_address: node.bond_address.clone(),
                    to_address: Address::from(node.node_address.clone()),
                    ..Tx::default()
                },
            },
        );
    }

    let from = msg.bond_address.acc_address()?;
    if msg.bond_address == node.bond_address {
        if let Some(provider) = msg.bond_provider_address.as_ref() {
            if !providers.has(provider) {
                let max = ctx.config_i64(ConstantName::MaxBondProviders)?;
                if providers.providers.len() as i64 >= max {
                    return Err(RuntimeError::UnknownRequest(
                        "additional bond providers are not allowed, maximum reached".to_string(),
                    ));
                }
                info!("{} whitelisted {} as bond provider", node.node_address, provider);
                providers.bond(provider, 0);
            }
        }
    }
    if providers.has(&from) {
        providers.bond(&from, bond);
    }
    if (0..=MAX_BASIS_POINTS as i64).contains(&msg.operator_fee) {
        providers.node_operator_fee = msg.operator_fee as Uint;
    }

    ctx.keeper.set_node_account(&node)?;
    ctx.keeper.set_bond_providers(&providers)?;
    mgr.events.emit(
        ctx,
        Event::Bond {
            amount: bond,
            bond_type: BondType::BondPaid,
            tx_in: msg.tx_in.clone(),
        },
    );
    Ok(())
}

/// Rune value of what is left in `ygg`, or `None` while it still holds
/// something the node has to send back first.
fn yggdrasil_remains(ctx: &Context, mgr: &Managers, ygg: &Vault) -> Result<Option<Uint>> {
    let mut total: Uint = 0;
    for coin in ygg.coins.iter().filter(|c| !c.is_empty()) {
        if !coin.asset.is_gas_asset() {
            info!("yggdrasil {} still holds {}", ygg.pub_key, coin);
            return Ok(None);
        }
        let max_gas = match mgr.gas.get_max_gas(ctx, coin.asset.get_chain()) {
            Ok(max_gas) => max_gas,
            Err(err) => {
                error!("fail to get max gas of {}: {}", coin.asset.get_chain(), err);
                return Ok(None);
            }
        };
        if coin.amount > max_gas.amount.saturating_mul(10) {
            info!("yggdrasil {} holds more than 10x max gas of {}", ygg.pub_key, coin.asset);
            return Ok(None);
        }
        total = total.saturating_add(ctx.keeper.get_pool(&coin.asset)?.asset_value_in_rune(coin.amount));
    }
    Ok(Some(total))
}

fn yggdrasil_of(ctx: &Context, node: &NodeAccount) -> Result<Option<Vault>> {
    let pk = &node.pub_key_set.secp256k1;
    if pk.is_empty() || !ctx.keeper.vault_exists(pk) {
        return Ok(None);
    }
    let vault = ctx.keeper.get_vault(pk)?;
    if !vault.is_yggdrasil() {
        return Err(RuntimeError::UnknownRequest(format!("{pk} is not a yggdrasil vault")));
    }
    Ok(Some(vault))
}

fn check_lockup(ctx: &Context, node: &NodeAccount) -> Result<()> {
    let lockup = ctx.config_i64(ConstantName::BondLockupPeriod)?;
    if ctx.block_height() - node.status_since < lockup {
        return Err(RuntimeError::UnknownRequest(format!(
            "node can not unbond before {}",
            node.status_since + lockup
        )));
    }
    Ok(())
}

fn in_retiring_vault(ctx: &Context, node: &NodeAccount) -> Result<bool> {
    Ok(ctx
        .keeper
        .get_asgard_vaults_by_status(VaultStatus::Retiring)?
        .iter()
        .any(|v| v.contains(&node.pub_key_set.secp256k1)))
}

/// Pay the rune a slashed node owes for its yggdrasil remains into the
/// pools the stolen assets came from, the stolen rune into the reserve.
fn subsidize_pools(ctx: &mut Context, ygg: &Vault, ygg_rune: Uint, slash_rune: Uint) -> Result<()> {
    if slash_rune == 0 {
        return Ok(());
    }
    let stolen_rune = ygg.balance_of(&Asset::rune());
    let to_pools = safe_sub(slash_rune, stolen_rune);
    let stolen_total = safe_sub(ygg_rune, stolen_rune);
    let mut paid: Uint = 0;
    if stolen_total > 0 {
        for coin in ygg.coins.iter().filter(|c| !c.is_empty() && !c.asset.is_rune()) {
            let mut pool = ctx.keeper.get_pool(&coin.asset.layer1_asset())?;
            if pool.is_empty() {
                continue;
            }
            let value = pool.asset_value_in_rune(coin.amount);
            if value == 0 {
                continue;
            }
            let subsidy = mul_div(to_pools, value, stolen_total);
            pool.balance_rune = pool.balance_rune.saturating_add(subsidy);
            pool.balance_asset = safe_sub(pool.balance_asset, coin.amount);
            ctx.keeper.set_pool(&pool)?;
            if subsidy > 0 {
                ctx.keeper
                    .send_from_module_to_module(BOND_NAME, ASGARD_NAME, &rune(subsidy))?;
                paid += subsidy;
            }
        }
    }
    let rest = safe_sub(slash_rune, paid);
    if rest > 0 {
        ctx.keeper
            .send_from_module_to_module(BOND_NAME, RESERVE_NAME, &rune(rest))?;
    }
    Ok(())
}

/// Return up to `amount` (all of it when zero) of the bond `provider` holds
/// in `node`, after slashing the node for anything its yggdrasil still
/// holds. Saves the node.
pub(crate) fn refund_bond(
    ctx: &mut Context,
    mgr: &Managers,
    tx: &Tx,
    provider: &AccAddress,
    amount: Uint,
    node: &mut NodeAccount,
) -> Result<()> {
    if matches!(node.status, NodeStatus::Active | NodeStatus::Ready) {
        info!("{} is {}, cannot refund bond", node.node_address, node.status);
        return Ok(());
    }
    let mut amount = if amount == 0 || amount > node.bond {
        node.bond
    } else {
        amount
    };
    let ygg = yggdrasil_of(ctx, node)?;
    let mut providers = ctx.keeper.get_bond_providers(&node.node_address)?;
    backfill_providers(ctx, node, &mut providers)?;

    let mut ygg_rune: Uint = 0;
    if let Some(ygg) = &ygg {
        for coin in ygg.coins.iter().filter(|c| !c.is_empty()) {
            ygg_rune += if coin.asset.is_rune() {
                coin.amount
            } else {
                ctx.keeper.get_pool(&coin.asset)?.asset_value_in_rune(coin.amount)
            };
        }
    }
    if node.bond < ygg_rune {
        error!(
            "{} has more left in its yggdrasil ({}) than its bond ({})",
            node.node_address, ygg_rune, node.bond
        );
    }
    let penalty = ctx.config_uint(ConstantName::SlashPenalty)?;
    let slash_rune = get_uncapped_share(penalty, MAX_BASIS_POINTS, ygg_rune).min(node.bond);
    node.bond = safe_sub(node.bond, slash_rune);
    providers.adjust(node.bond);

    match providers.get(provider).map(|p| p.bond).filter(|b| *b > 0) {
        Some(provider_bond) => {
            amount = amount.min(provider_bond);
            providers.unbond(provider, amount);
            let mut item = TxOutItem::new(
                Chain::THOR,
                Address::from(provider.clone()),
                Coin::new(Asset::rune(), amount),
                tx.id.clone(),
            );
            item.module_name = BOND_NAME.to_string();
            mgr.tx_out_store.try_add_tx_out_item(ctx, mgr, item, 0)?;
            mgr.events.emit(
                ctx,
                Event::Bond {
                    amount,
                    bond_type: BondType::BondReturned,
                    tx_in: tx.clone(),
                },
            );
            node.bond = safe_sub(node.bond, amount);
        }
        None => info!("{} has no bond left in {}", provider, node.node_address),
    }

    if node.requested_to_leave {
        node.update_status(NodeStatus::Disabled, ctx.block_height());
    }
    ctx.keeper.set_node_account(node)?;
    ctx.keeper.set_bond_providers(&providers)?;

    if let Some(ygg) = ygg {
        subsidize_pools(ctx, &ygg, ygg_rune, slash_rune)?;
        ctx.keeper.delete_vault(&ygg.pub_key);
    }
    if slash_rune > 0 {
        mgr.events.emit(
            ctx,
            Event::Bond {
                amount: slash_rune,
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

fn check_not_jailed(ctx: &Context, node_address: &AccAddress) -> Result<()> {
    let jail = ctx.keeper.get_node_account_jail(node_address)?;
    if jail.is_jailed(ctx.block_height()) {
        return Err(RuntimeError::UnknownRequest(format!(
            "jailed until {}: {}",
            jail.release_height, jail.reason
        )));
    }
    Ok(())
}

fn validate_unbond_v1(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = unbond_msg(msg)?;
    let Some(node) = ctx.keeper.get_node_account(&msg.node_address)? else {
        return Err(RuntimeError::UnknownRequest(format!("{} is not a node", msg.node_address)));
    };
    if matches!(node.status, NodeStatus::Active | NodeStatus::Ready) {
        return Err(RuntimeError::UnknownRequest(
            "cannot unbond while node is in active or ready status".to_string(),
        ));
    }
    if ctx.config_i64(ConstantName::PauseUnbond)? > 0 {
        return Err(RuntimeError::UnknownRequest("unbonding has been paused".to_string()));
    }
    yggdrasil_of(ctx, &node)?;
    check_not_jailed(ctx, &msg.node_address)?;

    let from = msg.bond_address.acc_address()?;
    if !ctx.keeper.get_bond_providers(&msg.node_address)?.has(&from) && msg.bond_address != node.bond_address {
        return Err(RuntimeError::Unauthorized(format!(
            "{} is not authorized to manage {}",
            msg.bond_address, msg.node_address
        )));
    }
    Ok(())
}

fn handle_unbond_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = unbond_msg(msg)?;
    let Some(mut node) = ctx.keeper.get_node_account(&msg.node_address)? else {
        return Err(RuntimeError::UnknownRequest(format!("{} is not a node", msg.node_address)));
    };

    if let Some(ygg) = yggdrasil_of(ctx, &node)?.filter(|v| v.has_funds()) {
        let Some(remains) = yggdrasil_remains(ctx, mgr, &ygg)? else {
            warn!("cannot unbond {} while its yggdrasil still has funds", node.node_address);
            return mgr.validators.request_ygg_return(ctx, mgr, &node);
        };
        let penalty = ctx.config_uint(ConstantName::SlashPenalty)?;
        let allowed = safe_sub(node.bond, get_uncapped_share(penalty, MAX_BASIS_POINTS, remains));
        if msg.amount > allowed {
            return Err(RuntimeError::UnknownRequest(format!(
                "unbond amount {} is more than {}, not allowed",
                msg.amount, allowed
            )));
        }
    }
    check_lockup(ctx, &node)?;
    if in_retiring_vault(ctx, &node)? {
        return Err(RuntimeError::UnknownRequest(
            "node is still part of the retiring vault".to_string(),
        ));
    }

    let from = msg.bond_address.acc_address()?;
    match msg.bond_provider_address.as_ref() {
        Some(provider) if msg.bond_address == node.bond_address => {
            refund_bond(ctx, mgr, &msg.tx_in, provider, msg.amount, &mut node)?;
            // a provider whose bond is gone is no longer whitelisted
            if *provider != from {
                let mut providers = ctx.keeper.get_bond_providers(&node.node_address)?;
                if providers.get(provider).map(|p| p.bond == 0).unwrap_or(false) {
                    providers.remove(provider);
                    ctx.keeper.set_bond_providers(&providers)?;
                }
            }
        }
        _ => refund_bond(ctx, mgr, &msg.tx_in, &from, msg.amount, &mut node)?,
    }

    let paid = msg.tx_in.coins.amount_of(&Asset::rune());
    if paid > 0 {
        node.bond = node.bond.saturating_add(paid);
        ctx.keeper.set_node_account(&node)?;
    }
    Ok(())
}

fn validate_leave_v1(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    check_not_jailed(ctx, &leave_msg(msg)?.node_address)
}

/// An active node is queued to churn out, ranked by age over slash points.
/// Any other node gets its bond back right away when nothing ties it to a
/// vault.
fn handle_leave_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = leave_msg(msg)?;
    let Some(mut node) = ctx
        .keeper
        .get_node_account(&msg.node_address)?
        .filter(|n| !n.is_empty())
    else {
        return Err(RuntimeError::UnknownRequest("node account doesn't exist".to_string()));
    };
    if node.bond_address != msg.tx.from_address {
        return Err(RuntimeError::Unauthorized(format!(
            "{} is not authorized to manage {}",
            msg.tx.from_address, msg.node_address
        )));
    }
    node.bond = node.bond.saturating_add(msg.tx.coins.amount_of(&Asset::rune()));
    let operator = node.bond_address.acc_address()?;
    let height = ctx.block_height();

    if node.is_active() {
        if node.leave_score == 0 {
            let age = ((height - node.status_since).max(0) as Uint) * ONE;
            let slash_points = ctx.keeper.get_node_account_slash_points(&node.node_address)?;
            node.leave_score = if slash_points > 0 {
                (age / slash_points as Uint) as u64
            } else {
                age as u64
            };
        }
    } else {
        check_lockup(ctx, &node)?;
        if in_retiring_vault(ctx, &node)? {
            info!("{} is still part of the retiring vault, bond stays", node.node_address);
        } else {
            match yggdrasil_of(ctx, &node)? {
                None => {
                    refund_bond(ctx, mgr, &msg.tx, &operator, 0, &mut node)?;
                    node.update_status(NodeStatus::Disabled, height);
                }
                Some(ygg) if !ygg.has_funds() => {
                    refund_bond(ctx, mgr, &msg.tx, &operator, 0, &mut node)?;
                    node.update_status(NodeStatus::Disabled, height);
                }
                Some(ygg) => match yggdrasil_remains(ctx, mgr, &ygg)? {
                    Some(remains) if remains <= MAX_ABANDONED_RUNE => {
                        info!("{} abandons yggdrasil {} worth {}", node.node_address, ygg.pub_key, remains);
                        refund_bond(ctx, mgr, &msg.tx, &operator, 0, &mut node)?;
                    }
                    _ => mgr.validators.request_ygg_return(ctx, mgr, &node)?,
                },
            }
        }
    }

    node.requested_to_leave = true;
    ctx.keeper.set_node_account(&node)?;
    mgr.events.emit(
        ctx,
        Event::ValidatorRequestLeave {
            tx: msg.tx.clone(),
            destination: node.bond_address.clone(),
        },
    );
    Ok(())
}
