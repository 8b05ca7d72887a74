//! Yggdrasil funding: topping up the single-node hot vaults from asgard and
//! slashing the ones whose node left without handing the funds back.

use {
    super::{sort_by_security, Managers, YggManager},
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        types::{NodeAccount, NodeStatus, Pool, TxOutItem, Vault, VaultStatus, VaultType},
    },
    log::*,
    thornode_common::{
        math::{get_safe_share, round_to_decimal, safe_sub},
        Chain, Coin, Coins, TxId, Uint,
    },
    thornode_constants::ConstantName,
    thornode_memo::Memo,
};

/// Coins `ygg` should hold in total so that its share of the pooled rune
/// matches the share of bond its node posted, capped at `fund_limit`
/// percent of that bond. Pools shallower than `min_rune_depth` are left
/// out.
pub fn calc_target_ygg_coins(
    pools: &[Pool],
    ygg: &Vault,
    ygg_bond: Uint,
    total_bond: Uint,
    fund_limit: Uint,
    min_rune_depth: Uint,
) -> Result<Coins> {
    let total_liquidity_rune: Uint = pools
        .iter()
        .filter(|p| !p.asset.is_native())
        .map(|p| p.balance_rune)
        .sum();
    if total_liquidity_rune == 0 {
        return Ok(Coins::default());
    }

    // an under bonded network is treated as if it were not, otherwise the
    // vaults would be handed more than the bond covers
    let bond_value = total_bond
        .saturating_mul(2)
        .max(total_liquidity_rune.saturating_mul(4));
    let cap = ygg_bond.saturating_mul(fund_limit) / 100;
    let target_rune = get_safe_share(ygg_bond, bond_value, total_liquidity_rune).min(cap);

    let mut counter: Uint = 0;
    let mut coins = Vec::new();
    for pool in pools {
        if !pool.is_available() || pool.asset.is_native() || pool.balance_rune < min_rune_depth {
            continue;
        }
        let rune_amount = get_safe_share(target_rune, total_liquidity_rune, pool.balance_rune);
        let asset_amount = get_safe_share(target_rune, total_liquidity_rune, pool.balance_asset);
        let amount = round_to_decimal(asset_amount, pool.decimals);
        if amount == 0 {
            continue;
        }
        counter = counter.saturating_add(rune_amount);
        coins.push(Coin::new(pool.asset.clone(), amount));
    }
    if counter > cap {
        return Err(RuntimeError::UnknownRequest(format!(
            "exceeded safe amounts of assets for yggdrasil {} ({counter}/{cap})",
            ygg.pub_key
        )));
    }
    Ok(Coins::new(coins))
}

#[derive(Debug, Default)]
pub struct DefaultYggManager;

impl DefaultYggManager {
    /// Whether `ygg` follows the same router as `asgard` on `chain`. A vault
    /// still on an old router has yet to move its funds and gets nothing.
    fn same_router(asgard: &Vault, ygg: &Vault, chain: Chain) -> bool {
        match asgard.get_router(chain) {
            None => true,
            Some(router) => ygg.get_router(chain) == Some(router),
        }
    }

    /// The yggdrasil of `node`, created with the chains and routers of the
    /// current asgard when it does not exist yet.
    fn get_or_create_ygg(ctx: &mut Context, node: &NodeAccount, asgard: &Vault) -> Result<Vault> {
        let pk = &node.pub_key_set.secp256k1;
        if ctx.keeper.vault_exists(pk) {
            return ctx.keeper.get_vault(pk);
        }
        let mut ygg = Vault::new(
            ctx.block_height(),
            VaultStatus::Active,
            VaultType::Yggdrasil,
            pk.clone(),
            asgard.chains.clone(),
            asgard.routers.clone(),
        );
        ygg.membership.push(pk.clone());
        ctx.keeper.set_vault(&ygg)?;
        info!("created yggdrasil {} for {}", pk, node.node_address);
        Ok(ygg)
    }

    /// Queue outbounds moving `coins` from asgard to `ygg`, gas assets
    /// first so the vault can pay for what it sends later. Returns how many
    /// were queued.
    fn send_coins_to_yggdrasil(ctx: &mut Context, mgr: &Managers, coins: &Coins, ygg: &Vault) -> Result<usize> {
        let height = ctx.block_height();
        let active = ctx.keeper.get_asgard_vaults_by_status(VaultStatus::Active)?;
        let Some(reference) = active.first().cloned() else {
            return Ok(0);
        };
        let (gas_coins, other_coins): (Vec<&Coin>, Vec<&Coin>) =
            coins.iter().partition(|c| c.asset.is_gas_asset());

        let mut count = 0;
        for coin in gas_coins.into_iter().chain(other_coins) {
            if coin.is_empty() {
                continue;
            }
            let chain = coin.asset.get_chain();
            let max_gas = match mgr.gas.get_max_gas(ctx, chain) {
                Ok(max_gas) => max_gas,
                Err(err) => {
                    error!("fail to get max gas of {}: {}", chain, err);
                    continue;
                }
            };
            if !Self::same_router(&reference, ygg, chain) {
                error!("yggdrasil {} has not moved to the current {} router", ygg.pub_key, chain);
                continue;
            }
            if ctx.is_chain_halted(chain)? {
                info!("{} is halted, not funding yggdrasil", chain);
                continue;
            }

            // the sending vault pays the gas of a gas asset transfer as well
            let mut total = coin.amount;
            if coin.asset == max_gas.asset {
                total = total.saturating_add(max_gas.amount);
            }
            let candidates: Vec<Vault> = active
                .iter()
                .filter(|v| !v.is_frozen(chain))
                .filter(|v| v.balance_of(&max_gas.asset) >= max_gas.amount && v.balance_of(&coin.asset) >= total)
                .cloned()
                .collect();
            let Some(source) = sort_by_security(ctx, candidates)?.into_iter().next() else {
                continue;
            };

            let mut item = TxOutItem::new(chain, ygg.pub_key.address(chain), coin.clone(), TxId::blank())
                .with_memo(
                    Memo::YggdrasilFund {
                        block_height: height,
                    }
                    .to_string(),
                )
                .with_vault(source.pub_key.clone());
            item.max_gas = Coins::new(vec![max_gas]);
            item.gas_rate = mgr.gas.get_gas_rate(ctx, chain)?;
            mgr.tx_out_store
                .unsafe_add_tx_out_item(ctx, mgr, item, height)?;
            count += 1;
        }
        Ok(count)
    }

    /// Charge disabled nodes for the funds their yggdrasil still holds, then
    /// forget the vault. Nodes that are still members of an active or
    /// retiring asgard were only just churned out and get more time.
    fn abandon_yggdrasil_vaults(ctx: &mut Context, mgr: &Managers) -> Result<()> {
        let mut asgards = ctx.keeper.get_asgard_vaults_by_status(VaultStatus::Active)?;
        asgards.extend(ctx.keeper.get_asgard_vaults_by_status(VaultStatus::Retiring)?);

        for mut ygg in ctx.keeper.get_yggdrasils()? {
            if !ygg.has_funds() {
                continue;
            }
            let node = match ctx.keeper.get_node_account_by_pub_key(&ygg.pub_key) {
                Ok(Some(node)) => node,
                Ok(None) => continue,
                Err(err) => {
                    error!("fail to get node account of {}: {}", ygg.pub_key, err);
                    continue;
                }
            };
            if node.status != NodeStatus::Disabled || node.bond == 0 {
                continue;
            }
            if asgards.iter().any(|v| v.contains(&node.pub_key_set.secp256k1)) {
                continue;
            }

            info!(
                "{} left without returning yggdrasil funds {}",
                node.node_address, ygg.coins
            );
            let coins = ygg.coins.clone();
            let slashed = mgr.slasher.slash_vault(ctx, mgr, &ygg.pub_key, &coins);
            ygg.sub_funds(&coins);
            ctx.keeper.set_vault(&ygg)?;
            if let Err(err) = slashed {
                error!("fail to slash abandoned yggdrasil {}: {}", ygg.pub_key, err);
                continue;
            }
            ctx.keeper.delete_vault(&ygg.pub_key);
        }
        Ok(())
    }
}

impl YggManager for DefaultYggManager {
    fn fund(&self, ctx: &mut Context, mgr: &Managers) -> Result<()> {
        let height = ctx.block_height();
        if ctx.keeper.ragnarok_in_progress()? {
            return Ok(());
        }
        if ctx.config_i64(ConstantName::StopFundYggdrasil)? > 0 {
            debug!("yggdrasil funding is stopped");
            return Ok(());
        }
        if !ctx
            .keeper
            .get_asgard_vaults_by_status(VaultStatus::Retiring)?
            .is_empty()
        {
            // no funding while a migration is in flight
            return Ok(());
        }
        let nodes = ctx.keeper.list_active_validators()?;
        let min_nodes = ctx.config_i64(ConstantName::MinimumNodesForYggdrasil)?;
        if nodes.is_empty() || (nodes.len() as i64) < min_nodes {
            return Ok(());
        }

        if let Err(err) = Self::abandon_yggdrasil_vaults(ctx, mgr) {
            error!("fail to check abandoned yggdrasil vaults: {}", err);
        }

        // one node per block, round robin
        let total_bond: Uint = nodes.iter().map(|n| n.bond).sum();
        let node = &nodes[(height.max(0) as usize) % nodes.len()];
        if node.bond < ctx.config_uint(ConstantName::MinimumBondInRune)? {
            return Ok(());
        }
        if node.forced_to_leave || node.requested_to_leave {
            return Ok(());
        }

        let Some(asgard) = ctx
            .keeper
            .get_asgard_vaults_by_status(VaultStatus::Active)?
            .into_iter()
            .next()
        else {
            return Err(RuntimeError::UnknownRequest("no active asgard vault".to_string()));
        };
        let mut ygg = Self::get_or_create_ygg(ctx, node, &asgard)?;
        if !ygg.is_yggdrasil() {
            return Ok(());
        }
        let retry = ctx.config_i64(ConstantName::YggFundRetry)?;
        let pending = ygg.len_pending_tx_block_heights(height, retry);
        if pending > 0 {
            return Err(RuntimeError::UnknownRequest(format!(
                "yggdrasil {} still has {pending} funding transactions pending",
                ygg.pub_key
            )));
        }

        let pools = ctx.keeper.get_pools()?;
        let targets = calc_target_ygg_coins(
            &pools,
            &ygg,
            node.bond,
            total_bond,
            ctx.config_uint(ConstantName::YggFundLimit)?,
            ctx.config_uint(ConstantName::PoolDepthForYggFundingMin)?,
        )?;

        // refill once a vault drops below half of what it should hold
        let send = Coins::new(
            targets
                .iter()
                .filter_map(|target| {
                    let held = ygg.balance_of(&target.asset);
                    (held < target.amount / 2).then(|| Coin::new(target.asset.clone(), safe_sub(target.amount, held)))
                })
                .collect(),
        );
        if send.is_empty() {
            return Ok(());
        }
        let count = Self::send_coins_to_yggdrasil(ctx, mgr, &send, &ygg)?;
        if count == 0 {
            return Ok(());
        }
        for _ in 0..count {
            ygg.append_pending_tx_block_height(height);
        }
        ctx.keeper.set_vault(&ygg)?;
        ctx.keeper.set_pending_ygg_fund(&ygg.pub_key, height)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            test_utils::*,
            types::{NetworkFee, PoolStatus},
        },
        thornode_common::{Asset, PubKey, ONE},
    };

    fn bnb() -> Asset {
        Chain::BNB.gas_asset()
    }

    /// Six active nodes bonded with 1000 rune, an asgard holding 1000 BNB
    /// and a BNB pool deep enough to fund from.
    fn setup(height: i64) -> (Context, Managers, Vec<NodeAccount>, Vault) {
        let mut ctx = test_context(height);
        let nodes = add_active_nodes(&mut ctx, 6);
        let asgard = add_asgard(&mut ctx, "asgardpk", &nodes, vec![Coin::new(bnb(), 1_000 * ONE)]);
        add_pool(&mut ctx, bnb(), 1_000 * ONE, 100 * ONE);
        ctx.keeper
            .save_network_fee(&NetworkFee::new(Chain::BNB, 1, 37_500))
            .unwrap();
        ctx.keeper.set_mimir("MinimumBondInRune", 100 * ONE as i64).unwrap();
        ctx.keeper.set_mimir("PoolDepthForYggFundingMin", 0).unwrap();
        (ctx, Managers::default(), nodes, asgard)
    }

    fn queued_funding(ctx: &Context) -> Vec<TxOutItem> {
        ctx.keeper
            .get_tx_out(ctx.block_height())
            .unwrap()
            .tx_array
            .into_iter()
            .filter(|item| item.memo.starts_with("YGGDRASIL+"))
            .collect()
    }

    #[test]
    fn test_target_coins_follow_bond_share() {
        let mut pool = Pool::new(bnb());
        pool.balance_rune = 1_000 * ONE;
        pool.balance_asset = 100 * ONE;
        pool.status = PoolStatus::Available;
        let ygg = Vault::new(1, VaultStatus::Active, VaultType::Yggdrasil, node_pub_key(0), vec![Chain::BNB], vec![]);

        // bond value is floored at four times the pooled rune: 4000 rune
        let coins = calc_target_ygg_coins(&[pool.clone()], &ygg, 1_000 * ONE, 2_000 * ONE, 50, 0).unwrap();
        assert_eq!(coins.amount_of(&bnb()), 25 * ONE);

        // what the vault already holds does not change its target
        let mut stocked = ygg.clone();
        stocked.add_funds(&Coins::new(vec![Coin::new(bnb(), 20 * ONE)]));
        let coins = calc_target_ygg_coins(&[pool.clone()], &stocked, 1_000 * ONE, 2_000 * ONE, 50, 0).unwrap();
        assert_eq!(coins.amount_of(&bnb()), 25 * ONE);

        // shallow pools are skipped
        let coins = calc_target_ygg_coins(&[pool.clone()], &ygg, 1_000 * ONE, 2_000 * ONE, 50, 2_000 * ONE).unwrap();
        assert!(coins.is_empty());

        // nothing pooled, nothing to hand out
        pool.balance_rune = 0;
        assert!(calc_target_ygg_coins(&[pool], &ygg, ONE, ONE, 50, 0).unwrap().is_empty());
    }

    #[test]
    fn test_fund_creates_and_tops_up_yggdrasil() {
        let (mut ctx, mgr, nodes, asgard) = setup(12);
        mgr.ygg.fund(&mut ctx, &mgr).unwrap();

        // height 12 over six nodes picks the first one
        let pk = nodes[0].pub_key_set.secp256k1.clone();
        let ygg = ctx.keeper.get_vault(&pk).unwrap();
        assert!(ygg.is_yggdrasil());
        assert_eq!(ygg.membership, vec![pk.clone()]);
        assert_eq!(ygg.pending_tx_block_heights, vec![12]);
        assert_eq!(ctx.keeper.get_pending_ygg_fund(&pk).unwrap(), 12);

        let items = queued_funding(&ctx);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].vault_pub_key, asgard.pub_key);
        assert_eq!(items[0].to_address, pk.address(Chain::BNB));
        assert_eq!(items[0].memo, Memo::YggdrasilFund { block_height: 12 }.to_string());
        assert!(items[0].in_hash.is_blank());
        assert!(items[0].coin.amount > 0);

        // a second round while the first is pending is refused
        assert!(mgr.ygg.fund(&mut ctx, &mgr).is_err());
        assert_eq!(queued_funding(&ctx).len(), 1);
    }

    #[test]
    fn test_vault_above_half_target_is_not_refilled() {
        let (mut ctx, mgr, nodes, _) = setup(12);
        // six nodes of 1000 bond put the target of one at 8.33 BNB
        let pk = nodes[0].pub_key_set.secp256k1.clone();
        let mut ygg = Vault::new(1, VaultStatus::Active, VaultType::Yggdrasil, pk.clone(), vec![Chain::BNB], vec![]);
        ygg.membership = vec![pk.clone()];
        ygg.add_funds(&Coins::new(vec![Coin::new(bnb(), 5 * ONE)]));
        ctx.keeper.set_vault(&ygg).unwrap();

        mgr.ygg.fund(&mut ctx, &mgr).unwrap();
        assert!(queued_funding(&ctx).is_empty());

        ygg.sub_funds(&Coins::new(vec![Coin::new(bnb(), 2 * ONE)]));
        ctx.keeper.set_vault(&ygg).unwrap();
        mgr.ygg.fund(&mut ctx, &mgr).unwrap();
        let items = queued_funding(&ctx);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].coin.amount, 833_333_333 - 3 * ONE);
    }

    #[test]
    fn test_fund_gates() {
        let (mut ctx, mgr, _, _) = setup(12);
        ctx.keeper.set_mimir("StopFundYggdrasil", 1).unwrap();
        mgr.ygg.fund(&mut ctx, &mgr).unwrap();
        assert!(queued_funding(&ctx).is_empty());
        assert!(ctx.keeper.get_yggdrasils().unwrap().is_empty());

        ctx.keeper.set_mimir("StopFundYggdrasil", 0).unwrap();
        ctx.keeper.set_mimir("MinimumNodesForYggdrasil", 7).unwrap();
        mgr.ygg.fund(&mut ctx, &mgr).unwrap();
        assert!(queued_funding(&ctx).is_empty());

        ctx.keeper.set_mimir("MinimumNodesForYggdrasil", 6).unwrap();
        let mut retiring = Vault::new(
            1,
            VaultStatus::Retiring,
            VaultType::Asgard,
            PubKey::new("oldpk").unwrap(),
            vec![Chain::BNB],
            vec![],
        );
        retiring.add_funds(&Coins::new(vec![Coin::new(bnb(), ONE)]));
        ctx.keeper.set_vault(&retiring).unwrap();
        mgr.ygg.fund(&mut ctx, &mgr).unwrap();
        assert!(queued_funding(&ctx).is_empty());
    }

    #[test]
    fn test_node_leaving_is_not_funded() {
        let (mut ctx, mgr, mut nodes, _) = setup(12);
        nodes[0].requested_to_leave = true;
        ctx.keeper.set_node_account(&nodes[0]).unwrap();
        mgr.ygg.fund(&mut ctx, &mgr).unwrap();
        assert!(queued_funding(&ctx).is_empty());
    }

    #[test]
    fn test_abandoned_yggdrasil_is_slashed_and_removed() {
        let (mut ctx, mgr, mut nodes, _) = setup(12);
        // the disabled node is no longer part of any asgard
        let mut asgard = ctx.keeper.get_vault(&PubKey::new("asgardpk").unwrap()).unwrap();
        asgard.membership.retain(|pk| *pk != nodes[5].pub_key_set.secp256k1);
        ctx.keeper.set_vault(&asgard).unwrap();

        let pk = nodes[5].pub_key_set.secp256k1.clone();
        let mut ygg = Vault::new(1, VaultStatus::Active, VaultType::Yggdrasil, pk.clone(), vec![Chain::BNB], vec![]);
        ygg.membership = vec![pk.clone()];
        ygg.add_funds(&Coins::new(vec![Coin::new(bnb(), ONE)]));
        ctx.keeper.set_vault(&ygg).unwrap();
        nodes[5].status = NodeStatus::Disabled;
        ctx.keeper.set_node_account(&nodes[5]).unwrap();
        // still six active nodes for the funding gate
        let extra = node_account(6, NodeStatus::Active, 1_000 * ONE);
        ctx.keeper.set_node_account(&extra).unwrap();

        mgr.ygg.fund(&mut ctx, &mgr).unwrap();

        assert!(!ctx.keeper.vault_exists(&pk));
        let node = ctx.keeper.get_node_account(&nodes[5].node_address).unwrap().unwrap();
        assert!(node.bond < 1_000 * ONE);
        assert!(ctx.keeper.get_pool(&bnb()).unwrap().balance_asset < 100 * ONE);
    }

    #[test]
    fn test_disabled_asgard_member_keeps_yggdrasil() {
        let (mut ctx, mgr, mut nodes, _) = setup(12);
        let pk = nodes[5].pub_key_set.secp256k1.clone();
        let mut ygg = Vault::new(1, VaultStatus::Active, VaultType::Yggdrasil, pk.clone(), vec![Chain::BNB], vec![]);
        ygg.membership = vec![pk.clone()];
        ygg.add_funds(&Coins::new(vec![Coin::new(bnb(), ONE)]));
        ctx.keeper.set_vault(&ygg).unwrap();
        nodes[5].status = NodeStatus::Disabled;
        ctx.keeper.set_node_account(&nodes[5]).unwrap();
        ctx.keeper
            .set_node_account(&node_account(6, NodeStatus::Active, 1_000 * ONE))
            .unwrap();

        mgr.ygg.fund(&mut ctx, &mgr).unwrap();

        // still a member of the active asgard
        assert!(ctx.keeper.vault_exists(&pk));
        let node = ctx.keeper.get_node_account(&nodes[5].node_address).unwrap().unwrap();
        assert_eq!(node.bond, 1_000 * ONE);
    }
}
