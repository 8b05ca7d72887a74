//! Whole-state consistency checks.
//!
//! Each check returns whether it is broken and one line per violation. A
//! store failure while checking counts as broken.

use {
    crate::{
        context::Context,
        error::Result,
        keeper::{ASGARD_NAME, BOND_NAME, THORCHAIN_NAME},
        types::VaultType,
    },
    log::*,
    std::collections::BTreeMap,
    thornode_common::{Asset, Coins, Uint},
    thornode_constants::ConstantName,
};

pub type InvariantResult = (bool, Vec<String>);

type Check = fn(&Context) -> Result<Vec<String>>;

pub const ROUTES: &[(&str, Check)] = &[
    ("pool_balances", check_pool_balances),
    ("voter_consensus", check_voter_consensus),
    ("solvency", check_solvency),
    ("active_bond", check_active_bond),
    ("asgard_module", check_asgard_module),
    ("bond_module", check_bond_module),
    ("thorchain_module", check_thorchain_module),
];

fn run(name: &str, check: Check, ctx: &Context) -> InvariantResult {
    match check(ctx) {
        Ok(messages) => (!messages.is_empty(), messages),
        Err(err) => (true, vec![format!("{name}: {err}")]),
    }
}

/// Pool units and pending amounts agree with the providers of the pool.
pub fn pool_balances(ctx: &Context) -> InvariantResult {
    run("pool_balances", check_pool_balances, ctx)
}

/// Every finalised voter carries a canonical tx that one of its
/// observations agrees with.
pub fn voter_consensus(ctx: &Context) -> InvariantResult {
    run("voter_consensus", check_voter_consensus, ctx)
}

/// Vaults hold at least what the pools owe of every external asset.
pub fn solvency(ctx: &Context) -> InvariantResult {
    run("solvency", check_solvency, ctx)
}

/// Active nodes are bonded at least the minimum bond.
pub fn active_bond(ctx: &Context) -> InvariantResult {
    run("active_bond", check_active_bond, ctx)
}

/// The asgard module backs pool rune, pending rune and queued native swaps.
pub fn asgard_module(ctx: &Context) -> InvariantResult {
    run("asgard_module", check_asgard_module, ctx)
}

pub fn bond_module(ctx: &Context) -> InvariantResult {
    run("bond_module", check_bond_module, ctx)
}

pub fn thorchain_module(ctx: &Context) -> InvariantResult {
    run("thorchain_module", check_thorchain_module, ctx)
}

/// Run every check, logging the broken ones.
pub fn run_all(ctx: &Context) -> Vec<(&'static str, InvariantResult)> {
    ROUTES
        .iter()
        .map(|(name, check)| {
            let result = run(name, *check, ctx);
            if result.0 {
                error!("invariant {} broken: {}", name, result.1.join("; "));
            }
            (*name, result)
        })
        .collect()
}

fn check_pool_balances(ctx: &Context) -> Result<Vec<String>> {
    let mut broken = Vec::new();
    for pool in ctx.keeper.get_pools()? {
        let providers = ctx.keeper.liquidity_providers(&pool.asset)?;
        let units: Uint = providers.iter().map(|lp| lp.units).sum();
        let pending_rune: Uint = providers.iter().map(|lp| lp.pending_rune).sum();
        let pending_asset: Uint = providers.iter().map(|lp| lp.pending_asset).sum();
        if units != pool.lp_units {
            broken.push(format!(
                "{}: pool units {} but providers hold {}",
                pool.asset, pool.lp_units, units
            ));
        }
        if pool.lp_units == 0 && pool.balance_rune > 0 {
            broken.push(format!(
                "{}: {} rune without liquidity units",
                pool.asset, pool.balance_rune
            ));
        }
        if pending_rune != pool.pending_inbound_rune || pending_asset != pool.pending_inbound_asset {
            broken.push(format!(
                "{}: pending {}/{} but providers have {}/{}",
                pool.asset,
                pool.pending_inbound_rune,
                pool.pending_inbound_asset,
                pending_rune,
                pending_asset
            ));
        }
    }
    Ok(broken)
}

fn check_voter_consensus(ctx: &Context) -> Result<Vec<String>> {
    let mut broken = Vec::new();
    for voter in ctx.keeper.get_observed_tx_in_voters()? {
        if voter.finalised_height <= 0 {
            continue;
        }
        if voter.tx.is_empty() {
            broken.push(format!("{}: finalised without a tx", voter.tx_id));
            continue;
        }
        if voter.tx.tx.id != voter.tx_id {
            broken.push(format!("{}: carries tx {}", voter.tx_id, voter.tx.tx.id));
        }
        if !voter.txs.iter().any(|tx| tx.tx.equals_ex(&voter.tx.tx)) {
            broken.push(format!("{}: no observation matches its tx", voter.tx_id));
        }
    }
    Ok(broken)
}

fn check_solvency(ctx: &Context) -> Result<Vec<String>> {
    let mut held: BTreeMap<Asset, Uint> = BTreeMap::new();
    for vault in ctx.keeper.get_vaults()? {
        if !matches!(vault.vault_type, VaultType::Asgard | VaultType::Yggdrasil) {
            continue;
        }
        for coin in vault.coins.iter() {
            let entry = held.entry(coin.asset.clone()).or_default();
            *entry = entry.saturating_add(coin.amount);
        }
    }
    let mut broken = Vec::new();
    for pool in ctx.keeper.get_pools()? {
        if pool.asset.is_native() || pool.asset.is_derived() {
            continue;
        }
        let owed = pool.balance_asset.saturating_add(pool.pending_inbound_asset);
        let have = held.get(&pool.asset).copied().unwrap_or_default();
        if have < owed {
            broken.push(format!("insolvent: {} {} (owe {})", have, pool.asset, owed));
        }
    }
    Ok(broken)
}

fn check_active_bond(ctx: &Context) -> Result<Vec<String>> {
    let minimum = ctx.config_uint(ConstantName::MinimumBondInRune)?;
    Ok(ctx
        .keeper
        .list_active_validators()?
        .iter()
        .filter(|n| n.bond < minimum)
        .map(|n| format!("{}: bond {} below {}", n.node_address, n.bond, minimum))
        .collect())
}

fn check_asgard_module(ctx: &Context) -> Result<Vec<String>> {
    let mut expected = Coins::default();
    for pool in ctx.keeper.get_pools()? {
        if pool.asset.is_synthetic() {
            expected.add(&thornode_common::Coin::new(pool.asset.clone(), pool.balance_asset));
        } else if !pool.asset.is_derived() {
            expected.add(&thornode_common::Coin::new(
                Asset::rune(),
                pool.balance_rune.saturating_add(pool.pending_inbound_rune),
            ));
        }
    }
    for (msg, _) in ctx.keeper.get_swap_queue()? {
        for coin in msg.tx.coins.iter().filter(|c| c.is_native()) {
            expected.add(coin);
        }
    }
    let actual = ctx.keeper.get_module_balance(ASGARD_NAME)?;
    let mut broken = Vec::new();
    for coin in expected.iter() {
        let have = actual.amount_of(&coin.asset);
        if have < coin.amount {
            broken.push(format!("insolvent: {} {}", coin.amount - have, coin.asset));
        } else if have > coin.amount {
            broken.push(format!("oversolvent: {} {}", have - coin.amount, coin.asset));
        }
    }
    for coin in actual.iter().filter(|c| expected.amount_of(&c.asset) == 0 && c.amount > 0) {
        broken.push(format!("oversolvent: {}", coin));
    }
    Ok(broken)
}

fn check_bond_module(ctx: &Context) -> Result<Vec<String>> {
    let bonded: Uint = ctx.keeper.list_node_accounts()?.iter().map(|n| n.bond).sum();
    let expected = bonded.saturating_add(ctx.keeper.get_network()?.bond_reward_rune);
    let actual = ctx.keeper.get_rune_balance_of_module(BOND_NAME)?;
    Ok(match actual.cmp(&expected) {
        std::cmp::Ordering::Equal => vec![],
        std::cmp::Ordering::Less => vec![format!("insolvent: {} rune", expected - actual)],
        std::cmp::Ordering::Greater => vec![format!("oversolvent: {} rune", actual - expected)],
    })
}

fn check_thorchain_module(ctx: &Context) -> Result<Vec<String>> {
    Ok(ctx
        .keeper
        .get_module_balance(THORCHAIN_NAME)?
        .iter()
        .filter(|c| c.amount > 0)
        .map(|c| format!("oversolvent: {}", c))
        .collect())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            keeper::RESERVE_NAME,
            test_utils::*,
            types::{LiquidityProvider, NodeStatus},
        },
        thornode_common::{Address, Chain, Coin, ONE},
    };

    #[test]
    fn test_pool_units_must_match_providers() {
        let mut ctx = test_context(10);
        let bnb = Chain::BNB.gas_asset();
        let mut pool = add_pool(&mut ctx, bnb.clone(), 100 * ONE, 10 * ONE);
        pool.lp_units = 100;
        ctx.keeper.set_pool(&pool).unwrap();
        let mut lp = LiquidityProvider::new(
            bnb.clone(),
            Address::new_unchecked("thorlp"),
            Address::new_unchecked("bnb1lp"),
        );
        lp.units = 60;
        ctx.keeper.set_liquidity_provider(&lp).unwrap();
        let (broken, messages) = pool_balances(&ctx);
        assert!(broken);
        assert_eq!(messages.len(), 1);

        lp.units = 100;
        ctx.keeper.set_liquidity_provider(&lp).unwrap();
        assert_eq!(pool_balances(&ctx), (false, vec![]));
    }

    #[test]
    fn test_solvency_counts_every_vault() {
        let mut ctx = test_context(10);
        let bnb = Chain::BNB.gas_asset();
        add_pool(&mut ctx, bnb.clone(), 100 * ONE, 10 * ONE);
        add_asgard(&mut ctx, "asgardpk", &[], vec![Coin::new(bnb.clone(), 9 * ONE)]);
        assert!(solvency(&ctx).0);
        add_asgard(&mut ctx, "asgardpk2", &[], vec![Coin::new(bnb, ONE)]);
        assert!(!solvency(&ctx).0);
    }

    #[test]
    fn test_active_bond_minimum() {
        let mut ctx = test_context(10);
        ctx.keeper
            .set_node_account(&node_account(0, NodeStatus::Active, ONE))
            .unwrap();
        ctx.keeper
            .set_node_account(&node_account(1, NodeStatus::Standby, ONE))
            .unwrap();
        let (broken, messages) = active_bond(&ctx);
        assert!(broken);
        assert_eq!(messages.len(), 1);
        ctx.keeper.set_mimir("MinimumBondInRune", ONE as i64).unwrap();
        assert!(!active_bond(&ctx).0);
    }

    #[test]
    fn test_module_balances() {
        let mut ctx = test_context(10);
        add_active_nodes(&mut ctx, 2);
        assert!(!bond_module(&ctx).0);
        assert!(!thorchain_module(&ctx).0);
        assert!(!asgard_module(&ctx).0);

        ctx.keeper
            .mint_to_module(THORCHAIN_NAME, &Coin::new(Asset::rune(), ONE), "test")
            .unwrap();
        assert!(thorchain_module(&ctx).0);
        ctx.keeper
            .send_from_module_to_module(
                THORCHAIN_NAME,
                RESERVE_NAME,
                &Coins::new(vec![Coin::new(Asset::rune(), ONE)]),
            )
            .unwrap();
        assert!(!thorchain_module(&ctx).0);

        ctx.keeper
            .mint_to_module(ASGARD_NAME, &Coin::new(Asset::rune(), ONE), "test")
            .unwrap();
        let (broken, messages) = asgard_module(&ctx);
        assert!(broken);
        assert!(messages[0].starts_with("oversolvent"));
        assert!(run_all(&ctx).iter().any(|(name, r)| *name == "asgard_module" && r.0));
    }
}
