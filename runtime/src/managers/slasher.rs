use {
    super::{sort_by_security, Managers, Slasher},
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        events::{BondType, Event, PoolAmount},
        keeper::{ASGARD_NAME, BOND_NAME, RESERVE_NAME},
        types::{NodeStatus, TxOutItem, VaultStatus},
        versioned::{select, VersionBranch},
    },
    log::*,
    thornode_common::{
        math::{get_safe_share, get_uncapped_share, has_super_majority, mul_div, safe_sub},
        AccAddress, Asset, Coin, Coins, PubKey, Tx, TxId, Uint, MAX_BASIS_POINTS,
    },
    thornode_constants::ConstantName,
    thornode_memo::{parse_memo, TxType},
};

type ShareFn = fn(Uint, Uint, Uint) -> Uint;

/// How a vault slash is split across members by bond.
static SLASH_SHARE: &[VersionBranch<ShareFn>] = &[
    VersionBranch {
        since: (1, 92, 0),
        name: "safe_share",
        entrypoint: get_safe_share,
    },
    VersionBranch {
        since: (0, 1, 0),
        name: "uncapped_share",
        entrypoint: get_uncapped_share,
    },
];

#[derive(Debug, Default)]
pub struct DefaultSlasher;

impl DefaultSlasher {
    /// Take `coin` out of its pool and hand the pool the equivalent rune,
    /// which the slashed bond pays for. Returns the rune value.
    fn adjust_pool_for_slashed_asset(ctx: &mut Context, mgr: &Managers, coin: &Coin) -> Result<Uint> {
        let mut pool = ctx.keeper.get_pool(&coin.asset)?;
        if pool.is_empty() {
            error!("cannot slash for an empty pool: {}", coin.asset);
            return Ok(0);
        }
        let amount = coin.amount.min(pool.balance_asset);
        let rune_value = pool.asset_value_in_rune(amount);
        pool.balance_asset = safe_sub(pool.balance_asset, amount);
        pool.balance_rune = pool.balance_rune.saturating_add(rune_value);
        ctx.keeper.set_pool(&pool)?;
        mgr.events.emit(
            ctx,
            Event::Slash {
                pool: pool.asset.clone(),
                slash_amount: vec![
                    PoolAmount {
                        asset: pool.asset,
                        amount: -(amount as i128),
                    },
                    PoolAmount {
                        asset: Asset::rune(),
                        amount: rune_value as i128,
                    },
                ],
            },
        );
        Ok(rune_value)
    }

    fn pause_on_large_slash(ctx: &mut Context, mgr: &Managers, coin: &Coin, slash_rune: Uint) -> Result<()> {
        let threshold = ctx.config_i64(ConstantName::PauseOnSlashThreshold)?;
        if threshold <= 0 || slash_rune < threshold as Uint {
            return Ok(());
        }
        let key = coin.asset.get_chain().halt_signing_key();
        warn!("slash of {} rune halts signing on {}", slash_rune, coin.asset.get_chain());
        ctx.keeper.set_mimir(&key, ctx.block_height())?;
        mgr.events.emit(
            ctx,
            Event::SetMimir {
                key: key.to_uppercase(),
                value: ctx.block_height(),
            },
        );
        Ok(())
    }

    /// A Yggdrasil owner whose bond is gone is forced out, unless doing so
    /// would break the super majority of a vault it still signs for.
    fn should_force_leave(ctx: &Context, signer_membership: &[PubKey]) -> Result<bool> {
        for pk in signer_membership {
            let Ok(vault) = ctx.keeper.get_vault(pk) else {
                continue;
            };
            if !matches!(vault.status, VaultStatus::Active | VaultStatus::Retiring) {
                continue;
            }
            let mut active_members = 0;
            for member in &vault.membership {
                if let Some(node) = ctx.keeper.get_node_account_by_pub_key(member)? {
                    if node.status == NodeStatus::Active {
                        active_members += 1;
                    }
                }
            }
            if !has_super_majority(active_members, vault.membership.len()) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Refresh the max gas recorded against `item` on its inbound voter.
    fn update_action_gas(ctx: &mut Context, item: &TxOutItem) -> Result<()> {
        if item.in_hash.is_blank() || item.in_hash.is_empty() {
            return Ok(());
        }
        let mut voter = ctx.keeper.get_observed_tx_in_voter(&item.in_hash)?;
        for action in voter.actions.iter_mut().filter(|a| a.equals(item)) {
            action.max_gas = item.max_gas.clone();
        }
        ctx.keeper.set_observed_tx_in_voter(&voter)
    }
}

impl Slasher for DefaultSlasher {
    fn begin_block(&self, ctx: &mut Context, mgr: &Managers) -> Result<()> {
        if let Err(err) = self.lack_observing(ctx) {
            error!("fail to slash for lack of observing: {}", err);
        }
        self.lack_signing(ctx, mgr)
    }

    fn slash_vault(&self, ctx: &mut Context, mgr: &Managers, vault_pk: &PubKey, coins: &Coins) -> Result<()> {
        if coins.is_empty() {
            return Ok(());
        }
        let vault = ctx.keeper.get_vault(vault_pk)?;
        let mut total_bond: Uint = 0;
        for member in &vault.membership {
            match ctx.keeper.get_node_account_by_pub_key(member)? {
                Some(node) => total_bond = total_bond.saturating_add(node.bond),
                None => warn!("vault member {} has no node account", member),
            }
        }
        let share = select(SLASH_SHARE, ctx.version())?.entrypoint;
        let penalty = ctx.config_uint(ConstantName::SlashPenalty)?;

        for coin in coins.iter().filter(|c| !c.is_empty()) {
            let rune_value = if coin.asset.is_rune() {
                coin.amount
            } else {
                Self::adjust_pool_for_slashed_asset(ctx, mgr, coin)?
            };
            if rune_value == 0 {
                continue;
            }
            let slash_rune = mul_div(rune_value, penalty, MAX_BASIS_POINTS);
            Self::pause_on_large_slash(ctx, mgr, coin, slash_rune)?;

            let mut slashed_total: Uint = 0;
            for member in &vault.membership {
                let Some(mut node) = ctx.keeper.get_node_account_by_pub_key(member)? else {
                    continue;
                };
                if node.bond == 0 {
                    info!("bond of {} is zero, nothing to slash", node.node_address);
                    continue;
                }
                let amount = share(node.bond, total_bond, slash_rune).min(node.bond);
                info!(
                    "slash {} rune from {} for {} missing from vault {}",
                    amount, node.node_address, coin, vault_pk
                );
                node.sub_bond(amount);
                slashed_total = slashed_total.saturating_add(amount);

                let tx = Tx {
                    id: TxId::blank(),
                    from_address: node.bond_address.clone(),
                    ..Tx::default()
                };
                mgr.events.emit(
                    ctx,
                    Event::Bond {
                        amount,
                        bond_type: BondType::BondCost,
                        tx_in: tx,
                    },
                );

                if vault.is_yggdrasil()
                    && node.bond == 0
                    && Self::should_force_leave(ctx, &node.signer_membership)?
                {
                    node.forced_to_leave = true;
                    node.leave_score = 1;
                }
                ctx.keeper.set_node_account(&node)?;
            }

            let to_asgard = rune_value.min(slashed_total);
            let to_reserve = safe_sub(slashed_total, to_asgard);
            if to_reserve > 0 {
                let coins = Coins::new(vec![Coin::new(Asset::rune(), to_reserve)]);
                if let Err(err) = ctx.keeper.send_from_module_to_module(BOND_NAME, RESERVE_NAME, &coins) {
                    error!("fail to send slash funds to reserve: {}", err);
                }
            }
            if to_asgard > 0 {
                let coins = Coins::new(vec![Coin::new(Asset::rune(), to_asgard)]);
                if let Err(err) = ctx.keeper.send_from_module_to_module(BOND_NAME, ASGARD_NAME, &coins) {
                    error!("fail to send slash funds to asgard: {}", err);
                }
            }
        }
        Ok(())
    }

    fn inc_slash_points(&self, ctx: &mut Context, points: i64, addrs: &[AccAddress], reason: &str) -> Result<()> {
        for addr in addrs {
            if let Err(err) = ctx.keeper.inc_node_account_slash_points(addr, points) {
                error!("fail to increase slash points of {}: {}", addr, err);
                continue;
            }
            trace!("{} slash points to {}: {}", points, addr, reason);
        }
        Ok(())
    }

    fn dec_slash_points(&self, ctx: &mut Context, points: i64, addrs: &[AccAddress]) -> Result<()> {
        for addr in addrs {
            if let Err(err) = ctx.keeper.dec_node_account_slash_points(addr, points) {
                error!("fail to decrease slash points of {}: {}", addr, err);
            }
        }
        Ok(())
    }

    fn lack_observing(&self, ctx: &mut Context) -> Result<()> {
        let period = ctx.config_i64(ConstantName::SigningTransactionPeriod)?;
        let height = ctx.block_height();
        // a non-positive period switches the signing timeout off
        if period <= 0 || height < period {
            return Ok(());
        }
        let penalty = ctx.config_i64(ConstantName::LackOfObservationPenalty)?;
        let tx_out = ctx.keeper.get_tx_out(height - period)?;
        let nodes = ctx.keeper.list_active_validators()?;
        for item in tx_out.tx_array {
            if item.in_hash.is_empty() || item.in_hash.is_blank() {
                continue;
            }
            let voter = ctx.keeper.get_observed_tx_in_voter(&item.in_hash)?;
            if voter.txs.is_empty() || voter.tx.is_empty() || voter.tx.signers.is_empty() {
                continue;
            }
            let checked_height = if voter.tx.is_final() {
                voter.finalised_height
            } else {
                voter.height
            };
            let signers: Vec<_> = voter.txs.iter().flat_map(|t| t.signers.iter()).collect();
            for node in &nodes {
                if node.active_block_height > checked_height {
                    continue;
                }
                if !signers.contains(&&node.node_address) {
                    debug!("{} did not observe {}", node.node_address, item.in_hash);
                    ctx.keeper
                        .inc_node_account_slash_points(&node.node_address, penalty)?;
                }
            }
        }
        Ok(())
    }

    fn lack_signing(&self, ctx: &mut Context, mgr: &Managers) -> Result<()> {
        let period = ctx.config_i64(ConstantName::SigningTransactionPeriod)?;
        let height = ctx.block_height();
        // a non-positive period switches the signing timeout off
        if period <= 0 || height < period {
            return Ok(());
        }
        let max_attempts = ctx.config_i64(ConstantName::MaxOutboundAttempts)?;
        let mut tx_out = ctx.keeper.get_tx_out(height - period)?;
        let mut first_err = None;

        for i in 0..tx_out.tx_array.len() {
            let mut item = tx_out.tx_array[i].clone();
            if item.is_signed() {
                continue;
            }
            let vault = ctx.keeper.get_vault(&item.vault_pub_key).ok();
            let was_yggdrasil = vault.as_ref().map(|v| v.is_yggdrasil()).unwrap_or_default();
            if was_yggdrasil && !ctx.is_chain_halted(item.chain)? {
                if let Some(node) = ctx.keeper.get_node_account_by_pub_key(&item.vault_pub_key)? {
                    let points = period * 2;
                    let reason = format!("fail to sign out tx after {period} blocks");
                    ctx.keeper
                        .inc_node_account_slash_points(&node.node_address, points)?;
                    mgr.events.emit(
                        ctx,
                        Event::SlashPoint {
                            node_address: node.node_address.clone(),
                            slash_points: points,
                            reason,
                        },
                    );
                    ctx.keeper.set_node_account_jail(
                        &node.node_address,
                        height,
                        period * 2,
                        "fail to send yggdrasil transaction",
                    )?;
                }
            }

            let tx_type = parse_memo(ctx.version(), &ctx.keeper, &item.memo)
                .map(|m| m.tx_type())
                .unwrap_or_default();
            if tx_type.is_internal() {
                continue;
            }
            let is_ragnarok = tx_type == TxType::Ragnarok;
            let mut voter = if is_ragnarok {
                None
            } else {
                Some(ctx.keeper.get_observed_tx_in_voter(&item.in_hash)?)
            };
            let finalised_height = voter.as_ref().map(|v| v.finalised_height).unwrap_or_default();
            let age = height - finalised_height;
            if max_attempts > 0 && age / period >= max_attempts {
                info!("outbound of {} dropped after too many attempts", item.in_hash);
                if voter.is_some() && !item.in_hash.is_blank() {
                    ctx.keeper.set_dangling_actions(&item.in_hash)?;
                }
                continue;
            }

            // a vault frozen on this chain cannot sign for it
            let active: Vec<_> = ctx
                .keeper
                .get_asgard_vaults_by_status(VaultStatus::Active)?
                .into_iter()
                .filter(|v| !v.is_frozen(item.chain))
                .collect();
            let mut available: Vec<_> = active
                .iter()
                .filter(|v| v.balance_of(&item.coin.asset) >= item.coin.amount)
                .cloned()
                .collect();
            available.sort_by(|a, b| b.balance_of(&item.coin.asset).cmp(&a.balance_of(&item.coin.asset)));
            let next_vault = if available.is_empty() {
                error!("no asgard holds {}, trying the most secure", item.coin);
                sort_by_security(ctx, active)?.into_iter().next()
            } else {
                let age = if was_yggdrasil { (age - period).max(0) } else { age };
                let mut rep = (age / period) as usize;
                if available[rep % available.len()].pub_key == item.vault_pub_key {
                    rep += 1;
                }
                Some(available[rep % available.len()].clone())
            };
            let Some(next_vault) = next_vault else {
                first_err.get_or_insert(RuntimeError::FailAddOutboundTx(
                    "no active asgard vault to reschedule".to_string(),
                ));
                continue;
            };

            if let Some(voter) = voter.as_mut() {
                let tx = voter.get_tx(&[]);
                if tx.is_done(voter.actions.len()) {
                    if let Some(hash) = tx.out_hashes.first() {
                        tx_out.tx_array[i].out_hash = hash.clone();
                    }
                    continue;
                }
                for action in voter.actions.iter_mut().filter(|a| a.equals(&item)) {
                    action.vault_pub_key = next_vault.pub_key.clone();
                }
                ctx.keeper.set_observed_tx_in_voter(voter)?;
            }
            item.vault_pub_key = next_vault.pub_key.clone();

            match mgr.gas.get_max_gas(ctx, item.chain) {
                Ok(max_gas) => {
                    item.max_gas = Coins::new(vec![max_gas]);
                    Self::update_action_gas(ctx, &item)?;
                }
                Err(err) => error!("fail to get max gas: {}", err),
            }
            item.gas_rate = mgr.gas.get_gas_rate(ctx, item.chain)?;

            if !item.coin.asset.is_rune() && !ctx.keeper.pool_exists(&item.coin.asset) {
                error!("cannot reschedule {}: no pool", item.coin);
                continue;
            }
            info!("reschedule {} to vault {}", item.in_hash, item.vault_pub_key);
            if let Err(err) = mgr
                .tx_out_store
                .unsafe_add_tx_out_item(ctx, mgr, item, height)
            {
                error!("fail to reschedule outbound: {}", err);
                first_err.get_or_insert(err);
                continue;
            }
            tx_out.tx_array[i].out_hash = TxId::blank();
        }
        if !tx_out.is_empty() {
            ctx.keeper.set_tx_out(&tx_out)?;
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn handle_double_sign(&self, ctx: &mut Context, node: &AccAddress, infraction_height: i64) -> Result<()> {
        let max_age = ctx.config_i64(ConstantName::DoubleSignMaxAge)?;
        if ctx.block_height() - infraction_height > max_age {
            info!("double sign by {} at {} is too old to slash", node, infraction_height);
            return Ok(());
        }
        let mut account = ctx
            .keeper
            .list_active_validators()?
            .into_iter()
            .find(|n| n.node_address == *node || n.validator_cons_pub_key == node.as_str())
            .ok_or_else(|| {
                RuntimeError::UnknownRequest(format!("no active node with validator address {node}"))
            })?;
        if account.bond == 0 {
            return Err(RuntimeError::UnknownRequest(format!(
                "{node} double signed but has no bond to slash"
            )));
        }
        let min_bond = ctx.config_uint(ConstantName::MinimumBondInRune)?;
        let amount = account.sub_bond(min_bond * 5 / 100);
        warn!("slash {} rune from {} for double signing", amount, node);
        ctx.keeper.send_from_module_to_module(
            BOND_NAME,
            RESERVE_NAME,
            &Coins::new(vec![Coin::new(Asset::rune(), amount)]),
        )?;
        ctx.keeper.set_node_account(&account)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            keeper::Keeper,
            types::{NodeAccount, Pool, PoolStatus, Vault, VaultType},
        },
        assert_matches::assert_matches,
        semver::Version,
        thornode_common::{AccAddress, Address, Chain, PubKey, PubKeySet, ONE},
    };

    struct Fixture {
        ctx: Context,
        mgr: Managers,
        nodes: Vec<NodeAccount>,
        vault: Vault,
    }

    fn fixture(bonds: &[Uint]) -> Fixture {
        let mut ctx = Context::new(Keeper::default(), 1_000, Version::new(1, 111, 0));
        let mut nodes = Vec::new();
        let mut vault = Vault::new(
            1,
            VaultStatus::Active,
            VaultType::Asgard,
            PubKey::new("asgardpk").unwrap(),
            vec![Chain::BNB],
            vec![],
        );
        for (i, bond) in bonds.iter().enumerate() {
            let pk = PubKey::new(&format!("nodepk{i}")).unwrap();
            let mut node = NodeAccount::new(
                AccAddress::new(&format!("thornode{i}")).unwrap(),
                NodeStatus::Active,
                PubKeySet::new(pk.clone(), pk.clone()),
                format!("thorvalcons{i}"),
                *bond,
                Address::new_unchecked(format!("thorbond{i}")),
                1,
            );
            node.active_block_height = 1;
            ctx.keeper.set_node_account(&node).unwrap();
            vault.membership.push(pk);
            nodes.push(node);
        }
        ctx.keeper.set_vault(&vault).unwrap();
        let total: Uint = bonds.iter().sum();
        ctx.keeper
            .mint_to_module(BOND_NAME, &Coin::new(Asset::rune(), total), "test")
            .unwrap();
        let mut pool = Pool::new(Chain::BNB.gas_asset());
        pool.balance_rune = 1_000 * ONE;
        pool.balance_asset = 100 * ONE;
        pool.lp_units = 100;
        pool.status = PoolStatus::Available;
        ctx.keeper.set_pool(&pool).unwrap();
        Fixture {
            ctx,
            mgr: Managers::default(),
            nodes,
            vault,
        }
    }

    #[test]
    fn test_slash_vault_splits_by_bond() {
        let Fixture {
            mut ctx,
            mgr,
            nodes,
            vault,
        } = fixture(&[300 * ONE, 100 * ONE]);
        let coins = Coins::new(vec![Coin::new(Chain::BNB.gas_asset(), ONE)]);
        mgr.slasher
            .slash_vault(&mut ctx, &mgr, &vault.pub_key, &coins)
            .unwrap();

        // 1 BNB is worth 10 rune, slashed at 1.5x
        let pool = ctx.keeper.get_pool(&Chain::BNB.gas_asset()).unwrap();
        assert_eq!(pool.balance_asset, 99 * ONE);
        assert_eq!(pool.balance_rune, 1_010 * ONE);
        let bond0 = ctx.keeper.get_node_account(&nodes[0].node_address).unwrap().unwrap().bond;
        let bond1 = ctx.keeper.get_node_account(&nodes[1].node_address).unwrap().unwrap().bond;
        assert_eq!(bond0, 300 * ONE - 1_125_000_000);
        assert_eq!(bond1, 100 * ONE - 375_000_000);
        assert_eq!(ctx.keeper.get_rune_balance_of_module(ASGARD_NAME).unwrap(), 10 * ONE);
        assert_eq!(ctx.keeper.get_rune_balance_of_module(RESERVE_NAME).unwrap(), 5 * ONE);
        assert!(ctx
            .keeper
            .store()
            .events()
            .iter()
            .any(|e| matches!(e, Event::Slash { .. })));
    }

    #[test]
    fn test_large_slash_halts_signing() {
        let Fixture {
            mut ctx,
            mgr,
            vault,
            ..
        } = fixture(&[10_000 * ONE]);
        let coins = Coins::new(vec![Coin::new(Chain::BNB.gas_asset(), 10 * ONE)]);
        mgr.slasher
            .slash_vault(&mut ctx, &mgr, &vault.pub_key, &coins)
            .unwrap();
        assert_eq!(
            ctx.keeper.get_mimir(&Chain::BNB.halt_signing_key()).unwrap(),
            Some(1_000)
        );
        assert!(ctx.is_signing_halted(Chain::BNB).unwrap());
    }

    #[test]
    fn test_slash_points_never_negative() {
        let Fixture {
            mut ctx, mgr, nodes, ..
        } = fixture(&[ONE]);
        let addr = [nodes[0].node_address.clone()];
        mgr.slasher
            .inc_slash_points(&mut ctx, 3, &addr, "test")
            .unwrap();
        mgr.slasher.dec_slash_points(&mut ctx, 5, &addr).unwrap();
        assert_eq!(
            ctx.keeper
                .get_node_account_slash_points(&nodes[0].node_address)
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_double_sign() {
        let Fixture {
            mut ctx, mgr, nodes, ..
        } = fixture(&[100_000 * ONE]);
        mgr.slasher
            .handle_double_sign(&mut ctx, &nodes[0].node_address, 990)
            .unwrap();
        let node = ctx.keeper.get_node_account(&nodes[0].node_address).unwrap().unwrap();
        assert_eq!(node.bond, 50_000 * ONE);
        assert_eq!(
            ctx.keeper.get_rune_balance_of_module(RESERVE_NAME).unwrap(),
            50_000 * ONE
        );
        // too old
        mgr.slasher
            .handle_double_sign(&mut ctx, &nodes[0].node_address, 900)
            .unwrap();
        assert_matches!(
            mgr.slasher.handle_double_sign(
                &mut ctx,
                &AccAddress::new("thorstranger").unwrap(),
                1_000
            ),
            Err(RuntimeError::UnknownRequest(_))
        );
    }

    #[test]
    fn test_lack_signing_reschedules_to_another_vault() {
        let Fixture {
            mut ctx,
            mgr,
            mut vault,
            ..
        } = fixture(&[ONE]);
        let bnb = Chain::BNB.gas_asset();
        vault.add_funds(&Coins::new(vec![Coin::new(bnb.clone(), 10 * ONE)]));
        ctx.keeper.set_vault(&vault).unwrap();
        let mut other = Vault::new(
            1,
            VaultStatus::Active,
            VaultType::Asgard,
            PubKey::new("otherpk").unwrap(),
            vec![Chain::BNB],
            vec![],
        );
        other.add_funds(&Coins::new(vec![Coin::new(bnb.clone(), 5 * ONE)]));
        ctx.keeper.set_vault(&other).unwrap();
        ctx.keeper
            .save_network_fee(&crate::types::NetworkFee::new(Chain::BNB, 1, 37_500))
            .unwrap();

        let in_hash = TxId::from_bytes(b"inbound");
        let item = TxOutItem::new(
            Chain::BNB,
            Address::new_unchecked("bnbdestination"),
            Coin::new(bnb, ONE),
            in_hash.clone(),
        )
        .with_memo(format!("OUT:{in_hash}"))
        .with_vault(vault.pub_key.clone());
        let mut voter = ctx.keeper.get_observed_tx_in_voter(&in_hash).unwrap();
        voter.finalised_height = 700;
        voter.actions.push(item.clone());
        ctx.keeper.set_observed_tx_in_voter(&voter).unwrap();
        ctx.keeper.append_tx_out(700, item).unwrap();

        mgr.slasher.lack_signing(&mut ctx, &mgr).unwrap();

        let old = ctx.keeper.get_tx_out(700).unwrap().tx_array;
        assert!(old[0].out_hash.is_blank());
        let new = ctx.keeper.get_tx_out(1_000).unwrap().tx_array;
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].vault_pub_key, other.pub_key);
        let voter = ctx.keeper.get_observed_tx_in_voter(&in_hash).unwrap();
        assert_eq!(voter.actions[0].vault_pub_key, other.pub_key);
    }
    #[test]
    fn test_lack_signing_skips_frozen_vaults() {
        let Fixture {
            mut ctx,
            mgr,
            mut vault,
            ..
        } = fixture(&[ONE]);
        let bnb = Chain::BNB.gas_asset();
        vault.add_funds(&Coins::new(vec![Coin::new(bnb.clone(), 10 * ONE)]));
        ctx.keeper.set_vault(&vault).unwrap();
        let asgard = |pk: &str, amount: Uint, frozen: bool| {
            let mut v = Vault::new(
                1,
                VaultStatus::Active,
                VaultType::Asgard,
                PubKey::new(pk).unwrap(),
                vec![Chain::BNB],
                vec![],
            );
            v.add_funds(&Coins::new(vec![Coin::new(Chain::BNB.gas_asset(), amount)]));
            if frozen {
                v.freeze(Chain::BNB);
            }
            v
        };
        let frozen = asgard("frozenpk", 8 * ONE, true);
        let other = asgard("otherpk", 5 * ONE, false);
        ctx.keeper.set_vault(&frozen).unwrap();
        ctx.keeper.set_vault(&other).unwrap();
        ctx.keeper
            .save_network_fee(&crate::types::NetworkFee::new(Chain::BNB, 1, 37_500))
            .unwrap();

        let in_hash = TxId::from_bytes(b"inbound");
        let item = TxOutItem::new(
            Chain::BNB,
            Address::new_unchecked("bnbdestination"),
            Coin::new(bnb, ONE),
            in_hash.clone(),
        )
        .with_memo(format!("OUT:{in_hash}"))
        .with_vault(vault.pub_key.clone());
        let mut voter = ctx.keeper.get_observed_tx_in_voter(&in_hash).unwrap();
        voter.finalised_height = 700;
        voter.actions.push(item.clone());
        ctx.keeper.set_observed_tx_in_voter(&voter).unwrap();
        ctx.keeper.append_tx_out(700, item).unwrap();

        mgr.slasher.lack_signing(&mut ctx, &mgr).unwrap();

        let new = ctx.keeper.get_tx_out(1_000).unwrap().tx_array;
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].vault_pub_key, other.pub_key);
        let voter = ctx.keeper.get_observed_tx_in_voter(&in_hash).unwrap();
        assert_eq!(voter.actions[0].vault_pub_key, other.pub_key);
    }

    #[test]
    fn test_zero_signing_period_leaves_outbounds_alone() {
        let Fixture {
            mut ctx,
            mgr,
            mut vault,
            nodes,
        } = fixture(&[ONE]);
        let bnb = Chain::BNB.gas_asset();
        vault.add_funds(&Coins::new(vec![Coin::new(bnb.clone(), 10 * ONE)]));
        ctx.keeper.set_vault(&vault).unwrap();
        ctx.keeper.set_mimir("SigningTransactionPeriod", 0).unwrap();

        let in_hash = TxId::from_bytes(b"inbound");
        let item = TxOutItem::new(
            Chain::BNB,
            Address::new_unchecked("bnbdestination"),
            Coin::new(bnb, ONE),
            in_hash.clone(),
        )
        .with_memo(format!("OUT:{in_hash}"))
        .with_vault(vault.pub_key.clone());
        let mut voter = ctx.keeper.get_observed_tx_in_voter(&in_hash).unwrap();
        voter.finalised_height = 1_000;
        voter.actions.push(item.clone());
        ctx.keeper.set_observed_tx_in_voter(&voter).unwrap();
        ctx.keeper.append_tx_out(1_000, item.clone()).unwrap();

        mgr.slasher.lack_signing(&mut ctx, &mgr).unwrap();
        mgr.slasher.lack_observing(&mut ctx).unwrap();

        assert_eq!(ctx.keeper.get_tx_out(1_000).unwrap().tx_array, vec![item]);
        assert_eq!(
            ctx.keeper
                .get_node_account_slash_points(&nodes[0].node_address)
                .unwrap(),
            0
        );
    }
}
