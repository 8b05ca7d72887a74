use {
    super::{sort_by_security, Managers, NetworkManager},
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        events::{Event, PoolMod},
        handlers::internal_handler,
        keeper::{ASGARD_NAME, RESERVE_NAME},
        msgs::{Msg, MsgWithdrawLiquidity},
        types::{Keygen, KeygenType, NodeAccount, PoolStatus, TxOutItem, Vault, VaultStatus},
    },
    log::*,
    thornode_common::{
        math::{get_safe_share, round_to_decimal, safe_sub},
        Address, Asset, Chain, Coin, Coins, Tx, TxId, Uint, MAX_BASIS_POINTS,
    },
    thornode_constants::ConstantName,
    thornode_memo::Memo,
};

/// Ragnarok iterations during which gas pools are left alone so the other
/// pools can still pay for their outbounds.
const GAS_POOL_RAGNAROK_DELAY: i64 = 10;

/// Hard ceiling on providers withdrawn per ragnarok iteration.
const MAX_RAGNAROK_WITHDRAWS_PER_BLOCK: i64 = 20;

/// Memo on the synthetic inbound that drives a ragnarok withdrawal.
const RAGNAROK_MEMO: &str = "ragnarok";

/// Synthetic inbound the ragnarok withdrawal of `addr` is booked against.
fn ragnarok_tx(chain: Chain, addr: &Address) -> Tx {
    let gas = Coins::new(vec![Coin::new(chain.gas_asset(), 1)]);
    Tx {
        id: TxId::blank(),
        chain,
        from_address: addr.clone(),
        to_address: addr.clone(),
        coins: gas.clone(),
        gas,
        memo: RAGNAROK_MEMO.to_string(),
    }
}

#[derive(Debug, Default)]
pub struct DefaultNetworkManager;

impl DefaultNetworkManager {
    /// Copy known router contracts onto active vaults that have none.
    fn fill_routers(ctx: &mut Context, active: &mut [Vault]) -> Result<()> {
        let contracts = ctx.keeper.get_chain_contracts()?;
        for vault in active.iter_mut().filter(|v| v.routers.is_empty()) {
            vault.routers = contracts
                .iter()
                .filter(|c| vault.chains.contains(&c.chain))
                .cloned()
                .collect();
            if vault.routers.is_empty() {
                continue;
            }
            if let Err(err) = ctx.keeper.set_vault(vault) {
                error!("fail to update chain contract: {}", err);
            }
        }
        Ok(())
    }

    /// Where a retiring vault sends `coin`. Gas assets go to an active vault
    /// that holds none yet, everything else to the most secure vault.
    fn migration_target(ctx: &Context, active: &[Vault], coin: &Coin) -> Result<Option<Vault>> {
        if coin.asset.is_gas_asset() {
            if let Some(vault) = active.iter().find(|v| !v.has_asset(&coin.asset)) {
                return Ok(Some(vault.clone()));
            }
        }
        Ok(sort_by_security(ctx, active.to_vec())?.into_iter().next())
    }

    /// Move one round of funds out of a retiring vault. Each round sends a
    /// larger share of what is left, the last one sends everything.
    fn migrate_funds(ctx: &mut Context, mgr: &Managers, mut vault: Vault, active: &[Vault]) -> Result<()> {
        let height = ctx.block_height();
        let interval = ctx.config_i64(ConstantName::FundMigrationInterval)?.max(1);
        let rounds = ctx.config_i64(ConstantName::ChurnMigrateRounds)?.max(1);
        let nth = (height - vault.status_since) / interval + 1;

        for coin in vault.coins.clone().iter() {
            if coin.is_native() || coin.amount == 0 {
                continue;
            }
            // erc20 rune is burned by the router once it arrives
            if coin.asset.is_rune() && coin.asset.get_chain() == Chain::ETH {
                continue;
            }
            let Some(target) = Self::migration_target(ctx, active, coin)? else {
                continue;
            };
            if target.pub_key == vault.pub_key {
                continue;
            }
            let chain = coin.asset.get_chain();

            let mut amount = coin.amount;
            if nth < rounds {
                amount = amount * nth as Uint / rounds as Uint;
            }
            amount = round_to_decimal(amount, coin.decimals);

            if coin.asset == chain.gas_asset() {
                let gas = mgr.gas.get_max_gas(ctx, chain)?;
                if safe_sub(coin.amount, amount) <= gas.amount {
                    amount = coin.amount;
                }
                amount = safe_sub(amount, gas.amount * vault.coin_length_by_chain(chain) as Uint);
                if amount == 0 && nth > rounds {
                    info!("burning {} left in {}, not enough to pay for gas", coin, vault.pub_key);
                    Self::burn_dust(ctx, mgr, &mut vault, coin)?;
                    continue;
                }
            }

            let item = TxOutItem::new(
                chain,
                target.pub_key.address(chain),
                Coin::new(coin.asset.clone(), amount),
                TxId::blank(),
            )
            .with_vault(vault.pub_key.clone())
            .with_memo(Memo::Migrate { block_height: height }.to_string());
            let queued = match mgr.tx_out_store.try_add_tx_out_item(ctx, mgr, item, 0) {
                Ok(queued) => queued,
                Err(RuntimeError::NotEnoughToPayFee) => false,
                Err(err) => return Err(err),
            };
            if queued {
                vault.append_pending_tx_block_height(height);
                ctx.keeper.set_vault(&vault)?;
            }
        }
        Ok(())
    }

    /// Write off gas asset dust a vault can no longer send, compensating the
    /// pool from the reserve.
    fn burn_dust(ctx: &mut Context, mgr: &Managers, vault: &mut Vault, coin: &Coin) -> Result<()> {
        vault.sub_funds(&Coins::new(vec![coin.clone()]));
        let mut pool = ctx.keeper.get_pool(&coin.asset)?;
        let rune_amount = pool.asset_value_in_rune(coin.amount);
        if rune_amount > 0 {
            ctx.keeper.send_from_module_to_module(
                RESERVE_NAME,
                ASGARD_NAME,
                &Coins::new(vec![Coin::new(Asset::rune(), rune_amount)]),
            )?;
        }
        pool.balance_rune = pool.balance_rune.saturating_add(rune_amount);
        pool.balance_asset = safe_sub(pool.balance_asset, coin.amount);
        ctx.keeper.set_pool(&pool)?;
        ctx.keeper.set_vault(vault)?;
        mgr.events.emit(
            ctx,
            Event::Errata {
                tx_id: TxId::blank(),
                pools: vec![PoolMod {
                    asset: pool.asset.clone(),
                    rune_amount,
                    rune_add: true,
                    asset_amount: coin.amount,
                    asset_add: false,
                }],
            },
        );
        Ok(())
    }

    /// Withdraw up to one batch of liquidity providers, resuming from the
    /// stored position. Returns how many withdrawals were attempted.
    fn withdraw_liquidity(ctx: &mut Context, mgr: &Managers, signer: &NodeAccount, nth: i64) -> Result<i64> {
        let max_per_block = ctx
            .config_i64(ConstantName::RagnarokProcessNumOfLPPerIteration)?
            .min(MAX_RAGNAROK_WITHDRAWS_PER_BLOCK);
        let mut position = ctx.keeper.get_ragnarok_withdraw_position()?;
        let mut resuming = position.pool.is_some();
        let mut count = 0;

        'pools: for pool in ctx.keeper.get_pools()?.into_iter().rev() {
            if resuming {
                if position.pool.as_ref() != Some(&pool.asset) {
                    continue;
                }
                resuming = false;
            } else {
                position.number = 0;
            }
            if pool.asset.is_gas_asset() && nth <= GAS_POOL_RAGNAROK_DELAY {
                continue;
            }
            position.pool = Some(pool.asset.clone());
            let providers = ctx.keeper.liquidity_providers(&pool.asset)?;
            let start = position.number as usize;
            for lp in providers.into_iter().skip(start) {
                position.number += 1;
                if lp.units == 0 {
                    continue;
                }
                let (address, withdrawal_asset) = if !lp.rune_address.is_empty() {
                    let asset = lp.asset_address.is_empty().then(Asset::rune);
                    (lp.rune_address.clone(), asset)
                } else {
                    (lp.asset_address.clone(), Some(pool.asset.clone()))
                };
                let external = withdrawal_asset.as_ref().map_or(true, |a| !a.is_rune());
                let msg = MsgWithdrawLiquidity {
                    tx: ragnarok_tx(pool.asset.get_chain(), &address),
                    withdraw_address: address,
                    basis_points: MAX_BASIS_POINTS,
                    asset: pool.asset.clone(),
                    withdrawal_asset,
                    signer: signer.node_address.clone(),
                };
                match internal_handler(ctx, mgr, Msg::WithdrawLiquidity(msg)) {
                    Ok(()) if external => {
                        let pending = ctx.keeper.get_ragnarok_pending()?;
                        ctx.keeper.set_ragnarok_pending(pending + 1)?;
                    }
                    Ok(()) => {}
                    Err(err) => error!(
                        "fail to ragnarok liquidity provider {} in {}: {}",
                        lp.key_address(),
                        pool.asset,
                        err
                    ),
                }
                count += 1;
                if count >= max_per_block {
                    break 'pools;
                }
            }
        }

        if count < max_per_block {
            position = Default::default();
        }
        ctx.keeper.set_ragnarok_withdraw_position(&position)?;
        Ok(count)
    }

    /// Pay reserve contributors back from what is left in the reserve, pro
    /// rata when it cannot cover them all.
    fn refund_reserve_contributors(ctx: &mut Context, mgr: &Managers) -> Result<()> {
        let contributors = ctx.keeper.get_reserve_contributors()?;
        if contributors.is_empty() {
            return Ok(());
        }
        let reserve = ctx.keeper.get_rune_balance_of_module(RESERVE_NAME)?;
        let total: Uint = contributors.iter().map(|c| c.amount).sum();
        for contributor in contributors {
            let amount = if total > reserve {
                get_safe_share(contributor.amount, total, reserve)
            } else {
                contributor.amount
            };
            if amount == 0 {
                continue;
            }
            let mut item = TxOutItem::new(
                Chain::THOR,
                contributor.address.clone(),
                Coin::new(Asset::rune(), amount),
                TxId::blank(),
            )
            .with_memo(
                Memo::Ragnarok {
                    block_height: ctx.block_height(),
                }
                .to_string(),
            );
            item.module_name = RESERVE_NAME.to_string();
            if let Err(err) = mgr.tx_out_store.try_add_tx_out_item(ctx, mgr, item, 0) {
                error!("fail to refund reserve contributor {}: {}", contributor.address, err);
            }
        }
        ctx.keeper.clear_reserve_contributors();
        Ok(())
    }
}

impl NetworkManager for DefaultNetworkManager {
    fn trigger_keygen(&self, ctx: &mut Context, nodes: &[NodeAccount]) -> Result<()> {
        if let Some(halt) = ctx.mimir("HaltChurning")? {
            if halt > 0 && halt <= ctx.block_height() {
                info!("churn skipped, churning halted by mimir");
                return Ok(());
            }
        }
        let members = nodes.iter().map(|n| n.pub_key_set.secp256k1.clone()).collect();
        let keygen = Keygen::new(ctx.block_height(), members, KeygenType::Asgard);
        let mut block = ctx.keeper.get_keygen_block(ctx.block_height())?;
        if !block.contains(&keygen) {
            block.keygens.push(keygen.clone());
        }

        let active = ctx.keeper.get_asgard_vaults_by_status(VaultStatus::Active)?;
        if active.iter().any(|v| v.membership_equals(&keygen.members)) {
            info!("skip keygen, an active vault already has the same members");
            return Ok(());
        }
        ctx.keeper.set_keygen_block(&block)?;

        for mut vault in ctx.keeper.get_asgard_vaults_by_status(VaultStatus::Init)? {
            if vault.has_funds() {
                continue;
            }
            vault.update_status(VaultStatus::Inactive, ctx.block_height());
            if let Err(err) = ctx.keeper.set_vault(&vault) {
                error!("fail to save vault: {}", err);
            }
        }
        Ok(())
    }

    fn rotate_vault(&self, ctx: &mut Context, mut vault: Vault) -> Result<()> {
        let height = ctx.block_height();
        for mut asgard in ctx.keeper.get_asgard_vaults_by_status(VaultStatus::Active)? {
            if !asgard.membership.iter().any(|pk| vault.contains(pk)) {
                continue;
            }
            asgard.update_status(VaultStatus::Retiring, height);
            ctx.keeper.set_vault(&asgard)?;
            ctx.emit(Event::InactiveVault {
                pub_key: asgard.pub_key.clone(),
            });
        }

        for member in vault.membership.iter() {
            let mut node = ctx.keeper.get_node_account_by_pub_key(member)?.ok_or_else(|| {
                RuntimeError::internal("rotate vault", format!("no node account for member {member}"))
            })?;
            node.try_add_signer_pub_key(vault.pub_key.clone());
            ctx.keeper.set_node_account(&node)?;
        }

        vault.update_status(VaultStatus::Active, height);
        ctx.keeper.set_vault(&vault)?;
        ctx.keeper.set_last_churn_height(height)?;
        info!("vault {} is now active", vault.pub_key);
        ctx.emit(Event::ActiveVault {
            pub_key: vault.pub_key,
        });
        Ok(())
    }

    fn ragnarok(&self, ctx: &mut Context, mgr: &Managers) -> Result<()> {
        let nth = ctx.keeper.get_ragnarok_nth()?;
        let signer = ctx
            .keeper
            .list_active_validators()?
            .into_iter()
            .next()
            .ok_or_else(|| RuntimeError::internal("ragnarok", "can't find any active nodes"))?;

        for mut pool in ctx.keeper.get_pools()? {
            if pool.status == PoolStatus::Staged {
                continue;
            }
            pool.status = PoolStatus::Staged;
            pool.status_since = ctx.block_height();
            ctx.keeper.set_pool(&pool)?;
            mgr.events.emit(
                ctx,
                Event::Pool {
                    pool: pool.asset,
                    status: PoolStatus::Staged,
                },
            );
        }

        let count = Self::withdraw_liquidity(ctx, mgr, &signer, nth)?;
        debug!("ragnarok iteration {} withdrew {} liquidity providers", nth, count);

        if nth <= GAS_POOL_RAGNAROK_DELAY || !ctx.keeper.get_ragnarok_withdraw_position()?.is_empty() {
            return Ok(());
        }
        for pool in ctx.keeper.get_pools()? {
            if ctx
                .keeper
                .liquidity_providers(&pool.asset)?
                .iter()
                .any(|lp| lp.units > 0)
            {
                return Ok(());
            }
        }
        Self::refund_reserve_contributors(ctx, mgr)
    }

    fn end_block(&self, ctx: &mut Context, mgr: &Managers) -> Result<()> {
        let mut active = ctx.keeper.get_asgard_vaults_by_status(VaultStatus::Active)?;
        if active.is_empty() {
            return Ok(());
        }
        Self::fill_routers(ctx, &mut active)?;

        let retiring = ctx.keeper.get_asgard_vaults_by_status(VaultStatus::Retiring)?;
        let period = ctx.config_i64(ConstantName::SigningTransactionPeriod)?;
        if retiring
            .iter()
            .any(|v| v.len_pending_tx_block_heights(ctx.block_height(), period) > 0)
        {
            info!("skipping fund migration while transactions are still pending");
            return Ok(());
        }

        let interval = ctx.config_i64(ConstantName::FundMigrationInterval)?.max(1);
        for mut vault in retiring {
            if !vault.has_funds() {
                vault.update_status(VaultStatus::Inactive, ctx.block_height());
                ctx.keeper.set_vault(&vault)?;
                continue;
            }
            if (ctx.block_height() - vault.status_since) % interval == 0 {
                Self::migrate_funds(ctx, mgr, vault, &active)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            keeper::Keeper,
            types::{NetworkFee, ReserveContributor, VaultType},
        },
        assert_matches::assert_matches,
        semver::Version,
        thornode_common::{AccAddress, PubKey, PubKeySet, ONE},
    };

    fn node(i: usize) -> NodeAccount {
        let pk = PubKey::new(&format!("nodepk{i}")).unwrap();
        NodeAccount::new(
            AccAddress::new(&format!("thornode{i}")).unwrap(),
            crate::types::NodeStatus::Active,
            PubKeySet::new(pk.clone(), pk),
            format!("thorvalcons{i}"),
            100 * ONE,
            Address::new_unchecked(format!("thorbond{i}")),
            1,
        )
    }

    fn vault(pk: &str, status: VaultStatus, height: i64, members: &[NodeAccount]) -> Vault {
        let mut vault = Vault::new(
            height,
            status,
            VaultType::Asgard,
            PubKey::new(pk).unwrap(),
            vec![Chain::BNB],
            vec![],
        );
        vault.membership = members.iter().map(|n| n.pub_key_set.secp256k1.clone()).collect();
        vault
    }

    fn setup(height: i64) -> (Context, Managers, Vec<NodeAccount>) {
        let mut ctx = Context::new(Keeper::default(), height, Version::new(1, 111, 0));
        let nodes: Vec<NodeAccount> = (0..5).map(node).collect();
        for n in nodes.iter() {
            ctx.keeper.set_node_account(n).unwrap();
        }
        (ctx, Managers::default(), nodes)
    }

    #[test]
    fn test_trigger_keygen() {
        let (mut ctx, mgr, nodes) = setup(50);
        ctx.keeper
            .set_vault(&vault("asgardpk", VaultStatus::Active, 1, &nodes[..4]))
            .unwrap();
        ctx.keeper
            .set_vault(&vault("initpk", VaultStatus::Init, 40, &nodes[1..]))
            .unwrap();

        // same members as the live vault
        mgr.network.trigger_keygen(&mut ctx, &nodes[..4]).unwrap();
        assert!(ctx.keeper.get_keygen_block(50).unwrap().is_empty());

        mgr.network.trigger_keygen(&mut ctx, &nodes[1..]).unwrap();
        let block = ctx.keeper.get_keygen_block(50).unwrap();
        assert_eq!(block.keygens.len(), 1);
        assert_eq!(block.keygens[0].members.len(), 4);
        let init = ctx.keeper.get_vault(&PubKey::new("initpk").unwrap()).unwrap();
        assert_eq!(init.status, VaultStatus::Inactive);

        ctx.set_block_height(51);
        ctx.keeper.set_mimir("HaltChurning", 51).unwrap();
        mgr.network.trigger_keygen(&mut ctx, &nodes[1..]).unwrap();
        assert!(ctx.keeper.get_keygen_block(51).unwrap().is_empty());
    }

    #[test]
    fn test_rotate_vault() {
        let (mut ctx, mgr, nodes) = setup(60);
        let old = vault("asgardpk", VaultStatus::Active, 1, &nodes[..4]);
        let unrelated = vault("otherpk", VaultStatus::Active, 1, &[]);
        ctx.keeper.set_vault(&old).unwrap();
        ctx.keeper.set_vault(&unrelated).unwrap();
        let new = vault("newasgardpk", VaultStatus::Init, 60, &nodes[1..]);

        mgr.network.rotate_vault(&mut ctx, new.clone()).unwrap();

        assert_eq!(ctx.keeper.get_vault(&old.pub_key).unwrap().status, VaultStatus::Retiring);
        assert_eq!(ctx.keeper.get_vault(&unrelated.pub_key).unwrap().status, VaultStatus::Active);
        assert_eq!(ctx.keeper.get_vault(&new.pub_key).unwrap().status, VaultStatus::Active);
        let joined = ctx.keeper.get_node_account(&nodes[4].node_address).unwrap().unwrap();
        assert!(joined.signer_membership.contains(&new.pub_key));
        assert_eq!(ctx.keeper.get_last_churn_height().unwrap(), 60);
        let events = ctx.keeper.store().events();
        assert!(events.iter().any(|e| matches!(e, Event::InactiveVault { pub_key } if *pub_key == old.pub_key)));
        assert!(events.iter().any(|e| matches!(e, Event::ActiveVault { pub_key } if *pub_key == new.pub_key)));
    }

    #[test]
    fn test_rotate_vault_unknown_member() {
        let (mut ctx, mgr, _) = setup(60);
        let mut stranger = vault("newasgardpk", VaultStatus::Init, 60, &[]);
        stranger.membership.push(PubKey::new("nobody").unwrap());
        assert_matches!(
            mgr.network.rotate_vault(&mut ctx, stranger),
            Err(RuntimeError::Internal { .. })
        );
    }

    #[test]
    fn test_migrate_funds_in_rounds() {
        let (mut ctx, mgr, nodes) = setup(361);
        ctx.keeper.set_mimir("FundMigrationInterval", 180).unwrap();
        let bnb = Chain::BNB.gas_asset();
        ctx.keeper
            .save_network_fee(&NetworkFee::new(Chain::BNB, 1, 37_500))
            .unwrap();
        let mut retiring = vault("asgardpk", VaultStatus::Retiring, 1, &nodes[..4]);
        retiring.add_funds(&Coins::new(vec![Coin::new(bnb.clone(), 10 * ONE)]));
        ctx.keeper.set_vault(&retiring).unwrap();
        let empty = vault("emptypk", VaultStatus::Retiring, 1, &nodes[..4]);
        ctx.keeper.set_vault(&empty).unwrap();
        let active = vault("newasgardpk", VaultStatus::Active, 300, &nodes[1..]);
        ctx.keeper.set_vault(&active).unwrap();

        mgr.network.end_block(&mut ctx, &mgr).unwrap();

        let items = ctx.keeper.get_tx_out(361).unwrap().tx_array;
        assert_eq!(items.len(), 1);
        // third round moves 3/5, less the gas for the one coin on the chain
        assert_eq!(items[0].coin, Coin::new(bnb, 6 * ONE - 37_500));
        assert_eq!(items[0].to_address, active.pub_key.address(Chain::BNB));
        assert_eq!(items[0].vault_pub_key, retiring.pub_key);
        assert_eq!(items[0].memo, "MIGRATE:361");
        let retiring = ctx.keeper.get_vault(&retiring.pub_key).unwrap();
        assert_eq!(retiring.pending_tx_block_heights, vec![361]);
        assert_eq!(ctx.keeper.get_vault(&empty.pub_key).unwrap().status, VaultStatus::Inactive);

        // nothing more moves while the round is unsigned
        ctx.set_block_height(541);
        mgr.network.end_block(&mut ctx, &mgr).unwrap();
        assert!(ctx.keeper.get_tx_out(541).unwrap().tx_array.is_empty());
    }

    #[test]
    fn test_ragnarok_refunds_reserve_contributors() {
        let (mut ctx, mgr, _) = setup(500);
        ctx.keeper
            .mint_to_module(RESERVE_NAME, &Coin::new(Asset::rune(), 30 * ONE), "test")
            .unwrap();
        let alice = Address::new_unchecked("thoralice");
        let bob = Address::new_unchecked("thorbob1");
        for (address, amount) in [(&alice, 40 * ONE), (&bob, 20 * ONE)] {
            ctx.keeper
                .add_reserve_contributor(&ReserveContributor {
                    address: address.clone(),
                    amount,
                })
                .unwrap();
        }
        ctx.keeper.set_ragnarok_block_height(400).unwrap();

        ctx.keeper.set_ragnarok_nth(5).unwrap();
        mgr.network.ragnarok(&mut ctx, &mgr).unwrap();
        assert_eq!(ctx.keeper.get_reserve_contributors().unwrap().len(), 2);

        ctx.keeper.set_ragnarok_nth(11).unwrap();
        mgr.network.ragnarok(&mut ctx, &mgr).unwrap();
        let balance = |ctx: &Context, addr: &Address| {
            ctx.keeper
                .get_balance(&addr.acc_address().unwrap())
                .unwrap()
                .amount_of(&Asset::rune())
        };
        assert_eq!(balance(&ctx, &alice), 20 * ONE);
        assert_eq!(balance(&ctx, &bob), 10 * ONE);
        assert!(ctx.keeper.get_reserve_contributors().unwrap().is_empty());
    }
}
