//! Outbound scheduling: vault selection, fee withholding and delay.

use {
    super::{Managers, TxOutStore},
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        events::Event,
        keeper::{ASGARD_NAME, BOND_NAME, RESERVE_NAME, THORCHAIN_NAME},
        types::{node_by_pub_key, NodeAccount, TxOutItem, Vault, VaultStatus},
    },
    log::*,
    thornode_common::{
        math::{mul_div, round_to_decimal, safe_sub},
        Address, Asset, Coin, Coins, Fee, Tx, TxId, Uint, MAX_BASIS_POINTS,
    },
    thornode_constants::ConstantName,
    thornode_memo::{parse_memo, Memo, TxType},
};

/// Rune value of everything `vault` holds at current pool depths.
fn vault_value_in_rune(ctx: &Context, vault: &Vault) -> Result<Uint> {
    let mut total: Uint = 0;
    for coin in vault.coins.iter() {
        let value = if coin.asset.is_rune() {
            coin.amount
        } else {
            ctx.keeper
                .get_pool(&coin.asset.layer1_asset())?
                .asset_value_in_rune(coin.amount)
        };
        total = total.saturating_add(value);
    }
    Ok(total)
}

/// Order vaults most secure first: the lowest value held relative to the
/// bond of the members that control them.
pub(crate) fn sort_by_security(ctx: &Context, vaults: Vec<Vault>) -> Result<Vec<Vault>> {
    let nodes = ctx.keeper.list_node_accounts()?;
    let mut scored = Vec::with_capacity(vaults.len());
    for vault in vaults {
        let bond: Uint = vault
            .membership
            .iter()
            .filter_map(|pk| node_by_pub_key(&nodes, pk))
            .map(|n| n.bond)
            .sum();
        let score = if bond == 0 {
            Uint::MAX
        } else {
            mul_div(vault_value_in_rune(ctx, &vault)?, MAX_BASIS_POINTS, bond)
        };
        scored.push((score, vault));
    }
    scored.sort_by_key(|(score, _)| *score);
    Ok(scored.into_iter().map(|(_, v)| v).collect())
}

fn memo_type(ctx: &Context, memo: &str) -> TxType {
    parse_memo(ctx.version(), &ctx.keeper, memo)
        .map(|m| m.tx_type())
        .unwrap_or_default()
}

#[derive(Debug, Default)]
pub struct DefaultTxOutStore;

impl DefaultTxOutStore {
    /// Unsigned outbounds of `asset` scheduled from the current block on.
    fn pending_outbounds(ctx: &Context, asset: &Asset) -> Result<Vec<TxOutItem>> {
        let delay_max = ctx.config_i64(ConstantName::TxOutDelayMax)?;
        let max_offset = ctx.config_i64(ConstantName::MaxTxOutOffset)?;
        let start = ctx.block_height().max(1);
        let mut outbounds = Vec::new();
        for height in start..=ctx.block_height() + delay_max {
            let block = ctx.keeper.get_tx_out(height)?;
            if height > ctx.block_height() + max_offset && block.is_empty() {
                break;
            }
            outbounds.extend(
                block
                    .tx_array
                    .into_iter()
                    .filter(|item| item.coin.asset == *asset && !item.is_signed()),
            );
        }
        Ok(outbounds)
    }

    fn deduct_pending(vault: &mut Vault, pending: &[TxOutItem]) {
        let pub_key = vault.pub_key.clone();
        for item in pending.iter().filter(|i| i.vault_pub_key == pub_key) {
            let mut owed = Coins::new(vec![item.coin.clone()]);
            if let Some(gas) = item.max_gas.get_coin(&item.chain.gas_asset()) {
                owed.add(gas);
            }
            vault.sub_funds(&owed);
        }
    }

    /// Yggdrasil vaults able to sign for `in_hash`: their node is active,
    /// not jailed, holds gas and observed the inbound.
    fn collect_yggdrasils(ctx: &Context, in_hash: &TxId, gas_asset: &Asset, active: &[NodeAccount]) -> Result<Vec<Vault>> {
        let mut voter = ctx.keeper.get_observed_tx_in_voter(in_hash)?;
        let tx = voter.get_tx(active);
        let mut yggs = Vec::new();
        for vault in ctx.keeper.get_yggdrasils()? {
            if vault.balance_of(gas_asset) == 0 {
                continue;
            }
            let Some(node) = node_by_pub_key(active, &vault.pub_key) else {
                continue;
            };
            if !tx.has_signed(&node.node_address) {
                continue;
            }
            if ctx
                .keeper
                .get_node_account_jail(&node.node_address)?
                .is_jailed(ctx.block_height())
            {
                continue;
            }
            yggs.push(vault);
        }
        Ok(yggs)
    }

    /// Spread `item` over `vaults` in order. Returns the planned outputs and
    /// the amount left uncovered.
    fn discover_outbounds(fee_asset: Uint, max_gas: &Coin, item: &TxOutItem, vaults: &[Vault]) -> (Vec<TxOutItem>, Uint) {
        let mut outputs = Vec::new();
        let mut remaining = item.coin.amount;
        for vault in vaults {
            if remaining == 0 {
                break;
            }
            if vault.is_frozen(item.chain) {
                continue;
            }
            if vault.pub_key.address(item.chain).equals(&item.to_address) {
                continue;
            }
            let available = vault.balance_of(&item.coin.asset);
            if available <= fee_asset {
                continue;
            }
            let gas = vault.balance_of(&item.chain.gas_asset());
            if gas == 0 || gas < max_gas.amount {
                continue;
            }
            let mut output = item.clone();
            output.vault_pub_key = vault.pub_key.clone();
            output.coin.amount = remaining.min(available);
            remaining -= output.coin.amount;
            outputs.push(output);
        }
        (outputs, remaining)
    }

    fn select_vaults(&self, ctx: &Context, mgr: &Managers, item: &TxOutItem) -> Result<Vec<TxOutItem>> {
        let fee_asset = mgr.gas.get_fee(ctx, item.chain, &item.coin.asset)?;
        let max_gas = mgr.gas.get_max_gas(ctx, item.chain)?;
        let pending = Self::pending_outbounds(ctx, &item.coin.asset)?;
        let active_nodes = ctx.keeper.list_active_validators()?;

        let mut yggs = if active_nodes.is_empty() {
            Vec::new()
        } else {
            Self::collect_yggdrasils(ctx, &item.in_hash, &item.chain.gas_asset(), &active_nodes)?
        };
        yggs.iter_mut().for_each(|v| Self::deduct_pending(v, &pending));
        yggs.sort_by(|a, b| b.balance_of(&item.coin.asset).cmp(&a.balance_of(&item.coin.asset)));

        let mut active = ctx.keeper.get_asgard_vaults_by_status(VaultStatus::Active)?;
        active.iter_mut().for_each(|v| Self::deduct_pending(v, &pending));
        let asgards = sort_by_security(ctx, active)?;

        let mut retiring = ctx.keeper.get_asgard_vaults_by_status(VaultStatus::Retiring)?;
        retiring.iter_mut().for_each(|v| Self::deduct_pending(v, &pending));
        let retiring = sort_by_security(ctx, retiring)?;

        let ygg_first: Vec<Vault> = yggs.iter().chain(asgards.iter()).cloned().collect();
        let asgard_first: Vec<Vault> = asgards.iter().chain(yggs.iter()).cloned().collect();
        let (mut outputs, mut remaining) = Self::discover_outbounds(fee_asset, &max_gas, item, &ygg_first);
        let (outputs_b, remaining_b) = Self::discover_outbounds(fee_asset, &max_gas, item, &asgard_first);
        if outputs.len() > outputs_b.len() && remaining >= remaining_b {
            outputs = outputs_b;
            remaining = remaining_b;
        }
        if !retiring.is_empty() {
            let (outputs_c, remaining_c) = Self::discover_outbounds(fee_asset, &max_gas, item, &retiring);
            if (outputs.is_empty() || outputs.len() > outputs_c.len()) && remaining >= remaining_c {
                outputs = outputs_c;
                remaining = remaining_c;
            }
        }
        if remaining > 0 {
            return Err(RuntimeError::FailAddOutboundTx(format!(
                "insufficient funds for outbound request: {} {} remaining",
                item.to_address, remaining
            )));
        }
        Ok(outputs)
    }

    fn prepare_tx_out_item(&self, ctx: &mut Context, mgr: &Managers, mut item: TxOutItem) -> Result<Vec<TxOutItem>> {
        if item.in_hash.is_empty() {
            item.in_hash = TxId::blank();
        }
        if item.memo.is_empty() {
            item.memo = Memo::Outbound {
                tx_id: item.in_hash.clone(),
            }
            .to_string();
        }
        if item.to_address.is_empty() {
            return Err(RuntimeError::FailAddOutboundTx(
                "empty to address, can't send out".to_string(),
            ));
        }
        if !item.to_address.is_chain(item.chain) {
            return Err(RuntimeError::FailAddOutboundTx(format!(
                "to address({}), is not of chain({})",
                item.to_address, item.chain
            )));
        }
        let decimals = ctx.keeper.get_pool(&item.coin.asset.layer1_asset())?.decimals;

        let outputs = if item.chain.is_thor() || !item.vault_pub_key.is_empty() {
            vec![item.clone()]
        } else {
            self.select_vaults(ctx, mgr, &item)?
        };

        let fee_rune = mgr.gas.get_fee(ctx, item.chain, &Asset::rune())?;
        let fee_asset = mgr.gas.get_fee(ctx, item.chain, &item.coin.asset)?;
        let mut pool = ctx.keeper.get_pool(&item.coin.asset.layer1_asset())?;
        let mut pool_touched = false;
        let mut final_rune_fee: Uint = 0;
        let mut fee_events = Vec::new();
        let mut final_outputs = Vec::new();

        for mut output in outputs {
            if output.max_gas.is_empty() && !output.chain.is_thor() {
                output.max_gas = Coins::new(vec![mgr.gas.get_max_gas(ctx, output.chain)?]);
                output.gas_rate = mgr.gas.get_gas_rate(ctx, output.chain)?;
            }
            let tx_type = memo_type(ctx, &output.memo);
            let fee_exempt = matches!(
                tx_type,
                TxType::YggdrasilFund | TxType::YggdrasilReturn | TxType::Migrate | TxType::Ragnarok
            );
            if !fee_exempt {
                if output.coin.asset.is_rune() {
                    let rune_fee = fee_rune.min(output.coin.amount);
                    final_rune_fee += rune_fee;
                    output.coin.amount -= rune_fee;
                    fee_events.push(Event::Fee {
                        tx_id: output.in_hash.clone(),
                        fee: Fee {
                            coins: Coins::new(vec![Coin::new(output.coin.asset.clone(), rune_fee)]),
                            pool_deduct: 0,
                        },
                    });
                } else if pool.get_pool_units() > 0 {
                    let asset_fee = fee_asset.min(output.coin.amount);
                    output.coin.amount -= asset_fee;
                    if output.coin.asset.is_synthetic()
                        && (output.module_name.is_empty() || output.module_name == ASGARD_NAME)
                    {
                        let fee_coin = Coin::new(output.coin.asset.clone(), asset_fee);
                        ctx.keeper
                            .send_from_module_to_module(ASGARD_NAME, THORCHAIN_NAME, &Coins::new(vec![fee_coin.clone()]))
                            .and_then(|_| ctx.keeper.burn_from_module(THORCHAIN_NAME, &fee_coin, "outbound fee"))
                            .unwrap_or_else(|err| error!("fail to burn synth fee: {}", err));
                    }
                    let pool_deduct = pool.asset_value_in_rune(asset_fee).min(pool.balance_rune);
                    final_rune_fee += pool_deduct;
                    if !output.coin.asset.is_synthetic() {
                        pool.balance_asset = pool.balance_asset.saturating_add(asset_fee);
                    }
                    pool.balance_rune -= pool_deduct;
                    pool_touched = true;
                    fee_events.push(Event::Fee {
                        tx_id: output.in_hash.clone(),
                        fee: Fee {
                            coins: Coins::new(vec![Coin::new(output.coin.asset.clone(), asset_fee)]),
                            pool_deduct,
                        },
                    });
                }
            }
            if tx_type == TxType::Ragnarok && output.coin.asset.is_gas_asset() {
                let gas = output.max_gas.amount_of(&output.coin.asset);
                output.coin.amount = safe_sub(output.coin.amount, gas);
            }
            if output.coin.is_empty() && tx_type != TxType::YggdrasilReturn {
                info!("tx out item has zero coin: {}", output);
                continue;
            }
            if !output.coin.asset.is_synthetic() {
                output.coin.amount = round_to_decimal(output.coin.amount, decimals);
            }
            if !output.in_hash.is_blank() {
                let mut voter = ctx.keeper.get_observed_tx_in_voter(&output.in_hash)?;
                voter.finalised_height = ctx.block_height();
                voter.actions.push(output.clone());
                ctx.keeper.set_observed_tx_in_voter(&voter)?;
            }
            final_outputs.push(output);
        }

        if pool_touched {
            ctx.keeper.set_pool(&pool)?;
        }
        for event in fee_events {
            mgr.events.emit(ctx, event);
        }
        if final_rune_fee > 0 {
            let source = if item.module_name == BOND_NAME {
                BOND_NAME
            } else {
                ASGARD_NAME
            };
            let coins = Coins::new(vec![Coin::new(Asset::rune(), final_rune_fee)]);
            if let Err(err) = ctx.keeper.send_from_module_to_module(source, RESERVE_NAME, &coins) {
                error!("fail to add outbound fee to reserve: {}", err);
            }
            if !item.chain.is_thor() {
                let mut network = ctx.keeper.get_network()?;
                network.outbound_gas_withheld_rune = network.outbound_gas_withheld_rune.saturating_add(final_rune_fee);
                ctx.keeper.set_network(&network)?;
                ctx.keeper
                    .add_outbound_fee_withheld_rune(&item.chain.gas_asset(), final_rune_fee)?;
            }
        }
        Ok(final_outputs)
    }

    /// Rune value of everything scheduled at `height`.
    fn tx_out_value(ctx: &Context, height: i64) -> Result<Uint> {
        let mut total: Uint = 0;
        for item in ctx.keeper.get_tx_out(height)?.tx_array {
            let value = if item.coin.asset.is_rune() {
                item.coin.amount
            } else {
                ctx.keeper
                    .get_pool(&item.coin.asset.layer1_asset())?
                    .asset_value_in_rune(item.coin.amount)
            };
            total = total.saturating_add(value);
        }
        Ok(total)
    }

    fn add_to_block_out(&self, ctx: &mut Context, mgr: &Managers, item: TxOutItem, height: i64) -> Result<()> {
        if item.chain.is_thor() {
            return self.native_tx_out(ctx, mgr, item);
        }
        mgr.events
            .emit(ctx, Event::ScheduledOutbound { item: item.clone() });
        debug!("scheduled outbound at {}: {}", height, item);
        ctx.keeper.append_tx_out(height, item)
    }

    /// Settle a native outbound in place.
    fn native_tx_out(&self, ctx: &mut Context, mgr: &Managers, mut item: TxOutItem) -> Result<()> {
        if item.module_name.is_empty() {
            item.module_name = ASGARD_NAME.to_string();
        }
        let coins = Coins::new(vec![item.coin.clone()]);
        if item.module_name == THORCHAIN_NAME {
            ctx.keeper
                .mint_to_module(THORCHAIN_NAME, &item.coin, "native outbound")?;
        }
        if item.to_address.as_str() == RESERVE_NAME {
            ctx.keeper
                .send_from_module_to_module(&item.module_name, RESERVE_NAME, &coins)?;
        } else {
            let to = item.to_address.acc_address()?;
            ctx.keeper
                .send_from_module_to_account(&item.module_name, &to, &coins)?;
        }
        let fee = ctx.config_uint(ConstantName::OutboundTransactionFee)?;
        let tx = Tx::new(
            TxId::blank(),
            Address::new_unchecked(item.module_name.clone()),
            item.to_address.clone(),
            coins,
            Coins::new(vec![Coin::new(Asset::rune(), fee)]),
            item.memo.clone(),
        );
        if !item.in_hash.is_blank() {
            let mut voter = ctx.keeper.get_observed_tx_in_voter(&item.in_hash)?;
            if voter.add_out_tx(&tx) && voter.is_done() {
                voter.set_done();
            }
            ctx.keeper.set_observed_tx_in_voter(&voter)?;
        }
        mgr.events.emit(
            ctx,
            Event::Outbound {
                in_tx_id: item.in_hash.clone(),
                tx,
            },
        );
        Ok(())
    }

    /// Re-queue the unsettled actions of inbounds whose outbounds were
    /// dropped after exhausting their signing attempts. Only inbounds the
    /// slasher marked are visited. The voter gets a fresh signing window
    /// starting at the re-queue height.
    fn recover_dangling_actions(&self, ctx: &mut Context, mgr: &Managers) -> Result<()> {
        let max_attempts = ctx.config_i64(ConstantName::MaxOutboundAttempts)?;
        if max_attempts <= 0 {
            return Ok(());
        }
        let marked = ctx.keeper.get_dangling_actions()?;
        if marked.is_empty() {
            return Ok(());
        }
        let period = ctx.config_i64(ConstantName::SigningTransactionPeriod)?;
        let window = max_attempts.saturating_mul(period);
        let height = ctx.block_height();
        let asgards = sort_by_security(
            ctx,
            ctx.keeper.get_asgard_vaults_by_status(VaultStatus::Active)?,
        )?;
        for tx_id in marked {
            let mut voter = ctx.keeper.get_observed_tx_in_voter(&tx_id)?;
            if voter.reverted || voter.finalised_height == 0 || voter.is_done() {
                ctx.keeper.remove_dangling_actions(&tx_id);
                continue;
            }
            if height - voter.finalised_height < window {
                continue;
            }

            let out_txs = voter.out_txs.clone();
            let mut requeue = Vec::new();
            for action in voter.actions.iter_mut() {
                if action.chain.is_thor()
                    || out_txs
                        .iter()
                        .any(|out| action.paid_by(out) && action.to_address.equals(&out.to_address))
                {
                    continue;
                }
                let Some(vault) = asgards
                    .iter()
                    .find(|v| !v.is_frozen(action.chain) && v.balance_of(&action.coin.asset) >= action.coin.amount)
                else {
                    warn!("no vault can take dangling action {}", action);
                    continue;
                };
                action.vault_pub_key = vault.pub_key.clone();
                match mgr.gas.get_max_gas(ctx, action.chain) {
                    Ok(max_gas) => action.max_gas = Coins::new(vec![max_gas]),
                    Err(err) => {
                        error!("fail to get max gas for {}: {}", action.chain, err);
                        continue;
                    }
                }
                action.gas_rate = mgr.gas.get_gas_rate(ctx, action.chain)?;
                requeue.push(action.clone());
            }

            voter.finalised_height = height;
            voter.outbound_height = height;
            ctx.keeper.set_observed_tx_in_voter(&voter)?;
            ctx.keeper.remove_dangling_actions(&tx_id);
            for action in requeue {
                info!("re-queue dangling action {}", action);
                self.unsafe_add_tx_out_item(ctx, mgr, action, height)?;
            }
        }
        Ok(())
    }
}

impl TxOutStore for DefaultTxOutStore {
    fn try_add_tx_out_item(&self, ctx: &mut Context, mgr: &Managers, item: TxOutItem, min_out: Uint) -> Result<bool> {
        let outputs = self.prepare_tx_out_item(ctx, mgr, item.clone())?;
        if outputs.is_empty() {
            return Err(RuntimeError::NotEnoughToPayFee);
        }
        let sum_out: Uint = outputs.iter().map(|o| o.coin.amount).sum();
        if sum_out < min_out {
            return Err(RuntimeError::FailAddOutboundTx(format!(
                "outbound amount does not meet requirements ({sum_out}/{min_out})"
            )));
        }

        let mut outbound_height = ctx.block_height();
        if !item.chain.is_thor() && !item.in_hash.is_empty() && !item.in_hash.is_blank() {
            let mut sample = item.clone();
            sample.memo = outputs[0].memo.clone();
            let target = self.calc_tx_out_height(ctx, &sample)?;
            outbound_height = outbound_height.max(target);
            let mut voter = ctx.keeper.get_observed_tx_in_voter(&item.in_hash)?;
            if voter.outbound_height > 0 {
                outbound_height = voter.outbound_height;
            } else {
                voter.outbound_height = outbound_height;
                ctx.keeper.set_observed_tx_in_voter(&voter)?;
            }
        }
        for output in outputs {
            self.add_to_block_out(ctx, mgr, output, outbound_height)?;
        }
        Ok(true)
    }

    fn unsafe_add_tx_out_item(&self, ctx: &mut Context, mgr: &Managers, item: TxOutItem, height: i64) -> Result<()> {
        self.add_to_block_out(ctx, mgr, item, height)
    }

    fn get_outbound_items(&self, ctx: &Context) -> Result<Vec<TxOutItem>> {
        Ok(ctx.keeper.get_tx_out(ctx.block_height())?.tx_array)
    }

    fn calc_tx_out_height(&self, ctx: &Context, item: &TxOutItem) -> Result<i64> {
        let height = ctx.block_height();
        if !matches!(memo_type(ctx, &item.memo), TxType::Refund | TxType::Outbound) {
            return Ok(height);
        }
        let min_volume = ctx.config_uint(ConstantName::MinTxOutVolumeThreshold)?;
        let mut delay_rate = ctx.config_i64(ConstantName::TxOutDelayRate)?;
        let delay_max = ctx.config_i64(ConstantName::TxOutDelayMax)?;
        let max_offset = ctx.config_i64(ConstantName::MaxTxOutOffset)?;
        if min_volume == 0 || delay_rate <= 0 {
            return Ok(height);
        }

        let rune_value = if item.coin.asset.is_rune() {
            item.coin.amount
        } else {
            ctx.keeper
                .get_pool(&item.coin.asset.layer1_asset())?
                .asset_value_in_rune(item.coin.amount)
        };
        let mut sum_value = rune_value;
        for h in height + 1..=height + delay_max {
            let value = Self::tx_out_value(ctx, h)?;
            if h > height + max_offset && value == 0 {
                break;
            }
            sum_value = sum_value.saturating_add(value);
        }
        // scheduled volume slows every further outbound
        delay_rate -= (sum_value / min_volume).min(i64::MAX as Uint) as i64;
        let delay_rate = delay_rate.max(1) as Uint;
        let min_blocks = ((rune_value / delay_rate).min(max_offset.max(0) as Uint)) as i64;

        let mut target = height + min_blocks;
        let mut count = 0;
        while count < delay_max {
            let value = Self::tx_out_value(ctx, target)?;
            if value == 0 || value.saturating_add(rune_value) <= min_volume {
                break;
            }
            target += 1;
            count += 1;
        }
        Ok(target)
    }

    fn end_block(&self, ctx: &mut Context, mgr: &Managers) -> Result<()> {
        let mut tx_out = ctx.keeper.get_tx_out(ctx.block_height())?;
        let mut updated = false;
        for i in 0..tx_out.tx_array.len() {
            let chain = tx_out.tx_array[i].chain;
            if chain.is_thor() {
                continue;
            }
            let max_gas = match mgr.gas.get_max_gas(ctx, chain) {
                Ok(coin) => coin,
                Err(err) => {
                    warn!("fail to refresh max gas of {}: {}", chain, err);
                    continue;
                }
            };
            let gas_rate = mgr.gas.get_gas_rate(ctx, chain)?;
            let item = &mut tx_out.tx_array[i];
            let current = item.max_gas.iter().next().map(|c| c.amount).unwrap_or_default();
            if item.max_gas.is_empty() || max_gas.amount > current {
                let previous = item.clone();
                item.max_gas = Coins::new(vec![max_gas]);
                if !item.in_hash.is_blank() {
                    let mut voter = ctx.keeper.get_observed_tx_in_voter(&item.in_hash)?;
                    for action in voter.actions.iter_mut().filter(|a| a.equals(&previous)) {
                        action.max_gas = item.max_gas.clone();
                    }
                    ctx.keeper.set_observed_tx_in_voter(&voter)?;
                }
            }
            item.gas_rate = gas_rate;
            updated = true;
        }
        if updated {
            ctx.keeper.set_tx_out(&tx_out)?;
        }
        self.recover_dangling_actions(ctx, mgr)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            keeper::Keeper,
            test_utils::scheduled_outbounds,
            types::{NetworkFee, NodeStatus, ObservedTxVoter, Pool, PoolStatus, VaultType},
        },
        assert_matches::assert_matches,
        semver::Version,
        thornode_common::{AccAddress, Chain, PubKey, PubKeySet, ONE},
    };

    fn eth() -> Asset {
        Chain::ETH.gas_asset()
    }

    fn vault(name: &str, amount: Uint) -> Vault {
        let mut vault = Vault::new(
            1,
            VaultStatus::Active,
            VaultType::Asgard,
            PubKey::new(name).unwrap(),
            vec![Chain::ETH],
            vec![],
        );
        vault.add_funds(&Coins::new(vec![Coin::new(eth(), amount)]));
        vault
    }

    fn setup() -> (Context, Managers) {
        let mut ctx = Context::new(Keeper::default(), 10, Version::new(1, 111, 0));
        let mut pool = Pool::new(eth());
        pool.balance_rune = 1_000 * ONE;
        pool.balance_asset = 100 * ONE;
        pool.lp_units = 1_000;
        pool.status = PoolStatus::Available;
        ctx.keeper.set_pool(&pool).unwrap();
        ctx.keeper
            .save_network_fee(&NetworkFee::new(Chain::ETH, 80_000, 30))
            .unwrap();
        ctx.keeper
            .mint_to_module(ASGARD_NAME, &Coin::new(Asset::rune(), 1_000 * ONE), "test")
            .unwrap();
        (ctx, Managers::default())
    }

    fn item(amount: Uint) -> TxOutItem {
        TxOutItem::new(
            Chain::ETH,
            Address::new_unchecked("0xdestination"),
            Coin::new(eth(), amount),
            TxId::from_bytes(b"inbound"),
        )
    }

    #[test]
    fn test_outbound_deducts_fee_and_picks_vault() {
        let (mut ctx, mgr) = setup();
        ctx.keeper.set_vault(&vault("vaultA", 10 * ONE)).unwrap();
        assert!(mgr
            .tx_out_store
            .try_add_tx_out_item(&mut ctx, &mgr, item(ONE), 0)
            .unwrap());
        let items = ctx.keeper.get_tx_out(10).unwrap().tx_array;
        assert_eq!(items.len(), 1);
        // 80_000 * 30 * 3 = 7_200_000 withheld as fee
        assert_eq!(items[0].coin.amount, ONE - 7_200_000);
        assert_eq!(items[0].vault_pub_key, PubKey::new("vaultA").unwrap());
        assert_eq!(items[0].memo, format!("OUT:{}", TxId::from_bytes(b"inbound")));
        assert_eq!(items[0].max_gas.amount_of(&eth()), 3_600_000);

        let voter = ctx
            .keeper
            .get_observed_tx_in_voter(&TxId::from_bytes(b"inbound"))
            .unwrap();
        assert_eq!(voter.actions, items);
        assert_eq!(voter.outbound_height, 10);
        assert_eq!(
            ctx.keeper.get_rune_balance_of_module(RESERVE_NAME).unwrap(),
            72_000_000
        );
        assert_eq!(ctx.keeper.get_network().unwrap().outbound_gas_withheld_rune, 72_000_000);
    }

    #[test]
    fn test_frozen_vault_is_skipped() {
        let (mut ctx, mgr) = setup();
        let mut frozen = vault("vaultA", 10 * ONE);
        frozen.freeze(Chain::ETH);
        ctx.keeper.set_vault(&frozen).unwrap();
        ctx.keeper.set_vault(&vault("vaultB", 10 * ONE)).unwrap();
        mgr.tx_out_store
            .try_add_tx_out_item(&mut ctx, &mgr, item(ONE), 0)
            .unwrap();
        let items = ctx.keeper.get_tx_out(10).unwrap().tx_array;
        assert_eq!(items[0].vault_pub_key, PubKey::new("vaultB").unwrap());
    }

    #[test]
    fn test_outbound_split_across_vaults() {
        let (mut ctx, mgr) = setup();
        ctx.keeper.set_vault(&vault("vaultA", 2 * ONE)).unwrap();
        ctx.keeper.set_vault(&vault("vaultB", 2 * ONE)).unwrap();
        mgr.tx_out_store
            .try_add_tx_out_item(&mut ctx, &mgr, item(3 * ONE), 0)
            .unwrap();
        let items = scheduled_outbounds(&ctx, &TxId::from_bytes(b"inbound"));
        assert_eq!(items.len(), 2);
        // both halves share the delay computed for the whole outbound
        assert_eq!(items[0].0, items[1].0);
        assert_ne!(items[0].1.vault_pub_key, items[1].1.vault_pub_key);

        assert_matches!(
            mgr.tx_out_store.try_add_tx_out_item(&mut ctx, &mgr, item(100 * ONE), 0),
            Err(RuntimeError::FailAddOutboundTx(_))
        );
    }

    #[test]
    fn test_min_out_and_address_checks() {
        let (mut ctx, mgr) = setup();
        ctx.keeper.set_vault(&vault("vaultA", 10 * ONE)).unwrap();
        assert_matches!(
            mgr.tx_out_store.try_add_tx_out_item(&mut ctx, &mgr, item(ONE), ONE),
            Err(RuntimeError::FailAddOutboundTx(_))
        );
        let mut wrong_chain = item(ONE);
        wrong_chain.to_address = Address::new_unchecked("bnbdest");
        assert!(mgr
            .tx_out_store
            .try_add_tx_out_item(&mut ctx, &mgr, wrong_chain, 0)
            .is_err());
        assert_matches!(
            mgr.tx_out_store.try_add_tx_out_item(&mut ctx, &mgr, item(1_000), 0),
            Err(RuntimeError::NotEnoughToPayFee)
        );
    }

    #[test]
    fn test_native_outbound_settles_immediately() {
        let (mut ctx, mgr) = setup();
        let to = AccAddress::new("thorreceiver").unwrap();
        let item = TxOutItem::new(
            Chain::THOR,
            Address::from(to.clone()),
            Coin::new(Asset::rune(), 10 * ONE),
            TxId::from_bytes(b"inbound"),
        );
        mgr.tx_out_store
            .try_add_tx_out_item(&mut ctx, &mgr, item, 0)
            .unwrap();
        assert_eq!(
            ctx.keeper.get_balance(&to).unwrap().amount_of(&Asset::rune()),
            10 * ONE - 2_000_000
        );
        assert!(ctx.keeper.get_tx_out(10).unwrap().is_empty());
        let voter = ctx
            .keeper
            .get_observed_tx_in_voter(&TxId::from_bytes(b"inbound"))
            .unwrap();
        assert!(voter.is_done());
    }

    #[test]
    fn test_large_outbounds_are_delayed() {
        let (mut ctx, mgr) = setup();
        let out_memo = format!("OUT:{}", TxId::from_bytes(b"inbound"));
        let mut big = item(50 * ONE);
        big.memo = out_memo.clone();
        // 500 rune of value at 25 rune per block
        let height = mgr.tx_out_store.calc_tx_out_height(&ctx, &big).unwrap();
        assert_eq!(height, 10 + 20);
        big.memo = "MIGRATE:5".to_string();
        assert_eq!(mgr.tx_out_store.calc_tx_out_height(&ctx, &big).unwrap(), 10);
        ctx.keeper.set_mimir("TxOutDelayRate", 0).unwrap();
        big.memo = out_memo;
        assert_eq!(mgr.tx_out_store.calc_tx_out_height(&ctx, &big).unwrap(), 10);
    }

    #[test]
    fn test_dangling_action_requeued_with_fresh_window() {
        let (mut ctx, mgr) = setup();
        ctx.keeper.set_mimir("MaxOutboundAttempts", 1).unwrap();
        let mut retiring = Vault::new(
            1,
            VaultStatus::Retiring,
            VaultType::Asgard,
            PubKey::new("vaultA").unwrap(),
            vec![Chain::ETH],
            vec![],
        );
        retiring.add_funds(&Coins::new(vec![Coin::new(eth(), 10 * ONE)]));
        ctx.keeper.set_vault(&retiring).unwrap();
        ctx.keeper.set_vault(&vault("vaultB", 10 * ONE)).unwrap();

        let in_hash = TxId::from_bytes(b"inbound");
        let mut action = item(ONE);
        action.vault_pub_key = PubKey::new("vaultA").unwrap();
        let mut voter = ObservedTxVoter::new(in_hash.clone(), vec![]);
        voter.finalised_height = 10;
        voter.outbound_height = 10;
        voter.actions = vec![action];
        ctx.keeper.set_observed_tx_in_voter(&voter).unwrap();
        ctx.keeper.set_dangling_actions(&in_hash).unwrap();

        // still inside the signing window of the last attempt
        ctx.set_block_height(200);
        DefaultTxOutStore.recover_dangling_actions(&mut ctx, &mgr).unwrap();
        assert_eq!(ctx.keeper.get_dangling_actions().unwrap(), vec![in_hash.clone()]);
        assert!(ctx.keeper.get_tx_out(200).unwrap().is_empty());

        ctx.set_block_height(310);
        DefaultTxOutStore.recover_dangling_actions(&mut ctx, &mgr).unwrap();
        let voter = ctx.keeper.get_observed_tx_in_voter(&in_hash).unwrap();
        assert_eq!(voter.finalised_height, 310);
        assert_eq!(voter.outbound_height, 310);
        assert_eq!(voter.actions.len(), 1);
        assert_eq!(voter.actions[0].vault_pub_key, PubKey::new("vaultB").unwrap());
        assert_eq!(voter.actions[0].max_gas.amount_of(&eth()), 3_600_000);

        let queued = ctx.keeper.get_tx_out(310).unwrap().tx_array;
        assert_eq!(queued, voter.actions);
        assert!(ctx.keeper.get_dangling_actions().unwrap().is_empty());
    }

    #[test]
    fn test_settled_dangling_marker_is_dropped() {
        let (mut ctx, mgr) = setup();
        ctx.keeper.set_mimir("MaxOutboundAttempts", 1).unwrap();
        let in_hash = TxId::from_bytes(b"inbound");
        let mut voter = ObservedTxVoter::new(in_hash.clone(), vec![]);
        voter.finalised_height = 10;
        ctx.keeper.set_observed_tx_in_voter(&voter).unwrap();
        ctx.keeper.set_dangling_actions(&in_hash).unwrap();

        ctx.set_block_height(20);
        DefaultTxOutStore.recover_dangling_actions(&mut ctx, &mgr).unwrap();
        assert!(ctx.keeper.get_dangling_actions().unwrap().is_empty());
        assert!(ctx.keeper.get_tx_out(20).unwrap().is_empty());
    }

    #[test]
    fn test_most_secure_vault_first() {
        let (mut ctx, _) = setup();
        let mut nodes = Vec::new();
        for (i, bond) in [(1, 100 * ONE), (2, 1_000 * ONE)] {
            let pk = PubKey::new(&format!("nodepk{i}")).unwrap();
            let node = NodeAccount::new(
                AccAddress::new(&format!("thornode{i}")).unwrap(),
                NodeStatus::Active,
                PubKeySet::new(pk.clone(), pk.clone()),
                String::new(),
                bond,
                Address::default(),
                1,
            );
            ctx.keeper.set_node_account(&node).unwrap();
            nodes.push(pk);
        }
        let mut weak = vault("vaultA", 10 * ONE);
        weak.membership = vec![nodes[0].clone()];
        let mut strong = vault("vaultB", 10 * ONE);
        strong.membership = vec![nodes[1].clone()];
        let sorted = sort_by_security(&ctx, vec![weak, strong]).unwrap();
        assert_eq!(sorted[0].pub_key, PubKey::new("vaultB").unwrap());
    }
}
