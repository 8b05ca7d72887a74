use {
    super::{GasManager, Managers},
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        events::{Event, GasPool},
        keeper::{ASGARD_NAME, RESERVE_NAME},
    },
    log::*,
    thornode_common::{
        math::{get_safe_share, get_uncapped_share, round_to_decimal, safe_sub},
        Asset, Chain, Coin, Coins, Uint, MAX_BASIS_POINTS,
    },
    thornode_constants::ConstantName,
};

/// Basis points applied to the base network fee. The surplus of fees
/// withheld over gas spent walks the multiplier from `max` down to `min`
/// as it approaches `target`.
pub fn calc_outbound_fee_multiplier(
    target_surplus: Uint,
    gas_spent: Uint,
    gas_withheld: Uint,
    max: Uint,
    min: Uint,
) -> Uint {
    if target_surplus == 0 {
        error!("target gas surplus is zero");
        return max;
    }
    if min > max {
        error!("min multiplier {} greater than max multiplier {}", min, max);
        return 30_000;
    }
    let surplus = safe_sub(gas_withheld, gas_spent);
    let reduced = get_safe_share(surplus, target_surplus, safe_sub(max, min));
    safe_sub(max, reduced)
}

#[derive(Debug, Default)]
pub struct DefaultGasManager;

impl DefaultGasManager {
    fn rune_in_asset(ctx: &Context, fee: Uint, asset: &Asset) -> Result<Uint> {
        let pool = ctx.keeper.get_pool(&asset.layer1_asset())?;
        if pool.balance_asset == 0 || pool.balance_rune == 0 {
            return Ok(fee);
        }
        Ok(pool.rune_value_in_asset(fee))
    }
}

impl GasManager for DefaultGasManager {
    fn begin_block(&self, ctx: &mut Context) -> Result<()> {
        ctx.keeper.clear_block_gas();
        Ok(())
    }

    fn add_gas_asset(&self, ctx: &mut Context, gas: &Coins, increase_count: bool) -> Result<()> {
        let mut pools = ctx.keeper.get_block_gas()?;
        for coin in gas.iter().filter(|c| !c.is_empty()) {
            let entry = match pools.iter().position(|p| p.asset == coin.asset) {
                Some(idx) => &mut pools[idx],
                None => {
                    pools.push(GasPool {
                        asset: coin.asset.clone(),
                        rune_amount: 0,
                        asset_amount: 0,
                        count: 0,
                    });
                    pools.last_mut().ok_or_else(|| {
                        RuntimeError::internal("add gas asset", "gas pool vanished")
                    })?
                }
            };
            entry.asset_amount = entry.asset_amount.saturating_add(coin.amount);
            if increase_count {
                entry.count += 1;
            }
        }
        ctx.keeper.set_block_gas(&pools)
    }

    fn get_fee(&self, ctx: &Context, chain: Chain, asset: &Asset) -> Result<Uint> {
        let transaction_fee = ctx.config_uint(ConstantName::OutboundTransactionFee)?;
        if asset.is_rune() && chain.is_thor() {
            return Ok(transaction_fee);
        }
        if asset.is_synthetic() || asset.is_derived() {
            return Self::rune_in_asset(ctx, transaction_fee, asset);
        }
        let network_fee = match ctx.keeper.get_network_fee(chain)? {
            Some(fee) if fee.valid() => fee,
            _ => {
                warn!("no valid network fee for {}", chain);
                return Ok(transaction_fee);
            }
        };
        let gas_pool = ctx.keeper.get_pool(&chain.gas_asset())?;
        let network = ctx.keeper.get_network()?;
        let multiplier = calc_outbound_fee_multiplier(
            ctx.config_uint(ConstantName::TargetOutboundFeeSurplusRune)?,
            network.outbound_gas_spent_rune,
            network.outbound_gas_withheld_rune,
            ctx.config_uint(ConstantName::MaxOutboundFeeMultiplierBasisPoints)?,
            ctx.config_uint(ConstantName::MinOutboundFeeMultiplierBasisPoints)?,
        );
        let base = network_fee.transaction_size as Uint * network_fee.transaction_fee_rate as Uint;
        let fee = round_to_decimal(
            get_uncapped_share(base, MAX_BASIS_POINTS, multiplier),
            gas_pool.decimals,
        );
        if *asset == chain.gas_asset() {
            return Ok(fee);
        }
        if gas_pool.balance_asset == 0 || gas_pool.balance_rune == 0 {
            return Ok(transaction_fee);
        }
        let fee_in_rune = gas_pool.asset_value_in_rune(fee);
        if asset.is_rune() {
            return Ok(fee_in_rune);
        }
        let pool = ctx.keeper.get_pool(asset)?;
        if pool.balance_asset == 0 || pool.balance_rune == 0 {
            return Ok(transaction_fee);
        }
        Ok(pool.rune_value_in_asset(fee_in_rune))
    }

    fn get_max_gas(&self, ctx: &Context, chain: Chain) -> Result<Coin> {
        let network_fee = ctx
            .keeper
            .get_network_fee(chain)?
            .ok_or_else(|| RuntimeError::internal("get max gas", format!("no network fee for {chain}")))?;
        let base = network_fee.transaction_size as Uint * network_fee.transaction_fee_rate as Uint;
        let amount = if chain.is_bnb() { base } else { base * 3 / 2 };
        let decimals = chain.gas_asset_decimals();
        Ok(Coin::new(chain.gas_asset(), round_to_decimal(amount, decimals)).with_decimals(decimals))
    }

    fn get_gas_rate(&self, ctx: &Context, chain: Chain) -> Result<i64> {
        let transaction_fee = ctx.config_i64(ConstantName::OutboundTransactionFee)?;
        if chain.is_thor() {
            return Ok(transaction_fee);
        }
        match ctx.keeper.get_network_fee(chain)? {
            Some(fee) if fee.valid() => Ok(round_to_decimal(
                fee.transaction_fee_rate as Uint * 3 / 2,
                chain.gas_asset_decimals(),
            ) as i64),
            _ => Ok(transaction_fee),
        }
    }

    fn end_block(&self, ctx: &mut Context, mgr: &Managers) -> Result<()> {
        if ctx.keeper.ragnarok_in_progress()? {
            ctx.keeper.clear_block_gas();
            return Ok(());
        }
        let mut network = ctx.keeper.get_network()?;
        let mut reimbursed = Vec::new();
        for mut gas in ctx.keeper.get_block_gas()? {
            let mut pool = ctx.keeper.get_pool(&gas.asset)?;
            if pool.is_empty() {
                warn!("no pool to reimburse gas of {}", gas.asset);
                continue;
            }
            let mut rune_gas = pool.asset_value_in_rune(gas.asset_amount);
            if rune_gas == 0 {
                continue;
            }
            if rune_gas < ctx.keeper.get_rune_balance_of_module(RESERVE_NAME)? {
                let coins = Coins::new(vec![Coin::new(Asset::rune(), rune_gas)]);
                ctx.keeper
                    .send_from_module_to_module(RESERVE_NAME, ASGARD_NAME, &coins)?;
                pool.balance_rune = pool.balance_rune.saturating_add(rune_gas);
                network.outbound_gas_spent_rune = network.outbound_gas_spent_rune.saturating_add(rune_gas);
                ctx.keeper.add_outbound_fee_spent_rune(&gas.asset, rune_gas)?;
            } else {
                warn!("reserve cannot cover {} rune of gas for {}", rune_gas, gas.asset);
                rune_gas = 0;
            }
            pool.balance_asset = safe_sub(pool.balance_asset, gas.asset_amount);
            ctx.keeper.set_pool(&pool)?;
            gas.rune_amount = rune_gas;
            reimbursed.push(gas);
        }
        ctx.keeper.set_network(&network)?;
        ctx.keeper.clear_block_gas();
        if !reimbursed.is_empty() {
            mgr.events.emit(ctx, Event::Gas { pools: reimbursed });
        }
        Ok(())
    }
}
