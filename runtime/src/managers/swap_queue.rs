//! Continuous liquidity pool swaps and the per-block queue that runs them.

use {
    super::{Managers, SwapQueue},
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        handlers::{internal_handler, refund_tx},
        msgs::{Msg, MsgSwap},
        types::ObservedTx,
    },
    log::*,
    thornode_common::{
        math::{big, narrow, round_to_decimal, safe_sub},
        Asset, Coin, Tx, Uint, MAX_BASIS_POINTS,
    },
    thornode_constants::ConstantName,
    thornode_memo::OrderType,
};

/// Emission of `x` into a pool of depth `X` paying out of depth `Y`:
/// `x * X * Y / (x + X)^2`.
#[allow(non_snake_case)]
pub fn calc_asset_emission(X: Uint, x: Uint, Y: Uint) -> Uint {
    let denom = (big(x) + big(X)).pow(2);
    if denom == big(0) {
        return 0;
    }
    narrow(&(big(x) * big(X) * big(Y) / denom))
}

/// Liquidity fee kept by the pool, in the output asset:
/// `x^2 * Y / (x + X)^2`.
#[allow(non_snake_case)]
pub fn calc_liquidity_fee(X: Uint, x: Uint, Y: Uint) -> Uint {
    let denom = (big(x) + big(X)).pow(2);
    if denom == big(0) {
        return 0;
    }
    narrow(&(big(x) * big(x) * big(Y) / denom))
}

/// Slip in basis points: `x * 10000 / (x + X)`.
#[allow(non_snake_case)]
pub fn calc_swap_slip(X: Uint, x: Uint) -> Uint {
    let denom = big(x) + big(X);
    if denom == big(0) {
        return 0;
    }
    narrow(&(big(x) * big(MAX_BASIS_POINTS) / denom))
}

/// Outcome of a single pool swap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwapResult {
    /// Layer one pool the swap went through.
    pub pool: Asset,
    pub emit_asset: Coin,
    pub liquidity_fee: Uint,
    pub liquidity_fee_in_rune: Uint,
    pub swap_slip: Uint,
    /// Synthetic coins redeemed by the swap, to be burnt by the caller.
    pub burn: Option<Coin>,
}

/// Pool depths `(X, Y)` for a swap of `source` through `pool`.
fn depths(pool: &crate::types::Pool, source: &Asset) -> (Uint, Uint) {
    if source.is_rune() {
        (pool.balance_rune, pool.balance_asset)
    } else {
        (pool.balance_asset, pool.balance_rune)
    }
}

/// Swap the first coin of `tx` into `target` through a single pool and
/// write the new pool depths. One side of the swap must be rune.
pub fn swap_one(ctx: &mut Context, tx: &Tx, target: &Asset, transaction_fee: Uint) -> Result<SwapResult> {
    let coin = tx
        .coins
        .iter()
        .next()
        .ok_or_else(|| RuntimeError::InvalidMessage("swap carries no coin".to_string()))?;
    let source = &coin.asset;
    let x = coin.amount;

    let asset = if source.is_rune() {
        if x <= transaction_fee {
            return Err(RuntimeError::NotEnoughToPayFee);
        }
        target.clone()
    } else {
        source.clone()
    };
    let layer1 = asset.layer1_asset();
    info!("swapping {} from {} into {}", coin, tx.from_address, target);

    if !ctx.keeper.pool_exists(&layer1) {
        return Err(RuntimeError::UnknownRequest(format!("pool {} doesn't exist", layer1)));
    }
    let mut pool = ctx.keeper.get_pool(&layer1)?;
    if !source.is_synthetic() && !pool.is_available() {
        return Err(RuntimeError::InvalidPoolStatus(format!("pool({}) is not available", layer1)));
    }

    #[allow(non_snake_case)]
    let (X, Y) = depths(&pool, source);
    if x == 0 {
        return Err(RuntimeError::UnknownRequest("amount is invalid".to_string()));
    }
    if X == 0 || Y == 0 {
        return Err(RuntimeError::UnknownRequest("pool balance is invalid".to_string()));
    }

    let liquidity_fee = calc_liquidity_fee(X, x, Y);
    let swap_slip = calc_swap_slip(X, x);
    let emit = round_to_decimal(calc_asset_emission(X, x, Y), pool.decimals);
    if emit >= Y {
        return Err(RuntimeError::UnknownRequest("pool does not have enough balance".to_string()));
    }
    let liquidity_fee_in_rune = if source.is_rune() {
        pool.asset_value_in_rune(liquidity_fee)
    } else {
        liquidity_fee
    };

    debug!(
        "pre swap {}: rune {} asset {} units {}",
        pool.asset, pool.balance_rune, pool.balance_asset, pool.lp_units
    );
    let mut burn = None;
    if source.is_synthetic() {
        pool.balance_rune = safe_sub(pool.balance_rune, emit);
        burn = Some(coin.clone());
    } else if target.is_synthetic() {
        pool.balance_rune = pool.balance_rune.saturating_add(x);
    } else if source.is_rune() {
        pool.balance_rune = X.saturating_add(x);
        pool.balance_asset = safe_sub(Y, emit);
    } else {
        pool.balance_asset = X.saturating_add(x);
        pool.balance_rune = safe_sub(Y, emit);
    }
    debug!(
        "post swap {}: rune {} asset {} emit {}",
        pool.asset, pool.balance_rune, pool.balance_asset, emit
    );
    ctx.keeper.set_pool(&pool)?;

    Ok(SwapResult {
        pool: layer1,
        emit_asset: Coin::new(target.clone(), emit),
        liquidity_fee,
        liquidity_fee_in_rune,
        swap_slip,
        burn,
    })
}

/// Emission of `coin` into `target` at current depths, routed through rune
/// when neither side is rune. `None` when a pool on the route cannot trade.
pub fn quote(ctx: &Context, coin: &Coin, target: &Asset) -> Result<Option<Uint>> {
    let mut amount = coin.amount;
    let mut source = coin.asset.clone();
    if !source.is_rune() && !target.is_rune() {
        match quote_one(ctx, &source, amount, &Asset::rune())? {
            Some(out) => amount = out,
            None => return Ok(None),
        }
        source = Asset::rune();
    }
    quote_one(ctx, &source, amount, target)
}

fn quote_one(ctx: &Context, source: &Asset, amount: Uint, target: &Asset) -> Result<Option<Uint>> {
    let asset = if source.is_rune() { target } else { source };
    let layer1 = asset.layer1_asset();
    if !ctx.keeper.pool_exists(&layer1) {
        return Ok(None);
    }
    let pool = ctx.keeper.get_pool(&layer1)?;
    if !pool.is_available() {
        return Ok(None);
    }
    #[allow(non_snake_case)]
    let (X, Y) = depths(&pool, source);
    if X == 0 || Y == 0 {
        return Ok(None);
    }
    Ok(Some(calc_asset_emission(X, amount, Y)))
}

#[derive(Clone, Debug)]
struct SwapItem {
    index: usize,
    msg: MsgSwap,
    fee: Uint,
    slip: Uint,
}

/// Order swaps by the sum of their rank by liquidity fee and their rank by
/// slip, both descending. Ties are broken by inbound hash.
fn sort_items(items: Vec<SwapItem>) -> Vec<SwapItem> {
    let mut by_fee: Vec<usize> = (0..items.len()).collect();
    by_fee.sort_by(|a, b| items[*b].fee.cmp(&items[*a].fee));
    let mut by_slip: Vec<usize> = (0..items.len()).collect();
    by_slip.sort_by(|a, b| items[*b].slip.cmp(&items[*a].slip));

    let mut scores = vec![0usize; items.len()];
    for (rank, i) in by_fee.into_iter().enumerate() {
        scores[i] += rank;
    }
    for (rank, i) in by_slip.into_iter().enumerate() {
        scores[i] += rank;
    }
    let mut scored: Vec<(usize, SwapItem)> = scores.into_iter().zip(items).collect();
    scored.sort_by(|(sa, a), (sb, b)| {
        sa.cmp(sb)
            .then_with(|| a.msg.tx.id.as_str().cmp(b.msg.tx.id.as_str()))
            .then_with(|| a.index.cmp(&b.index))
    });
    scored.into_iter().map(|(_, item)| item).collect()
}

/// Half the queue per block, all of it when it is shorter than `min`,
/// never more than `max`.
fn todo_num(queue_len: i64, min: i64, max: i64) -> i64 {
    let mut todo = queue_len / 2;
    if min >= queue_len {
        todo = queue_len;
    }
    if max < todo {
        todo = max;
    }
    todo
}

#[derive(Debug, Default)]
pub struct DefaultSwapQueue;

impl DefaultSwapQueue {
    fn score(ctx: &Context, items: &mut [SwapItem]) -> Result<()> {
        for item in items.iter_mut() {
            let Some(coin) = item.msg.tx.coins.iter().next().cloned() else {
                continue;
            };
            let target = item.msg.target_asset.clone();
            let mut hops = vec![(coin.clone(), target.clone())];
            if !coin.asset.is_rune() && !target.is_rune() {
                let rune = quote_one(ctx, &coin.asset, coin.amount, &Asset::rune())?.unwrap_or_default();
                hops = vec![
                    (coin.clone(), Asset::rune()),
                    (Coin::new(Asset::rune(), rune), target),
                ];
            }
            for (source, target) in hops {
                let asset = if source.asset.is_rune() { &target } else { &source.asset };
                let pool = ctx.keeper.get_pool(&asset.layer1_asset())?;
                if pool.is_empty() || !pool.is_available() {
                    continue;
                }
                #[allow(non_snake_case)]
                let (X, Y) = depths(&pool, &source.asset);
                let mut fee = calc_liquidity_fee(X, source.amount, Y);
                if source.asset.is_rune() {
                    fee = pool.asset_value_in_rune(fee);
                }
                item.fee = item.fee.saturating_add(fee);
                item.slip = item.slip.saturating_add(calc_swap_slip(X, source.amount));
            }
        }
        Ok(())
    }

    /// Move limit orders whose target is reachable at current depths into
    /// the swap queue.
    fn promote_orders(&self, ctx: &mut Context) -> Result<()> {
        for msg in ctx.keeper.get_order_book()? {
            let Some(coin) = msg.tx.coins.iter().next() else {
                ctx.keeper.remove_order_book_item(&msg.tx.id);
                continue;
            };
            let Some(out) = quote(ctx, coin, &msg.target_asset)? else {
                continue;
            };
            if out >= msg.trade_target {
                debug!("limit order {} reached its target {}", msg.tx.id, msg.trade_target);
                let index = Self::next_index(ctx, &msg)?;
                ctx.keeper.set_swap_queue_item(&msg, index)?;
                ctx.keeper.remove_order_book_item(&msg.tx.id);
            }
        }
        Ok(())
    }

    fn next_index(ctx: &Context, msg: &MsgSwap) -> Result<usize> {
        Ok(ctx
            .keeper
            .get_swap_queue()?
            .iter()
            .filter(|(queued, _)| queued.tx.id == msg.tx.id)
            .map(|(_, index)| index + 1)
            .max()
            .unwrap_or_default())
    }
}

impl SwapQueue for DefaultSwapQueue {
    fn add_swap(&self, ctx: &mut Context, msg: &MsgSwap) -> Result<()> {
        if msg.order_type == OrderType::Limit && ctx.config_i64(ConstantName::EnableOrderBooks)? > 0 {
            return ctx.keeper.set_order_book_item(msg);
        }
        let index = Self::next_index(ctx, msg)?;
        ctx.keeper.set_swap_queue_item(msg, index)
    }

    fn end_block(&self, ctx: &mut Context, mgr: &Managers) -> Result<()> {
        if ctx.config_i64(ConstantName::EnableOrderBooks)? > 0 {
            self.promote_orders(ctx)?;
        }
        let min_swaps = ctx.config_i64(ConstantName::MinSwapsPerBlock)?;
        let max_swaps = ctx.config_i64(ConstantName::MaxSwapsPerBlock)?;

        let mut items: Vec<SwapItem> = ctx
            .keeper
            .get_swap_queue()?
            .into_iter()
            .map(|(msg, index)| SwapItem {
                index,
                msg,
                fee: 0,
                slip: 0,
            })
            .collect();
        if let Err(err) = Self::score(ctx, &mut items) {
            error!("fail to score swap items: {}", err);
        }
        let items = sort_items(items);

        let todo = todo_num(items.len() as i64, min_swaps, max_swaps).max(0) as usize;
        for item in items.into_iter().take(todo) {
            if let Err(err) = internal_handler(ctx, mgr, Msg::Swap(item.msg.clone())) {
                error!("fail to swap {}: {}", item.msg.tx.id, err);
                let voter = ctx.keeper.get_observed_tx_in_voter(&item.msg.tx.id)?;
                let mut observed = ObservedTx {
                    tx: item.msg.tx.clone(),
                    ..ObservedTx::default()
                };
                if !voter.tx.is_empty() {
                    observed.observed_pub_key = voter.tx.observed_pub_key.clone();
                }
                if let Err(refund_err) = refund_tx(ctx, mgr, &observed, err.code(), &err.to_string(), "") {
                    error!("fail to refund swap {}: {}", item.msg.tx.id, refund_err);
                }
            }
            ctx.keeper.remove_swap_queue_item(&item.msg.tx.id, item.index);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            events::Event,
            keeper::Keeper,
            types::{NetworkFee, Pool, PoolStatus, Vault, VaultStatus, VaultType},
        },
        assert_matches::assert_matches,
        semver::Version,
        test_case::test_case,
        thornode_common::{AccAddress, Address, Chain, Coins, PubKey, TxId, ONE},
    };

    #[test_case(100, 10, 100, 8 ; "small swap")]
    #[test_case(1_000, 1_000, 1_000, 250 ; "swap equal to depth")]
    #[test_case(0, 10, 100, 0 ; "empty pool")]
    fn test_asset_emission(x_depth: Uint, x: Uint, y_depth: Uint, expected: Uint) {
        assert_eq!(calc_asset_emission(x_depth, x, y_depth), expected);
    }

    #[test]
    fn test_fee_and_slip() {
        // 10 into 100/100: emit 8, fee 0 after truncation, slip 909 bps
        assert_eq!(calc_liquidity_fee(100, 10, 100), 0);
        assert_eq!(calc_liquidity_fee(1_000, 1_000, 1_000), 250);
        assert_eq!(calc_swap_slip(100, 10), 909);
        assert_eq!(calc_swap_slip(0, 0), 0);
    }

    #[test_case(10, 0, 100, 5 ; "half the queue")]
    #[test_case(10, 10, 100, 10 ; "short queue drains")]
    #[test_case(100, 10, 20, 20 ; "capped")]
    #[test_case(0, 10, 100, 0 ; "empty")]
    fn test_todo_num(len: i64, min: i64, max: i64, expected: i64) {
        assert_eq!(todo_num(len, min, max), expected);
    }

    fn bnb_pool(ctx: &mut Context) {
        let mut pool = Pool::new(Chain::BNB.gas_asset());
        pool.balance_rune = 1_000 * ONE;
        pool.balance_asset = 100 * ONE;
        pool.lp_units = 1_000 * ONE;
        pool.status = PoolStatus::Available;
        ctx.keeper.set_pool(&pool).unwrap();
    }

    fn swap_msg(id: &[u8], amount: Uint, limit: Uint, order_type: OrderType) -> MsgSwap {
        let tx = Tx::new(
            TxId::from_bytes(id),
            Address::new_unchecked("thorswapper"),
            Address::new_unchecked("thorasgard"),
            Coins::new(vec![Coin::new(Asset::rune(), amount)]),
            Coins::default(),
            "=:BNB.BNB:bnb1swapper",
        );
        MsgSwap {
            tx,
            target_asset: Chain::BNB.gas_asset(),
            destination: Address::new_unchecked("bnb1swapper"),
            trade_target: limit,
            affiliate_address: Address::default(),
            affiliate_basis_points: 0,
            aggregator: String::new(),
            aggregator_target_address: String::new(),
            aggregator_target_limit: None,
            order_type,
            signer: AccAddress::new_unchecked("thorsigner"),
        }
    }

    #[test]
    fn test_swap_one_moves_pool_depths() {
        let mut ctx = Context::new(Keeper::default(), 1, Version::new(1, 111, 0));
        bnb_pool(&mut ctx);
        let msg = swap_msg(b"swap", 100 * ONE, 0, OrderType::Market);
        let result = swap_one(&mut ctx, &msg.tx, &msg.target_asset, 0).unwrap();
        // 100 rune into 1000/100: emission 100*1000*100/1100^2
        assert_eq!(result.emit_asset.amount, 826_446_280);
        assert_eq!(result.swap_slip, 909);
        assert!(result.burn.is_none());
        let pool = ctx.keeper.get_pool(&Chain::BNB.gas_asset()).unwrap();
        assert_eq!(pool.balance_rune, 1_100 * ONE);
        assert_eq!(pool.balance_asset, 100 * ONE - 826_446_280);
    }

    #[test]
    fn test_swap_one_rejects_unavailable_pool() {
        let mut ctx = Context::new(Keeper::default(), 1, Version::new(1, 111, 0));
        bnb_pool(&mut ctx);
        let mut pool = ctx.keeper.get_pool(&Chain::BNB.gas_asset()).unwrap();
        pool.status = PoolStatus::Staged;
        ctx.keeper.set_pool(&pool).unwrap();
        let msg = swap_msg(b"swap", ONE, 0, OrderType::Market);
        assert_matches!(
            swap_one(&mut ctx, &msg.tx, &msg.target_asset, 0),
            Err(RuntimeError::InvalidPoolStatus(_))
        );
        assert_matches!(
            swap_one(&mut ctx, &msg.tx, &Chain::ETH.gas_asset(), 0),
            Err(RuntimeError::UnknownRequest(_))
        );
        assert_matches!(
            swap_one(&mut ctx, &msg.tx, &msg.target_asset, ONE),
            Err(RuntimeError::NotEnoughToPayFee)
        );
    }

    #[test]
    fn test_sort_prefers_larger_swaps() {
        let item = |id: &[u8], fee, slip| SwapItem {
            index: 0,
            msg: swap_msg(id, ONE, 0, OrderType::Market),
            fee,
            slip,
        };
        let sorted = sort_items(vec![item(b"a", 1, 1), item(b"b", 30, 20), item(b"c", 20, 30)]);
        assert_eq!(sorted[2].msg.tx.id, TxId::from_bytes(b"a"));
        // b and c tie on score, hash order decides
        let (first, second) = (&sorted[0].msg.tx.id, &sorted[1].msg.tx.id);
        assert!(first.as_str() < second.as_str());
    }

    #[test]
    fn test_limit_order_waits_for_price() {
        let mut ctx = Context::new(Keeper::default(), 1, Version::new(1, 111, 0));
        bnb_pool(&mut ctx);
        ctx.keeper.set_mimir("EnableOrderBooks", 1).unwrap();
        let queue = DefaultSwapQueue;
        let msg = swap_msg(b"limit", 10 * ONE, 2 * ONE, OrderType::Limit);
        queue.add_swap(&mut ctx, &msg).unwrap();
        assert!(ctx.keeper.get_swap_queue().unwrap().is_empty());
        assert_eq!(ctx.keeper.get_order_book().unwrap().len(), 1);

        // 10 rune only buys about 0.98 BNB
        queue.promote_orders(&mut ctx).unwrap();
        assert_eq!(ctx.keeper.get_order_book().unwrap().len(), 1);

        let mut pool = ctx.keeper.get_pool(&Chain::BNB.gas_asset()).unwrap();
        pool.balance_asset = 1_000 * ONE;
        ctx.keeper.set_pool(&pool).unwrap();
        queue.promote_orders(&mut ctx).unwrap();
        assert!(ctx.keeper.get_order_book().unwrap().is_empty());
        assert_eq!(ctx.keeper.get_swap_queue().unwrap()[0].1, 0);
    }

    #[test]
    fn test_end_block_executes_queue() {
        let mut ctx = Context::new(Keeper::default(), 1, Version::new(1, 111, 0));
        bnb_pool(&mut ctx);
        ctx.keeper
            .save_network_fee(&NetworkFee::new(Chain::BNB, 1, 37_500))
            .unwrap();
        let mut vault = Vault::new(
            1,
            VaultStatus::Active,
            VaultType::Asgard,
            PubKey::new("asgardpk").unwrap(),
            vec![Chain::BNB],
            vec![],
        );
        vault.add_funds(&Coins::new(vec![Coin::new(Chain::BNB.gas_asset(), 100 * ONE)]));
        ctx.keeper.set_vault(&vault).unwrap();
        ctx.keeper.set_mimir("MinSwapsPerBlock", 10).unwrap();

        let mgr = Managers::default();
        mgr.swap_queue
            .add_swap(&mut ctx, &swap_msg(b"one", 10 * ONE, 0, OrderType::Market))
            .unwrap();
        mgr.swap_queue
            .add_swap(&mut ctx, &swap_msg(b"two", 20 * ONE, 0, OrderType::Market))
            .unwrap();
        mgr.swap_queue.end_block(&mut ctx, &mgr).unwrap();

        assert!(ctx.keeper.get_swap_queue().unwrap().is_empty());
        let scheduled = ctx
            .keeper
            .store()
            .events()
            .iter()
            .filter(|e| matches!(e, Event::ScheduledOutbound { .. }))
            .count();
        assert_eq!(scheduled, 2);
        assert_eq!(
            ctx.keeper.store().events().iter().filter(|e| e.kind() == "swap").count(),
            2
        );
    }
}
