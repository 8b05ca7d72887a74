//! Errata: a super majority attests that a finalised transaction was
//! reorged out of its chain.

use {
    super::{require_active_signer, wrong_msg, HandlerFn, HandlerTable},
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        events::{Event, PoolMod},
        keeper::{ASGARD_NAME, RESERVE_NAME},
        managers::Managers,
        msgs::{Msg, MsgErrataTx},
        types::{TxOutItem, VaultStatus},
        versioned::VersionBranch,
    },
    log::*,
    thornode_common::{math::safe_sub, Asset, Coin, Coins, TxId},
    thornode_constants::ConstantName,
    thornode_memo::{parse_memo, TxType},
};

pub(super) static ERRATA: HandlerTable = HandlerTable {
    validate: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: validate_v1 as HandlerFn,
    }],
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_v1 as HandlerFn,
    }],
};

fn errata_msg(msg: &Msg) -> Result<&MsgErrataTx> {
    match msg {
        Msg::ErrataTx(m) => Ok(m),
        _ => Err(wrong_msg(msg)),
    }
}

fn validate_v1(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    require_active_signer(ctx, &errata_msg(msg)?.signer)
}

fn handle_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = errata_msg(msg)?;
    info!("errata for {} on {}", msg.tx_id, msg.chain);
    let active = ctx.keeper.list_active_validators()?;
    let mut voter = ctx.keeper.get_errata_tx_voter(&msg.tx_id, msg.chain)?;
    let observe_points = ctx.config_i64(ConstantName::ObserveSlashPoints)?;
    let flexibility = ctx.config_i64(ConstantName::ObservationDelayFlexibility)?;
    mgr.slasher
        .inc_slash_points(ctx, observe_points, &[msg.signer.clone()], "observe errata")?;

    if !voter.sign(&msg.signer) {
        info!("{} already signed errata {}", msg.signer, msg.tx_id);
        return Ok(());
    }
    ctx.keeper.set_errata_tx_voter(&voter)?;
    if !voter.has_consensus(&active) {
        return Ok(());
    }

    if voter.block_height > 0 {
        if voter.block_height + flexibility >= ctx.block_height() {
            mgr.slasher
                .dec_slash_points(ctx, observe_points, &[msg.signer.clone()])?;
        }
        return Ok(());
    }
    voter.block_height = ctx.block_height();
    ctx.keeper.set_errata_tx_voter(&voter)?;
    mgr.slasher
        .dec_slash_points(ctx, observe_points, &voter.signers)?;

    let mut in_voter = ctx.keeper.get_observed_tx_in_voter(&msg.tx_id)?;
    if in_voter.txs.is_empty() {
        return revert_outbound(ctx, mgr, msg);
    }
    in_voter.set_reverted();
    ctx.keeper.set_observed_tx_in_voter(&in_voter)?;
    if in_voter.tx.is_empty() {
        info!("inbound {} never reached consensus, nothing to undo", msg.tx_id);
        return Ok(());
    }

    let tx = in_voter.tx.tx.clone();
    if tx.chain != msg.chain {
        return Ok(());
    }
    if in_voter.updated_vault && !in_voter.tx.observed_pub_key.is_empty() {
        let mut vault = ctx.keeper.get_vault(&in_voter.tx.observed_pub_key)?;
        vault.sub_funds(&tx.coins);
        ctx.keeper.set_vault(&vault)?;
    }
    if !in_voter.tx.is_final() {
        info!("inbound {} is not final, nothing else to undo", msg.tx_id);
        return Ok(());
    }

    let memo = match parse_memo(ctx.version(), &ctx.keeper, &tx.memo) {
        Ok(memo) => memo,
        Err(err) => {
            debug!("errata inbound {} has no usable memo: {}", msg.tx_id, err);
            return Ok(());
        }
    };
    if memo.is_internal() {
        return revert_outbound(ctx, mgr, msg);
    }
    if !memo.is_type(TxType::Swap) && !memo.is_type(TxType::Add) {
        return Ok(());
    }

    if memo.is_type(TxType::Swap) {
        let queued: Vec<usize> = ctx
            .keeper
            .get_swap_queue()?
            .into_iter()
            .filter(|(swap, _)| swap.tx.id == msg.tx_id)
            .map(|(_, index)| index)
            .collect();
        if !queued.is_empty() {
            // Still queued, so the coins never reached the pool.
            for index in queued {
                ctx.keeper.remove_swap_queue_item(&msg.tx_id, index);
            }
            info!("dropped queued swap of reverted inbound {}", msg.tx_id);
            return Ok(());
        }
    }

    if memo.is_type(TxType::Swap) {
        let from = in_voter.finalised_height.max(1);
        let cancelled = cancel_scheduled_outbounds(ctx, &msg.tx_id, from)?;
        if cancelled > 0 {
            info!("cancelled {} outbounds of reverted swap {}", cancelled, msg.tx_id);
        }
    }

    let Some(asset) = tx.coins.iter().find(|c| !c.asset.is_rune()) else {
        return Ok(());
    };
    let mut pool = ctx.keeper.get_pool(&asset.asset)?;
    let rune_amount = tx.coins.amount_of(&Asset::rune()).min(pool.balance_rune);
    let asset_amount = asset.amount.min(pool.balance_asset);
    pool.balance_rune -= rune_amount;
    pool.balance_asset -= asset_amount;

    if memo.is_type(TxType::Add) {
        let mut lp = ctx.keeper.get_liquidity_provider(&pool.asset, &tx.from_address)?;
        pool.lp_units = pool.lp_units.saturating_sub(lp.units);
        lp.units = 0;
        lp.last_add_height = ctx.block_height();
        if ctx.keeper.liquidity_provider_exists(&pool.asset, &tx.from_address) {
            ctx.keeper.set_liquidity_provider(&lp)?;
        }
    }
    ctx.keeper.set_pool(&pool)?;

    mgr.events.emit(
        ctx,
        Event::Errata {
            tx_id: msg.tx_id.clone(),
            pools: vec![PoolMod {
                asset: pool.asset,
                rune_amount,
                rune_add: false,
                asset_amount,
                asset_add: false,
            }],
        },
    );
    Ok(())
}

/// Drop the unsigned outbounds of `in_hash` queued from height `from` up
/// to the furthest block an outbound can be delayed to.
fn cancel_scheduled_outbounds(ctx: &mut Context, in_hash: &TxId, from: i64) -> Result<usize> {
    let delay_max = ctx.config_i64(ConstantName::TxOutDelayMax)?;
    let mut cancelled = 0;
    for height in from..=ctx.block_height() + delay_max {
        let mut tx_out = ctx.keeper.get_tx_out(height)?;
        let before = tx_out.tx_array.len();
        tx_out
            .tx_array
            .retain(|item| item.is_signed() || item.in_hash != *in_hash);
        if tx_out.tx_array.len() != before {
            cancelled += before - tx_out.tx_array.len();
            ctx.keeper.set_tx_out(&tx_out)?;
        }
    }
    Ok(cancelled)
}

/// An outbound that was observed and then reorged away: credit the funds
/// back and schedule the payment again.
fn revert_outbound(ctx: &mut Context, mgr: &Managers, msg: &MsgErrataTx) -> Result<()> {
    let mut out_voter = ctx.keeper.get_observed_tx_out_voter(&msg.tx_id)?;
    if out_voter.txs.is_empty() {
        return Err(RuntimeError::UnknownRequest(format!("cannot find tx: {}", msg.tx_id)));
    }
    if out_voter.tx.is_empty() {
        return Err(RuntimeError::UnknownRequest(format!(
            "outbound {} is not finalised",
            msg.tx_id
        )));
    }
    let tx = out_voter.tx.tx.clone();
    if tx.chain != msg.chain || tx.coins.is_empty() {
        return Ok(());
    }
    let memo = parse_memo(ctx.version(), &ctx.keeper, &tx.memo)?;
    if !memo.is_outbound() && !memo.is_internal() {
        return Err(RuntimeError::InvalidMemo(format!(
            "{} is not an outbound or internal memo",
            tx.memo
        )));
    }

    let pk = out_voter.tx.observed_pub_key.clone();
    if !pk.is_empty() && ctx.keeper.vault_exists(&pk) {
        let mut vault = ctx.keeper.get_vault(&pk)?;
        let mut compensate = true;
        if vault.is_asgard() {
            vault.add_funds(&tx.coins);
            compensate = false;
            if vault.status == VaultStatus::Inactive {
                info!("errata resurrects vault {}", vault.pub_key);
                vault.update_status(VaultStatus::Retiring, ctx.block_height());
            }
        } else if let Some(node) = ctx.keeper.get_node_account_by_pub_key(&vault.pub_key)? {
            if node.bond > 0 {
                vault.add_funds(&tx.coins);
                compensate = false;
            }
        }
        ctx.keeper.set_vault(&vault)?;

        if compensate {
            for coin in tx.coins.iter().filter(|c| !c.asset.is_rune()) {
                let mut pool = ctx.keeper.get_pool(&coin.asset)?;
                let rune_value = pool.asset_value_in_rune(coin.amount);
                pool.balance_rune += rune_value;
                pool.balance_asset = safe_sub(pool.balance_asset, coin.amount);
                ctx.keeper.send_from_module_to_module(
                    RESERVE_NAME,
                    ASGARD_NAME,
                    &Coins::new(vec![Coin::new(Asset::rune(), rune_value)]),
                )?;
                ctx.keeper.set_pool(&pool)?;
                mgr.events.emit(
                    ctx,
                    Event::Errata {
                        tx_id: msg.tx_id.clone(),
                        pools: vec![PoolMod {
                            asset: pool.asset,
                            rune_amount: rune_value,
                            rune_add: true,
                            asset_amount: coin.amount,
                            asset_add: false,
                        }],
                    },
                );
            }
        }
    }

    if let Some(in_hash) = memo.tx_id().filter(|id| !id.is_empty() && !id.is_blank()) {
        let in_voter = ctx.keeper.get_observed_tx_in_voter(in_hash)?;
        if let Some(action) = in_voter.actions.iter().find(|a| a.out_hash == msg.tx_id) {
            let item = TxOutItem::new(
                action.chain,
                action.to_address.clone(),
                action.coin.clone(),
                action.in_hash.clone(),
            )
            .with_memo(action.memo.clone());
            info!("rescheduling outbound of {} after errata", in_hash);
            mgr.tx_out_store.try_add_tx_out_item(ctx, mgr, item, 0)?;
        }
    }
    out_voter.set_reverted();
    ctx.keeper.set_observed_tx_out_voter(&out_voter)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            handlers::external_handler,
            msgs::MsgObservedTxIn,
            test_utils::*,
            types::{NetworkFee, NodeAccount, ObservedTx, Vault},
        },
        assert_matches::assert_matches,
        thornode_common::{AccAddress, Chain, TxId, ONE},
    };

    fn setup() -> (Context, Managers, Vec<NodeAccount>, Vault) {
        let mut ctx = test_context(10);
        let nodes = add_active_nodes(&mut ctx, 4);
        let vault = add_asgard(&mut ctx, "asgardpk", &nodes, vec![]);
        add_pool(&mut ctx, Chain::BNB.gas_asset(), 1_000 * ONE, 100 * ONE);
        ctx.keeper
            .save_network_fee(&NetworkFee::new(Chain::BNB, 1, 37_500))
            .unwrap();
        (ctx, Managers::default(), nodes, vault)
    }

    fn observe_by(ctx: &mut Context, mgr: &Managers, tx: &ObservedTx, nodes: &[NodeAccount]) {
        for node in nodes {
            let msg = Msg::ObservedTxIn(MsgObservedTxIn {
                txs: vec![tx.clone()],
                signer: node.node_address.clone(),
            });
            external_handler(ctx, mgr, msg).unwrap();
        }
    }

    fn errata_by(ctx: &mut Context, mgr: &Managers, tx_id: &TxId, nodes: &[NodeAccount]) {
        for node in nodes {
            let msg = Msg::ErrataTx(MsgErrataTx {
                tx_id: tx_id.clone(),
                chain: Chain::BNB,
                signer: node.node_address.clone(),
            });
            external_handler(ctx, mgr, msg).unwrap();
        }
    }

    #[test]
    fn test_errata_zeroes_malicious_add() {
        let (mut ctx, mgr, nodes, vault) = setup();
        let bnb = Chain::BNB.gas_asset();
        let tx = observed_tx(
            "add1",
            "bnb1provider",
            &vault.pub_key,
            vec![Coin::new(bnb.clone(), 10 * ONE)],
            "+:BNB.BNB",
        );
        observe_by(&mut ctx, &mgr, &tx, &nodes[..3]);
        let provider = thornode_common::Address::new_unchecked("bnb1provider");
        let lp = ctx.keeper.get_liquidity_provider(&bnb, &provider).unwrap();
        assert!(lp.units > 0);
        let units_before = ctx.keeper.get_pool(&bnb).unwrap().lp_units;

        errata_by(&mut ctx, &mgr, &tx.tx.id, &nodes[..3]);
        let voter = ctx.keeper.get_observed_tx_in_voter(&tx.tx.id).unwrap();
        assert!(voter.reverted);
        let pool = ctx.keeper.get_pool(&bnb).unwrap();
        assert_eq!(pool.balance_asset, 100 * ONE);
        assert_eq!(pool.lp_units, units_before - lp.units);
        assert_eq!(
            ctx.keeper.get_liquidity_provider(&bnb, &provider).unwrap().units,
            0
        );
        let vault = ctx.keeper.get_vault(&vault.pub_key).unwrap();
        assert_eq!(vault.balance_of(&bnb), 0);
        assert!(ctx
            .keeper
            .store()
            .events()
            .iter()
            .any(|e| matches!(e, Event::Errata { .. })));
    }

    #[test]
    fn test_errata_drops_queued_swap() {
        let (mut ctx, mgr, nodes, vault) = setup();
        let tx = observed_tx(
            "swap1",
            "bnb1swapper",
            &vault.pub_key,
            vec![Coin::new(Chain::BNB.gas_asset(), ONE)],
            "=:THOR.RUNE:thorswapper",
        );
        observe_by(&mut ctx, &mgr, &tx, &nodes[..3]);
        assert_eq!(ctx.keeper.get_swap_queue().unwrap().len(), 1);

        errata_by(&mut ctx, &mgr, &tx.tx.id, &nodes[..3]);
        assert!(ctx.keeper.get_swap_queue().unwrap().is_empty());
        let pool = ctx.keeper.get_pool(&Chain::BNB.gas_asset()).unwrap();
        assert_eq!(pool.balance_asset, 100 * ONE);

        // a late errata vote changes nothing
        errata_by(&mut ctx, &mgr, &tx.tx.id, &nodes[3..]);
        assert_eq!(ctx.keeper.get_node_account_slash_points(&nodes[3].node_address).unwrap(), 0);
    }

    #[test]
    fn test_errata_needs_active_signer() {
        let (mut ctx, mgr, _, _) = setup();
        let msg = Msg::ErrataTx(MsgErrataTx {
            tx_id: TxId::from_bytes(b"whatever"),
            chain: Chain::BNB,
            signer: AccAddress::new_unchecked("thornobody"),
        });
        assert_matches!(
            external_handler(&mut ctx, &mgr, msg),
            Err(RuntimeError::Unauthorized(_))
        );
    }

    #[test]
    fn test_errata_cancels_outbound_of_executed_swap() {
        let (mut ctx, mgr, nodes, vault) = setup();
        let bnb = Chain::BNB.gas_asset();
        let twt = Asset::parse("BNB.TWT-8C2").unwrap();
        add_pool(&mut ctx, twt.clone(), 1_000 * ONE, 100 * ONE);
        let mut funded = ctx.keeper.get_vault(&vault.pub_key).unwrap();
        funded.add_funds(&Coins::new(vec![
            Coin::new(bnb.clone(), 10 * ONE),
            Coin::new(twt.clone(), 100 * ONE),
        ]));
        ctx.keeper.set_vault(&funded).unwrap();

        let tx = observed_tx(
            "swap2",
            "bnb1swapper",
            &vault.pub_key,
            vec![Coin::new(bnb.clone(), ONE)],
            "=:BNB.TWT-8C2:bnb1swapper",
        );
        observe_by(&mut ctx, &mgr, &tx, &nodes[..3]);
        mgr.swap_queue.end_block(&mut ctx, &mgr).unwrap();
        assert!(ctx.keeper.get_swap_queue().unwrap().is_empty());
        assert!(find_scheduled(&ctx, &tx.tx.id).is_some());

        errata_by(&mut ctx, &mgr, &tx.tx.id, &nodes[..3]);
        assert!(ctx.keeper.get_observed_tx_in_voter(&tx.tx.id).unwrap().reverted);
        assert!(scheduled_outbounds(&ctx, &tx.tx.id).is_empty());
    }
}
