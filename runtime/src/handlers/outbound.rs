//! Outbounds observed leaving the vaults.
//!
//! An observed outbound is voted on like an inbound. Once final its memo is
//! turned into one of the internal messages below, each of which looks up
//! the tx-out item the outbound settles and marks it signed. Funds that
//! leave a vault without a matching item are slashed from the bond of the
//! nodes that control it.

use {
    super::{
        internal_handler, observed_tx::coins_and_gas, preflight, process_one_tx_in, require_active_signer,
        wrong_msg, HandlerFn, HandlerTable, NO_VALIDATION,
    },
    crate::{
        context::Context,
        error::Result,
        events::Event,
        managers::Managers,
        msgs::{Msg, MsgObservedTxOut},
        types::{ObservedTx, TxOutItem, VaultStatus},
        versioned::VersionBranch,
    },
    log::*,
    thornode_common::{math::get_median, Coin, Coins, PubKey, Tx, TxId},
    thornode_constants::ConstantName,
    thornode_memo::{parse_memo, TxType},
};

pub(super) static TX_OUT: HandlerTable = HandlerTable {
    validate: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: validate_tx_out_v1 as HandlerFn,
    }],
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_tx_out_v1 as HandlerFn,
    }],
};

pub(super) static OUTBOUND: HandlerTable = HandlerTable {
    validate: NO_VALIDATION,
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_outbound_v1 as HandlerFn,
    }],
};

pub(super) static REFUND: HandlerTable = HandlerTable {
    validate: NO_VALIDATION,
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_refund_v1 as HandlerFn,
    }],
};

pub(super) static MIGRATE: HandlerTable = HandlerTable {
    validate: NO_VALIDATION,
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_migrate_v1 as HandlerFn,
    }],
};

pub(super) static RAGNAROK: HandlerTable = HandlerTable {
    validate: NO_VALIDATION,
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_ragnarok_v1 as HandlerFn,
    }],
};

pub(super) static YGGDRASIL: HandlerTable = HandlerTable {
    validate: NO_VALIDATION,
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_yggdrasil_v1 as HandlerFn,
    }],
};

pub(super) static CONSOLIDATE: HandlerTable = HandlerTable {
    validate: NO_VALIDATION,
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_consolidate_v1 as HandlerFn,
    }],
};

fn validate_tx_out_v1(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::ObservedTxOut(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    require_active_signer(ctx, &msg.signer)
}

fn handle_tx_out_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::ObservedTxOut(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    handle_tx_out(ctx, mgr, msg)
}

fn handle_tx_out(ctx: &mut Context, mgr: &Managers, msg: &MsgObservedTxOut) -> Result<()> {
    let active = ctx.keeper.list_active_validators()?;
    let height = ctx.block_height();
    for tx in &msg.txs {
        if !ctx.keeper.vault_exists(&tx.observed_pub_key) {
            info!("observed pub key {} is not a known vault", tx.observed_pub_key);
            continue;
        }
        if tx.keysign_ms > 0 {
            ctx.keeper
                .set_tss_metric(tx.tx.id.as_str(), &msg.signer, tx.keysign_ms)?;
        }
        let voter = ctx.keeper.get_observed_tx_out_voter(&tx.tx.id)?;
        let (voter, ok) = preflight(ctx, mgr, voter, &active, tx, &msg.signer)?;
        ctx.keeper.set_observed_tx_out_voter(&voter)?;
        if !ok || voter.finalised_height == 0 {
            continue;
        }
        info!("outbound {} from {} is final", tx.tx.id, tx.observed_pub_key);

        let memo = match parse_memo(ctx.version(), &ctx.keeper, &tx.tx.memo) {
            Ok(memo) if !memo.is_inbound() => memo,
            _ => {
                slash_extra_funds(ctx, mgr, tx)?;
                continue;
            }
        };

        let mut observed = voter.tx.clone();
        observed.tx.memo = tx.tx.memo.clone();
        let internal = match process_one_tx_in(ctx, &observed, &msg.signer) {
            Ok(internal) => internal,
            Err(err) => {
                error!("fail to process outbound {}: {}", tx.tx.id, err);
                continue;
            }
        };
        if ctx.keeper.get_vault(&tx.observed_pub_key)?.status != VaultStatus::Inactive {
            add_gas_fees(ctx, mgr, tx)?;
        }
        if tx.keysign_ms > 0 {
            let durations: Vec<i64> = ctx
                .keeper
                .get_tss_metric(tx.tx.id.as_str())?
                .into_values()
                .collect();
            mgr.events.emit(
                ctx,
                Event::TssKeysignMetric {
                    tx_id: tx.tx.id.to_string(),
                    median_duration_ms: get_median(&durations),
                },
            );
        }
        if let Err(err) = internal_handler(ctx, mgr, internal) {
            error!("fail to settle outbound {}: {}", tx.tx.id, err);
            continue;
        }

        let mut voter = ctx.keeper.get_observed_tx_out_voter(&tx.tx.id)?;
        voter.set_done();
        ctx.keeper.set_observed_tx_out_voter(&voter)?;

        let mut vault = ctx.keeper.get_vault(&tx.observed_pub_key)?;
        vault.sub_funds(&tx.tx.coins);
        vault.outbound_tx_count += 1;
        if vault.is_asgard() && memo.is_type(TxType::Migrate) {
            vault.remove_pending_tx_block_height(memo.block_height());
        }
        if vault.is_retiring() && !vault.has_funds() {
            info!("retiring vault {} is empty, now inactive", vault.pub_key);
            vault.update_status(VaultStatus::Inactive, height);
            mgr.events.emit(
                ctx,
                Event::InactiveVault {
                    pub_key: vault.pub_key.clone(),
                },
            );
        }
        // a signed outbound proves the vault can sign on that chain again
        for coin in tx.tx.coins.iter() {
            vault.unfreeze(coin.asset.get_chain());
        }
        ctx.keeper.set_vault(&vault)?;
    }
    Ok(())
}

/// A vault that sends funds with a memo that is not an outbound intent is
/// charged for everything it spent.
fn slash_extra_funds(ctx: &mut Context, mgr: &Managers, tx: &ObservedTx) -> Result<()> {
    let coins = coins_and_gas(tx);
    warn!("vault {} sent {} without an outbound memo", tx.observed_pub_key, coins);
    if let Err(err) = mgr.slasher.slash_vault(ctx, mgr, &tx.observed_pub_key, &coins) {
        error!("fail to slash vault {} for extra funds: {}", tx.observed_pub_key, err);
    }
    let mut vault = ctx.keeper.get_vault(&tx.observed_pub_key)?;
    vault.sub_funds(&coins);
    ctx.keeper.set_vault(&vault)
}

/// Record the gas an outbound paid and take it out of the vault. During
/// ragnarok a gas asset outbound pays its own gas.
fn add_gas_fees(ctx: &mut Context, mgr: &Managers, tx: &ObservedTx) -> Result<()> {
    if tx.tx.gas.is_empty() {
        return Ok(());
    }
    let gas_asset = tx.tx.chain.gas_asset();
    if !ctx.keeper.ragnarok_in_progress()? || tx.tx.coins.amount_of(&gas_asset) == 0 {
        mgr.gas.add_gas_asset(ctx, &tx.tx.gas, true)?;
    }
    let mut vault = ctx.keeper.get_vault(&tx.observed_pub_key)?;
    vault.sub_funds(&tx.tx.gas);
    ctx.keeper.set_vault(&vault)
}

fn handle_outbound_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::OutboundTx(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    common_outbound(ctx, mgr, &msg.tx, &msg.in_tx_id)
}

fn handle_refund_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::RefundTx(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    common_outbound(ctx, mgr, &msg.tx, &msg.in_tx_id)
}

/// Settle an outbound against the inbound it answers.
///
/// The tx-out lists are scanned from the height the inbound's outbounds
/// were scheduled at, one signing period at a time. The first unsigned
/// item of the same inbound that `tx` pays is marked signed. Anything the
/// outbound spent beyond that item is slashed.
fn common_outbound(ctx: &mut Context, mgr: &Managers, tx: &ObservedTx, in_tx_id: &TxId) -> Result<()> {
    let mut voter = ctx.keeper.get_observed_tx_in_voter(in_tx_id)?;
    if voter.add_out_tx(&tx.tx) {
        mgr.events.emit(
            ctx,
            Event::Outbound {
                in_tx_id: in_tx_id.clone(),
                tx: tx.tx.clone(),
            },
        );
    }
    ctx.keeper.set_observed_tx_in_voter(&voter)?;
    if tx.tx.chain.is_thor() {
        return Ok(());
    }

    let period = ctx.config_i64(ConstantName::SigningTransactionPeriod)?.max(1);
    let height = ctx.block_height();
    let start = if voter.outbound_height > 0 {
        voter.outbound_height
    } else {
        voter.finalised_height
    };

    let mut matched: Option<Coin> = None;
    let mut scan = start;
    while scan <= height && matched.is_none() {
        let current = scan;
        scan += period;
        if current < height - period {
            debug!("outbound of {} scheduled at {} has expired", in_tx_id, current);
            continue;
        }
        let mut tx_out = ctx.keeper.get_tx_out(current)?;
        let Some(item) = tx_out
            .tx_array
            .iter_mut()
            .find(|item| item.in_hash == *in_tx_id && item.matches_outbound(&tx.tx, &tx.observed_pub_key))
        else {
            continue;
        };
        if !tx.tx.coins.contains(&item.coin) {
            refund_unused_gas(ctx, mgr, item, &tx.tx)?;
        }
        item.out_hash = tx.tx.id.clone();
        // a gas asset item may be paid with part of its gas folded in
        matched = Some(Coin::new(
            item.coin.asset.clone(),
            tx.tx.coins.amount_of(&item.coin.asset),
        ));
        ctx.keeper.set_tx_out(&tx_out)?;
    }

    let to_slash = match &matched {
        Some(coin) => {
            let mut extra = tx.tx.coins.clone();
            extra.sub(coin);
            extra.none_empty()
        }
        None => {
            info!("no tx out item matches outbound {} of {}", tx.tx.id, in_tx_id);
            mgr.events.emit(
                ctx,
                Event::Security {
                    msg: format!("missing tx out in={in_tx_id}"),
                    tx: tx.tx.clone(),
                },
            );
            coins_and_gas(tx)
        }
    };
    if !to_slash.is_empty() {
        info!("slash vault {} for {}", tx.observed_pub_key, to_slash);
        mgr.slasher
            .slash_vault(ctx, mgr, &tx.observed_pub_key, &to_slash)?;
    }
    ctx.keeper.set_last_sign_height(voter.finalised_height)
}

/// A gas asset outbound that spent less gas than allowed hands the
/// difference back to the gas pool.
fn refund_unused_gas(ctx: &mut Context, mgr: &Managers, item: &TxOutItem, tx: &Tx) -> Result<()> {
    let gas_asset = item.chain.gas_asset();
    let max_gas = item.max_gas.amount_of(&gas_asset);
    let real_gas = tx.gas.amount_of(&gas_asset);
    if max_gas <= real_gas {
        return Ok(());
    }
    let diff = Coins::new(vec![Coin::new(gas_asset, max_gas - real_gas)]);
    mgr.gas.add_gas_asset(ctx, &diff, false)
}

/// Mark signed the first unsigned item the engine scheduled by itself at
/// one of `heights` that `tx` settles. `check_coin` is off for yggdrasil
/// returns, which send whatever the vault holds.
fn settle_engine_item(
    ctx: &mut Context,
    heights: impl IntoIterator<Item = i64>,
    tx: &Tx,
    vault_pk: &PubKey,
    check_coin: bool,
) -> Result<bool> {
    for height in heights {
        let mut tx_out = ctx.keeper.get_tx_out(height)?;
        let found = tx_out.tx_array.iter_mut().find(|item| {
            if !item.in_hash.is_blank() {
                return false;
            }
            if check_coin {
                item.matches_outbound(tx, vault_pk)
            } else {
                !item.is_signed()
                    && item.chain == tx.chain
                    && item.to_address.equals(&tx.to_address)
                    && item.vault_pub_key == *vault_pk
            }
        });
        if let Some(item) = found {
            item.out_hash = tx.id.clone();
            ctx.keeper.set_tx_out(&tx_out)?;
            return Ok(true);
        }
    }
    Ok(false)
}

fn handle_migrate_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::Migrate(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    let tx = &msg.tx;
    if !settle_engine_item(ctx, [msg.block_height], &tx.tx, &tx.observed_pub_key, true)? {
        info!("migration {} matches no tx out item", tx.tx.id);
        mgr.slasher
            .slash_vault(ctx, mgr, &tx.observed_pub_key, &coins_and_gas(tx))?;
    }
    ctx.keeper.set_last_sign_height(msg.block_height)
}

fn handle_ragnarok_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::Ragnarok(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    let tx = &msg.tx;
    if tx.tx.chain.is_thor() {
        return Ok(());
    }
    let period = ctx.config_i64(ConstantName::SigningTransactionPeriod)?.max(1);
    let heights = (msg.block_height..=ctx.block_height()).step_by(period as usize);
    if settle_engine_item(ctx, heights, &tx.tx, &tx.observed_pub_key, true)? {
        let pending = ctx.keeper.get_ragnarok_pending()?;
        ctx.keeper.set_ragnarok_pending((pending - 1).max(0))?;
    } else {
        info!("ragnarok outbound {} matches no tx out item", tx.tx.id);
        mgr.slasher
            .slash_vault(ctx, mgr, &tx.observed_pub_key, &coins_and_gas(tx))?;
    }
    ctx.keeper.set_last_sign_height(msg.block_height)
}

/// Whether `tx` pays an active or retiring asgard.
fn pays_asgard(ctx: &Context, tx: &Tx) -> Result<bool> {
    Ok(ctx.keeper.get_asgard_vaults()?.iter().any(|v| {
        matches!(v.status, VaultStatus::Active | VaultStatus::Retiring)
            && v.pub_key.address(tx.chain).equals(&tx.to_address)
    }))
}

fn handle_yggdrasil_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::Yggdrasil(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    let settled = settle_engine_item(ctx, [msg.block_height], &msg.tx, &msg.pub_key, msg.add_funds)?;
    let mut should_slash = !settled;
    if !msg.add_funds {
        let to_asgard = pays_asgard(ctx, &msg.tx)?;
        let node_active = ctx
            .keeper
            .get_node_account_by_pub_key(&msg.pub_key)?
            .map(|n| n.is_active())
            .unwrap_or_default();
        // an inactive node may always hand its funds back to asgard
        if !node_active && to_asgard {
            should_slash = false;
        }
        if !to_asgard {
            warn!("yggdrasil {} returned funds to a non asgard address", msg.pub_key);
            should_slash = true;
        }
    }
    if should_slash {
        let mut coins = msg.tx.coins.clone();
        coins.add_all(&msg.tx.gas);
        mgr.slasher.slash_vault(ctx, mgr, &msg.pub_key, &coins)?;
    }
    debug!(
        "yggdrasil {} {} {}",
        msg.pub_key,
        if msg.add_funds { "funded with" } else { "returned" },
        msg.coins
    );
    ctx.keeper.set_last_sign_height(msg.block_height)
}

/// Consolidation is a vault sending to itself; anything else is slashed.
fn handle_consolidate_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::Consolidate(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    let tx = &msg.observed_tx;
    let mut should_slash = !tx.tx.from_address.equals(&tx.tx.to_address);
    match ctx.keeper.get_vault(&tx.observed_pub_key) {
        Ok(vault) if !vault.is_asgard() => should_slash = true,
        Ok(_) => {}
        Err(err) => error!("unable to get vault for consolidation: {}", err),
    }
    if should_slash {
        info!("invalid consolidation {}", tx.tx.id);
        mgr.slasher
            .slash_vault(ctx, mgr, &tx.observed_pub_key, &coins_and_gas(tx))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            handlers::external_handler,
            keeper::RESERVE_NAME,
            test_utils::*,
            types::{NetworkFee, NodeAccount, ObservedTxVoter, Vault, VaultType, VoterState},
        },
        thornode_common::{Address, Asset, Chain, ONE},
        thornode_memo::Memo,
    };

    fn bnb() -> Asset {
        Chain::BNB.gas_asset()
    }

    fn setup() -> (Context, Managers, Vec<NodeAccount>, Vault) {
        let mut ctx = test_context(10);
        let nodes = add_active_nodes(&mut ctx, 4);
        let vault = add_asgard(&mut ctx, "asgardpk", &nodes, vec![Coin::new(bnb(), 100 * ONE)]);
        add_pool(&mut ctx, bnb(), 1_000 * ONE, 100 * ONE);
        ctx.keeper
            .save_network_fee(&NetworkFee::new(Chain::BNB, 1, 37_500))
            .unwrap();
        (ctx, Managers::default(), nodes, vault)
    }

    /// Finalised inbound `id` with one planned outbound of `amount` BNB from
    /// `vault_pk`, queued at height 10.
    fn schedule(ctx: &mut Context, id: &str, vault_pk: &PubKey, amount: u128) -> (TxId, TxOutItem) {
        let in_id = TxId::from_bytes(id.as_bytes());
        let mut item = TxOutItem::new(
            Chain::BNB,
            Address::new_unchecked("bnb1user"),
            Coin::new(bnb(), amount),
            in_id.clone(),
        )
        .with_vault(vault_pk.clone())
        .with_memo(Memo::Outbound { tx_id: in_id.clone() }.to_string());
        item.max_gas = Coins::new(vec![Coin::new(bnb(), 37_500)]);
        let inbound = Tx::new(
            in_id.clone(),
            Address::new_unchecked("bnb1user"),
            vault_pk.address(Chain::BNB),
            Coins::new(vec![Coin::new(bnb(), amount)]),
            Coins::new(vec![Coin::new(bnb(), 37_500)]),
            "=:BNB.BNB:bnb1user",
        );
        let mut voter = ObservedTxVoter::new(in_id.clone(), vec![]);
        voter.tx = ObservedTx::new(inbound, 10, vault_pk.clone(), 10);
        voter.finalised_height = 10;
        voter.actions.push(item.clone());
        ctx.keeper.set_observed_tx_in_voter(&voter).unwrap();
        ctx.keeper.append_tx_out(10, item.clone()).unwrap();
        (in_id, item)
    }

    fn outbound(id: &str, from: &PubKey, to: &str, coins: Vec<Coin>, memo: &str) -> ObservedTx {
        let tx = Tx::new(
            TxId::from_bytes(id.as_bytes()),
            from.address(Chain::BNB),
            Address::new_unchecked(to),
            Coins::new(coins),
            Coins::new(vec![Coin::new(bnb(), 37_500)]),
            memo,
        );
        ObservedTx::new(tx, 10, from.clone(), 10)
    }

    fn observe_all(ctx: &mut Context, mgr: &Managers, tx: &ObservedTx, nodes: &[NodeAccount]) {
        for node in &nodes[..3] {
            let msg = Msg::ObservedTxOut(MsgObservedTxOut {
                txs: vec![tx.clone()],
                signer: node.node_address.clone(),
            });
            external_handler(ctx, mgr, msg).unwrap();
        }
    }

    fn total_bond(ctx: &Context) -> u128 {
        ctx.keeper
            .list_active_validators()
            .unwrap()
            .iter()
            .map(|n| n.bond)
            .sum()
    }

    #[test]
    fn test_outbound_settles_scheduled_item() {
        let (mut ctx, mgr, nodes, mut vault) = setup();
        vault.freeze(Chain::BNB);
        ctx.keeper.set_vault(&vault).unwrap();
        let (in_id, item) = schedule(&mut ctx, "inbound", &vault.pub_key, 2 * ONE);

        let tx = outbound("out1", &vault.pub_key, "bnb1user", vec![Coin::new(bnb(), 2 * ONE)], &item.memo);
        observe_all(&mut ctx, &mgr, &tx, &nodes);

        let tx_out = ctx.keeper.get_tx_out(10).unwrap();
        assert_eq!(tx_out.tx_array[0].out_hash, tx.tx.id);
        let voter = ctx.keeper.get_observed_tx_in_voter(&in_id).unwrap();
        assert_eq!(voter.out_txs.len(), 1);
        assert_eq!(voter.state(), VoterState::Done);

        let vault = ctx.keeper.get_vault(&vault.pub_key).unwrap();
        assert_eq!(vault.balance_of(&bnb()), 98 * ONE - 37_500);
        assert_eq!(vault.outbound_tx_count, 1);
        assert!(!vault.is_frozen(Chain::BNB));
        assert_eq!(total_bond(&ctx), 4_000 * ONE);
        assert_eq!(ctx.keeper.get_last_sign_height().unwrap(), 10);

        let gas = ctx.keeper.get_block_gas().unwrap();
        assert_eq!(gas.len(), 1);
        assert_eq!(gas[0].asset_amount, 37_500);
        assert!(ctx
            .keeper
            .store()
            .events()
            .iter()
            .any(|e| matches!(e, Event::Outbound { in_tx_id, .. } if *in_tx_id == in_id)));
    }

    #[test]
    fn test_underpaid_outbound_leaves_item_open_and_slashes() {
        let (mut ctx, mgr, nodes, vault) = setup();
        let (in_id, item) = schedule(&mut ctx, "inbound", &vault.pub_key, 2 * ONE);

        let tx = outbound("out1", &vault.pub_key, "bnb1user", vec![Coin::new(bnb(), 1)], &item.memo);
        observe_all(&mut ctx, &mgr, &tx, &nodes);

        assert!(!ctx.keeper.get_tx_out(10).unwrap().tx_array[0].is_signed());
        let voter = ctx.keeper.get_observed_tx_in_voter(&in_id).unwrap();
        assert!(voter.out_txs.is_empty());
        assert_eq!(voter.state(), VoterState::Finalised);
        assert!(total_bond(&ctx) < 4_000 * ONE);
    }

    #[test]
    fn test_unmatched_outbound_is_slashed() {
        let (mut ctx, mgr, nodes, vault) = setup();
        let memo = Memo::Outbound {
            tx_id: TxId::from_bytes(b"unknown"),
        }
        .to_string();
        let tx = outbound("out1", &vault.pub_key, "bnb1thief", vec![Coin::new(bnb(), 2 * ONE)], &memo);
        observe_all(&mut ctx, &mgr, &tx, &nodes);

        assert!(total_bond(&ctx) < 4_000 * ONE);
        assert!(ctx.keeper.get_pool(&bnb()).unwrap().balance_asset < 100 * ONE);
        assert!(ctx
            .keeper
            .store()
            .events()
            .iter()
            .any(|e| matches!(e, Event::Security { .. })));
    }

    #[test]
    fn test_overspend_slashes_only_the_extra_asset() {
        let (mut ctx, mgr, nodes, _) = setup();
        let twt = Asset::parse("BNB.TWT-8C2").unwrap();
        add_pool(&mut ctx, twt.clone(), 1_000 * ONE, 100 * ONE);
        let ygg_pk = node_pub_key(0);
        let mut ygg = Vault::new(1, VaultStatus::Active, VaultType::Yggdrasil, ygg_pk.clone(), vec![Chain::BNB], vec![]);
        ygg.membership = vec![ygg_pk.clone()];
        ygg.add_funds(&Coins::new(vec![Coin::new(bnb(), 10 * ONE), Coin::new(twt.clone(), 10 * ONE)]));
        ctx.keeper.set_vault(&ygg).unwrap();
        let (_, item) = schedule(&mut ctx, "inbound", &ygg_pk, 2 * ONE);

        let tx = outbound(
            "out1",
            &ygg_pk,
            "bnb1user",
            vec![Coin::new(bnb(), 2 * ONE), Coin::new(twt.clone(), ONE)],
            &item.memo,
        );
        observe_all(&mut ctx, &mgr, &tx, &nodes);

        assert_eq!(ctx.keeper.get_tx_out(10).unwrap().tx_array[0].out_hash, tx.tx.id);
        // one twt is worth ten rune, slashed at 1.5x
        let owner = ctx.keeper.get_node_account(&nodes[0].node_address).unwrap().unwrap();
        assert_eq!(owner.bond, 985 * ONE);
        for node in &nodes[1..] {
            let node = ctx.keeper.get_node_account(&node.node_address).unwrap().unwrap();
            assert_eq!(node.bond, 1_000 * ONE);
        }
        let pool = ctx.keeper.get_pool(&twt).unwrap();
        assert_eq!(pool.balance_asset, 99 * ONE);
        assert_eq!(pool.balance_rune, 1_010 * ONE);
        assert_eq!(ctx.keeper.get_rune_balance_of_module(RESERVE_NAME).unwrap(), 5 * ONE);
        assert_eq!(ctx.keeper.get_pool(&bnb()).unwrap().balance_asset, 100 * ONE);
    }

    #[test]
    fn test_inbound_memo_from_vault_is_slashed() {
        let (mut ctx, mgr, nodes, vault) = setup();
        let tx = outbound(
            "out1",
            &vault.pub_key,
            "bnb1friend",
            vec![Coin::new(bnb(), ONE)],
            "=:THOR.RUNE:thorfriend",
        );
        observe_all(&mut ctx, &mgr, &tx, &nodes);
        assert!(total_bond(&ctx) < 4_000 * ONE);
        let vault = ctx.keeper.get_vault(&vault.pub_key).unwrap();
        assert_eq!(vault.balance_of(&bnb()), 99 * ONE - 37_500);
    }

    #[test]
    fn test_migration_drains_retiring_vault() {
        let (mut ctx, mgr, nodes, asgard) = setup();
        let mut old = Vault::new(
            1,
            VaultStatus::Retiring,
            VaultType::Asgard,
            PubKey::new("oldpk").unwrap(),
            vec![Chain::BNB],
            vec![],
        );
        old.membership = nodes.iter().map(|n| n.pub_key_set.secp256k1.clone()).collect();
        old.add_funds(&Coins::new(vec![Coin::new(bnb(), 5 * ONE + 37_500)]));
        old.append_pending_tx_block_height(5);
        ctx.keeper.set_vault(&old).unwrap();

        let memo = Memo::Migrate { block_height: 5 }.to_string();
        let mut item = TxOutItem::new(
            Chain::BNB,
            asgard.pub_key.address(Chain::BNB),
            Coin::new(bnb(), 5 * ONE),
            TxId::blank(),
        )
        .with_vault(old.pub_key.clone())
        .with_memo(memo.clone());
        item.max_gas = Coins::new(vec![Coin::new(bnb(), 37_500)]);
        ctx.keeper.append_tx_out(5, item).unwrap();

        let tx = outbound(
            "migrate1",
            &old.pub_key,
            asgard.pub_key.address(Chain::BNB).as_str(),
            vec![Coin::new(bnb(), 5 * ONE)],
            &memo,
        );
        observe_all(&mut ctx, &mgr, &tx, &nodes);

        assert_eq!(ctx.keeper.get_tx_out(5).unwrap().tx_array[0].out_hash, tx.tx.id);
        let old = ctx.keeper.get_vault(&old.pub_key).unwrap();
        assert!(!old.has_pending_migrations());
        assert_eq!(old.status, VaultStatus::Inactive);
        assert_eq!(total_bond(&ctx), 4_000 * ONE);
    }

    #[test]
    fn test_ragnarok_outbound_decrements_pending() {
        let (mut ctx, mgr, nodes, vault) = setup();
        ctx.keeper.set_ragnarok_pending(1).unwrap();
        let memo = Memo::Ragnarok { block_height: 10 }.to_string();
        let mut item = TxOutItem::new(
            Chain::BNB,
            Address::new_unchecked("bnb1provider"),
            Coin::new(bnb(), ONE),
            TxId::blank(),
        )
        .with_vault(vault.pub_key.clone())
        .with_memo(memo.clone());
        item.max_gas = Coins::new(vec![Coin::new(bnb(), 37_500)]);
        ctx.keeper.append_tx_out(10, item).unwrap();

        let tx = outbound("rag1", &vault.pub_key, "bnb1provider", vec![Coin::new(bnb(), ONE)], &memo);
        observe_all(&mut ctx, &mgr, &tx, &nodes);

        assert_eq!(ctx.keeper.get_ragnarok_pending().unwrap(), 0);
        assert!(ctx.keeper.get_tx_out(10).unwrap().tx_array[0].is_signed());
        assert_eq!(total_bond(&ctx), 4_000 * ONE);
    }

    #[test]
    fn test_consolidate_to_other_address_is_slashed() {
        let (mut ctx, mgr, nodes, vault) = setup();
        let own = vault.pub_key.address(Chain::BNB);
        let tx = outbound("c1", &vault.pub_key, own.as_str(), vec![Coin::new(bnb(), ONE)], "CONSOLIDATE");
        observe_all(&mut ctx, &mgr, &tx, &nodes);
        assert_eq!(total_bond(&ctx), 4_000 * ONE);

        let tx = outbound("c2", &vault.pub_key, "bnb1elsewhere", vec![Coin::new(bnb(), ONE)], "CONSOLIDATE");
        observe_all(&mut ctx, &mgr, &tx, &nodes);
        assert!(total_bond(&ctx) < 4_000 * ONE);
    }
}
