//! Inbound observations reported by validators.

use {
    super::{internal_handler, process_one_tx_in, refund_tx, require_active_signer, wrong_msg, HandlerFn, HandlerTable},
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        managers::Managers,
        msgs::{Msg, MsgObservedTxIn},
        types::{NodeAccount, ObservedTx, ObservedTxVoter, Vault},
        versioned::VersionBranch,
    },
    log::*,
    thornode_common::{AccAddress, Coins},
    thornode_constants::ConstantName,
    thornode_memo::{parse_memo, Memo},
};

/// Refund code for funds that arrive at a vault no longer in service.
pub(crate) const CODE_INVALID_VAULT: u32 = 104;

pub(super) static TX_IN: HandlerTable = HandlerTable {
    validate: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: validate_v1 as HandlerFn,
    }],
    handle: &[
        VersionBranch {
            since: (1, 107, 0),
            name: "v107",
            entrypoint: handle_v107 as HandlerFn,
        },
        VersionBranch {
            since: (0, 1, 0),
            name: "v1",
            entrypoint: handle_v1 as HandlerFn,
        },
    ],
};

fn validate_v1(ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::ObservedTxIn(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    require_active_signer(ctx, &msg.signer)
}

/// Count the vote of `signer` for `tx`.
///
/// Every vote costs the signer `ObserveSlashPoints`. When the vote tips the
/// voter into consensus (or finalisation), every signer of the winning
/// observation gets those points back; signers that agree within
/// `ObservationDelayFlexibility` blocks afterwards are refunded too.
///
/// Returns the updated voter and whether this vote moved it to a new
/// state. The caller persists the voter.
pub fn preflight(
    ctx: &mut Context,
    mgr: &Managers,
    mut voter: ObservedTxVoter,
    active: &[NodeAccount],
    tx: &ObservedTx,
    signer: &AccAddress,
) -> Result<(ObservedTxVoter, bool)> {
    let observe_slash_points = ctx.config_i64(ConstantName::ObserveSlashPoints)?;
    let flexibility = ctx.config_i64(ConstantName::ObservationDelayFlexibility)?;
    let height = ctx.block_height();
    let signers = [signer.clone()];

    mgr.slasher
        .inc_slash_points(ctx, observe_slash_points, &signers, "observe")?;
    ctx.keeper
        .set_last_observe_height(tx.tx.chain, signer, tx.block_height)?;

    if !voter.add(tx.clone(), signer) {
        debug!("{} already voted for {}", signer, tx.tx.id);
        return Ok((voter, false));
    }

    let mut ok = false;
    if voter.has_finalised(active) {
        if voter.finalised_height == 0 {
            ok = true;
            if voter.height == 0 {
                voter.height = height;
            }
            voter.finalised_height = height;
            voter.tx = voter.get_tx(active);
            let winners = voter.tx.signers.clone();
            mgr.slasher
                .dec_slash_points(ctx, observe_slash_points, &winners)?;
        } else if height <= voter.finalised_height + flexibility && voter.tx == *tx {
            mgr.slasher
                .dec_slash_points(ctx, observe_slash_points, &signers)?;
        }
    }
    if !ok && !tx.is_final() && voter.finalised_height == 0 && voter.has_consensus(active) {
        if voter.height == 0 {
            ok = true;
            voter.height = height;
            voter.tx = voter.get_tx(active);
            let winners = voter.tx.signers.clone();
            mgr.slasher
                .dec_slash_points(ctx, observe_slash_points, &winners)?;
        } else if height <= voter.height + flexibility && voter.tx == *tx {
            mgr.slasher
                .dec_slash_points(ctx, observe_slash_points, &signers)?;
        }
    }
    Ok((voter, ok))
}

fn handle_v107(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::ObservedTxIn(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    handle(ctx, mgr, msg, true)
}

fn handle_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let Msg::ObservedTxIn(msg) = msg else {
        return Err(wrong_msg(msg));
    };
    handle(ctx, mgr, msg, false)
}

/// Whether `tx` was sent by one of the asgard vaults.
fn is_from_asgard(ctx: &Context, tx: &ObservedTx) -> Result<bool> {
    Ok(ctx
        .keeper
        .get_asgard_vaults()?
        .iter()
        .any(|v| v.pub_key.address(tx.tx.chain).equals(&tx.tx.from_address)))
}

/// Funds that reach a yggdrasil vault without a memo it could act on are
/// charged, gas included, against the node that owns the vault.
fn slash_yggdrasil_bad_memo(ctx: &mut Context, mgr: &Managers, vault: &Vault, tx: &ObservedTx) -> Result<()> {
    let coins = coins_and_gas(tx);
    warn!("yggdrasil {} moved {} with an unusable memo", vault.pub_key, coins);
    mgr.slasher.slash_vault(ctx, mgr, &vault.pub_key, &coins)
}

fn handle(ctx: &mut Context, mgr: &Managers, msg: &MsgObservedTxIn, refund_in_ragnarok: bool) -> Result<()> {
    let active = ctx.keeper.list_active_validators()?;
    for tx in &msg.txs {
        if !ctx.keeper.vault_exists(&tx.observed_pub_key) {
            info!("observed pub key {} is not a known vault", tx.observed_pub_key);
            continue;
        }
        let voter = ctx.keeper.get_observed_tx_in_voter(&tx.tx.id)?;
        let (mut voter, ok) = preflight(ctx, mgr, voter, &active, tx, &msg.signer)?;
        ctx.keeper.set_observed_tx_in_voter(&voter)?;
        if !ok {
            continue;
        }
        if voter.reverted {
            info!("inbound {} has been reverted, skip", tx.tx.id);
            continue;
        }

        let mut vault = ctx.keeper.get_vault(&tx.observed_pub_key)?;
        let memo = parse_memo(ctx.version(), &ctx.keeper, &tx.tx.memo);
        if vault.is_asgard() && !voter.updated_vault {
            vault.add_funds(&tx.tx.coins);
            voter.updated_vault = true;
        }
        if tx.is_final() {
            vault.inbound_tx_count += 1;
        }
        if vault.is_yggdrasil() {
            match &memo {
                Ok(Memo::YggdrasilFund { block_height }) if !voter.updated_vault => {
                    if is_from_asgard(ctx, tx)? {
                        vault.add_funds(&tx.tx.coins);
                        voter.updated_vault = true;
                        vault.remove_pending_tx_block_height(*block_height);
                        ctx.keeper.clear_pending_ygg_fund(&vault.pub_key);
                    }
                }
                Err(_) if voter.finalised_height > 0 => slash_yggdrasil_bad_memo(ctx, mgr, &vault, tx)?,
                _ => {}
            }
        }
        ctx.keeper.set_observed_tx_in_voter(&voter)?;
        ctx.keeper.set_vault(&vault)?;

        if !vault.is_asgard() {
            continue;
        }
        if voter.finalised_height == 0 {
            debug!("inbound {} has consensus but is not final yet", tx.tx.id);
            continue;
        }
        if let Ok(memo) = &memo {
            if memo.is_outbound() || memo.is_internal() {
                continue;
            }
        }
        let observed = voter.tx.clone();
        if vault.is_inactive() {
            refund_tx(ctx, mgr, &observed, CODE_INVALID_VAULT, "vault is inactive", "")?;
            continue;
        }
        let internal = match process_one_tx_in(ctx, &observed, &msg.signer) {
            Ok(internal) => internal,
            Err(err) => {
                info!("fail to process inbound {}: {}", tx.tx.id, err);
                refund_tx(ctx, mgr, &observed, err.code(), &err.to_string(), "")?;
                continue;
            }
        };
        dispatch_inbound(ctx, mgr, &observed, internal, refund_in_ragnarok, "")?;
    }
    Ok(())
}

/// Run the intent of a finalised inbound. Failures refund the inbound out
/// of `source_module` (asgard when empty), and intents that never send
/// anything out mark their voter done.
pub(super) fn dispatch_inbound(
    ctx: &mut Context,
    mgr: &Managers,
    observed: &ObservedTx,
    msg: Msg,
    refund_in_ragnarok: bool,
    source_module: &str,
) -> Result<()> {
    if let Some(reason) = blocked_reason(ctx, &msg, refund_in_ragnarok)? {
        let err = RuntimeError::Unauthorized(reason);
        refund_tx(ctx, mgr, observed, err.code(), &err.to_string(), source_module)?;
        return Ok(());
    }
    let memo = parse_memo(ctx.version(), &ctx.keeper, &observed.tx.memo)?;
    let result = match &msg {
        Msg::Swap(swap) => ctx.with_cache(|ctx| mgr.swap_queue.add_swap(ctx, swap)),
        Msg::LoanOpen(_) | Msg::LoanRepayment(_) => {
            let scope = ctx.scope.clone();
            ctx.scope.loan_tx_id = Some(observed.tx.id.clone());
            ctx.scope.to_address = memo.destination().cloned();
            let result = internal_handler(ctx, mgr, msg);
            ctx.scope = scope;
            result
        }
        _ => internal_handler(ctx, mgr, msg),
    };
    if let Err(err) = result {
        info!("fail to handle inbound {}: {}", observed.tx.id, err);
        return refund_tx(ctx, mgr, observed, err.code(), &err.to_string(), source_module);
    }
    if !memo.tx_type().has_outbound() {
        let mut voter = ctx.keeper.get_observed_tx_in_voter(&observed.tx.id)?;
        voter.set_done();
        ctx.keeper.set_observed_tx_in_voter(&voter)?;
    }
    Ok(())
}

/// Swaps and adds are refused while trading is halted on any chain they
/// touch, and during ragnarok.
fn blocked_reason(ctx: &Context, msg: &Msg, refund_in_ragnarok: bool) -> Result<Option<String>> {
    let mut chains = Vec::new();
    match msg {
        Msg::Swap(m) => {
            chains.push(m.tx.chain);
            chains.push(m.target_asset.get_chain());
        }
        Msg::AddLiquidity(m) => chains.push(m.asset.get_chain()),
        _ => return Ok(None),
    }
    for chain in chains {
        if ctx.is_trading_halted(chain)? {
            return Ok(Some(format!("trading is halted on {chain}")));
        }
    }
    if refund_in_ragnarok && ctx.keeper.ragnarok_in_progress()? {
        return Ok(Some("ragnarok is in progress".to_string()));
    }
    Ok(None)
}

/// Coins and gas of an observation, as charged when it is slashed.
pub(super) fn coins_and_gas(tx: &ObservedTx) -> Coins {
    let mut coins = tx.tx.coins.clone();
    coins.add_all(&tx.tx.gas);
    coins
}
