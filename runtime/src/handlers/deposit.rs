//! Native deposits and transfers on THORChain itself.
//!
//! A deposit moves coins from the signer into a module and then runs its
//! memo exactly as if the transaction had been observed on an external
//! chain, finalised in the same block.

use {
    super::{
        observed_tx::dispatch_inbound, process_one_tx_in, refund_tx, wrong_msg, HandlerFn,
        HandlerTable,
    },
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        events::Event,
        keeper::{is_module_account, ASGARD_NAME, BOND_NAME, RESERVE_NAME},
        managers::Managers,
        msgs::{Msg, MsgDeposit, MsgSend},
        types::{ObservedTx, ObservedTxVoter},
        versioned::VersionBranch,
    },
    log::*,
    thornode_common::{AccAddress, Address, Asset, Chain, Coin, Coins, PubKey, Tx, TxId},
    thornode_constants::ConstantName,
    thornode_memo::{parse_memo, TxType},
};

pub(super) static DEPOSIT: HandlerTable = HandlerTable {
    validate: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: validate_deposit_v1 as HandlerFn,
    }],
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_deposit_v1 as HandlerFn,
    }],
};

pub(super) static SEND: HandlerTable = HandlerTable {
    validate: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: validate_send_v1 as HandlerFn,
    }],
    handle: &[VersionBranch {
        since: (0, 1, 0),
        name: "v1",
        entrypoint: handle_send_v1 as HandlerFn,
    }],
};

fn deposit_msg(msg: &Msg) -> Result<&MsgDeposit> {
    match msg {
        Msg::Deposit(m) => Ok(m),
        _ => Err(wrong_msg(msg)),
    }
}

fn validate_deposit_v1(_ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = deposit_msg(msg)?;
    if let Some(coin) = msg.coins.iter().find(|c| !c.is_native()) {
        return Err(RuntimeError::UnknownRequest(format!("{} is not native", coin.asset)));
    }
    Ok(())
}

/// Take the native fee from `signer` into the reserve, provided it can
/// also cover `coins`.
fn charge_native_fee(ctx: &mut Context, signer: &AccAddress, coins: &Coins) -> Result<Coin> {
    let fee = Coin::new(Asset::rune(), ctx.config_uint(ConstantName::NativeTransactionFee)?);
    let mut total = coins.clone();
    total.add(&fee);
    if !ctx.keeper.has_coins(signer, &total)? {
        return Err(RuntimeError::UnknownRequest("insufficient funds".to_string()));
    }
    ctx.keeper
        .send_from_account_to_module(signer, RESERVE_NAME, &Coins::new(vec![fee.clone()]))?;
    Ok(fee)
}

/// Module that holds the coins a memo of `tx_type` deposits.
fn target_module(tx_type: TxType) -> &'static str {
    match tx_type {
        TxType::Bond | TxType::Unbond | TxType::Leave => BOND_NAME,
        TxType::Reserve | TxType::ThorName => RESERVE_NAME,
        _ => ASGARD_NAME,
    }
}

fn handle_deposit_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = deposit_msg(msg)?;
    if ctx.is_chain_halted(Chain::THOR)? {
        return Err(RuntimeError::UnknownRequest(
            "unable to deposit while THORChain is halted".to_string(),
        ));
    }
    let fee = charge_native_fee(ctx, &msg.signer, &msg.coins)?;

    let height = ctx.block_height();
    let tx_id = ctx.scope.tx_hash.clone().unwrap_or_else(|| {
        TxId::from_bytes(format!("{height}:{}:{}:{}", msg.signer, msg.coins, msg.memo).as_bytes())
    });
    if !ctx.keeper.get_observed_tx_in_voter(&tx_id)?.txs.is_empty() {
        return Err(RuntimeError::UnknownRequest(format!("txid: {tx_id} already exist")));
    }

    let tx_type = match parse_memo(ctx.version(), &ctx.keeper, &msg.memo) {
        Ok(memo) => {
            if memo.is_outbound() || memo.is_internal() {
                return Err(RuntimeError::UnknownRequest(
                    "cannot send inbound an outbound or internal transaction".to_string(),
                ));
            }
            memo.tx_type()
        }
        Err(_) => TxType::Unknown,
    };
    let module = target_module(tx_type);
    if !msg.coins.is_empty() {
        ctx.keeper
            .send_from_account_to_module(&msg.signer, module, &msg.coins)?;
    }

    let mut tx = Tx::new(
        tx_id.clone(),
        Address::new_unchecked(msg.signer.as_str()),
        Address::new_unchecked(module),
        msg.coins.clone(),
        Coins::new(vec![fee]),
        msg.memo.clone(),
    );
    tx.chain = Chain::THOR;
    let observed = ObservedTx::new(tx, height, PubKey::default(), height);
    let mut voter = ObservedTxVoter::new(tx_id.clone(), vec![observed.clone()]);
    voter.finalised_height = height;
    voter.tx = observed.clone();
    ctx.keeper.set_observed_tx_in_voter(&voter)?;

    let internal = match process_one_tx_in(ctx, &observed, &msg.signer) {
        Ok(internal) => internal,
        Err(err) => {
            info!("fail to process native inbound {}: {}", tx_id, err);
            if msg.coins.is_empty() {
                return Ok(());
            }
            return refund_tx(ctx, mgr, &observed, err.code(), &err.to_string(), module);
        }
    };
    dispatch_inbound(ctx, mgr, &observed, internal, true, module)
}

fn send_msg(msg: &Msg) -> Result<&MsgSend> {
    match msg {
        Msg::Send(m) => Ok(m),
        _ => Err(wrong_msg(msg)),
    }
}

fn validate_send_v1(_ctx: &mut Context, _mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = send_msg(msg)?;
    if is_module_account(&msg.to_address) {
        return Err(RuntimeError::UnknownRequest(
            "cannot send to a module, use a deposit instead".to_string(),
        ));
    }
    Ok(())
}

fn handle_send_v1(ctx: &mut Context, mgr: &Managers, msg: &Msg) -> Result<()> {
    let msg = send_msg(msg)?;
    debug!("send {} from {} to {}", msg.amount, msg.from_address, msg.to_address);
    if ctx.is_chain_halted(Chain::THOR)? {
        return Err(RuntimeError::UnknownRequest(
            "unable to send while THORChain is halted".to_string(),
        ));
    }
    charge_native_fee(ctx, &msg.from_address, &msg.amount)?;
    ctx.keeper
        .send_coins(&msg.from_address, &msg.to_address, &msg.amount)?;
    mgr.events.emit(
        ctx,
        Event::Send {
            from_address: msg.from_address.clone(),
            to_address: msg.to_address.clone(),
            coins: msg.amount.clone(),
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{handlers::external_handler, keeper::THORCHAIN_NAME, test_utils::*},
        assert_matches::assert_matches,
        thornode_common::{Uint, ONE},
    };

    const FEE: Uint = 2_000_000;

    fn fund(ctx: &mut Context, addr: &AccAddress, amount: Uint) {
        let coin = Coin::new(Asset::rune(), amount);
        ctx.keeper.mint_to_module(THORCHAIN_NAME, &coin, "test").unwrap();
        ctx.keeper
            .send_from_module_to_account(THORCHAIN_NAME, addr, &Coins::new(vec![coin]))
            .unwrap();
    }

    fn user() -> AccAddress {
        AccAddress::new("thoruser").unwrap()
    }

    fn deposit(ctx: &mut Context, mgr: &Managers, amount: Uint, memo: &str) -> Result<()> {
        let msg = Msg::Deposit(MsgDeposit {
            coins: Coins::new(vec![Coin::new(Asset::rune(), amount)]),
            memo: memo.to_string(),
            signer: user(),
        });
        external_handler(ctx, mgr, msg)
    }

    #[test]
    fn test_deposit_queues_swap() {
        let mut ctx = test_context(10);
        let mgr = Managers::default();
        let bnb = Chain::BNB.gas_asset();
        add_pool(&mut ctx, bnb, 100 * ONE, 100 * ONE);
        fund(&mut ctx, &user(), 20 * ONE);

        deposit(&mut ctx, &mgr, 10 * ONE, "=:BNB.BNB:bnb1destination").unwrap();

        let queue = ctx.keeper.get_swap_queue().unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].0.tx.chain, Chain::THOR);
        assert_eq!(
            ctx.keeper.get_balance(&user()).unwrap().amount_of(&Asset::rune()),
            10 * ONE - FEE
        );
        assert_eq!(ctx.keeper.get_rune_balance_of_module(ASGARD_NAME).unwrap(), 110 * ONE);
        assert_eq!(ctx.keeper.get_rune_balance_of_module(RESERVE_NAME).unwrap(), FEE);

        let voter = ctx.keeper.get_observed_tx_in_voter(&queue[0].0.tx.id).unwrap();
        assert_eq!(voter.finalised_height, 10);
    }

    #[test]
    fn test_deposit_refuses_outbound_memo() {
        let mut ctx = test_context(10);
        let mgr = Managers::default();
        fund(&mut ctx, &user(), 20 * ONE);
        let memo = format!("OUT:{}", TxId::from_bytes(b"inbound"));
        assert_matches!(
            deposit(&mut ctx, &mgr, ONE, &memo),
            Err(RuntimeError::UnknownRequest(_))
        );
        // nothing was charged
        assert_eq!(
            ctx.keeper.get_balance(&user()).unwrap().amount_of(&Asset::rune()),
            20 * ONE
        );
    }

    #[test]
    fn test_deposit_needs_funds() {
        let mut ctx = test_context(10);
        let mgr = Managers::default();
        fund(&mut ctx, &user(), ONE);
        assert_matches!(
            deposit(&mut ctx, &mgr, ONE, "=:BNB.BNB:bnb1destination"),
            Err(RuntimeError::UnknownRequest(_))
        );
    }

    #[test]
    fn test_bad_memo_is_refunded() {
        let mut ctx = test_context(10);
        let mgr = Managers::default();
        fund(&mut ctx, &user(), 20 * ONE);
        deposit(&mut ctx, &mgr, 10 * ONE, "nonsense").unwrap();
        assert!(ctx
            .keeper
            .store()
            .events()
            .iter()
            .any(|e| matches!(e, Event::Refund { .. })));
    }

    #[test]
    fn test_send() {
        let mut ctx = test_context(10);
        let mgr = Managers::default();
        fund(&mut ctx, &user(), 20 * ONE);
        let to = AccAddress::new("thorfriend").unwrap();
        let send = |to: AccAddress| {
            Msg::Send(MsgSend {
                from_address: user(),
                to_address: to,
                amount: Coins::new(vec![Coin::new(Asset::rune(), 5 * ONE)]),
            })
        };
        external_handler(&mut ctx, &mgr, send(to.clone())).unwrap();
        assert_eq!(
            ctx.keeper.get_balance(&to).unwrap().amount_of(&Asset::rune()),
            5 * ONE
        );
        assert_eq!(
            ctx.keeper.get_balance(&user()).unwrap().amount_of(&Asset::rune()),
            15 * ONE - FEE
        );

        let module = AccAddress::new_unchecked(RESERVE_NAME);
        assert_matches!(
            external_handler(&mut ctx, &mgr, send(module)),
            Err(RuntimeError::UnknownRequest(_))
        );
    }
}
