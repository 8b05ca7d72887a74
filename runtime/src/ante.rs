//! Checks a native transaction must pass before any of its messages is
//! dispatched. The ante only reads state; it never moves funds.

use {
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        msgs::{Msg, MsgDeposit, NativeTx},
    },
    log::*,
    semver::Version,
    thornode_common::{AccAddress, Asset},
    thornode_constants::ConstantName,
    thornode_memo::{parse_memo, Memo},
};

/// Versions before this one dispatch without message-specific checks.
const ANTE_SINCE: Version = Version::new(1, 106, 0);

#[derive(Debug, Default)]
pub struct AnteDecorator;

impl AnteDecorator {
    /// Reject `tx` when any of its messages would be refused. Nothing is
    /// written either way, so `simulate` only changes logging.
    pub fn ante_handle(&self, ctx: &Context, tx: &NativeTx, simulate: bool) -> Result<()> {
        if ctx.version() < &ANTE_SINCE {
            return Ok(());
        }
        reject_multiple_deposits(&tx.msgs)?;
        for msg in tx.msgs.iter() {
            if let Err(err) = ante_message(ctx, msg) {
                if !simulate {
                    debug!("ante rejected {} in {}: {}", msg.msg_type(), tx.hash, err);
                }
                return Err(err);
            }
        }
        Ok(())
    }
}

fn reject_multiple_deposits(msgs: &[Msg]) -> Result<()> {
    if msgs.iter().filter(|m| matches!(m, Msg::Deposit(_))).count() > 1 {
        return Err(RuntimeError::UnknownRequest(
            "only one deposit msg per tx".to_string(),
        ));
    }
    Ok(())
}

fn ante_message(ctx: &Context, msg: &Msg) -> Result<()> {
    match msg {
        Msg::SetVersion(m) => require_bonded_node(ctx, &m.signer),
        Msg::SetIpAddress(m) => require_bonded_node(ctx, &m.signer),
        Msg::NodePauseChain(m) => require_bonded_node(ctx, &m.signer),
        Msg::SetNodeKeys(m) => require_bonded_node(ctx, &m.signer),
        Msg::Deposit(m) => deposit_ante(ctx, m),
        Msg::ObservedTxIn(_)
        | Msg::ObservedTxOut(_)
        | Msg::TssPool(_)
        | Msg::TssKeysignFail(_)
        | Msg::ErrataTx(_)
        | Msg::Solvency(_)
        | Msg::Ban(_)
        | Msg::NetworkFee(_)
        | Msg::Mimir(_)
        | Msg::Send(_) => Ok(()),
        _ => Err(RuntimeError::UnknownRequest(format!(
            "invalid message type {}",
            msg.msg_type()
        ))),
    }
}

/// The signer must be a node whose bond can pay the native fee the
/// handler charges.
fn require_bonded_node(ctx: &Context, signer: &AccAddress) -> Result<()> {
    let Some(node) = ctx.keeper.get_node_account(signer)? else {
        return Err(RuntimeError::Unauthorized(format!("{signer} is not a node account")));
    };
    let fee = ctx.config_uint(ConstantName::NativeTransactionFee)?;
    if node.bond < fee {
        return Err(RuntimeError::Unauthorized(format!(
            "node {signer} bond {} cannot cover fee {fee}",
            node.bond
        )));
    }
    Ok(())
}

fn deposit_ante(ctx: &Context, msg: &MsgDeposit) -> Result<()> {
    if let Some(coin) = msg.coins.iter().find(|c| !c.is_native()) {
        return Err(RuntimeError::UnknownRequest(format!(
            "deposit coin {} is not native",
            coin.asset
        )));
    }
    // a new name must be affordable before the deposit is attempted
    if let Ok(Memo::ManageThorName(m)) = parse_memo(ctx.version(), &ctx.keeper, &msg.memo) {
        if ctx.keeper.get_thorname(&m.name)?.is_none() {
            let fee = ctx.config_uint(ConstantName::TNSRegisterFee)?;
            let balance = ctx.keeper.get_balance(&msg.signer)?.amount_of(&Asset::rune());
            if balance == 0 || balance < fee {
                return Err(RuntimeError::UnknownRequest(format!(
                    "balance {balance} cannot cover thorname registration fee {fee}"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            keeper::RESERVE_NAME,
            msgs::{MsgLeave, MsgSetVersion},
            test_utils::*,
            types::NodeStatus,
        },
        assert_matches::assert_matches,
        thornode_common::{Chain, Coin, Coins, Tx, TxId, ONE},
    };

    fn native(msgs: Vec<Msg>) -> NativeTx {
        NativeTx::new(TxId::from_bytes(b"native"), msgs)
    }

    fn deposit(coin: Coin, memo: &str) -> Msg {
        Msg::Deposit(MsgDeposit {
            coins: Coins::new(vec![coin]),
            memo: memo.to_string(),
            signer: AccAddress::new("thoruser").unwrap(),
        })
    }

    fn set_version(signer: AccAddress) -> Msg {
        Msg::SetVersion(MsgSetVersion {
            version: "1.111.0".to_string(),
            signer,
        })
    }

    #[test]
    fn test_single_deposit_per_tx() {
        let ctx = test_context(10);
        let ante = AnteDecorator;
        let rune = Coin::new(Asset::rune(), ONE);
        ante.ante_handle(&ctx, &native(vec![deposit(rune.clone(), "RESERVE")]), false)
            .unwrap();
        assert_matches!(
            ante.ante_handle(
                &ctx,
                &native(vec![deposit(rune.clone(), "RESERVE"), deposit(rune, "RESERVE")]),
                false
            ),
            Err(RuntimeError::UnknownRequest(_))
        );
    }

    #[test]
    fn test_deposit_needs_native_coins() {
        let ctx = test_context(10);
        let msg = deposit(Coin::new(Chain::BTC.gas_asset(), ONE), "=:THOR.RUNE");
        assert_matches!(
            AnteDecorator.ante_handle(&ctx, &native(vec![msg]), false),
            Err(RuntimeError::UnknownRequest(_))
        );
    }

    #[test]
    fn test_thorname_deposit_needs_fee_in_balance() {
        let mut ctx = test_context(10);
        let msg = deposit(Coin::new(Asset::rune(), ONE), "~:alice:THOR:thoruser");
        assert_matches!(
            AnteDecorator.ante_handle(&ctx, &native(vec![msg.clone()]), false),
            Err(RuntimeError::UnknownRequest(_))
        );

        ctx.keeper
            .mint_to_module(RESERVE_NAME, &Coin::new(Asset::rune(), 20 * ONE), "test")
            .unwrap();
        ctx.keeper
            .send_from_module_to_account(
                RESERVE_NAME,
                &AccAddress::new("thoruser").unwrap(),
                &Coins::new(vec![Coin::new(Asset::rune(), 20 * ONE)]),
            )
            .unwrap();
        AnteDecorator
            .ante_handle(&ctx, &native(vec![msg]), false)
            .unwrap();
    }

    #[test]
    fn test_node_messages_need_bonded_signer() {
        let mut ctx = test_context(10);
        assert_matches!(
            AnteDecorator.ante_handle(&ctx, &native(vec![set_version(node_address(0))]), false),
            Err(RuntimeError::Unauthorized(_))
        );

        ctx.keeper
            .set_node_account(&node_account(0, NodeStatus::Whitelisted, 1_000))
            .unwrap();
        assert_matches!(
            AnteDecorator.ante_handle(&ctx, &native(vec![set_version(node_address(0))]), false),
            Err(RuntimeError::Unauthorized(_))
        );

        ctx.keeper
            .set_node_account(&node_account(0, NodeStatus::Standby, ONE))
            .unwrap();
        AnteDecorator
            .ante_handle(&ctx, &native(vec![set_version(node_address(0))]), false)
            .unwrap();
    }

    #[test]
    fn test_internal_messages_rejected() {
        let ctx = test_context(10);
        let msg = Msg::Leave(MsgLeave {
            tx: Tx::default(),
            node_address: node_address(0),
            signer: node_address(0),
        });
        assert_matches!(
            AnteDecorator.ante_handle(&ctx, &native(vec![msg]), true),
            Err(RuntimeError::UnknownRequest(_))
        );
    }

    #[test]
    fn test_old_versions_skip_checks() {
        let mut ctx = test_context(10);
        ctx.set_version(Version::new(1, 105, 0));
        let rune = Coin::new(Asset::rune(), ONE);
        AnteDecorator
            .ante_handle(
                &ctx,
                &native(vec![deposit(rune.clone(), "RESERVE"), deposit(rune, "RESERVE")]),
                false,
            )
            .unwrap();
    }
}
