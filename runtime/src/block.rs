//! Block driver: begin block, deliver native transactions, end block.

use {
    crate::{
        ante::AnteDecorator,
        context::Context,
        error::Result,
        events::Event,
        handlers::external_handler,
        keeper::Keeper,
        managers::Managers,
        msgs::NativeTx,
    },
    log::*,
    semver::Version,
};

/// Owns the state of the chain and the managers that act on it.
#[derive(Debug)]
pub struct Engine {
    pub ctx: Context,
    pub mgr: Managers,
    ante: AnteDecorator,
}

impl Engine {
    pub fn new(keeper: Keeper, height: i64, version: Version) -> Self {
        Self::new_with_managers(keeper, height, version, Managers::default())
    }

    pub fn new_with_managers(keeper: Keeper, height: i64, version: Version, mgr: Managers) -> Self {
        Self {
            ctx: Context::new(keeper, height, version),
            mgr,
            ante: AnteDecorator,
        }
    }

    /// Move to `height`, adopt the version every active node runs, then let
    /// the managers act. A failing manager is logged and skipped.
    pub fn begin_block(&mut self, height: i64) -> Result<()> {
        debug!("begin block {}", height);
        self.ctx.set_block_height(height);
        self.update_version()?;

        let (ctx, mgr) = (&mut self.ctx, &self.mgr);
        if let Err(err) = mgr.gas.begin_block(ctx) {
            error!("fail to begin block on gas manager: {}", err);
        }
        if let Err(err) = mgr.slasher.begin_block(ctx, mgr) {
            error!("fail to begin block on slasher: {}", err);
        }
        if let Err(err) = mgr.validators.begin_block(ctx, mgr) {
            error!("fail to begin block on validator manager: {}", err);
        }
        Ok(())
    }

    /// Run `tx` through the ante and then each of its messages. The messages
    /// of one transaction succeed or fail together.
    pub fn deliver_tx(&mut self, tx: &NativeTx) -> Result<()> {
        self.ante.ante_handle(&self.ctx, tx, false)?;
        let mgr = &self.mgr;
        let hash = tx.hash.clone();
        self.ctx.with_cache(|ctx| {
            ctx.scope.tx_hash = Some(hash);
            for msg in tx.msgs.iter() {
                external_handler(ctx, mgr, msg.clone())?;
            }
            Ok(())
        })
    }

    /// Check `tx` without running it.
    pub fn check_tx(&self, tx: &NativeTx) -> Result<()> {
        self.ante.ante_handle(&self.ctx, tx, true)?;
        for msg in tx.msgs.iter() {
            msg.validate_basic()?;
        }
        Ok(())
    }

    /// Close the block and hand back every event it produced.
    pub fn end_block(&mut self) -> Vec<Event> {
        let (ctx, mgr) = (&mut self.ctx, &self.mgr);
        if let Err(err) = mgr.swap_queue.end_block(ctx, mgr) {
            error!("fail to process swap queue: {}", err);
        }
        if let Err(err) = mgr.network.end_block(ctx, mgr) {
            error!("fail to end block for network manager: {}", err);
        }
        if let Err(err) = mgr.validators.end_block(ctx, mgr) {
            error!("fail to end block for validator manager: {}", err);
        }
        if let Err(err) = mgr.ygg.fund(ctx, mgr) {
            error!("fail to fund yggdrasil: {}", err);
        }
        if let Err(err) = mgr.tx_out_store.end_block(ctx, mgr) {
            error!("fail to process txout end block: {}", err);
        }
        if let Err(err) = mgr.gas.end_block(ctx, mgr) {
            error!("fail to end block for gas manager: {}", err);
        }
        let events = ctx.keeper.store_mut().take_events();
        debug!("end block {} with {} events", ctx.block_height(), events.len());
        events
    }

    /// Raise the network version to the lowest one the active set runs.
    fn update_version(&mut self) -> Result<()> {
        let Some(lowest) = lowest_active_version(&self.ctx.keeper)? else {
            return Ok(());
        };
        let stored = self.ctx.keeper.get_version()?;
        if stored.as_ref().map(|v| lowest > *v).unwrap_or(true) {
            self.ctx.keeper.set_version(&lowest)?;
        }
        let version = self.ctx.keeper.get_version()?.unwrap_or(lowest);
        if version > *self.ctx.version() {
            self.ctx.set_version(version);
        }
        Ok(())
    }
}

/// Lowest software version among active nodes.
pub fn lowest_active_version(keeper: &Keeper) -> Result<Option<Version>> {
    Ok(keeper
        .list_active_validators()?
        .iter()
        .map(|n| n.get_version())
        .min())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            error::RuntimeError,
            keeper::RESERVE_NAME,
            msgs::{Msg, MsgDeposit, MsgMimir},
            test_utils::*,
        },
        assert_matches::assert_matches,
        thornode_common::{AccAddress, Asset, Coin, Coins, TxId, ONE},
    };

    fn engine() -> Engine {
        setup_logger();
        Engine::new(Keeper::default(), 1, test_version())
    }

    fn fund(ctx: &mut Context, addr: &AccAddress, amount: u128) {
        let coin = Coin::new(Asset::rune(), amount);
        ctx.keeper.mint_to_module(RESERVE_NAME, &coin, "test").unwrap();
        ctx.keeper
            .send_from_module_to_account(RESERVE_NAME, addr, &Coins::new(vec![coin]))
            .unwrap();
    }

    #[test]
    fn test_version_follows_active_set() {
        let mut engine = engine();
        let mut nodes = add_active_nodes(&mut engine.ctx, 3);
        nodes[0].version = "1.112.0".to_string();
        nodes[1].version = "1.112.0".to_string();
        nodes[2].version = "1.113.0".to_string();
        for node in nodes.iter() {
            engine.ctx.keeper.set_node_account(node).unwrap();
        }
        engine.begin_block(2).unwrap();
        assert_eq!(engine.ctx.version(), &Version::new(1, 112, 0));
        assert_eq!(
            engine.ctx.keeper.get_version().unwrap(),
            Some(Version::new(1, 112, 0))
        );
        assert_eq!(engine.ctx.block_height(), 2);
    }

    #[test]
    fn test_deliver_tx_is_atomic() {
        let mut engine = engine();
        add_active_nodes(&mut engine.ctx, 4);
        let user = AccAddress::new("thoruser").unwrap();
        fund(&mut engine.ctx, &user, 10 * ONE);

        let deposit = Msg::Deposit(MsgDeposit {
            coins: Coins::new(vec![Coin::new(Asset::rune(), ONE)]),
            memo: "RESERVE".to_string(),
            signer: user.clone(),
        });
        // the second message is signed by someone who may not vote
        let bad_mimir = Msg::Mimir(MsgMimir {
            key: "ChurnInterval".to_string(),
            value: 5,
            signer: user.clone(),
        });
        let tx = NativeTx::new(TxId::from_bytes(b"tx1"), vec![deposit.clone(), bad_mimir]);
        assert!(engine.deliver_tx(&tx).is_err());
        assert_eq!(
            engine.ctx.keeper.get_balance(&user).unwrap().amount_of(&Asset::rune()),
            10 * ONE
        );

        let tx = NativeTx::new(TxId::from_bytes(b"tx2"), vec![deposit]);
        engine.deliver_tx(&tx).unwrap();
        let events = engine.end_block();
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::ReserveContribution { .. })));
        assert!(engine.ctx.keeper.store().events().is_empty());
    }

    #[test]
    fn test_check_tx_runs_ante() {
        let engine = engine();
        let deposit = |memo: &str| {
            Msg::Deposit(MsgDeposit {
                coins: Coins::new(vec![Coin::new(Asset::rune(), ONE)]),
                memo: memo.to_string(),
                signer: AccAddress::new("thoruser").unwrap(),
            })
        };
        let tx = NativeTx::new(TxId::from_bytes(b"tx"), vec![deposit("RESERVE"), deposit("RESERVE")]);
        assert_matches!(engine.check_tx(&tx), Err(RuntimeError::UnknownRequest(_)));
        let tx = NativeTx::new(TxId::from_bytes(b"tx"), vec![deposit("RESERVE")]);
        engine.check_tx(&tx).unwrap();
    }
}
