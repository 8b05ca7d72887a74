//! Per-block execution context handed to every handler and manager.

use {
    crate::{
        error::Result,
        events::Event,
        keeper::Keeper,
    },
    log::*,
    semver::Version,
    thornode_common::{Address, Asset, Chain, TxId, Uint},
    thornode_constants::{get_constant_values, ConstantName, ConstantValues},
    thornode_memo::MemoLookup,
};

/// Values scoped to a single message, threaded explicitly from the handler
/// that sets them to the code that reads them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallScope {
    /// Inbound of the loan being opened or repaid.
    pub loan_tx_id: Option<TxId>,
    /// Destination the outbound of the current message is bound for.
    pub to_address: Option<Address>,
    /// Hash of the native transaction carrying the message.
    pub tx_hash: Option<TxId>,
}

#[derive(Debug)]
pub struct Context {
    pub keeper: Keeper,
    block_height: i64,
    version: Version,
    constants: ConstantValues,
    pub scope: CallScope,
}

impl Context {
    pub fn new(keeper: Keeper, block_height: i64, version: Version) -> Self {
        let constants = get_constant_values(&version);
        Self {
            keeper,
            block_height,
            version,
            constants,
            scope: CallScope::default(),
        }
    }

    pub fn block_height(&self) -> i64 {
        self.block_height
    }

    pub fn set_block_height(&mut self, height: i64) {
        self.block_height = height;
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Switch to `version`, reselecting the constant defaults.
    pub fn set_version(&mut self, version: Version) {
        if version != self.version {
            info!("switching from version {} to {}", self.version, version);
            self.constants = get_constant_values(&version);
            self.version = version;
        }
    }

    pub fn constants(&self) -> &ConstantValues {
        &self.constants
    }

    /// Governance override of `key`. Negative values count as unset.
    pub fn mimir(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.keeper.get_mimir(key)?.filter(|v| *v >= 0))
    }

    /// Effective value of `name`: the governance override when set, else
    /// the constant in force for the active version.
    pub fn config_i64(&self, name: ConstantName) -> Result<i64> {
        match self.mimir(&name.to_string())? {
            Some(value) => Ok(value),
            None => Ok(self.constants.get_int64_value(name)),
        }
    }

    pub fn config_uint(&self, name: ConstantName) -> Result<Uint> {
        Ok(self.config_i64(name)?.max(0) as Uint)
    }

    pub fn emit(&mut self, event: Event) {
        self.keeper.emit(event);
    }

    /// Run `f` against a cache layer. The layer is committed when `f`
    /// succeeds and dropped when it fails.
    pub fn with_cache<T>(&mut self, f: impl FnOnce(&mut Context) -> Result<T>) -> Result<T> {
        self.keeper.store_mut().cache();
        let scope = self.scope.clone();
        let result = f(self);
        self.scope = scope;
        match result {
            Ok(value) => {
                self.keeper.store_mut().commit();
                Ok(value)
            }
            Err(err) => {
                self.keeper.store_mut().discard();
                Err(err)
            }
        }
    }

    /// Whether any halt governs `chain`: chain halt, node pause, solvency
    /// halt, or a height based halt already reached.
    pub fn is_chain_halted(&self, chain: Chain) -> Result<bool> {
        let height = self.block_height;
        let reached = |v: Option<i64>| v.map(|v| v > 0 && v <= height).unwrap_or_default();
        if reached(self.mimir("HaltChainGlobal")?) || reached(self.mimir(&chain.halt_key())?) {
            return Ok(true);
        }
        if reached(self.mimir(&chain.solvency_halt_key())?) {
            return Ok(true);
        }
        Ok(self
            .mimir("NodePauseChainGlobal")?
            .map(|v| v > height)
            .unwrap_or_default())
    }

    pub fn is_trading_halted(&self, chain: Chain) -> Result<bool> {
        let height = self.block_height;
        let reached = |v: Option<i64>| v.map(|v| v > 0 && v <= height).unwrap_or_default();
        Ok(reached(self.mimir("HaltTrading")?)
            || reached(self.mimir(&chain.halt_trading_key())?)
            || self.is_chain_halted(chain)?)
    }

    pub fn is_signing_halted(&self, chain: Chain) -> Result<bool> {
        let height = self.block_height;
        Ok(self
            .mimir(&chain.halt_signing_key())?
            .map(|v| v > 0 && v <= height)
            .unwrap_or_default())
    }
}

impl MemoLookup for Keeper {
    fn thorname_alias(&self, name: &str, chain: Chain) -> Option<Address> {
        match self.get_thorname(name) {
            Ok(Some(tn)) => tn.get_alias(chain).cloned(),
            Ok(None) => None,
            Err(err) => {
                warn!("fail to read thorname {}: {}", name, err);
                None
            }
        }
    }

    fn mimir(&self, key: &str) -> Option<i64> {
        self.get_mimir(key).ok().flatten().filter(|v| *v >= 0)
    }

    fn pool_depths(&self) -> Vec<(Asset, Uint)> {
        match self.get_pools() {
            Ok(pools) => pools.into_iter().map(|p| (p.asset, p.balance_rune)).collect(),
            Err(err) => {
                warn!("fail to read pools: {}", err);
                Vec::new()
            }
        }
    }
}
