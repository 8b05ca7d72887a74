//! Typed access to everything the engine persists.
//!
//! Records are bincode encoded under flat string keys of the form
//! `<prefix>//<id>`. Every accessor goes through [`Keeper::get_record`] and
//! [`Keeper::set_record`], so no handler touches raw bytes.

mod bank;
mod chain;
mod node;
mod pool;
mod tx;
mod vault;

pub use bank::{is_module_account, ASGARD_NAME, BOND_NAME, RESERVE_NAME, THORCHAIN_NAME};

use {
    crate::{
        error::{Result, RuntimeError},
        events::Event,
        store::KvStore,
    },
    serde::{de::DeserializeOwned, Serialize},
};

pub(crate) mod prefix {
    pub const POOL: &str = "pool";
    pub const VAULT: &str = "vault";
    pub const LIQUIDITY_PROVIDER: &str = "lp";
    pub const LOAN: &str = "loan";
    pub const OBSERVED_TX_IN: &str = "observedTxIn";
    pub const OBSERVED_TX_OUT: &str = "observedTxOut";
    pub const TX_OUT: &str = "txOut";
    pub const DANGLING_ACTIONS: &str = "danglingactions";
    pub const MIMIR: &str = "mimir";
    pub const NODE_MIMIR: &str = "nodemimir";
    pub const NODE_ACCOUNT: &str = "node";
    pub const NODE_JAIL: &str = "nodejail";
    pub const NETWORK_FEE: &str = "networkfee";
    pub const NETWORK_FEE_VOTER: &str = "networkfeevoter";
    pub const KEYGEN_BLOCK: &str = "keygenblock";
    pub const RAGNAROK_BLOCK: &str = "ragnarokblock";
    pub const RAGNAROK_NTH: &str = "ragnaroknth";
    pub const RAGNAROK_PENDING: &str = "ragnarokpending";
    pub const RAGNAROK_POSITION: &str = "ragnarokposition";
    pub const VERSION: &str = "version";
    pub const MIN_JOIN_VERSION: &str = "minjoinversion";
    pub const NODE_PAUSE_CHAIN: &str = "nodepausechain";
    pub const SLASH_POINTS: &str = "slashpoints";
    pub const LAST_OBSERVE: &str = "lastobserve";
    pub const LAST_SIGN: &str = "lastsign";
    pub const LAST_CHURN: &str = "lastchurn";
    pub const TSS: &str = "tss";
    pub const TSS_KEYSIGN: &str = "tsskeysign";
    pub const TSS_METRIC: &str = "tssmetric";
    pub const ERRATA: &str = "errata";
    pub const SOLVENCY: &str = "solvency";
    pub const BAN: &str = "ban";
    pub const BOND_PROVIDERS: &str = "bondproviders";
    pub const THORNAME: &str = "thorname";
    pub const SWAP_QUEUE: &str = "swapqueue";
    pub const ORDER_BOOK: &str = "orderbook";
    pub const MODULE: &str = "module";
    pub const BALANCE: &str = "balance";
    pub const NETWORK: &str = "network";
    pub const CHAIN_CONTRACT: &str = "chaincontract";
    pub const PENDING_YGG_FUND: &str = "pendingyggfund";
    pub const TOTAL_COLLATERAL: &str = "totalcollateral";
    pub const SUPPLY: &str = "supply";
    pub const GAS: &str = "gas";
    pub const OUTBOUND_FEE_SPENT: &str = "outboundfeespent";
    pub const OUTBOUND_FEE_WITHHELD: &str = "outboundfeewithheld";
    pub const RESERVE_CONTRIBUTORS: &str = "reservecontributors";
}

pub(crate) fn key(prefix: &str, id: impl std::fmt::Display) -> String {
    format!("{prefix}//{id}")
}

#[derive(Debug, Default)]
pub struct Keeper {
    store: KvStore,
}

impl Keeper {
    pub fn new(store: KvStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut KvStore {
        &mut self.store
    }

    pub fn emit(&mut self, event: Event) {
        self.store.emit(event);
    }

    pub(crate) fn get_record<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key.as_bytes()) {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|err| RuntimeError::internal(format!("fail to decode {key}"), err.to_string())),
            None => Ok(None),
        }
    }

    pub(crate) fn set_record<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let bytes = bincode::serialize(value)
            .map_err(|err| RuntimeError::internal(format!("fail to encode {key}"), err.to_string()))?;
        self.store.set(key.as_bytes().to_vec(), bytes);
        Ok(())
    }

    pub(crate) fn has_record(&self, key: &str) -> bool {
        self.store.has(key.as_bytes())
    }

    pub(crate) fn delete_record(&mut self, key: &str) {
        self.store.delete(key.as_bytes());
    }

    /// Decode every record under `prefix//`, in key order.
    pub(crate) fn records<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        self.store
            .iter_prefix(format!("{prefix}//").as_bytes())
            .into_iter()
            .map(|(k, v)| {
                bincode::deserialize(&v).map_err(|err| {
                    RuntimeError::internal(
                        format!("fail to decode {}", String::from_utf8_lossy(&k)),
                        err.to_string(),
                    )
                })
            })
            .collect()
    }

    /// Keys under `prefix//` with the prefix stripped, in key order.
    pub(crate) fn record_ids(&self, prefix: &str) -> Vec<String> {
        let full = format!("{prefix}//");
        self.store
            .iter_prefix(full.as_bytes())
            .into_iter()
            .map(|(k, _)| String::from_utf8_lossy(&k[full.len()..]).into_owned())
            .collect()
    }

    pub(crate) fn get_i64(&self, key: &str) -> Result<i64> {
        Ok(self.get_record(key)?.unwrap_or_default())
    }

    pub(crate) fn set_i64(&mut self, key: &str, value: i64) -> Result<()> {
        self.set_record(key, &value)
    }
}
