//! Read-only views of the state, rendered as JSON.

use {
    crate::{
        context::Context,
        error::{Result, RuntimeError},
        invariants,
        types::{VaultStatus, VaultType},
    },
    serde::Serialize,
    serde_json::{json, Value},
    thornode_common::{AccAddress, Address, Asset, PubKey, TxId},
    thornode_constants::ConstantName,
};

/// Everything the querier answers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Query {
    Pool(Asset),
    Pools,
    Vault(PubKey),
    AsgardVaults,
    YggdrasilVaults,
    Node(AccAddress),
    Nodes,
    TxInVoter(TxId),
    TxOutVoter(TxId),
    TxOut(i64),
    Queue,
    Mimir,
    MimirKey(String),
    Constants,
    Ragnarok,
    Network,
    Version,
    LiquidityProvider(Asset, Address),
    Loan(Asset, Address),
    ThorName(String),
    Invariants,
    Invariant(String),
}

impl Query {
    /// Parse a `/`-separated route such as `pool/BTC.BTC` or
    /// `tx/voter/<hash>`.
    pub fn from_path(path: &str) -> Result<Self> {
        let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
        let unknown = || RuntimeError::UnknownRequest(format!("unknown query path {path}"));
        let query = match parts.as_slice() {
            ["pool", asset] => Query::Pool(Asset::parse(asset)?),
            ["pools"] => Query::Pools,
            ["vault", pk] => Query::Vault(PubKey::new(pk)?),
            ["vaults", "asgard"] => Query::AsgardVaults,
            ["vaults", "yggdrasil"] => Query::YggdrasilVaults,
            ["node", addr] => Query::Node(AccAddress::new(addr)?),
            ["nodes"] => Query::Nodes,
            ["tx", "voter", hash] => Query::TxInVoter(TxId::new(hash)?),
            ["outbound", "voter", hash] => Query::TxOutVoter(TxId::new(hash)?),
            ["keysign", height] => Query::TxOut(height.parse().map_err(|_| unknown())?),
            ["queue"] => Query::Queue,
            ["mimir"] => Query::Mimir,
            ["mimir", "key", key] => Query::MimirKey(key.to_string()),
            ["constants"] => Query::Constants,
            ["ragnarok"] => Query::Ragnarok,
            ["network"] => Query::Network,
            ["version"] => Query::Version,
            ["pool", asset, "liquidity_provider", addr] => {
                Query::LiquidityProvider(Asset::parse(asset)?, Address::new_unchecked(*addr))
            }
            ["pool", asset, "borrower", addr] => {
                Query::Loan(Asset::parse(asset)?, Address::new_unchecked(*addr))
            }
            ["thorname", name] => Query::ThorName(name.to_string()),
            ["invariants"] => Query::Invariants,
            ["invariant", name] => Query::Invariant(name.to_string()),
            _ => return Err(unknown()),
        };
        Ok(query)
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|err| RuntimeError::Store(err.to_string()))
}

fn not_found(what: impl std::fmt::Display) -> RuntimeError {
    RuntimeError::UnknownRequest(format!("{what} not found"))
}

pub fn query(ctx: &Context, query: &Query) -> Result<Value> {
    let keeper = &ctx.keeper;
    match query {
        Query::Pool(asset) => {
            if !keeper.pool_exists(asset) {
                return Err(not_found(format!("pool {asset}")));
            }
            to_json(&keeper.get_pool(asset)?)
        }
        Query::Pools => to_json(&keeper.get_pools()?),
        Query::Vault(pk) => {
            if !keeper.vault_exists(pk) {
                return Err(not_found(format!("vault {pk}")));
            }
            to_json(&keeper.get_vault(pk)?)
        }
        Query::AsgardVaults => {
            let vaults: Vec<_> = keeper
                .get_asgard_vaults()?
                .into_iter()
                .filter(|v| matches!(v.status, VaultStatus::Active | VaultStatus::Retiring))
                .collect();
            to_json(&vaults)
        }
        Query::YggdrasilVaults => {
            let vaults: Vec<_> = keeper
                .get_vaults()?
                .into_iter()
                .filter(|v| v.vault_type == VaultType::Yggdrasil && v.has_funds())
                .collect();
            to_json(&vaults)
        }
        Query::Node(addr) => {
            let node = keeper
                .get_node_account(addr)?
                .ok_or_else(|| not_found(format!("node {addr}")))?;
            Ok(json!({
                "node": to_json(&node)?,
                "jail": to_json(&keeper.get_node_account_jail(addr)?)?,
                "slash_points": keeper.get_node_account_slash_points(addr)?,
                "bond_providers": to_json(&keeper.get_bond_providers(addr)?)?,
            }))
        }
        Query::Nodes => to_json(&keeper.list_node_accounts()?),
        Query::TxInVoter(id) => to_json(&keeper.get_observed_tx_in_voter(id)?),
        Query::TxOutVoter(id) => to_json(&keeper.get_observed_tx_out_voter(id)?),
        Query::TxOut(height) => to_json(&keeper.get_tx_out(*height)?),
        Query::Queue => {
            let height = ctx.block_height();
            let period = ctx.config_i64(ConstantName::SigningTransactionPeriod)?;
            let mut outbound = 0usize;
            let mut scheduled = 0usize;
            for h in (height - period).max(1)..=height {
                outbound += keeper
                    .get_tx_out(h)?
                    .tx_array
                    .iter()
                    .filter(|item| item.out_hash.is_empty())
                    .count();
            }
            let max_offset = ctx.config_i64(ConstantName::MaxTxOutOffset)?;
            for h in height + 1..=height + max_offset.max(0) {
                scheduled += keeper.get_tx_out(h)?.tx_array.len();
            }
            Ok(json!({
                "swap": keeper.get_swap_queue()?.len(),
                "outbound": outbound,
                "scheduled_outbound": scheduled,
            }))
        }
        Query::Mimir => to_json(&keeper.get_mimirs()?),
        Query::MimirKey(key) => Ok(json!(keeper.get_mimir(key)?.unwrap_or(-1))),
        Query::Constants => {
            let values: std::collections::BTreeMap<String, i64> = ctx
                .constants()
                .int64_values()
                .map(|(name, value)| (name.to_string(), value))
                .collect();
            Ok(json!({
                "int_64_values": values,
                "version": ctx.version().to_string(),
            }))
        }
        Query::Ragnarok => Ok(json!(keeper.ragnarok_in_progress()?)),
        Query::Network => to_json(&keeper.get_network()?),
        Query::Version => Ok(json!({
            "current": keeper
                .get_version()?
                .unwrap_or_else(|| ctx.version().clone())
                .to_string(),
            "minimum_join": keeper.get_min_join_version()?.map(|v| v.to_string()),
        })),
        Query::LiquidityProvider(asset, addr) => {
            if !keeper.liquidity_provider_exists(asset, addr) {
                return Err(not_found(format!("liquidity provider {addr} of {asset}")));
            }
            to_json(&keeper.get_liquidity_provider(asset, addr)?)
        }
        Query::Loan(asset, addr) => to_json(&keeper.get_loan(asset, addr)?),
        Query::ThorName(name) => {
            let name = keeper
                .get_thorname(name)?
                .filter(|n| !n.is_expired(ctx.block_height()))
                .ok_or_else(|| not_found(format!("thorname {name}")))?;
            to_json(&name)
        }
        Query::Invariants => {
            let names: Vec<&str> = invariants::ROUTES.iter().map(|(name, _)| *name).collect();
            Ok(json!({ "invariants": names }))
        }
        Query::Invariant(name) => {
            let (_, result) = invariants::run_all(ctx)
                .into_iter()
                .find(|(n, _)| *n == name.as_str())
                .ok_or_else(|| not_found(format!("invariant {name}")))?;
            Ok(json!({
                "invariant": name,
                "broken": result.0,
                "msg": result.1,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{test_utils::*, types::NodeStatus},
        assert_matches::assert_matches,
        test_case::test_case,
        thornode_common::{Chain, ONE},
    };

    #[test_case("pools", Query::Pools)]
    #[test_case("/nodes/", Query::Nodes)]
    #[test_case("vaults/asgard", Query::AsgardVaults)]
    #[test_case("keysign/12", Query::TxOut(12))]
    #[test_case("mimir/key/HaltTrading", Query::MimirKey("HaltTrading".to_string()))]
    #[test_case("invariant/solvency", Query::Invariant("solvency".to_string()))]
    fn test_from_path(path: &str, expected: Query) {
        assert_eq!(Query::from_path(path).unwrap(), expected);
    }

    #[test]
    fn test_from_path_rejects_unknown() {
        assert_matches!(Query::from_path("bogus"), Err(RuntimeError::UnknownRequest(_)));
        assert_matches!(Query::from_path("keysign/abc"), Err(RuntimeError::UnknownRequest(_)));
    }

    #[test]
    fn test_query_pool_and_node() {
        let mut ctx = test_context(10);
        let bnb = Chain::BNB.gas_asset();
        add_pool(&mut ctx, bnb.clone(), 100 * ONE, 10 * ONE);
        let pool = query(&ctx, &Query::from_path("pool/BNB.BNB").unwrap()).unwrap();
        assert_eq!(pool["balance_rune"], json!(100 * ONE));
        assert_matches!(
            query(&ctx, &Query::Pool(Chain::BTC.gas_asset())),
            Err(RuntimeError::UnknownRequest(_))
        );

        ctx.keeper
            .set_node_account(&node_account(0, NodeStatus::Standby, ONE))
            .unwrap();
        ctx.keeper.inc_node_account_slash_points(&node_address(0), 3).unwrap();
        let node = query(&ctx, &Query::Node(node_address(0))).unwrap();
        assert_eq!(node["slash_points"], json!(3));
        assert_eq!(node["node"]["bond"], json!(ONE));
    }

    #[test]
    fn test_query_mimir_and_invariant() {
        let mut ctx = test_context(10);
        assert_eq!(query(&ctx, &Query::MimirKey("HaltTrading".to_string())).unwrap(), json!(-1));
        ctx.keeper.set_mimir("HaltTrading", 1).unwrap();
        assert_eq!(query(&ctx, &Query::MimirKey("HaltTrading".to_string())).unwrap(), json!(1));

        let result = query(&ctx, &Query::Invariant("thorchain_module".to_string())).unwrap();
        assert_eq!(result["broken"], json!(false));
        let constants = query(&ctx, &Query::Constants).unwrap();
        assert_eq!(constants["int_64_values"]["ChurnInterval"], json!(43_200));
    }
}
