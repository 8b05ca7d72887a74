//! Fixtures shared by unit and scenario tests.

use {
    crate::{
        context::Context,
        keeper::Keeper,
        types::{
            NodeAccount, NodeStatus, ObservedTx, Pool, PoolStatus, TxOutItem, Vault, VaultStatus, VaultType,
        },
    },
    semver::Version,
    thornode_common::{AccAddress, Address, Asset, Chain, Coin, Coins, PubKey, PubKeySet, Tx, TxId, Uint, ONE},
    thornode_constants::ConstantName,
};

/// Version the fixtures run at unless a test picks another one.
pub fn test_version() -> Version {
    Version::new(1, 111, 0)
}

pub fn setup_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn test_context(height: i64) -> Context {
    setup_logger();
    Context::new(Keeper::default(), height, test_version())
}

pub fn node_pub_key(i: usize) -> PubKey {
    PubKey::new(&format!("nodepk{i}")).unwrap()
}

pub fn node_address(i: usize) -> AccAddress {
    AccAddress::new(&format!("thornode{i}")).unwrap()
}

pub fn node_account(i: usize, status: NodeStatus, bond: Uint) -> NodeAccount {
    let pk = node_pub_key(i);
    let mut node = NodeAccount::new(
        node_address(i),
        status,
        PubKeySet::new(pk.clone(), pk),
        format!("thorvalcons{i}"),
        bond,
        Address::new_unchecked(format!("thorbond{i}")),
        1,
    );
    node.ip_address = format!("10.0.0.{i}");
    node.version = test_version().to_string();
    if status == NodeStatus::Active {
        node.active_block_height = 1;
    }
    node
}

/// Store `count` active nodes bonded with 1000 rune each, with their bond
/// held by the bond module.
pub fn add_active_nodes(ctx: &mut Context, count: usize) -> Vec<NodeAccount> {
    let nodes: Vec<NodeAccount> = (0..count)
        .map(|i| node_account(i, NodeStatus::Active, 1_000 * ONE))
        .collect();
    for node in nodes.iter() {
        ctx.keeper.set_node_account(node).unwrap();
        ctx.keeper
            .mint_to_module(crate::keeper::BOND_NAME, &Coin::new(Asset::rune(), node.bond), "bond")
            .unwrap();
    }
    nodes
}

/// Active asgard controlled by `members`, holding `coins`.
pub fn add_asgard(ctx: &mut Context, pk: &str, members: &[NodeAccount], coins: Vec<Coin>) -> Vault {
    let chains = vec![Chain::THOR, Chain::BNB, Chain::BTC, Chain::ETH];
    let mut vault = Vault::new(
        1,
        VaultStatus::Active,
        VaultType::Asgard,
        PubKey::new(pk).unwrap(),
        chains,
        vec![],
    );
    vault.membership = members.iter().map(|n| n.pub_key_set.secp256k1.clone()).collect();
    vault.add_funds(&Coins::new(coins));
    ctx.keeper.set_vault(&vault).unwrap();
    vault
}

/// Available pool of `asset` with the given depths, units equal to the rune
/// depth.
pub fn add_pool(ctx: &mut Context, asset: Asset, rune: Uint, amount: Uint) -> Pool {
    let mut pool = Pool::new(asset);
    pool.balance_rune = rune;
    pool.balance_asset = amount;
    pool.lp_units = rune;
    pool.status = PoolStatus::Available;
    ctx.keeper.set_pool(&pool).unwrap();
    ctx.keeper
        .mint_to_module(crate::keeper::ASGARD_NAME, &Coin::new(Asset::rune(), rune), "pool")
        .unwrap();
    pool
}

/// Final observation of `coins` sent from `from` to vault `pk`.
pub fn observed_tx(id: &str, from: &str, pk: &PubKey, coins: Vec<Coin>, memo: &str) -> ObservedTx {
    let coins = Coins::new(coins);
    let chain = coins.iter().next().map(|c| c.asset.get_chain()).unwrap_or_default();
    let gas = if chain.is_thor() {
        Coins::default()
    } else {
        Coins::new(vec![Coin::new(chain.gas_asset(), 37_500)])
    };
    let tx = Tx::new(
        TxId::from_bytes(id.as_bytes()),
        Address::new_unchecked(from),
        pk.address(chain),
        coins,
        gas,
        memo,
    );
    ObservedTx::new(tx, 10, pk.clone(), 10)
}

/// Every outbound queued for `in_hash` from the current block through the
/// furthest tx-out offset, paired with the height it sits at.
pub fn scheduled_outbounds(ctx: &Context, in_hash: &TxId) -> Vec<(i64, TxOutItem)> {
    let height = ctx.block_height();
    let max_offset = ctx.config_i64(ConstantName::MaxTxOutOffset).unwrap();
    (height..=height + max_offset)
        .flat_map(|h| {
            ctx.keeper
                .get_tx_out(h)
                .unwrap()
                .tx_array
                .into_iter()
                .filter(move |item| item.in_hash == *in_hash)
                .map(move |item| (h, item))
        })
        .collect()
}

/// First unsigned outbound queued for `in_hash`.
pub fn find_scheduled(ctx: &Context, in_hash: &TxId) -> Option<(i64, TxOutItem)> {
    scheduled_outbounds(ctx, in_hash)
        .into_iter()
        .find(|(_, item)| !item.is_signed())
}
