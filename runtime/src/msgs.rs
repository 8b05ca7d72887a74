//! Messages the engine processes.
//!
//! External messages arrive in signed transactions. Internal messages are
//! built by the engine itself, mostly from the memo of a finalised inbound,
//! and never come from users directly.

use {
    crate::{
        error::{Result, RuntimeError},
        types::{Blame, KeygenType, ObservedTx, ReserveContributor},
    },
    serde_derive::{Deserialize, Serialize},
    strum_macros::{Display, EnumDiscriminants, IntoStaticStr},
    thornode_common::{
        AccAddress, Address, Asset, Chain, Coin, Coins, PubKey, PubKeySet, Tx, TxId, Uint,
        MAX_BASIS_POINTS,
    },
    thornode_memo::OrderType,
};

fn invalid(reason: impl Into<String>) -> RuntimeError {
    RuntimeError::UnknownRequest(reason.into())
}

fn require_signer(signer: &AccAddress) -> Result<()> {
    if signer.is_empty() {
        return Err(RuntimeError::Unauthorized("signer cannot be empty".to_string()));
    }
    Ok(())
}

fn validate_observed(txs: &[ObservedTx]) -> Result<()> {
    if txs.is_empty() {
        return Err(invalid("txs cannot be empty"));
    }
    for tx in txs {
        tx.tx.valid()?;
        if tx.observed_pub_key.is_empty() {
            return Err(invalid("observed pool pub key cannot be empty"));
        }
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgObservedTxIn {
    pub txs: Vec<ObservedTx>,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgObservedTxOut {
    pub txs: Vec<ObservedTx>,
    pub signer: AccAddress,
}

/// Outcome of a keygen ceremony as reported by one member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgTssPool {
    pub id: String,
    pub pool_pub_key: PubKey,
    pub keygen_type: KeygenType,
    pub pub_keys: Vec<PubKey>,
    pub height: i64,
    pub blame: Blame,
    pub chains: Vec<Chain>,
    pub keygen_time_ms: i64,
    pub signer: AccAddress,
}

impl MsgTssPool {
    /// Id of the ceremony, shared by every member reporting the same result.
    pub fn tss_id(height: i64, pool_pub_key: &PubKey, pub_keys: &[PubKey], blame: &Blame) -> String {
        let mut keys: Vec<String> = pub_keys.iter().map(ToString::to_string).collect();
        keys.sort();
        let mut blamed: Vec<String> = blame.pub_keys().iter().map(ToString::to_string).collect();
        blamed.sort();
        let raw = format!("{height}:{pool_pub_key}:{}:{}", keys.join(","), blamed.join(","));
        TxId::from_bytes(raw.as_bytes()).to_string()
    }

    pub fn is_success(&self) -> bool {
        !self.pool_pub_key.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgTssKeysignFail {
    pub id: String,
    pub height: i64,
    pub blame: Blame,
    pub memo: String,
    pub coins: Coins,
    pub pub_key: PubKey,
    pub signer: AccAddress,
}

impl MsgTssKeysignFail {
    pub fn keysign_id(height: i64, blame: &Blame, memo: &str, coins: &Coins, pk: &PubKey) -> String {
        let mut blamed: Vec<String> = blame.pub_keys().iter().map(ToString::to_string).collect();
        blamed.sort();
        let raw = format!("{height}:{}:{memo}:{coins}:{pk}", blamed.join(","));
        TxId::from_bytes(raw.as_bytes()).to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgErrataTx {
    pub tx_id: TxId,
    pub chain: Chain,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSolvency {
    pub id: TxId,
    pub chain: Chain,
    pub pub_key: PubKey,
    pub coins: Coins,
    pub height: i64,
    pub signer: AccAddress,
}

impl MsgSolvency {
    pub fn new(chain: Chain, pub_key: PubKey, coins: Coins, height: i64, signer: AccAddress) -> Self {
        let raw = format!("{chain}:{pub_key}:{coins}:{height}");
        Self {
            id: TxId::from_bytes(raw.as_bytes()),
            chain,
            pub_key,
            coins,
            height,
            signer,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgBan {
    pub node_address: AccAddress,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgNetworkFee {
    pub block_height: i64,
    pub chain: Chain,
    pub transaction_size: u64,
    pub transaction_fee_rate: u64,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgMimir {
    pub key: String,
    pub value: i64,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgNodePauseChain {
    pub value: i64,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSetNodeKeys {
    pub pub_key_set: PubKeySet,
    pub validator_cons_pub_key: String,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSetVersion {
    pub version: String,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSetIpAddress {
    pub ip_address: String,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgDeposit {
    pub coins: Coins,
    pub memo: String,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSend {
    pub from_address: AccAddress,
    pub to_address: AccAddress,
    pub amount: Coins,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgOutboundTx {
    pub tx: ObservedTx,
    pub in_tx_id: TxId,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgRefundTx {
    pub tx: ObservedTx,
    pub in_tx_id: TxId,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgMigrate {
    pub tx: ObservedTx,
    pub block_height: i64,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgRagnarok {
    pub tx: ObservedTx,
    pub block_height: i64,
    pub signer: AccAddress,
}

/// Funds moving into (`add_funds`) or out of a yggdrasil vault.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgYggdrasil {
    pub tx: Tx,
    pub pub_key: PubKey,
    pub add_funds: bool,
    pub coins: Coins,
    pub block_height: i64,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSwap {
    pub tx: Tx,
    pub target_asset: Asset,
    pub destination: Address,
    pub trade_target: Uint,
    pub affiliate_address: Address,
    pub affiliate_basis_points: Uint,
    pub aggregator: String,
    pub aggregator_target_address: String,
    pub aggregator_target_limit: Option<Uint>,
    pub order_type: OrderType,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgAddLiquidity {
    pub tx: Tx,
    pub asset: Asset,
    pub rune_amount: Uint,
    pub asset_amount: Uint,
    pub rune_address: Address,
    pub asset_address: Address,
    pub affiliate_address: Address,
    pub affiliate_basis_points: Uint,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgWithdrawLiquidity {
    pub tx: Tx,
    pub withdraw_address: Address,
    pub basis_points: Uint,
    pub asset: Asset,
    pub withdrawal_asset: Option<Asset>,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgDonate {
    pub tx: Tx,
    pub asset: Asset,
    pub asset_amount: Uint,
    pub rune_amount: Uint,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgLoanOpen {
    pub owner: Address,
    pub collateral_asset: Asset,
    pub collateral_amount: Uint,
    pub target_address: Address,
    pub target_asset: Asset,
    pub min_out: Uint,
    pub affiliate_address: Address,
    pub affiliate_basis_points: Uint,
    pub aggregator: String,
    pub aggregator_target_address: String,
    pub aggregator_target_limit: Uint,
    pub tx_id: TxId,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgLoanRepayment {
    pub owner: Address,
    pub collateral_asset: Asset,
    pub coin: Coin,
    pub min_out: Uint,
    pub from: Address,
    pub tx_id: TxId,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgBond {
    pub tx_in: Tx,
    pub node_address: AccAddress,
    pub bond: Uint,
    pub bond_address: Address,
    pub bond_provider_address: Option<AccAddress>,
    /// Operator fee in basis points, -1 leaves it unchanged.
    pub operator_fee: i64,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgUnbond {
    pub tx_in: Tx,
    pub node_address: AccAddress,
    pub amount: Uint,
    pub bond_address: Address,
    pub bond_provider_address: Option<AccAddress>,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgLeave {
    pub tx: Tx,
    pub node_address: AccAddress,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgReserveContributor {
    pub tx: Tx,
    pub contributor: ReserveContributor,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSwitch {
    pub tx: Tx,
    pub destination: AccAddress,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgNoOp {
    pub observed_tx: ObservedTx,
    /// `novault` skips crediting the receiving vault.
    pub action: String,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgConsolidate {
    pub observed_tx: ObservedTx,
    pub signer: AccAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgManageThorName {
    pub name: String,
    pub chain: Chain,
    pub address: Address,
    pub coin: Coin,
    pub expire_block_height: i64,
    pub preferred_asset: Option<Asset>,
    pub owner: Option<AccAddress>,
    pub signer: AccAddress,
}

/// Every message the engine dispatches. [`MsgType`] is the tag handlers are
/// registered under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, EnumDiscriminants)]
#[strum_discriminants(name(MsgType))]
#[strum_discriminants(derive(Display, IntoStaticStr, Hash, PartialOrd, Ord))]
pub enum Msg {
    ObservedTxIn(MsgObservedTxIn),
    ObservedTxOut(MsgObservedTxOut),
    TssPool(MsgTssPool),
    TssKeysignFail(MsgTssKeysignFail),
    ErrataTx(MsgErrataTx),
    Solvency(MsgSolvency),
    Ban(MsgBan),
    NetworkFee(MsgNetworkFee),
    Mimir(MsgMimir),
    NodePauseChain(MsgNodePauseChain),
    SetNodeKeys(MsgSetNodeKeys),
    SetVersion(MsgSetVersion),
    SetIpAddress(MsgSetIpAddress),
    Deposit(MsgDeposit),
    Send(MsgSend),
    OutboundTx(MsgOutboundTx),
    RefundTx(MsgRefundTx),
    Migrate(MsgMigrate),
    Ragnarok(MsgRagnarok),
    Yggdrasil(MsgYggdrasil),
    Swap(MsgSwap),
    AddLiquidity(MsgAddLiquidity),
    WithdrawLiquidity(MsgWithdrawLiquidity),
    Donate(MsgDonate),
    LoanOpen(MsgLoanOpen),
    LoanRepayment(MsgLoanRepayment),
    Bond(MsgBond),
    Unbond(MsgUnbond),
    Leave(MsgLeave),
    ReserveContributor(MsgReserveContributor),
    Switch(MsgSwitch),
    NoOp(MsgNoOp),
    Consolidate(MsgConsolidate),
    ManageThorName(MsgManageThorName),
}

impl Msg {
    pub fn msg_type(&self) -> MsgType {
        self.into()
    }

    pub fn signer(&self) -> &AccAddress {
        match self {
            Msg::ObservedTxIn(m) => &m.signer,
            Msg::ObservedTxOut(m) => &m.signer,
            Msg::TssPool(m) => &m.signer,
            Msg::TssKeysignFail(m) => &m.signer,
            Msg::ErrataTx(m) => &m.signer,
            Msg::Solvency(m) => &m.signer,
            Msg::Ban(m) => &m.signer,
            Msg::NetworkFee(m) => &m.signer,
            Msg::Mimir(m) => &m.signer,
            Msg::NodePauseChain(m) => &m.signer,
            Msg::SetNodeKeys(m) => &m.signer,
            Msg::SetVersion(m) => &m.signer,
            Msg::SetIpAddress(m) => &m.signer,
            Msg::Deposit(m) => &m.signer,
            Msg::Send(m) => &m.from_address,
            Msg::OutboundTx(m) => &m.signer,
            Msg::RefundTx(m) => &m.signer,
            Msg::Migrate(m) => &m.signer,
            Msg::Ragnarok(m) => &m.signer,
            Msg::Yggdrasil(m) => &m.signer,
            Msg::Swap(m) => &m.signer,
            Msg::AddLiquidity(m) => &m.signer,
            Msg::WithdrawLiquidity(m) => &m.signer,
            Msg::Donate(m) => &m.signer,
            Msg::LoanOpen(m) => &m.signer,
            Msg::LoanRepayment(m) => &m.signer,
            Msg::Bond(m) => &m.signer,
            Msg::Unbond(m) => &m.signer,
            Msg::Leave(m) => &m.signer,
            Msg::ReserveContributor(m) => &m.signer,
            Msg::Switch(m) => &m.signer,
            Msg::NoOp(m) => &m.signer,
            Msg::Consolidate(m) => &m.signer,
            Msg::ManageThorName(m) => &m.signer,
        }
    }

    /// Stateless checks every message must pass before any handler runs.
    pub fn validate_basic(&self) -> Result<()> {
        require_signer(self.signer())?;
        match self {
            Msg::ObservedTxIn(m) => validate_observed(&m.txs),
            Msg::ObservedTxOut(m) => validate_observed(&m.txs),
            Msg::TssPool(m) => {
                if m.id.is_empty() {
                    return Err(invalid("tss pool id cannot be empty"));
                }
                if m.pub_keys.is_empty() {
                    return Err(invalid("tss pool members cannot be empty"));
                }
                if !m.is_success() && m.blame.is_empty() {
                    return Err(invalid("failed keygen must carry blame"));
                }
                Ok(())
            }
            Msg::TssKeysignFail(m) => {
                if m.blame.is_empty() {
                    return Err(invalid("keysign failure must carry blame"));
                }
                if m.pub_key.is_empty() {
                    return Err(invalid("keysign pub key cannot be empty"));
                }
                Ok(())
            }
            Msg::ErrataTx(m) => {
                if m.tx_id.is_empty() {
                    return Err(invalid("errata tx id cannot be empty"));
                }
                Ok(())
            }
            Msg::Solvency(m) => {
                if m.pub_key.is_empty() || m.height <= 0 {
                    return Err(invalid("solvency report needs a vault and height"));
                }
                Ok(())
            }
            Msg::Ban(m) => {
                if m.node_address.is_empty() {
                    return Err(invalid("ban target cannot be empty"));
                }
                Ok(())
            }
            Msg::NetworkFee(m) => {
                if m.block_height <= 0 || m.transaction_size == 0 || m.transaction_fee_rate == 0 {
                    return Err(invalid("network fee needs height, size and rate"));
                }
                Ok(())
            }
            Msg::Mimir(m) => {
                if !thornode_constants::is_valid_mimir_key(&m.key) {
                    return Err(invalid(format!("invalid mimir key {}", m.key)));
                }
                Ok(())
            }
            Msg::NodePauseChain(_) => Ok(()),
            Msg::SetNodeKeys(m) => {
                if m.pub_key_set.is_empty() || m.validator_cons_pub_key.is_empty() {
                    return Err(invalid("node keys cannot be empty"));
                }
                Ok(())
            }
            Msg::SetVersion(m) => semver::Version::parse(&m.version)
                .map(|_| ())
                .map_err(|_| invalid(format!("invalid version {}", m.version))),
            Msg::SetIpAddress(m) => m
                .ip_address
                .parse::<std::net::IpAddr>()
                .map(|_| ())
                .map_err(|_| invalid(format!("invalid ip address {}", m.ip_address))),
            Msg::Deposit(m) => {
                if m.coins.0.is_empty() {
                    return Err(invalid("deposit needs coins"));
                }
                m.coins.valid()?;
                Ok(())
            }
            Msg::Send(m) => {
                if m.to_address.is_empty() || m.amount.is_empty() {
                    return Err(invalid("send needs a recipient and coins"));
                }
                Ok(())
            }
            Msg::OutboundTx(m) => {
                m.tx.tx.valid()?;
                if m.in_tx_id.is_empty() {
                    return Err(invalid("in tx id cannot be empty"));
                }
                Ok(())
            }
            Msg::RefundTx(m) => {
                m.tx.tx.valid()?;
                if m.in_tx_id.is_empty() {
                    return Err(invalid("in tx id cannot be empty"));
                }
                Ok(())
            }
            Msg::Migrate(m) => {
                m.tx.tx.valid()?;
                if m.block_height <= 0 {
                    return Err(invalid("migrate height must be positive"));
                }
                Ok(())
            }
            Msg::Ragnarok(m) => {
                m.tx.tx.valid()?;
                if m.block_height <= 0 {
                    return Err(invalid("ragnarok height must be positive"));
                }
                Ok(())
            }
            Msg::Yggdrasil(m) => {
                if m.pub_key.is_empty() || m.block_height <= 0 {
                    return Err(invalid("yggdrasil needs a vault and height"));
                }
                Ok(())
            }
            Msg::Swap(m) => {
                m.tx.valid()?;
                if m.target_asset.symbol.is_empty() {
                    return Err(invalid("swap target asset cannot be empty"));
                }
                if m.affiliate_basis_points > MAX_BASIS_POINTS {
                    return Err(invalid("affiliate basis points above 10000"));
                }
                if m.tx.coins.len() != 1 {
                    return Err(invalid("swap takes exactly one coin"));
                }
                Ok(())
            }
            Msg::AddLiquidity(m) => {
                if m.asset.symbol.is_empty() || m.asset.is_rune() {
                    return Err(invalid("cannot add liquidity to a rune pool"));
                }
                if m.rune_address.is_empty() && m.asset_address.is_empty() {
                    return Err(invalid("add liquidity needs an address"));
                }
                if m.affiliate_basis_points > MAX_BASIS_POINTS {
                    return Err(invalid("affiliate basis points above 10000"));
                }
                Ok(())
            }
            Msg::WithdrawLiquidity(m) => {
                if m.withdraw_address.is_empty() {
                    return Err(invalid("withdraw address cannot be empty"));
                }
                if m.basis_points == 0 || m.basis_points > MAX_BASIS_POINTS {
                    return Err(invalid("withdraw basis points out of range"));
                }
                Ok(())
            }
            Msg::Donate(m) => {
                if m.asset.symbol.is_empty() || (m.asset_amount == 0 && m.rune_amount == 0) {
                    return Err(invalid("donate needs an asset and an amount"));
                }
                Ok(())
            }
            Msg::LoanOpen(m) => {
                if m.owner.is_empty() || m.target_address.is_empty() || m.collateral_amount == 0 {
                    return Err(invalid("loan open needs owner, target and collateral"));
                }
                Ok(())
            }
            Msg::LoanRepayment(m) => {
                if m.owner.is_empty() || m.coin.is_empty() {
                    return Err(invalid("loan repayment needs owner and coin"));
                }
                Ok(())
            }
            Msg::Bond(m) => {
                if m.node_address.is_empty() || m.bond_address.is_empty() {
                    return Err(invalid("bond needs node and bond address"));
                }
                if m.operator_fee > MAX_BASIS_POINTS as i64 {
                    return Err(invalid("operator fee above 10000"));
                }
                Ok(())
            }
            Msg::Unbond(m) => {
                if m.node_address.is_empty() || m.bond_address.is_empty() {
                    return Err(invalid("unbond needs node and bond address"));
                }
                Ok(())
            }
            Msg::Leave(m) => {
                if m.node_address.is_empty() {
                    return Err(invalid("leave needs a node address"));
                }
                Ok(())
            }
            Msg::ReserveContributor(m) => {
                if m.contributor.amount == 0 {
                    return Err(invalid("reserve contribution cannot be zero"));
                }
                Ok(())
            }
            Msg::Switch(m) => {
                if m.destination.is_empty() {
                    return Err(invalid("switch destination cannot be empty"));
                }
                Ok(())
            }
            Msg::NoOp(_) | Msg::Consolidate(_) => Ok(()),
            Msg::ManageThorName(m) => {
                if !crate::types::is_valid_thorname(&m.name) {
                    return Err(invalid(format!("invalid thorname {}", m.name)));
                }
                if !m.coin.asset.is_native_rune() {
                    return Err(invalid("thorname fees are paid in rune"));
                }
                Ok(())
            }
        }
    }
}

/// Signed transaction of the native chain, carrying one or more external
/// messages.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeTx {
    pub hash: TxId,
    pub msgs: Vec<Msg>,
}

impl NativeTx {
    pub fn new(hash: TxId, msgs: Vec<Msg>) -> Self {
        Self { hash, msgs }
    }
}
