use {
    crate::tx_type::TxType,
    serde_derive::{Deserialize, Serialize},
    std::fmt,
    thornode_common::{AccAddress, Address, Asset, Chain, TxId, Uint},
};

/// How a swap is executed once it leaves the queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    #[default]
    Market,
    Limit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddLiquidityMemo {
    pub asset: Asset,
    /// Address of the paired side on the other chain.
    pub address: Address,
    pub affiliate_address: Address,
    pub affiliate_basis_points: Uint,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithdrawLiquidityMemo {
    pub asset: Asset,
    pub basis_points: Uint,
    pub withdrawal_asset: Option<Asset>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwapMemo {
    pub asset: Asset,
    pub destination: Address,
    pub slip_limit: Uint,
    pub affiliate_address: Address,
    pub affiliate_basis_points: Uint,
    pub dex_aggregator: String,
    pub dex_target_address: String,
    pub dex_target_limit: Option<Uint>,
    pub order_type: OrderType,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BondMemo {
    pub node_address: AccAddress,
    pub bond_provider_address: Option<AccAddress>,
    /// Operator fee in basis points, -1 when not given.
    pub node_operator_fee: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnbondMemo {
    pub node_address: AccAddress,
    pub amount: Uint,
    pub bond_provider_address: Option<AccAddress>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManageThorNameMemo {
    pub name: String,
    pub chain: Chain,
    pub address: Address,
    pub owner: Option<AccAddress>,
    pub preferred_asset: Option<Asset>,
    pub expire: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoanOpenMemo {
    pub target_asset: Asset,
    pub target_address: Address,
    pub min_out: Uint,
    pub affiliate_address: Address,
    pub affiliate_basis_points: Uint,
    pub dex_aggregator: String,
    pub dex_target_address: String,
    pub dex_target_limit: Uint,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoanRepaymentMemo {
    pub asset: Asset,
    pub owner: Address,
    pub min_out: Uint,
}

/// A parsed memo.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Memo {
    AddLiquidity(AddLiquidityMemo),
    WithdrawLiquidity(WithdrawLiquidityMemo),
    Swap(SwapMemo),
    Donate { asset: Asset },
    Bond(BondMemo),
    Unbond(UnbondMemo),
    Leave { node_address: AccAddress },
    Outbound { tx_id: TxId },
    Refund { tx_id: TxId },
    YggdrasilFund { block_height: i64 },
    YggdrasilReturn { block_height: i64 },
    Reserve,
    Migrate { block_height: i64 },
    Ragnarok { block_height: i64 },
    Switch { destination: Address },
    NoOp { action: String },
    Consolidate,
    ManageThorName(ManageThorNameMemo),
    LoanOpen(LoanOpenMemo),
    LoanRepayment(LoanRepaymentMemo),
}

impl Memo {
    pub fn tx_type(&self) -> TxType {
        match self {
            Memo::AddLiquidity(_) => TxType::Add,
            Memo::WithdrawLiquidity(_) => TxType::Withdraw,
            Memo::Swap(m) if m.order_type == OrderType::Limit => TxType::LimitOrder,
            Memo::Swap(_) => TxType::Swap,
            Memo::Donate { .. } => TxType::Donate,
            Memo::Bond(_) => TxType::Bond,
            Memo::Unbond(_) => TxType::Unbond,
            Memo::Leave { .. } => TxType::Leave,
            Memo::Outbound { .. } => TxType::Outbound,
            Memo::Refund { .. } => TxType::Refund,
            Memo::YggdrasilFund { .. } => TxType::YggdrasilFund,
            Memo::YggdrasilReturn { .. } => TxType::YggdrasilReturn,
            Memo::Reserve => TxType::Reserve,
            Memo::Migrate { .. } => TxType::Migrate,
            Memo::Ragnarok { .. } => TxType::Ragnarok,
            Memo::Switch { .. } => TxType::Switch,
            Memo::NoOp { .. } => TxType::NoOp,
            Memo::Consolidate => TxType::Consolidate,
            Memo::ManageThorName(_) => TxType::ThorName,
            Memo::LoanOpen(_) => TxType::LoanOpen,
            Memo::LoanRepayment(_) => TxType::LoanRepayment,
        }
    }

    pub fn is_type(&self, tx_type: TxType) -> bool {
        self.tx_type() == tx_type
    }

    pub fn is_inbound(&self) -> bool {
        self.tx_type().is_inbound()
    }

    pub fn is_outbound(&self) -> bool {
        self.tx_type().is_outbound()
    }

    pub fn is_internal(&self) -> bool {
        self.tx_type().is_internal()
    }

    pub fn asset(&self) -> Option<&Asset> {
        match self {
            Memo::AddLiquidity(m) => Some(&m.asset),
            Memo::WithdrawLiquidity(m) => Some(&m.asset),
            Memo::Swap(m) => Some(&m.asset),
            Memo::Donate { asset } => Some(asset),
            Memo::LoanOpen(m) => Some(&m.target_asset),
            Memo::LoanRepayment(m) => Some(&m.asset),
            _ => None,
        }
    }

    pub fn destination(&self) -> Option<&Address> {
        match self {
            Memo::AddLiquidity(m) => Some(&m.address),
            Memo::Swap(m) => Some(&m.destination),
            Memo::Switch { destination } => Some(destination),
            Memo::LoanOpen(m) => Some(&m.target_address),
            _ => None,
        }
    }

    /// Inbound hash referenced by outbound intents.
    pub fn tx_id(&self) -> Option<&TxId> {
        match self {
            Memo::Outbound { tx_id } | Memo::Refund { tx_id } => Some(tx_id),
            _ => None,
        }
    }

    pub fn block_height(&self) -> i64 {
        match self {
            Memo::YggdrasilFund { block_height }
            | Memo::YggdrasilReturn { block_height }
            | Memo::Migrate { block_height }
            | Memo::Ragnarok { block_height } => *block_height,
            _ => 0,
        }
    }

    pub fn slip_limit(&self) -> Uint {
        match self {
            Memo::Swap(m) => m.slip_limit,
            Memo::LoanOpen(m) => m.min_out,
            Memo::LoanRepayment(m) => m.min_out,
            _ => 0,
        }
    }
}

/// Join `args[..last]` with colons.
fn join(args: &[String], last: usize) -> String {
    args[..last.min(args.len())].join(":")
}

fn opt_acc(addr: &Option<AccAddress>) -> String {
    addr.as_ref().map(ToString::to_string).unwrap_or_default()
}

impl fmt::Display for Memo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = self.tx_type().token();
        let rendered = match self {
            Memo::AddLiquidity(m) => {
                let args = [
                    token.to_string(),
                    m.asset.to_string(),
                    m.address.to_string(),
                    m.affiliate_address.to_string(),
                    m.affiliate_basis_points.to_string(),
                ];
                let last = if !m.affiliate_address.is_empty() {
                    5
                } else if !m.address.is_empty() {
                    3
                } else {
                    2
                };
                join(&args, last)
            }
            Memo::WithdrawLiquidity(m) => {
                let mut rendered = format!("{}:{}:{}", token, m.asset, m.basis_points);
                if let Some(asset) = &m.withdrawal_asset {
                    rendered.push_str(&format!(":{}", asset));
                }
                rendered
            }
            Memo::Swap(m) => {
                let mut args = vec![
                    token.to_string(),
                    m.asset.to_string(),
                    m.destination.to_string(),
                    if m.slip_limit == 0 {
                        String::new()
                    } else {
                        m.slip_limit.to_string()
                    },
                    m.affiliate_address.to_string(),
                    m.affiliate_basis_points.to_string(),
                    m.dex_aggregator.clone(),
                    m.dex_target_address.clone(),
                ];
                let mut last = 3;
                if m.slip_limit != 0 {
                    last = 4;
                }
                if !m.affiliate_address.is_empty() {
                    last = 6;
                }
                if !m.dex_aggregator.is_empty() || !m.dex_target_address.is_empty() {
                    last = 8;
                }
                if let Some(limit) = m.dex_target_limit.filter(|l| *l != 0) {
                    args.push(limit.to_string());
                    last = 9;
                }
                join(&args, last)
            }
            Memo::Donate { asset } => format!("{}:{}", token, asset),
            Memo::Bond(m) => {
                let args = [
                    token.to_string(),
                    m.node_address.to_string(),
                    opt_acc(&m.bond_provider_address),
                    m.node_operator_fee.to_string(),
                ];
                let last = if m.node_operator_fee != -1 {
                    4
                } else if m.bond_provider_address.is_some() {
                    3
                } else {
                    2
                };
                join(&args, last)
            }
            Memo::Unbond(m) => {
                let mut rendered = format!("{}:{}:{}", token, m.node_address, m.amount);
                if let Some(provider) = &m.bond_provider_address {
                    rendered.push_str(&format!(":{}", provider));
                }
                rendered
            }
            Memo::Leave { node_address } => format!("{}:{}", token, node_address),
            Memo::Outbound { tx_id } | Memo::Refund { tx_id } => format!("{}:{}", token, tx_id),
            Memo::YggdrasilFund { block_height }
            | Memo::YggdrasilReturn { block_height }
            | Memo::Migrate { block_height }
            | Memo::Ragnarok { block_height } => format!("{}:{}", token, block_height),
            Memo::Reserve | Memo::Consolidate => token.to_string(),
            Memo::Switch { destination } => format!("{}:{}", token, destination),
            Memo::NoOp { action } if action.is_empty() => token.to_string(),
            Memo::NoOp { action } => format!("{}:{}", token, action),
            Memo::ManageThorName(m) => {
                let args = [
                    token.to_string(),
                    m.name.clone(),
                    m.chain.to_string(),
                    m.address.to_string(),
                    opt_acc(&m.owner),
                    m.preferred_asset
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_default(),
                    m.expire.to_string(),
                ];
                let last = if m.expire != 0 {
                    7
                } else if m.preferred_asset.is_some() {
                    6
                } else if m.owner.is_some() {
                    5
                } else {
                    4
                };
                join(&args, last)
            }
            Memo::LoanOpen(m) => {
                let args = [
                    token.to_string(),
                    m.target_asset.to_string(),
                    m.target_address.to_string(),
                    m.min_out.to_string(),
                    m.affiliate_address.to_string(),
                    m.affiliate_basis_points.to_string(),
                    m.dex_aggregator.clone(),
                    m.dex_target_address.clone(),
                    m.dex_target_limit.to_string(),
                ];
                let last = if m.dex_target_limit != 0 {
                    9
                } else if !m.dex_target_address.is_empty() {
                    8
                } else if !m.dex_aggregator.is_empty() {
                    7
                } else if m.affiliate_basis_points != 0 || !m.affiliate_address.is_empty() {
                    6
                } else if m.min_out != 0 {
                    4
                } else {
                    3
                };
                join(&args, last)
            }
            Memo::LoanRepayment(m) => {
                let mut rendered = format!("{}:{}:{}", token, m.asset, m.owner);
                if m.min_out != 0 {
                    rendered.push_str(&format!(":{}", m.min_out));
                }
                rendered
            }
        };
        write!(f, "{}", rendered)
    }
}
