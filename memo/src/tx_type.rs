use {
    serde_derive::{Deserialize, Serialize},
    strum_macros::{EnumIter, IntoStaticStr},
};

/// Intent selected by the first field of a memo.
#[derive(
    Clone, Copy, Debug, Default, EnumIter, IntoStaticStr, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum TxType {
    #[default]
    Unknown,
    Add,
    Withdraw,
    Swap,
    LimitOrder,
    Outbound,
    Donate,
    Bond,
    Unbond,
    Leave,
    YggdrasilFund,
    YggdrasilReturn,
    Reserve,
    Refund,
    Migrate,
    Ragnarok,
    Switch,
    NoOp,
    Consolidate,
    ThorName,
    LoanOpen,
    LoanRepayment,
}

impl TxType {
    /// Resolve a memo type token, case-insensitively.
    pub fn from_token(token: &str) -> Option<Self> {
        let tx_type = match token.to_lowercase().as_str() {
            "add" | "+" | "a" => TxType::Add,
            "withdraw" | "wd" | "-" => TxType::Withdraw,
            "swap" | "s" | "=" => TxType::Swap,
            "limito" | "lo" => TxType::LimitOrder,
            "out" => TxType::Outbound,
            "donate" | "d" | "%" => TxType::Donate,
            "bond" => TxType::Bond,
            "unbond" => TxType::Unbond,
            "leave" => TxType::Leave,
            "yggdrasil+" | "ygg+" => TxType::YggdrasilFund,
            "yggdrasil-" | "ygg-" => TxType::YggdrasilReturn,
            "reserve" => TxType::Reserve,
            "refund" => TxType::Refund,
            "migrate" => TxType::Migrate,
            "ragnarok" => TxType::Ragnarok,
            "switch" => TxType::Switch,
            "noop" => TxType::NoOp,
            "consolidate" => TxType::Consolidate,
            "name" | "n" | "~" => TxType::ThorName,
            "$+" | "loan+" => TxType::LoanOpen,
            "$-" | "loan-" => TxType::LoanRepayment,
            _ => return None,
        };
        Some(tx_type)
    }

    /// Canonical token written when a memo is rendered.
    pub fn token(&self) -> &'static str {
        match self {
            TxType::Unknown => "",
            TxType::Add => "+",
            TxType::Withdraw => "-",
            TxType::Swap => "=",
            TxType::LimitOrder => "LIMITO",
            TxType::Outbound => "OUT",
            TxType::Donate => "DONATE",
            TxType::Bond => "BOND",
            TxType::Unbond => "UNBOND",
            TxType::Leave => "LEAVE",
            TxType::YggdrasilFund => "YGGDRASIL+",
            TxType::YggdrasilReturn => "YGGDRASIL-",
            TxType::Reserve => "RESERVE",
            TxType::Refund => "REFUND",
            TxType::Migrate => "MIGRATE",
            TxType::Ragnarok => "RAGNAROK",
            TxType::Switch => "SWITCH",
            TxType::NoOp => "NOOP",
            TxType::Consolidate => "CONSOLIDATE",
            TxType::ThorName => "~",
            TxType::LoanOpen => "$+",
            TxType::LoanRepayment => "$-",
        }
    }

    pub fn is_inbound(&self) -> bool {
        matches!(
            self,
            TxType::Add
                | TxType::Withdraw
                | TxType::Swap
                | TxType::LimitOrder
                | TxType::Donate
                | TxType::Bond
                | TxType::Unbond
                | TxType::Leave
                | TxType::Switch
                | TxType::Reserve
                | TxType::NoOp
                | TxType::ThorName
                | TxType::LoanOpen
                | TxType::LoanRepayment
        )
    }

    pub fn is_outbound(&self) -> bool {
        matches!(self, TxType::Outbound | TxType::Refund | TxType::Ragnarok)
    }

    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            TxType::YggdrasilFund | TxType::YggdrasilReturn | TxType::Migrate | TxType::Consolidate
        )
    }

    /// Whether handling this intent schedules an outbound of its own.
    pub fn has_outbound(&self) -> bool {
        !matches!(
            self,
            TxType::Add
                | TxType::Bond
                | TxType::Donate
                | TxType::YggdrasilReturn
                | TxType::Reserve
                | TxType::Migrate
                | TxType::Ragnarok
                | TxType::Switch
        )
    }

    pub fn is_empty(&self) -> bool {
        *self == TxType::Unknown
    }
}
