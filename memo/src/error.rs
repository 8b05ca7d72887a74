use {thiserror::Error, thornode_common::CommonError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoError {
    /// Memo string is empty
    #[error("memo can't be empty")]
    Empty,
    /// First field is not a known intent
    #[error("invalid tx type: {0}")]
    InvalidTxType(String),
    /// Intent exists but is not accepted at the active version
    #[error("tx type not supported: {0}")]
    UnsupportedTxType(String),
    /// Intent requires more fields than were given
    #[error("not enough parameters: {0}")]
    NotEnoughParameters(String),
    /// A field could not be interpreted
    #[error("invalid field {field}: {value}")]
    InvalidField { field: &'static str, value: String },
    /// Address field is neither an address nor a known THORName
    #[error("{0} is not recognizable")]
    UnknownAddress(String),
    #[error(transparent)]
    Common(#[from] CommonError),
}

pub type Result<T> = std::result::Result<T, MemoError>;
