use thiserror::Error;

/// Errors returned when parsing or validating common primitives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Chain identifier is not one the network supports
    #[error("invalid chain: {0}")]
    InvalidChain(String),
    /// Asset string could not be parsed
    #[error("invalid asset: {0}")]
    InvalidAsset(String),
    /// Address is empty or malformed
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    /// Transaction id is not hex or has the wrong length
    #[error("invalid tx id: {0}")]
    InvalidTxId(String),
    /// Public key is empty or malformed
    #[error("invalid pubkey: {0}")]
    InvalidPubKey(String),
    /// Coin has an empty asset or fails validation
    #[error("invalid coin: {0}")]
    InvalidCoin(String),
    /// Transaction fails validation
    #[error("invalid tx: {0}")]
    InvalidTx(String),
}

pub type Result<T> = std::result::Result<T, CommonError>;
