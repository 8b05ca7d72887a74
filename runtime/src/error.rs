use {thiserror::Error, thornode_common::CommonError, thornode_memo::MemoError};

#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Message kind does not match the handler it was routed to
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Memo could not be parsed or does not make sense for the transaction
    #[error("invalid memo: {0}")]
    InvalidMemo(String),

    /// Signer lacks the role required by the message
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Well formed request rejected by policy
    #[error("unknown request: {0}")]
    UnknownRequest(String),

    /// Pool status forbids the operation
    #[error("invalid pool status: {0}")]
    InvalidPoolStatus(String),

    /// Outbound could not be scheduled
    #[error("fail to add outbound tx: {0}")]
    FailAddOutboundTx(String),

    /// Outbound fee is larger than the coin it would be taken from
    #[error("not enough to pay transaction fee")]
    NotEnoughToPayFee,

    /// Storage or bookkeeping failure
    #[error("{context}: {source}")]
    Internal {
        context: String,
        #[source]
        source: Box<RuntimeError>,
    },

    /// No handler branch covers the active version
    #[error("bad version: {0}")]
    BadVersion(String),

    /// Record could not be encoded or decoded
    #[error("store codec error: {0}")]
    Store(String),

    /// Handler panicked and was recovered
    #[error("handler panicked: {0}")]
    Panic(String),
}

impl RuntimeError {
    /// Numeric code carried by refund events.
    pub fn code(&self) -> u32 {
        match self {
            RuntimeError::InvalidMessage(_) => 101,
            RuntimeError::InvalidMemo(_) => 105,
            RuntimeError::Unauthorized(_) => 4,
            RuntimeError::UnknownRequest(_) => 6,
            RuntimeError::InvalidPoolStatus(_) => 108,
            RuntimeError::FailAddOutboundTx(_) => 109,
            RuntimeError::NotEnoughToPayFee => 110,
            RuntimeError::Internal { source, .. } => source.code(),
            RuntimeError::BadVersion(_) => 111,
            RuntimeError::Store(_) => 1,
            RuntimeError::Panic(_) => 1,
        }
    }

    /// Wrap `self` with a description of what was being attempted.
    pub fn context(self, context: impl Into<String>) -> Self {
        RuntimeError::Internal {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn internal(context: impl Into<String>, reason: impl Into<String>) -> Self {
        RuntimeError::Store(reason.into()).context(context)
    }
}

impl From<CommonError> for RuntimeError {
    fn from(err: CommonError) -> Self {
        RuntimeError::InvalidMessage(err.to_string())
    }
}

impl From<MemoError> for RuntimeError {
    fn from(err: MemoError) -> Self {
        RuntimeError::InvalidMemo(err.to_string())
    }
}

impl From<bincode::Error> for RuntimeError {
    fn from(err: bincode::Error) -> Self {
        RuntimeError::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Attach context to a failed result.
pub trait ResultExt<T> {
    fn context(self, context: impl FnOnce() -> String) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|err| err.context(context()))
    }
}
