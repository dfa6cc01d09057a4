/// Coarse error classification, for callers that map engine errors onto
/// transport status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    AlreadyConsuming,
    Internal,
    Cancelled,
    Unavailable,
    Config,
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("topic not found: {0}")]
    TopicNotFound(String),

    #[error("partition {partition} not found in topic '{topic}'")]
    PartitionNotFound { topic: String, partition: u32 },

    #[error("group '{group}' is already consuming topic '{topic}' partition {partition}")]
    AlreadyConsuming {
        topic: String,
        group: String,
        partition: u32,
    },

    /// A cursor points past the tail of its partition. Never corrected silently.
    #[error("offset {offset} out of range for topic '{topic}' partition {partition} (length {length})")]
    OutOfRange {
        topic: String,
        partition: u32,
        offset: u64,
        length: u64,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("broker engine is shutting down")]
    ShuttingDown,

    #[error("config error: {0}")]
    Config(String),
}

impl BrokerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BrokerError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            BrokerError::TopicNotFound(_) | BrokerError::PartitionNotFound { .. } => {
                ErrorKind::NotFound
            }
            BrokerError::AlreadyConsuming { .. } => ErrorKind::AlreadyConsuming,
            BrokerError::OutOfRange { .. } => ErrorKind::Internal,
            BrokerError::Cancelled => ErrorKind::Cancelled,
            BrokerError::ShuttingDown => ErrorKind::Unavailable,
            BrokerError::Config(_) => ErrorKind::Config,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BrokerError::Cancelled)
    }

    /// Add context to the error.
    ///
    /// Message-carrying variants get the context prepended; structured
    /// variants are returned unchanged.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            BrokerError::InvalidArgument(msg) => {
                BrokerError::InvalidArgument(format!("{ctx}: {msg}"))
            }
            BrokerError::Config(msg) => BrokerError::Config(format!("{ctx}: {msg}")),
            other => other,
        }
    }
}
