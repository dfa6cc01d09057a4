#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{0}")]
    Broker(#[from] broker_engine::BrokerError),

    #[error("invalid argument: {0}")]
    Args(String),

    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("report: {0}")]
    Report(#[from] serde_json::Error),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
