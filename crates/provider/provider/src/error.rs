#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("failed to connect to {url}: {reason}")]
    Connection { url: String, reason: String },
    #[error("rpc request failed: {0}")]
    Rpc(String),
    #[error("block {0} not found")]
    BlockNotFound(u64),
    #[error("subscription closed by the node")]
    SubscriptionClosed,
}
