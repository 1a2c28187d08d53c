// Transport trait - how the connection manager reaches the backend
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("connect to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    #[error("socket error: {0}")]
    Socket(String),

    #[error("link closed")]
    Closed,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens one link to `endpoint`.
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn TransportLink>, TransportError>;
}

#[async_trait]
pub trait TransportLink: Send {
    /// Next text frame. `None` once the peer has closed the link.
    /// Must be cancel safe: the supervisor drops it whenever another event wins.
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>>;

    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    async fn close(&mut self);
}
