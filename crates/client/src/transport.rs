//! Capabilities the Progress Channel needs from the outside world.
//!
//! The channel never touches sockets or HTTP directly. It is handed a
//! [`PushTransport`] and a [`StatusSource`], which lets tests drive it
//! with scripted fakes and a paused tokio clock. The production
//! implementations live next to the clients they wrap:
//! [`ProgressSocketClient`](crate::client::ProgressSocketClient) and
//! [`ShortsApi`](crate::api::ShortsApi).

use async_trait::async_trait;
use futures::stream::BoxStream;
use shorts_core::status::ExecutionStatus;
use shorts_core::types::ExecutionId;

/// One open push connection, as a stream of text frames.
///
/// The stream ends when the connection closes. Dropping it closes the
/// connection, so whoever holds it controls the socket's lifetime.
pub type PushStream = BoxStream<'static, Result<String, TransportError>>;

/// Opens real-time progress streams.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open the push stream for one execution.
    async fn open(&self, execution_id: ExecutionId) -> Result<PushStream, TransportError>;
}

/// Answers point-in-time status queries.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(
        &self,
        execution_id: ExecutionId,
    ) -> Result<ExecutionStatus, TransportError>;
}

/// Failures of the injected capabilities. Never surfaced to the view.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The push connection could not be established.
    #[error("Connection error: {0}")]
    Connect(String),

    /// An established push connection failed while reading.
    #[error("Receive error: {0}")]
    Receive(String),

    /// The status query failed (network, HTTP status, or body).
    #[error("Status query failed: {0}")]
    Status(String),
}
