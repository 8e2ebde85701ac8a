//! WebSocket client for the backend's progress stream.
//!
//! [`ProgressSocketClient`] holds the WebSocket base URL of one backend.
//! Call [`ProgressSocketClient::connect`] to open a live
//! [`ProgressConnection`] for a single execution.

use std::time::Duration;

use async_trait::async_trait;
use futures::{future, StreamExt};
use shorts_core::types::ExecutionId;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream};

use crate::transport::{PushStream, PushTransport, TransportError};

/// Configuration handle for the progress WebSocket endpoint.
pub struct ProgressSocketClient {
    ws_url: String,
    connect_timeout: Duration,
}

/// A live progress stream for one execution.
///
/// Dropping the connection closes the underlying socket.
pub struct ProgressConnection {
    pub execution_id: ExecutionId,
    /// The raw WebSocket stream for reading frames.
    pub ws_stream: tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl ProgressSocketClient {
    /// * `ws_url`          - WebSocket base URL, e.g. `ws://localhost:8000`.
    /// * `connect_timeout` - upper bound on the handshake.
    pub fn new(ws_url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            ws_url: ws_url.into().trim_end_matches('/').to_string(),
            connect_timeout,
        }
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Full URL of the progress stream for `execution_id`.
    pub fn progress_url(&self, execution_id: ExecutionId) -> String {
        format!("{}/ws/progress/{}", self.ws_url, execution_id)
    }

    /// Open the progress stream for `execution_id`.
    pub async fn connect(
        &self,
        execution_id: ExecutionId,
    ) -> Result<ProgressConnection, TransportError> {
        let url = self.progress_url(execution_id);

        let handshake = tokio::time::timeout(self.connect_timeout, connect_async(&url))
            .await
            .map_err(|_| {
                TransportError::Connect(format!(
                    "Timed out after {}s connecting to {url}",
                    self.connect_timeout.as_secs()
                ))
            })?;

        let (ws_stream, _response) = handshake
            .map_err(|e| TransportError::Connect(format!("Failed to connect to {url}: {e}")))?;

        tracing::info!(execution_id, url = %url, "Connected to progress stream");

        Ok(ProgressConnection {
            execution_id,
            ws_stream,
        })
    }
}

impl ProgressConnection {
    /// Turn the socket into a stream of text frames.
    ///
    /// Binary and control frames are skipped; a close frame ends the
    /// stream. Read errors are yielded once as [`TransportError::Receive`].
    pub fn into_frames(self) -> PushStream {
        let execution_id = self.execution_id;
        self.ws_stream
            .take_while(move |msg| {
                let open = !matches!(msg, Ok(Message::Close(_)));
                if let Ok(Message::Close(frame)) = msg {
                    tracing::info!(execution_id, ?frame, "Progress stream closed by backend");
                }
                future::ready(open)
            })
            .filter_map(move |msg| {
                future::ready(match msg {
                    Ok(Message::Text(text)) => Some(Ok(text)),
                    Ok(Message::Binary(_)) => {
                        tracing::trace!(execution_id, "Ignoring binary progress frame");
                        None
                    }
                    // Ping/Pong are answered by tungstenite itself.
                    Ok(_) => None,
                    Err(e) => Some(Err(TransportError::Receive(e.to_string()))),
                })
            })
            .boxed()
    }
}

#[async_trait]
impl PushTransport for ProgressSocketClient {
    async fn open(&self, execution_id: ExecutionId) -> Result<PushStream, TransportError> {
        let conn = self.connect(execution_id).await?;
        Ok(conn.into_frames())
    }
}
