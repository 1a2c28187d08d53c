// WebSocket transport - tokio-tungstenite implementation of the Transport trait
use crate::application::transport::{Transport, TransportError, TransportLink};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    connect_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::with_timeout(CONNECT_TIMEOUT)
    }

    pub fn with_timeout(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn TransportLink>, TransportError> {
        tracing::debug!("Opening websocket to {}", endpoint);
        let attempt = tokio::time::timeout(self.connect_timeout, connect_async(endpoint)).await;
        match attempt {
            Ok(Ok((stream, _response))) => Ok(Box::new(WebSocketLink { stream })),
            Ok(Err(err)) => Err(TransportError::Connect {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }),
            Err(_) => Err(TransportError::Timeout {
                endpoint: endpoint.to_string(),
                timeout: self.connect_timeout,
            }),
        }
    }
}

struct WebSocketLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl TransportLink for WebSocketLink {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => tracing::debug!("Skipping non-UTF-8 binary frame"),
                },
                Ok(Message::Close(_)) => return None,
                // ping/pong are answered by tungstenite itself
                Ok(_) => {}
                Err(err) => return Some(Err(TransportError::Socket(err.to_string()))),
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|err| TransportError::Socket(err.to_string()))
    }

    async fn close(&mut self) {
        if let Err(err) = self.stream.close(None).await {
            tracing::debug!("Websocket close: {}", err);
        }
    }
}
