use async_trait::async_trait;
use async_tungstenite::async_std::{connect_async, ConnectStream};
use async_tungstenite::tungstenite;
use async_tungstenite::tungstenite::Message;
use async_tungstenite::WebSocketStream;
use futures::{SinkExt, StreamExt};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket failure: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("connection closed")]
    Closed,
}

/// Opens links to the gateway. Every call is a fresh connection attempt.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Link>, TransportError>;
}

/// One open connection carrying text frames.
#[async_trait]
pub trait Link: Send {
    /// Next text frame. `None` once the peer has closed the connection.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    async fn close(&mut self);
}

pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn Link>, TransportError> {
        let (stream, response) = connect_async(url).await?;
        debug!["Websocket handshake with {} answered {}", url, response.status()];

        Ok(Box::new(WebSocketLink { stream }))
    }
}

struct WebSocketLink {
    stream: WebSocketStream<ConnectStream>,
}

#[async_trait]
impl Link for WebSocketLink {
    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => warn!["Dropping binary frame that is not UTF-8"],
                },
                Ok(Message::Close(frame)) => {
                    debug!["Server closed the websocket: {:?}", frame];
                    return None;
                }
                // Pings are answered by tungstenite itself
                Ok(_) => {}
                Err(err) => return Some(Err(err.into())),
            }
        }

        None
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(err) = SinkExt::close(&mut self.stream).await {
            debug!["Error while closing websocket: {}", err];
        }
    }
}
