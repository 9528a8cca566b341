//! Websocket transport over `tokio-tungstenite`.

use crate::error::{SubscribeError, SubscribeResult};
use crate::transport::{Connector, FrameSource};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use url::Url;

/// Connector dialing real `ws://` / `wss://` endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    /// Creates a websocket connector.
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    type Source = WsFrameSource;

    async fn connect(&self, url: &Url) -> SubscribeResult<WsFrameSource> {
        debug!(%url, "dialing subscription endpoint");
        let (stream, response) = connect_async(url.as_str())
            .await
            .map_err(|e| SubscribeError::transport(format!("websocket dial failed: {e}")))?;
        debug!(status = %response.status(), "websocket established");
        Ok(WsFrameSource { stream })
    }
}

/// A live websocket connection.
///
/// Only binary messages become frames; pings are answered inline, text
/// and stray control messages are ignored, and a close handshake or
/// stream end surfaces as a transport error so the session reconnects.
pub struct WsFrameSource {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl FrameSource for WsFrameSource {
    async fn next_frame(&mut self) -> SubscribeResult<Vec<u8>> {
        loop {
            let message = match self.stream.next().await {
                None => return Err(SubscribeError::transport("connection closed")),
                Some(Err(e)) => {
                    return Err(SubscribeError::transport(format!("read failed: {e}")))
                }
                Some(Ok(message)) => message,
            };

            match message {
                Message::Binary(bytes) => return Ok(bytes),
                Message::Ping(payload) => {
                    // Keepalive; a send failure will surface on the
                    // next read anyway.
                    let _ = self.stream.send(Message::Pong(payload)).await;
                }
                Message::Close(frame) => {
                    let reason = frame
                        .map(|f| f.reason.into_owned())
                        .unwrap_or_else(|| "no reason".to_string());
                    return Err(SubscribeError::transport(format!(
                        "server closed connection: {reason}"
                    )));
                }
                Message::Text(_) | Message::Pong(_) | Message::Frame(_) => {
                    trace!("ignoring non-binary message");
                }
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
