//! WebSocket transport over `tokio-tungstenite`.

use super::{Inbound, Transport, check_size};
use crate::config::Protocol;
use crate::error::TransportError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{self, Message};

/// Events a tagged client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum ClientEvent {
    Message { data: String },
    Disconnect,
}

/// The only event the server sends in tagged mode.
#[derive(Debug, Serialize)]
struct ServerEvent<'a> {
    event: &'static str,
    data: &'a str,
}

/// A WebSocket connection speaking either raw or tagged framing.
///
/// Ping/pong is answered by tungstenite while the stream is polled.
pub struct WebSocketTransport<S> {
    ws: WebSocketStream<S>,
    protocol: Protocol,
    max_message_bytes: usize,
}

impl<S> WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(ws: WebSocketStream<S>, protocol: Protocol, max_message_bytes: usize) -> Self {
        Self {
            ws,
            protocol,
            max_message_bytes,
        }
    }

    /// The size limit applies to the message text, not to the envelope.
    fn decode(&self, text: String) -> Result<Inbound, TransportError> {
        match self.protocol {
            Protocol::Raw => check_size(text, self.max_message_bytes).map(Inbound::Message),
            Protocol::Tagged => match decode_tagged(&text)? {
                Inbound::Message(data) => {
                    check_size(data, self.max_message_bytes).map(Inbound::Message)
                }
                Inbound::Disconnect => Ok(Inbound::Disconnect),
            },
        }
    }

    fn encode(&self, text: &str) -> Result<String, TransportError> {
        match self.protocol {
            Protocol::Raw => Ok(text.to_owned()),
            Protocol::Tagged => encode_tagged(text),
        }
    }
}

fn decode_tagged(text: &str) -> Result<Inbound, TransportError> {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(ClientEvent::Message { data }) => Ok(Inbound::Message(data)),
        Ok(ClientEvent::Disconnect) => Ok(Inbound::Disconnect),
        Err(e) => Err(TransportError::Decode(format!("bad event envelope: {e}"))),
    }
}

fn encode_tagged(text: &str) -> Result<String, TransportError> {
    let event = ServerEvent {
        event: "message",
        data: text,
    };
    serde_json::to_string(&event).map_err(|e| TransportError::Decode(e.to_string()))
}

#[async_trait]
impl<S> Transport for WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn kind(&self) -> &'static str {
        match self.protocol {
            Protocol::Raw => "raw",
            Protocol::Tagged => "tagged",
        }
    }

    async fn recv(&mut self) -> Option<Result<Inbound, TransportError>> {
        loop {
            let msg = match self.ws.next().await? {
                Ok(msg) => msg,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None;
                }
                Err(e) => return Some(Err(e.into())),
            };
            match msg {
                Message::Text(text) => return Some(self.decode(text)),
                Message::Binary(data) => {
                    return Some(Err(TransportError::Decode(format!(
                        "binary frame of {} bytes, expected text",
                        data.len()
                    ))));
                }
                Message::Close(_) => return None,
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn send(&mut self, text: &str) -> Result<(), TransportError> {
        let frame = self.encode(text)?;
        match self.ws.send(Message::Text(frame)).await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Err(TransportError::Closed)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Start or finish the closing handshake.
    ///
    /// When the peer closed first, tungstenite refuses a second close frame
    /// and only the queued reply is left to flush.
    async fn close(&mut self) -> Result<(), TransportError> {
        let closed = match self.ws.close(None).await {
            Err(tungstenite::Error::Protocol(ProtocolError::SendAfterClosing)) => {
                self.ws.flush().await
            }
            other => other,
        };
        match closed {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
