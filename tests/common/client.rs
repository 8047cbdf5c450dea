//! Test clients.
//!
//! `WsClient` speaks WebSocket text frames; `LineClient` speaks
//! newline-terminated lines over plain TCP.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// Greeting every connection receives first.
pub const WELCOME: &str = "Welcome to the broadcast server!";

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A test WebSocket client.
pub struct WsClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[allow(dead_code)]
impl WsClient {
    /// Connect to a WebSocket URL.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let (ws, _) = connect_async(url).await?;
        Ok(Self { ws })
    }

    /// Connect sending an `Origin` header.
    pub async fn connect_with_origin(url: &str, origin: &str) -> anyhow::Result<Self> {
        let mut request = url.into_client_request()?;
        request.headers_mut().insert("Origin", origin.parse()?);
        let (ws, _) = connect_async(request).await?;
        Ok(Self { ws })
    }

    pub async fn send_text(&mut self, text: &str) -> anyhow::Result<()> {
        self.ws.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    pub async fn send_binary(&mut self, data: &[u8]) -> anyhow::Result<()> {
        self.ws.send(Message::Binary(data.to_vec())).await?;
        Ok(())
    }

    /// Receive the next text frame.
    pub async fn recv_text(&mut self) -> anyhow::Result<String> {
        self.recv_text_timeout(RECV_TIMEOUT).await
    }

    pub async fn recv_text_timeout(&mut self, dur: Duration) -> anyhow::Result<String> {
        loop {
            let msg = timeout(dur, self.ws.next())
                .await?
                .ok_or_else(|| anyhow::anyhow!("connection closed"))??;
            match msg {
                Message::Text(text) => return Ok(text),
                Message::Close(_) => anyhow::bail!("connection closed"),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
                Message::Binary(_) => anyhow::bail!("unexpected binary frame"),
            }
        }
    }

    /// Receive a text frame and check its contents.
    pub async fn expect_text(&mut self, expected: &str) -> anyhow::Result<()> {
        let got = self.recv_text().await?;
        anyhow::ensure!(got == expected, "expected {expected:?}, got {got:?}");
        Ok(())
    }

    /// Assert that nothing arrives for `dur`.
    pub async fn expect_silence(&mut self, dur: Duration) -> anyhow::Result<()> {
        match self.recv_text_timeout(dur).await {
            Ok(text) => anyhow::bail!("expected silence, got {text:?}"),
            Err(e) if e.is::<tokio::time::error::Elapsed>() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Wait for the server to end the connection.
    pub async fn expect_closed(&mut self) -> anyhow::Result<()> {
        loop {
            match timeout(RECV_TIMEOUT, self.ws.next()).await? {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return Ok(()),
                Some(Ok(Message::Text(text))) => anyhow::bail!("expected close, got {text:?}"),
                Some(Ok(_)) => continue,
            }
        }
    }

    /// Send a close frame and wait for the server to finish the handshake.
    pub async fn close(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await?;
        while let Some(msg) = self.ws.next().await {
            if msg.is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// A test line-based client.
pub struct LineClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

#[allow(dead_code)]
impl LineClient {
    pub async fn connect(address: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(address).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }

    pub async fn send_line(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn recv_line(&mut self) -> anyhow::Result<String> {
        let mut line = String::new();
        let n = timeout(RECV_TIMEOUT, self.reader.read_line(&mut line)).await??;
        anyhow::ensure!(n > 0, "connection closed");
        Ok(line.trim_end().to_string())
    }

    /// Wait for the server to close the socket.
    pub async fn expect_eof(&mut self) -> anyhow::Result<()> {
        let mut line = String::new();
        let n = timeout(RECV_TIMEOUT, self.reader.read_line(&mut line)).await??;
        anyhow::ensure!(n == 0, "expected end of stream, got {line:?}");
        Ok(())
    }
}
