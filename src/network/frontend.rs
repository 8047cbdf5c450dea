//! Routing of accepted WebSocket-listener sockets.
//!
//! Every socket on the WebSocket listener starts as an HTTP request. The
//! request line is peeked without consuming it: the configured path goes
//! through the WebSocket upgrade, anything else belongs to the document
//! server and is relayed to `listen.fallback` untouched, or answered
//! with `404 Not Found` when no fallback is configured.

use crate::config::ListenConfig;
use crate::error::HandshakeError;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{StatusCode, header};
use tracing::{debug, warn};

/// Longest request line we are willing to peek at.
const MAX_REQUEST_LINE: usize = 8192;

const PEEK_RETRY: Duration = Duration::from_millis(10);

const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

const NOT_FOUND: &[u8] =
    b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// Where an accepted socket should go.
#[derive(Debug, PartialEq, Eq)]
pub enum Route {
    /// Upgrade to a WebSocket.
    Upgrade,
    /// Not ours; hand to the document server.
    Delegate,
}

/// Decide the route for a socket by peeking at its request line.
pub async fn route(stream: &TcpStream, path: &str) -> Result<Route, HandshakeError> {
    let mut buf = vec![0u8; MAX_REQUEST_LINE];
    loop {
        let n = stream.peek(&mut buf).await?;
        if n == 0 {
            return Err(HandshakeError::Rejected("connection closed before request"));
        }
        let head = &buf[..n];
        if let Some(end) = head.iter().position(|&b| b == b'\n') {
            return Ok(route_request_line(&head[..end], path));
        }
        if n == buf.len() {
            return Err(HandshakeError::Rejected("request line too long"));
        }
        // Partial line. Peeking leaves the socket readable, so poll again
        // after a pause instead of waiting on readiness.
        tokio::time::sleep(PEEK_RETRY).await;
    }
}

/// Match the target of `GET /path?query HTTP/1.1` against `path`.
fn route_request_line(line: &[u8], path: &str) -> Route {
    let line = String::from_utf8_lossy(line);
    let target = line.split_whitespace().nth(1).unwrap_or("");
    let target_path = target.split(['?', '#']).next().unwrap_or("");
    if target_path == path {
        Route::Upgrade
    } else {
        Route::Delegate
    }
}

/// Perform the WebSocket upgrade, enforcing the origin allow-list.
pub async fn upgrade(
    stream: TcpStream,
    addr: SocketAddr,
    config: &ListenConfig,
) -> Result<WebSocketStream<TcpStream>, HandshakeError> {
    let origin_check = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let origin = req
            .headers()
            .get(header::ORIGIN)
            .and_then(|o| o.to_str().ok());
        if config.origin_allowed(origin) {
            return Ok(response);
        }
        warn!(%addr, origin = origin.unwrap_or("<none>"), "WebSocket origin rejected");
        let mut reject = ErrorResponse::new(Some("origin not allowed".to_string()));
        *reject.status_mut() = StatusCode::FORBIDDEN;
        Err(reject)
    };

    Ok(accept_hdr_async(stream, origin_check).await?)
}

/// Hand a socket that is not ours to the document server, or answer 404.
///
/// The bytes already peeked are still in the socket, so the fallback sees
/// the request exactly as the client sent it.
pub async fn delegate(
    mut stream: TcpStream,
    addr: SocketAddr,
    fallback: Option<SocketAddr>,
) -> std::io::Result<()> {
    let Some(fallback) = fallback else {
        debug!(%addr, "no fallback configured, answering 404");
        // Closing with unread request bytes would reset the connection
        // before the client sees the response.
        let _ = tokio::time::timeout(DRAIN_TIMEOUT, drain_request_head(&mut stream)).await;
        stream.write_all(NOT_FOUND).await?;
        return stream.shutdown().await;
    };

    let mut upstream = TcpStream::connect(fallback).await?;
    let (up, down) = tokio::io::copy_bidirectional(&mut stream, &mut upstream).await?;
    debug!(%addr, %fallback, up, down, "delegated request finished");
    Ok(())
}

/// Read and discard the request up to the blank line ending its headers.
async fn drain_request_head(stream: &mut TcpStream) -> std::io::Result<()> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while head.len() < MAX_REQUEST_LINE {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
        if head.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    Ok(())
}
