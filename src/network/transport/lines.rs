//! Line-oriented transport for plain TCP clients (e.g. `nc`).

use super::{Inbound, Transport};
use crate::error::TransportError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, Framed, LinesCodec, LinesCodecError};

/// `LinesCodec` that reports bad lines as items instead of stream errors.
///
/// `Framed` stops decoding buffered input after a decoder error until more
/// bytes arrive, which would stall the lines queued behind a bad one.
struct LineCodec {
    inner: LinesCodec,
}

type Line = Result<String, TransportError>;

fn map_line(result: Result<Option<String>, LinesCodecError>) -> Result<Option<Line>, std::io::Error> {
    match result {
        Ok(line) => Ok(line.map(Ok)),
        Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Err(TransportError::Decode(
            "line exceeds maximum length".to_string(),
        )))),
        // LinesCodec has already consumed the offending line.
        Err(LinesCodecError::Io(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
            Ok(Some(Err(TransportError::Decode(format!("invalid line: {e}")))))
        }
        Err(LinesCodecError::Io(e)) => Err(e),
    }
}

impl Decoder for LineCodec {
    type Item = Line;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Line>, std::io::Error> {
        map_line(self.inner.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Line>, std::io::Error> {
        map_line(self.inner.decode_eof(buf))
    }
}

impl<'a> Encoder<&'a str> for LineCodec {
    type Error = std::io::Error;

    fn encode(&mut self, line: &'a str, buf: &mut BytesMut) -> Result<(), std::io::Error> {
        self.inner.encode(line, buf).map_err(|e| match e {
            LinesCodecError::Io(e) => e,
            LinesCodecError::MaxLineLengthExceeded => std::io::ErrorKind::InvalidInput.into(),
        })
    }
}

/// One message per `\n`-terminated line. A trailing `\r` is stripped.
pub struct LineTransport<S> {
    framed: Framed<S, LineCodec>,
}

impl<S> LineTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, max_message_bytes: usize) -> Self {
        let codec = LineCodec {
            inner: LinesCodec::new_with_max_length(max_message_bytes),
        };
        Self {
            framed: Framed::new(stream, codec),
        }
    }
}

#[async_trait]
impl<S> Transport for LineTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn kind(&self) -> &'static str {
        "lines"
    }

    async fn recv(&mut self) -> Option<Result<Inbound, TransportError>> {
        match self.framed.next().await? {
            Ok(line) => Some(line.map(Inbound::Message)),
            Err(e) => Some(Err(TransportError::Io(e))),
        }
    }

    async fn send(&mut self, text: &str) -> Result<(), TransportError> {
        self.framed.send(text).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        SinkExt::<&str>::close(&mut self.framed).await?;
        Ok(())
    }
}
