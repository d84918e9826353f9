//! Async client for a CMIT server.

use std::io;
use std::path::Path;

use bytes::BytesMut;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use cmit_core::error::{CmitError, Result};
use cmit_core::protocol::status::validate_token;
use cmit_core::protocol::{serialize_request, Envelope, FrameDecoder, Request, Response};

use crate::dispatch::builtins::{EXECUTE, PING, POLL};

/// One connection to a server.
///
/// Against a `single_shot` server each connection carries exactly one
/// request; reconnect for the next one.
pub struct Client {
    stream: UnixStream,
    buf: BytesMut,
    decoder: FrameDecoder,
}

impl Client {
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let stream = UnixStream::connect(path.as_ref()).await?;
        Ok(Self {
            stream,
            buf: BytesMut::new(),
            decoder: FrameDecoder::new(usize::MAX),
        })
    }

    /// Send `req` as is and wait for its response.
    pub async fn send(&mut self, req: &Request) -> Result<Response> {
        validate_token("verb", &req.verb)?;
        validate_token("version", &req.version)?;
        self.send_raw(&serialize_request(req)).await?;
        self.read_response().await
    }

    /// Build a request with a fresh id and timestamp and send it.
    pub async fn request(
        &mut self,
        verb: &str,
        topic: &str,
        payload: Option<Value>,
    ) -> Result<Response> {
        let mut envelope = Envelope::new(topic);
        envelope.payload = payload;
        envelope.stamp_defaults();
        self.send(&Request::new(verb, envelope)).await
    }

    pub async fn ping(&mut self, topic: &str, payload: Option<Value>) -> Result<Response> {
        self.request(PING, topic, payload).await
    }

    pub async fn execute(&mut self, topic: &str, payload: Option<Value>) -> Result<Response> {
        self.request(EXECUTE, topic, payload).await
    }

    /// Queue depth for `topic`; with `entry_id`, also that entry's summary.
    pub async fn poll(&mut self, topic: &str, entry_id: Option<&str>) -> Result<Response> {
        let payload = entry_id.map(|id| json!({ "id": id }));
        self.request(POLL, topic, payload).await
    }

    /// Write bytes without framing them.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Next response frame on this connection.
    pub async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some(resp) = self.decoder.decode_response(&mut self.buf)? {
                return Ok(resp);
            }
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return Err(CmitError::Transport(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed before a response arrived",
                )));
            }
        }
    }

    /// Close the write half so the server sees EOF.
    pub async fn finish(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
