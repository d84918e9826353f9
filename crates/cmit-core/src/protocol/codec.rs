//! Frame codec (framing, parsing, serialization).
//!
//! Framing rules:
//! - a head line, exactly one blank line, the JSON body, a terminating blank line
//! - `\n` and `\r\n` are accepted on every line; `\n` is always emitted
//! - a frame is complete only once both blank-line delimiters are buffered,
//!   never merely at end of stream, so frames can be pipelined
//!
//! Malformed frames whose boundary is known are consumed before the error is
//! returned, leaving the buffer positioned at the next frame. Nothing here
//! indexes raw buffers directly.

use std::ops::Range;

use bytes::{Buf, BytesMut};
use serde_json::Value;
use tracing::{error, trace};

use crate::error::{CmitError, Result};

use super::frame::{Request, Response};
use super::message::Envelope;
use super::status::Status;

/// Default upper bound for one buffered frame.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

/// Extracts complete frames from a growing read buffer.
#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder {
    max_frame_bytes: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl FrameDecoder {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self { max_frame_bytes }
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Decode one request. `Ok(None)` means more bytes are needed.
    pub fn decode_request(&self, buf: &mut BytesMut) -> Result<Option<Request>> {
        match self.next_frame(buf)? {
            Some(raw) => raw.into_request().map(Some),
            None => Ok(None),
        }
    }

    /// Decode one response. `Ok(None)` means more bytes are needed.
    pub fn decode_response(&self, buf: &mut BytesMut) -> Result<Option<Response>> {
        match self.next_frame(buf)? {
            Some(raw) => raw.into_response().map(Some),
            None => Ok(None),
        }
    }

    fn next_frame(&self, buf: &mut BytesMut) -> Result<Option<RawFrame>> {
        skip_blank_lines(buf);
        let located = locate(&buf[..]);
        match located {
            Some(loc) if loc.consumed > self.max_frame_bytes => {
                buf.advance(loc.consumed);
                Err(CmitError::PayloadTooLarge {
                    limit: self.max_frame_bytes,
                })
            }
            Some(loc) => {
                trace!(len = loc.consumed, "frame complete");
                let bytes = buf.split_to(loc.consumed);
                Ok(Some(RawFrame { bytes, loc }))
            }
            None if buf.len() > self.max_frame_bytes => Err(CmitError::PayloadTooLarge {
                limit: self.max_frame_bytes,
            }),
            None => Ok(None),
        }
    }
}

/// Parse exactly one complete request frame.
pub fn parse_request(bytes: &[u8]) -> Result<Request> {
    let mut buf = BytesMut::from(bytes);
    let req = FrameDecoder::new(usize::MAX)
        .decode_request(&mut buf)?
        .ok_or_else(incomplete)?;
    ensure_drained(&buf)?;
    Ok(req)
}

/// Parse exactly one complete response frame.
pub fn parse_response(bytes: &[u8]) -> Result<Response> {
    let mut buf = BytesMut::from(bytes);
    let resp = FrameDecoder::new(usize::MAX)
        .decode_response(&mut buf)?
        .ok_or_else(incomplete)?;
    ensure_drained(&buf)?;
    Ok(resp)
}

pub fn serialize_request(req: &Request) -> Vec<u8> {
    frame_bytes(&format!("{} {}", req.verb, req.version), &req.envelope)
}

pub fn serialize_response(resp: &Response) -> Vec<u8> {
    let reason = resp.reason.replace(['\r', '\n'], " ");
    let head = if reason.is_empty() {
        format!("{} {}", resp.version, resp.status)
    } else {
        format!("{} {} {}", resp.version, resp.status, reason)
    };
    frame_bytes(&head, &resp.envelope)
}

/// Body keys follow field order: `id`, `timestamp`, `topic`, `payload`.
fn frame_bytes(head: &str, envelope: &Envelope) -> Vec<u8> {
    let mut out = Vec::with_capacity(head.len() + 128);
    out.extend_from_slice(head.as_bytes());
    out.extend_from_slice(b"\n\n");
    // Strings and a `Value` written into a Vec cannot fail to serialize.
    if let Err(e) = serde_json::to_writer(&mut out, envelope) {
        error!(error = %e, "envelope serialization failed");
    }
    out.extend_from_slice(b"\n\n");
    out
}

fn incomplete() -> CmitError {
    CmitError::BadRequest("incomplete frame: missing blank-line delimiter".into())
}

fn ensure_drained(rest: &[u8]) -> Result<()> {
    if rest.iter().all(u8::is_ascii_whitespace) {
        Ok(())
    } else {
        Err(CmitError::BadRequest("trailing bytes after frame".into()))
    }
}

// --------------------
// Framing
// --------------------

/// Byte ranges of one complete frame inside the buffer.
#[derive(Debug)]
struct Located {
    head: Range<usize>,
    body: Range<usize>,
    consumed: usize,
    separated: bool,
}

struct RawFrame {
    bytes: BytesMut,
    loc: Located,
}

impl RawFrame {
    fn slice(&self, range: &Range<usize>) -> &[u8] {
        self.bytes.get(range.clone()).unwrap_or_default()
    }

    fn head(&self) -> Result<&str> {
        std::str::from_utf8(self.slice(&self.loc.head))
            .map_err(|_| CmitError::BadRequest("head line is not valid UTF-8".into()))
    }

    fn envelope(&self) -> Result<Envelope> {
        if !self.loc.separated {
            return Err(CmitError::BadRequest(
                "missing blank line after head line".into(),
            ));
        }
        parse_envelope(self.slice(&self.loc.body))
    }

    fn into_request(self) -> Result<Request> {
        let (verb, version) = parse_request_line(self.head()?)?;
        let envelope = self.envelope()?;
        Ok(Request {
            verb,
            version,
            envelope,
        })
    }

    fn into_response(self) -> Result<Response> {
        let (version, status, reason) = parse_status_line(self.head()?)?;
        let envelope = self.envelope()?;
        if envelope.id.is_none() {
            return Err(CmitError::BadRequest("response body missing id".into()));
        }
        Ok(Response {
            version,
            status,
            reason,
            envelope,
        })
    }
}

/// Next line starting at `start`, without its terminator, plus the offset
/// just past the `\n`. `None` until the terminator has arrived.
fn next_line(buf: &[u8], start: usize) -> Option<(Range<usize>, usize)> {
    let rel = buf.get(start..)?.iter().position(|&b| b == b'\n')?;
    let nl = start + rel;
    let end = if nl > start && buf.get(nl - 1) == Some(&b'\r') {
        nl - 1
    } else {
        nl
    };
    Some((start..end, nl + 1))
}

fn is_blank(buf: &[u8], line: &Range<usize>) -> bool {
    buf.get(line.clone())
        .map_or(true, |l| l.iter().all(u8::is_ascii_whitespace))
}

fn skip_blank_lines(buf: &mut BytesMut) {
    loop {
        let Some((line, next)) = next_line(&buf[..], 0) else {
            break;
        };
        if !is_blank(&buf[..], &line) {
            break;
        }
        buf.advance(next);
    }
}

fn locate(buf: &[u8]) -> Option<Located> {
    let (head, after_head) = next_line(buf, 0)?;
    let (second, after_second) = next_line(buf, after_head)?;
    let separated = is_blank(buf, &second);

    // Without the separator the frame still ends at the next blank line, so
    // the stream stays aligned for whatever follows.
    let body_start = if separated { after_second } else { after_head };
    let mut cursor = body_start;
    loop {
        let (line, next) = next_line(buf, cursor)?;
        if is_blank(buf, &line) {
            return Some(Located {
                head,
                body: body_start..cursor,
                consumed: next,
                separated,
            });
        }
        cursor = next;
    }
}

// --------------------
// Head lines + body
// --------------------

fn parse_request_line(head: &str) -> Result<(String, String)> {
    let mut words = head.split_whitespace();
    match (words.next(), words.next(), words.next()) {
        (Some(verb), Some(version), None) => Ok((verb.to_string(), version.to_string())),
        _ => Err(CmitError::BadRequest(format!(
            "bad request syntax ({head:?})"
        ))),
    }
}

fn parse_status_line(head: &str) -> Result<(String, Status, String)> {
    let bad = || CmitError::BadRequest(format!("bad status line ({head:?})"));
    let (version, rest) = split_token(head).ok_or_else(bad)?;
    let (status, reason) = split_token(rest).ok_or_else(bad)?;
    Ok((version.to_string(), Status::new(status)?, reason.to_string()))
}

fn split_token(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    match s.find(char::is_whitespace) {
        Some(i) => Some((&s[..i], s[i..].trim())),
        None => Some((s, "")),
    }
}

fn parse_envelope(body: &[u8]) -> Result<Envelope> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(CmitError::BadRequest("missing message body".into()));
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| CmitError::BadRequest(format!("invalid envelope json: {e}")))?;
    if !value.is_object() {
        return Err(CmitError::BadRequest(
            "message body must be a JSON object".into(),
        ));
    }
    serde_json::from_value(value)
        .map_err(|e| CmitError::BadRequest(format!("invalid envelope: {e}")))
}
