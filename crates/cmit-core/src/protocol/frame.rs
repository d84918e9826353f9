//! Request and response frames.

use serde_json::{json, Value};

use crate::error::CmitError;

use super::message::{new_message_id, posix_now, Envelope};
use super::status::{Status, DEFAULT_VERSION};

/// `<VERB> <VERSION>` head plus envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub verb: String,
    pub version: String,
    pub envelope: Envelope,
}

impl Request {
    /// Request at the default protocol version.
    pub fn new(verb: impl Into<String>, envelope: Envelope) -> Self {
        Self {
            verb: verb.into(),
            version: DEFAULT_VERSION.to_string(),
            envelope,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn id(&self) -> &str {
        self.envelope.id()
    }

    pub fn topic(&self) -> &str {
        &self.envelope.topic
    }

    pub fn payload(&self) -> Option<&Value> {
        self.envelope.payload.as_ref()
    }
}

/// `<VERSION> <STATUS> <REASON>` head plus envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub version: String,
    pub status: Status,
    pub reason: String,
    pub envelope: Envelope,
}

impl Response {
    /// Reply correlated with `req`: id, timestamp, topic and version are mirrored.
    pub fn reply(
        req: &Request,
        status: Status,
        reason: impl Into<String>,
        payload: Option<Value>,
    ) -> Self {
        let mut envelope = req.envelope.reply();
        envelope.payload = payload;
        Self {
            version: req.version.clone(),
            status,
            reason: reason.into(),
            envelope,
        }
    }

    pub fn ok(req: &Request, payload: Option<Value>) -> Self {
        Self::reply(req, Status::OK, "OK", payload)
    }

    /// Error reply correlated with a parsed request.
    pub fn error_for(req: &Request, err: &CmitError) -> Self {
        Self::error(Some(&req.version), Some(&req.envelope), err)
    }

    /// Error reply; falls back to a generated envelope when the request body
    /// never parsed.
    pub fn error(version: Option<&str>, envelope: Option<&Envelope>, err: &CmitError) -> Self {
        let code = err.client_code();
        let mut envelope = match envelope {
            Some(env) => env.reply(),
            None => Envelope::new(format!("error.{}", code.as_str().to_ascii_lowercase()))
                .with_id(new_message_id())
                .with_timestamp(posix_now()),
        };
        envelope.payload = Some(json!({
            "code": code.as_str(),
            "reason": err.to_string(),
        }));
        Self {
            version: version.unwrap_or(DEFAULT_VERSION).to_string(),
            status: Status::ERROR,
            reason: code.phrase().to_string(),
            envelope,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    pub fn id(&self) -> &str {
        self.envelope.id()
    }

    pub fn topic(&self) -> &str {
        &self.envelope.topic
    }

    pub fn payload(&self) -> Option<&Value> {
        self.envelope.payload.as_ref()
    }
}
