//! Status tokens and protocol versions.
//!
//! Statuses are open protocol strings: the engine only emits `ok` and `error`,
//! but handlers may answer with any whitespace-free token.

use std::borrow::Cow;
use std::fmt;

use crate::error::{CmitError, Result};

/// Version written when no request version is known.
pub const DEFAULT_VERSION: &str = "CMIT/1.0";

/// Only this major version is served.
pub const SUPPORTED_MAJOR: u16 = 1;

const VERSION_PREFIX: &str = "CMIT/";

/// Response status token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Status(Cow<'static, str>);

impl Status {
    pub const OK: Status = Status(Cow::Borrowed("ok"));
    pub const ERROR: Status = Status(Cow::Borrowed("error"));

    /// Custom status; must be a non-empty token without whitespace.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        validate_token("status", &token)?;
        Ok(Self(Cow::Owned(token)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_ok(&self) -> bool {
        *self == Self::OK
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parsed `CMIT/<major>.<minor>` (the `CMIT/` prefix is optional).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    pub fn parse(token: &str) -> Result<Self> {
        let bad = || CmitError::UnsupportedVersion(format!("bad protocol version ({token})"));

        let number = token.strip_prefix(VERSION_PREFIX).unwrap_or(token);
        let (major, minor) = number.split_once('.').ok_or_else(bad)?;
        Ok(Self {
            major: parse_part(major).ok_or_else(bad)?,
            minor: parse_part(minor).ok_or_else(bad)?,
        })
    }

    /// Parse and reject majors this engine does not serve.
    pub fn check(token: &str) -> Result<Self> {
        let version = Self::parse(token)?;
        if version.major != SUPPORTED_MAJOR {
            return Err(CmitError::UnsupportedVersion(format!(
                "invalid CMIT version ({}.{})",
                version.major, version.minor
            )));
        }
        Ok(version)
    }
}

fn parse_part(part: &str) -> Option<u16> {
    if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

/// Verbs, versions and statuses are single whitespace-free tokens.
pub fn validate_token(kind: &str, token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(CmitError::BadRequest(format!("{kind} must not be empty")));
    }
    if token.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CmitError::BadRequest(format!(
            "{kind} must not contain whitespace ({token:?})"
        )));
    }
    Ok(())
}
