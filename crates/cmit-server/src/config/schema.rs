use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use cmit_core::error::{CmitError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            version: 1,
            server: ServerSection::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults bound to `socket_path`.
    pub fn for_socket(socket_path: impl Into<PathBuf>) -> Self {
        let mut cfg = Self::default();
        cfg.server.socket_path = socket_path.into();
        cfg
    }

    pub fn with_session_mode(mut self, mode: SessionMode) -> Self {
        self.server.session_mode = mode;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(CmitError::UnsupportedVersion(format!(
                "config version {}",
                self.version
            )));
        }

        self.server.validate()?;

        Ok(())
    }
}

/// Whether a session serves one request or loops until the peer leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    #[default]
    SingleShot,
    Persistent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    #[serde(default)]
    pub session_mode: SessionMode,

    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Unix permission bits applied to the socket file.
    #[serde(default = "default_socket_mode")]
    pub socket_mode: u32,

    #[serde(default)]
    pub read_timeout_ms: Option<u64>,

    #[serde(default)]
    pub write_timeout_ms: Option<u64>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            session_mode: SessionMode::default(),
            max_frame_bytes: default_max_frame_bytes(),
            socket_mode: default_socket_mode(),
            read_timeout_ms: None,
            write_timeout_ms: None,
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        if self.socket_path.as_os_str().is_empty() {
            return Err(CmitError::BadRequest(
                "server.socket_path must not be empty".into(),
            ));
        }
        if !(256..=16 * 1024 * 1024).contains(&self.max_frame_bytes) {
            return Err(CmitError::BadRequest(
                "server.max_frame_bytes must be between 256 and 16777216".into(),
            ));
        }
        if self.socket_mode > 0o777 {
            return Err(CmitError::BadRequest(
                "server.socket_mode must be a permission mask (<= 0o777)".into(),
            ));
        }
        for (name, value) in [
            ("read_timeout_ms", self.read_timeout_ms),
            ("write_timeout_ms", self.write_timeout_ms),
        ] {
            if let Some(ms) = value {
                if !(1..=3_600_000).contains(&ms) {
                    return Err(CmitError::BadRequest(format!(
                        "server.{name} must be between 1 and 3600000"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/cmitp.sock")
}
fn default_max_frame_bytes() -> usize {
    cmit_core::protocol::DEFAULT_MAX_FRAME_BYTES
}
fn default_socket_mode() -> u32 {
    0o600
}
