//! Top-level facade crate for CMIT.
//!
//! Re-exports the protocol core and the server library so users can depend
//! on a single crate.

pub mod core {
    pub use cmit_core::*;
}

pub mod server {
    pub use cmit_server::*;
}

pub use cmit_core::protocol::{Envelope, Request, Response, Status};
pub use cmit_core::{CmitError, Result};
pub use cmit_server::{Client, ServerBuilder, ServerConfig};
