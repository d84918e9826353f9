//! CMIT core: transport-agnostic protocol primitives and error types.
//!
//! This crate defines the wire-level contracts (envelope, frames, codec) and
//! the error surface shared by the server, the client and integrators. It
//! carries no runtime dependencies so it can be reused outside tokio.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths surface as `CmitError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

pub use error::{ClientCode, CmitError, Result};
