//! CMIT wire protocol.
//!
//! - `message`: the JSON envelope carried by every frame
//! - `frame`: request/response frames and correlated reply builders
//! - `status`: open status tokens and protocol versions
//! - `codec`: framing, parsing and serialization over byte streams
//!
//! All parsers are panic-free: malformed input is reported as `CmitError`
//! so one bad peer can never take the process down.

pub mod codec;
pub mod frame;
pub mod message;
pub mod status;

pub use codec::{
    parse_request, parse_response, serialize_request, serialize_response, FrameDecoder,
    DEFAULT_MAX_FRAME_BYTES,
};
pub use frame::{Request, Response};
pub use message::Envelope;
pub use status::{ProtocolVersion, Status, DEFAULT_VERSION};
