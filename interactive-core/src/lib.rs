//! Interactive Core
//!
//! The core of a reliable, reconnecting, request/reply transport over a
//! persistent bidirectional message stream, plus a pre-connection HTTP
//! handshake ("preflight") that surfaces authentication and routing
//! errors before the stream is opened:
//! - Error taxonomy (`error`)
//! - One-shot HTTP preflight probe (`preflight`)
//! - Pluggable backoff policy (`reconnect`)
//! - Outbound-request envelope and lifecycle (`packet`)
//! - Wire value types: Method/Reply/Push (`message`)
//! - Socket configuration builder (`options`)
//! - The connection state machine (`socket`)

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Allow some pedantic lints that are intentional in this crate
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::future_not_send)]
#![allow(clippy::missing_errors_doc)]

pub mod error;
pub mod message;
pub mod options;
pub mod packet;
pub mod preflight;
pub mod reconnect;
pub mod socket;

// A small prelude to make downstream crates ergonomic. Keep it minimal
// to avoid API lock-in.
pub mod prelude {
    pub use crate::error::{ExecuteError, InteractiveError, MessageParseError, PreflightError};
    pub use crate::message::{ErrorObject, Frame, Method, Push, Reply};
    pub use crate::options::SocketOptions;
    pub use crate::packet::{Packet, PacketState};
    pub use crate::reconnect::{ExponentialBackoff, ReconnectionPolicy};
    pub use crate::socket::{Socket, SocketError, SocketEvent, SocketHandle, SocketState};
}
