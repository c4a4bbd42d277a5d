//! # interactive-client
//!
//! A reliable, reconnecting, request/reply client for the interactive
//! stream protocol: a persistent bidirectional message stream with a
//! pre-connection HTTP preflight probe, typed errors, and automatic
//! reconnection with backoff.
//!
//! ## Architecture
//!
//! - **`interactive-core`**: protocol-agnostic state machine — preflight,
//!   reconnection policy, packet lifecycle, wire types, the Socket actor.
//! - **`interactive-client`** (this crate): the role-tagged [`Client`]
//!   facade application code actually talks to.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use interactive_client::{Client, Role};
//! use interactive_core::options::SocketOptions;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::connect(
//!     Role::Participant,
//!     "wss://interactive.example.test/socket",
//!     SocketOptions::new().with_auth_token("token-123"),
//! );
//!
//! let result = client.execute("ready", json!({"isReady": true})).await?;
//! println!("server replied: {result}");
//! # Ok(())
//! # }
//! ```
//!
//! Higher-level RPCs (scene/control CRUD, "ready" signalling, transaction
//! capture) are out of scope for this crate: they are thin callers of
//! [`Client::execute`] built by application-facing layers.

#![warn(missing_docs)]
#![warn(clippy::all)]
// Allow some pedantic patterns
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::future_not_send)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

// Re-export the core types application code routinely needs, so most
// callers only depend on this crate.
pub use interactive_core::error::{ExecuteError, InteractiveError, MessageParseError, PreflightError};
pub use interactive_core::message::{ErrorObject, Push};
pub use interactive_core::options::SocketOptions;
pub use interactive_core::socket::{SocketError, SocketEvent, SocketState};

pub mod client;
pub use client::{Client, Role};

/// Development helpers (demos/tests)
pub mod dev_tracing;
