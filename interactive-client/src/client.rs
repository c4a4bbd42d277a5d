//! Thin wrapper exposing `execute(method, params)` and event
//! subscription, distinguishing client role by an extra connect-time
//! header.
//!
//! Higher-level RPCs (scene/control CRUD, "ready" signalling, transaction
//! capture) are thin callers of [`Client::execute`] and live outside this
//! crate.

use interactive_core::options::SocketOptions;
use interactive_core::socket::{Socket, SocketEvent, SocketHandle, SocketState};
use serde_json::Value;
use tokio::sync::broadcast;

use interactive_core::error::ExecuteError;

/// Which side of the protocol a [`Client`] speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The "game" side: publishes scenes and controls. Adds
    /// `X-Interactive-Version` to every connect attempt.
    Game {
        /// Project/version id advertised via `X-Interactive-Version`.
        version_id: &'static str,
    },
    /// The "participant" side: reacts to pushed scenes/controls. No
    /// extra header beyond the Socket defaults.
    Participant,
}

/// A role-tagged facade over a [`Socket`].
///
/// Construct with [`Client::connect`], then call [`Client::execute`] for
/// requests and [`Client::subscribe`] for server-pushed methods.
pub struct Client {
    role: Role,
    handle: SocketHandle,
}

impl Client {
    /// Spawns the underlying Socket with role-appropriate headers merged
    /// into `options`, and requests a connection.
    #[must_use]
    pub fn connect(role: Role, stream_url: impl Into<String>, mut options: SocketOptions) -> Self {
        if let Role::Game { version_id } = role {
            options = options.with_header("X-Interactive-Version", version_id);
        }

        let handle = Socket::spawn(stream_url, options);
        handle.connect();
        Self { role, handle }
    }

    /// The role this client was constructed with.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Sugar for [`SocketHandle::execute`].
    ///
    /// # Errors
    ///
    /// See [`ExecuteError`].
    pub async fn execute(&self, method: impl Into<String>, params: Value) -> Result<Value, ExecuteError> {
        self.handle.execute(method, params, false).await
    }

    /// As [`Client::execute`], but does not wait for (or expect) a reply.
    ///
    /// # Errors
    ///
    /// See [`ExecuteError`].
    pub async fn execute_discard(&self, method: impl Into<String>, params: Value) -> Result<Value, ExecuteError> {
        self.handle.execute(method, params, true).await
    }

    /// Subscribes to the underlying Socket's event stream (pushes,
    /// opens, closes, errors).
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SocketEvent> {
        self.handle.subscribe()
    }

    /// Current connection state.
    pub async fn state(&self) -> SocketState {
        self.handle.state().await
    }

    /// Requests a clean close.
    pub fn close(&self) {
        self.handle.close();
    }

    /// The underlying handle, for callers that need lower-level access
    /// (cancellation by id, queue inspection).
    #[must_use]
    pub fn socket(&self) -> &SocketHandle {
        &self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_role_carries_version_id() {
        let role = Role::Game { version_id: "42" };
        match role {
            Role::Game { version_id } => assert_eq!(version_id, "42"),
            Role::Participant => panic!("expected Game"),
        }
    }
}
