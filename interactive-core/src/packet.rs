//! Envelope around one outbound [`Method`], tracking its lifecycle.
//!
//! The spec's "`send`/`cancel` events" are realized here through state
//! transitions only: [`crate::socket::Socket`] owns a single
//! `oneshot::Sender` per in-flight [`Packet`] (`PendingEntry::reply_tx`)
//! and settles it directly at every terminal branch (reply, cancel,
//! timeout, close) after calling into this module to update
//! [`PacketState`]. A second, parallel notification channel per packet
//! would just be one more thing for the Socket to keep in sync with that
//! single source of truth, so there isn't one — callers observe send/cancel
//! by reading `state()` after calling [`Packet::mark_sending`]/[`Packet::cancel`].

use std::time::Duration;

use crate::message::Method;

/// Lifecycle state of a [`Packet`].
///
/// Once a Packet reaches [`PacketState::Cancelled`] or
/// [`PacketState::Replied`] no further transitions occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketState {
    /// Enqueued, not yet written to the stream.
    Pending,
    /// Frame written; awaiting a reply.
    Sending,
    /// Cancelled, explicitly or because the Socket closed.
    Cancelled,
    /// A reply was correlated to this packet's id.
    Replied,
}

impl PacketState {
    /// Whether this state is terminal (no further transitions occur).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Replied)
    }
}

/// Envelope around exactly one outbound [`Method`].
pub struct Packet {
    method: Method,
    state: PacketState,
    timeout: Option<Duration>,
}

impl Packet {
    /// Creates a new Packet wrapping `method`, Pending, with an optional
    /// per-packet timeout override.
    #[must_use]
    pub fn new(method: Method, timeout: Option<Duration>) -> Self {
        Self {
            method,
            state: PacketState::Pending,
            timeout,
        }
    }

    /// The id of the wrapped Method. Stable for the lifetime of the
    /// Packet.
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.method.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> PacketState {
        self.state
    }

    /// Directly sets the lifecycle state. Callers must not transition out
    /// of a terminal state; this is not itself enforced here so the
    /// Socket can assert it at the call site with full context.
    pub fn set_state(&mut self, state: PacketState) {
        self.state = state;
    }

    /// Cancels the packet: transitions to [`PacketState::Cancelled`].
    /// Idempotent — calling this on an already-terminal packet is a no-op.
    pub fn cancel(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = PacketState::Cancelled;
    }

    /// Marks the packet as sent: transitions to [`PacketState::Sending`].
    pub fn mark_sending(&mut self) {
        self.state = PacketState::Sending;
    }

    /// Marks the packet as replied.
    pub fn mark_replied(&mut self) {
        self.state = PacketState::Replied;
    }

    /// The effective timeout: the per-packet override if set, otherwise
    /// `default`.
    #[must_use]
    pub fn timeout(&self, default: Duration) -> Duration {
        self.timeout.unwrap_or(default)
    }

    /// Stamps the wrapped Method with the current sequence number and
    /// returns the serializable form.
    #[must_use]
    pub fn stamp_sequence(&self, seq: u32) -> Method {
        self.method.clone().with_seq(seq)
    }

    /// Whether the caller asked not to receive a reply for this Method.
    #[must_use]
    pub const fn discard(&self) -> bool {
        self.method.discard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_method() -> Method {
        Method::new(1, "ready", json!({"isReady": true}), false)
    }

    #[test]
    fn starts_pending() {
        let packet = Packet::new(sample_method(), None);
        assert_eq!(packet.state(), PacketState::Pending);
        assert_eq!(packet.id(), 1);
    }

    #[test]
    fn cancel_is_terminal() {
        let mut packet = Packet::new(sample_method(), None);
        packet.cancel();
        assert_eq!(packet.state(), PacketState::Cancelled);
        assert!(packet.state().is_terminal());
    }

    #[test]
    fn cancel_after_replied_is_noop() {
        let mut packet = Packet::new(sample_method(), None);
        packet.mark_replied();
        packet.cancel();
        assert_eq!(packet.state(), PacketState::Replied);
    }

    #[test]
    fn mark_sending_transitions_state() {
        let mut packet = Packet::new(sample_method(), None);
        packet.mark_sending();
        assert_eq!(packet.state(), PacketState::Sending);
    }

    #[test]
    fn timeout_falls_back_to_default() {
        let packet = Packet::new(sample_method(), None);
        assert_eq!(packet.timeout(Duration::from_secs(10)), Duration::from_secs(10));

        let packet = Packet::new(sample_method(), Some(Duration::from_millis(50)));
        assert_eq!(packet.timeout(Duration::from_secs(10)), Duration::from_millis(50));
    }

    #[test]
    fn stamp_sequence_sets_seq_without_mutating_packet() {
        let packet = Packet::new(sample_method(), None);
        let stamped = packet.stamp_sequence(42);
        assert_eq!(stamped.seq, 42);
        assert_eq!(packet.stamp_sequence(0).seq, 0);
    }
}
