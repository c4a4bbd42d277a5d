//! Error taxonomy.
//!
//! Distinguishes preflight HTTP errors, interactive protocol errors,
//! message-parse errors, cancellation, and timeouts, so each can be
//! surfaced to the right place (see module docs on [`crate::socket`] for
//! the surfacing policy).

use thiserror::Error;

/// Errors produced by [`crate::preflight::preflight`].
///
/// Constructed from an HTTP status and response body via
/// [`PreflightError::from_status`] — a pure function, not a mutable
/// global registry (see the module docs on [`crate::preflight`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreflightError {
    /// HTTP 400 with a body other than the success sentinel.
    #[error("preflight rejected (400 Bad Request): {message}")]
    BadRequest {
        /// Response body.
        message: String,
    },

    /// HTTP 401.
    #[error("preflight unauthorized (401): {message}")]
    Unauthorized {
        /// Response body.
        message: String,
    },

    /// HTTP 404.
    #[error("preflight route not found (404): {message}")]
    NotFound {
        /// Response body.
        message: String,
    },

    /// HTTP 409.
    #[error("preflight conflict (409): {message}")]
    Conflict {
        /// Response body.
        message: String,
    },

    /// HTTP 500.
    #[error("preflight internal server error (500): {message}")]
    InternalServer {
        /// Response body.
        message: String,
    },

    /// Any other non-success status.
    #[error("preflight failed ({status}): {message}")]
    Generic {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// The preflight request itself could not be sent (DNS, TLS, connect
    /// refused, ...).
    #[error("preflight request failed: {0}")]
    Transport(String),
}

impl PreflightError {
    /// The sentinel body that, paired with HTTP 400, means "success" rather
    /// than `BadRequest` — see [`crate::preflight`].
    pub const UPGRADE_ONLY_SENTINEL: &'static str = "Bad Request\n";

    /// Classifies an HTTP status/body pair into a typed preflight error.
    ///
    /// Callers are expected to have already special-cased `200` and the
    /// `400` + [`Self::UPGRADE_ONLY_SENTINEL`] success case; this function
    /// only ever produces a failure.
    #[must_use]
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            400 => Self::BadRequest { message: body },
            401 => Self::Unauthorized { message: body },
            404 => Self::NotFound { message: body },
            409 => Self::Conflict { message: body },
            500 => Self::InternalServer { message: body },
            other => Self::Generic {
                status: other,
                message: body,
            },
        }
    }

    /// The HTTP status carried by this error, if any (`Transport` has none).
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::BadRequest { .. } => Some(400),
            Self::Unauthorized { .. } => Some(401),
            Self::NotFound { .. } => Some(404),
            Self::Conflict { .. } => Some(409),
            Self::InternalServer { .. } => Some(500),
            Self::Generic { status, .. } => Some(*status),
            Self::Transport(_) => None,
        }
    }

    /// The response body (or transport failure description) carried by this
    /// error.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message }
            | Self::Unauthorized { message }
            | Self::NotFound { message }
            | Self::Conflict { message }
            | Self::InternalServer { message }
            | Self::Generic { message, .. } => message,
            Self::Transport(message) => message,
        }
    }
}

/// An error carried by an inbound [`crate::message::Reply`], or synthesized
/// from a non-recoverable stream close code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("interactive error {code}: {message}")]
pub struct InteractiveError {
    /// Application error code, or the stream close code for a synthesized
    /// error.
    pub code: i64,
    /// Human-readable message (empty for some synthesized close errors).
    pub message: String,
    /// Optional dotted path into the request params the error refers to.
    pub path: Option<String>,
}

impl InteractiveError {
    /// Builds the error synthesized when a non-recoverable close code is
    /// observed (spec §4.4/§6: only 1000 and 1011 are recoverable).
    #[must_use]
    pub fn from_close(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code: i64::from(code),
            message: reason.into(),
            path: None,
        }
    }
}

/// Recoverable stream close codes: automatic reconnection is attempted.
/// Any other code is terminal and surfaced as an [`InteractiveError`].
pub const RECOVERABLE_CLOSE_CODES: [u16; 2] = [1000, 1011];

/// Returns whether `code` should trigger automatic reconnection rather than
/// a terminal [`InteractiveError`].
#[must_use]
pub fn is_recoverable_close(code: u16) -> bool {
    RECOVERABLE_CLOSE_CODES.contains(&code)
}

/// A frame could not be interpreted as the wire protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageParseError {
    /// The frame was not valid JSON.
    #[error("malformed frame: {0}")]
    InvalidJson(String),
    /// The frame was valid JSON but `type` was missing or unrecognized.
    #[error("unknown frame type: {0}")]
    UnknownType(String),
}

/// The outcome of a call to [`crate::socket::SocketHandle::execute`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecuteError {
    /// The packet was cancelled (explicitly, or because the socket closed
    /// while the packet was pending/sending).
    #[error("request cancelled")]
    Cancelled,

    /// No reply arrived within the packet's timeout, or the packet sat
    /// queued longer than the queued-fallback timeout.
    #[error("request timed out")]
    Timeout,

    /// The server replied with an error, or the connection failed
    /// non-recoverably while the request was outstanding.
    #[error(transparent)]
    Interactive(#[from] InteractiveError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_status_maps_known_codes() {
        assert_eq!(
            PreflightError::from_status(409, "name taken".into()),
            PreflightError::Conflict {
                message: "name taken".into()
            }
        );
        assert_eq!(PreflightError::from_status(409, String::new()).status(), Some(409));
    }

    #[test]
    fn from_status_falls_back_to_generic() {
        let err = PreflightError::from_status(503, "down".into());
        assert!(matches!(err, PreflightError::Generic { status: 503, .. }));
    }

    #[test]
    fn close_code_classification() {
        assert!(is_recoverable_close(1000));
        assert!(is_recoverable_close(1011));
        assert!(!is_recoverable_close(4000));
        assert!(!is_recoverable_close(4006));
    }
}
