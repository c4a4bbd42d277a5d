//! Socket configuration options.
//!
//! Mirrors the builder-chain shape of a ZeroMQ-style options struct
//! (`with_*` methods returning `Self`), carrying the knobs `Socket` and
//! `Preflight` need rather than ZMQ's `ZMQ_*` sockopt surface.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::reconnect::{ExponentialBackoff, ReconnectionPolicy};

/// Default reply timeout for a Packet with no per-packet override.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Fallback timeout bounding how long a Packet may sit queued while the
/// Socket is not Connected. Hard-coded per the protocol's design notes —
/// not exposed as a configurable option.
pub const QUEUED_FALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

/// Protocol version advertised on every connect attempt, merged into the
/// default connect-time headers.
pub const PROTOCOL_VERSION: &str = "2.0";

/// A future that resolves (or rejects by returning `Err`) before a
/// (re)connection attempt proceeds. Mirrors the "caller-supplied
/// `reconnectChecker`" described for connect-time composition.
pub type ReconnectChecker =
    Arc<dyn Fn() -> futures_util::future::BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// Configuration for a [`crate::socket::Socket`].
///
/// # Examples
///
/// ```
/// use interactive_core::options::SocketOptions;
/// use std::time::Duration;
///
/// let opts = SocketOptions::default()
///     .with_reply_timeout(Duration::from_secs(5))
///     .with_auth_token("secret-token");
/// ```
pub struct SocketOptions {
    /// Default reply timeout applied to a Packet with no per-packet
    /// override.
    pub reply_timeout: Duration,

    /// Reconnection policy used to schedule retries after a recoverable
    /// close. Boxed so callers may plug in alternative implementations.
    pub reconnect_policy: Box<dyn ReconnectionPolicy>,

    /// Bearer token added as `Authorization: Bearer <token>` to every
    /// connect attempt (preflight and stream upgrade), if set.
    pub auth_token: Option<String>,

    /// Extra headers merged into the default connect-time headers.
    /// Caller values win on key conflict with the defaults.
    pub extra_headers: HashMap<String, String>,

    /// Extra query parameters appended to the stream URL. Caller values
    /// win on conflict with any existing query parameter of the same name.
    pub extra_query: HashMap<String, String>,

    /// Whether `preflight` is performed before the initial connect and
    /// before every reconnect attempt.
    pub preflight_enabled: bool,

    /// Optional checker awaited before each (re)connection attempt; may
    /// delay or reject the attempt.
    pub reconnect_checker: Option<ReconnectChecker>,
}

impl fmt::Debug for SocketOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketOptions")
            .field("reply_timeout", &self.reply_timeout)
            .field("reconnect_policy", &self.reconnect_policy)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("extra_headers", &self.extra_headers)
            .field("extra_query", &self.extra_query)
            .field("preflight_enabled", &self.preflight_enabled)
            .field("reconnect_checker", &self.reconnect_checker.is_some())
            .finish()
    }
}

impl Clone for SocketOptions {
    fn clone(&self) -> Self {
        Self {
            reply_timeout: self.reply_timeout,
            reconnect_policy: self.reconnect_policy.clone(),
            auth_token: self.auth_token.clone(),
            extra_headers: self.extra_headers.clone(),
            extra_query: self.extra_query.clone(),
            preflight_enabled: self.preflight_enabled,
            reconnect_checker: self.reconnect_checker.clone(),
        }
    }
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            reconnect_policy: Box::new(ExponentialBackoff::default()),
            auth_token: None,
            extra_headers: HashMap::new(),
            extra_query: HashMap::new(),
            preflight_enabled: true,
            reconnect_checker: None,
        }
    }
}

impl SocketOptions {
    /// Create new socket options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default reply timeout.
    ///
    /// # Examples
    ///
    /// ```
    /// use interactive_core::options::SocketOptions;
    /// use std::time::Duration;
    ///
    /// let opts = SocketOptions::new().with_reply_timeout(Duration::from_millis(50));
    /// ```
    #[must_use]
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Replace the reconnection policy.
    #[must_use]
    pub fn with_reconnect_policy(mut self, policy: impl ReconnectionPolicy + 'static) -> Self {
        self.reconnect_policy = Box::new(policy);
        self
    }

    /// Set the bearer auth token.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Merge an extra connect-time header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }

    /// Merge an extra query parameter.
    #[must_use]
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_query.insert(key.into(), value.into());
        self
    }

    /// Disable the preflight probe (it is enabled by default).
    #[must_use]
    pub fn without_preflight(mut self) -> Self {
        self.preflight_enabled = false;
        self
    }

    /// Install a checker awaited before each (re)connection attempt.
    #[must_use]
    pub fn with_reconnect_checker(mut self, checker: ReconnectChecker) -> Self {
        self.reconnect_checker = Some(checker);
        self
    }

    /// Builds the full connect-time header set: the protocol-version
    /// default, merged extra headers, and the bearer token if configured.
    #[must_use]
    pub fn connect_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::with_capacity(self.extra_headers.len() + 2);
        headers.insert("X-Protocol-Version".to_string(), PROTOCOL_VERSION.to_string());
        headers.extend(self.extra_headers.clone());
        if let Some(token) = &self.auth_token {
            headers.insert("Authorization".to_string(), format!("Bearer {token}"));
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let opts = SocketOptions::default();
        assert_eq!(opts.reply_timeout, Duration::from_secs(10));
        assert!(opts.auth_token.is_none());
        assert!(opts.preflight_enabled);
    }

    #[test]
    fn builder_pattern() {
        let opts = SocketOptions::new()
            .with_reply_timeout(Duration::from_millis(50))
            .with_auth_token("tok-123")
            .with_header("X-Custom", "value");

        assert_eq!(opts.reply_timeout, Duration::from_millis(50));
        assert_eq!(opts.auth_token.as_deref(), Some("tok-123"));
        assert_eq!(opts.extra_headers.get("X-Custom").map(String::as_str), Some("value"));
    }

    #[test]
    fn connect_headers_merge_defaults_and_auth() {
        let opts = SocketOptions::new()
            .with_auth_token("abc")
            .with_header("X-Custom", "1");

        let headers = opts.connect_headers();
        assert_eq!(headers.get("X-Protocol-Version").map(String::as_str), Some("2.0"));
        assert_eq!(headers.get("Authorization").map(String::as_str), Some("Bearer abc"));
        assert_eq!(headers.get("X-Custom").map(String::as_str), Some("1"));
    }

    #[test]
    fn without_preflight_disables_probe() {
        let opts = SocketOptions::new().without_preflight();
        assert!(!opts.preflight_enabled);
    }
}
