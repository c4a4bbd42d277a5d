//! Reconnection policy: a lazy sequence of backoff delays, resettable.
//!
//! The [`Socket`](crate::socket::Socket) treats a [`ReconnectionPolicy`] as an
//! opaque producer — it only calls [`ReconnectionPolicy::next`] and
//! [`ReconnectionPolicy::reset`]. The default [`ExponentialBackoff`]
//! implementation follows the same doubling-with-cap shape as libzmq's
//! `ZMQ_RECONNECT_IVL`/`ZMQ_RECONNECT_IVL_MAX`, plus a small jitter so that a
//! fleet of clients reconnecting after a shared outage does not thunder the
//! server all at once.

use std::time::Duration;

use rand::Rng;

/// Produces a lazy sequence of reconnect delays.
///
/// Implementers may supply alternative policies (e.g. constant delay, full
/// jitter, a fixed number of quick retries followed by a long pause); the
/// [`Socket`](crate::socket::Socket) never inspects the concrete type.
pub trait ReconnectionPolicy: std::fmt::Debug + Send {
    /// Returns the delay, in milliseconds, before the next reconnection
    /// attempt. Each call advances the sequence.
    fn next(&mut self) -> Duration;

    /// Returns the sequence to its initial element.
    fn reset(&mut self);

    /// Clones this policy into a new box. Lets `Box<dyn ReconnectionPolicy>`
    /// be cloned without knowing the concrete type (see
    /// [`crate::options::SocketOptions`], which is itself `Clone`).
    fn box_clone(&self) -> Box<dyn ReconnectionPolicy>;
}

impl Clone for Box<dyn ReconnectionPolicy> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Exponential backoff with a ceiling and uniform jitter.
///
/// Delays are of the form `base * 2^attempt`, capped at `max`, then jittered
/// by `±jitter_ratio` (default 10%) so the returned delay never exceeds
/// `max * (1 + jitter_ratio)`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    jitter_ratio: f64,
    attempt: u32,
}

impl ExponentialBackoff {
    /// Default base delay: 500ms.
    pub const DEFAULT_BASE: Duration = Duration::from_millis(500);
    /// Default ceiling: 30s.
    pub const DEFAULT_MAX: Duration = Duration::from_secs(30);
    /// Default jitter ratio: ±10%.
    pub const DEFAULT_JITTER_RATIO: f64 = 0.1;

    /// Creates a policy with the given base delay and ceiling, default jitter.
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            jitter_ratio: Self::DEFAULT_JITTER_RATIO,
            attempt: 0,
        }
    }

    /// Overrides the jitter ratio (0.0 disables jitter).
    #[must_use]
    pub fn with_jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio.max(0.0);
        self
    }

    /// Current attempt counter (0 = no attempt made since construction/reset).
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    fn undelayed(&self) -> Duration {
        // 1 << 31 would overflow u32, so shifts are capped well below that.
        let shift = self.attempt.min(16);
        self.base
            .checked_mul(1_u32 << shift)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE, Self::DEFAULT_MAX)
    }
}

impl ReconnectionPolicy for ExponentialBackoff {
    fn next(&mut self) -> Duration {
        let capped = self.undelayed();
        self.attempt += 1;

        if self.jitter_ratio <= 0.0 {
            return capped;
        }
        let jitter = rand::thread_rng().gen_range(-self.jitter_ratio..=self.jitter_ratio);
        let factor = (1.0 + jitter).max(0.0);
        capped.mul_f64(factor)
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }

    fn box_clone(&self) -> Box<dyn ReconnectionPolicy> {
        Box::new(self.clone())
    }
}
