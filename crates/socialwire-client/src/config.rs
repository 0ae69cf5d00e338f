//! Client tuning.

use socialwire_core::DEFAULT_QUEUE_CAPACITY;
use std::time::Duration;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Maximum sends held while disconnected.
    pub queue_capacity: usize,
    /// Delay schedule between connection attempts.
    pub reconnect: ReconnectPolicy,
    /// Reject in-flight calls that get no reply within this long.
    pub request_timeout: Option<Duration>,
    /// Capacity of the server error broadcast channel.
    pub error_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            reconnect: ReconnectPolicy::default(),
            request_timeout: None,
            error_capacity: 64,
        }
    }
}

/// Capped exponential backoff between connection attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any delay.
    pub max_delay: Duration,
    /// Factor applied after every failed attempt.
    pub multiplier: u32,
}

impl ReconnectPolicy {
    /// Retry every `delay`, forever.
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            multiplier: 2,
        }
    }
}

/// Floor on every reconnect delay, so a zero in the config cannot spin.
pub const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(10);

/// Position in a [`ReconnectPolicy`] schedule.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    next: Duration,
}

impl Backoff {
    #[must_use]
    pub fn new(mut policy: ReconnectPolicy) -> Self {
        policy.max_delay = policy.max_delay.max(MIN_RECONNECT_DELAY);
        policy.initial_delay = policy
            .initial_delay
            .clamp(MIN_RECONNECT_DELAY, policy.max_delay);
        let next = policy.initial_delay;
        Self { policy, next }
    }

    /// Delay to wait now; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = delay
            .saturating_mul(self.policy.multiplier.max(1))
            .min(self.policy.max_delay);
        delay
    }

    /// Start over after a successful connection.
    pub fn reset(&mut self) {
        self.next = self.policy.initial_delay;
    }
}
