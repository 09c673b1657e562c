//! Reconnect pacing

use std::time::Duration;

/// Delay before the first reconnect attempt
pub const INITIAL_DELAY: Duration = Duration::from_millis(1000);

/// Ceiling on the delay between attempts
pub const MAX_DELAY: Duration = Duration::from_millis(15_000);

/// Exponential backoff between reconnection attempts
///
/// Consecutive failures double the delay up to the ceiling; a successful
/// connection resets it.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            current: INITIAL_DELAY,
        }
    }

    /// Delay to wait before the next attempt; doubles the stored delay
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(MAX_DELAY);
        delay
    }

    /// Back to the initial delay after a successful connection
    pub fn reset(&mut self) {
        self.current = INITIAL_DELAY;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
