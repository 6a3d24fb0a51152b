//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Applies a random factor in `1 ± jitter` to `base`, capped at `max_backoff`.
pub fn calculate_backoff_with_jitter(base: Duration, max_backoff: Duration, jitter: f64) -> Duration {
    let jitter_factor = if jitter > 0.0 {
        let mut rng = rand::thread_rng();
        1.0 + rng.gen_range(-jitter..=jitter)
    } else {
        1.0
    };

    let jittered = base.as_secs_f64() * jitter_factor;
    std::cmp::min(Duration::from_secs_f64(jittered.max(0.0)), max_backoff)
}

/// Produces successive retry delays.
///
/// The base delay starts at `initial_backoff` and grows by `multiplier` after
/// every call, never beyond `max_backoff`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    current: Duration,
    max: Duration,
    multiplier: f64,
    jitter: f64,
    attempts: u32,
}

impl Backoff {
    /// Creates a backoff from the retry configuration.
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            initial: config.initial_backoff(),
            current: config.initial_backoff(),
            max: config.max_backoff(),
            multiplier: config.multiplier(),
            jitter: config.jitter(),
            attempts: 0,
        }
    }

    /// Returns the next delay and advances the base delay.
    pub fn next_delay(&mut self) -> Duration {
        let delay = calculate_backoff_with_jitter(self.current, self.max, self.jitter);
        self.current = std::cmp::min(self.current.mul_f64(self.multiplier), self.max);
        self.attempts += 1;
        delay
    }

    /// Returns how many delays were handed out since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Starts over from the initial delay.
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }
}
