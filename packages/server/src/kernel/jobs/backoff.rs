//! Retry backoff policy for failed jobs.
//!
//! Delays grow exponentially with the attempt number, are capped, and carry
//! uniform jitter so that a batch of jobs failing together does not retry
//! together.

use std::time::Duration;

use rand::Rng;

/// Attempts beyond this no longer grow the delay; the doubling step would
/// overflow long before the cap matters.
const MAX_GROWTH_ATTEMPT: u32 = 30;

/// Exponential backoff with a cap and uniform jitter.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
    /// Fraction of the raw delay used as the jitter half-width, in `[0, 1]`.
    pub jitter_fraction: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            cap: Duration::from_secs(300),
            jitter_fraction: 0.2,
        }
    }
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, jitter_fraction: f64) -> Self {
        Self {
            base,
            cap,
            jitter_fraction: jitter_fraction.clamp(0.0, 1.0),
        }
    }

    /// Delay before retrying the given attempt (1-based).
    ///
    /// The RNG is injected so tests can seed it.
    pub fn delay<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let attempt = attempt.clamp(1, MAX_GROWTH_ATTEMPT);
        let raw = self
            .base
            .saturating_mul(1u32 << (attempt - 1))
            .min(self.cap);

        if self.jitter_fraction == 0.0 {
            return raw;
        }

        let raw_ms = raw.as_millis() as f64;
        let half_width = self.jitter_fraction * raw_ms;
        let jitter = rng.gen_range(-half_width..=half_width);
        let delayed = (raw_ms + jitter).clamp(0.0, self.cap.as_millis() as f64);

        Duration::from_millis(delayed as u64)
    }
}
