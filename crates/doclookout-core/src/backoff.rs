//! Retry delay computation.
//!
//! After `n` consecutive failures a document waits
//! `min(interval * 2^n, cap)` before its next attempt, where the cap is
//! the larger of the configured maximum backoff and the poll interval.
//! Every scheduled delay then gets a bounded random perturbation so that
//! documents sharing an interval drift apart.
//!
//! All arithmetic is done in whole milliseconds with checked/saturating
//! operations.

use std::time::Duration;

use rand::Rng;

/// Default jitter, as a percentage of the delay.
pub const DEFAULT_JITTER_PERCENT: u8 = 10;

/// Exponents above this already exceed any realistic cap.
const MAX_EXPONENT: u32 = 32;

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Delay before the next attempt after `failures` consecutive failures.
///
/// Zero failures yields the plain interval. The result is non-decreasing
/// in `failures` and never exceeds `max(max_backoff, interval)`.
pub fn backoff_delay(interval: Duration, failures: u32, max_backoff: Duration) -> Duration {
    let interval_ms = as_millis(interval);
    let cap_ms = as_millis(max_backoff).max(interval_ms);
    let factor = 1_u64
        .checked_shl(failures.min(MAX_EXPONENT))
        .unwrap_or(u64::MAX);
    let delay_ms = interval_ms.saturating_mul(factor).min(cap_ms);
    Duration::from_millis(delay_ms)
}

/// Perturb `delay` by a random amount within `±ratio_percent`.
///
/// A ratio above 100 is treated as 100, so the result is never negative.
pub fn apply_jitter<R: Rng + ?Sized>(delay: Duration, ratio_percent: u8, rng: &mut R) -> Duration {
    let delay_ms = as_millis(delay);
    let ratio = u64::from(ratio_percent.min(100));
    let spread = delay_ms.saturating_mul(ratio).checked_div(100).unwrap_or(0);
    if spread == 0 {
        return delay;
    }
    let low = delay_ms.saturating_sub(spread);
    let high = delay_ms.saturating_add(spread);
    Duration::from_millis(rng.random_range(low..=high))
}

/// [`apply_jitter`] with the thread-local generator.
pub fn jittered(delay: Duration, ratio_percent: u8) -> Duration {
    apply_jitter(delay, ratio_percent, &mut rand::rng())
}
