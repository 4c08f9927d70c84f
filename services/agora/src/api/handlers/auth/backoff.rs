//! Exponential backoff for retried identity-provider calls.
//!
//! Deliberately deterministic: no jitter, so retry schedules are exactly
//! reproducible in tests and logs.

pub(crate) const DEFAULT_FACTOR: u64 = 2;

/// Delay before retry number `attempt` (0-based):
/// `min(base_delay_ms * factor^attempt, max_delay_ms)`, saturating on
/// overflow.
#[must_use]
pub(crate) fn delay_ms(
    base_delay_ms: u64,
    attempt: u32,
    max_delay_ms: Option<u64>,
    factor: u64,
) -> u64 {
    let delay = base_delay_ms.saturating_mul(factor.saturating_pow(attempt));
    match max_delay_ms {
        Some(max) => delay.min(max),
        None => delay,
    }
}

/// The ordered delays for attempts `0..attempts`.
#[must_use]
pub(crate) fn sequence_ms(
    base_delay_ms: u64,
    attempts: u32,
    max_delay_ms: Option<u64>,
    factor: u64,
) -> Vec<u64> {
    (0..attempts)
        .map(|attempt| delay_ms(base_delay_ms, attempt, max_delay_ms, factor))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_attempt() {
        assert_eq!(delay_ms(100, 0, None, DEFAULT_FACTOR), 100);
        assert_eq!(delay_ms(100, 1, None, DEFAULT_FACTOR), 200);
        assert_eq!(delay_ms(100, 2, None, DEFAULT_FACTOR), 400);
    }

    #[test]
    fn caps_at_max_delay() {
        assert_eq!(delay_ms(100, 4, Some(500), DEFAULT_FACTOR), 500);
        assert_eq!(delay_ms(100, 1, Some(500), DEFAULT_FACTOR), 200);
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        let delay = delay_ms(u64::MAX / 2, 10, None, DEFAULT_FACTOR);
        assert_eq!(delay, u64::MAX);
        assert_eq!(delay_ms(u64::MAX / 2, 10, Some(1_000), DEFAULT_FACTOR), 1_000);
    }

    #[test]
    fn supports_other_factors() {
        assert_eq!(delay_ms(10, 3, None, 3), 270);
    }

    #[test]
    fn sequence_lists_delays_in_order() {
        assert_eq!(sequence_ms(100, 3, None, DEFAULT_FACTOR), vec![100, 200, 400]);
        assert_eq!(
            sequence_ms(100, 5, Some(500), DEFAULT_FACTOR),
            vec![100, 200, 400, 500, 500]
        );
        assert!(sequence_ms(100, 0, None, DEFAULT_FACTOR).is_empty());
    }
}
