use std::time::Duration;

/// Exponential backoff with jitter, capped at `max_backoff_seconds`.
///
/// `attempt` is the 1-based attempt number that just failed. Mirrors the
/// shape of `2i64.pow(attempt) .min(cap)` seen in the job-queue backends in
/// the corpus, widened with a `[1.0, 2.0)` jitter multiplier so that a burst
/// of simultaneously-failing items does not retry in lockstep.
pub fn exponential_with_jitter(
    attempt: u32,
    base_seconds: f64,
    max_backoff_seconds: f64,
) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let raw = base_seconds * 2f64.powi(exponent as i32);
    let jittered = raw * (1.0 + fastrand::f64());
    Duration::from_secs_f64(jittered.min(max_backoff_seconds))
}

/// A `Retry-After` value, when present and `respect_retry_after` is set,
/// always wins over the computed exponential schedule.
pub fn retry_delay(
    attempt: u32,
    base_seconds: f64,
    max_backoff_seconds: f64,
    retry_after: Option<Duration>,
    respect_retry_after: bool,
) -> Duration {
    match retry_after {
        Some(delay) if respect_retry_after => delay,
        _ => exponential_with_jitter(attempt, base_seconds, max_backoff_seconds),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jittered_delay_stays_within_bounds() {
        for attempt in 1..=5u32 {
            let d = exponential_with_jitter(attempt, 2.0, 300.0);
            let raw = 2.0 * 2f64.powi((attempt - 1) as i32);
            let lo = raw.min(300.0);
            assert!(d.as_secs_f64() >= lo, "attempt {attempt}: {d:?} below {lo}");
            assert!(d.as_secs_f64() <= 300.0, "attempt {attempt}: {d:?} above cap");
        }
    }

    #[test]
    fn never_exceeds_cap() {
        let d = exponential_with_jitter(20, 2.0, 300.0);
        assert!(d.as_secs_f64() <= 300.0);
    }

    #[test]
    fn retry_after_overrides_when_respected() {
        let d = retry_delay(3, 2.0, 300.0, Some(Duration::from_secs(42)), true);
        assert_eq!(d, Duration::from_secs(42));
    }

    #[test]
    fn retry_after_ignored_when_not_respected() {
        let d = retry_delay(1, 2.0, 300.0, Some(Duration::from_secs(42)), false);
        assert_ne!(d, Duration::from_secs(42));
    }
}
