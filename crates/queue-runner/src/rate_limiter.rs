use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// A single global token, spaced `1/requests_per_second` apart. `0` (the
/// `RunnerConfig` default) disables throttling entirely.
pub struct RateLimiter {
    min_interval: Option<Duration>,
    last_dispatch: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64) -> Self {
        let min_interval = if requests_per_second > 0.0 {
            Some(Duration::from_secs_f64(1.0 / requests_per_second))
        } else {
            None
        };
        Self {
            min_interval,
            last_dispatch: Mutex::new(None),
        }
    }

    /// Blocks until the next dispatch slot is free. A no-op when
    /// unconfigured.
    pub async fn acquire(&self) {
        let Some(min_interval) = self.min_interval else {
            return;
        };
        let mut last = self.last_dispatch.lock().await;
        let now = Instant::now();
        if let Some(previous) = *last {
            let elapsed = now.duration_since(previous);
            if elapsed < min_interval {
                tokio::time::sleep(min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_rate_never_blocks() {
        let limiter = RateLimiter::new(0.0);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn nonzero_rate_spaces_out_acquisitions() {
        let limiter = RateLimiter::new(20.0); // one every 50ms
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(90));
    }
}
