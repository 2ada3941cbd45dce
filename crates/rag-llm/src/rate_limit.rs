//! Per-provider rate-limit counters: a counter, a window start timestamp,
//! and the provider's hourly cap. Guarded by per-provider state with a short
//! critical section around increment/reset.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use ragcore::{Error, Result};

struct Window {
    count: u32,
    started_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct RateLimiter {
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new() -> Self {
        RateLimiter::default()
    }

    /// Record one call against `provider_id`'s hourly cap, resetting the
    /// window once an hour has elapsed since it started. The (cap + 1)-th
    /// call within the window fails with `RateLimited`.
    pub fn check_and_increment(&self, provider_id: &str, cap: u32) -> Result<()> {
        let now = Utc::now();
        let mut entry = self.windows.entry(provider_id.to_string()).or_insert_with(|| Window {
            count: 0,
            started_at: now,
        });

        if now - entry.started_at >= Duration::hours(1) {
            entry.count = 0;
            entry.started_at = now;
        }

        if entry.count >= cap {
            let retry_after = (entry.started_at + Duration::hours(1) - now)
                .num_seconds()
                .max(0) as u64;
            return Err(Error::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        entry.count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_cap_plus_one_call_is_rate_limited() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            limiter.check_and_increment("p1", 3).unwrap();
        }
        let err = limiter.check_and_increment("p1", 3).unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }));
    }

    #[test]
    fn different_providers_have_independent_windows() {
        let limiter = RateLimiter::new();
        limiter.check_and_increment("p1", 1).unwrap();
        assert!(limiter.check_and_increment("p2", 1).is_ok());
    }
}
