//! Transport-level retry delay for the `ServerError` (≥500) branch of the
//! gateway's status-code policy (§4.2): exponential backoff, no jitter,
//! capped at the per-attempt budget.

use std::time::Duration;

/// Exponential backoff schedule: `initial_delay * multiplier^attempt`,
/// capped at `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub jitter: JitterStrategy,
}

/// Jitter strategy to prevent thundering herd on a shared rate limit.
/// The gateway's own retry policy (§4.2) specifies no jitter; this is kept
/// general so a caller embedding the client elsewhere can opt in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterStrategy {
    None,
    Full,
}

impl BackoffConfig {
    /// `base=1s, multiplier=2x, cap=30s`, matching the per-model worst-case
    /// budget of `PRIMARY_ATTEMPTS * PRIMARY_TIMEOUT` (§4.2).
    pub fn server_error() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: JitterStrategy::None,
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());
        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => fastrand::f64() * capped,
        };
        Duration::from_secs_f64(jittered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_growth_with_no_jitter() {
        let config = BackoffConfig::server_error();
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
    }

    #[test]
    fn capped_at_max_delay() {
        let config = BackoffConfig::server_error();
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(30));
    }

    #[test]
    fn full_jitter_stays_in_range() {
        let config = BackoffConfig { jitter: JitterStrategy::Full, ..BackoffConfig::server_error() };
        for _ in 0..50 {
            let d = config.delay_for_attempt(0);
            assert!(d <= Duration::from_secs(1));
        }
    }
}
