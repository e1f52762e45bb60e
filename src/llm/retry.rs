use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Jittered exponential backoff delay for a 0-based retry attempt:
/// `min(base * 2^attempt, cap)` ± jitter.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponential = config
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt));
    apply_jitter(exponential.min(config.max_delay), config.jitter)
}

fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 || delay.is_zero() {
        return delay;
    }
    let factor = rand::thread_rng().gen_range(1.0 - jitter..=1.0 + jitter);
    delay.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryConfig {
        RetryConfig {
            jitter: 0.0,
            ..RetryConfig::default()
        }
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let config = no_jitter();
        assert_eq!(backoff_delay(&config, 0), Duration::from_secs(2));
        assert_eq!(backoff_delay(&config, 1), Duration::from_secs(4));
        assert_eq!(backoff_delay(&config, 2), Duration::from_secs(8));
        assert_eq!(backoff_delay(&config, 3), Duration::from_secs(16));
    }

    #[test]
    fn delay_capped_at_max() {
        let config = no_jitter();
        assert_eq!(backoff_delay(&config, 10), Duration::from_secs(60));
        assert_eq!(backoff_delay(&config, 31), Duration::from_secs(60));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let config = RetryConfig::default();
        for _ in 0..200 {
            let delay = backoff_delay(&config, 0);
            assert!(delay >= Duration::from_millis(1800), "too low: {delay:?}");
            assert!(delay <= Duration::from_millis(2200), "too high: {delay:?}");
        }
    }

    #[test]
    fn huge_attempt_does_not_overflow() {
        let config = no_jitter();
        let delay = backoff_delay(&config, u32::MAX);
        assert_eq!(delay, Duration::from_secs(60));
    }
}
