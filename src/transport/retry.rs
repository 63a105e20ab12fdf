use std::time::Duration;

use crate::config::RetryConfig;

/// Compute the backoff delay before attempt `attempt` (1-based, the attempt
/// about to be retried), following `min(max_backoff, initial_backoff *
/// 2^(attempt-1)) * jitter` with `jitter` uniform in `[0.5, 1.0]` when enabled.
pub(crate) fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let exp = 2f64.powi(attempt.saturating_sub(1) as i32);
    let mut delay = (retry.initial_backoff * exp).min(retry.max_backoff);
    if retry.jitter {
        delay *= 0.5 + fastrand::f64() * 0.5;
    }
    Duration::from_secs_f64(delay.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retry_config(jitter: bool) -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_backoff: 1.0,
            max_backoff: 16.0,
            jitter,
        }
    }

    #[test]
    fn delay_doubles_without_jitter() {
        let retry = retry_config(false);
        assert_eq!(backoff_delay(&retry, 1), Duration::from_secs_f64(1.0));
        assert_eq!(backoff_delay(&retry, 2), Duration::from_secs_f64(2.0));
        assert_eq!(backoff_delay(&retry, 3), Duration::from_secs_f64(4.0));
    }

    #[test]
    fn delay_is_capped_at_max_backoff() {
        let retry = retry_config(false);
        assert_eq!(backoff_delay(&retry, 10), Duration::from_secs_f64(16.0));
    }

    #[test]
    fn jitter_stays_within_half_to_full_range() {
        let retry = retry_config(true);
        for attempt in 1..=5 {
            let delay = backoff_delay(&retry, attempt).as_secs_f64();
            let uncapped = (retry.initial_backoff * 2f64.powi((attempt - 1) as i32))
                .min(retry.max_backoff);
            assert!(delay >= uncapped * 0.5 - 1e-9);
            assert!(delay <= uncapped + 1e-9);
        }
    }
}
