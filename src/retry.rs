// Retry policy for token endpoint requests

use rand::Rng;
use reqwest::StatusCode;
use std::time::Duration;

/// Bounded exponential backoff over retryable statuses
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Upper bound for a single delay (before jitter)
    pub max_delay: Duration,

    /// Fraction of the delay added at random, 0.0 disables jitter
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Policy that gives up after the first attempt
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Only server errors are worth repeating; 4xx answers are final
    pub fn is_retryable(&self, status: StatusCode) -> bool {
        status.is_server_error()
    }

    /// Whether `status`, received on zero-based `attempt`, should be retried
    pub fn should_retry(&self, status: StatusCode, attempt: u32) -> bool {
        self.is_retryable(status) && attempt + 1 < self.max_attempts
    }

    /// Delay to wait after the zero-based `attempt` failed:
    /// base_delay * 2^attempt, capped, plus jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        if !self.jitter.is_finite() || self.jitter <= 0.0 {
            return delay;
        }
        let jitter = delay.mul_f64(self.jitter * rand::thread_rng().gen::<f64>());
        delay + jitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run a synthetic status sequence through the policy and return how many
    /// attempts were made and the final status
    fn simulate(policy: &RetryPolicy, statuses: &[u16]) -> (u32, u16) {
        let mut attempt = 0;
        loop {
            let status = StatusCode::from_u16(statuses[attempt as usize]).unwrap();
            if !policy.should_retry(status, attempt) {
                return (attempt + 1, status.as_u16());
            }
            attempt += 1;
        }
    }

    #[test]
    fn test_backoff_calculation() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(60),
            ..RetryPolicy::default()
        };

        let delay0 = policy.delay_for(0).as_millis();
        let delay1 = policy.delay_for(1).as_millis();
        let delay2 = policy.delay_for(2).as_millis();

        // Each delay should be roughly double the previous (with jitter)
        assert!((1000..=1100).contains(&delay0));
        assert!((2000..=2200).contains(&delay1));
        assert!((4000..=4400).contains(&delay2));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(2),
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(10), Duration::from_secs(2));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(2));
    }

    #[test]
    fn test_unusable_jitter_is_ignored() {
        for jitter in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -1.0] {
            let policy = RetryPolicy {
                base_delay: Duration::from_millis(100),
                jitter,
                ..RetryPolicy::default()
            };
            assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        }
    }

    #[test]
    fn test_server_errors_then_success() {
        let policy = RetryPolicy::default();
        assert_eq!(simulate(&policy, &[500, 502, 200]), (3, 200));
    }

    #[test]
    fn test_client_error_is_terminal() {
        let policy = RetryPolicy::default();
        assert_eq!(simulate(&policy, &[500, 403, 200]), (2, 403));
        assert_eq!(simulate(&policy, &[400]), (1, 400));
    }

    #[test]
    fn test_attempts_are_bounded() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        assert_eq!(simulate(&policy, &[503, 503, 503, 503, 200]), (3, 503));
    }

    #[test]
    fn test_no_retry_policy() {
        let policy = RetryPolicy::none();
        assert_eq!(simulate(&policy, &[500, 200]), (1, 500));
    }
}
