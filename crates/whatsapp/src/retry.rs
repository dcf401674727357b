use std::time::Duration;

use {rand::Rng, zenor_config::ReconnectConfig};

/// Reconnect backoff: `base * 2^attempt`, capped at `max`, with symmetric
/// jitter, and an optional cap on consecutive attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction in `[0, 1]`.
    pub jitter: f64,
    pub max_retries: Option<u32>,
}

impl RetryPolicy {
    /// Reconnect immediately, forever.
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
            max_retries: None,
        }
    }

    /// Delay before reconnect attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt);
        let jitter = sanitize_jitter(self.jitter);
        if jitter == 0.0 || nominal.is_zero() {
            return nominal;
        }
        let factor = rand::rng().random_range(1.0 - jitter..=1.0 + jitter);
        nominal.mul_f64(factor).min(self.max_delay.max(self.base_delay))
    }

    /// Delay without jitter.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt.min(31));
        self.base_delay
            .saturating_mul(multiplier)
            .min(self.max_delay.max(self.base_delay))
    }

    /// Whether another attempt is allowed after `attempts` consecutive ones.
    pub fn should_retry(&self, attempts: u32) -> bool {
        self.max_retries.is_none_or(|max| attempts < max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for RetryPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: sanitize_jitter(config.jitter),
            max_retries: config.max_retries,
        }
    }
}

/// Clamp to `[0, 1]`; NaN and infinities mean no jitter.
fn sanitize_jitter(jitter: f64) -> f64 {
    if jitter.is_finite() {
        jitter.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            jitter: 0.0,
            max_retries: Some(3),
        }
    }

    #[rstest]
    #[case(0, 5)]
    #[case(1, 10)]
    #[case(2, 20)]
    #[case(3, 40)]
    #[case(4, 60)]
    #[case(40, 60)]
    fn exponential_with_cap(#[case] attempt: u32, #[case] secs: u64) {
        assert_eq!(policy().delay_for(attempt), Duration::from_secs(secs));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let p = RetryPolicy {
            jitter: 0.5,
            ..policy()
        };
        for _ in 0..100 {
            let d = p.delay_for(1);
            assert!(d >= Duration::from_secs(5) && d <= Duration::from_secs(15));
        }
    }

    #[test]
    fn retry_cap() {
        let p = policy();
        assert!(p.should_retry(0));
        assert!(p.should_retry(2));
        assert!(!p.should_retry(3));
        assert!(RetryPolicy::immediate().should_retry(u32::MAX));
    }

    #[test]
    fn immediate_has_no_delay() {
        assert_eq!(RetryPolicy::immediate().delay_for(7), Duration::ZERO);
    }

    #[rstest]
    #[case(f64::NAN, 0.0)]
    #[case(f64::INFINITY, 0.0)]
    #[case(f64::NEG_INFINITY, 0.0)]
    #[case(-0.3, 0.0)]
    #[case(4.0, 1.0)]
    fn unusable_jitter_is_sanitized(#[case] configured: f64, #[case] expected: f64) {
        let config = ReconnectConfig {
            jitter: configured,
            ..ReconnectConfig::default()
        };
        let p = RetryPolicy::from(&config);
        assert_eq!(p.jitter, expected);
        let d = p.delay_for(0);
        assert!(d <= p.max_delay);
    }

    #[test]
    fn nan_jitter_set_directly_falls_back_to_nominal() {
        let p = RetryPolicy {
            jitter: f64::NAN,
            ..policy()
        };
        assert_eq!(p.delay_for(2), Duration::from_secs(20));
    }

    #[test]
    fn from_config() {
        let p = RetryPolicy::default();
        assert_eq!(p.base_delay, Duration::from_secs(5));
        assert_eq!(p.max_delay, Duration::from_secs(120));
        assert_eq!(p.max_retries, Some(12));
    }
}
