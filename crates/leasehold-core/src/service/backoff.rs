//! Jittered exponential backoff for the acquire wait loop

use std::time::Duration;

use leasehold_common::LockError;

/// Backoff between acquire attempts
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay after the first denied attempt
    pub initial_delay: Duration,
    /// Upper bound before jitter
    pub max_delay: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
    /// Random spread as a fraction of the delay (0.0 - 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> Result<(), LockError> {
        if self.initial_delay.is_zero() {
            return Err(LockError::invalid_argument(
                "backoff initial_delay must be positive",
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(LockError::invalid_argument(
                "backoff max_delay must not be below initial_delay",
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(LockError::invalid_argument(
                "backoff multiplier must be at least 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(LockError::invalid_argument(
                "backoff jitter must be between 0.0 and 1.0",
            ));
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (0-indexed)
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_delay = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        let jitter_range = capped_delay * self.jitter;
        let jitter = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range;
        let final_delay = (capped_delay + jitter).max(1.0) as u64;

        Duration::from_millis(final_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_and_caps() {
        let config = BackoffConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            multiplier: 2.0,
            jitter: 0.0,
        };

        assert_eq!(config.delay(0), Duration::from_millis(100));
        assert_eq!(config.delay(1), Duration::from_millis(200));
        assert_eq!(config.delay(3), Duration::from_millis(800));
        assert_eq!(config.delay(4), Duration::from_millis(1000));
        assert_eq!(config.delay(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let config = BackoffConfig {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(1000),
            multiplier: 1.0,
            jitter: 0.25,
        };

        for _ in 0..200 {
            let delay = config.delay(0);
            assert!(delay >= Duration::from_millis(750), "{:?}", delay);
            assert!(delay <= Duration::from_millis(1250), "{:?}", delay);
        }
    }

    #[test]
    fn test_validate() {
        assert!(BackoffConfig::default().validate().is_ok());

        let bad = [
            BackoffConfig {
                initial_delay: Duration::ZERO,
                ..Default::default()
            },
            BackoffConfig {
                max_delay: Duration::from_millis(1),
                ..Default::default()
            },
            BackoffConfig {
                multiplier: 0.5,
                ..Default::default()
            },
            BackoffConfig {
                jitter: 1.5,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{:?}", config);
        }
    }
}
