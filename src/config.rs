//! Construction-time configuration, validated once and shared by both
//! replacement engine variants.

use thiserror::Error;

/// Parameters a [`crate::epoch::EpochPolicy`] or
/// [`crate::three_hand::ThreeHandPolicy`] is built from.
///
/// `non_resident_multiplier` is accepted and stored but unused by the
/// canonical engine, which caps the non-resident population at
/// `maximum_size` regardless (reserved for future ghost-list sizing
/// tuning).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub maximum_size: usize,
    pub percent_min_cold: f64,
    pub percent_max_cold: f64,
    pub lower_bound_cold: usize,
    pub non_resident_multiplier: f64,
}

impl Config {
    /// Sensible defaults: 1% minimum cold, up to 50% cold, a floor of one
    /// cold slot.
    pub fn new(maximum_size: usize) -> Self {
        Self {
            maximum_size,
            percent_min_cold: 0.01,
            percent_max_cold: 0.5,
            lower_bound_cold: 1,
            non_resident_multiplier: 1.0,
        }
    }

    pub fn percent_min_cold(mut self, value: f64) -> Self {
        self.percent_min_cold = value;
        self
    }

    pub fn percent_max_cold(mut self, value: f64) -> Self {
        self.percent_max_cold = value;
        self
    }

    pub fn lower_bound_cold(mut self, value: usize) -> Self {
        self.lower_bound_cold = value;
        self
    }

    pub fn non_resident_multiplier(mut self, value: f64) -> Self {
        self.non_resident_multiplier = value;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if let Err(err) = self.validate_inner() {
            #[cfg(feature = "logging")]
            log::debug!("rejecting cache configuration: {err}");
            return Err(err);
        }
        Ok(())
    }

    fn validate_inner(&self) -> Result<(), ConfigError> {
        if self.maximum_size == 0 {
            return Err(ConfigError::NonPositiveMaximumSize);
        }
        if !(self.percent_min_cold > 0.0 && self.percent_min_cold <= 1.0) {
            return Err(ConfigError::PercentMinColdOutOfRange(self.percent_min_cold));
        }
        if !(self.percent_max_cold > 0.0 && self.percent_max_cold <= 1.0) {
            return Err(ConfigError::PercentMaxColdOutOfRange(self.percent_max_cold));
        }
        if self.percent_max_cold < self.percent_min_cold {
            return Err(ConfigError::MaxColdBelowMinCold {
                percent_min_cold: self.percent_min_cold,
                percent_max_cold: self.percent_max_cold,
            });
        }
        if self.lower_bound_cold < 1 {
            return Err(ConfigError::LowerBoundColdTooSmall(self.lower_bound_cold));
        }
        Ok(())
    }
}

/// Configuration errors, surfaced at construction rather than deferred to
/// the first `record` call — `record` itself can never fail.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum ConfigError {
    #[error("maximum_size must be a positive integer")]
    NonPositiveMaximumSize,
    #[error("percent_min_cold must be in (0, 1], got {0}")]
    PercentMinColdOutOfRange(f64),
    #[error("percent_max_cold must be in (0, 1], got {0}")]
    PercentMaxColdOutOfRange(f64),
    #[error(
        "percent_max_cold ({percent_max_cold}) must be >= percent_min_cold ({percent_min_cold})"
    )]
    MaxColdBelowMinCold {
        percent_min_cold: f64,
        percent_max_cold: f64,
    },
    #[error("lower_bound_cold must be >= 1, got {0}")]
    LowerBoundColdTooSmall(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_capacity() {
        assert_eq!(
            Config::new(0).validate(),
            Err(ConfigError::NonPositiveMaximumSize)
        );
    }

    #[test]
    fn rejects_max_below_min() {
        let config = Config::new(100).percent_min_cold(0.5).percent_max_cold(0.1);
        assert_eq!(
            config.validate(),
            Err(ConfigError::MaxColdBelowMinCold {
                percent_min_cold: 0.5,
                percent_max_cold: 0.1,
            })
        );
    }

    #[test]
    fn rejects_lower_bound_cold_zero() {
        let config = Config::new(100).lower_bound_cold(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::LowerBoundColdTooSmall(0))
        );
    }

    #[test]
    fn accepts_defaults() {
        assert!(Config::new(100).validate().is_ok());
    }
}
