//! C4: the adaptive controller, maintaining `cold_target` within
//! `[min_cold, max_cold]`.
//!
//! `cold_target` is the sole adaptive signal the replacement engine reads
//! (§4.3's cold_target update table): it widens by one on every re-fault
//! promotion attempt and narrows by one on every test-period-expiry ghost
//! eviction, clamped to the bounds computed here at construction time.

use crate::config::{Config, ConfigError};

#[derive(Debug, Clone, Copy)]
pub struct AdaptiveController {
    min_cold: usize,
    max_cold: usize,
    cold_target: usize,
}

impl AdaptiveController {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let max_size = config.maximum_size;
        let min_cold =
            ((max_size as f64 * config.percent_min_cold) as usize).max(config.lower_bound_cold);
        let upper_bound = max_size.saturating_sub(min_cold).max(min_cold);
        let max_cold_raw = (max_size as f64 * config.percent_max_cold) as usize;
        let max_cold = max_cold_raw.clamp(min_cold, upper_bound);
        Ok(Self {
            min_cold,
            max_cold,
            cold_target: min_cold,
        })
    }

    pub fn min_cold(&self) -> usize {
        self.min_cold
    }

    pub fn max_cold(&self) -> usize {
        self.max_cold
    }

    pub fn cold_target(&self) -> usize {
        self.cold_target
    }

    /// A re-fault promotion attempt widens the cold target by one.
    pub fn grow(&mut self) {
        self.cold_target = (self.cold_target + 1).min(self.max_cold);
    }

    /// A test-period-expiry ghost eviction narrows the cold target by one.
    pub fn shrink(&mut self) {
        self.cold_target = self.cold_target.saturating_sub(1).max(self.min_cold);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cold_target_starts_at_min_cold() {
        let config = Config::new(100);
        let controller = AdaptiveController::new(&config).unwrap();
        assert_eq!(controller.cold_target(), controller.min_cold());
    }

    #[test]
    fn grow_and_shrink_stay_within_bounds() {
        let config = Config::new(10).percent_min_cold(0.1).percent_max_cold(0.5);
        let mut controller = AdaptiveController::new(&config).unwrap();
        for _ in 0..1000 {
            controller.grow();
        }
        assert_eq!(controller.cold_target(), controller.max_cold());
        for _ in 0..1000 {
            controller.shrink();
        }
        assert_eq!(controller.cold_target(), controller.min_cold());
    }

    #[test]
    fn tiny_capacity_does_not_panic() {
        let config = Config::new(1);
        let controller = AdaptiveController::new(&config).unwrap();
        assert!(controller.min_cold() >= 1);
        assert!(controller.max_cold() >= controller.min_cold());
    }
}
