//! Fail-safe publish guards.
//!
//! Each guard looks at one aggregate of the run and, when tripped, returns a
//! human-readable reason. The build collects every reason into a single
//! [`PublishAbort`](crate::error::PublishAbort) so the diagnostic is complete.
//!
//! - Count drop: published count fell by more than `max_drop_percent`
//!   versus the last good build.
//! - Fetch failures: more than `max_fetch_failure_percent` of profile
//!   fetches failed.
//! - Exclusions: more than `max_exclusion_percent` of candidate records
//!   were rejected by normalization or validation.

use crate::models::SafetyConfig;

/// Result of the count-drop check.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitBreakerResult {
    /// Safe to proceed with the swap
    Safe {
        current_count: usize,
        previous_count: usize,
    },
    /// No last good build, or one below the baseline
    ColdStart { current_count: usize },
    /// Drop beyond the threshold
    Triggered {
        current_count: usize,
        previous_count: usize,
        drop_percent: f64,
    },
    /// Nothing to publish while something is published
    EmptyResult,
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: SafetyConfig,
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

impl CircuitBreaker {
    pub fn new(config: &SafetyConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Smallest tree the staged-tree verification accepts. 0 means no floor.
    pub fn min_companies(&self) -> usize {
        self.config.min_companies
    }

    /// Compare the staged record count against the last good build.
    pub fn check(&self, current_count: usize, previous_count: usize) -> CircuitBreakerResult {
        if current_count == 0 {
            if previous_count == 0 && self.config.allow_cold_start {
                return CircuitBreakerResult::ColdStart { current_count };
            }
            return CircuitBreakerResult::EmptyResult;
        }

        if previous_count < self.config.min_baseline {
            return CircuitBreakerResult::ColdStart { current_count };
        }

        if current_count < previous_count {
            let drop_percent = percent(previous_count - current_count, previous_count);
            if drop_percent > f64::from(self.config.max_drop_percent) {
                return CircuitBreakerResult::Triggered {
                    current_count,
                    previous_count,
                    drop_percent,
                };
            }
        }

        CircuitBreakerResult::Safe {
            current_count,
            previous_count,
        }
    }

    /// Count-drop guard. `None` when safe.
    pub fn drop_guard(&self, current_count: usize, previous_count: usize) -> Option<String> {
        match self.check(current_count, previous_count) {
            CircuitBreakerResult::Safe {
                current_count,
                previous_count,
            } => {
                log::info!(
                    "Circuit breaker: SAFE ({} companies, was {})",
                    current_count,
                    previous_count
                );
                None
            }
            CircuitBreakerResult::ColdStart { current_count } => {
                log::info!(
                    "Circuit breaker: COLD START ({} companies, first run or below baseline)",
                    current_count
                );
                None
            }
            CircuitBreakerResult::Triggered {
                current_count,
                previous_count,
                drop_percent,
            } => {
                let reason = format!(
                    "company count dropped {} -> {} ({:.1}% > {}%)",
                    previous_count, current_count, drop_percent, self.config.max_drop_percent
                );
                log::error!("Circuit breaker: TRIGGERED! {}", reason);
                Some(reason)
            }
            CircuitBreakerResult::EmptyResult => {
                log::error!("Circuit breaker: EMPTY RESULT");
                Some(format!(
                    "no companies to publish (last good build has {previous_count})"
                ))
            }
        }
    }

    /// Profile fetch failure rate guard.
    pub fn fetch_failure_guard(&self, failed: usize, attempted: usize) -> Option<String> {
        self.rate_guard(
            "profile fetch failures",
            failed,
            attempted,
            self.config.max_fetch_failure_percent,
        )
    }

    /// Normalization/validation exclusion rate guard.
    pub fn exclusion_guard(&self, excluded: usize, candidates: usize) -> Option<String> {
        self.rate_guard(
            "excluded records",
            excluded,
            candidates,
            self.config.max_exclusion_percent,
        )
    }

    fn rate_guard(&self, what: &str, part: usize, whole: usize, max: u8) -> Option<String> {
        let rate = percent(part, whole);
        if rate <= f64::from(max) {
            return None;
        }
        let reason = format!("{what}: {part}/{whole} ({rate:.1}% > {max}%)");
        log::error!("Circuit breaker: {}", reason);
        Some(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(&SafetyConfig::default())
    }

    #[test]
    fn test_safe_no_drop() {
        assert!(matches!(
            breaker().check(100, 100),
            CircuitBreakerResult::Safe { .. }
        ));
    }

    #[test]
    fn test_safe_small_drop() {
        // 15% drop
        assert!(matches!(
            breaker().check(85, 100),
            CircuitBreakerResult::Safe { .. }
        ));
    }

    #[test]
    fn test_triggered_large_drop() {
        // 30% drop
        assert!(matches!(
            breaker().check(70, 100),
            CircuitBreakerResult::Triggered { .. }
        ));
        assert!(breaker().drop_guard(70, 100).is_some());
    }

    #[test]
    fn test_cold_start() {
        assert!(matches!(
            breaker().check(50, 0),
            CircuitBreakerResult::ColdStart { .. }
        ));
        // Below baseline: even a collapse is accepted.
        assert!(matches!(
            breaker().check(1, 9),
            CircuitBreakerResult::ColdStart { .. }
        ));
    }

    #[test]
    fn test_empty_result() {
        assert_eq!(breaker().check(0, 100), CircuitBreakerResult::EmptyResult);
        assert!(breaker().drop_guard(0, 100).is_some());

        let strict = CircuitBreaker::new(&SafetyConfig {
            allow_cold_start: false,
            ..SafetyConfig::default()
        });
        assert_eq!(strict.check(0, 0), CircuitBreakerResult::EmptyResult);
    }

    #[test]
    fn test_increase_is_safe() {
        assert!(breaker().drop_guard(150, 100).is_none());
    }

    #[test]
    fn test_rate_guards() {
        let cb = breaker();
        // 1 of 2 = 50% > 20%
        assert!(cb.fetch_failure_guard(1, 2).is_some());
        // 1 of 10 = 10%, not above 20%
        assert!(cb.fetch_failure_guard(1, 10).is_none());
        assert!(cb.fetch_failure_guard(0, 0).is_none());

        // exactly at threshold passes
        assert!(cb.exclusion_guard(1, 10).is_none());
        let reason = cb.exclusion_guard(2, 10).unwrap();
        assert!(reason.contains("2/10"), "{reason}");
    }
}
