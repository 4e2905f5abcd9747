//! Exponential backoff retry policy for phase retries.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts before the request expires.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff after the first attempt.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Multiplier applied to the backoff on each attempt.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Maximum backoff delay (caps exponential growth).
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Add `jitter_fraction * backoff / 2` on top of each delay (0.0 = none).
    #[serde(default)]
    pub jitter_fraction: f64,
}

fn default_max_attempts() -> u32 { 5 }
fn default_initial_backoff_ms() -> u64 { 1_000 }
fn default_multiplier() -> f64 { 2.0 }
fn default_max_backoff_ms() -> u64 { 60_000 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            multiplier: default_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter_fraction: 0.0,
        }
    }
}

/// Stateless retry policy — computes the next delay given the attempt number.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the delay after the `attempt`-th attempt (1-based).
    /// Returns `None` once `attempt` reaches `max_attempts`.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.config.max_attempts {
            return None;
        }
        Some(self.backoff(attempt))
    }

    /// Backoff after the `attempt`-th attempt, ignoring the budget.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.config.initial_backoff_ms as f64 * self.config.multiplier.powi(exponent);
        let capped = base_ms.min(self.config.max_backoff_ms as f64);

        let jitter_ms = capped * self.config.jitter_fraction * 0.5;
        Duration::from_millis((capped + jitter_ms) as u64)
    }

    /// Returns `true` if the budget allows another attempt after `attempts` were spent.
    pub fn has_budget(&self, attempts: u32) -> bool {
        attempts < self.config.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32, initial_ms: u64, multiplier: f64, max_ms: u64) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts,
            initial_backoff_ms: initial_ms,
            multiplier,
            max_backoff_ms: max_ms,
            jitter_fraction: 0.0,
        })
    }

    #[test]
    fn one_and_a_half_growth() {
        let p = policy(3, 1_000, 1.5, 60_000);
        assert_eq!(p.next_delay(1).unwrap().as_millis(), 1_000);
        assert_eq!(p.next_delay(2).unwrap().as_millis(), 1_500);
        assert!(p.next_delay(3).is_none());
        assert_eq!(p.backoff(3).as_millis(), 2_250);
    }

    #[test]
    fn delay_capped_at_max() {
        let p = policy(20, 100, 10.0, 500);
        let d5 = p.backoff(5);
        assert!(d5 <= Duration::from_millis(500), "d5={d5:?} exceeds max");
    }

    #[test]
    fn budget_boundary() {
        let p = policy(2, 100, 2.0, 1_000);
        assert!(p.has_budget(0));
        assert!(p.has_budget(1));
        assert!(!p.has_budget(2));
    }
}
