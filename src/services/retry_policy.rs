//! Backoff schedule, cancelable waits and adaptive retry abandonment.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::models::{BackoffKind, ErrorClass, RetryConfig};

/// Delay schedule derived from [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    kind: BackoffKind,
    base_delay_ms: u64,
    multiplier: f64,
    max_delay_ms: u64,
}

impl BackoffPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            kind: config.backoff,
            base_delay_ms: config.base_delay_ms,
            multiplier: config.multiplier,
            max_delay_ms: config.max_delay_ms,
        }
    }

    /// Delay to wait before retry attempt `k + 1` (zero-based `k`).
    pub fn delay(&self, k: u32) -> Duration {
        let millis = match self.kind {
            BackoffKind::Exponential => {
                let exp = i32::try_from(k).unwrap_or(i32::MAX);
                let raw = self.base_delay_ms as f64 * self.multiplier.powi(exp);
                if raw.is_finite() {
                    (raw as u64).min(self.max_delay_ms)
                } else {
                    self.max_delay_ms
                }
            }
            BackoffKind::Linear => self
                .base_delay_ms
                .saturating_mul(u64::from(k) + 1)
                .min(self.max_delay_ms),
            BackoffKind::Fixed => self.base_delay_ms,
        };
        Duration::from_millis(millis)
    }
}

/// Sleep for `delay` unless `cancel` fires first.
///
/// Returns `false` when the wait was cancelled.
pub async fn cancelable_sleep(delay: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ClassStats {
    successes: u32,
    failures: u32,
}

impl ClassStats {
    fn total(self) -> u32 {
        self.successes + self.failures
    }

    /// Laplace-smoothed success rate
    fn rate(self) -> f64 {
        (f64::from(self.successes) + 1.0) / (f64::from(self.total()) + 2.0)
    }
}

/// Process-wide success-rate estimate per error class.
///
/// Advisory only: it decides when retrying a class stops paying off.
#[derive(Debug, Default)]
pub struct SuccessRateTracker {
    stats: RwLock<HashMap<ErrorClass, ClassStats>>,
}

impl SuccessRateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, class: ErrorClass, success: bool) {
        let mut stats = self.stats.write().await;
        let entry = stats.entry(class).or_default();
        if success {
            entry.successes += 1;
        } else {
            entry.failures += 1;
        }
    }

    /// Smoothed rate and observation count for a class.
    pub async fn estimate(&self, class: ErrorClass) -> (f64, u32) {
        let stats = self.stats.read().await;
        let entry = stats.get(&class).copied().unwrap_or_default();
        (entry.rate(), entry.total())
    }

    /// True once enough observations show retries for `class` rarely work.
    pub async fn should_abandon(&self, class: ErrorClass, threshold: f64, min_samples: u32) -> bool {
        let (rate, samples) = self.estimate(class).await;
        let abandon = samples >= min_samples && rate < threshold;
        if abandon {
            debug!(class = %class, rate, samples, threshold, "Success rate below threshold");
        }
        abandon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(kind: BackoffKind) -> BackoffPolicy {
        BackoffPolicy::from_config(&RetryConfig {
            backoff: kind,
            ..RetryConfig::default()
        })
    }

    #[test]
    fn test_exponential_delay() {
        let policy = policy(BackoffKind::Exponential);
        assert_eq!(policy.delay(0), Duration::from_millis(1_000));
        assert_eq!(policy.delay(1), Duration::from_millis(2_000));
        assert_eq!(policy.delay(2), Duration::from_millis(4_000));
        assert_eq!(policy.delay(10), Duration::from_millis(30_000));
        assert_eq!(policy.delay(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn test_linear_and_fixed_delay() {
        let linear = policy(BackoffKind::Linear);
        assert_eq!(linear.delay(0), Duration::from_millis(1_000));
        assert_eq!(linear.delay(2), Duration::from_millis(3_000));
        assert_eq!(linear.delay(100), Duration::from_millis(30_000));

        let fixed = policy(BackoffKind::Fixed);
        assert_eq!(fixed.delay(0), fixed.delay(7));
    }

    #[tokio::test]
    async fn test_cancelable_sleep_completes() {
        let token = CancellationToken::new();
        assert!(cancelable_sleep(Duration::from_millis(5), &token).await);
    }

    #[tokio::test]
    async fn test_cancelable_sleep_cancelled() {
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            child.cancel();
        });
        let started = std::time::Instant::now();
        assert!(!cancelable_sleep(Duration::from_secs(30), &token).await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_already_cancelled_returns_immediately() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(!cancelable_sleep(Duration::from_secs(30), &token).await);
    }

    #[tokio::test]
    async fn test_tracker_abandons_after_min_samples() {
        let tracker = SuccessRateTracker::new();
        for _ in 0..4 {
            tracker.record(ErrorClass::Transient, false).await;
        }
        // (0 + 1) / (4 + 2) = 0.167 but only 4 samples
        assert!(!tracker.should_abandon(ErrorClass::Transient, 0.2, 5).await);

        tracker.record(ErrorClass::Transient, false).await;
        assert!(tracker.should_abandon(ErrorClass::Transient, 0.2, 5).await);

        // Other classes are tracked independently
        assert!(!tracker.should_abandon(ErrorClass::AgentSpecific, 0.2, 5).await);
    }

    #[tokio::test]
    async fn test_tracker_smoothing() {
        let tracker = SuccessRateTracker::new();
        let (rate, samples) = tracker.estimate(ErrorClass::Unknown).await;
        assert!((rate - 0.5).abs() < 1e-9);
        assert_eq!(samples, 0);

        tracker.record(ErrorClass::Unknown, true).await;
        tracker.record(ErrorClass::Unknown, true).await;
        let (rate, samples) = tracker.estimate(ErrorClass::Unknown).await;
        assert!((rate - 0.75).abs() < 1e-9);
        assert_eq!(samples, 2);
    }
}
