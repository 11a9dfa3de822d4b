//! Loop detection over the step stream of each task.
//!
//! Every assessed step is reduced to a `(state, output)` signature of keyword
//! sets. When a signature recurs often enough inside the time window the
//! task's circuit opens. The window is rebuilt from persisted assessments on
//! every check, so separate processes sharing one database see the same
//! stream. The pause gate itself lives on the task row.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::domain::models::LoopDetectionConfig;
use crate::services::coherence_analyzer::extract_keywords;

const SIGNATURE_MIN_KEYWORD_LEN: usize = 3;

/// Keyword view of one step.
#[derive(Debug, Clone)]
pub struct StepSignature {
    state: BTreeSet<String>,
    output: BTreeSet<String>,
    raw_output: String,
}

impl StepSignature {
    pub fn new(state: &str, output: &str) -> Self {
        Self {
            state: extract_keywords(state, SIGNATURE_MIN_KEYWORD_LEN),
            output: extract_keywords(output, SIGNATURE_MIN_KEYWORD_LEN),
            raw_output: output.trim().to_lowercase(),
        }
    }

    /// Similarity of two signatures: the weaker of the state and output
    /// Jaccard scores.
    pub fn similarity(&self, other: &Self) -> f64 {
        let state = jaccard(&self.state, &other.state);
        let output = if self.output.is_empty() && other.output.is_empty() {
            if self.raw_output == other.raw_output { 1.0 } else { 0.0 }
        } else {
            jaccard(&self.output, &other.output)
        };
        state.min(output)
    }
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

/// Result of checking one step against the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopCheck {
    /// Occurrences of this signature inside the window, including this one
    pub occurrences: u32,
    /// The signature reached `repeat_threshold`; the circuit should open
    pub tripped: bool,
}

/// Loop detector. Holds only configuration; callers supply the window.
pub struct LoopBreaker {
    config: LoopDetectionConfig,
}

impl LoopBreaker {
    pub fn new(config: LoopDetectionConfig) -> Self {
        Self { config }
    }

    /// Earliest timestamp an earlier step may carry and still count.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let seconds = i64::try_from(self.config.time_window_seconds).unwrap_or(i64::MAX);
        Duration::try_seconds(seconds)
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Match `step` against the steps already assessed inside the window.
    ///
    /// `earlier` holds the step texts of the window, oldest first, without
    /// `step` itself.
    pub fn check<S: AsRef<str>>(&self, task_id: Uuid, state: &str, step: &str, earlier: &[S]) -> LoopCheck {
        let signature = StepSignature::new(state, step);
        let matches = earlier
            .iter()
            .filter(|prior| {
                StepSignature::new(state, prior.as_ref()).similarity(&signature)
                    >= self.config.similarity_threshold
            })
            .count();

        let occurrences = u32::try_from(matches).unwrap_or(u32::MAX).saturating_add(1);
        let tripped = occurrences >= self.config.repeat_threshold;
        if tripped {
            warn!(task_id = %task_id, occurrences, "Loop detected");
        }
        LoopCheck { occurrences, tripped }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OBJECTIVE: &str = "write unit tests for module X";
    const STEP: &str = "Running cargo test on the parser module";

    fn breaker() -> LoopBreaker {
        LoopBreaker::new(LoopDetectionConfig::default())
    }

    #[test]
    fn test_similarity() {
        let a = StepSignature::new(OBJECTIVE, STEP);
        let b = StepSignature::new(OBJECTIVE, "running cargo test on the parser module!");
        let c = StepSignature::new(OBJECTIVE, "Reading the lexer documentation");
        assert!((a.similarity(&b) - 1.0).abs() < 1e-9);
        assert!(a.similarity(&c) < 0.5);
    }

    #[test]
    fn test_keywordless_outputs_compare_raw_text() {
        let a = StepSignature::new(OBJECTIVE, "ok");
        let b = StepSignature::new(OBJECTIVE, "OK ");
        let c = StepSignature::new(OBJECTIVE, "no");
        assert!((a.similarity(&b) - 1.0).abs() < 1e-9);
        assert!(a.similarity(&c).abs() < 1e-9);
    }

    #[test]
    fn test_trips_on_third_repeat() {
        let breaker = breaker();
        let task_id = Uuid::new_v4();

        let first = breaker.check::<&str>(task_id, OBJECTIVE, STEP, &[]);
        assert_eq!(first, LoopCheck { occurrences: 1, tripped: false });
        let second = breaker.check(task_id, OBJECTIVE, STEP, &[STEP]);
        assert!(!second.tripped);
        let third = breaker.check(task_id, OBJECTIVE, STEP, &[STEP, STEP]);
        assert!(third.tripped);
        assert_eq!(third.occurrences, 3);
    }

    #[test]
    fn test_distinct_steps_do_not_trip() {
        let breaker = breaker();
        let earlier = ["parse the header", "emit the footer", "validate checksums"];
        let check = breaker.check(Uuid::new_v4(), OBJECTIVE, "write fixtures", &earlier);
        assert_eq!(check, LoopCheck { occurrences: 1, tripped: false });
    }

    #[test]
    fn test_similarity_threshold_is_respected() {
        let strict = LoopBreaker::new(LoopDetectionConfig {
            similarity_threshold: 1.0,
            ..LoopDetectionConfig::default()
        });
        let near = "Running cargo test on the parser module again";
        let check = strict.check(Uuid::new_v4(), OBJECTIVE, STEP, &[near, near]);
        assert!(!check.tripped);
    }

    #[test]
    fn test_window_start() {
        let breaker = LoopBreaker::new(LoopDetectionConfig {
            time_window_seconds: 60,
            ..LoopDetectionConfig::default()
        });
        let now = Utc::now();
        assert_eq!(breaker.window_start(now), now - Duration::seconds(60));

        let unbounded = LoopBreaker::new(LoopDetectionConfig {
            time_window_seconds: u64::MAX,
            ..LoopDetectionConfig::default()
        });
        assert_eq!(unbounded.window_start(now), DateTime::<Utc>::MIN_UTC);
    }
}
