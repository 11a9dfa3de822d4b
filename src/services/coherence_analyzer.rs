//! Heuristic coherence scoring of agent steps.
//!
//! Rules are evaluated in a fixed order and the first match wins:
//! repetition, context loss, ignored instructions, drift, scope creep.
//! When nothing fires the step is reported as coherent with a small
//! baseline confidence, never zero.

use std::collections::BTreeSet;

use crate::domain::models::{CoherenceAssessment, CoherenceConfig, DerailmentType};
use crate::domain::ports::CoherenceScorer;

/// Words too common to say anything about the topic of a step.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "onto", "over", "under", "are",
    "was", "were", "been", "being", "have", "has", "had", "will", "would", "should", "could",
    "can", "not", "but", "you", "your", "our", "its", "his", "her", "their", "them", "they",
    "then", "than", "there", "here", "what", "which", "who", "whom", "when", "where", "why",
    "how", "all", "any", "each", "some", "such", "only", "own", "same", "too", "very", "just",
    "now", "also", "about", "after", "before", "again", "once", "does", "did", "doing", "out",
    "off", "via", "per", "let", "lets", "let's", "i'm", "i'll", "we'll", "it's", "these",
    "those", "while", "because", "between", "through", "during", "other", "more", "most",
    "being", "both", "few", "nor", "yet", "one", "get", "got", "use", "using",
];

/// Lowercase, split on non-alphanumerics, drop stop-words and short tokens,
/// deduplicate.
pub fn extract_keywords(text: &str, min_len: usize) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= min_len)
        .filter(|token| !STOP_WORDS.contains(token))
        .map(str::to_string)
        .collect()
}

/// Default [`CoherenceScorer`] implementation.
#[derive(Debug, Clone, Default)]
pub struct HeuristicScorer {
    config: CoherenceConfig,
}

impl HeuristicScorer {
    pub fn new(config: CoherenceConfig) -> Self {
        Self { config }
    }

    fn leading_chars(&self, step: &str) -> String {
        step.trim()
            .to_lowercase()
            .chars()
            .take(self.config.repetition_prefix_chars)
            .collect()
    }

    fn check_repetition(&self, step: &str, recent_history: &[String]) -> Option<CoherenceAssessment> {
        let prefix = self.leading_chars(step);
        if prefix.is_empty() {
            return None;
        }

        let start = recent_history.len().saturating_sub(self.config.repetition_lookback);
        let repeated = recent_history[start..]
            .iter()
            .any(|entry| entry.to_lowercase().contains(&prefix));

        repeated.then(|| {
            CoherenceAssessment::new(
                DerailmentType::RepetitionLoop,
                self.config.repetition_confidence,
                format!(
                    "step repeats output from the last {} history entries",
                    self.config.repetition_lookback
                ),
            )
        })
    }

    fn check_phrases(
        &self,
        lowered_step: &str,
        phrases: &[String],
        derailment: DerailmentType,
        confidence: f64,
    ) -> Option<CoherenceAssessment> {
        phrases
            .iter()
            .find(|phrase| lowered_step.contains(phrase.to_lowercase().as_str()))
            .map(|phrase| {
                CoherenceAssessment::new(derailment, confidence, format!("step contains \"{phrase}\""))
            })
    }

    fn check_keywords(&self, objective: &str, step: &str) -> Option<CoherenceAssessment> {
        let objective_keywords = extract_keywords(objective, self.config.min_keyword_len);
        let step_keywords = extract_keywords(step, self.config.min_keyword_len);

        // No keywords on either side means no evidence for drift or creep.
        if objective_keywords.is_empty() || step_keywords.is_empty() {
            return None;
        }

        let objective_count = objective_keywords.len() as f64;
        let shared = objective_keywords.intersection(&step_keywords).count() as f64;
        let overlap = shared / objective_count;

        if overlap < self.config.drift_overlap_threshold {
            return Some(CoherenceAssessment::new(
                DerailmentType::TaskDrift,
                1.0 - overlap,
                format!(
                    "keyword overlap {overlap:.2} is below {:.2}",
                    self.config.drift_overlap_threshold
                ),
            ));
        }

        let new_keywords = step_keywords.difference(&objective_keywords).count() as f64;
        let ratio = new_keywords / objective_count;
        if ratio > self.config.scope_creep_ratio {
            let confidence = (0.6 + 0.1 * (ratio - self.config.scope_creep_ratio)).clamp(0.6, 0.9);
            return Some(CoherenceAssessment::new(
                DerailmentType::ScopeCreep,
                confidence,
                format!(
                    "step introduces {new_keywords} new keywords, {ratio:.2}x the objective's {objective_count}"
                ),
            ));
        }

        None
    }
}

impl CoherenceScorer for HeuristicScorer {
    fn assess(&self, objective: &str, step: &str, recent_history: &[String]) -> CoherenceAssessment {
        if let Some(assessment) = self.check_repetition(step, recent_history) {
            return assessment;
        }

        let lowered = step.to_lowercase();
        if let Some(assessment) = self.check_phrases(
            &lowered,
            &self.config.context_loss_phrases,
            DerailmentType::ContextLoss,
            self.config.context_loss_confidence,
        ) {
            return assessment;
        }

        if let Some(assessment) = self.check_phrases(
            &lowered,
            &self.config.instruction_ignore_phrases,
            DerailmentType::InstructionIgnore,
            self.config.instruction_ignore_confidence,
        ) {
            return assessment;
        }

        if let Some(assessment) = self.check_keywords(objective, step) {
            return assessment;
        }

        CoherenceAssessment::new(
            DerailmentType::None,
            self.config.baseline_confidence,
            "step is consistent with the objective",
        )
    }
}
