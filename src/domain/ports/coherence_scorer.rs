use crate::domain::models::CoherenceAssessment;

/// Scores one agent step against its task objective.
///
/// Implementations must be pure: the same inputs always produce the same
/// assessment.
pub trait CoherenceScorer: Send + Sync {
    fn assess(&self, objective: &str, step: &str, recent_history: &[String]) -> CoherenceAssessment;
}
