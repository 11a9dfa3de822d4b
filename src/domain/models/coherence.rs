//! Coherence assessment of a single agent step.

use serde::{Deserialize, Serialize};

/// Classified deviation of an agent step from its task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerailmentType {
    #[default]
    None,
    TaskDrift,
    ContextLoss,
    InstructionIgnore,
    ScopeCreep,
    RepetitionLoop,
}

impl std::fmt::Display for DerailmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DerailmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::TaskDrift => "task_drift",
            Self::ContextLoss => "context_loss",
            Self::InstructionIgnore => "instruction_ignore",
            Self::ScopeCreep => "scope_creep",
            Self::RepetitionLoop => "repetition_loop",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(Self::None),
            "task_drift" | "drift" => Some(Self::TaskDrift),
            "context_loss" => Some(Self::ContextLoss),
            "instruction_ignore" => Some(Self::InstructionIgnore),
            "scope_creep" => Some(Self::ScopeCreep),
            "repetition_loop" | "repetition" => Some(Self::RepetitionLoop),
            _ => None,
        }
    }
}

/// Result of scoring one step. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherenceAssessment {
    pub derailment_type: DerailmentType,
    /// Confidence in the derailment classification, in [0, 1]
    pub confidence: f64,
    pub explanation: String,
}

impl CoherenceAssessment {
    pub fn new(derailment_type: DerailmentType, confidence: f64, explanation: impl Into<String>) -> Self {
        Self {
            derailment_type,
            confidence: confidence.clamp(0.0, 1.0),
            explanation: explanation.into(),
        }
    }

    pub fn is_derailed(&self) -> bool {
        self.derailment_type != DerailmentType::None
    }
}
