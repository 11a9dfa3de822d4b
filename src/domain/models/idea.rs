//! Risk screening result for a free-text project idea.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Whether a matched pattern set blocks the idea or only flags it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingKind {
    Issue,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaFinding {
    /// Name of the pattern set that matched
    pub pattern_set: String,
    pub kind: FindingKind,
    pub matched_terms: Vec<String>,
    pub message: String,
    pub penalty: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaRisk {
    /// 1..=10, higher is more feasible
    pub feasibility_score: u32,
    pub risk_level: RiskLevel,
    /// In [0.05, 0.95]
    pub success_probability: f64,
    pub issues: Vec<IdeaFinding>,
    pub warnings: Vec<IdeaFinding>,
}
