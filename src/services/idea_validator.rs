//! Rule-based risk screening of free-text project ideas.
//!
//! Each [`PatternSet`] contributes a penalty when any of its patterns match.
//! Sets are plain data, so callers can swap in their own tables.

use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{FindingKind, IdeaFinding, IdeaRisk, RiskLevel};
use crate::domain::ports::PatternSet;

const MAX_SCORE: i64 = 10;
const MIN_SCORE: i64 = 1;

/// A [`PatternSet`] backed by case-insensitive, word-bounded regexes.
#[derive(Debug, Clone)]
pub struct RegexPatternSet {
    name: String,
    kind: FindingKind,
    penalty: u32,
    message: String,
    patterns: Vec<Regex>,
}

impl RegexPatternSet {
    pub fn new(
        name: impl Into<String>,
        kind: FindingKind,
        penalty: u32,
        message: impl Into<String>,
        patterns: &[&str],
    ) -> DomainResult<Self> {
        let name = name.into();
        let patterns = patterns
            .iter()
            .map(|pattern| {
                RegexBuilder::new(&format!(r"\b(?:{pattern})\b"))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        DomainError::ValidationFailed(format!(
                            "Invalid pattern '{pattern}' in set '{name}': {e}"
                        ))
                    })
            })
            .collect::<DomainResult<Vec<_>>>()?;

        Ok(Self {
            name,
            kind,
            penalty,
            message: message.into(),
            patterns,
        })
    }
}

impl PatternSet for RegexPatternSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> FindingKind {
        self.kind
    }

    fn penalty(&self) -> u32 {
        self.penalty
    }

    fn message(&self) -> &str {
        &self.message
    }

    fn matches(&self, text: &str) -> Vec<String> {
        let mut terms: Vec<String> = Vec::new();
        for pattern in &self.patterns {
            for found in pattern.find_iter(text) {
                let term = found.as_str().to_lowercase();
                if !terms.contains(&term) {
                    terms.push(term);
                }
            }
        }
        terms
    }
}

/// The four stock tables: impossible technology, saturated markets, legal
/// exposure and heavy resource needs.
pub fn default_pattern_sets() -> DomainResult<Vec<Arc<dyn PatternSet>>> {
    let sets: Vec<Arc<dyn PatternSet>> = vec![
        Arc::new(RegexPatternSet::new(
            "impossible_tech",
            FindingKind::Issue,
            6,
            "Relies on technology that does not exist",
            &[
                r"time[- ]travel(?:ing|ler)?",
                r"teleport(?:ation|er|ing)?",
                r"perpetual motion",
                r"faster[- ]than[- ]light",
                r"telepath(?:y|ic)",
                r"mind[- ]reading",
                r"immortality",
                r"anti[- ]?gravity",
            ],
        )?),
        Arc::new(RegexPatternSet::new(
            "saturated_markets",
            FindingKind::Warning,
            2,
            "Targets a crowded market with entrenched incumbents",
            &[
                r"social (?:network|media)(?:ing)?",
                r"food delivery",
                r"ride[- ]?shar(?:e|ing)",
                r"dating app",
                r"to[- ]?do (?:list|app)",
                r"photo[- ]sharing",
                r"e[- ]?commerce (?:store|site|platform)",
            ],
        )?),
        Arc::new(RegexPatternSet::new(
            "legal_risk",
            FindingKind::Warning,
            2,
            "Carries regulatory or legal exposure",
            &[
                r"gambling",
                r"betting",
                r"crypto(?:currency)? exchange",
                r"medical diagnos[ie]s",
                r"firearms?",
                r"personal data",
                r"scrap(?:e|ing) (?:user|personal|private)",
                r"deepfakes?",
            ],
        )?),
        Arc::new(RegexPatternSet::new(
            "resource_intensive",
            FindingKind::Warning,
            1,
            "Needs significant capital or infrastructure",
            &[
                r"hardware",
                r"satellites?",
                r"manufactur(?:e|ing)",
                r"global scale",
                r"nationwide",
                r"data ?cent(?:er|re)s?",
                r"physical stores?",
            ],
        )?),
    ];
    Ok(sets)
}

/// Scores ideas against a list of pattern sets.
pub struct IdeaValidator {
    pattern_sets: Vec<Arc<dyn PatternSet>>,
}

impl IdeaValidator {
    pub fn new(pattern_sets: Vec<Arc<dyn PatternSet>>) -> Self {
        Self { pattern_sets }
    }

    pub fn with_default_sets() -> DomainResult<Self> {
        Ok(Self::new(default_pattern_sets()?))
    }

    pub fn validate(&self, idea: &str) -> IdeaRisk {
        let mut issues = Vec::new();
        let mut warnings = Vec::new();
        let mut penalty_total: i64 = 0;

        for set in &self.pattern_sets {
            let matched_terms = set.matches(idea);
            if matched_terms.is_empty() {
                continue;
            }

            penalty_total += i64::from(set.penalty());
            let finding = IdeaFinding {
                pattern_set: set.name().to_string(),
                kind: set.kind(),
                matched_terms,
                message: set.message().to_string(),
                penalty: set.penalty(),
            };
            match finding.kind {
                FindingKind::Issue => issues.push(finding),
                FindingKind::Warning => warnings.push(finding),
            }
        }

        let score = (MAX_SCORE - penalty_total).clamp(MIN_SCORE, MAX_SCORE);
        let risk_level = risk_level_for(score, issues.len(), warnings.len());
        let success_probability = (0.1 * score as f64
            - 0.1 * issues.len() as f64
            - 0.05 * warnings.len() as f64)
            .clamp(0.05, 0.95);

        debug!(
            score,
            risk = %risk_level,
            issues = issues.len(),
            warnings = warnings.len(),
            "Idea screened"
        );

        IdeaRisk {
            feasibility_score: u32::try_from(score).unwrap_or(1),
            risk_level,
            success_probability,
            issues,
            warnings,
        }
    }
}

fn risk_level_for(score: i64, issues: usize, warnings: usize) -> RiskLevel {
    if issues > 0 || score <= 3 {
        RiskLevel::Critical
    } else if score <= 5 || warnings >= 2 {
        RiskLevel::High
    } else if score <= 7 || warnings >= 1 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}
