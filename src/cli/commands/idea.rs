//! `warden idea`: feasibility screening for a project idea.

use anyhow::Result;
use clap::Args;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{IdeaFinding, IdeaRisk};
use crate::services::IdeaValidator;

#[derive(Args, Debug)]
pub struct IdeaArgs {
    /// The idea text
    pub idea: String,
}

#[derive(Debug, serde::Serialize)]
pub struct IdeaOutput {
    pub idea: String,
    #[serde(flatten)]
    pub risk: IdeaRisk,
}

fn finding_line(finding: &IdeaFinding) -> String {
    format!(
        "  - [{}] {} (matched: {})",
        finding.pattern_set,
        finding.message,
        finding.matched_terms.join(", ")
    )
}

impl CommandOutput for IdeaOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("Feasibility: {}/10", self.risk.feasibility_score),
            format!("Risk level: {}", self.risk.risk_level),
            format!("Success probability: {:.0}%", self.risk.success_probability * 100.0),
        ];
        if !self.risk.issues.is_empty() {
            lines.push("\nIssues:".to_string());
            lines.extend(self.risk.issues.iter().map(finding_line));
        }
        if !self.risk.warnings.is_empty() {
            lines.push("\nWarnings:".to_string());
            lines.extend(self.risk.warnings.iter().map(finding_line));
        }
        lines.join("\n")
    }
}

/// Screening needs no storage, so this runs without a project.
pub async fn execute(args: IdeaArgs, json_mode: bool) -> Result<()> {
    let validator = IdeaValidator::with_default_sets()?;
    let risk = validator.validate(&args.idea);
    output(
        &IdeaOutput {
            idea: args.idea,
            risk,
        },
        json_mode,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_output_lists_findings() {
        let validator = IdeaValidator::with_default_sets().unwrap();
        let out = IdeaOutput {
            idea: "Build a time travel social network".to_string(),
            risk: validator.validate("Build a time travel social network"),
        };
        let text = out.to_human();
        assert!(text.contains("Risk level: critical"));
        assert!(text.contains("Issues:"));
        assert!(text.contains("time travel"));
    }
}
