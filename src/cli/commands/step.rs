//! `warden step`: score one agent step, optionally applying the policy.

use anyhow::Result;
use clap::Args;

use crate::cli::id_resolver::resolve_task_id;
use crate::cli::output::{output, CommandOutput};
use crate::cli::CliContext;
use crate::domain::models::{CoherenceAssessment, InterventionDecision, InterventionRequest};

#[derive(Args, Debug)]
pub struct StepArgs {
    /// Task ID or unique prefix
    pub task: String,

    /// The agent's step output
    pub step: String,

    /// Recent step outputs, oldest first (repeatable)
    #[arg(long = "history")]
    pub history: Vec<String>,

    /// Apply the intervention policy to the assessment
    #[arg(short, long)]
    pub intervene: bool,

    /// Ask for a block regardless of the derailment band
    #[arg(long, requires = "intervene", conflicts_with_all = ["suggest", "rewrite"])]
    pub force_block: bool,

    /// Ask for guidance with this alternative text
    #[arg(long, requires = "intervene", conflicts_with = "rewrite")]
    pub suggest: Option<String>,

    /// Ask for the step to be rewritten to this text
    #[arg(long, requires = "intervene")]
    pub rewrite: Option<String>,
}

impl StepArgs {
    fn request(&self) -> InterventionRequest {
        if self.force_block {
            InterventionRequest::ForceBlock
        } else if let Some(text) = &self.suggest {
            InterventionRequest::Suggest(text.clone())
        } else if let Some(text) = &self.rewrite {
            InterventionRequest::Rewrite(text.clone())
        } else {
            InterventionRequest::None
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct StepOutput {
    pub task_id: String,
    pub assessment: CoherenceAssessment,
    pub decision: Option<InterventionDecision>,
}

impl CommandOutput for StepOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!(
                "Assessment: {} (confidence {:.2})",
                self.assessment.derailment_type, self.assessment.confidence
            ),
            format!("  {}", self.assessment.explanation),
        ];

        if let Some(decision) = &self.decision {
            match (&decision.intervention, decision.absorbed_by) {
                (Some(intervention), _) => {
                    lines.push(format!(
                        "Intervention: {} ({})",
                        intervention.kind(),
                        intervention.action_taken
                    ));
                    lines.push(format!("  {}", intervention.action.message()));
                }
                (None, Some(open)) => {
                    lines.push(format!("Absorbed by open intervention {open}"));
                }
                (None, None) => lines.push("No intervention".to_string()),
            }
            if decision.status == decision.previous_status {
                lines.push(format!("Status: {}", decision.status));
            } else {
                lines.push(format!(
                    "Status: {} -> {}",
                    decision.previous_status, decision.status
                ));
            }
            if decision.recovery_required {
                lines.push("Recovery required: hand the task to the recovery orchestrator".to_string());
            }
        }

        lines.join("\n")
    }
}

pub async fn execute(args: StepArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;
    let task_id = resolve_task_id(&ctx.pool, &args.task).await?;

    let assessment = ctx
        .supervisor
        .assess_step(task_id, &args.step, &args.history)
        .await?;

    let decision = if args.intervene {
        Some(
            ctx.supervisor
                .intervene(task_id, &assessment, &ctx.config.intervention, args.request())
                .await?,
        )
    } else {
        None
    };

    output(
        &StepOutput {
            task_id: task_id.to_string(),
            assessment,
            decision,
        },
        json_mode,
    );
    Ok(())
}
