//! Pure decision rules mapping an assessment to an intervention.
//!
//! Nothing here touches storage. The supervisor applies a [`PolicyDecision`]
//! to the task and commits it.

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    BlockPayload, CoherenceAssessment, DerailmentType, GuidancePayload, InterventionAction,
    InterventionPreferences, InterventionRequest, RedirectPayload, TaskStatus, WarningPayload,
};

pub const BLOCK_NOT_MET_ACTION: &str = "block threshold not met; no corrective action";

/// What the policy wants done for one assessment.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyDecision {
    /// Action to record, `None` when the step needs no intervention
    pub action: Option<InterventionAction>,
    pub action_taken: String,
    pub trigger_reason: String,
    /// False only for a block override the confidence did not justify
    pub was_successful: bool,
    /// Status the task should move to, if any
    pub target_status: Option<TaskStatus>,
    pub recovery_required: bool,
}

/// Reject preferences whose thresholds are out of range or out of order.
pub fn validate_preferences(prefs: &InterventionPreferences) -> DomainResult<()> {
    let in_range = |v: f64| v > 0.0 && v <= 1.0;
    if !(in_range(prefs.warning_threshold)
        && in_range(prefs.redirect_threshold)
        && in_range(prefs.block_threshold))
    {
        return Err(DomainError::ValidationFailed(
            "intervention thresholds must be in (0, 1]".to_string(),
        ));
    }
    if !(prefs.warning_threshold < prefs.redirect_threshold
        && prefs.redirect_threshold < prefs.block_threshold)
    {
        return Err(DomainError::ValidationFailed(format!(
            "intervention thresholds must be ordered warning < redirect < block, got {} / {} / {}",
            prefs.warning_threshold, prefs.redirect_threshold, prefs.block_threshold
        )));
    }
    Ok(())
}

/// Refocus prompt for a redirect, by derailment type.
pub fn refocus_prompt(derailment: DerailmentType, objective: &str) -> String {
    match derailment {
        DerailmentType::TaskDrift => format!(
            "Your last step drifted away from the task. Refocus on the objective: {objective}"
        ),
        DerailmentType::ScopeCreep => format!(
            "You are expanding beyond the requested scope. Limit the work to: {objective}"
        ),
        DerailmentType::RepetitionLoop => format!(
            "You are repeating earlier output. Take a different next step toward: {objective}"
        ),
        DerailmentType::ContextLoss => format!(
            "Reminder of the task you are working on: {objective}. Continue from your last completed step."
        ),
        _ => format!("Return to the task objective: {objective}"),
    }
}

/// Decide the intervention for `assessment` under `prefs`.
///
/// Order: block (or a demoted block override), caller guidance, redirect,
/// warning. The status target follows the confidence bands regardless of
/// which action was chosen; only a real block moves the task to blocked.
pub fn decide(
    objective: &str,
    assessment: &CoherenceAssessment,
    prefs: &InterventionPreferences,
    request: &InterventionRequest,
) -> PolicyDecision {
    let confidence = assessment.confidence;
    let exceeds_block = confidence > prefs.block_threshold;
    let band_status =
        (confidence > prefs.warning_threshold).then_some(TaskStatus::NeedsIntervention);
    let reason = format!(
        "{} at confidence {confidence:.2}: {}",
        assessment.derailment_type, assessment.explanation
    );

    if exceeds_block {
        let block_reason = format!(
            "Execution blocked: {} detected with confidence {confidence:.2} above {:.2}",
            assessment.derailment_type, prefs.block_threshold
        );
        return PolicyDecision {
            action: Some(InterventionAction::Block(BlockPayload {
                reason: block_reason,
                requires_acknowledgment: true,
            })),
            action_taken: "task blocked pending human acknowledgment".to_string(),
            trigger_reason: reason,
            was_successful: true,
            target_status: Some(TaskStatus::Blocked),
            recovery_required: true,
        };
    }

    if *request == InterventionRequest::ForceBlock {
        return PolicyDecision {
            action: Some(InterventionAction::Warning(WarningPayload {
                message: format!(
                    "Block requested but confidence {confidence:.2} does not exceed {:.2}",
                    prefs.block_threshold
                ),
                threshold_met: false,
            })),
            action_taken: BLOCK_NOT_MET_ACTION.to_string(),
            trigger_reason: reason,
            was_successful: false,
            target_status: band_status,
            recovery_required: false,
        };
    }

    match request {
        InterventionRequest::Suggest(text) => {
            return PolicyDecision {
                action: Some(InterventionAction::Suggest(GuidancePayload {
                    alternative: text.clone(),
                })),
                action_taken: "suggested alternative to the agent".to_string(),
                trigger_reason: reason,
                was_successful: true,
                target_status: band_status,
                recovery_required: false,
            };
        }
        InterventionRequest::Rewrite(text) => {
            return PolicyDecision {
                action: Some(InterventionAction::Rewrite(GuidancePayload {
                    alternative: text.clone(),
                })),
                action_taken: "rewrote step for the agent".to_string(),
                trigger_reason: reason,
                was_successful: true,
                target_status: band_status,
                recovery_required: false,
            };
        }
        InterventionRequest::None | InterventionRequest::ForceBlock => {}
    }

    if confidence > prefs.redirect_threshold {
        return PolicyDecision {
            action: Some(InterventionAction::Redirect(RedirectPayload {
                refocus_prompt: refocus_prompt(assessment.derailment_type, objective),
                derailment_type: assessment.derailment_type,
            })),
            action_taken: "redirected agent to the objective".to_string(),
            trigger_reason: reason,
            was_successful: true,
            target_status: band_status,
            recovery_required: false,
        };
    }

    if confidence > prefs.warning_threshold {
        return PolicyDecision {
            action: Some(InterventionAction::Warning(WarningPayload {
                message: format!(
                    "Possible {} (confidence {confidence:.2}); stay on the objective",
                    assessment.derailment_type
                ),
                threshold_met: true,
            })),
            action_taken: "warned agent".to_string(),
            trigger_reason: reason,
            was_successful: true,
            target_status: band_status,
            recovery_required: false,
        };
    }

    PolicyDecision {
        action: None,
        action_taken: "no intervention".to_string(),
        trigger_reason: reason,
        was_successful: true,
        target_status: None,
        recovery_required: false,
    }
}
