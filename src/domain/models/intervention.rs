//! Intervention domain model.
//!
//! An intervention is the graduated corrective action the policy engine
//! takes against a derailing task. Each variant carries its own payload so
//! callers never check for optional fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::coherence::DerailmentType;
use super::task::TaskStatus;

/// Kind of intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionType {
    Warning,
    Redirect,
    Block,
    Suggest,
    Rewrite,
}

impl std::fmt::Display for InterventionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl InterventionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Redirect => "redirect",
            Self::Block => "block",
            Self::Suggest => "suggest",
            Self::Rewrite => "rewrite",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "warning" | "warn" => Some(Self::Warning),
            "redirect" => Some(Self::Redirect),
            "block" => Some(Self::Block),
            "suggest" => Some(Self::Suggest),
            "rewrite" => Some(Self::Rewrite),
            _ => None,
        }
    }

    /// Severity rank used when a new decision meets an open intervention.
    /// A new intervention may only supersede an open one of lower rank.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Warning => 1,
            Self::Suggest | Self::Rewrite => 2,
            Self::Redirect => 3,
            Self::Block => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarningPayload {
    pub message: String,
    /// False when this warning is a demoted block request that did not meet
    /// the block threshold.
    pub threshold_met: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedirectPayload {
    pub refocus_prompt: String,
    pub derailment_type: DerailmentType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockPayload {
    pub reason: String,
    pub requires_acknowledgment: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidancePayload {
    /// Caller-supplied alternative text
    pub alternative: String,
}

/// The action an intervention carries, one payload per variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InterventionAction {
    Warning(WarningPayload),
    Redirect(RedirectPayload),
    Block(BlockPayload),
    Suggest(GuidancePayload),
    Rewrite(GuidancePayload),
}

impl InterventionAction {
    pub fn kind(&self) -> InterventionType {
        match self {
            Self::Warning(_) => InterventionType::Warning,
            Self::Redirect(_) => InterventionType::Redirect,
            Self::Block(_) => InterventionType::Block,
            Self::Suggest(_) => InterventionType::Suggest,
            Self::Rewrite(_) => InterventionType::Rewrite,
        }
    }

    /// Text delivered to the agent (or operator) for this action.
    pub fn message(&self) -> &str {
        match self {
            Self::Warning(p) => &p.message,
            Self::Redirect(p) => &p.refocus_prompt,
            Self::Block(p) => &p.reason,
            Self::Suggest(p) | Self::Rewrite(p) => &p.alternative,
        }
    }
}

/// A persisted intervention record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    pub id: Uuid,
    pub task_id: Uuid,
    pub action: InterventionAction,
    pub trigger_reason: String,
    pub action_taken: String,
    pub confidence_score: f64,
    pub derailment_type: DerailmentType,
    pub was_successful: bool,
    pub resolution: Option<String>,
    /// Set when a higher-ranked intervention explicitly replaced this one
    pub superseded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Intervention {
    pub fn new(
        task_id: Uuid,
        action: InterventionAction,
        trigger_reason: impl Into<String>,
        action_taken: impl Into<String>,
        confidence_score: f64,
        derailment_type: DerailmentType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            action,
            trigger_reason: trigger_reason.into(),
            action_taken: action_taken.into(),
            confidence_score,
            derailment_type,
            was_successful: true,
            resolution: None,
            superseded_by: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn with_success(mut self, was_successful: bool) -> Self {
        self.was_successful = was_successful;
        self
    }

    pub fn kind(&self) -> InterventionType {
        self.action.kind()
    }

    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }

    pub fn resolve(&mut self, was_successful: bool, resolution: impl Into<String>) {
        self.was_successful = was_successful;
        self.resolution = Some(resolution.into());
        self.resolved_at = Some(Utc::now());
    }

    pub fn supersede(&mut self, by: Uuid) {
        self.superseded_by = Some(by);
        self.resolve(false, format!("superseded by intervention {by}"));
    }
}

/// User-configurable intervention thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InterventionPreferences {
    /// Confidence above which a task is blocked
    #[serde(default = "default_block_threshold")]
    pub block_threshold: f64,

    /// Confidence above which a redirect is issued
    #[serde(default = "default_redirect_threshold")]
    pub redirect_threshold: f64,

    /// Confidence above which a warning is issued and the task needs intervention
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,
}

const fn default_block_threshold() -> f64 {
    0.9
}

const fn default_redirect_threshold() -> f64 {
    0.8
}

const fn default_warning_threshold() -> f64 {
    0.7
}

impl Default for InterventionPreferences {
    fn default() -> Self {
        Self {
            block_threshold: default_block_threshold(),
            redirect_threshold: default_redirect_threshold(),
            warning_threshold: default_warning_threshold(),
        }
    }
}

/// What the caller explicitly asks for alongside an assessment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum InterventionRequest {
    /// Confidence-triggered only
    #[default]
    None,
    /// User override asking for a block
    ForceBlock,
    /// Caller asks for guidance with this alternative text
    Suggest(String),
    /// Caller asks for the step to be rewritten to this text
    Rewrite(String),
}

/// Outcome of an `intervene` call.
#[derive(Debug, Clone, Serialize)]
pub struct InterventionDecision {
    pub task_id: Uuid,
    /// Intervention created by this call, if any
    pub intervention: Option<Intervention>,
    /// Open intervention this call superseded
    pub superseded: Option<Uuid>,
    /// Set when the decision was absorbed by an equal-or-higher open intervention
    pub absorbed_by: Option<Uuid>,
    pub previous_status: TaskStatus,
    pub status: TaskStatus,
    /// A block fired; the host should hand the task to the recovery orchestrator
    pub recovery_required: bool,
}
