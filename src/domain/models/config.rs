use serde::{Deserialize, Serialize};

use super::intervention::InterventionPreferences;

/// Main configuration structure for Warden
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Coherence analyzer rule parameters
    #[serde(default)]
    pub coherence: CoherenceConfig,

    /// Default intervention thresholds
    #[serde(default)]
    pub intervention: InterventionPreferences,

    /// Retry strategy configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Snapshot retention
    #[serde(default)]
    pub snapshots: SnapshotConfig,

    /// Loop detection on the step stream
    #[serde(default)]
    pub loop_detection: LoopDetectionConfig,

    /// Recovery orchestration and escalation
    #[serde(default)]
    pub recovery: RecoveryConfig,

    /// Notification channel toggles handed to the notifier
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".warden/warden.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    #[serde(default = "default_true")]
    pub enable_stdout: bool,

    /// Rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Number of days to retain logs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            enable_stdout: default_true(),
            rotation: default_rotation(),
            retention_days: default_retention_days(),
        }
    }
}

/// Coherence analyzer rule parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CoherenceConfig {
    /// Keyword overlap below which a step counts as drift
    #[serde(default = "default_drift_overlap_threshold")]
    pub drift_overlap_threshold: f64,

    /// New-keyword ratio above which a step counts as scope creep
    #[serde(default = "default_scope_creep_ratio")]
    pub scope_creep_ratio: f64,

    /// Leading characters compared for repetition
    #[serde(default = "default_repetition_prefix_chars")]
    pub repetition_prefix_chars: usize,

    /// History entries inspected for repetition
    #[serde(default = "default_repetition_lookback")]
    pub repetition_lookback: usize,

    /// Shorter tokens are not keywords
    #[serde(default = "default_min_keyword_len")]
    pub min_keyword_len: usize,

    #[serde(default = "default_baseline_confidence")]
    pub baseline_confidence: f64,

    #[serde(default = "default_repetition_confidence")]
    pub repetition_confidence: f64,

    #[serde(default = "default_context_loss_confidence")]
    pub context_loss_confidence: f64,

    #[serde(default = "default_instruction_ignore_confidence")]
    pub instruction_ignore_confidence: f64,

    #[serde(default = "default_context_loss_phrases")]
    pub context_loss_phrases: Vec<String>,

    #[serde(default = "default_instruction_ignore_phrases")]
    pub instruction_ignore_phrases: Vec<String>,
}

const fn default_drift_overlap_threshold() -> f64 {
    0.3
}

const fn default_scope_creep_ratio() -> f64 {
    1.5
}

const fn default_repetition_prefix_chars() -> usize {
    50
}

const fn default_repetition_lookback() -> usize {
    3
}

const fn default_min_keyword_len() -> usize {
    3
}

const fn default_baseline_confidence() -> f64 {
    0.2
}

const fn default_repetition_confidence() -> f64 {
    0.95
}

const fn default_context_loss_confidence() -> f64 {
    0.8
}

const fn default_instruction_ignore_confidence() -> f64 {
    0.75
}

fn default_context_loss_phrases() -> Vec<String> {
    [
        "what was the task",
        "what was i doing",
        "i don't have context",
        "i do not have context",
        "lost track",
        "remind me what",
        "not sure what we were",
        "what are we working on",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

fn default_instruction_ignore_phrases() -> Vec<String> {
    [
        "ignore the previous instructions",
        "ignore previous instructions",
        "instead of doing what",
        "rather than following",
        "i'll do something different",
        "i will do something different",
        "disregard the instructions",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

impl Default for CoherenceConfig {
    fn default() -> Self {
        Self {
            drift_overlap_threshold: default_drift_overlap_threshold(),
            scope_creep_ratio: default_scope_creep_ratio(),
            repetition_prefix_chars: default_repetition_prefix_chars(),
            repetition_lookback: default_repetition_lookback(),
            min_keyword_len: default_min_keyword_len(),
            baseline_confidence: default_baseline_confidence(),
            repetition_confidence: default_repetition_confidence(),
            context_loss_confidence: default_context_loss_confidence(),
            instruction_ignore_confidence: default_instruction_ignore_confidence(),
            context_loss_phrases: default_context_loss_phrases(),
            instruction_ignore_phrases: default_instruction_ignore_phrases(),
        }
    }
}

/// Backoff curve between retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Exponential,
    Linear,
    Fixed,
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Growth factor for exponential backoff
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default)]
    pub backoff: BackoffKind,

    /// Retrying stops when the class success rate drops below this
    #[serde(default = "default_success_rate_threshold")]
    pub success_rate_threshold: f64,

    /// Observations required before the success rate is trusted
    #[serde(default = "default_min_samples")]
    pub min_samples: u32,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_base_delay_ms() -> u64 {
    1_000
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_max_delay_ms() -> u64 {
    30_000
}

const fn default_success_rate_threshold() -> f64 {
    0.2
}

const fn default_min_samples() -> u32 {
    5
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            backoff: BackoffKind::default(),
            success_rate_threshold: default_success_rate_threshold(),
            min_samples: default_min_samples(),
        }
    }
}

/// Snapshot retention policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SnapshotConfig {
    /// Snapshots kept per task; oldest evicted first
    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: u32,

    /// Snapshots older than this are evicted
    #[serde(default = "default_cleanup_after_hours")]
    pub cleanup_after_hours: u32,
}

const fn default_max_snapshots() -> u32 {
    10
}

const fn default_cleanup_after_hours() -> u32 {
    24
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_snapshots: default_max_snapshots(),
            cleanup_after_hours: default_cleanup_after_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoopDetectionConfig {
    /// Keyword Jaccard similarity at which two signatures count as the same
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    #[serde(default = "default_time_window_seconds")]
    pub time_window_seconds: u64,

    /// Occurrences within the window that trip the breaker
    #[serde(default = "default_repeat_threshold")]
    pub repeat_threshold: u32,
}

const fn default_similarity_threshold() -> f64 {
    0.9
}

const fn default_time_window_seconds() -> u64 {
    300
}

const fn default_repeat_threshold() -> u32 {
    3
}

impl Default for LoopDetectionConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            time_window_seconds: default_time_window_seconds(),
            repeat_threshold: default_repeat_threshold(),
        }
    }
}

/// Weights of the escalation priority formula
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EscalationWeights {
    #[serde(default = "default_severity_weight")]
    pub severity: f64,

    #[serde(default = "default_retry_weight")]
    pub retry_exhaustion: f64,

    #[serde(default = "default_business_weight")]
    pub business_criticality: f64,
}

const fn default_severity_weight() -> f64 {
    0.5
}

const fn default_retry_weight() -> f64 {
    0.2
}

const fn default_business_weight() -> f64 {
    0.3
}

impl Default for EscalationWeights {
    fn default() -> Self {
        Self {
            severity: default_severity_weight(),
            retry_exhaustion: default_retry_weight(),
            business_criticality: default_business_weight(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RecoveryConfig {
    /// Automated attempts a task may consume before every error escalates
    #[serde(default = "default_max_auto_recovery_attempts")]
    pub max_auto_recovery_attempts: u32,

    /// Error kinds always classified critical
    #[serde(default = "default_critical_error_types")]
    pub critical_error_types: Vec<String>,

    #[serde(default)]
    pub escalation_weights: EscalationWeights,
}

const fn default_max_auto_recovery_attempts() -> u32 {
    10
}

fn default_critical_error_types() -> Vec<String> {
    vec!["resource_exhaustion".to_string()]
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_auto_recovery_attempts: default_max_auto_recovery_attempts(),
            critical_error_types: default_critical_error_types(),
            escalation_weights: EscalationWeights::default(),
        }
    }
}

/// Channels the external notifier should deliver escalations to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NotificationConfig {
    #[serde(default)]
    pub email: bool,

    #[serde(default)]
    pub slack: bool,

    #[serde(default)]
    pub webhook: bool,
}

impl NotificationConfig {
    pub fn enabled_channels(&self) -> Vec<&'static str> {
        let mut channels = Vec::new();
        if self.email {
            channels.push("email");
        }
        if self.slack {
            channels.push("slack");
        }
        if self.webhook {
            channels.push("webhook");
        }
        channels
    }

    pub fn any_enabled(&self) -> bool {
        self.email || self.slack || self.webhook
    }
}
