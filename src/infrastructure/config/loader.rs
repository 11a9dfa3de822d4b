use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;
use crate::services::intervention_policy::validate_preferences;

/// Directory holding project-local configuration and the database.
pub const CONFIG_DIR: &str = ".warden";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid max_retries: {0}. Cannot be 0")]
    InvalidMaxRetries(u32),

    #[error("Invalid backoff configuration: base_delay_ms ({0}) must not exceed max_delay_ms ({1})")]
    InvalidBackoff(u64, u64),

    #[error(
        "Invalid intervention thresholds: need 0 < warning ({warning}) < redirect ({redirect}) < block ({block}) <= 1"
    )]
    InvalidThresholds { warning: f64, redirect: f64, block: f64 },

    #[error("Invalid max_snapshots: {0}. Must be at least 1")]
    InvalidMaxSnapshots(u32),

    #[error("Invalid loop repeat_threshold: {0}. Must be at least 2")]
    InvalidRepeatThreshold(u32),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for the project in the current directory.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .warden/config.yaml (project config, created by init)
    /// 3. .warden/local.yaml (project local overrides, optional)
    /// 4. Environment variables (WARDEN_* prefix, `__` separates nesting)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".")
    }

    /// Same layering as [`ConfigLoader::load`], rooted at `root`.
    pub fn load_from_dir(root: impl AsRef<Path>) -> Result<Config> {
        let dir = root.as_ref().join(CONFIG_DIR);
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("WARDEN_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        if config.logging.retention_days == 0 {
            return Err(ConfigError::ValidationFailed(
                "logging.retention_days must be at least 1".to_string(),
            ));
        }

        if config.retry.max_retries == 0 {
            return Err(ConfigError::InvalidMaxRetries(config.retry.max_retries));
        }

        if config.retry.base_delay_ms > config.retry.max_delay_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.base_delay_ms,
                config.retry.max_delay_ms,
            ));
        }

        if config.retry.multiplier < 1.0 {
            return Err(ConfigError::ValidationFailed(format!(
                "retry.multiplier must be at least 1, got {}",
                config.retry.multiplier
            )));
        }

        if !(0.0..=1.0).contains(&config.retry.success_rate_threshold) {
            return Err(ConfigError::ValidationFailed(format!(
                "retry.success_rate_threshold must be within [0, 1], got {}",
                config.retry.success_rate_threshold
            )));
        }

        let prefs = &config.intervention;
        if validate_preferences(prefs).is_err() {
            return Err(ConfigError::InvalidThresholds {
                warning: prefs.warning_threshold,
                redirect: prefs.redirect_threshold,
                block: prefs.block_threshold,
            });
        }

        if config.snapshots.max_snapshots == 0 {
            return Err(ConfigError::InvalidMaxSnapshots(config.snapshots.max_snapshots));
        }

        if config.loop_detection.repeat_threshold < 2 {
            return Err(ConfigError::InvalidRepeatThreshold(
                config.loop_detection.repeat_threshold,
            ));
        }

        let similarity = config.loop_detection.similarity_threshold;
        if similarity <= 0.0 || similarity > 1.0 {
            return Err(ConfigError::ValidationFailed(format!(
                "loop_detection.similarity_threshold must be within (0, 1], got {similarity}"
            )));
        }

        let weights = &config.recovery.escalation_weights;
        if weights.severity < 0.0 || weights.retry_exhaustion < 0.0 || weights.business_criticality < 0.0 {
            return Err(ConfigError::ValidationFailed(
                "recovery.escalation_weights must be non-negative".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project_with(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        let config_dir = dir.path().join(CONFIG_DIR);
        fs::create_dir_all(&config_dir).unwrap();
        for (name, contents) in files {
            fs::write(config_dir.join(name), contents).unwrap();
        }
        dir
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.path, ".warden/warden.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.snapshots.max_snapshots, 10);
        assert_eq!(config.recovery.max_auto_recovery_attempts, 10);
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
database:
  path: /custom/path.db
  max_connections: 3
intervention:
  block_threshold: 0.95
retry:
  backoff: linear
  base_delay_ms: 200
snapshots:
  max_snapshots: 4
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.database.path, "/custom/path.db");
        assert_eq!(config.database.max_connections, 3);
        assert!((config.intervention.block_threshold - 0.95).abs() < f64::EPSILON);
        assert!((config.intervention.redirect_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.retry.base_delay_ms, 200);
        assert_eq!(config.snapshots.max_snapshots, 4);
        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLogFormat(_)
        ));
    }

    #[test]
    fn test_validate_empty_database_path() {
        let mut config = Config::default();
        config.database.path = String::new();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::EmptyDatabasePath
        ));
    }

    #[test]
    fn test_validate_zero_max_retries() {
        let mut config = Config::default();
        config.retry.max_retries = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidMaxRetries(0)
        ));
    }

    #[test]
    fn test_validate_invalid_backoff() {
        let mut config = Config::default();
        config.retry.base_delay_ms = 30_000;
        config.retry.max_delay_ms = 10_000;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidBackoff(30_000, 10_000)
        ));
    }

    #[test]
    fn test_validate_unordered_thresholds() {
        let mut config = Config::default();
        config.intervention.redirect_threshold = 0.95;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidThresholds { .. }
        ));

        config.intervention = Default::default();
        config.intervention.warning_threshold = 0.0;
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_equal_thresholds() {
        let mut config = Config::default();
        config.intervention.redirect_threshold = 0.9;
        config.intervention.block_threshold = 0.9;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidThresholds { .. }
        ));

        let mut config = Config::default();
        config.intervention.warning_threshold = config.intervention.redirect_threshold;
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_loaded_thresholds_are_accepted_by_policy() {
        let project = project_with(&[(
            "config.yaml",
            "intervention:\n  warning_threshold: 0.6\n  redirect_threshold: 0.75\n  block_threshold: 0.85\n",
        )]);
        let config = ConfigLoader::load_from_dir(project.path()).unwrap();
        validate_preferences(&config.intervention).unwrap();

        let project = project_with(&[(
            "config.yaml",
            "intervention:\n  redirect_threshold: 0.9\n  block_threshold: 0.9\n",
        )]);
        assert!(ConfigLoader::load_from_dir(project.path()).is_err());
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = Config::default();
        config.retry.multiplier = 0.5;
        assert!(ConfigLoader::validate(&config).is_err());

        let mut config = Config::default();
        config.loop_detection.similarity_threshold = 0.0;
        assert!(ConfigLoader::validate(&config).is_err());

        let mut config = Config::default();
        config.recovery.escalation_weights.severity = -0.1;
        assert!(ConfigLoader::validate(&config).is_err());

        let mut config = Config::default();
        config.logging.retention_days = 0;
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_zero_snapshots() {
        let mut config = Config::default();
        config.snapshots.max_snapshots = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidMaxSnapshots(0)
        ));
    }

    #[test]
    fn test_hierarchical_merging() {
        let project = project_with(&[
            (
                "config.yaml",
                "logging:\n  level: info\n  format: json\nsnapshots:\n  max_snapshots: 5\n",
            ),
            ("local.yaml", "logging:\n  level: debug\n"),
        ]);

        let config = temp_env::with_vars_unset(["WARDEN_LOGGING__LEVEL"], || {
            ConfigLoader::load_from_dir(project.path()).unwrap()
        });

        assert_eq!(config.logging.level, "debug", "Local override should win");
        assert_eq!(
            config.logging.format, "json",
            "Base value should persist when not overridden"
        );
        assert_eq!(config.snapshots.max_snapshots, 5);
    }

    #[test]
    fn test_env_override() {
        let project = project_with(&[("config.yaml", "logging:\n  level: info\n")]);

        let config = temp_env::with_vars(
            [
                ("WARDEN_LOGGING__LEVEL", Some("warn")),
                ("WARDEN_RETRY__MAX_RETRIES", Some("5")),
            ],
            || ConfigLoader::load_from_dir(project.path()).unwrap(),
        );

        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.retry.max_retries, 5);
    }

    #[test]
    fn test_missing_files_use_defaults() {
        let project = TempDir::new().unwrap();
        let config = ConfigLoader::load_from_dir(project.path()).unwrap();
        assert_eq!(config.database.path, ".warden/warden.db");
    }

    #[test]
    fn test_invalid_file_rejected() {
        let project = project_with(&[("config.yaml", "snapshots:\n  max_snapshots: 0\n")]);
        assert!(ConfigLoader::load_from_dir(project.path()).is_err());
    }
}
