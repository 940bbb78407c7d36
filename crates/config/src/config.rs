//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// External media tool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolConfig {
    /// Directory holding the tool binary (`<exe dir>/Binaries` if None)
    #[serde(default)]
    pub binary_dir: Option<PathBuf>,
    /// File name of the tool binary, or an absolute path
    #[serde(default = "default_binary_name")]
    pub binary_name: String,
}

fn default_binary_name() -> String {
    "ffmpeg".to_string()
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            binary_dir: None,
            binary_name: default_binary_name(),
        }
    }
}

/// Scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// Maximum processes running at once (0 = default, clamped to 1..=2)
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: u32,
    /// How long cancellation waits for a killed process to be reaped
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
}

fn default_max_concurrent_jobs() -> u32 {
    2
}

fn default_cancel_grace_ms() -> u64 {
    1000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            cancel_grace_ms: default_cancel_grace_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Filter directives, e.g. `info` or `media_batch=debug`
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub tool: ToolConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing sections and fields fall back to their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// - MEDIA_BATCH_TOOL_DIR -> tool.binary_dir
    /// - MEDIA_BATCH_TOOL_NAME -> tool.binary_name
    /// - MEDIA_BATCH_MAX_CONCURRENT_JOBS -> scheduler.max_concurrent_jobs
    /// - MEDIA_BATCH_CANCEL_GRACE_MS -> scheduler.cancel_grace_ms
    /// - MEDIA_BATCH_LOG -> logging.filter
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("MEDIA_BATCH_TOOL_DIR") {
            if !val.is_empty() {
                self.tool.binary_dir = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = env::var("MEDIA_BATCH_TOOL_NAME") {
            if !val.is_empty() {
                self.tool.binary_name = val;
            }
        }

        if let Ok(val) = env::var("MEDIA_BATCH_MAX_CONCURRENT_JOBS") {
            if let Ok(jobs) = val.parse::<u32>() {
                self.scheduler.max_concurrent_jobs = jobs;
            }
        }

        if let Ok(val) = env::var("MEDIA_BATCH_CANCEL_GRACE_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.scheduler.cancel_grace_ms = ms;
            }
        }

        if let Ok(val) = env::var("MEDIA_BATCH_LOG") {
            if !val.is_empty() {
                self.logging.filter = val;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields defaults plus env overrides
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = match Self::load_from_file(path) {
            Ok(config) => config,
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Config::default()
            }
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    // Env var tests must not interleave
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env_vars() {
        env::remove_var("MEDIA_BATCH_TOOL_DIR");
        env::remove_var("MEDIA_BATCH_TOOL_NAME");
        env::remove_var("MEDIA_BATCH_MAX_CONCURRENT_JOBS");
        env::remove_var("MEDIA_BATCH_CANCEL_GRACE_MS");
        env::remove_var("MEDIA_BATCH_LOG");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_config_parses_all_sections(
            binary_dir in proptest::option::of("[a-z/]{1,20}"),
            binary_name in "[a-z][a-z0-9_-]{0,12}",
            max_jobs in 0u32..16,
            grace in 0u64..10_000,
            filter in "(info|debug|warn|trace)",
        ) {
            let toml_str = format!(
                r#"
[tool]
{}
binary_name = "{}"

[scheduler]
max_concurrent_jobs = {}
cancel_grace_ms = {}

[logging]
filter = "{}"
"#,
                binary_dir
                    .as_ref()
                    .map(|d| format!("binary_dir = \"{}\"", d))
                    .unwrap_or_default(),
                binary_name,
                max_jobs,
                grace,
                filter,
            );

            let config = Config::parse_toml(&toml_str).expect("Valid TOML should parse");

            prop_assert_eq!(config.tool.binary_dir, binary_dir.map(PathBuf::from));
            prop_assert_eq!(config.tool.binary_name, binary_name);
            prop_assert_eq!(config.scheduler.max_concurrent_jobs, max_jobs);
            prop_assert_eq!(config.scheduler.cancel_grace_ms, grace);
            prop_assert_eq!(config.logging.filter, filter);
        }

        #[test]
        fn prop_env_overrides_max_concurrent_jobs(
            initial_jobs in 0u32..8,
            override_jobs in 0u32..16,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!("[scheduler]\nmax_concurrent_jobs = {}\n", initial_jobs);
            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("MEDIA_BATCH_MAX_CONCURRENT_JOBS", override_jobs.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.scheduler.max_concurrent_jobs, override_jobs);
        }

        #[test]
        fn prop_env_overrides_cancel_grace(
            initial in 0u64..5_000,
            override_ms in 0u64..5_000,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!("[scheduler]\ncancel_grace_ms = {}\n", initial);
            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("MEDIA_BATCH_CANCEL_GRACE_MS", override_ms.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.scheduler.cancel_grace_ms, override_ms);
        }
    }

    #[test]
    fn test_env_overrides_tool_and_logging() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("MEDIA_BATCH_TOOL_DIR", "/opt/tools");
        env::set_var("MEDIA_BATCH_TOOL_NAME", "ffmpeg7");
        env::set_var("MEDIA_BATCH_LOG", "media_batch=debug");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.tool.binary_dir, Some(PathBuf::from("/opt/tools")));
        assert_eq!(config.tool.binary_name, "ffmpeg7");
        assert_eq!(config.logging.filter, "media_batch=debug");
    }

    #[test]
    fn test_invalid_env_value_keeps_existing() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("MEDIA_BATCH_MAX_CONCURRENT_JOBS", "two");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.scheduler.max_concurrent_jobs, 2);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse_toml("").expect("Empty TOML should parse");

        assert_eq!(config.tool.binary_dir, None);
        assert_eq!(config.tool.binary_name, "ffmpeg");
        assert_eq!(config.scheduler.max_concurrent_jobs, 2);
        assert_eq!(config.scheduler.cancel_grace_ms, 1000);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let toml_str = r#"
[scheduler]
max_concurrent_jobs = 1
"#;
        let config = Config::parse_toml(toml_str).expect("Partial TOML should parse");

        assert_eq!(config.scheduler.max_concurrent_jobs, 1);
        assert_eq!(config.scheduler.cancel_grace_ms, 1000);
        assert_eq!(config.tool.binary_name, "ffmpeg");
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let config = Config::load_or_default("/nonexistent/media-batch.toml")
            .expect("missing file should fall back to defaults");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = Config::parse_toml("[scheduler\nmax_concurrent_jobs = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
