//! Application configuration for the sparsebench CLI.
//!
//! Sources, highest priority first:
//! 1. Environment variables (`SPARSEBENCH_*`)
//! 2. TOML configuration file
//! 3. Default values

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::target::{TargetDescriptor, TargetSlot};

/// Config file picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "sparsebench.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// The two compared deployments
    #[serde(default)]
    pub targets: TargetsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Report output configuration
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetsConfig {
    #[serde(default = "default_target_a")]
    pub a: TargetConfig,

    #[serde(default = "default_target_b")]
    pub b: TargetConfig,
}

/// Connection and query settings of one search deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Display name used in reports (e.g. "EIS")
    pub name: String,

    /// Base URL of the search deployment (e.g. "https://my-project.es.example.io")
    #[serde(default)]
    pub endpoint: String,

    /// API key sent as `Authorization: ApiKey <key>`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Sparse-embedding inference model id
    pub model_id: String,

    /// Index holding the enriched documents (default: "shakespeare-enriched")
    #[serde(default = "default_index")]
    pub index: String,

    /// Plain-text index queried by the lexical fallback (default: "shakespeare")
    #[serde(default = "default_fallback_index")]
    pub fallback_index: String,

    /// Number of hits requested per query (default: 10)
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retry a failed sparse query as a lexical `match` query (default: true)
    #[serde(default = "default_true")]
    pub fallback_to_match: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error (default: "info")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty (default: "pretty")
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Report output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Directory reports are written to; no report file when unset
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Report format: json or markdown (default: "json")
    #[serde(default = "default_report_format")]
    pub format: String,
}

fn default_target_a() -> TargetConfig {
    TargetConfig::with_identity("EIS", ".elser-2-elastic")
}

fn default_target_b() -> TargetConfig {
    TargetConfig::with_identity("ML Node", ".elser-2-elasticsearch")
}

fn default_index() -> String {
    "shakespeare-enriched".to_string()
}

fn default_fallback_index() -> String {
    "shakespeare".to_string()
}

fn default_top_n() -> usize {
    10
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_report_format() -> String {
    "json".to_string()
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            a: default_target_a(),
            b: default_target_b(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            format: default_report_format(),
        }
    }
}

impl TargetConfig {
    fn with_identity(name: &str, model_id: &str) -> Self {
        Self {
            name: name.to_string(),
            endpoint: String::new(),
            api_key: None,
            model_id: model_id.to_string(),
            index: default_index(),
            fallback_index: default_fallback_index(),
            top_n: default_top_n(),
            timeout_secs: default_timeout_secs(),
            fallback_to_match: true,
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> TargetDescriptor {
        TargetDescriptor::new(&self.name, &self.model_id)
    }

    /// Whether an endpoint has been configured for this target.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.endpoint.trim().is_empty()
    }
}

impl TargetsConfig {
    #[must_use]
    pub fn get(&self, slot: TargetSlot) -> &TargetConfig {
        match slot {
            TargetSlot::A => &self.a,
            TargetSlot::B => &self.b,
        }
    }

    fn get_mut(&mut self, slot: TargetSlot) -> &mut TargetConfig {
        match slot {
            TargetSlot::A => &mut self.a,
            TargetSlot::B => &mut self.b,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::TomlError { path, source: e })
    }

    /// Load configuration with environment overrides, then validate it.
    ///
    /// Reads `path` when given, else `sparsebench.toml` when present in the
    /// working directory, else starts from defaults.
    ///
    /// Supported environment variables (`X` is `A` or `B`):
    /// - `SPARSEBENCH_X_ENDPOINT`, `SPARSEBENCH_X_API_KEY`
    /// - `SPARSEBENCH_X_MODEL_ID`, `SPARSEBENCH_X_INDEX`
    /// - `SPARSEBENCH_LOG_LEVEL`, `SPARSEBENCH_LOG_FORMAT`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;

        tracing::debug!(
            a = %config.targets.a.descriptor(),
            b = %config.targets.b.descriptor(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        for slot in TargetSlot::ALL {
            let prefix = format!("SPARSEBENCH_{}", slot.as_str().to_uppercase());
            let target = self.targets.get_mut(slot);

            if let Ok(endpoint) = std::env::var(format!("{prefix}_ENDPOINT")) {
                target.endpoint = endpoint;
            }

            if let Ok(api_key) = std::env::var(format!("{prefix}_API_KEY")) {
                target.api_key = Some(api_key);
            }

            if let Ok(model_id) = std::env::var(format!("{prefix}_MODEL_ID")) {
                target.model_id = model_id;
            }

            if let Ok(index) = std::env::var(format!("{prefix}_INDEX")) {
                target.index = index;
            }
        }

        if let Ok(level) = std::env::var("SPARSEBENCH_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = std::env::var("SPARSEBENCH_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Validate the configuration.
    ///
    /// Endpoints may be left empty here; commands that contact the targets
    /// call [`AppConfig::ensure_endpoints`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        for slot in TargetSlot::ALL {
            let target = self.targets.get(slot);
            let section = format!("targets.{slot}");

            if target.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{section}.name cannot be empty"
                )));
            }

            if target.model_id.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{section}.model_id cannot be empty"
                )));
            }

            if target.index.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{section}.index cannot be empty"
                )));
            }

            if target.is_configured()
                && !(target.endpoint.starts_with("http://") || target.endpoint.starts_with("https://"))
            {
                return Err(ConfigError::ValidationError(format!(
                    "{section}.endpoint must start with http:// or https://"
                )));
            }

            if target.top_n == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{section}.top_n must be > 0"
                )));
            }

            if target.timeout_secs == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{section}.timeout_secs must be > 0"
                )));
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.format must be one of: {}",
                valid_formats.join(", ")
            )));
        }

        let valid_report_formats = ["json", "markdown"];
        if !valid_report_formats.contains(&self.report.format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "report.format must be one of: {}",
                valid_report_formats.join(", ")
            )));
        }

        Ok(())
    }

    /// Fails unless both targets have an endpoint.
    pub fn ensure_endpoints(&self) -> Result<(), ConfigError> {
        for slot in TargetSlot::ALL {
            if !self.targets.get(slot).is_configured() {
                let upper = slot.as_str().to_uppercase();
                return Err(ConfigError::ValidationError(format!(
                    "targets.{slot}.endpoint is not set (config file or SPARSEBENCH_{upper}_ENDPOINT)"
                )));
            }
        }
        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading configuration file
    #[error("Failed to read config file {path:?}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// TOML parsing error
    #[error("Failed to parse TOML in {path:?}: {source}")]
    TomlError {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Validation error
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.targets.a.name, "EIS");
        assert_eq!(config.targets.a.model_id, ".elser-2-elastic");
        assert_eq!(config.targets.b.name, "ML Node");
        assert_eq!(config.targets.b.model_id, ".elser-2-elasticsearch");
        assert_eq!(config.targets.a.index, "shakespeare-enriched");
        assert_eq!(config.targets.b.top_n, 10);
        assert!(config.targets.a.fallback_to_match);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_have_no_endpoints() {
        let config = AppConfig::default();
        let err = config.ensure_endpoints().unwrap_err();
        assert!(err.to_string().contains("SPARSEBENCH_A_ENDPOINT"));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
            [targets.a]
            name = "managed"
            endpoint = "https://a.example.io"
            api_key = "secret"
            model_id = "sparse-v2"

            [targets.b]
            name = "self-hosted"
            endpoint = "http://localhost:9200"
            model_id = "sparse-v2-local"
            top_n = 5
            fallback_to_match = false

            [report]
            format = "markdown"
        "#;

        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.targets.a.name, "managed");
        assert_eq!(config.targets.a.api_key.as_deref(), Some("secret"));
        assert_eq!(config.targets.a.index, "shakespeare-enriched");
        assert_eq!(config.targets.b.top_n, 5);
        assert!(!config.targets.b.fallback_to_match);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.report.format, "markdown");
        assert!(config.validate().is_ok());
        assert!(config.ensure_endpoints().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nlevel = \"debug\"\nformat = \"json\"").unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.targets.a.name, "EIS");
    }

    #[test]
    fn test_from_file_errors() {
        let err = AppConfig::from_file("/nonexistent/sparsebench.toml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError { .. }));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[targets.a\nname = ").unwrap();
        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::TomlError { .. }));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.targets.b.top_n = 0;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("targets.b.top_n must be > 0"));

        let mut config = AppConfig::default();
        config.targets.a.endpoint = "ftp://nowhere".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("logging.level must be"));

        let mut config = AppConfig::default();
        config.report.format = "csv".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("SPARSEBENCH_B_ENDPOINT", "https://b.example.io");
        std::env::set_var("SPARSEBENCH_B_API_KEY", "b-key");
        std::env::set_var("SPARSEBENCH_A_MODEL_ID", "custom-model");

        let mut config = AppConfig::default();
        config.apply_env_overrides();

        assert_eq!(config.targets.b.endpoint, "https://b.example.io");
        assert_eq!(config.targets.b.api_key.as_deref(), Some("b-key"));
        assert_eq!(config.targets.a.model_id, "custom-model");
        assert!(!config.targets.a.is_configured());

        std::env::remove_var("SPARSEBENCH_B_ENDPOINT");
        std::env::remove_var("SPARSEBENCH_B_API_KEY");
        std::env::remove_var("SPARSEBENCH_A_MODEL_ID");
    }
}
