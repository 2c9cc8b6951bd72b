//! Configuration for the relgen CLI.
//!
//! Sources, lowest precedence first:
//! 1. Default values
//! 2. Configuration file (YAML), when `--config` is given
//! 3. Environment variables prefixed with `RELGEN_`
//!
//! Nested keys use `__`: `RELGEN_ANALYSIS__MAX_DEPTH=20` overrides
//! `analysis.max_depth`.

use config::{Config, ConfigError, Environment, File, FileFormat};
use relgen_domain::analysis::DEFAULT_MAX_DEPTH;
use relgen_domain::AnalyzerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

const ENV_PREFIX: &str = "RELGEN";
const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_FORMATS: [&str; 2] = ["text", "json"];

/// CLI configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct RelgenConfig {
    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub analysis: AnalysisSettings,

    #[serde(default)]
    pub output: OutputSettings,
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of text
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Analysis settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AnalysisSettings {
    /// Chain depth at which relations stop being specialized.
    ///
    /// Environment variable: `RELGEN_ANALYSIS__MAX_DEPTH`
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

impl AnalysisSettings {
    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig::default().with_max_depth(self.max_depth)
    }
}

fn default_max_depth() -> u32 {
    DEFAULT_MAX_DEPTH
}

/// Report output settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct OutputSettings {
    /// "text" or "json"
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            format: default_format(),
        }
    }
}

fn default_format() -> String {
    "text".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

impl RelgenConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&RelgenConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(env_source())
            .build()?;

        let relgen_config: RelgenConfig = config.try_deserialize()?;
        relgen_config.validate()?;
        Ok(relgen_config)
    }

    /// Load configuration from defaults and environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&RelgenConfig::default())?)
            .add_source(env_source())
            .build()?;

        let relgen_config: RelgenConfig = config.try_deserialize()?;
        relgen_config.validate()?;
        Ok(relgen_config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if !VALID_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    VALID_LEVELS, self.logging.level
                ),
            });
        }

        if !VALID_FORMATS.contains(&self.output.format.as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "output.format must be one of: {:?}, got: {}",
                    VALID_FORMATS, self.output.format
                ),
            });
        }

        if !(1..=DEFAULT_MAX_DEPTH).contains(&self.analysis.max_depth) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "analysis.max_depth must be between 1 and {}, got: {}",
                    DEFAULT_MAX_DEPTH, self.analysis.max_depth
                ),
            });
        }

        Ok(())
    }
}
