//! Engine settings using Figment
//!
//! Settings are loaded from:
//! 1. `config/histogrammer.toml` (base configuration)
//! 2. Environment variables (prefixed with `PET_HISTO_`, sections separated by `__`)
//!
//! These are process settings (buffer sizes, memory reserves, logging), not
//! acquisition parameters; a session's acquisition parameters are set through
//! the [`Session`](crate::session::Session) operations and are never persisted.
//!
//! # Example
//! ```no_run
//! use pet_histogrammer::config::HistogrammerConfig;
//!
//! let config = HistogrammerConfig::load()?;
//! println!("Application: {}", config.application.name);
//! # Ok::<(), figment::Error>(())
//! ```

use crate::error::{HistResult, HistogramError};
use crate::geometry::ScannerModel;
use crate::logging::OutputFormat;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Top-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistogrammerConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Binning engine settings
    #[serde(default)]
    pub engine: EngineConfig,
    /// Output storage settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Statistics reporting settings
    #[serde(default)]
    pub statistics: StatisticsConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Log span open/close events
    #[serde(default)]
    pub log_spans: bool,
}

/// Binning engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Scanner model used for geometry lookup
    #[serde(default)]
    pub scanner: ScannerModel,
    /// Words per buffer read by the offline replay task
    #[serde(default = "default_buffer_words")]
    pub buffer_words: usize,
    /// Memory reserved for I/O working buffers, in MiB
    #[serde(default = "default_io_reserve_mb")]
    pub io_reserve_mb: u64,
    /// Fixed process overhead, in MiB
    #[serde(default = "default_overhead_mb")]
    pub overhead_mb: u64,
    /// Duration of one scan-time tick tag, in milliseconds
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,
}

/// Output storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory relative output names are resolved against
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Fail configuration when free space cannot be verified (network paths)
    #[serde(default)]
    pub require_verified_disk: bool,
}

/// Statistics reporting configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatisticsConfig {
    /// Periodic statistics log interval in milliseconds (0 = disabled)
    #[serde(default)]
    pub interval_ms: u64,
}

// Default value functions
fn default_name() -> String {
    "PET Histogrammer".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn default_buffer_words() -> usize {
    256 * 1024
}

fn default_io_reserve_mb() -> u64 {
    64
}

fn default_overhead_mb() -> u64 {
    32
}

fn default_tick_period_ms() -> u64 {
    1
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            log_spans: false,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scanner: ScannerModel::default(),
            buffer_words: default_buffer_words(),
            io_reserve_mb: default_io_reserve_mb(),
            overhead_mb: default_overhead_mb(),
            tick_period_ms: default_tick_period_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            require_verified_disk: false,
        }
    }
}

impl EngineConfig {
    /// I/O working-buffer reserve in bytes.
    pub fn io_reserve_bytes(&self) -> u64 {
        self.io_reserve_mb * MIB
    }

    /// Fixed overhead in bytes.
    pub fn overhead_bytes(&self) -> u64 {
        self.overhead_mb * MIB
    }

    /// Duration of one tick.
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }
}

impl StatisticsConfig {
    /// Reporter interval, `None` when periodic reporting is disabled.
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_ms > 0).then(|| Duration::from_millis(self.interval_ms))
    }
}

impl HistogrammerConfig {
    /// Load configuration from `config/histogrammer.toml` and environment variables
    ///
    /// Environment variables can override configuration with prefix `PET_HISTO_`.
    /// Example: `PET_HISTO_APPLICATION__LOG_LEVEL=debug`
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from("config/histogrammer.toml")
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults fill every field.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(HistogrammerConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("PET_HISTO_").split("__"))
            .extract()
    }

    /// Load from `path` and validate
    pub fn load_validated<P: AsRef<Path>>(path: P) -> HistResult<Self> {
        let config = Self::load_from(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> HistResult<()> {
        let invalid = |msg: String| Err(HistogramError::SettingsValidation(msg));

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        if let Err(e) = self.application.log_format.parse::<OutputFormat>() {
            return invalid(e);
        }

        if self.engine.buffer_words == 0 {
            return invalid("Invalid buffer_words 0. Must be positive".to_string());
        }

        if self.engine.tick_period_ms == 0 {
            return invalid("Invalid tick_period_ms 0. Must be positive".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = HistogrammerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.io_reserve_bytes(), 64 * MIB);
        assert_eq!(config.engine.tick_period(), Duration::from_millis(1));
        assert!(config.statistics.interval().is_none());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("histogrammer.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
            [application]
            log_level = "debug"

            [engine]
            scanner = "petlink"
            buffer_words = 1024

            [statistics]
            interval_ms = 500
            "#
        )
        .unwrap();

        let config = HistogrammerConfig::load_from(&path).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.application.name, "PET Histogrammer");
        assert_eq!(config.engine.scanner, ScannerModel::Petlink);
        assert_eq!(config.engine.buffer_words, 1024);
        assert_eq!(config.engine.overhead_mb, 32);
        assert_eq!(
            config.statistics.interval(),
            Some(Duration::from_millis(500))
        );
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = HistogrammerConfig::load_from("does/not/exist.toml").unwrap();
        assert_eq!(config.engine.buffer_words, default_buffer_words());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = HistogrammerConfig::default();
        config.application.log_level = "verbose".to_string();
        assert!(matches!(
            config.validate(),
            Err(HistogramError::SettingsValidation(_))
        ));
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = HistogrammerConfig::default();
        config.application.log_format = "xml".to_string();
        assert!(matches!(
            config.validate(),
            Err(HistogramError::SettingsValidation(msg)) if msg.contains("xml")
        ));
    }

    #[test]
    fn test_load_validated_reports_error_kinds() {
        let dir = tempfile::tempdir().unwrap();

        let malformed = dir.path().join("malformed.toml");
        std::fs::write(&malformed, "[engine]\nbuffer_words = \"many\"\n").unwrap();
        assert!(matches!(
            HistogrammerConfig::load_validated(&malformed),
            Err(HistogramError::Settings(_))
        ));

        let invalid = dir.path().join("invalid.toml");
        std::fs::write(&invalid, "[engine]\ntick_period_ms = 0\n").unwrap();
        assert!(matches!(
            HistogrammerConfig::load_validated(&invalid),
            Err(HistogramError::SettingsValidation(_))
        ));

        let valid = dir.path().join("valid.toml");
        std::fs::write(&valid, "[application]\nlog_format = \"json\"\n").unwrap();
        let config = HistogrammerConfig::load_validated(&valid).unwrap();
        assert_eq!(config.application.log_format, "json");
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let mut config = HistogrammerConfig::default();
        config.engine.buffer_words = 0;
        assert!(config.validate().is_err());
    }
}
