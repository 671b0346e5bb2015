//! Process settings for the governance layer
//!
//! These settings only decide *where* the governance documents live and which
//! plans a client falls into. The tools document itself (plans, reliability
//! thresholds, tool switches, overrides) is re-read on every call by
//! [`crate::tools::ConfigStore`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that selects the data directory.
pub const DATA_DIR_ENV: &str = "PDFTOOLS_DATA_DIR";

/// Environment variable naming an extra settings file.
pub const CONFIG_PATH_ENV: &str = "SWIFTER_CONFIG_PATH";

/// Main configuration for the Swifter governance layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwifterConfig {
    /// Directory holding `tools-config.json`, `tool-metrics.json` and `usage.json`
    pub data_dir: PathBuf,

    /// Plan assigned to clients without an approved order
    pub default_plan: String,

    /// Plan assigned to clients with an approved or captured order
    pub premium_plan: String,
}

impl Default for SwifterConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            default_plan: "standard".to_string(),
            premium_plan: "premium".to_string(),
        }
    }
}

impl SwifterConfig {
    /// Settings rooted at an explicit data directory, other fields default.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from files and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. `swifter.toml` in the working directory
    /// 3. The file named by `SWIFTER_CONFIG_PATH`
    /// 4. `SWIFTER_*` environment variables
    /// 5. `PDFTOOLS_DATA_DIR`, which selects the data directory
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file is invalid.
    pub fn load() -> crate::error::Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Serialized, Toml},
        };

        let mut figment = Figment::from(Serialized::defaults(SwifterConfig::default()))
            .merge(Toml::file("swifter.toml"));

        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            figment = figment.merge(Toml::file(path));
        }

        let figment = figment
            .merge(Env::prefixed("SWIFTER_"))
            .merge(Env::raw().only(&[DATA_DIR_ENV]).map(|_| "data_dir".into()));

        let config: SwifterConfig = figment.extract().map_err(|e| {
            crate::error::SwifterError::Configuration(format!(
                "Failed to load configuration: {}",
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Serialized, Toml},
        };

        let config: SwifterConfig = Figment::from(Serialized::defaults(SwifterConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .extract()
            .map_err(|e| {
                crate::error::SwifterError::Configuration(format!(
                    "Failed to load configuration file: {}",
                    e
                ))
            })?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> crate::error::Result<()> {
        if self.default_plan.trim().is_empty() {
            return Err(crate::error::SwifterError::Configuration(
                "default_plan must not be empty".to_string(),
            ));
        }
        if self.premium_plan.trim().is_empty() {
            return Err(crate::error::SwifterError::Configuration(
                "premium_plan must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SwifterConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.default_plan, "standard");
        assert_eq!(config.premium_plan, "premium");
    }

    #[test]
    fn test_from_file_overrides_fields() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("swifter.toml");
        std::fs::write(&path, "data_dir = \"/var/lib/swifter\"\ndefault_plan = \"free\"\n").unwrap();

        let config = SwifterConfig::from_file(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/swifter"));
        assert_eq!(config.default_plan, "free");
        assert_eq!(config.premium_plan, "premium");
    }

    #[test]
    fn test_from_file_rejects_empty_plan() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("swifter.toml");
        std::fs::write(&path, "default_plan = \"  \"\n").unwrap();

        assert!(SwifterConfig::from_file(&path).is_err());
    }
}
