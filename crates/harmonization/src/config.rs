//! Orchestrator configuration.
//!
//! Defaults are overlaid with `HARMONIZE_*` environment variables, or read
//! from a YAML document.

use std::path::{Path, PathBuf};

use grid_processor::SpatialConfig;
use harmonize_common::{Granularity, HarmonizeError, Resolution, Result};
use serde::{Deserialize, Serialize};

/// Settings for one [`UnifiedDataHarmonizer`](crate::UnifiedDataHarmonizer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonizerConfig {
    /// Directory holding cached harmonized results
    pub cache_dir: PathBuf,
    /// Target grid resolution
    pub resolution: Resolution,
    /// Step of the unified temporal index
    pub granularity: Granularity,
    /// Largest region `validate_region_bounds` accepts, in square degrees
    pub max_region_area_deg2: f64,
    /// Longest lookback window accepted, in days
    pub max_lookback_days: u32,
    /// Per-source download timeout
    pub source_timeout_secs: u64,
    /// Largest target grid, in cells
    pub max_grid_cells: usize,
    pub cache_enabled: bool,
}

impl Default for HarmonizerConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache/harmonized"),
            resolution: Resolution::Km1,
            granularity: Granularity::Daily,
            max_region_area_deg2: 2500.0,
            max_lookback_days: 365,
            source_timeout_secs: 120,
            max_grid_cells: 25_000_000,
            cache_enabled: true,
        }
    }
}

impl HarmonizerConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset variables keep their defaults. A variable that is set but does
    /// not parse is a configuration error rather than being ignored.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("HARMONIZE_CACHE_DIR") {
            config.cache_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("HARMONIZE_RESOLUTION") {
            config.resolution = val.parse()?;
        }
        if let Ok(val) = std::env::var("HARMONIZE_GRANULARITY") {
            config.granularity = val.parse()?;
        }
        if let Ok(val) = std::env::var("HARMONIZE_MAX_REGION_AREA") {
            config.max_region_area_deg2 = parse_var("HARMONIZE_MAX_REGION_AREA", &val)?;
        }
        if let Ok(val) = std::env::var("HARMONIZE_MAX_LOOKBACK_DAYS") {
            config.max_lookback_days = parse_var("HARMONIZE_MAX_LOOKBACK_DAYS", &val)?;
        }
        if let Ok(val) = std::env::var("HARMONIZE_SOURCE_TIMEOUT_SECS") {
            config.source_timeout_secs = parse_var("HARMONIZE_SOURCE_TIMEOUT_SECS", &val)?;
        }
        if let Ok(val) = std::env::var("HARMONIZE_MAX_GRID_CELLS") {
            config.max_grid_cells = parse_var("HARMONIZE_MAX_GRID_CELLS", &val)?;
        }
        if let Ok(val) = std::env::var("HARMONIZE_CACHE_ENABLED") {
            config.cache_enabled = !matches!(val.to_lowercase().as_str(), "false" | "0" | "no");
        }

        Ok(config)
    }

    /// Parse a YAML document. Missing keys take their defaults.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| HarmonizeError::configuration(format!("invalid YAML config: {}", e)))
    }

    /// Read and parse a YAML configuration file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarmonizeError::configuration(format!(
                "failed to read config {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(self.max_region_area_deg2.is_finite() && self.max_region_area_deg2 > 0.0) {
            return Err("max_region_area_deg2 must be > 0".to_string());
        }
        if self.max_lookback_days == 0 {
            return Err("max_lookback_days must be > 0".to_string());
        }
        if self.source_timeout_secs == 0 {
            return Err("source_timeout_secs must be > 0".to_string());
        }
        self.spatial_config().validate()
    }

    /// Limits handed to the spatial stage.
    pub fn spatial_config(&self) -> SpatialConfig {
        SpatialConfig {
            max_grid_cells: self.max_grid_cells,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| HarmonizeError::configuration(format!("invalid value for {}: '{}'", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HarmonizerConfig::default();
        assert_eq!(config.resolution, Resolution::Km1);
        assert_eq!(config.granularity, Granularity::Daily);
        assert_eq!(config.max_lookback_days, 365);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = HarmonizerConfig::default();
        config.max_region_area_deg2 = 0.0;
        assert!(config.validate().is_err());

        let mut config = HarmonizerConfig::default();
        config.source_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = HarmonizerConfig::default();
        config.max_grid_cells = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_grid_cell_cap_from_env() {
        // Only test in the crate touching this variable
        std::env::set_var("HARMONIZE_MAX_GRID_CELLS", "lots");
        let err = HarmonizerConfig::from_env().unwrap_err();
        assert!(matches!(err, HarmonizeError::Configuration(_)));

        std::env::set_var("HARMONIZE_MAX_GRID_CELLS", "1000");
        let config = HarmonizerConfig::from_env().unwrap();
        std::env::remove_var("HARMONIZE_MAX_GRID_CELLS");
        assert_eq!(config.spatial_config().max_grid_cells, 1000);
    }

    #[test]
    fn test_yaml_partial_document() {
        let yaml = r#"
resolution: 5km
granularity: weekly
max_lookback_days: 90
cache_dir: /tmp/harmonized
"#;
        let config = HarmonizerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.resolution, Resolution::Km5);
        assert_eq!(config.granularity, Granularity::Weekly);
        assert_eq!(config.max_lookback_days, 90);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/harmonized"));
        assert_eq!(config.source_timeout_secs, 120);
    }

    #[test]
    fn test_yaml_rejects_unknown_resolution() {
        let err = HarmonizerConfig::from_yaml_str("resolution: 10km").unwrap_err();
        assert!(matches!(err, HarmonizeError::Configuration(_)));
    }
}
