//! Configuration for spatial harmonization.

use serde::{Deserialize, Serialize};

/// Limits applied while building and filling the target grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialConfig {
    /// Largest `width * height` a target grid may have.
    pub max_grid_cells: usize,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            max_grid_cells: 25_000_000,
        }
    }
}

impl SpatialConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_grid_cells == 0 {
            return Err("max_grid_cells must be > 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SpatialConfig::default();
        assert_eq!(config.max_grid_cells, 25_000_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = SpatialConfig { max_grid_cells: 0 };
        assert!(config.validate().is_err());
    }
}
