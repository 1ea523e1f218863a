//! Spatial harmonization for heterogeneous rasters.
//!
//! Every source arrives on its own grid: a reanalysis at a quarter degree,
//! vegetation composites at 1 km, population at 100 m, sometimes in Web
//! Mercator instead of geographic degrees. This crate reconciles them onto
//! one north-up WGS84 grid.
//!
//! # Architecture
//!
//! ```text
//! source bounds ──► SpatialHarmonizer::create_target_grid(resolution)
//!                          │
//!                          ▼
//!                  UnifiedSpatialGrid (union bounds, width, height, transform)
//!                          │
//! source stack ──► SpatialHarmonizer::harmonize_stack
//!                          │
//!                          ├─► invalid transform / CRS ──► SpatialSkip (quality flag)
//!                          │
//!                          └─► per variable, per frame: resample_from_array
//!                                   (nearest for categorical, bilinear otherwise)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use grid_processor::{SpatialConfig, SpatialHarmonizer};
//! use harmonize_common::Resolution;
//!
//! let harmonizer = SpatialHarmonizer::new(SpatialConfig::default());
//! let grid = harmonizer.create_target_grid(&[climate_bounds, ndvi_bounds], Resolution::Km5)?;
//! let resampled = harmonizer.harmonize_stack(&stack, &georef, &grid)?;
//! ```

pub mod config;
pub mod projection;
pub mod spatial;
pub mod types;

// Re-export commonly used types at crate root
pub use config::SpatialConfig;
pub use projection::{bilinear_interpolate, nearest_interpolate};
pub use projection::reproject::reproject_to_grid;
pub use spatial::SpatialHarmonizer;
pub use types::{InterpolationMethod, SourceArrayInfo, SourceGeoref, SpatialSkip, UnifiedSpatialGrid};
