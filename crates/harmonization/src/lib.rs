//! Multi-source environmental data harmonization.
//!
//! Brings climate reanalysis, daily rainfall, 16-day vegetation composites,
//! annual prevalence surfaces and population density onto one time index
//! and one spatial grid, then derives the feature layers used for malaria
//! risk modelling together with a quality assessment.
//!
//! # Architecture
//!
//! - [`TemporalHarmonizer`] resamples each source onto a unified time index
//! - `grid_processor::SpatialHarmonizer` places every source on one grid
//! - [`FeatureEngineer`] derives the named feature layers
//! - [`QualityManager`] scores the result
//! - [`UnifiedDataHarmonizer`] runs the pipeline, with results cached by
//!   `storage::CacheManager`

pub mod clients;
pub mod config;
pub mod dataset;
pub mod features;
mod harmonizer;
pub mod metrics;
pub mod quality;
pub mod temporal;
pub mod variables;

// Re-exports
pub use clients::{SourceClient, SourceClients};
pub use config::HarmonizerConfig;
pub use dataset::HarmonizedDataset;
pub use features::{
    calculate_breeding_habitat, temperature_suitability, temperature_suitability_curve,
    FeatureEngineer, FeatureMap,
};
pub use harmonizer::UnifiedDataHarmonizer;
pub use metrics::{HarmonizeMetrics, MetricsSnapshot};
pub use quality::QualityManager;
pub use temporal::TemporalHarmonizer;
