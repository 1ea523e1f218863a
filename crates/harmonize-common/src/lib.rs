//! Common types shared across the harmonization workspace.
//!
//! Every crate in the pipeline speaks in terms of these types: the raw
//! results handed over by acquisition collaborators, the grids and time
//! ranges they are reconciled onto, and the final feature/quality result.

pub mod bbox;
pub mod error;
pub mod grid;
pub mod result;
pub mod source;
pub mod time;

pub use bbox::{BboxParseError, BoundingBox};
pub use error::{HarmonizeError, Result};
pub use grid::{Crs, GeoTransform, Grid2D, Resolution};
pub use result::{
    CompletenessReport, ConsistencyCheck, ConsistencyReport, FeatureSet, HarmonizedDataResult,
    QualityAssessment, QualityCategory, ResultMetadata, SourceQuality,
};
pub use source::{
    Cadence, RawSourceResult, SourceArray, SourceId, SourceOutcome, SourcePayload, SourceRaster,
};
pub use time::{DateRange, Granularity, TimeExtent};
