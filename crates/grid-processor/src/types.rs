//! Core types for spatial harmonization.

use harmonize_common::{BoundingBox, Crs, GeoTransform, Resolution, SourceRaster};
use serde::{Deserialize, Serialize};

/// The single grid every source is resampled onto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedSpatialGrid {
    /// Union of all contributing source bounds.
    pub bounds: BoundingBox,
    /// Columns (longitude).
    pub width: usize,
    /// Rows (latitude).
    pub height: usize,
    /// North-up transform anchored at the union's north-west corner.
    pub transform: GeoTransform,
    /// Always geographic WGS84.
    pub crs: Crs,
    /// Tag the grid was built for.
    pub resolution: Resolution,
}

impl UnifiedSpatialGrid {
    /// Pixels per frame.
    pub fn num_cells(&self) -> usize {
        self.width * self.height
    }

    /// Shape as `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Longitude/latitude of the centre of pixel `(col, row)`.
    pub fn cell_center(&self, col: usize, row: usize) -> (f64, f64) {
        self.transform.pixel_center(col, row)
    }
}

/// Georeferencing of a source as delivered by its collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceGeoref {
    pub bounds: BoundingBox,
    pub transform: Option<GeoTransform>,
    pub crs: String,
}

impl SourceGeoref {
    pub fn from_raster(raster: &SourceRaster) -> Self {
        Self {
            bounds: raster.bounds,
            transform: raster.transform,
            crs: raster.crs.clone(),
        }
    }
}

/// One native frame plus the georeferencing needed to resample it.
#[derive(Debug, Clone, Copy)]
pub struct SourceArrayInfo<'a> {
    pub data: &'a [f32],
    pub width: usize,
    pub height: usize,
    pub transform: Option<GeoTransform>,
    pub crs: &'a str,
}

/// Why a source could not be placed on the target grid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpatialSkip {
    #[error("missing or invalid pixel transform")]
    InvalidTransform,

    #[error("unsupported coordinate reference system: {0}")]
    UnsupportedCrs(String),

    #[error("array of {actual} values does not match {width}x{height}")]
    ShapeMismatch {
        actual: usize,
        width: usize,
        height: usize,
    },
}

impl SpatialSkip {
    /// Quality flag recorded for the skipped source.
    pub fn flag(&self) -> &'static str {
        match self {
            Self::InvalidTransform => "invalid_transform",
            Self::UnsupportedCrs(_) => "unsupported_crs",
            Self::ShapeMismatch { .. } => "shape_mismatch",
        }
    }
}

/// Interpolation method for grid resampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMethod {
    /// Nearest neighbor (preserves exact values).
    Nearest,
    /// Bilinear interpolation (smooth, slight value changes).
    #[default]
    Bilinear,
}

impl InterpolationMethod {
    /// Method suited to a variable.
    ///
    /// Categorical and quality layers must keep their exact codes, so they
    /// use nearest neighbour; continuous physical fields use bilinear.
    pub fn for_variable(variable: &str) -> Self {
        let name = variable.to_lowercase();
        if name.contains("qa")
            || name.contains("reliability")
            || name.contains("mask")
            || name.contains("land_cover")
            || name.contains("class")
        {
            return Self::Nearest;
        }
        Self::Bilinear
    }
}

impl std::fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nearest => write!(f, "nearest"),
            Self::Bilinear => write!(f, "bilinear"),
        }
    }
}
