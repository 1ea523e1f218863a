//! Geographic bounding boxes.

use serde::{Deserialize, Serialize};

/// A geographic bounding box in WGS84 degrees.
///
/// Ordering follows the (west, south, east, north) convention used by the
/// acquisition collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    /// Create a new bounding box from its four edges.
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Build a bounding box from a `(west, south, east, north)` tuple.
    pub fn from_tuple(bounds: (f64, f64, f64, f64)) -> Self {
        Self::new(bounds.0, bounds.1, bounds.2, bounds.3)
    }

    /// Parse a comma separated `"west,south,east,north"` string.
    pub fn from_str_list(s: &str) -> Result<Self, BboxParseError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }

        let parse = |p: &str| {
            p.parse::<f64>()
                .map_err(|_| BboxParseError::InvalidNumber(p.to_string()))
        };

        Ok(Self {
            west: parse(parts[0])?,
            south: parse(parts[1])?,
            east: parse(parts[2])?,
            north: parse(parts[3])?,
        })
    }

    /// Width in degrees of longitude.
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// Height in degrees of latitude.
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Planar area in square degrees.
    pub fn area_deg2(&self) -> f64 {
        self.width() * self.height()
    }

    /// True when all four edges are finite and west < east, south < north.
    pub fn is_well_formed(&self) -> bool {
        self.west.is_finite()
            && self.south.is_finite()
            && self.east.is_finite()
            && self.north.is_finite()
            && self.west < self.east
            && self.south < self.north
    }

    /// True when every edge lies within [-180, 180] x [-90, 90].
    pub fn within_world(&self) -> bool {
        self.west >= -180.0
            && self.east <= 180.0
            && self.south >= -90.0
            && self.north <= 90.0
    }

    /// Check if this bbox intersects another.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.west < other.east
            && self.east > other.west
            && self.south < other.north
            && self.north > other.south
    }

    /// Compute the intersection of two bounding boxes.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if !self.intersects(other) {
            return None;
        }

        Some(BoundingBox {
            west: self.west.max(other.west),
            south: self.south.max(other.south),
            east: self.east.min(other.east),
            north: self.north.min(other.north),
        })
    }

    /// Smallest bounding box enclosing both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            west: self.west.min(other.west),
            south: self.south.min(other.south),
            east: self.east.max(other.east),
            north: self.north.max(other.north),
        }
    }

    /// Union of an arbitrary number of boxes; `None` for an empty iterator.
    pub fn union_all<'a>(boxes: impl IntoIterator<Item = &'a BoundingBox>) -> Option<BoundingBox> {
        boxes
            .into_iter()
            .fold(None, |acc: Option<BoundingBox>, b| match acc {
                Some(a) => Some(a.union(b)),
                None => Some(*b),
            })
    }

    /// Check if a point is contained within this bbox.
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        lon >= self.west && lon <= self.east && lat >= self.south && lat <= self.north
    }

    /// Edges rounded to `decimals` places, with negative zero folded to zero.
    pub fn rounded(&self, decimals: i32) -> [f64; 4] {
        let scale = 10f64.powi(decimals);
        let round = |v: f64| (v * scale).round() / scale + 0.0;
        [
            round(self.west),
            round(self.south),
            round(self.east),
            round(self.north),
        ]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid bounds format: {0}. Expected 'west,south,east,north'")]
    InvalidFormat(String),

    #[error("Invalid number in bounds: {0}")]
    InvalidNumber(String),
}
