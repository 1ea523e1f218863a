//! Raster grid primitives: affine transforms, reference systems, resolutions
//! and the 2-D array type every feature is expressed in.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::error::HarmonizeError;

/// Affine pixel transform in GDAL order.
///
/// `x = origin_x + col * pixel_width + row * row_rotation`
/// `y = origin_y + col * col_rotation + row * pixel_height`
///
/// `(col, row)` are pixel-edge coordinates: `(0, 0)` is the top-left corner
/// of the top-left pixel and `(0.5, 0.5)` its centre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform anchored at the top-left corner.
    ///
    /// `pixel_height` is given as a positive size; it is stored negated.
    pub fn north_up(west: f64, north: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x: west,
            pixel_width,
            row_rotation: 0.0,
            origin_y: north,
            col_rotation: 0.0,
            pixel_height: -pixel_height.abs(),
        }
    }

    /// North-up transform that maps `width` x `height` pixels exactly onto `bounds`.
    pub fn from_bounds(bounds: &BoundingBox, width: usize, height: usize) -> Self {
        Self::north_up(
            bounds.west,
            bounds.north,
            bounds.width() / width.max(1) as f64,
            bounds.height() / height.max(1) as f64,
        )
    }

    /// Build from the six GDAL coefficients.
    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            origin_x: coeffs[0],
            pixel_width: coeffs[1],
            row_rotation: coeffs[2],
            origin_y: coeffs[3],
            col_rotation: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    /// The six GDAL coefficients.
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// A transform is usable when it is finite, axis-aligned and non-degenerate.
    pub fn is_valid(&self) -> bool {
        self.to_gdal().iter().all(|v| v.is_finite())
            && self.pixel_width != 0.0
            && self.pixel_height != 0.0
            && self.row_rotation == 0.0
            && self.col_rotation == 0.0
    }

    /// World coordinates of a fractional pixel position.
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }

    /// World coordinates of the centre of pixel `(col, row)`.
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        self.pixel_to_world(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Fractional pixel-edge position of a world coordinate.
    ///
    /// Only defined for axis-aligned transforms; callers check
    /// [`GeoTransform::is_valid`] first.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    /// Bounds covered by a `width` x `height` raster under this transform.
    pub fn bounds(&self, width: usize, height: usize) -> BoundingBox {
        let (x0, y0) = self.pixel_to_world(0.0, 0.0);
        let (x1, y1) = self.pixel_to_world(width as f64, height as f64);
        BoundingBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

/// Coordinate reference systems understood by the spatial harmonizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Crs {
    /// WGS84 geographic, degrees.
    Epsg4326,
    /// Web Mercator, metres.
    Epsg3857,
}

const EARTH_RADIUS_M: f64 = 6_378_137.0;

impl Crs {
    /// Parse a CRS identifier. Returns `None` for unsupported systems.
    ///
    /// Accepts "EPSG:4326", "OGC:CRS84", "CRS:84", "WGS84", "EPSG:3857",
    /// "EPSG:900913" (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "EPSG:4326" | "OGC:CRS84" | "CRS:84" | "WGS84" | "WGS 84" => Some(Crs::Epsg4326),
            "EPSG:3857" | "EPSG:900913" => Some(Crs::Epsg3857),
            _ => None,
        }
    }

    /// Project WGS84 lon/lat into this system's native units.
    pub fn from_lon_lat(&self, lon: f64, lat: f64) -> (f64, f64) {
        match self {
            Crs::Epsg4326 => (lon, lat),
            Crs::Epsg3857 => {
                let lat = lat.clamp(-85.051_128_78, 85.051_128_78);
                let x = EARTH_RADIUS_M * lon.to_radians();
                let y = EARTH_RADIUS_M
                    * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0)
                        .tan()
                        .ln();
                (x, y)
            }
        }
    }

    /// Inverse of [`Crs::from_lon_lat`].
    pub fn to_lon_lat(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Crs::Epsg4326 => (x, y),
            Crs::Epsg3857 => {
                let lon = (x / EARTH_RADIUS_M).to_degrees();
                let lat = (2.0 * (y / EARTH_RADIUS_M).exp().atan() - std::f64::consts::FRAC_PI_2)
                    .to_degrees();
                (lon, lat)
            }
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Crs::Epsg4326 => "EPSG:4326",
            Crs::Epsg3857 => "EPSG:3857",
        };
        write!(f, "{}", code)
    }
}

/// Output resolution tags with their fixed angular pixel size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "100m")]
    M100,
    #[serde(rename = "1km")]
    Km1,
    #[serde(rename = "5km")]
    Km5,
}

impl Default for Resolution {
    fn default() -> Self {
        Self::Km1
    }
}

impl Resolution {
    /// All supported resolutions, finest first.
    pub const ALL: [Resolution; 3] = [Resolution::M100, Resolution::Km1, Resolution::Km5];

    /// Degrees per pixel (3 arc-seconds, 30 arc-seconds, 2.5 arc-minutes).
    pub fn degrees(&self) -> f64 {
        match self {
            Self::M100 => 1.0 / 1200.0,
            Self::Km1 => 1.0 / 120.0,
            Self::Km5 => 1.0 / 24.0,
        }
    }

    /// Tag used in cache keys and persisted attributes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M100 => "100m",
            Self::Km1 => "1km",
            Self::Km5 => "5km",
        }
    }
}

impl FromStr for Resolution {
    type Err = HarmonizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "100m" => Ok(Self::M100),
            "1km" => Ok(Self::Km1),
            "5km" => Ok(Self::Km5),
            other => Err(HarmonizeError::configuration(format!(
                "unsupported resolution '{}', expected one of 100m, 1km, 5km",
                other
            ))),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 2-D single-precision raster in row-major order (row 0 = north).
///
/// NaN marks missing pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid2D {
    pub width: usize,
    pub height: usize,
    #[serde(with = "nan_as_null")]
    pub data: Vec<f32>,
}

impl Grid2D {
    /// Wrap an existing buffer. Returns `None` when the length does not match.
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Option<Self> {
        if data.len() != width * height {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// A grid with every pixel set to `value`.
    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// An entirely missing grid.
    pub fn missing(width: usize, height: usize) -> Self {
        Self::filled(width, height, f32::NAN)
    }

    /// Shape as `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Value at `(col, row)`.
    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.data.get(row * self.width + col).copied()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of non-missing pixels.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_finite()).count()
    }

    /// Share of non-missing pixels, 0.0 for an empty grid.
    pub fn valid_fraction(&self) -> f64 {
        if self.data.is_empty() {
            0.0
        } else {
            self.valid_count() as f64 / self.data.len() as f64
        }
    }

    /// Elementwise map into a new grid of the same shape.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Grid2D {
        Grid2D {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Elementwise combination of two grids of the same shape.
    pub fn zip_map(&self, other: &Grid2D, f: impl Fn(f32, f32) -> f32) -> Option<Grid2D> {
        if self.shape() != other.shape() {
            return None;
        }
        Some(Grid2D {
            width: self.width,
            height: self.height,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        })
    }
}

/// Serde adapter for `Vec<f32>` that writes NaN as JSON `null` and reads it back.
pub mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(values: &[f32], serializer: S) -> Result<S::Ok, S::Error> {
        let wrapped: Vec<Option<f32>> = values
            .iter()
            .map(|v| if v.is_finite() { Some(*v) } else { None })
            .collect();
        wrapped.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f32>, D::Error> {
        let wrapped: Vec<Option<f32>> = Vec::deserialize(deserializer)?;
        Ok(wrapped
            .into_iter()
            .map(|v| v.unwrap_or(f32::NAN))
            .collect())
    }
}
