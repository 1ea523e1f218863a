//! Projection utilities for grid processing.
//!
//! This module maps target-grid coordinates back into a source raster's
//! pixel space and samples it there.

pub mod interpolation;
pub mod reproject;

pub use interpolation::{bilinear_interpolate, nearest_interpolate};

use harmonize_common::{Crs, GeoTransform};

/// Fractional pixel-edge position of a WGS84 point in a source raster.
///
/// The point is first projected into the source CRS, then inverted through
/// the source transform.
pub fn lon_lat_to_source_pixel(
    lon: f64,
    lat: f64,
    transform: &GeoTransform,
    crs: Crs,
) -> (f64, f64) {
    let (x, y) = crs.from_lon_lat(lon, lat);
    transform.world_to_pixel(x, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geographic_pixel_lookup() {
        let t = GeoTransform::north_up(0.0, 10.0, 1.0, 1.0);
        let (col, row) = lon_lat_to_source_pixel(2.5, 7.5, &t, Crs::Epsg4326);
        assert!((col - 2.5).abs() < 1e-12);
        assert!((row - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_mercator_pixel_lookup() {
        // 1 km Mercator pixels anchored at the origin
        let t = GeoTransform::north_up(0.0, 0.0, 1000.0, 1000.0);
        let (col, row) = lon_lat_to_source_pixel(0.0, -0.0045, &t, Crs::Epsg3857);
        assert!(col.abs() < 1e-9);
        assert!((row - 0.5).abs() < 0.01);
    }
}
