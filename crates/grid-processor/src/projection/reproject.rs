//! Reprojection of a single source frame onto the unified grid.

use harmonize_common::{Crs, GeoTransform};

use super::interpolation::sample;
use super::lon_lat_to_source_pixel;
use crate::types::{InterpolationMethod, UnifiedSpatialGrid};

/// Reproject one source frame onto a unified geographic grid.
///
/// For each target pixel centre the longitude/latitude is projected into the
/// source CRS and located in source pixel space. Target pixels that fall
/// outside the source footprint stay NaN; everything else is sampled with
/// `method`.
///
/// # Arguments
/// * `data` - Source frame in row-major order (row 0 = top)
/// * `src_width` - Source columns
/// * `src_height` - Source rows
/// * `src_transform` - Source affine transform, must be valid
/// * `src_crs` - Source coordinate reference system
/// * `grid` - Target grid
/// * `method` - Sampling kernel
///
/// # Returns
/// `grid.width * grid.height` values in row-major order
pub fn reproject_to_grid(
    data: &[f32],
    src_width: usize,
    src_height: usize,
    src_transform: &GeoTransform,
    src_crs: Crs,
    grid: &UnifiedSpatialGrid,
    method: InterpolationMethod,
) -> Vec<f32> {
    let mut output = vec![f32::NAN; grid.num_cells()];

    if src_width == 0 || src_height == 0 || data.len() != src_width * src_height {
        return output;
    }

    let sw = src_width as f64;
    let sh = src_height as f64;

    for row in 0..grid.height {
        for col in 0..grid.width {
            let (lon, lat) = grid.cell_center(col, row);
            let (px, py) = lon_lat_to_source_pixel(lon, lat, src_transform, src_crs);

            if !px.is_finite() || !py.is_finite() {
                continue;
            }
            // Outside the source footprint
            if px < 0.0 || px > sw || py < 0.0 || py > sh {
                continue;
            }

            output[row * grid.width + col] =
                sample(data, src_width, src_height, px - 0.5, py - 0.5, method);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use harmonize_common::{BoundingBox, Resolution};

    fn grid_over(bounds: BoundingBox, width: usize, height: usize) -> UnifiedSpatialGrid {
        UnifiedSpatialGrid {
            bounds,
            width,
            height,
            transform: GeoTransform::from_bounds(&bounds, width, height),
            crs: Crs::Epsg4326,
            resolution: Resolution::Km1,
        }
    }

    #[test]
    fn test_identity_reprojection() {
        let bounds = BoundingBox::new(0.0, 0.0, 3.0, 2.0);
        let data: Vec<f32> = (0..6).map(|v| v as f32).collect();
        let transform = GeoTransform::from_bounds(&bounds, 3, 2);
        let grid = grid_over(bounds, 3, 2);

        let out = reproject_to_grid(
            &data,
            3,
            2,
            &transform,
            Crs::Epsg4326,
            &grid,
            InterpolationMethod::Bilinear,
        );
        for (a, b) in out.iter().zip(&data) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_outside_footprint_is_nan() {
        let src_bounds = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let transform = GeoTransform::from_bounds(&src_bounds, 2, 2);
        let grid = grid_over(BoundingBox::new(0.0, 0.0, 2.0, 1.0), 4, 2);

        let out = reproject_to_grid(
            &[1.0; 4],
            2,
            2,
            &transform,
            Crs::Epsg4326,
            &grid,
            InterpolationMethod::Nearest,
        );
        // Western half covered, eastern half not
        assert_eq!(out[0], 1.0);
        assert_eq!(out[1], 1.0);
        assert!(out[2].is_nan());
        assert!(out[3].is_nan());
    }

    #[test]
    fn test_upsampling_nearest_keeps_codes() {
        let bounds = BoundingBox::new(0.0, 0.0, 2.0, 1.0);
        let transform = GeoTransform::from_bounds(&bounds, 2, 1);
        let grid = grid_over(bounds, 8, 4);

        let out = reproject_to_grid(
            &[0.0, 3.0],
            2,
            1,
            &transform,
            Crs::Epsg4326,
            &grid,
            InterpolationMethod::Nearest,
        );
        assert!(out.iter().all(|v| *v == 0.0 || *v == 3.0));
        assert_eq!(out[0], 0.0);
        assert_eq!(out[7], 3.0);
    }
}
