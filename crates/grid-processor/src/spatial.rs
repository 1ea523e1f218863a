//! Target grid construction and per-source resampling.

use harmonize_common::{
    BoundingBox, Crs, GeoTransform, HarmonizeError, Resolution, Result, SourceArray,
};
use tracing::{debug, instrument, warn};

use crate::config::SpatialConfig;
use crate::projection::reproject::reproject_to_grid;
use crate::types::{
    InterpolationMethod, SourceArrayInfo, SourceGeoref, SpatialSkip, UnifiedSpatialGrid,
};

/// Builds the unified grid and resamples source stacks onto it.
#[derive(Debug, Clone, Default)]
pub struct SpatialHarmonizer {
    config: SpatialConfig,
}

impl SpatialHarmonizer {
    pub fn new(config: SpatialConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SpatialConfig {
        &self.config
    }

    /// Build the grid covering the union of `bounds` at `resolution`.
    ///
    /// Width and height are `ceil(extent / pixel size)`, at least 1. The grid
    /// is anchored at the union's north-west corner, so it may reach up to
    /// one pixel past the east and south edges.
    #[instrument(skip(self, bounds), fields(sources = bounds.len()))]
    pub fn create_target_grid(
        &self,
        bounds: &[BoundingBox],
        resolution: Resolution,
    ) -> Result<UnifiedSpatialGrid> {
        let usable: Vec<&BoundingBox> = bounds.iter().filter(|b| b.is_well_formed()).collect();
        let union = BoundingBox::union_all(usable).ok_or_else(|| {
            HarmonizeError::harmonization("no usable source bounds to build a target grid from")
        })?;

        let res = resolution.degrees();
        let width = cells_along(union.width(), res);
        let height = cells_along(union.height(), res);

        let cells = width.saturating_mul(height);
        if cells > self.config.max_grid_cells {
            return Err(HarmonizeError::harmonization(format!(
                "target grid {}x{} ({} cells) at {} exceeds limit of {} cells",
                width, height, cells, resolution, self.config.max_grid_cells
            )));
        }

        let transform = GeoTransform::north_up(union.west, union.north, res, res);
        debug!(width, height, %resolution, "Created target grid");

        Ok(UnifiedSpatialGrid {
            bounds: union,
            width,
            height,
            transform,
            crs: Crs::Epsg4326,
            resolution,
        })
    }

    /// Resample one native frame onto `grid`.
    ///
    /// Returns a [`SpatialSkip`] when the source cannot be placed: missing or
    /// invalid transform, unsupported CRS, or a buffer that does not match
    /// its declared shape.
    pub fn resample_from_array(
        &self,
        info: SourceArrayInfo<'_>,
        grid: &UnifiedSpatialGrid,
        method: InterpolationMethod,
    ) -> std::result::Result<Vec<f32>, SpatialSkip> {
        let (transform, crs) = check_georef(info.transform, info.crs)?;
        if info.data.len() != info.width * info.height {
            return Err(SpatialSkip::ShapeMismatch {
                actual: info.data.len(),
                width: info.width,
                height: info.height,
            });
        }

        Ok(reproject_to_grid(
            info.data,
            info.width,
            info.height,
            &transform,
            crs,
            grid,
            method,
        ))
    }

    /// Resample every variable and frame of a stack onto `grid`.
    ///
    /// Timestamps are carried over unchanged. The interpolation method is
    /// chosen per variable with [`InterpolationMethod::for_variable`].
    #[instrument(skip_all, fields(times = stack.num_times(), variables = stack.variables.len()))]
    pub fn harmonize_stack(
        &self,
        stack: &SourceArray,
        georef: &SourceGeoref,
        grid: &UnifiedSpatialGrid,
    ) -> std::result::Result<SourceArray, SpatialSkip> {
        let (transform, crs) = check_georef(georef.transform, &georef.crs)?;

        let frame_len = stack.frame_len();
        let num_times = stack.num_times();
        let mut out = SourceArray::new(grid.width, grid.height, stack.times.clone());

        for (name, data) in &stack.variables {
            if data.len() != frame_len * num_times {
                warn!(variable = %name, "Variable buffer does not match stack shape");
                return Err(SpatialSkip::ShapeMismatch {
                    actual: data.len(),
                    width: stack.width,
                    height: stack.height,
                });
            }

            let method = InterpolationMethod::for_variable(name);
            debug!(variable = %name, method = %method, "Resampling variable");
            let mut resampled = Vec::with_capacity(grid.num_cells() * num_times);
            for t in 0..num_times {
                let frame = &data[t * frame_len..(t + 1) * frame_len];
                resampled.extend(reproject_to_grid(
                    frame,
                    stack.width,
                    stack.height,
                    &transform,
                    crs,
                    grid,
                    method,
                ));
            }
            out.variables.insert(name.clone(), resampled);
        }

        Ok(out)
    }
}

/// Pixel count covering `extent`, tolerant of float noise in the division.
fn cells_along(extent: f64, res: f64) -> usize {
    (((extent / res) - 1e-9).ceil() as usize).max(1)
}

fn check_georef(
    transform: Option<GeoTransform>,
    crs: &str,
) -> std::result::Result<(GeoTransform, Crs), SpatialSkip> {
    let transform = match transform {
        Some(t) if t.is_valid() => t,
        _ => return Err(SpatialSkip::InvalidTransform),
    };
    let crs = Crs::parse(crs).ok_or_else(|| SpatialSkip::UnsupportedCrs(crs.to_string()))?;
    Ok((transform, crs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_target_grid_covers_union() {
        let harmonizer = SpatialHarmonizer::default();
        let bounds = [
            BoundingBox::new(33.0, -2.0, 35.0, 0.0),
            BoundingBox::new(34.0, -1.0, 36.5, 1.0),
        ];
        let grid = harmonizer
            .create_target_grid(&bounds, Resolution::Km5)
            .unwrap();

        assert_eq!(grid.bounds, BoundingBox::new(33.0, -2.0, 36.5, 1.0));
        assert_eq!(grid.width, 84);
        assert_eq!(grid.height, 72);
        assert_eq!(grid.crs, Crs::Epsg4326);
        assert_eq!(grid.transform.origin_x, 33.0);
        assert_eq!(grid.transform.origin_y, 1.0);
    }

    #[test]
    fn test_target_grid_minimum_one_pixel() {
        let harmonizer = SpatialHarmonizer::default();
        let grid = harmonizer
            .create_target_grid(&[BoundingBox::new(10.0, 10.0, 10.001, 10.001)], Resolution::Km5)
            .unwrap();
        assert_eq!((grid.width, grid.height), (1, 1));
    }

    #[test]
    fn test_target_grid_rejects_empty_and_oversized() {
        let harmonizer = SpatialHarmonizer::new(SpatialConfig { max_grid_cells: 100 });
        assert!(harmonizer.create_target_grid(&[], Resolution::Km1).is_err());
        let err = harmonizer
            .create_target_grid(&[BoundingBox::new(0.0, 0.0, 1.0, 1.0)], Resolution::Km1)
            .unwrap_err();
        assert!(matches!(err, HarmonizeError::Harmonization(_)));
    }

    #[test]
    fn test_resample_skips_bad_georef() {
        let harmonizer = SpatialHarmonizer::default();
        let grid = harmonizer
            .create_target_grid(&[BoundingBox::new(0.0, 0.0, 1.0, 1.0)], Resolution::Km5)
            .unwrap();
        let data = vec![1.0f32; 4];

        let no_transform = SourceArrayInfo {
            data: &data,
            width: 2,
            height: 2,
            transform: None,
            crs: "EPSG:4326",
        };
        assert_eq!(
            harmonizer.resample_from_array(no_transform, &grid, InterpolationMethod::Bilinear),
            Err(SpatialSkip::InvalidTransform)
        );

        let utm = SourceArrayInfo {
            transform: Some(GeoTransform::north_up(0.0, 1.0, 0.5, 0.5)),
            crs: "EPSG:32636",
            ..no_transform
        };
        assert!(matches!(
            harmonizer.resample_from_array(utm, &grid, InterpolationMethod::Bilinear),
            Err(SpatialSkip::UnsupportedCrs(_))
        ));
    }

    #[test]
    fn test_harmonize_stack_shapes() {
        let harmonizer = SpatialHarmonizer::default();
        let bounds = BoundingBox::new(0.0, 0.0, 1.0, 0.5);
        let grid = harmonizer
            .create_target_grid(&[bounds], Resolution::Km5)
            .unwrap();

        let times = vec![
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap(),
        ];
        let stack = SourceArray::new(4, 2, times.clone())
            .with_variable("precipitation", vec![2.0; 16])
            .unwrap()
            .with_variable("pixel_reliability", vec![1.0; 16])
            .unwrap();
        let georef = SourceGeoref {
            bounds,
            transform: Some(GeoTransform::from_bounds(&bounds, 4, 2)),
            crs: "EPSG:4326".to_string(),
        };

        let out = harmonizer.harmonize_stack(&stack, &georef, &grid).unwrap();
        assert_eq!(out.width, grid.width);
        assert_eq!(out.height, grid.height);
        assert_eq!(out.times, times);
        assert!(out.validate().is_ok());
        assert!(out.variables["precipitation"].iter().all(|v| (*v - 2.0).abs() < 1e-6));
    }
}
