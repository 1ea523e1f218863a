//! Test data generators for creating synthetic environmental rasters.
//!
//! These generators create predictable, verifiable patterns in the units the
//! acquisition collaborators deliver, so feature values computed from them
//! can be checked by hand.

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// This makes it easy to verify that data is being read/written correctly
/// by checking that grid[row][col] == col * 1000 + row.
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50);
/// assert_eq!(grid[1], 1000.0);
/// assert_eq!(grid[10], 1.0);
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Creates a 2 m temperature grid in Kelvin.
///
/// Values run from `base_k` in the north-west corner to `base_k + 4` in the
/// south-east, a gentle gradient typical of a lowland region.
pub fn create_temperature_grid(width: usize, height: usize, base_k: f32) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let x_factor = col as f32 / width.max(1) as f32;
            let y_factor = row as f32 / height.max(1) as f32;
            data.push(base_k + x_factor * 2.0 + y_factor * 2.0);
        }
    }
    data
}

/// Creates a daily precipitation grid in mm/day.
///
/// Rain increases from west (dry) to east (wet), scaled by `scale_mm`.
pub fn create_precipitation_grid(width: usize, height: usize, scale_mm: f32) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for _row in 0..height {
        for col in 0..width {
            let x_factor = (col as f32 + 0.5) / width.max(1) as f32;
            data.push(scale_mm * x_factor);
        }
    }
    data
}

/// Creates an NDVI grid in [-1, 1].
///
/// Vegetation is densest in the centre (about 0.7) and sparse towards the
/// edges (about 0.2).
pub fn create_ndvi_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    let center_x = width as f32 / 2.0;
    let center_y = height as f32 / 2.0;
    let max_dist = ((center_x * center_x) + (center_y * center_y)).sqrt().max(1.0);

    for row in 0..height {
        for col in 0..width {
            let dx = col as f32 + 0.5 - center_x;
            let dy = row as f32 + 0.5 - center_y;
            let dist = (dx * dx + dy * dy).sqrt() / max_dist;
            data.push(0.7 - 0.5 * dist.min(1.0));
        }
    }
    data
}

/// Creates a population density grid in persons/km².
///
/// A single town at the centre on a rural background.
pub fn create_population_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    let cx = width / 2;
    let cy = height / 2;
    for row in 0..height {
        for col in 0..width {
            let density = if col == cx && row == cy { 2500.0 } else { 80.0 };
            data.push(density);
        }
    }
    data
}

/// Creates a grid with a specific pattern of NaN values.
///
/// Every `nan_interval`-th cell (in row-major order) is NaN.
pub fn create_grid_with_nans(width: usize, height: usize, nan_interval: usize) -> Vec<f32> {
    let mut data = create_test_grid(width, height);
    if nan_interval > 0 {
        for (i, v) in data.iter_mut().enumerate() {
            if i % nan_interval == 0 {
                *v = f32::NAN;
            }
        }
    }
    data
}

/// Repeat one frame `times` times into a `[time][row][col]` buffer.
pub fn stack_frames(frame: &[f32], times: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(frame.len() * times);
    for _ in 0..times {
        out.extend_from_slice(frame);
    }
    out
}

/// Build a `[time][row][col]` buffer from a per-frame generator.
pub fn stack_with(times: usize, mut frame: impl FnMut(usize) -> Vec<f32>) -> Vec<f32> {
    let mut out = Vec::new();
    for t in 0..times {
        out.extend(frame(t));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_grid() {
        let grid = create_test_grid(3, 2);
        assert_eq!(grid, vec![0.0, 1000.0, 2000.0, 1.0, 1001.0, 2001.0]);
    }

    #[test]
    fn test_temperature_grid_range() {
        let grid = create_temperature_grid(10, 10, 298.0);
        assert!(grid.iter().all(|&t| (298.0..302.0).contains(&t)));
    }

    #[test]
    fn test_precipitation_non_negative() {
        let grid = create_precipitation_grid(4, 3, 12.0);
        assert!(grid.iter().all(|&p| p >= 0.0 && p <= 12.0));
        assert!(grid[3] > grid[0]);
    }

    #[test]
    fn test_ndvi_in_range() {
        let grid = create_ndvi_grid(7, 5);
        assert!(grid.iter().all(|&v| (-1.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_grid_with_nans() {
        let grid = create_grid_with_nans(4, 4, 5);
        assert_eq!(grid.iter().filter(|v| v.is_nan()).count(), 4);
    }

    #[test]
    fn test_stacking() {
        let frame = vec![1.0, 2.0];
        assert_eq!(stack_frames(&frame, 3).len(), 6);
        let stacked = stack_with(2, |t| vec![t as f32; 2]);
        assert_eq!(stacked, vec![0.0, 0.0, 1.0, 1.0]);
    }
}
