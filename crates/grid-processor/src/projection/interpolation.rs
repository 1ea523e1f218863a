//! Sampling kernels for grid resampling.
//!
//! All kernels take fractional *centre* coordinates: `(0.0, 0.0)` is the
//! centre of the top-left pixel. Positions are clamped to the centre lattice,
//! so a target pixel that falls in the outer half-pixel of the source still
//! reads the edge value.

use crate::types::InterpolationMethod;

#[inline]
fn clamp_index(v: f64, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    v.clamp(0.0, (len - 1) as f64) as usize
}

/// Nearest neighbour.
///
/// Returns the value of the nearest pixel, including NaN.
pub fn nearest_interpolate(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    if width == 0 || height == 0 || !x.is_finite() || !y.is_finite() {
        return f32::NAN;
    }
    let col = clamp_index(x.round(), width);
    let row = clamp_index(y.round(), height);
    data.get(row * width + col).copied().unwrap_or(f32::NAN)
}

/// Bilinear interpolation.
///
/// Weights of missing corners are dropped and the remainder renormalized, so
/// an isolated hole does not spread NaN into its neighbourhood. Returns NaN
/// only when every contributing corner is missing.
pub fn bilinear_interpolate(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    if width == 0 || height == 0 || !x.is_finite() || !y.is_finite() {
        return f32::NAN;
    }

    let x = x.clamp(0.0, (width - 1) as f64);
    let y = y.clamp(0.0, (height - 1) as f64);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let xf = x - x0 as f64;
    let yf = y - y0 as f64;

    let corners = [
        (x0, y0, (1.0 - xf) * (1.0 - yf)),
        (x1, y0, xf * (1.0 - yf)),
        (x0, y1, (1.0 - xf) * yf),
        (x1, y1, xf * yf),
    ];

    let mut sum = 0.0f64;
    let mut weight = 0.0f64;
    for (cx, cy, w) in corners {
        if w <= 0.0 {
            continue;
        }
        let v = data[cy * width + cx];
        if v.is_finite() {
            sum += v as f64 * w;
            weight += w;
        }
    }

    if weight <= 0.0 {
        return f32::NAN;
    }
    (sum / weight) as f32
}

/// Sample with the given method.
pub fn sample(
    data: &[f32],
    width: usize,
    height: usize,
    x: f64,
    y: f64,
    method: InterpolationMethod,
) -> f32 {
    match method {
        InterpolationMethod::Nearest => nearest_interpolate(data, width, height, x, y),
        InterpolationMethod::Bilinear => bilinear_interpolate(data, width, height, x, y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_interpolate() {
        let data: Vec<f32> = vec![
            1.0, 2.0, 3.0,
            4.0, 5.0, 6.0,
            7.0, 8.0, 9.0,
        ];

        assert_eq!(nearest_interpolate(&data, 3, 3, 0.0, 0.0), 1.0);
        assert_eq!(nearest_interpolate(&data, 3, 3, 1.0, 1.0), 5.0);
        assert_eq!(nearest_interpolate(&data, 3, 3, 0.4, 0.4), 1.0);
        assert_eq!(nearest_interpolate(&data, 3, 3, 0.6, 0.6), 5.0);
        // Outer half-pixel clamps to the edge
        assert_eq!(nearest_interpolate(&data, 3, 3, -0.4, 2.4), 7.0);
    }

    #[test]
    fn test_bilinear_interpolate() {
        let data: Vec<f32> = vec![
            1.0, 2.0,
            3.0, 4.0,
        ];

        assert_eq!(bilinear_interpolate(&data, 2, 2, 0.0, 0.0), 1.0);
        assert_eq!(bilinear_interpolate(&data, 2, 2, 1.0, 0.0), 2.0);
        assert_eq!(bilinear_interpolate(&data, 2, 2, 0.0, 1.0), 3.0);
        assert_eq!(bilinear_interpolate(&data, 2, 2, 1.0, 1.0), 4.0);

        let center = bilinear_interpolate(&data, 2, 2, 0.5, 0.5);
        assert!((center - 2.5).abs() < 0.001);
    }

    #[test]
    fn test_bilinear_skips_missing_corner() {
        let data: Vec<f32> = vec![
            1.0, f32::NAN,
            3.0, 5.0,
        ];

        let result = bilinear_interpolate(&data, 2, 2, 0.5, 0.5);
        assert!((result - 3.0).abs() < 0.001);
    }

    #[test]
    fn test_bilinear_all_missing() {
        let data = vec![f32::NAN; 4];
        assert!(bilinear_interpolate(&data, 2, 2, 0.5, 0.5).is_nan());
    }
}
