//! Feature engineering.
//!
//! Turns a [`HarmonizedDataset`] into the fixed set of named 2-D layers the
//! risk model consumes. Every function here is pure: the same dataset and
//! target date always give the same features.

use std::collections::BTreeMap;
use std::f32::consts::PI;

use chrono::{DateTime, NaiveDate, Utc};
use harmonize_common::time::midnight_utc;
use harmonize_common::{FeatureSet, Grid2D, Result, SourceId};
use tracing::debug;

use crate::dataset::HarmonizedDataset;
use crate::variables::{
    kelvin_to_celsius, LST_DAY, NDVI, POPULATION_DENSITY, PRECIPITATION, PREVALENCE,
    RELATIVE_HUMIDITY, TEMPERATURE_2M,
};

/// Feature names, as published to downstream consumers.
pub mod names {
    pub const TEMPERATURE_MEAN: &str = "temperature_mean";
    pub const TEMPERATURE_RANGE: &str = "temperature_range";
    pub const RELATIVE_HUMIDITY_MEAN: &str = "relative_humidity_mean";
    pub const PRECIPITATION_DAILY: &str = "precipitation_daily";
    pub const PRECIPITATION_TOTAL: &str = "precipitation_total";
    pub const NDVI_CURRENT: &str = "ndvi_current";
    pub const LST_DAY: &str = "lst_day";
    pub const BASELINE_PREVALENCE: &str = "baseline_prevalence";
    pub const POPULATION_DENSITY: &str = "population_density";
    pub const POPULATION_DENSITY_LOG: &str = "population_density_log";

    pub const TEMPERATURE_SUITABILITY: &str = "temperature_suitability";
    pub const BREEDING_HABITAT_SUITABILITY: &str = "breeding_habitat_suitability";
    pub const POPULATION_AT_RISK: &str = "population_at_risk";
    pub const TRANSMISSION_SUITABILITY: &str = "transmission_suitability";
}

/// Intermediate features. `None` means the layer was never delivered and
/// is dropped by [`FeatureEngineer::validate_and_normalize`].
pub type FeatureMap = BTreeMap<String, Option<Grid2D>>;

// Temperature suitability breakpoints, degrees Celsius
const T_MIN: f32 = 16.0;
const T_OPT_LOW: f32 = 25.0;
const T_OPT_HIGH: f32 = 30.0;
const T_MAX: f32 = 38.0;

/// Above this daily rainfall larvae start being flushed out (mm/day).
const FLUSHING_THRESHOLD_MM: f32 = 80.0;
const NDVI_OPTIMUM: f32 = 0.5;
const NDVI_SPREAD: f32 = 0.3;

/// Suitability of one temperature (°C) for transmission, in [0, 1].
///
/// Zero outside 16–38 °C, a cosine rise to a plateau of 1 between 25 and
/// 30 °C, and a cosine fall that crosses 0.5 at 34 °C. NaN stays NaN.
pub fn temperature_suitability(celsius: f32) -> f32 {
    if celsius.is_nan() {
        return f32::NAN;
    }
    if celsius <= T_MIN || celsius >= T_MAX {
        0.0
    } else if celsius < T_OPT_LOW {
        0.5 * (1.0 - (PI * (celsius - T_MIN) / (T_OPT_LOW - T_MIN)).cos())
    } else if celsius <= T_OPT_HIGH {
        1.0
    } else {
        0.5 * (1.0 + (PI * (celsius - T_OPT_HIGH) / (T_MAX - T_OPT_HIGH)).cos())
    }
}

/// [`temperature_suitability`] over a whole array.
pub fn temperature_suitability_curve(temperature: &[f32]) -> Vec<f32> {
    temperature.iter().map(|&t| temperature_suitability(t)).collect()
}

/// Rainfall adequacy for breeding sites, in [0, 1].
pub fn precipitation_adequacy(mm_per_day: f32) -> f32 {
    if mm_per_day.is_nan() {
        return f32::NAN;
    }
    let p = mm_per_day.max(0.0);
    let adequacy = 1.0 - (-p / 10.0).exp();
    if p > FLUSHING_THRESHOLD_MM {
        adequacy * (-(p - FLUSHING_THRESHOLD_MM) / FLUSHING_THRESHOLD_MM).exp()
    } else {
        adequacy
    }
}

/// Vegetation moderation term, peaking at moderate NDVI.
pub fn vegetation_moderation(ndvi: f32) -> f32 {
    let z = (ndvi - NDVI_OPTIMUM) / NDVI_SPREAD;
    (-(z * z)).exp()
}

/// Breeding habitat index: temperature × rainfall × vegetation, clipped to
/// [0, 1]. Any missing input makes the pixel missing.
pub fn calculate_breeding_habitat(
    temperature: &[f32],
    precipitation: &[f32],
    ndvi: &[f32],
) -> Vec<f32> {
    temperature
        .iter()
        .zip(precipitation)
        .zip(ndvi)
        .map(|((&t, &p), &v)| {
            let index =
                temperature_suitability(t) * precipitation_adequacy(p) * vegetation_moderation(v);
            if index.is_nan() {
                f32::NAN
            } else {
                index.clamp(0.0, 1.0)
            }
        })
        .collect()
}

/// Builds the model feature set.
#[derive(Debug, Clone, Default)]
pub struct FeatureEngineer;

impl FeatureEngineer {
    pub fn new() -> Self {
        Self
    }

    /// One feature per relevant source field.
    ///
    /// Window statistics use every index step; "current" layers use the
    /// last step at or before `target`. A mandatory feature whose source is
    /// unavailable is all-missing; an optional one is `None`.
    pub fn extract_basic_features(
        &self,
        data: &HarmonizedDataset,
        target: DateTime<Utc>,
    ) -> FeatureMap {
        let width = data.grid.width;
        let height = data.grid.height;
        let frame_len = data.frame_len();
        let num_times = data.num_times();
        let current = data.index_position(target);
        let missing = || Grid2D::missing(width, height);
        let grid = |values: Vec<f32>| Grid2D::new(width, height, values).unwrap_or_else(missing);
        let frame = |source: SourceId, name: &str| {
            data.frame(source, name, current)
                .map(|f| grid(f.to_vec()))
                .unwrap_or_else(missing)
        };

        let mut features = FeatureMap::new();

        let temperature = data.variable(SourceId::Climate, TEMPERATURE_2M);
        let stats = temperature.map(|buf| PixelStats::compute(buf, frame_len, num_times, &[]));
        let mean_celsius = stats
            .as_ref()
            .map(|s| grid(s.mean.iter().map(|&k| kelvin_to_celsius(k)).collect()))
            .unwrap_or_else(missing);
        features.insert(names::TEMPERATURE_MEAN.to_string(), Some(mean_celsius));
        features.insert(
            names::TEMPERATURE_RANGE.to_string(),
            Some(stats.as_ref().map(|s| grid(s.range())).unwrap_or_else(missing)),
        );
        features.insert(
            names::RELATIVE_HUMIDITY_MEAN.to_string(),
            data.variable(SourceId::Climate, RELATIVE_HUMIDITY)
                .map(|buf| grid(PixelStats::compute(buf, frame_len, num_times, &[]).mean)),
        );

        let weights = step_days(data);
        let total = data
            .variable(SourceId::Precipitation, PRECIPITATION)
            .map(|buf| PixelStats::compute(buf, frame_len, num_times, &weights).weighted_sum)
            .map(grid)
            .unwrap_or_else(missing);
        features.insert(
            names::PRECIPITATION_DAILY.to_string(),
            Some(frame(SourceId::Precipitation, PRECIPITATION)),
        );
        features.insert(names::PRECIPITATION_TOTAL.to_string(), Some(total));

        features.insert(names::NDVI_CURRENT.to_string(), Some(frame(SourceId::Vegetation, NDVI)));
        features.insert(
            names::LST_DAY.to_string(),
            data.frame(SourceId::Vegetation, LST_DAY, current)
                .map(|f| grid(f.iter().map(|&k| kelvin_to_celsius(k)).collect())),
        );

        features.insert(
            names::BASELINE_PREVALENCE.to_string(),
            Some(frame(SourceId::Epidemiology, PREVALENCE)),
        );

        let density = frame(SourceId::Population, POPULATION_DENSITY);
        features.insert(
            names::POPULATION_DENSITY_LOG.to_string(),
            Some(density.map(|d| if d.is_nan() { d } else { d.max(0.0).ln_1p() })),
        );
        features.insert(names::POPULATION_DENSITY.to_string(), Some(density));

        features
    }

    /// Composite layers computed from the basic features.
    ///
    /// Rainfall adequacy uses the window's mean daily rainfall,
    /// `precipitation_total / window_days`.
    pub fn calculate_derived_features(
        &self,
        basic: &FeatureMap,
        width: usize,
        height: usize,
        window_days: f64,
    ) -> FeatureMap {
        let layer = |name: &str| -> Grid2D {
            basic
                .get(name)
                .and_then(Option::as_ref)
                .filter(|g| g.shape() == (height, width))
                .cloned()
                .unwrap_or_else(|| Grid2D::missing(width, height))
        };
        let wrap = |values: Vec<f32>| {
            Grid2D::new(width, height, values).unwrap_or_else(|| Grid2D::missing(width, height))
        };

        let temperature = layer(names::TEMPERATURE_MEAN);
        let total = layer(names::PRECIPITATION_TOTAL);
        let ndvi = layer(names::NDVI_CURRENT);
        let density = layer(names::POPULATION_DENSITY);
        let prevalence = layer(names::BASELINE_PREVALENCE);

        let days = window_days.max(1.0) as f32;
        let mean_daily: Vec<f32> = total.data.iter().map(|&p| p / days).collect();

        let suitability = wrap(temperature_suitability_curve(&temperature.data));
        let habitat = wrap(calculate_breeding_habitat(
            &temperature.data,
            &mean_daily,
            &ndvi.data,
        ));
        let at_risk = density.zip_map(&prevalence, |d, p| d * p);
        let transmission = suitability.zip_map(&habitat, |s, h| (s * h).sqrt());

        let mut derived = FeatureMap::new();
        derived.insert(names::TEMPERATURE_SUITABILITY.to_string(), Some(suitability));
        derived.insert(names::BREEDING_HABITAT_SUITABILITY.to_string(), Some(habitat));
        derived.insert(names::POPULATION_AT_RISK.to_string(), at_risk);
        derived.insert(names::TRANSMISSION_SUITABILITY.to_string(), transmission);
        derived
    }

    /// Drop absent layers, turn infinities into NaN and enforce one shape.
    pub fn validate_and_normalize(
        &self,
        features: FeatureMap,
        width: usize,
        height: usize,
    ) -> Result<FeatureSet> {
        let mut set = FeatureSet::new(width, height);
        for (name, layer) in features {
            let Some(layer) = layer else {
                debug!(feature = %name, "Dropping absent feature");
                continue;
            };
            let cleaned = layer.map(|v| if v.is_finite() { v } else { f32::NAN });
            set.insert(name, cleaned)?;
        }
        Ok(set)
    }

    /// Full feature pipeline for one request.
    pub fn generate_ml_features(
        &self,
        data: &HarmonizedDataset,
        target_date: NaiveDate,
    ) -> Result<FeatureSet> {
        let width = data.grid.width;
        let height = data.grid.height;

        let mut features = self.extract_basic_features(data, midnight_utc(target_date));
        let window_days: f64 = step_days(data).iter().map(|&d| d as f64).sum();
        let derived = self.calculate_derived_features(&features, width, height, window_days);
        features.extend(derived);

        let set = self.validate_and_normalize(features, width, height)?;
        debug!(features = set.len(), width, height, "Generated model features");
        Ok(set)
    }
}

/// Length of each index step in days.
fn step_days(data: &HarmonizedDataset) -> Vec<f32> {
    data.index
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let next = data
                .index
                .get(i + 1)
                .copied()
                .unwrap_or_else(|| data.granularity.advance(*t));
            (next - *t).num_seconds() as f32 / 86_400.0
        })
        .collect()
}

/// Per-pixel statistics over the time axis, ignoring NaN.
struct PixelStats {
    mean: Vec<f32>,
    min: Vec<f32>,
    max: Vec<f32>,
    /// Sum of `value * weight`; NaN where no step is valid
    weighted_sum: Vec<f32>,
}

impl PixelStats {
    /// `weights` may be empty, meaning every step weighs 1.
    fn compute(buf: &[f32], frame_len: usize, num_times: usize, weights: &[f32]) -> Self {
        let mut stats = Self {
            mean: vec![f32::NAN; frame_len],
            min: vec![f32::NAN; frame_len],
            max: vec![f32::NAN; frame_len],
            weighted_sum: vec![f32::NAN; frame_len],
        };
        for px in 0..frame_len {
            let mut sum = 0.0f64;
            let mut weighted = 0.0f64;
            let mut count = 0usize;
            let mut lo = f32::INFINITY;
            let mut hi = f32::NEG_INFINITY;
            for t in 0..num_times {
                let Some(&v) = buf.get(t * frame_len + px) else {
                    break;
                };
                if !v.is_finite() {
                    continue;
                }
                let w = weights.get(t).copied().unwrap_or(1.0);
                sum += v as f64;
                weighted += (v * w) as f64;
                count += 1;
                lo = lo.min(v);
                hi = hi.max(v);
            }
            if count > 0 {
                stats.mean[px] = (sum / count as f64) as f32;
                stats.weighted_sum[px] = weighted as f32;
                stats.min[px] = lo;
                stats.max[px] = hi;
            }
        }
        stats
    }

    fn range(&self) -> Vec<f32> {
        self.max.iter().zip(&self.min).map(|(hi, lo)| hi - lo).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use grid_processor::UnifiedSpatialGrid;
    use harmonize_common::{BoundingBox, Crs, GeoTransform, Granularity, Resolution, SourceArray};

    #[test]
    fn test_temperature_curve_shape() {
        let out = temperature_suitability_curve(&[18.0, 27.0, 34.0]);
        assert!(out.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(out[0] < 0.3, "18 °C should be low, got {}", out[0]);
        assert!((out[1] - 1.0).abs() < 1e-6);
        assert!((out[2] - 0.5).abs() < 1e-5);

        assert_eq!(temperature_suitability(10.0), 0.0);
        assert_eq!(temperature_suitability(40.0), 0.0);
        assert!(temperature_suitability(f32::NAN).is_nan());
    }

    #[test]
    fn test_temperature_curve_rises_then_falls() {
        let rising = temperature_suitability_curve(&[16.5, 19.0, 22.0, 24.9]);
        assert!(rising.windows(2).all(|w| w[0] < w[1]));
        let falling = temperature_suitability_curve(&[30.5, 33.0, 36.0, 37.9]);
        assert!(falling.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_precipitation_adequacy_flushing() {
        assert_eq!(precipitation_adequacy(0.0), 0.0);
        assert!(precipitation_adequacy(30.0) > precipitation_adequacy(5.0));
        assert!(precipitation_adequacy(200.0) < precipitation_adequacy(80.0));
        assert_eq!(precipitation_adequacy(-3.0), 0.0);
    }

    #[test]
    fn test_breeding_habitat_bounds() {
        let habitat = calculate_breeding_habitat(
            &[27.0, 10.0, 27.0, f32::NAN],
            &[40.0, 40.0, 40.0, 40.0],
            &[0.5, 0.5, 0.5, 0.5],
        );
        assert!(habitat[0] > 0.9 && habitat[0] <= 1.0);
        assert_eq!(habitat[1], 0.0);
        assert!(habitat[3].is_nan());
    }

    #[test]
    fn test_validate_and_normalize() {
        let engineer = FeatureEngineer::new();
        let mut features = FeatureMap::new();
        features.insert("a".into(), Some(Grid2D::new(2, 1, vec![f32::INFINITY, 1.0]).unwrap()));
        features.insert("b".into(), None);
        let set = engineer.validate_and_normalize(features, 2, 1).unwrap();
        assert_eq!(set.names(), vec!["a".to_string()]);
        assert!(set.get("a").unwrap().data[0].is_nan());

        let mut features = FeatureMap::new();
        features.insert("c".into(), Some(Grid2D::filled(1, 2, 0.0)));
        assert!(engineer.validate_and_normalize(features, 2, 1).is_err());
    }

    fn dataset() -> HarmonizedDataset {
        let bounds = BoundingBox::new(0.0, 0.0, 2.0, 1.0);
        let grid = UnifiedSpatialGrid {
            bounds,
            width: 2,
            height: 1,
            transform: GeoTransform::from_bounds(&bounds, 2, 1),
            crs: Crs::Epsg4326,
            resolution: Resolution::Km5,
        };
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let index: Vec<_> = (0..3).map(|d| t0 + Duration::days(d)).collect();
        let mut ds = HarmonizedDataset::new(grid, index.clone(), Granularity::Daily);

        let climate = SourceArray::new(2, 1, index.clone())
            .with_variable(TEMPERATURE_2M, vec![298.15, 300.15, 299.15, 301.15, 300.15, f32::NAN])
            .unwrap();
        ds.insert(SourceId::Climate, climate).unwrap();
        let vegetation = SourceArray::new(2, 1, index.clone())
            .with_variable(NDVI, vec![0.3, 0.4, 0.5, 0.6, 0.7, 0.8])
            .unwrap();
        ds.insert(SourceId::Vegetation, vegetation).unwrap();
        let population = SourceArray::new(2, 1, index)
            .with_variable(POPULATION_DENSITY, vec![100.0, 0.0, 100.0, 0.0, 100.0, 0.0])
            .unwrap();
        ds.insert(SourceId::Population, population).unwrap();
        ds.mark_unavailable(SourceId::Precipitation, "download_failed");
        ds
    }

    #[test]
    fn test_basic_features() {
        let ds = dataset();
        let target = Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap();
        let basic = FeatureEngineer::new().extract_basic_features(&ds, target);

        let mean = basic[names::TEMPERATURE_MEAN].as_ref().unwrap();
        assert!((mean.data[0] - 26.0).abs() < 1e-3);
        assert!((mean.data[1] - 27.5).abs() < 1e-3);
        let range = basic[names::TEMPERATURE_RANGE].as_ref().unwrap();
        assert!((range.data[0] - 2.0).abs() < 1e-3);

        let ndvi = basic[names::NDVI_CURRENT].as_ref().unwrap();
        assert_eq!(ndvi.data, vec![0.7, 0.8]);

        let rain = basic[names::PRECIPITATION_DAILY].as_ref().unwrap();
        assert_eq!(rain.valid_count(), 0);

        let log = basic[names::POPULATION_DENSITY_LOG].as_ref().unwrap();
        assert!((log.data[0] - 101.0f32.ln()).abs() < 1e-5);
        assert_eq!(log.data[1], 0.0);

        assert!(basic[names::RELATIVE_HUMIDITY_MEAN].is_none());
        assert!(basic[names::LST_DAY].is_none());
    }

    #[test]
    fn test_generated_feature_names_and_shapes() {
        let ds = dataset();
        let date = NaiveDate::from_ymd_opt(2024, 3, 3).unwrap();
        let set = FeatureEngineer::new().generate_ml_features(&ds, date).unwrap();

        assert!(!set.contains(names::LST_DAY));
        for name in [
            names::TEMPERATURE_MEAN,
            names::PRECIPITATION_TOTAL,
            names::BASELINE_PREVALENCE,
            names::TEMPERATURE_SUITABILITY,
            names::BREEDING_HABITAT_SUITABILITY,
            names::POPULATION_AT_RISK,
            names::TRANSMISSION_SUITABILITY,
        ] {
            let layer = set.get(name).unwrap_or_else(|| panic!("missing {}", name));
            assert_eq!(layer.shape(), (1, 2));
        }
        // No rain data, so habitat is unknown everywhere
        assert_eq!(set.get(names::BREEDING_HABITAT_SUITABILITY).unwrap().valid_count(), 0);
        assert_eq!(set.get(names::TEMPERATURE_SUITABILITY).unwrap().valid_count(), 2);
    }
}
