//! Quality assessment of harmonized data.
//!
//! Every result carries a score in [0, 1] built from three parts: how clean
//! each source is, how complete the grid is, and whether physically related
//! sources agree with each other.

use std::collections::BTreeMap;

use harmonize_common::{
    CompletenessReport, ConsistencyCheck, ConsistencyReport, QualityAssessment, QualityCategory,
    SourceArray, SourceId, SourceQuality,
};
use tracing::{debug, info};

use crate::dataset::HarmonizedDataset;
use crate::variables::{
    kelvin_to_celsius, required_variables, variable_spec, LST_DAY, NDVI, POPULATION_DENSITY,
    PRECIPITATION, PREVALENCE, TEMPERATURE_2M,
};

/// Weight of the mean per-source score in the overall score
const SOURCE_WEIGHT: f64 = 0.4;
/// Weight of overall completeness
const COMPLETENESS_WEIGHT: f64 = 0.4;
/// Weight of the mean consistency-check support
const CONSISTENCY_WEIGHT: f64 = 0.2;

/// Score lost per unit fraction of implausible values.
const OUTLIER_PENALTY: f64 = 0.5;
const HIGH_MISSING_FRACTION: f64 = 0.2;
const OUTLIER_FLAG_FRACTION: f64 = 0.01;
const Z_SCORE_LIMIT: f64 = 4.0;

/// Largest difference between air and land surface temperature still
/// considered consistent (K), both per pixel and on average.
const MAX_TEMPERATURE_LST_DIFF: f64 = 15.0;
/// Share of populated pixels that must carry a prevalence estimate.
const MIN_PREVALENCE_COVERAGE: f64 = 0.9;

/// Scores harmonized datasets.
#[derive(Debug, Clone, Default)]
pub struct QualityManager;

impl QualityManager {
    pub fn new() -> Self {
        Self
    }

    /// Score one source by its missing and implausible values.
    ///
    /// Both fractions are taken over every value the source should hold,
    /// so turning a value into a gap never raises the score. A mandatory
    /// variable that was not delivered counts as entirely missing.
    pub fn assess_source_quality(&self, source: SourceId, data: &SourceArray) -> SourceQuality {
        let expected = data.frame_len() * data.num_times();
        let mut counts = Counts::default();
        let mut flags = Vec::new();

        for name in required_variables(source) {
            if !data.variables.contains_key(name) {
                counts.total += expected;
                counts.missing += expected;
                flags.push(format!("missing_variable:{}", name));
            }
        }
        for (name, values) in &data.variables {
            counts.add(name, values);
        }

        if counts.total == 0 {
            return SourceQuality::unavailable("empty_source");
        }

        let total = counts.total as f64;
        let missing_fraction = counts.missing as f64 / total;
        let outlier_fraction = counts.implausible as f64 / total;
        let statistical_fraction = counts.statistical as f64 / total;
        let score = (1.0 - missing_fraction - OUTLIER_PENALTY * outlier_fraction).clamp(0.0, 1.0);

        if counts.missing == counts.total {
            flags.push("all_missing".to_string());
        } else if missing_fraction > HIGH_MISSING_FRACTION {
            flags.push("high_missing_data".to_string());
        }
        if outlier_fraction > OUTLIER_FLAG_FRACTION {
            flags.push("physical_outliers".to_string());
        }
        if statistical_fraction > OUTLIER_FLAG_FRACTION {
            flags.push("statistical_outliers".to_string());
        }

        let mut details = BTreeMap::new();
        details.insert("missing_fraction".to_string(), missing_fraction);
        details.insert("outlier_fraction".to_string(), outlier_fraction);
        details.insert("statistical_outlier_fraction".to_string(), statistical_fraction);
        details.insert("total_values".to_string(), total);

        debug!(
            source = %source,
            score,
            missing_fraction,
            outlier_fraction,
            "Assessed source quality"
        );
        SourceQuality {
            score,
            flags,
            details,
        }
    }

    /// Pairwise sanity checks between related sources.
    ///
    /// Each check carries a pass/fail verdict and a support share. The
    /// score uses support, which only counts values that are present, so
    /// blanking a failing pixel never improves it. A check whose inputs are
    /// unavailable is reported as skipped, passes, and has zero support.
    pub fn validate_cross_source_consistency(&self, data: &HarmonizedDataset) -> ConsistencyReport {
        ConsistencyReport::from_checks(vec![
            check_temperature_agreement(data),
            check_precipitation_non_negative(data),
            check_prevalence_where_populated(data),
            check_vegetation_index_range(data),
            check_shapes(data),
        ])
    }

    /// Share of valid values per source over all sources.
    pub fn assess_data_completeness(&self, data: &HarmonizedDataset) -> CompletenessReport {
        let mut per_source = BTreeMap::new();
        for source in SourceId::ALL {
            let ratio = match data.get(source) {
                Some(array) => completeness_ratio(source, array),
                None => 0.0,
            };
            per_source.insert(source, ratio);
        }
        let overall = per_source.values().sum::<f64>() / per_source.len() as f64;
        let complete_sources = per_source.values().filter(|&&r| r >= 1.0).count();

        CompletenessReport {
            per_source,
            overall,
            complete_sources,
        }
    }

    /// Combine source scores, completeness and consistency into one score.
    pub fn assess_harmonized_quality(&self, data: &HarmonizedDataset) -> QualityAssessment {
        let mut source_quality = BTreeMap::new();
        for source in SourceId::ALL {
            let quality = match (data.get(source), data.unavailable_flag(source)) {
                (Some(array), _) => self.assess_source_quality(source, array),
                (None, flag) => SourceQuality::unavailable(flag.unwrap_or("source_unavailable")),
            };
            source_quality.insert(source, quality);
        }

        let consistency = self.validate_cross_source_consistency(data);
        let completeness = self.assess_data_completeness(data);
        let mean_source =
            source_quality.values().map(|q| q.score).sum::<f64>() / source_quality.len() as f64;

        let overall_score = (SOURCE_WEIGHT * mean_source
            + COMPLETENESS_WEIGHT * completeness.overall
            + CONSISTENCY_WEIGHT * consistency.support())
        .clamp(0.0, 1.0);
        let category = QualityCategory::from_score(overall_score);
        let missing_sources = data.missing_sources();

        info!(
            score = overall_score,
            category = category.as_str(),
            completeness = completeness.overall,
            consistent = consistency.consistent,
            missing = missing_sources.len(),
            "Quality assessment complete"
        );

        QualityAssessment {
            source_quality,
            consistency,
            completeness,
            overall_score,
            category,
            missing_sources,
        }
    }
}

#[derive(Debug, Default)]
struct Counts {
    total: usize,
    missing: usize,
    implausible: usize,
    statistical: usize,
}

impl Counts {
    fn add(&mut self, name: &str, values: &[f32]) {
        let spec = variable_spec(name);
        self.total += values.len();

        let mut plausible = Vec::with_capacity(values.len());
        for &v in values {
            if !v.is_finite() {
                self.missing += 1;
            } else if spec.map_or(true, |s| s.is_plausible(v)) {
                plausible.push(v as f64);
            } else {
                self.implausible += 1;
            }
        }

        if plausible.len() < 2 {
            return;
        }
        let n = plausible.len() as f64;
        let mean = plausible.iter().sum::<f64>() / n;
        let std = (plausible.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
        if std > 0.0 {
            self.statistical += plausible
                .iter()
                .filter(|v| ((*v - mean) / std).abs() > Z_SCORE_LIMIT)
                .count();
        }
    }
}

fn completeness_ratio(source: SourceId, array: &SourceArray) -> f64 {
    let expected = array.frame_len() * array.num_times();
    let mut total = 0usize;
    let mut valid = 0usize;
    for name in required_variables(source) {
        if !array.variables.contains_key(name) {
            total += expected;
        }
    }
    for values in array.variables.values() {
        total += values.len();
        valid += values.iter().filter(|v| v.is_finite()).count();
    }
    if total == 0 {
        0.0
    } else {
        valid as f64 / total as f64
    }
}

fn check(name: &str, passed: bool, support: f64, detail: String) -> ConsistencyCheck {
    ConsistencyCheck {
        name: name.to_string(),
        passed,
        support,
        detail,
    }
}

/// Nothing contradicts a skipped check, but nothing supports it either.
fn skipped(name: &str, reason: String) -> ConsistencyCheck {
    check(name, true, 0.0, format!("skipped: {}", reason))
}

fn unavailable(name: &str, source: SourceId) -> ConsistencyCheck {
    skipped(name, format!("{} unavailable", source))
}

fn share(good: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        good as f64 / total as f64
    }
}

/// 2 m air temperature and land surface temperature should roughly agree.
fn check_temperature_agreement(data: &HarmonizedDataset) -> ConsistencyCheck {
    const NAME: &str = "temperature_lst_agreement";
    let Some(air) = data.variable(SourceId::Climate, TEMPERATURE_2M) else {
        return unavailable(NAME, SourceId::Climate);
    };
    let Some(lst) = data.variable(SourceId::Vegetation, LST_DAY) else {
        return unavailable(NAME, SourceId::Vegetation);
    };

    let mut sum = 0.0f64;
    let mut count = 0usize;
    let mut agreeing = 0usize;
    for (a, l) in air.iter().zip(lst) {
        if !(a.is_finite() && l.is_finite()) {
            continue;
        }
        let diff = (kelvin_to_celsius(*a) - kelvin_to_celsius(*l)).abs() as f64;
        sum += diff;
        count += 1;
        if diff < MAX_TEMPERATURE_LST_DIFF {
            agreeing += 1;
        }
    }
    if count == 0 {
        return skipped(NAME, "no overlapping pixels".to_string());
    }
    let mad = sum / count as f64;
    let detail = format!("mean |T2m - LST| = {:.2} K over {} values", mad, count);
    let support = share(agreeing, air.len().max(lst.len()));
    check(NAME, mad < MAX_TEMPERATURE_LST_DIFF, support, detail)
}

fn check_precipitation_non_negative(data: &HarmonizedDataset) -> ConsistencyCheck {
    const NAME: &str = "precipitation_non_negative";
    let Some(rain) = data.variable(SourceId::Precipitation, PRECIPITATION) else {
        return unavailable(NAME, SourceId::Precipitation);
    };
    let negative = rain.iter().filter(|v| v.is_finite() && **v < 0.0).count();
    let valid = rain.iter().filter(|v| v.is_finite() && **v >= 0.0).count();
    let detail = format!("{} negative values", negative);
    check(NAME, negative == 0, share(valid, rain.len()), detail)
}

/// Wherever people live, a baseline prevalence estimate should exist.
///
/// Pixels with unknown population may be populated, so they count against
/// support unless both layers are present there.
fn check_prevalence_where_populated(data: &HarmonizedDataset) -> ConsistencyCheck {
    const NAME: &str = "prevalence_where_populated";
    let Some(last) = data.num_times().checked_sub(1) else {
        return skipped(NAME, "empty index".to_string());
    };
    let Some(population) = data.frame(SourceId::Population, POPULATION_DENSITY, last) else {
        return unavailable(NAME, SourceId::Population);
    };
    let Some(prevalence) = data.frame(SourceId::Epidemiology, PREVALENCE, last) else {
        return unavailable(NAME, SourceId::Epidemiology);
    };

    let mut candidates = 0usize;
    let mut populated = 0usize;
    let mut covered = 0usize;
    for (p, r) in population.iter().zip(prevalence) {
        if p.is_finite() && *p <= 0.0 {
            continue;
        }
        candidates += 1;
        if p.is_finite() {
            populated += 1;
            if r.is_finite() {
                covered += 1;
            }
        }
    }
    let support = share(covered, candidates);
    if populated == 0 {
        return check(NAME, true, support, "no populated pixels".to_string());
    }
    let coverage = share(covered, populated);
    let detail = format!("{:.1}% of populated pixels have prevalence", coverage * 100.0);
    check(NAME, coverage >= MIN_PREVALENCE_COVERAGE, support, detail)
}

fn check_vegetation_index_range(data: &HarmonizedDataset) -> ConsistencyCheck {
    const NAME: &str = "ndvi_within_bounds";
    let Some(ndvi) = data.variable(SourceId::Vegetation, NDVI) else {
        return unavailable(NAME, SourceId::Vegetation);
    };
    let outside = ndvi
        .iter()
        .filter(|v| v.is_finite() && !(-1.0..=1.0).contains(*v))
        .count();
    let inside = ndvi
        .iter()
        .filter(|v| (-1.0..=1.0).contains(*v))
        .count();
    let detail = format!("{} values outside [-1, 1]", outside);
    check(NAME, outside == 0, share(inside, ndvi.len()), detail)
}

/// Every source holds exactly one value per grid cell and index step.
fn check_shapes(data: &HarmonizedDataset) -> ConsistencyCheck {
    const NAME: &str = "grid_shapes_agree";
    let expected = data.frame_len() * data.num_times();
    let mismatched: Vec<String> = data
        .sources()
        .flat_map(|(source, array)| {
            let grid_ok = array.width == data.grid.width
                && array.height == data.grid.height
                && array.num_times() == data.num_times();
            array
                .variables
                .iter()
                .filter(move |(_, v)| !grid_ok || v.len() != expected)
                .map(move |(name, _)| format!("{}.{}", source, name))
        })
        .collect();
    if mismatched.is_empty() {
        let detail = format!("{} cells x {} steps", data.frame_len(), data.num_times());
        check(NAME, true, 1.0, detail)
    } else {
        check(NAME, false, 0.0, format!("mismatched: {}", mismatched.join(", ")))
    }
}
