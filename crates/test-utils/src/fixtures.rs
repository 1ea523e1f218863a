//! Common test fixtures for harmonization tests.
//!
//! Ready-made acquisition results for each of the five sources, shaped the
//! way the real collaborators deliver them (native cadence, native grid).

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use harmonize_common::time::midnight_utc;
use harmonize_common::{BoundingBox, DateRange, RawSourceResult, SourceArray, SourceId, SourceRaster};

use crate::generators::{
    create_ndvi_grid, create_population_grid, create_precipitation_grid, create_temperature_grid,
    stack_frames, stack_with,
};

/// Common region definitions for testing, as (west, south, east, north).
pub mod regions {
    /// Lake Victoria basin, western Kenya
    pub const WESTERN_KENYA: (f64, f64, f64, f64) = (34.0, -1.5, 35.5, 1.0);

    /// Half-degree box near Nairobi, cheap at every resolution
    pub const SMALL: (f64, f64, f64, f64) = (36.5, -1.5, 37.0, -1.0);

    /// Equatorial band used for region validation (200 deg²)
    pub const EQUATORIAL: (f64, f64, f64, f64) = (-10.0, -5.0, 10.0, 5.0);

    /// Larger than the default area cap
    pub const CONTINENTAL: (f64, f64, f64, f64) = (-20.0, -35.0, 55.0, 38.0);

    /// Inverted (west > east)
    pub const INVALID: (f64, f64, f64, f64) = (10.0, -5.0, -10.0, 5.0);
}

/// Timestamps from `start` midnight every `step_hours`, up to and including
/// `end` midnight plus the rest of that day.
pub fn times_between(start: NaiveDate, end: NaiveDate, step_hours: i64) -> Vec<DateTime<Utc>> {
    let mut times = Vec::new();
    let mut t = midnight_utc(start);
    let stop = midnight_utc(end) + Duration::days(1);
    while t < stop {
        times.push(t);
        t += Duration::hours(step_hours);
    }
    times
}

/// 6-hourly reanalysis: `temperature_2m` (K, ~26 °C with a diurnal cycle)
/// and `relative_humidity` (%).
pub fn climate_result(
    bounds: BoundingBox,
    range: &DateRange,
    width: usize,
    height: usize,
) -> RawSourceResult {
    let times = times_between(range.start, range.end, 6);
    let n = times.len();
    let temperature = stack_with(n, |t| {
        let diurnal = [-2.0, 1.0, 3.0, 0.0][t % 4];
        create_temperature_grid(width, height, 298.0 + diurnal)
    });
    let humidity = stack_frames(&vec![70.0; width * height], n);

    let array = SourceArray::new(width, height, times)
        .with_variable("temperature_2m", temperature)
        .and_then(|a| a.with_variable("relative_humidity", humidity))
        .expect("climate fixture shape");
    RawSourceResult::success(SourceId::Climate, SourceRaster::geographic(array, bounds))
}

/// Daily precipitation (mm/day), dry in the west and wet in the east.
pub fn precipitation_result(
    bounds: BoundingBox,
    range: &DateRange,
    width: usize,
    height: usize,
) -> RawSourceResult {
    let times = times_between(range.start, range.end, 24);
    let n = times.len();
    let rain = stack_frames(&create_precipitation_grid(width, height, 12.0), n);

    let array = SourceArray::new(width, height, times)
        .with_variable("precipitation", rain)
        .expect("precipitation fixture shape");
    RawSourceResult::success(SourceId::Precipitation, SourceRaster::geographic(array, bounds))
}

/// 16-day composites bracketing the window: `ndvi`, `lst_day` (K) and the
/// categorical `pixel_reliability`.
pub fn vegetation_result(
    bounds: BoundingBox,
    range: &DateRange,
    width: usize,
    height: usize,
) -> RawSourceResult {
    let mut times = Vec::new();
    let mut t = midnight_utc(range.start) - Duration::days(8);
    let end = midnight_utc(range.end);
    loop {
        times.push(t);
        if t >= end {
            break;
        }
        t += Duration::days(16);
    }
    let n = times.len();

    let ndvi = stack_with(n, |i| {
        let seasonal = 0.02 * (i % 2) as f32;
        create_ndvi_grid(width, height)
            .into_iter()
            .map(|v| v + seasonal)
            .collect()
    });
    let lst = stack_frames(&create_temperature_grid(width, height, 301.0), n);
    let reliability = stack_frames(&vec![0.0; width * height], n);

    let array = SourceArray::new(width, height, times)
        .with_variable("ndvi", ndvi)
        .and_then(|a| a.with_variable("lst_day", lst))
        .and_then(|a| a.with_variable("pixel_reliability", reliability))
        .expect("vegetation fixture shape");
    RawSourceResult::success(SourceId::Vegetation, SourceRaster::geographic(array, bounds))
}

/// Annual parasite prevalence surfaces for the two years before `range.end`.
pub fn epidemiology_result(
    bounds: BoundingBox,
    range: &DateRange,
    width: usize,
    height: usize,
) -> RawSourceResult {
    let year = range.end.year();
    let times = vec![jan_first(year - 2), jan_first(year - 1)];
    let prevalence = stack_with(2, |t| vec![0.15 + 0.05 * t as f32; width * height]);

    let array = SourceArray::new(width, height, times)
        .with_variable("prevalence", prevalence)
        .expect("epidemiology fixture shape");
    RawSourceResult::success(SourceId::Epidemiology, SourceRaster::geographic(array, bounds))
}

/// Static population density (persons/km²) for 2020.
pub fn population_result(bounds: BoundingBox, width: usize, height: usize) -> RawSourceResult {
    let array = SourceArray::new(width, height, vec![jan_first(2020)])
        .with_variable("population_density", create_population_grid(width, height))
        .expect("population fixture shape");
    RawSourceResult::success(SourceId::Population, SourceRaster::geographic(array, bounds))
}

/// All five sources over the same `bounds`, each on its own native grid.
pub fn all_sources(bounds: BoundingBox, range: &DateRange) -> Vec<RawSourceResult> {
    vec![
        climate_result(bounds, range, 2, 2),
        precipitation_result(bounds, range, 5, 5),
        vegetation_result(bounds, range, 12, 12),
        epidemiology_result(bounds, range, 3, 3),
        population_result(bounds, 24, 24),
    ]
}

fn jan_first(year: i32) -> DateTime<Utc> {
    midnight_utc(NaiveDate::from_ymd_opt(year, 1, 1).expect("valid year"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
        )
    }

    #[test]
    fn test_times_between() {
        let times = times_between(window().start, window().end, 6);
        assert_eq!(times.len(), 40);
        assert_eq!(times[0], midnight_utc(window().start));
    }

    #[test]
    fn test_all_sources_are_successful() {
        let bounds = BoundingBox::from_tuple(regions::SMALL);
        let sources = all_sources(bounds, &window());
        assert_eq!(sources.len(), 5);
        assert!(sources.iter().all(|s| s.is_success()));
    }

    #[test]
    fn test_vegetation_brackets_window() {
        let bounds = BoundingBox::from_tuple(regions::SMALL);
        let raw = vegetation_result(bounds, &window(), 2, 2);
        let raster = raw.raster().unwrap();
        match &raster.payload {
            harmonize_common::SourcePayload::Inline(array) => {
                assert!(array.times[0] < midnight_utc(window().start));
                assert!(*array.times.last().unwrap() >= midnight_utc(window().end));
            }
            harmonize_common::SourcePayload::File(_) => panic!("expected inline payload"),
        }
    }
}
