//! End-to-end harmonization against in-memory acquisition collaborators.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use harmonization::features::names;
use harmonization::{HarmonizerConfig, SourceClient, SourceClients, UnifiedDataHarmonizer};
use harmonize_common::{
    BoundingBox, DateRange, GeoTransform, HarmonizeError, HarmonizedDataResult, RawSourceResult,
    Resolution, SourceId, SourceOutcome, SourcePayload,
};
use storage::write_source_group;
use tempfile::TempDir;
use test_utils::{all_sources, regions};

const LOOKBACK: u32 = 6;

fn target() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
}

fn small() -> BoundingBox {
    BoundingBox::from_tuple(regions::SMALL)
}

/// Replays a fixed result and counts calls.
struct FixtureClient {
    result: RawSourceResult,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl SourceClient for FixtureClient {
    async fn download(
        &self,
        _start: NaiveDate,
        _end: NaiveDate,
        _bounds: &BoundingBox,
    ) -> anyhow::Result<RawSourceResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.clone())
    }
}

struct FailingClient;

#[async_trait]
impl SourceClient for FailingClient {
    async fn download(
        &self,
        _start: NaiveDate,
        _end: NaiveDate,
        _bounds: &BoundingBox,
    ) -> anyhow::Result<RawSourceResult> {
        anyhow::bail!("upstream returned HTTP 503")
    }
}

struct SlowClient;

#[async_trait]
impl SourceClient for SlowClient {
    async fn download(
        &self,
        _start: NaiveDate,
        _end: NaiveDate,
        _bounds: &BoundingBox,
    ) -> anyhow::Result<RawSourceResult> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        anyhow::bail!("unreachable")
    }
}

/// Fixture-backed clients; sources listed in `failing` raise instead.
fn clients(
    raws: Vec<RawSourceResult>,
    failing: &[SourceId],
    calls: &Arc<AtomicUsize>,
) -> SourceClients {
    let mut by_source: BTreeMap<SourceId, RawSourceResult> =
        raws.into_iter().map(|r| (r.source, r)).collect();
    SourceClients::from_fn(|id| {
        if failing.contains(&id) {
            return Arc::new(FailingClient) as Arc<dyn SourceClient>;
        }
        match by_source.remove(&id) {
            Some(result) => Arc::new(FixtureClient {
                result,
                calls: calls.clone(),
            }),
            None => Arc::new(FailingClient),
        }
    })
}

fn config(cache: &TempDir) -> HarmonizerConfig {
    HarmonizerConfig {
        cache_dir: cache.path().to_path_buf(),
        resolution: Resolution::Km5,
        ..HarmonizerConfig::default()
    }
}

fn fixtures() -> Vec<RawSourceResult> {
    all_sources(small(), &DateRange::lookback(target(), LOOKBACK))
}

async fn run(raws: Vec<RawSourceResult>, failing: &[SourceId]) -> HarmonizedDataResult {
    let cache = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let harmonizer =
        UnifiedDataHarmonizer::new(config(&cache), clients(raws, failing, &calls)).unwrap();
    harmonizer
        .get_harmonized_features(&small(), target(), LOOKBACK)
        .await
        .unwrap()
}

fn same_values(a: &[f32], b: &[f32]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| x == y || (x.is_nan() && y.is_nan()))
}

#[tokio::test]
async fn test_all_sources_harmonize_onto_one_grid() {
    let result = run(fixtures(), &[]).await;

    assert_eq!((result.metadata.width, result.metadata.height), (12, 12));
    // Both the target date and the day `LOOKBACK` days earlier are included
    assert_eq!(result.metadata.temporal_range, DateRange::lookback(target(), LOOKBACK));
    assert_eq!(result.metadata.temporal_range.num_days(), LOOKBACK as i64 + 1);
    assert_eq!(result.metadata.num_timestamps, 7);
    assert!(result.metadata.missing_sources.is_empty());
    assert_eq!(result.features.len(), 14);
    for (name, layer) in result.features.iter() {
        assert_eq!(layer.shape(), (12, 12), "{}", name);
        assert_eq!(layer.valid_count(), 144, "{} has gaps", name);
    }

    let suitability = result.features.get(names::TEMPERATURE_SUITABILITY).unwrap();
    assert!(suitability.data.iter().all(|v| (0.0..=1.0).contains(v)));
    assert!(result.quality.consistency.consistent);
    assert!(result.quality.overall_score > 0.9);
}

#[tokio::test]
async fn test_second_request_is_served_from_cache() {
    let cache = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let harmonizer =
        UnifiedDataHarmonizer::new(config(&cache), clients(fixtures(), &[], &calls)).unwrap();

    let first = harmonizer
        .get_harmonized_features(&small(), target(), LOOKBACK)
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 5);

    // Float noise below the key precision still hits
    let nudged = BoundingBox::new(36.500_000_01, -1.5, 37.0, -1.000_000_02);
    let second = harmonizer
        .get_harmonized_features(&nudged, target(), LOOKBACK)
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 5);

    assert_eq!(first.features.names(), second.features.names());
    for (name, layer) in first.features.iter() {
        let cached = second.features.get(name).unwrap();
        assert!(same_values(&layer.data, &cached.data), "{} differs", name);
    }
    assert!((first.quality.overall_score - second.quality.overall_score).abs() < 1e-12);
    assert_eq!(first.quality.category, second.quality.category);
    assert_eq!(first.metadata.feature_names, second.metadata.feature_names);

    let snapshot = harmonizer.metrics().snapshot();
    assert_eq!(snapshot.requests, 2);
    assert_eq!(snapshot.cache_hits, 1);
    assert_eq!(snapshot.cache_misses, 1);
}

#[tokio::test]
async fn test_failed_precipitation_degrades_quality() {
    let complete = run(fixtures(), &[]).await;
    let degraded = run(fixtures(), &[SourceId::Precipitation]).await;

    assert_eq!(degraded.quality.missing_sources, vec![SourceId::Precipitation]);
    assert_eq!(degraded.metadata.missing_sources, vec![SourceId::Precipitation]);
    assert!(degraded.quality.overall_score < complete.quality.overall_score);
    assert_eq!(degraded.features.names(), complete.features.names());

    for name in [names::PRECIPITATION_DAILY, names::PRECIPITATION_TOTAL] {
        assert_eq!(degraded.features.get(name).unwrap().valid_count(), 0, "{}", name);
    }
    let quality = &degraded.quality.source_quality[&SourceId::Precipitation];
    assert_eq!(quality.score, 0.0);
    assert_eq!(quality.flags, vec!["download_failed".to_string()]);
}

#[tokio::test]
async fn test_timed_out_source_is_unavailable() {
    let cache = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut clients = clients(fixtures(), &[], &calls);
    clients.vegetation = Arc::new(SlowClient);
    let config = HarmonizerConfig {
        source_timeout_secs: 1,
        cache_enabled: false,
        ..config(&cache)
    };

    let harmonizer = UnifiedDataHarmonizer::new(config, clients).unwrap();
    let result = harmonizer
        .get_harmonized_features(&small(), target(), LOOKBACK)
        .await
        .unwrap();

    assert_eq!(result.quality.missing_sources, vec![SourceId::Vegetation]);
    assert_eq!(
        result.quality.source_quality[&SourceId::Vegetation].flags,
        vec!["timeout".to_string()]
    );
    assert_eq!(result.features.get(names::NDVI_CURRENT).unwrap().valid_count(), 0);
    assert!(result.features.get(names::LST_DAY).is_none());
}

#[tokio::test]
async fn test_invalid_requests_fail_before_download() {
    let cache = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let harmonizer =
        UnifiedDataHarmonizer::new(config(&cache), clients(fixtures(), &[], &calls)).unwrap();

    let inverted = BoundingBox::from_tuple(regions::INVALID);
    let err = harmonizer
        .get_harmonized_features(&inverted, target(), LOOKBACK)
        .await
        .unwrap_err();
    assert!(matches!(err, HarmonizeError::Configuration(_)));

    let err = harmonizer
        .get_harmonized_features(&small(), target(), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, HarmonizeError::Configuration(_)));

    let err = harmonizer
        .get_harmonized_features(&small(), target(), 400)
        .await
        .unwrap_err();
    assert!(matches!(err, HarmonizeError::Configuration(_)));

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(harmonizer.metrics().snapshot().errors, 3);
}

#[test]
fn test_region_validation() {
    let cache = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let harmonizer =
        UnifiedDataHarmonizer::new(config(&cache), clients(Vec::new(), &[], &calls)).unwrap();

    assert!(!harmonizer.validate_region_bounds(&BoundingBox::from_tuple(regions::INVALID)));
    assert!(harmonizer.validate_region_bounds(&BoundingBox::from_tuple(regions::EQUATORIAL)));
    assert!(!harmonizer.validate_region_bounds(&BoundingBox::from_tuple(regions::CONTINENTAL)));
    assert!(!harmonizer.validate_region_bounds(&BoundingBox::new(170.0, 0.0, 185.0, 5.0)));
    assert!(!harmonizer.validate_region_bounds(&BoundingBox::new(0.0, 5.0, 10.0, 5.0)));
}

#[tokio::test]
async fn test_every_source_failing_is_an_error() {
    let cache = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let harmonizer =
        UnifiedDataHarmonizer::new(config(&cache), clients(Vec::new(), &[], &calls)).unwrap();

    let err = harmonizer
        .get_harmonized_features(&small(), target(), LOOKBACK)
        .await
        .unwrap_err();
    assert!(matches!(err, HarmonizeError::Harmonization(_)));
}

#[tokio::test]
async fn test_invalid_transform_is_flagged_not_fatal() {
    let mut raws = fixtures();
    for raw in &mut raws {
        if raw.source == SourceId::Vegetation {
            if let SourceOutcome::Success(raster) = &mut raw.outcome {
                let rotated = [36.5, 0.04, 0.01, -1.0, 0.0, -0.04];
                raster.transform = Some(GeoTransform::from_gdal(rotated));
            }
        }
    }
    let result = run(raws, &[]).await;

    assert_eq!(result.quality.missing_sources, vec![SourceId::Vegetation]);
    assert_eq!(
        result.quality.source_quality[&SourceId::Vegetation].flags,
        vec!["invalid_transform".to_string()]
    );
}

#[tokio::test]
async fn test_file_payload_is_resolved() {
    let scratch = TempDir::new().unwrap();
    let mut raws = fixtures();
    for raw in &mut raws {
        if raw.source != SourceId::Population {
            continue;
        }
        if let SourceOutcome::Success(raster) = &mut raw.outcome {
            let path = scratch.path().join("population.zarr");
            if let SourcePayload::Inline(array) = &raster.payload {
                write_source_group(&path, array).unwrap();
            }
            raster.payload = SourcePayload::File(path);
        }
    }
    let result = run(raws, &[]).await;

    assert!(result.quality.missing_sources.is_empty());
    let density = result.features.get(names::POPULATION_DENSITY).unwrap();
    assert_eq!(density.valid_count(), 144);
}

#[tokio::test]
async fn test_unreadable_file_payload_marks_source_missing() {
    let mut raws = fixtures();
    for raw in &mut raws {
        if raw.source == SourceId::Epidemiology {
            if let SourceOutcome::Success(raster) = &mut raw.outcome {
                raster.payload = SourcePayload::File("/nonexistent/prevalence.zarr".into());
            }
        }
    }
    let result = run(raws, &[]).await;

    assert_eq!(result.quality.missing_sources, vec![SourceId::Epidemiology]);
    assert_eq!(
        result.quality.source_quality[&SourceId::Epidemiology].flags,
        vec!["unreadable_payload".to_string()]
    );
}
