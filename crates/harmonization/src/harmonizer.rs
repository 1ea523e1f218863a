//! The harmonization entry point.
//!
//! [`UnifiedDataHarmonizer`] validates a request, answers it from the cache
//! when it can, and otherwise downloads all five sources concurrently and
//! runs them through the temporal, spatial, feature and quality stages.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use grid_processor::{SourceGeoref, SpatialHarmonizer};
use harmonize_common::{
    BoundingBox, DateRange, HarmonizeError, HarmonizedDataResult, RawSourceResult, Result,
    ResultMetadata, SourceArray, SourceId, SourceOutcome, SourcePayload, TimeExtent,
};
use storage::{read_source_group, CacheManager};
use tracing::{debug, info, instrument, warn};

use crate::clients::SourceClients;
use crate::config::HarmonizerConfig;
use crate::dataset::HarmonizedDataset;
use crate::features::FeatureEngineer;
use crate::metrics::HarmonizeMetrics;
use crate::quality::QualityManager;
use crate::temporal::TemporalHarmonizer;

/// Why a source contributes nothing to a request.
#[derive(Debug)]
struct Unavailable {
    /// Quality flag recorded for the source
    flag: &'static str,
    reason: String,
}

impl Unavailable {
    fn new(flag: &'static str, reason: impl Into<String>) -> Self {
        Self {
            flag,
            reason: reason.into(),
        }
    }
}

type Downloaded = std::result::Result<RawSourceResult, Unavailable>;

/// A source ready for harmonization, still on its native grid.
struct NativeSource {
    array: SourceArray,
    georef: SourceGeoref,
}

/// Orchestrates one harmonization request end to end.
pub struct UnifiedDataHarmonizer {
    config: HarmonizerConfig,
    clients: SourceClients,
    temporal: TemporalHarmonizer,
    spatial: SpatialHarmonizer,
    features: FeatureEngineer,
    quality: QualityManager,
    cache: CacheManager,
    metrics: Arc<HarmonizeMetrics>,
}

impl UnifiedDataHarmonizer {
    /// Create a harmonizer. Fails on an invalid configuration.
    pub fn new(config: HarmonizerConfig, clients: SourceClients) -> Result<Self> {
        config.validate().map_err(HarmonizeError::configuration)?;

        let cache = if config.cache_enabled {
            CacheManager::new(config.cache_dir.clone())
        } else {
            CacheManager::disabled(config.cache_dir.clone())
        };

        Ok(Self {
            spatial: SpatialHarmonizer::new(config.spatial_config()),
            temporal: TemporalHarmonizer::new(),
            features: FeatureEngineer::new(),
            quality: QualityManager::new(),
            metrics: Arc::new(HarmonizeMetrics::new()),
            cache,
            clients,
            config,
        })
    }

    pub fn config(&self) -> &HarmonizerConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn metrics(&self) -> Arc<HarmonizeMetrics> {
        self.metrics.clone()
    }

    /// Whether a region may be requested.
    ///
    /// Rejects inverted or non-finite bounds, bounds outside the world and
    /// regions larger than the configured area cap.
    pub fn validate_region_bounds(&self, bounds: &BoundingBox) -> bool {
        bounds.is_well_formed()
            && bounds.within_world()
            && bounds.area_deg2() <= self.config.max_region_area_deg2
    }

    /// Harmonized model features for `bounds` over the window from
    /// `lookback_days` days before `target_date` through `target_date`,
    /// both ends included, so `lookback_days + 1` calendar days.
    ///
    /// Only configuration and harmonization failures are returned as
    /// errors. Unavailable sources and cache problems are reflected in the
    /// result's quality assessment.
    #[instrument(
        skip(self, bounds),
        fields(west = bounds.west, south = bounds.south, east = bounds.east, north = bounds.north)
    )]
    pub async fn get_harmonized_features(
        &self,
        bounds: &BoundingBox,
        target_date: NaiveDate,
        lookback_days: u32,
    ) -> Result<HarmonizedDataResult> {
        let started = Instant::now();
        self.metrics.record_request();

        let outcome = self.harmonize(bounds, target_date, lookback_days).await;

        self.metrics.record_duration(started.elapsed());
        match &outcome {
            Ok(result) => info!(
                features = result.features.len(),
                score = result.quality.overall_score,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Harmonization complete"
            ),
            Err(e) => {
                self.metrics.record_error();
                warn!(error = %e, "Harmonization failed");
            }
        }
        outcome
    }

    async fn harmonize(
        &self,
        bounds: &BoundingBox,
        target_date: NaiveDate,
        lookback_days: u32,
    ) -> Result<HarmonizedDataResult> {
        if lookback_days == 0 || lookback_days > self.config.max_lookback_days {
            return Err(HarmonizeError::configuration(format!(
                "lookback_days must be within 1..={}, got {}",
                self.config.max_lookback_days, lookback_days
            )));
        }
        if !self.validate_region_bounds(bounds) {
            return Err(HarmonizeError::configuration(format!(
                "invalid region bounds ({}, {}, {}, {}), area cap {} deg²",
                bounds.west,
                bounds.south,
                bounds.east,
                bounds.north,
                self.config.max_region_area_deg2
            )));
        }

        let range = DateRange::lookback(target_date, lookback_days);
        let resolution = self.config.resolution;
        let granularity = self.config.granularity;

        if let Some(cached) = self
            .cache
            .get_cached_harmonized_data(bounds, &range, resolution, granularity)
            .await
        {
            self.metrics.record_cache_hit();
            info!(range = %range, resolution = %resolution, "Serving harmonized result from cache");
            return Ok(cached);
        }
        self.metrics.record_cache_miss();

        // Acquisition: the only suspension point besides the cache
        let mut native = BTreeMap::new();
        let mut unavailable = BTreeMap::new();
        for (source, downloaded) in self.download_all(bounds, &range).await {
            let resolved = match downloaded {
                Ok(raw) => self.resolve(raw).await,
                Err(gap) => Err(gap),
            };
            match resolved {
                Ok(ready) => {
                    native.insert(source, ready);
                }
                Err(gap) => {
                    let err = HarmonizeError::source_unavailable(source, gap.reason);
                    warn!(flag = gap.flag, error = %err, "Continuing without source");
                    self.metrics.record_source_failure(source);
                    unavailable.insert(source, gap.flag.to_string());
                }
            }
        }
        if native.is_empty() {
            return Err(HarmonizeError::harmonization(
                "no acquisition collaborator delivered usable data",
            ));
        }

        // Temporal stage, on native grids
        let window = range.to_extent();
        let mut extents = vec![window];
        extents.extend(native.iter().filter_map(|(source, n)| {
            if !source.cadence().is_time_varying() {
                return None;
            }
            TimeExtent::of(&n.array.times).and_then(|e| e.intersection(&window))
        }));
        let index = self
            .temporal
            .create_unified_temporal_index(&extents, granularity)?;

        let mut on_index: BTreeMap<SourceId, SourceArray> = native
            .iter()
            .map(|(source, n)| {
                let array = self
                    .temporal
                    .harmonize_source(*source, &n.array, &index, granularity);
                (*source, array)
            })
            .collect();
        self.temporal.fill_temporal_gaps(&mut on_index);

        // Spatial stage
        let source_bounds: Vec<BoundingBox> = native.values().map(|n| n.georef.bounds).collect();
        let grid = self.spatial.create_target_grid(&source_bounds, resolution)?;
        let mut dataset = HarmonizedDataset::new(grid, index, granularity);
        for (source, flag) in unavailable {
            dataset.mark_unavailable(source, flag);
        }
        for (source, array) in on_index {
            let georef = &native[&source].georef;
            match self.spatial.harmonize_stack(&array, georef, &dataset.grid) {
                Ok(on_grid) => dataset.insert(source, on_grid)?,
                Err(skip) => {
                    warn!(source = %source, reason = %skip, "Source skipped on target grid");
                    self.metrics.record_source_failure(source);
                    dataset.mark_unavailable(source, skip.flag());
                }
            }
        }
        if dataset.sources().next().is_none() {
            return Err(HarmonizeError::harmonization(
                "no source could be placed on the target grid",
            ));
        }
        debug!(
            width = dataset.grid.width,
            height = dataset.grid.height,
            steps = dataset.num_times(),
            sources = dataset.sources().count(),
            "Sources harmonized"
        );

        // Features and quality
        let features = self.features.generate_ml_features(&dataset, target_date)?;
        let quality = self.quality.assess_harmonized_quality(&dataset);
        let metadata = ResultMetadata {
            bounds: dataset.grid.bounds,
            temporal_range: range,
            resolution,
            granularity,
            feature_names: features.names(),
            created_at: Utc::now(),
            missing_sources: quality.missing_sources.clone(),
            width: dataset.grid.width,
            height: dataset.grid.height,
            transform: dataset.grid.transform,
            num_timestamps: dataset.num_times(),
        };
        let result = HarmonizedDataResult {
            features,
            quality,
            metadata,
        };

        self.cache
            .cache_harmonized_data(&result, bounds, &range, resolution, granularity)
            .await;
        Ok(result)
    }

    /// Run all five downloads concurrently, each under its own timeout.
    async fn download_all(
        &self,
        bounds: &BoundingBox,
        range: &DateRange,
    ) -> [(SourceId, Downloaded); 5] {
        let (climate, precipitation, vegetation, epidemiology, population) = tokio::join!(
            self.download(SourceId::Climate, bounds, range),
            self.download(SourceId::Precipitation, bounds, range),
            self.download(SourceId::Vegetation, bounds, range),
            self.download(SourceId::Epidemiology, bounds, range),
            self.download(SourceId::Population, bounds, range),
        );
        [
            (SourceId::Climate, climate),
            (SourceId::Precipitation, precipitation),
            (SourceId::Vegetation, vegetation),
            (SourceId::Epidemiology, epidemiology),
            (SourceId::Population, population),
        ]
    }

    async fn download(
        &self,
        source: SourceId,
        bounds: &BoundingBox,
        range: &DateRange,
    ) -> Downloaded {
        let secs = self.config.source_timeout_secs;
        let client = self.clients.get(source);
        let request = client.download(range.start, range.end, bounds);

        match tokio::time::timeout(Duration::from_secs(secs), request).await {
            Ok(Ok(raw)) if raw.source == source => Ok(raw),
            Ok(Ok(raw)) => Err(Unavailable::new(
                "download_failed",
                format!("collaborator returned data for {}", raw.source),
            )),
            Ok(Err(e)) => Err(Unavailable::new("download_failed", format!("{:#}", e))),
            Err(_) => Err(Unavailable::new(
                "timeout",
                format!("timed out after {}s", secs),
            )),
        }
    }

    /// Turn a raw result into an in-memory stack with its georeference.
    async fn resolve(&self, raw: RawSourceResult) -> std::result::Result<NativeSource, Unavailable> {
        let raster = match raw.outcome {
            SourceOutcome::Success(raster) => raster,
            SourceOutcome::Failure { error } => {
                return Err(Unavailable::new("download_failed", error));
            }
        };

        let georef = SourceGeoref::from_raster(&raster);
        let array = match raster.payload {
            SourcePayload::Inline(array) => array,
            SourcePayload::File(path) => {
                let task_path = path.clone();
                tokio::task::spawn_blocking(move || read_source_group(&task_path))
                    .await
                    .map_err(|e| Unavailable::new("unreadable_payload", e.to_string()))?
                    .map_err(|e| {
                        Unavailable::new(
                            "unreadable_payload",
                            format!("{}: {}", path.display(), e),
                        )
                    })?
            }
        };

        array
            .validate()
            .map_err(|e| Unavailable::new("invalid_payload", e.to_string()))?;
        if array.num_times() == 0 || array.variables.is_empty() {
            return Err(Unavailable::new("empty_payload", "no timestamps or variables"));
        }
        Ok(NativeSource { array, georef })
    }
}
