//! Filesystem cache of complete harmonized results.
//!
//! Each entry is one Zarr V3 group named `<key>.zarr` under the cache
//! directory. The root group carries the scalar attributes `created`,
//! `date_range_start`, `date_range_end` and `resolution`, plus the quality
//! assessment and result metadata as JSON. Every feature is a float32 array
//! of shape `[rows, cols]`.
//!
//! Writes land in a hidden temporary directory first and are renamed into
//! place, so readers never observe a half-written entry. Every failure is
//! logged and absorbed: a broken entry reads as a miss, a failed write
//! leaves the request uncached.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use harmonize_common::{
    BoundingBox, DateRange, FeatureSet, Granularity, Grid2D, HarmonizeError,
    HarmonizedDataResult, QualityAssessment, Resolution, Result, ResultMetadata,
};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::zarr_io::{
    attr_str, open_store, read_f32_array, read_root_attributes, write_f32_array, write_root_group,
};

/// Fixed time-to-live of a cache entry.
pub const CACHE_TTL_HOURS: i64 = 24;

/// Decimal places kept from each bound when building a key (~11 m).
const KEY_DECIMALS: i32 = 4;

const ENTRY_SUFFIX: &str = ".zarr";
const TMP_MARKER: &str = ".tmp-";

/// Deterministic key for a request.
///
/// Bounds are rounded to four decimals so float noise in the caller's
/// coordinates still maps to the same entry. The temporal granularity is
/// part of the key because it changes the unified index and every
/// window statistic derived from it.
pub fn generate_cache_key(
    bounds: &BoundingBox,
    date_range: &DateRange,
    resolution: Resolution,
    granularity: Granularity,
) -> String {
    let [west, south, east, north] = bounds.rounded(KEY_DECIMALS);
    format!(
        "harmonized_{:.4}_{:.4}_{:.4}_{:.4}_{}_{}_{}_{}",
        west,
        south,
        east,
        north,
        date_range.start,
        date_range.end,
        resolution.as_str(),
        granularity.as_str()
    )
}

/// Scalar header of a persisted entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub created: DateTime<Utc>,
    pub date_range: DateRange,
    pub resolution: Resolution,
}

impl CacheEntry {
    /// Whether the entry may answer a request for `requested` at `now`.
    ///
    /// Requires an exact date-range match and an age below the TTL.
    pub fn is_valid_at(&self, requested: &DateRange, now: DateTime<Utc>) -> bool {
        self.date_range == *requested && now - self.created < Duration::hours(CACHE_TTL_HOURS)
    }
}

/// Hit/miss counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub write_failures: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
}

/// Zarr-backed result cache.
#[derive(Debug, Clone)]
pub struct CacheManager {
    cache_dir: PathBuf,
    enabled: bool,
    counters: Arc<Counters>,
}

impl CacheManager {
    /// A cache rooted at `cache_dir`. The directory is created lazily.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            enabled: true,
            counters: Arc::new(Counters::default()),
        }
    }

    /// A cache that never stores and always misses.
    pub fn disabled(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            enabled: false,
            ..Self::new(cache_dir)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            write_failures: self.counters.write_failures.load(Ordering::Relaxed),
        }
    }

    /// Key for a request. See [`generate_cache_key`].
    pub fn generate_cache_key(
        &self,
        bounds: &BoundingBox,
        date_range: &DateRange,
        resolution: Resolution,
        granularity: Granularity,
    ) -> String {
        generate_cache_key(bounds, date_range, resolution, granularity)
    }

    /// Directory holding the entry for `key`.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}{}", key, ENTRY_SUFFIX))
    }

    /// Validity of `entry` for `requested` right now.
    pub fn is_cache_valid(&self, entry: &CacheEntry, requested: &DateRange) -> bool {
        entry.is_valid_at(requested, Utc::now())
    }

    /// Persist `result`, replacing any entry under the same key.
    ///
    /// Returns whether the entry was committed. Failures are logged, never
    /// returned.
    #[instrument(skip(self, result), fields(features = result.features.len()))]
    pub async fn cache_harmonized_data(
        &self,
        result: &HarmonizedDataResult,
        bounds: &BoundingBox,
        date_range: &DateRange,
        resolution: Resolution,
        granularity: Granularity,
    ) -> bool {
        if !self.enabled {
            return false;
        }

        let key = generate_cache_key(bounds, date_range, resolution, granularity);
        let cache_dir = self.cache_dir.clone();
        let result = result.clone();
        let range = *date_range;
        let task_key = key.clone();

        let outcome = tokio::task::spawn_blocking(move || {
            write_entry(&cache_dir, &task_key, &result, &range, resolution, Utc::now())
        })
        .await
        .map_err(|e| HarmonizeError::cache(format!("cache write task failed: {}", e)))
        .and_then(|r| r);

        match outcome {
            Ok(()) => {
                self.counters.writes.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cached harmonized result");
                true
            }
            Err(e) => {
                self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Failed to cache harmonized result");
                false
            }
        }
    }

    /// The cached result for a request, if a valid entry exists.
    ///
    /// Expired, mismatched or unreadable entries are all reported as `None`.
    #[instrument(skip(self))]
    pub async fn get_cached_harmonized_data(
        &self,
        bounds: &BoundingBox,
        date_range: &DateRange,
        resolution: Resolution,
        granularity: Granularity,
    ) -> Option<HarmonizedDataResult> {
        if !self.enabled {
            return None;
        }

        let key = generate_cache_key(bounds, date_range, resolution, granularity);
        let path = self.entry_path(&key);
        let requested = *date_range;

        let outcome = tokio::task::spawn_blocking(move || {
            read_entry(&path, &requested, Utc::now())
        })
        .await
        .map_err(|e| HarmonizeError::cache(format!("cache read task failed: {}", e)))
        .and_then(|r| r);

        match outcome {
            Ok(Some(result)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache hit");
                Some(result)
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache miss");
                None
            }
            Err(e) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Unreadable cache entry treated as miss");
                None
            }
        }
    }

    /// Header of the entry stored under `key`, if any.
    pub async fn entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(key);
        tokio::task::spawn_blocking(move || {
            if !path.is_dir() {
                return Ok(None);
            }
            read_entry_header(&path).map(|(entry, _)| Some(entry))
        })
        .await
        .map_err(|e| HarmonizeError::cache(format!("cache read task failed: {}", e)))?
    }

    /// Remove the entry stored under `key`. Returns whether one existed.
    pub async fn invalidate(&self, key: &str) -> Result<bool> {
        let path = self.entry_path(key);
        let removed = tokio::task::spawn_blocking(move || -> Result<bool> {
            if !path.exists() {
                return Ok(false);
            }
            std::fs::remove_dir_all(&path)?;
            Ok(true)
        })
        .await
        .map_err(|e| HarmonizeError::cache(format!("cache invalidate task failed: {}", e)))??;

        if removed {
            info!(key = %key, "Invalidated cache entry");
        }
        Ok(removed)
    }

    /// Delete expired, corrupt and abandoned temporary entries.
    ///
    /// Returns the number of directories removed.
    pub async fn purge_expired(&self) -> Result<usize> {
        let cache_dir = self.cache_dir.clone();
        let removed = tokio::task::spawn_blocking(move || purge_dir(&cache_dir, Utc::now()))
            .await
            .map_err(|e| HarmonizeError::cache(format!("cache purge task failed: {}", e)))??;

        if removed > 0 {
            info!(removed, "Purged expired cache entries");
        }
        Ok(removed)
    }
}

fn write_entry(
    cache_dir: &Path,
    key: &str,
    result: &HarmonizedDataResult,
    date_range: &DateRange,
    resolution: Resolution,
    created: DateTime<Utc>,
) -> Result<()> {
    std::fs::create_dir_all(cache_dir)?;

    let tmp = cache_dir.join(format!(".{}{}{}", key, TMP_MARKER, uuid::Uuid::new_v4()));
    let written = write_entry_contents(&tmp, result, date_range, resolution, created)
        .and_then(|()| commit(&tmp, &cache_dir.join(format!("{}{}", key, ENTRY_SUFFIX))));

    if written.is_err() && tmp.exists() {
        let _ = std::fs::remove_dir_all(&tmp);
    }
    written
}

fn write_entry_contents(
    dir: &Path,
    result: &HarmonizedDataResult,
    date_range: &DateRange,
    resolution: Resolution,
    created: DateTime<Utc>,
) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let store = open_store(dir)?;

    let mut attrs = serde_json::Map::new();
    attrs.insert("created".to_string(), json!(created.to_rfc3339()));
    attrs.insert(
        "date_range_start".to_string(),
        json!(date_range.start.format("%Y-%m-%d").to_string()),
    );
    attrs.insert(
        "date_range_end".to_string(),
        json!(date_range.end.format("%Y-%m-%d").to_string()),
    );
    attrs.insert("resolution".to_string(), json!(resolution.as_str()));
    attrs.insert("feature_names".to_string(), json!(result.features.names()));
    attrs.insert("metadata".to_string(), serde_json::to_value(&result.metadata)?);
    attrs.insert("quality".to_string(), serde_json::to_value(&result.quality)?);
    write_root_group(&store, attrs)?;

    let shape = [result.features.height() as u64, result.features.width() as u64];
    for (name, grid) in result.features.iter() {
        write_f32_array(&store, name, &shape, &grid.data)?;
    }
    Ok(())
}

/// Move a finished temporary entry into place. Last writer wins.
fn commit(tmp: &Path, target: &Path) -> Result<()> {
    if target.exists() {
        std::fs::remove_dir_all(target)?;
    }
    std::fs::rename(tmp, target)?;
    Ok(())
}

fn parse_date(attrs: &serde_json::Map<String, serde_json::Value>, key: &str) -> Result<NaiveDate> {
    let s = attr_str(attrs, key)?;
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| HarmonizeError::cache(format!("invalid {} '{}': {}", key, s, e)))
}

fn read_entry_header(
    path: &Path,
) -> Result<(CacheEntry, serde_json::Map<String, serde_json::Value>)> {
    let store = open_store(path)?;
    let attrs = read_root_attributes(&store)?;

    let created_str = attr_str(&attrs, "created")?;
    let created = DateTime::parse_from_rfc3339(created_str)
        .map_err(|e| HarmonizeError::cache(format!("invalid created '{}': {}", created_str, e)))?
        .with_timezone(&Utc);
    let date_range = DateRange::new(
        parse_date(&attrs, "date_range_start")?,
        parse_date(&attrs, "date_range_end")?,
    );
    let resolution: Resolution = attr_str(&attrs, "resolution")?
        .parse()
        .map_err(|e: HarmonizeError| HarmonizeError::cache(e.to_string()))?;

    let key = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.trim_end_matches(ENTRY_SUFFIX).to_string())
        .unwrap_or_default();

    Ok((
        CacheEntry {
            key,
            created,
            date_range,
            resolution,
        },
        attrs,
    ))
}

fn read_entry(
    path: &Path,
    requested: &DateRange,
    now: DateTime<Utc>,
) -> Result<Option<HarmonizedDataResult>> {
    if !path.is_dir() {
        return Ok(None);
    }

    let (entry, attrs) = read_entry_header(path)?;
    if !entry.is_valid_at(requested, now) {
        debug!(key = %entry.key, created = %entry.created, "Cache entry stale or for another range");
        return Ok(None);
    }

    let metadata: ResultMetadata = serde_json::from_value(
        attrs
            .get("metadata")
            .cloned()
            .ok_or_else(|| HarmonizeError::cache("missing metadata attribute"))?,
    )?;
    let quality: QualityAssessment = serde_json::from_value(
        attrs
            .get("quality")
            .cloned()
            .ok_or_else(|| HarmonizeError::cache("missing quality attribute"))?,
    )?;

    let store = open_store(path)?;
    let mut features = FeatureSet::new(metadata.width, metadata.height);
    for name in &metadata.feature_names {
        let (shape, data) = read_f32_array(&store, name)?;
        let grid = match shape.as_slice() {
            [rows, cols] => Grid2D::new(*cols as usize, *rows as usize, data),
            _ => None,
        }
        .ok_or_else(|| {
            HarmonizeError::cache(format!("feature '{}' has shape {:?}", name, shape))
        })?;
        features
            .insert(name.clone(), grid)
            .map_err(|e| HarmonizeError::cache(e.to_string()))?;
    }

    Ok(Some(HarmonizedDataResult {
        features,
        quality,
        metadata,
    }))
}

fn purge_dir(cache_dir: &Path, now: DateTime<Utc>) -> Result<usize> {
    if !cache_dir.is_dir() {
        return Ok(0);
    }

    let mut removed = 0;
    for dir_entry in std::fs::read_dir(cache_dir)? {
        let dir_entry = dir_entry?;
        let path = dir_entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = dir_entry.file_name().to_string_lossy().into_owned();

        let expired = if name.contains(TMP_MARKER) {
            // Abandoned writes; live ones are younger than the TTL.
            dir_entry
                .metadata()
                .and_then(|m| m.modified())
                .map(|t| {
                    let modified: DateTime<Utc> = t.into();
                    now - modified >= Duration::hours(CACHE_TTL_HOURS)
                })
                .unwrap_or(false)
        } else if name.ends_with(ENTRY_SUFFIX) {
            match read_entry_header(&path) {
                Ok((entry, _)) => now - entry.created >= Duration::hours(CACHE_TTL_HOURS),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Removing corrupt cache entry");
                    true
                }
            }
        } else {
            false
        };

        if expired {
            std::fs::remove_dir_all(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}
