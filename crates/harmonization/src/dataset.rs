//! Sources after temporal and spatial harmonization.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use grid_processor::UnifiedSpatialGrid;
use harmonize_common::{Granularity, HarmonizeError, Result, SourceArray, SourceId};

/// Every usable source on one grid and one time index.
///
/// Each stored array is `index.len() x grid.height x grid.width`. Sources
/// that could not be used carry a flag naming why.
#[derive(Debug, Clone)]
pub struct HarmonizedDataset {
    pub grid: UnifiedSpatialGrid,
    pub index: Vec<DateTime<Utc>>,
    pub granularity: Granularity,
    sources: BTreeMap<SourceId, SourceArray>,
    unavailable: BTreeMap<SourceId, String>,
}

impl HarmonizedDataset {
    pub fn new(
        grid: UnifiedSpatialGrid,
        index: Vec<DateTime<Utc>>,
        granularity: Granularity,
    ) -> Self {
        Self {
            grid,
            index,
            granularity,
            sources: BTreeMap::new(),
            unavailable: BTreeMap::new(),
        }
    }

    /// Add a harmonized source. Its shape must match the grid and index.
    pub fn insert(&mut self, source: SourceId, array: SourceArray) -> Result<()> {
        if array.width != self.grid.width
            || array.height != self.grid.height
            || array.times != self.index
        {
            return Err(HarmonizeError::harmonization(format!(
                "{} is {}x{} over {} timestamps, dataset is {}x{} over {}",
                source,
                array.height,
                array.width,
                array.num_times(),
                self.grid.height,
                self.grid.width,
                self.index.len()
            )));
        }
        array.validate()?;
        self.unavailable.remove(&source);
        self.sources.insert(source, array);
        Ok(())
    }

    /// Record that `source` contributes nothing, with a quality flag.
    pub fn mark_unavailable(&mut self, source: SourceId, flag: impl Into<String>) {
        self.sources.remove(&source);
        self.unavailable.insert(source, flag.into());
    }

    pub fn get(&self, source: SourceId) -> Option<&SourceArray> {
        self.sources.get(&source)
    }

    /// The full `[time][row][col]` buffer of one variable.
    pub fn variable(&self, source: SourceId, name: &str) -> Option<&[f32]> {
        self.sources
            .get(&source)?
            .variables
            .get(name)
            .map(Vec::as_slice)
    }

    /// One `[row][col]` frame of one variable.
    pub fn frame(&self, source: SourceId, name: &str, t: usize) -> Option<&[f32]> {
        self.sources.get(&source)?.frame(name, t)
    }

    pub fn is_available(&self, source: SourceId) -> bool {
        self.sources.contains_key(&source)
    }

    /// Why a source is missing, if it is.
    pub fn unavailable_flag(&self, source: SourceId) -> Option<&str> {
        if self.sources.contains_key(&source) {
            return None;
        }
        Some(
            self.unavailable
                .get(&source)
                .map(String::as_str)
                .unwrap_or("source_unavailable"),
        )
    }

    /// Sources without harmonized data, in canonical order.
    pub fn missing_sources(&self) -> Vec<SourceId> {
        SourceId::ALL
            .into_iter()
            .filter(|id| !self.sources.contains_key(id))
            .collect()
    }

    pub fn sources(&self) -> impl Iterator<Item = (&SourceId, &SourceArray)> {
        self.sources.iter()
    }

    pub fn frame_len(&self) -> usize {
        self.grid.num_cells()
    }

    pub fn num_times(&self) -> usize {
        self.index.len()
    }

    /// Position in the index used for "current" features.
    ///
    /// The last timestamp at or before `at`, or the first one when the whole
    /// index lies after it.
    pub fn index_position(&self, at: DateTime<Utc>) -> usize {
        self.index.partition_point(|t| *t <= at).saturating_sub(1)
    }

    /// Mutable access for in-place post-processing.
    pub fn sources_mut(&mut self) -> &mut BTreeMap<SourceId, SourceArray> {
        &mut self.sources
    }
}
