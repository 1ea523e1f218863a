//! The externally consumed result of one harmonization request.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::error::{HarmonizeError, Result};
use crate::grid::{GeoTransform, Grid2D, Resolution};
use crate::source::SourceId;
use crate::time::{DateRange, Granularity};

/// Named 2-D feature arrays sharing one grid shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    width: usize,
    height: usize,
    features: BTreeMap<String, Grid2D>,
}

impl FeatureSet {
    /// An empty feature set for a `width` x `height` grid.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            features: BTreeMap::new(),
        }
    }

    /// Insert or replace a feature. Rejects arrays of a different shape.
    pub fn insert(&mut self, name: impl Into<String>, grid: Grid2D) -> Result<()> {
        let name = name.into();
        if grid.shape() != self.shape() || grid.data.len() != self.width * self.height {
            return Err(HarmonizeError::harmonization(format!(
                "feature '{}' has shape {:?}, expected {:?}",
                name,
                grid.shape(),
                self.shape()
            )));
        }
        self.features.insert(name, grid);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Grid2D> {
        self.features.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.features.contains_key(name)
    }

    /// Feature names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.features.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Grid2D)> {
        self.features.iter()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Shape as `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }
}

/// Quality of one harmonized source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceQuality {
    /// Score in [0, 1].
    pub score: f64,
    /// Named problems found, e.g. `high_missing_data`.
    pub flags: Vec<String>,
    /// Supporting figures (missing fraction, outlier fraction, ...).
    pub details: BTreeMap<String, f64>,
}

impl SourceQuality {
    /// Quality entry for a source that never reached harmonization.
    pub fn unavailable(flag: impl Into<String>) -> Self {
        let mut details = BTreeMap::new();
        details.insert("missing_fraction".to_string(), 1.0);
        Self {
            score: 0.0,
            flags: vec![flag.into()],
            details,
        }
    }
}

/// Outcome of one pairwise sanity check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyCheck {
    pub name: String,
    pub passed: bool,
    /// Share of the checked values that are present and satisfy the check.
    /// Missing values count against it.
    #[serde(default)]
    pub support: f64,
    pub detail: String,
}

/// All cross-source checks and their conjunction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub consistent: bool,
    pub checks: Vec<ConsistencyCheck>,
}

impl ConsistencyReport {
    pub fn from_checks(checks: Vec<ConsistencyCheck>) -> Self {
        Self {
            consistent: checks.iter().all(|c| c.passed),
            checks,
        }
    }

    /// Mean support over all checks; 1.0 when no check ran.
    pub fn support(&self) -> f64 {
        if self.checks.is_empty() {
            return 1.0;
        }
        self.checks.iter().map(|c| c.support).sum::<f64>() / self.checks.len() as f64
    }
}

/// Present/total pixel ratios per source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessReport {
    pub per_source: BTreeMap<SourceId, f64>,
    /// Mean of `per_source`.
    pub overall: f64,
    /// Sources with no missing pixel at all.
    pub complete_sources: usize,
}

/// Coarse bucket of the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityCategory {
    High,
    Medium,
    Low,
}

impl QualityCategory {
    /// "high" at >= 0.8, "medium" at >= 0.5, "low" otherwise.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::High
        } else if score >= 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Confidence signal attached to every result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub source_quality: BTreeMap<SourceId, SourceQuality>,
    pub consistency: ConsistencyReport,
    pub completeness: CompletenessReport,
    pub overall_score: f64,
    pub category: QualityCategory,
    pub missing_sources: Vec<SourceId>,
}

/// Descriptive metadata of a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub bounds: BoundingBox,
    pub temporal_range: DateRange,
    pub resolution: Resolution,
    pub granularity: Granularity,
    pub feature_names: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub missing_sources: Vec<SourceId>,
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub num_timestamps: usize,
}

/// Feature set, quality assessment and metadata of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmonizedDataResult {
    pub features: FeatureSet,
    pub quality: QualityAssessment,
    pub metadata: ResultMetadata,
}
