//! JSON summary printed after a run.

use std::collections::BTreeMap;

use harmonize_common::{DateRange, HarmonizedDataResult, QualityCategory, Resolution, SourceId};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub temporal_range: DateRange,
    pub resolution: Resolution,
    /// `[rows, cols]`
    pub shape: [usize; 2],
    pub num_timestamps: usize,
    pub features: BTreeMap<String, FeatureSummary>,
    pub quality: QualitySummary,
}

#[derive(Debug, Serialize)]
pub struct FeatureSummary {
    pub valid_fraction: f64,
    pub min: Option<f32>,
    pub max: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct QualitySummary {
    pub overall_score: f64,
    pub category: QualityCategory,
    pub consistent: bool,
    pub completeness: f64,
    pub missing_sources: Vec<SourceId>,
    pub source_scores: BTreeMap<SourceId, f64>,
    pub flags: BTreeMap<SourceId, Vec<String>>,
}

impl RunSummary {
    pub fn from_result(result: &HarmonizedDataResult) -> Self {
        let features = result
            .features
            .iter()
            .map(|(name, layer)| {
                let valid = layer.data.iter().copied().filter(|v| v.is_finite());
                let min = valid.clone().reduce(f32::min);
                let max = valid.reduce(f32::max);
                let summary = FeatureSummary {
                    valid_fraction: layer.valid_fraction(),
                    min,
                    max,
                };
                (name.clone(), summary)
            })
            .collect();

        let quality = &result.quality;
        let flags = quality
            .source_quality
            .iter()
            .filter(|(_, q)| !q.flags.is_empty())
            .map(|(id, q)| (*id, q.flags.clone()))
            .collect();

        Self {
            temporal_range: result.metadata.temporal_range,
            resolution: result.metadata.resolution,
            shape: [result.metadata.height, result.metadata.width],
            num_timestamps: result.metadata.num_timestamps,
            features,
            quality: QualitySummary {
                overall_score: quality.overall_score,
                category: quality.category,
                consistent: quality.consistency.consistent,
                completeness: quality.completeness.overall,
                missing_sources: quality.missing_sources.clone(),
                source_scores: quality
                    .source_quality
                    .iter()
                    .map(|(id, q)| (*id, q.score))
                    .collect(),
                flags,
            },
        }
    }
}
