//! Temporal harmonization.
//!
//! Builds one time index for a request and brings every source onto it,
//! whatever its native cadence: sub-daily and daily sources are averaged
//! into bins, 16-day composites are interpolated between anchor dates and
//! annual surfaces are broadcast.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use grid_processor::InterpolationMethod;
use harmonize_common::{
    Cadence, Granularity, HarmonizeError, Result, SourceArray, SourceId, TimeExtent,
};
use tracing::{debug, warn};

/// Compositing period of the vegetation product.
pub const COMPOSITE_PERIOD_DAYS: i64 = 16;

/// Resamples source stacks onto a unified temporal index.
#[derive(Debug, Clone)]
pub struct TemporalHarmonizer {
    /// How far a composite value may be carried past its outermost anchor
    composite_reach: Duration,
}

impl Default for TemporalHarmonizer {
    fn default() -> Self {
        Self {
            composite_reach: Duration::days(COMPOSITE_PERIOD_DAYS),
        }
    }
}

impl TemporalHarmonizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ordered index from the earliest start to the latest end of `extents`.
    ///
    /// The first timestamp is the granularity floor of the earliest start;
    /// steps continue while they do not pass the latest end.
    pub fn create_unified_temporal_index(
        &self,
        extents: &[TimeExtent],
        granularity: Granularity,
    ) -> Result<Vec<DateTime<Utc>>> {
        let start = extents.iter().map(|e| e.start).min();
        let end = extents.iter().map(|e| e.end).max();
        let (Some(start), Some(end)) = (start, end) else {
            return Err(HarmonizeError::configuration(
                "cannot build a temporal index without any sources",
            ));
        };

        let mut index = Vec::new();
        let mut t = granularity.floor(start);
        while t <= end {
            index.push(t);
            t = granularity.advance(t);
        }
        debug!(
            granularity = granularity.as_str(),
            start = %start,
            end = %end,
            steps = index.len(),
            "Built unified temporal index"
        );
        Ok(index)
    }

    /// Bring one source onto `index` with the operation its cadence calls for.
    pub fn harmonize_source(
        &self,
        source: SourceId,
        array: &SourceArray,
        index: &[DateTime<Utc>],
        granularity: Granularity,
    ) -> SourceArray {
        match source.cadence() {
            Cadence::SubDaily | Cadence::Daily => {
                self.resample_daily_data(array, index, granularity)
            }
            Cadence::Composite16Day => self.interpolate_composite_data(array, index),
            Cadence::Annual => self.interpolate_annual_data(array, index),
        }
    }

    /// Average native samples into the bins of `index`.
    ///
    /// Bin `i` covers `[index[i], index[i + 1])`; the last bin is one
    /// granularity step long. A first or last bin without samples takes the
    /// nearest sample within one step of it. Interior bins without samples
    /// stay missing.
    pub fn resample_daily_data(
        &self,
        source: &SourceArray,
        index: &[DateTime<Utc>],
        granularity: Granularity,
    ) -> SourceArray {
        let bins = Bins::new(index, granularity);
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); index.len()];
        for (sample, t) in source.times.iter().enumerate() {
            if let Some(bin) = bins.locate(*t) {
                members[bin].push(sample);
            }
        }

        if let Some(last) = index.len().checked_sub(1) {
            for bin in [0, last] {
                if members[bin].is_empty() {
                    if let Some(sample) = bins.nearest_sample(bin, &source.times) {
                        members[bin].push(sample);
                    }
                }
            }
        }

        let frame_len = source.frame_len();
        let expected = frame_len * source.num_times();
        let mut out = SourceArray::new(source.width, source.height, index.to_vec());
        for (name, data) in &source.variables {
            if data.len() != expected {
                warn!(variable = %name, "Skipping variable with inconsistent length");
                continue;
            }
            let mut resampled = vec![f32::NAN; frame_len * index.len()];
            for (bin, samples) in members.iter().enumerate() {
                if samples.is_empty() {
                    continue;
                }
                let dst = &mut resampled[bin * frame_len..(bin + 1) * frame_len];
                for (px, value) in dst.iter_mut().enumerate() {
                    let mut sum = 0.0f64;
                    let mut count = 0usize;
                    for &s in samples {
                        let v = data[s * frame_len + px];
                        if v.is_finite() {
                            sum += v as f64;
                            count += 1;
                        }
                    }
                    if count > 0 {
                        *value = (sum / count as f64) as f32;
                    }
                }
            }
            out.variables.insert(name.clone(), resampled);
        }
        out
    }

    /// Interpolate 16-day composites linearly between anchor dates.
    ///
    /// Each pixel uses only its own valid anchors. Outside the outermost
    /// valid anchors the nearest value is carried flat for at most one
    /// compositing period. Categorical layers take the nearest anchor
    /// instead of blending codes.
    pub fn interpolate_composite_data(
        &self,
        source: &SourceArray,
        index: &[DateTime<Utc>],
    ) -> SourceArray {
        let mut order: Vec<usize> = (0..source.num_times()).collect();
        order.sort_by_key(|&i| source.times[i]);
        let anchor_secs: Vec<i64> = order.iter().map(|&i| source.times[i].timestamp()).collect();
        let target_secs: Vec<i64> = index.iter().map(|t| t.timestamp()).collect();
        let reach = self.composite_reach.num_seconds();

        let frame_len = source.frame_len();
        let expected = frame_len * source.num_times();
        let mut out = SourceArray::new(source.width, source.height, index.to_vec());
        let mut valid: Vec<(i64, f32)> = Vec::with_capacity(order.len());

        for (name, data) in &source.variables {
            if data.len() != expected {
                warn!(variable = %name, "Skipping variable with inconsistent length");
                continue;
            }
            let categorical = InterpolationMethod::for_variable(name) == InterpolationMethod::Nearest;
            let mut interpolated = vec![f32::NAN; frame_len * index.len()];

            for px in 0..frame_len {
                valid.clear();
                valid.extend(
                    order
                        .iter()
                        .zip(&anchor_secs)
                        .map(|(&frame, &secs)| (secs, data[frame * frame_len + px]))
                        .filter(|(_, v)| v.is_finite()),
                );
                if valid.is_empty() {
                    continue;
                }

                for (j, &tt) in target_secs.iter().enumerate() {
                    interpolated[j * frame_len + px] =
                        value_at(&valid, tt, reach, categorical);
                }
            }
            out.variables.insert(name.clone(), interpolated);
        }
        out
    }

    /// Broadcast one annual surface across the whole index.
    ///
    /// Uses the latest frame at or before the end of the index; when every
    /// frame is later, the earliest one.
    pub fn interpolate_annual_data(
        &self,
        source: &SourceArray,
        index: &[DateTime<Utc>],
    ) -> SourceArray {
        let frame_len = source.frame_len();
        let mut out = SourceArray::new(source.width, source.height, index.to_vec());

        let chosen = index.last().and_then(|end| {
            let before = source
                .times
                .iter()
                .enumerate()
                .filter(|(_, t)| *t <= end)
                .max_by_key(|(_, t)| **t);
            let earliest = source.times.iter().enumerate().min_by_key(|(_, t)| **t);
            before.or(earliest).map(|(i, _)| i)
        });

        for name in source.variables.keys() {
            let frame = chosen.and_then(|t| source.frame(name, t));
            let broadcast = match frame {
                Some(frame) => {
                    let mut buf = Vec::with_capacity(frame_len * index.len());
                    for _ in 0..index.len() {
                        buf.extend_from_slice(frame);
                    }
                    buf
                }
                None => vec![f32::NAN; frame_len * index.len()],
            };
            out.variables.insert(name.clone(), broadcast);
        }
        out
    }

    /// Forward-fill then backward-fill every per-pixel series of every source.
    ///
    /// Series with no valid value at all stay missing. Returns the number of
    /// values filled.
    pub fn fill_temporal_gaps(&self, sources: &mut BTreeMap<SourceId, SourceArray>) -> usize {
        let mut filled = 0;
        for (source, array) in sources.iter_mut() {
            let n = self.fill_series_gaps(array);
            if n > 0 {
                debug!(source = %source, filled = n, "Filled temporal gaps");
            }
            filled += n;
        }
        filled
    }

    /// Gap filling for a single stack.
    pub fn fill_series_gaps(&self, array: &mut SourceArray) -> usize {
        let frame_len = array.frame_len();
        let num_times = array.num_times();
        let mut filled = 0;

        for data in array.variables.values_mut() {
            if data.len() != frame_len * num_times {
                continue;
            }
            for px in 0..frame_len {
                let mut last = None;
                for t in 0..num_times {
                    let v = &mut data[t * frame_len + px];
                    if v.is_finite() {
                        last = Some(*v);
                    } else if let Some(prev) = last {
                        *v = prev;
                        filled += 1;
                    }
                }
                let mut next = None;
                for t in (0..num_times).rev() {
                    let v = &mut data[t * frame_len + px];
                    if v.is_finite() {
                        next = Some(*v);
                    } else if let Some(following) = next {
                        *v = following;
                        filled += 1;
                    }
                }
            }
        }
        filled
    }
}

/// Time bins derived from an index.
struct Bins<'a> {
    index: &'a [DateTime<Utc>],
    granularity: Granularity,
}

impl<'a> Bins<'a> {
    fn new(index: &'a [DateTime<Utc>], granularity: Granularity) -> Self {
        Self { index, granularity }
    }

    fn end(&self, bin: usize) -> DateTime<Utc> {
        self.index
            .get(bin + 1)
            .copied()
            .unwrap_or_else(|| self.granularity.advance(self.index[bin]))
    }

    fn locate(&self, t: DateTime<Utc>) -> Option<usize> {
        let bin = self.index.partition_point(|b| *b <= t).checked_sub(1)?;
        (t < self.end(bin)).then_some(bin)
    }

    /// Closest sample to `bin`, no further than the bin's own length.
    fn nearest_sample(&self, bin: usize, times: &[DateTime<Utc>]) -> Option<usize> {
        let start = self.index[bin];
        let end = self.end(bin);
        let step = end - start;
        times
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let distance = if *t < start {
                    start - *t
                } else if *t >= end {
                    *t - end
                } else {
                    Duration::zero()
                };
                (i, distance)
            })
            .filter(|(_, d)| *d <= step)
            .min_by_key(|(_, d)| *d)
            .map(|(i, _)| i)
    }
}

/// Value of a pixel at `t` from its sorted valid anchors.
fn value_at(valid: &[(i64, f32)], t: i64, reach: i64, categorical: bool) -> f32 {
    let after = valid.partition_point(|(secs, _)| *secs <= t);
    if after == 0 {
        let (first, v) = valid[0];
        return if first - t <= reach { v } else { f32::NAN };
    }
    if after == valid.len() {
        let (last, v) = valid[valid.len() - 1];
        return if t - last <= reach { v } else { f32::NAN };
    }

    let (t0, v0) = valid[after - 1];
    let (t1, v1) = valid[after];
    if categorical {
        return if t - t0 <= t1 - t { v0 } else { v1 };
    }
    let w = (t - t0) as f64 / (t1 - t0) as f64;
    (v0 as f64 + w * (v1 as f64 - v0 as f64)) as f32
}
