//! Data handed over by the five acquisition collaborators.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::error::HarmonizeError;
use crate::grid::GeoTransform;

/// The fixed set of upstream data sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    /// Sub-daily reanalysis climate (2 m temperature, humidity).
    Climate,
    /// Daily gridded precipitation.
    Precipitation,
    /// 16-day composite vegetation index and land-surface temperature.
    Vegetation,
    /// Annual epidemiological baseline (parasite prevalence).
    Epidemiology,
    /// Annual/static population density.
    Population,
}

impl SourceId {
    pub const ALL: [SourceId; 5] = [
        SourceId::Climate,
        SourceId::Precipitation,
        SourceId::Vegetation,
        SourceId::Epidemiology,
        SourceId::Population,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Climate => "climate",
            Self::Precipitation => "precipitation",
            Self::Vegetation => "vegetation",
            Self::Epidemiology => "epidemiology",
            Self::Population => "population",
        }
    }

    /// Native temporal cadence of the source.
    pub fn cadence(&self) -> Cadence {
        match self {
            Self::Climate => Cadence::SubDaily,
            Self::Precipitation => Cadence::Daily,
            Self::Vegetation => Cadence::Composite16Day,
            Self::Epidemiology | Self::Population => Cadence::Annual,
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = HarmonizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| HarmonizeError::configuration(format!("unknown source '{}'", s)))
    }
}

/// Native temporal cadence of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    SubDaily,
    Daily,
    Composite16Day,
    Annual,
}

impl Cadence {
    /// Whether the source carries sub-annual variability.
    pub fn is_time_varying(&self) -> bool {
        !matches!(self, Cadence::Annual)
    }
}

/// A stack of co-registered frames, one buffer per physical variable.
///
/// Each variable buffer is row-major `[time][row][col]` with length
/// `times.len() * height * width`. NaN marks missing pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceArray {
    pub width: usize,
    pub height: usize,
    pub times: Vec<DateTime<Utc>>,
    #[serde(with = "nan_map")]
    pub variables: BTreeMap<String, Vec<f32>>,
}

impl SourceArray {
    /// An empty stack with no variables.
    pub fn new(width: usize, height: usize, times: Vec<DateTime<Utc>>) -> Self {
        Self {
            width,
            height,
            times,
            variables: BTreeMap::new(),
        }
    }

    /// Add a variable, checking that its buffer matches the stack shape.
    pub fn with_variable(
        mut self,
        name: impl Into<String>,
        data: Vec<f32>,
    ) -> Result<Self, HarmonizeError> {
        let name = name.into();
        let expected = self.times.len() * self.frame_len();
        if data.len() != expected {
            return Err(HarmonizeError::harmonization(format!(
                "variable '{}' has {} values, expected {} ({} times x {}x{})",
                name,
                data.len(),
                expected,
                self.times.len(),
                self.height,
                self.width
            )));
        }
        self.variables.insert(name, data);
        Ok(self)
    }

    /// Pixels per frame.
    pub fn frame_len(&self) -> usize {
        self.width * self.height
    }

    pub fn num_times(&self) -> usize {
        self.times.len()
    }

    /// The frame of `variable` at time index `t`.
    pub fn frame(&self, variable: &str, t: usize) -> Option<&[f32]> {
        let n = self.frame_len();
        let data = self.variables.get(variable)?;
        data.get(t * n..(t + 1) * n)
    }

    /// Check every variable buffer against the declared shape.
    pub fn validate(&self) -> Result<(), HarmonizeError> {
        let expected = self.times.len() * self.frame_len();
        for (name, data) in &self.variables {
            if data.len() != expected {
                return Err(HarmonizeError::harmonization(format!(
                    "variable '{}' has {} values, expected {}",
                    name,
                    data.len(),
                    expected
                )));
            }
        }
        Ok(())
    }
}

/// Where a successful source's values live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SourcePayload {
    /// Values delivered in memory.
    Inline(SourceArray),
    /// Path to an on-disk Zarr group holding the stack.
    File(PathBuf),
}

/// Spatial and value payload of a successful acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRaster {
    pub payload: SourcePayload,
    pub bounds: BoundingBox,
    pub transform: Option<GeoTransform>,
    pub crs: String,
}

impl SourceRaster {
    /// Inline raster in WGS84 whose transform is derived from `bounds`.
    pub fn geographic(array: SourceArray, bounds: BoundingBox) -> Self {
        let transform = GeoTransform::from_bounds(&bounds, array.width, array.height);
        Self {
            payload: SourcePayload::Inline(array),
            bounds,
            transform: Some(transform),
            crs: "EPSG:4326".to_string(),
        }
    }
}

/// Success or failure of one acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    Success(SourceRaster),
    Failure { error: String },
}

/// The result one acquisition collaborator returns for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSourceResult {
    pub source: SourceId,
    pub outcome: SourceOutcome,
}

impl RawSourceResult {
    pub fn success(source: SourceId, raster: SourceRaster) -> Self {
        Self {
            source,
            outcome: SourceOutcome::Success(raster),
        }
    }

    pub fn failure(source: SourceId, error: impl Into<String>) -> Self {
        Self {
            source,
            outcome: SourceOutcome::Failure {
                error: error.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, SourceOutcome::Success(_))
    }

    pub fn raster(&self) -> Option<&SourceRaster> {
        match &self.outcome {
            SourceOutcome::Success(raster) => Some(raster),
            SourceOutcome::Failure { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            SourceOutcome::Success(_) => None,
            SourceOutcome::Failure { error } => Some(error),
        }
    }
}

mod nan_map {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<String, Vec<f32>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let wrapped: BTreeMap<&String, Vec<Option<f32>>> = map
            .iter()
            .map(|(k, v)| {
                (
                    k,
                    v.iter()
                        .map(|x| if x.is_finite() { Some(*x) } else { None })
                        .collect(),
                )
            })
            .collect();
        wrapped.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, Vec<f32>>, D::Error> {
        let wrapped: BTreeMap<String, Vec<Option<f32>>> = BTreeMap::deserialize(deserializer)?;
        Ok(wrapped
            .into_iter()
            .map(|(k, v)| (k, v.into_iter().map(|x| x.unwrap_or(f32::NAN)).collect()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn two_frame_array() -> SourceArray {
        let times = vec![
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        ];
        SourceArray::new(2, 1, times)
            .with_variable("precipitation", vec![1.0, 2.0, 3.0, f32::NAN])
            .unwrap()
    }

    #[test]
    fn test_source_id_roundtrip() {
        for id in SourceId::ALL {
            assert_eq!(id.as_str().parse::<SourceId>().unwrap(), id);
        }
        assert!("weather".parse::<SourceId>().is_err());
    }

    #[test]
    fn test_frame_access() {
        let array = two_frame_array();
        assert_eq!(array.frame("precipitation", 0), Some(&[1.0, 2.0][..]));
        assert_eq!(array.frame("precipitation", 1).map(|f| f[0]), Some(3.0));
        assert!(array.frame("precipitation", 2).is_none());
        assert!(array.frame("ndvi", 0).is_none());
    }

    #[test]
    fn test_with_variable_rejects_bad_length() {
        let array = SourceArray::new(2, 2, vec![Utc::now()]);
        assert!(array.with_variable("ndvi", vec![0.1; 3]).is_err());
    }

    #[test]
    fn test_raw_result_json_roundtrip_keeps_nan() {
        let bounds = BoundingBox::new(0.0, 0.0, 2.0, 1.0);
        let raw = RawSourceResult::success(
            SourceId::Precipitation,
            SourceRaster::geographic(two_frame_array(), bounds),
        );
        let json = serde_json::to_string(&raw).unwrap();
        let back: RawSourceResult = serde_json::from_str(&json).unwrap();
        assert!(back.is_success());

        let raster = back.raster().unwrap();
        match &raster.payload {
            SourcePayload::Inline(array) => {
                let data = &array.variables["precipitation"];
                assert_eq!(data[2], 3.0);
                assert!(data[3].is_nan());
            }
            SourcePayload::File(_) => panic!("expected inline payload"),
        }
    }

    #[test]
    fn test_failure_message() {
        let raw = RawSourceResult::failure(SourceId::Climate, "CDS queue timeout");
        assert!(!raw.is_success());
        assert_eq!(raw.error_message(), Some("CDS queue timeout"));
        assert!(raw.raster().is_none());
    }
}
