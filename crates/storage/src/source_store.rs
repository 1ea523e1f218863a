//! Source stacks stored as Zarr V3 groups.
//!
//! Layout of a group:
//! - root attributes: `times` (RFC 3339 strings), `width`, `height`,
//!   `variables` (array names)
//! - one float32 array per variable, shape `[time, rows, cols]`, NaN fill

use std::path::Path;

use chrono::{DateTime, Utc};
use harmonize_common::{HarmonizeError, Result, SourceArray};
use serde_json::json;
use tracing::debug;

use crate::zarr_io::{open_store, read_f32_array, read_root_attributes, write_f32_array, write_root_group};

/// Write `array` as a Zarr group at `path`, creating the directory.
pub fn write_source_group(path: &Path, array: &SourceArray) -> Result<()> {
    array.validate()?;
    std::fs::create_dir_all(path)?;
    let store = open_store(path)?;

    let times: Vec<String> = array.times.iter().map(|t| t.to_rfc3339()).collect();
    let names: Vec<&String> = array.variables.keys().collect();

    let mut attrs = serde_json::Map::new();
    attrs.insert("times".to_string(), json!(times));
    attrs.insert("width".to_string(), json!(array.width));
    attrs.insert("height".to_string(), json!(array.height));
    attrs.insert("variables".to_string(), json!(names));
    write_root_group(&store, attrs)?;

    let shape = [
        array.num_times() as u64,
        array.height as u64,
        array.width as u64,
    ];
    for (name, data) in &array.variables {
        write_f32_array(&store, name, &shape, data)?;
    }

    debug!(
        path = %path.display(),
        times = array.num_times(),
        variables = array.variables.len(),
        "Wrote source group"
    );
    Ok(())
}

/// Read a source stack previously written with [`write_source_group`].
pub fn read_source_group(path: &Path) -> Result<SourceArray> {
    if !path.is_dir() {
        return Err(HarmonizeError::cache(format!(
            "source group {} does not exist",
            path.display()
        )));
    }
    let store = open_store(path)?;
    let attrs = read_root_attributes(&store)?;

    let times = attrs
        .get("times")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HarmonizeError::cache("source group has no 'times' attribute"))?
        .iter()
        .map(|v| {
            v.as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc))
                .ok_or_else(|| HarmonizeError::cache(format!("invalid timestamp {}", v)))
        })
        .collect::<Result<Vec<_>>>()?;

    let names: Vec<String> = attrs
        .get("variables")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();

    let mut width = attrs.get("width").and_then(|v| v.as_u64()).map(|v| v as usize);
    let mut height = attrs.get("height").and_then(|v| v.as_u64()).map(|v| v as usize);

    let mut variables = Vec::with_capacity(names.len());
    for name in names {
        let (shape, data) = read_f32_array(&store, &name)?;
        if shape.len() != 3 || shape[0] as usize != times.len() {
            return Err(HarmonizeError::cache(format!(
                "array '{}' has shape {:?}, expected [{}, rows, cols]",
                name,
                shape,
                times.len()
            )));
        }
        height.get_or_insert(shape[1] as usize);
        width.get_or_insert(shape[2] as usize);
        variables.push((name, data));
    }

    let mut array = SourceArray::new(width.unwrap_or(0), height.unwrap_or(0), times);
    for (name, data) in variables {
        array = array
            .with_variable(name, data)
            .map_err(|e| HarmonizeError::cache(e.to_string()))?;
    }
    Ok(array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_source_group_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vegetation.zarr");

        let times = vec![
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 17, 0, 0, 0).unwrap(),
        ];
        let ndvi: Vec<f32> = vec![0.1, 0.2, f32::NAN, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0, 0.0, -0.1];
        let array = SourceArray::new(3, 2, times.clone())
            .with_variable("ndvi", ndvi.clone())
            .unwrap();

        write_source_group(&path, &array).unwrap();
        let back = read_source_group(&path).unwrap();

        assert_eq!(back.width, 3);
        assert_eq!(back.height, 2);
        assert_eq!(back.times, times);
        let data = &back.variables["ndvi"];
        assert!(data[2].is_nan());
        assert_eq!(data[11], -0.1);
        assert_eq!(data[0], 0.1);
    }

    #[test]
    fn test_missing_group_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_source_group(&dir.path().join("absent.zarr")).is_err());
    }
}
