//! Thin helpers over zarrs for float32 arrays inside a filesystem group.

use std::path::Path;
use std::sync::Arc;

use harmonize_common::{HarmonizeError, Result};
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::{Group, GroupBuilder};
use zarrs_filesystem::FilesystemStore;

/// Edge length of the spatial chunks; time is chunked one frame at a time.
const CHUNK_EDGE: u64 = 256;

pub(crate) type Store = Arc<FilesystemStore>;

fn storage_err(context: &str, e: impl std::fmt::Display) -> HarmonizeError {
    HarmonizeError::cache(format!("{}: {}", context, e))
}

fn array_path(name: &str) -> String {
    format!("/{}", name)
}

pub(crate) fn open_store(path: &Path) -> Result<Store> {
    let store = FilesystemStore::new(path)
        .map_err(|e| storage_err(&format!("open store {}", path.display()), e))?;
    Ok(Arc::new(store))
}

/// Create the root group with `attrs`.
pub(crate) fn write_root_group(
    store: &Store,
    attrs: serde_json::Map<String, serde_json::Value>,
) -> Result<()> {
    let group = GroupBuilder::new()
        .attributes(attrs)
        .build(store.clone(), "/")
        .map_err(|e| storage_err("create group", e))?;
    group
        .store_metadata()
        .map_err(|e| storage_err("store group metadata", e))
}

/// Attributes of the root group.
pub(crate) fn read_root_attributes(
    store: &Store,
) -> Result<serde_json::Map<String, serde_json::Value>> {
    let group = Group::open(store.clone(), "/").map_err(|e| storage_err("open group", e))?;
    Ok(group.attributes().clone())
}

/// Write a float32 array of `shape` under the root group.
///
/// The last two dimensions are chunked in `CHUNK_EDGE` tiles; any leading
/// dimension is chunked one step at a time.
pub(crate) fn write_f32_array(store: &Store, name: &str, shape: &[u64], data: &[f32]) -> Result<()> {
    let expected: u64 = shape.iter().product();
    if data.len() as u64 != expected {
        return Err(HarmonizeError::cache(format!(
            "array '{}' has {} values, shape {:?} needs {}",
            name,
            data.len(),
            shape,
            expected
        )));
    }

    let lead = shape.len().saturating_sub(2);
    let chunk_shape: Vec<u64> = shape
        .iter()
        .enumerate()
        .map(|(i, &d)| if i < lead { 1 } else { d.clamp(1, CHUNK_EDGE) })
        .collect();
    let chunk_grid: zarrs::array::ChunkGrid = chunk_shape
        .try_into()
        .map_err(|e| HarmonizeError::cache(format!("invalid chunk shape: {:?}", e)))?;

    let array = ArrayBuilder::new(
        shape.to_vec(),
        DataType::Float32,
        chunk_grid,
        FillValue::from(f32::NAN),
    )
    .build(store.clone(), &array_path(name))
    .map_err(|e| storage_err(&format!("create array '{}'", name), e))?;

    array
        .store_metadata()
        .map_err(|e| storage_err(&format!("store metadata of '{}'", name), e))?;

    if data.is_empty() {
        return Ok(());
    }

    let subset = ArraySubset::new_with_start_shape(vec![0; shape.len()], shape.to_vec())
        .map_err(|e| storage_err("build subset", e))?;
    array
        .store_array_subset_elements(&subset, data)
        .map_err(|e| storage_err(&format!("write array '{}'", name), e))
}

/// Read a whole float32 array with its shape.
pub(crate) fn read_f32_array(store: &Store, name: &str) -> Result<(Vec<u64>, Vec<f32>)> {
    let array = Array::open(store.clone(), &array_path(name))
        .map_err(|e| storage_err(&format!("open array '{}'", name), e))?;
    let shape = array.shape().to_vec();

    if shape.iter().any(|&d| d == 0) {
        return Ok((shape, Vec::new()));
    }

    let subset = ArraySubset::new_with_start_shape(vec![0; shape.len()], shape.clone())
        .map_err(|e| storage_err("build subset", e))?;
    let data: Vec<f32> = array
        .retrieve_array_subset_elements(&subset)
        .map_err(|e| storage_err(&format!("read array '{}'", name), e))?;

    Ok((shape, data))
}

/// String attribute lookup.
pub(crate) fn attr_str<'a>(
    attrs: &'a serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<&'a str> {
    attrs
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HarmonizeError::cache(format!("missing string attribute '{}'", key)))
}
