//! Persistence for the harmonization pipeline.
//!
//! Provides:
//! - A Zarr V3 filesystem cache of complete harmonized results
//! - Reader/writer for source stacks delivered as on-disk Zarr groups

pub mod cache;
pub mod source_store;
mod zarr_io;

pub use cache::{generate_cache_key, CacheEntry, CacheManager, CacheStats, CACHE_TTL_HOURS};
pub use source_store::{read_source_group, write_source_group};
