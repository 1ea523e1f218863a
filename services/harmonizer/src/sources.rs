//! File-backed acquisition collaborators.
//!
//! Each source is read from `<dir>/<source>.json`, a serialized
//! `RawSourceResult`. Relative file payload paths inside it are resolved
//! against the same directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use harmonization::{SourceClient, SourceClients};
use harmonize_common::{BoundingBox, RawSourceResult, SourceId, SourceOutcome, SourcePayload};
use tracing::{debug, instrument};

/// Reads one source's result from a JSON document on disk.
pub struct FileSourceClient {
    source: SourceId,
    dir: PathBuf,
}

impl FileSourceClient {
    pub fn new(source: SourceId, dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            dir: dir.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.source))
    }
}

#[async_trait]
impl SourceClient for FileSourceClient {
    #[instrument(skip(self, bounds), fields(source = %self.source))]
    async fn download(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        bounds: &BoundingBox,
    ) -> Result<RawSourceResult> {
        let path = self.path();
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut raw: RawSourceResult = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        if raw.source != self.source {
            bail!(
                "{} holds data for {}, expected {}",
                path.display(),
                raw.source,
                self.source
            );
        }
        if let SourceOutcome::Success(raster) = &mut raw.outcome {
            if let SourcePayload::File(payload) = &mut raster.payload {
                *payload = resolve_relative(&self.dir, payload);
            }
        }

        debug!(
            start = %start,
            end = %end,
            west = bounds.west,
            east = bounds.east,
            success = raw.is_success(),
            "Loaded source from disk"
        );
        Ok(raw)
    }
}

fn resolve_relative(dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        dir.join(path)
    }
}

/// One file-backed client per source, all reading from `dir`.
pub fn file_clients(dir: &Path) -> SourceClients {
    SourceClients::from_fn(|source| {
        Arc::new(FileSourceClient::new(source, dir)) as Arc<dyn SourceClient>
    })
}
