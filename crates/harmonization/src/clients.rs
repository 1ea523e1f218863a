//! Acquisition collaborator interface.
//!
//! The harmonizer never talks to a data provider itself. Each of the five
//! sources is reached through a [`SourceClient`] that hands back a
//! [`RawSourceResult`]; network access, authentication and file formats
//! live behind that trait.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use harmonize_common::{BoundingBox, RawSourceResult, SourceId};

/// One acquisition collaborator.
///
/// Returning `Err` and returning `Ok(RawSourceResult::failure(..))` are
/// treated the same way: the source is unavailable for this request.
#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn download(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        bounds: &BoundingBox,
    ) -> anyhow::Result<RawSourceResult>;
}

/// The five collaborators, one slot per source.
#[derive(Clone)]
pub struct SourceClients {
    pub climate: Arc<dyn SourceClient>,
    pub precipitation: Arc<dyn SourceClient>,
    pub vegetation: Arc<dyn SourceClient>,
    pub epidemiology: Arc<dyn SourceClient>,
    pub population: Arc<dyn SourceClient>,
}

impl SourceClients {
    /// Build the slots from a factory called once per source.
    pub fn from_fn(mut make: impl FnMut(SourceId) -> Arc<dyn SourceClient>) -> Self {
        Self {
            climate: make(SourceId::Climate),
            precipitation: make(SourceId::Precipitation),
            vegetation: make(SourceId::Vegetation),
            epidemiology: make(SourceId::Epidemiology),
            population: make(SourceId::Population),
        }
    }

    pub fn get(&self, source: SourceId) -> &Arc<dyn SourceClient> {
        match source {
            SourceId::Climate => &self.climate,
            SourceId::Precipitation => &self.precipitation,
            SourceId::Vegetation => &self.vegetation,
            SourceId::Epidemiology => &self.epidemiology,
            SourceId::Population => &self.population,
        }
    }
}

impl std::fmt::Debug for SourceClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceClients").finish_non_exhaustive()
    }
}
