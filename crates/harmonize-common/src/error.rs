//! Error taxonomy for the harmonization pipeline.
//!
//! Only [`HarmonizeError::Configuration`] and [`HarmonizeError::Harmonization`]
//! ever cross the public entry point. Source and cache failures are absorbed
//! internally and surface as quality flags instead.

use thiserror::Error;

use crate::source::SourceId;

/// Result type alias using HarmonizeError.
pub type Result<T> = std::result::Result<T, HarmonizeError>;

/// Primary error type for harmonization operations.
#[derive(Debug, Error)]
pub enum HarmonizeError {
    /// Caller mistake (bad granularity, resolution, bounds); raised before any I/O.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// One acquisition collaborator failed or timed out.
    #[error("source {source_id} unavailable: {reason}")]
    SourceUnavailable { source_id: SourceId, reason: String },

    /// Irrecoverable shape/reference mismatch; no usable grid could be built.
    #[error("harmonization failed: {0}")]
    Harmonization(String),

    /// Cache read/write failure.
    #[error("cache error: {0}")]
    Cache(String),
}

impl HarmonizeError {
    /// Create a Configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a SourceUnavailable error.
    pub fn source_unavailable(source: SourceId, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_id: source,
            reason: reason.into(),
        }
    }

    /// Create a Harmonization error.
    pub fn harmonization(msg: impl Into<String>) -> Self {
        Self::Harmonization(msg.into())
    }

    /// Create a Cache error.
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Whether this error may be returned from the public entry point.
    pub fn crosses_public_boundary(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Harmonization(_))
    }
}

impl From<std::io::Error> for HarmonizeError {
    fn from(err: std::io::Error) -> Self {
        HarmonizeError::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for HarmonizeError {
    fn from(err: serde_json::Error) -> Self {
        HarmonizeError::Cache(format!("JSON error: {}", err))
    }
}
