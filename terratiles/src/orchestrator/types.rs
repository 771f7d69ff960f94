//! Retrieval options and errors

use thiserror::Error;

use crate::config::ConfigError;
use crate::coord::CoordError;
use crate::fetch::TileFailure;
use crate::mosaic::{Clip, MosaicError};
use crate::provider::ProviderError;

/// Errors that abort a retrieval.
///
/// Individual tile failures are not errors; they are reported on the
/// returned raster unless [`FailurePolicy::FailFast`] is selected.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Coord(#[from] CoordError),

    #[error("Request covers {requested} tiles (limit {limit}); narrow the region, lower the zoom, or override the size check")]
    TooManyTiles { requested: u64, limit: u64 },

    #[error("All {} tiles failed", .failures.len())]
    AllTilesFailed { failures: Vec<TileFailure> },

    #[error("{} of the requested tiles failed", .failures.len())]
    TilesFailed { failures: Vec<TileFailure> },

    #[error("Retrieval cancelled")]
    Cancelled,

    #[error("HTTP client error: {0}")]
    Client(#[from] ProviderError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("Mosaic failed: {0}")]
    Mosaic(String),
}

impl From<MosaicError> for RetrievalError {
    fn from(e: MosaicError) -> Self {
        match e {
            MosaicError::AllTilesFailed { failures } => RetrievalError::AllTilesFailed { failures },
            other => RetrievalError::Mosaic(other.to_string()),
        }
    }
}

impl RetrievalError {
    /// Tiles that failed, for the error variants that carry them.
    pub fn failures(&self) -> &[TileFailure] {
        match self {
            RetrievalError::AllTilesFailed { failures } | RetrievalError::TilesFailed { failures } => {
                failures
            }
            _ => &[],
        }
    }
}

/// What to do when some tiles fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Return a raster with no-data holes and the failure list.
    #[default]
    BestEffort,
    /// Fail the whole request if any tile fails.
    FailFast,
}

/// Per-request options.
#[derive(Clone, Default)]
pub struct RetrievalOptions {
    /// API key for this request; falls back to the configured key, then
    /// `NEXTZEN_API_KEY`.
    pub api_key: Option<String>,
    /// Margin added to every side of the region before tiles are selected,
    /// in the region's units.
    pub expand: Option<f64>,
    pub clip: Clip,
    pub policy: FailurePolicy,
    /// Treat negative elevations as no-data.
    pub neg_to_nodata: bool,
    /// Skip the tile-count guard.
    pub override_size_check: bool,
}

impl std::fmt::Debug for RetrievalOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalOptions")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("expand", &self.expand)
            .field("clip", &self.clip)
            .field("policy", &self.policy)
            .field("neg_to_nodata", &self.neg_to_nodata)
            .field("override_size_check", &self.override_size_check)
            .finish()
    }
}

impl RetrievalOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_expand(mut self, margin: f64) -> Self {
        self.expand = Some(margin);
        self
    }

    pub fn with_clip(mut self, clip: Clip) -> Self {
        self.clip = clip;
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_neg_to_nodata(mut self, enabled: bool) -> Self {
        self.neg_to_nodata = enabled;
        self
    }

    pub fn with_override_size_check(mut self, enabled: bool) -> Self {
        self.override_size_check = enabled;
        self
    }
}
