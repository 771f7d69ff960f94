//! Fetch result types

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use crate::coord::TileCoord;
use crate::provider::ProviderError;

/// Why a single tile produced no elevation data.
///
/// These are data carried alongside the mosaic, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileErrorKind {
    /// Transport failure, timeout, or an unexpected HTTP status
    NetworkError,
    /// HTTP 404: no tile at this coordinate
    NotFound,
    /// HTTP 429: the source is throttling requests
    RateLimited,
    /// The body was empty or not a readable elevation tile
    DecodeError,
}

impl fmt::Display for TileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TileErrorKind::NetworkError => "network error",
            TileErrorKind::NotFound => "not found",
            TileErrorKind::RateLimited => "rate limited",
            TileErrorKind::DecodeError => "decode error",
        };
        f.write_str(name)
    }
}

/// A tile that could not be fetched or decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileFailure {
    pub coord: TileCoord,
    pub kind: TileErrorKind,
    pub detail: String,
}

impl TileFailure {
    pub fn new(coord: TileCoord, kind: TileErrorKind, detail: impl Into<String>) -> Self {
        Self {
            coord,
            kind,
            detail: detail.into(),
        }
    }

    /// Classifies a client error for `coord`.
    pub fn from_provider_error(coord: TileCoord, error: &ProviderError) -> Self {
        let kind = match error.status() {
            Some(404) => TileErrorKind::NotFound,
            Some(429) => TileErrorKind::RateLimited,
            _ => TileErrorKind::NetworkError,
        };
        Self::new(coord, kind, error.to_string())
    }
}

impl fmt::Display for TileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.coord, self.kind, self.detail)
    }
}

/// Outcome of fetching one tile.
#[derive(Debug, Clone)]
pub struct FetchedTile {
    pub coord: TileCoord,
    pub body: Result<Bytes, TileFailure>,
}

/// Statistics about one retrieval.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchStats {
    /// Tiles requested
    pub requested: usize,
    /// Tiles that decoded successfully
    pub succeeded: usize,
    /// Tiles that failed to fetch or decode
    pub failed: usize,
    /// Total response bytes received
    pub bytes: u64,
    /// Wall-clock time of the fetch phase
    pub elapsed: Duration,
}

impl FetchStats {
    /// Success rate as a percentage (0.0 - 100.0).
    pub fn success_rate(&self) -> f64 {
        if self.requested == 0 {
            return 0.0;
        }
        (self.succeeded as f64 / self.requested as f64) * 100.0
    }

    /// Mean download throughput in bytes per second.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes as f64 / secs
    }
}

/// Returned when a fetch is cancelled before every tile completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("tile fetch cancelled")]
pub struct FetchCancelled;
