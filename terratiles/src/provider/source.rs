//! Terrain tile sources.
//!
//! Both sources publish the same Web Mercator GeoTIFF tile pyramid
//! (512×512 pixels, one elevation band in meters). They differ only in where
//! the tiles live and how requests are authenticated.
//!
//! # URL Pattern
//!
//! `{base}/{z}/{x}/{y}.tif[?api_key={key}]`
//!
//! | Source | Base URL | Auth |
//! |---|---|---|
//! | Nextzen | `https://tile.nextzen.org/tilezen/terrain/v1/geotiff` | `api_key` query parameter |
//! | AWS | `https://s3.amazonaws.com/elevation-tiles-prod/geotiff` | none |

use std::fmt;

use reqwest::Url;

use crate::coord::TileCoord;

/// Base URL of the Nextzen (Tilezen) terrain service.
const NEXTZEN_BASE_URL: &str = "https://tile.nextzen.org/tilezen/terrain/v1/geotiff";

/// Base URL of the AWS Open Data terrain bucket.
const AWS_BASE_URL: &str = "https://s3.amazonaws.com/elevation-tiles-prod/geotiff";

/// File extension of the single supported encoding.
const TILE_FORMAT: &str = "tif";

/// Pixel dimension of a GeoTIFF terrain tile.
pub const TILE_SIZE: u32 = 512;

/// Remote terrain tile source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TileSource {
    /// Cached CDN service; unthrottled when a key is supplied.
    Nextzen,
    /// Uncached S3 object storage, no authentication.
    #[default]
    Aws,
}

/// How a source expects the API key to be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPolicy {
    /// Key appended as a query parameter with this name.
    QueryParam(&'static str),
    /// Source does not take a key.
    None,
}

impl TileSource {
    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            TileSource::Nextzen => "Nextzen",
            TileSource::Aws => "AWS",
        }
    }

    /// Default endpoint.
    pub fn base_url(&self) -> &'static str {
        match self {
            TileSource::Nextzen => NEXTZEN_BASE_URL,
            TileSource::Aws => AWS_BASE_URL,
        }
    }

    /// Pixel dimension of tiles served by this source.
    pub fn tile_size(&self) -> u32 {
        TILE_SIZE
    }

    pub fn key_policy(&self) -> KeyPolicy {
        match self {
            TileSource::Nextzen => KeyPolicy::QueryParam("api_key"),
            TileSource::Aws => KeyPolicy::None,
        }
    }

    /// Parse from a config or CLI string.
    pub fn from_config_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "nextzen" | "tilezen" | "mapzen" => Some(TileSource::Nextzen),
            "aws" | "s3" => Some(TileSource::Aws),
            _ => None,
        }
    }
}

impl fmt::Display for TileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A source bound to a concrete base URL and resolved API key.
#[derive(Clone, PartialEq, Eq)]
pub struct TileEndpoint {
    source: TileSource,
    base_url: String,
    api_key: Option<String>,
}

impl fmt::Debug for TileEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileEndpoint")
            .field("source", &self.source)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl TileEndpoint {
    /// Endpoint at the source's default URL, without a key.
    pub fn new(source: TileSource) -> Self {
        Self {
            source,
            base_url: source.base_url().to_string(),
            api_key: None,
        }
    }

    /// Overrides the base URL (mirrors, local test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the API key. Ignored when building URLs for keyless sources.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn source(&self) -> TileSource {
        self.source
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Builds the request URL for one tile.
    ///
    /// The key is form-encoded. If the base URL does not parse, the URL is
    /// returned without the key and the request fails in the client.
    pub fn tile_url(&self, coord: &TileCoord) -> String {
        let url = format!(
            "{}/{}/{}/{}.{}",
            self.base_url, coord.z, coord.x, coord.y, TILE_FORMAT
        );
        let (KeyPolicy::QueryParam(param), Some(key)) = (self.source.key_policy(), &self.api_key)
        else {
            return url;
        };
        match Url::parse(&url) {
            Ok(mut parsed) => {
                parsed.query_pairs_mut().append_pair(param, key);
                parsed.into()
            }
            Err(_) => url,
        }
    }
}
