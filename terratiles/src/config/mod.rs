//! Retrieval configuration.
//!
//! [`RetrievalConfig`] holds the long-lived settings of an
//! [`ElevationRetriever`](crate::orchestrator::ElevationRetriever): fetch
//! concurrency, the tile-count guard, transport settings and endpoint
//! overrides. It can be built in code or loaded from an INI file:
//!
//! ```ini
//! [terrain]
//! source = aws
//! api_key = your-nextzen-key
//! concurrency = 8
//! max_tiles = 500
//! timeout_secs = 30
//! aws_endpoint = https://mirror.example.com/geotiff
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::provider::{TileEndpoint, TileSource};

/// Default number of tile requests in flight per retrieval.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Default maximum tiles per request (≈1 MiB of `f32` samples per tile).
pub const DEFAULT_MAX_TILES: u64 = 500;

/// Default per-request transport timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Environment variable consulted when no API key is configured.
pub const API_KEY_ENV: &str = "NEXTZEN_API_KEY";

/// INI section holding retrieval settings.
const CONFIG_SECTION: &str = "terrain";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Invalid value for '{key}': {value}")]
    InvalidValue { key: String, value: String },
}

/// Transport settings handed to the HTTP client as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Log every request at `info` instead of `trace`.
    pub verbose: bool,
    /// Extra headers sent with every request.
    pub headers: Vec<(String, String)>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            verbose: false,
            headers: Vec::new(),
        }
    }
}

/// Settings shared by every retrieval made through one retriever.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Maximum concurrent tile fetches per request.
    pub concurrency: usize,

    /// Requests covering more tiles than this fail with `TooManyTiles`
    /// unless the caller overrides the check.
    pub max_tiles: u64,

    /// HTTP transport settings.
    pub transport: TransportConfig,

    /// Source used when a request does not name one.
    pub default_source: TileSource,

    /// API key used when a request does not carry one.
    pub api_key: Option<String>,

    /// Base URL overrides per source.
    pub endpoints: HashMap<TileSource, String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_tiles: DEFAULT_MAX_TILES,
            transport: TransportConfig::default(),
            default_source: TileSource::default(),
            api_key: None,
            endpoints: HashMap::new(),
        }
    }
}

impl RetrievalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fetch concurrency (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_max_tiles(mut self, max_tiles: u64) -> Self {
        self.max_tiles = max_tiles;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.transport.timeout = timeout;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.transport.verbose = verbose;
        self
    }

    /// Add a header sent with every tile request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.transport.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_default_source(mut self, source: TileSource) -> Self {
        self.default_source = source;
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Serve `source` from `base_url` instead of its public endpoint.
    pub fn with_endpoint(mut self, source: TileSource, base_url: impl Into<String>) -> Self {
        self.endpoints.insert(source, base_url.into());
        self
    }

    /// Builds the endpoint for `source` with an already-resolved key.
    pub fn endpoint_for(&self, source: TileSource, api_key: Option<String>) -> TileEndpoint {
        let endpoint = TileEndpoint::new(source).with_api_key(api_key);
        match self.endpoints.get(&source) {
            Some(url) => endpoint.with_base_url(url.as_str()),
            None => endpoint,
        }
    }

    /// Default config file location (`<config dir>/terratiles/config.ini`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("terratiles").join("config.ini"))
    }

    /// Loads settings from an INI file, starting from defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Parses settings from INI text.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Read {
            path: PathBuf::from("<string>"),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let Some(section) = ini.section(Some(CONFIG_SECTION)) else {
            return Ok(config);
        };

        if let Some(value) = section.get("source") {
            config.default_source =
                TileSource::from_config_str(value).ok_or_else(|| invalid("source", value))?;
        }
        if let Some(value) = section.get("api_key") {
            let value = value.trim();
            if !value.is_empty() {
                config.api_key = Some(value.to_string());
            }
        }
        if let Some(value) = section.get("concurrency") {
            let concurrency: usize = parse(value, "concurrency")?;
            config = config.with_concurrency(concurrency);
        }
        if let Some(value) = section.get("max_tiles") {
            config.max_tiles = parse(value, "max_tiles")?;
        }
        if let Some(value) = section.get("timeout_secs") {
            config.transport.timeout = Duration::from_secs(parse(value, "timeout_secs")?);
        }
        if let Some(value) = section.get("verbose") {
            config.transport.verbose = parse(value, "verbose")?;
        }
        for source in [TileSource::Nextzen, TileSource::Aws] {
            let key = format!("{}_endpoint", source.name().to_lowercase());
            if let Some(value) = section.get(key.as_str()) {
                config.endpoints.insert(source, value.trim().to_string());
            }
        }

        Ok(config)
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

/// Resolves the API key: explicit value, then [`API_KEY_ENV`], then none.
///
/// Blank values count as absent.
pub fn resolve_api_key(explicit: Option<&str>) -> Option<String> {
    resolve_api_key_with(explicit, std::env::var(API_KEY_ENV).ok())
}

fn resolve_api_key_with(explicit: Option<&str>, env_value: Option<String>) -> Option<String> {
    explicit
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .or_else(|| {
            env_value
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty())
        })
}
