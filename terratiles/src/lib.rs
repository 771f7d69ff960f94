//! Terratiles - terrain raster retrieval from XYZ elevation tiles
//!
//! Given a region and a zoom level, this library selects the Web Mercator
//! tiles covering the region, fetches them concurrently from a terrain tile
//! source, decodes each GeoTIFF tile into an elevation grid and merges the
//! grids into one georeferenced raster. Tiles that fail to fetch or decode
//! leave no-data holes and are reported alongside the raster.
//!
//! # Modules
//!
//! - [`coord`]: bounding boxes, tile coordinates and tile selection
//! - [`provider`]: tile sources, endpoints and the HTTP client seam
//! - [`fetch`]: bounded concurrent tile downloads
//! - [`decode`]: GeoTIFF tile decoding
//! - [`mosaic`]: merging tiles into one raster
//! - [`orchestrator`]: the end-to-end [`ElevationRetriever`]
//! - [`config`]: retrieval settings and INI loading
//! - [`raster`]: elevation grids and geotransforms

pub mod config;
pub mod coord;
pub mod decode;
pub mod fetch;
pub mod mosaic;
pub mod orchestrator;
pub mod provider;
pub mod raster;

pub use config::RetrievalConfig;
pub use coord::{BoundingBox, Crs, TileCoord};
pub use mosaic::{Clip, MosaicRaster};
pub use orchestrator::{ElevationRetriever, FailurePolicy, RetrievalError, RetrievalOptions};
pub use provider::TileSource;
pub use raster::{ElevationGrid, GeoTransform, NO_DATA};
