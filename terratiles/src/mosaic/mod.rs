//! Tile mosaicking
//!
//! Merges decoded tiles into one contiguous raster. Tiles share a zoom level
//! and pixel grid, so merging is pure translation: each tile is copied at
//! its pixel offset inside the tile-aligned rectangle spanning every
//! requested tile, decoded or failed. Cells not covered by a decoded tile
//! stay [`NO_DATA`](crate::raster::NO_DATA), so the extent does not depend
//! on which tiles failed.
//!
//! ```text
//!  x_min                x_max
//!    ┌──────┬──────┬──────┐ y_min
//!    │ tile │ tile │ tile │
//!    ├──────┼──────┼──────┤
//!    │ tile │ hole │ tile │      hole = failed tile, NO_DATA
//!    ├──────┼──────┼──────┤
//!    │ tile │ tile │ hole │      failed tiles on the rim count too
//!    └──────┴──────┴──────┘ y_max
//! ```

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, warn};

use crate::coord::{BoundingBox, TileCoord};
use crate::decode::{DecodedTile, TileResult};
use crate::fetch::{FetchStats, TileFailure};
use crate::raster::{ElevationGrid, GeoTransform};

/// Sub-pixel tolerance when snapping crop edges to the pixel grid.
const CROP_EPSILON: f64 = 1e-6;

/// How the merged raster is trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clip {
    /// Crop to the requested bounding box, snapped outward to whole pixels.
    #[default]
    Bbox,
    /// Keep the full extent of the fetched tiles.
    Tile,
}

/// Errors raised while merging tiles.
#[derive(Debug, Error)]
pub enum MosaicError {
    #[error("All {} tiles failed", .failures.len())]
    AllTilesFailed { failures: Vec<TileFailure> },

    #[error("Inconsistent tile set: {0}")]
    InconsistentTiles(String),
}

/// A merged elevation raster.
#[derive(Debug, Clone)]
pub struct MosaicRaster {
    pub grid: ElevationGrid,
    pub geotransform: GeoTransform,
    /// Tiles that contributed data, in row-major order.
    pub tiles: Vec<TileCoord>,
    /// Tiles that could not be fetched or decoded, in row-major order.
    pub failures: Vec<TileFailure>,
    pub stats: FetchStats,
}

impl MosaicRaster {
    pub fn width(&self) -> usize {
        self.grid.width()
    }

    pub fn height(&self) -> usize {
        self.grid.height()
    }

    /// True if some requested tiles are missing from the raster.
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Web Mercator extent as `(min_x, min_y, max_x, max_y)`.
    pub fn extent(&self) -> (f64, f64, f64, f64) {
        let (min_x, max_y) = self.geotransform.pixel_to_world(0.0, 0.0);
        let (max_x, min_y) = self
            .geotransform
            .pixel_to_world(self.height() as f64, self.width() as f64);
        (min_x, min_y, max_x, max_y)
    }
}

/// Merges per-tile results into a [`MosaicRaster`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Mosaicker;

impl Mosaicker {
    /// Merges `results` and trims the raster according to `clip`.
    ///
    /// `bbox` is the region as requested, before any expansion margin.
    ///
    /// # Errors
    ///
    /// - [`MosaicError::AllTilesFailed`] if no tile decoded
    /// - [`MosaicError::InconsistentTiles`] if tiles or failures differ in
    ///   zoom, or tiles differ in size
    pub fn merge(
        results: Vec<TileResult>,
        bbox: &BoundingBox,
        clip: Clip,
    ) -> Result<MosaicRaster, MosaicError> {
        let mut failures = Vec::new();
        let mut decoded: Vec<DecodedTile> = Vec::new();
        let mut seen = HashSet::new();

        for result in results {
            match result {
                TileResult::Decoded(tile) => {
                    if seen.insert(tile.coord) {
                        decoded.push(tile);
                    } else {
                        warn!(tile = %tile.coord, "Duplicate tile skipped");
                    }
                }
                TileResult::Failed(failure) => failures.push(failure),
            }
        }
        failures.sort_by_key(|f| f.coord);

        if decoded.is_empty() {
            return Err(MosaicError::AllTilesFailed { failures });
        }
        decoded.sort_by_key(|t| t.coord);

        let first = &decoded[0];
        let zoom = first.coord.z;
        let tile_size = first.grid.width();
        let coords = decoded.iter().map(|t| t.coord).chain(failures.iter().map(|f| f.coord));
        if let Some(stray) = coords.clone().find(|c| c.z != zoom) {
            return Err(MosaicError::InconsistentTiles(format!(
                "tile {} is not at zoom {}",
                stray, zoom
            )));
        }
        for tile in &decoded {
            if tile.grid.width() != tile_size || tile.grid.height() != tile_size {
                return Err(MosaicError::InconsistentTiles(format!(
                    "tile {} is {}x{}, expected {}x{}",
                    tile.coord,
                    tile.grid.width(),
                    tile.grid.height(),
                    tile_size,
                    tile_size
                )));
            }
        }

        // Failed tiles widen the rectangle; they are left as NO_DATA.
        let x_min = coords.clone().map(|c| c.x).min().unwrap_or(first.coord.x);
        let x_max = coords.clone().map(|c| c.x).max().unwrap_or(first.coord.x);
        let y_min = coords.clone().map(|c| c.y).min().unwrap_or(first.coord.y);
        let y_max = coords.map(|c| c.y).max().unwrap_or(first.coord.y);

        let width = (x_max - x_min + 1) as usize * tile_size;
        let height = (y_max - y_min + 1) as usize * tile_size;
        let origin = TileCoord {
            z: zoom,
            x: x_min,
            y: y_min,
        };
        let geotransform = GeoTransform::for_tile(&origin, tile_size as u32);

        let mut grid = ElevationGrid::filled_no_data(width, height);
        for tile in &decoded {
            let row = (tile.coord.y - y_min) as usize * tile_size;
            let col = (tile.coord.x - x_min) as usize * tile_size;
            grid.blit(&tile.grid, row, col);
        }

        debug!(
            tiles = decoded.len(),
            failed = failures.len(),
            width,
            height,
            "Tiles merged"
        );

        let (grid, geotransform) = match clip {
            Clip::Tile => (grid, geotransform),
            Clip::Bbox => crop_to_bbox(grid, geotransform, bbox),
        };

        Ok(MosaicRaster {
            grid,
            geotransform,
            tiles: decoded.into_iter().map(|t| t.coord).collect(),
            failures,
            stats: FetchStats::default(),
        })
    }
}

/// Crops to the pixels intersecting `bbox`, keeping at least one pixel.
fn crop_to_bbox(
    grid: ElevationGrid,
    geotransform: GeoTransform,
    bbox: &BoundingBox,
) -> (ElevationGrid, GeoTransform) {
    let (min_x, min_y, max_x, max_y) = bbox.to_web_mercator();
    let (top, left) = geotransform.world_to_pixel(min_x, max_y);
    let (bottom, right) = geotransform.world_to_pixel(max_x, min_y);

    let (col0, col1) = pixel_span(left, right, grid.width());
    let (row0, row1) = pixel_span(top, bottom, grid.height());

    if (row0, row1, col0, col1) == (0, grid.height(), 0, grid.width()) {
        return (grid, geotransform);
    }

    (
        grid.window(row0, row1, col0, col1),
        geotransform.offset(row0, col0),
    )
}

/// Whole-pixel range `[start, end)` covering `[lo, hi]`, clamped to `0..len`.
fn pixel_span(lo: f64, hi: f64, len: usize) -> (usize, usize) {
    let max = len as f64;
    let start = (lo + CROP_EPSILON).floor().clamp(0.0, max) as usize;
    let end = (hi - CROP_EPSILON).ceil().clamp(0.0, max) as usize;

    if end > start {
        (start, end)
    } else {
        let start = start.min(len.saturating_sub(1));
        (start, start + 1)
    }
}
