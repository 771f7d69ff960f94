//! Elevation grids and their georeferencing.
//!
//! Grids are row-major (north to south, west to east) `f32` elevations in
//! meters. Missing cells hold [`NO_DATA`].

use crate::coord::TileCoord;

/// Sentinel marking a cell without a known elevation.
pub const NO_DATA: f32 = -32768.0;

/// Returns true if `value` is the no-data sentinel.
#[inline]
pub fn is_no_data(value: f32) -> bool {
    value == NO_DATA
}

/// Affine mapping from grid cells to Web Mercator meters.
///
/// `origin_x`/`origin_y` is the top-left corner of cell (0, 0). Pixel height
/// is negative because rows advance southward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Geotransform of a tile decoded at `tile_size` pixels per side.
    ///
    /// Derived from the tile coordinate alone.
    pub fn for_tile(coord: &TileCoord, tile_size: u32) -> Self {
        let (min_x, _, _, max_y) = coord.extent();
        let pixel = coord.span_meters() / tile_size as f64;
        Self {
            origin_x: min_x,
            origin_y: max_y,
            pixel_width: pixel,
            pixel_height: -pixel,
        }
    }

    /// World coordinate of the top-left corner of cell `(row, col)`.
    #[inline]
    pub fn pixel_to_world(&self, row: f64, col: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width,
            self.origin_y + row * self.pixel_height,
        )
    }

    /// Fractional `(row, col)` of a world coordinate.
    #[inline]
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (y - self.origin_y) / self.pixel_height,
            (x - self.origin_x) / self.pixel_width,
        )
    }

    /// Returns the transform shifted so that cell `(row, col)` becomes the origin.
    pub fn offset(&self, row: usize, col: usize) -> Self {
        let (origin_x, origin_y) = self.pixel_to_world(row as f64, col as f64);
        Self {
            origin_x,
            origin_y,
            ..*self
        }
    }

    /// GDAL six-coefficient form.
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            0.0,
            self.origin_y,
            0.0,
            self.pixel_height,
        ]
    }
}

/// Row-major 2-D elevation grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationGrid {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl ElevationGrid {
    /// Creates a grid with every cell set to [`NO_DATA`].
    pub fn filled_no_data(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![NO_DATA; width * height],
        }
    }

    /// Wraps row-major samples. Returns `None` if the length does not match.
    pub fn from_vec(width: usize, height: usize, data: Vec<f32>) -> Option<Self> {
        (data.len() == width * height).then_some(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Elevation at `(row, col)`, or `None` outside the grid.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        (row < self.height && col < self.width).then(|| self.data[row * self.width + col])
    }

    /// One row of samples.
    pub fn row(&self, row: usize) -> &[f32] {
        let start = row * self.width;
        &self.data[start..start + self.width]
    }

    /// Copies `src` into this grid with its top-left cell at `(row, col)`.
    ///
    /// Parts of `src` falling outside this grid are dropped.
    pub fn blit(&mut self, src: &ElevationGrid, row: usize, col: usize) {
        if row >= self.height || col >= self.width {
            return;
        }
        let rows = src.height.min(self.height - row);
        let cols = src.width.min(self.width - col);
        for r in 0..rows {
            let dst_start = (row + r) * self.width + col;
            self.data[dst_start..dst_start + cols].copy_from_slice(&src.row(r)[..cols]);
        }
    }

    /// Extracts the window `[row0, row1) × [col0, col1)`.
    pub fn window(&self, row0: usize, row1: usize, col0: usize, col1: usize) -> Self {
        let row1 = row1.min(self.height);
        let col1 = col1.min(self.width);
        let height = row1.saturating_sub(row0);
        let width = col1.saturating_sub(col0);

        let mut data = Vec::with_capacity(width * height);
        for r in row0..row0 + height {
            data.extend_from_slice(&self.row(r)[col0..col0 + width]);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Number of cells holding real elevations.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !is_no_data(**v)).count()
    }

    /// `(min, max)` over valid cells, or `None` if every cell is no-data.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .copied()
            .filter(|v| !is_no_data(*v))
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}
