//! GeoTIFF terrain tile decoding
//!
//! Turns a raw tile body into an [`ElevationGrid`] plus the tile's
//! [`GeoTransform`]. Georeferencing tags embedded in the file are ignored:
//! the transform is derived from the tile coordinate alone, so decoding the
//! same bytes for the same coordinate always yields the same result.

use std::io::Cursor;

use thiserror::Error;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::trace;

use crate::coord::TileCoord;
use crate::fetch::TileFailure;
use crate::provider::TILE_SIZE;
use crate::raster::{ElevationGrid, GeoTransform, NO_DATA};

/// GDAL_NODATA private TIFF tag (ASCII).
const GDAL_NODATA_TAG: u16 = 42113;

/// Errors raised while decoding a tile body.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Empty tile body")]
    Empty,

    #[error("TIFF decode failed: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Unexpected tile dimensions {width}x{height} (expected {expected}x{expected})")]
    UnexpectedDimensions {
        width: u32,
        height: u32,
        expected: u32,
    },

    #[error("Unsupported sample layout: {0}")]
    UnsupportedLayout(String),
}

/// A decoded tile ready for mosaicking.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTile {
    pub coord: TileCoord,
    pub grid: ElevationGrid,
    pub geotransform: GeoTransform,
}

/// Per-tile outcome after the decode stage.
#[derive(Debug, Clone)]
pub enum TileResult {
    Decoded(DecodedTile),
    Failed(TileFailure),
}

impl TileResult {
    pub fn coord(&self) -> TileCoord {
        match self {
            TileResult::Decoded(tile) => tile.coord,
            TileResult::Failed(failure) => failure.coord,
        }
    }

    pub fn is_decoded(&self) -> bool {
        matches!(self, TileResult::Decoded(_))
    }
}

/// Decodes single-band GeoTIFF elevation tiles.
#[derive(Debug, Clone, Copy)]
pub struct TileDecoder {
    tile_size: u32,
    neg_to_nodata: bool,
}

impl Default for TileDecoder {
    fn default() -> Self {
        Self::new(TILE_SIZE)
    }
}

impl TileDecoder {
    /// Creates a decoder expecting `tile_size`×`tile_size` tiles.
    pub fn new(tile_size: u32) -> Self {
        Self {
            tile_size,
            neg_to_nodata: false,
        }
    }

    /// Treat negative elevations (bathymetry) as no-data.
    pub fn with_neg_to_nodata(mut self, enabled: bool) -> Self {
        self.neg_to_nodata = enabled;
        self
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn decode(&self, bytes: &[u8], coord: TileCoord) -> Result<DecodedTile, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }

        let mut decoder = Decoder::new(Cursor::new(bytes))?;

        match decoder.colortype()? {
            ColorType::Gray(_) => {}
            other => {
                return Err(DecodeError::UnsupportedLayout(format!(
                    "expected one band, found {:?}",
                    other
                )))
            }
        }

        let (width, height) = decoder.dimensions()?;
        if width != self.tile_size || height != self.tile_size {
            return Err(DecodeError::UnexpectedDimensions {
                width,
                height,
                expected: self.tile_size,
            });
        }

        let nodata = decoder
            .get_tag_ascii_string(Tag::Unknown(GDAL_NODATA_TAG))
            .ok()
            .and_then(|s| s.trim().trim_end_matches('\0').parse::<f32>().ok());

        let mut samples = to_f32(decoder.read_image()?);
        for value in samples.iter_mut() {
            let missing = !value.is_finite()
                || nodata.is_some_and(|nd| *value == nd)
                || (self.neg_to_nodata && *value < 0.0);
            if missing {
                *value = NO_DATA;
            }
        }

        let grid = ElevationGrid::from_vec(width as usize, height as usize, samples).ok_or_else(
            || DecodeError::UnsupportedLayout("sample count does not match dimensions".to_string()),
        )?;

        trace!(tile = %coord, valid = grid.valid_count(), "Tile decoded");

        Ok(DecodedTile {
            coord,
            geotransform: GeoTransform::for_tile(&coord, self.tile_size),
            grid,
        })
    }
}

fn to_f32(result: DecodingResult) -> Vec<f32> {
    match result {
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::I16(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::U16(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
    }
}
