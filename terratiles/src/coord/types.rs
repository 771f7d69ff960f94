//! Coordinate types: tiles, bounding boxes and their errors.

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

/// Maximum zoom level served by the terrain tile sources.
pub const MAX_ZOOM: u8 = 15;

/// Maximum latitude representable in Web Mercator (arctan(sinh(π))).
pub const MAX_LAT: f64 = 85.05112878;

/// Minimum latitude representable in Web Mercator.
pub const MIN_LAT: f64 = -85.05112878;

/// Equatorial radius used by EPSG:3857, in meters.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Half the width of the Web Mercator world, in meters (π × R).
pub const ORIGIN_SHIFT: f64 = std::f64::consts::PI * EARTH_RADIUS;

/// Errors raised while validating regions or computing tile sets.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    /// The bounding box is degenerate, inverted or not finite.
    #[error("Invalid bounding box ({min_x}, {min_y}, {max_x}, {max_y}): {reason}")]
    InvalidBoundingBox {
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
        reason: &'static str,
    },

    /// The region crosses a boundary the tiling scheme cannot express
    /// as a single rectangle (the anti-meridian).
    #[error("Unsupported region: {0}")]
    UnsupportedRegion(String),

    /// Zoom level outside the supported range.
    #[error("Invalid zoom level {0} (must be 0-15)")]
    InvalidZoom(u8),
}

/// Coordinate reference of a bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Crs {
    /// EPSG:4326 longitude/latitude in degrees.
    #[default]
    Wgs84,
    /// EPSG:3857 Web Mercator in meters. Tiles and rasters live here.
    WebMercator,
}

impl Crs {
    /// EPSG code of this reference.
    pub fn epsg(&self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::WebMercator => 3857,
        }
    }

    /// Half-widths `(x, y)` of the world in this reference's units.
    pub fn world_half_extent(&self) -> (f64, f64) {
        match self {
            Crs::Wgs84 => (180.0, 90.0),
            Crs::WebMercator => (ORIGIN_SHIFT, ORIGIN_SHIFT),
        }
    }

    /// Parses an EPSG code or a short name (`wgs84`, `webmercator`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "4326" | "epsg:4326" | "wgs84" | "lonlat" => Some(Crs::Wgs84),
            "3857" | "epsg:3857" | "webmercator" | "mercator" => Some(Crs::WebMercator),
            _ => None,
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// XYZ tile coordinate in the Web Mercator tiling scheme.
///
/// - `x`: column, 0 at 180°W, increasing eastward
/// - `y`: row, 0 at ~85.05°N, increasing southward
///
/// Ordering is row-major within a zoom level: `(z, y, x)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    /// Creates a tile coordinate, checking it exists at zoom `z`.
    pub fn new(z: u8, x: u32, y: u32) -> Result<Self, CoordError> {
        if z > MAX_ZOOM {
            return Err(CoordError::InvalidZoom(z));
        }
        let n = 1u32 << z;
        if x >= n || y >= n {
            return Err(CoordError::UnsupportedRegion(format!(
                "tile {}/{}/{} does not exist at zoom {}",
                z, x, y, z
            )));
        }
        Ok(Self { z, x, y })
    }

    /// Width of one tile at this zoom, in Web Mercator meters.
    #[inline]
    pub fn span_meters(&self) -> f64 {
        2.0 * ORIGIN_SHIFT / (1u64 << self.z) as f64
    }

    /// Web Mercator extent as `(min_x, min_y, max_x, max_y)`.
    pub fn extent(&self) -> (f64, f64, f64, f64) {
        let span = self.span_meters();
        let min_x = -ORIGIN_SHIFT + self.x as f64 * span;
        let max_y = ORIGIN_SHIFT - self.y as f64 * span;
        (min_x, max_y - span, min_x + span, max_y)
    }

    /// URL path component `{z}/{x}/{y}`.
    pub fn path(&self) -> String {
        format!("{}/{}/{}", self.z, self.x, self.y)
    }
}

impl Ord for TileCoord {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.z, self.y, self.x).cmp(&(other.z, other.y, other.x))
    }
}

impl PartialOrd for TileCoord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Axis-aligned region in a known coordinate reference.
///
/// Immutable once built; [`BoundingBox::expand`] returns a new box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
    crs: Crs,
}

impl BoundingBox {
    /// Creates a bounding box, rejecting non-finite or inverted extents.
    pub fn new(
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
        crs: Crs,
    ) -> Result<Self, CoordError> {
        let invalid = |reason| CoordError::InvalidBoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
            reason,
        };

        if ![min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite()) {
            return Err(invalid("coordinates must be finite"));
        }
        if min_x >= max_x {
            return Err(invalid("min_x must be less than max_x"));
        }
        if min_y >= max_y {
            return Err(invalid("min_y must be less than max_y"));
        }

        Ok(Self {
            min_x,
            min_y,
            max_x,
            max_y,
            crs,
        })
    }

    /// Creates a longitude/latitude box (EPSG:4326).
    pub fn wgs84(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self, CoordError> {
        Self::new(min_lon, min_lat, max_lon, max_lat, Crs::Wgs84)
    }

    /// Creates a Web Mercator box (EPSG:3857).
    pub fn web_mercator(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self, CoordError> {
        Self::new(min_x, min_y, max_x, max_y, Crs::WebMercator)
    }

    pub fn min_x(&self) -> f64 {
        self.min_x
    }

    pub fn min_y(&self) -> f64 {
        self.min_y
    }

    pub fn max_x(&self) -> f64 {
        self.max_x
    }

    pub fn max_y(&self) -> f64 {
        self.max_y
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    /// Returns a copy grown by `margin` (in this box's units) on every side.
    ///
    /// Growth stops at the world edge, so a box touching ±180° never wraps
    /// across the anti-meridian. Edges already outside the world are kept.
    pub fn expand(&self, margin: f64) -> Result<Self, CoordError> {
        if !margin.is_finite() || margin < 0.0 {
            return Err(CoordError::InvalidBoundingBox {
                min_x: self.min_x,
                min_y: self.min_y,
                max_x: self.max_x,
                max_y: self.max_y,
                reason: "expand margin must be a finite, non-negative number",
            });
        }
        let (half_x, half_y) = self.crs.world_half_extent();
        Self::new(
            (self.min_x - margin).max(self.min_x.min(-half_x)),
            (self.min_y - margin).max(self.min_y.min(-half_y)),
            (self.max_x + margin).min(self.max_x.max(half_x)),
            (self.max_y + margin).min(self.max_y.max(half_y)),
            self.crs,
        )
    }

    /// Projects the box into Web Mercator meters as `(min_x, min_y, max_x, max_y)`.
    ///
    /// Latitudes are clamped to the Mercator limits.
    pub fn to_web_mercator(&self) -> (f64, f64, f64, f64) {
        match self.crs {
            Crs::WebMercator => (self.min_x, self.min_y, self.max_x, self.max_y),
            Crs::Wgs84 => {
                let (min_x, min_y) =
                    super::lon_lat_to_mercator(super::normalize_longitude(self.min_x), self.min_y);
                let (max_x, max_y) =
                    super::lon_lat_to_mercator(super::normalize_longitude(self.max_x), self.max_y);
                (min_x, min_y, max_x, max_y)
            }
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}] {}",
            self.min_x, self.min_y, self.max_x, self.max_y, self.crs
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_rejects_inverted() {
        let result = BoundingBox::wgs84(10.0, 0.0, 5.0, 1.0);
        assert!(matches!(
            result,
            Err(CoordError::InvalidBoundingBox { .. })
        ));
    }

    #[test]
    fn test_bbox_rejects_degenerate_and_nan() {
        assert!(BoundingBox::wgs84(1.0, 1.0, 1.0, 2.0).is_err());
        assert!(BoundingBox::wgs84(0.0, f64::NAN, 1.0, 2.0).is_err());
    }

    #[test]
    fn test_expand_grows_every_side() {
        let bbox = BoundingBox::wgs84(-1.0, -2.0, 1.0, 2.0).unwrap();
        let grown = bbox.expand(0.5).unwrap();
        assert_eq!(grown.min_x(), -1.5);
        assert_eq!(grown.min_y(), -2.5);
        assert_eq!(grown.max_x(), 1.5);
        assert_eq!(grown.max_y(), 2.5);
        assert_eq!(grown.crs(), Crs::Wgs84);
        // Original is untouched
        assert_eq!(bbox.min_x(), -1.0);
    }

    #[test]
    fn test_expand_stops_at_world_edge() {
        let bbox = BoundingBox::wgs84(179.0, 89.8, 179.9, 89.9).unwrap();
        let grown = bbox.expand(0.5).unwrap();
        assert_eq!(grown.min_x(), 178.5);
        assert_eq!(grown.max_x(), 180.0);
        assert_eq!(grown.max_y(), 90.0);

        let merc = BoundingBox::web_mercator(-ORIGIN_SHIFT, 0.0, 0.0, 1.0).unwrap();
        let grown = merc.expand(1000.0).unwrap();
        assert_eq!(grown.min_x(), -ORIGIN_SHIFT);
        assert_eq!(grown.max_x(), 1000.0);
    }

    #[test]
    fn test_expand_rejects_negative_margin() {
        let bbox = BoundingBox::wgs84(-1.0, -2.0, 1.0, 2.0).unwrap();
        assert!(bbox.expand(-0.1).is_err());
    }

    #[test]
    fn test_tile_coord_rejects_out_of_range() {
        assert!(TileCoord::new(2, 3, 3).is_ok());
        assert!(TileCoord::new(2, 4, 0).is_err());
        assert!(matches!(
            TileCoord::new(16, 0, 0),
            Err(CoordError::InvalidZoom(16))
        ));
    }

    #[test]
    fn test_tile_extent_at_zoom_zero_is_world() {
        let tile = TileCoord::new(0, 0, 0).unwrap();
        let (min_x, min_y, max_x, max_y) = tile.extent();
        assert!((min_x + ORIGIN_SHIFT).abs() < 1e-6);
        assert!((min_y + ORIGIN_SHIFT).abs() < 1e-6);
        assert!((max_x - ORIGIN_SHIFT).abs() < 1e-6);
        assert!((max_y - ORIGIN_SHIFT).abs() < 1e-6);
    }

    #[test]
    fn test_tile_ordering_is_row_major() {
        let mut tiles = vec![
            TileCoord { z: 3, x: 1, y: 2 },
            TileCoord { z: 3, x: 2, y: 1 },
            TileCoord { z: 3, x: 0, y: 2 },
            TileCoord { z: 3, x: 1, y: 1 },
        ];
        tiles.sort();
        let order: Vec<_> = tiles.iter().map(|t| (t.y, t.x)).collect();
        assert_eq!(order, vec![(1, 1), (1, 2), (2, 0), (2, 1)]);
    }

    #[test]
    fn test_crs_parse() {
        assert_eq!(Crs::parse("EPSG:4326"), Some(Crs::Wgs84));
        assert_eq!(Crs::parse("3857"), Some(Crs::WebMercator));
        assert_eq!(Crs::parse("utm"), None);
        assert_eq!(Crs::WebMercator.to_string(), "EPSG:3857");
    }
}
