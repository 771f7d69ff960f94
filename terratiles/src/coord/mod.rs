//! Coordinate conversion and tile indexing
//!
//! Converts bounding boxes in EPSG:4326 or EPSG:3857 into the set of Web
//! Mercator XYZ tiles that cover them.
//!
//! # Tile selection
//!
//! A tile is selected when its closed extent intersects the closed bounding
//! box. A box edge lying exactly on a tile boundary therefore pulls in the
//! tiles on both sides of that boundary, each exactly once.
//!
//! ```text
//!          edge at x = k
//!               │
//!   tile k-1    │    tile k
//!               ├───────── bbox ───
//! ```

mod types;

pub use types::{
    BoundingBox, CoordError, Crs, TileCoord, EARTH_RADIUS, MAX_LAT, MAX_ZOOM, MIN_LAT, ORIGIN_SHIFT,
};

use std::f64::consts::PI;

/// Inclusive tile index ranges `(x_min, x_max, y_min, y_max)` at one zoom.
type TileRange = (u32, u32, u32, u32);

/// Computes the tiles covering `bbox` at `zoom`, in row-major order.
///
/// # Errors
///
/// - [`CoordError::InvalidZoom`] if `zoom` is above [`MAX_ZOOM`]
/// - [`CoordError::UnsupportedRegion`] if the box crosses the anti-meridian
pub fn compute_tiles(bbox: &BoundingBox, zoom: u8) -> Result<Vec<TileCoord>, CoordError> {
    let (x_min, x_max, y_min, y_max) = tile_range(bbox, zoom)?;

    let mut tiles = Vec::with_capacity(((x_max - x_min + 1) * (y_max - y_min + 1)) as usize);
    for y in y_min..=y_max {
        for x in x_min..=x_max {
            tiles.push(TileCoord { z: zoom, x, y });
        }
    }
    Ok(tiles)
}

/// Number of tiles [`compute_tiles`] would return, without enumerating them.
pub fn tile_count(bbox: &BoundingBox, zoom: u8) -> Result<u64, CoordError> {
    let (x_min, x_max, y_min, y_max) = tile_range(bbox, zoom)?;
    Ok((x_max - x_min + 1) as u64 * (y_max - y_min + 1) as u64)
}

fn tile_range(bbox: &BoundingBox, zoom: u8) -> Result<TileRange, CoordError> {
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }

    let (west, east) = match bbox.crs() {
        Crs::Wgs84 => (
            normalize_longitude(bbox.min_x()),
            normalize_longitude(bbox.max_x()),
        ),
        Crs::WebMercator => (
            normalize_mercator_x(bbox.min_x()),
            normalize_mercator_x(bbox.max_x()),
        ),
    };
    if west > east {
        return Err(CoordError::UnsupportedRegion(format!(
            "{} crosses the anti-meridian",
            bbox
        )));
    }

    let (nx_west, ny_north) = to_normalized(west, bbox.max_y(), bbox.crs());
    let (nx_east, ny_south) = to_normalized(east, bbox.min_y(), bbox.crs());

    let n = (1u64 << zoom) as f64;
    let max_index = (1u32 << zoom) - 1;

    Ok((
        lower_index(nx_west * n, max_index),
        upper_index(nx_east * n, max_index),
        lower_index(ny_north * n, max_index),
        upper_index(ny_south * n, max_index),
    ))
}

/// First tile index touching a lower edge at `v` (in tile units).
///
/// An edge exactly on a boundary also includes the tile before it.
#[inline]
fn lower_index(v: f64, max_index: u32) -> u32 {
    let floor = v.floor();
    let index = if floor == v && floor > 0.0 {
        floor - 1.0
    } else {
        floor
    };
    (index.max(0.0) as u32).min(max_index)
}

/// Last tile index touching an upper edge at `v` (in tile units).
#[inline]
fn upper_index(v: f64, max_index: u32) -> u32 {
    (v.floor().max(0.0) as u32).min(max_index)
}

/// Projects a point into the tiling scheme's normalized `[0, 1]²` space.
///
/// `x` grows eastward, `y` grows southward.
fn to_normalized(x: f64, y: f64, crs: Crs) -> (f64, f64) {
    let (nx, ny) = match crs {
        Crs::Wgs84 => {
            let lat_rad = y.clamp(MIN_LAT, MAX_LAT).to_radians();
            (
                (x + 180.0) / 360.0,
                (1.0 - lat_rad.tan().asinh() / PI) / 2.0,
            )
        }
        Crs::WebMercator => {
            let y = y.clamp(-ORIGIN_SHIFT, ORIGIN_SHIFT);
            (
                (x + ORIGIN_SHIFT) / (2.0 * ORIGIN_SHIFT),
                (ORIGIN_SHIFT - y) / (2.0 * ORIGIN_SHIFT),
            )
        }
    };
    (nx.clamp(0.0, 1.0), ny.clamp(0.0, 1.0))
}

/// Wraps a longitude into `[-180, 180]`, leaving in-range values untouched.
pub fn normalize_longitude(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        lon
    } else {
        (lon + 180.0).rem_euclid(360.0) - 180.0
    }
}

fn normalize_mercator_x(x: f64) -> f64 {
    if (-ORIGIN_SHIFT..=ORIGIN_SHIFT).contains(&x) {
        x
    } else {
        (x + ORIGIN_SHIFT).rem_euclid(2.0 * ORIGIN_SHIFT) - ORIGIN_SHIFT
    }
}

/// Converts longitude/latitude degrees to Web Mercator meters.
///
/// Latitude is clamped to the Mercator limits.
#[inline]
pub fn lon_lat_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat_rad = lat.clamp(MIN_LAT, MAX_LAT).to_radians();
    let x = lon.to_radians() * EARTH_RADIUS;
    let y = lat_rad.tan().asinh() * EARTH_RADIUS;
    (x, y)
}

/// Converts Web Mercator meters back to longitude/latitude degrees.
#[inline]
pub fn mercator_to_lon_lat(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (y / EARTH_RADIUS).sinh().atan().to_degrees();
    (lon, lat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn wgs84(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> BoundingBox {
        BoundingBox::wgs84(min_lon, min_lat, max_lon, max_lat).unwrap()
    }

    #[test]
    fn test_two_degree_box_at_zoom_9() {
        // x: 106.67 → 109.51 (4 columns), y: 191.96 → 195.68 (5 rows)
        let bbox = wgs84(-105.0, 39.0, -103.0, 41.0);
        let tiles = compute_tiles(&bbox, 9).unwrap();

        assert_eq!(tiles.len(), 20);
        assert_eq!(tile_count(&bbox, 9).unwrap(), 20);
        assert_eq!(tiles.first(), Some(&TileCoord { z: 9, x: 106, y: 191 }));
        assert_eq!(tiles.last(), Some(&TileCoord { z: 9, x: 109, y: 195 }));
    }

    #[test]
    fn test_tiles_are_row_major() {
        let bbox = wgs84(-105.0, 39.0, -103.0, 41.0);
        let tiles = compute_tiles(&bbox, 9).unwrap();

        let mut sorted = tiles.clone();
        sorted.sort();
        assert_eq!(tiles, sorted);
        assert_eq!(tiles[1], TileCoord { z: 9, x: 107, y: 191 });
    }

    #[test]
    fn test_box_on_tile_boundary_includes_both_sides_once() {
        // Longitude 0 is exactly the boundary between columns 255 and 256 at zoom 9.
        let bbox = wgs84(0.0, 10.0, 0.1, 10.1);
        let tiles = compute_tiles(&bbox, 9).unwrap();

        let columns: Vec<u32> = tiles.iter().map(|t| t.x).collect();
        assert!(columns.contains(&255));
        assert!(columns.contains(&256));
        assert_eq!(columns.iter().filter(|&&x| x == 255).count(), 1);
        assert_eq!(columns.iter().filter(|&&x| x == 256).count(), 1);
    }

    #[test]
    fn test_box_ending_on_equator_includes_southern_row() {
        // Latitude 0 is exactly the boundary between rows 1 and 2 at zoom 2.
        let bbox = wgs84(10.0, 0.0, 11.0, 1.0);
        let tiles = compute_tiles(&bbox, 2).unwrap();
        let rows: HashSet<u32> = tiles.iter().map(|t| t.y).collect();
        assert_eq!(rows, HashSet::from([1, 2]));
    }

    #[test]
    fn test_zoom_zero_is_single_tile() {
        let bbox = wgs84(-170.0, -80.0, 170.0, 80.0);
        let tiles = compute_tiles(&bbox, 0).unwrap();
        assert_eq!(tiles, vec![TileCoord { z: 0, x: 0, y: 0 }]);
    }

    #[test]
    fn test_whole_world_at_zoom_two() {
        let bbox = wgs84(-180.0, -90.0, 180.0, 90.0);
        let tiles = compute_tiles(&bbox, 2).unwrap();
        assert_eq!(tiles.len(), 16);
    }

    #[test]
    fn test_anti_meridian_is_unsupported() {
        // 190°E normalizes to -170°, west of the 170° minimum
        let bbox = wgs84(170.0, -10.0, 190.0, 10.0);
        assert!(matches!(
            compute_tiles(&bbox, 5),
            Err(CoordError::UnsupportedRegion(_))
        ));
    }

    #[test]
    fn test_expand_near_anti_meridian_keeps_tiles() {
        let bbox = wgs84(179.0, 0.0, 179.9, 1.0);
        let base = compute_tiles(&bbox, 5).unwrap();
        let grown = compute_tiles(&bbox.expand(0.5).unwrap(), 5).unwrap();

        assert_eq!(base.len(), 2);
        assert!(base.iter().all(|t| grown.contains(t)));
        assert!(grown.iter().all(|t| t.x == 31));
    }

    #[test]
    fn test_invalid_zoom() {
        let bbox = wgs84(0.0, 0.0, 1.0, 1.0);
        assert_eq!(compute_tiles(&bbox, 16), Err(CoordError::InvalidZoom(16)));
    }

    #[test]
    fn test_web_mercator_box_matches_wgs84_box() {
        let wgs = wgs84(-105.0, 39.0, -103.0, 41.0);
        let (min_x, min_y, max_x, max_y) = wgs.to_web_mercator();
        let merc = BoundingBox::web_mercator(min_x, min_y, max_x, max_y).unwrap();

        assert_eq!(
            compute_tiles(&wgs, 9).unwrap(),
            compute_tiles(&merc, 9).unwrap()
        );
    }

    #[test]
    fn test_normalize_longitude() {
        assert_eq!(normalize_longitude(180.0), 180.0);
        assert_eq!(normalize_longitude(-180.0), -180.0);
        assert!((normalize_longitude(190.0) - (-170.0)).abs() < 1e-9);
        assert!((normalize_longitude(-190.0) - 170.0).abs() < 1e-9);
    }

    #[test]
    fn test_mercator_roundtrip() {
        let (x, y) = lon_lat_to_mercator(-122.3321, 47.6062);
        let (lon, lat) = mercator_to_lon_lat(x, y);
        assert!((lon + 122.3321).abs() < 1e-9);
        assert!((lat - 47.6062).abs() < 1e-9);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Tiles cover the box and never repeat
            #[test]
            fn prop_tiles_cover_box_without_repeats(
                lon in -179.0f64..178.0,
                lat in -84.0f64..83.0,
                width in 0.001f64..1.0,
                height in 0.001f64..1.0,
                zoom in 0u8..=12,
            ) {
                let bbox = wgs84(lon, lat, lon + width, lat + height);
                let tiles = compute_tiles(&bbox, zoom).unwrap();

                let unique: HashSet<_> = tiles.iter().collect();
                prop_assert_eq!(unique.len(), tiles.len());

                let (bx0, by0, bx1, by1) = bbox.to_web_mercator();
                let (mut tx0, mut ty0) = (f64::MAX, f64::MAX);
                let (mut tx1, mut ty1) = (f64::MIN, f64::MIN);
                for tile in &tiles {
                    let (x0, y0, x1, y1) = tile.extent();
                    tx0 = tx0.min(x0);
                    ty0 = ty0.min(y0);
                    tx1 = tx1.max(x1);
                    ty1 = ty1.max(y1);
                }
                let eps = 1e-6;
                prop_assert!(tx0 <= bx0 + eps && ty0 <= by0 + eps);
                prop_assert!(tx1 >= bx1 - eps && ty1 >= by1 - eps);
            }

            /// Expanding the box never loses tiles
            #[test]
            fn prop_expand_is_superset(
                lon in -180.0f64..180.0,
                lat in -85.0f64..84.0,
                size in 0.001f64..1.0,
                margin in 0.0f64..2.0,
                zoom in 0u8..=12,
            ) {
                prop_assume!(lon + size <= 180.0);
                let bbox = wgs84(lon, lat, lon + size, lat + size);
                let base: HashSet<_> = compute_tiles(&bbox, zoom).unwrap().into_iter().collect();
                let grown: HashSet<_> = compute_tiles(&bbox.expand(margin).unwrap(), zoom)
                    .unwrap()
                    .into_iter()
                    .collect();
                prop_assert!(base.is_subset(&grown));
            }
        }
    }
}
