use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{EARTH_CIRCUMFERENCE, MAX_ZOOM, ORIGIN_SHIFT};

/// Errors raised when a tile address does not exist in the tile pyramid.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TileCoordError {
    #[error("Zoom level {0} is outside of the supported range 0..={MAX_ZOOM}")]
    InvalidZoom(i64),

    #[error("Tile {z}/{x}/{y} does not exist: x and y must be below 2^{z}")]
    OutOfRange { z: i64, x: i64, y: i64 },

    #[error("Unable to parse tile coordinate '{0}', expected z/x/y")]
    Unparsable(String),
}

/// Address of a tile in the standard XYZ tile pyramid.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    /// Validate and build a tile coordinate from untrusted integers.
    pub fn try_new(z: i64, x: i64, y: i64) -> Result<Self, TileCoordError> {
        let zoom = u8::try_from(z)
            .ok()
            .filter(|z| *z <= MAX_ZOOM)
            .ok_or(TileCoordError::InvalidZoom(z))?;
        let max = 1_i64 << zoom;
        if !(0..max).contains(&x) || !(0..max).contains(&y) {
            return Err(TileCoordError::OutOfRange { z, x, y });
        }
        // both values were checked against 2^30
        Ok(Self {
            z: zoom,
            x: u32::try_from(x).map_err(|_| TileCoordError::OutOfRange { z, x, y })?,
            y: u32::try_from(y).map_err(|_| TileCoordError::OutOfRange { z, x, y })?,
        })
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.z <= MAX_ZOOM && self.x < (1_u32 << self.z) && self.y < (1_u32 << self.z)
    }

    /// Web Mercator bounds of this tile.
    pub fn bounds(&self) -> Result<BoundingBox, TileCoordError> {
        xyz_to_bounds(self.x, self.y, self.z)
    }
}

impl Display for TileCoord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if f.alternate() {
            write!(f, "{}/{}/{}", self.z, self.x, self.y)
        } else {
            write!(f, "{},{},{}", self.z, self.x, self.y)
        }
    }
}

impl FromStr for TileCoord {
    type Err = TileCoordError;

    /// Parses `z/x/y`, optionally followed by a file extension on `y`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || TileCoordError::Unparsable(s.to_string());
        let mut parts = s.trim_matches('/').split('/');
        let (Some(z), Some(x), Some(y), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(err());
        };
        let y = y.split_once('.').map_or(y, |(v, _)| v);
        Self::try_new(
            z.parse().map_err(|_| err())?,
            x.parse().map_err(|_| err())?,
            y.parse().map_err(|_| err())?,
        )
    }
}

/// Axis-aligned rectangle in Web Mercator meters.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl BoundingBox {
    #[must_use]
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// Grow the box by `distance` on every side.
    #[must_use]
    pub fn expand(&self, distance: f64) -> Self {
        Self::new(
            self.xmin - distance,
            self.ymin - distance,
            self.xmax + distance,
            self.ymax + distance,
        )
    }

    /// Grow the box by `buffer` tile pixels, where the tile is `extent` pixels wide.
    #[must_use]
    pub fn expand_pixels(&self, buffer: u32, extent: u32) -> Self {
        self.expand(self.width() * f64::from(buffer) / f64::from(extent))
    }

    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.xmin <= other.xmax
            && self.xmax >= other.xmin
            && self.ymin <= other.ymax
            && self.ymax >= other.ymin
    }

    #[must_use]
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        (self.xmin..=self.xmax).contains(&x) && (self.ymin..=self.ymax).contains(&y)
    }
}

impl Display for BoundingBox {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.xmin, self.ymin, self.xmax, self.ymax
        )
    }
}

/// Convert a tile address into its Web Mercator bounds.
///
/// The arithmetic mirrors the de-facto "xyz tile to meters" formula so the results agree
/// bit for bit with other tile tooling.
pub fn xyz_to_bounds(x: u32, y: u32, zoom: u8) -> Result<BoundingBox, TileCoordError> {
    let coord = TileCoord { z: zoom, x, y };
    if !coord.is_valid() {
        return Err(if zoom > MAX_ZOOM {
            TileCoordError::InvalidZoom(i64::from(zoom))
        } else {
            TileCoordError::OutOfRange {
                z: i64::from(zoom),
                x: i64::from(x),
                y: i64::from(y),
            }
        });
    }
    let tile_size = EARTH_CIRCUMFERENCE / f64::from(1_u32 << zoom);
    let left = f64::from(x) * tile_size - ORIGIN_SHIFT;
    let right = left + tile_size;
    let top = ORIGIN_SHIFT - f64::from(y) * tile_size;
    let bottom = top - tile_size;
    Ok(BoundingBox::new(left, bottom, right, top))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn world_tile_bounds_are_exact() {
        let bbox = xyz_to_bounds(0, 0, 0).unwrap();
        assert_eq!(
            bbox,
            BoundingBox::new(
                -20_037_508.342_789_244,
                -20_037_508.342_789_244,
                20_037_508.342_789_244,
                20_037_508.342_789_244,
            )
        );
    }

    #[rstest]
    #[case(1, 0, 0, [-20_037_508.342_789_244, 0.0, 0.0, 20_037_508.342_789_244])]
    #[case(1, 1, 1, [0.0, -20_037_508.342_789_244, 20_037_508.342_789_244, 0.0])]
    #[case(2, 1, 2, [-10_018_754.171_394_622, -10_018_754.171_394_622, 0.0, 0.0])]
    fn known_tile_bounds(#[case] z: u8, #[case] x: u32, #[case] y: u32, #[case] exp: [f64; 4]) {
        let bbox = xyz_to_bounds(x, y, z).unwrap();
        assert_relative_eq!(bbox.xmin, exp[0]);
        assert_relative_eq!(bbox.ymin, exp[1]);
        assert_relative_eq!(bbox.xmax, exp[2]);
        assert_relative_eq!(bbox.ymax, exp[3]);
    }

    #[rstest]
    fn bounds_are_ordered(#[values(0, 1, 5, 12, 22, 30)] z: u8) {
        let max = (1_u32 << z) - 1;
        for (x, y) in [(0, 0), (max, max), (max / 2, max / 3), (0, max)] {
            let bbox = xyz_to_bounds(x, y, z).unwrap();
            assert!(bbox.xmin < bbox.xmax, "{z}/{x}/{y}");
            assert!(bbox.ymin < bbox.ymax, "{z}/{x}/{y}");
        }
    }

    #[rstest]
    #[case(0, 1, 0)]
    #[case(0, 0, 1)]
    #[case(3, 8, 0)]
    #[case(31, 0, 0)]
    fn invalid_coordinates(#[case] z: u8, #[case] x: u32, #[case] y: u32) {
        assert!(xyz_to_bounds(x, y, z).is_err());
    }

    #[rstest]
    #[case(-1, 0, 0)]
    #[case(2, -1, 0)]
    #[case(2, 0, 4)]
    #[case(64, 0, 0)]
    fn try_new_rejects_out_of_pyramid(#[case] z: i64, #[case] x: i64, #[case] y: i64) {
        assert!(TileCoord::try_new(z, x, y).is_err());
    }

    #[test]
    fn parse_tile_coord() {
        let xyz: TileCoord = "3/4/2".parse().unwrap();
        assert_eq!(xyz, TileCoord { z: 3, x: 4, y: 2 });
        assert_eq!(format!("{xyz:#}"), "3/4/2");
        assert_eq!(format!("{xyz}"), "3,4,2");

        let xyz: TileCoord = "/5/1/7.mvt".parse().unwrap();
        assert_eq!(xyz, TileCoord { z: 5, x: 1, y: 7 });

        assert!("3/4".parse::<TileCoord>().is_err());
        assert!("a/b/c".parse::<TileCoord>().is_err());
        assert_eq!(
            "1/2/0".parse::<TileCoord>(),
            Err(TileCoordError::OutOfRange { z: 1, x: 2, y: 0 })
        );
    }

    #[test]
    fn expand_pixels() {
        let bbox = xyz_to_bounds(0, 0, 0).unwrap();
        let buffered = bbox.expand_pixels(256, 4096);
        assert_relative_eq!(buffered.width(), bbox.width() * (1.0 + 2.0 * 256.0 / 4096.0));
        assert!(buffered.intersects(&bbox));
        assert!(bbox.contains_point(0.0, 0.0));
    }
}
