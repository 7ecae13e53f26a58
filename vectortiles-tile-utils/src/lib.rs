#![doc = "Tile pyramid math and Web-Mercator helpers for the vectortiles MVT generator."]
#![forbid(unsafe_code)]

use std::f64::consts::PI;

mod coord;
pub use coord::{BoundingBox, TileCoord, TileCoordError, xyz_to_bounds};

/// Equatorial radius of the earth used by Web Mercator (EPSG:3857), in meters.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Length of the equator in Web Mercator meters, which is also the width of the zoom 0 tile.
pub const EARTH_CIRCUMFERENCE: f64 = 2.0 * PI * EARTH_RADIUS;

/// Half of [`EARTH_CIRCUMFERENCE`], the Web Mercator origin shift.
pub const ORIGIN_SHIFT: f64 = EARTH_CIRCUMFERENCE / 2.0;

/// Highest latitude representable in Web Mercator.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_6;

/// Highest zoom level accepted by the tile math.
pub const MAX_ZOOM: u8 = 30;

/// SRID of WGS84 longitude/latitude coordinates.
pub const SRID_WGS84: i32 = 4326;

/// SRID of Web Mercator, the projected system all tiles are computed in.
pub const SRID_WEB_MERCATOR: i32 = 3857;

/// Raw tile payload.
pub type TileData = Vec<u8>;

/// Output format of an encoded tile, used to pick the HTTP content type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Format {
    /// `application/vnd.mapbox-vector-tile`
    #[default]
    Mvt,
    /// Legacy `application/x-protobuf` content type for the same payload
    Pbf,
}

impl Format {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value.to_ascii_lowercase().as_str() {
            "mvt" => Self::Mvt,
            "pbf" => Self::Pbf,
            _ => None?,
        })
    }

    #[must_use]
    pub fn content_type(&self) -> &str {
        match *self {
            Self::Mvt => "application/vnd.mapbox-vector-tile",
            Self::Pbf => "application/x-protobuf",
        }
    }

    #[must_use]
    pub fn extension(&self) -> &str {
        match *self {
            Self::Mvt => "mvt",
            Self::Pbf => "pbf",
        }
    }
}

/// Size in Web Mercator meters of one pixel at the given zoom, for a tile rendered `size` pixels wide.
#[must_use]
pub fn pixel_length(zoom: u8, size: u32) -> f64 {
    EARTH_CIRCUMFERENCE / f64::from(size) / f64::from(1_u32 << zoom.min(MAX_ZOOM))
}

/// Width of a tile at the given zoom, in Web Mercator meters.
#[must_use]
pub fn tile_length_from_zoom(zoom: u8) -> f64 {
    EARTH_CIRCUMFERENCE / f64::from(1_u32 << zoom.min(MAX_ZOOM))
}

/// Convert longitude and latitude (EPSG:4326) to Web Mercator meters (EPSG:3857).
///
/// Latitudes beyond [`MAX_LATITUDE`] are clamped so the result stays finite.
#[must_use]
pub fn wgs84_to_webmercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS * lat.to_radians().sin().atanh();
    (x, y)
}

/// Convert Web Mercator meters (EPSG:3857) to longitude and latitude (EPSG:4326).
#[must_use]
pub fn webmercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lng = (x / EARTH_RADIUS).to_degrees();
    let lat = f64::atan(f64::sinh(y / EARTH_RADIUS)).to_degrees();
    (lng, lat)
}
