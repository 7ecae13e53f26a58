//! In-process geometry processing: reprojection, simplification, clipping and
//! quantization into tile pixel space.

use geo::{
    BooleanOps as _, BoundingRect as _, Centroid as _, Coord, Geometry, GeometryCollection,
    LineString, MapCoords as _, MapCoordsInPlace as _, MultiLineString, MultiPoint, MultiPolygon,
    Polygon, Rect, Simplify as _,
};
use vectortiles_tile_utils::{BoundingBox, SRID_WEB_MERCATOR, SRID_WGS84, wgs84_to_webmercator};

/// Reference tile size used to derive the simplification tolerance for a zoom level.
pub const SIMPLIFICATION_TILE_SIZE: u32 = 512;

/// Reproject a geometry into Web Mercator in place.
///
/// Returns `false` if `srid` cannot be handled in-process.
pub fn to_web_mercator(geom: &mut Geometry<f64>, srid: i32) -> bool {
    match srid {
        SRID_WEB_MERCATOR => true,
        SRID_WGS84 => {
            geom.map_coords_in_place(|Coord { x, y }| {
                let (x, y) = wgs84_to_webmercator(x, y);
                Coord { x, y }
            });
            true
        }
        _ => false,
    }
}

/// Web Mercator envelope of a geometry, `None` for empty geometries.
#[must_use]
pub fn envelope(geom: &Geometry<f64>) -> Option<BoundingBox> {
    geom.bounding_rect().map(|r| rect_to_bbox(&r))
}

fn rect_to_bbox(rect: &Rect<f64>) -> BoundingBox {
    BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
}

fn bbox_to_rect(bbox: &BoundingBox) -> Rect<f64> {
    Rect::new(
        Coord {
            x: bbox.xmin,
            y: bbox.ymin,
        },
        Coord {
            x: bbox.xmax,
            y: bbox.ymax,
        },
    )
}

/// Replace a geometry by its centroid.
#[must_use]
pub fn centroid(geom: &Geometry<f64>) -> Option<Geometry<f64>> {
    geom.centroid().map(Geometry::Point)
}

/// Ramer-Douglas-Peucker simplification of lines and polygon rings. Points are returned as-is.
#[must_use]
pub fn simplify(geom: Geometry<f64>, tolerance: f64) -> Geometry<f64> {
    if tolerance <= 0.0 {
        return geom;
    }
    match geom {
        Geometry::LineString(ls) => Geometry::LineString(ls.simplify(&tolerance)),
        Geometry::MultiLineString(mls) => Geometry::MultiLineString(mls.simplify(&tolerance)),
        Geometry::Polygon(poly) => Geometry::Polygon(poly.simplify(&tolerance)),
        Geometry::MultiPolygon(mp) => Geometry::MultiPolygon(mp.simplify(&tolerance)),
        Geometry::GeometryCollection(gc) => Geometry::GeometryCollection(GeometryCollection(
            gc.into_iter().map(|g| simplify(g, tolerance)).collect(),
        )),
        other => other,
    }
}

/// Clip a geometry to a Web Mercator envelope.
///
/// Geometries entirely inside the envelope are returned unchanged. `None` means nothing is left.
#[must_use]
pub fn clip(geom: Geometry<f64>, bbox: &BoundingBox) -> Option<Geometry<f64>> {
    let env = envelope(&geom)?;
    if !env.intersects(bbox) {
        return None;
    }
    if bbox.contains_point(env.xmin, env.ymin) && bbox.contains_point(env.xmax, env.ymax) {
        return Some(geom);
    }

    let window = bbox_to_rect(bbox).to_polygon();
    match geom {
        Geometry::Point(p) => bbox.contains_point(p.x(), p.y()).then_some(Geometry::Point(p)),
        Geometry::MultiPoint(mp) => {
            let points: Vec<_> = mp
                .into_iter()
                .filter(|p| bbox.contains_point(p.x(), p.y()))
                .collect();
            match points.len() {
                0 => None,
                1 => points.into_iter().next().map(Geometry::Point),
                _ => Some(Geometry::MultiPoint(MultiPoint(points))),
            }
        }
        Geometry::Line(line) => clip_lines(&window, MultiLineString(vec![LineString::from(line)])),
        Geometry::LineString(ls) => clip_lines(&window, MultiLineString(vec![ls])),
        Geometry::MultiLineString(mls) => clip_lines(&window, mls),
        Geometry::Polygon(poly) => polygons(window.intersection(&poly)),
        Geometry::MultiPolygon(mp) => polygons(window.intersection(&mp)),
        Geometry::Rect(rect) => polygons(window.intersection(&rect.to_polygon())),
        Geometry::Triangle(tri) => polygons(window.intersection(&tri.to_polygon())),
        Geometry::GeometryCollection(gc) => {
            let parts: Vec<_> = gc.into_iter().filter_map(|g| clip(g, bbox)).collect();
            (!parts.is_empty()).then(|| Geometry::GeometryCollection(GeometryCollection(parts)))
        }
    }
}

fn clip_lines(window: &Polygon<f64>, lines: MultiLineString<f64>) -> Option<Geometry<f64>> {
    let mut clipped: Vec<LineString<f64>> = window
        .clip(&lines, false)
        .into_iter()
        .filter(|ls| ls.0.len() >= 2)
        .collect();
    match clipped.len() {
        0 => None,
        1 => clipped.pop().map(Geometry::LineString),
        _ => Some(Geometry::MultiLineString(MultiLineString(clipped))),
    }
}

fn polygons(mut mp: MultiPolygon<f64>) -> Option<Geometry<f64>> {
    match mp.0.len() {
        0 => None,
        1 => mp.0.pop().map(Geometry::Polygon),
        _ => Some(Geometry::MultiPolygon(mp)),
    }
}

/// Scale a Web Mercator geometry into the pixel grid of a tile, y pointing down.
///
/// The tile's top-left corner maps to `(0, 0)` and its bottom-right corner to `(extent, extent)`;
/// anything outside the tile lands outside that range.
#[must_use]
pub fn quantize(geom: &Geometry<f64>, bbox: &BoundingBox, extent: u32) -> Geometry<i32> {
    let extent = f64::from(extent);
    let (sx, sy) = (extent / bbox.width(), extent / bbox.height());
    let (left, top) = (bbox.xmin, bbox.ymax);
    geom.map_coords(|Coord { x, y }| Coord {
        x: ((x - left) * sx).round() as i32,
        y: ((top - y) * sy).round() as i32,
    })
}
