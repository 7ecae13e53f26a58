use geo::{Coord, Geometry, LineString, Polygon};
use geozero::mvt::tile::GeomType;

use super::commands::{Command, CommandInteger, ParameterInteger};
use super::{MvtError, MvtResult};

/// Geometry command stream together with the MVT geometry type it encodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedGeometry {
    pub geom_type: GeomType,
    pub commands: Vec<u32>,
}

/// Encode a geometry in tile pixel space into an MVT command stream.
///
/// Returns `Ok(None)` when the geometry degenerates to nothing drawable,
/// e.g. a line collapsed to a single point or a polygon with zero area.
pub fn encode_geom(geom: &Geometry<i32>) -> MvtResult<Option<EncodedGeometry>> {
    let mut enc = CommandEncoder::default();
    let geom_type = match geom {
        Geometry::Point(p) => {
            enc.move_to(&[p.0]);
            GeomType::Point
        }
        Geometry::MultiPoint(mp) => {
            let points: Vec<_> = mp.iter().map(|p| p.0).collect();
            enc.move_to(&points);
            GeomType::Point
        }
        Geometry::Line(line) => {
            enc.line(&dedup(&[line.start, line.end]));
            GeomType::Linestring
        }
        Geometry::LineString(ls) => {
            enc.line(&dedup(&ls.0));
            GeomType::Linestring
        }
        Geometry::MultiLineString(mls) => {
            for ls in mls {
                enc.line(&dedup(&ls.0));
            }
            GeomType::Linestring
        }
        Geometry::Polygon(poly) => {
            enc.polygon(poly);
            GeomType::Polygon
        }
        Geometry::MultiPolygon(mp) => {
            for poly in mp {
                enc.polygon(poly);
            }
            GeomType::Polygon
        }
        Geometry::Rect(rect) => {
            enc.polygon(&rect.to_polygon());
            GeomType::Polygon
        }
        Geometry::Triangle(tri) => {
            enc.polygon(&tri.to_polygon());
            GeomType::Polygon
        }
        Geometry::GeometryCollection(_) => {
            return Err(MvtError::UnsupportedGeometry("GeometryCollection"));
        }
    };

    Ok((!enc.data.is_empty()).then(|| EncodedGeometry {
        geom_type,
        commands: enc.data,
    }))
}

/// Accumulates commands while tracking the cursor, which carries over between parts
/// of the same geometry.
#[derive(Default)]
struct CommandEncoder {
    data: Vec<u32>,
    cursor: Coord<i32>,
}

impl CommandEncoder {
    fn move_to(&mut self, points: &[Coord<i32>]) {
        if points.is_empty() {
            return;
        }
        self.data
            .push(CommandInteger::from(Command::MoveTo, points.len() as u32));
        self.params(points);
    }

    fn line_to(&mut self, points: &[Coord<i32>]) {
        self.data
            .push(CommandInteger::from(Command::LineTo, points.len() as u32));
        self.params(points);
    }

    fn close_path(&mut self) {
        self.data.push(CommandInteger::from(Command::ClosePath, 1));
    }

    fn params(&mut self, points: &[Coord<i32>]) {
        for point in points {
            let dx = point.x.wrapping_sub(self.cursor.x);
            let dy = point.y.wrapping_sub(self.cursor.y);
            self.data.push(ParameterInteger::from(dx));
            self.data.push(ParameterInteger::from(dy));
            self.cursor = *point;
        }
    }

    /// Lines need at least two distinct vertices.
    fn line(&mut self, points: &[Coord<i32>]) {
        if let [first, rest @ ..] = points
            && !rest.is_empty()
        {
            self.move_to(&[*first]);
            self.line_to(rest);
        }
    }

    fn ring(&mut self, ring: &[Coord<i32>]) {
        if let [first, rest @ ..] = ring {
            self.move_to(&[*first]);
            self.line_to(rest);
            self.close_path();
        }
    }

    /// Exterior rings are written clockwise (positive area in y-down tile space),
    /// interior rings counter-clockwise. Rings without area are skipped, and so is
    /// the whole polygon when its exterior ring has none.
    fn polygon(&mut self, poly: &Polygon<i32>) {
        let Some(exterior) = oriented_ring(poly.exterior(), true) else {
            return;
        };
        self.ring(&exterior);
        for interior in poly.interiors() {
            if let Some(ring) = oriented_ring(interior, false) {
                self.ring(&ring);
            }
        }
    }
}

/// Drop repeated consecutive vertices, which quantization produces often.
fn dedup(points: &[Coord<i32>]) -> Vec<Coord<i32>> {
    let mut result: Vec<Coord<i32>> = Vec::with_capacity(points.len());
    for point in points {
        if result.last() != Some(point) {
            result.push(*point);
        }
    }
    result
}

/// Open ring (without the closing vertex) wound in the requested direction.
fn oriented_ring(ring: &LineString<i32>, exterior: bool) -> Option<Vec<Coord<i32>>> {
    let mut points = dedup(&ring.0);
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    if points.len() < 3 {
        return None;
    }
    let area = ring_area(&points);
    if area == 0 {
        return None;
    }
    if (area > 0) != exterior {
        points.reverse();
    }
    Some(points)
}

/// Twice the signed area of an open ring, using the surveyor's formula.
pub(crate) fn ring_area(points: &[Coord<i32>]) -> i64 {
    let closing = points.first().into_iter();
    points
        .iter()
        .zip(points.iter().skip(1).chain(closing))
        .map(|(a, b)| i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y))
        .sum()
}

#[cfg(test)]
mod tests {
    use geo::{
        Geometry, GeometryCollection, MultiLineString, MultiPoint, MultiPolygon, line_string,
        point, polygon,
    };

    use super::*;

    fn encode(geom: impl Into<Geometry<i32>>) -> Option<Vec<u32>> {
        encode_geom(&geom.into()).unwrap().map(|g| g.commands)
    }

    #[test]
    fn test_point_encoding() {
        let encoded = encode_geom(&point!(x: 25, y: 17).into()).unwrap().unwrap();
        assert_eq!(encoded.geom_type, GeomType::Point);
        assert_eq!(encoded.commands, vec![9, 50, 34]);
    }

    #[test]
    fn test_multipoint_encoding() {
        let points = MultiPoint::from(vec![(5, 7), (3, 2)]);
        assert_eq!(encode(points), Some(vec![17, 10, 14, 3, 9]));
    }

    #[test]
    fn test_linestring_encoding() {
        let linestring = line_string![(x: 2, y: 2), (x: 2, y: 10), (x: 10, y: 10)];
        assert_eq!(encode(linestring), Some(vec![9, 4, 4, 18, 0, 16, 16, 0]));
    }

    #[test]
    fn test_multilinestring_encoding() {
        let multilinestring = MultiLineString::new(vec![
            line_string![(x: 2, y: 2), (x: 2, y: 10), (x: 10, y: 10)],
            line_string![(x: 1, y: 1), (x: 3, y: 5)],
        ]);
        assert_eq!(
            encode(multilinestring),
            Some(vec![9, 4, 4, 18, 0, 16, 16, 0, 9, 17, 17, 10, 4, 8])
        );
    }

    #[test]
    fn test_polygon_encoding() {
        let poly = polygon![(x: 3, y: 6), (x: 8, y: 12), (x: 20, y: 34), (x: 3, y: 6)];
        let encoded = encode_geom(&poly.into()).unwrap().unwrap();
        assert_eq!(encoded.geom_type, GeomType::Polygon);
        assert_eq!(encoded.commands, vec![9, 6, 12, 18, 10, 12, 24, 44, 15]);
    }

    #[test]
    fn test_multipolygon_encoding() {
        let polygons = MultiPolygon::new(vec![
            polygon![(x: 0, y: 0), (x: 10, y: 0), (x: 10, y: 10), (x: 0, y: 10), (x: 0, y: 0)],
            polygon!(
                exterior: [(x: 11, y: 11), (x: 20, y: 11), (x: 20, y: 20), (x: 11, y: 20), (x: 11, y: 11)],
                interiors: [[(x: 13, y: 13), (x: 13, y: 17), (x: 17, y: 17), (x: 17, y: 13), (x: 13, y: 13)]],
            ),
        ]);

        assert_eq!(
            encode(polygons),
            Some(vec![
                9, 0, 0, 26, 20, 0, 0, 20, 19, 0, 15, 9, 22, 2, 26, 18, 0, 0, 18, 17, 0, 15, 9, 4,
                13, 26, 0, 8, 8, 0, 0, 7, 15
            ])
        );
    }

    #[test]
    fn test_winding_is_corrected() {
        // counter-clockwise exterior in y-down space
        let ccw = polygon![(x: 0, y: 0), (x: 0, y: 10), (x: 10, y: 10), (x: 10, y: 0)];
        let cw = polygon![(x: 0, y: 0), (x: 10, y: 0), (x: 10, y: 10), (x: 0, y: 10)];
        let reversed = encode(ccw).unwrap();
        let expected = encode(polygon![(x: 10, y: 0), (x: 10, y: 10), (x: 0, y: 10), (x: 0, y: 0)]);
        assert_eq!(Some(reversed.clone()), expected);
        assert_ne!(Some(reversed), encode(cw));
    }

    #[test]
    fn test_hole_winding_is_corrected() {
        let poly = polygon!(
            exterior: [(x: 0, y: 0), (x: 10, y: 0), (x: 10, y: 10), (x: 0, y: 10)],
            interiors: [[(x: 2, y: 2), (x: 4, y: 2), (x: 4, y: 4), (x: 2, y: 4)]],
        );
        let encoded = encode(poly).unwrap();
        // exterior takes 11 integers, the hole starts right after
        let hole: Vec<Coord<i32>> = [(2, 2), (2, 4), (4, 4), (4, 2)]
            .into_iter()
            .map(Coord::from)
            .collect();
        assert!(ring_area(&hole) < 0);
        assert_eq!(&encoded[11..], &[9, 4, 11, 26, 4, 0, 0, 3, 3, 0, 15]);
    }

    #[test]
    fn test_degenerate_geometries_are_dropped() {
        assert_eq!(encode(line_string![(x: 5, y: 5), (x: 5, y: 5)]), None);
        assert_eq!(encode(MultiPoint::<i32>::new(vec![])), None);
        assert_eq!(
            encode(polygon![(x: 0, y: 0), (x: 5, y: 5), (x: 10, y: 10), (x: 0, y: 0)]),
            None
        );
        assert_eq!(encode(polygon![(x: 1, y: 1), (x: 1, y: 1), (x: 1, y: 1)]), None);
    }

    #[test]
    fn test_duplicate_vertices_are_removed() {
        let ls = line_string![(x: 2, y: 2), (x: 2, y: 2), (x: 2, y: 10), (x: 10, y: 10)];
        assert_eq!(encode(ls), Some(vec![9, 4, 4, 18, 0, 16, 16, 0]));
    }

    #[test]
    fn test_geometry_collection_is_rejected() {
        let gc = GeometryCollection::new_from(vec![point!(x: 1, y: 1).into()]);
        assert_eq!(
            encode_geom(&Geometry::GeometryCollection(gc)),
            Err(MvtError::UnsupportedGeometry("GeometryCollection"))
        );
    }
}
