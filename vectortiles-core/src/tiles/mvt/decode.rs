use std::collections::BTreeMap;

use geo::Coord;
use geozero::mvt::tile::{self, GeomType};
use geozero::mvt::{Message as _, Tile, TileValue};
use serde::Serialize;
use serde_json::Value;

use super::commands::{Command, CommandInteger, ParameterInteger};
use super::geometry_encoding::ring_area;
use super::tile_value::tile_value_to_json;
use super::{MvtError, MvtResult};

/// A layer read back from an encoded tile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedLayer {
    pub name: String,
    pub version: u32,
    pub extent: u32,
    pub features: Vec<DecodedFeature>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedFeature {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub geometry: DecodedGeometry,
    pub properties: BTreeMap<String, Value>,
}

/// Geometry in tile pixel coordinates, with y pointing down.
///
/// Polygon rings are closed, i.e. their last vertex repeats the first one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum DecodedGeometry {
    Point(Vec<[i32; 2]>),
    LineString(Vec<Vec<[i32; 2]>>),
    Polygon(Vec<Vec<Vec<[i32; 2]>>>),
    Unknown,
}

impl DecodedLayer {
    /// Total number of vertices across all features, handy for comparing detail levels.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.features
            .iter()
            .map(|f| match &f.geometry {
                DecodedGeometry::Point(points) => points.len(),
                DecodedGeometry::LineString(lines) => lines.iter().map(Vec::len).sum(),
                DecodedGeometry::Polygon(polys) => polys.iter().flatten().map(Vec::len).sum(),
                DecodedGeometry::Unknown => 0,
            })
            .sum()
    }

    /// The same layer with y pointing up, as most GIS tools show tile coordinates.
    #[must_use]
    pub fn y_up(mut self) -> Self {
        for feature in &mut self.features {
            feature.geometry.flip_y(self.extent);
        }
        self
    }
}

impl DecodedGeometry {
    /// Mirror every vertex vertically within a tile of `extent` pixels.
    pub fn flip_y(&mut self, extent: u32) {
        let extent = i32::try_from(extent).unwrap_or(i32::MAX);
        let flip = |path: &mut Vec<[i32; 2]>| {
            for [_, y] in path.iter_mut() {
                *y = extent - *y;
            }
        };
        match self {
            Self::Point(points) => flip(points),
            Self::LineString(lines) => lines.iter_mut().for_each(flip),
            Self::Polygon(polys) => polys.iter_mut().flatten().for_each(flip),
            Self::Unknown => {}
        }
    }
}

/// Decode a tile payload into its layers. An empty payload is a tile without layers.
pub fn decode_tile(data: &[u8]) -> MvtResult<Vec<DecodedLayer>> {
    let tile = Tile::decode(data).map_err(|e| MvtError::Decode(e.to_string()))?;
    tile.layers.into_iter().map(decode_layer).collect()
}

fn decode_layer(layer: tile::Layer) -> MvtResult<DecodedLayer> {
    let values: Vec<Option<Value>> = layer
        .values
        .into_iter()
        .map(|v| TileValue::try_from(v).ok().map(tile_value_to_json))
        .collect();

    let mut features = Vec::with_capacity(layer.features.len());
    for feature in layer.features {
        let mut properties = BTreeMap::new();
        for pair in feature.tags.chunks(2) {
            let [key, value] = pair else {
                return Err(MvtError::Decode(format!(
                    "odd number of tags in layer {}",
                    layer.name
                )));
            };
            let key = layer.keys.get(*key as usize);
            let value = values.get(*value as usize);
            let (Some(key), Some(value)) = (key, value) else {
                return Err(MvtError::Decode(format!(
                    "tag index out of range in layer {}",
                    layer.name
                )));
            };
            if let Some(value) = value {
                properties.insert(key.clone(), value.clone());
            }
        }

        features.push(DecodedFeature {
            id: feature.id,
            geometry: decode_geometry(feature.r#type.unwrap_or_default(), &feature.geometry)?,
            properties,
        });
    }

    Ok(DecodedLayer {
        name: layer.name,
        version: layer.version,
        extent: layer.extent.unwrap_or(4096),
        features,
    })
}

/// Decode an MVT geometry command stream.
pub fn decode_geometry(geom_type: i32, commands: &[u32]) -> MvtResult<DecodedGeometry> {
    let paths = decode_paths(commands)?;
    let to_arrays = |path: Vec<Coord<i32>>| -> Vec<[i32; 2]> {
        path.into_iter().map(|c| [c.x, c.y]).collect()
    };

    Ok(if geom_type == GeomType::Point as i32 {
        DecodedGeometry::Point(paths.into_iter().flatten().map(|c| [c.x, c.y]).collect())
    } else if geom_type == GeomType::Linestring as i32 {
        DecodedGeometry::LineString(paths.into_iter().map(to_arrays).collect())
    } else if geom_type == GeomType::Polygon as i32 {
        let mut polygons: Vec<Vec<Vec<[i32; 2]>>> = Vec::new();
        for mut ring in paths {
            let area = ring_area(&ring);
            if let Some(first) = ring.first().copied() {
                ring.push(first);
            }
            match polygons.last_mut() {
                Some(poly) if area < 0 => poly.push(to_arrays(ring)),
                _ => polygons.push(vec![to_arrays(ring)]),
            }
        }
        DecodedGeometry::Polygon(polygons)
    } else {
        DecodedGeometry::Unknown
    })
}

/// Split a command stream into paths, each one starting with a `MoveTo`.
fn decode_paths(commands: &[u32]) -> MvtResult<Vec<Vec<Coord<i32>>>> {
    let mut paths: Vec<Vec<Coord<i32>>> = Vec::new();
    let mut cursor: Coord<i32> = Coord { x: 0, y: 0 };
    let mut iter = commands.iter();

    while let Some(cmd) = iter.next() {
        let cmd = CommandInteger(*cmd);
        let id = cmd.id();
        if id == Command::ClosePath as u32 {
            continue;
        }
        let is_move = id == Command::MoveTo as u32;
        if !is_move && id != Command::LineTo as u32 {
            return Err(MvtError::MalformedGeometry(format!("unknown command {id}")));
        }
        for _ in 0..cmd.count() {
            let (Some(dx), Some(dy)) = (iter.next(), iter.next()) else {
                return Err(MvtError::MalformedGeometry(
                    "command is missing parameters".to_string(),
                ));
            };
            cursor.x = cursor.x.wrapping_add(ParameterInteger(*dx).value());
            cursor.y = cursor.y.wrapping_add(ParameterInteger(*dy).value());
            if is_move {
                paths.push(vec![cursor]);
            } else {
                paths
                    .last_mut()
                    .ok_or_else(|| {
                        MvtError::MalformedGeometry("LineTo before MoveTo".to_string())
                    })?
                    .push(cursor);
            }
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_point() {
        let geom = decode_geometry(GeomType::Point as i32, &[9, 50, 34]).unwrap();
        assert_eq!(geom, DecodedGeometry::Point(vec![[25, 17]]));

        let geom = decode_geometry(GeomType::Point as i32, &[17, 10, 14, 3, 9]).unwrap();
        assert_eq!(geom, DecodedGeometry::Point(vec![[5, 7], [3, 2]]));
    }

    #[test]
    fn test_decode_lines() {
        let geom = decode_geometry(
            GeomType::Linestring as i32,
            &[9, 4, 4, 18, 0, 16, 16, 0, 9, 17, 17, 10, 4, 8],
        )
        .unwrap();
        assert_eq!(
            geom,
            DecodedGeometry::LineString(vec![
                vec![[2, 2], [2, 10], [10, 10]],
                vec![[1, 1], [3, 5]],
            ])
        );
    }

    #[test]
    fn test_decode_polygons_groups_holes() {
        let geom = decode_geometry(
            GeomType::Polygon as i32,
            &[
                9, 0, 0, 26, 20, 0, 0, 20, 19, 0, 15, 9, 22, 2, 26, 18, 0, 0, 18, 17, 0, 15, 9, 4,
                13, 26, 0, 8, 8, 0, 0, 7, 15,
            ],
        )
        .unwrap();
        let DecodedGeometry::Polygon(polys) = geom else {
            panic!("expected polygons");
        };
        assert_eq!(polys.len(), 2);
        assert_eq!(polys[0].len(), 1);
        assert_eq!(polys[1].len(), 2);
        assert_eq!(polys[1][1], vec![[13, 13], [13, 17], [17, 17], [17, 13], [13, 13]]);
    }

    #[test]
    fn test_malformed_streams() {
        assert!(decode_geometry(GeomType::Point as i32, &[9, 50]).is_err());
        assert!(decode_geometry(GeomType::Linestring as i32, &[18, 0, 16]).is_err());
        assert!(decode_geometry(GeomType::Point as i32, &[11]).is_err());
    }

    #[test]
    fn test_empty_tile() {
        assert_eq!(decode_tile(&[]).unwrap(), vec![]);
        assert!(decode_tile(&[0xff, 0xff, 0xff]).is_err());
    }
}
