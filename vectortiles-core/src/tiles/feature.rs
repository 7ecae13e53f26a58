use geo::Geometry;
use serde_json::{Map, Value};

/// Attribute values of a source feature.
pub type Properties = Map<String, Value>;

/// A feature read from a [`FeatureSource`](crate::tiles::FeatureSource), in Web Mercator meters.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: Option<u64>,
    pub geometry: Geometry<f64>,
    pub properties: Properties,
}

impl Feature {
    #[must_use]
    pub fn new(geometry: impl Into<Geometry<f64>>, properties: Properties) -> Self {
        Self {
            id: None,
            geometry: geometry.into(),
            properties,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }
}

/// A feature in tile pixel space, with only the attributes a layer emits, in declared order.
#[derive(Debug, Clone, PartialEq)]
pub struct TileFeature {
    pub id: Option<u64>,
    pub geometry: Geometry<i32>,
    pub attributes: Vec<(String, Value)>,
}
