//! Attribute selection and filtering shared by all feature sources.
//!
//! Filters and derived attributes are plain data. The in-memory source evaluates them
//! against `serde_json` attribute maps, the `PostgreSQL` source renders them to SQL.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vectortiles_tile_utils::BoundingBox;

use crate::tiles::Properties;

/// Where an attribute value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldExpr {
    /// A plain column or property.
    Column(String),
    /// One key of a JSON column, read as text.
    JsonKey { column: String, key: String },
}

impl Display for FieldExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Column(column) => write!(f, "{column}"),
            Self::JsonKey { column, key } => write!(f, "{column}->>{key}"),
        }
    }
}

/// Type conversion applied to a derived attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cast {
    Float,
    Integer,
    Text,
}

/// A resolved attribute: its source expression and optional cast.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    pub expr: FieldExpr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cast: Option<Cast>,
}

impl FieldRef {
    #[must_use]
    pub fn column(name: impl Into<String>) -> Self {
        Self {
            expr: FieldExpr::Column(name.into()),
            cast: None,
        }
    }

    /// Evaluate against the attributes of an in-memory feature. Missing values are `null`.
    #[must_use]
    pub fn evaluate(&self, properties: &Properties) -> Value {
        let raw = match &self.expr {
            FieldExpr::Column(column) => properties.get(column).cloned(),
            FieldExpr::JsonKey { column, key } => properties
                .get(column)
                .and_then(|value| json_key(value, key))
                .map(as_text),
        }
        .unwrap_or(Value::Null);

        match self.cast {
            None => raw,
            Some(cast) => apply_cast(raw, cast),
        }
    }
}

fn json_key(value: &Value, key: &str) -> Option<Value> {
    match value {
        Value::Object(map) => map.get(key).cloned(),
        // JSON stored as text
        Value::String(text) => serde_json::from_str::<Value>(text)
            .ok()
            .and_then(|v| v.get(key).cloned()),
        _ => None,
    }
}

/// Text rendering of a JSON value, the way `->>` returns it.
fn as_text(value: Value) -> Value {
    match value {
        Value::Null | Value::String(_) => value,
        other => Value::String(other.to_string()),
    }
}

fn apply_cast(value: Value, cast: Cast) -> Value {
    match (cast, value) {
        (_, Value::Null) => Value::Null,
        (Cast::Text, value) => as_text(value),
        (Cast::Float, Value::Number(n)) => n.as_f64().map_or(Value::Null, Value::from),
        (Cast::Float, Value::String(s)) => s.trim().parse::<f64>().map_or(Value::Null, Value::from),
        (Cast::Integer, Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|v| v.fract() == 0.0).map(|v| v as i64))
            .map_or(Value::Null, Value::from),
        (Cast::Integer, Value::String(s)) => {
            s.trim().parse::<i64>().map_or(Value::Null, Value::from)
        }
        (Cast::Float | Cast::Integer, Value::Bool(b)) => Value::from(i64::from(b)),
        (Cast::Float | Cast::Integer, _) => Value::Null,
    }
}

/// Comparison applied to an attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq(Value),
    NotEq(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    /// JSON containment, like `@>` on `jsonb`
    Contains(Value),
}

/// Attribute filter as written in a layer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeFilter {
    pub field: String,
    #[serde(flatten)]
    pub op: FilterOp,
}

impl AttributeFilter {
    #[must_use]
    pub fn new(field: impl Into<String>, op: FilterOp) -> Self {
        Self {
            field: field.into(),
            op,
        }
    }
}

/// Filters that only apply within a zoom range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoomRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_zoom: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<u8>,
    #[serde(default)]
    pub filters: Vec<AttributeFilter>,
}

impl ZoomRule {
    #[must_use]
    pub fn applies_to(&self, zoom: u8) -> bool {
        self.min_zoom.is_none_or(|min| zoom >= min) && self.max_zoom.is_none_or(|max| zoom <= max)
    }
}

/// A filter whose field name has been resolved to an expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFilter {
    pub field: FieldRef,
    pub op: FilterOp,
}

impl ResolvedFilter {
    #[must_use]
    pub fn matches(&self, properties: &Properties) -> bool {
        let actual = self.field.evaluate(properties);
        match &self.op {
            FilterOp::Eq(expected) => values_equal(&actual, expected),
            FilterOp::NotEq(expected) => !actual.is_null() && !values_equal(&actual, expected),
            FilterOp::In(values) => values.iter().any(|v| values_equal(&actual, v)),
            FilterOp::NotIn(values) => {
                !actual.is_null() && !values.iter().any(|v| values_equal(&actual, v))
            }
            FilterOp::Contains(expected) => json_contains(&actual, expected),
        }
    }
}

/// Equality with numbers compared by value, so `1` equals `1.0`.
/// Text fields compare against the text form of the expected value.
fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(a), Value::Number(_) | Value::Bool(_)) => *a == expected.to_string(),
        _ => actual == expected,
    }
}

/// JSON containment: every key/element of `expected` is present in `actual`.
fn json_contains(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(text), _) if expected.is_object() || expected.is_array() => {
            serde_json::from_str::<Value>(text).is_ok_and(|v| json_contains(&v, expected))
        }
        (Value::Object(a), Value::Object(e)) => e
            .iter()
            .all(|(k, ev)| a.get(k).is_some_and(|av| json_contains(av, ev))),
        (Value::Array(a), Value::Array(e)) => {
            e.iter().all(|ev| a.iter().any(|av| json_contains(av, ev)))
        }
        (Value::Array(a), scalar) => a.iter().any(|av| json_contains(av, scalar)),
        _ => values_equal(actual, expected),
    }
}

/// What a layer asks its feature source for, for one tile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureQuery {
    /// Features must intersect this Web Mercator envelope. `None` selects everything.
    pub bbox: Option<BoundingBox>,
    /// Overrides the source's default geometry column.
    pub geometry_field: Option<String>,
    pub filters: Vec<ResolvedFilter>,
    /// Applied after filtering, in source order.
    pub limit: Option<usize>,
}

impl FeatureQuery {
    #[must_use]
    pub fn matches(&self, properties: &Properties) -> bool {
        self.filters.iter().all(|f| f.matches(properties))
    }
}
