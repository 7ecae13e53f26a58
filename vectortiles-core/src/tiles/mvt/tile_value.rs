use geozero::mvt::TileValue;
use serde_json::{Number, Value};

/// Convert an attribute value into its MVT representation.
///
/// `null` has no MVT equivalent and yields `None`, so the attribute is omitted.
/// Arrays and objects are stored as their JSON text.
#[must_use]
pub fn tile_value_from_json(value: &Value) -> Option<TileValue> {
    Some(match value {
        Value::Null => None?,
        Value::Bool(b) => TileValue::Bool(*b),
        Value::String(s) => TileValue::Str(s.clone()),
        Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                TileValue::Int(v)
            } else if let Some(v) = n.as_u64() {
                TileValue::Uint(v)
            } else {
                TileValue::Double(n.as_f64()?)
            }
        }
        Value::Array(_) | Value::Object(_) => TileValue::Str(value.to_string()),
    })
}

/// Convert a decoded MVT value back into JSON. Non-finite floats become `null`.
#[must_use]
pub fn tile_value_to_json(value: TileValue) -> Value {
    match value {
        TileValue::Str(s) => Value::String(s),
        TileValue::Float(f) => Number::from_f64(f64::from(f)).map_or(Value::Null, Value::Number),
        TileValue::Double(d) => Number::from_f64(d).map_or(Value::Null, Value::Number),
        TileValue::Int(i) | TileValue::Sint(i) => Value::from(i),
        TileValue::Uint(u) => Value::from(u),
        TileValue::Bool(b) => Value::Bool(b),
    }
}
