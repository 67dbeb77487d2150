//! Structural comparison and merge over JSON-shaped values.
//!
//! [`equal`] is deliberately one-sided: for containers it checks that every
//! key of the left operand exists in the right operand with a structurally
//! equal value. Extra keys on the right are ignored, so a partial payload
//! matches any full record that agrees with it. `equal(a, b)` and
//! `equal(b, a)` can therefore differ.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// One-sided structural equality.
///
/// - Two containers (objects or arrays): every key or index present in
///   `left` must exist in `right` with an `equal` value.
/// - Two primitives: `==`, with numbers compared by value (`1 == 1.0`).
/// - A container against a primitive: never equal.
pub fn equal(left: &Value, right: &Value) -> bool {
    match (is_container(left), is_container(right)) {
        (true, true) => entries(left)
            .into_iter()
            .all(|(key, value)| child(right, &key).is_some_and(|other| equal(value, other))),
        (false, false) => primitive_eq(left, right),
        _ => false,
    }
}

/// [`equal`] over any two serialisable values.
///
/// A value that fails to serialise never compares equal.
pub fn equal_to<A, B>(left: &A, right: &B) -> bool
where
    A: Serialize + ?Sized,
    B: Serialize + ?Sized,
{
    match (serde_json::to_value(left), serde_json::to_value(right)) {
        (Ok(left), Ok(right)) => equal(&left, &right),
        (Err(err), _) | (_, Err(err)) => {
            debug!(%err, "structural comparison on unserialisable value");
            false
        }
    }
}

/// Shallow merge: `item`'s fields, overwritten by `payload`'s.
///
/// When either side is not an object the payload wins outright.
pub fn overlay(payload: &Value, item: &Value) -> Value {
    match (payload, item) {
        (Value::Object(patch), Value::Object(base)) => {
            let mut merged = base.clone();
            for (key, value) in patch {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        _ => payload.clone(),
    }
}

/// [`overlay`] between typed values, deserialising into the item type.
pub fn overlay_as<U, T>(payload: &U, item: &T) -> Result<T, serde_json::Error>
where
    U: Serialize + ?Sized,
    T: Serialize + DeserializeOwned,
{
    let merged = overlay(&serde_json::to_value(payload)?, &serde_json::to_value(item)?);
    serde_json::from_value(merged)
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

fn entries(value: &Value) -> Vec<(String, &Value)> {
    match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Vec::new(),
    }
}

fn child<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn primitive_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a == b || a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}
