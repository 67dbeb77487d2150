//! Records and identifier assignment.
//!
//! A database-managed record carries a string `id`. Payloads are turned into
//! records by going through `serde_json`, so any serialisable struct with a
//! matching field layout works as an insert or update payload.

use crate::error::{DbError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Field name holding a record's identifier.
pub const ID_FIELD: &str = "id";

/// Field name holding a record's type discriminator.
pub const TYPE_FIELD: &str = "type";

/// A record stored by a [`Database`](crate::Database).
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The record's identifier, if it has one.
    fn id(&self) -> Option<&str>;

    /// The record's type discriminator. Untyped records return `None`.
    fn record_type(&self) -> Option<&str> {
        None
    }
}

impl Record for Value {
    fn id(&self) -> Option<&str> {
        self.get(ID_FIELD).and_then(Value::as_str)
    }

    fn record_type(&self) -> Option<&str> {
        self.get(TYPE_FIELD).and_then(Value::as_str)
    }
}

/// Produces a fresh identifier on every call.
pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// A random (version 4) UUID in hyphenated form.
pub fn uuid_v4() -> String {
    Uuid::new_v4().to_string()
}

pub fn default_id_generator() -> IdGenerator {
    Arc::new(uuid_v4)
}

/// Turn an insert payload into a record.
///
/// A non-empty string `id` already on the payload is kept; otherwise
/// `next_id` is called once and its result becomes the record's `id`.
pub fn stamp_id<P, T>(payload: &P, next_id: impl FnOnce() -> String) -> Result<T>
where
    P: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let mut value = serde_json::to_value(payload)?;
    let fields = match &mut value {
        Value::Object(fields) => fields,
        other => {
            return Err(DbError::InvalidRecord(format!(
                "insert payload must be an object, got {}",
                kind(other)
            )))
        }
    };

    let has_id = fields
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .is_some_and(|id| !id.is_empty());
    if !has_id {
        fields.insert(ID_FIELD.to_string(), Value::String(next_id()));
    }

    Ok(serde_json::from_value(value)?)
}

/// Convert an update payload into an insert payload, dropping its `id`.
pub fn strip_id<P, Q>(payload: &P) -> Result<Q>
where
    P: Serialize + ?Sized,
    Q: DeserializeOwned,
{
    let mut value = serde_json::to_value(payload)?;
    if let Value::Object(fields) = &mut value {
        fields.remove(ID_FIELD);
    }
    Ok(serde_json::from_value(value)?)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Person {
        id: String,
        name: String,
        age: u32,
    }

    #[derive(Serialize)]
    struct NewPerson {
        name: &'static str,
        age: u32,
    }

    #[test]
    fn test_value_record_id() {
        assert_eq!(json!({ "id": "abc" }).id(), Some("abc"));
        assert_eq!(json!({ "name": "x" }).id(), None);
        assert_eq!(json!({ "id": 5 }).id(), None);
    }

    #[test]
    fn test_value_record_type() {
        assert_eq!(json!({ "id": "a", "type": "block" }).record_type(), Some("block"));
        assert_eq!(json!({ "id": "a", "type": 3 }).record_type(), None);
        assert_eq!(json!({ "id": "a" }).record_type(), None);
    }

    #[test]
    fn test_stamp_id_assigns_fresh_id() {
        let person: Person = stamp_id(&NewPerson { name: "alex", age: 13 }, || "fresh".into()).unwrap();
        assert_eq!(
            person,
            Person {
                id: "fresh".into(),
                name: "alex".into(),
                age: 13
            }
        );
    }

    #[test]
    fn test_stamp_id_keeps_existing_id() {
        let mut calls = 0;
        let value: Value = stamp_id(&json!({ "id": "1", "name": "alex" }), || {
            calls += 1;
            "fresh".into()
        })
        .unwrap();
        assert_eq!(value.id(), Some("1"));
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_stamp_id_replaces_empty_id() {
        let value: Value = stamp_id(&json!({ "id": "", "name": "alex" }), || "fresh".into()).unwrap();
        assert_eq!(value.id(), Some("fresh"));
    }

    #[test]
    fn test_stamp_id_rejects_non_object() {
        let err = stamp_id::<_, Value>(&json!(42), uuid_v4).unwrap_err();
        assert!(matches!(err, DbError::InvalidRecord(_)));
    }

    #[test]
    fn test_strip_id() {
        let stripped: Value = strip_id(&json!({ "id": "1", "name": "alex" })).unwrap();
        assert_eq!(stripped, json!({ "name": "alex" }));
    }

    #[test]
    fn test_uuid_v4_is_unique() {
        let a = uuid_v4();
        let b = uuid_v4();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }
}
