//! Field values carried by records and updates.
//!
//! Every record on the wire is a flat map of named fields. A field holds one
//! [`Value`], which is either a literal, a nested map or list, or the deletion
//! marker used by partial updates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved 4-byte sentinel meaning "remove this key from the target".
pub const DELETION_MARKER: [u8; 4] = [0xd2, 0x81, 0xe5, 0xba];

/// Named fields of a record, ordered by name so encoding is deterministic.
pub type Fields = BTreeMap<String, Value>;

/// A single field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Signed integer literal.
    Int(i64),
    /// Floating point literal.
    Float(f64),
    /// Boolean literal.
    Bool(bool),
    /// UTF-8 string literal.
    Str(String),
    /// Opaque byte string literal.
    Bytes(Vec<u8>),
    /// Ordered list of values.
    List(Vec<Value>),
    /// Nested mapping; merged key by key rather than overwritten.
    Map(Fields),
    /// Deletion marker.
    Delete,
}

impl Value {
    /// Create an empty nested map.
    pub fn map() -> Self {
        Value::Map(Fields::new())
    }

    /// Whether this value asks for the key to be removed.
    ///
    /// Peers that send the raw sentinel bytes instead of the dedicated
    /// variant are understood as well.
    pub fn is_deletion_marker(&self) -> bool {
        match self {
            Value::Delete => true,
            Value::Bytes(bytes) => bytes.as_slice() == DELETION_MARKER,
            _ => false,
        }
    }

    /// Integer view.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view; integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Boolean view.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// String view.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Byte string view.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// List view.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    /// Nested map view.
    pub fn as_map(&self) -> Option<&Fields> {
        match self {
            Value::Map(v) => Some(v),
            _ => None,
        }
    }

    /// Mutable nested map view.
    pub fn as_map_mut(&mut self) -> Option<&mut Fields> {
        match self {
            Value::Map(v) => Some(v),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Delete => "deletion marker",
        }
    }

    /// Copy of this value with every deletion marker inside nested maps
    /// dropped. A top-level marker becomes an empty map.
    pub fn without_deletions(&self) -> Value {
        match self {
            Value::Map(fields) => Value::Map(strip_deletions(fields)),
            Value::List(items) => Value::List(
                items
                    .iter()
                    .filter(|item| !item.is_deletion_marker())
                    .map(Value::without_deletions)
                    .collect(),
            ),
            v if v.is_deletion_marker() => Value::map(),
            v => v.clone(),
        }
    }
}

fn strip_deletions(fields: &Fields) -> Fields {
    fields
        .iter()
        .filter(|(_, v)| !v.is_deletion_marker())
        .map(|(k, v)| (k.clone(), v.without_deletions()))
        .collect()
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Fields> for Value {
    fn from(v: Fields) -> Self {
        Value::Map(v)
    }
}

/// Build a [`Fields`] map from `(name, value)` pairs.
pub fn fields<K, V, I>(pairs: I) -> Fields
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_sentinel_bytes_are_a_deletion_marker() {
        assert!(Value::Delete.is_deletion_marker());
        assert!(Value::Bytes(DELETION_MARKER.to_vec()).is_deletion_marker());
        assert!(!Value::Bytes(vec![0xd2, 0x81, 0xe5]).is_deletion_marker());
        assert!(!Value::Int(0).is_deletion_marker());
    }

    #[test]
    fn ints_widen_to_float() {
        assert_eq!(Value::Int(3).as_float(), Some(3.0));
        assert_eq!(Value::Float(3.5).as_int(), None);
    }

    #[test]
    fn without_deletions_strips_nested_markers() {
        let mut inner = fields([("x", Value::Int(1))]);
        inner.insert("gone".into(), Value::Delete);
        let value = Value::Map(fields([
            ("inner", Value::Map(inner)),
            ("dead", Value::Delete),
        ]));

        let cleaned = value.without_deletions();

        let expected = Value::Map(fields([(
            "inner",
            Value::Map(fields([("x", Value::Int(1))])),
        )]));
        assert_eq!(cleaned, expected);
    }

    #[test]
    fn fields_helper_preserves_name_order() {
        let f = fields([("b", 2), ("a", 1)]);
        let keys: Vec<_> = f.keys().cloned().collect();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }
}
