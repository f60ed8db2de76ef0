//! Dynamic values that flow through the sanitizer.
//!
//! Transport input arrives as loosely-typed data (mostly strings); sanitized
//! output is the same [`Value`] type with the declared shapes applied. The
//! model mirrors JSON with one addition: a first-class [`Value::Date`].

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Number;

/// A string-keyed record of values, kept in insertion order.
///
/// Both the input handed to a [`RecordSanitizer`](crate::RecordSanitizer) and
/// the record it produces use this type. A sanitized record lists its fields
/// in the order the schema declares them. Equality ignores order.
pub type Record = IndexMap<String, Value>;

/// A dynamically-typed value.
///
/// A field that is absent from a record is represented as `None` at the API
/// boundary, not as a variant. Together with [`Value::Null`] it forms the
/// only two *empty* inputs; `0`, `""` and `false` are regular values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Explicit null.
    Null,
    /// A boolean.
    Bool(bool),
    /// A finite number, integral or floating point.
    Number(Number),
    /// A string.
    String(String),
    /// A point in time, serialized as RFC 3339.
    Date(DateTime<Utc>),
    /// An ordered sequence.
    Array(Vec<Value>),
    /// A nested record.
    Object(Record),
}

impl Value {
    /// Returns the name of this value's kind, as used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the string slice if this is a [`Value::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the number as `f64` if this is a [`Value::Number`].
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    /// Returns the elements if this is a [`Value::Array`].
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the record if this is a [`Value::Object`].
    pub fn as_object(&self) -> Option<&Record> {
        match self {
            Value::Object(record) => Some(record),
            _ => None,
        }
    }

    /// Compares two values, treating numbers as equal when they denote the
    /// same quantity (`1` and `1.0`).
    ///
    /// Used by the `enum`, `const` and `uniqueItems` rules.
    pub fn equivalent(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => NumericKey::of(a) == NumericKey::of(b),
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equivalent(y))
            }
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .all(|(key, x)| b.get(key).is_some_and(|y| x.equivalent(y)))
            }
            _ => self == other,
        }
    }

    /// A hashable key for scalar values that agrees with
    /// [`equivalent`](Self::equivalent). `None` for arrays and objects.
    pub(crate) fn scalar_key(&self) -> Option<ScalarKey<'_>> {
        Some(match self {
            Value::Null => ScalarKey::Null,
            Value::Bool(b) => ScalarKey::Bool(*b),
            Value::Number(n) => ScalarKey::Number(NumericKey::of(n)),
            Value::String(s) => ScalarKey::String(s),
            Value::Date(d) => ScalarKey::Date(*d),
            Value::Array(_) | Value::Object(_) => return None,
        })
    }
}

/// Exact identity of a number: integral values compare as integers whatever
/// their representation, anything else by its `f64` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum NumericKey {
    Integer(i128),
    Float(u64),
}

impl NumericKey {
    fn of(n: &Number) -> Self {
        if let Some(i) = n.as_i64() {
            return NumericKey::Integer(i.into());
        }
        if let Some(u) = n.as_u64() {
            return NumericKey::Integer(u.into());
        }
        let f = n.as_f64().unwrap_or(f64::NAN);
        if f.fract() == 0.0 && f >= i128::MIN as f64 && f < i128::MAX as f64 {
            NumericKey::Integer(f as i128)
        } else {
            NumericKey::Float(f.to_bits())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ScalarKey<'a> {
    Null,
    Bool(bool),
    Number(NumericKey),
    String(&'a str),
    Date(DateTime<Utc>),
}

/// Returns `true` when a field input counts as empty: missing or null.
pub(crate) fn is_empty(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

/// Renders the value the way the `string` coercer stringifies it.
///
/// Strings are written bare, dates as RFC 3339, and composite values as
/// compact JSON.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => f.write_str(s),
            Value::Date(d) => f.write_str(&d.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Array(_) | Value::Object(_) => {
                write!(f, "{}", serde_json::Value::from(self.clone()))
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => serde_json::Value::Number(n),
            Value::String(s) => serde_json::Value::String(s),
            Value::Date(d) => {
                serde_json::Value::String(d.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Object(record) => serde_json::Value::Object(
                record
                    .into_iter()
                    .map(|(key, value)| (key, value.into()))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n.into())
    }
}

/// Non-finite floats have no number representation and become `Null`.
impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record)
    }
}

/// Builds a record from transport key/value pairs such as a decoded query
/// string or urlencoded form body.
///
/// Every value is kept as a [`Value::String`]. A key that repeats collects its
/// values into a [`Value::Array`] in arrival order.
///
/// # Examples
///
/// ```
/// use schema_sanitize::{record_from_pairs, Value};
///
/// let record = record_from_pairs([("tag", "a"), ("page", "2"), ("tag", "b")]);
///
/// assert_eq!(record["page"], Value::from("2"));
/// assert_eq!(record["tag"], Value::Array(vec!["a".into(), "b".into()]));
/// ```
pub fn record_from_pairs<I, K, V>(pairs: I) -> Record
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut record = Record::new();
    for (key, value) in pairs {
        let value = Value::String(value.into());
        match record.entry(key.into()) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(mut slot) => match slot.get_mut() {
                Value::Array(values) => values.push(value),
                existing => {
                    let first = std::mem::replace(existing, Value::Null);
                    *existing = Value::Array(vec![first, value]);
                }
            },
        }
    }
    record
}
