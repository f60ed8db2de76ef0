//! Type coercers and the registry that names them.
//!
//! A coercer converts a raw value into one target type or fails with a
//! [`SanitizeError`]. Coercers never return a look-alike sentinel (such as
//! `NaN` or `null`) on failure: the compiler relies on the error to try the
//! next union alternative or to fall back to the original input.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Number;

use crate::error::SanitizeError;
use crate::value::Value;

/// Converts a raw value into a value of one type.
///
/// Implemented for every `Fn(&Value) -> Result<Value, SanitizeError>` that is
/// `Send + Sync`, so plain functions and closures can be registered directly.
///
/// # Examples
///
/// ```
/// use schema_sanitize::{Coerce, SanitizeError, TypeRegistry, Value};
///
/// fn slug(value: &Value) -> Result<Value, SanitizeError> {
///     let text = value.to_string().trim().to_lowercase().replace(' ', "-");
///     Ok(Value::String(text))
/// }
///
/// let mut types = TypeRegistry::new();
/// types.register("slug", slug);
///
/// let coercer = types.get("slug").unwrap();
/// assert_eq!(coercer.coerce(&"Hello World".into()).unwrap(), Value::from("hello-world"));
/// ```
pub trait Coerce: Send + Sync {
    /// Coerces `value`, or explains why it cannot be.
    fn coerce(&self, value: &Value) -> Result<Value, SanitizeError>;
}

impl<F> Coerce for F
where
    F: Fn(&Value) -> Result<Value, SanitizeError> + Send + Sync,
{
    fn coerce(&self, value: &Value) -> Result<Value, SanitizeError> {
        self(value)
    }
}

/// Name-to-coercer mapping consulted when schemas are compiled.
///
/// [`TypeRegistry::new`] holds the built-in types: `string`, `number`,
/// `integer`, `boolean`, `date` (alias `dateTime`), `array` and `object`.
/// Registering an existing name replaces its coercer.
#[derive(Clone)]
pub struct TypeRegistry {
    coercers: HashMap<String, Arc<dyn Coerce>>,
}

impl TypeRegistry {
    /// Creates a registry holding the built-in types.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry
            .register("string", to_string)
            .register("number", to_number)
            .register("integer", to_integer)
            .register("boolean", to_boolean)
            .register("date", to_date)
            .register("dateTime", to_date)
            .register("array", to_array)
            .register("object", to_object);
        registry
    }

    /// Creates a registry with no types at all.
    pub fn empty() -> Self {
        Self {
            coercers: HashMap::new(),
        }
    }

    /// Registers `coercer` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, coercer: impl Coerce + 'static) -> &mut Self {
        self.coercers.insert(name.into(), Arc::new(coercer));
        self
    }

    /// Looks up the coercer registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Coerce>> {
        self.coercers.get(name).cloned()
    }

    /// Returns `true` if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.coercers.contains_key(name)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.coercers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("TypeRegistry").field("types", &names).finish()
    }
}

fn coercion(expected: &'static str, found: &Value) -> SanitizeError {
    SanitizeError::Coercion {
        expected,
        found: found.kind(),
    }
}

fn shape(expected: &'static str, found: &Value) -> SanitizeError {
    SanitizeError::Shape {
        expected,
        found: found.kind(),
    }
}

/// Stringifies any value. Never fails.
pub fn to_string(value: &Value) -> Result<Value, SanitizeError> {
    Ok(match value {
        Value::String(_) => value.clone(),
        other => Value::String(other.to_string()),
    })
}

/// Accepts numbers and strings that parse to a finite number.
///
/// Integral strings keep an integral representation (`"12"` becomes `12`,
/// not `12.0`).
pub fn to_number(value: &Value) -> Result<Value, SanitizeError> {
    match value {
        Value::Number(_) => Ok(value.clone()),
        Value::String(s) => parse_number(s)
            .map(Value::Number)
            .ok_or_else(|| coercion("number", value)),
        other => Err(coercion("number", other)),
    }
}

/// Accepts numbers and numeric strings that are exact multiples of 1.
///
/// Values within `i64`/`u64` range get an integer representation; larger
/// integral values such as `"1e20"` are kept as whole-valued floats.
pub fn to_integer(value: &Value) -> Result<Value, SanitizeError> {
    let number = match value {
        Value::Number(n) => n.clone(),
        Value::String(s) => parse_number(s).ok_or_else(|| coercion("integer", value))?,
        other => return Err(coercion("integer", other)),
    };
    integral(&number)
        .map(Value::Number)
        .ok_or_else(|| coercion("integer", value))
}

/// `false` exactly for `0`, `false`, `""`, `"0"` and `"false"`; `true`
/// otherwise. Never fails.
pub fn to_boolean(value: &Value) -> Result<Value, SanitizeError> {
    let falsy = match value {
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => matches!(s.as_str(), "" | "0" | "false"),
        _ => false,
    };
    Ok(Value::Bool(!falsy))
}

/// Accepts dates, parseable date strings, and integral Unix epoch
/// milliseconds.
pub fn to_date(value: &Value) -> Result<Value, SanitizeError> {
    match value {
        Value::Date(_) => Ok(value.clone()),
        Value::String(s) => parse_date(s)
            .map(Value::Date)
            .ok_or_else(|| coercion("date", value)),
        Value::Number(n) => integral(n)
            .and_then(|n| n.as_i64())
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(Value::Date)
            .ok_or_else(|| coercion("date", value)),
        other => Err(coercion("date", other)),
    }
}

/// Accepts arrays and strings holding a JSON array.
pub fn to_array(value: &Value) -> Result<Value, SanitizeError> {
    match value {
        Value::Array(_) => Ok(value.clone()),
        Value::String(s) => match parse_structured(s) {
            Some(parsed @ Value::Array(_)) => Ok(parsed),
            Some(parsed) => Err(shape("array", &parsed)),
            None => Err(shape("array", value)),
        },
        other => Err(shape("array", other)),
    }
}

/// Accepts records and strings holding a JSON object.
pub fn to_object(value: &Value) -> Result<Value, SanitizeError> {
    match value {
        Value::Object(_) => Ok(value.clone()),
        Value::String(s) => match parse_structured(s) {
            Some(parsed @ Value::Object(_)) => Ok(parsed),
            Some(parsed) => Err(shape("object", &parsed)),
            None => Err(shape("object", value)),
        },
        other => Err(shape("object", other)),
    }
}

fn parse_number(s: &str) -> Option<Number> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(n) = s.parse::<i64>() {
        return Some(n.into());
    }
    if let Ok(n) = s.parse::<u64>() {
        return Some(n.into());
    }
    s.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .and_then(Number::from_f64)
}

/// Normalizes an integral number to its integer representation. Integral
/// floats beyond the `u64`/`i64` range stay floats.
fn integral(n: &Number) -> Option<Number> {
    if n.is_i64() || n.is_u64() {
        return Some(n.clone());
    }
    let f = n.as_f64()?;
    if f.fract() != 0.0 {
        return None;
    }
    if f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(Number::from(f as i64))
    } else if f >= 0.0 && f < u64::MAX as f64 {
        Some(Number::from(f as u64))
    } else {
        Some(n.clone())
    }
}

const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parses the date notations accepted by the `date` coercer and the `date`
/// and `date-time` formats. Offset-less times are taken as UTC.
pub(crate) fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_structured(s: &str) -> Option<Value> {
    serde_json::from_str::<serde_json::Value>(s)
        .ok()
        .map(Value::from)
}
