//! Schema-driven sanitization of loosely-typed input.
//!
//! Form bodies, query strings and headers deliver everything as strings.
//! This crate turns such input into typed records according to a declarative
//! per-field schema:
//! - **Coercion**: each field's value is converted to its declared type
//!   (`string`, `number`, `integer`, `boolean`, `date`, `array`, `object`)
//! - **Rules**: named constraints such as `minimum`, `pattern` or `enum` run
//!   after coercion
//! - **Unions**: a field may accept several types; the first that succeeds wins
//! - **Defaults**: missing or null fields take the declared default
//! - **Nesting**: `items` and `properties` sanitize array elements and nested
//!   records recursively
//!
//! The output only ever contains declared fields. Sanitization is best
//! effort and never fails: a value that cannot be sanitized is returned
//! unchanged, so callers that need guarantees must validate afterwards.
//!
//! # Core Types
//!
//! - [`Schema`]: declarative description of one field
//! - [`Compiler`]: turns schemas into sanitizers using a [`TypeRegistry`]
//!   and a [`RuleRegistry`]
//! - [`RecordSanitizer`]: compiled, reusable, thread-safe record sanitizer
//! - [`Value`] / [`Record`]: the dynamic data model for input and output
//!
//! # Examples
//!
//! ```
//! use schema_sanitize::{compile, record_from_pairs, Properties, Value};
//!
//! let schema: Properties = serde_json::from_str(r#"{
//!     "id":     {"type": ["integer", "string"]},
//!     "tags":   {"type": "array", "items": {"type": "string", "maxLength": 8}},
//!     "active": {"type": "boolean", "default": true},
//!     "since":  {"type": "date"}
//! }"#).unwrap();
//!
//! let sanitizer = compile(&schema).unwrap();
//!
//! let input = record_from_pairs([
//!     ("id", "123"),
//!     ("tags", "rust"),
//!     ("since", "not a date"),
//!     ("is_admin", "1"),
//! ]);
//! let output = sanitizer.sanitize(Some(&input));
//!
//! assert_eq!(output["id"], Value::from(123i64));
//! assert_eq!(output["tags"], Value::Array(vec!["rust".into()]));
//! assert_eq!(output["active"], Value::Bool(true));
//! // Unsanitizable values are handed back untouched.
//! assert_eq!(output["since"], Value::from("not a date"));
//! // Undeclared fields never make it through.
//! assert!(!output.contains_key("is_admin"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod coerce;
mod compiler;
mod dispatch;
mod error;
pub mod rules;
mod schema;
mod value;

#[cfg(test)]
mod test_utils;

pub use coerce::{Coerce, TypeRegistry};
pub use compiler::{Compiler, FieldSanitizer};
pub use dispatch::{FieldMap, RecordSanitizer};
pub use error::{SanitizeError, SchemaError};
pub use rules::{rule, Rule, RuleFactory, RuleRegistry};
pub use schema::{is_reserved, FieldSchema, NamedSchema, Properties, Schema, TypeSpec, RESERVED_KEYS};
pub use value::{record_from_pairs, Record, Value};

/// Compiles named field schemas with the built-in types and rules.
///
/// Shorthand for `Compiler::new().compile(schemas)`.
///
/// # Errors
///
/// Returns [`SchemaError::InvalidRule`] if a rule parameter cannot be used.
pub fn compile(schemas: &[NamedSchema]) -> Result<RecordSanitizer, SchemaError> {
    Compiler::new().compile(schemas)
}
