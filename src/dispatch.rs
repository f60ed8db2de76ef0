//! Field dispatch and whole-record sanitization.
//!
//! A [`FieldMap`] pairs every declared field name with its compiled
//! [`FieldSanitizer`]; nested `properties` compile to nested field maps, so a
//! schema tree becomes a tree of field maps. A [`RecordSanitizer`] is the
//! entry point applications hold on to.

use std::fmt;
use std::sync::Arc;

use crate::compiler::{Compiler, FieldSanitizer};
use crate::error::SchemaError;
use crate::schema::NamedSchema;
use crate::value::{Record, Value};

/// Ordered mapping from field name to compiled sanitizer.
#[derive(Clone)]
pub struct FieldMap {
    fields: Arc<[(String, FieldSanitizer)]>,
}

impl FieldMap {
    pub(crate) fn build(compiler: &Compiler, schemas: &[NamedSchema]) -> Result<Self, SchemaError> {
        let fields = schemas
            .iter()
            .map(|named| Ok((named.name.clone(), compiler.compile_field(&named.schema)?)))
            .collect::<Result<Vec<_>, SchemaError>>()?;
        tracing::debug!(fields = fields.len(), "compiled field map");
        Ok(Self {
            fields: fields.into(),
        })
    }

    /// Number of declared fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if no fields are declared.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Declared field names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Looks up a field's sanitizer.
    pub fn get(&self, name: &str) -> Option<&FieldSanitizer> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, sanitizer)| sanitizer)
    }

    /// Sanitizes `input` into a fresh record holding only declared fields.
    ///
    /// A field present in the input is always written, even when it
    /// sanitizes to null. A missing field is written only if sanitizing the
    /// missing value yields something non-empty, i.e. it has a default. Fields
    /// appear in declared order. When a name is declared twice the later
    /// declaration's value is kept at the first declaration's position.
    pub fn sanitize(&self, input: &Record) -> Record {
        let mut output = Record::new();
        for (name, sanitizer) in self.fields.iter() {
            match input.get(name) {
                Some(value) => {
                    let sanitized = sanitizer
                        .sanitize(Some(value), name, input)
                        .unwrap_or(Value::Null);
                    output.insert(name.clone(), sanitized);
                }
                None => {
                    if let Some(sanitized) = sanitizer.sanitize(None, name, input) {
                        if !sanitized.is_null() {
                            output.insert(name.clone(), sanitized);
                        }
                    }
                }
            }
        }
        output
    }
}

impl fmt::Debug for FieldMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.fields.iter().map(|(name, sanitizer)| (name, sanitizer)))
            .finish()
    }
}

/// Sanitizes whole records against a compiled schema.
///
/// Built once by [`compile`](crate::compile) or
/// [`Compiler::compile`](crate::Compiler::compile) and reused for every
/// input. Cloning is cheap and the sanitizer can be shared across threads.
///
/// # Examples
///
/// ```
/// use schema_sanitize::{compile, record_from_pairs, NamedSchema, Schema, Value};
///
/// let sanitizer = compile(&[
///     NamedSchema::new("q", Schema::of_type("string")),
///     NamedSchema::new("page", Schema::of_type("integer").with_default(1i64)),
/// ])
/// .unwrap();
///
/// let input = record_from_pairs([("q", "rust"), ("admin", "true")]);
/// let output = sanitizer.sanitize(Some(&input));
///
/// assert_eq!(output["q"], Value::from("rust"));
/// assert_eq!(output["page"], Value::from(1i64));
/// assert!(!output.contains_key("admin"));
/// ```
#[derive(Debug, Clone)]
pub struct RecordSanitizer {
    fields: FieldMap,
}

impl RecordSanitizer {
    pub(crate) fn new(fields: FieldMap) -> Self {
        Self { fields }
    }

    /// Sanitizes a record; `None` is treated as an empty record.
    ///
    /// Never fails. Fields that cannot be sanitized keep their original
    /// value, so callers needing guarantees must validate the result.
    pub fn sanitize(&self, input: Option<&Record>) -> Record {
        match input {
            Some(record) => self.fields.sanitize(record),
            None => self.fields.sanitize(&Record::new()),
        }
    }

    /// Sanitizes a dynamic value: objects are sanitized as records, anything
    /// else as an empty record.
    pub fn sanitize_value(&self, input: &Value) -> Value {
        Value::Object(self.sanitize(input.as_object()))
    }

    /// The compiled top-level fields.
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Properties, Schema};
    use crate::value::record_from_pairs;
    use serde_json::json;

    fn compile(properties: serde_json::Value) -> RecordSanitizer {
        let properties: Properties = serde_json::from_value(properties).expect("valid properties");
        Compiler::new().compile(&properties).expect("compiles")
    }

    fn record(value: serde_json::Value) -> Record {
        match Value::from(value) {
            Value::Object(record) => record,
            other => panic!("expected an object, got {other:?}"),
        }
    }

    #[test]
    fn drops_unknown_fields() {
        let sanitizer = compile(json!({"name": {"type": "string"}}));

        let output = sanitizer.sanitize(Some(&record(json!({"name": "a", "role": "admin"}))));

        assert_eq!(output, record(json!({"name": "a"})));
    }

    #[test]
    fn present_fields_are_always_written() {
        let sanitizer = compile(json!({"note": {"type": "string"}}));

        let output = sanitizer.sanitize(Some(&record(json!({"note": null}))));

        assert_eq!(output.get("note"), Some(&Value::Null));
    }

    #[test]
    fn missing_fields_only_written_with_defaults() {
        let sanitizer = compile(json!({
            "q": {"type": "string"},
            "limit": {"type": "integer", "default": 20}
        }));

        let output = sanitizer.sanitize(Some(&Record::new()));

        assert_eq!(output, record(json!({"limit": 20})));
    }

    #[test]
    fn absent_input_is_an_empty_record() {
        let sanitizer = compile(json!({"flag": {"type": "boolean", "default": false}}));

        assert_eq!(sanitizer.sanitize(None), record(json!({"flag": false})));
    }

    #[test]
    fn no_fields_always_yields_empty_record() {
        let sanitizer = Compiler::new().compile(&[]).unwrap();

        assert!(sanitizer.fields().is_empty());
        assert!(sanitizer.sanitize(Some(&record(json!({"a": 1})))).is_empty());
        assert!(sanitizer.sanitize(None).is_empty());
    }

    #[test]
    fn input_is_not_mutated() {
        let sanitizer = compile(json!({"n": {"type": "integer"}}));
        let input = record(json!({"n": "7", "x": "y"}));
        let snapshot = input.clone();

        let _ = sanitizer.sanitize(Some(&input));

        assert_eq!(input, snapshot);
    }

    #[test]
    fn nested_records_recurse() {
        let sanitizer = compile(json!({
            "user": {
                "type": "object",
                "properties": {
                    "name": {"type": "string", "maxLength": 3},
                    "address": {
                        "properties": {"zip": {"type": "integer"}}
                    }
                }
            },
            "name": {"type": "integer"}
        }));

        let output = sanitizer.sanitize(Some(&record(json!({
            "user": {"name": "x", "address": {"zip": "02139", "street": "Main"}},
            "name": "5"
        }))));

        assert_eq!(
            output,
            record(json!({
                "user": {"name": "x", "address": {"zip": 2139}},
                "name": 5
            }))
        );
    }

    #[test]
    fn missing_nested_record_is_not_created() {
        let sanitizer = compile(json!({
            "user": {"properties": {"active": {"type": "boolean", "default": true}}}
        }));

        assert!(sanitizer.sanitize(None).is_empty());
    }

    #[test]
    fn nested_default_is_sanitized_through_children() {
        let sanitizer = compile(json!({
            "paging": {
                "default": {"size": "10"},
                "properties": {
                    "size": {"type": "integer"},
                    "page": {"type": "integer", "default": 1}
                }
            }
        }));

        assert_eq!(
            sanitizer.sanitize(None),
            record(json!({"paging": {"size": 10, "page": 1}}))
        );
    }

    #[test]
    fn fields_keep_declared_order() {
        let properties: Properties =
            serde_json::from_str(r#"{"b": {}, "a": {}, "c": {}}"#).unwrap();
        let sanitizer = Compiler::new().compile(&properties).unwrap();

        assert_eq!(sanitizer.fields().names().collect::<Vec<_>>(), ["b", "a", "c"]);
        assert!(sanitizer.fields().get("a").is_some());
        assert!(sanitizer.fields().get("z").is_none());
    }

    #[test]
    fn output_follows_declared_order() {
        let properties: Properties = serde_json::from_str(
            r#"{"zeta": {"type": "integer"}, "alpha": {"type": "integer"}, "mid": {"default": "m"}}"#,
        )
        .unwrap();
        let sanitizer = Compiler::new().compile(&properties).unwrap();

        let output = sanitizer.sanitize(Some(&record_from_pairs([("alpha", "2"), ("zeta", "1")])));

        assert_eq!(output.keys().collect::<Vec<_>>(), ["zeta", "alpha", "mid"]);
        assert_eq!(
            serde_json::to_string(&output).unwrap(),
            r#"{"zeta":1,"alpha":2,"mid":"m"}"#
        );
    }

    #[test]
    fn sanitize_value_accepts_non_objects() {
        let sanitizer = Compiler::new()
            .compile(&[NamedSchema::new("n", Schema::of_type("integer").with_default(3i64))])
            .unwrap();

        assert_eq!(
            sanitizer.sanitize_value(&Value::from("not a record")),
            Value::from(json!({"n": 3}))
        );
        assert_eq!(
            sanitizer.sanitize_value(&Value::from(json!({"n": "4"}))),
            Value::from(json!({"n": 4}))
        );
    }

    #[test]
    fn rules_receive_the_containing_record() {
        use crate::error::SanitizeError;
        use crate::rules::{rule, Rule};

        fn matches_field(param: &Value, _: &str, _: &Schema) -> Result<Rule, SchemaError> {
            let other = param.as_str().unwrap_or_default().to_string();
            Ok(rule(move |value, _key, record| {
                if record.get(&other) == Some(value) {
                    Ok(value.clone())
                } else {
                    Err(SanitizeError::rule("sameAs", "fields differ"))
                }
            }))
        }

        let compiler = Compiler::new().with_rule("sameAs", matches_field).unwrap();
        let properties: Properties = serde_json::from_value(json!({
            "password": {"type": "string"},
            "confirm": {"type": "string", "sameAs": "password", "default": ""}
        }))
        .unwrap();
        let sanitizer = compiler.compile(&properties).unwrap();

        let output = sanitizer.sanitize(Some(&record(json!({"password": "pw", "confirm": "px"}))));
        assert_eq!(output["confirm"], Value::from("px"));

        let output = sanitizer.sanitize(Some(&record(json!({"password": "pw"}))));
        assert_eq!(output["confirm"], Value::from(""));
    }

    mod proptests {
        use super::*;
        use crate::test_utils::{arb_field_name, arb_scalar};
        use proptest::prelude::*;

        proptest! {
            /// Property: output keys are always a subset of declared fields
            #[test]
            fn proptest_output_keys_are_declared(
                declared in prop::collection::vec(arb_field_name(), 0..5),
                input in prop::collection::btree_map(arb_field_name(), arb_scalar(), 0..8)
            ) {
                let schemas: Vec<NamedSchema> = declared
                    .iter()
                    .map(|name| NamedSchema::new(name.clone(), Schema::of_type("string")))
                    .collect();
                let sanitizer = Compiler::new().compile(&schemas).unwrap();
                let input: Record = input.into_iter().collect();

                let output = sanitizer.sanitize(Some(&input));

                for key in output.keys() {
                    prop_assert!(declared.contains(key), "undeclared key {} in output", key);
                }
            }

            /// Property: a missing field sanitizes exactly like its default
            #[test]
            fn proptest_default_matches_explicit_value(default in arb_scalar()) {
                let sanitizer = Compiler::new()
                    .compile(&[NamedSchema::new(
                        "f",
                        Schema::union(["integer", "boolean"]).with_default(default.clone()),
                    )])
                    .unwrap();
                let mut explicit = Record::new();
                explicit.insert("f".to_string(), default);

                prop_assert_eq!(
                    sanitizer.sanitize(None),
                    sanitizer.sanitize(Some(&explicit))
                );
            }
        }
    }
}
