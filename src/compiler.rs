//! Compiles field schemas into executable sanitizers.
//!
//! Each alternative of a field becomes a chain: an optional type coercer
//! followed by the schema's rules, plus the nested `items` or `properties`
//! handling. A chain succeeds only if every step succeeds. A field with
//! several alternatives (a union) resolves to the first chain that succeeds.

use std::fmt;
use std::sync::Arc;

use crate::coerce::{Coerce, TypeRegistry};
use crate::dispatch::{FieldMap, RecordSanitizer};
use crate::error::{SanitizeError, SchemaError};
use crate::rules::{Rule, RuleFactory, RuleRegistry};
use crate::schema::{is_reserved, FieldSchema, NamedSchema, Schema};
use crate::value::{is_empty, Record, Value};

/// Builds sanitizers from schemas using a type registry and a rule registry.
///
/// `Compiler::new()` starts from the built-in types and rules. Extra entries
/// are added builder style before compiling; compiled sanitizers do not see
/// later registrations.
///
/// # Examples
///
/// ```
/// use schema_sanitize::{Compiler, NamedSchema, Record, Schema, SanitizeError, Value};
///
/// fn cents(value: &Value) -> Result<Value, SanitizeError> {
///     let euros: f64 = value.to_string().trim_start_matches('€').parse().map_err(|_| {
///         SanitizeError::Coercion { expected: "cents", found: value.kind() }
///     })?;
///     Ok(Value::from((euros * 100.0).round() as i64))
/// }
///
/// let sanitizer = Compiler::new()
///     .with_type("cents", cents)
///     .compile(&[NamedSchema::new("price", Schema::of_type("cents"))])
///     .unwrap();
///
/// let mut input = Record::new();
/// input.insert("price".into(), "€12.50".into());
///
/// assert_eq!(sanitizer.sanitize(Some(&input))["price"], Value::from(1250i64));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    types: TypeRegistry,
    rules: RuleRegistry,
}

impl Compiler {
    /// Creates a compiler with the built-in types and rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a compiler from existing registries.
    pub fn with_registries(types: TypeRegistry, rules: RuleRegistry) -> Self {
        Self { types, rules }
    }

    /// Registers a type coercer.
    pub fn with_type(mut self, name: impl Into<String>, coercer: impl Coerce + 'static) -> Self {
        self.types.register(name, coercer);
        self
    }

    /// Registers a rule factory.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::ReservedRuleName`] if `name` is a reserved
    /// schema key.
    pub fn with_rule(
        mut self,
        name: impl Into<String>,
        factory: impl RuleFactory + 'static,
    ) -> Result<Self, SchemaError> {
        self.rules.register(name, factory)?;
        Ok(self)
    }

    /// The type registry used for compilation.
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// The rule registry used for compilation.
    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    /// Compiles named field schemas into a record sanitizer.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidRule`] if a rule parameter anywhere in
    /// the schemas (including nested ones) cannot be used.
    pub fn compile(&self, schemas: &[NamedSchema]) -> Result<RecordSanitizer, SchemaError> {
        Ok(RecordSanitizer::new(FieldMap::build(self, schemas)?))
    }

    /// Compiles a single field schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidRule`] if a rule parameter cannot be used.
    pub fn compile_field(&self, field: &FieldSchema) -> Result<FieldSanitizer, SchemaError> {
        let mut alternatives = Vec::new();
        for schema in field.alternatives() {
            let nested = schema
                .properties
                .as_ref()
                .map(|properties| FieldMap::build(self, properties))
                .transpose()?;
            let names = schema.type_names();
            if names.is_empty() {
                alternatives.push(self.compile_chain(schema, None, nested.as_ref())?);
            }
            for name in names {
                alternatives.push(self.compile_chain(schema, Some(name.as_str()), nested.as_ref())?);
            }
        }
        if alternatives.is_empty() {
            alternatives.push(Chain::passthrough());
        }

        let default = field
            .alternatives()
            .iter()
            .find_map(|schema| schema.default.clone());

        Ok(FieldSanitizer {
            inner: Arc::new(CompiledField {
                alternatives,
                default,
            }),
        })
    }

    /// `nested` is the schema's compiled `properties`, shared by reference
    /// count; only the `object` or untyped alternative treats the value as a
    /// nested record.
    fn compile_chain(
        &self,
        schema: &Schema,
        type_name: Option<&str>,
        nested: Option<&FieldMap>,
    ) -> Result<Chain, SchemaError> {
        let shape = match (nested, &schema.items, type_name) {
            (Some(fields), _, None | Some("object")) => Shape::Record(fields.clone()),
            (_, Some(items), Some("array")) => Shape::Items(self.compile_field(items)?),
            _ => Shape::Scalar,
        };

        let coercer = match (&shape, type_name) {
            (Shape::Record(_), _) => self.types.get("object"),
            (_, Some(name)) => {
                let coercer = self.types.get(name);
                if coercer.is_none() {
                    tracing::warn!(type_name = %name, "unknown type, coercion skipped");
                }
                coercer
            }
            (_, None) => None,
        };

        let mut rules = Vec::new();
        for (name, param) in &schema.rules {
            if is_reserved(name) {
                continue;
            }
            match self.rules.get(name) {
                Some(factory) => rules.push(factory.build(param, name, schema)?),
                None => tracing::trace!(key = %name, "no rule registered, key ignored"),
            }
        }

        Ok(Chain {
            type_name: type_name.map(str::to_string),
            coercer,
            rules,
            shape,
        })
    }
}

/// One alternative: coerce, apply rules, then handle nested values.
struct Chain {
    type_name: Option<String>,
    coercer: Option<Arc<dyn Coerce>>,
    rules: Vec<Rule>,
    shape: Shape,
}

enum Shape {
    Scalar,
    /// Array whose elements are sanitized one by one.
    Items(FieldSanitizer),
    /// Nested record.
    Record(FieldMap),
}

impl Chain {
    fn passthrough() -> Self {
        Self {
            type_name: None,
            coercer: None,
            rules: Vec::new(),
            shape: Shape::Scalar,
        }
    }

    fn run(&self, value: &Value, key: &str, record: &Record) -> Result<Value, SanitizeError> {
        let mut current = match (&self.coercer, &self.shape) {
            // A lone value that is not an array becomes a one-element array.
            (Some(coercer), Shape::Items(_)) => coercer
                .coerce(value)
                .unwrap_or_else(|_| Value::Array(vec![value.clone()])),
            (Some(coercer), _) => coercer.coerce(value)?,
            (None, _) => value.clone(),
        };

        for rule in &self.rules {
            current = rule(&current, key, record)?;
        }

        match &self.shape {
            Shape::Scalar => Ok(current),
            Shape::Items(items) => {
                let elements = match current {
                    Value::Array(elements) => elements,
                    other => vec![other],
                };
                elements
                    .iter()
                    .enumerate()
                    .map(|(index, element)| {
                        items
                            .try_sanitize(Some(element), key, record)
                            .map(|sanitized| sanitized.unwrap_or(Value::Null))
                            .map_err(|source| SanitizeError::Item {
                                index,
                                source: Box::new(source),
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            Shape::Record(fields) => match current {
                Value::Object(nested) => Ok(Value::Object(fields.sanitize(&nested))),
                other => Err(SanitizeError::Shape {
                    expected: "object",
                    found: other.kind(),
                }),
            },
        }
    }
}

struct CompiledField {
    alternatives: Vec<Chain>,
    default: Option<Value>,
}

/// The compiled sanitizer of one field.
///
/// Immutable and cheap to clone; safe to share across threads.
#[derive(Clone)]
pub struct FieldSanitizer {
    inner: Arc<CompiledField>,
}

impl FieldSanitizer {
    /// Sanitizes a field value, falling back to the original input when no
    /// alternative succeeds.
    ///
    /// `value` is `None` when the field is missing. A missing or null value is
    /// replaced by the declared default, which is sanitized in turn; without a
    /// default the empty value is returned as is.
    pub fn sanitize(&self, value: Option<&Value>, key: &str, record: &Record) -> Option<Value> {
        match self.try_sanitize(value, key, record) {
            Ok(sanitized) => sanitized,
            Err(error) => {
                tracing::debug!(field = %key, %error, "sanitization failed, keeping original value");
                self.effective_input(value).cloned()
            }
        }
    }

    /// Like [`sanitize`](Self::sanitize) but reports failure instead of
    /// falling back.
    ///
    /// # Errors
    ///
    /// Returns the failing chain's error for a single alternative, or
    /// [`SanitizeError::UnionExhausted`] when several alternatives all fail.
    pub fn try_sanitize(
        &self,
        value: Option<&Value>,
        key: &str,
        record: &Record,
    ) -> Result<Option<Value>, SanitizeError> {
        match self.effective_input(value) {
            Some(input) if !input.is_null() => self.resolve(input, key, record).map(Some),
            empty => Ok(empty.cloned()),
        }
    }

    /// Returns the declared default, if any.
    pub fn default_value(&self) -> Option<&Value> {
        self.inner.default.as_ref()
    }

    /// The value actually resolved: the input, or the default for an empty
    /// input.
    fn effective_input<'a>(&'a self, value: Option<&'a Value>) -> Option<&'a Value> {
        if is_empty(value) {
            self.inner.default.as_ref().or(value)
        } else {
            value
        }
    }

    fn resolve(&self, value: &Value, key: &str, record: &Record) -> Result<Value, SanitizeError> {
        let alternatives = &self.inner.alternatives;
        let mut last_error = None;
        for chain in alternatives {
            match chain.run(value, key, record) {
                Ok(sanitized) => return Ok(sanitized),
                Err(error) => {
                    tracing::trace!(
                        field = %key,
                        alternative = ?chain.type_name,
                        %error,
                        "alternative rejected"
                    );
                    last_error = Some(error);
                }
            }
        }
        match last_error {
            Some(error) if alternatives.len() == 1 => Err(error),
            _ => Err(SanitizeError::UnionExhausted {
                tried: alternatives.len(),
            }),
        }
    }
}

impl fmt::Debug for FieldSanitizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types: Vec<Option<&str>> = self
            .inner
            .alternatives
            .iter()
            .map(|chain| chain.type_name.as_deref())
            .collect();
        f.debug_struct("FieldSanitizer")
            .field("types", &types)
            .field("default", &self.inner.default)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::rule;
    use serde_json::json;

    fn field(schema: serde_json::Value) -> FieldSanitizer {
        let schema: FieldSchema = serde_json::from_value(schema).expect("valid schema");
        Compiler::new().compile_field(&schema).expect("compiles")
    }

    fn run(sanitizer: &FieldSanitizer, value: serde_json::Value) -> Option<Value> {
        sanitizer.sanitize(Some(&Value::from(value)), "field", &Record::new())
    }

    #[test]
    fn coerces_then_applies_rules() {
        let age = field(json!({"type": "integer", "minimum": 0, "maximum": 150}));

        assert_eq!(run(&age, json!("42")), Some(Value::from(42i64)));
        assert_eq!(run(&age, json!("200")), Some(Value::from("200")));
    }

    #[test]
    fn failed_coercion_returns_original() {
        let count = field(json!({"type": "integer"}));

        assert_eq!(run(&count, json!("abc")), Some(Value::from("abc")));
        assert_eq!(
            count.try_sanitize(Some(&Value::from("abc")), "count", &Record::new()),
            Err(SanitizeError::Coercion {
                expected: "integer",
                found: "string"
            })
        );
    }

    #[test]
    fn union_first_success_wins() {
        let id = field(json!({"type": ["integer", "string"]}));

        assert_eq!(run(&id, json!("123")), Some(Value::from(123i64)));
        assert_eq!(run(&id, json!("abc")), Some(Value::from("abc")));
    }

    #[test]
    fn union_rules_apply_per_alternative() {
        let when = field(json!([
            {"type": "date"},
            {"type": "string", "enum": ["now", "never"]}
        ]));

        assert!(matches!(run(&when, json!("2024-01-01")), Some(Value::Date(_))));
        assert_eq!(run(&when, json!("now")), Some(Value::from("now")));
        assert_eq!(
            when.try_sanitize(Some(&Value::from("soon")), "when", &Record::new()),
            Err(SanitizeError::UnionExhausted { tried: 2 })
        );
    }

    #[test]
    fn empty_input_uses_sanitized_default() {
        let page = field(json!({"type": "integer", "default": "1"}));

        assert_eq!(page.sanitize(None, "page", &Record::new()), Some(Value::from(1i64)));
        assert_eq!(run(&page, json!(null)), Some(Value::from(1i64)));
        assert_eq!(run(&page, json!("3")), Some(Value::from(3i64)));
    }

    #[test]
    fn empty_input_without_default_passes_through() {
        let name = field(json!({"type": "string"}));

        assert_eq!(name.sanitize(None, "name", &Record::new()), None);
        assert_eq!(run(&name, json!(null)), Some(Value::Null));
    }

    #[test]
    fn falsy_values_are_not_empty() {
        let page = field(json!({"type": "string", "default": "fallback"}));

        assert_eq!(run(&page, json!("")), Some(Value::from("")));
        assert_eq!(run(&page, json!(0)), Some(Value::from("0")));
        assert_eq!(run(&page, json!(false)), Some(Value::from("false")));
    }

    #[test]
    fn failing_default_is_returned_unchanged() {
        let count = field(json!({"type": "integer", "default": "many"}));

        assert_eq!(count.sanitize(None, "count", &Record::new()), Some(Value::from("many")));
    }

    #[test]
    fn items_wrap_scalars_and_coerce_elements() {
        let ids = field(json!({"type": "array", "items": {"type": "integer"}}));

        assert_eq!(run(&ids, json!("5")), Some(Value::Array(vec![Value::from(5i64)])));
        assert_eq!(
            run(&ids, json!(["1", 2, "3"])),
            Some(Value::Array(vec![
                Value::from(1i64),
                Value::from(2i64),
                Value::from(3i64)
            ]))
        );
        assert_eq!(
            run(&ids, json!("[4, \"5\"]")),
            Some(Value::Array(vec![Value::from(4i64), Value::from(5i64)]))
        );
    }

    #[test]
    fn one_bad_item_fails_the_array() {
        let ids = field(json!({"type": "array", "items": {"type": "integer"}}));
        let input = Value::from(json!(["1", "x"]));

        assert_eq!(
            ids.try_sanitize(Some(&input), "ids", &Record::new()),
            Err(SanitizeError::Item {
                index: 1,
                source: Box::new(SanitizeError::Coercion {
                    expected: "integer",
                    found: "string"
                }),
            })
        );
        assert_eq!(ids.sanitize(Some(&input), "ids", &Record::new()), Some(input));
    }

    #[test]
    fn array_without_items_requires_a_sequence() {
        let tags = field(json!({"type": "array", "maxItems": 2}));

        assert_eq!(run(&tags, json!("a")), Some(Value::from("a")));
        assert_eq!(run(&tags, json!("[\"a\",\"b\",\"c\"]")), Some(Value::from("[\"a\",\"b\",\"c\"]")));
        assert_eq!(
            run(&tags, json!("[\"a\"]")),
            Some(Value::Array(vec![Value::from("a")]))
        );
    }

    #[test]
    fn nested_properties_use_child_schemas() {
        let user = field(json!({
            "type": "object",
            "properties": {
                "age": {"type": "integer"},
                "active": {"type": "boolean", "default": true}
            }
        }));

        let sanitized = run(&user, json!({"age": "31", "extra": 1})).unwrap();
        let record = sanitized.as_object().unwrap();
        assert_eq!(record["age"], Value::from(31i64));
        assert_eq!(record["active"], Value::Bool(true));
        assert!(!record.contains_key("extra"));
    }

    #[test]
    fn nested_properties_accept_json_strings() {
        let point = field(json!({"properties": {"x": {"type": "number"}}}));

        let sanitized = run(&point, json!("{\"x\": \"1.5\"}")).unwrap();
        assert_eq!(sanitized.as_object().unwrap()["x"], Value::from(1.5));
        assert_eq!(run(&point, json!("nope")), Some(Value::from("nope")));
    }

    #[test]
    fn properties_only_shape_the_object_alternative() {
        let point = field(json!({
            "type": ["object", "string"],
            "properties": {"x": {"type": "integer"}}
        }));

        let sanitized = run(&point, json!({"x": "2"})).unwrap();
        assert_eq!(sanitized.as_object().unwrap()["x"], Value::from(2i64));
        assert_eq!(
            point.try_sanitize(Some(&Value::from("plain")), "point", &Record::new()),
            Ok(Some(Value::from("plain")))
        );
        assert_eq!(run(&point, json!(5)), Some(Value::from("5")));
    }

    #[test]
    fn unknown_type_skips_coercion() {
        let odd = field(json!({"type": "color", "maxLength": 3}));

        assert_eq!(run(&odd, json!("red")), Some(Value::from("red")));
        assert!(odd
            .try_sanitize(Some(&Value::from("purple")), "odd", &Record::new())
            .is_err());
    }

    #[test]
    fn unregistered_keys_are_ignored() {
        let title = field(json!({"type": "string", "title": "Title", "x-widget": "text"}));

        assert_eq!(run(&title, json!(5)), Some(Value::from("5")));
    }

    #[test]
    fn invalid_rule_parameter_fails_compilation() {
        let schema = FieldSchema::from(Schema::of_type("string").with_rule("pattern", "(unclosed"));

        assert!(matches!(
            Compiler::new().compile_field(&schema),
            Err(SchemaError::InvalidRule { .. })
        ));
    }

    #[test]
    fn rules_see_key_and_record() {
        fn echo_key(_: &Value, _: &str, _: &Schema) -> Result<Rule, SchemaError> {
            Ok(rule(|_value, key, record| {
                Ok(Value::from(format!("{key}:{}", record.len())))
            }))
        }

        let compiler = Compiler::new().with_rule("echoKey", echo_key).unwrap();
        let sanitizer = compiler
            .compile_field(&Schema::of_type("string").with_rule("echoKey", true).into())
            .unwrap();
        let mut record = Record::new();
        record.insert("a".to_string(), Value::from("x"));

        assert_eq!(
            sanitizer.sanitize(Some(&Value::from("x")), "a", &record),
            Some(Value::from("a:1"))
        );
    }

    #[test]
    fn default_value_is_exposed() {
        let page = field(json!({"type": "integer", "default": 1}));
        assert_eq!(page.default_value(), Some(&Value::from(1i64)));
        assert!(format!("{page:?}").contains("integer"));
    }
}
