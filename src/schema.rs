//! Declarative field schemas.
//!
//! A [`Schema`] describes how one field is sanitized: its type (or union of
//! types), an optional default, nested `items`/`properties`, and any number of
//! named rules. Schemas are plain data; they deserialize from any serde format
//! and carry no behaviour until compiled by a [`Compiler`](crate::Compiler).

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::value::Value;

/// Schema keys that are never treated as rules.
pub const RESERVED_KEYS: [&str; 4] = ["type", "default", "items", "properties"];

/// Returns `true` if `key` is one of [`RESERVED_KEYS`].
pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// The declared type of a schema: one type name or an ordered union.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeSpec {
    /// A single type name, e.g. `"integer"`.
    One(String),
    /// Alternatives tried in order, e.g. `["integer", "string"]`.
    Union(Vec<String>),
}

impl TypeSpec {
    /// The declared type names in order.
    pub fn names(&self) -> &[String] {
        match self {
            TypeSpec::One(name) => std::slice::from_ref(name),
            TypeSpec::Union(names) => names,
        }
    }
}

/// How to sanitize one field's value.
///
/// Every key other than `type`, `default`, `items` and `properties` is
/// collected into [`rules`](Self::rules) and resolved by name against the
/// rule registry at compile time. Keys without a registered rule (such as
/// `title` or `description`) are ignored.
///
/// # Examples
///
/// ```
/// use schema_sanitize::Schema;
///
/// let schema: Schema = serde_json::from_str(
///     r#"{"type": "integer", "minimum": 1, "default": 10, "description": "page size"}"#,
/// ).unwrap();
///
/// assert_eq!(schema.ty.as_ref().unwrap().names(), ["integer"]);
/// assert!(schema.rules.contains_key("minimum"));
/// assert!(schema.default.is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Declared type, if any. An untyped schema skips coercion.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeSpec>,

    /// Value sanitized in place of a missing or null input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Element schema for `array` types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<FieldSchema>>,

    /// Child fields; makes this schema a nested record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,

    /// Rule parameters keyed by rule name.
    #[serde(flatten)]
    pub rules: BTreeMap<String, Value>,
}

impl Schema {
    /// Creates an empty schema with no type and no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a schema of a single type.
    pub fn of_type(name: impl Into<String>) -> Self {
        Self {
            ty: Some(TypeSpec::One(name.into())),
            ..Self::default()
        }
    }

    /// Creates a schema whose type is a union tried in the given order.
    pub fn union<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ty: Some(TypeSpec::Union(names.into_iter().map(Into::into).collect())),
            ..Self::default()
        }
    }

    /// Creates an untyped nested-record schema.
    pub fn record(properties: impl Into<Properties>) -> Self {
        Self {
            properties: Some(properties.into()),
            ..Self::default()
        }
    }

    /// Sets the default value.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Sets the element schema.
    pub fn with_items(mut self, items: impl Into<FieldSchema>) -> Self {
        self.items = Some(Box::new(items.into()));
        self
    }

    /// Sets the child fields.
    pub fn with_properties(mut self, properties: impl Into<Properties>) -> Self {
        self.properties = Some(properties.into());
        self
    }

    /// Adds a rule parameter.
    ///
    /// Reserved keys are not rules; use the dedicated builders for them.
    pub fn with_rule(mut self, name: impl Into<String>, param: impl Into<Value>) -> Self {
        self.rules.insert(name.into(), param.into());
        self
    }

    /// The declared type names, empty for an untyped schema.
    pub fn type_names(&self) -> &[String] {
        self.ty.as_ref().map_or(&[][..], TypeSpec::names)
    }
}

/// The schema of one field: a single schema or alternatives tried in order.
///
/// Deserializes from a schema object or from an array of schema objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldSchema {
    /// One schema.
    Single(Schema),
    /// Alternative schemas; the first that fully succeeds wins.
    Union(Vec<Schema>),
}

impl FieldSchema {
    /// The alternatives of this field in declared order.
    pub fn alternatives(&self) -> &[Schema] {
        match self {
            FieldSchema::Single(schema) => std::slice::from_ref(schema),
            FieldSchema::Union(schemas) => schemas,
        }
    }
}

impl From<Schema> for FieldSchema {
    fn from(schema: Schema) -> Self {
        FieldSchema::Single(schema)
    }
}

impl From<Vec<Schema>> for FieldSchema {
    fn from(schemas: Vec<Schema>) -> Self {
        FieldSchema::Union(schemas)
    }
}

/// A field name paired with its schema.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedSchema {
    /// Field name as it appears in the input record.
    pub name: String,
    /// How the field is sanitized.
    pub schema: FieldSchema,
}

impl NamedSchema {
    /// Pairs a field name with its schema.
    pub fn new(name: impl Into<String>, schema: impl Into<FieldSchema>) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
        }
    }
}

/// An ordered collection of named field schemas.
///
/// Serialized as a map from field name to schema. Deserialization keeps the
/// order in which fields appear in the source document, which is also the
/// order in which a compiled sanitizer visits them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(Vec<NamedSchema>);

impl Properties {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field.
    pub fn push(&mut self, named: NamedSchema) {
        self.0.push(named);
    }

    /// Appends a field, builder style.
    pub fn with(mut self, name: impl Into<String>, schema: impl Into<FieldSchema>) -> Self {
        self.push(NamedSchema::new(name, schema));
        self
    }
}

impl Deref for Properties {
    type Target = [NamedSchema];

    fn deref(&self) -> &[NamedSchema] {
        &self.0
    }
}

impl From<Vec<NamedSchema>> for Properties {
    fn from(fields: Vec<NamedSchema>) -> Self {
        Self(fields)
    }
}

impl FromIterator<NamedSchema> for Properties {
    fn from_iter<I: IntoIterator<Item = NamedSchema>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Properties {
    type Item = NamedSchema;
    type IntoIter = std::vec::IntoIter<NamedSchema>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Properties {
    type Item = &'a NamedSchema;
    type IntoIter = std::slice::Iter<'a, NamedSchema>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for Properties {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for named in &self.0 {
            map.serialize_entry(&named.name, &named.schema)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Properties {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PropertiesVisitor;

        impl<'de> Visitor<'de> for PropertiesVisitor {
            type Value = Properties;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field names to schemas")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Properties, A::Error> {
                let mut fields = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, schema)) = access.next_entry::<String, FieldSchema>()? {
                    fields.push(NamedSchema { name, schema });
                }
                Ok(Properties(fields))
            }
        }

        deserializer.deserialize_map(PropertiesVisitor)
    }
}
