//! Named rules applied after type coercion.
//!
//! A rule is built by a [`RuleFactory`] from the parameter found under its
//! name in a schema (`"maximum": 10` builds the `maximum` rule with `10`).
//! The built [`Rule`] then checks, and may transform, each coerced value.
//!
//! Rules only constrain the value kinds they are about: numeric rules let
//! strings through, string rules let numbers through. Type enforcement is the
//! coercer's job.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate};
use regex::Regex;

use crate::error::{SanitizeError, SchemaError};
use crate::schema::{is_reserved, Schema};
use crate::value::{Record, Value};

/// A compiled rule: `(value, key, containing record) -> value`.
pub type Rule = Arc<dyn Fn(&Value, &str, &Record) -> Result<Value, SanitizeError> + Send + Sync>;

/// Wraps a closure as a [`Rule`].
///
/// Passing the closure through this function lets the compiler infer its
/// argument and return types.
pub fn rule<F>(f: F) -> Rule
where
    F: Fn(&Value, &str, &Record) -> Result<Value, SanitizeError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Builds a [`Rule`] from the rule's schema parameter.
///
/// Called once per schema at compile time with the parameter value, the rule
/// name, and the whole schema the rule appears in. Implemented for every
/// matching `Fn` that is `Send + Sync`.
pub trait RuleFactory: Send + Sync {
    /// Builds the rule, or rejects an unusable parameter.
    fn build(&self, param: &Value, name: &str, schema: &Schema) -> Result<Rule, SchemaError>;
}

impl<F> RuleFactory for F
where
    F: Fn(&Value, &str, &Schema) -> Result<Rule, SchemaError> + Send + Sync,
{
    fn build(&self, param: &Value, name: &str, schema: &Schema) -> Result<Rule, SchemaError> {
        self(param, name, schema)
    }
}

/// Name-to-factory mapping consulted when schemas are compiled.
///
/// [`RuleRegistry::new`] holds the built-in rules: `minimum`, `maximum`,
/// `exclusiveMinimum`, `exclusiveMaximum`, `multipleOf`, `minLength`,
/// `maxLength`, `pattern`, `format`, `enum`, `const`, `minItems`, `maxItems`
/// and `uniqueItems`.
///
/// # Examples
///
/// ```
/// use schema_sanitize::{rule, Rule, RuleRegistry, Schema, SchemaError, Value};
///
/// fn lowercase(_param: &Value, _name: &str, _schema: &Schema) -> Result<Rule, SchemaError> {
///     Ok(rule(|value, _key, _record| {
///         Ok(match value {
///             Value::String(s) => Value::String(s.to_lowercase()),
///             other => other.clone(),
///         })
///     }))
/// }
///
/// let mut rules = RuleRegistry::new();
/// rules.register("lowercase", lowercase).unwrap();
///
/// // Reserved schema keys can never become rules.
/// assert!(matches!(rules.register("default", lowercase), Err(SchemaError::ReservedRuleName(_))));
/// ```
#[derive(Clone)]
pub struct RuleRegistry {
    factories: HashMap<String, Arc<dyn RuleFactory>>,
}

impl RuleRegistry {
    /// Creates a registry holding the built-in rules.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.insert("minimum", bound(|n, limit| n >= limit, "at least"));
        registry.insert("maximum", bound(|n, limit| n <= limit, "at most"));
        registry.insert("exclusiveMinimum", bound(|n, limit| n > limit, "greater than"));
        registry.insert("exclusiveMaximum", bound(|n, limit| n < limit, "less than"));
        registry.insert("multipleOf", multiple_of);
        registry.insert("minLength", length(|len, limit| len >= limit, "at least"));
        registry.insert("maxLength", length(|len, limit| len <= limit, "at most"));
        registry.insert("minItems", items(|len, limit| len >= limit, "at least"));
        registry.insert("maxItems", items(|len, limit| len <= limit, "at most"));
        registry.insert("uniqueItems", unique_items);
        registry.insert("pattern", pattern);
        registry.insert("format", format);
        registry.insert("enum", one_of);
        registry.insert("const", constant);
        registry
    }

    /// Creates a registry with no rules at all.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers `factory` under `name`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::ReservedRuleName`] for `type`, `default`,
    /// `items` and `properties`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl RuleFactory + 'static,
    ) -> Result<&mut Self, SchemaError> {
        let name = name.into();
        if is_reserved(&name) {
            return Err(SchemaError::ReservedRuleName(name));
        }
        self.insert(name, factory);
        Ok(self)
    }

    /// Looks up the factory registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<dyn RuleFactory>> {
        self.factories.get(name).cloned()
    }

    /// Returns `true` if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    fn insert(&mut self, name: impl Into<String>, factory: impl RuleFactory + 'static) {
        self.factories.insert(name.into(), Arc::new(factory));
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("RuleRegistry").field("rules", &names).finish()
    }
}

fn number_param(param: &Value, name: &str) -> Result<f64, SchemaError> {
    param
        .as_f64()
        .ok_or_else(|| SchemaError::invalid_rule(name, format!("expected a number, found {}", param.kind())))
}

fn count_param(param: &Value, name: &str) -> Result<usize, SchemaError> {
    match param {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| SchemaError::invalid_rule(name, "expected a non-negative integer")),
        other => Err(SchemaError::invalid_rule(
            name,
            format!("expected a non-negative integer, found {}", other.kind()),
        )),
    }
}

fn bool_param(param: &Value, name: &str) -> Result<bool, SchemaError> {
    match param {
        Value::Bool(b) => Ok(*b),
        other => Err(SchemaError::invalid_rule(
            name,
            format!("expected a boolean, found {}", other.kind()),
        )),
    }
}

fn str_param<'a>(param: &'a Value, name: &str) -> Result<&'a str, SchemaError> {
    param.as_str().ok_or_else(|| {
        SchemaError::invalid_rule(name, format!("expected a string, found {}", param.kind()))
    })
}

/// Numeric bound against the schema parameter.
fn bound(holds: fn(f64, f64) -> bool, relation: &'static str) -> impl RuleFactory {
    move |param: &Value, name: &str, _schema: &Schema| -> Result<Rule, SchemaError> {
        let limit = number_param(param, name)?;
        let name = name.to_string();
        Ok(rule(move |value, _key, _record| match value.as_f64() {
            Some(n) if !holds(n, limit) => Err(SanitizeError::rule(
                &name,
                format!("value must be {relation} {limit}"),
            )),
            _ => Ok(value.clone()),
        }))
    }
}

fn multiple_of(param: &Value, name: &str, _schema: &Schema) -> Result<Rule, SchemaError> {
    let step = number_param(param, name)?;
    if step <= 0.0 {
        return Err(SchemaError::invalid_rule(name, "must be greater than 0"));
    }
    let name = name.to_string();
    Ok(rule(move |value, _key, _record| match value.as_f64() {
        Some(n) => {
            let quotient = n / step;
            if (quotient - quotient.round()).abs() <= 1e-9 * quotient.abs().max(1.0) {
                Ok(value.clone())
            } else {
                Err(SanitizeError::rule(&name, format!("value must be a multiple of {step}")))
            }
        }
        None => Ok(value.clone()),
    }))
}

/// Character-count bound on strings.
fn length(holds: fn(usize, usize) -> bool, relation: &'static str) -> impl RuleFactory {
    move |param: &Value, name: &str, _schema: &Schema| -> Result<Rule, SchemaError> {
        let limit = count_param(param, name)?;
        let name = name.to_string();
        Ok(rule(move |value, _key, _record| match value {
            Value::String(s) if !holds(s.chars().count(), limit) => Err(SanitizeError::rule(
                &name,
                format!("length must be {relation} {limit}"),
            )),
            _ => Ok(value.clone()),
        }))
    }
}

/// Element-count bound on arrays.
fn items(holds: fn(usize, usize) -> bool, relation: &'static str) -> impl RuleFactory {
    move |param: &Value, name: &str, _schema: &Schema| -> Result<Rule, SchemaError> {
        let limit = count_param(param, name)?;
        let name = name.to_string();
        Ok(rule(move |value, _key, _record| match value {
            Value::Array(elements) if !holds(elements.len(), limit) => Err(SanitizeError::rule(
                &name,
                format!("item count must be {relation} {limit}"),
            )),
            _ => Ok(value.clone()),
        }))
    }
}

fn unique_items(param: &Value, name: &str, _schema: &Schema) -> Result<Rule, SchemaError> {
    let required = bool_param(param, name)?;
    let name = name.to_string();
    Ok(rule(move |value, _key, _record| match value {
        Value::Array(elements) if required => {
            if has_duplicates(elements) {
                Err(SanitizeError::rule(&name, "items must be unique"))
            } else {
                Ok(value.clone())
            }
        }
        _ => Ok(value.clone()),
    }))
}

/// Scalars are deduplicated through a hash set; only arrays and objects are
/// compared pairwise, and only against each other.
fn has_duplicates(elements: &[Value]) -> bool {
    let mut seen = HashSet::with_capacity(elements.len());
    let mut composites: Vec<&Value> = Vec::new();
    for element in elements {
        match element.scalar_key() {
            Some(key) => {
                if !seen.insert(key) {
                    return true;
                }
            }
            None => {
                if composites.iter().any(|other| other.equivalent(element)) {
                    return true;
                }
                composites.push(element);
            }
        }
    }
    false
}

fn pattern(param: &Value, name: &str, _schema: &Schema) -> Result<Rule, SchemaError> {
    let regex = Regex::new(str_param(param, name)?)
        .map_err(|e| SchemaError::invalid_rule(name, e.to_string()))?;
    let name = name.to_string();
    Ok(rule(move |value, _key, _record| match value {
        Value::String(s) if !regex.is_match(s) => Err(SanitizeError::rule(
            &name,
            format!("value does not match /{}/", regex.as_str()),
        )),
        _ => Ok(value.clone()),
    }))
}

fn one_of(param: &Value, name: &str, _schema: &Schema) -> Result<Rule, SchemaError> {
    let allowed = match param {
        Value::Array(allowed) => allowed.clone(),
        other => {
            return Err(SchemaError::invalid_rule(
                name,
                format!("expected an array, found {}", other.kind()),
            ))
        }
    };
    let name = name.to_string();
    Ok(rule(move |value, _key, _record| {
        if allowed.iter().any(|candidate| candidate.equivalent(value)) {
            Ok(value.clone())
        } else {
            Err(SanitizeError::rule(
                &name,
                format!("value is not one of {} allowed values", allowed.len()),
            ))
        }
    }))
}

fn constant(param: &Value, name: &str, _schema: &Schema) -> Result<Rule, SchemaError> {
    let expected = param.clone();
    let name = name.to_string();
    Ok(rule(move |value, _key, _record| {
        if expected.equivalent(value) {
            Ok(value.clone())
        } else {
            Err(SanitizeError::rule(&name, "value differs from the constant"))
        }
    }))
}

const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

/// String formats understood by the `format` rule.
enum Format {
    Date,
    DateTime,
    Email(Regex),
    Uri,
    Uuid,
    Ipv4,
    Ipv6,
}

impl Format {
    fn parse(name: &str, rule_name: &str) -> Result<Option<Self>, SchemaError> {
        Ok(Some(match name {
            "date" => Format::Date,
            "date-time" => Format::DateTime,
            "email" => Format::Email(
                Regex::new(EMAIL_PATTERN).map_err(|e| SchemaError::invalid_rule(rule_name, e.to_string()))?,
            ),
            "uri" | "url" => Format::Uri,
            "uuid" => Format::Uuid,
            "ipv4" => Format::Ipv4,
            "ipv6" => Format::Ipv6,
            _ => return Ok(None),
        }))
    }

    fn matches(&self, value: &Value) -> bool {
        let s = match value {
            Value::String(s) => s.as_str(),
            Value::Date(_) => return matches!(self, Format::Date | Format::DateTime),
            _ => return true,
        };
        match self {
            Format::Date => NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok(),
            Format::DateTime => DateTime::parse_from_rfc3339(s).is_ok(),
            Format::Email(regex) => regex.is_match(s),
            Format::Uri => url::Url::parse(s).is_ok(),
            Format::Uuid => uuid::Uuid::parse_str(s).is_ok(),
            Format::Ipv4 => s.parse::<Ipv4Addr>().is_ok(),
            Format::Ipv6 => s.parse::<Ipv6Addr>().is_ok(),
        }
    }
}

fn format(param: &Value, name: &str, _schema: &Schema) -> Result<Rule, SchemaError> {
    let format_name = str_param(param, name)?;
    let Some(format) = Format::parse(format_name, name)? else {
        tracing::debug!(format = %format_name, "unknown format accepts every value");
        return Ok(rule(|value, _key, _record| Ok(value.clone())));
    };
    let name = name.to_string();
    let format_name = format_name.to_string();
    Ok(rule(move |value, _key, _record| {
        if format.matches(value) {
            Ok(value.clone())
        } else {
            Err(SanitizeError::rule(&name, format!("value is not a valid {format_name}")))
        }
    }))
}
