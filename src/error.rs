use thiserror::Error;

/// Why a value could not be sanitized.
///
/// These errors never reach the caller of
/// [`RecordSanitizer::sanitize`](crate::RecordSanitizer::sanitize): a field
/// whose chain fails keeps its original input value. They are returned by
/// coercers and rules, drive union resolution, and are reported through
/// `tracing` at debug level.
///
/// Messages name the value's kind, never its content, so they are safe to log
/// for untrusted input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SanitizeError {
    /// A type coercer could not produce a value of its type.
    #[error("cannot coerce {found} to {expected}")]
    Coercion {
        /// The target type name.
        expected: &'static str,
        /// The kind of the rejected value.
        found: &'static str,
    },

    /// The input could not be normalized to an array or object.
    #[error("expected {expected}, found {found}")]
    Shape {
        /// `array` or `object`.
        expected: &'static str,
        /// The kind of the rejected value (after any structured parse).
        found: &'static str,
    },

    /// A rule rejected an otherwise-coerced value.
    #[error("rule '{rule}' rejected the value: {reason}")]
    Rule {
        /// Name of the rule.
        rule: String,
        /// Human-readable reason.
        reason: String,
    },

    /// No alternative of a union type succeeded.
    #[error("none of {tried} union alternatives matched")]
    UnionExhausted {
        /// Number of alternatives tried.
        tried: usize,
    },

    /// An array element failed its `items` schema.
    #[error("array item {index}: {source}")]
    Item {
        /// Position of the failing element.
        index: usize,
        /// Why the element failed.
        source: Box<SanitizeError>,
    },
}

impl SanitizeError {
    /// Creates a rule failure.
    pub fn rule(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        SanitizeError::Rule {
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}

/// A schema or registry that cannot be compiled.
///
/// Unlike [`SanitizeError`], these describe mistakes in the schema itself and
/// are returned by [`Compiler::compile`](crate::Compiler::compile) and by rule
/// registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A reserved schema key was used as a rule name.
    #[error("'{0}' is a reserved schema key and cannot be registered as a rule")]
    ReservedRuleName(String),

    /// A rule's parameter in the schema is unusable.
    #[error("invalid value for rule '{rule}': {reason}")]
    InvalidRule {
        /// Name of the rule.
        rule: String,
        /// What is wrong with the parameter.
        reason: String,
    },
}

impl SchemaError {
    /// Creates an invalid-parameter error for `rule`.
    pub fn invalid_rule(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        SchemaError::InvalidRule {
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}
