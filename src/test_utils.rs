//! Shared proptest strategies for unit tests.

use proptest::prelude::*;

use crate::value::Value;

/// Strings that parse as finite numbers, integral or decimal.
pub(crate) fn arb_numeric_string() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<i64>().prop_map(|n| n.to_string()),
        (-1.0e12f64..1.0e12).prop_map(|n| n.to_string()),
        prop::string::string_regex(" ?-?[0-9]{1,9}(\\.[0-9]{1,6})? ?").unwrap(),
    ]
}

/// Field names as they appear in form bodies.
pub(crate) fn arb_field_name() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,11}").unwrap()
}

/// Non-empty scalar values: booleans, integers, and short strings.
pub(crate) fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        ".{0,16}".prop_map(Value::String),
    ]
}
