//! Property-based test generators using proptest.

use centazio_core::SystemEntityId;
use proptest::prelude::*;
use serde_json::{json, Map, Value};

/// Strategy for customer names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-z]{1,9}( [A-Z][a-z]{1,9})?").expect("Invalid regex")
}

/// Strategy for lowercase email addresses.
pub fn email_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,8}\\.[a-z]{1,8}@(example|test)\\.(com|org)")
        .expect("Invalid regex")
}

/// Strategy for external system ids.
pub fn system_id_strategy() -> impl Strategy<Value = SystemEntityId> {
    prop::string::string_regex("[a-z]{2}-[0-9]{1,4}")
        .expect("Invalid regex")
        .prop_map(SystemEntityId::new)
}

/// Strategy for batches of customer fields with distinct ids.
pub fn customer_batch_strategy(
    max: usize,
) -> impl Strategy<Value = Vec<(SystemEntityId, String, String)>> {
    prop::collection::btree_map(system_id_strategy(), (name_strategy(), email_strategy()), 1..=max)
        .prop_map(|m| m.into_iter().map(|(id, (name, email))| (id, name, email)).collect())
}

/// Strategy for arbitrary JSON objects with nested values.
pub fn json_object_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        prop::string::string_regex("[a-zA-Z0-9 ]{0,12}")
            .expect("Invalid regex")
            .prop_map(Value::String),
    ];
    let value = leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    });
    prop::collection::btree_map("[a-z]{1,6}", value, 0..6)
        .prop_map(|m| Value::Object(m.into_iter().collect()))
}
