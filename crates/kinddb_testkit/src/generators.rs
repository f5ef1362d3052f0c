//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random keys, property values and
//! warehouse rows that maintain the invariants the APIs require.

use kinddb_core::{Key, KeyId, PropertyValue};
use proptest::prelude::*;
use serde_json::{json, Value};

/// Strategy for generating valid kind names.
pub fn kind_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-zA-Z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for generating valid key ids: positive integers or non-empty names.
pub fn key_id_strategy() -> impl Strategy<Value = KeyId> {
    prop_oneof![
        (1..i64::MAX).prop_map(KeyId::Int),
        prop::string::string_regex("[a-zA-Z0-9@._-]{1,24}")
            .expect("Invalid regex")
            .prop_map(KeyId::Name),
    ]
}

/// Strategy for generating complete keys with one to four path elements.
pub fn key_strategy() -> impl Strategy<Value = Key> {
    prop::collection::vec((kind_strategy(), key_id_strategy()), 1..=4)
        .prop_map(|pairs| Key::from_pairs(pairs).expect("Generated pairs are valid"))
}

/// Strategy for generating scalar property values.
pub fn scalar_value_strategy() -> impl Strategy<Value = PropertyValue> {
    prop_oneof![
        Just(PropertyValue::Null),
        any::<bool>().prop_map(PropertyValue::Bool),
        any::<i64>().prop_map(PropertyValue::Integer),
        ".{0,32}".prop_map(PropertyValue::String),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(PropertyValue::Blob),
    ]
}

/// Strategy for generating property values, lists of scalars included.
pub fn property_value_strategy() -> impl Strategy<Value = PropertyValue> {
    prop_oneof![
        4 => scalar_value_strategy(),
        1 => prop::collection::vec(scalar_value_strategy(), 0..6).prop_map(PropertyValue::List),
    ]
}

/// Strategy for generating rows of the sample words table.
pub fn word_row_strategy() -> impl Strategy<Value = serde_json::Map<String, Value>> {
    (
        "[a-z]{1,12}",
        0i64..1_000_000,
        prop::option::of("[a-z ,\"]{0,10}"),
        prop::option::of(any::<bool>()),
    )
        .prop_map(|(word, count, corpus, common)| {
            let mut row = serde_json::Map::new();
            row.insert("word".into(), json!(word));
            row.insert("word_count".into(), json!(count));
            row.insert("corpus".into(), json!(corpus));
            row.insert("common".into(), json!(common));
            row
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_keys_are_complete(key in key_strategy()) {
            prop_assert!(key.is_complete());
            prop_assert_eq!(Key::from_urlsafe(&key.urlsafe()).unwrap(), key);
        }

        #[test]
        fn generated_lists_are_flat(value in property_value_strategy()) {
            if let Some(items) = value.as_list() {
                prop_assert!(items.iter().all(|v| v.as_list().is_none()));
            }
        }
    }
}
