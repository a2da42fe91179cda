//! Conversion between composite rows and subfield-native values.
//!
//! A composite row is keyed `{subfield}_{column}`; a subfield value is keyed
//! `{column}`. Only columns the subfield's schema declares are carried across.
//! Presence is decided by key existence, so explicit `null`, `0`, and `false`
//! survive, and columns absent from the input are omitted rather than defaulted.
//!
//! An empty result means "no value at this delta". Callers that hand it to a
//! plugin expecting "no value" rather than "empty map" substitute a sentinel
//! (see [`ItemSeed`](crate::ItemSeed)); the mapper does not.

use tracing::trace;

use crate::types::{CompositeValue, Schema, SubfieldValue};

/// The composite column holding `column` of `subfield`.
pub fn composite_column(subfield: &str, column: &str) -> String {
    format!("{subfield}_{column}")
}

/// Extract one subfield's value from a composite row.
pub fn to_subfield_value(subfield: &str, schema: &Schema, row: &CompositeValue) -> SubfieldValue {
    let mut value = SubfieldValue::new();
    for column in schema.column_names() {
        if let Some(v) = row.get(&composite_column(subfield, column)) {
            value.insert(column.to_string(), v.clone());
        }
    }
    if value.len() < row.len() {
        trace!(
            subfield,
            kept = value.len(),
            row = row.len(),
            "composite row columns outside subfield schema ignored"
        );
    }
    value
}

/// Project a subfield value back into its composite columns.
pub fn to_composite_fragment(
    subfield: &str,
    schema: &Schema,
    value: &SubfieldValue,
) -> CompositeValue {
    let mut fragment = CompositeValue::new();
    for column in schema.column_names() {
        if let Some(v) = value.get(column) {
            fragment.insert(composite_column(subfield, column), v.clone());
        }
    }
    fragment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnSpec;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    fn schema(columns: &[&str]) -> Schema {
        Schema {
            columns: columns
                .iter()
                .map(|c| (c.to_string(), ColumnSpec::new("varchar")))
                .collect(),
        }
    }

    fn row(value: Value) -> CompositeValue {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn body_round_trip_drops_unrelated_columns() {
        let schema = schema(&["value", "format"]);
        let input = row(json!({"body_value": "hello", "body_format": "plain", "unrelated_x": 1}));

        let value = to_subfield_value("body", &schema, &input);
        assert_eq!(Value::Object(value.clone()), json!({"value": "hello", "format": "plain"}));

        let fragment = to_composite_fragment("body", &schema, &value);
        assert_eq!(
            Value::Object(fragment),
            json!({"body_value": "hello", "body_format": "plain"})
        );
    }

    #[test]
    fn falsy_values_survive_by_key_existence() {
        let schema = schema(&["a", "b", "c"]);
        let input = row(json!({"x_a": null, "x_b": 0, "x_c": false}));
        let value = to_subfield_value("x", &schema, &input);
        assert_eq!(Value::Object(value), json!({"a": null, "b": 0, "c": false}));
    }

    #[test]
    fn absent_columns_are_omitted() {
        let schema = schema(&["uri", "title"]);
        let value = to_subfield_value("homepage", &schema, &row(json!({"homepage_uri": "u"})));
        assert_eq!(Value::Object(value), json!({"uri": "u"}));
    }

    #[test]
    fn empty_row_yields_empty_value() {
        let schema = schema(&["value"]);
        assert!(to_subfield_value("name", &schema, &CompositeValue::new()).is_empty());
    }

    #[test]
    fn prefix_must_match_whole_subfield() {
        // "name_value" belongs to "name", not to "na"
        let schema = schema(&["me_value"]);
        let value = to_subfield_value("na", &schema, &row(json!({"name_value": "Ada"})));
        assert!(value.is_empty());
    }

    #[test]
    fn inverse_ignores_undeclared_keys() {
        let schema = schema(&["value"]);
        let value = row(json!({"value": "v", "extra": "e"}));
        let fragment = to_composite_fragment("s", &schema, &value);
        assert_eq!(Value::Object(fragment), json!({"s_value": "v"}));
    }

    proptest! {
        #[test]
        fn round_trip_law(
            columns in prop::collection::btree_set("[a-z]{1,6}", 1..5),
            values in prop::collection::vec(prop_oneof![
                Just(Value::Null),
                any::<i32>().prop_map(|n| json!(n)),
                "[a-z ]{0,6}".prop_map(Value::String),
            ], 5),
            noise in prop::collection::btree_map("[a-z]{1,6}_[a-z]{1,6}", any::<i32>(), 0..4),
        ) {
            let columns: Vec<String> = columns.into_iter().collect();
            let schema = Schema {
                columns: columns.iter().map(|c| (c.clone(), ColumnSpec::new("varchar"))).collect(),
            };
            let mut input = CompositeValue::new();
            for (k, v) in noise {
                if !k.starts_with("sub_") {
                    input.insert(k, json!(v));
                }
            }
            for (column, value) in columns.iter().zip(values) {
                input.insert(composite_column("sub", column), value);
            }

            let value = to_subfield_value("sub", &schema, &input);
            let fragment = to_composite_fragment("sub", &schema, &value);
            for column in &columns {
                let key = composite_column("sub", column);
                prop_assert_eq!(fragment.get(&key), input.get(&key));
            }
            prop_assert_eq!(fragment.len(), columns.len());
        }
    }
}
