//! Document-store schema inference
//!
//! Document sources have no declared schema; it is inferred by sampling
//! documents and taking the union of observed field types. A nested object
//! collapses to a `struct`, a list to an `array`, and fields whose observed
//! types disagree fall back to `unknown`.

use std::collections::BTreeMap;

use crate::models::{Column, NormalizedType};

/// Normalized shape of one JSON value
pub fn json_shape_of(value: &serde_json::Value) -> NormalizedType {
    match value {
        serde_json::Value::Null => NormalizedType::Unknown,
        serde_json::Value::Bool(_) => NormalizedType::Boolean,
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => NormalizedType::Integer,
        serde_json::Value::Number(_) => NormalizedType::Float,
        serde_json::Value::String(_) => NormalizedType::String,
        serde_json::Value::Array(_) => NormalizedType::Array,
        serde_json::Value::Object(_) => NormalizedType::Struct,
    }
}

/// Infer a column list from sampled documents.
///
/// A field observed with exactly one non-null shape keeps that shape; an
/// integer widens to float when both appear; anything else conflicting is
/// `unknown`. A field absent from some documents stays nullable.
pub fn infer_columns_from_documents(
    documents: &[serde_json::Map<String, serde_json::Value>],
) -> Vec<Column> {
    let mut observed: BTreeMap<String, (NormalizedType, usize)> = BTreeMap::new();

    for document in documents {
        for (field, value) in document {
            let shape = json_shape_of(value);
            match observed.get_mut(field) {
                None => {
                    observed.insert(field.clone(), (shape, 1));
                }
                Some((current, seen)) => {
                    *seen += 1;
                    *current = merge_shapes(*current, shape);
                }
            }
        }
    }

    let total = documents.len();
    observed
        .into_iter()
        .map(|(name, (shape, seen))| {
            let mut column = Column::new(name, shape, shape.as_str());
            column.nullable = seen < total || shape == NormalizedType::Unknown;
            column
        })
        .collect()
}

fn merge_shapes(a: NormalizedType, b: NormalizedType) -> NormalizedType {
    use NormalizedType::{Float, Integer, Unknown};
    match (a, b) {
        (x, y) if x == y => x,
        // Nulls don't narrow an already-observed shape.
        (Unknown, y) => y,
        (x, Unknown) => x,
        (Integer, Float) | (Float, Integer) => Float,
        _ => Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn single_document_shapes() {
        let docs = vec![doc(json!({
            "name": "alice",
            "age": 30,
            "score": 4.5,
            "active": true,
            "tags": ["a"],
            "address": {"city": "x"},
        }))];
        let columns = infer_columns_from_documents(&docs);
        let by_name: std::collections::HashMap<_, _> =
            columns.iter().map(|c| (c.name.as_str(), c.data_type)).collect();

        assert_eq!(by_name["name"], NormalizedType::String);
        assert_eq!(by_name["age"], NormalizedType::Integer);
        assert_eq!(by_name["score"], NormalizedType::Float);
        assert_eq!(by_name["active"], NormalizedType::Boolean);
        assert_eq!(by_name["tags"], NormalizedType::Array);
        assert_eq!(by_name["address"], NormalizedType::Struct);
    }

    #[test]
    fn integer_widens_to_float() {
        let docs = vec![doc(json!({"v": 1})), doc(json!({"v": 2.5}))];
        let columns = infer_columns_from_documents(&docs);
        assert_eq!(columns[0].data_type, NormalizedType::Float);
    }

    #[test]
    fn conflicting_shapes_become_unknown() {
        let docs = vec![doc(json!({"v": 1})), doc(json!({"v": "two"}))];
        let columns = infer_columns_from_documents(&docs);
        assert_eq!(columns[0].data_type, NormalizedType::Unknown);
    }

    #[test]
    fn nulls_do_not_narrow() {
        let docs = vec![doc(json!({"v": null})), doc(json!({"v": "x"}))];
        let columns = infer_columns_from_documents(&docs);
        assert_eq!(columns[0].data_type, NormalizedType::String);
    }

    #[test]
    fn missing_fields_stay_nullable() {
        let docs = vec![doc(json!({"a": 1, "b": "x"})), doc(json!({"a": 2}))];
        let columns = infer_columns_from_documents(&docs);
        let b = columns.iter().find(|c| c.name == "b").unwrap();
        let a = columns.iter().find(|c| c.name == "a").unwrap();
        assert!(b.nullable);
        assert!(!a.nullable);
    }
}
