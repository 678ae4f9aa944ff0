//! Conversion from serde_json values into cel_interpreter values

use cel_interpreter::objects::{Key, Map, Value as CelValue};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

/// Convert serde_json::Value to cel_interpreter::Value
pub fn json_to_cel(value: &JsonValue) -> CelValue {
    match value {
        JsonValue::Null => CelValue::Null,
        JsonValue::Bool(b) => CelValue::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CelValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                CelValue::UInt(u)
            } else if let Some(f) = n.as_f64() {
                CelValue::Float(f)
            } else {
                CelValue::Null
            }
        }
        JsonValue::String(s) => CelValue::String(s.clone().into()),
        JsonValue::Array(arr) => {
            let items: Vec<CelValue> = arr.iter().map(json_to_cel).collect();
            CelValue::List(items.into())
        }
        JsonValue::Object(obj) => {
            let entries: HashMap<Key, CelValue> = obj
                .iter()
                .map(|(k, v)| (Key::from(k.clone()), json_to_cel(v)))
                .collect();
            CelValue::Map(Map {
                map: Arc::new(entries),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_to_cel_scalars() {
        assert!(matches!(json_to_cel(&json!(true)), CelValue::Bool(true)));
        assert!(matches!(json_to_cel(&json!(42)), CelValue::Int(42)));
        assert!(matches!(json_to_cel(&json!(null)), CelValue::Null));

        if let CelValue::String(s) = json_to_cel(&json!("hello")) {
            assert_eq!(s.as_str(), "hello");
        } else {
            panic!("Expected String");
        }
    }

    #[test]
    fn test_json_to_cel_nested() {
        let cel = json_to_cel(&json!({"tags": ["PII", "Tier1"], "owner": "alice"}));
        if let CelValue::Map(map) = cel {
            assert_eq!(map.map.len(), 2);
            match map.map.get(&Key::from("tags".to_string())) {
                Some(CelValue::List(list)) => assert_eq!(list.len(), 2),
                other => panic!("Expected List, got {:?}", other),
            }
        } else {
            panic!("Expected Map");
        }
    }
}
