//! Merging of config layers
//!
//! Tables merge key by key, lists are replaced whole and any other value
//! is overridden by the later layer.

use serde_json::Value;

/// Overlay `overlay` on `base`.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut merged), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let value = match merged.remove(&key) {
                    Some(previous) => deep_merge(previous, value),
                    None => value,
                };
                merged.insert(key, value);
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay,
    }
}

/// Merge layers in precedence order, lowest first
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tables_merge() {
        let merged = deep_merge(
            json!({"retry": {"max_retries": 3, "timeout_ms": 0}}),
            json!({"retry": {"timeout_ms": 500}}),
        );
        assert_eq!(merged["retry"]["max_retries"], 3);
        assert_eq!(merged["retry"]["timeout_ms"], 500);
    }

    #[test]
    fn test_lists_are_replaced() {
        let merged = deep_merge(
            json!({"signature": {"keyservers": ["https://a.example", "https://b.example"]}}),
            json!({"signature": {"keyservers": ["https://c.example"]}}),
        );
        assert_eq!(merged["signature"]["keyservers"], json!(["https://c.example"]));
    }

    #[test]
    fn test_later_layer_wins() {
        let merged = merge_layers(vec![
            json!({"repository": {"offline": false}, "retry": {"max_retries": 3}}),
            json!({"repository": {"local_cache": "/tmp/cache"}}),
            json!({"repository": {"offline": true}}),
        ]);
        assert_eq!(merged["repository"]["offline"], true);
        assert_eq!(merged["repository"]["local_cache"], "/tmp/cache");
        assert_eq!(merged["retry"]["max_retries"], 3);
    }

    #[test]
    fn test_null_clears_value() {
        let merged = deep_merge(json!({"signature": {"trust_store": "/keys"}}), json!({"signature": {"trust_store": null}}));
        assert!(merged["signature"]["trust_store"].is_null());
    }
}
