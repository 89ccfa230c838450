// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use serde_json::Value;

/// Deep-merge two JSON values.
/// `base` is existing file content, `overlay` is serialized current struct.
/// Overlay values take priority.
pub(super) fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_val) => deep_merge(base_val, overlay_val),
                    None => overlay_val,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_base, overlay) => overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deep_merge_keeps_base_only_keys() {
        let merged = deep_merge(json!({"a": 1, "b": {"x": 1}}), json!({"b": {"y": 2}}));
        assert_eq!(merged, json!({"a": 1, "b": {"x": 1, "y": 2}}));
    }

    #[test]
    fn test_deep_merge_overlay_wins_on_scalars() {
        let merged = deep_merge(json!({"a": 1}), json!({"a": 2}));
        assert_eq!(merged, json!({"a": 2}));
    }

    #[test]
    fn test_deep_merge_non_object_base() {
        let merged = deep_merge(json!([1, 2]), json!({"a": 1}));
        assert_eq!(merged, json!({"a": 1}));
    }
}
