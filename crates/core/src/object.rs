//! Accessors over raw JSON objects.

use serde_json::Value;

pub fn kind(obj: &Value) -> &str {
    obj.get("kind").and_then(|v| v.as_str()).unwrap_or("")
}

pub fn api_version(obj: &Value) -> &str {
    obj.get("apiVersion").and_then(|v| v.as_str()).unwrap_or("")
}

pub fn name(obj: &Value) -> Option<&str> {
    obj.pointer("/metadata/name").and_then(|v| v.as_str())
}

pub fn namespace(obj: &Value) -> Option<&str> {
    obj.pointer("/metadata/namespace").and_then(|v| v.as_str())
}

pub fn resource_version(obj: &Value) -> Option<&str> {
    obj.pointer("/metadata/resourceVersion").and_then(|v| v.as_str())
}

pub fn creation_timestamp(obj: &Value) -> Option<&str> {
    obj.pointer("/metadata/creationTimestamp").and_then(|v| v.as_str())
}

/// An object is a list when it carries an `items` array.
pub fn is_list(obj: &Value) -> bool {
    obj.get("items").map(|v| v.is_array()).unwrap_or(false)
}

pub fn list_items(obj: &Value) -> Option<&Vec<Value>> {
    obj.get("items").and_then(|v| v.as_array())
}

/// Labels as `(key, value)` pairs sorted by key.
pub fn labels(obj: &Value) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = obj
        .pointer("/metadata/labels")
        .and_then(|v| v.as_object())
        .map(|m| {
            m.iter()
                .map(|(k, v)| (k.clone(), v.as_str().map(|s| s.to_string()).unwrap_or_else(|| v.to_string())))
                .collect()
        })
        .unwrap_or_default();
    out.sort();
    out
}

/// Server-side tables are `meta.k8s.io` objects of kind `Table`.
pub fn is_table(obj: &Value) -> bool {
    kind(obj) == "Table" && api_version(obj).starts_with("meta.k8s.io/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_metadata() {
        let pod = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "web", "namespace": "prod", "resourceVersion": "42", "labels": {"b": "2", "a": "1"}}
        });
        assert_eq!(kind(&pod), "Pod");
        assert_eq!(name(&pod), Some("web"));
        assert_eq!(namespace(&pod), Some("prod"));
        assert_eq!(resource_version(&pod), Some("42"));
        assert_eq!(labels(&pod), vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]);
        assert!(!is_list(&pod));
    }

    #[test]
    fn detects_lists_and_tables() {
        let list = serde_json::json!({"kind": "PodList", "items": []});
        assert!(is_list(&list));
        assert_eq!(list_items(&list).map(|v| v.len()), Some(0));
        let table = serde_json::json!({"kind": "Table", "apiVersion": "meta.k8s.io/v1", "rows": []});
        assert!(is_table(&table));
        assert!(!is_table(&serde_json::json!({"kind": "Table", "apiVersion": "example.com/v1"})));
    }
}
