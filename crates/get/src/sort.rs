//! Client-side `--sort-by`: a stable permutation over fetched objects.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use orka_printers::jsonpath::{relaxed_expression, JsonPath};
use serde_json::Value;
use tracing::debug;

use crate::GetError;

/// Display position → original position. Built once; never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortState {
    order: Vec<usize>,
}

#[derive(Debug, Clone)]
enum Key {
    Missing,
    Bool(bool),
    Number(f64),
    Time(DateTime<Utc>),
    Str(String),
}

impl Key {
    fn rank(&self) -> u8 {
        match self {
            Key::Missing => 0,
            Key::Bool(_) => 1,
            Key::Number(_) => 2,
            Key::Time(_) => 3,
            Key::Str(_) => 4,
        }
    }

    fn of(v: &Value) -> Key {
        match v {
            Value::Null => Key::Missing,
            Value::Bool(b) => Key::Bool(*b),
            Value::Number(n) => n.as_f64().map(Key::Number).unwrap_or(Key::Missing),
            Value::String(s) => match DateTime::parse_from_rfc3339(s) {
                Ok(t) => Key::Time(t.with_timezone(&Utc)),
                Err(_) => Key::Str(s.clone()),
            },
            other => Key::Str(other.to_string()),
        }
    }

    fn compare(&self, other: &Key) -> Ordering {
        match (self, other) {
            (Key::Bool(a), Key::Bool(b)) => a.cmp(b),
            (Key::Number(a), Key::Number(b)) => a.total_cmp(b),
            (Key::Time(a), Key::Time(b)) => a.cmp(b),
            (Key::Str(a), Key::Str(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl SortState {
    /// Sort `objects` by the value at `field` (relaxed JSONPath). Equal keys keep
    /// their fetch order.
    pub fn new(field: &str, objects: &[&Value]) -> Result<Self, GetError> {
        let expr = relaxed_expression(field).map_err(|e| GetError::Sort(e.to_string()))?;
        let path = JsonPath::parse(&expr).map_err(|e| GetError::Sort(e.to_string()))?.allow_missing_keys(true);

        let mut found = false;
        let mut keys = Vec::with_capacity(objects.len());
        for obj in objects {
            let results = path.find_results(obj).map_err(|e| GetError::Sort(e.to_string()))?;
            let key = results.into_iter().flatten().next().map(|v| Key::of(&v)).unwrap_or(Key::Missing);
            found |= !matches!(key, Key::Missing);
            keys.push(key);
        }
        if !found && !objects.is_empty() {
            return Err(GetError::Sort(format!("couldn't find any field with path {:?} in the list of objects", expr)));
        }

        let mut order: Vec<usize> = (0..objects.len()).collect();
        order.sort_by(|&a, &b| keys[a].compare(&keys[b]));
        debug!(field = %expr, items = order.len(), "sorted objects");
        Ok(Self { order })
    }

    /// The fetch position shown at `display`.
    pub fn original_position(&self, display: usize) -> usize {
        self.order.get(display).copied().unwrap_or(display)
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sort(field: &str, objs: &[Value]) -> Result<Vec<usize>, GetError> {
        let refs: Vec<&Value> = objs.iter().collect();
        SortState::new(field, &refs).map(|s| s.order().to_vec())
    }

    #[test]
    fn equal_keys_keep_fetch_order() {
        let objs = vec![
            json!({"metadata": {"name": "c"}, "spec": {"prio": 1}}),
            json!({"metadata": {"name": "a"}, "spec": {"prio": 0}}),
            json!({"metadata": {"name": "b"}, "spec": {"prio": 1}}),
            json!({"metadata": {"name": "d"}, "spec": {"prio": 1}}),
        ];
        assert_eq!(sort(".spec.prio", &objs).unwrap(), vec![1, 0, 2, 3]);
    }

    #[test]
    fn numbers_sort_numerically_and_times_chronologically() {
        let objs = vec![json!({"n": 10}), json!({"n": 9}), json!({"n": 100})];
        assert_eq!(sort("{.n}", &objs).unwrap(), vec![1, 0, 2]);

        let objs = vec![
            json!({"metadata": {"creationTimestamp": "2021-01-01T00:00:00Z"}}),
            json!({"metadata": {"creationTimestamp": "2020-06-01T00:00:00+02:00"}}),
        ];
        assert_eq!(sort("metadata.creationTimestamp", &objs).unwrap(), vec![1, 0]);
    }

    #[test]
    fn missing_values_sort_first() {
        let objs = vec![json!({"a": "x"}), json!({}), json!({"a": "b"})];
        assert_eq!(sort(".a", &objs).unwrap(), vec![1, 2, 0]);
    }

    #[test]
    fn field_absent_everywhere_is_an_error() {
        let objs = vec![json!({"a": 1}), json!({"a": 2})];
        let err = sort(".nope", &objs).unwrap_err();
        assert_eq!(err.to_string(), "couldn't find any field with path \"{.nope}\" in the list of objects");
    }
}
