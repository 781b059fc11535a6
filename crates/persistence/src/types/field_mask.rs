//! Field masks for partial updates.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A set of dotted camelCase paths, e.g. `shortDescription` or `resource.uri`.
///
/// An empty mask means "replace the whole document".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMask {
    /// Paths to copy from the update.
    pub paths: Vec<String>,
}

impl FieldMask {
    /// Creates a mask from paths.
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true if the mask selects nothing.
    pub fn is_empty(&self) -> bool {
        self.paths.iter().all(|p| p.is_empty())
    }

    /// Copies every masked path from `update` into `target`.
    ///
    /// A path missing from `update` clears the field in `target`, matching
    /// the semantics of an explicit update to the default value.
    pub fn apply(&self, target: &mut Value, update: &Value) {
        for path in self.paths.iter().filter(|p| !p.is_empty()) {
            let segments: Vec<&str> = path.split('.').collect();
            let value = lookup(update, &segments).cloned().unwrap_or(Value::Null);
            assign(target, &segments, value);
        }
    }
}

fn lookup<'a>(value: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(value, |current, segment| current.get(*segment))
}

fn assign(target: &mut Value, segments: &[&str], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        if rest.is_empty() {
            map.insert((*first).to_string(), value);
        } else {
            let child = map.entry((*first).to_string()).or_insert(Value::Null);
            assign(child, rest, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_top_level_path() {
        let mut target = json!({"name": "n", "shortDescription": "old", "longDescription": "keep"});
        let update = json!({"name": "other", "shortDescription": "new", "longDescription": "drop"});
        FieldMask::new(["shortDescription"]).apply(&mut target, &update);
        assert_eq!(
            target,
            json!({"name": "n", "shortDescription": "new", "longDescription": "keep"})
        );
    }

    #[test]
    fn test_apply_nested_path() {
        let mut target = json!({"resource": {"uri": "old", "name": "keep"}});
        let update = json!({"resource": {"uri": "new", "name": "drop"}});
        FieldMask::new(["resource.uri"]).apply(&mut target, &update);
        assert_eq!(target, json!({"resource": {"uri": "new", "name": "keep"}}));
    }

    #[test]
    fn test_apply_creates_missing_parents() {
        let mut target = json!({"details": null});
        let update = json!({"details": {"vulnerability": {"severity": "HIGH"}}});
        FieldMask::new(["details.vulnerability.severity"]).apply(&mut target, &update);
        assert_eq!(target["details"]["vulnerability"]["severity"], "HIGH");
    }

    #[test]
    fn test_missing_update_path_clears_field() {
        let mut target = json!({"remediation": "patch it"});
        FieldMask::new(["remediation"]).apply(&mut target, &json!({}));
        assert!(target["remediation"].is_null());
    }

    #[test]
    fn test_empty_mask() {
        assert!(FieldMask::default().is_empty());
        assert!(FieldMask::new([""]).is_empty());
        assert!(!FieldMask::new(["kind"]).is_empty());
    }
}
