//! Snapshot (cache revision) and diff models.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Resources that keep a snapshot history on the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CacheResource {
    #[serde(rename = "config.json")]
    Config,
    #[serde(rename = "mappings.json")]
    Mappings,
}

impl CacheResource {
    pub const ALL: [CacheResource; 2] = [CacheResource::Config, CacheResource::Mappings];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheResource::Config => "config.json",
            CacheResource::Mappings => "mappings.json",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CacheResource::Config => "Project Configuration",
            CacheResource::Mappings => "Mappings",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "config.json" => Some(CacheResource::Config),
            "mappings.json" => Some(CacheResource::Mappings),
            _ => None,
        }
    }
}

impl std::fmt::Display for CacheResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Revision ids of a resource, oldest first as returned by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CacheRevisions {
    #[serde(default)]
    pub revisions: Vec<String>,
}

/// Difference of a single (non-list) field.
///
/// `None` means the side is missing; an explicit JSON null is `Some(Value::Null)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalarFieldDiff {
    pub field_path: String,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// An item of a list field present on both sides but with changed content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListUpdatedEntry {
    #[serde(default)]
    pub key: Value,
    #[serde(default)]
    pub before: Value,
    #[serde(default)]
    pub after: Value,
}

/// Difference of a list field, keyed per item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListFieldDiff {
    pub field_path: String,
    pub added: Vec<serde_json::Map<String, Value>>,
    pub removed: Vec<serde_json::Map<String, Value>>,
    pub updated: Vec<ListUpdatedEntry>,
}

/// One entry of a server-computed diff between current state and a snapshot.
///
/// A diff carrying `added`, `removed` and `updated` is a list diff; anything
/// else with a `field_path` is scalar. Variant order matters for `untagged`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldDiff {
    List(ListFieldDiff),
    Scalar(ScalarFieldDiff),
}

impl FieldDiff {
    pub fn field_path(&self) -> &str {
        match self {
            FieldDiff::List(diff) => &diff.field_path,
            FieldDiff::Scalar(diff) => &diff.field_path,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, FieldDiff::List(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_wire_names() {
        assert_eq!(
            serde_json::to_value(CacheResource::Config).unwrap(),
            json!("config.json")
        );
        assert_eq!(
            CacheResource::from_str("mappings.json"),
            Some(CacheResource::Mappings)
        );
        assert_eq!(CacheResource::from_str("other.json"), None);
    }

    #[test]
    fn test_field_diff_discrimination() {
        let diffs: Vec<FieldDiff> = serde_json::from_value(json!([
            {"field_path": "masterdata.smda.field", "added": [{"identifier": "A"}], "removed": [], "updated": []},
            {"field_path": "model.name", "before": "x", "after": "y"},
            {"field_path": "model.revision", "after": "y"},
            {"field_path": "partial", "added": []}
        ]))
        .unwrap();

        assert!(diffs[0].is_list());
        assert!(!diffs[1].is_list());
        match &diffs[2] {
            FieldDiff::Scalar(diff) => assert!(diff.before.is_none()),
            other => panic!("expected scalar diff, got {:?}", other),
        }
        let explicit_null: FieldDiff =
            serde_json::from_value(json!({"field_path": "a", "before": null, "after": 1})).unwrap();
        match explicit_null {
            FieldDiff::Scalar(diff) => assert_eq!(diff.before, Some(Value::Null)),
            other => panic!("expected scalar diff, got {:?}", other),
        }
        // Only part of the list keys present: not a list diff.
        assert!(!diffs[3].is_list());
        assert_eq!(diffs[3].field_path(), "partial");
    }
}
