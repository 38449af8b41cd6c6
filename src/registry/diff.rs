//! Version diff computation

use super::model::{Dataset, DatasetVersion, MetadataSnapshot, MetricsDocument};
use super::storage::VersionStore;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use similar::TextDiff;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Lines of unchanged context around each hunk.
const CONTEXT_LINES: usize = 3;

/// Which optional parts of a comparison to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffOptions {
    pub include_metadata: bool,
    pub include_metrics: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            include_metadata: true,
            include_metrics: true,
        }
    }
}

/// A value that differs between two versions. Absent sides are `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueChange {
    pub from: Value,
    pub to: Value,
}

/// Differences between two versions of one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    pub dataset_id: Uuid,
    pub version1: String,
    pub version2: String,
    /// Unified diff of the stored files; `None` when identical
    pub file_diff: Option<String>,
    pub metadata_diff: Option<BTreeMap<String, ValueChange>>,
    pub metrics_diff: Option<BTreeMap<String, ValueChange>>,
}

impl DiffResult {
    pub fn has_changes(&self) -> bool {
        self.file_diff.is_some() || self.metadata_diff.is_some() || self.metrics_diff.is_some()
    }
}

/// Compare `v1` and `v2`, both versions of `dataset`.
pub fn compute_version_diff(
    dataset: &Dataset,
    v1: &DatasetVersion,
    v2: &DatasetVersion,
    options: DiffOptions,
) -> Result<DiffResult> {
    let metadata_diff = if options.include_metadata {
        non_empty(metadata_diff(&v1.metadata_snapshot, &v2.metadata_snapshot)?)
    } else {
        None
    };

    let metrics_diff = if options.include_metrics {
        metrics_diff(v1.quality_metrics.as_ref(), v2.quality_metrics.as_ref())
    } else {
        None
    };

    Ok(DiffResult {
        dataset_id: dataset.id,
        version1: v1.version.clone(),
        version2: v2.version.clone(),
        file_diff: file_diff(v1, v2),
        metadata_diff,
        metrics_diff,
    })
}

/// Unified diff of the two stored files.
///
/// A read failure does not abort the comparison; its message becomes the diff text.
pub fn file_diff(v1: &DatasetVersion, v2: &DatasetVersion) -> Option<String> {
    let texts = VersionStore::read_text(&v1.storage_path)
        .and_then(|a| Ok((a, VersionStore::read_text(&v2.storage_path)?)));

    match texts {
        Ok((a, b)) => unified_diff(&a, &b, &v1.version, &v2.version),
        Err(e) => {
            tracing::warn!(
                "Could not diff versions '{}' and '{}': {e}",
                v1.version,
                v2.version
            );
            Some(format!("Error generating diff: {e}"))
        }
    }
}

pub fn unified_diff(a: &str, b: &str, label_a: &str, label_b: &str) -> Option<String> {
    if a == b {
        return None;
    }
    let diff = TextDiff::from_lines(a, b)
        .unified_diff()
        .context_radius(CONTEXT_LINES)
        .header(&format!("version {label_a}"), &format!("version {label_b}"))
        .to_string();
    (!diff.is_empty()).then_some(diff)
}

/// Entries for each snapshot field whose value differs.
pub fn metadata_diff(
    a: &MetadataSnapshot,
    b: &MetadataSnapshot,
) -> Result<BTreeMap<String, ValueChange>> {
    let mut changes = BTreeMap::new();
    let mut compare = |key: &str, from: Value, to: Value| {
        if from != to {
            changes.insert(key.to_owned(), ValueChange { from, to });
        }
    };

    compare("schema", a.schema.as_value().clone(), b.schema.as_value().clone());
    compare(
        "statistics",
        serde_json::to_value(&a.statistics)?,
        serde_json::to_value(&b.statistics)?,
    );
    compare("tags", serde_json::to_value(&a.tags)?, serde_json::to_value(&b.tags)?);
    compare(
        "custom_fields",
        serde_json::to_value(&a.custom_fields)?,
        serde_json::to_value(&b.custom_fields)?,
    );
    Ok(changes)
}

/// Per-key differences over the union of both metric caches.
///
/// `None` when neither version has cached metrics or nothing differs.
pub fn metrics_diff(
    a: Option<&MetricsDocument>,
    b: Option<&MetricsDocument>,
) -> Option<BTreeMap<String, ValueChange>> {
    if a.is_none() && b.is_none() {
        return None;
    }
    let empty = MetricsDocument::default();
    let (a, b) = (a.unwrap_or(&empty), b.unwrap_or(&empty));

    let changes: BTreeMap<String, ValueChange> = a
        .keys()
        .chain(b.keys())
        .filter_map(|key| {
            let from = a.get(key).cloned().unwrap_or(Value::Null);
            let to = b.get(key).cloned().unwrap_or(Value::Null);
            (from != to).then(|| (key.clone(), ValueChange { from, to }))
        })
        .collect();
    non_empty(changes)
}

fn non_empty<K, V>(map: BTreeMap<K, V>) -> Option<BTreeMap<K, V>> {
    (!map.is_empty()).then_some(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::model::FieldValue;
    use serde_json::json;

    #[test]
    fn test_unified_diff_shows_changed_line() {
        let diff = unified_diff("{\"value\": 42}\n", "{\"value\": 44}\n", "1.0", "2.0").unwrap();
        assert!(diff.contains("--- version 1.0"));
        assert!(diff.contains("+++ version 2.0"));
        assert!(diff.contains("-{\"value\": 42}"));
        assert!(diff.contains("+{\"value\": 44}"));
    }

    #[test]
    fn test_identical_text_has_no_diff() {
        assert_eq!(unified_diff("a\nb\n", "a\nb\n", "1", "2"), None);
    }

    #[test]
    fn test_metadata_diff_reports_changed_fields_only() {
        let a = MetadataSnapshot {
            tags: vec!["raw".to_owned()],
            ..MetadataSnapshot::default()
        };
        let mut b = a.clone();
        b.tags.push("clean".to_owned());
        b.custom_fields.insert("owner".to_owned(), FieldValue::from("ops"));

        let diff = metadata_diff(&a, &b).unwrap();
        assert_eq!(diff.len(), 2);
        assert_eq!(diff["tags"].from, json!(["raw"]));
        assert_eq!(diff["tags"].to, json!(["raw", "clean"]));
        assert_eq!(diff["custom_fields"].to, json!({"owner": "ops"}));
        assert!(metadata_diff(&a, &a).unwrap().is_empty());
    }

    #[test]
    fn test_metrics_diff_union_of_keys() {
        let a = MetricsDocument::new().with("accuracy", json!(0.9)).with("rows", json!(10));
        let b = MetricsDocument::new().with("accuracy", json!(0.95)).with("rows", json!(10)).with("recall", json!(0.8));

        let diff = metrics_diff(Some(&a), Some(&b)).unwrap();
        assert_eq!(diff.len(), 2);
        assert_eq!(diff["accuracy"], ValueChange { from: json!(0.9), to: json!(0.95) });
        assert_eq!(diff["recall"].from, Value::Null);

        assert_eq!(metrics_diff(Some(&a), Some(&a)), None);
        assert_eq!(metrics_diff(None, None), None);
        assert_eq!(metrics_diff(None, Some(&a)).unwrap().len(), 2);
    }
}
