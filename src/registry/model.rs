//! Entities tracked by the registry.
//!
//! A [`Dataset`] exclusively owns its [`Metadata`] and its [`DatasetVersion`]s;
//! removing the dataset removes both. Group membership and grants live in
//! separate association tables in [`super::db::Database`].

use crate::profiling::{DatasetStatistics, QualityScores};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle status of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetStatus {
    Draft,
    Validating,
    Valid,
    Invalid,
    Archived,
}

impl DatasetStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Validating => "validating",
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for DatasetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "validating" => Ok(Self::Validating),
            "valid" => Ok(Self::Valid),
            "invalid" => Ok(Self::Invalid),
            "archived" => Ok(Self::Archived),
            other => Err(format!("unknown dataset status '{other}'")),
        }
    }
}

/// Access tier granted to a group. Ordered: read < write < admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Read,
    Write,
    Admin,
}

impl AccessLevel {
    pub fn rank(self) -> u8 {
        match self {
            Self::Read => 1,
            Self::Write => 2,
            Self::Admin => 3,
        }
    }

    /// True when a grant at `self` is enough for an operation needing `required`.
    pub fn satisfies(self, required: Self) -> bool {
        self.rank() >= required.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown access level '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGroup {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row of the user ↔ group association table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: Uuid,
    pub group_id: Uuid,
}

/// Grant of one access level to one group on one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetAccess {
    pub dataset_id: Uuid,
    pub group_id: Uuid,
    pub level: AccessLevel,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied JSON schema describing expected columns. Advisory only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaDocument(pub Value);

impl SchemaDocument {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Column names declared under `properties`, if the schema has any.
    pub fn declared_columns(&self) -> Vec<String> {
        self.0
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Value of a user-defined metadata field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Equality with integers and floats compared by value.
    pub fn loose_eq(&self, other: &Self) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    /// Ordering between two numbers or two strings; `None` otherwise.
    pub fn partial_cmp_loose(&self, other: &Self) -> Option<std::cmp::Ordering> {
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a.partial_cmp(&b);
        }
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Name of the variant, as reported by field summaries.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

/// Statistics cached on the dataset, tagged with the version they describe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedStatistics {
    pub version_id: Uuid,
    pub computed_at: DateTime<Utc>,
    pub statistics: DatasetStatistics,
}

/// Dataset-wide metadata. Exactly one per dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub schema: SchemaDocument,
    pub statistics: Option<CachedStatistics>,
    /// Insertion-ordered, no duplicates
    pub tags: Vec<String>,
    pub custom_fields: BTreeMap<String, FieldValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Metadata {
    pub fn new(schema: SchemaDocument, tags: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            schema,
            statistics: None,
            tags: dedup_tags(tags),
            custom_fields: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn set_tags(&mut self, tags: Vec<String>) {
        self.tags = dedup_tags(tags);
        self.updated_at = Utc::now();
    }

    pub fn snapshot(&self) -> MetadataSnapshot {
        MetadataSnapshot {
            schema: self.schema.clone(),
            statistics: self.statistics.as_ref().map(|c| c.statistics.clone()),
            tags: self.tags.clone(),
            custom_fields: self.custom_fields.clone(),
        }
    }
}

/// Keep first occurrence of each tag.
pub fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Copy of the dataset metadata taken when a version is created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    pub schema: SchemaDocument,
    pub statistics: Option<DatasetStatistics>,
    pub tags: Vec<String>,
    pub custom_fields: BTreeMap<String, FieldValue>,
}

/// Quality metrics cached on a version, keyed by metric name.
///
/// Profiling writes `completeness` and `uniqueness`; callers may register
/// their own keys (for example `accuracy`) when adding the version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsDocument(pub BTreeMap<String, Value>);

impl MetricsDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overwrite the profiling-derived keys, keep everything else.
    pub fn merge_scores(&mut self, scores: &QualityScores) -> crate::error::Result<()> {
        self.0.insert(
            "completeness".to_owned(),
            serde_json::to_value(&scores.completeness)?,
        );
        self.0.insert(
            "uniqueness".to_owned(),
            serde_json::to_value(&scores.uniqueness)?,
        );
        Ok(())
    }

    /// Profiling scores, if both keys are present and well formed.
    pub fn scores(&self) -> Option<QualityScores> {
        let completeness = serde_json::from_value(self.get("completeness")?.clone()).ok()?;
        let uniqueness = serde_json::from_value(self.get("uniqueness")?.clone()).ok()?;
        Some(QualityScores {
            completeness,
            uniqueness,
        })
    }
}

/// One immutable, hashed snapshot of a dataset's data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetVersion {
    pub id: Uuid,
    pub dataset_id: Uuid,
    /// Free-form label; history is ordered by `created_at`, never by label
    pub version: String,
    pub storage_path: PathBuf,
    /// Extension of the ingested file including the dot, or empty
    pub extension: String,
    pub file_hash: String,
    pub file_size: u64,
    pub quality_metrics: Option<MetricsDocument>,
    pub metadata_snapshot: MetadataSnapshot,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl DatasetVersion {
    /// File name used inside export archives.
    pub fn archive_file_name(&self) -> String {
        format!("{}{}", self.version, self.extension)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub status: DatasetStatus,
    pub created_by: Uuid,
    pub updated_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Metadata,
    /// Creation order
    pub versions: Vec<DatasetVersion>,
}

impl Dataset {
    pub fn new(name: String, description: String, created_by: Uuid, metadata: Metadata) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            status: DatasetStatus::Draft,
            created_by,
            updated_by: created_by,
            created_at: now,
            updated_at: now,
            metadata,
            versions: Vec::new(),
        }
    }

    pub fn version(&self, label: &str) -> Option<&DatasetVersion> {
        self.versions.iter().find(|v| v.version == label)
    }

    pub fn version_mut(&mut self, label: &str) -> Option<&mut DatasetVersion> {
        self.versions.iter_mut().find(|v| v.version == label)
    }

    pub fn version_by_id(&self, id: &Uuid) -> Option<&DatasetVersion> {
        self.versions.iter().find(|v| v.id == *id)
    }

    /// Most recently created version; the later insertion wins a timestamp tie.
    pub fn latest_version(&self) -> Option<&DatasetVersion> {
        self.versions.iter().max_by_key(|v| v.created_at)
    }

    /// Versions ordered by creation time.
    pub fn history(&self) -> Vec<&DatasetVersion> {
        let mut versions: Vec<&DatasetVersion> = self.versions.iter().collect();
        versions.sort_by_key(|v| v.created_at);
        versions
    }

    pub fn touch(&mut self, user_id: Uuid) {
        self.updated_by = user_id;
        self.updated_at = Utc::now();
    }
}

/// Outcome of a persisted validation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityStatus {
    Pass,
    /// A threshold could not be evaluated because the metric was not reported
    Warning,
    Fail,
}

impl QualityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Warning => "warning",
            Self::Fail => "fail",
        }
    }
}

/// Append-only validation record for one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityRecord {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub version_id: Uuid,
    pub metric_type: String,
    pub values: BTreeMap<String, f64>,
    pub threshold: Option<BTreeMap<String, f64>>,
    pub status: QualityStatus,
    pub details: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_access_level_ordering() {
        assert!(AccessLevel::Admin.satisfies(AccessLevel::Read));
        assert!(AccessLevel::Write.satisfies(AccessLevel::Write));
        assert!(!AccessLevel::Read.satisfies(AccessLevel::Write));
        assert!(AccessLevel::Read < AccessLevel::Write && AccessLevel::Write < AccessLevel::Admin);
        assert_eq!("WRITE".parse::<AccessLevel>(), Ok(AccessLevel::Write));
        assert!("owner".parse::<AccessLevel>().is_err());
    }

    #[test]
    fn test_field_value_untagged_roundtrip() {
        let v: FieldValue = serde_json::from_value(json!({"a": [1, 2.5, "x", null, true]})).unwrap();
        let FieldValue::Map(map) = &v else {
            panic!("expected map");
        };
        assert_eq!(
            map["a"],
            FieldValue::List(vec![
                FieldValue::Integer(1),
                FieldValue::Float(2.5),
                FieldValue::Text("x".to_owned()),
                FieldValue::Null,
                FieldValue::Bool(true),
            ])
        );
        assert_eq!(serde_json::to_value(&v).unwrap(), json!({"a": [1, 2.5, "x", null, true]}));
    }

    #[test]
    fn test_field_value_loose_comparisons() {
        assert!(FieldValue::Integer(3).loose_eq(&FieldValue::Float(3.0)));
        assert_eq!(
            FieldValue::Integer(2).partial_cmp_loose(&FieldValue::Float(2.5)),
            Some(std::cmp::Ordering::Less)
        );
        assert_eq!(FieldValue::from("a").partial_cmp_loose(&FieldValue::Integer(1)), None);
    }

    #[test]
    fn test_tags_are_deduplicated_in_order() {
        let meta = Metadata::new(SchemaDocument::default(), vec!["b".into(), "a".into(), "b".into()]);
        assert_eq!(meta.tags, vec!["b".to_owned(), "a".to_owned()]);
        assert!(meta.has_tag("a"));
    }

    #[test]
    fn test_schema_declared_columns() {
        let schema = SchemaDocument::new(json!({"type": "object", "properties": {"value": {"type": "number"}}}));
        assert_eq!(schema.declared_columns(), vec!["value".to_owned()]);
        assert!(SchemaDocument::default().declared_columns().is_empty());
    }

    #[test]
    fn test_metrics_merge_keeps_caller_keys() {
        let mut metrics = MetricsDocument::new().with("accuracy", json!(0.95));
        metrics.merge_scores(&QualityScores::default()).unwrap();
        assert_eq!(metrics.get("accuracy"), Some(&json!(0.95)));
        assert!(metrics.scores().is_some());
    }
}
