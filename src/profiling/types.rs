use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Type label inferred for a column from its non-null values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    String,
    Array,
    Object,
    /// Non-null values of more than one incompatible kind
    Mixed,
    /// No non-null value anywhere in the column
    Null,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
            Self::Mixed => "mixed",
            Self::Null => "null",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    /// Kind of a single JSON value; `None` for null.
    pub fn of_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(Self::Boolean),
            Value::Number(n) if n.is_f64() => Some(Self::Float),
            Value::Number(_) => Some(Self::Integer),
            Value::String(_) => Some(Self::String),
            Value::Array(_) => Some(Self::Array),
            Value::Object(_) => Some(Self::Object),
        }
    }

    /// Widen `self` to also admit `other`. Integer and float meet at float.
    pub fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Null, t) | (t, Self::Null) => t,
            (a, b) if a == b => a,
            (Self::Integer, Self::Float) | (Self::Float, Self::Integer) => Self::Float,
            _ => Self::Mixed,
        }
    }
}

/// Summary statistics for a numeric column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    pub mean: Option<f64>,
    /// Sample standard deviation (n - 1); `None` with fewer than two values
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub median: Option<f64>,
    pub q1: Option<f64>,
    pub q3: Option<f64>,
}

/// One entry of a categorical frequency table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

/// Summary for a non-numeric column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoricalSummary {
    /// Distinct non-null values
    pub unique_count: usize,
    /// Most frequent values, ties in first-seen order
    pub most_common: Vec<ValueCount>,
    /// Fraction of rows where the column is null or absent
    pub missing_ratio: f64,
}

/// Table-level profile of one version file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetStatistics {
    pub row_count: usize,
    pub column_count: usize,
    pub missing_values: BTreeMap<String, usize>,
    pub data_types: BTreeMap<String, ColumnType>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub numeric_statistics: BTreeMap<String, NumericSummary>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub categorical_statistics: BTreeMap<String, CategoricalSummary>,
}

impl DatasetStatistics {
    pub fn total_missing(&self) -> usize {
        self.missing_values.values().sum()
    }
}

/// An overall score plus its per-column breakdown.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreSet {
    pub overall: f64,
    pub by_column: BTreeMap<String, f64>,
}

/// Derived data-quality scores for a version.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityScores {
    pub completeness: ScoreSet,
    pub uniqueness: ScoreSet,
}

/// Full output of profiling a version file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub statistics: DatasetStatistics,
    pub quality_metrics: QualityScores,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_merge() {
        assert_eq!(ColumnType::Null.merge(ColumnType::Integer), ColumnType::Integer);
        assert_eq!(ColumnType::Integer.merge(ColumnType::Float), ColumnType::Float);
        assert_eq!(ColumnType::String.merge(ColumnType::String), ColumnType::String);
        assert_eq!(ColumnType::String.merge(ColumnType::Integer), ColumnType::Mixed);
        assert_eq!(ColumnType::Mixed.merge(ColumnType::Null), ColumnType::Mixed);
    }

    #[test]
    fn test_of_value() {
        assert_eq!(ColumnType::of_value(&json!(1)), Some(ColumnType::Integer));
        assert_eq!(ColumnType::of_value(&json!(1.5)), Some(ColumnType::Float));
        assert_eq!(ColumnType::of_value(&json!(null)), None);
        assert_eq!(ColumnType::of_value(&json!([1])), Some(ColumnType::Array));
    }

    #[test]
    fn test_statistics_serialization_omits_empty_sections() {
        let stats = DatasetStatistics::default();
        let value = serde_json::to_value(&stats).unwrap();
        assert!(value.get("numeric_statistics").is_none());
        assert_eq!(value["row_count"], json!(0));
        assert_eq!(
            serde_json::to_value(ColumnType::Float).unwrap(),
            json!("float")
        );
    }
}
