//! Threshold evaluation for quality records.

use super::model::{Dataset, DatasetStatus, QualityStatus};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Outcome of comparing reported metric values against minimum thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub status: QualityStatus,
    pub details: BTreeMap<String, Value>,
}

/// Each threshold is a minimum. A value below it fails; a threshold with no
/// reported value yields a warning unless something else already failed.
pub fn evaluate(
    values: &BTreeMap<String, f64>,
    threshold: Option<&BTreeMap<String, f64>>,
) -> Evaluation {
    let mut failed = Vec::new();
    let mut missing = Vec::new();

    for (metric, minimum) in threshold.into_iter().flatten() {
        match values.get(metric) {
            Some(value) if value < minimum => failed.push(json!({
                "metric": metric,
                "value": value,
                "threshold": minimum,
            })),
            Some(_) => {}
            None => missing.push(metric.clone()),
        }
    }

    let status = if !failed.is_empty() {
        QualityStatus::Fail
    } else if !missing.is_empty() {
        QualityStatus::Warning
    } else {
        QualityStatus::Pass
    };

    let mut details = BTreeMap::new();
    if !failed.is_empty() {
        details.insert("failed".to_owned(), Value::Array(failed));
    }
    if !missing.is_empty() {
        details.insert("missing".to_owned(), json!(missing));
    }

    Evaluation { status, details }
}

/// Move the dataset lifecycle after an evaluation. Returns whether it changed.
///
/// Any failure marks the dataset invalid; only a pass promotes a draft.
pub fn apply_status(dataset: &mut Dataset, status: QualityStatus) -> bool {
    let next = match (status, dataset.status) {
        (QualityStatus::Fail, _) => DatasetStatus::Invalid,
        (QualityStatus::Pass, DatasetStatus::Draft) => DatasetStatus::Valid,
        (_, current) => current,
    };
    let changed = next != dataset.status;
    dataset.status = next;
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::model::{Metadata, SchemaDocument};
    use uuid::Uuid;

    fn map(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect()
    }

    #[test]
    fn test_evaluate_statuses() {
        let values = map(&[("completeness", 0.9), ("accuracy", 0.7)]);

        assert_eq!(evaluate(&values, None).status, QualityStatus::Pass);
        assert_eq!(
            evaluate(&values, Some(&map(&[("completeness", 0.8)]))).status,
            QualityStatus::Pass
        );

        let eval = evaluate(&values, Some(&map(&[("accuracy", 0.8)])));
        assert_eq!(eval.status, QualityStatus::Fail);
        assert!(eval.details.contains_key("failed"));

        let eval = evaluate(&values, Some(&map(&[("recall", 0.5)])));
        assert_eq!(eval.status, QualityStatus::Warning);
        assert_eq!(eval.details["missing"], json!(["recall"]));

        let eval = evaluate(&values, Some(&map(&[("recall", 0.5), ("accuracy", 0.8)])));
        assert_eq!(eval.status, QualityStatus::Fail);
    }

    #[test]
    fn test_status_transitions() {
        let mut dataset = Dataset::new(
            "d".to_owned(),
            String::new(),
            Uuid::new_v4(),
            Metadata::new(SchemaDocument::default(), Vec::new()),
        );

        assert!(!apply_status(&mut dataset, QualityStatus::Warning));
        assert_eq!(dataset.status, DatasetStatus::Draft);
        assert!(apply_status(&mut dataset, QualityStatus::Pass));
        assert_eq!(dataset.status, DatasetStatus::Valid);
        assert!(apply_status(&mut dataset, QualityStatus::Fail));
        assert_eq!(dataset.status, DatasetStatus::Invalid);
        assert!(!apply_status(&mut dataset, QualityStatus::Pass));
        assert_eq!(dataset.status, DatasetStatus::Invalid);
    }
}
