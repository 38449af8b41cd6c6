//! Usage counts of tags and custom fields across visible datasets.

use super::model::{Dataset, FieldValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Default cap on summary entries.
pub const DEFAULT_SUMMARY_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagUsage {
    pub tag: String,
    pub count: usize,
    pub datasets: Vec<DatasetRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOccurrence {
    pub id: Uuid,
    pub name: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldUsage {
    pub field: String,
    pub count: usize,
    /// Type of the first value seen for this field
    pub value_type: String,
    pub datasets: Vec<FieldOccurrence>,
}

/// Tags used by `datasets`, most used first, ties by name.
pub fn tag_summary(datasets: &[&Dataset], prefix: Option<&str>, limit: usize) -> Vec<TagUsage> {
    let mut usage: BTreeMap<&str, TagUsage> = BTreeMap::new();

    for dataset in datasets {
        for tag in &dataset.metadata.tags {
            if prefix.is_some_and(|p| !tag.starts_with(p)) {
                continue;
            }
            let entry = usage.entry(tag.as_str()).or_insert_with(|| TagUsage {
                tag: tag.clone(),
                count: 0,
                datasets: Vec::new(),
            });
            entry.count += 1;
            entry.datasets.push(DatasetRef {
                id: dataset.id,
                name: dataset.name.clone(),
            });
        }
    }

    let mut tags: Vec<TagUsage> = usage.into_values().collect();
    tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    tags.truncate(limit);
    tags
}

/// Custom fields used by `datasets`, most used first, ties by name.
pub fn field_summary(datasets: &[&Dataset], prefix: Option<&str>, limit: usize) -> Vec<FieldUsage> {
    let mut usage: BTreeMap<&str, FieldUsage> = BTreeMap::new();

    for dataset in datasets {
        for (field, value) in &dataset.metadata.custom_fields {
            if prefix.is_some_and(|p| !field.starts_with(p)) {
                continue;
            }
            let entry = usage.entry(field.as_str()).or_insert_with(|| FieldUsage {
                field: field.clone(),
                count: 0,
                value_type: value.type_name().to_owned(),
                datasets: Vec::new(),
            });
            entry.count += 1;
            entry.datasets.push(FieldOccurrence {
                id: dataset.id,
                name: dataset.name.clone(),
                value: value.clone(),
            });
        }
    }

    let mut fields: Vec<FieldUsage> = usage.into_values().collect();
    fields.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.field.cmp(&b.field)));
    fields.truncate(limit);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::model::{Metadata, SchemaDocument};

    fn dataset(name: &str, tags: &[&str], fields: &[(&str, FieldValue)]) -> Dataset {
        let mut meta = Metadata::new(
            SchemaDocument::default(),
            tags.iter().map(|t| (*t).to_owned()).collect(),
        );
        meta.custom_fields = fields
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect();
        Dataset::new(name.to_owned(), String::new(), Uuid::new_v4(), meta)
    }

    #[test]
    fn test_tag_summary_order_prefix_and_limit() {
        let a = dataset("a", &["finance", "eu"], &[]);
        let b = dataset("b", &["finance", "us"], &[]);
        let c = dataset("c", &["ops"], &[]);
        let all = [&a, &b, &c];

        let tags: Vec<(String, usize)> = tag_summary(&all, None, 100)
            .into_iter()
            .map(|t| (t.tag, t.count))
            .collect();
        assert_eq!(
            tags,
            vec![
                ("finance".to_owned(), 2),
                ("eu".to_owned(), 1),
                ("ops".to_owned(), 1),
                ("us".to_owned(), 1),
            ]
        );

        assert_eq!(tag_summary(&all, Some("fin"), 100).len(), 1);
        assert_eq!(tag_summary(&all, None, 2).len(), 2);
    }

    #[test]
    fn test_field_summary() {
        let a = dataset("a", &[], &[("owner", FieldValue::from("ops")), ("rows", FieldValue::Integer(3))]);
        let b = dataset("b", &[], &[("owner", FieldValue::from("data"))]);

        let fields = field_summary(&[&a, &b], None, 100);
        let first = fields.first().unwrap();
        assert_eq!(first.field, "owner");
        assert_eq!(first.count, 2);
        assert_eq!(first.value_type, "text");
        assert_eq!(first.datasets.len(), 2);
        assert!(field_summary(&[&a, &b], Some("x"), 100).is_empty());
    }
}
