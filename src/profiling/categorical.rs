//! Frequency summaries for non-numeric columns.

use super::table::{Table, display_value, value_key};
use super::types::{CategoricalSummary, ValueCount};
use std::collections::HashMap;

/// Distinct non-null values with counts, sorted by count descending.
///
/// Equal counts keep the order in which the values were first encountered.
pub fn value_counts(table: &Table, column: &str) -> Vec<ValueCount> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<ValueCount> = Vec::new();

    for value in table.column_values(column).flatten() {
        let key = value_key(value);
        if let Some(&i) = index.get(&key) {
            if let Some(entry) = counts.get_mut(i) {
                entry.count += 1;
            }
        } else {
            index.insert(key, counts.len());
            counts.push(ValueCount {
                value: display_value(value),
                count: 1,
            });
        }
    }

    // Stable sort preserves first-seen order among ties
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

pub fn analyse_categorical(table: &Table, column: &str, top_n: usize) -> CategoricalSummary {
    let mut counts = value_counts(table, column);
    let unique_count = counts.len();
    counts.truncate(top_n);

    let rows = table.row_count();
    let missing_ratio = if rows == 0 {
        0.0
    } else {
        table.null_count(column) as f64 / rows as f64
    };

    CategoricalSummary {
        unique_count,
        most_common: counts,
        missing_ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_counts() {
        let table = Table::parse(
            "{\"category\": \"A\"}\n{\"category\": \"B\"}\n{\"category\": \"A\"}\n\
             {\"category\": \"C\"}\n{\"category\": \"B\"}\n",
        )
        .unwrap();
        let summary = analyse_categorical(&table, "category", 5);

        assert_eq!(summary.unique_count, 3);
        let order: Vec<(&str, usize)> = summary
            .most_common
            .iter()
            .map(|v| (v.value.as_str(), v.count))
            .collect();
        // A and B tie at 2; A was seen first
        assert_eq!(order, vec![("A", 2), ("B", 2), ("C", 1)]);
        assert!(summary.missing_ratio.abs() < f64::EPSILON);
    }

    #[test]
    fn test_top_n_and_missing_ratio() {
        let lines: String = ["a", "b", "c", "d", "e", "f"]
            .iter()
            .map(|v| format!("{{\"k\": \"{v}\"}}\n"))
            .chain(std::iter::once("{\"other\": 1}\n".to_owned()))
            .collect();
        let table = Table::parse(&lines).unwrap();
        let summary = analyse_categorical(&table, "k", 5);

        assert_eq!(summary.unique_count, 6);
        assert_eq!(summary.most_common.len(), 5);
        assert_eq!(summary.most_common.first().unwrap().value, "a");
        assert!((summary.missing_ratio - 1.0 / 7.0).abs() < 1e-12);
    }
}
