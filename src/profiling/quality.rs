//! Completeness and uniqueness scores.

use super::table::{Table, value_key};
use super::types::{QualityScores, ScoreSet};
use std::collections::{BTreeMap, HashSet};

/// Score for an empty table. No rows means nothing is missing or duplicated.
const VACUOUS_SCORE: f64 = 1.0;

pub fn completeness(table: &Table) -> ScoreSet {
    let rows = table.row_count();
    let mut by_column = BTreeMap::new();
    let mut total_nulls = 0usize;

    for column in table.columns() {
        let nulls = table.null_count(column);
        total_nulls += nulls;
        by_column.insert(column.clone(), 1.0 - ratio(nulls, rows));
    }

    let cells = rows * table.column_count();
    ScoreSet {
        overall: 1.0 - ratio(total_nulls, cells),
        by_column,
    }
}

pub fn uniqueness(table: &Table) -> ScoreSet {
    let rows = table.row_count();

    let by_column = table
        .columns()
        .iter()
        .map(|column| {
            let distinct: HashSet<String> = table.column_values(column).flatten().map(value_key).collect();
            let score = if rows == 0 {
                VACUOUS_SCORE
            } else {
                distinct.len() as f64 / rows as f64
            };
            (column.clone(), score)
        })
        .collect();

    let distinct_rows: HashSet<Vec<String>> = table.row_keys().collect();
    let overall = if rows == 0 {
        VACUOUS_SCORE
    } else {
        distinct_rows.len() as f64 / rows as f64
    };

    ScoreSet { overall, by_column }
}

pub fn quality_scores(table: &Table) -> QualityScores {
    QualityScores {
        completeness: completeness(table),
        uniqueness: uniqueness(table),
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(text: &str) -> Table {
        Table::parse(text).unwrap()
    }

    #[test]
    fn test_completeness_with_missing_cells() {
        let t = table("{\"a\": 1, \"b\": null}\n{\"a\": 2}\n{\"a\": null, \"b\": \"x\"}\n{\"a\": 4, \"b\": \"y\"}\n");
        let c = completeness(&t);
        // 3 nulls of 8 cells
        assert!((c.overall - 5.0 / 8.0).abs() < 1e-12);
        assert!((c.by_column["a"] - 0.75).abs() < 1e-12);
        assert!((c.by_column["b"] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_completeness_full() {
        let t = table("{\"a\": 1}\n{\"a\": 2}\n");
        assert!((completeness(&t).overall - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_uniqueness() {
        let t = table("{\"a\": 1, \"b\": \"x\"}\n{\"a\": 1, \"b\": \"x\"}\n{\"a\": 2, \"b\": \"x\"}\n{\"a\": 3}\n");
        let u = uniqueness(&t);
        assert!((u.overall - 0.75).abs() < 1e-12);
        assert!((u.by_column["a"] - 0.75).abs() < 1e-12);
        assert!((u.by_column["b"] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_absent_and_null_are_the_same_row() {
        let t = table("{\"a\": 1, \"b\": null}\n{\"a\": 1.0}\n");
        assert!((uniqueness(&t).overall - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_table_is_vacuously_clean() {
        let scores = quality_scores(&table(""));
        assert!((scores.completeness.overall - 1.0).abs() < f64::EPSILON);
        assert!((scores.uniqueness.overall - 1.0).abs() < f64::EPSILON);
        assert!(scores.uniqueness.by_column.is_empty());
    }
}
