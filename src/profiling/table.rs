//! Newline-delimited JSON loading.
//!
//! A version file holds one flat JSON object per line. The table's columns are
//! the union of keys across all rows, in first-seen order; a key missing from a
//! row reads the same as an explicit `null`.

use super::types::ColumnType;
use crate::error::{RegistryError, Result};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;

/// Rows of a parsed NDJSON file.
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Map<String, Value>>,
}

impl Table {
    /// Read the whole file into memory and parse it.
    ///
    /// # Errors
    ///
    /// `DataFormat` if the file is not UTF-8 or any non-blank line is not a
    /// JSON object; `Io` if the file cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let text = String::from_utf8(bytes).map_err(|e| {
            RegistryError::DataFormat(format!("{} is not valid UTF-8: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    /// Parse NDJSON text. Blank lines are skipped.
    ///
    /// # Errors
    ///
    /// `DataFormat` naming the 1-based line that failed.
    pub fn parse(text: &str) -> Result<Self> {
        let mut columns = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut rows = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(line).map_err(|e| {
                RegistryError::DataFormat(format!("line {}: invalid JSON: {e}", idx + 1))
            })?;
            let Value::Object(record) = value else {
                return Err(RegistryError::DataFormat(format!(
                    "line {}: expected a JSON object",
                    idx + 1
                )));
            };
            for key in record.keys() {
                if seen.insert(key.clone()) {
                    columns.push(key.clone());
                }
            }
            rows.push(record);
        }

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Non-null cell value; absent keys and explicit nulls both yield `None`.
    pub fn cell<'a>(&'a self, row: &'a Map<String, Value>, column: &str) -> Option<&'a Value> {
        row.get(column).filter(|v| !v.is_null())
    }

    /// Every cell of one column in row order.
    pub fn column_values<'a>(&'a self, column: &'a str) -> impl Iterator<Item = Option<&'a Value>> {
        self.rows.iter().map(move |row| self.cell(row, column))
    }

    pub fn null_count(&self, column: &str) -> usize {
        self.column_values(column).filter(Option::is_none).count()
    }

    /// Narrowest [`ColumnType`] admitting every non-null value of `column`.
    pub fn infer_type(&self, column: &str) -> ColumnType {
        self.column_values(column)
            .flatten()
            .filter_map(ColumnType::of_value)
            .fold(ColumnType::Null, ColumnType::merge)
    }

    /// Canonical per-row keys, used to count fully distinct rows.
    pub fn row_keys(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        self.rows.iter().map(|row| {
            self.columns
                .iter()
                .map(|c| self.cell(row, c).map_or_else(|| "null".to_owned(), value_key))
                .collect()
        })
    }
}

/// Equality key for a cell. Numbers compare by value, so `1` and `1.0` match.
pub fn value_key(value: &Value) -> String {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) => format!("n:{f:?}"),
            None => format!("n:{n}"),
        },
        other => other.to_string(),
    }
}

/// Human-readable rendering of a cell; strings are shown without quotes.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_union_of_keys_in_first_seen_order() {
        let table = Table::parse("{\"b\": 1}\n{\"a\": \"x\", \"b\": 2}\n\n{\"c\": null}\n").unwrap();
        assert_eq!(table.columns(), ["b", "a", "c"]);
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.null_count("a"), 2);
        assert_eq!(table.null_count("c"), 3);
    }

    #[test]
    fn test_rejects_non_objects() {
        let err = Table::parse("{\"a\": 1}\n[1, 2]\n").unwrap_err();
        assert!(matches!(err, RegistryError::DataFormat(ref m) if m.contains("line 2")));

        let err = Table::parse("{\"a\": 1\n").unwrap_err();
        assert!(matches!(err, RegistryError::DataFormat(_)));
    }

    #[test]
    fn test_infer_type() {
        let table = Table::parse(
            "{\"i\": 1, \"f\": 1, \"s\": \"a\", \"m\": 1, \"n\": null}\n\
             {\"i\": 2, \"f\": 2.5, \"s\": \"b\", \"m\": \"x\"}\n",
        )
        .unwrap();
        assert_eq!(table.infer_type("i"), ColumnType::Integer);
        assert_eq!(table.infer_type("f"), ColumnType::Float);
        assert_eq!(table.infer_type("s"), ColumnType::String);
        assert_eq!(table.infer_type("m"), ColumnType::Mixed);
        assert_eq!(table.infer_type("n"), ColumnType::Null);
    }

    #[test]
    fn test_value_key_normalizes_numbers() {
        assert_eq!(value_key(&json!(1)), value_key(&json!(1.0)));
        assert_ne!(value_key(&json!(1)), value_key(&json!("1")));
        assert_eq!(display_value(&json!("A")), "A");
    }

    #[test]
    fn test_empty_input() {
        let table = Table::parse("").unwrap();
        assert!(table.is_empty());
        assert_eq!(table.column_count(), 0);
    }
}
