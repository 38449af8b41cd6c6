//! Statistical profiling of tabular version files.
//!
//! A version file is newline-delimited JSON, one flat object per line. Profiling
//! reads it fully into memory and produces:
//!
//! - [`DatasetStatistics`]: row/column counts, per-column missingness, inferred
//!   types, numeric summaries (mean, sample std, min, max, median, quartiles)
//!   and categorical summaries (distinct count, top values, missing ratio)
//! - [`QualityScores`]: completeness and uniqueness, overall and per column
//!
//! Columns whose non-null values are all integers or floats are numeric; every
//! other column, including one with no values at all, is categorical.
//!
//! ```no_run
//! use dataset_registry::profiling::{ProfileOptions, profile_file};
//! use std::path::Path;
//!
//! # fn example() -> dataset_registry::error::Result<()> {
//! let profile = profile_file(Path::new("sales.jsonl"), &ProfileOptions::default())?;
//! println!("{} rows", profile.statistics.row_count);
//! println!("completeness {:.3}", profile.quality_metrics.completeness.overall);
//! # Ok(())
//! # }
//! ```

pub mod categorical;
pub mod numeric;
pub mod quality;
pub mod table;
pub mod types;

pub use table::Table;
pub use types::{
    CategoricalSummary, ColumnType, DatasetStatistics, NumericSummary, Profile, QualityScores,
    ScoreSet, ValueCount,
};

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Tunables for profiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileOptions {
    /// How many most-frequent values to keep per categorical column
    pub top_values: usize,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self { top_values: 5 }
    }
}

/// Profile the NDJSON file at `path`.
///
/// # Errors
///
/// `DataFormat` if the file is not newline-delimited JSON objects, `Io` if it
/// cannot be read.
pub fn profile_file(path: &Path, options: &ProfileOptions) -> Result<Profile> {
    let table = Table::load(path)?;
    let profile = profile_table(&table, options)?;
    tracing::debug!(
        "Profiled {}: {} rows, {} columns",
        path.display(),
        profile.statistics.row_count,
        profile.statistics.column_count
    );
    Ok(profile)
}

/// Profile an already parsed table.
///
/// # Errors
///
/// Propagates failures from numeric aggregation.
pub fn profile_table(table: &Table, options: &ProfileOptions) -> Result<Profile> {
    let mut missing_values = BTreeMap::new();
    let mut data_types = BTreeMap::new();
    let mut numeric_statistics = BTreeMap::new();
    let mut categorical_statistics = BTreeMap::new();

    for column in table.columns() {
        missing_values.insert(column.clone(), table.null_count(column));

        let kind = table.infer_type(column);
        data_types.insert(column.clone(), kind);

        if kind.is_numeric() {
            let values = numeric::collect_numeric(table, column);
            numeric_statistics.insert(column.clone(), numeric::analyse_numeric(column, &values)?);
        } else {
            categorical_statistics.insert(
                column.clone(),
                categorical::analyse_categorical(table, column, options.top_values),
            );
        }
    }

    Ok(Profile {
        statistics: DatasetStatistics {
            row_count: table.row_count(),
            column_count: table.column_count(),
            missing_values,
            data_types,
            numeric_statistics,
            categorical_statistics,
        },
        quality_metrics: quality::quality_scores(table),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    const FIVE_ROWS: &str = "{\"numeric\": 1, \"category\": \"A\"}\n\
                             {\"numeric\": 2, \"category\": \"B\"}\n\
                             {\"numeric\": 3, \"category\": \"A\"}\n\
                             {\"numeric\": 4, \"category\": \"C\"}\n\
                             {\"numeric\": 5, \"category\": \"B\"}\n";

    #[test]
    fn test_five_row_scenario() {
        let table = Table::parse(FIVE_ROWS).unwrap();
        let profile = profile_table(&table, &ProfileOptions::default()).unwrap();
        let stats = &profile.statistics;

        assert_eq!(stats.row_count, 5);
        assert_eq!(stats.column_count, 2);
        assert_eq!(stats.data_types["numeric"], ColumnType::Integer);
        assert_eq!(stats.data_types["category"], ColumnType::String);

        let numeric = &stats.numeric_statistics["numeric"];
        assert_eq!(numeric.mean, Some(3.0));
        assert_eq!(numeric.min, Some(1.0));
        assert_eq!(numeric.max, Some(5.0));
        assert_eq!(stats.categorical_statistics["category"].unique_count, 3);
        assert!(!stats.categorical_statistics.contains_key("numeric"));

        assert_eq!(stats.total_missing(), 0);
        assert!((profile.quality_metrics.completeness.overall - 1.0).abs() < f64::EPSILON);
        assert!((profile.quality_metrics.uniqueness.overall - 1.0).abs() < f64::EPSILON);
        assert!((profile.quality_metrics.uniqueness.by_column["numeric"] - 1.0).abs() < f64::EPSILON);
        assert!((profile.quality_metrics.uniqueness.by_column["category"] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_all_null_column_is_categorical() {
        let table = Table::parse("{\"x\": null, \"y\": 1}\n{\"y\": 2}\n").unwrap();
        let profile = profile_table(&table, &ProfileOptions::default()).unwrap();

        assert_eq!(profile.statistics.data_types["x"], ColumnType::Null);
        assert!(profile.statistics.numeric_statistics.get("x").is_none());
        let x = &profile.statistics.categorical_statistics["x"];
        assert_eq!(x.unique_count, 0);
        assert!((x.missing_ratio - 1.0).abs() < f64::EPSILON);
        assert_eq!(profile.statistics.missing_values["x"], 2);
        assert!(profile.quality_metrics.completeness.overall < 1.0);
    }

    #[test]
    fn test_profile_file_and_empty_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(FIVE_ROWS.as_bytes()).unwrap();
        file.flush().unwrap();
        let profile = profile_file(file.path(), &ProfileOptions::default()).unwrap();
        assert_eq!(profile.statistics.row_count, 5);

        let empty = NamedTempFile::new().unwrap();
        let profile = profile_file(empty.path(), &ProfileOptions::default()).unwrap();
        assert_eq!(profile.statistics.row_count, 0);
        assert_eq!(profile.statistics.column_count, 0);
        assert!((profile.quality_metrics.uniqueness.overall - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_profile_is_deterministic() {
        let table = Table::parse(FIVE_ROWS).unwrap();
        let a = profile_table(&table, &ProfileOptions::default()).unwrap();
        let b = profile_table(&table, &ProfileOptions::default()).unwrap();
        assert_eq!(a, b);
    }
}
