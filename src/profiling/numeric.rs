//! Summary statistics for numeric columns.
//!
//! Values are loaded into a polars `Float64Chunked` and aggregated there, so
//! quantiles follow polars' linear interpolation (the same convention numpy and
//! pandas use) and the standard deviation is the sample one (`ddof = 1`).

use super::table::Table;
use super::types::NumericSummary;
use crate::error::Result;
use polars::prelude::*;

/// Non-null numeric values of `column`, in row order.
pub fn collect_numeric(table: &Table, column: &str) -> Vec<f64> {
    table
        .column_values(column)
        .flatten()
        .filter_map(serde_json::Value::as_f64)
        .collect()
}

/// Summarise `values` (nulls already removed).
///
/// # Errors
///
/// Propagates polars errors from the series cast or quantile evaluation.
pub fn analyse_numeric(name: &str, values: &[f64]) -> Result<NumericSummary> {
    let series = Series::new(name.into(), values);
    let ca = series.f64()?;

    let std = ca.std(1).filter(|s| s.is_finite());

    Ok(NumericSummary {
        mean: ca.mean(),
        std,
        min: ca.min(),
        max: ca.max(),
        median: ca.median(),
        q1: ca.quantile(0.25, QuantileMethod::Linear)?,
        q3: ca.quantile(0.75, QuantileMethod::Linear)?,
    })
}
