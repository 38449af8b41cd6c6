//! Query interface for dataset search

use super::model::{Dataset, DatasetStatus, FieldValue};
use crate::error::{RegistryError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Comparison applied by a [`FieldFilter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Gt,
    Lt,
    /// Substring for text fields, membership for list fields
    Contains,
    /// Field value is one of the values in the filter's list
    In,
}

impl FromStr for FilterOperator {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "eq" => Ok(Self::Eq),
            "gt" => Ok(Self::Gt),
            "lt" => Ok(Self::Lt),
            "contains" => Ok(Self::Contains),
            "in" => Ok(Self::In),
            other => Err(RegistryError::Validation(format!(
                "unsupported filter operator '{other}'"
            ))),
        }
    }
}

/// Condition on one custom metadata field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub operator: FilterOperator,
    pub value: FieldValue,
}

impl FieldFilter {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: FieldValue) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// A dataset lacking the field never matches.
    pub fn matches(&self, dataset: &Dataset) -> bool {
        let Some(actual) = dataset.metadata.custom_fields.get(&self.field) else {
            return false;
        };
        match self.operator {
            FilterOperator::Eq => actual.loose_eq(&self.value),
            FilterOperator::Gt => actual.partial_cmp_loose(&self.value) == Some(Ordering::Greater),
            FilterOperator::Lt => actual.partial_cmp_loose(&self.value) == Some(Ordering::Less),
            FilterOperator::Contains => match (actual, &self.value) {
                (FieldValue::Text(hay), FieldValue::Text(needle)) => hay.contains(needle.as_str()),
                (FieldValue::List(items), needle) => items.iter().any(|i| i.loose_eq(needle)),
                _ => false,
            },
            FilterOperator::In => match &self.value {
                FieldValue::List(options) => options.iter().any(|o| o.loose_eq(actual)),
                _ => false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Name,
    CreatedAt,
    UpdatedAt,
    /// Lifecycle order: draft, validating, valid, invalid, archived
    Status,
}

impl FromStr for SortField {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "name" => Ok(Self::Name),
            "created_at" => Ok(Self::CreatedAt),
            "updated_at" => Ok(Self::UpdatedAt),
            "status" => Ok(Self::Status),
            other => Err(RegistryError::Validation(format!(
                "invalid sort field '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(RegistryError::Validation(format!(
                "invalid sort order '{other}'"
            ))),
        }
    }
}

/// Query builder for dataset search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Case-insensitive substring over name and description
    pub text: Option<String>,
    /// Dataset must carry every one of these tags
    pub tags: Vec<String>,
    pub status: Option<DatasetStatus>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub field_filters: Vec<FieldFilter>,
    pub sort_by: Option<SortField>,
    pub sort_order: SortOrder,
    /// 1-indexed
    pub page: usize,
    pub per_page: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            text: None,
            tags: Vec::new(),
            status: None,
            created_after: None,
            created_before: None,
            field_filters: Vec::new(),
            sort_by: None,
            sort_order: SortOrder::Desc,
            page: 1,
            per_page: 20,
        }
    }
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn status(mut self, status: DatasetStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn created_between(
        mut self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_after = after;
        self.created_before = before;
        self
    }

    pub fn filter(mut self, filter: FieldFilter) -> Self {
        self.field_filters.push(filter);
        self
    }

    pub fn sort(mut self, field: SortField, order: SortOrder) -> Self {
        self.sort_by = Some(field);
        self.sort_order = order;
        self
    }

    pub fn page(mut self, page: usize, per_page: usize) -> Self {
        self.page = page;
        self.per_page = per_page;
        self
    }

    pub fn validate(&self, max_per_page: usize) -> Result<()> {
        if self.page == 0 {
            return Err(RegistryError::Validation("page must be at least 1".to_owned()));
        }
        if self.per_page == 0 || self.per_page > max_per_page {
            return Err(RegistryError::Validation(format!(
                "per_page must be between 1 and {max_per_page}"
            )));
        }
        Ok(())
    }

    pub fn matches(&self, dataset: &Dataset) -> bool {
        if let Some(text) = &self.text {
            let needle = text.to_lowercase();
            if !dataset.name.to_lowercase().contains(&needle)
                && !dataset.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if !self.tags.iter().all(|t| dataset.metadata.has_tag(t)) {
            return false;
        }
        if self.status.is_some_and(|s| s != dataset.status) {
            return false;
        }
        if self.created_after.is_some_and(|t| dataset.created_at < t) {
            return false;
        }
        if self.created_before.is_some_and(|t| dataset.created_at > t) {
            return false;
        }
        self.field_filters.iter().all(|f| f.matches(dataset))
    }
}

/// One page of search results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub datasets: Vec<Dataset>,
    /// Matches across all pages
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
}

impl fmt::Display for SearchPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "page {} ({} per page), {} of {} datasets",
            self.page,
            self.per_page,
            self.datasets.len(),
            self.total
        )
    }
}

/// Filter, sort and paginate `candidates`, which must already be restricted
/// to what the caller may see.
pub fn run_search(candidates: Vec<&Dataset>, query: &SearchQuery) -> SearchPage {
    let mut matched: Vec<&Dataset> = candidates.into_iter().filter(|d| query.matches(d)).collect();

    if let Some(field) = query.sort_by {
        matched.sort_by(|a, b| {
            let ord = match field {
                SortField::Name => a.name.cmp(&b.name),
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                SortField::Status => a.status.cmp(&b.status),
            };
            match query.sort_order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
    }

    let total = matched.len();
    let offset = (query.page.saturating_sub(1)).saturating_mul(query.per_page);
    let datasets = matched
        .into_iter()
        .skip(offset)
        .take(query.per_page)
        .cloned()
        .collect();

    SearchPage {
        datasets,
        total,
        page: query.page,
        per_page: query.per_page,
    }
}
