use crate::error::Result;
use crate::schema::{CellValue, TableSchema, WideRecord};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum FilterValue {
    #[schemars(description = "Whole-number comparison value, e.g. a year")]
    Integer(i64),
    #[schemars(description = "Text comparison value, e.g. an account name")]
    Text(String),
}

impl FilterValue {
    /// Same-typed values compare directly; an integer and a text value compare by their
    /// rendered form, so `"2023"` matches a year cell. Blank cells match nothing.
    pub fn matches(&self, cell: &CellValue) -> bool {
        match (self, cell) {
            (_, CellValue::Empty) => false,
            (FilterValue::Integer(a), CellValue::Integer(b)) => a == b,
            (FilterValue::Text(a), CellValue::Text(b)) => a == b,
            (FilterValue::Integer(a), CellValue::Text(b)) => b.trim() == a.to_string(),
            (FilterValue::Text(a), CellValue::Integer(b)) => a.trim() == b.to_string(),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Integer(n) => write!(f, "{}", n),
            FilterValue::Text(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Integer(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        FilterValue::Integer(value as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    #[schemars(description = "Keep rows whose field equals the value")]
    Eq(FilterValue),
    #[schemars(description = "Keep rows whose field differs from the value (blank cells are kept)")]
    Ne(FilterValue),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Filter {
    #[schemars(description = "Name of a categorical column, e.g. 'Year' or 'Account'")]
    pub field: String,
    pub predicate: Predicate,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self {
            field: field.into(),
            predicate: Predicate::Eq(value.into()),
        }
    }

    pub fn ne(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self {
            field: field.into(),
            predicate: Predicate::Ne(value.into()),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.predicate {
            Predicate::Eq(v) => write!(f, "{} == {}", self.field, v),
            Predicate::Ne(v) => write!(f, "{} != {}", self.field, v),
        }
    }
}

/// A filter resolved against a schema column.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BoundFilter<'a> {
    column: usize,
    predicate: &'a Predicate,
}

impl BoundFilter<'_> {
    pub(crate) fn matches(&self, record: &WideRecord) -> bool {
        let cell = record.category(self.column).unwrap_or(&CellValue::Empty);
        match self.predicate {
            Predicate::Eq(v) => v.matches(cell),
            Predicate::Ne(v) => !v.matches(cell),
        }
    }
}

pub(crate) fn bind_filters<'a>(
    filters: &'a [Filter],
    schema: &TableSchema,
) -> Result<Vec<BoundFilter<'a>>> {
    filters
        .iter()
        .map(|filter| {
            let column = schema.require(&filter.field)?;
            Ok(BoundFilter {
                column,
                predicate: &filter.predicate,
            })
        })
        .collect()
}

/// True when every filter accepts the record. An empty list accepts everything.
pub(crate) fn accepts_all(filters: &[BoundFilter<'_>], record: &WideRecord) -> bool {
    filters.iter().all(|f| f.matches(record))
}
