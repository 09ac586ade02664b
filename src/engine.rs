use crate::error::{DashboardError, Result};
use crate::filters::{accepts_all, bind_filters, Filter};
use crate::schema::{
    CellValue, LongRecord, LongTable, MonthKey, TotalRecord, TotalsTable, WideRecord, WideTable,
};
use log::{debug, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Per-value transform applied to each month before aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MonthTransform {
    #[schemars(
        description = "Absolute value, so expense outflows and revenue inflows both count positively"
    )]
    Absolute,
    #[schemars(description = "Flip the sign of every amount")]
    Negate,
}

impl MonthTransform {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            MonthTransform::Absolute => value.abs(),
            MonthTransform::Negate => -value,
        }
    }
}

/// What to do when a kept row has a blank (or NaN) month cell.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum MissingMonthPolicy {
    #[default]
    #[schemars(description = "Blank months contribute 0.0")]
    TreatAsZero,
    #[schemars(description = "Blank months fail the whole call with a data shape error")]
    Reject,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct PipelineOptions {
    #[serde(default)]
    pub missing_month: MissingMonthPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct ReshapeRequest {
    #[serde(default)]
    #[schemars(description = "Row predicates, all of which must hold. Empty keeps every row.")]
    pub filters: Vec<Filter>,

    #[schemars(
        description = "Categorical columns kept in the output and grouped on. Must be non-empty."
    )]
    pub group_keys: Vec<String>,

    #[serde(default)]
    #[schemars(description = "Optional transform applied to every month value before summing")]
    pub transform: Option<MonthTransform>,
}

impl ReshapeRequest {
    pub fn new<I, S>(group_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            filters: Vec::new(),
            group_keys: group_keys.into_iter().map(Into::into).collect(),
            transform: None,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_transform(mut self, transform: MonthTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ReshapeRequest)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

/// Runs the filter -> unpivot -> transform -> group-by-sum pipeline over a borrowed table.
#[derive(Debug, Clone, Default)]
pub struct Reshaper {
    options: PipelineOptions,
}

impl Reshaper {
    pub fn new(options: PipelineOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Checks the request against the table schema and returns the group key columns.
    pub fn validate(&self, table: &WideTable, request: &ReshapeRequest) -> Result<Vec<usize>> {
        if request.group_keys.is_empty() {
            return Err(DashboardError::Configuration(
                "group_keys must name at least one column".to_string(),
            ));
        }

        let schema = table.schema();
        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(request.group_keys.len());
        for key in &request.group_keys {
            if !seen.insert(key.as_str()) {
                return Err(DashboardError::Configuration(format!(
                    "group key '{}' listed more than once",
                    key
                )));
            }
            columns.push(schema.require(key)?);
        }

        bind_filters(&request.filters, schema)?;
        Ok(columns)
    }

    /// Unpivot without aggregation: twelve records per kept row, in row order and
    /// calendar order within each row.
    pub fn unpivot(&self, table: &WideTable, request: &ReshapeRequest) -> Result<Vec<LongRecord>> {
        let mut out = Vec::new();
        self.for_each_month(table, request, |keys, month, value| {
            out.push(LongRecord {
                keys: keys.to_vec(),
                month,
                value,
            });
        })?;
        Ok(out)
    }

    /// Sums values per (group keys, month). Groups appear in order of first occurrence.
    pub fn reshape(&self, table: &WideTable, request: &ReshapeRequest) -> Result<LongTable> {
        info!(
            "Reshaping {} rows grouped by [{}] with {} filter(s)",
            table.len(),
            request.group_keys.join(", "),
            request.filters.len()
        );

        let mut result = LongTable::new(request.group_keys.clone());
        let mut slots: HashMap<(Vec<CellValue>, MonthKey), usize> = HashMap::new();

        self.for_each_month(table, request, |keys, month, value| {
            match slots.get(&(keys.to_vec(), month)) {
                Some(&idx) => result.records[idx].value += value,
                None => {
                    slots.insert((keys.to_vec(), month), result.records.len());
                    result.records.push(LongRecord {
                        keys: keys.to_vec(),
                        month,
                        value,
                    });
                }
            }
        })?;

        debug!("Reshape produced {} long records", result.len());
        Ok(result)
    }

    /// Sums values per group key tuple with the twelve months collapsed into one total.
    pub fn summarize(&self, table: &WideTable, request: &ReshapeRequest) -> Result<TotalsTable> {
        info!(
            "Summarizing {} rows grouped by [{}] with {} filter(s)",
            table.len(),
            request.group_keys.join(", "),
            request.filters.len()
        );

        let mut result = TotalsTable::new(request.group_keys.clone());
        let mut slots: HashMap<Vec<CellValue>, usize> = HashMap::new();

        self.for_each_month(table, request, |keys, _month, value| {
            match slots.get(keys) {
                Some(&idx) => result.records[idx].total += value,
                None => {
                    slots.insert(keys.to_vec(), result.records.len());
                    result.records.push(TotalRecord {
                        keys: keys.to_vec(),
                        total: value,
                    });
                }
            }
        })?;

        debug!("Summary produced {} groups", result.len());
        Ok(result)
    }

    /// Shared driver: validates, filters, then calls `emit` once per kept row and month.
    /// Nothing is emitted when validation fails; a data fault mid-table aborts the call.
    fn for_each_month<F>(
        &self,
        table: &WideTable,
        request: &ReshapeRequest,
        mut emit: F,
    ) -> Result<()>
    where
        F: FnMut(&[CellValue], MonthKey, f64),
    {
        let key_columns = self.validate(table, request)?;
        let filters = bind_filters(&request.filters, table.schema())?;

        let kept: Vec<(usize, &WideRecord)> = table
            .records()
            .iter()
            .enumerate()
            .filter(|(_, record)| accepts_all(&filters, record))
            .collect();

        debug!("{} of {} rows passed filters", kept.len(), table.len());

        // All rows resolve before the first emit
        let mut resolved = Vec::with_capacity(kept.len());
        let mut zero_filled = 0usize;
        for (row, record) in kept {
            let keys = group_values(row, record, &key_columns, &request.group_keys)?;
            let values = self.month_values(row, record, request.transform, &mut zero_filled)?;
            resolved.push((keys, values));
        }

        if zero_filled > 0 {
            warn!("Treated {} blank month cell(s) as zero", zero_filled);
        }

        for (keys, values) in &resolved {
            for month in MonthKey::ALL {
                emit(keys.as_slice(), month, values[month.index()]);
            }
        }

        Ok(())
    }

    fn month_values(
        &self,
        row: usize,
        record: &WideRecord,
        transform: Option<MonthTransform>,
        zero_filled: &mut usize,
    ) -> Result<[f64; 12]> {
        let mut values = [0.0; 12];
        for month in MonthKey::ALL {
            let raw = match record.month(month) {
                Some(v) if v.is_infinite() => {
                    return Err(DashboardError::DataShape {
                        row,
                        details: format!("month '{}' is not a finite number", month),
                    });
                }
                // NaN is the spreadsheet null marker
                Some(v) if !v.is_nan() => v,
                _ => match self.options.missing_month {
                    MissingMonthPolicy::TreatAsZero => {
                        *zero_filled += 1;
                        0.0
                    }
                    MissingMonthPolicy::Reject => {
                        return Err(DashboardError::DataShape {
                            row,
                            details: format!("month '{}' is blank", month),
                        });
                    }
                },
            };
            values[month.index()] = match transform {
                Some(t) => t.apply(raw),
                None => raw,
            };
        }
        Ok(values)
    }
}

fn group_values(
    row: usize,
    record: &WideRecord,
    columns: &[usize],
    names: &[String],
) -> Result<Vec<CellValue>> {
    columns
        .iter()
        .zip(names)
        .map(|(&column, name)| match record.category(column) {
            Some(CellValue::Empty) | None => Err(DashboardError::DataShape {
                row,
                details: format!("group key '{}' is blank", name),
            }),
            Some(value) => Ok(value.clone()),
        })
        .collect()
}

/// [`Reshaper::reshape`] with default options.
pub fn reshape(table: &WideTable, request: &ReshapeRequest) -> Result<LongTable> {
    Reshaper::default().reshape(table, request)
}

/// [`Reshaper::summarize`] with default options.
pub fn summarize(table: &WideTable, request: &ReshapeRequest) -> Result<TotalsTable> {
    Reshaper::default().summarize(table, request)
}
