use crate::error::{DashboardError, Result};
use crate::utils::parse_month_label;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::str::FromStr;

pub const SCENARIO: &str = "Scenario";
pub const ACCOUNT: &str = "Account";
pub const BUSINESS_UNIT: &str = "business_unit";
pub const YEAR: &str = "Year";

/// Calendar month label. `Ord` follows calendar order, never lexical order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum MonthKey {
    Jan,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
}

impl MonthKey {
    pub const ALL: [MonthKey; 12] = [
        MonthKey::Jan,
        MonthKey::Feb,
        MonthKey::Mar,
        MonthKey::Apr,
        MonthKey::May,
        MonthKey::Jun,
        MonthKey::Jul,
        MonthKey::Aug,
        MonthKey::Sep,
        MonthKey::Oct,
        MonthKey::Nov,
        MonthKey::Dec,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MonthKey::Jan => "Jan",
            MonthKey::Feb => "Feb",
            MonthKey::Mar => "Mar",
            MonthKey::Apr => "Apr",
            MonthKey::May => "May",
            MonthKey::Jun => "Jun",
            MonthKey::Jul => "Jul",
            MonthKey::Aug => "Aug",
            MonthKey::Sep => "Sep",
            MonthKey::Oct => "Oct",
            MonthKey::Nov => "Nov",
            MonthKey::Dec => "Dec",
        }
    }

    /// 0-based position in the calendar (Jan = 0).
    pub fn index(self) -> usize {
        self as usize
    }

    /// 1-based month number (Jan = 1).
    pub fn number(self) -> u32 {
        self as u32 + 1
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MonthKey {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self> {
        parse_month_label(s)
            .ok_or_else(|| DashboardError::Configuration(format!("Unknown month label '{}'", s)))
    }
}

impl From<chrono::Month> for MonthKey {
    fn from(month: chrono::Month) -> Self {
        // number_from_month is always 1..=12
        Self::ALL[month.number_from_month() as usize - 1]
    }
}

impl From<MonthKey> for chrono::Month {
    fn from(month: MonthKey) -> Self {
        match month {
            MonthKey::Jan => chrono::Month::January,
            MonthKey::Feb => chrono::Month::February,
            MonthKey::Mar => chrono::Month::March,
            MonthKey::Apr => chrono::Month::April,
            MonthKey::May => chrono::Month::May,
            MonthKey::Jun => chrono::Month::June,
            MonthKey::Jul => chrono::Month::July,
            MonthKey::Aug => chrono::Month::August,
            MonthKey::Sep => chrono::Month::September,
            MonthKey::Oct => chrono::Month::October,
            MonthKey::Nov => chrono::Month::November,
            MonthKey::Dec => chrono::Month::December,
        }
    }
}

/// A categorical cell. Spreadsheet years arrive as integers, everything else as text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Integer(i64),
    Text(String),
    Empty,
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Integer(n) => write!(f, "{}", n),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Empty => Ok(()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Integer(value)
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        CellValue::Integer(value as i64)
    }
}

/// Ordered names of the categorical columns of a wide table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct TableSchema {
    columns: Vec<String>,
}

impl TableSchema {
    pub fn new(columns: Vec<String>) -> Result<Self> {
        let mut seen = HashSet::new();
        for name in &columns {
            if name.trim().is_empty() {
                return Err(DashboardError::Configuration(
                    "Categorical column names must not be blank".to_string(),
                ));
            }
            if parse_month_label(name).is_some() {
                return Err(DashboardError::Configuration(format!(
                    "Column '{}' is a month label and cannot be categorical",
                    name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(DashboardError::Configuration(format!(
                    "Duplicate categorical column '{}'",
                    name
                )));
            }
        }
        Ok(Self { columns })
    }

    /// The dashboard's default shape: Scenario, Account, business_unit, Year.
    pub fn sales() -> Self {
        Self {
            columns: vec![
                SCENARIO.to_string(),
                ACCOUNT.to_string(),
                BUSINESS_UNIT.to_string(),
                YEAR.to_string(),
            ],
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Like [`position`](Self::position) but an unknown name is a configuration error.
    pub fn require(&self, name: &str) -> Result<usize> {
        self.position(name).ok_or_else(|| {
            DashboardError::Configuration(format!(
                "Unknown field '{}' (available: {})",
                name,
                self.columns.join(", ")
            ))
        })
    }
}

impl TryFrom<Vec<String>> for TableSchema {
    type Error = DashboardError;

    fn try_from(columns: Vec<String>) -> Result<Self> {
        Self::new(columns)
    }
}

impl From<TableSchema> for Vec<String> {
    fn from(schema: TableSchema) -> Self {
        schema.columns
    }
}

/// One spreadsheet row: categorical cells in schema order plus twelve month amounts.
/// `None` marks a blank month cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideRecord {
    pub categories: Vec<CellValue>,
    pub months: [Option<f64>; 12],
}

impl WideRecord {
    pub fn new(categories: Vec<CellValue>, months: [Option<f64>; 12]) -> Self {
        Self { categories, months }
    }

    pub fn from_values(categories: Vec<CellValue>, months: [f64; 12]) -> Self {
        Self {
            categories,
            months: months.map(Some),
        }
    }

    /// Builds a row for [`TableSchema::sales`].
    pub fn sales(
        scenario: &str,
        account: &str,
        business_unit: &str,
        year: i64,
        months: [f64; 12],
    ) -> Self {
        Self::from_values(
            vec![
                CellValue::from(scenario),
                CellValue::from(account),
                CellValue::from(business_unit),
                CellValue::Integer(year),
            ],
            months,
        )
    }

    pub fn month(&self, month: MonthKey) -> Option<f64> {
        self.months[month.index()]
    }

    pub fn category(&self, column: usize) -> Option<&CellValue> {
        self.categories.get(column)
    }

    /// Sum of the present month values.
    pub fn row_total(&self) -> f64 {
        self.months.iter().flatten().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WideTable {
    schema: TableSchema,
    records: Vec<WideRecord>,
}

impl WideTable {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            records: Vec::new(),
        }
    }

    pub fn from_records(schema: TableSchema, records: Vec<WideRecord>) -> Result<Self> {
        let mut table = Self::new(schema);
        table.records.reserve(records.len());
        for record in records {
            table.push(record)?;
        }
        Ok(table)
    }

    pub fn push(&mut self, record: WideRecord) -> Result<()> {
        if record.categories.len() != self.schema.len() {
            return Err(DashboardError::DataShape {
                row: self.records.len(),
                details: format!(
                    "expected {} categorical cells, found {}",
                    self.schema.len(),
                    record.categories.len()
                ),
            });
        }
        self.records.push(record);
        Ok(())
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn records(&self) -> &[WideRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Content hash used as the table identity for cached results.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.schema.hash(&mut hasher);
        self.records.len().hash(&mut hasher);
        for record in &self.records {
            record.categories.hash(&mut hasher);
            for month in &record.months {
                month.map(f64::to_bits).hash(&mut hasher);
            }
        }
        hasher.finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongRecord {
    pub keys: Vec<CellValue>,
    pub month: MonthKey,
    pub value: f64,
}

/// Long-format result: one row per (group keys, month).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongTable {
    pub key_columns: Vec<String>,
    pub records: Vec<LongRecord>,
}

impl LongTable {
    pub fn new(key_columns: Vec<String>) -> Self {
        Self {
            key_columns,
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.records.iter().map(|r| r.value).sum()
    }

    pub fn value_for(&self, keys: &[CellValue], month: MonthKey) -> Option<f64> {
        self.records
            .iter()
            .find(|r| r.month == month && r.keys == keys)
            .map(|r| r.value)
    }

    /// Distinct key tuples in order of first appearance.
    pub fn groups(&self) -> Vec<&[CellValue]> {
        let mut groups: Vec<&[CellValue]> = Vec::new();
        for record in &self.records {
            if !groups.iter().any(|g| *g == record.keys.as_slice()) {
                groups.push(&record.keys);
            }
        }
        groups
    }

    /// Copy ordered chronologically, groups kept in first-appearance order within a month.
    pub fn sorted_by_calendar(&self) -> LongTable {
        let mut records = self.records.clone();
        records.sort_by_key(|r| r.month);
        LongTable {
            key_columns: self.key_columns.clone(),
            records,
        }
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        let mut header: Vec<&str> = self.key_columns.iter().map(String::as_str).collect();
        header.push("month");
        header.push("value");
        wtr.write_record(&header)?;

        for record in &self.records {
            let mut row: Vec<String> = record.keys.iter().map(ToString::to_string).collect();
            row.push(record.month.to_string());
            row.push(record.value.to_string());
            wtr.write_record(&row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalRecord {
    pub keys: Vec<CellValue>,
    pub total: f64,
}

/// Group totals with the twelve months collapsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalsTable {
    pub key_columns: Vec<String>,
    pub records: Vec<TotalRecord>,
}

impl TotalsTable {
    pub fn new(key_columns: Vec<String>) -> Self {
        Self {
            key_columns,
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.records.iter().map(|r| r.total).sum()
    }

    pub fn value_for(&self, keys: &[CellValue]) -> Option<f64> {
        self.records
            .iter()
            .find(|r| r.keys == keys)
            .map(|r| r.total)
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        let mut header: Vec<&str> = self.key_columns.iter().map(String::as_str).collect();
        header.push("total");
        wtr.write_record(&header)?;

        for record in &self.records {
            let mut row: Vec<String> = record.keys.iter().map(ToString::to_string).collect();
            row.push(record.total.to_string());
            wtr.write_record(&row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_ordering_is_calendar() {
        let mut months = vec![MonthKey::Dec, MonthKey::Apr, MonthKey::Aug, MonthKey::Jan];
        months.sort();
        assert_eq!(
            months,
            vec![MonthKey::Jan, MonthKey::Apr, MonthKey::Aug, MonthKey::Dec]
        );

        // Lexical order would put Apr first
        let mut labels: Vec<&str> = MonthKey::ALL.iter().map(|m| m.label()).collect();
        labels.sort();
        assert_eq!(labels[0], "Apr");
        assert_eq!(MonthKey::ALL[0], MonthKey::Jan);
    }

    #[test]
    fn test_month_chrono_conversion() {
        for month in MonthKey::ALL {
            let chrono_month: chrono::Month = month.into();
            assert_eq!(chrono_month.number_from_month(), month.number());
            assert_eq!(MonthKey::from(chrono_month), month);
        }
        assert_eq!("september".parse::<MonthKey>().unwrap(), MonthKey::Sep);
        assert!("Smarch".parse::<MonthKey>().is_err());
    }

    #[test]
    fn test_schema_rejects_duplicates_and_months() {
        assert!(TableSchema::new(vec!["Account".into(), "Account".into()]).is_err());
        assert!(TableSchema::new(vec!["Jan".into()]).is_err());
        assert!(TableSchema::new(vec![" ".into()]).is_err());

        let schema = TableSchema::sales();
        assert_eq!(schema.position(YEAR), Some(3));
        let err = schema.require("Region").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_schema_deserialization_validates() {
        let ok: TableSchema = serde_json::from_str(r#"["Scenario","Year"]"#).unwrap();
        assert_eq!(ok.len(), 2);
        assert!(serde_json::from_str::<TableSchema>(r#"["Year","Year"]"#).is_err());
    }

    #[test]
    fn test_table_rejects_wrong_arity() {
        let mut table = WideTable::new(TableSchema::sales());
        let short = WideRecord::from_values(vec![CellValue::from("Actuals")], [0.0; 12]);
        let err = table.push(short).unwrap_err();
        assert!(err.is_data_shape());
        assert!(table.is_empty());
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let row = WideRecord::sales("Actuals", "Sales", "Software", 2023, [1.0; 12]);
        let a = WideTable::from_records(TableSchema::sales(), vec![row.clone()]).unwrap();
        let b = WideTable::from_records(TableSchema::sales(), vec![row.clone()]).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let mut c = b.clone();
        c.push(row).unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_cell_value_serialization() {
        let cells = vec![
            CellValue::Integer(2023),
            CellValue::from("Sales"),
            CellValue::Empty,
        ];
        let json = serde_json::to_string(&cells).unwrap();
        assert_eq!(json, r#"[2023,"Sales",null]"#);
        let back: Vec<CellValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cells);
    }

    #[test]
    fn test_long_table_csv_export() {
        let table = LongTable {
            key_columns: vec!["Scenario".to_string()],
            records: vec![
                LongRecord {
                    keys: vec![CellValue::from("Actuals")],
                    month: MonthKey::Jan,
                    value: 150.0,
                },
                LongRecord {
                    keys: vec![CellValue::from("Budget")],
                    month: MonthKey::Jan,
                    value: -20.5,
                },
            ],
        };

        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "Scenario,month,value\nActuals,Jan,150\nBudget,Jan,-20.5\n");
    }
}
