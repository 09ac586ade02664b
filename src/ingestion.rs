use crate::error::{DashboardError, Result};
use crate::schema::{MonthKey, TableSchema, WideRecord, WideTable};
use crate::utils::{parse_amount, parse_cell, parse_month_label};
use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Reader, Sheets};
use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, info};
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;

/// Where each column of the export lands in the wide table.
#[derive(Debug, Clone)]
struct HeaderLayout {
    categorical: Vec<usize>,
    months: [usize; 12],
    schema: TableSchema,
}

fn detect_layout(headers: &StringRecord) -> Result<HeaderLayout> {
    let mut categorical = Vec::new();
    let mut names = Vec::new();
    let mut months: [Option<usize>; 12] = [None; 12];

    for (idx, name) in headers.iter().enumerate() {
        let name = name.trim();
        if name.is_empty() {
            // Spreadsheet exports often carry an unnamed index column
            debug!("Skipping unnamed column {}", idx);
            continue;
        }

        match parse_month_label(name) {
            Some(month) => {
                if months[month.index()].is_some() {
                    return Err(DashboardError::DataShape {
                        row: 1,
                        details: format!("month column '{}' appears more than once", month),
                    });
                }
                months[month.index()] = Some(idx);
            }
            None => {
                categorical.push(idx);
                names.push(name.to_string());
            }
        }
    }

    let missing: Vec<&str> = MonthKey::ALL
        .iter()
        .filter(|m| months[m.index()].is_none())
        .map(|m| m.label())
        .collect();
    if !missing.is_empty() {
        return Err(DashboardError::DataShape {
            row: 1,
            details: format!("missing month columns: {}", missing.join(", ")),
        });
    }

    let mut month_columns = [0usize; 12];
    for (slot, column) in month_columns.iter_mut().zip(months.iter()) {
        *slot = column.unwrap_or_default();
    }

    debug!("Detected categorical columns: {}", names.join(", "));

    Ok(HeaderLayout {
        categorical,
        months: month_columns,
        schema: TableSchema::new(names)?,
    })
}

fn parse_row(layout: &HeaderLayout, record: &StringRecord, line: usize) -> Result<WideRecord> {
    let categories = layout
        .categorical
        .iter()
        .map(|&idx| parse_cell(record.get(idx).unwrap_or("")))
        .collect();

    let mut months = [None; 12];
    for month in MonthKey::ALL {
        let raw = record.get(layout.months[month.index()]).unwrap_or("");
        months[month.index()] = match parse_amount(raw) {
            None => None,
            Some(Ok(value)) => Some(value),
            Some(Err(details)) => {
                return Err(DashboardError::DataShape {
                    row: line,
                    details: format!("column '{}': {}", month, details),
                })
            }
        };
    }

    Ok(WideRecord::new(categories, months))
}

/// Reads a CSV export of the sales spreadsheet. Month columns are found by label;
/// every other named column becomes a categorical column in header order.
pub fn read_wide_table<R: Read>(reader: R) -> Result<WideTable> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let layout = detect_layout(&headers)?;
    let mut table = WideTable::new(layout.schema.clone());

    for (idx, result) in rdr.records().enumerate() {
        let record = result?;
        // Line 1 is the header
        let line = idx + 2;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            debug!("Skipping blank line {}", line);
            continue;
        }
        table.push(parse_row(&layout, &record, line)?)?;
    }

    info!(
        "Loaded {} rows with categorical columns [{}]",
        table.len(),
        table.schema().columns().join(", ")
    );

    Ok(table)
}

pub fn read_wide_table_from_path<P: AsRef<Path>>(path: P) -> Result<WideTable> {
    let path = path.as_ref();
    info!("Loading data from {}", path.display());
    let file = File::open(path)?;
    read_wide_table(BufReader::new(file))
}

/// Reads the first worksheet of an Excel workbook (`.xlsx`, `.xls`, `.xlsb`, `.ods`).
/// The first row is the header, with the same month detection as the CSV reader.
pub fn read_wide_table_from_xlsx<P: AsRef<Path>>(path: P) -> Result<WideTable> {
    let path = path.as_ref();
    info!("Loading workbook {}", path.display());
    let mut workbook = open_workbook_auto(path)?;
    read_first_worksheet(&mut workbook)
}

/// Same as [`read_wide_table_from_xlsx`] for an uploaded file held in memory.
pub fn read_wide_table_from_xlsx_bytes(bytes: &[u8]) -> Result<WideTable> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    read_first_worksheet(&mut workbook)
}

fn read_first_worksheet<RS: Read + Seek>(workbook: &mut Sheets<RS>) -> Result<WideTable> {
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| DashboardError::DataShape {
            row: 1,
            details: "workbook has no worksheets".to_string(),
        })??;

    // Sheet line numbers are 1-based and the used range may not start at A1
    let first_line = range.start().map(|(row, _)| row as usize + 1).unwrap_or(1);
    let mut rows = range.rows();

    let headers = match rows.next() {
        Some(cells) => worksheet_record(cells),
        None => {
            return Err(DashboardError::DataShape {
                row: first_line,
                details: "worksheet is empty".to_string(),
            })
        }
    };
    let layout = detect_layout(&headers)?;
    let mut table = WideTable::new(layout.schema.clone());

    for (idx, cells) in rows.enumerate() {
        let line = first_line + idx + 1;
        let record = worksheet_record(cells);
        if record.iter().all(|cell| cell.trim().is_empty()) {
            debug!("Skipping blank line {}", line);
            continue;
        }
        table.push(parse_row(&layout, &record, line)?)?;
    }

    info!(
        "Loaded {} worksheet rows with categorical columns [{}]",
        table.len(),
        table.schema().columns().join(", ")
    );

    Ok(table)
}

fn worksheet_record(cells: &[Data]) -> StringRecord {
    let fields: Vec<String> = cells.iter().map(cell_text).collect();
    StringRecord::from(fields)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Float(v) => v.to_string(),
        Data::Int(v) => v.to_string(),
        Data::Bool(v) => v.to_string(),
        Data::DateTime(v) => v.as_f64().to_string(),
        Data::Error(e) => e.to_string(),
    }
}
