//! Read and write multi-sheet workbooks, one table per sheet.

use std::collections::HashMap;
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};
use chrono::{Days, NaiveDate};
use polars::prelude::*;
use rust_xlsxwriter::{Workbook, Worksheet};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::models::Sheet;
use crate::processor::frame_utils::{column_as_f64, column_as_strings, column_names, format_number};

const MAX_SHEET_NAME: usize = 31;

/// Read every sheet of a workbook. The first row of each sheet is the header.
pub fn read_workbook(path: impl AsRef<Path>) -> Result<Vec<Sheet>> {
    let path = path.as_ref();
    let mut workbook = open_workbook_auto(path).map_err(|e| {
        PipelineError::Workbook(format!("Failed to open {}: {}", path.display(), e))
    })?;

    let names = workbook.sheet_names();
    if names.is_empty() {
        return Err(PipelineError::EmptyInput(format!(
            "{} has no sheets",
            path.display()
        )));
    }

    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = workbook.worksheet_range(&name).map_err(|e| {
            PipelineError::Workbook(format!("Failed to read sheet {}: {}", name, e))
        })?;
        let rows: Vec<&[Data]> = range.rows().collect();
        let frame = rows_to_frame(&rows)?;
        debug!(
            "Read sheet '{}': {} rows x {} columns",
            name,
            frame.height(),
            frame.width()
        );
        sheets.push(Sheet::new(name, frame));
    }

    info!("Read {} sheets from {}", sheets.len(), path.display());
    Ok(sheets)
}

/// Build a frame from raw rows: a column is numeric when every non-empty
/// cell is a number, text otherwise.
pub fn rows_to_frame(rows: &[&[Data]]) -> Result<DataFrame> {
    let Some((header, body)) = rows.split_first() else {
        return Ok(DataFrame::empty());
    };

    let body: Vec<&[Data]> = body
        .iter()
        .copied()
        .filter(|row| row.iter().any(|cell| cell_text(cell).is_some()))
        .collect();

    let headers = dedupe_headers(
        &header
            .iter()
            .enumerate()
            .map(|(idx, cell)| cell_text(cell).unwrap_or_else(|| format!("Unnamed: {}", idx)))
            .collect::<Vec<_>>(),
    );

    let mut columns: Vec<Column> = Vec::with_capacity(headers.len());
    for (idx, name) in headers.iter().enumerate() {
        let cells: Vec<Option<&Data>> = body.iter().map(|row| row.get(idx)).collect();
        let numeric = cells.iter().flatten().all(|cell| {
            matches!(cell, Data::Int(_) | Data::Float(_) | Data::Empty)
        });

        let column: Column = if numeric {
            let values: Vec<Option<f64>> = cells
                .iter()
                .map(|cell| match cell {
                    Some(Data::Int(i)) => Some(*i as f64),
                    Some(Data::Float(f)) => Some(*f),
                    _ => None,
                })
                .collect();
            Series::new(name.as_str().into(), values).into()
        } else {
            let values: Vec<Option<String>> = cells
                .iter()
                .map(|cell| cell.and_then(cell_text))
                .collect();
            Series::new(name.as_str().into(), values).into()
        };
        columns.push(column);
    }

    Ok(DataFrame::new(columns)?)
}

fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_number(*f),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_date(dt.as_f64())?,
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        _ => return None,
    };
    if text.is_empty() { None } else { Some(text) }
}

fn excel_date(serial: f64) -> Option<String> {
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let date = base.checked_add_days(Days::new(serial.max(0.0).trunc() as u64))?;
    Some(date.format("%Y-%m-%d").to_string())
}

fn dedupe_headers(headers: &[String]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    headers
        .iter()
        .map(|header| {
            let count = seen.entry(header.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                header.clone()
            } else {
                format!("{}__{}", header, count)
            }
        })
        .collect()
}

/// Write all sheets into one workbook and save it once.
pub fn write_workbook(path: impl AsRef<Path>, sheets: &[Sheet]) -> Result<()> {
    let path = path.as_ref();
    let mut workbook = Workbook::new();
    let mut used_names: Vec<String> = Vec::new();

    for sheet in sheets {
        let name = unique_sheet_name(&sheet.name, &used_names);
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&name).map_err(xlsx_error)?;
        write_frame(worksheet, &sheet.frame)?;
        used_names.push(name);
    }

    workbook
        .save(path)
        .map_err(|e| PipelineError::Workbook(format!("Failed to save {}: {}", path.display(), e)))?;

    info!("Wrote {} sheets to {}", sheets.len(), path.display());
    Ok(())
}

fn write_frame(worksheet: &mut Worksheet, frame: &DataFrame) -> Result<()> {
    for (col_idx, name) in column_names(frame).iter().enumerate() {
        let col = col_idx as u16;
        worksheet.write_string(0, col, name).map_err(xlsx_error)?;

        let numeric = matches!(
            frame.column(name)?.dtype(),
            DataType::Float64
                | DataType::Float32
                | DataType::Int64
                | DataType::Int32
                | DataType::UInt64
                | DataType::UInt32
        );
        if numeric {
            for (row_idx, value) in column_as_f64(frame, name)?.into_iter().enumerate() {
                if let Some(value) = value.filter(|v| v.is_finite()) {
                    worksheet
                        .write_number(row_idx as u32 + 1, col, value)
                        .map_err(xlsx_error)?;
                }
            }
        } else {
            for (row_idx, value) in column_as_strings(frame, name)?.into_iter().enumerate() {
                if let Some(value) = value {
                    worksheet
                        .write_string(row_idx as u32 + 1, col, &value)
                        .map_err(xlsx_error)?;
                }
            }
        }
    }
    Ok(())
}

fn xlsx_error(e: rust_xlsxwriter::XlsxError) -> PipelineError {
    PipelineError::Workbook(e.to_string())
}

/// Excel sheet names: at most 31 characters, none of `[]:*?/\`, unique.
pub fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\') { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim().trim_matches('\'').to_string();
    let truncated: String = cleaned.chars().take(MAX_SHEET_NAME).collect();
    if truncated.is_empty() {
        "Sheet".to_string()
    } else {
        truncated
    }
}

fn unique_sheet_name(name: &str, used: &[String]) -> String {
    let base = sanitize_sheet_name(name);
    let taken = |candidate: &str| used.iter().any(|u| u.eq_ignore_ascii_case(candidate));
    if !taken(&base) {
        return base;
    }
    (2..)
        .map(|n| {
            let suffix = format!(" ({})", n);
            let room = MAX_SHEET_NAME - suffix.len();
            format!("{}{}", base.chars().take(room).collect::<String>(), suffix)
        })
        .find(|candidate| !taken(candidate))
        .unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_to_frame_types() {
        let header = vec![
            Data::String("Region".to_string()),
            Data::String("Price NTW Sachet".to_string()),
            Data::Empty,
            Data::String("Region".to_string()),
        ];
        let row1 = vec![
            Data::String("North".to_string()),
            Data::Float(10.5),
            Data::Int(3),
            Data::String("N".to_string()),
        ];
        let row2 = vec![
            Data::String("South".to_string()),
            Data::Empty,
            Data::String("x".to_string()),
        ];
        let blank = vec![Data::Empty, Data::Empty];
        let rows: Vec<&[Data]> = vec![
            header.as_slice(),
            row1.as_slice(),
            blank.as_slice(),
            row2.as_slice(),
        ];

        let frame = rows_to_frame(&rows).unwrap();
        assert_eq!(
            column_names(&frame),
            vec!["Region", "Price NTW Sachet", "Unnamed: 2", "Region__2"]
        );
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.column("Price NTW Sachet").unwrap().dtype(), &DataType::Float64);
        assert_eq!(
            column_as_f64(&frame, "Price NTW Sachet").unwrap(),
            vec![Some(10.5), None]
        );
        assert_eq!(
            column_as_strings(&frame, "Unnamed: 2").unwrap(),
            vec![Some("3".to_string()), Some("x".to_string())]
        );
        assert_eq!(
            column_as_strings(&frame, "Region__2").unwrap(),
            vec![Some("N".to_string()), None]
        );
    }

    #[test]
    fn test_empty_rows() {
        let rows: Vec<&[Data]> = Vec::new();
        assert_eq!(rows_to_frame(&rows).unwrap().width(), 0);
    }

    #[test]
    fn test_excel_date() {
        assert_eq!(excel_date(44593.0).as_deref(), Some("2022-02-01"));
    }

    #[test]
    fn test_sheet_names() {
        assert_eq!(sanitize_sheet_name("NTW 150/250ML"), "NTW 150_250ML");
        assert_eq!(sanitize_sheet_name("  "), "Sheet");
        assert_eq!(
            sanitize_sheet_name("A very long sheet name that overflows").chars().count(),
            31
        );

        let used = vec!["Price".to_string()];
        assert_eq!(unique_sheet_name("price", &used), "price (2)");
    }
}
