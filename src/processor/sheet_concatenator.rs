use crate::error::{PipelineError, Result};
use crate::models::{ConcatReport, Sheet};
use crate::processor::frame_utils::{column_as_strings, column_names, non_null_count};
use polars::prelude::*;
use tracing::{debug, info, warn};

pub const DEFAULT_PROVENANCE_COLUMN: &str = "Source Sheet";
pub const DEFAULT_MIN_VALID_RECORDS: usize = 1;

#[derive(Debug, Clone)]
pub struct ConcatOptions {
    /// Columns with fewer non-null values than this are dropped.
    pub min_valid_records: usize,
    /// Columns exempt from the `min_valid_records` floor.
    pub preserved_columns: Vec<String>,
    pub provenance_column: String,
}

impl Default for ConcatOptions {
    fn default() -> Self {
        ConcatOptions {
            min_valid_records: DEFAULT_MIN_VALID_RECORDS,
            preserved_columns: Vec::new(),
            provenance_column: DEFAULT_PROVENANCE_COLUMN.to_string(),
        }
    }
}

impl ConcatOptions {
    fn is_preserved(&self, column: &str) -> bool {
        self.preserved_columns
            .iter()
            .any(|p| p.trim().eq_ignore_ascii_case(column.trim()))
    }
}

/// Union of the selected sheets, one row per source row.
#[derive(Debug, Clone)]
pub struct ConcatenatedTable {
    pub frame: DataFrame,
    pub provenance_column: String,
    pub report: ConcatReport,
}

/// Pick the requested sheets, in requested order.
///
/// Unknown names are skipped with a warning; fails when nothing was asked
/// for or nothing asked for exists.
pub fn select_sheets(available: Vec<Sheet>, requested: &[String]) -> Result<Vec<Sheet>> {
    if requested.is_empty() {
        return Err(PipelineError::InvalidSelection(
            "no sheets were selected".to_string(),
        ));
    }

    let mut pool: Vec<Option<Sheet>> = available.into_iter().map(Some).collect();
    let mut selected = Vec::new();

    for name in requested {
        let wanted = name.trim();
        let position = pool.iter().position(|slot| {
            slot.as_ref()
                .map(|sheet| sheet.name.trim() == wanted)
                .unwrap_or(false)
        });

        match position.and_then(|idx| pool[idx].take()) {
            Some(sheet) => selected.push(sheet),
            None => {
                if selected.iter().any(|s: &Sheet| s.name.trim() == wanted) {
                    debug!("Sheet '{}' requested more than once, keeping first", wanted);
                } else {
                    warn!("Requested sheet '{}' not found in workbook, skipping", wanted);
                }
            }
        }
    }

    if selected.is_empty() {
        return Err(PipelineError::InvalidSelection(format!(
            "none of the requested sheets exist: {}",
            requested.join(", ")
        )));
    }

    info!(
        "Selected {} of {} requested sheets",
        selected.len(),
        requested.len()
    );
    Ok(selected)
}

pub struct SheetConcatenator {
    options: ConcatOptions,
}

impl SheetConcatenator {
    pub fn new(options: ConcatOptions) -> Self {
        SheetConcatenator { options }
    }

    pub fn options(&self) -> &ConcatOptions {
        &self.options
    }

    /// Merge sheets progressively. The first sheet fixes the base schema;
    /// every later sheet only appends its new columns to the end.
    pub fn concatenate(&self, sheets: Vec<Sheet>) -> Result<ConcatenatedTable> {
        let mut iter = sheets.into_iter();
        let first = iter.next().ok_or_else(|| {
            PipelineError::InvalidSelection("no sheets to concatenate".to_string())
        })?;

        let mut report = ConcatReport::default();
        report.sheets.push(first.name.clone());
        report.rows_per_sheet.push(first.frame.height());
        let mut result = self.tag_with_provenance(first)?;

        for sheet in iter {
            report.sheets.push(sheet.name.clone());
            report.rows_per_sheet.push(sheet.frame.height());
            let sheet_name = sheet.name.clone();
            let next = self.tag_with_provenance(sheet)?;
            result = self.append_aligned(result, next, &sheet_name)?;
        }

        self.drop_sparse_columns(&mut result, &mut report)?;

        info!(
            "Concatenated {} sheets into {} rows x {} columns",
            report.sheets.len(),
            result.height(),
            result.width()
        );

        Ok(ConcatenatedTable {
            frame: result,
            provenance_column: self.options.provenance_column.clone(),
            report,
        })
    }

    fn tag_with_provenance(&self, sheet: Sheet) -> Result<DataFrame> {
        let provenance = self.options.provenance_column.as_str();
        let mut frame = sheet.frame;
        if frame.column(provenance).is_ok() {
            warn!(
                "Sheet '{}' already has a '{}' column, overwriting it",
                sheet.name, provenance
            );
            frame.drop_in_place(provenance)?;
        }
        let tags = vec![sheet.name.as_str(); frame.height()];
        frame.with_column(Series::new(provenance.into(), tags))?;
        Ok(frame)
    }

    fn append_aligned(
        &self,
        mut result: DataFrame,
        mut next: DataFrame,
        sheet_name: &str,
    ) -> Result<DataFrame> {
        let result_columns = column_names(&result);
        let next_columns = column_names(&next);

        // Present so far, absent from this sheet: null for the new rows.
        for name in result_columns.iter().filter(|c| !next_columns.contains(c)) {
            let dtype = result.column(name)?.dtype().clone();
            next.with_column(Series::full_null(name.as_str().into(), next.height(), &dtype))?;
        }

        // New in this sheet: appended to the schema, null for earlier rows.
        let mut appended = Vec::new();
        for name in next_columns.iter().filter(|c| !result_columns.contains(c)) {
            let dtype = next.column(name)?.dtype().clone();
            result.with_column(Series::full_null(name.as_str().into(), result.height(), &dtype))?;
            appended.push(name.as_str());
        }
        if !appended.is_empty() {
            debug!(
                "Sheet '{}' added {} new columns: {}",
                sheet_name,
                appended.len(),
                appended.join(", ")
            );
        }

        for name in column_names(&result) {
            let left = result.column(&name)?.dtype().clone();
            let right = next.column(&name)?.dtype().clone();
            if left != right {
                debug!(
                    "Column '{}' is {} in earlier sheets and {} in '{}', widening to text",
                    name, left, right, sheet_name
                );
                widen_to_string(&mut result, &name)?;
                widen_to_string(&mut next, &name)?;
            }
        }

        let order = column_names(&result);
        let next = next.select(order.iter().map(|s| s.as_str()))?;
        result.vstack_mut(&next)?;
        Ok(result)
    }

    fn drop_sparse_columns(&self, df: &mut DataFrame, report: &mut ConcatReport) -> Result<()> {
        for name in column_names(df) {
            if name == self.options.provenance_column {
                continue;
            }
            let valid = non_null_count(df.column(&name)?)?;
            if valid == 0 {
                df.drop_in_place(&name)?;
                report.dropped_all_null.push(name);
            } else if valid < self.options.min_valid_records && !self.options.is_preserved(&name) {
                df.drop_in_place(&name)?;
                report.dropped_low_data.push(name);
            }
        }

        if !report.dropped_all_null.is_empty() {
            info!(
                "Dropped {} all-null columns: {}",
                report.dropped_all_null.len(),
                report.dropped_all_null.join(", ")
            );
        }
        if !report.dropped_low_data.is_empty() {
            info!(
                "Dropped {} columns with fewer than {} valid records: {}",
                report.dropped_low_data.len(),
                self.options.min_valid_records,
                report.dropped_low_data.join(", ")
            );
        }
        Ok(())
    }
}

fn widen_to_string(df: &mut DataFrame, name: &str) -> Result<()> {
    let values = column_as_strings(df, name)?;
    df.with_column(Series::new(name.into(), values))?;
    Ok(())
}
