//! Cleaning of raw UCI Air Quality rows
//!
//! Steps run in a fixed order:
//! 1. strip column names
//! 2. sentinel `-200` becomes absent
//! 3. drop rows with more than 30% absent cells
//! 4. parse `Date` (`%d/%m/%Y`) and `Time` (`%H.%M.%S`)
//! 5. derive `hour`, `day_of_week`, `month`; drop `Date` and `Time`
//! 6. coerce remaining columns to numbers
//! 7. drop columns with more than 20% absent values
//! 8. fill what is still absent with the column median
//!
//! Step 7 depends on the data, so independent fits over different files can
//! end up with different column sets.

use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use tracing::{debug, info};

use crate::errors::{PipelineError, Result};
use crate::raw::{read_raw_table, Cell, RawTable};
use crate::table::Table;

/// Source value meaning "sensor reading absent".
pub const MISSING_SENTINEL: f64 = -200.0;

/// Calendar columns derived from `Date` and `Time`, in output order.
pub const DERIVED_COLUMNS: [&str; 3] = ["hour", "day_of_week", "month"];

pub const DATE_COLUMN: &str = "Date";
pub const TIME_COLUMN: &str = "Time";
pub const DATE_FORMAT: &str = "%d/%m/%Y";
pub const TIME_FORMAT: &str = "%H.%M.%S";

/// Minimum share of present cells for a row to survive.
const ROW_KEEP_FRACTION: f64 = 0.7;
/// Minimum share of present values for a column to survive.
const COLUMN_KEEP_FRACTION: f64 = 0.8;

/// Read and clean a dataset file. Fails when no usable row remains.
pub fn load_and_clean<P: AsRef<Path>>(path: P) -> Result<Table> {
    let raw = read_raw_table(path.as_ref())?;
    let table = clean(raw)?;
    if table.is_empty() {
        return Err(PipelineError::Data(format!(
            "no usable rows remain after cleaning {}",
            path.as_ref().display()
        )));
    }
    Ok(table)
}

/// Apply the cleaning algorithm to a raw table.
pub fn clean(raw: RawTable) -> Result<Table> {
    let RawTable { columns, rows } = raw;
    let columns: Vec<String> = columns.iter().map(|name| name.trim().to_string()).collect();
    let total_columns = columns.len();

    let date_idx = columns
        .iter()
        .position(|c| c == DATE_COLUMN)
        .ok_or_else(|| PipelineError::Data(format!("missing '{DATE_COLUMN}' column")))?;
    let time_idx = columns
        .iter()
        .position(|c| c == TIME_COLUMN)
        .ok_or_else(|| PipelineError::Data(format!("missing '{TIME_COLUMN}' column")))?;

    let raw_rows = rows.len();
    let row_threshold = total_columns as f64 * ROW_KEEP_FRACTION;
    let rows: Vec<Vec<Cell>> = rows
        .into_iter()
        .map(replace_sentinels)
        .filter(|row| {
            let present = row.iter().filter(|cell| !cell.is_missing()).count();
            present as f64 >= row_threshold
        })
        .collect();
    debug!(
        "Row threshold kept {} of {} rows (need {:.1} present cells)",
        rows.len(),
        raw_rows,
        row_threshold
    );

    // Remaining source columns keep their order, derived columns go last.
    let mut names: Vec<String> = Vec::with_capacity(total_columns + 1);
    let mut values: Vec<Vec<Option<f64>>> = Vec::with_capacity(total_columns + 1);
    for (idx, name) in columns.iter().enumerate() {
        if idx == date_idx || idx == time_idx {
            continue;
        }
        names.push(name.clone());
        values.push(rows.iter().map(|row| row[idx].to_numeric()).collect());
    }

    let mut hours = Vec::with_capacity(rows.len());
    let mut weekdays = Vec::with_capacity(rows.len());
    let mut months = Vec::with_capacity(rows.len());
    for row in &rows {
        let date = parse_date(&row[date_idx]);
        let time = parse_time(&row[time_idx]);
        hours.push(Some(time.map(|t| t.hour() as f64).unwrap_or(0.0)));
        weekdays.push(date.map(|d| d.weekday().num_days_from_monday() as f64));
        months.push(date.map(|d| d.month() as f64));
    }
    for (name, column) in DERIVED_COLUMNS.iter().zip([hours, weekdays, months]) {
        names.push((*name).to_string());
        values.push(column);
    }

    let row_count = rows.len();
    let column_threshold = row_count as f64 * COLUMN_KEEP_FRACTION;
    let mut kept_names = Vec::with_capacity(names.len());
    let mut kept_values = Vec::with_capacity(values.len());
    for (name, column) in names.into_iter().zip(values) {
        let present = column.iter().filter(|v| v.is_some()).count();
        if present as f64 >= column_threshold {
            kept_names.push(name);
            kept_values.push(column);
        } else {
            debug!("Dropping column '{}' ({} of {} present)", name, present, row_count);
        }
    }

    let filled: Vec<Vec<f64>> = kept_values.into_iter().map(fill_with_median).collect();

    let rows = (0..row_count)
        .map(|r| filled.iter().map(|column| column[r]).collect())
        .collect();
    let table = Table::new(kept_names, rows);

    info!(
        "Dataset cleaned. Shape: ({}, {})",
        table.len(),
        table.width()
    );
    Ok(table)
}

fn replace_sentinels(row: Vec<Cell>) -> Vec<Cell> {
    row.into_iter()
        .map(|cell| match cell {
            Cell::Number(value) if value == MISSING_SENTINEL => Cell::Missing,
            other => other,
        })
        .collect()
}

fn parse_date(cell: &Cell) -> Option<NaiveDate> {
    cell.as_text()
        .and_then(|text| NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok())
}

fn parse_time(cell: &Cell) -> Option<NaiveTime> {
    cell.as_text()
        .and_then(|text| NaiveTime::parse_from_str(text.trim(), TIME_FORMAT).ok())
}

/// Median of the present values, `None` for an all-absent column.
pub fn median(values: &[Option<f64>]) -> Option<f64> {
    let mut present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }
    present.sort_by(|a, b| a.total_cmp(b));
    let mid = present.len() / 2;
    if present.len() % 2 == 0 {
        Some((present[mid - 1] + present[mid]) / 2.0)
    } else {
        Some(present[mid])
    }
}

fn fill_with_median(column: Vec<Option<f64>>) -> Vec<f64> {
    let fill = median(&column).unwrap_or(0.0);
    column.into_iter().map(|v| v.unwrap_or(fill)).collect()
}
