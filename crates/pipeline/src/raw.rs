//! Raw UCI Air Quality reader
//!
//! The source file is semicolon-delimited and uses a comma as the decimal
//! separator. Cells are kept untyped until cleaning decides what each
//! column means.

use std::path::Path;

use tracing::debug;

use crate::errors::{PipelineError, Result};

/// Column schema of the UCI Air Quality file, in file order.
pub const UCI_COLUMNS: [&str; 15] = [
    "Date",
    "Time",
    "CO(GT)",
    "PT08.S1(CO)",
    "NMHC(GT)",
    "C6H6(GT)",
    "PT08.S2(NMHC)",
    "NOx(GT)",
    "PT08.S3(NOx)",
    "NO2(GT)",
    "PT08.S4(NO2)",
    "PT08.S5(O3)",
    "T",
    "RH",
    "AH",
];

/// Tokens read as an absent value.
const NA_TOKENS: [&str; 7] = ["", "NA", "N/A", "NaN", "nan", "null", "NULL"];

/// A single untyped cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Missing,
    Number(f64),
    Text(String),
}

impl Cell {
    /// Classify a raw token using comma-decimal number syntax.
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        if NA_TOKENS.contains(&token) {
            return Cell::Missing;
        }
        match parse_comma_decimal(token) {
            Some(value) => Cell::Number(value),
            None => Cell::Text(token.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    /// Numeric coercion: numbers pass through, text is parsed with a dot
    /// decimal separator, anything else is absent.
    pub fn to_numeric(&self) -> Option<f64> {
        match self {
            Cell::Missing => None,
            Cell::Number(value) => Some(*value),
            Cell::Text(text) => text.trim().parse::<f64>().ok().filter(|v| !v.is_nan()),
        }
    }

    /// Textual view used for date and time parsing.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Missing => None,
            Cell::Number(value) => Some(value.to_string()),
            Cell::Text(text) => Some(text.clone()),
        }
    }
}

fn parse_comma_decimal(token: &str) -> Option<f64> {
    if token.contains('.') {
        return None;
    }
    let normalized = token.replacen(',', ".", 1);
    normalized.parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Untyped table as read from the source file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RawTable {
    /// Build a table from header names and string rows, e.g. a single
    /// inference request.
    pub fn from_strings(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|row| {
                let mut cells: Vec<Cell> = row.iter().map(|token| Cell::parse(token)).collect();
                cells.resize(width, Cell::Missing);
                cells
            })
            .collect();
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }
}

/// Read a semicolon-delimited, comma-decimal CSV file.
///
/// Empty header cells are named `Unnamed: <index>`; short records are padded
/// with missing cells and long records truncated to the header width.
pub fn read_raw_table<P: AsRef<Path>>(path: P) -> Result<RawTable> {
    read_raw_table_limited(path, None)
}

/// Same as [`read_raw_table`], stopping after `max_rows` records.
pub fn read_raw_table_limited<P: AsRef<Path>>(path: P, max_rows: Option<usize>) -> Result<RawTable> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .has_headers(true)
        .from_path(path)
        .map_err(|err| PipelineError::Data(format!("cannot open {}: {err}", path.display())))?;

    let columns: Vec<String> = reader
        .headers()
        .map_err(|err| {
            PipelineError::Data(format!("malformed header in {}: {err}", path.display()))
        })?
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let name = name.trim_start_matches('\u{feff}');
            if name.trim().is_empty() {
                format!("Unnamed: {idx}")
            } else {
                name.to_string()
            }
        })
        .collect();

    if columns.is_empty() {
        return Err(PipelineError::Data(format!(
            "{} has no header row",
            path.display()
        )));
    }

    let width = columns.len();
    let mut rows = Vec::new();
    for record in reader.records() {
        if max_rows.is_some_and(|limit| rows.len() >= limit) {
            break;
        }
        let record = record.map_err(|err| {
            PipelineError::Data(format!("malformed record in {}: {err}", path.display()))
        })?;
        let mut cells: Vec<Cell> = record.iter().take(width).map(Cell::parse).collect();
        cells.resize(width, Cell::Missing);
        rows.push(cells);
    }

    debug!(
        "Read {} raw rows with {} columns from {}",
        rows.len(),
        width,
        path.display()
    );

    Ok(RawTable { columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_cell_parsing() {
        assert_eq!(Cell::parse("2,6"), Cell::Number(2.6));
        assert_eq!(Cell::parse("1360"), Cell::Number(1360.0));
        assert_eq!(Cell::parse("-200"), Cell::Number(-200.0));
        assert_eq!(Cell::parse(" "), Cell::Missing);
        assert_eq!(Cell::parse("18.00.00"), Cell::Text("18.00.00".to_string()));
        assert_eq!(Cell::parse("10/03/2004"), Cell::Text("10/03/2004".to_string()));
    }

    #[test]
    fn test_text_coercion() {
        assert_eq!(Cell::Text("2.5".into()).to_numeric(), Some(2.5));
        assert_eq!(Cell::Text("abc".into()).to_numeric(), None);
        assert_eq!(Cell::Missing.to_numeric(), None);
    }

    #[test]
    fn test_read_uci_layout() -> anyhow::Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "Date;Time;CO(GT);T;;")?;
        writeln!(file, "10/03/2004;18.00.00;2,6;13,6;;")?;
        writeln!(file, ";;;;;")?;
        writeln!(file, "11/03/2004;19.00.00;-200")?;
        file.flush()?;

        let table = read_raw_table(file.path())?;
        assert_eq!(
            table.columns,
            vec!["Date", "Time", "CO(GT)", "T", "Unnamed: 4", "Unnamed: 5"]
        );
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows[0][2], Cell::Number(2.6));
        assert!(table.rows[1].iter().all(Cell::is_missing));
        assert_eq!(table.rows[2].len(), 6);
        assert_eq!(table.rows[2][3], Cell::Missing);

        Ok(())
    }

    #[test]
    fn test_malformed_record_is_data_error() -> anyhow::Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "Date;Time;CO(GT)")?;
        file.write_all(b"10/03/2004;18.00.00;\xff\xfe\n")?;
        file.flush()?;

        let err = read_raw_table(file.path()).unwrap_err();
        assert!(matches!(err, PipelineError::Data(_)), "unexpected error: {err}");
        Ok(())
    }

    #[test]
    fn test_malformed_header_is_data_error() -> anyhow::Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"Date;Time;\xffCO\n10/03/2004;18.00.00;2,6\n")?;
        file.flush()?;

        let err = read_raw_table(file.path()).unwrap_err();
        assert!(matches!(err, PipelineError::Data(_)), "unexpected error: {err}");
        Ok(())
    }

    #[test]
    fn test_unreadable_source() {
        let err = read_raw_table("/nonexistent/air.csv").unwrap_err();
        assert!(matches!(err, PipelineError::Data(_)));
    }
}
