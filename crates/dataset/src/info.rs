use std::collections::BTreeMap;
use std::path::Path;

use airq_pipeline::raw::read_raw_table_limited;
use airq_pipeline::Cell;
use serde::Serialize;
use serde_json::Value;

use crate::errors::{DatasetError, Result};

/// Rows inspected when summarising a dataset.
const INFO_ROW_LIMIT: usize = 1000;
const SAMPLE_ROWS: usize = 5;

/// Summary of the head of a dataset file.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetInfo {
    /// (rows inspected, columns)
    pub shape: (usize, usize),
    pub columns: Vec<String>,
    /// `float64` when every present value is numeric, `object` otherwise
    pub dtypes: BTreeMap<String, &'static str>,
    pub missing_values: BTreeMap<String, usize>,
    pub sample_data: Vec<BTreeMap<String, Value>>,
}

/// Summarise the first rows of the dataset at `path`.
pub fn dataset_info<P: AsRef<Path>>(path: P) -> Result<DatasetInfo> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(DatasetError::NotFound(path.display().to_string()));
    }

    let table = read_raw_table_limited(path, Some(INFO_ROW_LIMIT))?;

    let mut dtypes = BTreeMap::new();
    let mut missing_values = BTreeMap::new();
    for (idx, column) in table.columns.iter().enumerate() {
        let cells = table.rows.iter().map(|row| &row[idx]);
        let missing = cells.clone().filter(|cell| cell.is_missing()).count();
        let textual = cells.clone().any(|cell| matches!(cell, Cell::Text(_)));
        missing_values.insert(column.clone(), missing);
        dtypes.insert(column.clone(), if textual { "object" } else { "float64" });
    }

    let sample_data = table
        .rows
        .iter()
        .take(SAMPLE_ROWS)
        .map(|row| {
            table
                .columns
                .iter()
                .zip(row)
                .map(|(column, cell)| (column.clone(), cell_to_json(cell)))
                .collect()
        })
        .collect();

    Ok(DatasetInfo {
        shape: (table.len(), table.columns.len()),
        columns: table.columns,
        dtypes,
        missing_values,
        sample_data,
    })
}

fn cell_to_json(cell: &Cell) -> Value {
    match cell {
        Cell::Missing => Value::Null,
        Cell::Number(value) => serde_json::Number::from_f64(*value)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Cell::Text(text) => Value::String(text.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::create_sample_dataset;

    #[test]
    fn test_sample_info() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = create_sample_dataset(dir.path())?;

        let info = dataset_info(&path)?;
        assert_eq!(info.shape, (5, 15));
        assert_eq!(info.dtypes["Date"], "object");
        assert_eq!(info.dtypes["CO(GT)"], "float64");
        assert!(info.missing_values.values().all(|&count| count == 0));
        assert_eq!(info.sample_data.len(), 5);
        assert_eq!(info.sample_data[0]["CO(GT)"], serde_json::json!(2.6));
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let err = dataset_info("/nonexistent/AirQualityUCI.csv").unwrap_err();
        assert!(matches!(err, DatasetError::NotFound(_)));
    }
}
