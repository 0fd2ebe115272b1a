//! Synthetic fallback sample
//!
//! Five consecutive hours of 10 March 2004 taken from the head of the UCI
//! file, written in the same `;`/`,` format as the real dataset.

use std::io::Write;
use std::path::{Path, PathBuf};

use airq_pipeline::UCI_COLUMNS;
use tracing::info;

use crate::errors::Result;
use crate::provider::DATASET_FILE;

const SAMPLE_DATES: [&str; 5] = ["10/03/2004"; 5];
const SAMPLE_TIMES: [&str; 5] = ["18.00.00", "19.00.00", "20.00.00", "21.00.00", "22.00.00"];

/// Sensor columns in `UCI_COLUMNS[2..]` order, one array per column.
const SAMPLE_VALUES: [[f64; 5]; 13] = [
    [2.6, 2.0, 2.2, 2.2, 1.6],
    [1360.0, 1292.0, 1402.0, 1376.0, 1272.0],
    [150.0, 112.0, 88.0, 80.0, 51.0],
    [11.9, 9.4, 9.0, 9.2, 6.5],
    [1046.0, 955.0, 939.0, 948.0, 836.0],
    [166.0, 103.0, 131.0, 172.0, 131.0],
    [1056.0, 1174.0, 1140.0, 1092.0, 1205.0],
    [113.0, 92.0, 114.0, 122.0, 116.0],
    [1692.0, 1559.0, 1555.0, 1584.0, 1490.0],
    [1268.0, 972.0, 1074.0, 1203.0, 1110.0],
    [13.6, 13.3, 11.9, 11.0, 11.2],
    [48.9, 47.7, 54.0, 60.0, 59.6],
    [0.7578, 0.7255, 0.7502, 0.7867, 0.7888],
];

/// Comma-decimal rendering, `1360.0` becomes `1360,0`.
fn comma_decimal(value: f64) -> String {
    format!("{value:?}").replace('.', ",")
}

/// Write the sample rows to any writer.
pub fn write_sample_csv<W: Write>(writer: W) -> Result<()> {
    let mut csv = csv::WriterBuilder::new().delimiter(b';').from_writer(writer);
    csv.write_record(UCI_COLUMNS)?;

    for row in 0..SAMPLE_TIMES.len() {
        let mut record = vec![SAMPLE_DATES[row].to_string(), SAMPLE_TIMES[row].to_string()];
        record.extend(SAMPLE_VALUES.iter().map(|column| comma_decimal(column[row])));
        csv.write_record(&record)?;
    }
    csv.flush()?;
    Ok(())
}

/// Create `<data_dir>/AirQualityUCI.csv` holding the sample rows.
pub fn create_sample_dataset<P: AsRef<Path>>(data_dir: P) -> Result<PathBuf> {
    let data_dir = data_dir.as_ref();
    std::fs::create_dir_all(data_dir)?;
    let path = data_dir.join(DATASET_FILE);
    let file = std::fs::File::create(&path)?;
    write_sample_csv(file)?;
    info!("Sample dataset created at {}", path.display());
    Ok(path)
}
