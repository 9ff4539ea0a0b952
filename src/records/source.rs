//! Loading records from CSV files.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use csv::ReaderBuilder;
use tracing::info;

use crate::error::StructuredError;
use crate::records::RecordSet;

/// Reads a CSV file into a [`RecordSet`].
///
/// Parsing runs on a blocking thread; quoted fields with embedded commas
/// and newlines are handled by the `csv` crate. A file with a header row
/// and no data rows loads as an empty record set.
///
/// # Errors
///
/// `InternalError` when the file cannot be opened or parsed.
pub async fn load_records(path: &Path) -> Result<RecordSet, StructuredError> {
    let path = path.to_owned();

    let records = tokio::task::spawn_blocking(move || load_records_blocking(&path))
        .await
        .map_err(|e| StructuredError::internal(format!("Task join error: {}", e)))??;

    info!(
        "[RECORDS] loaded {} data rows ({} columns)",
        records.len(),
        records.header.len()
    );

    Ok(records)
}

fn load_records_blocking(path: &Path) -> Result<RecordSet, StructuredError> {
    let file = File::open(path)
        .map_err(|e| StructuredError::internal(format!("Failed to open input file: {}", e)))?;

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(BufReader::new(file));

    let mut header: Vec<String> = reader
        .headers()
        .map_err(|e| StructuredError::internal(format!("Failed to read CSV header: {}", e)))?
        .iter()
        .map(str::to_string)
        .collect();

    if header.is_empty() {
        return Err(StructuredError::internal("CSV file has no header row"));
    }

    // Some exporters leave a BOM on the first column name.
    if let Some(first) = header.first_mut() {
        *first = first.trim_start_matches('\u{feff}').to_string();
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result
            .map_err(|e| StructuredError::internal(format!("Failed to read CSV record: {}", e)))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(RecordSet::new(header, rows))
}
