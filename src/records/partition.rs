//! Batch payload partitioning.
//!
//! Splits a record set into CSV payloads that stay within the configured
//! row and byte bounds. Every payload repeats the header row. Thresholds
//! are checked before each append, so a payload can exceed the byte
//! bound by at most one serialized row; the row bound is exact.

use crate::config::BulkConfig;
use crate::error::StructuredError;
use crate::records::RecordSet;

/// Partitions records into size-bounded CSV batch payloads.
#[derive(Debug, Clone)]
pub struct BatchPartitioner {
    max_bytes: usize,
    max_rows: usize,
    strict_csv: bool,
}

impl BatchPartitioner {
    pub fn new(max_bytes: usize, max_rows: usize, strict_csv: bool) -> Self {
        Self {
            max_bytes,
            max_rows,
            strict_csv,
        }
    }

    pub fn from_config(config: &BulkConfig) -> Self {
        Self::new(config.max_batch_bytes, config.max_batch_rows, config.strict_csv)
    }

    /// Splits `records` into batch payloads.
    ///
    /// Input order is preserved: concatenating the payloads' data rows
    /// reproduces the input rows exactly once each. An empty record set
    /// produces no payloads.
    pub fn partition(&self, records: &RecordSet) -> Result<Vec<String>, StructuredError> {
        let header = normalize_header(&records.header);
        let header_line = self.serialize_line(&header)?;

        let mut payloads = Vec::new();
        let mut buf = header_line.clone();
        // Line count includes the header row.
        let mut lines = 1usize;

        for row in &records.rows {
            if buf.len() > self.max_bytes || lines > self.max_rows {
                payloads.push(buf);
                buf = header_line.clone();
                lines = 1;
            }
            buf.push_str(&self.serialize_line(row)?);
            lines += 1;
        }

        if lines > 1 {
            payloads.push(buf);
        }

        Ok(payloads)
    }

    /// Serializes one row to a newline-terminated CSV line.
    ///
    /// The default rendering joins fields with commas as-is. Strict mode
    /// quotes per RFC 4180 via the csv crate.
    fn serialize_line(&self, fields: &[String]) -> Result<String, StructuredError> {
        if !self.strict_csv {
            let mut line = fields.join(",");
            line.push('\n');
            return Ok(line);
        }

        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer
            .write_record(fields)
            .map_err(|e| StructuredError::internal(format!("Failed to serialize row: {}", e)))?;
        let bytes = writer
            .into_inner()
            .map_err(|e| StructuredError::internal(format!("Failed to flush row: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| StructuredError::internal(format!("Row is not valid UTF-8: {}", e)))
    }
}

/// Cleans the header row before serialization.
///
/// The first column name is stripped of a UTF-8 BOM and stray quote
/// characters, both commonly carried over from exported CSV files.
fn normalize_header(header: &[String]) -> Vec<String> {
    let mut cleaned: Vec<String> = header.to_vec();
    if let Some(first) = cleaned.first_mut() {
        *first = first
            .trim_start_matches('\u{feff}')
            .replace('"', "");
    }
    cleaned
}
