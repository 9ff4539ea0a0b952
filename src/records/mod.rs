//! Record input and output: in-memory record sets, batch partitioning,
//! and CSV file loading/writing.

pub mod partition;
pub mod sink;
pub mod source;

pub use partition::BatchPartitioner;
pub use sink::write_output;
pub use source::load_records;

/// Tabular records headed for a bulk job: one header row plus zero or
/// more data rows. Rows are kept as raw field strings; no type coercion
/// happens before serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSet {
    /// Column names, in output order.
    pub header: Vec<String>,
    /// Data rows. Each row should have one field per header column.
    pub rows: Vec<Vec<String>>,
}

impl RecordSet {
    pub fn new(header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { header, rows }
    }

    /// True when there are no data rows. A header alone is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }
}
