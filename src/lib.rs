//! Asynchronous bulk job orchestration for a Salesforce-style bulk API.
//!
//! Submits large record sets (insert, update, upsert, delete, query) as
//! an asynchronous job of size-bounded batches, polls every batch to a
//! terminal state, and recombines per-batch results into a single CSV
//! document. The first error anywhere fails the whole run; nothing is
//! retried.
//!
//! # Overview
//!
//! ```no_run
//! use std::sync::Arc;
//! use bulkforce::{
//!     BulkConfig, BulkInput, BulkOrchestrator, BulkRequest, Operation,
//!     RecordSet, Session, StaticSessionProvider,
//! };
//!
//! # async fn run() -> Result<(), bulkforce::StructuredError> {
//! let session = Session::new(
//!     url::Url::parse("https://na1.example.com").unwrap(),
//!     secrecy::SecretString::from("session-token".to_string()),
//! );
//! let orchestrator = BulkOrchestrator::new(
//!     Arc::new(StaticSessionProvider::new(session)),
//!     BulkConfig::default(),
//! );
//!
//! let records = RecordSet::new(
//!     vec!["Name".to_string()],
//!     vec![vec!["Acme".to_string()]],
//! );
//! let results = orchestrator
//!     .run(BulkRequest {
//!         account: "acme".to_string(),
//!         operation: Operation::Insert,
//!         object_type: "Account".to_string(),
//!         input: BulkInput::Records(records),
//!     })
//!     .await?;
//! assert!(!results.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod bulk;
pub mod config;
pub mod error;
pub mod records;
pub mod session;

pub use bulk::{
    BatchInfo, BatchOutcome, BatchState, BulkInput, BulkJobClient, BulkOrchestrator, BulkRequest,
    JobInfo, JobState, Operation, ResultAggregator, StatusPoller,
};
pub use config::BulkConfig;
pub use error::{ErrorKind, StructuredError};
pub use records::{load_records, write_output, BatchPartitioner, RecordSet};
pub use session::{CachedSessionProvider, Session, SessionProvider, StaticSessionProvider};
