//! Bulk job lifecycle: wire types, HTTP client, polling, result
//! aggregation, and the orchestrator that ties them together.
//!
//! A run maps one [`Operation`] against one object type onto a single
//! remote job holding one or more batches. Jobs and batches are created
//! fresh for every run and discarded afterwards; only the session survives
//! across runs.

pub mod aggregate;
pub mod client;
pub mod orchestrator;
pub mod poller;

pub use aggregate::ResultAggregator;
pub use client::BulkJobClient;
pub use orchestrator::{BulkInput, BulkOrchestrator, BulkRequest};
pub use poller::{BatchOutcome, StatusPoller};

use serde::{Deserialize, Serialize};

/// Bulk operation kind. Determines payload shape and result format.
///
/// Serialized lowercase to match the wire format ("insert", "query", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Insert new records.
    Insert,
    /// Update existing records by ID.
    Update,
    /// Insert or update based on an external ID field.
    Upsert,
    /// Delete records by ID.
    Delete,
    /// Run a query expression and export the result set.
    Query,
}

impl Operation {
    /// The lowercase wire name of the operation.
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Upsert => "upsert",
            Operation::Delete => "delete",
            Operation::Query => "query",
        }
    }

    /// True for the query operation, whose payload is a query expression
    /// and whose results need two-step retrieval.
    pub fn is_query(self) -> bool {
        matches!(self, Operation::Query)
    }
}

/// Job lifecycle state.
///
/// `Open`, `Closed` and `Aborted` are driven locally; `Completed` and
/// `Failed` are reported by the remote system once all batches finish.
/// Unrecognized states map to `Unknown` rather than failing
/// deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Open,
    Closed,
    Aborted,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

/// Batch lifecycle state as reported by the remote system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchState {
    Queued,
    InProgress,
    Completed,
    Failed,
    /// The owning job was aborted before this batch ran.
    NotProcessed,
    #[serde(other)]
    Unknown,
}

impl BatchState {
    /// True once no further state transition will occur.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BatchState::Completed | BatchState::Failed | BatchState::NotProcessed
        )
    }
}

/// Job description returned by job creation and status endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    /// Identifier assigned by the remote system at creation.
    pub id: String,
    /// Current job state.
    pub state: JobState,
    /// The operation the job was created for.
    #[serde(default)]
    pub operation: Option<Operation>,
    /// The target object type.
    #[serde(default)]
    pub object_type: Option<String>,
}

/// Batch description returned by batch submission and status endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchInfo {
    /// Identifier assigned on submission.
    pub id: String,
    /// The owning job.
    pub job_id: String,
    /// Current batch state.
    pub state: BatchState,
    /// Failure detail reported alongside a `Failed` state.
    #[serde(default)]
    pub state_message: Option<String>,
}

/// Error envelope returned by the remote system on 4xx/5xx responses.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ErrorEnvelope {
    pub exception_code: String,
    pub exception_message: String,
}
