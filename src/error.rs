//! Structured error values for bulk job orchestration.
//!
//! Every fallible operation in this crate returns a [`StructuredError`]: a
//! typed, context-carrying value that records what failed (`kind`), where
//! (`url`, `status_code`) and on whose behalf (`operation`, `object_type`).
//! A `StructuredError` is terminal: it short-circuits the rest of the
//! orchestrated run and is handed back to the caller verbatim, never merged
//! into output data.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::bulk::Operation;

/// Classification of a structured error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Credential or session acquisition failed.
    Auth,
    /// The remote system rejected a job creation, batch submission, or close.
    Submission,
    /// A job or batch status check failed at the transport/HTTP level.
    Status,
    /// A batch reached the `Failed` state without a transport error.
    RemoteFailure,
    /// Fetching or recombining batch results failed.
    Aggregation,
    /// Connection-level failure before an HTTP status was available.
    Transport,
    /// The caller cancelled the operation.
    Cancelled,
    /// Local invariant violation (URL construction, serialization, I/O).
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Auth => "AuthError",
            ErrorKind::Submission => "SubmissionError",
            ErrorKind::Status => "StatusError",
            ErrorKind::RemoteFailure => "RemoteFailure",
            ErrorKind::Aggregation => "AggregationError",
            ErrorKind::Transport => "TransportError",
            ErrorKind::Cancelled => "OperationCancelled",
            ErrorKind::Internal => "InternalError",
        };
        f.write_str(name)
    }
}

/// A terminal, non-retryable error produced anywhere in the pipeline.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{kind}: {message}")]
pub struct StructuredError {
    /// What failed.
    pub kind: ErrorKind,
    /// Human-readable detail, decoded from the remote error envelope when
    /// one was available.
    pub message: String,
    /// The request URL, when the error came from an HTTP exchange.
    pub url: Option<String>,
    /// The HTTP status code, when one was received.
    pub status_code: Option<u16>,
    /// The bulk operation in flight.
    pub operation: Option<Operation>,
    /// The target object type.
    pub object_type: Option<String>,
}

impl StructuredError {
    /// Creates an error with the given kind and message and no context.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            url: None,
            status_code: None,
            operation: None,
            object_type: None,
        }
    }

    /// Shorthand for an [`ErrorKind::Internal`] error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Shorthand for an [`ErrorKind::Cancelled`] error.
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation cancelled by caller")
    }

    /// Attaches the request URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Attaches the HTTP status code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Attaches the in-flight operation and target object type.
    pub fn with_context(mut self, operation: Operation, object_type: &str) -> Self {
        self.operation = Some(operation);
        self.object_type = Some(object_type.to_string());
        self
    }
}
