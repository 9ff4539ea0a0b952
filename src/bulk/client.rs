//! HTTP client for the remote bulk job API.
//!
//! One client instance is bound to a single job's operation and object
//! type; every request carries that context so errors can report where
//! they came from.
//!
//! # Security
//!
//! - Raw record payloads are never logged
//! - Session IDs are never logged
//! - Only HTTP method, path, and status codes are logged

use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::Client;
use serde::Serialize;
use tracing::info;
use url::Url;

use crate::bulk::{BatchInfo, ErrorEnvelope, JobInfo, Operation};
use crate::error::{ErrorKind, StructuredError};
use crate::session::Session;

/// Header carrying the session ID on every bulk request.
const SESSION_HEADER: &str = "X-SFDC-Session";

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for creating a job.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateJobRequest {
    operation: Operation,
    object_type: String,
    content_type: &'static str,
}

/// Request body for changing job state (close or abort).
#[derive(Debug, Serialize)]
struct UpdateJobStateRequest {
    state: &'static str,
}

// ─────────────────────────────────────────────────────────────────────────────
// BulkJobClient
// ─────────────────────────────────────────────────────────────────────────────

/// Client for one bulk job's lifecycle against a single remote instance.
///
/// Cheap to clone: the underlying HTTP connection pool is shared.
#[derive(Clone)]
pub struct BulkJobClient {
    /// Shared HTTP client.
    http: Arc<Client>,
    /// Authenticated session for the target instance.
    session: Session,
    /// API version segment of the request path (e.g. "29.0").
    api_version: String,
    /// Operation this client's job performs.
    operation: Operation,
    /// Object type this client's job targets.
    object_type: String,
}

impl BulkJobClient {
    /// Creates a client bound to one operation and object type.
    pub fn new(
        http: Arc<Client>,
        session: Session,
        api_version: impl Into<String>,
        operation: Operation,
        object_type: impl Into<String>,
    ) -> Self {
        Self {
            http,
            session,
            api_version: api_version.into(),
            operation,
            object_type: object_type.into(),
        }
    }

    /// The operation this client was built for.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// The object type this client's job targets.
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// Creates a new job on the remote system.
    ///
    /// # Returns
    ///
    /// The job ID on success.
    ///
    /// # Errors
    ///
    /// `SubmissionError` on a rejected request, `TransportError` when the
    /// request never reached the remote system.
    pub async fn create_job(&self) -> Result<String, StructuredError> {
        let url = self.build_job_root_url()?;

        let body = CreateJobRequest {
            operation: self.operation,
            object_type: self.object_type.clone(),
            content_type: "CSV",
        };

        info!(
            "[BULK] POST /job (creating {} job for {})",
            self.operation.as_str(),
            self.object_type
        );

        let response = self
            .http
            .post(url.clone())
            .header(SESSION_HEADER, self.session.auth_header_value())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error("Job creation failed", &url, e))?;

        let status = response.status();
        info!("[BULK] POST /job -> {}", status.as_u16());

        if !status.is_success() {
            return Err(self.decode_error(ErrorKind::Submission, response, &url).await);
        }

        let job_info: JobInfo = response.json().await.map_err(|e| {
            self.contextual(
                ErrorKind::Submission,
                format!("Failed to parse job creation response: {}", e),
            )
            .with_url(url.as_str())
        })?;

        Ok(job_info.id)
    }

    /// Submits one batch payload to an open job.
    ///
    /// # Returns
    ///
    /// The batch ID assigned by the remote system.
    ///
    /// # Errors
    ///
    /// `SubmissionError` on rejection, `TransportError` on network failure.
    pub async fn submit_batch(
        &self,
        job_id: &str,
        payload: String,
    ) -> Result<String, StructuredError> {
        let url = self.build_batch_root_url(job_id)?;
        let payload_len = payload.len();

        info!(
            "[BULK] POST /job/{}/batch ({} bytes)",
            redact_id(job_id),
            payload_len
        );

        let response = self
            .http
            .post(url.clone())
            .header(SESSION_HEADER, self.session.auth_header_value())
            .header("Content-Type", "text/csv; charset=UTF-8")
            .body(payload)
            .send()
            .await
            .map_err(|e| self.transport_error("Batch submission failed", &url, e))?;

        let status = response.status();
        info!(
            "[BULK] POST /job/{}/batch -> {}",
            redact_id(job_id),
            status.as_u16()
        );

        if !status.is_success() {
            return Err(self.decode_error(ErrorKind::Submission, response, &url).await);
        }

        let batch_info: BatchInfo = response.json().await.map_err(|e| {
            self.contextual(
                ErrorKind::Submission,
                format!("Failed to parse batch submission response: {}", e),
            )
            .with_url(url.as_str())
        })?;

        Ok(batch_info.id)
    }

    /// Closes the job so no further batches can be added and the remote
    /// system starts processing.
    pub async fn close_job(&self, job_id: &str) -> Result<(), StructuredError> {
        self.update_job_state(job_id, "Closed", "closing").await
    }

    /// Aborts the job. Best-effort: the job may already be terminal.
    pub async fn abort_job(&self, job_id: &str) -> Result<(), StructuredError> {
        self.update_job_state(job_id, "Aborted", "aborting").await
    }

    /// Gets current job information.
    ///
    /// # Errors
    ///
    /// `StatusError` on a rejected request.
    pub async fn job_status(&self, job_id: &str) -> Result<JobInfo, StructuredError> {
        let url = self.build_job_url(job_id)?;

        info!("[BULK] GET /job/{} (status)", redact_id(job_id));

        let response = self
            .http
            .get(url.clone())
            .header(SESSION_HEADER, self.session.auth_header_value())
            .send()
            .await
            .map_err(|e| self.transport_error("Job status check failed", &url, e))?;

        let status = response.status();
        info!(
            "[BULK] GET /job/{} -> {}",
            redact_id(job_id),
            status.as_u16()
        );

        if !status.is_success() {
            return Err(self.decode_error(ErrorKind::Status, response, &url).await);
        }

        response.json().await.map_err(|e| {
            self.contextual(
                ErrorKind::Status,
                format!("Failed to parse job status response: {}", e),
            )
            .with_url(url.as_str())
        })
    }

    /// Gets current batch information.
    ///
    /// # Errors
    ///
    /// `StatusError` on a rejected request.
    pub async fn batch_status(
        &self,
        job_id: &str,
        batch_id: &str,
    ) -> Result<BatchInfo, StructuredError> {
        let url = self.build_batch_url(job_id, batch_id)?;

        info!(
            "[BULK] GET /job/{}/batch/{} (status)",
            redact_id(job_id),
            redact_id(batch_id)
        );

        let response = self
            .http
            .get(url.clone())
            .header(SESSION_HEADER, self.session.auth_header_value())
            .send()
            .await
            .map_err(|e| self.transport_error("Batch status check failed", &url, e))?;

        let status = response.status();
        info!(
            "[BULK] GET /job/{}/batch/{} -> {}",
            redact_id(job_id),
            redact_id(batch_id),
            status.as_u16()
        );

        if !status.is_success() {
            return Err(self.decode_error(ErrorKind::Status, response, &url).await);
        }

        response.json().await.map_err(|e| {
            self.contextual(
                ErrorKind::Status,
                format!("Failed to parse batch status response: {}", e),
            )
            .with_url(url.as_str())
        })
    }

    /// Lists result set IDs for a completed query batch.
    ///
    /// Query results need two steps: this call returns the IDs, then
    /// [`batch_result_content`](Self::batch_result_content) fetches each
    /// result's payload.
    pub async fn batch_result_ids(
        &self,
        job_id: &str,
        batch_id: &str,
    ) -> Result<Vec<String>, StructuredError> {
        let url = self.build_result_root_url(job_id, batch_id)?;

        info!(
            "[BULK] GET /job/{}/batch/{}/result (result list)",
            redact_id(job_id),
            redact_id(batch_id)
        );

        let response = self
            .http
            .get(url.clone())
            .header(SESSION_HEADER, self.session.auth_header_value())
            .send()
            .await
            .map_err(|e| self.transport_error("Result list retrieval failed", &url, e))?;

        let status = response.status();
        info!(
            "[BULK] GET /job/{}/batch/{}/result -> {}",
            redact_id(job_id),
            redact_id(batch_id),
            status.as_u16()
        );

        if !status.is_success() {
            return Err(
                self.decode_error(ErrorKind::Aggregation, response, &url).await
            );
        }

        response.json().await.map_err(|e| {
            self.contextual(
                ErrorKind::Aggregation,
                format!("Failed to parse result list response: {}", e),
            )
            .with_url(url.as_str())
        })
    }

    /// Fetches the result payload of a completed ingest batch.
    pub async fn batch_result(
        &self,
        job_id: &str,
        batch_id: &str,
    ) -> Result<Vec<u8>, StructuredError> {
        let url = self.build_result_root_url(job_id, batch_id)?;
        self.fetch_result_bytes(url, job_id, batch_id).await
    }

    /// Fetches one result set of a completed query batch.
    pub async fn batch_result_content(
        &self,
        job_id: &str,
        batch_id: &str,
        result_id: &str,
    ) -> Result<Vec<u8>, StructuredError> {
        let url = self.build_result_url(job_id, batch_id, result_id)?;
        self.fetch_result_bytes(url, job_id, batch_id).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Private Helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Streams a result body into memory.
    async fn fetch_result_bytes(
        &self,
        url: Url,
        job_id: &str,
        batch_id: &str,
    ) -> Result<Vec<u8>, StructuredError> {
        info!(
            "[BULK] GET {} (downloading)",
            redact_path(&url, job_id, batch_id)
        );

        let response = self
            .http
            .get(url.clone())
            .header(SESSION_HEADER, self.session.auth_header_value())
            .send()
            .await
            .map_err(|e| self.transport_error("Result download failed", &url, e))?;

        let status = response.status();
        info!(
            "[BULK] GET {} -> {}",
            redact_path(&url, job_id, batch_id),
            status.as_u16()
        );

        if !status.is_success() {
            return Err(
                self.decode_error(ErrorKind::Aggregation, response, &url).await
            );
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                self.contextual(
                    ErrorKind::Aggregation,
                    format!("Error reading result stream: {}", e),
                )
                .with_url(url.as_str())
            })?;
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }

    /// Posts a state change ("Closed" or "Aborted") to the job.
    async fn update_job_state(
        &self,
        job_id: &str,
        state: &'static str,
        verb: &str,
    ) -> Result<(), StructuredError> {
        let url = self.build_job_url(job_id)?;
        let body = UpdateJobStateRequest { state };

        info!("[BULK] POST /job/{} ({})", redact_id(job_id), verb);

        let response = self
            .http
            .post(url.clone())
            .header(SESSION_HEADER, self.session.auth_header_value())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error("Job state update failed", &url, e))?;

        let status = response.status();
        info!(
            "[BULK] POST /job/{} -> {}",
            redact_id(job_id),
            status.as_u16()
        );

        if !status.is_success() {
            return Err(self.decode_error(ErrorKind::Submission, response, &url).await);
        }

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // URL Builders
    // ─────────────────────────────────────────────────────────────────────────

    /// Builds the job collection URL: /services/async/{ver}/job
    fn build_job_root_url(&self) -> Result<Url, StructuredError> {
        self.join(&format!("/services/async/{}/job", self.api_version))
    }

    /// Builds a specific job URL: /services/async/{ver}/job/{job_id}
    fn build_job_url(&self, job_id: &str) -> Result<Url, StructuredError> {
        self.join(&format!("/services/async/{}/job/{}", self.api_version, job_id))
    }

    /// Builds the batch collection URL: .../job/{job_id}/batch
    fn build_batch_root_url(&self, job_id: &str) -> Result<Url, StructuredError> {
        self.join(&format!(
            "/services/async/{}/job/{}/batch",
            self.api_version, job_id
        ))
    }

    /// Builds a specific batch URL: .../job/{job_id}/batch/{batch_id}
    fn build_batch_url(&self, job_id: &str, batch_id: &str) -> Result<Url, StructuredError> {
        self.join(&format!(
            "/services/async/{}/job/{}/batch/{}",
            self.api_version, job_id, batch_id
        ))
    }

    /// Builds the batch result URL: .../batch/{batch_id}/result
    fn build_result_root_url(
        &self,
        job_id: &str,
        batch_id: &str,
    ) -> Result<Url, StructuredError> {
        self.join(&format!(
            "/services/async/{}/job/{}/batch/{}/result",
            self.api_version, job_id, batch_id
        ))
    }

    /// Builds a query result set URL: .../result/{result_id}
    fn build_result_url(
        &self,
        job_id: &str,
        batch_id: &str,
        result_id: &str,
    ) -> Result<Url, StructuredError> {
        self.join(&format!(
            "/services/async/{}/job/{}/batch/{}/result/{}",
            self.api_version, job_id, batch_id, result_id
        ))
    }

    fn join(&self, path: &str) -> Result<Url, StructuredError> {
        self.session
            .instance_url()
            .join(path)
            .map_err(|e| StructuredError::internal(format!("Failed to build URL: {}", e)))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Error Handling
    // ─────────────────────────────────────────────────────────────────────────

    /// Attaches this client's operation and object type to a new error.
    fn contextual(&self, kind: ErrorKind, message: impl Into<String>) -> StructuredError {
        StructuredError::new(kind, message).with_context(self.operation, &self.object_type)
    }

    /// Maps a send failure to a `TransportError`.
    fn transport_error(&self, what: &str, url: &Url, err: reqwest::Error) -> StructuredError {
        self.contextual(ErrorKind::Transport, format!("{}: {}", what, err))
            .with_url(url.as_str())
    }

    /// Decodes a non-success response into a structured error.
    ///
    /// The remote system reports errors as a `{exceptionCode,
    /// exceptionMessage}` envelope; anything else falls back to the HTTP
    /// status line.
    async fn decode_error(
        &self,
        kind: ErrorKind,
        response: reqwest::Response,
        url: &Url,
    ) -> StructuredError {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("Unable to read error body"));

        let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => format!(
                "[{}] {}",
                envelope.exception_code, envelope.exception_message
            ),
            Err(_) => format!(
                "HTTP {} - {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown error")
            ),
        };

        self.contextual(kind, message)
            .with_url(url.as_str())
            .with_status(status.as_u16())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Redacts a job or batch ID for logging (shows first 8 chars).
pub(crate) fn redact_id(id: &str) -> String {
    match id.char_indices().nth(8) {
        Some((idx, _)) => format!("{}...", &id[..idx]),
        None => id.to_string(),
    }
}

/// Renders a result URL path with its IDs redacted.
fn redact_path(url: &Url, job_id: &str, batch_id: &str) -> String {
    url.path()
        .replace(job_id, &redact_id(job_id))
        .replace(batch_id, &redact_id(batch_id))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
