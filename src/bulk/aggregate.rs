//! Result aggregation across batches.
//!
//! Batch results come back as CSV fragments, each with its own header
//! row. Aggregation concatenates them in submission order into a single
//! document with one header: the first fragment is kept whole and every
//! later fragment contributes only its data rows.
//!
//! Ingest results always carry the fixed header the remote system emits;
//! query results repeat the header of the query's column list, so later
//! fragments drop their first line wholesale.

use tracing::info;

use crate::bulk::client::{redact_id, BulkJobClient};
use crate::error::StructuredError;

/// Header row of every ingest batch result, exactly as the remote
/// system emits it (quoted, no trailing newline).
const INGEST_RESULT_HEADER: &[u8] = b"\"Id\",\"Success\",\"Created\",\"Error\"";

/// Combines per-batch results into one CSV document.
pub struct ResultAggregator {
    client: BulkJobClient,
}

impl ResultAggregator {
    pub fn new(client: BulkJobClient) -> Self {
        Self { client }
    }

    /// Fetches and concatenates the results of `batch_ids` in order.
    ///
    /// # Errors
    ///
    /// `AggregationError` when a result fetch fails. Aggregation never
    /// retries: a single missing fragment fails the whole collection.
    pub async fn collect(
        &self,
        job_id: &str,
        batch_ids: &[String],
    ) -> Result<Vec<u8>, StructuredError> {
        let output = if self.client.operation().is_query() {
            self.collect_query(job_id, batch_ids).await?
        } else {
            self.collect_ingest(job_id, batch_ids).await?
        };

        info!(
            "[BULK] aggregated {} batches for job {}: {} bytes",
            batch_ids.len(),
            redact_id(job_id),
            output.len()
        );

        Ok(output)
    }

    /// Ingest aggregation: one result payload per batch.
    async fn collect_ingest(
        &self,
        job_id: &str,
        batch_ids: &[String],
    ) -> Result<Vec<u8>, StructuredError> {
        let mut output = Vec::new();

        for batch_id in batch_ids {
            let payload = self.client.batch_result(job_id, batch_id).await?;
            append_fragment(&mut output, &payload, |fragment| {
                strip_fixed_header(fragment, INGEST_RESULT_HEADER)
            });
        }

        Ok(output)
    }

    /// Query aggregation: each batch resolves to one or more result sets,
    /// each fetched separately.
    async fn collect_query(
        &self,
        job_id: &str,
        batch_ids: &[String],
    ) -> Result<Vec<u8>, StructuredError> {
        let mut output = Vec::new();

        for batch_id in batch_ids {
            let result_ids = self.client.batch_result_ids(job_id, batch_id).await?;
            for result_id in &result_ids {
                let payload = self
                    .client
                    .batch_result_content(job_id, batch_id, result_id)
                    .await?;
                append_fragment(&mut output, &payload, skip_first_line);
            }
        }

        Ok(output)
    }
}

/// Appends a fragment to the accumulated output.
///
/// The first fragment is copied verbatim; later fragments pass through
/// `strip` to drop their header. A newline is inserted when the previous
/// fragment did not end with one, so rows never run together.
fn append_fragment<'a>(
    output: &mut Vec<u8>,
    payload: &'a [u8],
    strip: impl Fn(&'a [u8]) -> &'a [u8],
) {
    let fragment = if output.is_empty() {
        payload
    } else {
        strip(payload)
    };

    if fragment.is_empty() {
        return;
    }

    if !output.is_empty() && output.last() != Some(&b'\n') {
        output.push(b'\n');
    }

    output.extend_from_slice(fragment);
}

/// Drops a known header from the start of a fragment, including the line
/// terminator. Fragments that do not start with the header are returned
/// unchanged.
fn strip_fixed_header<'a>(fragment: &'a [u8], header: &[u8]) -> &'a [u8] {
    if !fragment.starts_with(header) {
        return fragment;
    }

    let rest = &fragment[header.len()..];
    if rest.starts_with(b"\r\n") {
        &rest[2..]
    } else if rest.starts_with(b"\n") {
        &rest[1..]
    } else if rest.is_empty() {
        rest
    } else {
        // Header text is a prefix of a longer first line; keep it.
        fragment
    }
}

/// Drops everything up to and including the first newline.
fn skip_first_line(fragment: &[u8]) -> &[u8] {
    match fragment.iter().position(|&b| b == b'\n') {
        Some(pos) => &fragment[pos + 1..],
        None => &[],
    }
}
