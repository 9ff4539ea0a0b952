//! Batch status polling.
//!
//! Polls a batch's status endpoint until it reaches a terminal state,
//! with a fixed interval between checks. Polling stops early when the
//! caller's cancellation token fires or an optional deadline elapses.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bulk::client::{redact_id, BulkJobClient};
use crate::bulk::BatchState;
use crate::error::{ErrorKind, StructuredError};

/// Terminal outcome of a polled batch.
///
/// `Failed` is a successful poll of an unsuccessful batch; only errors
/// talking to the status endpoint surface as `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// The batch completed and its results are ready.
    Completed,
    /// The batch reached `Failed` or `NotProcessed`.
    Failed {
        /// Failure detail from the status endpoint, if any.
        message: String,
    },
}

/// Polls batch status until terminal, cancelled, or past the deadline.
pub struct StatusPoller {
    client: BulkJobClient,
    interval: Duration,
    deadline: Option<Duration>,
    cancel: CancellationToken,
}

impl StatusPoller {
    pub fn new(
        client: BulkJobClient,
        interval: Duration,
        deadline: Option<Duration>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            interval,
            deadline,
            cancel,
        }
    }

    /// Polls until the batch is terminal.
    ///
    /// # Errors
    ///
    /// - `StatusError` when a status request is rejected or the deadline
    ///   elapses before the batch is terminal
    /// - `OperationCancelled` when the cancellation token fires
    pub async fn await_terminal(
        &self,
        job_id: &str,
        batch_id: &str,
    ) -> Result<BatchOutcome, StructuredError> {
        let started = Instant::now();

        loop {
            if self.cancel.is_cancelled() {
                return Err(StructuredError::cancelled());
            }

            if let Some(deadline) = self.deadline {
                if started.elapsed() >= deadline {
                    warn!(
                        "[BULK] polling deadline elapsed for batch {} after {:?}",
                        redact_id(batch_id),
                        deadline
                    );
                    return Err(StructuredError::new(
                        ErrorKind::Status,
                        format!(
                            "Polling deadline of {:?} elapsed before batch reached a terminal state",
                            deadline
                        ),
                    ));
                }
            }

            let info = self.client.batch_status(job_id, batch_id).await?;

            match info.state {
                BatchState::Completed => {
                    info!("[BULK] batch {} completed", redact_id(batch_id));
                    return Ok(BatchOutcome::Completed);
                }
                BatchState::Failed => {
                    return Ok(BatchOutcome::Failed {
                        message: info
                            .state_message
                            .unwrap_or_else(|| "Batch failed without a state message".to_string()),
                    });
                }
                BatchState::NotProcessed => {
                    return Ok(BatchOutcome::Failed {
                        message: "Batch was not processed".to_string(),
                    });
                }
                BatchState::Queued | BatchState::InProgress | BatchState::Unknown => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            return Err(StructuredError::cancelled());
                        }
                        _ = tokio::time::sleep(self.interval) => {}
                    }
                }
            }
        }
    }
}
