//! End-to-end bulk run pipeline.
//!
//! A run is: acquire session → partition input → create job → submit
//! every batch → close job → poll every batch to a terminal state →
//! aggregate results. The first error anywhere stops the run; remaining
//! payloads are never submitted and no partial aggregation happens. On
//! failure or cancellation the job is aborted best-effort so the remote
//! system stops processing queued batches.

use std::path::Path;
use std::sync::Arc;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bulk::client::{redact_id, BulkJobClient};
use crate::bulk::poller::{BatchOutcome, StatusPoller};
use crate::bulk::{Operation, ResultAggregator};
use crate::config::BulkConfig;
use crate::error::{ErrorKind, StructuredError};
use crate::records::{write_output, BatchPartitioner, RecordSet};
use crate::session::SessionProvider;

/// Input for one bulk run.
///
/// Ingest operations take records; the query operation takes the query
/// expression verbatim. Combining multiple query expressions is the
/// caller's concern.
#[derive(Debug, Clone)]
pub enum BulkInput {
    Records(RecordSet),
    Query(String),
}

/// One bulk run: what to do, against which object, for which account.
#[derive(Debug, Clone)]
pub struct BulkRequest {
    /// Account key handed to the session provider.
    pub account: String,
    pub operation: Operation,
    pub object_type: String,
    pub input: BulkInput,
}

/// Drives a whole bulk run against one remote instance.
pub struct BulkOrchestrator {
    http: Arc<Client>,
    sessions: Arc<dyn SessionProvider>,
    config: BulkConfig,
}

impl BulkOrchestrator {
    pub fn new(sessions: Arc<dyn SessionProvider>, config: BulkConfig) -> Self {
        Self {
            http: Arc::new(Client::new()),
            sessions,
            config,
        }
    }

    /// Replaces the HTTP client, keeping its connection pool shared with
    /// the rest of the application.
    pub fn with_http(mut self, http: Arc<Client>) -> Self {
        self.http = http;
        self
    }

    /// Runs a request to completion and returns the aggregated result
    /// bytes.
    pub async fn run(&self, request: BulkRequest) -> Result<Vec<u8>, StructuredError> {
        self.run_with_cancel(request, CancellationToken::new()).await
    }

    /// Runs a request and writes the aggregated result to `output_path`.
    pub async fn run_to_file(
        &self,
        request: BulkRequest,
        output_path: &Path,
    ) -> Result<(), StructuredError> {
        let output = self.run(request).await?;
        write_output(output_path, output).await
    }

    /// Runs a request, honoring `cancel` before each submission and at
    /// every polling iteration.
    ///
    /// After a submission rejection, batch failure, or cancellation, no
    /// further batch is submitted, polled, or fetched; the one exception
    /// is a single best-effort abort request so the remote system stops
    /// processing already-queued batches.
    ///
    /// # Errors
    ///
    /// The first `StructuredError` of the run, including
    /// `OperationCancelled` when the token fires mid-run. A batch the
    /// remote system marks `Failed` surfaces as `RemoteFailure`.
    pub async fn run_with_cancel(
        &self,
        request: BulkRequest,
        cancel: CancellationToken,
    ) -> Result<Vec<u8>, StructuredError> {
        let payloads = self.prepare_payloads(&request)?;

        let session = self.sessions.acquire(&request.account).await?;
        let client = BulkJobClient::new(
            Arc::clone(&self.http),
            session,
            self.config.api_version.clone(),
            request.operation,
            request.object_type.clone(),
        );

        let job_id = client.create_job().await?;
        info!(
            "[BULK] job {} created: {} {} in {} batches",
            redact_id(&job_id),
            request.operation.as_str(),
            request.object_type,
            payloads.len()
        );

        let batch_ids = self
            .submit_all(&client, &job_id, payloads, &cancel)
            .await?;

        client.close_job(&job_id).await?;

        self.await_all(&client, &job_id, &batch_ids, &cancel).await?;

        ResultAggregator::new(client).collect(&job_id, &batch_ids).await
    }

    /// Turns the request input into ordered batch payloads.
    ///
    /// Runs before any network traffic: an empty or mismatched input is
    /// rejected without creating a job.
    fn prepare_payloads(&self, request: &BulkRequest) -> Result<Vec<String>, StructuredError> {
        let mismatch = |message: &str| {
            Err(StructuredError::new(ErrorKind::Submission, message)
                .with_context(request.operation, &request.object_type))
        };

        match (&request.input, request.operation.is_query()) {
            (BulkInput::Query(soql), true) => Ok(vec![soql.clone()]),
            (BulkInput::Records(records), false) => {
                if records.is_empty() {
                    return mismatch("Record set has no data rows; nothing to submit");
                }
                BatchPartitioner::from_config(&self.config).partition(records)
            }
            (BulkInput::Records(_), true) => {
                mismatch("The query operation takes a query expression, not records")
            }
            (BulkInput::Query(_), false) => {
                mismatch("Ingest operations take records, not a query expression")
            }
        }
    }

    /// Submits payloads in order. The first rejection aborts the job and
    /// leaves the remaining payloads unsubmitted.
    async fn submit_all(
        &self,
        client: &BulkJobClient,
        job_id: &str,
        payloads: Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, StructuredError> {
        let mut batch_ids = Vec::with_capacity(payloads.len());

        for payload in payloads {
            if cancel.is_cancelled() {
                abort_quietly(client, job_id).await;
                return Err(StructuredError::cancelled());
            }
            match client.submit_batch(job_id, payload).await {
                Ok(batch_id) => batch_ids.push(batch_id),
                Err(e) => {
                    abort_quietly(client, job_id).await;
                    return Err(e);
                }
            }
        }

        Ok(batch_ids)
    }

    /// Polls every batch to a terminal state.
    ///
    /// Polling runs concurrently, one task per batch, but outcomes are
    /// examined in submission order so the error surfaced is deterministic.
    /// The first failure cancels the remaining pollers and aborts the job.
    async fn await_all(
        &self,
        client: &BulkJobClient,
        job_id: &str,
        batch_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<(), StructuredError> {
        let poll_cancel = cancel.child_token();

        let handles: Vec<_> = batch_ids
            .iter()
            .map(|batch_id| {
                let poller = StatusPoller::new(
                    client.clone(),
                    self.config.poll_interval,
                    self.config.poll_deadline,
                    poll_cancel.clone(),
                );
                let job_id = job_id.to_string();
                let batch_id = batch_id.clone();
                tokio::spawn(async move { poller.await_terminal(&job_id, &batch_id).await })
            })
            .collect();

        for (batch_id, handle) in batch_ids.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    poll_cancel.cancel();
                    abort_quietly(client, job_id).await;
                    return Err(StructuredError::internal(format!(
                        "Polling task failed: {}",
                        e
                    )));
                }
            };

            match outcome {
                Ok(BatchOutcome::Completed) => {}
                Ok(BatchOutcome::Failed { message }) => {
                    poll_cancel.cancel();
                    abort_quietly(client, job_id).await;
                    return Err(StructuredError::new(
                        ErrorKind::RemoteFailure,
                        format!("Batch {} failed: {}", batch_id, message),
                    )
                    .with_context(client.operation(), client.object_type()));
                }
                Err(e) => {
                    poll_cancel.cancel();
                    abort_quietly(client, job_id).await;
                    return Err(e);
                }
            }
        }

        Ok(())
    }
}

/// Aborts the job, logging instead of failing: the run is already on its
/// error path and the original error must survive.
async fn abort_quietly(client: &BulkJobClient, job_id: &str) {
    if let Err(e) = client.abort_job(job_id).await {
        warn!("[BULK] failed to abort job {}: {}", redact_id(job_id), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Session, StaticSessionProvider};
    use secrecy::SecretString;
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{body_json, body_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const JOB_PATH: &str = "/services/async/29.0/job";

    fn orchestrator(mock_url: &str, config: BulkConfig) -> BulkOrchestrator {
        let session = Session::new(
            Url::parse(mock_url).unwrap(),
            SecretString::from("test_session".to_string()),
        );
        BulkOrchestrator::new(Arc::new(StaticSessionProvider::new(session)), config)
    }

    fn fast_config() -> BulkConfig {
        BulkConfig::default().poll_interval(Duration::from_millis(5))
    }

    fn insert_request(rows: usize) -> BulkRequest {
        let data = (0..rows)
            .map(|i| vec![format!("{:03}", i), format!("Account {}", i)])
            .collect();
        BulkRequest {
            account: "acme".to_string(),
            operation: Operation::Insert,
            object_type: "Account".to_string(),
            input: BulkInput::Records(RecordSet::new(
                vec!["Id".to_string(), "Name".to_string()],
                data,
            )),
        }
    }

    fn job_body(state: &str) -> serde_json::Value {
        serde_json::json!({ "id": "750x001", "state": state })
    }

    fn batch_body(id: &str, state: &str) -> serde_json::Value {
        serde_json::json!({ "id": id, "jobId": "750x001", "state": state })
    }

    async fn mount_create_job(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(JOB_PATH))
            .respond_with(ResponseTemplate::new(201).set_body_json(job_body("Open")))
            .mount(server)
            .await;
    }

    async fn mount_close_job(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(format!("{}/750x001", JOB_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(job_body("Closed")))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn insert_across_two_batches_aggregates_in_order() {
        let server = MockServer::start().await;
        let config = fast_config().max_batch_rows(2);
        let orchestrator = orchestrator(&server.uri(), config);

        mount_create_job(&server).await;
        mount_close_job(&server).await;

        // Two submissions: mocks match in mount order, so the
        // first-mounted responds first and expires after one use.
        Mock::given(method("POST"))
            .and(path(format!("{}/750x001/batch", JOB_PATH)))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(batch_body("751x001", "Queued")),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{}/750x001/batch", JOB_PATH)))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(batch_body("751x002", "Queued")),
            )
            .expect(1)
            .mount(&server)
            .await;

        for batch_id in ["751x001", "751x002"] {
            Mock::given(method("GET"))
                .and(path(format!("{}/750x001/batch/{}", JOB_PATH, batch_id)))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(batch_body(batch_id, "Completed")),
                )
                .mount(&server)
                .await;
        }

        Mock::given(method("GET"))
            .and(path(format!("{}/750x001/batch/751x001/result", JOB_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "\"Id\",\"Success\",\"Created\",\"Error\"\n\"001\",\"true\",\"true\",\"\"\n\"002\",\"true\",\"true\",\"\"\n",
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/750x001/batch/751x002/result", JOB_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "\"Id\",\"Success\",\"Created\",\"Error\"\n\"003\",\"true\",\"true\",\"\"\n",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let output = orchestrator.run(insert_request(3)).await.unwrap();
        let text = String::from_utf8(output).unwrap();

        assert_eq!(
            text.matches("\"Id\",\"Success\",\"Created\",\"Error\"").count(),
            1
        );
        assert!(text.find("\"001\"").unwrap() < text.find("\"003\"").unwrap());
    }

    #[tokio::test]
    async fn submission_rejection_stops_the_run() {
        let server = MockServer::start().await;
        let config = fast_config().max_batch_rows(2);
        let orchestrator = orchestrator(&server.uri(), config);

        mount_create_job(&server).await;
        // Abort lands on the job path after the rejection.
        Mock::given(method("POST"))
            .and(path(format!("{}/750x001", JOB_PATH)))
            .and(body_json(serde_json::json!({ "state": "Aborted" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(job_body("Aborted")))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(format!("{}/750x001/batch", JOB_PATH)))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "exceptionCode": "ExceededQuota",
                "exceptionMessage": "TotalRequests Limit exceeded."
            })))
            .expect(1)
            .mount(&server)
            .await;

        // Polling and result endpoints must never be reached.
        Mock::given(method("GET"))
            .and(path(format!("{}/750x001/batch/751x001", JOB_PATH)))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = orchestrator.run(insert_request(3)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Submission);
        assert_eq!(err.status_code, Some(400));
        assert!(err.message.contains("ExceededQuota"));
    }

    #[tokio::test]
    async fn failed_batch_is_a_remote_failure_and_skips_aggregation() {
        let server = MockServer::start().await;
        let orchestrator = orchestrator(&server.uri(), fast_config());

        mount_create_job(&server).await;
        mount_close_job(&server).await;

        Mock::given(method("POST"))
            .and(path(format!("{}/750x001/batch", JOB_PATH)))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(batch_body("751x001", "Queued")),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("{}/750x001/batch/751x001", JOB_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "751x001",
                "jobId": "750x001",
                "state": "Failed",
                "stateMessage": "InvalidBatch: bad header"
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("{}/750x001/batch/751x001/result", JOB_PATH)))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = orchestrator.run(insert_request(1)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RemoteFailure);
        assert!(err.message.contains("InvalidBatch"));
    }

    #[tokio::test]
    async fn query_run_returns_raw_result_content() {
        let server = MockServer::start().await;
        let orchestrator = orchestrator(&server.uri(), fast_config());

        let soql = "SELECT Id, Name FROM Account";

        mount_create_job(&server).await;
        mount_close_job(&server).await;

        Mock::given(method("POST"))
            .and(path(format!("{}/750x001/batch", JOB_PATH)))
            .and(body_string(soql))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(batch_body("751x001", "Queued")),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("{}/750x001/batch/751x001", JOB_PATH)))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(batch_body("751x001", "Completed")),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("{}/750x001/batch/751x001/result", JOB_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(["752x001"])))
            .expect(1)
            .mount(&server)
            .await;

        let content = "Id,Name\n001,Acme\n";
        Mock::given(method("GET"))
            .and(path(format!(
                "{}/750x001/batch/751x001/result/752x001",
                JOB_PATH
            )))
            .respond_with(ResponseTemplate::new(200).set_body_string(content))
            .expect(1)
            .mount(&server)
            .await;

        let request = BulkRequest {
            account: "acme".to_string(),
            operation: Operation::Query,
            object_type: "Account".to_string(),
            input: BulkInput::Query(soql.to_string()),
        };

        let output = orchestrator.run(request).await.unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), content);
    }

    #[tokio::test]
    async fn session_failure_surfaces_before_any_request() {
        struct RejectingProvider;

        impl crate::session::SessionProvider for RejectingProvider {
            fn acquire<'a>(
                &'a self,
                _account: &'a str,
            ) -> std::pin::Pin<
                Box<
                    dyn std::future::Future<Output = Result<Session, StructuredError>>
                        + Send
                        + 'a,
                >,
            > {
                Box::pin(async {
                    Err(StructuredError::new(
                        crate::error::ErrorKind::Auth,
                        "login rejected",
                    ))
                })
            }

            fn invalidate<'a>(
                &'a self,
                _account: &'a str,
            ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
                Box::pin(async {})
            }
        }

        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(JOB_PATH))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/750x001", JOB_PATH)))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let orchestrator =
            BulkOrchestrator::new(Arc::new(RejectingProvider), fast_config());

        let err = orchestrator.run(insert_request(1)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Auth);
        assert!(err.message.contains("login rejected"));
    }

    #[tokio::test]
    async fn empty_record_set_is_rejected_before_any_request() {
        let server = MockServer::start().await;
        let orchestrator = orchestrator(&server.uri(), fast_config());

        Mock::given(method("POST"))
            .and(path(JOB_PATH))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let err = orchestrator.run(insert_request(0)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Submission);
        assert!(err.message.contains("no data rows"));
    }

    #[tokio::test]
    async fn mismatched_input_is_rejected() {
        let server = MockServer::start().await;
        let orchestrator = orchestrator(&server.uri(), fast_config());

        let request = BulkRequest {
            account: "acme".to_string(),
            operation: Operation::Query,
            object_type: "Account".to_string(),
            input: BulkInput::Records(RecordSet::new(vec!["Id".to_string()], vec![])),
        };

        let err = orchestrator.run(request).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Submission);
        assert!(err.message.contains("query expression"));
    }

    #[tokio::test]
    async fn cancellation_during_polling_aborts_the_job() {
        let server = MockServer::start().await;
        let orchestrator = orchestrator(&server.uri(), fast_config());

        mount_create_job(&server).await;
        mount_close_job(&server).await;

        Mock::given(method("POST"))
            .and(path(format!("{}/750x001/batch", JOB_PATH)))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(batch_body("751x001", "Queued")),
            )
            .mount(&server)
            .await;

        // Batch never leaves InProgress; only cancellation ends the run.
        Mock::given(method("GET"))
            .and(path(format!("{}/750x001/batch/751x001", JOB_PATH)))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(batch_body("751x001", "InProgress")),
            )
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let err = orchestrator
            .run_with_cancel(insert_request(1), cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn run_to_file_writes_bom_prefixed_output() {
        let server = MockServer::start().await;
        let orchestrator = orchestrator(&server.uri(), fast_config());

        mount_create_job(&server).await;
        mount_close_job(&server).await;

        Mock::given(method("POST"))
            .and(path(format!("{}/750x001/batch", JOB_PATH)))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(batch_body("751x001", "Queued")),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/750x001/batch/751x001", JOB_PATH)))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(batch_body("751x001", "Completed")),
            )
            .mount(&server)
            .await;

        let body = "\"Id\",\"Success\",\"Created\",\"Error\"\n\"001\",\"true\",\"true\",\"\"\n";
        Mock::given(method("GET"))
            .and(path(format!("{}/750x001/batch/751x001/result", JOB_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let output_path = dir.path().join("results.csv");

        orchestrator
            .run_to_file(insert_request(1), &output_path)
            .await
            .unwrap();

        let bytes = std::fs::read(&output_path).unwrap();
        assert_eq!(&bytes[..3], &[0xEF, 0xBB, 0xBF]);
        assert_eq!(&bytes[3..], body.as_bytes());
    }
}
