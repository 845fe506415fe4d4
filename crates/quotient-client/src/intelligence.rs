use std::sync::Arc;
use std::time::Instant;

use quotient_core::error::AppError;
use quotient_core::error_classifier::{CallFailure, parse_retry_after};
use quotient_core::job::{JobStatusReport, ParsingJob, wait_for_job};
use quotient_core::resilience::ResilientExecutor;
use quotient_core::traits::DocumentIntelligence;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::config::IntelligenceConfig;

const USER_AGENT: &str = "Quotient/0.1 (document parser)";

/// Extraction directives sent with every upload.
const UPLOAD_DIRECTIVES: &[(&str, &str)] = &[
    ("parse_mode", "parse_page_with_agent"),
    ("adaptive_long_table", "true"),
    ("outlined_table_extraction", "true"),
    ("high_res_ocr", "true"),
    ("output_tables_as_HTML", "true"),
];

/// HTTP client for the hosted document-intelligence service.
///
/// Upload, status and results each run through the shared
/// [`ResilientExecutor`] under their own service profile, so a failing
/// results endpoint does not trip the upload breaker.
#[derive(Clone)]
pub struct HttpDocumentIntelligence {
    client: Client,
    config: Arc<IntelligenceConfig>,
    executor: ResilientExecutor,
}

impl HttpDocumentIntelligence {
    pub fn new(config: IntelligenceConfig) -> Result<Self, AppError> {
        Self::with_executor(config, ResilientExecutor::default())
    }

    /// Share breakers and metrics with other clients, or inject a test clock.
    pub fn with_executor(
        config: IntelligenceConfig,
        executor: ResilientExecutor,
    ) -> Result<Self, AppError> {
        // Per-attempt timeouts come from the service profiles.
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: Arc::new(config),
            executor,
        })
    }

    pub fn config(&self) -> &IntelligenceConfig {
        &self.config
    }

    pub fn executor(&self) -> &ResilientExecutor {
        &self.executor
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.config.api_key)
            .header(ACCEPT, "application/json")
    }

    /// One resilient status check. Retries stop short of `deadline`.
    async fn check_status(
        &self,
        job_id: &str,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<JobStatusReport, AppError> {
        let url = self.url(&format!("/api/parsing/job/{job_id}"));
        self.executor
            .execute_before(&self.config.status, Some(deadline), cancel, || {
                let request = self.authorized(self.client.get(&url));
                async move {
                    let body = send(request).await?.text().await.map_err(transport_failure)?;
                    serde_json::from_str::<JobStatusReport>(&body).map_err(|e| {
                        CallFailure::Other(format!("Unreadable job status response: {e}"))
                    })
                }
            })
            .await
    }
}

// ---- Service API types ----

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(default)]
    id: Option<String>,
}

/// The results endpoint answers with bare markdown or with a JSON envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultBody {
    Raw(String),
    Wrapped { markdown: String },
}

#[derive(Deserialize)]
struct MarkdownEnvelope {
    markdown: String,
}

impl ResultBody {
    /// Classify a response body. Anything that is not a JSON object with a
    /// string `markdown` field is treated as raw text.
    pub fn from_body(body: String) -> Self {
        if body.trim_start().starts_with('{') {
            if let Ok(envelope) = serde_json::from_str::<MarkdownEnvelope>(&body) {
                return ResultBody::Wrapped {
                    markdown: envelope.markdown,
                };
            }
            tracing::debug!("Results body looked like JSON but had no markdown field; using raw text");
        }
        ResultBody::Raw(body)
    }

    pub fn into_markdown(self) -> String {
        match self {
            ResultBody::Raw(text) => text,
            ResultBody::Wrapped { markdown } => markdown,
        }
    }
}

// ---- Transport helpers ----

fn transport_failure(e: reqwest::Error) -> CallFailure {
    if e.is_timeout() {
        CallFailure::Timeout(e.to_string())
    } else if e.is_connect() {
        CallFailure::Connect(e.to_string())
    } else {
        CallFailure::Other(e.to_string())
    }
}

/// Send and turn non-2xx responses into [`CallFailure::Http`].
async fn send(request: RequestBuilder) -> Result<Response, CallFailure> {
    let response = request.send().await.map_err(transport_failure)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = response.text().await.unwrap_or_default();
    Err(CallFailure::http(status.as_u16(), body).with_retry_after(retry_after))
}

/// Re-wrap a failure with an operator-facing message. Open circuits and
/// cancellation already say what happened and pass through unchanged.
fn wrap(operation: &'static str, error: AppError) -> AppError {
    if error.is_circuit_open() || matches!(error, AppError::Cancelled) {
        return error;
    }
    tracing::error!(operation, error = %error, kind = ?error.kind(), "Document service call failed");

    let message = match &error {
        AppError::JobFailed { reason, .. } => format!("the service could not parse the document: {reason}"),
        AppError::MissingJobId(_) => "the service accepted the upload but returned no job id".to_string(),
        other => other
            .kind()
            .map(|kind| kind.human_message().to_string())
            .unwrap_or_else(|| other.to_string()),
    };

    AppError::DocumentIntelligence {
        operation,
        message,
        source: Box::new(error),
    }
}

impl DocumentIntelligence for HttpDocumentIntelligence {
    async fn upload_document(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<ParsingJob, AppError> {
        let url = self.url("/api/parsing/upload");
        tracing::debug!(%file_name, bytes = bytes.len(), "Uploading to document service");

        let body = self
            .executor
            .execute(&self.config.upload, cancel, || {
                let part = Part::bytes(bytes.clone()).file_name(file_name.to_string());
                let form = UPLOAD_DIRECTIVES
                    .iter()
                    .fold(Form::new().part("file", part), |form, (key, value)| {
                        form.text(*key, *value)
                    });
                let request = self.authorized(self.client.post(&url)).multipart(form);
                async move { send(request).await?.text().await.map_err(transport_failure) }
            })
            .await
            .map_err(|e| wrap("upload", e))?;

        let id = serde_json::from_str::<UploadResponse>(&body)
            .ok()
            .and_then(|response| response.id)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                let snippet: String = body.chars().take(200).collect();
                wrap("upload", AppError::MissingJobId(snippet))
            })?;

        tracing::info!(job_id = %id, %file_name, "Created parsing job");
        Ok(ParsingJob::pending(id))
    }

    async fn wait_for_completion(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ParsingJob, AppError> {
        wait_for_job(
            job_id,
            &self.config.poll,
            self.executor.clock().as_ref(),
            cancel,
            |deadline| self.check_status(job_id, deadline, cancel),
        )
        .await
        .map_err(|e| wrap("status", e))
    }

    async fn get_results(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AppError> {
        let url = self.url(&format!("/api/parsing/job/{job_id}/result/markdown"));

        let body = self
            .executor
            .execute(&self.config.results, cancel, || {
                let request = self.authorized(self.client.get(&url));
                async move { send(request).await?.text().await.map_err(transport_failure) }
            })
            .await
            .map_err(|e| wrap("results", e))?;

        let markdown = ResultBody::from_body(body).into_markdown();
        tracing::debug!(%job_id, chars = markdown.len(), "Fetched job results");
        Ok(markdown)
    }
}
