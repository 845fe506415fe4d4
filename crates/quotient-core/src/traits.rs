use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::job::ParsingJob;

/// Fetches document bytes by path. Failures are not retried here.
pub trait BlobStore: Send + Sync + Clone {
    fn fetch(&self, path: &str) -> impl Future<Output = Result<Vec<u8>, AppError>> + Send;
}

/// External OCR/structuring service driven through an upload -> poll -> fetch job protocol.
pub trait DocumentIntelligence: Send + Sync + Clone {
    /// Uploads the document and returns the created job.
    fn upload_document(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<ParsingJob, AppError>> + Send;

    /// Polls until the job succeeds, fails, or the polling budget runs out.
    fn wait_for_completion(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<ParsingJob, AppError>> + Send;

    /// Fetches the structured markdown/HTML produced by a successful job.
    fn get_results(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<String, AppError>> + Send;
}
