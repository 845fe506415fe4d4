//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks with `Arc<Mutex<_>>` state so tests can assert on
//! recorded calls after the service under test has used a clone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::job::{JobStatus, ParsingJob};
use crate::traits::{BlobStore, DocumentIntelligence};

// ---------------------------------------------------------------------------
// MockBlobStore
// ---------------------------------------------------------------------------

/// In-memory blob store keyed by path. Unknown paths are a storage error.
#[derive(Clone, Default)]
pub struct MockBlobStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fetched: Arc<Mutex<Vec<String>>>,
}

impl MockBlobStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_blob(path: &str, bytes: Vec<u8>) -> Self {
        let store = Self::default();
        store.blobs.lock().unwrap().insert(path.to_string(), bytes);
        store
    }

    /// Paths requested so far, in order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

impl BlobStore for MockBlobStore {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, AppError> {
        self.fetched.lock().unwrap().push(path.to_string());
        self.blobs
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| AppError::StorageError(format!("no blob at {path}")))
    }
}

// ---------------------------------------------------------------------------
// MockIntelligence
// ---------------------------------------------------------------------------

/// Document service that answers from canned values and records calls.
#[derive(Clone)]
pub struct MockIntelligence {
    job_id: String,
    result: String,
    wait_error: Arc<Mutex<Option<AppError>>>,
    hang_on_wait: bool,
    calls: Arc<Mutex<Vec<String>>>,
    uploads: Arc<Mutex<Vec<String>>>,
}

impl MockIntelligence {
    pub fn new(job_id: &str, result: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            result: result.to_string(),
            wait_error: Arc::new(Mutex::new(None)),
            hang_on_wait: false,
            calls: Arc::new(Mutex::new(Vec::new())),
            uploads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The next wait fails with `error`.
    pub fn with_wait_error(self, error: AppError) -> Self {
        *self.wait_error.lock().unwrap() = Some(error);
        self
    }

    /// Waiting never completes on its own; only cancellation ends it.
    pub fn hang_on_wait(mut self) -> Self {
        self.hang_on_wait = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// File names of uploaded documents.
    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

impl DocumentIntelligence for MockIntelligence {
    async fn upload_document(
        &self,
        file_name: &str,
        _bytes: Vec<u8>,
        _cancel: &CancellationToken,
    ) -> Result<ParsingJob, AppError> {
        self.calls.lock().unwrap().push("upload".into());
        self.uploads.lock().unwrap().push(file_name.to_string());
        Ok(ParsingJob::pending(&self.job_id))
    }

    async fn wait_for_completion(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ParsingJob, AppError> {
        self.calls.lock().unwrap().push(format!("wait:{job_id}"));
        if self.hang_on_wait {
            cancel.cancelled().await;
            return Err(AppError::Cancelled);
        }
        if let Some(error) = self.wait_error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(ParsingJob {
            id: job_id.to_string(),
            status: JobStatus::Success,
        })
    }

    async fn get_results(
        &self,
        job_id: &str,
        _cancel: &CancellationToken,
    ) -> Result<String, AppError> {
        self.calls.lock().unwrap().push(format!("results:{job_id}"));
        Ok(self.result.clone())
    }
}
