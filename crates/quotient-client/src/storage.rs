use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use quotient_core::error::AppError;
use quotient_core::traits::BlobStore;
use reqwest::Client;
use url::Url;

/// Blob store over a local directory. Paths are relative to `root` and may
/// not escape it.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, AppError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.trim().is_empty() || escapes {
            return Err(AppError::StorageError(format!(
                "Path '{path}' must be relative and stay inside the storage root"
            )));
        }
        Ok(self.root.join(relative))
    }
}

impl BlobStore for FsBlobStore {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, AppError> {
        let full = self.resolve(path)?;
        let bytes = tokio::fs::read(&full).await.map_err(|e| {
            AppError::StorageError(format!("Failed to read {}: {e}", full.display()))
        })?;
        tracing::debug!(path = %full.display(), bytes = bytes.len(), "Read blob from disk");
        Ok(bytes)
    }
}

/// Blob store that GETs `{base_url}/{path}`.
#[derive(Clone)]
pub struct HttpBlobStore {
    client: Client,
    base_url: Url,
}

impl HttpBlobStore {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        Self::with_timeout(base_url, Duration::from_secs(60))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        // A trailing slash makes `join` append instead of replacing the last segment.
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|e| AppError::ConfigError(format!("Invalid storage URL '{base_url}': {e}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    fn resolve(&self, path: &str) -> Result<Url, AppError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| AppError::StorageError(format!("Invalid blob path '{path}': {e}")))
    }
}

impl BlobStore for HttpBlobStore {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, AppError> {
        let url = self.resolve(path)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| AppError::StorageError(format!("Failed to fetch {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::StorageError(format!(
                "HTTP {} for {url}",
                status.as_u16()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::StorageError(format!("Failed to read body of {url}: {e}")))?;
        Ok(bytes.to_vec())
    }
}
