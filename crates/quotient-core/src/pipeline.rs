use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::models::{DocumentSource, ParsedContent};
use crate::parsing::parse_adaptive_table_format;
use crate::traits::{BlobStore, DocumentIntelligence};

/// Orchestrates one document: fetch bytes → upload → wait for the job →
/// fetch results → parse line items.
///
/// Generic over storage and the document service so tests run without
/// network access. Steps are not transactional: a job created before a
/// later failure is left to expire on the service side.
pub struct ParsingPipelineService<B, D>
where
    B: BlobStore,
    D: DocumentIntelligence,
{
    store: B,
    intelligence: D,
}

impl<B, D> ParsingPipelineService<B, D>
where
    B: BlobStore,
    D: DocumentIntelligence,
{
    pub fn new(store: B, intelligence: D) -> Self {
        Self {
            store,
            intelligence,
        }
    }

    pub fn intelligence(&self) -> &D {
        &self.intelligence
    }

    /// Parse a document with no deadline beyond the client's own budgets.
    pub async fn parse_document(&self, source: DocumentSource) -> Result<ParsedContent, AppError> {
        self.parse_document_with_cancel(source, &CancellationToken::new())
            .await
    }

    /// Parse a document, abandoning it once `deadline` has passed.
    ///
    /// The deadline cancels the shared token instead of dropping the future,
    /// so in-flight calls report back to their breakers before returning.
    pub async fn parse_document_with_deadline(
        &self,
        source: DocumentSource,
        deadline: Duration,
    ) -> Result<ParsedContent, AppError> {
        let cancel = CancellationToken::new();
        let timer = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(deadline).await;
                cancel.cancel();
            }
        });

        let result = self.parse_document_with_cancel(source, &cancel).await;
        timer.abort();

        if matches!(result, Err(AppError::Cancelled)) {
            tracing::warn!(deadline_secs = deadline.as_secs_f64(), "Document abandoned at deadline");
        }
        result
    }

    /// Run the pipeline until it finishes or `cancel` fires.
    pub async fn parse_document_with_cancel(
        &self,
        source: DocumentSource,
        cancel: &CancellationToken,
    ) -> Result<ParsedContent, AppError> {
        // 1. Resolve bytes
        let (file_name, bytes) = match source {
            DocumentSource::Bytes { file_name, bytes } => (file_name, bytes),
            DocumentSource::Path(path) => {
                tracing::info!(%path, "Fetching document from storage");
                let bytes = self.store.fetch(&path).await?;
                (file_name_of(&path), bytes)
            }
        };
        if bytes.is_empty() {
            return Err(AppError::InvalidInput(format!("{file_name} is empty")));
        }

        // 2. Upload
        tracing::info!(%file_name, bytes = bytes.len(), "Uploading document");
        let job = self
            .intelligence
            .upload_document(&file_name, bytes, cancel)
            .await?;

        // 3. Wait
        tracing::info!(job_id = %job.id, "Waiting for parsing job");
        let job = self.intelligence.wait_for_completion(&job.id, cancel).await?;

        // 4. Results
        let markdown = self.intelligence.get_results(&job.id, cancel).await?;
        tracing::info!(job_id = %job.id, chars = markdown.len(), "Fetched parsed document");

        // 5. Parse
        let parsed = parse_adaptive_table_format(&markdown);
        tracing::info!(
            job_id = %job.id,
            items = parsed.metadata.total_items,
            tables = parsed.metadata.total_tables,
            method = %parsed.metadata.parsing_method,
            "Document parsed"
        );
        Ok(parsed)
    }
}

/// Last path segment, used as the upload's file name.
fn file_name_of(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or("document.pdf")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_classifier::ErrorKind;
    use crate::models::ParsingMethod;
    use crate::testutil::*;

    const RESULT_HTML: &str = "<table>\
        <tr><th>Item</th><th>Description</th><th>Qty</th><th>Unit Price</th><th>Total</th></tr>\
        <tr><td>A-100</td><td>Widget</td><td>2</td><td>$5.00</td><td>$10.00</td></tr>\
        </table>";

    #[tokio::test]
    async fn bytes_source_skips_storage() {
        let store = MockBlobStore::empty();
        let intelligence = MockIntelligence::new("job-1", RESULT_HTML);
        let svc = ParsingPipelineService::new(store.clone(), intelligence.clone());

        let parsed = svc
            .parse_document(DocumentSource::bytes("quote.pdf", b"%PDF-1.7".to_vec()))
            .await
            .unwrap();

        assert_eq!(parsed.metadata.parsing_method, ParsingMethod::AdaptiveHtml);
        assert_eq!(parsed.line_items.len(), 1);
        assert_eq!(parsed.line_items[0].item_number, "A-100");
        assert!(store.fetched().is_empty());
        assert_eq!(intelligence.uploads(), vec!["quote.pdf".to_string()]);
        assert_eq!(intelligence.calls(), vec!["upload", "wait:job-1", "results:job-1"]);
    }

    #[tokio::test]
    async fn path_source_fetches_from_storage() {
        let store = MockBlobStore::with_blob("quotes/2024/acme.pdf", b"%PDF".to_vec());
        let intelligence = MockIntelligence::new("job-2", RESULT_HTML);
        let svc = ParsingPipelineService::new(store.clone(), intelligence.clone());

        svc.parse_document(DocumentSource::path("quotes/2024/acme.pdf"))
            .await
            .unwrap();

        assert_eq!(store.fetched(), vec!["quotes/2024/acme.pdf".to_string()]);
        assert_eq!(intelligence.uploads(), vec!["acme.pdf".to_string()]);
    }

    #[tokio::test]
    async fn storage_errors_propagate_without_upload() {
        let store = MockBlobStore::empty();
        let intelligence = MockIntelligence::new("job-3", RESULT_HTML);
        let svc = ParsingPipelineService::new(store, intelligence.clone());

        let err = svc
            .parse_document(DocumentSource::path("missing.pdf"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::StorageError(_)));
        assert!(intelligence.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_documents_are_rejected() {
        let svc = ParsingPipelineService::new(
            MockBlobStore::empty(),
            MockIntelligence::new("job-4", RESULT_HTML),
        );
        let err = svc
            .parse_document(DocumentSource::bytes("blank.pdf", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn job_failure_stops_before_results() {
        let intelligence = MockIntelligence::new("job-5", RESULT_HTML).with_wait_error(AppError::JobFailed {
            job_id: "job-5".into(),
            reason: "encrypted pdf".into(),
        });
        let svc = ParsingPipelineService::new(MockBlobStore::empty(), intelligence.clone());

        let err = svc
            .parse_document(DocumentSource::bytes("q.pdf", b"x".to_vec()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Some(ErrorKind::Permanent));
        assert_eq!(intelligence.calls(), vec!["upload", "wait:job-5"]);
    }

    #[tokio::test]
    async fn zero_items_is_not_an_error() {
        let svc = ParsingPipelineService::new(
            MockBlobStore::empty(),
            MockIntelligence::new("job-6", "# Nothing tabular here"),
        );
        let parsed = svc
            .parse_document(DocumentSource::bytes("q.pdf", b"x".to_vec()))
            .await
            .unwrap();
        assert_eq!(parsed.metadata.total_items, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_a_stuck_job() {
        let intelligence = MockIntelligence::new("job-7", RESULT_HTML).hang_on_wait();
        let svc = ParsingPipelineService::new(MockBlobStore::empty(), intelligence);

        let err = svc
            .parse_document_with_deadline(
                DocumentSource::bytes("q.pdf", b"x".to_vec()),
                Duration::from_secs(30),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Cancelled));
    }

    #[test]
    fn file_names_come_from_the_last_segment() {
        assert_eq!(file_name_of("a/b/quote.pdf"), "quote.pdf");
        assert_eq!(file_name_of("quote.pdf"), "quote.pdf");
        assert_eq!(file_name_of(""), "document.pdf");
    }
}
