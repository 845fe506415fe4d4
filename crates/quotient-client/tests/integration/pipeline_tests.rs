use std::time::Duration;

use quotient_client::FsBlobStore;
use quotient_core::error::AppError;
use quotient_core::models::{DocumentSource, ParsingMethod};
use quotient_core::pipeline::ParsingPipelineService;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::client;

const RESULT_MARKDOWN: &str = "# Quote Q-1042

<table>
<thead><tr><th>Item</th><th>Description</th><th>Qty</th><th>Unit Price</th><th>Total</th></tr></thead>
<tbody>
<tr><td>A-100</td><td>Widget</td><td>2</td><td>$5.00</td><td>$10.00</td></tr>
<tr><td></td><td>Various miscellaneous shop supplies</td><td>1</td><td>$40.00</td><td>$40.00</td></tr>
<tr><td colspan=\"4\">Total</td><td>$50.00</td></tr>
</tbody>
</table>";

async fn mount_happy_path(server: &MockServer, job_id: &str) {
    Mock::given(method("POST"))
        .and(path("/api/parsing/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": job_id})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api/parsing/job/{job_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "SUCCESS"})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api/parsing/job/{job_id}/result/markdown")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"markdown": RESULT_MARKDOWN})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn parses_a_stored_document_end_to_end() {
    let server = MockServer::start().await;
    mount_happy_path(&server, "job-e2e").await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("q-1042.pdf"), b"%PDF-1.7 fake").unwrap();

    let (intelligence, _clock) = client(&server);
    let svc = ParsingPipelineService::new(FsBlobStore::new(dir.path()), intelligence);

    let parsed = svc
        .parse_document(DocumentSource::path("q-1042.pdf"))
        .await
        .unwrap();

    assert_eq!(parsed.metadata.parsing_method, ParsingMethod::AdaptiveHtml);
    assert_eq!(parsed.metadata.total_tables, 1);
    assert_eq!(parsed.metadata.total_items, 2);

    let widget = &parsed.line_items[0];
    assert_eq!(widget.item_number, "A-100");
    assert_eq!(widget.total, Some(10.0));

    let supplies = &parsed.line_items[1];
    assert_eq!(supplies.item_number, "ITEM-2");
    assert_eq!(supplies.part_number, "PART-2");
    assert_eq!(supplies.description, "Various miscellaneous shop supplies");
}

#[tokio::test]
async fn missing_blob_never_reaches_the_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (intelligence, _clock) = client(&server);
    let svc = ParsingPipelineService::new(FsBlobStore::new(dir.path()), intelligence);

    let err = svc
        .parse_document(DocumentSource::path("absent.pdf"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StorageError(_)));
}

#[tokio::test]
async fn deadline_abandons_a_slow_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/parsing/upload"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "job-slow"}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (intelligence, _clock) = client(&server);
    let svc = ParsingPipelineService::new(FsBlobStore::new(dir.path()), intelligence.clone());

    let err = svc
        .parse_document_with_deadline(
            DocumentSource::bytes("slow.pdf", b"%PDF".to_vec()),
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Cancelled));
    let stats = intelligence
        .executor()
        .registry()
        .stats_for("document-upload")
        .unwrap();
    assert_eq!(stats.failures, 0);
}
