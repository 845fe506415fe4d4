use std::time::Duration;

use quotient_core::error::AppError;
use quotient_core::error_classifier::ErrorKind;
use quotient_core::job::{JobStatus, PollConfig};
use quotient_core::traits::DocumentIntelligence;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{API_KEY, client, client_with, profile, test_config};

#[tokio::test]
async fn upload_sends_file_and_directives() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/parsing/upload"))
        .and(header("authorization", format!("Bearer {API_KEY}").as_str()))
        .and(body_string_contains("parse_page_with_agent"))
        .and(body_string_contains("output_tables_as_HTML"))
        .and(body_string_contains("quote.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "job-123", "status": "PENDING"})))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _clock) = client(&server);
    let job = client
        .upload_document("quote.pdf", b"%PDF-1.7".to_vec(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(job.id, "job-123");
    assert_eq!(job.status, JobStatus::Pending);
}

#[tokio::test]
async fn upload_without_job_id_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/parsing/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "PENDING"})))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _clock) = client(&server);
    let err = client
        .upload_document("quote.pdf", b"%PDF".to_vec(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Permanent));
    match err {
        AppError::DocumentIntelligence { operation, source, .. } => {
            assert_eq!(operation, "upload");
            assert!(matches!(*source, AppError::MissingJobId(_)));
        }
        other => panic!("expected DocumentIntelligence, got {other:?}"),
    }
}

#[tokio::test]
async fn upload_retries_server_errors_with_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/parsing/upload"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/parsing/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "job-9"})))
        .expect(1)
        .mount(&server)
        .await;

    let (client, clock) = client(&server);
    let job = client
        .upload_document("quote.pdf", b"%PDF".to_vec(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(job.id, "job-9");
    // Default upload profile: 2s then 4s, jitter only ever adds.
    let sleeps = clock.sleeps();
    assert_eq!(sleeps.len(), 2);
    assert!(sleeps[0] >= Duration::from_secs(2) && sleeps[0] <= Duration::from_millis(2200));
    assert!(sleeps[1] >= Duration::from_secs(4) && sleeps[1] <= Duration::from_millis(4400));

    let metrics = client.executor().metrics("document-upload").unwrap();
    assert_eq!(metrics.attempts, 3);
    assert_eq!(metrics.retries, 2);
    assert_eq!(metrics.successes, 1);
}

#[tokio::test]
async fn auth_failures_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/parsing/upload"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .expect(1)
        .mount(&server)
        .await;

    let (client, clock) = client(&server);
    let err = client
        .upload_document("quote.pdf", b"%PDF".to_vec(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Auth));
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("check the API key"));
    assert!(clock.sleeps().is_empty());
}

#[tokio::test]
async fn rate_limits_honour_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/parsing/job/job-1/result/markdown"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/parsing/job/job-1/result/markdown"))
        .respond_with(ResponseTemplate::new(200).set_body_string("| a | b | c |"))
        .mount(&server)
        .await;

    let (client, clock) = client(&server);
    let markdown = client
        .get_results("job-1", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(markdown, "| a | b | c |");
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(7)]);
}

#[tokio::test]
async fn results_unwrap_json_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/parsing/job/job-2/result/markdown"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"markdown": "<table></table>", "job_metadata": {}})),
        )
        .mount(&server)
        .await;

    let (client, _clock) = client(&server);
    let markdown = client
        .get_results("job-2", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(markdown, "<table></table>");
}

#[tokio::test]
async fn waits_through_pending_and_transient_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/parsing/job/job-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "PENDING"})))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/parsing/job/job-3"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/parsing/job/job-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "SUCCESS"})))
        .mount(&server)
        .await;

    let (client, _clock) = client(&server);
    let job = client
        .wait_for_completion("job-3", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Success);
}

#[tokio::test]
async fn job_error_surfaces_service_reason() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/parsing/job/job-4"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "ERROR", "error": "document is encrypted"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (client, _clock) = client(&server);
    let err = client
        .wait_for_completion("job-4", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("document is encrypted"));
    assert_eq!(err.kind(), Some(ErrorKind::Permanent));
}

#[tokio::test]
async fn polling_budget_is_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/parsing/job/job-5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "PENDING"})))
        .expect(5)
        .mount(&server)
        .await;

    let (client, clock) = client(&server);
    let err = client
        .wait_for_completion("job-5", &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Timeout));
    assert_eq!(clock.total_slept(), Duration::from_secs(40));
}

#[tokio::test]
async fn failing_status_checks_stay_within_polling_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/parsing/job/job-7"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let poll = PollConfig::default();
    let (client, clock) = client_with(test_config(&server).with_poll(poll));
    let err = client
        .wait_for_completion("job-7", &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Timeout));
    assert!(
        clock.total_slept() <= poll.budget(),
        "slept {:?} against a budget of {:?}",
        clock.total_slept(),
        poll.budget()
    );
}

#[tokio::test]
async fn breaker_opens_and_fails_fast() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/parsing/job/job-6/result/markdown"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let config = test_config(&server).with_results_profile(profile("document-results", 1, 2));
    let (client, _clock) = client_with(config);
    let cancel = CancellationToken::new();

    for _ in 0..2 {
        let err = client.get_results("job-6", &cancel).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::ServerError));
    }

    let err = client.get_results("job-6", &cancel).await.unwrap_err();
    assert!(err.is_circuit_open());
    assert!(matches!(err, AppError::CircuitOpen { .. }));

    let stats = client
        .executor()
        .registry()
        .stats_for("document-results")
        .unwrap();
    assert_eq!(stats.failures, 2);
    assert_eq!(client.executor().metrics("document-results").unwrap().short_circuits, 1);

    assert!(client.executor().registry().reset_circuit_breaker("document-results"));
    let err = client.get_results("job-6", &cancel).await.unwrap_err();
    assert!(!err.is_circuit_open());
}
