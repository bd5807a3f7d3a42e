use std::sync::Arc;
use std::time::Duration;

use httptest::{cycle, matchers::*, responders::*, Expectation, Server};

use super::*;

fn fetcher(stats: Arc<ProcessingStats>) -> ResilientFetcher {
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_quota_wait: Duration::from_secs(5),
        max_quota_suspensions: 2,
    };
    ResilientFetcher::new(Arc::new(reqwest::Client::new()), policy, stats)
}

#[tokio::test]
async fn test_server_error_then_success_is_retried() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/list"))
            .times(2)
            .respond_with(cycle![
                status_code(503),
                status_code(200).body("1.2.3.4:8080"),
            ]),
    );

    let stats = Arc::new(ProcessingStats::new());
    let outcome = fetcher(Arc::clone(&stats))
        .get(&format!("http://{}/list", server.addr()))
        .await;

    let response = outcome.into_response().expect("second attempt should succeed");
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "1.2.3.4:8080");
    assert_eq!(stats.total_errors(), 0);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/missing"))
            .times(1)
            .respond_with(status_code(404)),
    );

    let stats = Arc::new(ProcessingStats::new());
    let outcome = fetcher(Arc::clone(&stats))
        .get(&format!("http://{}/missing", server.addr()))
        .await;

    assert!(matches!(outcome, FetchOutcome::NoResult(FetchError::Rejected(404))));
    assert_eq!(stats.get_error_count(ErrorType::FetchRejected), 1);
}

#[tokio::test]
async fn test_persistent_server_error_exhausts_budget() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/flaky"))
            .times(3)
            .respond_with(status_code(500)),
    );

    let stats = Arc::new(ProcessingStats::new());
    let outcome = fetcher(Arc::clone(&stats))
        .get(&format!("http://{}/flaky", server.addr()))
        .await;

    match outcome {
        FetchOutcome::Failed(FetchError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected exhausted retries, got {other:?}"),
    }
    assert_eq!(stats.get_error_count(ErrorType::FetchRetriesExhausted), 1);
}

#[tokio::test]
async fn test_quota_suspension_does_not_consume_attempts() {
    let server = Server::run();
    // Two quota answers and two server errors in a 3-attempt budget: the
    // quota answers must not count against it.
    server.expect(
        Expectation::matching(request::method_path("GET", "/search"))
            .times(5)
            .respond_with(cycle![
                status_code(500),
                status_code(429).append_header("Retry-After", "0"),
                status_code(500),
                status_code(403)
                    .append_header("x-ratelimit-remaining", "0")
                    .append_header("x-ratelimit-reset", "0"),
                status_code(200).body("{\"items\":[]}"),
            ]),
    );

    let stats = Arc::new(ProcessingStats::new());
    let limiter = ProviderLimiter::new("test", 2);
    let outcome = fetcher(Arc::clone(&stats))
        .with_limiter(limiter)
        .get(&format!("http://{}/search", server.addr()))
        .await;

    assert!(outcome.is_success());
    assert_eq!(stats.total_errors(), 0);
}

#[tokio::test]
async fn test_quota_wait_over_cap_gives_no_result() {
    let server = Server::run();
    let reset = chrono::Utc::now().timestamp() + 3600;
    server.expect(
        Expectation::matching(request::method_path("GET", "/search"))
            .times(1)
            .respond_with(
                status_code(403)
                    .append_header("x-ratelimit-remaining", "0")
                    .append_header("x-ratelimit-reset", reset.to_string()),
            ),
    );

    let stats = Arc::new(ProcessingStats::new());
    let outcome = fetcher(Arc::clone(&stats))
        .get(&format!("http://{}/search", server.addr()))
        .await;

    assert!(matches!(
        outcome,
        FetchOutcome::NoResult(FetchError::QuotaWaitExceeded { .. })
    ));
    assert_eq!(stats.get_error_count(ErrorType::FetchQuotaExhausted), 1);
}

#[tokio::test]
async fn test_repeated_quota_answers_give_up_after_suspension_limit() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/search"))
            .times(3)
            .respond_with(status_code(429).append_header("Retry-After", "0")),
    );

    let stats = Arc::new(ProcessingStats::new());
    let outcome = fetcher(Arc::clone(&stats))
        .get(&format!("http://{}/search", server.addr()))
        .await;

    assert!(matches!(
        outcome,
        FetchOutcome::NoResult(FetchError::QuotaStillExhausted { suspensions: 2 })
    ));
}

#[tokio::test]
async fn test_connection_refused_is_a_failure_signal() {
    // Bind then drop a listener so the port is very likely closed.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let stats = Arc::new(ProcessingStats::new());
    let outcome = fetcher(stats).get(&format!("http://{addr}/")).await;
    assert!(matches!(outcome, FetchOutcome::Failed(_)));
}

#[tokio::test]
async fn test_get_json_parses_body() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/ip"))
            .respond_with(json_encoded(serde_json::json!({"ip": "5.6.7.8"}))),
    );

    let stats = Arc::new(ProcessingStats::new());
    let value: Option<serde_json::Value> = fetcher(stats)
        .get_json(&format!("http://{}/ip", server.addr()))
        .await;
    assert_eq!(value.unwrap()["ip"], "5.6.7.8");
}
