use nsf_harvest::fetcher::{
    AwardsClient, AwardsFetcher, ClientConfig, FetchError, PageOutcome, PageSource, RetryConfig,
    RetryPolicy,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Answers every request with a 500 and remembers when each one arrived.
#[derive(Clone, Default)]
struct FailingResponder {
    arrivals: Arc<Mutex<Vec<Instant>>>,
}

impl Respond for FailingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.arrivals.lock().unwrap().push(Instant::now());
        ResponseTemplate::new(500).set_body_string("upstream down")
    }
}

fn client_config(server: &MockServer) -> ClientConfig {
    ClientConfig {
        endpoint: format!("{}/awards.json", server.uri()),
        timeout: Duration::from_secs(5),
        fields: vec!["title".to_string(), "awardeeName".to_string()],
        ..ClientConfig::default()
    }
}

fn fetcher(config: ClientConfig, max_attempts: u32, base_delay: Duration) -> AwardsFetcher {
    let client = AwardsClient::new(config).unwrap();
    let retry = RetryPolicy::new(RetryConfig {
        max_attempts,
        base_delay,
    })
    .unwrap();
    AwardsFetcher::new(client, retry)
}

fn awards_body(ids: &[&str]) -> serde_json::Value {
    let award: Vec<serde_json::Value> = ids
        .iter()
        .map(|id| json!({"id": id, "title": format!("Award {id}")}))
        .collect();
    json!({"response": {"award": award}})
}

#[tokio::test]
async fn test_page_request_carries_filters() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/awards.json"))
        .and(query_param("rpp", "25"))
        .and(query_param("offset", "26"))
        .and(query_param("startDateStart", "01/01/2021"))
        .and(query_param("startDateEnd", "12/31/2021"))
        .and(query_param("agency", "NSF"))
        .and(query_param("awardeeCountryCode", "US"))
        .and(query_param("printFields", "title,awardeeName"))
        .respond_with(ResponseTemplate::new(200).set_body_json(awards_body(&["A1", "A2"])))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = fetcher(client_config(&server), 3, Duration::from_millis(10));
    let outcome = fetcher.fetch(2021, 26).await;

    let records = outcome.into_records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id().as_deref(), Some("A1"));
    assert_eq!(records[1].cell("title"), "Award A2");
}

#[tokio::test]
async fn test_missing_award_list_is_end_of_year() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/awards.json"))
        .and(query_param("offset", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": {}})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/awards.json"))
        .and(query_param("offset", "26"))
        .respond_with(ResponseTemplate::new(200).set_body_json(awards_body(&[])))
        .mount(&server)
        .await;

    let fetcher = fetcher(client_config(&server), 3, Duration::from_millis(10));

    assert_eq!(fetcher.fetch(2020, 1).await, PageOutcome::EndOfYear);
    assert_eq!(fetcher.fetch(2020, 26).await, PageOutcome::EndOfYear);
}

#[tokio::test]
async fn test_server_errors_exhaust_attempts_with_linear_backoff() {
    let server = MockServer::start().await;
    let responder = FailingResponder::default();

    Mock::given(method("GET"))
        .and(path("/awards.json"))
        .respond_with(responder.clone())
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = fetcher(client_config(&server), 3, Duration::from_millis(50));

    let start = Instant::now();
    let outcome = fetcher.fetch(2022, 1).await;
    let elapsed = start.elapsed();

    assert_eq!(outcome, PageOutcome::FetchFailed { attempts: 3 });
    assert!(elapsed < Duration::from_secs(3), "elapsed {elapsed:?}");

    // 50ms after the first failure, 100ms after the second, none after the last.
    let arrivals = responder.arrivals.lock().unwrap().clone();
    assert_eq!(arrivals.len(), 3);
    let first_gap = arrivals[1] - arrivals[0];
    let second_gap = arrivals[2] - arrivals[1];
    assert!(first_gap >= Duration::from_millis(50), "first gap {first_gap:?}");
    assert!(second_gap >= Duration::from_millis(100), "second gap {second_gap:?}");
    assert!(second_gap > first_gap, "gaps {first_gap:?} then {second_gap:?}");
}

#[tokio::test]
async fn test_recovers_after_transient_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/awards.json"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/awards.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(awards_body(&["B7"])))
        .with_priority(2)
        .mount(&server)
        .await;

    let fetcher = fetcher(client_config(&server), 3, Duration::from_millis(10));
    let outcome = fetcher.fetch(2023, 1).await;

    assert_eq!(outcome.into_records()[0].id().as_deref(), Some("B7"));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_malformed_body_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/awards.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(2)
        .mount(&server)
        .await;

    let fetcher = fetcher(client_config(&server), 2, Duration::from_millis(10));

    assert_eq!(
        fetcher.fetch(2019, 1).await,
        PageOutcome::FetchFailed { attempts: 2 }
    );
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/awards.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(awards_body(&["late"]))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let config = ClientConfig {
        timeout: Duration::from_millis(100),
        ..client_config(&server)
    };
    let fetcher = fetcher(config, 2, Duration::from_millis(10));

    assert_eq!(
        fetcher.fetch(2024, 1).await,
        PageOutcome::FetchFailed { attempts: 2 }
    );
}

#[tokio::test]
async fn test_client_reports_status_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/awards.json"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let client = AwardsClient::new(client_config(&server)).unwrap();
    match client.fetch_page(2024, 1).await {
        Err(FetchError::HttpError { status, message }) => {
            assert_eq!(status, 429);
            assert_eq!(message, "slow down");
        }
        other => panic!("Expected HttpError, got {other:?}"),
    }
}

#[test]
fn test_invalid_endpoint_is_rejected() {
    let result = AwardsClient::new(ClientConfig {
        endpoint: "not a url".to_string(),
        ..ClientConfig::default()
    });
    assert!(matches!(result, Err(FetchError::InvalidConfiguration(_))));
}
