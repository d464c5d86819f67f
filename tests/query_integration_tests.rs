use std::sync::{Arc, Mutex};
use std::time::Duration;

use cinefluent::api::ApiClient;
use cinefluent::api::types::{MovieParams, MovieResponse, ProgressUpdate};
use cinefluent::health::{BackendStatus, ConnectionMonitor, MonitorOptions, NetworkSignal};
use cinefluent::queries;
use cinefluent::query::{Clock, EntryStatus, QueryCache, RetryPolicy, SystemClock};
use serde_json::{Value, json};
use tokio::time::{Instant, timeout};
use tokio_test::assert_ok;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path, query_param},
};

// ============================================================================
// Helper Functions
// ============================================================================

/// Clock moved by hand, so staleness can be tested against a real server.
#[derive(Debug)]
struct TestClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl TestClock {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        })
    }

    fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock().unwrap()
    }
}

fn client_for(server: &MockServer) -> ApiClient {
    ApiClient::new(format!("{}/api/v1", server.uri()))
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::default().with_backoff(Duration::from_millis(10), 2.0)
}

fn progress_json(percent: f32) -> Value {
    json!({
        "progress": [{
            "user_id": "u1",
            "movie_id": "m1",
            "progress_percentage": percent,
            "time_watched": 600,
        }]
    })
}

const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Query Cache Scenarios
// ============================================================================

#[tokio::test]
async fn test_movies_page_cached_for_five_minutes() {
    let server = MockServer::start().await;
    let movies: Vec<Value> = (1..=20)
        .map(|i| json!({"id": format!("m{i}"), "title": format!("Movie {i}")}))
        .collect();
    Mock::given(method("GET"))
        .and(path("/api/v1/movies"))
        .and(query_param("page", "1"))
        .and(query_param("limit", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "movies": movies,
            "total": 57,
            "page": 1,
            "per_page": 20,
        })))
        .expect(2)
        .mount(&server)
        .await;

    let clock = TestClock::new();
    let cache = QueryCache::new(16, clock.clone());
    let params = MovieParams {
        page: Some(1),
        limit: Some(20),
        ..Default::default()
    };
    let spec = queries::movies(&client_for(&server), &params);

    let first = assert_ok!(spec.fetch(&cache).await);
    assert_eq!(first.status, Some(EntryStatus::Fresh));
    let page: MovieResponse = first.decode().unwrap().unwrap();
    assert_eq!(page.movies.len(), 20);
    assert_eq!(page.total, 57);

    clock.advance(Duration::from_secs(4 * 60));
    let second = assert_ok!(spec.fetch(&cache).await);
    assert!(Arc::ptr_eq(first.data.as_ref().unwrap(), second.data.as_ref().unwrap()));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);

    clock.advance(Duration::from_secs(2 * 60));
    assert!(cache.get(&spec.key).is_stale());
    let third = assert_ok!(spec.fetch(&cache).await);
    assert_eq!(third.status, Some(EntryStatus::Fresh));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_concurrent_reads_share_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/categories"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"categories": []}))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let cache = QueryCache::default();
    let spec = queries::categories(&client_for(&server));
    let (a, b, c) = tokio::join!(spec.fetch(&cache), spec.fetch(&cache), spec.fetch(&cache));
    for snapshot in [a, b, c] {
        assert_eq!(assert_ok!(snapshot).data(), Some(&json!({"categories": []})));
    }
}

#[tokio::test]
async fn test_unauthorized_never_retried_through_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid token"})))
        .expect(1)
        .mount(&server)
        .await;

    let cache = QueryCache::default();
    let snapshot = assert_ok!(queries::current_user(&client_for(&server), Some("bad")).fetch(&cache).await);
    assert!(snapshot.is_error());
    assert_eq!(snapshot.error().and_then(|e| e.status()), Some(401));
    assert_eq!(snapshot.error().unwrap().to_string(), "HTTP 401: Invalid token");
}

#[tokio::test]
async fn test_server_errors_retried_then_data_kept() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/languages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"languages": ["en", "es"]})))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/languages"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let cache = QueryCache::default();
    let mut spec = queries::languages(&client_for(&server));
    spec.options = spec.options.retry(fast_retry());

    let ok = assert_ok!(spec.fetch(&cache).await);
    assert!(ok.is_success());

    cache.invalidate(&spec.key);
    let failed = assert_ok!(spec.fetch(&cache).await);
    assert!(failed.is_error());
    assert_eq!(failed.error().and_then(|e| e.status()), Some(503));
    assert_eq!(failed.data(), Some(&json!({"languages": ["en", "es"]})));
}

// ============================================================================
// Mutation Scenarios
// ============================================================================

#[tokio::test]
async fn test_update_progress_invalidates_user_progress() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/u1/progress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(progress_json(10.0)))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/u1/progress"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(progress_json(40.0))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/categories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"categories": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/progress/update"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Progress updated",
            "progress": {
                "user_id": "u1",
                "movie_id": "m1",
                "progress_percentage": 40.0,
                "time_watched": 1200,
            },
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = client_for(&server);
    let cache = QueryCache::new(16, Arc::new(SystemClock));
    let progress = queries::user_progress(&api, "u1").stale_time(Duration::from_secs(300));
    let categories = queries::categories(&api);
    assert_ok!(progress.fetch(&cache).await);
    assert_ok!(categories.fetch(&cache).await);

    let mutation = queries::update_progress(&cache, &api, "u1", "tok");
    assert_ok!(
        mutation
            .mutate(ProgressUpdate {
                movie_id: "m1".to_string(),
                progress_percentage: 40.0,
                time_watched: 1200,
                vocabulary_learned: None,
            })
            .await
    );
    assert!(mutation.state().is_success());
    assert!(cache.get(&progress.key).is_stale());
    assert!(!cache.get(&categories.key).is_stale());

    // The stale value stays visible while the refetch is in flight.
    let mut handle = assert_ok!(progress.clone().watch(&cache));
    let during = handle.snapshot();
    assert!(during.is_fetching());
    assert_eq!(during.data(), Some(&progress_json(10.0)));

    let after = timeout(WAIT, handle.settled()).await.unwrap();
    assert_eq!(after.status, Some(EntryStatus::Fresh));
    assert_eq!(after.data(), Some(&progress_json(40.0)));
}

#[tokio::test]
async fn test_failed_mutation_invalidates_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/progress/update"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "db down"})))
        .expect(1)
        .mount(&server)
        .await;

    let api = client_for(&server);
    let cache = QueryCache::default();
    let mutation = queries::update_progress(&cache, &api, "u1", "tok");
    let result = mutation
        .mutate(ProgressUpdate {
            movie_id: "m1".to_string(),
            progress_percentage: 10.0,
            time_watched: 60,
            vocabulary_learned: Some(3),
        })
        .await;
    assert!(result.is_err());
    assert!(mutation.is_error());
    assert_eq!(mutation.state().error().map(|e| e.to_string()).as_deref(), Some("HTTP 500: db down"));
}

// ============================================================================
// Connection Health
// ============================================================================

#[tokio::test]
async fn test_monitor_connects_to_healthy_backend() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "healthy"})))
        .mount(&server)
        .await;

    let cache = QueryCache::default();
    let network = NetworkSignal::new(true);
    let options = MonitorOptions::default();
    let probe = queries::health(&client_for(&server), &options);
    let monitor = assert_ok!(ConnectionMonitor::start(&cache, probe.fetcher, network.subscribe(), options));

    let mut rx = monitor.subscribe();
    let state = *timeout(WAIT, rx.wait_for(|s| s.backend_status != BackendStatus::Checking))
        .await
        .unwrap()
        .unwrap();
    assert!(state.is_connected());

    network.set_online(false);
    let offline = *timeout(WAIT, rx.wait_for(|s| !s.network_online)).await.unwrap().unwrap();
    assert!(!offline.is_connected());
}

#[tokio::test]
async fn test_monitor_reports_down_after_three_failed_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/health"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let cache = QueryCache::default();
    let options = MonitorOptions {
        poll_interval: Duration::from_secs(3600),
        retry: fast_retry(),
    };
    let probe = queries::health(&client_for(&server), &options);
    let monitor = assert_ok!(ConnectionMonitor::start(
        &cache,
        probe.fetcher,
        NetworkSignal::default().subscribe(),
        options,
    ));

    let mut rx = monitor.subscribe();
    let state = *timeout(WAIT, rx.wait_for(|s| s.backend_status == BackendStatus::Disconnected))
        .await
        .unwrap()
        .unwrap();
    assert!(!state.is_connected());
    monitor.shutdown();
}
