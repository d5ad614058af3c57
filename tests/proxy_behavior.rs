//! Behavior-driven tests for the caching proxy pipeline.
//!
//! These tests verify HOW the proxy behaves under cache hits, TTL expiry,
//! upstream outages, and recovery, focusing on the sequencing guarantees:
//! cache hits never touch the breaker, and breaker state only moves on
//! actual upstream attempts.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use gridfeed_core::circuit_breaker::CircuitBreakerConfig;
use gridfeed_core::feed::{EndpointKind, FeedErrorKind};
use gridfeed_core::http_client::HttpResponse;
use gridfeed_core::metrics::{MemoryMetricsRecorder, MetricsRecorder};
use gridfeed_core::proxy::{TtlPolicy, UpstreamProxy};
use gridfeed_core::retry::{Backoff, RetryConfig};
use gridfeed_core::{CacheStore, CircuitState, MemoryCacheStore};

use gridfeed_tests::ScriptedHttpClient;

fn proxy_for(client: Arc<ScriptedHttpClient>) -> UpstreamProxy {
    UpstreamProxy::new(
        "https://vendor.test/v1",
        client,
        Arc::new(MemoryCacheStore::new()),
        Arc::new(MemoryMetricsRecorder::default()),
    )
    .with_retry(RetryConfig::no_retry())
}

fn no_params() -> BTreeMap<String, String> {
    BTreeMap::new()
}

// =============================================================================
// Caching: end-to-end double request
// =============================================================================

#[tokio::test]
async fn when_state_is_requested_twice_within_ttl_second_request_hits_cache() {
    // Given: a cold cache and a healthy upstream
    let client = Arc::new(ScriptedHttpClient::always_json(r#"{"week":10}"#));
    let proxy = proxy_for(Arc::clone(&client));

    // When: the same endpoint is requested twice within the TTL
    let first = proxy
        .request(EndpointKind::State, "/state/nfl", &no_params())
        .await
        .expect("first request succeeds");
    let second = proxy
        .request(EndpointKind::State, "/state/nfl", &no_params())
        .await
        .expect("second request succeeds");

    // Then: the first is fresh, the second is served from cache, and the
    // upstream saw exactly one call
    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(second.payload, first.payload);
    assert_eq!(client.call_count(), 1);
}

#[tokio::test]
async fn when_ttl_expires_the_entry_reads_as_a_miss_and_refetches() {
    // Given: a proxy with a compressed state TTL
    let client = Arc::new(ScriptedHttpClient::always_json(r#"{"week":10}"#));
    let proxy = proxy_for(Arc::clone(&client)).with_ttl(TtlPolicy {
        state: Duration::from_millis(40),
        ..TtlPolicy::default()
    });

    // When: the entry is written, read inside the TTL, then read after it
    proxy
        .request(EndpointKind::State, "/state/nfl", &no_params())
        .await
        .expect("first request succeeds");
    let inside = proxy
        .request(EndpointKind::State, "/state/nfl", &no_params())
        .await
        .expect("read inside ttl succeeds");
    tokio::time::sleep(Duration::from_millis(70)).await;
    let after = proxy
        .request(EndpointKind::State, "/state/nfl", &no_params())
        .await
        .expect("read after ttl succeeds");

    // Then: inside the window is a hit, past the window is a refetch
    assert!(inside.cache_hit);
    assert!(!after.cache_hit);
    assert_eq!(client.call_count(), 2);
}

#[tokio::test]
async fn when_params_are_reordered_the_cache_key_is_identical() {
    // Given: a stats request in two different parameter orders
    let client = Arc::new(ScriptedHttpClient::always_json("{}"));
    let proxy = proxy_for(Arc::clone(&client));

    let forward: BTreeMap<String, String> = [("season", "2025"), ("week", "10")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let reversed: BTreeMap<String, String> = [("week", "10"), ("season", "2025")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    // When: both orderings are requested
    proxy
        .request(EndpointKind::Stats, "/stats/nfl/regular/2025/10", &forward)
        .await
        .expect("first request succeeds");
    let second = proxy
        .request(EndpointKind::Stats, "/stats/nfl/regular/2025/10", &reversed)
        .await
        .expect("second request succeeds");

    // Then: they share one cache entry
    assert!(second.cache_hit);
    assert_eq!(client.call_count(), 1);
}

// =============================================================================
// Circuit breaking
// =============================================================================

#[tokio::test]
async fn when_five_consecutive_failures_occur_the_sixth_request_is_rejected_fast() {
    // Given: an upstream that always fails
    let client = Arc::new(ScriptedHttpClient::always_failing());
    let proxy = proxy_for(Arc::clone(&client));

    // When: five requests fail
    for _ in 0..5 {
        let error = proxy
            .request(EndpointKind::Players, "/players/nfl", &no_params())
            .await
            .expect_err("upstream is down");
        assert_eq!(error.kind(), FeedErrorKind::Unavailable);
    }

    // Then: the sixth request fails fast with a circuit-open outcome and
    // issues zero further upstream calls
    let error = proxy
        .request(EndpointKind::Players, "/players/nfl", &no_params())
        .await
        .expect_err("breaker rejects");
    assert_eq!(error.kind(), FeedErrorKind::CircuitOpen);
    assert_eq!(client.call_count(), 5);

    let snapshot = proxy.breaker_snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].state, CircuitState::Open);
}

#[tokio::test]
async fn when_cooldown_elapses_three_successes_close_the_breaker_again() {
    // Given: a breaker with compressed thresholds and an upstream that
    // fails twice then recovers
    let client = Arc::new(ScriptedHttpClient::new(
        vec![
            Err(gridfeed_core::HttpError::connect("refused")),
            Err(gridfeed_core::HttpError::connect("refused")),
        ],
        Ok(HttpResponse::ok_json("{}")),
    ));
    let proxy = proxy_for(Arc::clone(&client)).with_breaker_config(CircuitBreakerConfig {
        failure_threshold: 2,
        success_threshold: 3,
        cooldown: Duration::from_millis(30),
    });

    // When: the breaker opens
    for _ in 0..2 {
        let _ = proxy
            .request(EndpointKind::State, "/state/nfl", &no_params())
            .await;
    }
    assert_eq!(proxy.breaker_snapshot()[0].state, CircuitState::Open);

    // And: the cooldown elapses and three probes succeed. Each probe
    // varies its params so it gets a fresh cache key and must go upstream.
    tokio::time::sleep(Duration::from_millis(50)).await;
    for round in 0..3 {
        let params: BTreeMap<String, String> =
            [(String::from("probe"), round.to_string())].into_iter().collect();
        proxy
            .request(EndpointKind::State, "/state/nfl", &params)
            .await
            .expect("probe succeeds");
    }

    // Then: the breaker is closed again
    assert_eq!(proxy.breaker_snapshot()[0].state, CircuitState::Closed);
}

#[tokio::test]
async fn when_a_half_open_probe_fails_the_breaker_reopens_immediately() {
    // Given: a breaker that opens after two failures
    let client = Arc::new(ScriptedHttpClient::always_failing());
    let proxy = proxy_for(Arc::clone(&client)).with_breaker_config(CircuitBreakerConfig {
        failure_threshold: 2,
        success_threshold: 3,
        cooldown: Duration::from_millis(20),
    });

    for _ in 0..2 {
        let _ = proxy
            .request(EndpointKind::Players, "/players/nfl", &no_params())
            .await;
    }
    assert_eq!(proxy.breaker_snapshot()[0].state, CircuitState::Open);

    // When: the cooldown elapses and the half-open probe also fails
    tokio::time::sleep(Duration::from_millis(40)).await;
    let error = proxy
        .request(EndpointKind::Players, "/players/nfl", &no_params())
        .await
        .expect_err("probe fails");
    assert_eq!(error.kind(), FeedErrorKind::Unavailable);

    // Then: the breaker is open again and rejects without upstream calls
    let calls_after_probe = client.call_count();
    let error = proxy
        .request(EndpointKind::Players, "/players/nfl", &no_params())
        .await
        .expect_err("breaker rejects");
    assert_eq!(error.kind(), FeedErrorKind::CircuitOpen);
    assert_eq!(client.call_count(), calls_after_probe);
}

#[tokio::test]
async fn when_the_cache_holds_data_an_open_breaker_does_not_block_reads() {
    // Given: a cached entry, then an upstream that dies and trips the
    // breaker on a different endpoint key
    let client = Arc::new(ScriptedHttpClient::new(
        vec![Ok(HttpResponse::ok_json(r#"{"week":10}"#))],
        Err(gridfeed_core::HttpError::connect("refused")),
    ));
    let proxy = proxy_for(Arc::clone(&client));

    proxy
        .request(EndpointKind::State, "/state/nfl", &no_params())
        .await
        .expect("warm the cache");

    // When: the players endpoint trips its breaker
    for _ in 0..5 {
        let _ = proxy
            .request(EndpointKind::Players, "/players/nfl", &no_params())
            .await;
    }

    // Then: cached state reads still succeed without upstream traffic
    let cached = proxy
        .request(EndpointKind::State, "/state/nfl", &no_params())
        .await
        .expect("cache still serves");
    assert!(cached.cache_hit);
}

// =============================================================================
// Retry backoff
// =============================================================================

#[test]
fn backoff_delays_are_non_decreasing_and_bounded() {
    // Given: the default exponential backoff
    let backoff = Backoff::default();
    let max = backoff.max_delay();

    // Then: pre-jitter floors double per attempt and every sampled delay
    // stays within max_delay + jitter_window
    let floor = |attempt: u32| {
        Duration::from_secs_f64((2_f64.powi(attempt as i32)).min(30.0))
    };
    assert!(floor(0) <= floor(1));
    assert!(floor(1) <= floor(2));

    for attempt in 0..3 {
        for _ in 0..25 {
            let delay = backoff.delay(attempt);
            assert!(delay >= floor(attempt));
            assert!(delay <= max);
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn when_required_params_are_missing_nothing_downstream_is_touched() {
    // Given: a stats request missing its week
    let client = Arc::new(ScriptedHttpClient::always_json("{}"));
    let metrics = Arc::new(MemoryMetricsRecorder::default());
    let cache = Arc::new(MemoryCacheStore::new());
    let proxy = UpstreamProxy::new(
        "https://vendor.test/v1",
        Arc::clone(&client) as Arc<dyn gridfeed_core::HttpClient>,
        Arc::clone(&cache) as Arc<dyn CacheStore>,
        Arc::clone(&metrics) as Arc<dyn MetricsRecorder>,
    )
    .with_retry(RetryConfig::no_retry());

    let params: BTreeMap<String, String> =
        [(String::from("season"), String::from("2025"))].into_iter().collect();

    // When: the request is made
    let error = proxy
        .request(EndpointKind::Stats, "/stats/nfl/regular/2025/10", &params)
        .await
        .expect_err("validation fails");

    // Then: it is a client error and neither upstream, cache, metrics,
    // nor breaker saw the request
    assert_eq!(error.kind(), FeedErrorKind::InvalidRequest);
    assert_eq!(client.call_count(), 0);
    assert!(metrics.recorded().is_empty());
    assert!(proxy.breaker_snapshot().is_empty());
}
