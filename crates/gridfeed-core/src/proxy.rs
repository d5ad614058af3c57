//! Caching proxy pipeline for one upstream vendor.
//!
//! Sequencing here is the load-bearing design decision: cache hits never
//! touch the circuit breaker (a healthy cache masks upstream outages), and
//! breaker state is only moved by actual upstream attempts, never by cache
//! hits or validation failures.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::cache::{cache_key, CacheStore};
use crate::circuit_breaker::{BreakerSnapshot, CircuitBreakerConfig, CircuitBreakerRegistry};
use crate::feed::{EndpointKind, FeedError};
use crate::http_client::{HttpAuth, HttpClient, HttpMethod, HttpRequest};
use crate::metrics::{ApiMetric, MetricsRecorder, MetricsSummary};
use crate::retry::RetryConfig;
use crate::{Season, SeasonType, Week};

/// Fixed TTL policy per endpoint category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub state: Duration,
    pub players: Duration,
    pub stats: Duration,
    pub projections: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            state: Duration::from_secs(300),
            players: Duration::from_secs(86_400),
            stats: Duration::from_secs(1_800),
            projections: Duration::from_secs(1_800),
        }
    }
}

impl TtlPolicy {
    /// TTL for an endpoint; `None` means the endpoint is never cached.
    pub fn ttl_for(&self, endpoint: EndpointKind) -> Option<Duration> {
        match endpoint {
            EndpointKind::State => Some(self.state),
            EndpointKind::Players => Some(self.players),
            EndpointKind::Stats => Some(self.stats),
            EndpointKind::Projections => Some(self.projections),
            EndpointKind::Health => None,
        }
    }
}

/// Successful proxied response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
    /// Raw upstream payload (opaque JSON text).
    pub payload: String,
    /// Whether the payload was served from the cache.
    pub cache_hit: bool,
    pub status: u16,
}

/// Caching proxy in front of a single upstream vendor.
pub struct UpstreamProxy {
    base_url: String,
    auth: HttpAuth,
    http_client: Arc<dyn HttpClient>,
    cache: Arc<dyn CacheStore>,
    breakers: CircuitBreakerRegistry,
    metrics: Arc<dyn MetricsRecorder>,
    retry: RetryConfig,
    ttl: TtlPolicy,
}

impl UpstreamProxy {
    pub fn new(
        base_url: impl Into<String>,
        http_client: Arc<dyn HttpClient>,
        cache: Arc<dyn CacheStore>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            auth: HttpAuth::None,
            http_client,
            cache,
            breakers: CircuitBreakerRegistry::default(),
            metrics,
            retry: RetryConfig::default(),
            ttl: TtlPolicy::default(),
        }
    }

    pub fn with_auth(mut self, auth: HttpAuth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_ttl(mut self, ttl: TtlPolicy) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breakers = CircuitBreakerRegistry::new(config);
        self
    }

    pub fn breaker_snapshot(&self) -> Vec<BreakerSnapshot> {
        self.breakers.snapshot()
    }

    /// Rolling metrics summary; a failing recorder degrades to an empty
    /// summary rather than failing the health surface.
    pub async fn metrics_summary(&self, window: Duration) -> MetricsSummary {
        match self.metrics.summary(window).await {
            Ok(summary) => summary,
            Err(error) => {
                warn!(error = %error, "metrics summary failed; reporting empty window");
                MetricsSummary {
                    window_secs: window.as_secs(),
                    ..MetricsSummary::default()
                }
            }
        }
    }

    /// Run one request through the full pipeline.
    ///
    /// `upstream_path` is the vendor-specific path (query included where
    /// the vendor wants one); `params` are the logical parameters used for
    /// validation and cache keying, so two vendors encoding the same
    /// request differently still share key semantics per deployment.
    pub async fn request(
        &self,
        endpoint: EndpointKind,
        upstream_path: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<ProxyResponse, FeedError> {
        let started = Instant::now();

        // 1. Validation short-circuits before any cache/breaker/upstream
        //    work and never counts against the breaker.
        validate_params(endpoint, params)?;

        // 2-3. Deterministic key from the logical path, then cache lookup.
        //      Store failures degrade to a miss.
        let ttl = self.ttl.ttl_for(endpoint);
        let logical_path = format!("/{}", endpoint.as_str());
        let key = cache_key(HttpMethod::Get, &logical_path, params);
        if ttl.is_some() {
            match self.cache.get(&key).await {
                Ok(Some(payload)) => {
                    self.record(ApiMetric::hit(endpoint, elapsed_ms(started))).await;
                    return Ok(ProxyResponse {
                        payload,
                        cache_hit: true,
                        status: 200,
                    });
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(endpoint = %endpoint, error = %error, "cache read failed; bypassing cache");
                }
            }
        }

        // 4. Breaker gate precedes every upstream attempt.
        let breaker = self.breakers.breaker(endpoint);
        if !breaker.allow_request() {
            let error = FeedError::circuit_open(endpoint);
            self.record(ApiMetric::error(endpoint, elapsed_ms(started), error.message()))
                .await;
            return Err(error);
        }

        // 5. Upstream fetch under the retry policy.
        match self.fetch_with_retry(upstream_path).await {
            Ok(response) => {
                breaker.record_success();
                if let Some(ttl) = ttl {
                    if let Err(error) = self
                        .cache
                        .put(key, response.body.clone(), ttl)
                        .await
                    {
                        warn!(endpoint = %endpoint, error = %error, "cache write failed; continuing without caching");
                    }
                }
                self.record(ApiMetric::miss(
                    endpoint,
                    response.status,
                    elapsed_ms(started),
                ))
                .await;
                Ok(ProxyResponse {
                    payload: response.body,
                    cache_hit: false,
                    status: response.status,
                })
            }
            Err(failure) => {
                // Retry exhaustion counts as ONE breaker failure, not one
                // per attempt.
                breaker.record_failure();
                let mut metric =
                    ApiMetric::error(endpoint, elapsed_ms(started), failure.message());
                if let Some(status) = failure_status(&failure) {
                    metric = metric.with_status(status);
                }
                self.record(metric).await;
                Err(failure)
            }
        }
    }

    async fn fetch_with_retry(
        &self,
        upstream_path: &str,
    ) -> Result<crate::http_client::HttpResponse, FeedError> {
        let url = format!("{}{}", self.base_url, upstream_path);
        let mut attempt: u32 = 0;

        loop {
            let request = HttpRequest::get(&url)
                .with_auth(&self.auth)
                .with_timeout_ms(self.retry.attempt_timeout.as_millis() as u64);

            let outcome = self.http_client.execute(request).await;
            let retries_left = self.retry.enabled && attempt < self.retry.max_retries;

            match outcome {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) => {
                    if self.retry.should_retry_status(response.status) && retries_left {
                        debug!(status = response.status, attempt, "retrying upstream call");
                        tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(status_error(response.status));
                }
                Err(error) => {
                    if self.retry.should_retry_transport(&error) && retries_left {
                        debug!(error = %error, attempt, "retrying upstream call after transport error");
                        tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(FeedError::unavailable(format!(
                        "upstream transport error: {}",
                        error.message()
                    )));
                }
            }
        }
    }

    async fn record(&self, metric: ApiMetric) {
        if let Err(error) = self.metrics.record(metric).await {
            warn!(error = %error, "metrics recording failed; continuing");
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

fn status_error(status: u16) -> FeedError {
    if status == 429 {
        FeedError::rate_limited(format!("upstream returned status {status}"))
    } else {
        FeedError::unavailable(format!("upstream returned status {status}"))
    }
}

fn failure_status(error: &FeedError) -> Option<u16> {
    // The status code is embedded in the message by `status_error`; keep
    // metrics best-effort rather than threading a second error channel.
    error
        .message()
        .rsplit(' ')
        .next()
        .and_then(|token| token.parse::<u16>().ok())
}

/// Validate required parameters for an endpoint category.
///
/// Stats and projections require a parseable season and week, and an
/// optional season type within the fixed enumerated set. The remaining
/// endpoints take no required parameters.
pub fn validate_params(
    endpoint: EndpointKind,
    params: &BTreeMap<String, String>,
) -> Result<(), FeedError> {
    match endpoint {
        EndpointKind::Stats | EndpointKind::Projections => {
            let season = params
                .get("season")
                .ok_or_else(|| FeedError::invalid_request("missing required parameter 'season'"))?;
            season
                .parse::<u16>()
                .ok()
                .and_then(|year| Season::new(year).ok())
                .ok_or_else(|| {
                    FeedError::invalid_request(format!("invalid season '{season}'"))
                })?;

            let week = params
                .get("week")
                .ok_or_else(|| FeedError::invalid_request("missing required parameter 'week'"))?;
            week.parse::<u16>()
                .ok()
                .and_then(|value| Week::new(value).ok())
                .ok_or_else(|| FeedError::invalid_request(format!("invalid week '{week}'")))?;

            if let Some(season_type) = params.get("season_type") {
                SeasonType::from_str(season_type).map_err(|_| {
                    FeedError::invalid_request(format!("invalid season_type '{season_type}'"))
                })?;
            }
            Ok(())
        }
        EndpointKind::State | EndpointKind::Players | EndpointKind::Health => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::feed::FeedErrorKind;
    use crate::http_client::{HttpError, HttpResponse};
    use crate::metrics::MemoryMetricsRecorder;
    use std::sync::Mutex;

    /// Scripted transport that pops one canned outcome per call.
    struct ScriptedHttpClient {
        script: Mutex<Vec<Result<HttpResponse, HttpError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedHttpClient {
        fn new(mut outcomes: Vec<Result<HttpResponse, HttpError>>) -> Self {
            outcomes.reverse();
            Self {
                script: Mutex::new(outcomes),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().expect("call log lock").len()
        }

        fn last_url(&self) -> Option<String> {
            self.calls.lock().expect("call log lock").last().cloned()
        }
    }

    impl HttpClient for ScriptedHttpClient {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>,
        > {
            self.calls.lock().expect("call log lock").push(request.url);
            let outcome = self
                .script
                .lock()
                .expect("script lock")
                .pop()
                .unwrap_or_else(|| Ok(HttpResponse::ok_json("{}")));
            Box::pin(async move { outcome })
        }

        fn is_mock(&self) -> bool {
            true
        }
    }

    fn proxy_with(client: Arc<ScriptedHttpClient>) -> (UpstreamProxy, Arc<MemoryMetricsRecorder>) {
        let metrics = Arc::new(MemoryMetricsRecorder::default());
        let proxy = UpstreamProxy::new(
            "https://vendor.test/v1",
            client,
            Arc::new(MemoryCacheStore::new()),
            Arc::clone(&metrics) as Arc<dyn MetricsRecorder>,
        )
        .with_retry(RetryConfig::no_retry());
        (proxy, metrics)
    }

    fn stats_params() -> BTreeMap<String, String> {
        [
            ("season", "2025"),
            ("week", "10"),
            ("season_type", "regular"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[tokio::test]
    async fn second_request_within_ttl_is_served_from_cache() {
        let client = Arc::new(ScriptedHttpClient::new(vec![Ok(HttpResponse::ok_json(
            r#"{"week":10}"#,
        ))]));
        let (proxy, metrics) = proxy_with(Arc::clone(&client));

        let first = proxy
            .request(EndpointKind::State, "/state/nfl", &BTreeMap::new())
            .await
            .expect("first request");
        assert!(!first.cache_hit);

        let second = proxy
            .request(EndpointKind::State, "/state/nfl", &BTreeMap::new())
            .await
            .expect("second request");
        assert!(second.cache_hit);
        assert_eq!(second.payload, first.payload);

        // Exactly one upstream call; the second request never left the cache.
        assert_eq!(client.call_count(), 1);

        let recorded = metrics.recorded();
        assert_eq!(recorded.len(), 2);
        assert!(!recorded[0].cache_hit);
        assert!(recorded[1].cache_hit);
    }

    #[tokio::test]
    async fn validation_failure_short_circuits_everything() {
        let client = Arc::new(ScriptedHttpClient::new(vec![]));
        let (proxy, metrics) = proxy_with(Arc::clone(&client));

        let mut params = stats_params();
        params.remove("season");

        let error = proxy
            .request(EndpointKind::Stats, "/stats/nfl", &params)
            .await
            .expect_err("must fail validation");
        assert_eq!(error.kind(), FeedErrorKind::InvalidRequest);
        assert_eq!(client.call_count(), 0);
        assert!(metrics.recorded().is_empty());
        assert!(proxy.breaker_snapshot().is_empty());
    }

    #[tokio::test]
    async fn invalid_season_type_is_rejected() {
        let client = Arc::new(ScriptedHttpClient::new(vec![]));
        let (proxy, _) = proxy_with(client);

        let mut params = stats_params();
        params.insert("season_type".into(), "playoffs".into());

        let error = proxy
            .request(EndpointKind::Projections, "/projections/nfl", &params)
            .await
            .expect_err("must fail validation");
        assert_eq!(error.kind(), FeedErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn breaker_opens_after_threshold_and_rejects_without_upstream_calls() {
        let failures = (0..5)
            .map(|_| Err(HttpError::connect("connection refused")))
            .collect::<Vec<_>>();
        let client = Arc::new(ScriptedHttpClient::new(failures));
        let (proxy, _) = proxy_with(Arc::clone(&client));

        for _ in 0..5 {
            let error = proxy
                .request(EndpointKind::Players, "/players/nfl", &BTreeMap::new())
                .await
                .expect_err("upstream is down");
            assert_eq!(error.kind(), FeedErrorKind::Unavailable);
        }
        assert_eq!(client.call_count(), 5);

        // Sixth request: breaker is open, zero additional upstream calls.
        let error = proxy
            .request(EndpointKind::Players, "/players/nfl", &BTreeMap::new())
            .await
            .expect_err("breaker must reject");
        assert_eq!(error.kind(), FeedErrorKind::CircuitOpen);
        assert_eq!(client.call_count(), 5);
    }

    #[tokio::test]
    async fn transient_status_is_retried_then_succeeds() {
        let client = Arc::new(ScriptedHttpClient::new(vec![
            Ok(HttpResponse {
                status: 503,
                body: String::new(),
            }),
            Ok(HttpResponse::ok_json(r#"{"ok":true}"#)),
        ]));
        let metrics = Arc::new(MemoryMetricsRecorder::default());
        let proxy = UpstreamProxy::new(
            "https://vendor.test/v1",
            Arc::clone(&client) as Arc<dyn HttpClient>,
            Arc::new(MemoryCacheStore::new()),
            metrics as Arc<dyn MetricsRecorder>,
        )
        .with_retry(RetryConfig::fixed(Duration::from_millis(1), 2));

        let response = proxy
            .request(EndpointKind::State, "/state/nfl", &BTreeMap::new())
            .await
            .expect("retry should recover");
        assert_eq!(response.status, 200);
        assert_eq!(client.call_count(), 2);

        // One retried request still records one breaker success overall.
        assert!(proxy
            .breaker_snapshot()
            .iter()
            .all(|snapshot| snapshot.consecutive_failures == 0));
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let client = Arc::new(ScriptedHttpClient::new(vec![Ok(HttpResponse {
            status: 404,
            body: String::new(),
        })]));
        let metrics = Arc::new(MemoryMetricsRecorder::default());
        let proxy = UpstreamProxy::new(
            "https://vendor.test/v1",
            Arc::clone(&client) as Arc<dyn HttpClient>,
            Arc::new(MemoryCacheStore::new()),
            metrics as Arc<dyn MetricsRecorder>,
        )
        .with_retry(RetryConfig::fixed(Duration::from_millis(1), 3));

        let error = proxy
            .request(EndpointKind::State, "/state/nfl", &BTreeMap::new())
            .await
            .expect_err("404 must surface immediately");
        assert_eq!(error.kind(), FeedErrorKind::Unavailable);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn rate_limit_exhaustion_surfaces_as_rate_limited() {
        let client = Arc::new(ScriptedHttpClient::new(vec![Ok(HttpResponse {
            status: 429,
            body: String::new(),
        })]));
        let (proxy, _) = proxy_with(client);

        let error = proxy
            .request(EndpointKind::State, "/state/nfl", &BTreeMap::new())
            .await
            .expect_err("429 with retries disabled");
        assert_eq!(error.kind(), FeedErrorKind::RateLimited);
    }

    #[tokio::test]
    async fn upstream_url_is_base_plus_vendor_path() {
        let client = Arc::new(ScriptedHttpClient::new(vec![Ok(HttpResponse::ok_json(
            "[]",
        ))]));
        let (proxy, _) = proxy_with(Arc::clone(&client));

        proxy
            .request(
                EndpointKind::Stats,
                "/stats/nfl/regular/2025/10",
                &stats_params(),
            )
            .await
            .expect("request");

        let url = client.last_url().expect("one call");
        assert_eq!(url, "https://vendor.test/v1/stats/nfl/regular/2025/10");
    }

    #[tokio::test]
    async fn cache_key_is_shared_across_param_orderings() {
        let client = Arc::new(ScriptedHttpClient::new(vec![Ok(HttpResponse::ok_json(
            "[]",
        ))]));
        let (proxy, _) = proxy_with(Arc::clone(&client));

        proxy
            .request(
                EndpointKind::Stats,
                "/stats/nfl/regular/2025/10",
                &stats_params(),
            )
            .await
            .expect("first request");

        // Same logical parameters assembled in a different order land on
        // the same cache entry: no second upstream call.
        let reordered: BTreeMap<String, String> = [
            ("week", "10"),
            ("season_type", "regular"),
            ("season", "2025"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let second = proxy
            .request(EndpointKind::Stats, "/stats/nfl/regular/2025/10", &reordered)
            .await
            .expect("second request");
        assert!(second.cache_hit);
        assert_eq!(client.call_count(), 1);
    }
}
