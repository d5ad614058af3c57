//! HTTP surface of the gridfeed caching proxy.
//!
//! One deployment fronts one vendor. Every data response carries an
//! `x-gridfeed-cache` header distinguishing served-from-cache from
//! freshly-fetched payloads; `/health` exposes liveness, a rolling
//! five-minute metrics summary, and the circuit-breaker snapshot.

use std::collections::BTreeMap;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use gridfeed_core::feed::{EndpointKind, FeedError, FeedErrorKind};
use gridfeed_core::http_client::{HttpAuth, HttpClient, ReqwestHttpClient};
use gridfeed_core::metrics::{MemoryMetricsRecorder, MetricsRecorder};
use gridfeed_core::proxy::UpstreamProxy;
use gridfeed_core::{CacheStore, MemoryCacheStore, ProviderId};
use gridfeed_store::{ProxyStore, StoreConfig};

pub const CACHE_HEADER: &str = "x-gridfeed-cache";
const METRICS_WINDOW: Duration = Duration::from_secs(300);

/// Server configuration, read from `GRIDFEED_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Which vendor this deployment fronts.
    pub vendor: ProviderId,
    /// Override for the vendor base URL (tests point this at a stub).
    pub base_url: Option<String>,
    /// SportsDataIO subscription key; unused for Sleeper.
    pub api_key: Option<String>,
    /// Explicitly allow-listed CORS origins.
    pub allowed_origins: Vec<String>,
    /// Use the durable DuckDB store instead of the in-memory cache.
    pub durable_store: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8700)),
            vendor: ProviderId::Sleeper,
            base_url: None,
            api_key: None,
            allowed_origins: Vec::new(),
            durable_store: false,
        }
    }
}

impl ServerConfig {
    /// Read configuration from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = env::var("GRIDFEED_BIND_ADDR") {
            if let Ok(addr) = addr.parse() {
                config.bind_addr = addr;
            }
        }
        if let Ok(vendor) = env::var("GRIDFEED_VENDOR") {
            if let Ok(vendor) = vendor.parse() {
                config.vendor = vendor;
            }
        }
        config.base_url = env::var("GRIDFEED_BASE_URL").ok();
        config.api_key = env::var("GRIDFEED_SPORTSDATAIO_API_KEY")
            .or_else(|_| env::var("SPORTSDATAIO_API_KEY"))
            .ok();
        if let Ok(origins) = env::var("GRIDFEED_ALLOWED_ORIGINS") {
            config.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_owned)
                .collect();
        }
        config.durable_store = env::var("GRIDFEED_DURABLE_STORE")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        config
    }
}

/// Maps logical endpoints onto one vendor's upstream paths.
#[derive(Debug, Clone, Copy)]
pub struct VendorRoutes {
    vendor: ProviderId,
}

impl VendorRoutes {
    pub fn new(vendor: ProviderId) -> Self {
        Self { vendor }
    }

    pub const fn base_url(self) -> &'static str {
        match self.vendor {
            ProviderId::Sleeper => "https://api.sleeper.app/v1",
            ProviderId::SportsDataIo => "https://api.sportsdata.io/v3/nfl",
        }
    }

    /// Build the vendor path for an endpoint. Values are percent-encoded;
    /// the proxy validates them before any upstream fetch uses the path.
    pub fn path_for(self, endpoint: EndpointKind, params: &BTreeMap<String, String>) -> String {
        let encode =
            |name: &str| urlencoding::encode(params.get(name).map_or("", String::as_str)).into_owned();
        let season = encode("season");
        let week = encode("week");
        let season_type = params
            .get("season_type")
            .map(|value| urlencoding::encode(value).into_owned())
            .unwrap_or_else(|| String::from("regular"));

        match (self.vendor, endpoint) {
            (ProviderId::Sleeper, EndpointKind::State | EndpointKind::Health) => {
                String::from("/state/nfl")
            }
            (ProviderId::Sleeper, EndpointKind::Players) => String::from("/players/nfl"),
            (ProviderId::Sleeper, EndpointKind::Stats) => {
                format!("/stats/nfl/{season_type}/{season}/{week}")
            }
            (ProviderId::Sleeper, EndpointKind::Projections) => {
                format!("/projections/nfl/{season_type}/{season}/{week}")
            }
            (ProviderId::SportsDataIo, EndpointKind::State | EndpointKind::Health) => {
                String::from("/scores/json/Timeframes/current")
            }
            (ProviderId::SportsDataIo, EndpointKind::Players) => {
                String::from("/scores/json/Players")
            }
            (ProviderId::SportsDataIo, EndpointKind::Stats) => format!(
                "/stats/json/PlayerGameStatsByWeek/{}/{week}",
                sdio_season_segment(&season, &season_type)
            ),
            (ProviderId::SportsDataIo, EndpointKind::Projections) => format!(
                "/projections/json/PlayerGameProjectionStatsByWeek/{}/{week}",
                sdio_season_segment(&season, &season_type)
            ),
        }
    }
}

fn sdio_season_segment(season: &str, season_type: &str) -> String {
    let suffix = match season_type {
        "pre" => "PRE",
        "post" => "POST",
        _ => "REG",
    };
    format!("{season}{suffix}")
}

#[derive(Clone)]
pub struct AppState {
    proxy: Arc<UpstreamProxy>,
    routes: VendorRoutes,
    started: Instant,
    allowed_origins: Arc<Vec<String>>,
}

/// Build the application state for a vendor deployment.
///
/// Stores are injected rather than constructed behind a singleton, so
/// tests can hand in their own cache, metrics, and transport.
pub fn app_state(
    config: &ServerConfig,
    http_client: Arc<dyn HttpClient>,
    cache: Arc<dyn CacheStore>,
    metrics: Arc<dyn MetricsRecorder>,
) -> AppState {
    let routes = VendorRoutes::new(config.vendor);
    let base_url = config
        .base_url
        .clone()
        .unwrap_or_else(|| routes.base_url().to_owned());

    let mut proxy = UpstreamProxy::new(base_url, http_client, cache, metrics);
    if config.vendor == ProviderId::SportsDataIo {
        proxy = proxy.with_auth(HttpAuth::Header {
            name: String::from("Ocp-Apim-Subscription-Key"),
            value: config.api_key.clone().unwrap_or_default(),
        });
    }

    AppState {
        proxy: Arc::new(proxy),
        routes,
        started: Instant::now(),
        allowed_origins: Arc::new(config.allowed_origins.clone()),
    }
}

/// Default wiring: reqwest transport plus either the durable DuckDB store
/// or the in-memory cache.
pub fn default_app_state(config: &ServerConfig) -> Result<AppState, gridfeed_store::StoreError> {
    let http_client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
    let metrics_buffer: Arc<dyn MetricsRecorder> = Arc::new(MemoryMetricsRecorder::default());

    if config.durable_store {
        let store = Arc::new(ProxyStore::open(StoreConfig::default())?);
        Ok(app_state(
            config,
            http_client,
            Arc::new(store.cache()),
            metrics_buffer,
        ))
    } else {
        Ok(app_state(
            config,
            http_client,
            Arc::new(MemoryCacheStore::new()),
            metrics_buffer,
        ))
    }
}

/// Assemble the router with CORS and method restrictions applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_origin(AllowOrigin::list(
            state
                .allowed_origins
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok()),
        ));

    Router::new()
        .route("/state", get(get_state))
        .route("/players", get(get_players))
        .route("/stats", get(get_stats))
        .route("/projections", get(get_projections))
        .route("/health", get(get_health))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            origin_guard,
        ))
        .layer(cors)
        .with_state(state)
}

/// Hard-reject requests whose Origin is not on the allow-list.
///
/// Requests without an Origin header (curl, server-to-server) pass.
async fn origin_guard(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    if let Some(origin) = request.headers().get(header::ORIGIN) {
        let allowed = origin
            .to_str()
            .map(|origin| {
                state
                    .allowed_origins
                    .iter()
                    .any(|candidate| candidate == origin)
            })
            .unwrap_or(false);
        if !allowed {
            warn!(origin = ?origin, "rejecting request from disallowed origin");
            return (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "error": {
                        "code": "proxy.origin_forbidden",
                        "message": "origin is not allow-listed",
                    }
                })),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn get_state(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    proxy_endpoint(state, EndpointKind::State, params).await
}

async fn get_players(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    proxy_endpoint(state, EndpointKind::Players, params).await
}

async fn get_stats(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    proxy_endpoint(state, EndpointKind::Stats, params).await
}

async fn get_projections(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    proxy_endpoint(state, EndpointKind::Projections, params).await
}

async fn proxy_endpoint(
    state: AppState,
    endpoint: EndpointKind,
    params: BTreeMap<String, String>,
) -> Response {
    let params = logical_params(endpoint, params);
    let path = state.routes.path_for(endpoint, &params);

    match state.proxy.request(endpoint, &path, &params).await {
        Ok(response) => {
            let cache_value = if response.cache_hit { "hit" } else { "miss" };
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "application/json"),
                    (header::HeaderName::from_static(CACHE_HEADER), cache_value),
                ],
                response.payload,
            )
                .into_response()
        }
        Err(error) => feed_error_response(&error),
    }
}

async fn get_health(State(state): State<AppState>) -> Response {
    let summary = state.proxy.metrics_summary(METRICS_WINDOW).await;
    let breakers = state.proxy.breaker_snapshot();

    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "uptime_secs": state.started.elapsed().as_secs(),
            "metrics": summary,
            "breakers": breakers,
        })),
    )
        .into_response()
}

/// Keep only the logical parameters so stray query noise does not split
/// the cache key space.
fn logical_params(
    endpoint: EndpointKind,
    mut params: BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    match endpoint {
        EndpointKind::Stats | EndpointKind::Projections => {
            params.retain(|name, _| matches!(name.as_str(), "season" | "week" | "season_type"));
            params
        }
        EndpointKind::State | EndpointKind::Players | EndpointKind::Health => BTreeMap::new(),
    }
}

fn feed_error_response(error: &FeedError) -> Response {
    let status = match error.kind() {
        FeedErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        FeedErrorKind::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
        FeedErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        FeedErrorKind::Unavailable => StatusCode::BAD_GATEWAY,
        FeedErrorKind::NotRegistered | FeedErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (
        status,
        Json(json!({
            "error": {
                "code": error.code(),
                "message": error.message(),
            }
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use gridfeed_core::http_client::{HttpError, HttpRequest, HttpResponse};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use tower::ServiceExt;

    struct StubHttpClient {
        response: Result<HttpResponse, HttpError>,
        calls: Mutex<usize>,
    }

    impl StubHttpClient {
        fn json(body: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(HttpResponse::ok_json(body)),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().expect("call counter lock")
        }
    }

    impl HttpClient for StubHttpClient {
        fn execute<'a>(
            &'a self,
            _request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            *self.calls.lock().expect("call counter lock") += 1;
            let response = self.response.clone();
            Box::pin(async move { response })
        }

        fn is_mock(&self) -> bool {
            true
        }
    }

    fn test_router(client: Arc<StubHttpClient>, origins: Vec<String>) -> Router {
        let config = ServerConfig {
            allowed_origins: origins,
            ..ServerConfig::default()
        };
        let state = app_state(
            &config,
            client,
            Arc::new(MemoryCacheStore::new()),
            Arc::new(MemoryMetricsRecorder::default()),
        );
        router(state)
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .expect("body bytes");
        String::from_utf8(bytes.to_vec()).expect("utf8 body")
    }

    #[tokio::test]
    async fn state_round_trip_sets_cache_header() {
        let client = StubHttpClient::json(r#"{"week":10}"#);
        let app = test_router(Arc::clone(&client), Vec::new());

        let first = app
            .clone()
            .oneshot(Request::get("/state").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(
            first.headers().get(CACHE_HEADER).and_then(|v| v.to_str().ok()),
            Some("miss")
        );

        let second = app
            .oneshot(Request::get("/state").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(
            second.headers().get(CACHE_HEADER).and_then(|v| v.to_str().ok()),
            Some("hit")
        );
        assert_eq!(client.calls(), 1);
        assert_eq!(body_string(second).await, r#"{"week":10}"#);
    }

    #[tokio::test]
    async fn stats_requires_season_and_week() {
        let client = StubHttpClient::json("{}");
        let app = test_router(Arc::clone(&client), Vec::new());

        let response = app
            .oneshot(
                Request::get("/stats?season=2025")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(client.calls(), 0);

        let body = body_string(response).await;
        assert!(body.contains("feed.invalid_request"));
    }

    #[tokio::test]
    async fn stats_param_order_shares_one_cache_entry() {
        let client = StubHttpClient::json("{}");
        let app = test_router(Arc::clone(&client), Vec::new());

        let first = app
            .clone()
            .oneshot(
                Request::get("/stats?season=2025&week=10")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(
                Request::get("/stats?week=10&season=2025")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(
            second.headers().get(CACHE_HEADER).and_then(|v| v.to_str().ok()),
            Some("hit")
        );
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn disallowed_origin_is_rejected() {
        let client = StubHttpClient::json("{}");
        let app = test_router(
            Arc::clone(&client),
            vec![String::from("https://app.example.com")],
        );

        let response = app
            .clone()
            .oneshot(
                Request::get("/state")
                    .header(header::ORIGIN, "https://evil.example.com")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(client.calls(), 0);

        let allowed = app
            .oneshot(
                Request::get("/state")
                    .header(header::ORIGIN, "https://app.example.com")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(allowed.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn non_get_methods_are_rejected() {
        let client = StubHttpClient::json("{}");
        let app = test_router(client, Vec::new());

        let response = app
            .oneshot(
                Request::post("/state")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn health_reports_metrics_and_breakers() {
        let client = StubHttpClient::json(r#"{"week":10}"#);
        let app = test_router(Arc::clone(&client), Vec::new());

        app.clone()
            .oneshot(Request::get("/state").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        let response = app
            .oneshot(
                Request::get("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_string(response).await;
        assert!(body.contains("\"status\":\"ok\""));
        assert!(body.contains("total_requests"));
        assert!(body.contains("breakers"));
    }

    #[test]
    fn vendor_routes_build_expected_paths() {
        let params: BTreeMap<String, String> = [
            ("season", "2025"),
            ("week", "10"),
            ("season_type", "post"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let sleeper = VendorRoutes::new(ProviderId::Sleeper);
        assert_eq!(
            sleeper.path_for(EndpointKind::Stats, &params),
            "/stats/nfl/post/2025/10"
        );

        let sdio = VendorRoutes::new(ProviderId::SportsDataIo);
        assert_eq!(
            sdio.path_for(EndpointKind::Projections, &params),
            "/projections/json/PlayerGameProjectionStatsByWeek/2025POST/10"
        );
    }
}
