use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;

use crate::cache::{CacheStore, MemoryCacheStore};
use crate::feed::{EndpointKind, FeedError, FeedSource, StatsRequest};
use crate::http_client::{HttpAuth, HttpClient, NoopHttpClient};
use crate::metrics::{MemoryMetricsRecorder, MetricsRecorder};
use crate::proxy::UpstreamProxy;
use crate::{
    NflPlayer, NflState, PlayerCrossRefs, PlayerId, PlayerProjection, PlayerStats, ProviderId,
    ScoringPoints, Season, SeasonType, StatLine, ValidationError, Week,
};

const SPORTSDATAIO_BASE_URL: &str = "https://api.sportsdata.io/v3/nfl";

/// Canonical stat names for the SportsDataIO columns we carry over.
const STAT_COLUMNS: &[(&str, fn(&SdioStatWire) -> Option<f64>)] = &[
    ("pass_yd", |w| w.passing_yards),
    ("pass_td", |w| w.passing_touchdowns),
    ("pass_int", |w| w.interceptions),
    ("rush_yd", |w| w.rushing_yards),
    ("rush_td", |w| w.rushing_touchdowns),
    ("rec", |w| w.receptions),
    ("rec_yd", |w| w.receiving_yards),
    ("rec_td", |w| w.receiving_touchdowns),
    ("fum_lost", |w| w.fumbles_lost),
];

/// SportsDataIO adapter.
///
/// The vendor speaks PascalCase JSON arrays, numeric season types, and a
/// subscription-key header; all of it normalizes to the same canonical
/// model the Sleeper adapter produces.
pub struct SportsDataIoAdapter {
    proxy: UpstreamProxy,
    use_real_api: bool,
}

impl Default for SportsDataIoAdapter {
    fn default() -> Self {
        Self::with_http_client(Arc::new(NoopHttpClient), String::new())
    }
}

impl SportsDataIoAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>, api_key: String) -> Self {
        let use_real_api = !http_client.is_mock();
        let proxy = UpstreamProxy::new(
            SPORTSDATAIO_BASE_URL,
            http_client,
            Arc::new(MemoryCacheStore::new()),
            Arc::new(MemoryMetricsRecorder::default()),
        )
        .with_auth(HttpAuth::Header {
            name: String::from("Ocp-Apim-Subscription-Key"),
            value: api_key,
        });
        Self { proxy, use_real_api }
    }

    pub fn with_proxy(proxy: UpstreamProxy, use_real_api: bool) -> Self {
        Self { proxy, use_real_api }
    }

    pub fn with_stores(
        http_client: Arc<dyn HttpClient>,
        api_key: String,
        cache: Arc<dyn CacheStore>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        let use_real_api = !http_client.is_mock();
        let proxy = UpstreamProxy::new(SPORTSDATAIO_BASE_URL, http_client, cache, metrics)
            .with_auth(HttpAuth::Header {
                name: String::from("Ocp-Apim-Subscription-Key"),
                value: api_key,
            });
        Self { proxy, use_real_api }
    }

    pub fn proxy(&self) -> &UpstreamProxy {
        &self.proxy
    }

    fn season_segment(req: StatsRequest) -> String {
        let suffix = match req.season_type {
            SeasonType::Regular => "REG",
            SeasonType::Pre => "PRE",
            SeasonType::Post => "POST",
        };
        format!("{}{suffix}", req.season)
    }

    fn stats_params(req: StatsRequest) -> BTreeMap<String, String> {
        [
            ("season".to_string(), req.season.to_string()),
            ("week".to_string(), req.week.to_string()),
            ("season_type".to_string(), req.season_type.to_string()),
        ]
        .into_iter()
        .collect()
    }

    async fn fetch_state(&self) -> Result<NflState, FeedError> {
        let response = self
            .proxy
            .request(
                EndpointKind::State,
                "/scores/json/Timeframes/current",
                &BTreeMap::new(),
            )
            .await?;

        if !self.use_real_api {
            return Ok(fake_state());
        }

        let wire: Vec<SdioTimeframeWire> = serde_json::from_str(&response.payload)
            .map_err(|e| FeedError::internal(format!("failed to parse sportsdataio state: {e}")))?;
        let current = wire
            .into_iter()
            .next()
            .ok_or_else(|| FeedError::internal("sportsdataio returned no current timeframe"))?;
        normalize_state(current)
    }

    async fn fetch_players(&self) -> Result<Vec<NflPlayer>, FeedError> {
        let response = self
            .proxy
            .request(EndpointKind::Players, "/scores/json/Players", &BTreeMap::new())
            .await?;

        if !self.use_real_api {
            return Ok(fake_players());
        }

        let wire: Vec<SdioPlayerWire> = serde_json::from_str(&response.payload).map_err(|e| {
            FeedError::internal(format!("failed to parse sportsdataio players: {e}"))
        })?;

        let mut players = Vec::with_capacity(wire.len());
        for entry in wire {
            match normalize_player(entry) {
                Ok(player) => players.push(player),
                Err(error) => {
                    tracing::debug!(error = %error, "skipping malformed sportsdataio player");
                }
            }
        }
        Ok(players)
    }

    async fn fetch_stats(&self, req: StatsRequest) -> Result<Vec<PlayerStats>, FeedError> {
        let path = format!(
            "/stats/json/PlayerGameStatsByWeek/{}/{}",
            Self::season_segment(req),
            req.week
        );
        let response = self
            .proxy
            .request(EndpointKind::Stats, &path, &Self::stats_params(req))
            .await?;

        if !self.use_real_api {
            return Ok(fake_stats(req));
        }

        let wire: Vec<SdioStatWire> = serde_json::from_str(&response.payload)
            .map_err(|e| FeedError::internal(format!("failed to parse sportsdataio stats: {e}")))?;

        wire.into_iter()
            .map(|entry| {
                let (player_id, stats, points) = normalize_stat_row(&entry)?;
                Ok(PlayerStats {
                    player_id,
                    season: req.season,
                    week: req.week,
                    season_type: req.season_type,
                    stats,
                    points,
                })
            })
            .collect()
    }

    async fn fetch_projections(
        &self,
        req: StatsRequest,
    ) -> Result<Vec<PlayerProjection>, FeedError> {
        let path = format!(
            "/projections/json/PlayerGameProjectionStatsByWeek/{}/{}",
            Self::season_segment(req),
            req.week
        );
        let response = self
            .proxy
            .request(EndpointKind::Projections, &path, &Self::stats_params(req))
            .await?;

        if !self.use_real_api {
            return Ok(fake_projections(req));
        }

        let wire: Vec<SdioStatWire> = serde_json::from_str(&response.payload).map_err(|e| {
            FeedError::internal(format!("failed to parse sportsdataio projections: {e}"))
        })?;

        wire.into_iter()
            .map(|entry| {
                let (player_id, stats, points) = normalize_stat_row(&entry)?;
                Ok(PlayerProjection {
                    player_id,
                    season: req.season,
                    week: req.week,
                    season_type: req.season_type,
                    stats,
                    points,
                })
            })
            .collect()
    }
}

impl FeedSource for SportsDataIoAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::SportsDataIo
    }

    fn nfl_state<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<NflState, FeedError>> + Send + 'a>> {
        Box::pin(self.fetch_state())
    }

    fn players<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<NflPlayer>, FeedError>> + Send + 'a>> {
        Box::pin(self.fetch_players())
    }

    fn stats<'a>(
        &'a self,
        req: StatsRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PlayerStats>, FeedError>> + Send + 'a>> {
        Box::pin(self.fetch_stats(req))
    }

    fn projections<'a>(
        &'a self,
        req: StatsRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PlayerProjection>, FeedError>> + Send + 'a>> {
        Box::pin(self.fetch_projections(req))
    }
}

// SportsDataIO wire structures. SeasonType is numeric: 1 regular, 2 pre,
// 3 post.
#[derive(Debug, Clone, Deserialize)]
struct SdioTimeframeWire {
    #[serde(rename = "Season")]
    season: u16,
    #[serde(rename = "SeasonType")]
    season_type: u8,
    #[serde(rename = "Week", default)]
    week: Option<u16>,
    #[serde(rename = "StartDate", default)]
    start_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SdioPlayerWire {
    #[serde(rename = "PlayerID")]
    player_id: i64,
    #[serde(rename = "FirstName", default)]
    first_name: Option<String>,
    #[serde(rename = "LastName", default)]
    last_name: Option<String>,
    #[serde(rename = "Team", default)]
    team: Option<String>,
    #[serde(rename = "Position", default)]
    position: Option<String>,
    #[serde(rename = "Status", default)]
    status: Option<String>,
    #[serde(rename = "InjuryStatus", default)]
    injury_status: Option<String>,
    #[serde(rename = "Age", default)]
    age: Option<u8>,
    #[serde(rename = "Experience", default)]
    experience: Option<u8>,
    #[serde(rename = "Active", default)]
    active: bool,
    #[serde(rename = "YahooPlayerID", default)]
    yahoo_player_id: Option<i64>,
    #[serde(rename = "RotoWirePlayerID", default)]
    rotowire_player_id: Option<i64>,
    #[serde(rename = "SportRadarPlayerID", default)]
    sportradar_player_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SdioStatWire {
    #[serde(rename = "PlayerID")]
    player_id: i64,
    #[serde(rename = "PassingYards", default)]
    passing_yards: Option<f64>,
    #[serde(rename = "PassingTouchdowns", default)]
    passing_touchdowns: Option<f64>,
    #[serde(rename = "Interceptions", default)]
    interceptions: Option<f64>,
    #[serde(rename = "RushingYards", default)]
    rushing_yards: Option<f64>,
    #[serde(rename = "RushingTouchdowns", default)]
    rushing_touchdowns: Option<f64>,
    #[serde(rename = "Receptions", default)]
    receptions: Option<f64>,
    #[serde(rename = "ReceivingYards", default)]
    receiving_yards: Option<f64>,
    #[serde(rename = "ReceivingTouchdowns", default)]
    receiving_touchdowns: Option<f64>,
    #[serde(rename = "FumblesLost", default)]
    fumbles_lost: Option<f64>,
    #[serde(rename = "FantasyPoints", default)]
    fantasy_points: Option<f64>,
    #[serde(rename = "FantasyPointsPPR", default)]
    fantasy_points_ppr: Option<f64>,
}

fn normalize_state(wire: SdioTimeframeWire) -> Result<NflState, FeedError> {
    let season = Season::new(wire.season).map_err(validation_to_error)?;
    let season_type = match wire.season_type {
        1 => SeasonType::Regular,
        2 => SeasonType::Pre,
        3 => SeasonType::Post,
        other => {
            return Err(FeedError::internal(format!(
                "unknown sportsdataio season type {other}"
            )))
        }
    };
    let week = Week::new(wire.week.unwrap_or(1).max(1)).map_err(validation_to_error)?;
    let previous_season =
        Season::new(season.value().saturating_sub(1)).map_err(validation_to_error)?;
    let season_start_date = wire
        .start_date
        .map(|date| date.split('T').next().unwrap_or(&date).to_owned());

    Ok(NflState::new(
        week,
        season,
        season_type,
        week,
        season_start_date,
        previous_season,
        season,
    ))
}

fn normalize_player(wire: SdioPlayerWire) -> Result<NflPlayer, FeedError> {
    let player_id = PlayerId::parse(&wire.player_id.to_string()).map_err(validation_to_error)?;
    let mut player = NflPlayer::new(
        player_id,
        wire.first_name.unwrap_or_default(),
        wire.last_name.unwrap_or_default(),
        wire.team,
        wire.position,
        wire.status,
        wire.active,
    );
    player.injury_status = wire.injury_status;
    player.age = wire.age;
    player.years_exp = wire.experience;
    player.cross_refs = PlayerCrossRefs {
        yahoo_id: wire.yahoo_player_id.map(|id| id.to_string()),
        espn_id: None,
        rotowire_id: wire.rotowire_player_id.map(|id| id.to_string()),
        sportradar_id: wire.sportradar_player_id,
    };
    Ok(player)
}

fn normalize_stat_row(
    wire: &SdioStatWire,
) -> Result<(PlayerId, StatLine, ScoringPoints), FeedError> {
    let player_id = PlayerId::parse(&wire.player_id.to_string()).map_err(validation_to_error)?;

    let mut stats = StatLine::new();
    for (name, extract) in STAT_COLUMNS {
        if let Some(value) = extract(wire) {
            stats.insert(*name, value).map_err(validation_to_error)?;
        }
    }

    // SportsDataIO publishes standard and full-PPR totals; the half-PPR
    // figure is the midpoint of the two.
    let std = wire.fantasy_points;
    let ppr = wire.fantasy_points_ppr;
    let half_ppr = match (std, ppr) {
        (Some(std), Some(ppr)) => Some((std + ppr) / 2.0),
        _ => None,
    };
    let points = ScoringPoints::new(std, half_ppr, ppr).map_err(validation_to_error)?;

    Ok((player_id, stats, points))
}

fn validation_to_error(error: ValidationError) -> FeedError {
    FeedError::internal(error.to_string())
}

// Deterministic fake data for offline tests. Values differ from the
// Sleeper fakes so failover tests can tell the vendors apart.

fn fake_state() -> NflState {
    NflState::new(
        Week::new(10).expect("static week is valid"),
        Season::new(2025).expect("static season is valid"),
        SeasonType::Regular,
        Week::new(10).expect("static week is valid"),
        Some(String::from("2025-09-04")),
        Season::new(2024).expect("static season is valid"),
        Season::new(2025).expect("static season is valid"),
    )
}

fn fake_players() -> Vec<NflPlayer> {
    [
        ("18890", "Patrick", "Mahomes", "KC", "QB"),
        ("21685", "Justin", "Jefferson", "MIN", "WR"),
        ("22526", "Trevor", "Lawrence", "JAX", "QB"),
    ]
    .into_iter()
    .map(|(id, first, last, team, position)| {
        let mut player = NflPlayer::new(
            PlayerId::parse(id).expect("catalog ids are valid"),
            first,
            last,
            Some(team.to_owned()),
            Some(position.to_owned()),
            Some(String::from("Active")),
            true,
        );
        player.cross_refs.rotowire_id = Some(format!("rw-{id}"));
        player
    })
    .collect()
}

fn fake_stats(req: StatsRequest) -> Vec<PlayerStats> {
    fake_players()
        .into_iter()
        .map(|player| {
            let seed = player
                .player_id
                .as_str()
                .bytes()
                .fold(7_u64, |acc, byte| acc.wrapping_mul(31).wrapping_add(u64::from(byte)))
                + u64::from(req.week.value());
            let mut stats = StatLine::new();
            stats
                .insert("pass_yd", 120.0 + (seed % 230) as f64)
                .expect("finite fake stat");
            stats
                .insert("rush_yd", (seed % 60) as f64)
                .expect("finite fake stat");
            let std = 8.0 + (seed % 140) as f64 / 10.0;
            let points = ScoringPoints::new(Some(std), Some(std + 1.0), Some(std + 2.0))
                .expect("finite fake points");
            PlayerStats {
                player_id: player.player_id,
                season: req.season,
                week: req.week,
                season_type: req.season_type,
                stats,
                points,
            }
        })
        .collect()
}

fn fake_projections(req: StatsRequest) -> Vec<PlayerProjection> {
    fake_stats(req)
        .into_iter()
        .map(|entry| PlayerProjection {
            player_id: entry.player_id,
            season: entry.season,
            week: entry.week,
            season_type: entry.season_type,
            stats: entry.stats,
            points: entry.points,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::{HttpError, HttpRequest, HttpResponse};
    use std::sync::Mutex;

    struct FixedHttpClient {
        response: Result<HttpResponse, HttpError>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl FixedHttpClient {
        fn json(body: &str) -> Self {
            Self {
                response: Ok(HttpResponse::ok_json(body)),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn recorded(&self) -> Vec<HttpRequest> {
            self.requests.lock().expect("request log lock").clone()
        }
    }

    impl HttpClient for FixedHttpClient {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            self.requests
                .lock()
                .expect("request log lock")
                .push(request);
            let response = self.response.clone();
            Box::pin(async move { response })
        }
    }

    fn stats_request() -> StatsRequest {
        StatsRequest::new(
            Season::new(2025).expect("valid season"),
            Week::new(10).expect("valid week"),
            SeasonType::Post,
        )
    }

    #[tokio::test]
    async fn numeric_season_type_is_normalized() {
        let body = r#"[{
            "Season": 2025,
            "SeasonType": 3,
            "Week": 20,
            "StartDate": "2026-01-10T00:00:00"
        }]"#;
        let client = Arc::new(FixedHttpClient::json(body));
        let adapter = SportsDataIoAdapter::with_http_client(client, String::from("demo"));

        let state = adapter.nfl_state().await.expect("state should parse");
        assert_eq!(state.season_type, SeasonType::Post);
        assert_eq!(state.week.value(), 20);
        assert_eq!(state.season_start_date.as_deref(), Some("2026-01-10"));
    }

    #[tokio::test]
    async fn subscription_key_header_is_applied() {
        let client = Arc::new(FixedHttpClient::json("[]"));
        let adapter =
            SportsDataIoAdapter::with_http_client(client.clone(), String::from("secret-key"));

        let _ = adapter.players().await;

        let requests = client.recorded();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0]
                .headers
                .get("ocp-apim-subscription-key")
                .map(String::as_str),
            Some("secret-key")
        );
    }

    #[tokio::test]
    async fn pascal_case_stats_normalize_to_canonical_names() {
        let body = r#"[{
            "PlayerID": 18890,
            "PassingYards": 310.0,
            "PassingTouchdowns": 2.0,
            "RushingYards": 18.0,
            "FantasyPoints": 24.1,
            "FantasyPointsPPR": 26.1
        }]"#;
        let client = Arc::new(FixedHttpClient::json(body));
        let adapter = SportsDataIoAdapter::with_http_client(client, String::from("demo"));

        let stats = adapter
            .stats(stats_request())
            .await
            .expect("stats should parse");
        assert_eq!(stats.len(), 1);
        let entry = &stats[0];
        assert_eq!(entry.player_id.as_str(), "18890");
        assert_eq!(entry.stats.get("pass_yd"), Some(310.0));
        assert_eq!(entry.stats.get("rush_yd"), Some(18.0));
        assert_eq!(entry.points.std, Some(24.1));
        assert_eq!(entry.points.ppr, Some(26.1));
        assert_eq!(entry.points.half_ppr, Some(25.1));
    }

    #[tokio::test]
    async fn season_segment_uses_vendor_suffixes() {
        let client = Arc::new(FixedHttpClient::json("[]"));
        let adapter = SportsDataIoAdapter::with_http_client(client.clone(), String::from("demo"));

        adapter
            .stats(stats_request())
            .await
            .expect("stats should parse");

        let requests = client.recorded();
        assert_eq!(
            requests[0].url,
            "https://api.sportsdata.io/v3/nfl/stats/json/PlayerGameStatsByWeek/2025POST/10"
        );
    }

    #[tokio::test]
    async fn mock_mode_serves_deterministic_catalog() {
        let adapter = SportsDataIoAdapter::default();

        let players = adapter.players().await.expect("players should load");
        assert_eq!(players.len(), 3);
        assert!(players
            .iter()
            .all(|player| player.cross_refs.rotowire_id.is_some()));
    }
}
