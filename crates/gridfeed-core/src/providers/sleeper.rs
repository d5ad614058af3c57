use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::cache::{CacheStore, MemoryCacheStore};
use crate::feed::{EndpointKind, FeedError, FeedSource, StatsRequest};
use crate::http_client::{HttpClient, NoopHttpClient};
use crate::metrics::{MemoryMetricsRecorder, MetricsRecorder};
use crate::proxy::UpstreamProxy;
use crate::{
    NflPlayer, NflState, PlayerCrossRefs, PlayerId, PlayerProjection, PlayerStats, ProviderId,
    ScoringPoints, Season, SeasonType, StatLine, ValidationError, Week,
};

const SLEEPER_BASE_URL: &str = "https://api.sleeper.app/v1";

/// Sleeper adapter supporting both real API calls and mock mode.
///
/// Sleeper's API is unauthenticated; every operation routes through the
/// caching proxy pipeline, so TTLs, circuit breaking, and retry apply
/// uniformly.
pub struct SleeperAdapter {
    proxy: UpstreamProxy,
    use_real_api: bool,
}

impl Default for SleeperAdapter {
    fn default() -> Self {
        Self::with_http_client(Arc::new(NoopHttpClient))
    }
}

impl SleeperAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        let use_real_api = !http_client.is_mock();
        let proxy = UpstreamProxy::new(
            SLEEPER_BASE_URL,
            http_client,
            Arc::new(MemoryCacheStore::new()),
            Arc::new(MemoryMetricsRecorder::default()),
        );
        Self { proxy, use_real_api }
    }

    pub fn with_proxy(proxy: UpstreamProxy, use_real_api: bool) -> Self {
        Self { proxy, use_real_api }
    }

    pub fn with_stores(
        http_client: Arc<dyn HttpClient>,
        cache: Arc<dyn CacheStore>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        let use_real_api = !http_client.is_mock();
        let proxy = UpstreamProxy::new(SLEEPER_BASE_URL, http_client, cache, metrics);
        Self { proxy, use_real_api }
    }

    pub fn proxy(&self) -> &UpstreamProxy {
        &self.proxy
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

    fn weekly_path(prefix: &str, req: StatsRequest) -> String {
        format!(
            "/{prefix}/nfl/{}/{}/{}",
            req.season_type, req.season, req.week
        )
    }

    async fn fetch_state(&self) -> Result<NflState, FeedError> {
        let response = self
            .proxy
            .request(EndpointKind::State, "/state/nfl", &BTreeMap::new())
            .await?;

        if !self.use_real_api {
            return Ok(fake_state());
        }

        let wire: SleeperStateWire = serde_json::from_str(&response.payload)
            .map_err(|e| FeedError::internal(format!("failed to parse sleeper state: {e}")))?;
        normalize_state(wire)
    }

    async fn fetch_players(&self) -> Result<Vec<NflPlayer>, FeedError> {
        let response = self
            .proxy
            .request(EndpointKind::Players, "/players/nfl", &BTreeMap::new())
            .await?;

        if !self.use_real_api {
            return Ok(fake_players());
        }

        let wire: BTreeMap<String, SleeperPlayerWire> = serde_json::from_str(&response.payload)
            .map_err(|e| FeedError::internal(format!("failed to parse sleeper players: {e}")))?;

        // Records with unusable ids (team defenses use non-numeric ids we
        // still accept; truly malformed entries are skipped) fail here at
        // the adapter boundary instead of deep in the call chain.
        let mut players = Vec::with_capacity(wire.len());
        for (player_id, entry) in wire {
            match normalize_player(&player_id, entry) {
                Ok(player) => players.push(player),
                Err(error) => {
                    tracing::debug!(player_id = %player_id, error = %error, "skipping malformed sleeper player");
                }
            }
        }
        Ok(players)
    }

    async fn fetch_stats(&self, req: StatsRequest) -> Result<Vec<PlayerStats>, FeedError> {
        let response = self
            .proxy
            .request(
                EndpointKind::Stats,
                &Self::weekly_path("stats", req),
                &Self::stats_params(req),
            )
            .await?;

        if !self.use_real_api {
            return Ok(fake_stats(req));
        }

        let wire: BTreeMap<String, BTreeMap<String, Value>> =
            serde_json::from_str(&response.payload)
                .map_err(|e| FeedError::internal(format!("failed to parse sleeper stats: {e}")))?;

        let mut results = Vec::with_capacity(wire.len());
        for (player_id, raw_stats) in wire {
            let Ok(player_id) = PlayerId::parse(&player_id) else {
                continue;
            };
            let (stats, points) = normalize_stat_map(raw_stats)?;
            results.push(PlayerStats {
                player_id,
                season: req.season,
                week: req.week,
                season_type: req.season_type,
                stats,
                points,
            });
        }
        Ok(results)
    }

    async fn fetch_projections(
        &self,
        req: StatsRequest,
    ) -> Result<Vec<PlayerProjection>, FeedError> {
        let response = self
            .proxy
            .request(
                EndpointKind::Projections,
                &Self::weekly_path("projections", req),
                &Self::stats_params(req),
            )
            .await?;

        if !self.use_real_api {
            return Ok(fake_projections(req));
        }

        let wire: BTreeMap<String, BTreeMap<String, Value>> = serde_json::from_str(
            &response.payload,
        )
        .map_err(|e| FeedError::internal(format!("failed to parse sleeper projections: {e}")))?;

        let mut results = Vec::with_capacity(wire.len());
        for (player_id, raw_stats) in wire {
            let Ok(player_id) = PlayerId::parse(&player_id) else {
                continue;
            };
            let (stats, points) = normalize_stat_map(raw_stats)?;
            results.push(PlayerProjection {
                player_id,
                season: req.season,
                week: req.week,
                season_type: req.season_type,
                stats,
                points,
            });
        }
        Ok(results)
    }
}

impl FeedSource for SleeperAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Sleeper
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

// Sleeper wire structures. Seasons arrive as strings, ids as a mix of
// numbers and strings; everything optional defaults instead of failing.
#[derive(Debug, Clone, Deserialize)]
struct SleeperStateWire {
    week: u16,
    season: String,
    #[serde(default)]
    season_type: Option<String>,
    #[serde(default)]
    display_week: Option<u16>,
    #[serde(default)]
    season_start_date: Option<String>,
    #[serde(default)]
    previous_season: Option<String>,
    #[serde(default)]
    league_season: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SleeperPlayerWire {
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    team: Option<String>,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    injury_status: Option<String>,
    #[serde(default)]
    age: Option<u8>,
    #[serde(default)]
    years_exp: Option<u8>,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    yahoo_id: Option<Value>,
    #[serde(default)]
    espn_id: Option<Value>,
    #[serde(default)]
    rotowire_id: Option<Value>,
    #[serde(default)]
    sportradar_id: Option<Value>,
}

fn normalize_state(wire: SleeperStateWire) -> Result<NflState, FeedError> {
    let season = parse_season(&wire.season)?;
    let previous_season = match wire.previous_season.as_deref() {
        Some(value) => parse_season(value)?,
        None => Season::new(season.value().saturating_sub(1)).map_err(validation_to_error)?,
    };
    let league_season = match wire.league_season.as_deref() {
        Some(value) => parse_season(value)?,
        None => season,
    };
    let week = Week::new(wire.week.max(1)).map_err(validation_to_error)?;
    let display_week = match wire.display_week {
        Some(value) => Week::new(value.max(1)).map_err(validation_to_error)?,
        None => week,
    };
    let season_type = wire
        .season_type
        .as_deref()
        .map(str::parse::<SeasonType>)
        .transpose()
        .map_err(validation_to_error)?
        .unwrap_or_default();

    Ok(NflState::new(
        week,
        season,
        season_type,
        display_week,
        wire.season_start_date,
        previous_season,
        league_season,
    ))
}

fn normalize_player(player_id: &str, wire: SleeperPlayerWire) -> Result<NflPlayer, FeedError> {
    let player_id = PlayerId::parse(player_id).map_err(validation_to_error)?;
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
    player.years_exp = wire.years_exp;
    player.cross_refs = PlayerCrossRefs {
        yahoo_id: id_value_to_string(wire.yahoo_id),
        espn_id: id_value_to_string(wire.espn_id),
        rotowire_id: id_value_to_string(wire.rotowire_id),
        sportradar_id: id_value_to_string(wire.sportradar_id),
    };
    Ok(player)
}

/// Split a raw Sleeper stat map into the sparse stat line and the derived
/// scoring totals (`pts_std`, `pts_half_ppr`, `pts_ppr`).
fn normalize_stat_map(
    raw: BTreeMap<String, Value>,
) -> Result<(StatLine, ScoringPoints), FeedError> {
    let mut stats = StatLine::new();
    let mut std = None;
    let mut half_ppr = None;
    let mut ppr = None;

    for (name, value) in raw {
        let Some(value) = value.as_f64() else {
            continue;
        };
        match name.as_str() {
            "pts_std" => std = Some(value),
            "pts_half_ppr" => half_ppr = Some(value),
            "pts_ppr" => ppr = Some(value),
            _ => stats.insert(name, value).map_err(validation_to_error)?,
        }
    }

    let points = ScoringPoints::new(std, half_ppr, ppr).map_err(validation_to_error)?;
    Ok((stats, points))
}

fn parse_season(value: &str) -> Result<Season, FeedError> {
    value
        .trim()
        .parse::<u16>()
        .ok()
        .map(Season::new)
        .transpose()
        .map_err(validation_to_error)?
        .ok_or_else(|| FeedError::internal(format!("unparseable sleeper season '{value}'")))
}

fn id_value_to_string(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(text)) if !text.is_empty() => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    }
}

fn validation_to_error(error: ValidationError) -> FeedError {
    FeedError::internal(error.to_string())
}

// Deterministic fake data for offline tests.

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
        ("4046", "Patrick", "Mahomes", "KC", "QB"),
        ("6794", "Justin", "Jefferson", "MIN", "WR"),
        ("7528", "Trevor", "Lawrence", "JAX", "QB"),
        ("8112", "Bijan", "Robinson", "ATL", "RB"),
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
        player.cross_refs.sportradar_id = Some(format!("sr-{id}"));
        player
    })
    .collect()
}

fn fake_stat_line(seed: u64) -> (StatLine, ScoringPoints) {
    let mut stats = StatLine::new();
    let base = (seed % 250) as f64;
    stats
        .insert("pass_yd", 150.0 + base)
        .expect("finite fake stat");
    stats
        .insert("pass_td", (seed % 4) as f64)
        .expect("finite fake stat");
    stats
        .insert("rush_yd", 12.0 + (seed % 40) as f64)
        .expect("finite fake stat");

    let std = 10.0 + (seed % 120) as f64 / 10.0;
    let points = ScoringPoints::new(Some(std), Some(std + 1.5), Some(std + 3.0))
        .expect("finite fake points");
    (stats, points)
}

fn fake_stats(req: StatsRequest) -> Vec<PlayerStats> {
    fake_players()
        .into_iter()
        .map(|player| {
            let seed = id_seed(player.player_id.as_str()) + u64::from(req.week.value());
            let (stats, points) = fake_stat_line(seed);
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

fn id_seed(id: &str) -> u64 {
    id.bytes().fold(0_u64, |acc, byte| {
        acc.wrapping_mul(33).wrapping_add(u64::from(byte))
    })
}
