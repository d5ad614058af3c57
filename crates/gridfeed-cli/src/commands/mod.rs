//! Command dispatch: builds the provider manager, runs the requested
//! operation, and wraps the result in a response envelope.

use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};

use gridfeed_core::{
    Envelope, EnvelopeError, EnvelopeMeta, FeedError, FeedSource, ManagerConfig, PlayerId,
    ProviderId, ProviderManager, ReqwestHttpClient, Season, SeasonType, Served, SleeperAdapter,
    SportsDataIoAdapter, StatsRequest, ValidationError, Week,
};

use crate::cli::{Cli, Command, ProviderSelector, WeeklyArgs};
use crate::error::CliError;

const SCHEMA_VERSION: &str = "v1.0.0";

pub async fn run(cli: &Cli) -> Result<Envelope<Value>, CliError> {
    let started = Instant::now();
    let manager = build_manager(cli)?;
    let primary = manager.config().primary;

    match &cli.command {
        Command::State => finish(
            started,
            primary,
            manager.nfl_state().await.map(|served| {
                served.map_value(|state| serde_json::to_value(state).unwrap_or(Value::Null))
            }),
        ),
        Command::Players(args) => {
            let result = manager.players().await.map(|served| {
                served.map_value(|mut players| {
                    if let Some(position) = &args.position {
                        players.retain(|player| {
                            player
                                .position
                                .as_deref()
                                .is_some_and(|p| p.eq_ignore_ascii_case(position))
                        });
                    }
                    if args.limit > 0 {
                        players.truncate(args.limit);
                    }
                    json!({ "count": players.len(), "players": players })
                })
            });
            finish(started, primary, result)
        }
        Command::Player(args) => {
            let player_id = PlayerId::parse(&args.id)?;
            finish(
                started,
                primary,
                manager.player_by_id(&player_id).await.map(|served| {
                    served.map_value(|player| serde_json::to_value(player).unwrap_or(Value::Null))
                }),
            )
        }
        Command::Stats(args) => {
            let req = weekly_request(args)?;
            finish(
                started,
                primary,
                manager.stats(req).await.map(|served| {
                    served.map_value(|stats| json!({ "count": stats.len(), "stats": stats }))
                }),
            )
        }
        Command::Projections(args) => {
            let req = weekly_request(args)?;
            finish(
                started,
                primary,
                manager.projections(req).await.map(|served| {
                    served.map_value(|projections| {
                        json!({ "count": projections.len(), "projections": projections })
                    })
                }),
            )
        }
        Command::PlayerStats(args) => {
            let player_id = PlayerId::parse(&args.id)?;
            let req = weekly_request(&args.weekly)?;
            finish(
                started,
                primary,
                manager.player_stats(&player_id, req).await.map(|served| {
                    served.map_value(|stats| serde_json::to_value(stats).unwrap_or(Value::Null))
                }),
            )
        }
        Command::Providers(args) => providers_report(started, &manager, args.test).await,
    }
}

/// Build the manager the way the invocation asks for: mock adapters by
/// default, real transports with `--live`.
fn build_manager(cli: &Cli) -> Result<ProviderManager, CliError> {
    let sleeper: Arc<dyn FeedSource> = if cli.live {
        Arc::new(SleeperAdapter::with_http_client(Arc::new(
            ReqwestHttpClient::new(),
        )))
    } else {
        Arc::new(SleeperAdapter::default())
    };

    let sportsdataio: Arc<dyn FeedSource> = if cli.live {
        let api_key = env::var("GRIDFEED_SPORTSDATAIO_API_KEY")
            .or_else(|_| env::var("SPORTSDATAIO_API_KEY"))
            .unwrap_or_default();
        Arc::new(SportsDataIoAdapter::with_http_client(
            Arc::new(ReqwestHttpClient::new()),
            api_key,
        ))
    } else {
        Arc::new(SportsDataIoAdapter::default())
    };

    let (primary, fallback) = match cli.provider {
        ProviderSelector::Sleeper => (ProviderId::Sleeper, ProviderId::SportsDataIo),
        ProviderSelector::Sportsdataio => (ProviderId::SportsDataIo, ProviderId::Sleeper),
    };

    let mut config = ManagerConfig::new(primary).with_fallback(fallback);
    if cli.no_fallback {
        config.enable_fallback = false;
    }

    Ok(ProviderManager::new(vec![sleeper, sportsdataio], config)?)
}

fn weekly_request(args: &WeeklyArgs) -> Result<StatsRequest, ValidationError> {
    Ok(StatsRequest::new(
        Season::new(args.season)?,
        Week::new(args.week)?,
        SeasonType::from_str(&args.season_type)?,
    ))
}

/// Wrap an operation outcome in an envelope: served data tags the
/// provider chain, failures become structured envelope errors.
fn finish(
    started: Instant,
    primary: ProviderId,
    result: Result<Served<Value>, FeedError>,
) -> Result<Envelope<Value>, CliError> {
    match result {
        Ok(served) => {
            let chain = if served.used_fallback {
                vec![primary, served.provider]
            } else {
                vec![served.provider]
            };
            let mut meta = EnvelopeMeta::new(
                request_id(),
                SCHEMA_VERSION,
                chain,
                elapsed_ms(started),
                false,
            )?;
            if served.used_fallback {
                meta.push_warning(format!(
                    "fallback provider '{}' served this request",
                    served.provider
                ));
            }
            Ok(Envelope::success(meta, served.data))
        }
        Err(error) => {
            let meta = EnvelopeMeta::new(
                request_id(),
                SCHEMA_VERSION,
                vec![primary],
                elapsed_ms(started),
                false,
            )?;
            let envelope_error = EnvelopeError::new(error.code(), error.message())?
                .with_retryable(error.retryable());
            Envelope::with_errors(meta, Value::Null, vec![envelope_error]).map_err(Into::into)
        }
    }
}

async fn providers_report(
    started: Instant,
    manager: &ProviderManager,
    test: bool,
) -> Result<Envelope<Value>, CliError> {
    let data = if test {
        let results = manager.test_all_providers().await;
        json!({
            "probed": results
                .into_iter()
                .map(|(provider, healthy)| json!({
                    "provider": provider.as_str(),
                    "healthy": healthy,
                }))
                .collect::<Vec<_>>(),
        })
    } else {
        json!({
            "active": manager.active_provider().await.as_str(),
            "providers": manager.provider_health(),
        })
    };

    let meta = EnvelopeMeta::new(
        request_id(),
        SCHEMA_VERSION,
        manager.registered_providers(),
        elapsed_ms(started),
        false,
    )?;
    Ok(Envelope::success(meta, data))
}

fn request_id() -> String {
    format!("req-{}", uuid::Uuid::new_v4())
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// Small helper so `Served<T>` can become `Served<Value>` without
/// re-tagging by hand.
trait ServedExt<T> {
    fn map_value(self, transform: impl FnOnce(T) -> Value) -> Served<Value>;
}

impl<T> ServedExt<T> for Served<T> {
    fn map_value(self, transform: impl FnOnce(T) -> Value) -> Served<Value> {
        Served {
            data: transform(self.data),
            provider: self.provider,
            used_fallback: self.used_fallback,
        }
    }
}
