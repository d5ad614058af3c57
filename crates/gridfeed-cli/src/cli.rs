//! CLI argument definitions for gridfeed.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `state` | Fetch the current NFL league state |
//! | `players` | Fetch the full player directory |
//! | `player` | Look up a single player by id |
//! | `stats` | Fetch weekly actual stats |
//! | `projections` | Fetch weekly projections |
//! | `player-stats` | One player's stats for a week |
//! | `providers` | Inspect or probe registered providers |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--strict` | `false` | Treat warnings as errors |
//! | `--provider` | `sleeper` | Primary provider |
//! | `--no-fallback` | `false` | Disable failover to the secondary |
//! | `--live` | `false` | Call real vendor APIs instead of mock data |
//!
//! # Examples
//!
//! ```bash
//! gridfeed state --pretty
//! gridfeed stats --season 2025 --week 10
//! gridfeed player 4046
//! gridfeed providers --test
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};

/// gridfeed - resilient NFL data access CLI
///
/// Fetch NFL state, players, stats, and projections through a caching,
/// circuit-breaking proxy with automatic vendor failover.
#[derive(Debug, Parser)]
#[command(
    name = "gridfeed",
    author,
    version,
    about = "Resilient NFL data access CLI",
    long_about = "gridfeed fronts third-party NFL data vendors with a resilient access layer:\n\
\n\
  • TTL caching per endpoint\n\
  • Per-endpoint circuit breaking\n\
  • Bounded retry with jittered backoff\n\
  • Automatic failover between vendors (Sleeper, SportsDataIO)\n\
\n\
Use 'gridfeed <command> --help' for command-specific help."
)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Treat warnings and errors as failures (exit code 5).
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    /// Primary provider for this invocation.
    #[arg(long, global = true, value_enum, default_value_t = ProviderSelector::Sleeper)]
    pub provider: ProviderSelector,

    /// Disable failover to the secondary provider.
    #[arg(long, global = true, default_value_t = false)]
    pub no_fallback: bool,

    /// Call real vendor APIs (reads GRIDFEED_* keys from the environment).
    #[arg(long, global = true, default_value_t = false)]
    pub live: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Primary provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderSelector {
    /// Sleeper (free, unauthenticated).
    Sleeper,
    /// SportsDataIO (subscription key required for live calls).
    Sportsdataio,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch the current NFL league/schedule state.
    ///
    /// # Examples
    ///
    ///   gridfeed state
    ///   gridfeed state --pretty
    State,

    /// Fetch the full player directory.
    ///
    /// # Examples
    ///
    ///   gridfeed players
    ///   gridfeed players --position QB --limit 25
    Players(PlayersArgs),

    /// Look up a single player by id.
    ///
    /// # Examples
    ///
    ///   gridfeed player 4046
    Player(PlayerArgs),

    /// Fetch weekly actual stats.
    ///
    /// # Examples
    ///
    ///   gridfeed stats --season 2025 --week 10
    ///   gridfeed stats --season 2025 --week 3 --season-type pre
    Stats(WeeklyArgs),

    /// Fetch weekly projections.
    ///
    /// # Examples
    ///
    ///   gridfeed projections --season 2025 --week 10
    Projections(WeeklyArgs),

    /// One player's stats for a given week.
    ///
    /// # Examples
    ///
    ///   gridfeed player-stats 4046 --season 2025 --week 10
    PlayerStats(PlayerStatsArgs),

    /// Inspect registered providers and their cached health.
    ///
    /// # Examples
    ///
    ///   gridfeed providers
    ///   gridfeed providers --test
    Providers(ProvidersArgs),
}

/// Arguments for the `players` command.
#[derive(Debug, Args)]
pub struct PlayersArgs {
    /// Only include players at this position (e.g. QB, RB, WR).
    #[arg(long)]
    pub position: Option<String>,

    /// Maximum number of players to output (0 = unlimited).
    #[arg(long, default_value_t = 0)]
    pub limit: usize,
}

/// Arguments for the `player` command.
#[derive(Debug, Args)]
pub struct PlayerArgs {
    /// Player id (vendor-normalized, e.g. 4046).
    pub id: String,
}

/// Arguments shared by `stats` and `projections`.
#[derive(Debug, Args)]
pub struct WeeklyArgs {
    /// Season year (e.g. 2025).
    #[arg(long)]
    pub season: u16,

    /// Week number (1-22).
    #[arg(long)]
    pub week: u16,

    /// Season phase: regular, pre, or post.
    #[arg(long, default_value = "regular")]
    pub season_type: String,
}

/// Arguments for the `player-stats` command.
#[derive(Debug, Args)]
pub struct PlayerStatsArgs {
    /// Player id.
    pub id: String,

    #[command(flatten)]
    pub weekly: WeeklyArgs,
}

/// Arguments for the `providers` command.
#[derive(Debug, Args)]
pub struct ProvidersArgs {
    /// Probe every registered provider once instead of reading the cache.
    #[arg(long, default_value_t = false)]
    pub test: bool,
}
