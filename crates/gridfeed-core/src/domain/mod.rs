mod models;
mod timestamp;
mod types;

pub use models::{
    NflPlayer, NflState, PlayerCrossRefs, PlayerProjection, PlayerStats, ScoringPoints, StatLine,
};
pub use timestamp::UtcDateTime;
pub use types::{PlayerId, Season, SeasonType, Week};
