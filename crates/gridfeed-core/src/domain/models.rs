use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{PlayerId, Season, SeasonType, ValidationError, Week};

/// Canonical league/schedule state for the NFL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NflState {
    pub week: Week,
    pub season: Season,
    pub season_type: SeasonType,
    /// Week shown to users; can lead `week` during the preseason.
    pub display_week: Week,
    pub season_start_date: Option<String>,
    pub previous_season: Season,
    pub league_season: Season,
}

impl NflState {
    pub fn new(
        week: Week,
        season: Season,
        season_type: SeasonType,
        display_week: Week,
        season_start_date: Option<String>,
        previous_season: Season,
        league_season: Season,
    ) -> Self {
        Self {
            week,
            season,
            season_type,
            display_week,
            season_start_date,
            previous_season,
            league_season,
        }
    }
}

/// Cross-vendor identifier block attached to a canonical player.
///
/// Each upstream names players differently; these fields let callers join
/// a gridfeed player against other ecosystems without knowing which vendor
/// produced the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerCrossRefs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yahoo_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub espn_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotowire_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sportradar_id: Option<String>,
}

/// Canonical NFL player record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NflPlayer {
    pub player_id: PlayerId,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub team: Option<String>,
    pub position: Option<String>,
    pub status: Option<String>,
    pub injury_status: Option<String>,
    pub age: Option<u8>,
    pub years_exp: Option<u8>,
    pub active: bool,
    #[serde(default)]
    pub cross_refs: PlayerCrossRefs,
}

impl NflPlayer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        player_id: PlayerId,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        team: Option<String>,
        position: Option<String>,
        status: Option<String>,
        active: bool,
    ) -> Self {
        let first_name = first_name.into();
        let last_name = last_name.into();
        let full_name = if first_name.is_empty() {
            last_name.clone()
        } else {
            format!("{first_name} {last_name}")
        };
        Self {
            player_id,
            first_name,
            last_name,
            full_name,
            team,
            position,
            status,
            injury_status: None,
            age: None,
            years_exp: None,
            active,
            cross_refs: PlayerCrossRefs::default(),
        }
    }

    pub fn with_cross_refs(mut self, cross_refs: PlayerCrossRefs) -> Self {
        self.cross_refs = cross_refs;
        self
    }
}

/// Sparse per-category stat map, e.g. `pass_yd -> 289.0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatLine(pub BTreeMap<String, f64>);

impl StatLine {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Insert a stat, rejecting non-finite values at the adapter boundary.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) -> Result<(), ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NonFiniteValue { field: "stat" });
        }
        self.0.insert(name.into(), value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Derived fantasy scoring totals keyed by scoring system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringPoints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub half_ppr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ppr: Option<f64>,
}

impl ScoringPoints {
    pub fn new(
        std: Option<f64>,
        half_ppr: Option<f64>,
        ppr: Option<f64>,
    ) -> Result<Self, ValidationError> {
        for (field, value) in [("std", std), ("half_ppr", half_ppr), ("ppr", ppr)] {
            if let Some(value) = value {
                if !value.is_finite() {
                    return Err(ValidationError::NonFiniteValue { field });
                }
            }
        }
        Ok(Self { std, half_ppr, ppr })
    }
}

/// One player's actual stats for a given week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub player_id: PlayerId,
    pub season: Season,
    pub week: Week,
    pub season_type: SeasonType,
    pub stats: StatLine,
    pub points: ScoringPoints,
}

/// One player's projected stats for a given week.
///
/// Structurally identical to [`PlayerStats`]; kept as a distinct type so
/// callers cannot mix projected and actual values by accident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProjection {
    pub player_id: PlayerId,
    pub season: Season,
    pub week: Week,
    pub season_type: SeasonType,
    pub stats: StatLine,
    pub points: ScoringPoints,
}
