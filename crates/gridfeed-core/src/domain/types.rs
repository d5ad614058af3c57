use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MAX_PLAYER_ID_LEN: usize = 16;
const MIN_SEASON: u16 = 2000;
const MAX_SEASON: u16 = 2100;
const MAX_WEEK: u16 = 22;

/// Normalized vendor-agnostic player identifier.
///
/// Sleeper uses short numeric ids ("4046"); SportsDataIO uses integer
/// `PlayerID` values. Both normalize to this string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlayerId(String);

impl PlayerId {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyPlayerId);
        }

        let len = trimmed.chars().count();
        if len > MAX_PLAYER_ID_LEN {
            return Err(ValidationError::PlayerIdTooLong {
                len,
                max: MAX_PLAYER_ID_LEN,
            });
        }

        for (index, ch) in trimmed.chars().enumerate() {
            if !ch.is_ascii_alphanumeric() {
                return Err(ValidationError::PlayerIdInvalidChar { ch, index });
            }
        }

        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PlayerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for PlayerId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for PlayerId {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<PlayerId> for String {
    fn from(value: PlayerId) -> Self {
        value.0
    }
}

/// NFL season phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonType {
    Regular,
    Pre,
    Post,
}

impl SeasonType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Pre => "pre",
            Self::Post => "post",
        }
    }
}

impl Default for SeasonType {
    fn default() -> Self {
        Self::Regular
    }
}

impl Display for SeasonType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeasonType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "regular" => Ok(Self::Regular),
            "pre" | "preseason" => Ok(Self::Pre),
            "post" | "postseason" => Ok(Self::Post),
            other => Err(ValidationError::InvalidSeasonType {
                value: other.to_owned(),
            }),
        }
    }
}

/// Validated NFL season year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Season(u16);

impl Season {
    pub fn new(year: u16) -> Result<Self, ValidationError> {
        if !(MIN_SEASON..=MAX_SEASON).contains(&year) {
            return Err(ValidationError::InvalidSeason {
                value: year,
                min: MIN_SEASON,
                max: MAX_SEASON,
            });
        }
        Ok(Self(year))
    }

    pub const fn value(self) -> u16 {
        self.0
    }
}

impl Display for Season {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for Season {
    type Error = ValidationError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Season> for u16 {
    fn from(value: Season) -> Self {
        value.0
    }
}

/// Validated NFL week number (1 through 22 covers pre/regular/post).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Week(u16);

impl Week {
    pub fn new(week: u16) -> Result<Self, ValidationError> {
        if week == 0 || week > MAX_WEEK {
            return Err(ValidationError::InvalidWeek {
                value: week,
                max: MAX_WEEK,
            });
        }
        Ok(Self(week))
    }

    pub const fn value(self) -> u16 {
        self.0
    }
}

impl Display for Week {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for Week {
    type Error = ValidationError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Week> for u16 {
    fn from(value: Week) -> Self {
        value.0
    }
}
