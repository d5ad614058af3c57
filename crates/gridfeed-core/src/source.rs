use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical vendor identifiers used in metadata and envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Sleeper,
    SportsDataIo,
}

impl ProviderId {
    pub const ALL: [Self; 2] = [Self::Sleeper, Self::SportsDataIo];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sleeper => "sleeper",
            Self::SportsDataIo => "sportsdataio",
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sleeper" => Ok(Self::Sleeper),
            "sportsdataio" => Ok(Self::SportsDataIo),
            other => Err(ValidationError::InvalidProvider {
                value: other.to_owned(),
            }),
        }
    }
}
